//! BDD step definitions for latest, series, statistics and dashboard queries

use cucumber::{then, when};

use roomwatch::latest::LatestResolver;
use roomwatch::model::TimeWindow;

use super::catalog_steps::parse_time;
use crate::world::RoomwatchWorld;

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "Expected {}, got {}",
        expected,
        actual
    );
}

#[when(expr = "the latest readings of {string} are resolved")]
async fn resolve_latest(world: &mut RoomwatchWorld, ids: String) {
    let ids: Vec<String> = ids.split(',').map(|s| s.trim().to_string()).collect();
    let resolver = LatestResolver::new(world.store());
    world.latest = Some(resolver.latest(&ids).await.unwrap());
}

#[when(expr = "the series of {string} is requested from {string} to {string}")]
async fn request_series(world: &mut RoomwatchWorld, sensor_id: String, start: String, end: String) {
    let window = TimeWindow::new(parse_time(&start), parse_time(&end));
    match world.queries().series(&sensor_id, window).await {
        Ok(series) => world.series = Some(series.points),
        Err(e) => world.error = Some(e),
    }
}

#[when(expr = "the statistics of {string} are requested from {string} to {string}")]
async fn request_stats(world: &mut RoomwatchWorld, building_id: String, start: String, end: String) {
    let window = TimeWindow::new(parse_time(&start), parse_time(&end));
    match world.queries().stats(&building_id, window).await {
        Ok(stats) => world.stats = Some(stats),
        Err(e) => world.error = Some(e),
    }
}

#[when("the deployment overview is requested")]
async fn request_overview(world: &mut RoomwatchWorld) {
    world.overview = Some(world.queries().overview().await.unwrap());
}

#[when(expr = "the dashboard of {string} is opened at {string}")]
async fn open_dashboard(world: &mut RoomwatchWorld, building_id: String, now: String) {
    match world
        .queries()
        .building_dashboard_at(&building_id, None, parse_time(&now))
        .await
    {
        Ok(dashboard) => world.dashboard = Some(dashboard),
        Err(e) => world.error = Some(e),
    }
}

#[when(expr = "the dashboard of {string} is opened at {string} with sensor {string} selected")]
async fn open_dashboard_with_sensor(
    world: &mut RoomwatchWorld,
    building_id: String,
    now: String,
    sensor_id: String,
) {
    match world
        .queries()
        .building_dashboard_at(&building_id, Some(&sensor_id), parse_time(&now))
        .await
    {
        Ok(dashboard) => world.dashboard = Some(dashboard),
        Err(e) => world.error = Some(e),
    }
}

#[then(expr = "the latest reading of {string} should be {float}")]
fn latest_value(world: &mut RoomwatchWorld, sensor_id: String, expected: f64) {
    let latest = world.latest.as_ref().expect("latest not resolved");
    let reading = latest[&sensor_id]
        .as_ref()
        .unwrap_or_else(|| panic!("No latest reading for {}", sensor_id));
    assert_close(reading.value, expected);
}

#[then(expr = "sensor {string} should have no latest reading")]
fn no_latest(world: &mut RoomwatchWorld, sensor_id: String) {
    let latest = world.latest.as_ref().expect("latest not resolved");
    assert!(latest[&sensor_id].is_none());
}

#[then(expr = "the series should have {int} point(s)")]
fn series_len(world: &mut RoomwatchWorld, count: usize) {
    let series = world.series.as_ref().expect("series not requested");
    assert_eq!(series.len(), count, "series: {:?}", series);
}

#[then(expr = "series point {int} should start at {string} with average {float}")]
fn series_point(world: &mut RoomwatchWorld, index: usize, start: String, average: f64) {
    let series = world.series.as_ref().expect("series not requested");
    let point = &series[index - 1];
    assert_eq!(point.bucket_start, parse_time(&start));
    assert_close(point.average, average);
}

#[then(expr = "room {string} sensor {string} should have min {float}, max {float} and average {float}")]
fn stats_entry(
    world: &mut RoomwatchWorld,
    room_id: String,
    sensor_id: String,
    min: f64,
    max: f64,
    avg: f64,
) {
    let stats = world.stats.as_ref().expect("stats not requested");
    let entry = stats
        .get(&room_id)
        .and_then(|sensors| sensors.iter().find(|s| s.sensor_id == sensor_id))
        .unwrap_or_else(|| panic!("No stats for {}/{} in {:?}", room_id, sensor_id, stats));
    assert_close(entry.min, min);
    assert_close(entry.max, max);
    assert_close(entry.avg, avg);
}

#[then(expr = "the statistics should list rooms {string}")]
fn stats_rooms(world: &mut RoomwatchWorld, rooms: String) {
    let stats = world.stats.as_ref().expect("stats not requested");
    let actual: Vec<&str> = stats.keys().map(String::as_str).collect();
    let expected: Vec<&str> = rooms.split(',').map(str::trim).filter(|r| !r.is_empty()).collect();
    assert_eq!(actual, expected);
}

#[then("the statistics should be empty")]
fn stats_empty(world: &mut RoomwatchWorld) {
    let stats = world.stats.as_ref().expect("stats not requested");
    assert!(stats.is_empty(), "stats: {:?}", stats);
}

#[then(expr = "the overview should list sensors {string} in order")]
fn overview_order(world: &mut RoomwatchWorld, sensors: String) {
    let overview = world.overview.as_ref().expect("overview not requested");
    let actual: Vec<&str> = overview.iter().map(|r| r.sensor_id.as_str()).collect();
    let expected: Vec<&str> = sensors.split(',').map(str::trim).collect();
    assert_eq!(actual, expected);
}

#[then(expr = "the dashboard window should run from {string} to {string}")]
fn dashboard_window(world: &mut RoomwatchWorld, start: String, end: String) {
    let dashboard = world.dashboard.as_ref().expect("dashboard not opened");
    assert_eq!(dashboard.window.start, parse_time(&start));
    assert_eq!(dashboard.window.end, parse_time(&end));
}

#[then("the dashboard should have no series")]
fn dashboard_no_series(world: &mut RoomwatchWorld) {
    let dashboard = world.dashboard.as_ref().expect("dashboard not opened");
    assert!(dashboard.series.is_none());
}

#[then(expr = "the dashboard series should have {int} point(s)")]
fn dashboard_series_len(world: &mut RoomwatchWorld, count: usize) {
    let dashboard = world.dashboard.as_ref().expect("dashboard not opened");
    let series = dashboard.series.as_ref().expect("no series selected");
    assert_eq!(series.points.len(), count);
}

#[then(expr = "the dashboard statistics should list rooms {string}")]
fn dashboard_stats_rooms(world: &mut RoomwatchWorld, rooms: String) {
    let dashboard = world.dashboard.as_ref().expect("dashboard not opened");
    let actual: Vec<&str> = dashboard.stats.keys().map(String::as_str).collect();
    let expected: Vec<&str> = rooms.split(',').map(str::trim).collect();
    assert_eq!(actual, expected);
}

#[then(expr = "the query should fail with {string}")]
fn query_failed(world: &mut RoomwatchWorld, message: String) {
    let err = world.error.as_ref().expect("query did not fail");
    assert_eq!(err.to_string(), message);
}
