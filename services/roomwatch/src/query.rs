//! Query façade composing latest readings, series and statistics
//!
//! Every public call is bounded by the configured query timeout and reloads
//! the catalog, so reference data changes are picked up without a restart.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::config::QueryConfig;
use crate::latest::LatestResolver;
use crate::model::{Building, Room, Sensor, TimeWindow};
use crate::series::{SeriesAggregator, SeriesPoint};
use crate::stats::{RoomStats, StatsEngine};
use crate::store::{CatalogSource, MeasurementStore};
use crate::{Result, RoomwatchError};

/// One line of the deployment overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewRow {
    pub building_id: String,
    pub building_name: String,
    pub room_id: String,
    pub sensor_id: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

/// A sensor's per-minute series together with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSeries {
    pub sensor_id: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub unit: String,
    pub points: Vec<SeriesPoint>,
}

/// Everything the building page shows, computed over a single window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingDashboard {
    pub building: Building,
    pub window: TimeWindow,
    /// Sensor picker entries, ordered by sensor id
    pub sensors: Vec<Sensor>,
    pub series: Option<SensorSeries>,
    pub stats: RoomStats,
}

/// A building and its rooms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub building: Building,
    pub rooms: Vec<Room>,
}

pub struct QueryService {
    catalogs: Arc<dyn CatalogSource>,
    latest: LatestResolver,
    series: SeriesAggregator,
    stats: StatsEngine,
    config: QueryConfig,
}

impl QueryService {
    pub fn new(
        store: Arc<dyn MeasurementStore>,
        catalogs: Arc<dyn CatalogSource>,
        config: QueryConfig,
    ) -> Self {
        Self {
            catalogs,
            latest: LatestResolver::new(Arc::clone(&store)),
            series: SeriesAggregator::new(Arc::clone(&store)),
            stats: StatsEngine::new(store),
            config,
        }
    }

    /// Latest reading of every sensor that has reported, ordered by building
    /// name, room and sensor
    pub async fn overview(&self) -> Result<Vec<OverviewRow>> {
        self.bounded("overview", async {
            let catalog = self.catalogs.load_catalog().await?;
            let latest = self.latest.latest(&catalog.sensor_ids()).await?;

            let mut rows: Vec<OverviewRow> = latest
                .into_iter()
                .filter_map(|(sensor_id, measurement)| {
                    let measurement = measurement?;
                    let (sensor, room, building) = catalog.locate(&sensor_id)?;
                    Some(OverviewRow {
                        building_id: building.id.clone(),
                        building_name: building.name.clone(),
                        room_id: room.id.clone(),
                        sensor_id,
                        sensor_type: sensor.sensor_type.clone(),
                        value: measurement.value,
                        unit: sensor.unit.clone(),
                        timestamp: measurement.timestamp,
                    })
                })
                .collect();

            rows.sort_by(|a, b| {
                a.building_name
                    .cmp(&b.building_name)
                    .then_with(|| a.building_id.cmp(&b.building_id))
                    .then_with(|| a.room_id.cmp(&b.room_id))
                    .then_with(|| a.sensor_id.cmp(&b.sensor_id))
            });
            tracing::debug!("Overview: {} sensors with readings", rows.len());
            Ok(rows)
        })
        .await
    }

    /// Every building with its rooms, including buildings without any
    pub async fn directory(&self) -> Result<Vec<DirectoryEntry>> {
        self.bounded("directory", async {
            let catalog = self.catalogs.load_catalog().await?;
            let mut entries: Vec<DirectoryEntry> = catalog
                .buildings()
                .map(|building| DirectoryEntry {
                    building: building.clone(),
                    rooms: catalog.rooms_in(&building.id).into_iter().cloned().collect(),
                })
                .collect();
            entries.sort_by(|a, b| {
                a.building
                    .name
                    .cmp(&b.building.name)
                    .then_with(|| a.building.id.cmp(&b.building.id))
            });
            Ok(entries)
        })
        .await
    }

    pub async fn building_sensors(&self, building_id: &str) -> Result<Vec<Sensor>> {
        self.bounded("building sensors", async {
            let catalog = self.catalogs.load_catalog().await?;
            require_building(&catalog, building_id)?;
            Ok(catalog.sensors_in(building_id).into_iter().cloned().collect())
        })
        .await
    }

    /// Per-minute series of one sensor over an explicit window
    pub async fn series(&self, sensor_id: &str, window: TimeWindow) -> Result<SensorSeries> {
        self.bounded("series", async {
            let catalog = self.catalogs.load_catalog().await?;
            let sensor = catalog
                .sensor(sensor_id)
                .ok_or_else(|| RoomwatchError::UnknownSensor(sensor_id.to_string()))?;
            self.sensor_series(sensor, window).await
        })
        .await
    }

    /// Room statistics of one building over an explicit window
    pub async fn stats(&self, building_id: &str, window: TimeWindow) -> Result<RoomStats> {
        self.bounded("stats", async {
            let catalog = self.catalogs.load_catalog().await?;
            require_building(&catalog, building_id)?;
            self.stats.stats(building_id, window).await
        })
        .await
    }

    /// Building dashboard over the trailing window ending now
    pub async fn building_dashboard(
        &self,
        building_id: &str,
        sensor_id: Option<&str>,
    ) -> Result<BuildingDashboard> {
        self.building_dashboard_at(building_id, sensor_id, Utc::now())
            .await
    }

    /// Building dashboard over the trailing window ending at `now`.
    ///
    /// The window is computed once; the series and the statistics are both
    /// evaluated over it.
    pub async fn building_dashboard_at(
        &self,
        building_id: &str,
        sensor_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<BuildingDashboard> {
        self.bounded("building dashboard", async {
            let catalog = self.catalogs.load_catalog().await?;
            let building = require_building(&catalog, building_id)?;

            let selected = match sensor_id {
                Some(id) => match catalog.locate(id) {
                    Some((sensor, _, b)) if b.id == building_id => Some(sensor),
                    _ => return Err(RoomwatchError::UnknownSensor(id.to_string())),
                },
                None => None,
            };

            let window = TimeWindow::trailing(now, self.config.trailing_window);
            tracing::debug!(
                "Dashboard for '{}' (sensor {:?}) over {} .. {}",
                building_id,
                sensor_id,
                window.start,
                window.end
            );

            let series = async {
                match selected {
                    Some(sensor) => self.sensor_series(sensor, window).await.map(Some),
                    None => Ok::<_, RoomwatchError>(None),
                }
            };
            let (series, stats) =
                tokio::try_join!(series, self.stats.stats(building_id, window))?;

            Ok(BuildingDashboard {
                building: building.clone(),
                window,
                sensors: catalog.sensors_in(building_id).into_iter().cloned().collect(),
                series,
                stats,
            })
        })
        .await
    }

    async fn sensor_series(&self, sensor: &Sensor, window: TimeWindow) -> Result<SensorSeries> {
        let points = self.series.series(&sensor.id, window).await?;
        Ok(SensorSeries {
            sensor_id: sensor.id.clone(),
            sensor_type: sensor.sensor_type.clone(),
            unit: sensor.unit.clone(),
            points,
        })
    }

    /// Apply the query timeout and log failures the caller cannot fix
    async fn bounded<T, F>(&self, operation: &str, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let limit = self.config.timeout;
        match tokio::time::timeout(limit, request).await {
            Ok(Err(RoomwatchError::StoreUnavailable(reason))) => {
                tracing::warn!("{} failed, store unavailable: {}", operation, reason);
                Err(RoomwatchError::StoreUnavailable(reason))
            }
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("{} timed out after {:?}", operation, limit);
                Err(RoomwatchError::Timeout(limit))
            }
        }
    }
}

fn require_building<'a>(catalog: &'a Catalog, building_id: &str) -> Result<&'a Building> {
    catalog
        .building(building_id)
        .ok_or_else(|| RoomwatchError::UnknownBuilding(building_id.to_string()))
}
