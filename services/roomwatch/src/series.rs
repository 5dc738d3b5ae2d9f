//! Per-minute time series for one sensor
//!
//! Readings are truncated to the start of their minute and averaged per
//! minute. Only minutes that received at least one reading appear in the
//! output, which is always in ascending time order.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Measurement, TimeWindow};
use crate::store::MeasurementStore;

const SECONDS_PER_MINUTE: i64 = 60;

/// Start of the minute containing `timestamp`
pub fn minute_bucket(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    let seconds = timestamp.timestamp().div_euclid(SECONDS_PER_MINUTE) * SECONDS_PER_MINUTE;
    DateTime::from_timestamp(seconds, 0).unwrap_or(timestamp)
}

/// One populated minute of a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub bucket_start: DateTime<Utc>,
    pub average: f64,
    pub unit: String,
    pub samples: u32,
}

#[derive(Debug)]
struct Bucket {
    sum: f64,
    count: u32,
    unit: String,
}

/// Bucket readings by minute and average each bucket.
///
/// Readings outside `window` are ignored; an inverted window yields nothing.
pub fn aggregate_minutes<'a, I>(measurements: I, window: &TimeWindow) -> Vec<SeriesPoint>
where
    I: IntoIterator<Item = &'a Measurement>,
{
    if window.is_inverted() {
        return Vec::new();
    }

    let mut buckets: BTreeMap<DateTime<Utc>, Bucket> = BTreeMap::new();
    for m in measurements {
        if !window.contains(m.timestamp) {
            continue;
        }
        let bucket = buckets
            .entry(minute_bucket(m.timestamp))
            .or_insert_with(|| Bucket {
                sum: 0.0,
                count: 0,
                unit: m.unit.clone(),
            });
        bucket.sum += m.value;
        bucket.count += 1;
    }

    buckets
        .into_iter()
        .map(|(bucket_start, b)| SeriesPoint {
            bucket_start,
            average: b.sum / f64::from(b.count),
            unit: b.unit,
            samples: b.count,
        })
        .collect()
}

/// Produces per-minute series from the measurement store
#[derive(Clone)]
pub struct SeriesAggregator {
    store: Arc<dyn MeasurementStore>,
}

impl SeriesAggregator {
    pub fn new(store: Arc<dyn MeasurementStore>) -> Self {
        Self { store }
    }

    pub async fn series(
        &self,
        sensor_id: &str,
        window: TimeWindow,
    ) -> crate::Result<Vec<SeriesPoint>> {
        if window.is_inverted() {
            tracing::debug!(
                "Series for '{}' requested with inverted window {} > {}",
                sensor_id,
                window.start,
                window.end
            );
            return Ok(Vec::new());
        }

        let measurements = self
            .store
            .fetch_range(sensor_id, window.start, window.end)
            .await?;
        let points = aggregate_minutes(&measurements, &window);

        tracing::debug!(
            "Series for '{}': {} readings -> {} minute buckets",
            sensor_id,
            measurements.len(),
            points.len()
        );
        Ok(points)
    }
}
