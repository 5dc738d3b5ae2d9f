//! Room-level statistics for a building
//!
//! Rows are stable-sorted by room then sensor and partitioned into runs, so
//! the output order never depends on hash iteration.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::model::TimeWindow;
use crate::store::{BuildingRow, MeasurementStore};

/// Running count / sum / min / max over a stream of values
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    count: u32,
    sum: f64,
    min: f64,
    max: f64,
}

impl Summary {
    pub fn new(first: f64) -> Self {
        Self {
            count: 1,
            sum: first,
            min: first,
            max: first,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.sum / f64::from(self.count)
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// `None` for an empty input
    pub fn of<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        let mut values = values.into_iter();
        let mut summary = Summary::new(values.next()?);
        for v in values {
            summary.push(v);
        }
        Some(summary)
    }
}

/// Aggregates of one sensor over a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorStats {
    pub sensor_id: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub unit: String,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub samples: u32,
}

/// Room id -> sensors of that room ordered by sensor id.
///
/// Only rooms with at least one reading in the window are present.
pub type RoomStats = BTreeMap<String, Vec<SensorStats>>;

/// Group building rows into per-room, per-sensor statistics.
///
/// Rows outside `window` are dropped before grouping.
pub fn group_by_room(mut rows: Vec<BuildingRow>, window: &TimeWindow) -> RoomStats {
    rows.retain(|r| window.contains(r.measurement.timestamp));
    rows.sort_by(|a, b| {
        a.room
            .id
            .cmp(&b.room.id)
            .then_with(|| a.sensor.id.cmp(&b.sensor.id))
    });

    let mut stats = RoomStats::new();
    for room_rows in rows.chunk_by(|a, b| a.room.id == b.room.id) {
        let sensors: Vec<SensorStats> = room_rows
            .chunk_by(|a, b| a.sensor.id == b.sensor.id)
            .filter_map(|sensor_rows| {
                let sensor = &sensor_rows.first()?.sensor;
                let summary = Summary::of(sensor_rows.iter().map(|r| r.measurement.value))?;
                Some(SensorStats {
                    sensor_id: sensor.id.clone(),
                    sensor_type: sensor.sensor_type.clone(),
                    unit: sensor.unit.clone(),
                    avg: summary.mean(),
                    min: summary.min(),
                    max: summary.max(),
                    samples: summary.count(),
                })
            })
            .collect();

        if let Some(first) = room_rows.first() {
            stats.insert(first.room.id.clone(), sensors);
        }
    }
    stats
}

/// Computes grouped statistics from the measurement store
#[derive(Clone)]
pub struct StatsEngine {
    store: Arc<dyn MeasurementStore>,
}

impl StatsEngine {
    pub fn new(store: Arc<dyn MeasurementStore>) -> Self {
        Self { store }
    }

    pub async fn stats(&self, building_id: &str, window: TimeWindow) -> crate::Result<RoomStats> {
        if window.is_inverted() {
            tracing::debug!(
                "Stats for '{}' requested with inverted window {} > {}",
                building_id,
                window.start,
                window.end
            );
            return Ok(RoomStats::new());
        }

        let rows = self
            .store
            .fetch_range_for_building(building_id, window.start, window.end)
            .await?;
        let row_count = rows.len();
        let stats = group_by_room(rows, &window);

        tracing::debug!(
            "Stats for '{}': {} readings across {} rooms",
            building_id,
            row_count,
            stats.len()
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Measurement, Room, Sensor};
    use crate::store::MockMeasurementStore;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, m, 0).unwrap()
    }

    fn row(room: &str, sensor: &str, sequence: u64, value: f64, ts: DateTime<Utc>) -> BuildingRow {
        BuildingRow {
            measurement: Measurement {
                sequence,
                sensor_id: sensor.to_string(),
                value,
                timestamp: ts,
                unit: "°C".to_string(),
            },
            sensor: Sensor {
                id: sensor.to_string(),
                sensor_type: "temperature".to_string(),
                unit: "°C".to_string(),
                room_id: room.to_string(),
            },
            room: Room {
                id: room.to_string(),
                building_id: "B".to_string(),
                capacity: 24,
                room_type: "lab".to_string(),
            },
        }
    }

    #[test]
    fn summary_tracks_min_max_mean() {
        let summary = Summary::of([5.0, 1.0, 9.0]).unwrap();
        assert_eq!(summary.min(), 1.0);
        assert_eq!(summary.max(), 9.0);
        assert_eq!(summary.mean(), 5.0);
        assert_eq!(summary.count(), 3);
        assert!(Summary::of(std::iter::empty()).is_none());
    }

    #[test]
    fn groups_are_ordered_by_room_then_sensor() {
        let window = TimeWindow::new(at(0), at(59));
        let rows = vec![
            row("R2", "s-b", 1, 1.0, at(1)),
            row("R1", "s-z", 2, 2.0, at(2)),
            row("R2", "s-a", 3, 3.0, at(3)),
            row("R1", "s-c", 4, 4.0, at(4)),
            row("R2", "s-b", 5, 5.0, at(5)),
        ];

        let stats = group_by_room(rows, &window);
        let rooms: Vec<_> = stats.keys().cloned().collect();
        assert_eq!(rooms, vec!["R1", "R2"]);

        let r1: Vec<_> = stats["R1"].iter().map(|s| s.sensor_id.as_str()).collect();
        assert_eq!(r1, vec!["s-c", "s-z"]);
        let r2: Vec<_> = stats["R2"].iter().map(|s| s.sensor_id.as_str()).collect();
        assert_eq!(r2, vec!["s-a", "s-b"]);

        let s_b = &stats["R2"][1];
        assert_eq!(s_b.samples, 2);
        assert_eq!(s_b.avg, 3.0);
    }

    #[test]
    fn readings_outside_window_do_not_count() {
        let window = TimeWindow::new(at(10), at(20));
        let rows = vec![
            row("R1", "s1", 1, 5.0, at(10)),
            row("R1", "s1", 2, 1.0, at(15)),
            row("R1", "s1", 3, 9.0, at(20)),
            row("R1", "s1", 4, 1000.0, at(21)),
            row("R9", "s9", 5, 7.0, at(5)),
        ];

        let stats = group_by_room(rows, &window);
        assert_eq!(stats.len(), 1);
        let s1 = &stats["R1"][0];
        assert_eq!((s1.min, s1.max, s1.avg), (1.0, 9.0, 5.0));
    }

    #[test]
    fn sensor_type_serializes_as_type() {
        let window = TimeWindow::new(at(0), at(59));
        let stats = group_by_room(vec![row("R1", "s1", 1, 1.0, at(1))], &window);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["R1"][0]["type"], "temperature");
        assert_eq!(json["R1"][0]["sensor_id"], "s1");
    }

    #[tokio::test]
    async fn stats_propagates_store_failure() {
        let mut store = MockMeasurementStore::new();
        store
            .expect_fetch_range_for_building()
            .returning(|_, _, _| Err(crate::RoomwatchError::StoreUnavailable("down".to_string())));

        let engine = StatsEngine::new(Arc::new(store));
        let err = engine
            .stats("B", TimeWindow::new(at(0), at(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::RoomwatchError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn stats_twice_is_identical() {
        let mut store = MockMeasurementStore::new();
        store.expect_fetch_range_for_building().returning(|_, _, _| {
            Ok(vec![
                row("R1", "s1", 1, 22.0, at(0)),
                row("R1", "s1", 2, 24.0, at(0)),
                row("R1", "s1", 3, 26.0, at(1)),
            ])
        });

        let engine = StatsEngine::new(Arc::new(store));
        let window = TimeWindow::new(at(0), at(5));
        let first = engine.stats("B", window).await.unwrap();
        let second = engine.stats("B", window).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first["R1"][0].avg, 24.0);
    }
}
