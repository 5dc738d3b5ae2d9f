//! Measurement store abstraction for dependency injection
//!
//! The aggregation core only reads through these traits. Concrete adapters
//! live in [`crate::memory_store`] and [`crate::sqlite_store`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::model::{Measurement, Room, Sensor};

/// One measurement joined with the sensor and room it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingRow {
    pub measurement: Measurement,
    pub sensor: Sensor,
    pub room: Room,
}

/// Read-only access to persisted readings.
///
/// Range bounds are inclusive at both ends. Implementations report
/// infrastructure failures as [`crate::RoomwatchError::StoreUnavailable`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Most recent reading of each requested sensor; sensors without
    /// readings are simply missing from the map
    async fn fetch_latest_per_sensor(
        &self,
        sensor_ids: &[String],
    ) -> crate::Result<HashMap<String, Measurement>>;

    /// Readings of one sensor in `[start, end]`, ascending by timestamp
    async fn fetch_range(
        &self,
        sensor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> crate::Result<Vec<Measurement>>;

    /// Readings of every sensor located in a building, in `[start, end]`,
    /// ascending by timestamp
    async fn fetch_range_for_building(
        &self,
        building_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> crate::Result<Vec<BuildingRow>>;
}

/// Source of the building / room / sensor reference set
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn load_catalog(&self) -> crate::Result<Catalog>;
}
