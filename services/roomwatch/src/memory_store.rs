//! Append-only in-memory measurement store
//!
//! Seeded from a JSON snapshot and extended through [`MemoryStore::append`],
//! which stands in for the external ingestion pipeline.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::latest::latest_by_sensor;
use crate::model::{Building, Measurement, Reading, Room, Sensor, TimeWindow};
use crate::store::{BuildingRow, CatalogSource, MeasurementStore};
use crate::{Result, RoomwatchError};

/// On-disk snapshot used to seed a [`MemoryStore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub buildings: Vec<Building>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub sensors: Vec<Sensor>,
    #[serde(default)]
    pub measurements: Vec<Reading>,
}

impl Seed {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RoomwatchError::Config(format!("Failed to read seed file {:?}: {}", path, e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    catalog: Catalog,
    measurements: RwLock<Vec<Measurement>>,
}

impl MemoryStore {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            measurements: RwLock::new(Vec::new()),
        }
    }

    /// Build a store from a seed, appending its readings in file order
    pub fn from_seed(seed: Seed) -> Result<Self> {
        let catalog = Catalog::new(seed.buildings, seed.rooms, seed.sensors)?;
        let store = Self::new(catalog);
        for reading in seed.measurements {
            store.append(reading)?;
        }
        Ok(store)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let store = Self::from_seed(Seed::load(path)?)?;
        tracing::info!("Loaded {} readings from seed {:?}", store.len(), path);
        Ok(store)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Store a reading and return it with its assigned sequence number.
    ///
    /// Readings for sensors missing from the catalog are rejected.
    pub fn append(&self, reading: Reading) -> Result<Measurement> {
        let sensor = self
            .catalog
            .sensor(&reading.sensor_id)
            .ok_or_else(|| RoomwatchError::UnknownSensor(reading.sensor_id.clone()))?;

        let mut measurements = self
            .measurements
            .write()
            .map_err(|_| RoomwatchError::StoreUnavailable("measurement lock poisoned".into()))?;

        let measurement = Measurement {
            sequence: measurements.len() as u64 + 1,
            unit: reading.unit.unwrap_or_else(|| sensor.unit.clone()),
            sensor_id: reading.sensor_id,
            value: reading.value,
            timestamp: reading.timestamp,
        };
        measurements.push(measurement.clone());
        Ok(measurement)
    }

    pub fn len(&self) -> usize {
        self.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Measurement>>> {
        self.measurements
            .read()
            .map_err(|_| RoomwatchError::StoreUnavailable("measurement lock poisoned".into()))
    }
}

fn ascending(mut rows: Vec<Measurement>) -> Vec<Measurement> {
    rows.sort_by_key(Measurement::recency);
    rows
}

#[async_trait]
impl MeasurementStore for MemoryStore {
    async fn fetch_latest_per_sensor(
        &self,
        sensor_ids: &[String],
    ) -> Result<HashMap<String, Measurement>> {
        let wanted: HashSet<&str> = sensor_ids.iter().map(String::as_str).collect();
        let measurements = self.read()?;
        Ok(latest_by_sensor(
            measurements
                .iter()
                .filter(|m| wanted.contains(m.sensor_id.as_str())),
        ))
    }

    async fn fetch_range(
        &self,
        sensor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Measurement>> {
        let window = TimeWindow::new(start, end);
        let rows: Vec<Measurement> = self
            .read()?
            .iter()
            .filter(|m| m.sensor_id == sensor_id && window.contains(m.timestamp))
            .cloned()
            .collect();
        Ok(ascending(rows))
    }

    async fn fetch_range_for_building(
        &self,
        building_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BuildingRow>> {
        let window = TimeWindow::new(start, end);
        let located: HashMap<&str, (&Sensor, &Room)> = self
            .catalog
            .sensors_in(building_id)
            .into_iter()
            .filter_map(|s| Some((s.id.as_str(), (s, self.catalog.room(&s.room_id)?))))
            .collect();

        let rows = ascending(
            self.read()?
                .iter()
                .filter(|m| {
                    located.contains_key(m.sensor_id.as_str()) && window.contains(m.timestamp)
                })
                .cloned()
                .collect(),
        );

        Ok(rows
            .into_iter()
            .filter_map(|measurement| {
                let (sensor, room) = located.get(measurement.sensor_id.as_str())?;
                Some(BuildingRow {
                    sensor: (*sensor).clone(),
                    room: (*room).clone(),
                    measurement,
                })
            })
            .collect())
    }
}

#[async_trait]
impl CatalogSource for MemoryStore {
    async fn load_catalog(&self) -> Result<Catalog> {
        Ok(self.catalog.clone())
    }
}
