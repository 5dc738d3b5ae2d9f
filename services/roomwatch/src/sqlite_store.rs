//! SQLite-backed measurement store
//!
//! Reads an existing database with the tables `buildings`, `rooms`,
//! `sensors` and `measurements`. Timestamps are stored as UTC nanoseconds
//! since the epoch; the `measurements.id` autoincrement column is the
//! insertion sequence.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, InterruptHandle, OptionalExtension, Row};

use crate::catalog::Catalog;
use crate::memory_store::Seed;
use crate::model::{Building, Measurement, Reading, Room, Sensor};
use crate::store::{BuildingRow, CatalogSource, MeasurementStore};
use crate::{Result, RoomwatchError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS buildings (
        id   TEXT PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS rooms (
        id          TEXT PRIMARY KEY,
        building_id TEXT NOT NULL REFERENCES buildings(id),
        capacity    INTEGER NOT NULL DEFAULT 0,
        type        TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS sensors (
        id      TEXT PRIMARY KEY,
        type    TEXT NOT NULL,
        unit    TEXT NOT NULL,
        room_id TEXT NOT NULL REFERENCES rooms(id)
    );
    CREATE TABLE IF NOT EXISTS measurements (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        sensor_id TEXT NOT NULL REFERENCES sensors(id),
        value     REAL NOT NULL,
        ts_ns     INTEGER NOT NULL,
        unit      TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_measurements_sensor_ts
        ON measurements(sensor_id, ts_ns);
";

const MEASUREMENT_COLUMNS: &str = "m.id, m.sensor_id, m.value, m.ts_ns, m.unit";

/// Sensor ids bound per latest-reading query, well below SQLite's
/// host parameter limit
const MAX_IDS_PER_QUERY: usize = 500;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
}

/// Interrupts the running statement if the awaiting query is dropped, so an
/// abandoned query gives the connection back instead of running to the end
struct AbandonGuard {
    interrupt: Arc<InterruptHandle>,
    abandoned: Arc<AtomicBool>,
    armed: bool,
}

impl AbandonGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if self.armed {
            self.abandoned.store(true, Ordering::SeqCst);
            self.interrupt.interrupt();
            tracing::debug!("Interrupted abandoned SQLite query");
        }
    }
}

impl SqliteStore {
    /// Open (and if needed initialise) a database file
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        tracing::info!("Opened SQLite measurement store {:?}", path);
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        let interrupt = Arc::new(conn.get_interrupt_handle());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
        })
    }

    /// Insert reference data and readings from a seed snapshot.
    ///
    /// Seed entries may refer to reference data already in the database;
    /// seed rows replace stored rows with the same id.
    pub async fn import_seed(&self, seed: Seed) -> Result<usize> {
        // Validate references before touching the database
        let existing = self.load_catalog().await?;
        let catalog = Catalog::new(
            existing
                .buildings()
                .cloned()
                .chain(seed.buildings.iter().cloned())
                .collect(),
            existing
                .rooms()
                .cloned()
                .chain(seed.rooms.iter().cloned())
                .collect(),
            existing
                .sensors()
                .cloned()
                .chain(seed.sensors.iter().cloned())
                .collect(),
        )?;
        if let Some(orphan) = seed
            .measurements
            .iter()
            .find(|r| catalog.sensor(&r.sensor_id).is_none())
        {
            return Err(RoomwatchError::UnknownSensor(orphan.sensor_id.clone()));
        }

        let readings = seed
            .measurements
            .into_iter()
            .map(|r| Ok((r.sensor_id, r.value, to_nanos(r.timestamp)?, r.unit)))
            .collect::<Result<Vec<_>>>()?;
        let (buildings, rooms, sensors) = (seed.buildings, seed.rooms, seed.sensors);

        self.call(move |conn| {
            let tx = conn.transaction()?;
            for b in &buildings {
                tx.execute(
                    "INSERT OR REPLACE INTO buildings (id, name) VALUES (?1, ?2)",
                    params![b.id, b.name],
                )?;
            }
            for r in &rooms {
                tx.execute(
                    "INSERT OR REPLACE INTO rooms (id, building_id, capacity, type)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![r.id, r.building_id, r.capacity, r.room_type],
                )?;
            }
            for s in &sensors {
                tx.execute(
                    "INSERT OR REPLACE INTO sensors (id, type, unit, room_id)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![s.id, s.sensor_type, s.unit, s.room_id],
                )?;
            }
            let mut inserted = 0;
            for (sensor_id, value, ts_ns, unit) in &readings {
                inserted += tx.execute(
                    "INSERT INTO measurements (sensor_id, value, ts_ns, unit)
                     SELECT s.id, ?2, ?3, COALESCE(?4, s.unit) FROM sensors s WHERE s.id = ?1",
                    params![sensor_id, value, ts_ns, unit],
                )?;
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }

    /// Append one reading, returning it with its assigned sequence
    pub async fn append(&self, reading: Reading) -> Result<Measurement> {
        let ts_ns = to_nanos(reading.timestamp)?;
        let sensor_id = reading.sensor_id.clone();

        let stored = self
            .call(move |conn| {
                let unit: Option<String> = conn
                    .query_row(
                        "SELECT unit FROM sensors WHERE id = ?1",
                        params![reading.sensor_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(sensor_unit) = unit else {
                    return Ok(None);
                };
                let unit = reading.unit.unwrap_or(sensor_unit);
                conn.execute(
                    "INSERT INTO measurements (sensor_id, value, ts_ns, unit) VALUES (?1, ?2, ?3, ?4)",
                    params![reading.sensor_id, reading.value, ts_ns, unit],
                )?;
                Ok(Some(Measurement {
                    sequence: to_sequence(conn.last_insert_rowid()),
                    sensor_id: reading.sensor_id,
                    value: reading.value,
                    timestamp: reading.timestamp,
                    unit,
                }))
            })
            .await?;

        stored.ok_or(RoomwatchError::UnknownSensor(sensor_id))
    }

    /// Run a query on the blocking pool.
    ///
    /// Dropping the returned future interrupts the statement, or skips it if
    /// it has not reached the connection yet.
    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let abandoned = Arc::new(AtomicBool::new(false));
        let guard = AbandonGuard {
            interrupt: Arc::clone(&self.interrupt),
            abandoned: Arc::clone(&abandoned),
            armed: true,
        };

        let result = tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| RoomwatchError::StoreUnavailable("connection lock poisoned".into()))?;
            if abandoned.load(Ordering::SeqCst) {
                return Err(RoomwatchError::StoreUnavailable(
                    "query abandoned before it started".into(),
                ));
            }
            f(&mut conn).map_err(RoomwatchError::from)
        })
        .await;
        guard.disarm();

        result.map_err(|e| RoomwatchError::StoreUnavailable(format!("query task failed: {}", e)))?
    }
}

fn to_nanos(timestamp: DateTime<Utc>) -> Result<i64> {
    timestamp.timestamp_nanos_opt().ok_or_else(|| {
        RoomwatchError::StoreUnavailable(format!(
            "timestamp {} is outside the storable range",
            timestamp
        ))
    })
}

/// Range bounds may lie outside the storable range; clamp them instead of failing
fn clamp_nanos(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_nanos_opt().unwrap_or(if timestamp.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    })
}

fn to_sequence(rowid: i64) -> u64 {
    u64::try_from(rowid).unwrap_or_default()
}

fn measurement_from_row(row: &Row<'_>) -> rusqlite::Result<Measurement> {
    Ok(Measurement {
        sequence: to_sequence(row.get(0)?),
        sensor_id: row.get(1)?,
        value: row.get(2)?,
        timestamp: DateTime::from_timestamp_nanos(row.get(3)?),
        unit: row.get(4)?,
    })
}

#[async_trait]
impl MeasurementStore for SqliteStore {
    async fn fetch_latest_per_sensor(
        &self,
        sensor_ids: &[String],
    ) -> Result<HashMap<String, Measurement>> {
        if sensor_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let ids = sensor_ids.to_vec();

        self.call(move |conn| {
            let mut latest = HashMap::with_capacity(ids.len());
            for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
                let placeholders = vec!["?"; chunk.len()].join(", ");
                let mut stmt = conn.prepare_cached(&format!(
                    "SELECT {MEASUREMENT_COLUMNS} FROM (
                         SELECT *, ROW_NUMBER() OVER (
                             PARTITION BY sensor_id ORDER BY ts_ns DESC, id DESC
                         ) AS rn
                         FROM measurements
                         WHERE sensor_id IN ({placeholders})
                     ) AS m
                     WHERE m.rn = 1"
                ))?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), measurement_from_row)?;
                for m in rows {
                    let m = m?;
                    latest.insert(m.sensor_id.clone(), m);
                }
            }
            Ok(latest)
        })
        .await
    }

    async fn fetch_range(
        &self,
        sensor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Measurement>> {
        let sensor_id = sensor_id.to_string();
        let (start, end) = (clamp_nanos(start), clamp_nanos(end));

        self.call(move |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {MEASUREMENT_COLUMNS} FROM measurements m
                 WHERE m.sensor_id = ?1 AND m.ts_ns BETWEEN ?2 AND ?3
                 ORDER BY m.ts_ns, m.id"
            ))?;
            let rows = stmt
                .query_map(params![sensor_id, start, end], measurement_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })
        .await
    }

    async fn fetch_range_for_building(
        &self,
        building_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BuildingRow>> {
        let building_id = building_id.to_string();
        let (start, end) = (clamp_nanos(start), clamp_nanos(end));

        self.call(move |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {MEASUREMENT_COLUMNS},
                        s.type, s.unit, s.room_id,
                        r.building_id, r.capacity, r.type
                 FROM measurements m
                 JOIN sensors s ON s.id = m.sensor_id
                 JOIN rooms r ON r.id = s.room_id
                 WHERE r.building_id = ?1 AND m.ts_ns BETWEEN ?2 AND ?3
                 ORDER BY m.ts_ns, m.id"
            ))?;
            let rows = stmt.query_map(params![building_id, start, end], |row| {
                let measurement = measurement_from_row(row)?;
                let sensor = Sensor {
                    id: measurement.sensor_id.clone(),
                    sensor_type: row.get(5)?,
                    unit: row.get(6)?,
                    room_id: row.get(7)?,
                };
                let room = Room {
                    id: sensor.room_id.clone(),
                    building_id: row.get(8)?,
                    capacity: row.get(9)?,
                    room_type: row.get(10)?,
                };
                Ok(BuildingRow {
                    measurement,
                    sensor,
                    room,
                })
            })?;
            let rows = rows.collect::<rusqlite::Result<Vec<_>>>();
            rows
        })
        .await
    }
}

#[async_trait]
impl CatalogSource for SqliteStore {
    async fn load_catalog(&self) -> Result<Catalog> {
        let (buildings, rooms, sensors) = self
            .call(|conn| {
                let buildings = conn
                    .prepare("SELECT id, name FROM buildings")?
                    .query_map([], |row| {
                        Ok(Building {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                let rooms = conn
                    .prepare("SELECT id, building_id, capacity, type FROM rooms")?
                    .query_map([], |row| {
                        Ok(Room {
                            id: row.get(0)?,
                            building_id: row.get(1)?,
                            capacity: row.get(2)?,
                            room_type: row.get(3)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                let sensors = conn
                    .prepare("SELECT id, type, unit, room_id FROM sensors")?
                    .query_map([], |row| {
                        Ok(Sensor {
                            id: row.get(0)?,
                            sensor_type: row.get(1)?,
                            unit: row.get(2)?,
                            room_id: row.get(3)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok((buildings, rooms, sensors))
            })
            .await?;

        Catalog::new(buildings, rooms, sensors)
    }
}
