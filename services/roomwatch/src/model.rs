//! Reference data, measurements and query windows

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// A building of the deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    pub id: String,
    pub name: String,
}

/// A room; its id is also its display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub building_id: String,
    #[serde(default)]
    pub capacity: u32,
    #[serde(rename = "type", default)]
    pub room_type: String,
}

/// A sensor installed in exactly one room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub unit: String,
    pub room_id: String,
}

/// One stored reading.
///
/// `sequence` is assigned by the store on insertion and only ever grows, so
/// `(timestamp, sequence)` is a total order over a sensor's readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub sequence: u64,
    pub sensor_id: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub unit: String,
}

impl Measurement {
    /// Key used to decide which of two readings is the more recent
    pub fn recency(&self) -> (DateTime<Utc>, u64) {
        (self.timestamp, self.sequence)
    }
}

/// A reading as delivered by the ingestion side, before the store has
/// assigned it a sequence number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    /// Falls back to the sensor's catalog unit when absent
    #[serde(default)]
    pub unit: Option<String>,
}

/// Inclusive-inclusive time range scoping a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// `[now - length, now]`
    pub fn trailing(now: DateTime<Utc>, length: Duration) -> Self {
        let length = TimeDelta::from_std(length).unwrap_or(TimeDelta::MAX);
        let start = now
            .checked_sub_signed(length)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end: now }
    }

    /// A window whose start lies after its end selects nothing
    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}
