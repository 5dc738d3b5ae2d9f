//! BDD test world for roomwatch service

use std::collections::HashMap;
use std::sync::Arc;

use cucumber::World;
use roomwatch::memory_store::{MemoryStore, Seed};
use roomwatch::model::Measurement;
use roomwatch::query::{BuildingDashboard, OverviewRow};
use roomwatch::series::SeriesPoint;
use roomwatch::stats::RoomStats;
use roomwatch::{QueryConfig, QueryService, RoomwatchError};

#[derive(Debug, Default, World)]
pub struct RoomwatchWorld {
    // Reference data and readings, loaded into a fresh store per query
    pub seed: Seed,

    // Query results
    pub latest: Option<HashMap<String, Option<Measurement>>>,
    pub series: Option<Vec<SeriesPoint>>,
    pub stats: Option<RoomStats>,
    pub overview: Option<Vec<OverviewRow>>,
    pub dashboard: Option<BuildingDashboard>,
    pub error: Option<RoomwatchError>,

    // HTTP API testing
    pub response_status: Option<u16>,
    pub response_json: Option<serde_json::Value>,
}

impl RoomwatchWorld {
    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::new(MemoryStore::from_seed(self.seed.clone()).expect("seed should be consistent"))
    }

    pub fn queries(&self) -> QueryService {
        let store = self.store();
        QueryService::new(store.clone(), store, QueryConfig::default())
    }
}
