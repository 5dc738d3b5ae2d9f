//! Roomwatch - building sensor analytics service
//!
//! Serves latest readings, per-minute series and per-room statistics of a
//! building sensor deployment as a JSON API.

pub mod catalog;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod latest;
pub mod memory_store;
pub mod model;
pub mod query;
pub mod series;
pub mod sqlite_store;
pub mod stats;
pub mod store;

pub use config::{load_config, Config, QueryConfig, ServerConfig, StoreConfig};
pub use error::{Result, RoomwatchError};
pub use query::QueryService;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::memory_store::MemoryStore;
use crate::sqlite_store::SqliteStore;
use crate::store::{CatalogSource, MeasurementStore};

/// Store handles shared by the query façade
pub type StoreHandles = (Arc<dyn MeasurementStore>, Arc<dyn CatalogSource>);

/// Open the configured measurement store
pub fn open_store(config: &StoreConfig) -> Result<StoreHandles> {
    match config {
        StoreConfig::Memory { seed_path } => {
            let store = match seed_path {
                Some(path) => MemoryStore::load(path)?,
                None => {
                    tracing::info!("Starting with an empty in-memory store");
                    MemoryStore::new(catalog::Catalog::default())
                }
            };
            let store = Arc::new(store);
            let measurements: Arc<dyn MeasurementStore> = store.clone();
            Ok((measurements, store))
        }
        StoreConfig::Sqlite { path } => {
            let store = Arc::new(SqliteStore::open(path)?);
            let measurements: Arc<dyn MeasurementStore> = store.clone();
            Ok((measurements, store))
        }
    }
}

/// Builder for the roomwatch HTTP service
pub struct RoomwatchBuilder {
    config: Config,
    stores: Option<StoreHandles>,
    cancel: CancellationToken,
}

impl RoomwatchBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            stores: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an already opened store instead of the configured one
    pub fn with_store(
        mut self,
        store: Arc<dyn MeasurementStore>,
        catalogs: Arc<dyn CatalogSource>,
    ) -> Self {
        self.stores = Some((store, catalogs));
        self
    }

    /// Stop the server when this token is cancelled instead of on Ctrl-C
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Open the store and bind the listener
    pub async fn build(self) -> Result<BoundServer> {
        self.config.validate()?;

        let (store, catalogs) = match self.stores {
            Some(stores) => stores,
            None => {
                tracing::debug!("Opening {} store", self.config.store.type_name());
                open_store(&self.config.store)?
            }
        };
        let queries = Arc::new(QueryService::new(store, catalogs, self.config.query.clone()));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.server.port));
        let listener = TcpListener::bind(addr).await?;
        let listen_addr = listener.local_addr()?;
        tracing::info!("Roomwatch API bound to http://{}", listen_addr);

        Ok(BoundServer {
            listener,
            listen_addr,
            router: dashboard::build_router(queries),
            cancel: self.cancel,
        })
    }
}

/// A bound but not yet serving API server
pub struct BoundServer {
    listener: TcpListener,
    listen_addr: SocketAddr,
    router: axum::Router,
    cancel: CancellationToken,
}

impl BoundServer {
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    /// Serve until Ctrl-C or until the cancellation token fires
    pub async fn start(self) -> Result<()> {
        let cancel_for_signal = self.cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                    cancel_for_signal.cancel();
                }
                Err(e) => tracing::warn!("Failed to listen for ctrl-c: {}", e),
            }
        });

        let cancel = self.cancel;
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
            })
            .await?;

        tracing::info!("Roomwatch API stopped");
        Ok(())
    }
}
