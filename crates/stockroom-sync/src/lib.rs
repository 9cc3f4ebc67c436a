//! stockroom-sync - Offline-first synchronization engine for Stockroom
//!
//! Keeps a local libSQL store usable while the remote store is unreachable,
//! propagates local changes as they happen, queues them while offline and
//! reconciles both stores with last-write-wins on reconnection.

pub mod audit;
pub mod config;
pub mod conflict;
pub mod connectivity;
pub mod db;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod health;
pub mod models;
pub mod orchestrator;
pub mod queue;
pub mod schema;
pub mod upsert;
mod util;

#[cfg(test)]
mod tests;

pub use config::{ConfigError, SyncEngineConfig};
pub use conflict::Side;
pub use connectivity::{ConnectivityMonitor, ConnectivityStatus};
pub use engine::{EngineComponents, EngineStatus, SyncEngine};
pub use error::{Error, Result, StoreError, StoreResult};
pub use models::{Record, SyncOperation, SyncQueueItem};
pub use schema::SchemaRegistry;
