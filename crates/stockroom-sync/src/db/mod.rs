//! Storage layer: libSQL connections, schema creation and record access

mod classify;
mod connection;
pub mod migrations;
mod store;

pub use classify::classify;
pub use connection::{Database, RemoteConfig};
pub use store::{LibSqlStore, SyncStore, WriteGuard};
