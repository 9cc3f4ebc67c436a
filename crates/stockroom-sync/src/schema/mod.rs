//! Static mapping between entities and physical tables

pub mod entities;
mod registry;

pub use entities::standard_entities;
pub use registry::{ColumnDef, ColumnType, EntityDescriptor, ReplicationMode, SchemaRegistry};
