//! Entity-to-table mapping and dependency order

use std::collections::{HashMap, HashSet};

use crate::conflict::Side;
use crate::error::{Error, Result};
use crate::models::{CREATED_AT_COLUMN, DELETED_AT_COLUMN, ID_COLUMN, UPDATED_AT_COLUMN};

/// Storage class of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
}

impl ColumnType {
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
        }
    }
}

/// A replicated column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnType,
    pub nullable: bool,
    /// Internal name of the entity this column points at
    pub references: Option<&'static str>,
}

impl ColumnDef {
    pub const fn new(name: &'static str, kind: ColumnType) -> Self {
        Self {
            name,
            kind,
            nullable: false,
            references: None,
        }
    }

    pub const fn optional(name: &'static str, kind: ColumnType) -> Self {
        Self {
            name,
            kind,
            nullable: true,
            references: None,
        }
    }

    #[must_use]
    pub const fn references(mut self, entity: &'static str) -> Self {
        self.references = Some(entity);
        self
    }
}

/// Which ways an entity replicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationMode {
    Bidirectional,
    /// Local to remote only. Remote rows never overwrite local ones outside
    /// of a rebuild, so accounts created offline are not clobbered.
    PushOnly,
}

/// Static sync configuration for one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Name the surrounding application uses, e.g. `Product`
    pub internal_name: &'static str,
    /// Physical table in the local store
    pub local_table: &'static str,
    /// Physical table in the remote store
    pub remote_table: &'static str,
    /// Position in the foreign-key topological order
    pub dependency_rank: u32,
    /// Business columns, excluding identity and timestamps
    pub columns: &'static [ColumnDef],
    pub mode: ReplicationMode,
    /// Must hold at least one row for the local store to count as valid
    pub critical: bool,
}

const ID: ColumnDef = ColumnDef::new(ID_COLUMN, ColumnType::Text);
const CREATED_AT: ColumnDef = ColumnDef::new(CREATED_AT_COLUMN, ColumnType::Integer);
const UPDATED_AT: ColumnDef = ColumnDef::new(UPDATED_AT_COLUMN, ColumnType::Integer);
const DELETED_AT: ColumnDef = ColumnDef::optional(DELETED_AT_COLUMN, ColumnType::Integer);

impl EntityDescriptor {
    /// Every replicated column in table order
    pub fn all_columns(&self) -> Vec<ColumnDef> {
        let mut columns = Vec::with_capacity(self.columns.len() + 4);
        columns.push(ID);
        columns.extend_from_slice(self.columns);
        columns.extend([CREATED_AT, UPDATED_AT, DELETED_AT]);
        columns
    }

    /// `(column, referenced entity)` pairs
    pub fn foreign_keys(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.columns
            .iter()
            .filter_map(|column| column.references.map(|entity| (column.name, entity)))
    }

    pub fn pulls_from_remote(&self) -> bool {
        self.mode == ReplicationMode::Bidirectional
    }

    /// Physical table name on the given side
    pub const fn table_for(&self, side: Side) -> &'static str {
        match side {
            Side::Local => self.local_table,
            Side::Remote => self.remote_table,
        }
    }
}

/// Validated, dependency-ordered set of entity descriptors.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    entities: Vec<EntityDescriptor>,
    by_name: HashMap<&'static str, usize>,
}

impl SchemaRegistry {
    /// Validate and order the given descriptors.
    ///
    /// Fails when names or ranks collide, when a foreign key references an
    /// unregistered entity, or when a referenced entity does not rank
    /// strictly lower than the entity referencing it.
    pub fn new(mut entities: Vec<EntityDescriptor>) -> Result<Self> {
        entities.sort_by_key(|entity| entity.dependency_rank);

        let mut by_name = HashMap::new();
        let mut local_tables = HashSet::new();
        let mut remote_tables = HashSet::new();
        let mut ranks = HashSet::new();
        let mut critical = None;

        for (index, entity) in entities.iter().enumerate() {
            if by_name.insert(entity.internal_name, index).is_some() {
                return Err(Error::Registry(format!(
                    "entity '{}' registered twice",
                    entity.internal_name
                )));
            }
            if !local_tables.insert(entity.local_table) {
                return Err(Error::Registry(format!(
                    "local table '{}' mapped twice",
                    entity.local_table
                )));
            }
            if !remote_tables.insert(entity.remote_table) {
                return Err(Error::Registry(format!(
                    "remote table '{}' mapped twice",
                    entity.remote_table
                )));
            }
            if !ranks.insert(entity.dependency_rank) {
                return Err(Error::Registry(format!(
                    "dependency rank {} used twice",
                    entity.dependency_rank
                )));
            }
            if entity.critical {
                if let Some(previous) = critical.replace(entity.internal_name) {
                    return Err(Error::Registry(format!(
                        "both '{previous}' and '{}' are marked critical",
                        entity.internal_name
                    )));
                }
            }
        }

        for entity in &entities {
            for (column, target) in entity.foreign_keys() {
                let Some(&target_index) = by_name.get(target) else {
                    return Err(Error::Registry(format!(
                        "{}.{column} references unregistered entity '{target}'",
                        entity.internal_name
                    )));
                };
                if entities[target_index].dependency_rank >= entity.dependency_rank {
                    return Err(Error::Registry(format!(
                        "{}.{column} references '{target}' which does not rank lower",
                        entity.internal_name
                    )));
                }
            }
        }

        Ok(Self { entities, by_name })
    }

    /// Entities in ascending dependency order
    pub fn ordered(&self) -> &[EntityDescriptor] {
        &self.entities
    }

    /// Entities that accept remote changes, in ascending dependency order
    pub fn pull_order(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.iter().filter(|entity| entity.pulls_from_remote())
    }

    /// Critical entity first, then every other entity in dependency order
    pub fn rebuild_order(&self) -> Vec<&EntityDescriptor> {
        let mut order: Vec<&EntityDescriptor> = self.critical().into_iter().collect();
        order.extend(self.entities.iter().filter(|entity| !entity.critical));
        order
    }

    pub fn critical(&self) -> Option<&EntityDescriptor> {
        self.entities.iter().find(|entity| entity.critical)
    }

    /// Look up an entity by its internal name
    pub fn get(&self, internal_name: &str) -> Result<&EntityDescriptor> {
        self.by_name
            .get(internal_name)
            .map(|&index| &self.entities[index])
            .ok_or_else(|| Error::UnknownEntity(internal_name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARENT_COLUMNS: &[ColumnDef] = &[ColumnDef::new("name", ColumnType::Text)];
    const CHILD_COLUMNS: &[ColumnDef] =
        &[ColumnDef::new("parent_id", ColumnType::Text).references("Parent")];

    fn descriptor(
        name: &'static str,
        table: &'static str,
        rank: u32,
        columns: &'static [ColumnDef],
    ) -> EntityDescriptor {
        EntityDescriptor {
            internal_name: name,
            local_table: table,
            remote_table: table,
            dependency_rank: rank,
            columns,
            mode: ReplicationMode::Bidirectional,
            critical: false,
        }
    }

    #[test]
    fn registry_orders_by_rank() {
        let registry = SchemaRegistry::new(vec![
            descriptor("Child", "children", 1, CHILD_COLUMNS),
            descriptor("Parent", "parents", 0, PARENT_COLUMNS),
        ])
        .unwrap();
        let names: Vec<_> = registry.ordered().iter().map(|e| e.internal_name).collect();
        assert_eq!(names, vec!["Parent", "Child"]);
    }

    #[test]
    fn registry_rejects_reference_to_higher_rank() {
        let error = SchemaRegistry::new(vec![
            descriptor("Child", "children", 0, CHILD_COLUMNS),
            descriptor("Parent", "parents", 1, PARENT_COLUMNS),
        ])
        .unwrap_err();
        assert!(error.to_string().contains("does not rank lower"));
    }

    #[test]
    fn registry_rejects_unregistered_reference() {
        let error =
            SchemaRegistry::new(vec![descriptor("Child", "children", 1, CHILD_COLUMNS)])
                .unwrap_err();
        assert!(error.to_string().contains("unregistered entity 'Parent'"));
    }

    #[test]
    fn registry_rejects_duplicate_rank() {
        let error = SchemaRegistry::new(vec![
            descriptor("Parent", "parents", 0, PARENT_COLUMNS),
            descriptor("Other", "others", 0, PARENT_COLUMNS),
        ])
        .unwrap_err();
        assert!(error.to_string().contains("rank 0"));
    }

    #[test]
    fn unknown_entity_lookup_fails() {
        let registry =
            SchemaRegistry::new(vec![descriptor("Parent", "parents", 0, PARENT_COLUMNS)]).unwrap();
        assert!(matches!(
            registry.get("Ghost"),
            Err(Error::UnknownEntity(name)) if name == "Ghost"
        ));
        assert_eq!(registry.get("Parent").unwrap().remote_table, "parents");
    }

    #[test]
    fn all_columns_wrap_business_columns() {
        let entity = descriptor("Child", "children", 1, CHILD_COLUMNS);
        let names: Vec<_> = entity.all_columns().iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            vec!["id", "parent_id", "created_at", "updated_at", "deleted_at"]
        );
        assert_eq!(
            entity.foreign_keys().collect::<Vec<_>>(),
            vec![("parent_id", "Parent")]
        );
    }
}
