//! The replicated Stockroom entity set.
//!
//! Adding an entity to the application without registering it here silently
//! excludes it from replication.

use super::registry::{
    ColumnDef, ColumnType, EntityDescriptor, ReplicationMode, SchemaRegistry,
};
use crate::error::Result;

pub const USER: &str = "User";
pub const CATEGORY: &str = "Category";
pub const SUPPLIER: &str = "Supplier";
pub const CUSTOMER: &str = "Customer";
pub const PRODUCT: &str = "Product";
pub const SALE: &str = "Sale";
pub const SALE_ITEM: &str = "SaleItem";
pub const INVENTORY_MOVEMENT: &str = "InventoryMovement";
pub const REFUND: &str = "Refund";

const USER_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("username", ColumnType::Text),
    ColumnDef::optional("display_name", ColumnType::Text),
    ColumnDef::new("password_hash", ColumnType::Text),
    ColumnDef::new("role", ColumnType::Text),
];

const CATEGORY_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("name", ColumnType::Text),
    ColumnDef::optional("description", ColumnType::Text),
];

const SUPPLIER_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("name", ColumnType::Text),
    ColumnDef::optional("contact_email", ColumnType::Text),
    ColumnDef::optional("phone", ColumnType::Text),
];

const CUSTOMER_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("name", ColumnType::Text),
    ColumnDef::optional("email", ColumnType::Text),
    ColumnDef::optional("phone", ColumnType::Text),
];

const PRODUCT_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("name", ColumnType::Text),
    ColumnDef::optional("sku", ColumnType::Text),
    ColumnDef::new("price", ColumnType::Real),
    ColumnDef::new("stock", ColumnType::Integer),
    ColumnDef::optional("category_id", ColumnType::Text).references(CATEGORY),
    ColumnDef::optional("supplier_id", ColumnType::Text).references(SUPPLIER),
];

const SALE_COLUMNS: &[ColumnDef] = &[
    ColumnDef::optional("customer_id", ColumnType::Text).references(CUSTOMER),
    ColumnDef::new("user_id", ColumnType::Text).references(USER),
    ColumnDef::new("total", ColumnType::Real),
    ColumnDef::new("status", ColumnType::Text),
];

const SALE_ITEM_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("sale_id", ColumnType::Text).references(SALE),
    ColumnDef::new("product_id", ColumnType::Text).references(PRODUCT),
    ColumnDef::new("quantity", ColumnType::Integer),
    ColumnDef::new("unit_price", ColumnType::Real),
];

const INVENTORY_MOVEMENT_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("product_id", ColumnType::Text).references(PRODUCT),
    ColumnDef::optional("user_id", ColumnType::Text).references(USER),
    ColumnDef::new("quantity_delta", ColumnType::Integer),
    ColumnDef::optional("reason", ColumnType::Text),
];

const REFUND_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("sale_id", ColumnType::Text).references(SALE),
    ColumnDef::new("user_id", ColumnType::Text).references(USER),
    ColumnDef::new("amount", ColumnType::Real),
    ColumnDef::optional("reason", ColumnType::Text),
];

const fn entity(
    internal_name: &'static str,
    table: &'static str,
    dependency_rank: u32,
    columns: &'static [ColumnDef],
) -> EntityDescriptor {
    EntityDescriptor {
        internal_name,
        local_table: table,
        remote_table: table,
        dependency_rank,
        columns,
        mode: ReplicationMode::Bidirectional,
        critical: false,
    }
}

/// Descriptors for every replicated entity
pub fn standard_entities() -> Vec<EntityDescriptor> {
    vec![
        EntityDescriptor {
            mode: ReplicationMode::PushOnly,
            critical: true,
            ..entity(USER, "users", 0, USER_COLUMNS)
        },
        entity(CATEGORY, "categories", 1, CATEGORY_COLUMNS),
        entity(SUPPLIER, "suppliers", 2, SUPPLIER_COLUMNS),
        entity(CUSTOMER, "customers", 3, CUSTOMER_COLUMNS),
        entity(PRODUCT, "products", 4, PRODUCT_COLUMNS),
        entity(SALE, "sales", 5, SALE_COLUMNS),
        entity(SALE_ITEM, "sale_items", 6, SALE_ITEM_COLUMNS),
        entity(
            INVENTORY_MOVEMENT,
            "inventory_movements",
            7,
            INVENTORY_MOVEMENT_COLUMNS,
        ),
        entity(REFUND, "refunds", 8, REFUND_COLUMNS),
    ]
}

impl SchemaRegistry {
    /// Registry of the standard Stockroom entity set
    pub fn standard() -> Result<Self> {
        Self::new(standard_entities())
    }
}
