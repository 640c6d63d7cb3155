//! Syncable tables and their domain field schemas

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Storage type of a domain field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8 text (also used for uuid references)
    Text,
    /// 64-bit integer (quantities, Unix ms timestamps)
    Integer,
    /// Floating point (prices, totals)
    Real,
    /// Boolean, stored as 0/1
    Bool,
}

/// A single updatable domain field of a syncable table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Column and JSON key name
    pub name: &'static str,
    /// Storage type
    pub kind: FieldKind,
    /// Must be non-null when a record is created locally
    pub required: bool,
}

const fn field(name: &'static str, kind: FieldKind, required: bool) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required,
    }
}

const PRODUCT_FIELDS: &[FieldSpec] = &[
    field("name", FieldKind::Text, true),
    field("sku", FieldKind::Text, false),
    field("category", FieldKind::Text, false),
    field("price", FieldKind::Real, false),
    field("quantity", FieldKind::Integer, false),
    field("is_rentable", FieldKind::Bool, false),
];

const CUSTOMER_FIELDS: &[FieldSpec] = &[
    field("name", FieldKind::Text, true),
    field("email", FieldKind::Text, false),
    field("phone", FieldKind::Text, false),
    field("address", FieldKind::Text, false),
];

const TRANSACTION_FIELDS: &[FieldSpec] = &[
    field("kind", FieldKind::Text, true),
    field("product_uuid", FieldKind::Text, true),
    field("customer_uuid", FieldKind::Text, false),
    field("quantity", FieldKind::Integer, true),
    field("total", FieldKind::Real, false),
    field("occurred_at", FieldKind::Integer, true),
    field("due_at", FieldKind::Integer, false),
    field("returned_at", FieldKind::Integer, false),
];

const INVENTORY_ADJUSTMENT_FIELDS: &[FieldSpec] = &[
    field("product_uuid", FieldKind::Text, true),
    field("delta", FieldKind::Integer, true),
    field("reason", FieldKind::Text, false),
    field("adjusted_at", FieldKind::Integer, true),
];

/// Entity tables that participate in synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTable {
    Products,
    Customers,
    Transactions,
    InventoryAdjustments,
}

impl SyncTable {
    /// All syncable tables, referenced tables first.
    pub const ALL: [Self; 4] = [
        Self::Products,
        Self::Customers,
        Self::Transactions,
        Self::InventoryAdjustments,
    ];

    /// Table name used both locally and on the wire
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Customers => "customers",
            Self::Transactions => "transactions",
            Self::InventoryAdjustments => "inventory_adjustments",
        }
    }

    /// Updatable domain fields of this table
    pub const fn fields(self) -> &'static [FieldSpec] {
        match self {
            Self::Products => PRODUCT_FIELDS,
            Self::Customers => CUSTOMER_FIELDS,
            Self::Transactions => TRANSACTION_FIELDS,
            Self::InventoryAdjustments => INVENTORY_ADJUSTMENT_FIELDS,
        }
    }

    /// Look up a domain field by name
    pub fn field(self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|spec| spec.name == name)
    }
}

impl fmt::Display for SyncTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncTable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|table| table.as_str() == s.trim())
            .ok_or_else(|| Error::UnknownTable(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_recognized_tables() {
        for table in SyncTable::ALL {
            assert_eq!(table.as_str().parse::<SyncTable>().unwrap(), table);
        }
    }

    #[test]
    fn rejects_other_table_names() {
        let error = "users".parse::<SyncTable>().unwrap_err();
        assert!(matches!(error, Error::UnknownTable(name) if name == "users"));
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&SyncTable::InventoryAdjustments).unwrap();
        assert_eq!(json, "\"inventory_adjustments\"");
    }

    #[test]
    fn field_lookup_ignores_bookkeeping_columns() {
        assert!(SyncTable::Products.field("price").is_some());
        assert!(SyncTable::Products.field("is_dirty").is_none());
        assert!(SyncTable::Products.field("uuid").is_none());
    }
}
