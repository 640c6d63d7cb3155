//! Product model

use serde::{Deserialize, Serialize};

use super::record::Entity;
use super::table::SyncTable;

/// An item that can be sold or rented out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Display name
    pub name: String,
    /// Stock keeping unit
    pub sku: Option<String>,
    /// Free-form category label
    pub category: Option<String>,
    /// Unit sale price
    pub price: Option<f64>,
    /// Units on hand
    pub quantity: Option<i64>,
    /// Whether the product can be rented
    pub is_rentable: Option<bool>,
}

impl Product {
    /// Create a product with only a name set
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sku: None,
            category: None,
            price: None,
            quantity: None,
            is_rentable: None,
        }
    }

    /// Units on hand, treating an unknown quantity as zero
    pub fn stock_level(&self) -> i64 {
        self.quantity.unwrap_or(0)
    }
}

impl Entity for Product {
    const TABLE: SyncTable = SyncTable::Products;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_match_table_schema() {
        let fields = Product::new("Drill").to_fields().unwrap();
        assert_eq!(fields.len(), SyncTable::Products.fields().len());
        for key in fields.keys() {
            assert!(SyncTable::Products.field(key).is_some(), "{key}");
        }
    }

    #[test]
    fn stock_level_defaults_to_zero() {
        let mut product = Product::new("Drill");
        assert_eq!(product.stock_level(), 0);
        product.quantity = Some(4);
        assert_eq!(product.stock_level(), 4);
    }
}
