//! Inventory adjustment model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::Entity;
use super::table::SyncTable;

/// A manual stock correction (damage, recount, restock)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryAdjustment {
    /// Adjusted product (uuid of a `products` record)
    pub product_uuid: Uuid,
    /// Signed change in units on hand
    pub delta: i64,
    pub reason: Option<String>,
    /// When the adjustment was made (Unix ms)
    pub adjusted_at: i64,
}

impl InventoryAdjustment {
    #[must_use]
    pub const fn new(product_uuid: Uuid, delta: i64, adjusted_at: i64) -> Self {
        Self {
            product_uuid,
            delta,
            reason: None,
            adjusted_at,
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl Entity for InventoryAdjustment {
    const TABLE: SyncTable = SyncTable::InventoryAdjustments;
}
