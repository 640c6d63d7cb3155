//! Sale and rental transaction model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::Entity;
use super::table::SyncTable;

/// Whether a transaction sells or rents a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Sale,
    Rental,
}

/// A sale or rental of a product, optionally tied to a customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub kind: TransactionKind,
    /// Product sold or rented (uuid of a `products` record)
    pub product_uuid: Uuid,
    /// Buyer or renter (uuid of a `customers` record)
    pub customer_uuid: Option<Uuid>,
    pub quantity: i64,
    pub total: Option<f64>,
    /// When the transaction happened (Unix ms)
    pub occurred_at: i64,
    /// Rental return deadline (Unix ms)
    pub due_at: Option<i64>,
    /// When a rented product came back (Unix ms)
    pub returned_at: Option<i64>,
}

impl Transaction {
    /// A sale of `quantity` units
    #[must_use]
    pub const fn sale(product_uuid: Uuid, quantity: i64, occurred_at: i64) -> Self {
        Self {
            kind: TransactionKind::Sale,
            product_uuid,
            customer_uuid: None,
            quantity,
            total: None,
            occurred_at,
            due_at: None,
            returned_at: None,
        }
    }

    /// A rental of `quantity` units due back at `due_at`
    #[must_use]
    pub const fn rental(
        product_uuid: Uuid,
        customer_uuid: Uuid,
        quantity: i64,
        occurred_at: i64,
        due_at: i64,
    ) -> Self {
        Self {
            kind: TransactionKind::Rental,
            product_uuid,
            customer_uuid: Some(customer_uuid),
            quantity,
            total: None,
            occurred_at,
            due_at: Some(due_at),
            returned_at: None,
        }
    }

    /// Rental not yet returned after its due date
    pub fn is_overdue(&self, now: i64) -> bool {
        self.kind == TransactionKind::Rental
            && self.returned_at.is_none()
            && self.due_at.is_some_and(|due_at| due_at < now)
    }
}

impl Entity for Transaction {
    const TABLE: SyncTable = SyncTable::Transactions;
}
