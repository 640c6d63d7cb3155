//! Customer model

use serde::{Deserialize, Serialize};

use super::record::Entity;
use super::table::SyncTable;

/// A person or business that buys or rents products
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl Customer {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
            phone: None,
            address: None,
        }
    }
}

impl Entity for Customer {
    const TABLE: SyncTable = SyncTable::Customers;
}
