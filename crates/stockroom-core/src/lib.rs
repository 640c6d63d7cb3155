//! stockroom-core - Core library for Stockroom
//!
//! Syncable business records (products, customers, transactions, inventory
//! adjustments) stored in a local `SQLite` database, plus the engine that
//! converges them with a single authoritative server.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod sync;
pub mod util;

pub use config::SyncConfig;
pub use error::{Error, Result};
pub use models::{SyncRecord, SyncTable, Syncable};
pub use services::DatabaseService;
