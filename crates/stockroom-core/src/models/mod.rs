//! Data models for Stockroom

mod customer;
mod inventory_adjustment;
mod product;
mod record;
mod sync_conflict;
mod sync_meta;
mod table;
mod transaction;

pub use customer::Customer;
pub use inventory_adjustment::InventoryAdjustment;
pub use product::Product;
pub use record::{Entity, FieldMap, Record, SyncRecord};
pub use sync_conflict::{
    ConflictStatus, NewConflict, ResolutionStrategy, SyncConflict, PENDING_LOCAL_CHANGES_REASON,
};
pub use sync_meta::{touches_domain_fields, SyncMeta, Syncable, BOOKKEEPING_FIELDS};
pub use table::{FieldKind, FieldSpec, SyncTable};
pub use transaction::{Transaction, TransactionKind};
