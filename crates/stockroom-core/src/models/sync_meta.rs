//! Synchronization bookkeeping shared by every syncable entity.
//!
//! Each entity type composes a [`SyncMeta`] and exposes it through the
//! [`Syncable`] trait. All dirty-flag decisions go through [`SyncMeta`] so the
//! creation and update rules are identical for every table.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Columns that only record synchronization state.
///
/// An update touching nothing but these never marks a record dirty.
pub const BOOKKEEPING_FIELDS: [&str; 2] = ["is_dirty", "last_synced_at"];

/// Returns true when any changed field is a domain field.
pub fn touches_domain_fields<'a>(changed: impl IntoIterator<Item = &'a str>) -> bool {
    changed
        .into_iter()
        .any(|field| !BOOKKEEPING_FIELDS.contains(&field))
}

/// Identity and sync state of a single record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMeta {
    /// Local primary key (`None` until persisted, never sent to the server)
    pub id: Option<i64>,
    /// Replica-independent identity, immutable after creation
    pub uuid: Uuid,
    /// Local changes not yet accepted by the server
    pub is_dirty: bool,
    /// Last successful synchronization (Unix ms)
    pub last_synced_at: Option<i64>,
    /// Incremented on every domain-field write
    pub revision: i64,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last domain-field update (Unix ms)
    pub updated_at: i64,
}

impl SyncMeta {
    /// State of a record created on this replica.
    ///
    /// Keeps a caller-provided uuid, otherwise assigns a fresh v4 uuid.
    pub fn new_local(uuid: Option<Uuid>, now: i64) -> Self {
        Self {
            id: None,
            uuid: uuid.unwrap_or_else(Uuid::new_v4),
            is_dirty: true,
            last_synced_at: None,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// State of a record first seen in a server payload.
    pub const fn from_server(uuid: Uuid, now: i64) -> Self {
        Self {
            id: None,
            uuid,
            is_dirty: false,
            last_synced_at: Some(now),
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply the dirty rule for a write touching `changed` fields.
    ///
    /// Returns whether the write counted as a domain change.
    pub fn record_update<'a>(
        &mut self,
        changed: impl IntoIterator<Item = &'a str>,
        now: i64,
    ) -> bool {
        if !touches_domain_fields(changed) {
            return false;
        }
        self.is_dirty = true;
        self.revision += 1;
        self.updated_at = now;
        true
    }

    /// Clear the dirty flag and stamp the sync time. Not a domain change.
    pub fn mark_synced(&mut self, now: i64) {
        self.is_dirty = false;
        self.last_synced_at = Some(now);
    }
}

/// Dirty-tracking capability implemented by every syncable record type.
pub trait Syncable {
    /// Sync bookkeeping of this record
    fn meta(&self) -> &SyncMeta;

    /// Mutable sync bookkeeping of this record
    fn meta_mut(&mut self) -> &mut SyncMeta;

    fn uuid(&self) -> Uuid {
        self.meta().uuid
    }

    fn is_dirty(&self) -> bool {
        self.meta().is_dirty
    }

    fn last_synced_at(&self) -> Option<i64> {
        self.meta().last_synced_at
    }

    /// See [`SyncMeta::mark_synced`].
    fn mark_synced(&mut self, now: i64) {
        self.meta_mut().mark_synced(now);
    }
}

impl Syncable for SyncMeta {
    fn meta(&self) -> &SyncMeta {
        self
    }

    fn meta_mut(&mut self) -> &mut SyncMeta {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_creation_is_dirty_with_fresh_uuid() {
        let meta = SyncMeta::new_local(None, 10);
        assert!(meta.is_dirty);
        assert_eq!(meta.last_synced_at, None);
        assert_eq!(meta.uuid.get_version_num(), 4);
        assert_eq!(meta.uuid.get_variant(), uuid::Variant::RFC4122);
        assert_ne!(meta.uuid, SyncMeta::new_local(None, 10).uuid);
    }

    #[test]
    fn local_creation_keeps_supplied_uuid() {
        let uuid = Uuid::new_v4();
        assert_eq!(SyncMeta::new_local(Some(uuid), 10).uuid, uuid);
    }

    #[test]
    fn mark_synced_clears_dirty_and_stamps_time() {
        let mut meta = SyncMeta::new_local(None, 10);
        meta.mark_synced(20);
        assert!(!meta.is_dirty);
        assert_eq!(meta.last_synced_at, Some(20));
    }

    #[test]
    fn bookkeeping_updates_do_not_dirty() {
        let mut meta = SyncMeta::new_local(None, 10);
        meta.mark_synced(20);
        let revision = meta.revision;

        assert!(!meta.record_update(["is_dirty", "last_synced_at"], 30));
        assert!(!meta.is_dirty);
        assert_eq!(meta.revision, revision);
        assert_eq!(meta.updated_at, 10);
    }

    #[test]
    fn domain_updates_always_dirty() {
        let mut meta = SyncMeta::from_server(Uuid::new_v4(), 10);
        assert!(!meta.is_dirty);

        assert!(meta.record_update(["last_synced_at", "price"], 30));
        assert!(meta.is_dirty);
        assert_eq!(meta.revision, 2);
        assert_eq!(meta.updated_at, 30);

        assert!(meta.record_update(["name"], 40));
        assert!(meta.is_dirty);
        assert_eq!(meta.revision, 3);
    }

    #[test]
    fn empty_change_set_is_not_a_domain_change() {
        assert!(!touches_domain_fields(std::iter::empty::<&str>()));
    }
}
