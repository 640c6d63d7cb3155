//! Generic and typed syncable records

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::sync_meta::{SyncMeta, Syncable};
use super::table::SyncTable;
use crate::error::{Error, Result};

/// Opaque field name → value mapping, as stored and as sent on the wire.
pub type FieldMap = serde_json::Map<String, Value>;

/// A record of any syncable table with its domain fields kept as JSON values.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRecord {
    pub table: SyncTable,
    pub meta: SyncMeta,
    pub fields: FieldMap,
}

impl SyncRecord {
    /// Domain fields plus `uuid`, the shape exchanged with the server and
    /// captured in conflict snapshots.
    pub fn to_wire(&self) -> FieldMap {
        let mut map = self.fields.clone();
        map.insert("uuid".to_string(), Value::String(self.meta.uuid.to_string()));
        map
    }
}

impl Syncable for SyncRecord {
    fn meta(&self) -> &SyncMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SyncMeta {
        &mut self.meta
    }
}

/// A business entity stored in one syncable table.
///
/// Implementors are plain serde structs whose field names match the table's
/// [`FieldSpec`](super::FieldSpec) names.
pub trait Entity: Serialize + DeserializeOwned {
    const TABLE: SyncTable;

    fn to_fields(&self) -> Result<FieldMap> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(Error::InvalidInput(format!(
                "{} entity must serialize to an object, got {other}",
                Self::TABLE
            ))),
        }
    }

    fn from_fields(fields: &FieldMap) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(fields.clone()))?)
    }
}

/// A typed entity together with its sync bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<E> {
    pub meta: SyncMeta,
    pub data: E,
}

impl<E> Syncable for Record<E> {
    fn meta(&self) -> &SyncMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut SyncMeta {
        &mut self.meta
    }
}

impl<E: Entity> TryFrom<SyncRecord> for Record<E> {
    type Error = Error;

    fn try_from(record: SyncRecord) -> Result<Self> {
        if record.table != E::TABLE {
            return Err(Error::InvalidInput(format!(
                "expected a {} record, got {}",
                E::TABLE,
                record.table
            )));
        }
        Ok(Self {
            data: E::from_fields(&record.fields)?,
            meta: record.meta,
        })
    }
}
