//! Wire types for the push/pull endpoints

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::parse_uuid_value;
use crate::error::{Error, Result};
use crate::models::{FieldMap, SyncRecord, SyncTable};

/// Records of one table, as sent and received on the wire.
///
/// The table name stays a string here so an unknown name can be reported
/// instead of failing the whole body at deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableBatch {
    pub table: String,
    #[serde(default)]
    pub records: Vec<FieldMap>,
}

impl TableBatch {
    pub fn from_records(table: SyncTable, records: &[SyncRecord]) -> Self {
        Self {
            table: table.as_str().to_string(),
            records: records.iter().map(SyncRecord::to_wire).collect(),
        }
    }

    /// Resolve the table name against the syncable set.
    pub fn sync_table(&self) -> Result<SyncTable> {
        self.table.parse()
    }
}

/// `POST /sync/push` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    pub data: Vec<TableBatch>,
}

impl PushRequest {
    pub fn record_count(&self) -> usize {
        self.data.iter().map(|batch| batch.records.len()).sum()
    }
}

/// Per-record rejection reported by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushConflict {
    pub table: String,
    pub uuid: String,
    #[serde(default)]
    pub server_data: Option<FieldMap>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl PushConflict {
    pub fn sync_table(&self) -> Result<SyncTable> {
        self.table.parse()
    }

    pub fn record_uuid(&self) -> Result<Uuid> {
        Uuid::parse_str(self.uuid.trim())
            .map_err(|_| Error::InvalidPayload(format!("invalid conflict uuid: {}", self.uuid)))
    }
}

/// `POST /sync/push` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushResponse {
    #[serde(default)]
    pub processed: usize,
    #[serde(default)]
    pub conflicts: Vec<PushConflict>,
}

/// `GET /sync/pull` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    #[serde(default)]
    pub updates: Option<Vec<TableBatch>>,
    /// Opaque cursor to send as `since` next time
    #[serde(default)]
    pub checkpoint: Option<String>,
}

impl PullResponse {
    /// True when there is nothing to apply
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    pub fn record_count(&self) -> usize {
        self.updates
            .as_ref()
            .map_or(0, |batches| batches.iter().map(|batch| batch.records.len()).sum())
    }
}

/// Split a wire record into its uuid and the remaining fields.
pub fn split_wire_record(record: &FieldMap) -> Result<(Uuid, FieldMap)> {
    let uuid = record
        .get("uuid")
        .ok_or_else(|| Error::InvalidPayload("record is missing 'uuid'".to_string()))
        .and_then(|value| {
            parse_uuid_value(value).map_err(|_| {
                Error::InvalidPayload(format!("record has an invalid uuid: {value}"))
            })
        })?;

    let fields = record
        .iter()
        .filter(|(key, _)| key.as_str() != "uuid")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect::<FieldMap>();
    Ok((uuid, fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn pull_response_tolerates_missing_updates() {
        let empty: PullResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());

        let null: PullResponse = serde_json::from_str(r#"{"updates":null}"#).unwrap();
        assert!(null.is_empty());

        let blank: PullResponse =
            serde_json::from_str(r#"{"updates":[{"table":"products","records":[]}]}"#).unwrap();
        assert!(blank.is_empty());
    }

    #[test]
    fn push_response_parses_conflicts() {
        let response: PushResponse = serde_json::from_value(json!({
            "processed": 2,
            "conflicts": [{
                "table": "products",
                "uuid": "0b6f1c55-3c4d-4d0a-9b0e-1a2b3c4d5e6f",
                "server_data": {"name": "Server"},
                "reason": "stale"
            }]
        }))
        .unwrap();

        assert_eq!(response.processed, 2);
        let conflict = &response.conflicts[0];
        assert_eq!(conflict.sync_table().unwrap(), SyncTable::Products);
        assert_eq!(
            conflict.record_uuid().unwrap().to_string(),
            "0b6f1c55-3c4d-4d0a-9b0e-1a2b3c4d5e6f"
        );
        assert_eq!(conflict.reason.as_deref(), Some("stale"));
    }

    #[test]
    fn unknown_table_is_rejected() {
        let batch = TableBatch {
            table: "orders".to_string(),
            records: Vec::new(),
        };
        assert!(matches!(batch.sync_table(), Err(Error::UnknownTable(_))));
    }

    #[test]
    fn split_wire_record_requires_uuid() {
        let mut record = FieldMap::new();
        record.insert("name".to_string(), json!("Tent"));
        assert!(matches!(
            split_wire_record(&record),
            Err(Error::InvalidPayload(_))
        ));

        record.insert(
            "uuid".to_string(),
            json!("0b6f1c55-3c4d-4d0a-9b0e-1a2b3c4d5e6f"),
        );
        let (uuid, fields) = split_wire_record(&record).unwrap();
        assert_eq!(uuid.to_string(), "0b6f1c55-3c4d-4d0a-9b0e-1a2b3c4d5e6f");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["name"], "Tent");
    }
}
