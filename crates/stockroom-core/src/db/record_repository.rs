//! Syncable record repository
//!
//! Every write to an entity table goes through this repository so the dirty
//! rule in [`SyncMeta`] is applied uniformly. Local edits use [`create`] and
//! [`update`]; synchronization bookkeeping uses the `mark_synced*` and
//! server-apply methods, which never set the dirty flag.
//!
//! [`create`]: RecordRepository::create
//! [`update`]: RecordRepository::update

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET
#![allow(clippy::cast_precision_loss)] // integer columns read back as REAL fields

use rusqlite::types::{Type, Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::{Number, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{
    Entity, FieldKind, FieldMap, FieldSpec, Record, SyncMeta, SyncRecord, SyncTable,
};
use crate::util::now_millis;

const META_COLUMNS: &str = "id, uuid, is_dirty, last_synced_at, revision, created_at, updated_at";
const META_COLUMN_COUNT: usize = 7;

/// Trait for syncable record storage operations
pub trait RecordRepository {
    /// Create a record locally. Starts dirty, never synced.
    ///
    /// A `uuid` key in `fields` is used as the identity; otherwise one is
    /// generated.
    fn create(&self, table: SyncTable, fields: &FieldMap) -> Result<SyncRecord>;

    /// Get a record by uuid
    fn get(&self, table: SyncTable, uuid: &Uuid) -> Result<Option<SyncRecord>>;

    /// Get a record by its local primary key
    fn get_by_id(&self, table: SyncTable, id: i64) -> Result<Option<SyncRecord>>;

    /// List records in insertion order
    fn list(&self, table: SyncTable, limit: usize, offset: usize) -> Result<Vec<SyncRecord>>;

    /// Apply a local write.
    ///
    /// Marks the record dirty when any domain field actually changes; a write
    /// touching only `is_dirty` / `last_synced_at` leaves the flag as given.
    fn update(&self, table: SyncTable, uuid: &Uuid, changes: &FieldMap) -> Result<SyncRecord>;

    /// Hard-delete a record locally
    fn delete(&self, table: SyncTable, uuid: &Uuid) -> Result<()>;

    /// All records with local changes not yet accepted by the server
    fn unsynced_records(&self, table: SyncTable) -> Result<Vec<SyncRecord>>;

    /// Number of dirty records
    fn count_unsynced(&self, table: SyncTable) -> Result<usize>;

    /// Records whose last domain-field update is at or after `since` (Unix ms)
    fn updated_since(&self, table: SyncTable, since: i64) -> Result<Vec<SyncRecord>>;

    /// Clear the dirty flag unconditionally. Returns false if the record is gone.
    fn mark_synced(&self, table: SyncTable, uuid: &Uuid, now: i64) -> Result<bool>;

    /// Clear the dirty flag only if the record is still at `revision`.
    ///
    /// Returns false when the record changed since it was read (or is gone),
    /// leaving the newer local edit dirty.
    fn mark_synced_if_unchanged(
        &self,
        table: SyncTable,
        uuid: &Uuid,
        revision: i64,
        now: i64,
    ) -> Result<bool>;

    /// Overwrite domain fields with server values and mark synced.
    ///
    /// Keys outside the table's updatable field set are ignored. Returns false
    /// if the record does not exist.
    fn apply_server_fields(
        &self,
        table: SyncTable,
        uuid: &Uuid,
        fields: &FieldMap,
        now: i64,
    ) -> Result<bool>;

    /// Insert a record first seen in a server payload, already synced
    fn insert_from_server(
        &self,
        table: SyncTable,
        uuid: Uuid,
        fields: &FieldMap,
        now: i64,
    ) -> Result<SyncRecord>;
}

/// `SQLite` implementation of `RecordRepository`
pub struct SqliteRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a typed entity locally
    pub fn create_entity<E: Entity>(&self, entity: &E) -> Result<Record<E>> {
        self.create(E::TABLE, &entity.to_fields()?)?.try_into()
    }

    /// Get a typed entity by uuid
    pub fn get_entity<E: Entity>(&self, uuid: &Uuid) -> Result<Option<Record<E>>> {
        self.get(E::TABLE, uuid)?.map(Record::try_from).transpose()
    }

    /// Replace a typed entity's domain fields through the dirty rule
    pub fn update_entity<E: Entity>(&self, uuid: &Uuid, entity: &E) -> Result<Record<E>> {
        self.update(E::TABLE, uuid, &entity.to_fields()?)?.try_into()
    }

    fn select_sql(table: SyncTable, filter: &str) -> String {
        format!(
            "SELECT {META_COLUMNS}, {} FROM {} {filter}",
            domain_column_list(table),
            table.as_str()
        )
    }

    fn query_records(
        &self,
        table: SyncTable,
        filter: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<SyncRecord>> {
        let mut stmt = self.conn.prepare(&Self::select_sql(table, filter))?;
        let records = stmt
            .query_map(params, |row| parse_record(table, row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn insert(&self, table: SyncTable, meta: &SyncMeta, values: Vec<SqlValue>) -> Result<i64> {
        let column_count = 6 + values.len();
        let placeholders = vec!["?"; column_count].join(", ");
        let sql = format!(
            "INSERT INTO {} (uuid, is_dirty, last_synced_at, revision, created_at, updated_at, {})
             VALUES ({placeholders})",
            table.as_str(),
            domain_column_list(table)
        );

        let mut params = vec![
            SqlValue::Text(meta.uuid.to_string()),
            SqlValue::Integer(i64::from(meta.is_dirty)),
            meta.last_synced_at.map_or(SqlValue::Null, SqlValue::Integer),
            SqlValue::Integer(meta.revision),
            SqlValue::Integer(meta.created_at),
            SqlValue::Integer(meta.updated_at),
        ];
        params.extend(values);

        self.conn.execute(&sql, params_from_iter(params))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Persist every column of an already-loaded record
    fn write(&self, record: &SyncRecord) -> Result<()> {
        let table = record.table;
        let assignments = table
            .fields()
            .iter()
            .map(|spec| format!(", {} = ?", spec.name))
            .collect::<String>();
        let sql = format!(
            "UPDATE {} SET is_dirty = ?, last_synced_at = ?, revision = ?, updated_at = ?{assignments}
             WHERE uuid = ?",
            table.as_str()
        );

        let mut params = vec![
            SqlValue::Integer(i64::from(record.meta.is_dirty)),
            record
                .meta
                .last_synced_at
                .map_or(SqlValue::Null, SqlValue::Integer),
            SqlValue::Integer(record.meta.revision),
            SqlValue::Integer(record.meta.updated_at),
        ];
        for spec in table.fields() {
            let value = record.fields.get(spec.name).unwrap_or(&Value::Null);
            params.push(to_sql_value(table, spec, value)?);
        }
        params.push(SqlValue::Text(record.meta.uuid.to_string()));

        let rows = self.conn.execute(&sql, params_from_iter(params))?;
        if rows == 0 {
            return Err(Error::NotFound(format!("{table} {}", record.meta.uuid)));
        }
        Ok(())
    }

    fn ensure_absent(&self, table: SyncTable, uuid: &Uuid) -> Result<()> {
        if self.get(table, uuid)?.is_some() {
            return Err(Error::InvalidInput(format!(
                "{table} record {uuid} already exists"
            )));
        }
        Ok(())
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn create(&self, table: SyncTable, fields: &FieldMap) -> Result<SyncRecord> {
        let uuid = match fields.get("uuid") {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_uuid_value(value)?),
        };

        let mut domain = FieldMap::new();
        for (key, value) in fields {
            if key == "uuid" {
                continue;
            }
            let spec = table.field(key).ok_or_else(|| {
                Error::InvalidInput(format!("{table} has no updatable field '{key}'"))
            })?;
            domain.insert(spec.name.to_string(), normalize_value(table, spec, value)?);
        }
        for spec in table.fields() {
            let value = domain.entry(spec.name.to_string()).or_insert(Value::Null);
            if spec.required && value.is_null() {
                return Err(Error::InvalidInput(format!(
                    "{table} field '{}' is required",
                    spec.name
                )));
            }
        }

        let mut meta = SyncMeta::new_local(uuid, now_millis());
        self.ensure_absent(table, &meta.uuid)?;
        let values = domain_values(table, &domain)?;
        meta.id = Some(self.insert(table, &meta, values)?);

        Ok(SyncRecord {
            table,
            meta,
            fields: domain,
        })
    }

    fn get(&self, table: SyncTable, uuid: &Uuid) -> Result<Option<SyncRecord>> {
        let record = self
            .conn
            .query_row(
                &Self::select_sql(table, "WHERE uuid = ?"),
                params![uuid.to_string()],
                |row| parse_record(table, row),
            )
            .optional()?;
        Ok(record)
    }

    fn get_by_id(&self, table: SyncTable, id: i64) -> Result<Option<SyncRecord>> {
        let record = self
            .conn
            .query_row(
                &Self::select_sql(table, "WHERE id = ?"),
                params![id],
                |row| parse_record(table, row),
            )
            .optional()?;
        Ok(record)
    }

    fn list(&self, table: SyncTable, limit: usize, offset: usize) -> Result<Vec<SyncRecord>> {
        self.query_records(
            table,
            "ORDER BY id ASC LIMIT ? OFFSET ?",
            params![limit as i64, offset as i64],
        )
    }

    fn update(&self, table: SyncTable, uuid: &Uuid, changes: &FieldMap) -> Result<SyncRecord> {
        let mut record = self
            .get(table, uuid)?
            .ok_or_else(|| Error::NotFound(format!("{table} {uuid}")))?;

        let mut changed: Vec<&'static str> = Vec::new();
        for (key, value) in changes {
            match key.as_str() {
                "is_dirty" => {
                    let flag = value.as_bool().ok_or_else(|| {
                        Error::InvalidInput("is_dirty must be a boolean".to_string())
                    })?;
                    record.meta.is_dirty = flag;
                    changed.push("is_dirty");
                }
                "last_synced_at" => {
                    record.meta.last_synced_at = if value.is_null() {
                        None
                    } else {
                        Some(value.as_i64().ok_or_else(|| {
                            Error::InvalidInput(
                                "last_synced_at must be a Unix ms timestamp".to_string(),
                            )
                        })?)
                    };
                    changed.push("last_synced_at");
                }
                "uuid" | "id" => {
                    return Err(Error::InvalidInput(format!("{key} is immutable")));
                }
                name => {
                    let spec = table.field(name).ok_or_else(|| {
                        Error::InvalidInput(format!("{table} has no updatable field '{name}'"))
                    })?;
                    let normalized = normalize_value(table, spec, value)?;
                    if record.fields.get(spec.name) != Some(&normalized) {
                        record.fields.insert(spec.name.to_string(), normalized);
                        changed.push(spec.name);
                    }
                }
            }
        }

        record.meta.record_update(changed.iter().copied(), now_millis());
        self.write(&record)?;
        Ok(record)
    }

    fn delete(&self, table: SyncTable, uuid: &Uuid) -> Result<()> {
        let rows = self.conn.execute(
            &format!("DELETE FROM {} WHERE uuid = ?", table.as_str()),
            params![uuid.to_string()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("{table} {uuid}")));
        }
        Ok(())
    }

    fn unsynced_records(&self, table: SyncTable) -> Result<Vec<SyncRecord>> {
        self.query_records(table, "WHERE is_dirty = 1 ORDER BY id ASC", [])
    }

    fn count_unsynced(&self, table: SyncTable) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE is_dirty = 1", table.as_str()),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn updated_since(&self, table: SyncTable, since: i64) -> Result<Vec<SyncRecord>> {
        self.query_records(
            table,
            "WHERE updated_at >= ? ORDER BY updated_at ASC, id ASC",
            params![since],
        )
    }

    fn mark_synced(&self, table: SyncTable, uuid: &Uuid, now: i64) -> Result<bool> {
        let rows = self.conn.execute(
            &format!(
                "UPDATE {} SET is_dirty = 0, last_synced_at = ? WHERE uuid = ?",
                table.as_str()
            ),
            params![now, uuid.to_string()],
        )?;
        Ok(rows > 0)
    }

    fn mark_synced_if_unchanged(
        &self,
        table: SyncTable,
        uuid: &Uuid,
        revision: i64,
        now: i64,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            &format!(
                "UPDATE {} SET is_dirty = 0, last_synced_at = ? WHERE uuid = ? AND revision = ?",
                table.as_str()
            ),
            params![now, uuid.to_string(), revision],
        )?;
        Ok(rows > 0)
    }

    fn apply_server_fields(
        &self,
        table: SyncTable,
        uuid: &Uuid,
        fields: &FieldMap,
        now: i64,
    ) -> Result<bool> {
        let Some(mut record) = self.get(table, uuid)? else {
            return Ok(false);
        };

        for spec in table.fields() {
            if let Some(value) = fields.get(spec.name) {
                record
                    .fields
                    .insert(spec.name.to_string(), normalize_value(table, spec, value)?);
            }
        }
        record.meta.revision += 1;
        record.meta.updated_at = now;
        record.meta.mark_synced(now);
        self.write(&record)?;
        Ok(true)
    }

    fn insert_from_server(
        &self,
        table: SyncTable,
        uuid: Uuid,
        fields: &FieldMap,
        now: i64,
    ) -> Result<SyncRecord> {
        self.ensure_absent(table, &uuid)?;

        let mut domain = FieldMap::new();
        for spec in table.fields() {
            let value = normalize_value(table, spec, fields.get(spec.name).unwrap_or(&Value::Null))?;
            if spec.required && value.is_null() {
                return Err(Error::InvalidPayload(format!(
                    "server {table} record {uuid} is missing required field '{}'",
                    spec.name
                )));
            }
            domain.insert(spec.name.to_string(), value);
        }

        let mut meta = SyncMeta::from_server(uuid, now);
        let values = domain_values(table, &domain)?;
        meta.id = Some(self.insert(table, &meta, values)?);

        Ok(SyncRecord {
            table,
            meta,
            fields: domain,
        })
    }
}

/// Extract and validate the `uuid` key of a wire record
pub fn parse_uuid_value(value: &Value) -> Result<Uuid> {
    value
        .as_str()
        .and_then(|text| Uuid::parse_str(text.trim()).ok())
        .ok_or_else(|| Error::InvalidInput(format!("invalid uuid: {value}")))
}

fn domain_column_list(table: SyncTable) -> String {
    table
        .fields()
        .iter()
        .map(|spec| spec.name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn domain_values(table: SyncTable, fields: &FieldMap) -> Result<Vec<SqlValue>> {
    table
        .fields()
        .iter()
        .map(|spec| to_sql_value(table, spec, fields.get(spec.name).unwrap_or(&Value::Null)))
        .collect()
}

fn type_error(table: SyncTable, spec: &FieldSpec, value: &Value) -> Error {
    Error::InvalidInput(format!(
        "{table}.{} expects {:?}, got {value}",
        spec.name, spec.kind
    ))
}

fn to_sql_value(table: SyncTable, spec: &FieldSpec, value: &Value) -> Result<SqlValue> {
    let converted = match (spec.kind, value) {
        (_, Value::Null) => Some(SqlValue::Null),
        (FieldKind::Text, Value::String(text)) => Some(SqlValue::Text(text.clone())),
        (FieldKind::Integer, Value::Number(number)) => number.as_i64().map(SqlValue::Integer),
        (FieldKind::Real, Value::Number(number)) => number.as_f64().map(SqlValue::Real),
        (FieldKind::Bool, Value::Bool(flag)) => Some(SqlValue::Integer(i64::from(*flag))),
        (FieldKind::Bool, Value::Number(number)) => match number.as_i64() {
            Some(0) => Some(SqlValue::Integer(0)),
            Some(1) => Some(SqlValue::Integer(1)),
            _ => None,
        },
        _ => None,
    };
    converted.ok_or_else(|| type_error(table, spec, value))
}

fn from_sql_value(kind: FieldKind, value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(int) => match kind {
            FieldKind::Bool => Value::Bool(int != 0),
            FieldKind::Real => real_value(int as f64),
            FieldKind::Text | FieldKind::Integer => Value::Number(Number::from(int)),
        },
        ValueRef::Real(real) => real_value(real),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

fn real_value(real: f64) -> Value {
    Number::from_f64(real).map_or(Value::Null, Value::Number)
}

/// Coerce a JSON value to the shape it has after a storage round trip
fn normalize_value(table: SyncTable, spec: &FieldSpec, value: &Value) -> Result<Value> {
    let stored = to_sql_value(table, spec, value)?;
    Ok(from_sql_value(spec.kind, ValueRef::from(&stored)))
}

fn parse_record(table: SyncTable, row: &Row<'_>) -> rusqlite::Result<SyncRecord> {
    let uuid_text: String = row.get(1)?;
    let uuid = Uuid::parse_str(&uuid_text)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(error)))?;

    let meta = SyncMeta {
        id: Some(row.get(0)?),
        uuid,
        is_dirty: row.get(2)?,
        last_synced_at: row.get(3)?,
        revision: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    };

    let mut fields = FieldMap::new();
    for (offset, spec) in table.fields().iter().enumerate() {
        let value = from_sql_value(spec.kind, row.get_ref(META_COLUMN_COUNT + offset)?);
        fields.insert(spec.name.to_string(), value);
    }

    Ok(SyncRecord { table, meta, fields })
}
