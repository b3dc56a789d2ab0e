//! redb table definitions
//!
//! Header and dimension values are postcard-encoded rows; payloads are
//! stored as plain text.

use redb::{
    Key, ReadOnlyTable, ReadTransaction, ReadableTable, TableDefinition, TableError, Value,
    WriteTransaction,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::StoreError;

// Key: rid, Value: serialized HeaderRow
pub const EVENT_HEADERS: TableDefinition<i64, &[u8]> = TableDefinition::new("event_headers");

// Key: rid, Value: payload text
pub const EVENT_PAYLOADS: TableDefinition<i64, &str> = TableDefinition::new("event_payloads");

// Key: provider id, Value: serialized ProviderInfoRow
pub const PROVIDER_INFO: TableDefinition<u32, &[u8]> = TableDefinition::new("provider_info");

// Key: (event id, version, task id, provider id), Value: serialized TaskInfoRow
pub const TASK_INFO: TableDefinition<(i32, i32, i32, u32), &[u8]> =
    TableDefinition::new("task_info");

// Key: (event id, version, task id, provider id, operation id), Value: serialized OperationInfoRow
pub const OPERATION_INFO: TableDefinition<(i32, i32, i32, u32, i32), &[u8]> =
    TableDefinition::new("operation_info");

/// Create every table inside the given transaction
pub(crate) fn create_all(txn: &WriteTransaction) -> Result<(), StoreError> {
    txn.open_table(EVENT_HEADERS)?;
    txn.open_table(EVENT_PAYLOADS)?;
    txn.open_table(PROVIDER_INFO)?;
    txn.open_table(TASK_INFO)?;
    txn.open_table(OPERATION_INFO)?;
    Ok(())
}

/// Open a table for reading, `None` if no write has created it yet
pub(crate) fn open_existing<K: Key + 'static, V: Value + 'static>(
    txn: &ReadTransaction,
    definition: TableDefinition<K, V>,
) -> Result<Option<ReadOnlyTable<K, V>>, StoreError> {
    match txn.open_table(definition) {
        Ok(table) => Ok(Some(table)),
        Err(TableError::TableDoesNotExist(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn encode<T: Serialize>(row: &T) -> Result<Vec<u8>, StoreError> {
    postcard::to_allocvec(row).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    postcard::from_bytes(bytes).map_err(|e| StoreError::Deserialization(e.to_string()))
}

/// Decode every row of a dimension table
pub(crate) fn read_rows<K, T, R>(table: &R) -> Result<Vec<T>, StoreError>
where
    K: redb::Key + 'static,
    T: DeserializeOwned,
    R: ReadableTable<K, &'static [u8]>,
{
    let mut rows = Vec::new();
    for entry in table.iter()? {
        let (_key, value) = entry?;
        rows.push(decode(value.value())?);
    }
    Ok(rows)
}

/// Decode every row of a dimension table, empty if the table is missing
pub(crate) fn read_table<K, T>(
    txn: &ReadTransaction,
    definition: TableDefinition<K, &'static [u8]>,
) -> Result<Vec<T>, StoreError>
where
    K: Key + 'static,
    T: DeserializeOwned,
{
    match open_existing(txn, definition)? {
        Some(table) => read_rows(&table),
        None => Ok(Vec::new()),
    }
}
