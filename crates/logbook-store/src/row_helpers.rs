use logbook_core::TimeUuid;

use crate::error::StoreError;
use crate::session::{CqlValue, Row};

fn column<'r>(
    row: &'r Row,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<&'r CqlValue, StoreError> {
    match row.columns.get(idx) {
        Some(Some(value)) => Ok(value),
        Some(None) => Err(StoreError::CorruptRow {
            table,
            column,
            detail: "unexpected null".into(),
        }),
        None => Err(StoreError::CorruptRow {
            table,
            column,
            detail: format!("row has {} columns, wanted index {idx}", row.columns.len()),
        }),
    }
}

/// Get a required text column.
pub fn get_text(
    row: &Row,
    idx: usize,
    table: &'static str,
    name: &'static str,
) -> Result<String, StoreError> {
    match column(row, idx, table, name)? {
        CqlValue::Text(s) | CqlValue::Ascii(s) => Ok(s.clone()),
        other => Err(type_mismatch(table, name, "text", other)),
    }
}

/// Get a required timeuuid column.
pub fn get_timeuuid(
    row: &Row,
    idx: usize,
    table: &'static str,
    name: &'static str,
) -> Result<TimeUuid, StoreError> {
    match column(row, idx, table, name)? {
        CqlValue::Timeuuid(t) => {
            TimeUuid::from_uuid(uuid::Uuid::from(t.clone())).map_err(|e| StoreError::CorruptRow {
                table,
                column: name,
                detail: e.to_string(),
            })
        }
        other => Err(type_mismatch(table, name, "timeuuid", other)),
    }
}

/// Get a required counter column.
pub fn get_counter(
    row: &Row,
    idx: usize,
    table: &'static str,
    name: &'static str,
) -> Result<i64, StoreError> {
    match column(row, idx, table, name)? {
        CqlValue::Counter(c) => Ok(c.0),
        CqlValue::BigInt(n) => Ok(*n),
        other => Err(type_mismatch(table, name, "counter", other)),
    }
}

fn type_mismatch(table: &'static str, column: &'static str, wanted: &str, got: &CqlValue) -> StoreError {
    StoreError::CorruptRow {
        table,
        column,
        detail: format!("expected {wanted}, got {got:?}"),
    }
}
