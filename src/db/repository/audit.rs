use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::*;

/// Append one entry to the normalization audit trail.
pub fn insert_audit_entry(
    conn: &Connection,
    entry: &OperationLogEntry,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO normalization_audit_logs (parameter_id, operation, status,
         original_value, original_unit, original_name, normalized_value, standard_unit,
         canonical_name, conversion_factor, failure_reason, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            entry.parameter_id,
            entry.operation.as_str(),
            entry.status.as_str(),
            entry.original_value,
            entry.original_unit,
            entry.original_name,
            entry.normalized_value,
            entry.standard_unit,
            entry.canonical_name,
            entry.conversion_factor,
            entry.failure_reason,
            entry.recorded_at,
        ],
    )?;
    Ok(())
}

/// Audit trail of a parameter across all runs, in append order.
pub fn get_audit_entries_for_parameter(
    conn: &Connection,
    parameter_id: &str,
) -> Result<Vec<OperationLogEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT parameter_id, operation, status, original_value, original_unit, original_name,
         normalized_value, standard_unit, canonical_name, conversion_factor, failure_reason,
         recorded_at
         FROM normalization_audit_logs WHERE parameter_id = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![parameter_id], |row| {
        Ok(AuditRow {
            parameter_id: row.get(0)?,
            operation: row.get(1)?,
            status: row.get(2)?,
            original_value: row.get(3)?,
            original_unit: row.get(4)?,
            original_name: row.get(5)?,
            normalized_value: row.get(6)?,
            standard_unit: row.get(7)?,
            canonical_name: row.get(8)?,
            conversion_factor: row.get(9)?,
            failure_reason: row.get(10)?,
            recorded_at: row.get(11)?,
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(audit_entry_from_row(row?)?);
    }
    Ok(entries)
}

pub fn count_audit_entries(conn: &Connection, parameter_id: &str) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM normalization_audit_logs WHERE parameter_id = ?1",
        params![parameter_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

struct AuditRow {
    parameter_id: String,
    operation: String,
    status: String,
    original_value: Option<f64>,
    original_unit: Option<String>,
    original_name: Option<String>,
    normalized_value: Option<f64>,
    standard_unit: Option<String>,
    canonical_name: Option<String>,
    conversion_factor: Option<f64>,
    failure_reason: Option<String>,
    recorded_at: NaiveDateTime,
}

fn audit_entry_from_row(row: AuditRow) -> Result<OperationLogEntry, DatabaseError> {
    Ok(OperationLogEntry {
        parameter_id: row.parameter_id,
        operation: NormalizationOperation::from_str(&row.operation)?,
        status: OperationStatus::from_str(&row.status)?,
        original_value: row.original_value,
        original_unit: row.original_unit,
        original_name: row.original_name,
        normalized_value: row.normalized_value,
        standard_unit: row.standard_unit,
        canonical_name: row.canonical_name,
        conversion_factor: row.conversion_factor,
        failure_reason: row.failure_reason,
        recorded_at: row.recorded_at,
    })
}
