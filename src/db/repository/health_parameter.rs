use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::*;

/// Register a source parameter with status `pending`.
pub fn insert_health_parameter(conn: &Connection, raw: &RawParameter) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO health_parameters (parameter_id, user_id, parameter_name, value, unit,
         reference_range, normalization_status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            raw.parameter_id,
            raw.user_id,
            raw.parameter_name,
            raw.value,
            raw.unit,
            raw.reference_range,
            NormalizationStatus::Pending.as_str(),
            chrono::Utc::now().naive_utc(),
        ],
    )?;
    Ok(())
}

/// Set the status marker. Returns false when no such parameter is stored,
/// which callers normalizing unregistered parameters may ignore.
pub fn update_normalization_status(
    conn: &Connection,
    parameter_id: &str,
    status: NormalizationStatus,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE health_parameters SET normalization_status = ?1 WHERE parameter_id = ?2",
        params![status.as_str(), parameter_id],
    )?;
    Ok(changed > 0)
}

pub fn get_health_parameter(
    conn: &Connection,
    parameter_id: &str,
) -> Result<Option<HealthParameter>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT parameter_id, user_id, parameter_name, value, unit, reference_range,
             normalization_status, created_at
             FROM health_parameters WHERE parameter_id = ?1",
            params![parameter_id],
            |row| {
                Ok(HealthParameterRow {
                    parameter_id: row.get(0)?,
                    user_id: row.get(1)?,
                    parameter_name: row.get(2)?,
                    value: row.get(3)?,
                    unit: row.get(4)?,
                    reference_range: row.get(5)?,
                    normalization_status: row.get(6)?,
                    created_at: row.get(7)?,
                })
            },
        )
        .optional()?;

    row.map(health_parameter_from_row).transpose()
}

// Internal row type for HealthParameter mapping
struct HealthParameterRow {
    parameter_id: String,
    user_id: String,
    parameter_name: String,
    value: f64,
    unit: Option<String>,
    reference_range: Option<String>,
    normalization_status: String,
    created_at: NaiveDateTime,
}

fn health_parameter_from_row(row: HealthParameterRow) -> Result<HealthParameter, DatabaseError> {
    Ok(HealthParameter {
        parameter_id: row.parameter_id,
        user_id: row.user_id,
        parameter_name: row.parameter_name,
        value: row.value,
        unit: row.unit,
        reference_range: row.reference_range,
        normalization_status: NormalizationStatus::from_str(&row.normalization_status)?,
        created_at: row.created_at,
    })
}
