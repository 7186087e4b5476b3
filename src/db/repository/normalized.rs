use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_normalized_parameter(
    conn: &Connection,
    param: &NormalizedParameter,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO normalized_parameters (normalized_parameter_id, original_parameter_id,
         user_id, canonical_name, original_value, original_unit, normalized_value,
         standard_unit, conversion_factor, reference_range_min, reference_range_max,
         normalization_confidence, normalized_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            param.normalized_parameter_id.to_string(),
            param.original_parameter_id,
            param.user_id,
            param.canonical_name,
            param.original_value,
            param.original_unit,
            param.normalized_value,
            param.standard_unit,
            param.conversion_factor,
            param.reference_range_min,
            param.reference_range_max,
            param.normalization_confidence,
            param.normalized_at,
        ],
    )?;
    Ok(())
}

pub fn get_normalized_parameter(
    conn: &Connection,
    id: &Uuid,
) -> Result<Option<NormalizedParameter>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT normalized_parameter_id, original_parameter_id, user_id, canonical_name,
             original_value, original_unit, normalized_value, standard_unit, conversion_factor,
             reference_range_min, reference_range_max, normalization_confidence, normalized_at
             FROM normalized_parameters WHERE normalized_parameter_id = ?1",
            params![id.to_string()],
            normalized_row_from_rusqlite,
        )
        .optional()?;

    row.map(normalized_from_row).transpose()
}

/// Every normalization run recorded for a source parameter, oldest first.
pub fn get_normalized_for_parameter(
    conn: &Connection,
    original_parameter_id: &str,
) -> Result<Vec<NormalizedParameter>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT normalized_parameter_id, original_parameter_id, user_id, canonical_name,
         original_value, original_unit, normalized_value, standard_unit, conversion_factor,
         reference_range_min, reference_range_max, normalization_confidence, normalized_at
         FROM normalized_parameters WHERE original_parameter_id = ?1
         ORDER BY normalized_at ASC, rowid ASC",
    )?;

    let rows = stmt.query_map(params![original_parameter_id], normalized_row_from_rusqlite)?;

    let mut runs = Vec::new();
    for row in rows {
        runs.push(normalized_from_row(row?)?);
    }
    Ok(runs)
}

// Internal row type for NormalizedParameter mapping
struct NormalizedRow {
    normalized_parameter_id: String,
    original_parameter_id: String,
    user_id: String,
    canonical_name: String,
    original_value: f64,
    original_unit: Option<String>,
    normalized_value: f64,
    standard_unit: Option<String>,
    conversion_factor: Option<f64>,
    reference_range_min: Option<f64>,
    reference_range_max: Option<f64>,
    normalization_confidence: f64,
    normalized_at: NaiveDateTime,
}

fn normalized_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<NormalizedRow, rusqlite::Error> {
    Ok(NormalizedRow {
        normalized_parameter_id: row.get(0)?,
        original_parameter_id: row.get(1)?,
        user_id: row.get(2)?,
        canonical_name: row.get(3)?,
        original_value: row.get(4)?,
        original_unit: row.get(5)?,
        normalized_value: row.get(6)?,
        standard_unit: row.get(7)?,
        conversion_factor: row.get(8)?,
        reference_range_min: row.get(9)?,
        reference_range_max: row.get(10)?,
        normalization_confidence: row.get(11)?,
        normalized_at: row.get(12)?,
    })
}

fn normalized_from_row(row: NormalizedRow) -> Result<NormalizedParameter, DatabaseError> {
    Ok(NormalizedParameter {
        normalized_parameter_id: Uuid::parse_str(&row.normalized_parameter_id)
            .map_err(|source| DatabaseError::InvalidUuid {
                field: "normalized_parameter_id",
                source,
            })?,
        original_parameter_id: row.original_parameter_id,
        user_id: row.user_id,
        canonical_name: row.canonical_name,
        original_value: row.original_value,
        original_unit: row.original_unit,
        normalized_value: row.normalized_value,
        standard_unit: row.standard_unit,
        conversion_factor: row.conversion_factor,
        reference_range_min: row.reference_range_min,
        reference_range_max: row.reference_range_max,
        normalization_confidence: row.normalization_confidence,
        normalized_at: row.normalized_at,
    })
}
