use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::*;

/// Highest-confidence mapping whose variant matches `variant_name` case-insensitively.
///
/// Matches on the stored `variant_key` (see [`lookup_key`]); SQLite's `LOWER()`
/// folds ASCII only.
pub fn find_name_mapping(
    conn: &Connection,
    variant_name: &str,
) -> Result<Option<NameMapping>, DatabaseError> {
    let mapping = conn
        .query_row(
            "SELECT variant_name, canonical_name, confidence_score
             FROM parameter_name_mappings
             WHERE variant_key = ?1
             ORDER BY confidence_score DESC, id ASC
             LIMIT 1",
            params![lookup_key(variant_name)],
            |row| {
                Ok(NameMapping {
                    variant_name: row.get(0)?,
                    canonical_name: row.get(1)?,
                    confidence_score: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(mapping)
}

/// Conversion rule for `canonical_name`.
///
/// With a `source_unit`, matches it case-insensitively. Without one, returns the
/// first rule registered for the parameter, whose `target_unit` is the standard unit.
pub fn find_unit_conversion(
    conn: &Connection,
    canonical_name: &str,
    source_unit: Option<&str>,
) -> Result<Option<UnitConversionRule>, DatabaseError> {
    let rule = match source_unit {
        Some(unit) => conn
            .query_row(
                "SELECT canonical_parameter_name, source_unit, target_unit,
                 conversion_factor, confidence_score
                 FROM unit_conversion_rules
                 WHERE canonical_parameter_name = ?1 AND source_unit_key = ?2
                 ORDER BY id ASC
                 LIMIT 1",
                params![canonical_name, lookup_key(unit)],
                rule_from_row,
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT canonical_parameter_name, source_unit, target_unit,
                 conversion_factor, confidence_score
                 FROM unit_conversion_rules
                 WHERE canonical_parameter_name = ?1
                 ORDER BY id ASC
                 LIMIT 1",
                params![canonical_name],
                rule_from_row,
            )
            .optional()?,
    };
    Ok(rule)
}

pub fn find_reference_range(
    conn: &Connection,
    canonical_name: &str,
    standard_unit: &str,
) -> Result<Option<StandardReferenceRange>, DatabaseError> {
    let range = conn
        .query_row(
            "SELECT canonical_parameter_name, standard_unit, range_min, range_max,
             confidence_score
             FROM standard_reference_ranges
             WHERE canonical_parameter_name = ?1 AND standard_unit = ?2
             LIMIT 1",
            params![canonical_name, standard_unit],
            |row| {
                Ok(StandardReferenceRange {
                    canonical_parameter_name: row.get(0)?,
                    standard_unit: row.get(1)?,
                    range_min: row.get(2)?,
                    range_max: row.get(3)?,
                    confidence_score: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(range)
}

fn rule_from_row(row: &rusqlite::Row<'_>) -> Result<UnitConversionRule, rusqlite::Error> {
    Ok(UnitConversionRule {
        canonical_parameter_name: row.get(0)?,
        source_unit: row.get(1)?,
        target_unit: row.get(2)?,
        conversion_factor: row.get(3)?,
        confidence_score: row.get(4)?,
    })
}

pub fn insert_name_mapping(conn: &Connection, mapping: &NameMapping) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO parameter_name_mappings (variant_name, variant_key, canonical_name,
         confidence_score)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (variant_name, canonical_name)
         DO UPDATE SET confidence_score = excluded.confidence_score",
        params![
            mapping.variant_name,
            lookup_key(&mapping.variant_name),
            mapping.canonical_name,
            mapping.confidence_score,
        ],
    )?;
    Ok(())
}

pub fn insert_unit_conversion(
    conn: &Connection,
    rule: &UnitConversionRule,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO unit_conversion_rules (canonical_parameter_name, source_unit,
         source_unit_key, target_unit, conversion_factor, confidence_score)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (canonical_parameter_name, source_unit)
         DO UPDATE SET target_unit = excluded.target_unit,
                       conversion_factor = excluded.conversion_factor,
                       confidence_score = excluded.confidence_score",
        params![
            rule.canonical_parameter_name,
            rule.source_unit,
            lookup_key(&rule.source_unit),
            rule.target_unit,
            rule.conversion_factor,
            rule.confidence_score,
        ],
    )?;
    Ok(())
}

pub fn insert_reference_range(
    conn: &Connection,
    range: &StandardReferenceRange,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO standard_reference_ranges (canonical_parameter_name, standard_unit,
         range_min, range_max, confidence_score)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (canonical_parameter_name, standard_unit)
         DO UPDATE SET range_min = excluded.range_min,
                       range_max = excluded.range_max,
                       confidence_score = excluded.confidence_score",
        params![
            range.canonical_parameter_name,
            range.standard_unit,
            range.range_min,
            range.range_max,
            range.confidence_score,
        ],
    )?;
    Ok(())
}

/// Row counts written by [`seed_reference_tables`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SeedCounts {
    pub name_mappings: usize,
    pub unit_conversions: usize,
    pub reference_ranges: usize,
}

/// Upsert all three reference tables in a single transaction.
pub fn seed_reference_tables(
    conn: &Connection,
    mappings: &[NameMapping],
    rules: &[UnitConversionRule],
    ranges: &[StandardReferenceRange],
) -> Result<SeedCounts, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    for mapping in mappings {
        insert_name_mapping(&tx, mapping)?;
    }
    for rule in rules {
        insert_unit_conversion(&tx, rule)?;
    }
    for range in ranges {
        insert_reference_range(&tx, range)?;
    }
    tx.commit()?;

    Ok(SeedCounts {
        name_mappings: mappings.len(),
        unit_conversions: rules.len(),
        reference_ranges: ranges.len(),
    })
}
