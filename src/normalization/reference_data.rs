use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::NormalizationError;
use super::traits::ReferenceLookup;
use crate::db::{repository, DatabaseError};
use crate::models::*;

const NAME_MAPPINGS_FILE: &str = "name_mappings.json";
const UNIT_CONVERSIONS_FILE: &str = "unit_conversions.json";
const REFERENCE_RANGES_FILE: &str = "reference_ranges.json";

/// The three reference tables held in memory.
///
/// Answers the same queries as the SQLite tables with the same matching rules,
/// so it can stand in for the database as a [`ReferenceLookup`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceData {
    pub name_mappings: Vec<NameMapping>,
    pub unit_conversions: Vec<UnitConversionRule>,
    pub reference_ranges: Vec<StandardReferenceRange>,
}

impl ReferenceData {
    /// Load reference data from a directory of JSON files.
    pub fn load(dir: &Path) -> Result<Self, NormalizationError> {
        let data = Self {
            name_mappings: read_json(dir, NAME_MAPPINGS_FILE)?,
            unit_conversions: read_json(dir, UNIT_CONVERSIONS_FILE)?,
            reference_ranges: read_json(dir, REFERENCE_RANGES_FILE)?,
        };
        data.validate()?;
        Ok(data)
    }

    /// Reference data shipped with the crate.
    pub fn bundled() -> Result<Self, NormalizationError> {
        let data = Self {
            name_mappings: parse_json(
                NAME_MAPPINGS_FILE,
                include_str!("../../resources/reference/name_mappings.json"),
            )?,
            unit_conversions: parse_json(
                UNIT_CONVERSIONS_FILE,
                include_str!("../../resources/reference/unit_conversions.json"),
            )?,
            reference_ranges: parse_json(
                REFERENCE_RANGES_FILE,
                include_str!("../../resources/reference/reference_ranges.json"),
            )?,
        };
        data.validate()?;
        Ok(data)
    }

    /// Reject rows the engine could not use safely: confidences outside
    /// [0, 1], non-positive or non-finite factors, inverted ranges.
    pub fn validate(&self) -> Result<(), NormalizationError> {
        for m in &self.name_mappings {
            check_confidence(m.confidence_score, || format!("name mapping '{}'", m.variant_name))?;
        }
        for r in &self.unit_conversions {
            let what = || {
                format!(
                    "unit conversion {} {} -> {}",
                    r.canonical_parameter_name, r.source_unit, r.target_unit
                )
            };
            check_confidence(r.confidence_score, what)?;
            if !(r.conversion_factor.is_finite() && r.conversion_factor > 0.0) {
                return Err(NormalizationError::InvalidInput(format!(
                    "{}: conversion factor must be positive",
                    what()
                )));
            }
        }
        for r in &self.reference_ranges {
            let what = || {
                format!("reference range {} ({})", r.canonical_parameter_name, r.standard_unit)
            };
            check_confidence(r.confidence_score, what)?;
            if let (Some(min), Some(max)) = (r.range_min, r.range_max) {
                if min > max {
                    return Err(NormalizationError::InvalidInput(format!(
                        "{}: min {min} above max {max}",
                        what()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Upsert every table into the database.
    pub fn seed(
        &self,
        conn: &rusqlite::Connection,
    ) -> Result<repository::SeedCounts, NormalizationError> {
        let counts = repository::seed_reference_tables(
            conn,
            &self.name_mappings,
            &self.unit_conversions,
            &self.reference_ranges,
        )?;
        tracing::info!(
            name_mappings = counts.name_mappings,
            unit_conversions = counts.unit_conversions,
            reference_ranges = counts.reference_ranges,
            "Reference tables seeded"
        );
        Ok(counts)
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(
    dir: &Path,
    file: &str,
) -> Result<Vec<T>, NormalizationError> {
    let path = dir.join(file);
    let json = std::fs::read_to_string(&path).map_err(|e| {
        NormalizationError::ReferenceDataLoad(path.display().to_string(), e.to_string())
    })?;
    parse_json(file, &json)
}

fn parse_json<T: for<'de> Deserialize<'de>>(
    file: &str,
    json: &str,
) -> Result<Vec<T>, NormalizationError> {
    serde_json::from_str(json)
        .map_err(|e| NormalizationError::ReferenceDataParse(file.into(), e.to_string()))
}

fn check_confidence(score: f64, what: impl Fn() -> String) -> Result<(), NormalizationError> {
    if (0.0..=1.0).contains(&score) {
        Ok(())
    } else {
        Err(NormalizationError::InvalidInput(format!(
            "{}: confidence {score} outside [0, 1]",
            what()
        )))
    }
}

impl ReferenceLookup for ReferenceData {
    fn find_name_mapping(&self, variant_name: &str) -> Result<Option<NameMapping>, DatabaseError> {
        let key = lookup_key(variant_name);
        let mut best: Option<&NameMapping> = None;
        for mapping in self.name_mappings.iter().filter(|m| lookup_key(&m.variant_name) == key) {
            // First listed wins ties
            if best.map_or(true, |b| mapping.confidence_score > b.confidence_score) {
                best = Some(mapping);
            }
        }
        Ok(best.cloned())
    }

    fn find_unit_conversion(
        &self,
        canonical_name: &str,
        source_unit: Option<&str>,
    ) -> Result<Option<UnitConversionRule>, DatabaseError> {
        let source = source_unit.map(lookup_key);
        Ok(self
            .unit_conversions
            .iter()
            .filter(|r| r.canonical_parameter_name == canonical_name)
            .find(|r| source.as_deref().map_or(true, |s| lookup_key(&r.source_unit) == s))
            .cloned())
    }

    fn find_reference_range(
        &self,
        canonical_name: &str,
        standard_unit: &str,
    ) -> Result<Option<StandardReferenceRange>, DatabaseError> {
        Ok(self
            .reference_ranges
            .iter()
            .find(|r| {
                r.canonical_parameter_name == canonical_name && r.standard_unit == standard_unit
            })
            .cloned())
    }
}
