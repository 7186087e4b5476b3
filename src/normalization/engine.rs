//! Three-stage lab parameter normalization: name → unit → reference range.
//!
//! Every stage consults the reference tables through a [`ReferenceLookup`] and
//! hands back its outcome together with exactly one [`OperationLogEntry`]
//! describing what it decided. Stages never fail: lookup faults become a
//! `failed` entry plus the stage's miss sentinel.

use serde::Serialize;

use super::confidence::thresholds;
use super::traits::ReferenceLookup;
use crate::models::*;

/// A stage outcome paired with the audit entry it produced.
#[derive(Debug, Clone)]
pub struct Staged<T> {
    pub outcome: T,
    pub entry: OperationLogEntry,
}

impl<T> Staged<T> {
    fn new(outcome: T, entry: OperationLogEntry) -> Self {
        Self { outcome, entry }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameMatch {
    pub canonical_name: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitConversion {
    /// `None` means the value could not be brought into a standard unit.
    pub normalized_value: Option<f64>,
    pub standard_unit: Option<String>,
    pub conversion_factor: Option<f64>,
    pub confidence: f64,
}

impl UnitConversion {
    fn unconvertible() -> Self {
        Self {
            normalized_value: None,
            standard_unit: None,
            conversion_factor: None,
            confidence: thresholds::NONE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeAlignment {
    pub range_min: Option<f64>,
    pub range_max: Option<f64>,
    pub confidence: f64,
}

impl RangeAlignment {
    pub fn has_bounds(&self) -> bool {
        self.range_min.is_some() || self.range_max.is_some()
    }
}

/// Stateless stage executor over a reference source.
pub struct LabDataNormalizer<'a> {
    lookup: &'a dyn ReferenceLookup,
}

impl<'a> LabDataNormalizer<'a> {
    pub fn new(lookup: &'a dyn ReferenceLookup) -> Self {
        Self { lookup }
    }

    /// Stage 1: map a report name onto its canonical parameter name.
    pub fn normalize_parameter_name(
        &self,
        original_name: &str,
        parameter_id: &str,
    ) -> Staged<NameMatch> {
        let op = NormalizationOperation::NameMapping;

        match self.lookup.find_name_mapping(original_name) {
            Ok(Some(mapping)) => {
                tracing::debug!(%parameter_id, operation = %op, "Name mapped");
                let entry = OperationLogEntry::new(parameter_id, op, OperationStatus::Success)
                    .original_name(original_name)
                    .canonical_name(&mapping.canonical_name);
                Staged::new(
                    NameMatch {
                        canonical_name: Some(mapping.canonical_name),
                        confidence: mapping.confidence_score,
                    },
                    entry,
                )
            }
            Ok(None) => {
                tracing::warn!(%parameter_id, operation = %op, "No canonical mapping, flagged");
                let entry = OperationLogEntry::new(parameter_id, op, OperationStatus::Flagged)
                    .original_name(original_name)
                    .failure_reason(format!("No canonical mapping found for '{original_name}'"));
                Staged::new(
                    NameMatch { canonical_name: None, confidence: thresholds::NONE },
                    entry,
                )
            }
            Err(e) => {
                tracing::warn!(%parameter_id, operation = %op, error = %e, "Name lookup failed");
                let entry = OperationLogEntry::new(parameter_id, op, OperationStatus::Failed)
                    .original_name(original_name)
                    .failure_reason(e.to_string());
                Staged::new(
                    NameMatch { canonical_name: None, confidence: thresholds::NONE },
                    entry,
                )
            }
        }
    }

    /// Stage 2: bring the value into the canonical parameter's standard unit.
    ///
    /// `canonical_name` must come from a successful name stage. A missing (or
    /// blank) unit passes the value through at reduced confidence.
    pub fn convert_unit(
        &self,
        value: f64,
        original_unit: Option<&str>,
        canonical_name: &str,
        parameter_id: &str,
    ) -> Staged<UnitConversion> {
        let op = NormalizationOperation::UnitConversion;

        let Some(unit) = original_unit.filter(|u| !u.trim().is_empty()) else {
            tracing::warn!(
                %parameter_id,
                operation = %op,
                "No unit provided, value passed through"
            );
            let entry = OperationLogEntry::new(parameter_id, op, OperationStatus::Flagged)
                .original_value(value)
                .canonical_name(canonical_name)
                .failure_reason("No unit provided in source data");
            return Staged::new(
                UnitConversion {
                    normalized_value: Some(value),
                    standard_unit: None,
                    conversion_factor: None,
                    confidence: thresholds::NO_UNIT,
                },
                entry,
            );
        };

        let base = OperationLogEntry::new(parameter_id, op, OperationStatus::Success)
            .original_value(value)
            .original_unit(Some(unit))
            .canonical_name(canonical_name);

        match self.resolve_unit(value, unit, canonical_name) {
            Ok(Some(conversion)) => {
                tracing::debug!(%parameter_id, operation = %op, "Unit converted");
                let mut entry = base;
                if let Some(normalized) = conversion.normalized_value {
                    entry = entry.normalized_value(normalized);
                }
                if let Some(factor) = conversion.conversion_factor {
                    entry = entry.conversion_factor(factor);
                }
                let entry = entry.standard_unit(conversion.standard_unit.as_deref());
                Staged::new(conversion, entry)
            }
            Ok(None) => {
                tracing::warn!(%parameter_id, operation = %op, "No conversion rule, flagged");
                let entry = OperationLogEntry {
                    status: OperationStatus::Flagged,
                    ..base
                }
                .failure_reason(format!("No conversion rule for '{unit}' to standard unit"));
                Staged::new(UnitConversion::unconvertible(), entry)
            }
            Err(e) => {
                tracing::warn!(%parameter_id, operation = %op, error = %e, "Unit lookup failed");
                let entry = OperationLogEntry {
                    status: OperationStatus::Failed,
                    ..base
                }
                .failure_reason(e.to_string());
                Staged::new(UnitConversion::unconvertible(), entry)
            }
        }
    }

    /// Rule lookup, then the already-standard check. `Ok(None)` when neither applies.
    fn resolve_unit(
        &self,
        value: f64,
        unit: &str,
        canonical_name: &str,
    ) -> Result<Option<UnitConversion>, crate::db::DatabaseError> {
        if let Some(rule) = self.lookup.find_unit_conversion(canonical_name, Some(unit))? {
            return Ok(Some(UnitConversion {
                normalized_value: Some(value * rule.conversion_factor),
                standard_unit: Some(rule.target_unit),
                conversion_factor: Some(rule.conversion_factor),
                confidence: rule.confidence_score,
            }));
        }

        let standard = self.lookup.find_unit_conversion(canonical_name, None)?;
        match standard {
            Some(rule) if rule.target_unit.to_lowercase() == unit.to_lowercase() => {
                Ok(Some(UnitConversion {
                    normalized_value: Some(value),
                    standard_unit: Some(unit.to_string()),
                    conversion_factor: Some(1.0),
                    confidence: thresholds::ALREADY_STANDARD,
                }))
            }
            _ => Ok(None),
        }
    }

    /// Stage 3: attach the standard reference range. Never blocks success.
    pub fn align_reference_range(
        &self,
        canonical_name: &str,
        standard_unit: Option<&str>,
        parameter_id: &str,
    ) -> Staged<RangeAlignment> {
        let op = NormalizationOperation::RangeAlignment;
        let base = OperationLogEntry::new(parameter_id, op, OperationStatus::Success)
            .canonical_name(canonical_name)
            .standard_unit(standard_unit);
        let unverified = RangeAlignment {
            range_min: None,
            range_max: None,
            confidence: thresholds::MISSING_RANGE,
        };

        let Some(unit) = standard_unit else {
            tracing::warn!(%parameter_id, operation = %op, "No standard unit, range not aligned");
            let entry = OperationLogEntry {
                status: OperationStatus::Flagged,
                ..base
            }
            .failure_reason(format!(
                "No standard unit to align a reference range for '{canonical_name}'"
            ));
            return Staged::new(unverified, entry);
        };

        match self.lookup.find_reference_range(canonical_name, unit) {
            Ok(Some(range)) => {
                tracing::debug!(%parameter_id, operation = %op, "Reference range aligned");
                Staged::new(
                    RangeAlignment {
                        range_min: range.range_min,
                        range_max: range.range_max,
                        confidence: range.confidence_score,
                    },
                    base,
                )
            }
            Ok(None) => {
                tracing::warn!(%parameter_id, operation = %op, "No reference range, flagged");
                let entry = OperationLogEntry {
                    status: OperationStatus::Flagged,
                    ..base
                }
                .failure_reason(format!(
                    "No reference range found for '{canonical_name}' in unit '{unit}'"
                ));
                Staged::new(unverified, entry)
            }
            Err(e) => {
                tracing::warn!(%parameter_id, operation = %op, error = %e, "Range lookup failed");
                let entry = OperationLogEntry {
                    status: OperationStatus::Failed,
                    ..base
                }
                .failure_reason(e.to_string());
                Staged::new(
                    RangeAlignment {
                        range_min: None,
                        range_max: None,
                        confidence: thresholds::NONE,
                    },
                    entry,
                )
            }
        }
    }
}
