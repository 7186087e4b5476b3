use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::{NormalizationOperation, OperationStatus};

/// One stage attempt of one normalization run. Append-only.
///
/// Only the fields relevant to the stage and its outcome are populated:
/// name mapping fills `original_name`/`canonical_name`, unit conversion adds
/// the value/unit/factor fields, range alignment `canonical_name`/`standard_unit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub parameter_id: String,
    pub operation: NormalizationOperation,
    pub status: OperationStatus,
    pub original_value: Option<f64>,
    pub original_unit: Option<String>,
    pub original_name: Option<String>,
    pub normalized_value: Option<f64>,
    pub standard_unit: Option<String>,
    pub canonical_name: Option<String>,
    pub conversion_factor: Option<f64>,
    pub failure_reason: Option<String>,
    pub recorded_at: NaiveDateTime,
}

impl OperationLogEntry {
    pub fn new(
        parameter_id: &str,
        operation: NormalizationOperation,
        status: OperationStatus,
    ) -> Self {
        Self {
            parameter_id: parameter_id.to_string(),
            operation,
            status,
            original_value: None,
            original_unit: None,
            original_name: None,
            normalized_value: None,
            standard_unit: None,
            canonical_name: None,
            conversion_factor: None,
            failure_reason: None,
            recorded_at: chrono::Utc::now().naive_utc(),
        }
    }

    pub fn original_value(mut self, value: f64) -> Self {
        self.original_value = Some(value);
        self
    }

    pub fn original_unit(mut self, unit: Option<&str>) -> Self {
        self.original_unit = unit.map(str::to_string);
        self
    }

    pub fn original_name(mut self, name: &str) -> Self {
        self.original_name = Some(name.to_string());
        self
    }

    pub fn normalized_value(mut self, value: f64) -> Self {
        self.normalized_value = Some(value);
        self
    }

    pub fn standard_unit(mut self, unit: Option<&str>) -> Self {
        self.standard_unit = unit.map(str::to_string);
        self
    }

    pub fn canonical_name(mut self, name: &str) -> Self {
        self.canonical_name = Some(name.to_string());
        self
    }

    pub fn conversion_factor(mut self, factor: f64) -> Self {
        self.conversion_factor = Some(factor);
        self
    }

    pub fn failure_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }
}
