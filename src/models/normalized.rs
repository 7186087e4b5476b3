use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Output of a fully successful normalization. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedParameter {
    pub normalized_parameter_id: Uuid,
    pub original_parameter_id: String,
    pub user_id: String,
    pub canonical_name: String,
    pub original_value: f64,
    pub original_unit: Option<String>,
    pub normalized_value: f64,
    /// Absent only when the report carried no unit and the value was passed through.
    pub standard_unit: Option<String>,
    pub conversion_factor: Option<f64>,
    pub reference_range_min: Option<f64>,
    pub reference_range_max: Option<f64>,
    pub normalization_confidence: f64,
    pub normalized_at: NaiveDateTime,
}
