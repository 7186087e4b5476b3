use serde::{Deserialize, Serialize};

/// Case-folded form used to match variant names and source units.
///
/// The database stores this alongside the original text, so in-memory and
/// SQLite lookups agree on non-ASCII input.
pub fn lookup_key(text: &str) -> String {
    text.to_lowercase()
}

/// Name variant → canonical parameter name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameMapping {
    pub variant_name: String,
    pub canonical_name: String,
    pub confidence_score: f64,
}

/// Multiplicative conversion from a source unit into the parameter's standard unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConversionRule {
    pub canonical_parameter_name: String,
    pub source_unit: String,
    pub target_unit: String,
    pub conversion_factor: f64,
    pub confidence_score: f64,
}

/// Reference range for a canonical parameter in its standard unit.
/// Either bound may be open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardReferenceRange {
    pub canonical_parameter_name: String,
    pub standard_unit: String,
    pub range_min: Option<f64>,
    pub range_max: Option<f64>,
    pub confidence_score: f64,
}
