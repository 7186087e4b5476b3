use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::NormalizationStatus;

/// A lab parameter as handed over by the extraction layer, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawParameter {
    pub parameter_id: String,
    pub user_id: String,
    pub parameter_name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
    /// Free-text range printed on the report. Carried along, not interpreted.
    #[serde(default)]
    pub reference_range: Option<String>,
}

impl RawParameter {
    /// The unit, with empty or whitespace-only strings treated as absent.
    pub fn effective_unit(&self) -> Option<&str> {
        self.unit.as_deref().filter(|u| !u.trim().is_empty())
    }
}

/// Stored source parameter with its normalization status marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthParameter {
    pub parameter_id: String,
    pub user_id: String,
    pub parameter_name: String,
    pub value: f64,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub normalization_status: NormalizationStatus,
    pub created_at: NaiveDateTime,
}
