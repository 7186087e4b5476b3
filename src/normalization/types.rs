use serde::{Deserialize, Serialize};

use crate::models::NormalizedParameter;

/// Outcome of one normalization attempt. Always fully formed: callers inspect
/// `success` and `flagged_for_review` rather than expecting an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationResult {
    pub success: bool,
    pub normalized_parameter: Option<NormalizedParameter>,
    pub operations_logged: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub flagged_for_review: bool,
}

impl NormalizationResult {
    /// Failed attempt that a human needs to look at.
    pub fn flagged_failure(error: impl Into<String>, operations_logged: usize) -> Self {
        Self {
            success: false,
            normalized_parameter: None,
            operations_logged,
            errors: vec![error.into()],
            warnings: Vec::new(),
            flagged_for_review: true,
        }
    }
}

/// Aggregate over a batch; `results[i]` belongs to input `i`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub flagged: usize,
    pub results: Vec<NormalizationResult>,
}

impl BatchResult {
    pub fn push(&mut self, result: NormalizationResult) {
        self.total += 1;
        if result.success {
            self.successful += 1;
        } else {
            self.failed += 1;
        }
        if result.flagged_for_review {
            self.flagged += 1;
        }
        self.results.push(result);
    }

    pub fn all_successful(&self) -> bool {
        self.failed == 0
    }
}
