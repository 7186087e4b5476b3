/// Confidence policy for normalization outcomes
pub mod thresholds {
    /// Below this overall score a successful normalization is flagged for review
    pub const LOW_CONFIDENCE: f64 = 0.70;

    /// Unit stage when the report carried no unit and the value is passed through
    pub const NO_UNIT: f64 = 0.50;

    /// Range stage when no reference range is registered
    pub const MISSING_RANGE: f64 = 0.50;

    /// Unit stage when the reported unit already is the standard unit
    pub const ALREADY_STANDARD: f64 = 1.0;

    /// Any stage that missed or faulted
    pub const NONE: f64 = 0.0;
}

/// Overall confidence: unweighted mean of the three stage confidences.
pub fn overall_confidence(name: f64, unit: f64, range: f64) -> f64 {
    ((name + unit + range) / 3.0).clamp(0.0, 1.0)
}

pub fn needs_review(overall: f64) -> bool {
    overall < thresholds::LOW_CONFIDENCE
}
