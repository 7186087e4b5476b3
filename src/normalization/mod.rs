//! Lab parameter normalization.
//!
//! A raw report parameter is taken through three stages (name mapping, unit
//! conversion, reference range alignment). Each stage decision is audited,
//! the normalized record is persisted, and the caller receives a
//! [`NormalizationResult`] whether or not normalization succeeded.

pub mod audit;
pub mod confidence;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod reference_data;
pub mod traits;
pub mod types;

pub use audit::{flush_audit_trail, AuditTrail, FlushReport};
pub use engine::{LabDataNormalizer, NameMatch, RangeAlignment, Staged, UnitConversion};
pub use error::NormalizationError;
pub use orchestrator::{normalize_batch, normalize_one, LabNormalizer};
pub use reference_data::ReferenceData;
pub use traits::{AuditSink, ReferenceLookup};
pub use types::{BatchResult, NormalizationResult};
