//! Normalization workflow: sequences the engine stages for one parameter,
//! persists the outcome, and shapes the public result.
//!
//! ```text
//! name ──miss──▶ FLAGGED (1 entry)
//!   │
//! unit ──miss──▶ FLAGGED (2 entries)
//!   │
//! range ─────────▶ persist record + status + audit ──▶ SUCCESS (3 entries)
//! ```
//!
//! Writes of one attempt share a SQLite transaction. Faults never escape:
//! they come back as a flagged result with an `Unexpected error` message.

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use super::audit::{flush_audit_trail, AuditTrail, FlushReport};
use super::confidence::{needs_review, overall_confidence};
use super::engine::LabDataNormalizer;
use super::error::NormalizationError;
use super::traits::ReferenceLookup;
use super::types::{BatchResult, NormalizationResult};
use crate::db::repository;
use crate::models::*;

/// Entry point for normalizing lab parameters into a database.
pub struct LabNormalizer<'c> {
    conn: &'c Connection,
    lookup: &'c dyn ReferenceLookup,
}

impl<'c> LabNormalizer<'c> {
    /// Reference data is read from the database's own reference tables.
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn, lookup: conn }
    }

    /// Reference data comes from `lookup`; results are still persisted into `conn`.
    pub fn with_lookup(conn: &'c Connection, lookup: &'c dyn ReferenceLookup) -> Self {
        Self { conn, lookup }
    }

    /// Normalize a single parameter. Never fails; see [`NormalizationResult`].
    pub fn normalize_one(&self, raw: &RawParameter) -> NormalizationResult {
        let mut trail = AuditTrail::new();

        match self.run_attempt(raw, &mut trail) {
            Ok(result) => {
                tracing::info!(
                    parameter_id = %raw.parameter_id,
                    success = result.success,
                    flagged = result.flagged_for_review,
                    operations = result.operations_logged,
                    "Normalization attempt finished"
                );
                result
            }
            Err(e) => {
                tracing::error!(
                    parameter_id = %raw.parameter_id,
                    error = %e,
                    "Normalization attempt aborted"
                );
                // Nothing from a failed attempt was committed; audit it on its own.
                let report = flush_audit_trail(self.conn, trail.entries());
                let mut result = NormalizationResult::flagged_failure(
                    format!("Unexpected error: {e}"),
                    trail.len(),
                );
                note_lost_audit_rows(&raw.parameter_id, report, &mut result.warnings);
                result
            }
        }
    }

    /// Normalize each parameter independently; results keep input order.
    pub fn normalize_batch(&self, params: &[RawParameter]) -> BatchResult {
        let mut batch = BatchResult::default();
        for raw in params {
            batch.push(self.normalize_one(raw));
        }

        tracing::info!(
            total = batch.total,
            successful = batch.successful,
            failed = batch.failed,
            flagged = batch.flagged,
            "Batch normalization complete"
        );
        batch
    }

    fn run_attempt(
        &self,
        raw: &RawParameter,
        trail: &mut AuditTrail,
    ) -> Result<NormalizationResult, NormalizationError> {
        let engine = LabDataNormalizer::new(self.lookup);
        let parameter_id = raw.parameter_id.as_str();

        if let Err(e) = check_input(raw) {
            tracing::warn!(%parameter_id, "Rejected parameter with a non-finite measurement");
            return self.finish_flagged(parameter_id, trail, e.to_string());
        }

        // Stage 1
        let name =
            trail.record(engine.normalize_parameter_name(&raw.parameter_name, parameter_id));
        let Some(canonical_name) = name.canonical_name else {
            let error = format!("Could not map parameter name: {}", raw.parameter_name);
            return self.finish_flagged(parameter_id, trail, error);
        };

        // Stage 2
        let unit = trail.record(engine.convert_unit(
            raw.value,
            raw.effective_unit(),
            &canonical_name,
            parameter_id,
        ));
        let Some(normalized_value) = unit.normalized_value else {
            let error =
                format!("Could not convert unit: {}", raw.unit.as_deref().unwrap_or_default());
            return self.finish_flagged(parameter_id, trail, error);
        };

        // Stage 3, always attempted
        let range = trail.record(engine.align_reference_range(
            &canonical_name,
            unit.standard_unit.as_deref(),
            parameter_id,
        ));

        let mut warnings = Vec::new();
        if !range.has_bounds() {
            warnings.push(format!("No reference range available for {canonical_name}"));
        }

        let overall = overall_confidence(name.confidence, unit.confidence, range.confidence);

        let record = NormalizedParameter {
            normalized_parameter_id: Uuid::new_v4(),
            original_parameter_id: raw.parameter_id.clone(),
            user_id: raw.user_id.clone(),
            canonical_name,
            original_value: raw.value,
            original_unit: raw.unit.clone(),
            normalized_value,
            standard_unit: unit.standard_unit,
            conversion_factor: unit.conversion_factor,
            reference_range_min: range.range_min,
            reference_range_max: range.range_max,
            normalization_confidence: overall,
            normalized_at: Utc::now().naive_utc(),
        };

        let report = self.persist_normalized(&record, trail)?;

        let flagged_for_review = needs_review(overall);
        if flagged_for_review {
            warnings.push(format!("Low confidence score: {overall:.2}"));
        }
        note_lost_audit_rows(parameter_id, report, &mut warnings);

        Ok(NormalizationResult {
            success: true,
            normalized_parameter: Some(record),
            operations_logged: trail.len(),
            errors: Vec::new(),
            warnings,
            flagged_for_review,
        })
    }

    /// Early exit: audit the stages run so far and mark the source flagged.
    fn finish_flagged(
        &self,
        parameter_id: &str,
        trail: &AuditTrail,
        error: String,
    ) -> Result<NormalizationResult, NormalizationError> {
        let tx = self.conn.unchecked_transaction()?;
        let report = flush_audit_trail(&*tx, trail.entries());
        let marked = repository::update_normalization_status(
            &tx,
            parameter_id,
            NormalizationStatus::Flagged,
        )?;
        tx.commit()?;

        if !marked {
            tracing::debug!(%parameter_id, "Source parameter not registered, status not updated");
        }
        let mut result = NormalizationResult::flagged_failure(error, trail.len());
        note_lost_audit_rows(parameter_id, report, &mut result.warnings);
        Ok(result)
    }

    /// Success path: record, status and audit rows commit together.
    fn persist_normalized(
        &self,
        record: &NormalizedParameter,
        trail: &AuditTrail,
    ) -> Result<FlushReport, NormalizationError> {
        let tx = self.conn.unchecked_transaction()?;
        repository::insert_normalized_parameter(&tx, record)?;
        let marked = repository::update_normalization_status(
            &tx,
            &record.original_parameter_id,
            NormalizationStatus::Normalized,
        )?;
        let report = flush_audit_trail(&*tx, trail.entries());
        tx.commit()?;

        if !marked {
            tracing::debug!(
                parameter_id = %record.original_parameter_id,
                "Source parameter not registered, status not updated"
            );
        }
        Ok(report)
    }
}

/// Measurements must be finite before any stage runs.
fn check_input(raw: &RawParameter) -> Result<(), NormalizationError> {
    if raw.value.is_finite() {
        Ok(())
    } else {
        Err(NormalizationError::InvalidInput("measured value is not a finite number".into()))
    }
}

/// Carry audit rows a flush could not write onto the result, and log the loss.
fn note_lost_audit_rows(parameter_id: &str, report: FlushReport, warnings: &mut Vec<String>) {
    if let Some(warning) = report.warning() {
        tracing::warn!(%parameter_id, lost = report.failed, "Audit trail incomplete");
        warnings.push(warning);
    }
}

/// Normalize one parameter against the database's reference tables.
pub fn normalize_one(conn: &Connection, raw: &RawParameter) -> NormalizationResult {
    LabNormalizer::new(conn).normalize_one(raw)
}

/// Normalize a batch against the database's reference tables.
pub fn normalize_batch(conn: &Connection, params: &[RawParameter]) -> BatchResult {
    LabNormalizer::new(conn).normalize_batch(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, DatabaseError};
    use crate::normalization::reference_data::ReferenceData;

    fn seeded_db() -> Connection {
        let conn = db::open_memory_database().unwrap();
        ReferenceData::bundled().unwrap().seed(&conn).unwrap();
        conn
    }

    fn raw(id: &str, name: &str, value: f64, unit: Option<&str>) -> RawParameter {
        RawParameter {
            parameter_id: id.into(),
            user_id: "USER-123ABC".into(),
            parameter_name: name.into(),
            value,
            unit: unit.map(str::to_string),
            reference_range: None,
        }
    }

    fn registered(
        conn: &Connection,
        id: &str,
        name: &str,
        value: f64,
        unit: Option<&str>,
    ) -> RawParameter {
        let param = raw(id, name, value, unit);
        repository::insert_health_parameter(conn, &param).unwrap();
        param
    }

    fn status(conn: &Connection, id: &str) -> NormalizationStatus {
        repository::get_health_parameter(conn, id)
            .unwrap()
            .unwrap()
            .normalization_status
    }

    struct UnavailableStore;

    impl ReferenceLookup for UnavailableStore {
        fn find_name_mapping(&self, _: &str) -> Result<Option<NameMapping>, DatabaseError> {
            Err(crate::db::busy("store unavailable"))
        }

        fn find_unit_conversion(
            &self,
            _: &str,
            _: Option<&str>,
        ) -> Result<Option<UnitConversionRule>, DatabaseError> {
            Err(crate::db::busy("store unavailable"))
        }

        fn find_reference_range(
            &self,
            _: &str,
            _: &str,
        ) -> Result<Option<StandardReferenceRange>, DatabaseError> {
            Err(crate::db::busy("store unavailable"))
        }
    }

    #[test]
    fn glucose_normalizes_to_mmol() {
        let conn = seeded_db();
        let param = registered(&conn, "p-glu", "Blood Glucose", 117.0, Some("mg/dL"));

        let result = normalize_one(&conn, &param);

        assert!(result.success, "errors: {:?}", result.errors);
        assert!(!result.flagged_for_review);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
        assert_eq!(result.operations_logged, 3);

        let record = result.normalized_parameter.unwrap();
        assert_eq!(record.canonical_name, "glucose_fasting");
        assert_eq!(record.standard_unit.as_deref(), Some("mmol/L"));
        assert!((record.normalized_value - 6.4935).abs() < 1e-6);
        assert_eq!(record.reference_range_min, Some(3.9));
        assert_eq!(record.reference_range_max, Some(5.6));
        assert!((record.normalization_confidence - (0.95 + 1.0 + 1.0) / 3.0).abs() < 1e-9);

        assert_eq!(status(&conn, "p-glu"), NormalizationStatus::Normalized);
        assert_eq!(db::count_audit_entries(&conn, "p-glu").unwrap(), 3);
        let stored = db::get_normalized_parameter(&conn, &record.normalized_parameter_id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.original_parameter_id, "p-glu");
    }

    #[test]
    fn hba1c_already_in_standard_unit() {
        let conn = seeded_db();
        let param = registered(&conn, "p-a1c", "HbA1c", 6.5, Some("%"));

        let record = normalize_one(&conn, &param).normalized_parameter.unwrap();
        assert_eq!(record.canonical_name, "hemoglobin_a1c");
        assert_eq!(record.conversion_factor, Some(1.0));
        assert_eq!(record.normalized_value, 6.5);
        assert_eq!(record.standard_unit.as_deref(), Some("%"));
    }

    #[test]
    fn cholesterol_normalizes_to_mmol() {
        let conn = seeded_db();
        let param = registered(&conn, "p-chol", "Total Cholesterol", 200.0, Some("mg/dL"));

        let result = normalize_one(&conn, &param);
        let record = result.normalized_parameter.unwrap();
        assert_eq!(record.canonical_name, "cholesterol_total");
        assert_eq!(record.standard_unit.as_deref(), Some("mmol/L"));
        assert!((record.normalized_value - 5.18).abs() < 1e-6);
        assert_eq!(record.reference_range_min, None);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn unknown_name_stops_after_one_entry() {
        let conn = seeded_db();
        let param = registered(&conn, "p-unk", "Unknown Test Parameter", 100.0, Some("mg/dL"));

        let result = normalize_one(&conn, &param);

        assert!(!result.success);
        assert!(result.flagged_for_review);
        assert!(result.normalized_parameter.is_none());
        assert_eq!(result.operations_logged, 1);
        assert!(result.errors[0].contains("map parameter name"));
        assert!(result.errors[0].contains("Unknown Test Parameter"));

        assert_eq!(status(&conn, "p-unk"), NormalizationStatus::Flagged);
        let audit = db::get_audit_entries_for_parameter(&conn, "p-unk").unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].operation, NormalizationOperation::NameMapping);
        assert_eq!(audit[0].status, OperationStatus::Flagged);
        assert!(db::get_normalized_for_parameter(&conn, "p-unk").unwrap().is_empty());
    }

    #[test]
    fn unknown_unit_stops_after_two_entries() {
        let conn = seeded_db();
        let param = registered(&conn, "p-uu", "Blood Glucose", 100.0, Some("unknown_unit"));

        let result = normalize_one(&conn, &param);

        assert!(!result.success);
        assert!(result.flagged_for_review);
        assert_eq!(result.operations_logged, 2);
        assert!(result.errors[0].contains("convert unit"));
        assert!(result.errors[0].contains("unknown_unit"));
        assert_eq!(status(&conn, "p-uu"), NormalizationStatus::Flagged);

        let audit = db::get_audit_entries_for_parameter(&conn, "p-uu").unwrap();
        let ops: Vec<_> = audit.iter().map(|e| (e.operation, e.status)).collect();
        assert_eq!(
            ops,
            vec![
                (NormalizationOperation::NameMapping, OperationStatus::Success),
                (NormalizationOperation::UnitConversion, OperationStatus::Flagged),
            ]
        );
    }

    #[test]
    fn missing_unit_passes_through_with_low_confidence() {
        let conn = seeded_db();
        let param = registered(&conn, "p-nu", "Blood Glucose", 100.0, None);

        let result = normalize_one(&conn, &param);

        assert!(result.success);
        assert!(result.flagged_for_review);
        assert_eq!(result.operations_logged, 3);
        let record = result.normalized_parameter.as_ref().unwrap();
        assert_eq!(record.normalized_value, 100.0);
        assert_eq!(record.standard_unit, None);
        assert_eq!(record.conversion_factor, None);
        assert!((record.normalization_confidence - 0.65).abs() < 1e-9);
        assert!(result.warnings.iter().any(|w| w.contains("No reference range")));
        assert!(result.warnings.iter().any(|w| w.contains("Low confidence")));
        assert_eq!(status(&conn, "p-nu"), NormalizationStatus::Normalized);
    }

    #[test]
    fn missing_range_is_only_a_warning() {
        let conn = seeded_db();
        let param = registered(&conn, "p-hb", "Hemoglobin", 14.0, Some("g/dL"));

        let result = normalize_one(&conn, &param);

        assert!(result.success);
        assert!(!result.flagged_for_review);
        assert_eq!(
            result.warnings,
            vec!["No reference range available for hemoglobin".to_string()]
        );
        let record = result.normalized_parameter.unwrap();
        assert!((record.normalized_value - 140.0).abs() < 1e-9);
        assert_eq!(record.reference_range_min, None);
        assert_eq!(record.reference_range_max, None);
    }

    #[test]
    fn low_confidence_success_is_flagged() {
        let conn = db::open_memory_database().unwrap();
        let data = ReferenceData {
            name_mappings: vec![NameMapping {
                variant_name: "Sugar".into(),
                canonical_name: "glucose_fasting".into(),
                confidence_score: 0.1,
            }],
            unit_conversions: vec![UnitConversionRule {
                canonical_parameter_name: "glucose_fasting".into(),
                source_unit: "mg/dL".into(),
                target_unit: "mmol/L".into(),
                conversion_factor: 0.0555,
                confidence_score: 1.0,
            }],
            reference_ranges: vec![StandardReferenceRange {
                canonical_parameter_name: "glucose_fasting".into(),
                standard_unit: "mmol/L".into(),
                range_min: Some(3.9),
                range_max: Some(5.6),
                confidence_score: 0.9,
            }],
        };
        let normalizer = LabNormalizer::with_lookup(&conn, &data);

        let result = normalizer.normalize_one(&raw("p-low", "Sugar", 90.0, Some("mg/dL")));

        assert!(result.success);
        assert!(result.flagged_for_review);
        assert_eq!(result.warnings, vec!["Low confidence score: 0.67".to_string()]);
        // Persisted into the connection even though lookups came from memory
        assert_eq!(db::get_normalized_for_parameter(&conn, "p-low").unwrap().len(), 1);
    }

    #[test]
    fn lookup_fault_is_audited_as_failed() {
        let conn = db::open_memory_database().unwrap();
        let param = registered(&conn, "p-down", "Blood Glucose", 117.0, Some("mg/dL"));
        let normalizer = LabNormalizer::with_lookup(&conn, &UnavailableStore);

        let result = normalizer.normalize_one(&param);

        assert!(!result.success);
        assert!(result.flagged_for_review);
        assert_eq!(result.operations_logged, 1);
        assert!(result.errors[0].contains("map parameter name"));

        let audit = db::get_audit_entries_for_parameter(&conn, "p-down").unwrap();
        assert_eq!(audit[0].status, OperationStatus::Failed);
        assert!(audit[0].failure_reason.as_deref().unwrap().contains("store unavailable"));
    }

    #[test]
    fn storage_fault_rolls_back_and_still_audits() {
        let conn = seeded_db();
        let param = registered(&conn, "p-sf", "Blood Glucose", 117.0, Some("mg/dL"));
        conn.execute_batch("DROP TABLE normalized_parameters;").unwrap();

        let result = normalize_one(&conn, &param);

        assert!(!result.success);
        assert!(result.flagged_for_review);
        assert!(result.normalized_parameter.is_none());
        assert!(result.errors[0].starts_with("Unexpected error"));
        assert_eq!(result.operations_logged, 3);
        // Status update was rolled back with the failed insert
        assert_eq!(status(&conn, "p-sf"), NormalizationStatus::Pending);
        // Trail flushed exactly once, outside the rolled-back transaction
        assert_eq!(db::count_audit_entries(&conn, "p-sf").unwrap(), 3);
    }

    #[test]
    fn unregistered_parameter_still_normalizes() {
        let conn = seeded_db();
        let result = normalize_one(&conn, &raw("p-free", "HbA1c", 6.1, Some("%")));
        assert!(result.success);
        assert!(repository::get_health_parameter(&conn, "p-free").unwrap().is_none());
    }

    #[test]
    fn reruns_append_history() {
        let conn = seeded_db();
        let param = registered(&conn, "p-rr", "Blood Glucose", 117.0, Some("mg/dL"));

        let first = normalize_one(&conn, &param).normalized_parameter.unwrap();
        let second = normalize_one(&conn, &param).normalized_parameter.unwrap();

        assert_ne!(first.normalized_parameter_id, second.normalized_parameter_id);
        assert_eq!(db::get_normalized_for_parameter(&conn, "p-rr").unwrap().len(), 2);
        assert_eq!(db::count_audit_entries(&conn, "p-rr").unwrap(), 6);
    }

    #[test]
    fn batch_preserves_order_and_isolates_failures() {
        let conn = seeded_db();
        let params = vec![
            registered(&conn, "b-1", "Blood Glucose", 117.0, Some("mg/dL")),
            registered(&conn, "b-2", "Unknown Parameter", 100.0, Some("mg/dL")),
            registered(&conn, "b-3", "HbA1c", 6.5, Some("%")),
            registered(&conn, "b-4", "Total Cholesterol", 200.0, Some("bananas")),
        ];

        let batch = normalize_batch(&conn, &params);

        assert_eq!(batch.total, 4);
        assert_eq!(batch.successful, 2);
        assert_eq!(batch.failed, 2);
        assert_eq!(batch.flagged, 2);
        assert_eq!(batch.successful + batch.failed, batch.results.len());

        let canonical: Vec<_> = batch
            .results
            .iter()
            .map(|r| r.normalized_parameter.as_ref().map(|p| p.original_parameter_id.as_str()))
            .collect();
        assert_eq!(canonical, vec![Some("b-1"), None, Some("b-3"), None]);
        assert_eq!(batch.results[1].operations_logged, 1);
        assert_eq!(batch.results[3].operations_logged, 2);
        assert_eq!(status(&conn, "b-2"), NormalizationStatus::Flagged);
        assert_eq!(status(&conn, "b-3"), NormalizationStatus::Normalized);
    }

    #[test]
    fn empty_batch_is_empty() {
        let conn = seeded_db();
        let batch = normalize_batch(&conn, &[]);
        assert_eq!(batch, BatchResult::default());
    }

    #[test]
    fn non_finite_value_is_rejected_before_any_stage() {
        let conn = seeded_db();
        let mut param = registered(&conn, "p-nan", "Blood Glucose", 117.0, Some("mg/dL"));

        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            param.value = value;
            let result = normalize_one(&conn, &param);

            assert!(!result.success);
            assert!(result.flagged_for_review);
            assert_eq!(result.operations_logged, 0);
            assert_eq!(result.errors, vec!["Invalid input: measured value is not a finite number"]);
        }
        assert_eq!(status(&conn, "p-nan"), NormalizationStatus::Flagged);
        assert_eq!(db::count_audit_entries(&conn, "p-nan").unwrap(), 0);
        assert!(db::get_normalized_for_parameter(&conn, "p-nan").unwrap().is_empty());
    }

    #[test]
    fn lost_audit_rows_surface_as_a_warning() {
        let conn = seeded_db();
        conn.execute_batch(
            "CREATE TRIGGER reject_range_rows BEFORE INSERT ON normalization_audit_logs
             WHEN NEW.operation = 'range_alignment'
             BEGIN SELECT RAISE(ABORT, 'audit store full'); END;",
        )
        .unwrap();
        let param = registered(&conn, "p-lost", "Blood Glucose", 117.0, Some("mg/dL"));

        let result = normalize_one(&conn, &param);

        assert!(result.success, "errors: {:?}", result.errors);
        assert_eq!(result.operations_logged, 3);
        assert_eq!(result.warnings, vec!["1 of 3 audit entries could not be written"]);
        assert_eq!(db::count_audit_entries(&conn, "p-lost").unwrap(), 2);
        assert_eq!(status(&conn, "p-lost"), NormalizationStatus::Normalized);
    }

    #[test]
    fn lost_audit_rows_on_a_flagged_attempt_are_reported() {
        let conn = seeded_db();
        conn.execute_batch(
            "CREATE TRIGGER reject_all_rows BEFORE INSERT ON normalization_audit_logs
             BEGIN SELECT RAISE(ABORT, 'audit store full'); END;",
        )
        .unwrap();
        let param = registered(&conn, "p-gone", "Vitamin Z", 12.0, Some("ng/mL"));

        let result = normalize_one(&conn, &param);

        assert!(!result.success);
        assert_eq!(result.warnings, vec!["1 of 1 audit entries could not be written"]);
        assert_eq!(status(&conn, "p-gone"), NormalizationStatus::Flagged);
    }

    #[test]
    fn non_ascii_variant_resolves_in_any_case() {
        let conn = seeded_db();
        repository::insert_name_mapping(
            &conn,
            &NameMapping {
                variant_name: "Glukose nüchtern".into(),
                canonical_name: "glucose_fasting".into(),
                confidence_score: 0.95,
            },
        )
        .unwrap();
        let param = registered(&conn, "p-de", "GLUKOSE NÜCHTERN", 117.0, Some("mg/dL"));

        let result = normalize_one(&conn, &param);

        assert!(result.success, "errors: {:?}", result.errors);
        let record = result.normalized_parameter.unwrap();
        assert_eq!(record.canonical_name, "glucose_fasting");
    }
}
