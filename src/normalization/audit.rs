//! Attempt-scoped audit trail and its best-effort flush.

use serde::Serialize;

use super::engine::Staged;
use super::traits::AuditSink;
use crate::models::OperationLogEntry;

/// Operation log of one normalization attempt, in stage order.
#[derive(Debug, Clone, Default)]
pub struct AuditTrail {
    entries: Vec<OperationLogEntry>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the stage's entry and hand back its outcome.
    pub fn record<T>(&mut self, staged: Staged<T>) -> T {
        self.entries.push(staged.entry);
        staged.outcome
    }

    pub fn entries(&self) -> &[OperationLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of a flush.
#[must_use = "a flush can lose rows; check `failed`"]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub written: usize,
    pub failed: usize,
}

impl FlushReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    /// Result warning for a flush that lost rows, `None` when every row landed.
    pub fn warning(&self) -> Option<String> {
        if self.is_complete() {
            return None;
        }
        Some(format!(
            "{} of {} audit entries could not be written",
            self.failed,
            self.written + self.failed
        ))
    }
}

/// Write every entry, in order, one row each.
///
/// A failed row is logged and skipped; the remaining rows are still written.
pub fn flush_audit_trail(sink: &dyn AuditSink, entries: &[OperationLogEntry]) -> FlushReport {
    let mut report = FlushReport::default();
    for entry in entries {
        match sink.append_audit_entry(entry) {
            Ok(()) => report.written += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(
                    parameter_id = %entry.parameter_id,
                    operation = %entry.operation,
                    error = %e,
                    "Failed to write audit entry"
                );
            }
        }
    }
    report
}
