//! Seams between the normalization core and its storage collaborators.
//!
//! The core reads three reference tables through [`ReferenceLookup`] and writes
//! audit rows through [`AuditSink`]. Both are implemented for a SQLite
//! connection; [`ReferenceLookup`] is also implemented by the in-memory
//! [`ReferenceData`](super::reference_data::ReferenceData).

use rusqlite::Connection;

use crate::db::{repository, DatabaseError};
use crate::models::*;

/// Read-only access to the reference tables.
pub trait ReferenceLookup {
    /// Highest-confidence mapping for a case-insensitive exact variant match.
    fn find_name_mapping(&self, variant_name: &str) -> Result<Option<NameMapping>, DatabaseError>;

    /// Conversion rule for `(canonical_name, source_unit)`, source unit compared
    /// case-insensitively. With `source_unit = None`, any rule for the parameter;
    /// its `target_unit` is the parameter's standard unit.
    fn find_unit_conversion(
        &self,
        canonical_name: &str,
        source_unit: Option<&str>,
    ) -> Result<Option<UnitConversionRule>, DatabaseError>;

    fn find_reference_range(
        &self,
        canonical_name: &str,
        standard_unit: &str,
    ) -> Result<Option<StandardReferenceRange>, DatabaseError>;
}

/// Append-only destination for operation log entries.
pub trait AuditSink {
    fn append_audit_entry(&self, entry: &OperationLogEntry) -> Result<(), DatabaseError>;
}

impl ReferenceLookup for Connection {
    fn find_name_mapping(&self, variant_name: &str) -> Result<Option<NameMapping>, DatabaseError> {
        repository::find_name_mapping(self, variant_name)
    }

    fn find_unit_conversion(
        &self,
        canonical_name: &str,
        source_unit: Option<&str>,
    ) -> Result<Option<UnitConversionRule>, DatabaseError> {
        repository::find_unit_conversion(self, canonical_name, source_unit)
    }

    fn find_reference_range(
        &self,
        canonical_name: &str,
        standard_unit: &str,
    ) -> Result<Option<StandardReferenceRange>, DatabaseError> {
        repository::find_reference_range(self, canonical_name, standard_unit)
    }
}

impl AuditSink for Connection {
    fn append_audit_entry(&self, entry: &OperationLogEntry) -> Result<(), DatabaseError> {
        repository::insert_audit_entry(self, entry)
    }
}
