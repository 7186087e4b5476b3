use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum NormalizationError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to load reference data from {0}: {1}")]
    ReferenceDataLoad(String, String),

    #[error("Failed to parse reference data {0}: {1}")]
    ReferenceDataParse(String, String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<rusqlite::Error> for NormalizationError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sqlite(err))
    }
}
