//! Error types for BioSamples

use thiserror::Error;

/// Result type alias for BioSamples operations
pub type Result<T> = std::result::Result<T, BioSamplesError>;

/// Main error type for BioSamples
#[derive(Error, Debug)]
pub enum BioSamplesError {
    #[error("Invalid amendment: {0}")]
    InvalidAmendment(String),

    #[error("Storage error: {0}")]
    Storage(String),
}
