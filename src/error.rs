//! Error types for the Mailroom classification engine
//!
//! This module provides comprehensive error handling using thiserror for
//! structured error definitions and anyhow for error propagation.

use thiserror::Error;

/// Main error type for Mailroom operations
#[derive(Error, Debug)]
pub enum MailroomError {
    /// Not enough feedback rows to train a model
    #[error("Insufficient training data: {got} samples, need at least {need}")]
    InsufficientData { got: usize, need: usize },

    /// Store write failed while activating a freshly trained model
    #[error("Model persistence error: {0}")]
    ModelPersistence(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Inference provider request failed
    #[error("Inference provider error: {0}")]
    Provider(String),

    /// Category string outside the closed enumeration
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    /// Confidence value outside the 0.0..=1.0 range
    #[error("Confidence out of range: {0}")]
    InvalidConfidence(f64),

    /// Email not found
    #[error("Email not found: {0}")]
    EmailNotFound(String),

    /// Invalid email ID format
    #[error("Invalid email ID: {0}")]
    InvalidEmailId(#[from] uuid::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Mailroom operations
pub type Result<T> = std::result::Result<T, MailroomError>;

/// Convert anyhow::Error to MailroomError
impl From<anyhow::Error> for MailroomError {
    fn from(err: anyhow::Error) -> Self {
        MailroomError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MailroomError::InsufficientData { got: 12, need: 50 };
        assert_eq!(
            err.to_string(),
            "Insufficient training data: 12 samples, need at least 50"
        );
    }

    #[test]
    fn test_error_conversion() {
        let uuid_err = uuid::Uuid::parse_str("invalid");
        assert!(uuid_err.is_err());

        let mailroom_err: MailroomError = uuid_err.unwrap_err().into();
        assert!(matches!(mailroom_err, MailroomError::InvalidEmailId(_)));
    }

    #[test]
    fn test_unknown_category_display() {
        let err = MailroomError::UnknownCategory("spam".to_string());
        assert_eq!(err.to_string(), "Unknown category: spam");
    }

    #[test]
    fn test_invalid_confidence_display() {
        let err = MailroomError::InvalidConfidence(1.5);
        assert_eq!(err.to_string(), "Confidence out of range: 1.5");
    }
}
