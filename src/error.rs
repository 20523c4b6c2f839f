//! Error types for exseek

use thiserror::Error;

/// Result type alias for exseek operations
pub type Result<T> = std::result::Result<T, ExseekError>;

/// Main error type for the evaluation engine
#[derive(Error, Debug)]
pub enum ExseekError {
    /// Unknown strategy, method or metric name, or an inconsistent option set.
    /// Raised before any fold is processed.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),

    /// The estimator lacks every scoring or every importance path it would need
    #[error("Capability error: {0}")]
    CapabilityError(String),

    #[error("Fit error: {0}")]
    FitError(String),

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },
}

impl ExseekError {
    /// Whether the error is a caller mistake detected before model work began
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ExseekError::ConfigError(_) | ExseekError::InvalidParameter { .. }
        )
    }
}

impl From<polars::error::PolarsError> for ExseekError {
    fn from(err: polars::error::PolarsError) -> Self {
        ExseekError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ExseekError {
    fn from(err: serde_json::Error) -> Self {
        ExseekError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for ExseekError {
    fn from(err: bincode::Error) -> Self {
        ExseekError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for ExseekError {
    fn from(err: ndarray::ShapeError) -> Self {
        ExseekError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ExseekError::DataError("expect 2 classes but 3 classes found".to_string());
        assert_eq!(
            err.to_string(),
            "Data error: expect 2 classes but 3 classes found"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ExseekError = io_err.into();
        assert!(matches!(err, ExseekError::IoError(_)));
    }

    #[test]
    fn test_configuration_errors_are_flagged() {
        assert!(ExseekError::ConfigError("unknown splitter: foo".into()).is_configuration());
        assert!(!ExseekError::FitError("nan".into()).is_configuration());
        assert!(!ExseekError::CapabilityError("no score".into()).is_configuration());
    }
}
