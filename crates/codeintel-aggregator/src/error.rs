//! Error types for the aggregation engine

use thiserror::Error;

/// Aggregation engine error
#[derive(Debug, Error)]
pub enum AggregatorError {
    /// A provider with the same identifier is already registered
    #[error("Provider '{0}' is already registered")]
    DuplicateProvider(String),

    /// Configuration refers to a provider that was never registered
    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),

    /// The delivery target of a request no longer exists
    #[error("Response target is no longer available")]
    TargetGone,

    /// Provider-side failure (start/stop of a backend)
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Configuration validation error
    #[error("Configuration validation error: {0}")]
    ConfigValidationError(String),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AggregatorError {
    /// Create a duplicate provider error
    pub fn duplicate_provider(id: impl Into<String>) -> Self {
        AggregatorError::DuplicateProvider(id.into())
    }

    /// Create an unknown provider error
    pub fn unknown_provider(id: impl Into<String>) -> Self {
        AggregatorError::UnknownProvider(id.into())
    }

    /// Create a provider error
    pub fn provider_error(message: impl Into<String>) -> Self {
        AggregatorError::ProviderError(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        AggregatorError::ConfigError(message.into())
    }

    /// Create a configuration validation error
    pub fn config_validation_error(message: impl Into<String>) -> Self {
        AggregatorError::ConfigValidationError(message.into())
    }
}

/// Result type for aggregation engine operations
pub type AggregatorResult<T> = Result<T, AggregatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_provider_message() {
        let err = AggregatorError::duplicate_provider("lsp");
        assert_eq!(err.to_string(), "Provider 'lsp' is already registered");
    }

    #[test]
    fn test_unknown_provider_message() {
        let err = AggregatorError::unknown_provider("kite");
        assert_eq!(err.to_string(), "Unknown provider 'kite'");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AggregatorError = io.into();
        assert!(matches!(err, AggregatorError::IoError(_)));
    }
}
