use thiserror::Error;

/// Core error type for the Portflow engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Workflow specification not registered
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Port not defined by the workflow
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Invalid workflow or port definition
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Port adapter or undo handler failed
    #[error("Port execution error: {0}")]
    PortExecutionError(String),

    /// A port or undo call exceeded its allotted time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Circuit breaker rejected the call without invoking it
    #[error("Circuit open: {0}")]
    CircuitOpen(String),

    /// Shared storage error
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Event broker error
    #[error("Event broker error: {0}")]
    BrokerError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (CoreError::WorkflowNotFound("cacert".to_string()), "Workflow not found: cacert"),
            (CoreError::PortNotFound("installCert".to_string()), "Port not found: installCert"),
            (CoreError::ValidationError("empty".to_string()), "Validation error: empty"),
            (CoreError::PortExecutionError("boom".to_string()), "Port execution error: boom"),
            (CoreError::Timeout("undoTimeout".to_string()), "Timeout: undoTimeout"),
            (CoreError::CircuitOpen("installCert".to_string()), "Circuit open: installCert"),
            (CoreError::StorageError("disk".to_string()), "Storage error: disk"),
            (CoreError::BrokerError("closed".to_string()), "Event broker error: closed"),
            (CoreError::ConfigurationError("bad".to_string()), "Configuration error: bad"),
            (CoreError::Other("other_err".to_string()), "other_err"),
        ];

        for (error, expected_msg) in errors {
            assert_eq!(error.to_string(), expected_msg);
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: CoreError = json_error.into();

        match error {
            CoreError::SerializationError(msg) => {
                assert!(msg.contains("expected value"));
            }
            _ => panic!("Expected SerializationError variant"),
        }
    }

    #[test]
    fn test_from_str() {
        let error: CoreError = "test error message".into();
        assert_eq!(error, CoreError::Other("test error message".to_string()));
    }
}
