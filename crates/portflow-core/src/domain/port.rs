//! Port definitions
//!
//! A port is one named step of a workflow. The forward call goes through a
//! [`PortAdapter`], the compensating call through an [`UndoHandler`]. Both are
//! optional: a port without an adapter is driven by something outside the
//! engine, and a port without an undo handler is treated as already reverted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::model::ModelInstance;
use crate::resilience::CircuitBreakerConfig;
use crate::CoreError;

/// Direction of the service call a port wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    /// The service calls into the workflow
    Inbound,
    /// The workflow calls out to the service
    Outbound,
}

/// Compensating action for a completed port
#[async_trait]
pub trait UndoHandler: Send + Sync {
    /// Revert whatever the port did for this model
    async fn undo(&self, model: &ModelInstance) -> Result<(), CoreError>;
}

/// Forward call for a port
#[async_trait]
pub trait PortAdapter: Send + Sync {
    /// Perform the port's service call
    ///
    /// A JSON object result is merged into the model state.
    async fn invoke(&self, model: &ModelInstance) -> Result<Value, CoreError>;
}

/// A named workflow step
#[derive(Clone)]
pub struct Port {
    /// Port name, unique within its workflow
    pub name: String,
    /// Service the port talks to
    pub service: String,
    /// Call direction
    pub direction: PortDirection,
    /// Model keys the port reads or writes
    pub keys: Vec<String>,
    /// Event that triggers the port
    pub consumes_event: Option<String>,
    /// Event emitted when the port completes
    pub produces_event: Option<String>,
    /// Compensating action
    pub undo: Option<Arc<dyn UndoHandler>>,
    /// Undo retry limit
    pub retries: Option<u32>,
    /// Call timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Breaker thresholds for this port
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    /// Forward call
    pub adapter: Option<Arc<dyn PortAdapter>>,
    /// Forward attempt budget
    pub forward_retries: Option<u32>,
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("service", &self.service)
            .field("direction", &self.direction)
            .field("keys", &self.keys)
            .field("consumes_event", &self.consumes_event)
            .field("produces_event", &self.produces_event)
            .field("undo", &self.undo.is_some())
            .field("retries", &self.retries)
            .field("timeout_ms", &self.timeout_ms)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("adapter", &self.adapter.is_some())
            .field("forward_retries", &self.forward_retries)
            .finish()
    }
}

impl Port {
    /// Create an outbound port with no events or handlers
    pub fn new(name: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            service: service.into(),
            direction: PortDirection::Outbound,
            keys: Vec::new(),
            consumes_event: None,
            produces_event: None,
            undo: None,
            retries: None,
            timeout_ms: None,
            circuit_breaker: None,
            adapter: None,
            forward_retries: None,
        }
    }

    /// Set the call direction
    pub fn with_direction(mut self, direction: PortDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Set the model keys
    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set the triggering event
    pub fn consumes(mut self, event: impl Into<String>) -> Self {
        self.consumes_event = Some(event.into());
        self
    }

    /// Set the completion event
    pub fn produces(mut self, event: impl Into<String>) -> Self {
        self.produces_event = Some(event.into());
        self
    }

    /// Attach a compensating action
    pub fn with_undo(mut self, handler: Arc<dyn UndoHandler>) -> Self {
        self.undo = Some(handler);
        self
    }

    /// Attach a forward call
    pub fn with_adapter(mut self, adapter: Arc<dyn PortAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Set the undo retry limit
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Set the call timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Set breaker thresholds
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    /// Set the forward attempt budget
    pub fn with_forward_retries(mut self, retries: u32) -> Self {
        self.forward_retries = Some(retries);
        self
    }

    /// Whether the port has a compensating action
    pub fn has_undo(&self) -> bool {
        self.undo.is_some()
    }

    /// Port-level timeout, if configured
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Check the definition before registration
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Port name cannot be empty".to_string(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(CoreError::ValidationError(format!(
                "Port {} timeout must be greater than zero",
                self.name
            )));
        }
        if let Some(config) = &self.circuit_breaker {
            config.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopUndo;

    #[async_trait]
    impl UndoHandler for NoopUndo {
        async fn undo(&self, _model: &ModelInstance) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[test]
    fn test_port_builder() {
        let port = Port::new("installCert", "certService")
            .with_direction(PortDirection::Inbound)
            .with_keys(["certificate", "privateKey"])
            .consumes("certReceived")
            .produces("certFilesWritten")
            .with_undo(Arc::new(NoopUndo))
            .with_retries(1)
            .with_timeout_ms(250);

        assert_eq!(port.name, "installCert");
        assert_eq!(port.direction, PortDirection::Inbound);
        assert_eq!(port.keys, vec!["certificate", "privateKey"]);
        assert_eq!(port.consumes_event.as_deref(), Some("certReceived"));
        assert_eq!(port.produces_event.as_deref(), Some("certFilesWritten"));
        assert!(port.has_undo());
        assert_eq!(port.timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_debug_hides_handlers() {
        let port = Port::new("requestCert", "acme").with_undo(Arc::new(NoopUndo));
        let rendered = format!("{:?}", port);
        assert!(rendered.contains("requestCert"));
        assert!(rendered.contains("undo: true"));
        assert!(rendered.contains("adapter: false"));
    }

    #[test]
    fn test_validate() {
        assert!(Port::new("p", "s").validate().is_ok());
        assert!(matches!(
            Port::new(" ", "s").validate(),
            Err(CoreError::ValidationError(_))
        ));
        assert!(Port::new("p", "s").with_timeout_ms(0).validate().is_err());
    }

    #[test]
    fn test_direction_serde() {
        assert_eq!(
            serde_json::to_string(&PortDirection::Outbound).unwrap(),
            "\"outbound\""
        );
    }
}
