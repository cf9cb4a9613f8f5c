use serde_json::{json, Value};
use std::sync::Arc;

use portflow_core::{Port, PortAdapter, PortDirection, UndoHandler, WorkflowDefinition};

/// Builds the two-port certificate workflow used across tests
///
/// `requestCert` consumes `cacert` and produces `certReceived`;
/// `installCert` consumes `certReceived` and produces `certFilesWritten`.
pub struct CacertWorkflow {
    input: Value,
    request: Port,
    install: Port,
}

impl CacertWorkflow {
    /// Workflow name
    pub const NAME: &'static str = "cacert";

    /// Ports without handlers
    pub fn new() -> Self {
        Self {
            input: json!({ "domain": "example.org" }),
            request: Port::new("requestCert", "acme")
                .with_direction(PortDirection::Outbound)
                .with_keys(["domain"])
                .consumes(Self::NAME)
                .produces("certReceived"),
            install: Port::new("installCert", "filesystem")
                .with_keys(["cert"])
                .consumes("certReceived")
                .produces("certFilesWritten"),
        }
    }

    /// Replace the workflow input
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    /// Undo handler for `requestCert`
    pub fn request_undo(mut self, handler: Arc<dyn UndoHandler>) -> Self {
        self.request = self.request.with_undo(handler);
        self
    }

    /// Undo handler for `installCert`
    pub fn install_undo(mut self, handler: Arc<dyn UndoHandler>) -> Self {
        self.install = self.install.with_undo(handler);
        self
    }

    /// Forward adapter for `requestCert`
    pub fn request_adapter(mut self, adapter: Arc<dyn PortAdapter>) -> Self {
        self.request = self.request.with_adapter(adapter);
        self
    }

    /// Forward adapter for `installCert`
    pub fn install_adapter(mut self, adapter: Arc<dyn PortAdapter>) -> Self {
        self.install = self.install.with_adapter(adapter);
        self
    }

    /// Undo retry limit for `installCert`
    pub fn install_retries(mut self, retries: u32) -> Self {
        self.install = self.install.with_retries(retries);
        self
    }

    /// Forward attempt budget for `installCert`
    pub fn install_forward_retries(mut self, retries: u32) -> Self {
        self.install = self.install.with_forward_retries(retries);
        self
    }

    /// Forward and undo timeout for `installCert`
    pub fn install_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.install = self.install.with_timeout_ms(timeout_ms);
        self
    }

    /// Finish building
    pub fn build(self) -> WorkflowDefinition {
        WorkflowDefinition::new(Self::NAME, self.input)
            .with_port(self.request)
            .with_port(self.install)
    }
}

impl Default for CacertWorkflow {
    fn default() -> Self {
        Self::new()
    }
}
