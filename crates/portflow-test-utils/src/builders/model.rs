use serde_json::{json, Value};

use portflow_core::{CompensationStatus, ModelInstance};

/// Builds model instances in arbitrary states
pub struct ModelBuilder {
    model: ModelInstance,
}

impl ModelBuilder {
    /// Start from a fresh model of a workflow
    pub fn new(workflow: &str) -> Self {
        Self {
            model: ModelInstance::new(workflow, json!({})),
        }
    }

    /// Set the model state
    pub fn with_state(mut self, state: Value) -> Self {
        self.model.state = state;
        self
    }

    /// Set the completed ports, oldest first
    pub fn with_port_flow<I, S>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.model.port_flow = ports.into_iter().map(Into::into).collect();
        self
    }

    /// Mark the model as mid-compensation
    pub fn compensating(mut self) -> Self {
        self.model.compensate = true;
        self
    }

    /// Record the outcome of an earlier compensation run
    pub fn with_compensate_result(mut self, result: CompensationStatus) -> Self {
        self.model.compensate_result = Some(result);
        self
    }

    /// Finish building
    pub fn build(self) -> ModelInstance {
        self.model
    }
}
