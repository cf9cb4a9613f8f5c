//! Workflow specifications
//!
//! A [`WorkflowDefinition`] is what callers hand to the spec builder; a
//! [`WorkflowSpec`] is what ends up in the model registry.

use serde_json::{Map, Value};
use std::collections::HashMap;

use super::port::Port;
use crate::CoreError;

/// Endpoint every generated workflow is registered under
pub const WORKFLOW_ENDPOINT: &str = "workflows";

/// Name of the terminal port of every workflow
pub const WORKFLOW_COMPLETE: &str = "workflowComplete";

/// Caller-supplied description of a workflow
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    /// Workflow name, also its start event
    pub name: String,
    /// Initial model state
    pub input: Value,
    /// Ports keyed by port name
    pub ports: HashMap<String, Port>,
}

impl WorkflowDefinition {
    /// Create a definition with no ports
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            name: name.into(),
            input,
            ports: HashMap::new(),
        }
    }

    /// Add a port, keyed by its name
    pub fn with_port(mut self, port: Port) -> Self {
        self.ports.insert(port.name.clone(), port);
        self
    }

    /// Check the definition before a spec is built from it
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "Workflow name cannot be empty".to_string(),
            ));
        }

        if self.ports.is_empty() {
            return Err(CoreError::ValidationError(format!(
                "Workflow {} must define at least one port",
                self.name
            )));
        }

        for (key, port) in &self.ports {
            if key != &port.name {
                return Err(CoreError::ValidationError(format!(
                    "Port key {} does not match port name {}",
                    key, port.name
                )));
            }
            port.validate()?;
        }

        Ok(())
    }
}

/// Builds the initial state of a model instance
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowFactory {
    input: Value,
}

impl WorkflowFactory {
    /// Create a factory for the given workflow input
    pub fn new(input: Value) -> Self {
        Self { input }
    }

    /// Merge dependencies with the workflow input; input keys win
    pub fn build(&self, dependencies: &Value) -> Value {
        let mut state = Map::new();

        if let Value::Object(deps) = dependencies {
            state.extend(deps.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        if let Value::Object(input) = &self.input {
            state.extend(input.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        Value::Object(state)
    }
}

/// Registrable workflow specification
#[derive(Debug, Clone)]
pub struct WorkflowSpec {
    /// Model name the spec is registered under
    pub name: String,
    /// Always [`WORKFLOW_ENDPOINT`]
    pub endpoint: String,
    /// Ports keyed by port name
    pub ports: HashMap<String, Port>,
    /// Initial state factory
    pub factory: WorkflowFactory,
}

impl WorkflowSpec {
    /// Build a spec from a definition
    pub fn from_definition(definition: WorkflowDefinition) -> Self {
        Self {
            name: definition.name,
            endpoint: WORKFLOW_ENDPOINT.to_string(),
            ports: definition.ports,
            factory: WorkflowFactory::new(definition.input),
        }
    }

    /// Look up a port by name
    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.get(name)
    }
}
