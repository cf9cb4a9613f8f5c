use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::model::{ModelId, ModelInstance};

/// Events the engine generates for a workflow
///
/// Names are `<prefix>_<WORKFLOW>` or, for port-scoped kinds,
/// `<prefix>_<port>_<WORKFLOW>`, with the workflow name upper-cased.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind<'a> {
    /// Compensation run started
    UndoStarted,
    /// Compensation run ended with ports still in the flow
    UndoFailed,
    /// Compensation run reverted every port
    UndoWorked,
    /// Model instance created
    AddModel,
    /// Forward call timed out
    PortTimeout(&'a str),
    /// Forward retry budget exhausted
    PortRetryFailed(&'a str),
    /// Forward call succeeded after failed attempts
    PortRetryWorked(&'a str),
}

impl EventKind<'_> {
    /// Event name prefix
    pub fn prefix(&self) -> &'static str {
        match self {
            EventKind::UndoStarted => "undoStart",
            EventKind::UndoFailed => "undoFailed",
            EventKind::UndoWorked => "undoWorked",
            EventKind::AddModel => "addModel",
            EventKind::PortTimeout(_) => "portTimeout",
            EventKind::PortRetryFailed(_) => "portRetryFailed",
            EventKind::PortRetryWorked(_) => "portRetryWorked",
        }
    }

    /// Full event name for a workflow
    pub fn event_name(&self, workflow: &str) -> String {
        match self {
            EventKind::PortTimeout(port)
            | EventKind::PortRetryFailed(port)
            | EventKind::PortRetryWorked(port) => {
                format!("{}_{}_{}", self.prefix(), port, workflow.to_uppercase())
            }
            _ => format!("{}_{}", self.prefix(), workflow.to_uppercase()),
        }
    }
}

/// Event delivered through the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    /// Event name handlers subscribe to
    pub name: String,
    /// Workflow the event belongs to
    pub workflow: String,
    /// Model instance the event concerns
    pub model_id: Option<ModelId>,
    /// Event data
    pub payload: Value,
    /// When the event was raised
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    /// Create an event not tied to a model instance
    pub fn new(name: impl Into<String>, workflow: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            workflow: workflow.into(),
            model_id: None,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Create an event for a model instance
    pub fn for_model(name: impl Into<String>, model: &ModelInstance, payload: Value) -> Self {
        Self {
            name: name.into(),
            workflow: model.name.clone(),
            model_id: Some(model.id.clone()),
            payload,
            timestamp: Utc::now(),
        }
    }
}
