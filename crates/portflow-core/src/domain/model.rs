use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Value object: Model instance ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelId(pub String);

impl ModelId {
    /// Generate a fresh ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of the last compensation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompensationStatus {
    /// Every completed port was reverted
    Complete,
    /// Compensation stopped with ports still in the flow
    Incomplete,
}

impl fmt::Display for CompensationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompensationStatus::Complete => write!(f, "COMPLETE"),
            CompensationStatus::Incomplete => write!(f, "INCOMPLETE"),
        }
    }
}

/// Aggregate: one running workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInstance {
    /// Unique identifier
    pub id: ModelId,

    /// Workflow name
    pub name: String,

    /// Model state built by the workflow factory
    pub state: Value,

    /// Names of completed ports, oldest first
    pub port_flow: Vec<String>,

    /// Set while a rollback is in progress
    pub compensate: bool,

    /// Outcome of the last compensation run
    pub compensate_result: Option<CompensationStatus>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl ModelInstance {
    /// Create a new instance with an empty port flow
    pub fn new(name: impl Into<String>, state: Value) -> Self {
        let now = Utc::now();
        Self {
            id: ModelId::generate(),
            name: name.into(),
            state,
            port_flow: Vec::new(),
            compensate: false,
            compensate_result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Workflow name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Completed ports, oldest first
    pub fn port_flow(&self) -> &[String] {
        &self.port_flow
    }

    /// Most recently completed port
    pub fn last_port(&self) -> Option<&str> {
        self.port_flow.last().map(String::as_str)
    }

    /// Read a top-level state field
    pub fn key(&self, field: &str) -> Option<&Value> {
        self.state.get(field)
    }

    /// Apply a partial update
    ///
    /// State objects are merged one level deep; everything else is replaced.
    pub fn apply(&mut self, update: ModelUpdate) {
        if let Some(state) = update.state {
            match (&mut self.state, state) {
                (Value::Object(current), Value::Object(changes)) => {
                    current.extend(changes);
                }
                (current, replacement) => *current = replacement,
            }
        }

        if let Some(port_flow) = update.port_flow {
            self.port_flow = port_flow;
        }

        if let Some(compensate) = update.compensate {
            self.compensate = compensate;
        }

        if let Some(result) = update.compensate_result {
            self.compensate_result = Some(result);
        }

        self.updated_at = Utc::now();
    }
}

/// Partial update applied to a model instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelUpdate {
    /// State fields to merge
    pub state: Option<Value>,
    /// Replacement port flow
    pub port_flow: Option<Vec<String>>,
    /// New compensate flag
    pub compensate: Option<bool>,
    /// New compensation result
    pub compensate_result: Option<CompensationStatus>,
}

impl ModelUpdate {
    /// Empty update
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge state fields
    pub fn state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    /// Replace the port flow
    pub fn port_flow(mut self, port_flow: Vec<String>) -> Self {
        self.port_flow = Some(port_flow);
        self
    }

    /// Set the compensate flag
    pub fn compensate(mut self, compensate: bool) -> Self {
        self.compensate = Some(compensate);
        self
    }

    /// Record a compensation result
    pub fn compensate_result(mut self, result: CompensationStatus) -> Self {
        self.compensate_result = Some(result);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_model_is_empty() {
        let model = ModelInstance::new("cacert", json!({"domain": "example.org"}));

        assert_eq!(model.name(), "cacert");
        assert!(model.port_flow().is_empty());
        assert!(model.last_port().is_none());
        assert!(!model.compensate);
        assert_eq!(model.key("domain"), Some(&json!("example.org")));
        assert_eq!(model.key("missing"), None);
    }

    #[test]
    fn test_apply_merges_state() {
        let mut model = ModelInstance::new("cacert", json!({"domain": "example.org", "ttl": 1}));
        let before = model.updated_at;

        model.apply(
            ModelUpdate::new()
                .state(json!({"ttl": 2, "certificate": "PEM"}))
                .port_flow(vec!["requestCert".to_string()])
                .compensate(true),
        );

        assert_eq!(
            model.state,
            json!({"domain": "example.org", "ttl": 2, "certificate": "PEM"})
        );
        assert_eq!(model.last_port(), Some("requestCert"));
        assert!(model.compensate);
        assert!(model.updated_at >= before);
    }

    #[test]
    fn test_apply_replaces_non_object_state() {
        let mut model = ModelInstance::new("cacert", Value::Null);
        model.apply(ModelUpdate::new().state(json!({"a": 1})));
        assert_eq!(model.state, json!({"a": 1}));
    }

    #[test]
    fn test_serialized_field_names() {
        let mut model = ModelInstance::new("cacert", json!({}));
        model.apply(ModelUpdate::new().compensate_result(CompensationStatus::Incomplete));

        let value = serde_json::to_value(&model).unwrap();
        assert_eq!(value["portFlow"], json!([]));
        assert_eq!(value["compensateResult"], json!("INCOMPLETE"));
    }
}
