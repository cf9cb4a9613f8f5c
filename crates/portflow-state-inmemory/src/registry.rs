use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use portflow_core::{
    CoreError, EventBroker, EventKind, ModelInstance, ModelRegistry, RegistrationOutcome,
    SharedStorage, WorkflowEvent, WorkflowSpec,
};

/// In-memory implementation of the ModelRegistry
///
/// `dependencies` are handed to every workflow factory when a model is
/// created; the workflow input overrides them key by key.
pub struct InMemoryModelRegistry {
    specs: DashMap<String, Arc<WorkflowSpec>>,
    dependencies: Value,
}

impl InMemoryModelRegistry {
    /// Create a registry with no shared dependencies
    pub fn new() -> Self {
        Self::with_dependencies(json!({}))
    }

    /// Create a registry that injects the given dependencies into new models
    pub fn with_dependencies(dependencies: Value) -> Self {
        Self {
            specs: DashMap::new(),
            dependencies,
        }
    }

    /// Number of registered specs
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether no spec is registered
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Names of registered specs
    pub fn names(&self) -> Vec<String> {
        self.specs.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Default for InMemoryModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelRegistry for InMemoryModelRegistry {
    async fn get_spec(&self, name: &str) -> Result<Option<Arc<WorkflowSpec>>, CoreError> {
        Ok(self.specs.get(name).map(|spec| Arc::clone(spec.value())))
    }

    async fn register_model(&self, spec: WorkflowSpec) -> Result<RegistrationOutcome, CoreError> {
        match self.specs.entry(spec.name.clone()) {
            Entry::Occupied(_) => Ok(RegistrationOutcome::AlreadyRegistered),
            Entry::Vacant(entry) => {
                debug!(workflow = %spec.name, "Registering workflow spec");
                entry.insert(Arc::new(spec));
                Ok(RegistrationOutcome::Registered)
            }
        }
    }

    async fn create_model(
        &self,
        broker: Arc<dyn EventBroker>,
        storage: Arc<dyn SharedStorage>,
        name: &str,
    ) -> Result<ModelInstance, CoreError> {
        let spec = self
            .get_spec(name)
            .await?
            .ok_or_else(|| CoreError::WorkflowNotFound(name.to_string()))?;

        let model = ModelInstance::new(name, spec.factory.build(&self.dependencies));
        storage.save(&model).await?;

        debug!(workflow = %name, model_id = %model.id, "Model created");
        broker
            .emit(WorkflowEvent::for_model(
                EventKind::AddModel.event_name(name),
                &model,
                json!({ "modelId": model.id }),
            ))
            .await?;

        Ok(model)
    }
}
