use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::EngineConfig;
use crate::domain::events::WorkflowEvent;
use crate::domain::model::{ModelId, ModelInstance, ModelUpdate};
use crate::domain::port::Port;
use crate::domain::repository::{EventBroker, ModelRegistry, StorageFactory};
use crate::domain::workflow_spec::WorkflowSpec;
use crate::resilience::{BreakerRegistry, CircuitBreaker};
use crate::CoreError;

/// Everything the engine needs to run workflows
///
/// Built once and cloned into handlers; every field is shared.
#[derive(Clone)]
pub struct OrchestratorContext {
    registry: Arc<dyn ModelRegistry>,
    storage: Arc<dyn StorageFactory>,
    broker: Arc<dyn EventBroker>,
    breakers: Arc<BreakerRegistry>,
    model_locks: Arc<DashMap<ModelId, Arc<Mutex<()>>>>,
    config: EngineConfig,
}

impl fmt::Debug for OrchestratorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OrchestratorContext {
    /// Create a context with a fresh breaker registry
    pub fn new(
        registry: Arc<dyn ModelRegistry>,
        storage: Arc<dyn StorageFactory>,
        broker: Arc<dyn EventBroker>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            storage,
            broker,
            breakers: Arc::new(BreakerRegistry::new()),
            model_locks: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Share an existing breaker registry
    pub fn with_breakers(mut self, breakers: Arc<BreakerRegistry>) -> Self {
        self.breakers = breakers;
        self
    }

    /// Model registry
    pub fn registry(&self) -> &Arc<dyn ModelRegistry> {
        &self.registry
    }

    /// Storage factory
    pub fn storage(&self) -> &Arc<dyn StorageFactory> {
        &self.storage
    }

    /// Event broker
    pub fn broker(&self) -> &Arc<dyn EventBroker> {
        &self.broker
    }

    /// Breaker registry
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Breaker for a port; forward and undo calls share it
    pub fn breaker_for(&self, port: &Port) -> CircuitBreaker {
        let config = port
            .circuit_breaker
            .clone()
            .unwrap_or_else(|| self.config.circuit_breaker.clone());
        self.breakers.breaker(port.name.clone(), config)
    }

    /// Look up a registered spec or fail
    pub async fn spec(&self, name: &str) -> Result<Arc<WorkflowSpec>, CoreError> {
        self.registry
            .get_spec(name)
            .await?
            .ok_or_else(|| CoreError::WorkflowNotFound(name.to_string()))
    }

    /// Serialize read-modify-write of one model's stored copy
    ///
    /// Hold the guard only around load, check and save. Release it with
    /// [`release_model`](Self::release_model) before emitting, since handlers
    /// for the emitted event may lock the same model.
    pub(crate) async fn lock_model(&self, id: &ModelId) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(&self.model_locks.entry(id.clone()).or_default());
        lock.lock_owned().await
    }

    /// Drop a model guard and forget the lock once nobody else wants it
    pub(crate) fn release_model(&self, id: &ModelId, guard: OwnedMutexGuard<()>) {
        drop(guard);
        self.model_locks
            .remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Latest persisted copy of a model, if it was ever saved
    pub(crate) async fn load_stored(
        &self,
        model: &ModelInstance,
    ) -> Result<Option<ModelInstance>, CoreError> {
        let storage = self.storage.get_shared_storage(model.name()).await?;
        storage.find_by_id(&model.id).await
    }

    /// Apply a partial update and persist the result
    pub async fn update(
        &self,
        model: &mut ModelInstance,
        update: ModelUpdate,
    ) -> Result<(), CoreError> {
        model.apply(update);
        let storage = self.storage.get_shared_storage(model.name()).await?;
        storage.save(model).await
    }

    /// Emit an event on behalf of a model
    pub async fn emit(
        &self,
        model: &ModelInstance,
        event: impl Into<String>,
        payload: Value,
    ) -> Result<(), CoreError> {
        let event = WorkflowEvent::for_model(event, model, payload);
        tracing::debug!(
            workflow = %model.name,
            model_id = %model.id,
            event = %event.name,
            "Emitting workflow event"
        );
        self.broker.emit(event).await
    }
}
