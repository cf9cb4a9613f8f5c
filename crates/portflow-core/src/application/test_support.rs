//! In-crate fakes for the collaborator traits

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::events::{EventKind, WorkflowEvent};
use crate::domain::model::{ModelId, ModelInstance};
use crate::domain::port::{PortAdapter, UndoHandler};
use crate::domain::repository::{
    EventBroker, EventHandler, ModelRegistry, RegistrationOutcome, SharedStorage, StorageFactory,
};
use crate::domain::workflow_spec::{WorkflowDefinition, WorkflowSpec};
use crate::{CoreError, EngineConfig, OrchestratorContext};

#[derive(Default)]
pub struct TestRegistry {
    specs: DashMap<String, Arc<WorkflowSpec>>,
}

#[async_trait]
impl ModelRegistry for TestRegistry {
    async fn get_spec(&self, name: &str) -> Result<Option<Arc<WorkflowSpec>>, CoreError> {
        Ok(self.specs.get(name).map(|s| Arc::clone(&s)))
    }

    async fn register_model(&self, spec: WorkflowSpec) -> Result<RegistrationOutcome, CoreError> {
        if self.specs.contains_key(&spec.name) {
            return Ok(RegistrationOutcome::AlreadyRegistered);
        }
        self.specs.insert(spec.name.clone(), Arc::new(spec));
        Ok(RegistrationOutcome::Registered)
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
        let model = ModelInstance::new(name, spec.factory.build(&json!({})));
        storage.save(&model).await?;
        broker
            .emit(WorkflowEvent::for_model(
                EventKind::AddModel.event_name(name),
                &model,
                Value::Null,
            ))
            .await?;
        Ok(model)
    }
}

#[derive(Default)]
pub struct TestStorage {
    models: DashMap<ModelId, ModelInstance>,
}

#[async_trait]
impl SharedStorage for TestStorage {
    async fn save(&self, model: &ModelInstance) -> Result<(), CoreError> {
        self.models.insert(model.id.clone(), model.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ModelId) -> Result<Option<ModelInstance>, CoreError> {
        Ok(self.models.get(id).map(|m| m.clone()))
    }

    async fn list(&self) -> Result<Vec<ModelInstance>, CoreError> {
        Ok(self.models.iter().map(|m| m.value().clone()).collect())
    }

    async fn delete(&self, id: &ModelId) -> Result<(), CoreError> {
        self.models.remove(id);
        Ok(())
    }
}

#[derive(Default)]
pub struct TestStorageFactory {
    stores: DashMap<String, Arc<TestStorage>>,
}

#[async_trait]
impl StorageFactory for TestStorageFactory {
    async fn get_shared_storage(&self, name: &str) -> Result<Arc<dyn SharedStorage>, CoreError> {
        let store: Arc<dyn SharedStorage> = self.stores.entry(name.to_string()).or_default().clone();
        Ok(store)
    }
}

/// Records every event and runs handlers inline
#[derive(Default)]
pub struct RecordingBroker {
    events: Mutex<Vec<WorkflowEvent>>,
    handlers: Mutex<HashMap<String, Vec<EventHandler>>>,
}

impl RecordingBroker {
    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .map(|events| events.iter().map(|e| e.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventBroker for RecordingBroker {
    async fn on(&self, event: &str, handler: EventHandler) -> Result<(), CoreError> {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.entry(event.to_string()).or_default().push(handler);
        }
        Ok(())
    }

    async fn emit(&self, event: WorkflowEvent) -> Result<(), CoreError> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        let handlers = self
            .handlers
            .lock()
            .map(|h| h.get(&event.name).cloned().unwrap_or_default())
            .unwrap_or_default();
        for handler in handlers {
            handler(event.clone()).await;
        }
        Ok(())
    }

    async fn notify(&self, event: WorkflowEvent) -> Result<(), CoreError> {
        self.emit(event).await
    }
}

/// Undo handler or adapter that fails a fixed number of times, then succeeds
pub struct Scripted {
    failures: Mutex<u32>,
    delay: Option<Duration>,
    calls: Mutex<u32>,
}

impl Scripted {
    pub fn succeeding() -> Arc<Self> {
        Self::failing_times(0)
    }

    pub fn failing_times(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures: Mutex::new(failures),
            delay: None,
            calls: Mutex::new(0),
        })
    }

    pub fn always_failing() -> Arc<Self> {
        Self::failing_times(u32::MAX)
    }

    pub fn hanging(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            failures: Mutex::new(0),
            delay: Some(delay),
            calls: Mutex::new(0),
        })
    }

    pub fn call_count(&self) -> u32 {
        self.calls.lock().map(|c| *c).unwrap_or(0)
    }

    fn next_result(&self) -> Result<(), CoreError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        let mut failures = self
            .failures
            .lock()
            .map_err(|_| CoreError::Other("poisoned".to_string()))?;
        if *failures > 0 {
            *failures = failures.saturating_sub(1);
            return Err(CoreError::PortExecutionError("undo failed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl UndoHandler for Scripted {
    async fn undo(&self, _model: &ModelInstance) -> Result<(), CoreError> {
        let result = self.next_result();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

#[async_trait]
impl PortAdapter for Scripted {
    async fn invoke(&self, _model: &ModelInstance) -> Result<Value, CoreError> {
        let result = self.next_result();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        result.map(|_| json!({"invoked": true}))
    }
}

pub struct Harness {
    pub ctx: OrchestratorContext,
    pub broker: Arc<RecordingBroker>,
    pub storage: Arc<TestStorageFactory>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let broker = Arc::new(RecordingBroker::default());
        let storage = Arc::new(TestStorageFactory::default());
        let ctx = OrchestratorContext::new(
            Arc::new(TestRegistry::default()),
            storage.clone(),
            broker.clone(),
            config,
        );
        Self {
            ctx,
            broker,
            storage,
        }
    }

    pub async fn register(&self, definition: WorkflowDefinition) {
        self.ctx
            .generate_workflow(definition)
            .await
            .expect("register workflow");
    }

    pub async fn save(&self, model: &ModelInstance) {
        self.storage
            .get_shared_storage(model.name())
            .await
            .expect("storage")
            .save(model)
            .await
            .expect("save");
    }

    pub async fn stored(&self, model: &ModelInstance) -> ModelInstance {
        self.storage
            .get_shared_storage(model.name())
            .await
            .expect("storage")
            .find_by_id(&model.id)
            .await
            .expect("find")
            .expect("model persisted")
    }
}
