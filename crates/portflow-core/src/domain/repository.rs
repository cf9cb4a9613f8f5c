//! Collaborator interfaces for the Portflow engine
//!
//! The engine never owns persistence or transport. It talks to a model
//! registry, a storage factory and an event broker through these traits,
//! and external crates provide the implementations.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use super::events::WorkflowEvent;
use super::model::{ModelId, ModelInstance};
use super::workflow_spec::WorkflowSpec;
use crate::CoreError;

/// Callback invoked for every matching broker event
pub type EventHandler = Arc<dyn Fn(WorkflowEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Outcome of registering a workflow spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The spec was stored
    Registered,
    /// A spec with the same name already existed and was kept
    AlreadyRegistered,
}

/// Registry of workflow specifications
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Find a registered spec by name
    async fn get_spec(&self, name: &str) -> Result<Option<Arc<WorkflowSpec>>, CoreError>;

    /// Register a spec unless one with the same name exists
    async fn register_model(&self, spec: WorkflowSpec) -> Result<RegistrationOutcome, CoreError>;

    /// Create and persist a new model instance of a registered workflow
    async fn create_model(
        &self,
        broker: Arc<dyn EventBroker>,
        storage: Arc<dyn SharedStorage>,
        name: &str,
    ) -> Result<ModelInstance, CoreError>;
}

/// Storage for the model instances of one workflow
#[async_trait]
pub trait SharedStorage: Send + Sync {
    /// Persist a model instance
    async fn save(&self, model: &ModelInstance) -> Result<(), CoreError>;

    /// Find a model instance by ID
    async fn find_by_id(&self, id: &ModelId) -> Result<Option<ModelInstance>, CoreError>;

    /// List every stored model instance
    async fn list(&self) -> Result<Vec<ModelInstance>, CoreError>;

    /// Delete a model instance
    async fn delete(&self, id: &ModelId) -> Result<(), CoreError>;
}

#[async_trait]
impl<T: SharedStorage + ?Sized> SharedStorage for Arc<T> {
    async fn save(&self, model: &ModelInstance) -> Result<(), CoreError> {
        (**self).save(model).await
    }

    async fn find_by_id(&self, id: &ModelId) -> Result<Option<ModelInstance>, CoreError> {
        (**self).find_by_id(id).await
    }

    async fn list(&self) -> Result<Vec<ModelInstance>, CoreError> {
        (**self).list().await
    }

    async fn delete(&self, id: &ModelId) -> Result<(), CoreError> {
        (**self).delete(id).await
    }
}

/// Hands out shared storage per workflow name
#[async_trait]
pub trait StorageFactory: Send + Sync {
    /// Get the storage for a workflow, creating it on first use
    async fn get_shared_storage(&self, name: &str) -> Result<Arc<dyn SharedStorage>, CoreError>;
}

/// Publish/subscribe transport for workflow events
#[async_trait]
pub trait EventBroker: Send + Sync {
    /// Subscribe a handler to an event name
    async fn on(&self, event: &str, handler: EventHandler) -> Result<(), CoreError>;

    /// Dispatch an event to local handlers
    ///
    /// Returns once dispatch has started; handlers run independently.
    async fn emit(&self, event: WorkflowEvent) -> Result<(), CoreError>;

    /// Broadcast an event beyond local handlers
    async fn notify(&self, event: WorkflowEvent) -> Result<(), CoreError>;
}
