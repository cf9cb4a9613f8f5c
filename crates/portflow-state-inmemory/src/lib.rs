//! In-memory collaborators for the Portflow engine
//!
//! This crate provides in-memory implementations of the collaborator traits
//! defined in portflow-core: the model registry, shared storage and the event
//! broker. It is primarily useful for development, testing and single-process
//! deployments where persistence is not required.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use serde_json::Value;
use std::sync::Arc;

use portflow_core::{EngineConfig, OrchestratorContext};

/// Workflow spec registry
pub mod registry;
pub use registry::InMemoryModelRegistry;

/// Model storage and storage decorators
pub mod storage;
pub use storage::{
    FederatedStorage, InMemorySharedStorage, InMemoryStorageFactory, RemoteLookup,
    SerializingStorage, StorageDecorator,
};

/// In-process event broker
pub mod broker;
pub use broker::{InMemoryEventBroker, HISTORY_LIMIT};

/// Provider wiring the in-memory collaborators together
pub struct InMemoryStateProvider {
    registry: Arc<InMemoryModelRegistry>,
    storage: Arc<InMemoryStorageFactory>,
    broker: Arc<InMemoryEventBroker>,
}

impl InMemoryStateProvider {
    /// Create a provider with no shared dependencies
    pub fn new() -> Self {
        Self::with_parts(
            InMemoryModelRegistry::new(),
            InMemoryStorageFactory::new(),
            InMemoryEventBroker::new(),
        )
    }

    /// Create a provider whose models start from the given dependencies
    pub fn with_dependencies(dependencies: Value) -> Self {
        Self::with_parts(
            InMemoryModelRegistry::with_dependencies(dependencies),
            InMemoryStorageFactory::new(),
            InMemoryEventBroker::new(),
        )
    }

    /// Create a provider from preconfigured parts
    pub fn with_parts(
        registry: InMemoryModelRegistry,
        storage: InMemoryStorageFactory,
        broker: InMemoryEventBroker,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            storage: Arc::new(storage),
            broker: Arc::new(broker),
        }
    }

    /// Registry handle
    pub fn registry(&self) -> Arc<InMemoryModelRegistry> {
        self.registry.clone()
    }

    /// Storage factory handle
    pub fn storage(&self) -> Arc<InMemoryStorageFactory> {
        self.storage.clone()
    }

    /// Broker handle
    pub fn broker(&self) -> Arc<InMemoryEventBroker> {
        self.broker.clone()
    }

    /// Build an orchestrator context over these collaborators
    pub fn context(&self, config: EngineConfig) -> OrchestratorContext {
        OrchestratorContext::new(
            self.registry.clone(),
            self.storage.clone(),
            self.broker.clone(),
            config,
        )
    }
}

impl Default for InMemoryStateProvider {
    fn default() -> Self {
        Self::new()
    }
}
