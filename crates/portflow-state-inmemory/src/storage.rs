//! Shared storage for model instances
//!
//! [`InMemorySharedStorage`] is the base store. Decorators add behavior by
//! composition: [`FederatedStorage`] falls back to a remote lookup on a miss,
//! and [`SerializingStorage`] round-trips every model through JSON.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use portflow_core::{CoreError, ModelId, ModelInstance, SharedStorage, StorageFactory};

/// In-memory implementation of SharedStorage
#[derive(Default)]
pub struct InMemorySharedStorage {
    models: RwLock<HashMap<ModelId, ModelInstance>>,
}

impl InMemorySharedStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedStorage for InMemorySharedStorage {
    async fn save(&self, model: &ModelInstance) -> Result<(), CoreError> {
        let mut models = self.models.write().await;
        models.insert(model.id.clone(), model.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ModelId) -> Result<Option<ModelInstance>, CoreError> {
        let models = self.models.read().await;
        Ok(models.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<ModelInstance>, CoreError> {
        let models = self.models.read().await;
        let mut all: Vec<ModelInstance> = models.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn delete(&self, id: &ModelId) -> Result<(), CoreError> {
        let mut models = self.models.write().await;
        models.remove(id);
        Ok(())
    }
}

/// Source of models that are not held locally
#[async_trait]
pub trait RemoteLookup: Send + Sync {
    /// Fetch a model of the given workflow from elsewhere
    async fn fetch(&self, workflow: &str, id: &ModelId) -> Result<Option<ModelInstance>, CoreError>;
}

/// Storage that consults a remote lookup on a local miss and caches the hit
pub struct FederatedStorage<S, R> {
    workflow: String,
    local: S,
    remote: R,
}

impl<S, R> FederatedStorage<S, R>
where
    S: SharedStorage,
    R: RemoteLookup,
{
    /// Wrap a local store for a workflow
    pub fn new(workflow: impl Into<String>, local: S, remote: R) -> Self {
        Self {
            workflow: workflow.into(),
            local,
            remote,
        }
    }
}

#[async_trait]
impl<S, R> SharedStorage for FederatedStorage<S, R>
where
    S: SharedStorage,
    R: RemoteLookup,
{
    async fn save(&self, model: &ModelInstance) -> Result<(), CoreError> {
        self.local.save(model).await
    }

    async fn find_by_id(&self, id: &ModelId) -> Result<Option<ModelInstance>, CoreError> {
        if let Some(model) = self.local.find_by_id(id).await? {
            return Ok(Some(model));
        }

        match self.remote.fetch(&self.workflow, id).await {
            Ok(Some(model)) => {
                debug!(workflow = %self.workflow, model_id = %id, "Caching model from remote lookup");
                self.local.save(&model).await?;
                Ok(Some(model))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(workflow = %self.workflow, model_id = %id, error = %e, "Remote lookup failed");
                Err(e)
            }
        }
    }

    async fn list(&self) -> Result<Vec<ModelInstance>, CoreError> {
        self.local.list().await
    }

    async fn delete(&self, id: &ModelId) -> Result<(), CoreError> {
        self.local.delete(id).await
    }
}

/// Storage that stores and returns JSON round-tripped copies
pub struct SerializingStorage<S> {
    inner: S,
}

impl<S: SharedStorage> SerializingStorage<S> {
    /// Wrap a store
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    fn round_trip(model: &ModelInstance) -> Result<ModelInstance, CoreError> {
        let value = serde_json::to_value(model)?;
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl<S: SharedStorage> SharedStorage for SerializingStorage<S> {
    async fn save(&self, model: &ModelInstance) -> Result<(), CoreError> {
        let copy = Self::round_trip(model)?;
        self.inner.save(&copy).await
    }

    async fn find_by_id(&self, id: &ModelId) -> Result<Option<ModelInstance>, CoreError> {
        match self.inner.find_by_id(id).await? {
            Some(model) => Ok(Some(Self::round_trip(&model)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<ModelInstance>, CoreError> {
        self.inner
            .list()
            .await?
            .iter()
            .map(Self::round_trip)
            .collect()
    }

    async fn delete(&self, id: &ModelId) -> Result<(), CoreError> {
        self.inner.delete(id).await
    }
}

/// Wraps the base store of a workflow when it is first created
pub type StorageDecorator =
    Arc<dyn Fn(&str, Arc<dyn SharedStorage>) -> Arc<dyn SharedStorage> + Send + Sync>;

/// One shared store per workflow name, created on first use
#[derive(Default)]
pub struct InMemoryStorageFactory {
    stores: DashMap<String, Arc<dyn SharedStorage>>,
    decorator: Option<StorageDecorator>,
}

impl InMemoryStorageFactory {
    /// Create a factory of plain in-memory stores
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory that wraps each new store with a decorator
    pub fn with_decorator(decorator: StorageDecorator) -> Self {
        Self {
            stores: DashMap::new(),
            decorator: Some(decorator),
        }
    }
}

#[async_trait]
impl StorageFactory for InMemoryStorageFactory {
    async fn get_shared_storage(&self, name: &str) -> Result<Arc<dyn SharedStorage>, CoreError> {
        let store = self
            .stores
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(workflow = %name, "Creating shared storage");
                let base: Arc<dyn SharedStorage> = Arc::new(InMemorySharedStorage::new());
                match &self.decorator {
                    Some(decorate) => decorate(name, base),
                    None => base,
                }
            })
            .clone();
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticRemote {
        model: Option<ModelInstance>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteLookup for StaticRemote {
        async fn fetch(
            &self,
            _workflow: &str,
            id: &ModelId,
        ) -> Result<Option<ModelInstance>, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.model.clone().filter(|m| &m.id == id))
        }
    }

    #[tokio::test]
    async fn test_save_find_list_delete() {
        let storage = InMemorySharedStorage::new();
        let model = ModelInstance::new("cacert", json!({}));

        storage.save(&model).await.unwrap();
        assert_eq!(storage.find_by_id(&model.id).await.unwrap(), Some(model.clone()));
        assert_eq!(storage.list().await.unwrap().len(), 1);

        storage.delete(&model.id).await.unwrap();
        assert!(storage.find_by_id(&model.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_federated_storage_caches_remote_hit() {
        let model = ModelInstance::new("cacert", json!({"domain": "example.org"}));
        let remote = StaticRemote {
            model: Some(model.clone()),
            calls: AtomicUsize::new(0),
        };
        let storage = FederatedStorage::new("cacert", InMemorySharedStorage::new(), remote);

        assert_eq!(storage.find_by_id(&model.id).await.unwrap(), Some(model.clone()));
        assert_eq!(storage.find_by_id(&model.id).await.unwrap(), Some(model.clone()));
        assert_eq!(storage.remote.calls.load(Ordering::SeqCst), 1);
        assert_eq!(storage.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_federated_storage_miss() {
        let remote = StaticRemote {
            model: None,
            calls: AtomicUsize::new(0),
        };
        let storage = FederatedStorage::new("cacert", InMemorySharedStorage::new(), remote);
        let missing = ModelId::generate();

        assert!(storage.find_by_id(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_serializing_storage_stores_copies() {
        let storage = SerializingStorage::new(InMemorySharedStorage::new());
        let mut model = ModelInstance::new("cacert", json!({"nested": {"a": 1}}));
        model.port_flow.push("requestCert".to_string());

        storage.save(&model).await.unwrap();
        model.port_flow.push("installCert".to_string());

        let stored = storage.find_by_id(&model.id).await.unwrap().unwrap();
        assert_eq!(stored.port_flow(), &["requestCert".to_string()]);
        assert_eq!(stored.state, json!({"nested": {"a": 1}}));
    }

    #[tokio::test]
    async fn test_factory_caches_per_name_and_decorates() {
        let decorated = Arc::new(AtomicUsize::new(0));
        let counter = decorated.clone();
        let factory = InMemoryStorageFactory::with_decorator(Arc::new(
            move |_name: &str, base: Arc<dyn SharedStorage>| -> Arc<dyn SharedStorage> {
                counter.fetch_add(1, Ordering::SeqCst);
                Arc::new(SerializingStorage::new(base))
            },
        ));

        let first = factory.get_shared_storage("cacert").await.unwrap();
        let again = factory.get_shared_storage("cacert").await.unwrap();
        let other = factory.get_shared_storage("mlops").await.unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(decorated.load(Ordering::SeqCst), 2);
    }
}
