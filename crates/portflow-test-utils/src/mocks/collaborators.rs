//! mockall mocks of the engine's collaborator traits.

use async_trait::async_trait;
use mockall::mock;
use serde_json::Value;
use std::sync::Arc;

use portflow_core::{
    CoreError, EventBroker, EventHandler, ModelId, ModelInstance, ModelRegistry, PortAdapter,
    RegistrationOutcome, SharedStorage, StorageFactory, UndoHandler, WorkflowEvent, WorkflowSpec,
};

mock! {
    pub Registry {}

    #[async_trait]
    impl ModelRegistry for Registry {
        async fn get_spec(&self, name: &str) -> Result<Option<Arc<WorkflowSpec>>, CoreError>;
        async fn register_model(&self, spec: WorkflowSpec) -> Result<RegistrationOutcome, CoreError>;
        async fn create_model(
            &self,
            broker: Arc<dyn EventBroker>,
            storage: Arc<dyn SharedStorage>,
            name: &str,
        ) -> Result<ModelInstance, CoreError>;
    }
}

mock! {
    pub Storage {}

    #[async_trait]
    impl SharedStorage for Storage {
        async fn save(&self, model: &ModelInstance) -> Result<(), CoreError>;
        async fn find_by_id(&self, id: &ModelId) -> Result<Option<ModelInstance>, CoreError>;
        async fn list(&self) -> Result<Vec<ModelInstance>, CoreError>;
        async fn delete(&self, id: &ModelId) -> Result<(), CoreError>;
    }
}

mock! {
    pub StorageFactory {}

    #[async_trait]
    impl StorageFactory for StorageFactory {
        async fn get_shared_storage(&self, name: &str) -> Result<Arc<dyn SharedStorage>, CoreError>;
    }
}

mock! {
    pub Broker {}

    #[async_trait]
    impl EventBroker for Broker {
        async fn on(&self, event: &str, handler: EventHandler) -> Result<(), CoreError>;
        async fn emit(&self, event: WorkflowEvent) -> Result<(), CoreError>;
        async fn notify(&self, event: WorkflowEvent) -> Result<(), CoreError>;
    }
}

mock! {
    pub Undo {}

    #[async_trait]
    impl UndoHandler for Undo {
        async fn undo(&self, model: &ModelInstance) -> Result<(), CoreError>;
    }
}

mock! {
    pub Adapter {}

    #[async_trait]
    impl PortAdapter for Adapter {
        async fn invoke(&self, model: &ModelInstance) -> Result<Value, CoreError>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_undo_expectations() {
        let mut undo = MockUndo::new();
        undo.expect_undo()
            .withf(|model: &ModelInstance| model.name == "cacert")
            .times(1)
            .returning(|_| Ok(()));

        let model = ModelInstance::new("cacert", json!({}));
        assert!(undo.undo(&model).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_storage_failure() {
        let mut storage = MockStorage::new();
        storage
            .expect_save()
            .returning(|_| Err(CoreError::StorageError("disk full".to_string())));

        let model = ModelInstance::new("cacert", json!({}));
        let err = storage.save(&model).await.unwrap_err();
        assert!(matches!(err, CoreError::StorageError(_)));
    }
}
