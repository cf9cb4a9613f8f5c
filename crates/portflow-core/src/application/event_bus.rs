use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::context::OrchestratorContext;
use crate::domain::workflow_spec::WorkflowDefinition;
use crate::CoreError;

/// Default channel capacity for the workflow event bus
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// Messages accepted by the workflow event bus
#[derive(Debug, Clone)]
pub enum WorkflowBusMessage {
    /// Build and register a workflow spec
    GenerateWorkflow(WorkflowDefinition),
}

/// Internal pub/sub for triggering workflow generation
///
/// Messages are processed one at a time, in publish order.
#[derive(Debug, Clone)]
pub struct WorkflowEventBus {
    sender: mpsc::Sender<WorkflowBusMessage>,
}

impl WorkflowEventBus {
    /// Start the bus worker; it stops once every bus handle is dropped
    pub fn start(ctx: OrchestratorContext, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel(capacity.max(1));

        let handle = tokio::spawn(async move {
            info!("Workflow event bus started");
            while let Some(message) = receiver.recv().await {
                match message {
                    WorkflowBusMessage::GenerateWorkflow(definition) => {
                        let name = definition.name.clone();
                        debug!(workflow = %name, "Received generateWorkflow");
                        if let Err(e) = ctx.generate_workflow(definition).await {
                            error!(workflow = %name, error = %e, "generateWorkflow failed");
                        }
                    }
                }
            }
            info!("Workflow event bus stopped");
        });

        (Self { sender }, handle)
    }

    /// Publish a message to the bus
    pub async fn publish(&self, message: WorkflowBusMessage) -> Result<(), CoreError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| CoreError::BrokerError("workflow event bus is closed".to_string()))
    }

    /// Shorthand for publishing a `GenerateWorkflow` message
    pub async fn generate_workflow(&self, definition: WorkflowDefinition) -> Result<(), CoreError> {
        self.publish(WorkflowBusMessage::GenerateWorkflow(definition))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::Harness;
    use crate::domain::port::Port;
    use serde_json::json;

    fn mlops() -> WorkflowDefinition {
        WorkflowDefinition::new("mlops", json!({}))
            .with_port(Port::new("train", "trainer").consumes("mlops"))
    }

    #[tokio::test]
    async fn test_bus_generates_workflow() {
        let harness = Harness::new();
        let (bus, handle) = WorkflowEventBus::start(harness.ctx.clone(), DEFAULT_BUS_CAPACITY);

        bus.generate_workflow(mlops()).await.unwrap();
        bus.generate_workflow(mlops()).await.unwrap();
        drop(bus);
        handle.await.unwrap();

        let spec = harness.ctx.spec("mlops").await.unwrap();
        assert_eq!(spec.ports.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_definition_does_not_stop_bus() {
        let harness = Harness::new();
        let (bus, handle) = WorkflowEventBus::start(harness.ctx.clone(), 1);

        bus.generate_workflow(WorkflowDefinition::new("", json!({})))
            .await
            .unwrap();
        bus.generate_workflow(mlops()).await.unwrap();
        drop(bus);
        handle.await.unwrap();

        assert!(harness.ctx.spec("mlops").await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_after_stop_fails() {
        let harness = Harness::new();
        let (bus, handle) = WorkflowEventBus::start(harness.ctx.clone(), 1);
        handle.abort();
        let _ = handle.await;

        let result = bus.generate_workflow(mlops()).await;
        assert!(matches!(result, Err(CoreError::BrokerError(_))));
    }
}
