use serde_json::json;
use tracing::{debug, info, warn};

use super::context::OrchestratorContext;
use crate::domain::model::ModelInstance;
use crate::domain::workflow_spec::WORKFLOW_COMPLETE;
use crate::CoreError;

impl OrchestratorContext {
    /// Start a new instance of a registered workflow
    ///
    /// Emits the workflow's start event and returns once it is dispatched;
    /// downstream ports run on their own.
    pub async fn run_workflow(&self, name: &str) -> Result<ModelInstance, CoreError> {
        let storage = self.storage().get_shared_storage(name).await?;
        let model = self
            .registry()
            .create_model(self.broker().clone(), storage, name)
            .await?;

        info!(workflow = %name, model_id = %model.id, "Workflow started");
        self.emit(&model, name, json!({})).await?;

        Ok(model)
    }

    /// Continue interrupted workflows from their port flow history
    ///
    /// Emits the successor event of each model's last completed port.
    /// Models under compensation are skipped. Returns the number of models
    /// that were resumed.
    pub async fn resume_workflow(&self, models: Vec<ModelInstance>) -> usize {
        let mut resumed = 0;

        for model in models {
            if model.compensate {
                debug!(workflow = %model.name, model_id = %model.id, "Model is compensating, not resuming");
                continue;
            }

            let Some(last_port) = model.last_port() else {
                continue;
            };

            let spec = match self.spec(model.name()).await {
                Ok(spec) => spec,
                Err(e) => {
                    warn!(workflow = %model.name, model_id = %model.id, error = %e, "Cannot resume model");
                    continue;
                }
            };

            let next_event = match spec.port(last_port) {
                Some(port) => port.produces_event.clone(),
                None => {
                    warn!(
                        workflow = %model.name,
                        model_id = %model.id,
                        port = %last_port,
                        "Last port not found in workflow, cannot resume"
                    );
                    continue;
                }
            };

            match next_event {
                Some(event) if last_port != WORKFLOW_COMPLETE => {
                    info!(
                        workflow = %model.name,
                        model_id = %model.id,
                        port = %last_port,
                        event = %event,
                        "Resuming workflow"
                    );
                    match self.emit(&model, event, json!({ "resumed": true })).await {
                        Ok(()) => resumed += 1,
                        Err(e) => {
                            warn!(workflow = %model.name, model_id = %model.id, error = %e, "Failed to resume model");
                        }
                    }
                }
                _ => {
                    info!(
                        workflow = %model.name,
                        model_id = %model.id,
                        port = %last_port,
                        "Workflow complete or no next event, nothing to resume"
                    );
                }
            }
        }

        resumed
    }

    /// Resume every persisted instance of a workflow
    pub async fn resume_stored(&self, name: &str) -> Result<usize, CoreError> {
        let storage = self.storage().get_shared_storage(name).await?;
        let models = storage.list().await?;
        debug!(workflow = %name, models = models.len(), "Loaded models for resume");
        Ok(self.resume_workflow(models).await)
    }
}
