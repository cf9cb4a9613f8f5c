use tracing::{info, warn};

use super::context::OrchestratorContext;
use crate::domain::repository::RegistrationOutcome;
use crate::domain::workflow_spec::{WorkflowDefinition, WorkflowSpec};
use crate::CoreError;

impl OrchestratorContext {
    /// Build a workflow spec from a definition and register it
    ///
    /// Registering a name that already exists leaves the existing spec in
    /// place and logs a warning.
    pub async fn generate_workflow(&self, definition: WorkflowDefinition) -> Result<(), CoreError> {
        definition.validate()?;

        let name = definition.name.clone();
        if self.registry().get_spec(&name).await?.is_some() {
            warn!(workflow = %name, "Workflow already registered, skipping");
            return Ok(());
        }

        let port_count = definition.ports.len();
        let spec = WorkflowSpec::from_definition(definition);

        match self.registry().register_model(spec).await? {
            RegistrationOutcome::Registered => {
                info!(workflow = %name, ports = port_count, "Workflow registered");
            }
            RegistrationOutcome::AlreadyRegistered => {
                warn!(workflow = %name, "Workflow already registered, skipping");
            }
        }

        Ok(())
    }
}
