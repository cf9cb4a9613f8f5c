//! Forward port execution
//!
//! Each port with both a consumed event and an adapter gets a broker handler.
//! The handler loads the model, calls the adapter through the port's circuit
//! breaker under a timeout, records the port in the flow history and emits
//! the port's produced event. When the attempt budget runs out, or the
//! circuit opens after the port has already failed, the workflow is
//! compensated.
//!
//! Recording re-reads the stored model under its lock, so ports fanned out
//! from one event never lose each other's flow entries and a port that
//! finishes after compensation began leaves the flow alone.

use futures::FutureExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::context::OrchestratorContext;
use crate::domain::events::{EventKind, WorkflowEvent};
use crate::domain::model::{ModelInstance, ModelUpdate};
use crate::domain::port::Port;
use crate::domain::repository::EventHandler;
use crate::resilience::BreakerError;
use crate::CoreError;

/// What happened when a port was invoked
#[derive(Debug, Clone, PartialEq)]
pub enum PortInvocation {
    /// The port ran and the model was updated
    Completed(ModelInstance),
    /// The model is compensating; the port left no trace on it
    Skipped,
    /// The port's circuit was open on the first attempt; the model was not touched
    Rejected,
    /// The port ran out of attempts and the workflow was compensated
    Compensated(Option<ModelInstance>),
}

impl OrchestratorContext {
    /// Subscribe every runnable port of a workflow to its triggering event
    ///
    /// Returns the number of ports wired.
    pub async fn wire_ports(&self, workflow: &str) -> Result<usize, CoreError> {
        let spec = self.spec(workflow).await?;
        let mut wired = 0;

        for port in spec.ports.values() {
            let (Some(event), Some(_)) = (&port.consumes_event, &port.adapter) else {
                debug!(workflow = %workflow, port = %port.name, "Port has no trigger or adapter, not wiring");
                continue;
            };

            let ctx = self.clone();
            let workflow_name = workflow.to_string();
            let port_name = port.name.clone();
            let handler: EventHandler = Arc::new(move |event: WorkflowEvent| {
                let ctx = ctx.clone();
                let workflow_name = workflow_name.clone();
                let port_name = port_name.clone();
                async move {
                    ctx.handle_port_event(&workflow_name, &port_name, event)
                        .await;
                }
                .boxed()
            });

            self.broker().on(event, handler).await?;
            debug!(workflow = %workflow, port = %port.name, event = %event, "Port wired");
            wired += 1;
        }

        info!(workflow = %workflow, ports = wired, "Workflow ports wired");
        Ok(wired)
    }

    async fn handle_port_event(&self, workflow: &str, port_name: &str, event: WorkflowEvent) {
        if event.workflow != workflow {
            return;
        }
        let Some(model_id) = event.model_id else {
            warn!(workflow = %workflow, port = %port_name, event = %event.name, "Event has no model id");
            return;
        };

        let model = match self.storage().get_shared_storage(workflow).await {
            Ok(storage) => storage.find_by_id(&model_id).await,
            Err(e) => Err(e),
        };

        match model {
            Ok(Some(model)) => match self.invoke_port(model, port_name).await {
                Ok(outcome) => {
                    debug!(workflow = %workflow, port = %port_name, ?outcome, "Port handled");
                }
                Err(e) => {
                    error!(workflow = %workflow, port = %port_name, error = %e, "Port invocation failed");
                }
            },
            Ok(None) => {
                warn!(workflow = %workflow, model_id = %model_id, "Model not found for port event");
            }
            Err(e) => {
                error!(workflow = %workflow, model_id = %model_id, error = %e, "Failed to load model");
            }
        }
    }

    /// Run one port forward for a model
    pub async fn invoke_port(
        &self,
        mut model: ModelInstance,
        port_name: &str,
    ) -> Result<PortInvocation, CoreError> {
        if model.compensate {
            debug!(workflow = %model.name, port = %port_name, "Model is compensating, skipping port");
            return Ok(PortInvocation::Skipped);
        }

        let spec = self.spec(model.name()).await?;
        let port = spec
            .port(port_name)
            .ok_or_else(|| CoreError::PortNotFound(port_name.to_string()))?;
        let adapter = port.adapter.clone().ok_or_else(|| {
            CoreError::ValidationError(format!("Port {} has no adapter", port_name))
        })?;

        let breaker = self.breaker_for(port);
        let budget = port
            .forward_retries
            .unwrap_or(self.config().port_max_retry)
            .max(1);
        let timeout = port.timeout().unwrap_or_else(|| self.config().port_timeout());
        let workflow = model.name.clone();
        let mut failures = 0u32;

        loop {
            let attempt =
                tokio::time::timeout(timeout, breaker.invoke(|| adapter.invoke(&model))).await;

            match attempt {
                Ok(Ok(output)) => {
                    return match self.complete_port(model, port, output, failures).await? {
                        Some(model) => Ok(PortInvocation::Completed(model)),
                        None => Ok(PortInvocation::Skipped),
                    };
                }
                Ok(Err(BreakerError::Rejected(_))) if failures == 0 => {
                    warn!(workflow = %workflow, port = %port_name, "Port rejected by open circuit");
                    return Ok(PortInvocation::Rejected);
                }
                Ok(Err(BreakerError::Rejected(_))) => {
                    // our own failures opened the circuit; no later attempt can run
                    warn!(
                        workflow = %workflow,
                        port = %port_name,
                        attempts = failures,
                        budget,
                        "Circuit opened before the budget ran out"
                    );
                    return self.give_up(model, port_name, failures).await;
                }
                Ok(Err(BreakerError::Failed(e))) => {
                    failures += 1;
                    warn!(
                        workflow = %workflow,
                        port = %port_name,
                        attempt = failures,
                        budget,
                        error = %e,
                        "Port call failed"
                    );
                }
                Err(_) => {
                    failures += 1;
                    breaker.error("portTimeout");
                    warn!(
                        workflow = %workflow,
                        port = %port_name,
                        attempt = failures,
                        timeout_ms = timeout.as_millis() as u64,
                        "Port call timed out"
                    );
                    self.emit(
                        &model,
                        EventKind::PortTimeout(port_name).event_name(&workflow),
                        json!({ "port": port_name, "attempt": failures }),
                    )
                    .await?;
                }
            }

            if failures >= budget {
                return self.give_up(model, port_name, failures).await;
            }
        }
    }

    async fn give_up(
        &self,
        model: ModelInstance,
        port_name: &str,
        failures: u32,
    ) -> Result<PortInvocation, CoreError> {
        error!(
            workflow = %model.name,
            port = %port_name,
            attempts = failures,
            "Port retries exhausted, compensating"
        );
        self.emit(
            &model,
            EventKind::PortRetryFailed(port_name).event_name(&model.name),
            json!({ "port": port_name, "attempts": failures }),
        )
        .await?;
        // the failing port never reached the flow, so only earlier ports unwind
        let result = self.compensate(model).await;
        Ok(PortInvocation::Compensated(result))
    }

    /// Record a finished port and announce it
    ///
    /// Returns `None` when the stored model started compensating while the
    /// adapter ran.
    async fn complete_port(
        &self,
        model: ModelInstance,
        port: &Port,
        output: Value,
        failures: u32,
    ) -> Result<Option<ModelInstance>, CoreError> {
        let id = model.id.clone();
        let guard = self.lock_model(&id).await;
        let recorded = self.record_port(model, port, output).await;
        self.release_model(&id, guard);
        let Some(model) = recorded? else {
            return Ok(None);
        };

        if failures > 0 {
            self.emit(
                &model,
                EventKind::PortRetryWorked(&port.name).event_name(&model.name),
                json!({ "port": port.name, "attempts": failures + 1 }),
            )
            .await?;
        }

        info!(
            workflow = %model.name,
            model_id = %model.id,
            port = %port.name,
            "Port completed"
        );

        if let Some(event) = &port.produces_event {
            self.emit(&model, event.clone(), json!({ "port": port.name }))
                .await?;
        }

        Ok(Some(model))
    }

    async fn record_port(
        &self,
        model: ModelInstance,
        port: &Port,
        output: Value,
    ) -> Result<Option<ModelInstance>, CoreError> {
        let mut model = self.load_stored(&model).await?.unwrap_or(model);
        if model.compensate || model.compensate_result.is_some() {
            warn!(
                workflow = %model.name,
                model_id = %model.id,
                port = %port.name,
                "Model started compensating while the port ran, dropping its result"
            );
            return Ok(None);
        }

        let mut update = ModelUpdate::new();
        if output.is_object() {
            update = update.state(output);
        }
        if port.consumes_event.is_some() {
            let mut flow = model.port_flow().to_vec();
            flow.push(port.name.clone());
            update = update.port_flow(flow);
        }
        self.update(&mut model, update).await?;
        Ok(Some(model))
    }
}
