//! Compensation engine
//!
//! Walks a model's port flow from the most recently completed port back to
//! the first, calling each port's undo handler through the port's circuit
//! breaker under a timeout. Steps run strictly one after another.
//!
//! Every successful undo truncates the flow at that port and persists it, so
//! an interrupted run can be picked up by a later `compensate` call from
//! exactly where it stopped.

use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::context::OrchestratorContext;
use crate::domain::events::EventKind;
use crate::domain::model::{CompensationStatus, ModelInstance, ModelUpdate};
use crate::domain::port::UndoHandler;
use crate::resilience::{BreakerError, CircuitBreaker};
use crate::CoreError;

/// How a compensation run ended
#[derive(Debug, Clone, PartialEq)]
pub enum CompensationOutcome {
    /// Every port was reverted and the flow is empty
    Completed(ModelInstance),
    /// A breaker refused the undo call; a later run may succeed
    RetryableFailure {
        /// Model as last persisted
        model: ModelInstance,
        /// Port whose breaker is open
        port: String,
        /// Why the run stopped
        reason: String,
    },
    /// A port's undo kept failing past its retry limit
    RetryExhausted {
        /// Model as last persisted
        model: ModelInstance,
        /// Port whose undo kept failing
        port: String,
        /// Attempts made in this run
        attempts: u32,
        /// Last failure
        reason: String,
    },
}

impl CompensationOutcome {
    /// The model as it was left by the run
    pub fn model(&self) -> &ModelInstance {
        match self {
            CompensationOutcome::Completed(model)
            | CompensationOutcome::RetryableFailure { model, .. }
            | CompensationOutcome::RetryExhausted { model, .. } => model,
        }
    }

    /// Whether every port was reverted
    pub fn is_complete(&self) -> bool {
        matches!(self, CompensationOutcome::Completed(_))
    }
}

/// Result of running one port's undo until it succeeds or gives up
enum UndoResult {
    Reverted,
    Rejected(String),
    Exhausted { attempts: u32, reason: String },
}

impl OrchestratorContext {
    /// Roll back a workflow's completed ports
    ///
    /// Never fails: errors are reported through the `undoFailed` event and
    /// the log. Returns the fully reverted model, or `None` when ports remain.
    pub async fn compensate(&self, model: ModelInstance) -> Option<ModelInstance> {
        let workflow = model.name.clone();
        let model_id = model.id.clone();

        match self.try_compensate(model.clone()).await {
            Ok(CompensationOutcome::Completed(model)) => Some(model),
            Ok(CompensationOutcome::RetryableFailure { port, reason, .. }) => {
                warn!(
                    workflow = %workflow,
                    model_id = %model_id,
                    port = %port,
                    reason = %reason,
                    "Compensation paused, circuit open"
                );
                None
            }
            Ok(CompensationOutcome::RetryExhausted {
                port,
                attempts,
                reason,
                ..
            }) => {
                error!(
                    workflow = %workflow,
                    model_id = %model_id,
                    port = %port,
                    attempts,
                    reason = %reason,
                    "Compensation aborted, max undo retries exceeded"
                );
                None
            }
            Err(e) => {
                error!(
                    workflow = %workflow,
                    model_id = %model_id,
                    error = %e,
                    "Compensation failed"
                );
                let payload = json!({
                    "status": CompensationStatus::Incomplete,
                    "error": e.to_string(),
                });
                if let Err(emit_err) = self
                    .emit(&model, EventKind::UndoFailed.event_name(&workflow), payload)
                    .await
                {
                    error!(workflow = %workflow, error = %emit_err, "Failed to emit undoFailed");
                }
                None
            }
        }
    }

    /// Roll back a workflow's completed ports, reporting how the run ended
    pub async fn try_compensate(
        &self,
        model: ModelInstance,
    ) -> Result<CompensationOutcome, CoreError> {
        let spec = self.spec(model.name()).await?;
        let workflow = model.name.clone();

        let id = model.id.clone();
        let guard = self.lock_model(&id).await;
        let marked = self.mark_compensating(model).await;
        self.release_model(&id, guard);
        let mut model = marked?;

        let mut undo_attempts: HashMap<String, u32> = model
            .port_flow()
            .iter()
            .map(|port| (port.clone(), 0))
            .collect();

        self.emit(
            &model,
            EventKind::UndoStarted.event_name(&workflow),
            json!({ "portFlow": model.port_flow() }),
        )
        .await?;

        info!(
            workflow = %workflow,
            model_id = %model.id,
            ports = model.port_flow().len(),
            "Compensation started"
        );

        let mut index = model.port_flow().len();
        while index > 0 {
            let port_name = model.port_flow()[index - 1].clone();

            let Some(port) = spec.port(&port_name) else {
                debug!(workflow = %workflow, port = %port_name, "Port not in spec, skipping");
                index -= 1;
                continue;
            };
            let Some(handler) = port.undo.clone() else {
                debug!(workflow = %workflow, port = %port_name, "No undo handler, skipping");
                index -= 1;
                continue;
            };

            let breaker = self.breaker_for(port);
            let limit = port.retries.unwrap_or(self.config().undo_retry_limit);
            let timeout = port.timeout().unwrap_or_else(|| self.config().undo_timeout());
            let attempts = undo_attempts.entry(port_name.clone()).or_insert(0);

            let result = self
                .undo_port(&breaker, handler.as_ref(), &model, timeout, limit, attempts)
                .await;

            match result {
                UndoResult::Reverted => {
                    let remaining = model.port_flow()[..index - 1].to_vec();
                    self.update(&mut model, ModelUpdate::new().port_flow(remaining))
                        .await?;
                    info!(
                        workflow = %workflow,
                        model_id = %model.id,
                        port = %port_name,
                        remaining = model.port_flow().len(),
                        "Port reverted"
                    );
                }
                UndoResult::Rejected(reason) => {
                    self.report_incomplete(&mut model, &port_name, &reason).await?;
                    return Ok(CompensationOutcome::RetryableFailure {
                        model,
                        port: port_name,
                        reason,
                    });
                }
                UndoResult::Exhausted { attempts, reason } => {
                    self.report_incomplete(&mut model, &port_name, &reason).await?;
                    return Ok(CompensationOutcome::RetryExhausted {
                        model,
                        port: port_name,
                        attempts,
                        reason,
                    });
                }
            }

            index -= 1;
        }

        // only undo-less ports can be left after a complete walk
        if !model.port_flow().is_empty() {
            debug!(
                workflow = %workflow,
                ports = ?model.port_flow(),
                "Clearing ports without undo handlers"
            );
        }

        self.update(
            &mut model,
            ModelUpdate::new()
                .port_flow(Vec::new())
                .compensate(false)
                .compensate_result(CompensationStatus::Complete),
        )
        .await?;
        self.emit(
            &model,
            EventKind::UndoWorked.event_name(&workflow),
            json!({ "status": CompensationStatus::Complete }),
        )
        .await?;

        info!(workflow = %workflow, model_id = %model.id, "Compensation complete");

        Ok(CompensationOutcome::Completed(model))
    }

    /// Flag the stored model as compensating, starting from its latest flow
    async fn mark_compensating(
        &self,
        model: ModelInstance,
    ) -> Result<ModelInstance, CoreError> {
        let mut model = self.load_stored(&model).await?.unwrap_or(model);
        self.update(&mut model, ModelUpdate::new().compensate(true))
            .await?;
        Ok(model)
    }

    /// Retry one port's undo in place until it succeeds or its limit is hit
    async fn undo_port(
        &self,
        breaker: &CircuitBreaker,
        handler: &dyn UndoHandler,
        model: &ModelInstance,
        timeout: Duration,
        limit: u32,
        attempts: &mut u32,
    ) -> UndoResult {
        loop {
            *attempts += 1;

            let error = match tokio::time::timeout(timeout, breaker.invoke(|| handler.undo(model)))
                .await
            {
                Ok(Ok(())) => return UndoResult::Reverted,
                Ok(Err(BreakerError::Rejected(id))) => {
                    warn!(port = %id, "Undo rejected by open circuit");
                    return UndoResult::Rejected(CoreError::CircuitOpen(id).to_string());
                }
                Ok(Err(BreakerError::Failed(e))) => e,
                Err(_) => {
                    breaker.error("undoTimeout");
                    CoreError::Timeout(format!(
                        "undo of {} exceeded {}ms",
                        breaker.id(),
                        timeout.as_millis()
                    ))
                }
            };

            if *attempts > limit {
                return UndoResult::Exhausted {
                    attempts: *attempts,
                    reason: error.to_string(),
                };
            }
            warn!(
                port = %breaker.id(),
                attempt = *attempts,
                limit,
                error = %error,
                "Undo attempt failed, retrying"
            );
        }
    }

    async fn report_incomplete(
        &self,
        model: &mut ModelInstance,
        port: &str,
        reason: &str,
    ) -> Result<(), CoreError> {
        self.update(
            model,
            ModelUpdate::new().compensate_result(CompensationStatus::Incomplete),
        )
        .await?;
        self.emit(
            model,
            EventKind::UndoFailed.event_name(&model.name),
            json!({
                "status": CompensationStatus::Incomplete,
                "port": port,
                "reason": reason,
                "portFlow": model.port_flow(),
            }),
        )
        .await
    }
}
