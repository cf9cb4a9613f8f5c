//!
//! Portflow Core - saga orchestration and compensation engine
//!
//! Workflows are built from named ports chained by the events they consume
//! and produce. Completed ports are recorded in the model's port flow, which
//! drives both resumption after a restart and LIFO compensation when a port
//! fails for good.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - ports, workflow specs, model instances and collaborator traits
pub mod domain;

/// Application services - spec builder, runner, compensation and port invoker
pub mod application;

/// Resilience patterns
pub mod resilience;

/// Engine configuration
pub mod config;

/// Error types
pub mod error;

pub use application::compensation::CompensationOutcome;
pub use application::context::OrchestratorContext;
pub use application::event_bus::{WorkflowBusMessage, WorkflowEventBus, DEFAULT_BUS_CAPACITY};
pub use application::port_invoker::PortInvocation;
pub use config::EngineConfig;
pub use error::CoreError;

pub use domain::events::{EventKind, WorkflowEvent};
pub use domain::model::{CompensationStatus, ModelId, ModelInstance, ModelUpdate};
pub use domain::port::{Port, PortAdapter, PortDirection, UndoHandler};
pub use domain::repository::{
    EventBroker, EventHandler, ModelRegistry, RegistrationOutcome, SharedStorage, StorageFactory,
};
pub use domain::workflow_spec::{
    WorkflowDefinition, WorkflowFactory, WorkflowSpec, WORKFLOW_COMPLETE, WORKFLOW_ENDPOINT,
};
pub use resilience::{
    BreakerError, BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig,
    CircuitBreakerState,
};
