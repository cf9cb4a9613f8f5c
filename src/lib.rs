//! Portflow: saga orchestration over event-chained ports.
//!
//! Re-exports the engine, its in-memory collaborators and the logging setup
//! so applications can depend on a single crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use portflow_core as core;
pub use portflow_monitoring as monitoring;
pub use portflow_state_inmemory as state;

pub use portflow_core::{
    CompensationOutcome, CoreError, EngineConfig, ModelInstance, OrchestratorContext, Port,
    PortAdapter, UndoHandler, WorkflowDefinition,
};
pub use portflow_monitoring::{init_logging, LogExt, MonitoringConfig};
pub use portflow_state_inmemory::InMemoryStateProvider;

/// Sample certificate workflow used by the demo binary
pub mod demo;
