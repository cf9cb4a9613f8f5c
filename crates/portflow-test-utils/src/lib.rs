//! Testing utilities for the Portflow engine.
//!
//! This crate provides mocks of the collaborator traits, scripted port
//! handlers, builders for models and workflows, port flow assertions,
//! log capture and helpers for waiting on broker events.

pub mod assertions;
pub mod builders;
pub mod logs;
pub mod mocks;
pub mod util;

/// Re-export commonly used types for convenience
pub use mockall;

pub use assertions::{assert_compensated, assert_port_flow, PortFlowAssertionError};
pub use builders::{CacertWorkflow, ModelBuilder};
pub use logs::LogCapture;
pub use mocks::{CallLog, RecordingBroker, ScriptedPort};
pub use util::{wait_for_event, wait_for_events};
