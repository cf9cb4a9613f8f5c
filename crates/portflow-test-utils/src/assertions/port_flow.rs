//! Assertion utilities for validating port flow and compensation state.

use thiserror::Error;

use portflow_core::{CompensationStatus, ModelInstance};

/// Error type for port flow validation failures
#[derive(Debug, Error, PartialEq)]
pub enum PortFlowAssertionError {
    #[error("Port flow mismatch: expected {expected:?}, got {actual:?}")]
    FlowMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("Model {0} is still marked as compensating")]
    StillCompensating(String),

    #[error("Compensation result mismatch: expected {expected:?}, got {actual:?}")]
    ResultMismatch {
        expected: Option<CompensationStatus>,
        actual: Option<CompensationStatus>,
    },
}

/// Asserts that a model's port flow equals the expected ports, oldest first.
pub fn assert_port_flow(
    model: &ModelInstance,
    expected: &[&str],
) -> Result<(), PortFlowAssertionError> {
    let actual = model.port_flow().to_vec();
    if actual.iter().map(String::as_str).ne(expected.iter().copied()) {
        return Err(PortFlowAssertionError::FlowMismatch {
            expected: expected.iter().map(|p| p.to_string()).collect(),
            actual,
        });
    }
    Ok(())
}

/// Asserts that a model was fully compensated.
///
/// The flow must be empty, the compensating flag cleared and the last
/// result `COMPLETE`.
pub fn assert_compensated(model: &ModelInstance) -> Result<(), PortFlowAssertionError> {
    assert_port_flow(model, &[])?;
    if model.compensate {
        return Err(PortFlowAssertionError::StillCompensating(model.id.to_string()));
    }
    if model.compensate_result != Some(CompensationStatus::Complete) {
        return Err(PortFlowAssertionError::ResultMismatch {
            expected: Some(CompensationStatus::Complete),
            actual: model.compensate_result,
        });
    }
    Ok(())
}
