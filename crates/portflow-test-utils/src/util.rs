//! Helpers for waiting on broker events.

use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::timeout;

use portflow_core::{CoreError, WorkflowEvent};

/// Wait until an event with the given name arrives
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<WorkflowEvent>,
    name: &str,
    within: Duration,
) -> Result<WorkflowEvent, CoreError> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if event.name == name => return Ok(event),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => {
                    return Err(CoreError::BrokerError("event channel closed".to_string()))
                }
            }
        }
    };

    timeout(within, wait)
        .await
        .map_err(|_| CoreError::Timeout(format!("no {} event within {:?}", name, within)))?
}

/// Wait for several events, in the given order
pub async fn wait_for_events(
    events: &mut broadcast::Receiver<WorkflowEvent>,
    names: &[&str],
    within: Duration,
) -> Result<Vec<WorkflowEvent>, CoreError> {
    let mut seen = Vec::with_capacity(names.len());
    for name in names {
        seen.push(wait_for_event(events, name, within).await?);
    }
    Ok(seen)
}
