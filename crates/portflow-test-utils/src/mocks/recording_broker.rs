//! Broker fake that records events and runs handlers inline.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

use portflow_core::{CoreError, EventBroker, EventHandler, WorkflowEvent};

/// Broker that awaits every handler before `emit` returns
///
/// Running handlers inline makes a whole event chain finish inside the
/// call that started it, so tests can assert right after `run_workflow`.
pub struct RecordingBroker {
    events: Mutex<Vec<WorkflowEvent>>,
    notified: Mutex<Vec<String>>,
    handlers: Mutex<HashMap<String, Vec<EventHandler>>>,
    tap: broadcast::Sender<WorkflowEvent>,
}

impl RecordingBroker {
    /// Create a broker with no subscribers
    pub fn new() -> Self {
        let (tap, _) = broadcast::channel(256);
        Self {
            events: Mutex::new(Vec::new()),
            notified: Mutex::new(Vec::new()),
            handlers: Mutex::new(HashMap::new()),
            tap,
        }
    }

    /// Observe events as they are emitted
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tap.subscribe()
    }

    /// Names of emitted events, in order
    pub fn names(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|event| event.name)
            .collect()
    }

    /// Emitted events, in order
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Emitted events with the given name
    pub fn named(&self, name: &str) -> Vec<WorkflowEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.name == name)
            .collect()
    }

    /// Names of events sent through `notify`
    pub fn notified(&self) -> Vec<String> {
        self.notified.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl Default for RecordingBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBroker for RecordingBroker {
    async fn on(&self, event: &str, handler: EventHandler) -> Result<(), CoreError> {
        self.handlers
            .lock()
            .map_err(|_| CoreError::BrokerError("handler lock poisoned".to_string()))?
            .entry(event.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    async fn emit(&self, event: WorkflowEvent) -> Result<(), CoreError> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        let _ = self.tap.send(event.clone());

        let handlers = self
            .handlers
            .lock()
            .map(|h| h.get(&event.name).cloned().unwrap_or_default())
            .unwrap_or_default();
        for handler in handlers {
            handler(event.clone()).await;
        }
        Ok(())
    }

    async fn notify(&self, event: WorkflowEvent) -> Result<(), CoreError> {
        if let Ok(mut notified) = self.notified.lock() {
            notified.push(event.name.clone());
        }
        self.emit(event).await
    }
}
