use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};

use portflow_core::{CoreError, EventBroker, EventHandler, WorkflowEvent};

/// Capacity of the observer channel returned by `subscribe`
const TAP_CAPACITY: usize = 1024;

/// Event names kept by `history` and `notifications`; older names are dropped
pub const HISTORY_LIMIT: usize = 1024;

/// In-process event broker
///
/// Every handler runs in its own task, so `emit` returns as soon as the
/// event has been handed off. Only the most recent [`HISTORY_LIMIT`] event
/// names are remembered, so a long-running process keeps a fixed footprint.
pub struct InMemoryEventBroker {
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
    history: Mutex<VecDeque<String>>,
    notifications: Mutex<VecDeque<String>>,
    tap: broadcast::Sender<WorkflowEvent>,
}

impl InMemoryEventBroker {
    /// Create a broker with no subscribers
    pub fn new() -> Self {
        let (tap, _) = broadcast::channel(TAP_CAPACITY);
        Self {
            handlers: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            notifications: Mutex::new(VecDeque::new()),
            tap,
        }
    }

    /// Observe every event passing through the broker
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tap.subscribe()
    }

    /// Names of recently emitted events, oldest first
    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of recent events sent through `notify`, oldest first
    pub fn notifications(&self) -> Vec<String> {
        self.notifications
            .lock()
            .map(|notifications| notifications.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of handlers subscribed to an event
    pub async fn handler_count(&self, event: &str) -> usize {
        let handlers = self.handlers.read().await;
        handlers.get(event).map(Vec::len).unwrap_or(0)
    }

    fn record(log: &Mutex<VecDeque<String>>, name: &str) -> Result<(), CoreError> {
        let mut entries = log
            .lock()
            .map_err(|_| CoreError::BrokerError("event log lock poisoned".to_string()))?;
        if entries.len() == HISTORY_LIMIT {
            entries.pop_front();
        }
        entries.push_back(name.to_string());
        Ok(())
    }
}

impl Default for InMemoryEventBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBroker for InMemoryEventBroker {
    async fn on(&self, event: &str, handler: EventHandler) -> Result<(), CoreError> {
        let mut handlers = self.handlers.write().await;
        handlers.entry(event.to_string()).or_default().push(handler);
        debug!(event = %event, "Handler subscribed");
        Ok(())
    }

    async fn emit(&self, event: WorkflowEvent) -> Result<(), CoreError> {
        Self::record(&self.history, &event.name)?;

        // no observers is fine
        let _ = self.tap.send(event.clone());

        let handlers = {
            let handlers = self.handlers.read().await;
            handlers.get(&event.name).cloned().unwrap_or_default()
        };

        trace!(event = %event.name, handlers = handlers.len(), "Dispatching event");
        for handler in handlers {
            tokio::spawn(handler(event.clone()));
        }

        Ok(())
    }

    async fn notify(&self, event: WorkflowEvent) -> Result<(), CoreError> {
        Self::record(&self.notifications, &event.name)?;
        self.emit(event).await
    }
}
