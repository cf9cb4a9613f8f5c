//! Scripted port handlers with predictable failures.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use portflow_core::{CoreError, ModelInstance, PortAdapter, UndoHandler};

/// Which side of a port was called
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Forward invocation
    Invoke,
    /// Compensating undo
    Undo,
}

/// Ordered record of calls shared between scripted ports
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<(CallKind, String)>>>,
}

impl CallLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, kind: CallKind, port: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((kind, port.to_string()));
        }
    }

    /// Every call in order
    pub fn entries(&self) -> Vec<(CallKind, String)> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Ports whose undo was called, in call order
    pub fn undone(&self) -> Vec<String> {
        self.of_kind(CallKind::Undo)
    }

    /// Ports that were invoked forward, in call order
    pub fn invoked(&self) -> Vec<String> {
        self.of_kind(CallKind::Invoke)
    }

    fn of_kind(&self, kind: CallKind) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, port)| port)
            .collect()
    }
}

/// Undo handler and port adapter that follows a script
///
/// Fails the first `failures` calls, sleeps for `delay` on every call and
/// returns `output` from forward invocations once it succeeds.
pub struct ScriptedPort {
    name: String,
    failures: AtomicU32,
    delay: Option<Duration>,
    output: Value,
    log: Option<CallLog>,
    calls: AtomicU32,
}

impl ScriptedPort {
    /// A port that always succeeds
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failures: AtomicU32::new(0),
            delay: None,
            output: json!({}),
            log: None,
            calls: AtomicU32::new(0),
        }
    }

    /// Fail the first `failures` calls
    pub fn failing_times(self, failures: u32) -> Self {
        self.failures.store(failures, Ordering::SeqCst);
        self
    }

    /// Fail every call
    pub fn always_failing(self) -> Self {
        self.failing_times(u32::MAX)
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Value returned from successful forward calls
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }

    /// Record calls into a shared log
    pub fn with_log(mut self, log: &CallLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    /// Wrap in an `Arc` for use as a handler
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn run(&self, kind: CallKind) -> Result<(), CoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(log) = &self.log {
            log.record(kind, &self.name);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        debug!(port = %self.name, ?kind, call, failing, "Scripted call");

        if failing {
            return Err(CoreError::PortExecutionError(format!(
                "{} failed on call {}",
                self.name, call
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl UndoHandler for ScriptedPort {
    async fn undo(&self, _model: &ModelInstance) -> Result<(), CoreError> {
        self.run(CallKind::Undo).await
    }
}

#[async_trait]
impl PortAdapter for ScriptedPort {
    async fn invoke(&self, _model: &ModelInstance) -> Result<Value, CoreError> {
        self.run(CallKind::Invoke).await?;
        Ok(self.output.clone())
    }
}
