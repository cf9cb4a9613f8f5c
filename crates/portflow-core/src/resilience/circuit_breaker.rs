use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::CoreError;

/// Circuit breaker states
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum CircuitBreakerState {
    /// Circuit is closed, requests flow normally
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, a single trial request is allowed
    HalfOpen,
}

impl fmt::Display for CircuitBreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitBreakerState::Closed => write!(f, "CLOSED"),
            CircuitBreakerState::Open => write!(f, "OPEN"),
            CircuitBreakerState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Why a protected call did not succeed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BreakerError {
    /// The circuit refused the call without invoking it
    #[error("Circuit open: {0}")]
    Rejected(String),
    /// The wrapped call ran and returned an error
    #[error(transparent)]
    Failed(CoreError),
}

impl From<BreakerError> for CoreError {
    fn from(err: BreakerError) -> Self {
        match err {
            BreakerError::Rejected(id) => CoreError::CircuitOpen(id),
            BreakerError::Failed(e) => e,
        }
    }
}

/// Circuit breaker configuration
///
/// `failure_threshold` is the failure that trips the circuit, not the last
/// one tolerated: with a threshold of 5 the fifth consecutive failure opens
/// it, so at most four failures are ever absorbed while closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit (the N-th failure trips it)
    pub failure_threshold: u32,
    /// Cool-down in milliseconds before a half-open trial is allowed
    pub reset_timeout_ms: u64,
    /// Maximum number of calls allowed in half-open state
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Check that the thresholds can actually trip and recover
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.failure_threshold == 0 {
            return Err(CoreError::ConfigurationError(
                "Circuit breaker failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.half_open_max_calls == 0 {
            return Err(CoreError::ConfigurationError(
                "Circuit breaker half_open_max_calls must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Point-in-time view of a circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    /// Stored state of the circuit
    pub state: CircuitBreakerState,
    /// Consecutive failures counted while closed
    pub failure_count: u32,
    /// When the last failure was recorded
    pub last_failure_time: Option<Instant>,
}

/// Internal state for one circuit
#[derive(Debug, Clone)]
struct CircuitEntry {
    state: CircuitBreakerState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    half_open_calls: u32,
}

impl Default for CircuitEntry {
    fn default() -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            failure_count: 0,
            last_failure_time: None,
            half_open_calls: 0,
        }
    }
}

/// Shared breaker state for every port, keyed by port name
///
/// Forward calls and undo calls for the same port resolve to the same entry,
/// so failures in either direction count against one circuit. Each transition
/// is a single map entry update; no guard is held across an await point.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    circuits: DashMap<String, CircuitEntry>,
}

impl BreakerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a breaker handle for a circuit
    pub fn breaker(
        self: &Arc<Self>,
        id: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> CircuitBreaker {
        CircuitBreaker {
            id: id.into(),
            config,
            registry: Arc::clone(self),
        }
    }

    /// Snapshot of a circuit, if it has ever been used
    pub fn snapshot(&self, id: &str) -> Option<BreakerSnapshot> {
        self.circuits.get(id).map(|entry| BreakerSnapshot {
            state: entry.state,
            failure_count: entry.failure_count,
            last_failure_time: entry.last_failure_time,
        })
    }

    /// Forget all circuit state
    pub fn reset(&self) {
        self.circuits.clear();
    }
}

/// Kind of permission granted to a single call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permit {
    Normal,
    Trial,
}

/// Releases a half-open trial slot if the call is dropped before settling
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    permit: Permit,
    settled: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.permit == Permit::Trial && !self.settled {
            if let Some(mut entry) = self.breaker.registry.circuits.get_mut(&self.breaker.id) {
                entry.half_open_calls = entry.half_open_calls.saturating_sub(1);
            }
            debug!(circuit = %self.breaker.id, "Half-open trial abandoned before completion");
        }
    }
}

/// Circuit breaker handle for a single circuit
#[derive(Clone)]
pub struct CircuitBreaker {
    id: String,
    config: CircuitBreakerConfig,
    registry: Arc<BreakerRegistry>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish()
    }
}

impl CircuitBreaker {
    /// Circuit identity (the port name)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Execute an operation with circuit breaker protection
    ///
    /// The operation is only constructed when the circuit admits the call, so
    /// an open circuit never invokes the wrapped function. A refusal is
    /// reported as [`BreakerError::Rejected`]; any error the operation itself
    /// returns, `CoreError::CircuitOpen` included, comes back as
    /// [`BreakerError::Failed`] and counts as a failure.
    pub async fn invoke<F, Fut, T>(&self, call: F) -> Result<T, BreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let permit = self.acquire()?;
        let mut guard = TrialGuard {
            breaker: self,
            permit,
            settled: false,
        };

        trace!(circuit = %self.id, ?permit, "Circuit breaker executing protected operation");
        let result = call().await;

        match &result {
            Ok(_) => self.record_success(permit),
            Err(e) => self.record_failure(permit, &e.to_string()),
        }
        guard.settled = true;

        result.map_err(BreakerError::Failed)
    }

    /// Count a failure without invoking the wrapped function
    ///
    /// Used when a call loses its race against a timeout.
    pub fn error(&self, reason: &str) {
        let mut entry = self.registry.circuits.entry(self.id.clone()).or_default();
        entry.last_failure_time = Some(Instant::now());

        match entry.state {
            CircuitBreakerState::HalfOpen => {
                entry.state = CircuitBreakerState::Open;
                entry.half_open_calls = 0;
                warn!(circuit = %self.id, reason, "Circuit breaker reopened by injected failure");
            }
            CircuitBreakerState::Closed => {
                entry.failure_count += 1;
                if entry.failure_count >= self.config.failure_threshold {
                    entry.state = CircuitBreakerState::Open;
                    warn!(
                        circuit = %self.id,
                        reason,
                        failures = entry.failure_count,
                        "Circuit breaker opened by injected failure"
                    );
                } else {
                    debug!(
                        circuit = %self.id,
                        reason,
                        failures = entry.failure_count,
                        "Injected failure counted"
                    );
                }
            }
            CircuitBreakerState::Open => {
                entry.failure_count += 1;
            }
        }
    }

    /// Get the current state of the circuit
    ///
    /// An open circuit whose cool-down has elapsed is reported as half-open;
    /// the transition itself happens on the next `invoke`.
    pub fn state(&self) -> CircuitBreakerState {
        match self.registry.circuits.get(&self.id) {
            Some(entry) => {
                if entry.state == CircuitBreakerState::Open && self.cool_down_elapsed(&entry) {
                    CircuitBreakerState::HalfOpen
                } else {
                    entry.state
                }
            }
            None => CircuitBreakerState::Closed,
        }
    }

    /// Consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.registry
            .circuits
            .get(&self.id)
            .map(|entry| entry.failure_count)
            .unwrap_or(0)
    }

    fn cool_down_elapsed(&self, entry: &CircuitEntry) -> bool {
        entry
            .last_failure_time
            .map(|last| last.elapsed() >= self.config.reset_timeout())
            .unwrap_or(true)
    }

    fn acquire(&self) -> Result<Permit, BreakerError> {
        let mut entry = self.registry.circuits.entry(self.id.clone()).or_default();

        if entry.state == CircuitBreakerState::Open {
            if self.cool_down_elapsed(&entry) {
                entry.state = CircuitBreakerState::HalfOpen;
                entry.half_open_calls = 0;
                info!(circuit = %self.id, "Circuit breaker transitioned to half-open after cool-down");
            } else {
                debug!(circuit = %self.id, "Circuit breaker rejected execution");
                return Err(BreakerError::Rejected(self.id.clone()));
            }
        }

        match entry.state {
            CircuitBreakerState::Closed => Ok(Permit::Normal),
            CircuitBreakerState::HalfOpen => {
                if entry.half_open_calls < self.config.half_open_max_calls {
                    entry.half_open_calls += 1;
                    debug!(
                        circuit = %self.id,
                        calls = entry.half_open_calls,
                        "Allowing trial call in half-open state"
                    );
                    Ok(Permit::Trial)
                } else {
                    debug!(circuit = %self.id, "Rejecting call, half-open trial already in flight");
                    Err(BreakerError::Rejected(self.id.clone()))
                }
            }
            CircuitBreakerState::Open => Err(BreakerError::Rejected(self.id.clone())),
        }
    }

    fn record_success(&self, permit: Permit) {
        let mut entry = self.registry.circuits.entry(self.id.clone()).or_default();

        match (permit, entry.state) {
            (Permit::Trial, CircuitBreakerState::HalfOpen) => {
                entry.state = CircuitBreakerState::Closed;
                entry.failure_count = 0;
                entry.half_open_calls = 0;
                info!(circuit = %self.id, "Circuit breaker closed after successful half-open call");
            }
            (Permit::Normal, CircuitBreakerState::Closed) => {
                entry.failure_count = 0;
            }
            (_, state) => {
                trace!(circuit = %self.id, %state, "Success recorded without state change");
            }
        }
    }

    fn record_failure(&self, permit: Permit, reason: &str) {
        let mut entry = self.registry.circuits.entry(self.id.clone()).or_default();
        entry.last_failure_time = Some(Instant::now());

        match (permit, entry.state) {
            (Permit::Trial, CircuitBreakerState::HalfOpen) => {
                entry.state = CircuitBreakerState::Open;
                entry.half_open_calls = 0;
                warn!(circuit = %self.id, reason, "Circuit breaker reopened after half-open failure");
            }
            (_, CircuitBreakerState::Closed) => {
                entry.failure_count += 1;
                if entry.failure_count >= self.config.failure_threshold {
                    entry.state = CircuitBreakerState::Open;
                    warn!(
                        circuit = %self.id,
                        reason,
                        failures = entry.failure_count,
                        "Circuit breaker opened after consecutive failures"
                    );
                } else {
                    debug!(
                        circuit = %self.id,
                        reason,
                        failures = entry.failure_count,
                        threshold = self.config.failure_threshold,
                        "Circuit failure counted"
                    );
                }
            }
            (_, _) => {
                entry.failure_count += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(threshold: u32, reset_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_timeout_ms: reset_ms,
            half_open_max_calls: 1,
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), BreakerError> {
        breaker
            .invoke(|| async { Err::<(), _>(CoreError::PortExecutionError("boom".to_string())) })
            .await
    }

    #[tokio::test]
    async fn test_circuit_breaker_basic_operation() {
        let registry = Arc::new(BreakerRegistry::new());
        let breaker = registry.breaker("requestCert", config(2, 100));

        assert_eq!(breaker.state(), CircuitBreakerState::Closed);

        assert!(fail(&breaker).await.is_err());
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
        assert_eq!(breaker.failure_count(), 1);

        assert!(fail(&breaker).await.is_err());
        assert_eq!(breaker.state(), CircuitBreakerState::Open);
    }

    #[tokio::test]
    async fn test_open_circuit_does_not_invoke() {
        let registry = Arc::new(BreakerRegistry::new());
        let breaker = registry.breaker("installCert", config(1, 10_000));
        let calls = AtomicU32::new(0);

        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitBreakerState::Open);

        let result = breaker
            .invoke(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(BreakerError::Rejected(ref id)) if id == "installCert"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let registry = Arc::new(BreakerRegistry::new());
        let breaker = registry.breaker("p", config(3, 100));

        let _ = fail(&breaker).await;
        let _ = fail(&breaker).await;
        assert_eq!(breaker.failure_count(), 2);

        breaker.invoke(|| async { Ok(()) }).await.unwrap();
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let registry = Arc::new(BreakerRegistry::new());
        let breaker = registry.breaker("p", config(1, 1_000));

        let _ = fail(&breaker).await;
        assert_eq!(breaker.state(), CircuitBreakerState::Open);

        tokio::time::advance(Duration::from_millis(1_001)).await;
        assert_eq!(breaker.state(), CircuitBreakerState::HalfOpen);

        breaker.invoke(|| async { Ok(()) }).await.unwrap();
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let registry = Arc::new(BreakerRegistry::new());
        let breaker = registry.breaker("p", config(1, 1_000));

        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(1_001)).await;

        assert!(fail(&breaker).await.is_err());
        let snapshot = registry.snapshot("p").unwrap();
        assert_eq!(snapshot.state, CircuitBreakerState::Open);

        // cool-down restarts from the failed trial
        let result = breaker.invoke(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(BreakerError::Rejected(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_trial_in_half_open() {
        let registry = Arc::new(BreakerRegistry::new());
        let breaker = registry.breaker("p", config(1, 1_000));
        let _ = fail(&breaker).await;
        tokio::time::advance(Duration::from_millis(1_001)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let trial_breaker = breaker.clone();
        let trial = tokio::spawn(async move {
            trial_breaker
                .invoke(|| async move {
                    let _ = release_rx.await;
                    Ok(())
                })
                .await
        });
        tokio::task::yield_now().await;

        let second = breaker.invoke(|| async { Ok(()) }).await;
        assert!(matches!(second, Err(BreakerError::Rejected(_))));

        release_tx.send(()).unwrap();
        trial.await.unwrap().unwrap();
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
    }

    #[tokio::test]
    async fn test_injected_error_trips_circuit() {
        let registry = Arc::new(BreakerRegistry::new());
        let breaker = registry.breaker("p", config(2, 1_000));

        breaker.error("undoTimeout");
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);
        breaker.error("undoTimeout");
        assert_eq!(breaker.state(), CircuitBreakerState::Open);
    }

    #[tokio::test]
    async fn test_handles_share_state_by_port_name() {
        let registry = Arc::new(BreakerRegistry::new());
        let forward = registry.breaker("installCert", config(2, 1_000));
        let undo = registry.breaker("installCert", config(2, 1_000));
        let other = registry.breaker("requestCert", config(2, 1_000));

        let _ = fail(&forward).await;
        let _ = fail(&undo).await;

        assert_eq!(forward.state(), CircuitBreakerState::Open);
        assert_eq!(undo.state(), CircuitBreakerState::Open);
        assert_eq!(other.state(), CircuitBreakerState::Closed);
    }

    #[tokio::test]
    async fn test_default_threshold_opens_on_fifth_failure() {
        let registry = Arc::new(BreakerRegistry::new());
        let breaker = registry.breaker("installCert", CircuitBreakerConfig::default());

        for _ in 0..4 {
            assert!(matches!(fail(&breaker).await, Err(BreakerError::Failed(_))));
        }
        assert_eq!(breaker.state(), CircuitBreakerState::Closed);

        assert!(matches!(fail(&breaker).await, Err(BreakerError::Failed(_))));
        assert_eq!(breaker.state(), CircuitBreakerState::Open);
        assert!(matches!(fail(&breaker).await, Err(BreakerError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_circuit_open_from_call_counts_as_failure() {
        let registry = Arc::new(BreakerRegistry::new());
        let breaker = registry.breaker("installCert", config(2, 1_000));

        let result = breaker
            .invoke(|| async { Err::<(), _>(CoreError::CircuitOpen("downstream".to_string())) })
            .await;

        assert_eq!(
            result,
            Err(BreakerError::Failed(CoreError::CircuitOpen("downstream".to_string())))
        );
        assert_eq!(breaker.failure_count(), 1);
        assert_eq!(
            CoreError::from(BreakerError::Rejected("installCert".to_string())),
            CoreError::CircuitOpen("installCert".to_string())
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CircuitBreakerState::Closed.to_string(), "CLOSED");
        assert_eq!(CircuitBreakerState::Open.to_string(), "OPEN");
        assert_eq!(CircuitBreakerState::HalfOpen.to_string(), "HALF_OPEN");
    }

    #[test]
    fn test_config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());
        assert!(config(0, 10).validate().is_err());
    }
}
