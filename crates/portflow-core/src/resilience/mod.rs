//! Resilience patterns guarding port invocations

/// Circuit breaker shared by forward and undo calls
pub mod circuit_breaker;

pub use circuit_breaker::{
    BreakerError, BreakerRegistry, BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState,
};
