//! Bounded retries with exponential backoff and a global circuit breaker.
//!
//! The [`RetryExecutor`] wraps a fallible generator call. Every failure bumps
//! a per-call attempt counter and the shared [`CircuitBreaker`] counter. The
//! breaker counts *consecutive* failures across all items and phases; any
//! success resets it. Once the threshold is reached the breaker stays open
//! until [`CircuitBreaker::reset`] is called.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{GeneratorError, PersistenceError};

/// Maximum attempts per phase invocation.
pub const MAX_RETRIES: u32 = 3;

/// Consecutive failures that open the circuit.
pub const CIRCUIT_THRESHOLD: u32 = 3;

/// Base delay for exponential backoff.
pub const BASE_DELAY: Duration = Duration::from_millis(2000);

/// Retry limits and backoff timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts per phase invocation.
    pub max_retries: u32,
    /// Consecutive failures (global) that open the circuit.
    pub circuit_threshold: u32,
    /// Base delay; attempt `n` waits `base_delay * 2^n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            circuit_threshold: CIRCUIT_THRESHOLD,
            base_delay: BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the circuit threshold.
    pub fn with_circuit_threshold(mut self, threshold: u32) -> Self {
        self.circuit_threshold = threshold;
        self
    }

    /// Sets the base backoff delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Backoff after the `attempt`-th failed attempt (1-based). No jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Result of recording a failure on the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureRecord {
    /// Consecutive failures after this one.
    pub consecutive: u32,
    /// True if this failure opened the circuit.
    pub tripped: bool,
}

/// Global consecutive-failure guard.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    consecutive_failures: AtomicU32,
    open: AtomicBool,
    trips: AtomicU64,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: AtomicU32::new(0),
            open: AtomicBool::new(false),
            trips: AtomicU64::new(0),
        }
    }

    /// Failure count that opens the circuit.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Returns true if the circuit is open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Current consecutive failure count.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Number of times the circuit has opened in this session.
    pub fn trips(&self) -> u64 {
        self.trips.load(Ordering::SeqCst)
    }

    /// Records a failed attempt.
    pub fn record_failure(&self) -> FailureRecord {
        let consecutive = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let mut tripped = false;
        if consecutive >= self.threshold && !self.open.swap(true, Ordering::SeqCst) {
            self.trips.fetch_add(1, Ordering::SeqCst);
            tripped = true;
        }
        FailureRecord {
            consecutive,
            tripped,
        }
    }

    /// Records a successful attempt.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Closes the circuit and clears the failure count.
    pub fn reset(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Outcome of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    /// The operation eventually succeeded.
    Succeeded(T),
    /// All attempts failed without opening the circuit.
    Exhausted { attempts: u32, last_error: String },
    /// The circuit opened; no further attempts were made.
    CircuitOpened { attempts: u32, last_error: String },
}

impl<T> RetryOutcome<T> {
    /// Returns the value on success.
    pub fn into_value(self) -> Option<T> {
        match self {
            RetryOutcome::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    /// Returns true if the circuit opened.
    pub fn opened_circuit(&self) -> bool {
        matches!(self, RetryOutcome::CircuitOpened { .. })
    }
}

/// Receives every failed attempt before the executor decides what to do next.
#[async_trait]
pub trait AttemptObserver: Send + Sync {
    /// Called after the `attempt`-th failure (1-based).
    async fn attempt_failed(
        &self,
        attempt: u32,
        error: &GeneratorError,
    ) -> Result<(), PersistenceError>;
}

/// Runs an operation up to `max_retries` times with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl RetryExecutor {
    /// Creates an executor sharing `breaker` with every other executor.
    pub fn new(policy: RetryPolicy, breaker: Arc<CircuitBreaker>) -> Self {
        Self { policy, breaker }
    }

    /// Returns the retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns the shared breaker.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Executes `op` with retries.
    ///
    /// Only errors from `observer` are returned as `Err`; generator errors are
    /// folded into the [`RetryOutcome`].
    pub async fn execute<T, F, Fut>(
        &self,
        mut op: F,
        observer: &dyn AttemptObserver,
    ) -> Result<RetryOutcome<T>, PersistenceError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, GeneratorError>> + Send,
    {
        if self.breaker.is_open() {
            return Ok(RetryOutcome::CircuitOpened {
                attempts: 0,
                last_error: "Circuit breaker is open".to_string(),
            });
        }

        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok(RetryOutcome::Succeeded(value));
                }
                Err(err) => {
                    attempt += 1;
                    let record = self.breaker.record_failure();
                    observer.attempt_failed(attempt, &err).await?;

                    if self.breaker.is_open() {
                        if record.tripped {
                            tracing::error!(
                                attempt,
                                consecutive_failures = record.consecutive,
                                threshold = self.breaker.threshold(),
                                error = %err,
                                "Circuit breaker tripped, halting pipeline"
                            );
                        }
                        return Ok(RetryOutcome::CircuitOpened {
                            attempts: attempt,
                            last_error: err.to_string(),
                        });
                    }

                    if attempt >= self.policy.max_retries {
                        tracing::warn!(
                            attempt,
                            max_retries = self.policy.max_retries,
                            error = %err,
                            "Max retries exceeded"
                        );
                        return Ok(RetryOutcome::Exhausted {
                            attempts: attempt,
                            last_error: err.to_string(),
                        });
                    }

                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        attempt,
                        max_retries = self.policy.max_retries,
                        consecutive_failures = record.consecutive,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Generation attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
