use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    /// Serving normally.
    Closed,
    /// Rejecting immediately until the timeout elapses.
    Open,
    /// One probe call is in flight; its outcome decides the next state.
    HalfOpen,
}

/// Simple threshold circuit breaker: `threshold` consecutive failures open
/// it, the open timeout admits a single probe, and the probe's outcome
/// either closes it or restarts the timer. A saturated backend fails slowly,
/// so failing fast here keeps rate-limit tokens for calls that can succeed.
pub struct CircuitBreaker {
    threshold: u32,
    timeout: Duration,
    failures: u32,
    last_failure: Option<Instant>,
    state: BreakerState,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            timeout,
            failures: 0,
            last_failure: None,
            state: BreakerState::Closed,
        }
    }

    /// Ask to place a call. A `true` from an Open breaker means this call is
    /// the half-open probe; the caller must report its outcome.
    pub fn try_acquire(&mut self) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => false,
            BreakerState::Open => {
                let elapsed = self
                    .last_failure
                    .map(|at| at.elapsed())
                    .unwrap_or(self.timeout);

                if elapsed >= self.timeout {
                    info!("circuit breaker half-open, admitting probe");
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.state = BreakerState::Closed;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
        self.last_failure = Some(Instant::now());

        match self.state {
            // A failed probe reopens immediately.
            BreakerState::HalfOpen => {
                warn!("circuit breaker probe failed, reopening");
                self.state = BreakerState::Open;
            }
            BreakerState::Closed if self.failures >= self.threshold => {
                warn!(failures = self.failures, threshold = self.threshold, "circuit breaker opened");
                self.state = BreakerState::Open;
            }
            _ => {}
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == BreakerState::Open
    }
}
