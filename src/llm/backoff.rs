use rand::Rng;
use std::time::Duration;

/// Exponential backoff schedule for retrying inference calls:
/// `min(base * 2^attempt, max)` plus ±25% jitter. The jitter keeps a fleet
/// of workers that tripped over the same failure from retrying in lockstep.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff_secs: f64, max_backoff_secs: f64) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_backoff: Duration::from_secs_f64(base_backoff_secs),
            max_backoff: Duration::from_secs_f64(max_backoff_secs),
        }
    }

    /// Nominal (un-jittered) delay before retrying `attempt` (0-based).
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let factor = 2f64.powi(attempt.min(32) as i32);
        let nominal = self.base_backoff.as_secs_f64() * factor;
        Duration::from_secs_f64(nominal.min(self.max_backoff.as_secs_f64()))
    }

    /// Jittered delay actually slept before the next attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt).as_secs_f64();
        let jitter = nominal * rand::thread_rng().gen_range(-0.25..=0.25);
        Duration::from_secs_f64((nominal + jitter).max(0.0))
    }
}
