use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

/// Holding one of these means the caller owns an in-flight slot against the
/// inference backend. The slot returns on drop, whether the call succeeded,
/// failed, or was cancelled. The rate token it took stays spent.
pub struct RatePermit {
    _permit: OwnedSemaphorePermit,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Two-axis admission control for a backend that degrades under either burst
/// concurrency or sustained throughput: a counting semaphore bounds in-flight
/// calls, a token bucket bounds the admission rate. Tokens refill
/// continuously at `requests_per_minute / 60` per second up to a cap of
/// `requests_per_minute`, and the bucket starts full.
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    bucket: Mutex<Bucket>,
    requests_per_minute: u32,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32, max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            bucket: Mutex::new(Bucket {
                tokens: f64::from(requests_per_minute),
                last_refill: Instant::now(),
            }),
            requests_per_minute,
        }
    }

    /// Wait for a concurrency slot, then for a rate token. Cooperative: the
    /// wait sleeps rather than spinning, so other consumers keep running.
    pub async fn acquire(&self) -> RatePermit {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("rate limiter semaphore closed");

        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - bucket.tokens;
                    Some(Duration::from_secs_f64(
                        deficit * 60.0 / f64::from(self.requests_per_minute),
                    ))
                }
            };

            match wait {
                None => return RatePermit { _permit: permit },
                Some(wait) => {
                    debug!(wait_secs = wait.as_secs_f64(), "rate limit reached, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        let cap = f64::from(self.requests_per_minute);
        bucket.tokens = (bucket.tokens + elapsed * cap / 60.0).min(cap);
        bucket.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn burst_up_to_capacity_then_throttles() {
        // 2 rpm: bucket holds 2 tokens, one new token every 30s.
        let limiter = RateLimiter::new(2, 10);
        let start = Instant::now();

        let _a = limiter.acquire().await;
        let _b = limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));

        // Third admission must wait for a refill.
        let _c = limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(29));
    }

    #[tokio::test(start_paused = true)]
    async fn window_bound_holds_over_a_minute() {
        let limiter = Arc::new(RateLimiter::new(6, 100));
        let admitted = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            let admitted = admitted.clone();
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await;
                admitted.fetch_add(1, Ordering::SeqCst);
            }));
        }

        // Let everything that can be admitted in the first minute through.
        tokio::time::sleep(Duration::from_secs(60)).await;

        // Initial burst of 6 plus at most 6 refilled over the window.
        assert!(admitted.load(Ordering::SeqCst) <= 12);

        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded_independent_of_rate() {
        let limiter = Arc::new(RateLimiter::new(1000, 3));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let limiter = limiter.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_permit_frees_the_slot() {
        let limiter = RateLimiter::new(1000, 1);

        let permit = limiter.acquire().await;
        drop(permit);

        // Would deadlock if the slot were not returned.
        let _again = limiter.acquire().await;
    }
}
