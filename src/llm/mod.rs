pub mod backoff;
pub mod breaker;
pub mod client;
pub mod error;
pub mod limiter;

// Re-export common types
pub use backoff::RetryPolicy;
pub use breaker::CircuitBreaker;
pub use client::{strip_code_fences, InferenceClient};
pub use error::InferenceError;
pub use limiter::{RateLimiter, RatePermit};
