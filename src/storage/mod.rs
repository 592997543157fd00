pub mod memory;
pub mod queue;
pub mod results;

// Re-export common types
pub use memory::MemoryBroker;
pub use queue::{Broker, Delivery, Envelope, RedisBroker};
pub use results::ResultLog;
