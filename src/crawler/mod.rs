pub mod classify;
pub mod fetcher;
pub mod frontier;
pub mod records;
pub mod task;

// Re-export common types
pub use classify::LinkClassifier;
pub use fetcher::{FetchError, PageFetcher};
pub use frontier::Frontier;
pub use task::{
    ExtractionBackend, ExtractionResult, PageKind, RepairTask, Task, TaskPriority,
    ValidationReport,
};
