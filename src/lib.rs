pub mod core;
pub mod edgar;
pub mod fetch;
pub mod pipeline;
pub mod sink;
pub mod utils;

// Re-exports
pub use crate::core::config::PipelineConfig;
pub use crate::core::types::{FilingReference, PurchaseTransaction, RawDocument};
pub use edgar::accession::FilingKey;
pub use edgar::error::EdgarError;
pub use pipeline::{BatchReport, Pipeline};
pub use utils::progress::ProgressTracker;
