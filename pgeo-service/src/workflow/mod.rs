//! Address processing workflow
//!
//! - `pipeline`: resolve → cluster → classify over one address list
//! - `storage`: CSV persistence of enriched records and the saved address book

pub mod pipeline;
pub mod storage;

// Re-exports for convenience
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutput, RunStatus};
pub use storage::AddressBook;
