#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod pipeline;
pub mod utils;
pub mod worker;

pub use pipeline::{GenerationPipeline, PipelineConfig, PipelineError, PipelineInput, PipelineOutput};
pub use worker::{ProcessingOutcome, QueueWorker, WorkerConfig};
