//! # Ingestion Pipeline
//!
//! Takes raw uploads through parsing and aggregation into the store, and
//! serves stats queries over the logs that made it to `READY`.
//!
//! ## Components
//!
//! * `service` - [`IngestionService`], the entry point callers use
//! * `pipeline` - [`LogPipeline`], one log's run through the state machine
//! * `request` - [`IngestRequest`], [`IngestStatus`] and [`QueryRequest`]
//! * `config` - [`IngestionConfig`] with `PERFLOG_*` environment overrides
//! * `error` - [`IngestionError`]
//!
//! Each upload gets its own pipeline. Pipelines for different logs run
//! concurrently up to `max_concurrent_ingestions`; a per-log lock keeps
//! deletes away from a log whose pipeline is still running.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod request;
pub mod service;

pub use config::IngestionConfig;
pub use error::{IngestionError, IngestionResult};
pub use pipeline::{CancelFlag, LogPipeline, PipelineOptions};
pub use request::{IngestRequest, IngestStatus, QueryRequest};
pub use service::IngestionService;

#[cfg(test)]
mod tests;
