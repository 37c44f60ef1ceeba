//! # PerfLog Library
//!
//! Ingests performance-test sample logs (JMeter JTL, CSV, TSV), parses them
//! into samples, and computes windowed latency statistics over the logs a
//! label selector picks.
//!
//! ## Core Components
//!
//! * `sample` - the `Sample` and `Log` records and the log state machine
//! * `parser` - format sniffing, column resolution and the streaming reader
//! * `selector` - the label selector language and its evaluator
//! * `stats` - window specs, percentiles and the `Aggregator`
//! * `store` - the `LogStore` persistence boundary and its sled adapter
//! * `ingestion` - the per-log pipeline and the `IngestionService`
//! * `logging` - per-component log targets and logger setup
//! * `config` / `error` - crate-level configuration and error types
//!
//! ## Architecture
//!
//! Every upload becomes a `Log` that moves through
//! `RECEIVED -> PARSING -> PARSED -> AGGREGATING -> READY`. Only `READY` logs
//! are visible to queries, so a failed or cancelled ingestion never exposes
//! partial data. Stats for the default window are computed eagerly; other
//! windows are computed on first query and cached write-once.
//!
//! ```
//! use perflog::ingestion::IngestRequest;
//! use perflog::testing::temporary_service;
//! use perflog::IngestionConfig;
//!
//! # tokio_test::block_on(async {
//! let service = temporary_service(IngestionConfig::default()).unwrap();
//! let content = "ts,label,elapsed,status\n0,login,120,OK\n1,login,95,FAIL\n";
//! let status = service
//!     .ingest_and_wait(IngestRequest::new("smoke", content).with_label("env", "ci"))
//!     .await
//!     .unwrap();
//! assert_eq!(status.sample_count, 2);
//!
//! let stats = service.query("env = ci", 60_000, None).await.unwrap();
//! assert_eq!(stats[0].error_count, 1);
//! # });
//! ```

pub mod config;
pub mod error;
pub mod ingestion;
pub mod logging;
pub mod parser;
pub mod sample;
pub mod selector;
pub mod stats;
pub mod store;
pub mod testing;

// Re-export main types for convenience
pub use config::PerfLogConfig;
pub use error::{PerfLogError, PerfLogResult};
pub use ingestion::{
    IngestRequest, IngestStatus, IngestionConfig, IngestionError, IngestionService, QueryRequest,
};
pub use parser::{LogFormat, ParserConfig, SampleParser};
pub use sample::{Labels, Log, LogId, LogState, Sample};
pub use selector::LabelSelector;
pub use stats::{Aggregator, Distribution, GroupBy, Stat, WindowSpec};
pub use store::{LogStore, SledLogStore};
