//! # Store Interface
//!
//! The narrow persistence boundary the pipeline and queries go through.
//! [`LogStore`] is the contract; [`SledLogStore`] is the bundled adapter.
//!
//! Implementations must be safe under concurrent ingestion of different logs
//! and concurrent reads. Writes to one log are serialized by the caller.

pub mod error;
pub mod sled_store;

pub use error::{StoreError, StoreResult};
pub use sled_store::SledLogStore;

use crate::sample::{Log, LogId, Sample};
use crate::selector::LabelSelector;
use crate::stats::{Stat, WindowSpec};
use async_trait::async_trait;
use std::fmt::Debug;

/// Lazy sequence of stored samples in insertion order.
pub type SampleStream = Box<dyn Iterator<Item = StoreResult<Sample>> + Send>;

#[async_trait]
pub trait LogStore: Send + Sync + Debug {
    /// Insert a new log record. Fails if the id is taken.
    async fn put_log(&self, log: &Log) -> StoreResult<LogId>;

    /// Replace an existing log record (state transitions).
    async fn update_log(&self, log: &Log) -> StoreResult<()>;

    async fn get_log(&self, id: LogId) -> StoreResult<Option<Log>>;

    /// Logs whose labels match `filter`, oldest upload first. Deleted logs
    /// are never listed.
    async fn list_logs(&self, filter: Option<&LabelSelector>) -> StoreResult<Vec<Log>>;

    /// Mark the log deleted and remove its raw content, samples and stats.
    ///
    /// Readers stop seeing the derived data at the moment the record flips
    /// to `Deleted`.
    async fn delete_log(&self, id: LogId) -> StoreResult<()>;

    async fn put_raw_content(&self, id: LogId, content: &[u8]) -> StoreResult<()>;

    async fn get_raw_content(&self, id: LogId) -> StoreResult<Option<Vec<u8>>>;

    /// Append samples to a log, atomically per call.
    async fn put_samples(&self, id: LogId, samples: &[Sample]) -> StoreResult<()>;

    /// Stored samples; empty for unknown or deleted logs.
    async fn get_samples(&self, id: LogId) -> StoreResult<SampleStream>;

    /// Persist stats under `spec`. Write-once: returns `false` and leaves the
    /// existing entry alone if one is already there.
    async fn put_stats(&self, id: LogId, spec: &WindowSpec, stats: &[Stat]) -> StoreResult<bool>;

    async fn get_stats(&self, id: LogId, spec: &WindowSpec) -> StoreResult<Option<Vec<Stat>>>;

    /// Remove samples and stats written for a log that did not complete.
    async fn discard_derived(&self, id: LogId) -> StoreResult<()>;
}
