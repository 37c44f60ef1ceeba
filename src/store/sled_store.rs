//! sled-backed [`LogStore`].
//!
//! Trees:
//!
//! * `logs` - `{log_id}` -> JSON [`Log`]
//! * `raw_content` - `{log_id}` -> raw bytes
//! * `samples` - `{log_id}/{seq:016x}` -> JSON [`Sample`]
//! * `stats` - `{log_id}/{window_spec}` -> JSON `Vec<Stat>`
//!
//! Deletion first flips the log record to `Deleted` and then purges the
//! derived trees; reads check the record, so nothing stale is served in
//! between. Tombstones whose purge was interrupted are swept on open.

use super::error::{StoreError, StoreResult};
use super::{LogStore, SampleStream};
use crate::sample::{Log, LogId, LogState, Sample};
use crate::selector::LabelSelector;
use crate::stats::{Stat, WindowSpec};
use crate::{log_store_debug, log_store_error, log_store_info};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{ConflictableTransactionError, Transactional};
use std::path::Path;

#[derive(Clone)]
pub struct SledLogStore {
    db: sled::Db,
    logs_tree: sled::Tree,
    raw_tree: sled::Tree,
    samples_tree: sled::Tree,
    stats_tree: sled::Tree,
}

impl std::fmt::Debug for SledLogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledLogStore")
            .field("logs", &self.logs_tree.len())
            .field("samples", &self.samples_tree.len())
            .finish()
    }
}

fn encode<T: Serialize>(item: &T) -> StoreResult<Vec<u8>> {
    Ok(serde_json::to_vec(item)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

fn log_key(id: LogId) -> String {
    id.to_string()
}

fn prefix(id: LogId) -> String {
    format!("{}/", id)
}

fn sample_key(id: LogId, seq: u64) -> String {
    format!("{}/{:016x}", id, seq)
}

fn stats_key(id: LogId, spec: &WindowSpec) -> String {
    format!("{}/{}", id, spec.cache_key())
}

impl SledLogStore {
    /// Wrap an open database, creating the trees and sweeping tombstones.
    pub fn new(db: sled::Db) -> StoreResult<Self> {
        let store = Self {
            logs_tree: db.open_tree("logs")?,
            raw_tree: db.open_tree("raw_content")?,
            samples_tree: db.open_tree("samples")?,
            stats_tree: db.open_tree("stats")?,
            db,
        };
        store.sweep_tombstones()?;
        Ok(store)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::new(sled::open(path)?)
    }

    /// A throwaway store that lives in memory.
    pub fn temporary() -> StoreResult<Self> {
        Self::new(sled::Config::new().temporary(true).open()?)
    }

    /// Gets a reference to the underlying database
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }

    fn read_log(&self, id: LogId) -> StoreResult<Option<Log>> {
        match self.logs_tree.get(log_key(id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Live (present and not deleted) log, or the matching error.
    fn live_log(&self, id: LogId) -> StoreResult<Log> {
        match self.read_log(id)? {
            Some(log) if log.state == LogState::Deleted => Err(StoreError::Deleted(id)),
            Some(log) => Ok(log),
            None => Err(StoreError::NotFound(id)),
        }
    }

    fn is_live(&self, id: LogId) -> StoreResult<bool> {
        Ok(matches!(self.read_log(id)?, Some(log) if log.state != LogState::Deleted))
    }

    fn remove_prefix(tree: &sled::Tree, prefix: &str) -> StoreResult<usize> {
        let mut batch = sled::Batch::default();
        let mut removed = 0;
        for entry in tree.scan_prefix(prefix.as_bytes()).keys() {
            batch.remove(entry?);
            removed += 1;
        }
        tree.apply_batch(batch)?;
        Ok(removed)
    }

    fn purge(&self, id: LogId) -> StoreResult<()> {
        let prefix = prefix(id);
        let samples = Self::remove_prefix(&self.samples_tree, &prefix)?;
        let stats = Self::remove_prefix(&self.stats_tree, &prefix)?;
        self.raw_tree.remove(log_key(id))?;
        log_store_debug!(
            "Purged log {}: {} samples, {} stat entries",
            id,
            samples,
            stats
        );
        Ok(())
    }

    fn sweep_tombstones(&self) -> StoreResult<()> {
        for entry in self.logs_tree.iter().values() {
            let log: Log = decode(&entry?)?;
            if log.state == LogState::Deleted {
                self.purge(log.id)?;
            }
        }
        Ok(())
    }

    fn next_sequence(&self, id: LogId) -> StoreResult<u64> {
        let prefix = prefix(id);
        match self.samples_tree.scan_prefix(prefix.as_bytes()).keys().next_back() {
            Some(key) => {
                let key = key?;
                let text = std::str::from_utf8(&key[prefix.len()..])
                    .map_err(|e| StoreError::corrupt(format!("sample key: {}", e)))?;
                let seq = u64::from_str_radix(text, 16)
                    .map_err(|e| StoreError::corrupt(format!("sample key '{}': {}", text, e)))?;
                Ok(seq + 1)
            }
            None => Ok(0),
        }
    }
}

#[async_trait]
impl LogStore for SledLogStore {
    async fn put_log(&self, log: &Log) -> StoreResult<LogId> {
        let bytes = encode(log)?;
        let inserted = self
            .logs_tree
            .compare_and_swap(log_key(log.id), None as Option<&[u8]>, Some(bytes))?;
        if inserted.is_err() {
            return Err(StoreError::AlreadyExists(log.id));
        }
        Ok(log.id)
    }

    async fn update_log(&self, log: &Log) -> StoreResult<()> {
        let key = log_key(log.id);
        let bytes = encode(log)?;
        let id = log.id;
        let result: Result<(), sled::transaction::TransactionError<StoreError>> =
            self.logs_tree.transaction(|logs| {
                let current = logs
                    .get(key.as_bytes())?
                    .ok_or(ConflictableTransactionError::Abort(StoreError::NotFound(id)))?;
                let current: Log = serde_json::from_slice(&current)
                    .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;
                if current.state == LogState::Deleted {
                    return Err(ConflictableTransactionError::Abort(StoreError::Deleted(id)));
                }
                logs.insert(key.as_bytes(), bytes.as_slice())?;
                Ok(())
            });
        Ok(result?)
    }

    async fn get_log(&self, id: LogId) -> StoreResult<Option<Log>> {
        self.read_log(id)
    }

    async fn list_logs(&self, filter: Option<&LabelSelector>) -> StoreResult<Vec<Log>> {
        let mut logs = Vec::new();
        for entry in self.logs_tree.iter().values() {
            let log: Log = decode(&entry?)?;
            if log.state == LogState::Deleted {
                continue;
            }
            if filter.map_or(true, |selector| selector.matches(&log.labels)) {
                logs.push(log);
            }
        }
        logs.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then(a.id.cmp(&b.id)));
        Ok(logs)
    }

    async fn delete_log(&self, id: LogId) -> StoreResult<()> {
        let key = log_key(id);
        let result: Result<(), sled::transaction::TransactionError<StoreError>> =
            self.logs_tree.transaction(|logs| {
                let current = logs
                    .get(key.as_bytes())?
                    .ok_or(ConflictableTransactionError::Abort(StoreError::NotFound(id)))?;
                let mut log: Log = serde_json::from_slice(&current)
                    .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;
                if log.state == LogState::Deleted {
                    return Err(ConflictableTransactionError::Abort(StoreError::Deleted(id)));
                }
                log.state = LogState::Deleted;
                let bytes = serde_json::to_vec(&log)
                    .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;
                logs.insert(key.as_bytes(), bytes)?;
                Ok(())
            });
        result?;
        if let Err(e) = self.purge(id) {
            log_store_error!("Log {} is marked deleted but its purge failed: {}", id, e);
            return Err(e);
        }
        log_store_info!("Deleted log {}", id);
        Ok(())
    }

    async fn put_raw_content(&self, id: LogId, content: &[u8]) -> StoreResult<()> {
        self.live_log(id)?;
        self.raw_tree.insert(log_key(id), content)?;
        Ok(())
    }

    async fn get_raw_content(&self, id: LogId) -> StoreResult<Option<Vec<u8>>> {
        if !self.is_live(id)? {
            return Ok(None);
        }
        Ok(self.raw_tree.get(log_key(id))?.map(|bytes| bytes.to_vec()))
    }

    async fn put_samples(&self, id: LogId, samples: &[Sample]) -> StoreResult<()> {
        self.live_log(id)?;
        let first = self.next_sequence(id)?;
        let mut batch = sled::Batch::default();
        for (offset, sample) in samples.iter().enumerate() {
            batch.insert(sample_key(id, first + offset as u64).as_bytes(), encode(sample)?);
        }
        self.samples_tree.apply_batch(batch)?;
        log_store_debug!("Stored {} samples for log {}", samples.len(), id);
        Ok(())
    }

    async fn get_samples(&self, id: LogId) -> StoreResult<SampleStream> {
        if !self.is_live(id)? {
            return Ok(Box::new(std::iter::empty()));
        }
        let iter = self
            .samples_tree
            .scan_prefix(prefix(id).as_bytes())
            .values()
            .map(|entry| match entry {
                Ok(bytes) => decode(&bytes),
                Err(e) => Err(StoreError::from(e)),
            });
        Ok(Box::new(iter))
    }

    async fn put_stats(&self, id: LogId, spec: &WindowSpec, stats: &[Stat]) -> StoreResult<bool> {
        let log_key = log_key(id);
        let stats_key = stats_key(id, spec);
        let bytes = encode(&stats)?;
        let result: Result<bool, sled::transaction::TransactionError<StoreError>> =
            (&self.logs_tree, &self.stats_tree).transaction(|(logs, stats_tree)| {
                let log = logs
                    .get(log_key.as_bytes())?
                    .ok_or(ConflictableTransactionError::Abort(StoreError::NotFound(id)))?;
                let log: Log = serde_json::from_slice(&log)
                    .map_err(|e| ConflictableTransactionError::Abort(StoreError::from(e)))?;
                if log.state == LogState::Deleted {
                    return Err(ConflictableTransactionError::Abort(StoreError::Deleted(id)));
                }
                if stats_tree.get(stats_key.as_bytes())?.is_some() {
                    return Ok(false);
                }
                stats_tree.insert(stats_key.as_bytes(), bytes.as_slice())?;
                Ok(true)
            });
        let written = result?;
        log_store_debug!(
            "Stats {} for log {}: {}",
            spec,
            id,
            if written { "stored" } else { "already present" }
        );
        Ok(written)
    }

    async fn get_stats(&self, id: LogId, spec: &WindowSpec) -> StoreResult<Option<Vec<Stat>>> {
        if !self.is_live(id)? {
            return Ok(None);
        }
        match self.stats_tree.get(stats_key(id, spec))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn discard_derived(&self, id: LogId) -> StoreResult<()> {
        let prefix = prefix(id);
        Self::remove_prefix(&self.samples_tree, &prefix)?;
        Self::remove_prefix(&self.stats_tree, &prefix)?;
        log_store_debug!("Discarded derived data for log {}", id);
        Ok(())
    }
}
