//! Service entry point for ingestion and stats queries.

use super::config::IngestionConfig;
use super::error::{IngestionError, IngestionResult};
use super::pipeline::{CancelFlag, LogPipeline, PipelineOptions};
use super::request::{IngestRequest, IngestStatus, QueryRequest};
use crate::sample::{Log, LogId, LogState, Sample};
use crate::selector::LabelSelector;
use crate::stats::{distributions, Aggregator, Distribution, GroupBy, Stat, WindowSpec};
use crate::store::{LogStore, StoreError};
use crate::{log_ingestion_debug, log_ingestion_info, log_ingestion_warn};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;

/// Handles shared between the service and one running pipeline.
#[derive(Clone)]
struct Tracked {
    cancel: CancelFlag,
    state: Arc<watch::Sender<LogState>>,
    /// Held by the pipeline for its whole run; at most one writer per log
    lock: Arc<Mutex<()>>,
}

/// Runs ingestions against a [`LogStore`] and answers stats queries.
///
/// Cloning is cheap; clones share the store, the concurrency limit and the
/// set of in-flight ingestions.
#[derive(Clone)]
pub struct IngestionService {
    store: Arc<dyn LogStore>,
    config: IngestionConfig,
    permits: Arc<Semaphore>,
    tracked: Arc<RwLock<HashMap<LogId, Tracked>>>,
}

impl IngestionService {
    pub fn new(store: Arc<dyn LogStore>, config: IngestionConfig) -> IngestionResult<Self> {
        config.validate()?;
        let permits = Arc::new(Semaphore::new(config.max_concurrent_ingestions));
        Ok(Self {
            store,
            config,
            permits,
            tracked: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn LogStore> {
        &self.store
    }

    /// Store the upload and start its pipeline in the background.
    ///
    /// Returns as soon as the log is recorded as `RECEIVED`; use
    /// [`wait`](Self::wait) or [`subscribe`](Self::subscribe) to follow it.
    pub async fn ingest(&self, request: IngestRequest) -> IngestionResult<LogId> {
        let (pipeline, tracked) = self.prepare(request).await?;
        let id = pipeline.log_id();
        drop(self.spawn_pipeline(pipeline, tracked));
        Ok(id)
    }

    /// Ingest and return the final status.
    ///
    /// Parse and store failures are returned as errors; the log record still
    /// ends up in its failure state. The pipeline runs on its own task, so
    /// dropping this future does not stop it.
    pub async fn ingest_and_wait(&self, request: IngestRequest) -> IngestionResult<IngestStatus> {
        let (pipeline, tracked) = self.prepare(request).await?;
        let log = self.spawn_pipeline(pipeline, tracked).await??;
        Ok(IngestStatus::from(&log))
    }

    /// Run a pipeline on its own task under a permit and the log's lock,
    /// untracking the log once it is terminal.
    fn spawn_pipeline(
        &self,
        pipeline: LogPipeline,
        tracked: Tracked,
    ) -> JoinHandle<IngestionResult<Log>> {
        let id = pipeline.log_id();
        let permits = Arc::clone(&self.permits);
        let registry = Arc::clone(&self.tracked);

        tokio::spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => {
                    let _guard = tracked.lock.lock_owned().await;
                    pipeline.run().await
                }
                Err(e) => {
                    log_ingestion_warn!("Log {}: ingestion pool closed", id);
                    Err(IngestionError::Worker(e.to_string()))
                }
            };
            if let Err(e) = &result {
                log_ingestion_debug!("Log {}: ingestion ended with: {}", id, e);
            }
            registry.write().await.remove(&id);
            result
        })
    }

    async fn prepare(&self, request: IngestRequest) -> IngestionResult<(LogPipeline, Tracked)> {
        let mut parser = request
            .parser
            .unwrap_or_else(|| self.config.parser.clone());
        if let Some(format) = request.format {
            parser = parser.with_format(format);
        }
        parser.validate()?;

        let log = Log::received(request.name, &request.content, request.labels);
        let id = self.store.put_log(&log).await?;
        self.store.put_raw_content(id, &request.content).await?;
        log_ingestion_info!(
            "Received log {} ('{}', {} bytes)",
            id,
            log.name,
            log.content_len
        );

        let (state, _) = watch::channel(LogState::Received);
        let tracked = Tracked {
            cancel: CancelFlag::new(),
            state: Arc::new(state),
            lock: Arc::new(Mutex::new(())),
        };
        self.tracked.write().await.insert(id, tracked.clone());

        let options = PipelineOptions {
            parser,
            parse_timeout: request
                .parse_timeout
                .unwrap_or_else(|| self.config.parse_timeout()),
            eager_specs: self.config.eager_specs(),
        };
        let pipeline = LogPipeline::new(
            Arc::clone(&self.store),
            log,
            request.content.into(),
            options,
            tracked.cancel.clone(),
            Arc::clone(&tracked.state),
        );
        Ok((pipeline, tracked))
    }

    async fn load(&self, id: LogId) -> IngestionResult<Log> {
        match self.store.get_log(id).await? {
            Some(log) if log.state != LogState::Deleted => Ok(log),
            _ => Err(IngestionError::NotFound(id)),
        }
    }

    pub async fn get_status(&self, id: LogId) -> IngestionResult<IngestStatus> {
        let log = self.load(id).await?;
        Ok(IngestStatus::from(&log))
    }

    /// State changes of an ingestion.
    ///
    /// For a log that is no longer in flight the receiver holds its stored
    /// state and never changes.
    pub async fn subscribe(&self, id: LogId) -> IngestionResult<watch::Receiver<LogState>> {
        if let Some(tracked) = self.tracked.read().await.get(&id) {
            return Ok(tracked.state.subscribe());
        }
        let log = self.load(id).await?;
        let (sender, receiver) = watch::channel(log.state);
        drop(sender);
        Ok(receiver)
    }

    /// Resolve once the log reaches a terminal state.
    pub async fn wait(&self, id: LogId) -> IngestionResult<IngestStatus> {
        let mut receiver = self.subscribe(id).await?;
        loop {
            if receiver.borrow_and_update().is_terminal() {
                break;
            }
            if receiver.changed().await.is_err() {
                break;
            }
        }
        self.get_status(id).await
    }

    /// Request cancellation. Returns `false` if the log is not in flight.
    pub async fn cancel(&self, id: LogId) -> bool {
        match self.tracked.read().await.get(&id) {
            Some(tracked) => {
                tracked.cancel.cancel();
                log_ingestion_info!("Cancellation requested for log {}", id);
                true
            }
            None => false,
        }
    }

    /// Delete a log in a terminal state with everything derived from it.
    pub async fn delete(&self, id: LogId) -> IngestionResult<()> {
        let tracked = self.tracked.read().await.get(&id).cloned();
        let _guard = match &tracked {
            Some(tracked) => match tracked.lock.try_lock() {
                Ok(guard) => Some(guard),
                Err(_) => {
                    let state = *tracked.state.borrow();
                    if !state.is_terminal() {
                        return Err(IngestionError::invalid_state(id, state, "delete"));
                    }
                    // Terminal, but its task has not let go of the lock yet.
                    Some(tracked.lock.lock().await)
                }
            },
            None => None,
        };

        let log = self.load(id).await?;
        if !log.state.can_transition_to(LogState::Deleted) {
            return Err(IngestionError::invalid_state(id, log.state, "delete"));
        }

        match self.store.delete_log(id).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) | Err(StoreError::Deleted(_)) => {
                return Err(IngestionError::NotFound(id))
            }
            Err(e) => return Err(e.into()),
        }
        if let Some(tracked) = &tracked {
            tracked.state.send_replace(LogState::Deleted);
        }
        log_ingestion_info!("Deleted log {} ('{}')", id, log.name);
        Ok(())
    }

    /// Logs matching a label selector, oldest first. `None` lists all.
    pub async fn list_logs(&self, selector: Option<&str>) -> IngestionResult<Vec<IngestStatus>> {
        let selector = selector.map(LabelSelector::parse).transpose()?;
        let logs = self.store.list_logs(selector.as_ref()).await?;
        Ok(logs.iter().map(IngestStatus::from).collect())
    }

    /// Windowed stats for every ready log matching `selector`.
    pub async fn query(
        &self,
        selector: &str,
        window_ms: u64,
        group_by: Option<GroupBy>,
    ) -> IngestionResult<Vec<Stat>> {
        let request = QueryRequest::new(selector, window_ms).group_by(group_by.unwrap_or_default());
        self.query_with(request).await
    }

    /// Like [`query`](Self::query), with sample filtering.
    ///
    /// Stats come from the cache when present; otherwise they are computed
    /// from stored samples and persisted for the next caller. Filtered
    /// queries are always computed and never cached. Logs are read
    /// concurrently; results keep the oldest-first listing order.
    pub async fn query_with(&self, request: QueryRequest) -> IngestionResult<Vec<Stat>> {
        let selector = LabelSelector::parse(&request.selector)?;
        let sample_filter = request
            .sample_selector
            .as_deref()
            .map(LabelSelector::parse)
            .transpose()?;
        let spec = WindowSpec::new(request.window_ms, request.group_by)?;

        let logs = self.store.list_logs(Some(&selector)).await?;
        let ready: Vec<&Log> = logs.iter().filter(|log| log.state.is_queryable()).collect();
        let outcomes = join_all(
            ready
                .iter()
                .map(|log| self.stats_for(log, &spec, sample_filter.as_ref())),
        )
        .await;

        let mut results = Vec::new();
        for (log, outcome) in ready.iter().zip(outcomes) {
            match outcome {
                Ok(stats) => results.extend(stats),
                // Deleted between listing and reading.
                Err(IngestionError::Store(StoreError::Deleted(_)))
                | Err(IngestionError::Store(StoreError::NotFound(_))) => {
                    log_ingestion_debug!("Log {} disappeared during query", log.id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }

    async fn stats_for(
        &self,
        log: &Log,
        spec: &WindowSpec,
        sample_filter: Option<&LabelSelector>,
    ) -> IngestionResult<Vec<Stat>> {
        if sample_filter.is_none() {
            if let Some(stats) = self.store.get_stats(log.id, spec).await? {
                return Ok(stats);
            }
        }

        let id = log.id;
        let aggregator = Aggregator::new(*spec, log.start_ms.unwrap_or(0))?;
        let stats = self
            .with_samples(id, sample_filter.cloned(), move |samples| {
                Ok(aggregator.aggregate(id, &samples)?)
            })
            .await?;

        if sample_filter.is_none() {
            self.store.put_stats(id, spec, &stats).await?;
        }
        Ok(stats)
    }

    /// Read a log's samples and hand them to `work` on the blocking pool.
    ///
    /// Draining the sample stream and aggregating are both CPU and disk
    /// bound, so neither runs on the async executor.
    async fn with_samples<T, F>(
        &self,
        id: LogId,
        filter: Option<LabelSelector>,
        work: F,
    ) -> IngestionResult<T>
    where
        T: Send + 'static,
        F: FnOnce(Vec<Sample>) -> IngestionResult<T> + Send + 'static,
    {
        let stream = self.store.get_samples(id).await?;
        tokio::task::spawn_blocking(move || {
            let mut samples = Vec::new();
            for sample in stream {
                let sample = sample?;
                if filter.as_ref().map_or(true, |selector| selector.matches(&sample)) {
                    samples.push(sample);
                }
            }
            work(samples)
        })
        .await?
    }

    /// One stat per group over the whole of a ready log.
    pub async fn summary(&self, id: LogId, group_by: GroupBy) -> IngestionResult<Vec<Stat>> {
        let log = self.load_ready(id, "summarize").await?;
        let spec = WindowSpec::new(self.config.default_window_ms, group_by)?;
        let aggregator = Aggregator::new(spec, log.start_ms.unwrap_or(0))?;
        self.with_samples(id, None, move |samples| Ok(aggregator.summarize(id, &samples)))
            .await
    }

    /// Latency histogram and percentile curve per group of a ready log.
    pub async fn distribution(
        &self,
        id: LogId,
        group_by: GroupBy,
    ) -> IngestionResult<Vec<Distribution>> {
        self.load_ready(id, "describe").await?;
        self.with_samples(id, None, move |samples| {
            Ok(distributions(id, group_by, &samples)?)
        })
        .await
    }

    async fn load_ready(&self, id: LogId, action: &str) -> IngestionResult<Log> {
        let log = self.load(id).await?;
        if !log.state.is_queryable() {
            return Err(IngestionError::invalid_state(id, log.state, action));
        }
        Ok(log)
    }

    /// Close out logs left mid-pipeline by a previous process.
    ///
    /// Derived data is discarded; logs that had not finished parsing become
    /// `PARSE_FAILED`, the rest `FAILED`. Returns the ids touched.
    pub async fn recover_interrupted(&self) -> IngestionResult<Vec<LogId>> {
        let tracked = self.tracked.read().await;
        let mut recovered = Vec::new();

        for mut log in self.store.list_logs(None).await? {
            if log.state.is_terminal() || tracked.contains_key(&log.id) {
                continue;
            }
            let next = match log.state {
                LogState::Received | LogState::Parsing => LogState::ParseFailed,
                _ => LogState::Failed,
            };
            self.store.discard_derived(log.id).await?;
            log_ingestion_warn!("Log {} interrupted in state {}, marking {}", log.id, log.state, next);
            log.state = next;
            log.failure = Some("interrupted".to_string());
            self.store.update_log(&log).await?;
            recovered.push(log.id);
        }
        Ok(recovered)
    }
}
