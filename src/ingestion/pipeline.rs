//! The per-log pipeline: parse, aggregate, commit.
//!
//! ```text
//! RECEIVED -> PARSING -> PARSED -> AGGREGATING -> READY
//!                 \-> PARSE_FAILED        \-> FAILED (rolled back)
//! ```
//!
//! Parsing runs on the blocking pool under a timeout. Samples and eager
//! stats are only written once aggregation has succeeded, and the log only
//! becomes queryable when it reaches `READY`; any failure after parsing
//! discards what was written.

use super::error::{IngestionError, IngestionResult};
use crate::logging::{LogFeature, PerformanceTimer};
use crate::parser::{ParseReport, ParserConfig, SampleParser};
use crate::sample::{Log, LogId, LogState, Sample};
use crate::stats::{Aggregator, Stat, WindowSpec};
use crate::store::LogStore;
use crate::{log_ingestion_debug, log_ingestion_error, log_ingestion_info, log_ingestion_warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Rows read between two checks of the cancel flag.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Shared cancellation signal for one ingestion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run settings resolved from the service config and the request.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub parser: ParserConfig,
    pub parse_timeout: Duration,
    /// Stats computed and persisted before the log becomes ready
    pub eager_specs: Vec<WindowSpec>,
}

pub struct LogPipeline {
    store: Arc<dyn LogStore>,
    log: Log,
    content: Arc<[u8]>,
    options: PipelineOptions,
    cancel: CancelFlag,
    notifier: Arc<watch::Sender<LogState>>,
}

impl LogPipeline {
    pub fn new(
        store: Arc<dyn LogStore>,
        log: Log,
        content: Arc<[u8]>,
        options: PipelineOptions,
        cancel: CancelFlag,
        notifier: Arc<watch::Sender<LogState>>,
    ) -> Self {
        Self {
            store,
            log,
            content,
            options,
            cancel,
            notifier,
        }
    }

    pub fn log_id(&self) -> LogId {
        self.log.id
    }

    /// Drive the log to a terminal state.
    ///
    /// Returns the final record on success. On failure the log is left in
    /// `ParseFailed` or `Failed` with the reason recorded, and the error is
    /// returned as well.
    pub async fn run(mut self) -> IngestionResult<Log> {
        let timer = PerformanceTimer::new(LogFeature::Ingestion, format!("ingest log {}", self.log.id));

        let samples = match self.parse_phase().await {
            Ok(samples) => samples,
            Err(error) => return Err(self.abort(LogState::ParseFailed, error).await),
        };

        if let Err(error) = self.commit_phase(samples).await {
            self.rollback().await;
            return Err(self.abort(LogState::Failed, error).await);
        }

        timer.finish();
        Ok(self.log)
    }

    async fn parse_phase(&mut self) -> IngestionResult<Vec<Sample>> {
        // Cancelled while queued for a permit.
        self.check_cancelled()?;
        self.transition(LogState::Parsing).await?;

        let content = Arc::clone(&self.content);
        let config = self.options.parser.clone();
        let cancel = self.cancel.clone();
        let worker = tokio::task::spawn_blocking(move || read_samples(content, config, cancel));

        let (samples, report) = match tokio::time::timeout(self.options.parse_timeout, worker).await {
            Ok(joined) => joined??,
            Err(_) => {
                // Stops the worker at its next check.
                self.cancel.cancel();
                return Err(IngestionError::Timeout(self.options.parse_timeout));
            }
        };

        self.record_report(&report);
        report.check_error_ratio(self.options.parser.max_error_ratio)?;
        self.transition(LogState::Parsed).await?;
        Ok(samples)
    }

    async fn commit_phase(&mut self, samples: Vec<Sample>) -> IngestionResult<()> {
        self.check_cancelled()?;
        self.transition(LogState::Aggregating).await?;

        let id = self.log.id;
        let origin = self.log.start_ms.unwrap_or(0);
        let specs = self.options.eager_specs.clone();
        let (samples, computed) = tokio::task::spawn_blocking(move || {
            compute_stats(id, origin, &specs, &samples).map(|computed| (samples, computed))
        })
        .await??;

        self.check_cancelled()?;
        self.store.put_samples(id, &samples).await?;
        for (spec, stats) in &computed {
            self.store.put_stats(id, spec, stats).await?;
        }

        self.check_cancelled()?;
        self.transition(LogState::Ready).await
    }

    fn check_cancelled(&self) -> IngestionResult<()> {
        if self.cancel.is_cancelled() {
            Err(IngestionError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn record_report(&mut self, report: &ParseReport) {
        self.log.format = Some(report.format);
        self.log.start_ms = report.min_timestamp_ms;
        self.log.sample_count = report.rows_parsed;
        self.log.row_error_count = report.rows_failed;
        self.log.row_errors = report.row_errors.clone();

        if report.clamped_rows > 0 {
            log_ingestion_warn!(
                "Log {}: {} rows had out-of-range numbers clamped",
                self.log.id,
                report.clamped_rows
            );
        }
        log_ingestion_debug!(
            "Log {}: parsed {} rows as {} ({} failed)",
            self.log.id,
            report.total_rows(),
            report.format,
            report.rows_failed
        );
    }

    async fn transition(&mut self, next: LogState) -> IngestionResult<()> {
        let current = self.log.state;
        if !current.can_transition_to(next) {
            return Err(IngestionError::invalid_state(
                self.log.id,
                current,
                format!("move to {}", next),
            ));
        }

        self.log.state = next;
        if let Err(e) = self.store.update_log(&self.log).await {
            self.log.state = current;
            return Err(e.into());
        }
        self.notifier.send_replace(next);
        log_ingestion_info!("Log {} ('{}'): {} -> {}", self.log.id, self.log.name, current, next);
        Ok(())
    }

    /// Record `error` and move to the failure state.
    async fn abort(&mut self, state: LogState, error: IngestionError) -> IngestionError {
        log_ingestion_warn!("Log {} failed: {}", self.log.id, error);
        self.log.failure = Some(error.to_string());
        if let Err(e) = self.transition(state).await {
            log_ingestion_error!(
                "Log {}: could not record failure state {}: {}",
                self.log.id,
                state,
                e
            );
        }
        error
    }

    async fn rollback(&self) {
        if let Err(e) = self.store.discard_derived(self.log.id).await {
            log_ingestion_error!("Log {}: rollback failed: {}", self.log.id, e);
        }
    }
}

/// Blocking part of parsing: drain the reader, checking for cancellation.
fn read_samples(
    content: Arc<[u8]>,
    config: ParserConfig,
    cancel: CancelFlag,
) -> IngestionResult<(Vec<Sample>, ParseReport)> {
    let parser = SampleParser::new(content, config);
    let mut reader = parser.open()?;
    let mut samples = Vec::new();
    let mut rows = 0u64;

    for row in reader.by_ref() {
        rows += 1;
        if rows % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(IngestionError::Cancelled);
        }
        if let Ok(sample) = row {
            samples.push(sample);
        }
    }
    if cancel.is_cancelled() {
        return Err(IngestionError::Cancelled);
    }

    Ok((samples, reader.into_report()?))
}

fn compute_stats(
    id: LogId,
    origin: i64,
    specs: &[WindowSpec],
    samples: &[Sample],
) -> IngestionResult<Vec<(WindowSpec, Vec<Stat>)>> {
    specs
        .iter()
        .map(|spec| {
            let stats = Aggregator::new(*spec, origin)?.aggregate(id, samples)?;
            Ok((*spec, stats))
        })
        .collect()
}
