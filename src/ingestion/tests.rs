//! Tests for ingestion functionality

use super::*;
use crate::parser::{FormatError, ParserConfig};
use crate::sample::{Labels, Log, LogId, LogState, Sample};
use crate::selector::LabelSelector;
use crate::stats::{GroupBy, Stat, WindowSpec};
use crate::store::{LogStore, SampleStream, SledLogStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::sync::{mpsc, Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};

const LOGIN_RUN: &str =
    "ts,label,elapsed,status\n0,login,120,OK\n1,login,badnum,OK\n2,login,95,FAIL\n";

fn create_test_service() -> IngestionService {
    let store = SledLogStore::temporary().unwrap();
    IngestionService::new(Arc::new(store), IngestionConfig::default()).unwrap()
}

fn large_content(rows: usize) -> Vec<u8> {
    let mut content = String::from("ts,label,elapsed,status\n");
    for i in 0..rows {
        content.push_str(&format!("{},page-{},{},OK\n", i, i % 7, i % 500));
    }
    content.into_bytes()
}

async fn stored_samples(service: &IngestionService, id: LogId) -> Vec<Sample> {
    service
        .store()
        .get_samples(id)
        .await
        .unwrap()
        .collect::<StoreResult<Vec<_>>>()
        .unwrap()
}

#[tokio::test]
async fn test_bad_row_skipped_and_log_becomes_ready() {
    let service = create_test_service();
    let status = service
        .ingest_and_wait(IngestRequest::new("login-run", LOGIN_RUN))
        .await
        .unwrap();

    assert_eq!(status.state, LogState::Ready);
    assert_eq!(status.sample_count, 2);
    assert_eq!(status.row_error_count, 1);
    assert_eq!(status.row_errors[0].line, 2);
    assert!(status.failure.is_none());

    let samples = stored_samples(&service, status.id).await;
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].elapsed_ms, 120);
    assert!(samples[0].success);
    assert_eq!(samples[1].elapsed_ms, 95);
    assert!(!samples[1].success);
}

#[tokio::test]
async fn test_eager_stats_are_persisted() {
    let service = create_test_service();
    let status = service
        .ingest_and_wait(IngestRequest::new("login-run", LOGIN_RUN))
        .await
        .unwrap();

    for spec in service.config().eager_specs() {
        let stats = service.store().get_stats(status.id, &spec).await.unwrap();
        assert!(stats.is_some(), "missing eager stats for {}", spec);
    }
}

#[tokio::test]
async fn test_error_threshold_fails_parse_and_keeps_row_errors() {
    let service = create_test_service();
    let content = "ts,label,elapsed\n0,a,x\n1,a,y\n2,a,10\n";
    let result = service
        .ingest_and_wait(IngestRequest::new("broken", content))
        .await;
    assert!(matches!(
        result,
        Err(IngestionError::Format(FormatError::ErrorThresholdExceeded { failed: 2, total: 3, .. }))
    ));

    let logs = service.list_logs(None).await.unwrap();
    assert_eq!(logs.len(), 1);
    let status = &logs[0];
    assert_eq!(status.state, LogState::ParseFailed);
    assert_eq!(status.row_errors.len(), 2);
    assert_eq!(status.row_errors[0].line, 1);
    assert_eq!(status.row_errors[1].line, 2);
    assert!(status.failure.is_some());
    assert!(stored_samples(&service, status.id).await.is_empty());
}

#[tokio::test]
async fn test_missing_column_fails_parse() {
    let service = create_test_service();
    let result = service
        .ingest_and_wait(IngestRequest::new("no-elapsed", "ts,label\n0,a\n"))
        .await;
    assert!(matches!(
        result,
        Err(IngestionError::Format(FormatError::MissingColumn(_)))
    ));
}

#[tokio::test]
async fn test_parse_timeout_marks_parse_failed() {
    let service = create_test_service();
    let request = IngestRequest::new("huge", large_content(200_000))
        .with_parse_timeout(Duration::from_millis(1));
    let result = service.ingest_and_wait(request).await;
    assert!(matches!(result, Err(IngestionError::Timeout(_))));

    let logs = service.list_logs(None).await.unwrap();
    assert_eq!(logs[0].state, LogState::ParseFailed);
    assert!(logs[0].failure.as_deref().unwrap_or("").contains("timed out"));
}

#[tokio::test]
async fn test_cancel_leaves_nothing_visible() {
    let service = create_test_service();
    let id = service
        .ingest(IngestRequest::new("huge", large_content(200_000)))
        .await
        .unwrap();
    assert!(service.cancel(id).await);

    let status = service.wait(id).await.unwrap();
    assert!(matches!(status.state, LogState::ParseFailed | LogState::Failed));
    assert!(status.failure.unwrap().contains("cancelled"));
    assert!(stored_samples(&service, id).await.is_empty());
}

#[tokio::test]
async fn test_cancel_unknown_log() {
    let service = create_test_service();
    assert!(!service.cancel(LogId::new()).await);
}

#[tokio::test]
async fn test_background_ingest_and_wait() {
    let service = create_test_service();
    let id = service
        .ingest(IngestRequest::new("login-run", LOGIN_RUN))
        .await
        .unwrap();
    let status = service.wait(id).await.unwrap();
    assert_eq!(status.state, LogState::Ready);

    // Waiting on a finished log resolves immediately.
    let again = service.wait(id).await.unwrap();
    assert_eq!(again, status);
}

#[tokio::test]
async fn test_subscribe_sees_terminal_state() {
    let service = create_test_service();
    let id = service
        .ingest(IngestRequest::new("login-run", LOGIN_RUN))
        .await
        .unwrap();
    let mut receiver = service.subscribe(id).await.unwrap();
    while !receiver.borrow_and_update().is_terminal() {
        if receiver.changed().await.is_err() {
            break;
        }
    }
    assert_eq!(service.get_status(id).await.unwrap().state, LogState::Ready);
}

#[tokio::test]
async fn test_delete_removes_log_and_derived_data() {
    let service = create_test_service();
    let status = service
        .ingest_and_wait(IngestRequest::new("login-run", LOGIN_RUN))
        .await
        .unwrap();
    let id = status.id;
    let spec = service.config().eager_specs()[0];

    service.delete(id).await.unwrap();

    assert!(matches!(
        service.get_status(id).await,
        Err(IngestionError::NotFound(_))
    ));
    assert!(stored_samples(&service, id).await.is_empty());
    assert!(service.store().get_stats(id, &spec).await.unwrap().is_none());
    assert!(service.store().get_raw_content(id).await.unwrap().is_none());
    assert!(service.list_logs(None).await.unwrap().is_empty());
    assert!(matches!(
        service.delete(id).await,
        Err(IngestionError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_query_by_label_selector_and_window() {
    let service = create_test_service();
    let content = "ts,label,elapsed,status\n0,login,100,OK\n500,login,200,OK\n1200,search,50,FAIL\n";
    let prod = service
        .ingest_and_wait(IngestRequest::new("prod-run", content).with_label("env", "prod"))
        .await
        .unwrap();
    service
        .ingest_and_wait(IngestRequest::new("dev-run", content).with_label("env", "dev"))
        .await
        .unwrap();

    let stats = service.query("env = prod", 1000, None).await.unwrap();
    assert_eq!(stats.len(), 2);
    assert!(stats.iter().all(|s| s.log_id == prod.id));
    assert_eq!(stats[0].window_start_ms, 0);
    assert_eq!(stats[0].count, 2);
    assert_eq!(stats[0].error_count, 0);
    assert_eq!(stats[1].window_start_ms, 1000);
    assert_eq!(stats[1].count, 1);
    assert_eq!(stats[1].error_count, 1);

    let both = service.query("env in (prod, dev)", 1000, None).await.unwrap();
    assert_eq!(both.len(), 4);

    let grouped = service
        .query("env = prod", 1000, Some(GroupBy::Label))
        .await
        .unwrap();
    // Two windows, two labels each.
    assert_eq!(grouped.len(), 4);
    assert_eq!(grouped[0].group.as_deref(), Some("login"));
    assert_eq!(grouped[1].group.as_deref(), Some("search"));
    assert_eq!(grouped[1].count, 0);
}

#[tokio::test]
async fn test_query_rejects_bad_input() {
    let service = create_test_service();
    assert!(matches!(
        service.query("env in (prod", 1000, None).await,
        Err(IngestionError::Selector(_))
    ));
    assert!(matches!(
        service.query("env = prod", 0, None).await,
        Err(IngestionError::Stats(_))
    ));
}

#[tokio::test]
async fn test_lazy_stats_are_cached() {
    let service = create_test_service();
    let status = service
        .ingest_and_wait(IngestRequest::new("login-run", LOGIN_RUN).with_label("env", "prod"))
        .await
        .unwrap();
    let spec = WindowSpec::new(1, GroupBy::ResponseCode).unwrap();
    assert!(service.store().get_stats(status.id, &spec).await.unwrap().is_none());

    let first = service
        .query("env exists", 1, Some(GroupBy::ResponseCode))
        .await
        .unwrap();
    let cached = service.store().get_stats(status.id, &spec).await.unwrap();
    assert_eq!(cached.as_ref(), Some(&first));

    let second = service
        .query("env exists", 1, Some(GroupBy::ResponseCode))
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_query_with_sample_filter() {
    let service = create_test_service();
    let content = "ts,label,elapsed,status\n0,login,100,OK\n10,search,200,OK\n20,login,300,FAIL\n";
    service
        .ingest_and_wait(IngestRequest::new("run", content).with_label("env", "prod"))
        .await
        .unwrap();

    let request = QueryRequest::new("env = prod", 60_000).filter_samples("label = login");
    let stats = service.query_with(request).await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].count, 2);
    assert_eq!(stats[0].error_count, 1);

    let request = QueryRequest::new("env = prod", 60_000).filter_samples("success = true");
    let stats = service.query_with(request).await.unwrap();
    assert_eq!(stats[0].count, 2);
    assert_eq!(stats[0].max_ms, Some(200));

    // The unfiltered eager entry is untouched.
    let stats = service.query("env = prod", 60_000, None).await.unwrap();
    assert_eq!(stats[0].count, 3);
}

#[tokio::test]
async fn test_empty_selector_matches_nothing() {
    let service = create_test_service();
    service
        .ingest_and_wait(IngestRequest::new("run", LOGIN_RUN).with_label("env", "prod"))
        .await
        .unwrap();
    assert!(service.query("", 60_000, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_summary_spans_whole_log() {
    let service = create_test_service();
    let status = service
        .ingest_and_wait(IngestRequest::new("login-run", LOGIN_RUN))
        .await
        .unwrap();
    let summary = service.summary(status.id, GroupBy::None).await.unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].count, 2);
    assert_eq!(summary[0].error_count, 1);
    assert_eq!(summary[0].min_ms, Some(95));
    assert_eq!(summary[0].max_ms, Some(120));
}

#[tokio::test]
async fn test_summary_requires_ready_log() {
    let service = create_test_service();
    let _ = service
        .ingest_and_wait(IngestRequest::new("broken", "ts,label,elapsed\n0,a,x\n"))
        .await;
    let id = service.list_logs(None).await.unwrap()[0].id;
    assert!(matches!(
        service.summary(id, GroupBy::None).await,
        Err(IngestionError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_distribution_per_label() {
    let service = create_test_service();
    let id = service
        .ingest_and_wait(IngestRequest::new("pages", large_content(700)))
        .await
        .unwrap()
        .id;

    let whole = service.distribution(id, GroupBy::None).await.unwrap();
    assert_eq!(whole.len(), 1);
    assert_eq!(whole[0].count, 700);
    assert_eq!(whole[0].histogram_total(), 700);
    let last = whole[0].percentiles.last().unwrap();
    assert_eq!(last.percentile, 100.0);
    assert_eq!(last.value_ms, 499);

    let by_label = service.distribution(id, GroupBy::Label).await.unwrap();
    assert_eq!(by_label.len(), 7);
    assert_eq!(by_label[0].group.as_deref(), Some("page-0"));
    assert_eq!(by_label.iter().map(|d| d.count).sum::<u64>(), 700);

    assert!(matches!(
        service.distribution(LogId::new(), GroupBy::None).await,
        Err(IngestionError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_list_logs_by_selector() {
    let service = create_test_service();
    for env in ["prod", "dev", "prod"] {
        service
            .ingest_and_wait(IngestRequest::new(format!("{}-run", env), LOGIN_RUN).with_label("env", env))
            .await
            .unwrap();
    }
    assert_eq!(service.list_logs(Some("env = prod")).await.unwrap().len(), 2);
    assert_eq!(service.list_logs(Some("env != prod")).await.unwrap().len(), 1);
    assert_eq!(service.list_logs(None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_request_parser_options_override_defaults() {
    let service = create_test_service();
    let parser = ParserConfig::default().with_delimiter(';');
    let request = IngestRequest::new("semicolons", "ts;label;elapsed\n0;a;10\n5;b;20\n")
        .with_parser_config(parser);
    let status = service.ingest_and_wait(request).await.unwrap();
    assert_eq!(status.sample_count, 2);
}

#[tokio::test]
async fn test_recover_interrupted_logs() {
    let store = Arc::new(SledLogStore::temporary().unwrap());

    let mut parsing = Log::received("parsing", b"", Labels::new());
    parsing.state = LogState::Parsing;
    store.put_log(&parsing).await.unwrap();

    let mut aggregating = Log::received("aggregating", b"", Labels::new());
    aggregating.state = LogState::Aggregating;
    store.put_log(&aggregating).await.unwrap();
    store
        .put_samples(aggregating.id, &[Sample::new(0, "a", 1, true)])
        .await
        .unwrap();

    let service = IngestionService::new(store.clone(), IngestionConfig::default()).unwrap();
    let mut recovered = service.recover_interrupted().await.unwrap();
    recovered.sort();
    let mut expected = vec![parsing.id, aggregating.id];
    expected.sort();
    assert_eq!(recovered, expected);

    let status = service.get_status(parsing.id).await.unwrap();
    assert_eq!(status.state, LogState::ParseFailed);
    assert_eq!(status.failure.as_deref(), Some("interrupted"));
    assert_eq!(
        service.get_status(aggregating.id).await.unwrap().state,
        LogState::Failed
    );
    assert!(stored_samples(&service, aggregating.id).await.is_empty());
}

/// Delegates to sled, recording every state written. Can refuse stats or
/// hold sample writes until the test releases them.
#[derive(Debug)]
struct InstrumentedStore {
    inner: SledLogStore,
    reject_stats: bool,
    /// Sample writes wait for a permit when set
    sample_gate: Option<Arc<Semaphore>>,
    /// Taken by the next sample read
    sample_hold: StdMutex<Option<SampleHold>>,
    states: StdMutex<Vec<LogState>>,
}

/// Makes the first read of a sample stream announce itself, then block
/// until released.
#[derive(Debug)]
struct SampleHold {
    started: oneshot::Sender<()>,
    release: mpsc::Receiver<()>,
}

struct HeldStream {
    hold: Option<SampleHold>,
    inner: SampleStream,
}

impl Iterator for HeldStream {
    type Item = StoreResult<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(hold) = self.hold.take() {
            let _ = hold.started.send(());
            if hold.release.recv_timeout(Duration::from_secs(5)).is_err() {
                return Some(Err(StoreError::corrupt("sample read never released")));
            }
        }
        self.inner.next()
    }
}

impl InstrumentedStore {
    fn new() -> Self {
        Self {
            inner: SledLogStore::temporary().unwrap(),
            reject_stats: false,
            sample_gate: None,
            sample_hold: StdMutex::new(None),
            states: StdMutex::new(Vec::new()),
        }
    }

    fn states(&self) -> Vec<LogState> {
        self.states.lock().unwrap().clone()
    }

    fn record(&self, state: LogState) {
        self.states.lock().unwrap().push(state);
    }
}

#[async_trait]
impl LogStore for InstrumentedStore {
    async fn put_log(&self, log: &Log) -> StoreResult<LogId> {
        let id = self.inner.put_log(log).await?;
        self.record(log.state);
        Ok(id)
    }

    async fn update_log(&self, log: &Log) -> StoreResult<()> {
        self.inner.update_log(log).await?;
        self.record(log.state);
        Ok(())
    }

    async fn get_log(&self, id: LogId) -> StoreResult<Option<Log>> {
        self.inner.get_log(id).await
    }

    async fn list_logs(&self, filter: Option<&LabelSelector>) -> StoreResult<Vec<Log>> {
        self.inner.list_logs(filter).await
    }

    async fn delete_log(&self, id: LogId) -> StoreResult<()> {
        self.inner.delete_log(id).await
    }

    async fn put_raw_content(&self, id: LogId, content: &[u8]) -> StoreResult<()> {
        self.inner.put_raw_content(id, content).await
    }

    async fn get_raw_content(&self, id: LogId) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get_raw_content(id).await
    }

    async fn put_samples(&self, id: LogId, samples: &[Sample]) -> StoreResult<()> {
        if let Some(gate) = &self.sample_gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|_| StoreError::corrupt("sample gate closed"))?;
        }
        self.inner.put_samples(id, samples).await
    }

    async fn get_samples(&self, id: LogId) -> StoreResult<SampleStream> {
        let inner = self.inner.get_samples(id).await?;
        let hold = self.sample_hold.lock().unwrap().take();
        match hold {
            Some(hold) => Ok(Box::new(HeldStream {
                hold: Some(hold),
                inner,
            })),
            None => Ok(inner),
        }
    }

    async fn put_stats(&self, id: LogId, spec: &WindowSpec, stats: &[Stat]) -> StoreResult<bool> {
        if self.reject_stats {
            return Err(StoreError::corrupt("stats tree unavailable"));
        }
        self.inner.put_stats(id, spec, stats).await
    }

    async fn get_stats(&self, id: LogId, spec: &WindowSpec) -> StoreResult<Option<Vec<Stat>>> {
        self.inner.get_stats(id, spec).await
    }

    async fn discard_derived(&self, id: LogId) -> StoreResult<()> {
        self.inner.discard_derived(id).await
    }
}

#[tokio::test]
async fn test_store_failure_rolls_back() {
    let store = InstrumentedStore {
        reject_stats: true,
        ..InstrumentedStore::new()
    };
    let service = IngestionService::new(Arc::new(store), IngestionConfig::default()).unwrap();

    let result = service
        .ingest_and_wait(IngestRequest::new("login-run", LOGIN_RUN))
        .await;
    assert!(matches!(result, Err(IngestionError::Store(_))));

    let status = &service.list_logs(None).await.unwrap()[0];
    assert_eq!(status.state, LogState::Failed);
    assert!(status.failure.is_some());
    assert!(stored_samples(&service, status.id).await.is_empty());

    // Failed logs can still be deleted.
    service.delete(status.id).await.unwrap();
}

#[tokio::test]
async fn test_successful_ingestion_passes_through_every_state() {
    let store = Arc::new(InstrumentedStore::new());
    let service = IngestionService::new(store.clone(), IngestionConfig::default()).unwrap();

    let status = service
        .ingest_and_wait(IngestRequest::new("login-run", LOGIN_RUN))
        .await
        .unwrap();
    assert_eq!(status.state, LogState::Ready);
    assert_eq!(
        store.states(),
        vec![
            LogState::Received,
            LogState::Parsing,
            LogState::Parsed,
            LogState::Aggregating,
            LogState::Ready,
        ]
    );
}

#[tokio::test]
async fn test_failed_parse_stops_at_parse_failed() {
    let store = Arc::new(InstrumentedStore::new());
    let service = IngestionService::new(store.clone(), IngestionConfig::default()).unwrap();

    let content = "ts,label,elapsed\n0,a,x\n1,a,y\n";
    assert!(service
        .ingest_and_wait(IngestRequest::new("broken", content))
        .await
        .is_err());
    assert_eq!(
        store.states(),
        vec![LogState::Received, LogState::Parsing, LogState::ParseFailed]
    );
}

#[tokio::test]
async fn test_dropped_ingest_and_wait_still_finishes() {
    let gate = Arc::new(Semaphore::new(0));
    let store = Arc::new(InstrumentedStore {
        sample_gate: Some(Arc::clone(&gate)),
        ..InstrumentedStore::new()
    });
    let service = IngestionService::new(store.clone(), IngestionConfig::default()).unwrap();

    // Sample writes are held, so the caller gives up mid-pipeline.
    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        service.ingest_and_wait(IngestRequest::new("login-run", LOGIN_RUN)),
    )
    .await;
    assert!(outcome.is_err());

    let id = service.list_logs(None).await.unwrap()[0].id;
    assert_eq!(service.get_status(id).await.unwrap().state, LogState::Aggregating);

    gate.add_permits(1);
    let status = service.wait(id).await.unwrap();
    assert_eq!(status.state, LogState::Ready);
    assert_eq!(stored_samples(&service, id).await.len(), 2);

    // Finished: nothing to recover, and it can be deleted.
    assert!(service.recover_interrupted().await.unwrap().is_empty());
    service.delete(id).await.unwrap();
    assert!(matches!(
        service.get_status(id).await,
        Err(IngestionError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_cancel_after_dropped_ingest_and_wait() {
    let gate = Arc::new(Semaphore::new(0));
    let store = Arc::new(InstrumentedStore {
        sample_gate: Some(Arc::clone(&gate)),
        ..InstrumentedStore::new()
    });
    let service = IngestionService::new(store.clone(), IngestionConfig::default()).unwrap();

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        service.ingest_and_wait(IngestRequest::new("login-run", LOGIN_RUN)),
    )
    .await;
    assert!(outcome.is_err());

    let id = service.list_logs(None).await.unwrap()[0].id;
    assert!(service.cancel(id).await);
    gate.add_permits(1);

    let status = service.wait(id).await.unwrap();
    assert_eq!(status.state, LogState::Failed);
    assert!(stored_samples(&service, id).await.is_empty());
}

#[tokio::test]
async fn test_lazy_query_reads_samples_off_the_executor() {
    let store = Arc::new(InstrumentedStore::new());
    let service = IngestionService::new(store.clone(), IngestionConfig::default()).unwrap();
    service
        .ingest_and_wait(IngestRequest::new("login-run", LOGIN_RUN).with_label("env", "p"))
        .await
        .unwrap();

    let (started_tx, started_rx) = oneshot::channel();
    let (release_tx, release_rx) = mpsc::channel();
    *store.sample_hold.lock().unwrap() = Some(SampleHold {
        started: started_tx,
        release: release_rx,
    });

    // A window nobody computed eagerly, so the samples must be read.
    let query = tokio::spawn({
        let service = service.clone();
        async move { service.query("env = p", 7, Some(GroupBy::Label)).await }
    });

    // This task only gets to run if the read is not blocking the runtime.
    started_rx.await.unwrap();
    release_tx.send(()).unwrap();

    let stats = query.await.unwrap().unwrap();
    assert!(!stats.is_empty());
    assert_eq!(stats.iter().map(|s| s.count).sum::<u64>(), 2);
}
