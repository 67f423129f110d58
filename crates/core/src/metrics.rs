//! Metrics/Transcript Collector
//!
//! The session pushes [`SessionEvent`]s through an [`EventRecorder`]; a
//! background task owns the [`SessionRecord`] and applies them. Pushing never
//! waits: if the buffer is full the event is dropped with a warning. When the
//! session ends the record is closed and handed to an [`EventSink`] once.

use crate::executor::{FunctionCallRequest, FunctionCallResult};
use crate::record::{CallEntry, SessionRecord, Speaker, Usage};
use async_trait::async_trait;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Turn {
        speaker: Speaker,
        content: String,
    },
    Call {
        request: FunctionCallRequest,
        result: FunctionCallResult,
        latency: Duration,
    },
    Usage(Usage),
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsFlushError {
    #[error("Metrics endpoint request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Metrics endpoint returned status {0}")]
    Status(u16),
    #[error("Invalid metrics URL: {0}")]
    InvalidUrl(String),
}

/// Destination for the finalized record.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn flush(&self, record: &SessionRecord) -> Result<(), MetricsFlushError>;
}

/// Writes a one-line summary to the log.
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn flush(&self, record: &SessionRecord) -> Result<(), MetricsFlushError> {
        let usage = record.usage();
        let failed_calls = record
            .calls()
            .iter()
            .filter(|c| !c.result.is_success())
            .count();
        info!(
            session_id = %record.session_id(),
            mode = %record.mode(),
            turns = record.turns().len(),
            calls = record.calls().len(),
            failed_calls,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            duration_ms = record.duration_ms().unwrap_or_default(),
            "Session summary"
        );
        Ok(())
    }
}

/// POSTs the finalized record as JSON to an analytics endpoint.
pub struct HttpMetricsSink {
    client: reqwest::Client,
    url: Url,
}

impl HttpMetricsSink {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, MetricsFlushError> {
        let url = Url::parse(url).map_err(|e| MetricsFlushError::InvalidUrl(e.to_string()))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl EventSink for HttpMetricsSink {
    async fn flush(&self, record: &SessionRecord) -> Result<(), MetricsFlushError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(record)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MetricsFlushError::Status(response.status().as_u16()));
        }
        debug!(url = %self.url, "Session record flushed");
        Ok(())
    }
}

/// Cheap, cloneable handle for pushing events.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    tx: mpsc::Sender<SessionEvent>,
}

impl EventRecorder {
    /// Queues `event` without waiting. Returns whether it was accepted.
    pub fn record(&self, event: SessionEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Metrics buffer full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Metrics collector stopped, dropping event");
                false
            }
        }
    }
}

/// What happened when the collector was finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Flushed,
    /// The sink reported an error; it has been logged.
    SinkFailed,
    /// Draining or flushing exceeded the drain timeout.
    TimedOut,
}

/// Owner of the background task that holds the session record.
pub struct MetricsCollector {
    recorder: EventRecorder,
    close_tx: oneshot::Sender<()>,
    task: JoinHandle<FlushOutcome>,
}

impl MetricsCollector {
    pub fn start(record: SessionRecord, sink: Arc<dyn EventSink>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(run_collector(record, sink, rx, close_rx));
        Self {
            recorder: EventRecorder { tx },
            close_tx,
            task,
        }
    }

    pub fn recorder(&self) -> EventRecorder {
        self.recorder.clone()
    }

    /// Stops accepting events, drains what is queued, closes the record and
    /// flushes it. Consumes the collector so the flush happens at most once.
    pub async fn finalize(self, drain_timeout: Duration) -> FlushOutcome {
        let MetricsCollector {
            close_tx, mut task, ..
        } = self;
        let _ = close_tx.send(());
        match tokio::time::timeout(drain_timeout, &mut task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(error = %e, "Metrics collector task failed");
                FlushOutcome::SinkFailed
            }
            Err(_) => {
                warn!(?drain_timeout, "Metrics flush exceeded drain timeout, abandoning");
                task.abort();
                FlushOutcome::TimedOut
            }
        }
    }
}

async fn run_collector(
    mut record: SessionRecord,
    sink: Arc<dyn EventSink>,
    mut rx: mpsc::Receiver<SessionEvent>,
    mut close_rx: oneshot::Receiver<()>,
) -> FlushOutcome {
    loop {
        tokio::select! {
            biased;
            _ = &mut close_rx => break,
            event = rx.recv() => match event {
                Some(event) => apply(&mut record, event),
                None => break,
            },
        }
    }

    rx.close();
    while let Ok(event) = rx.try_recv() {
        apply(&mut record, event);
    }

    if record.close().is_err() {
        warn!("Session record was already closed");
    }
    match sink.flush(&record).await {
        Ok(()) => FlushOutcome::Flushed,
        Err(e) => {
            warn!(error = %e, "Failed to flush session metrics");
            FlushOutcome::SinkFailed
        }
    }
}

fn apply(record: &mut SessionRecord, event: SessionEvent) {
    let applied = match event {
        SessionEvent::Turn { speaker, content } => record.push_turn(speaker, content).map(|_| ()),
        SessionEvent::Call {
            request,
            result,
            latency,
        } => record.push_call(CallEntry {
            request,
            result,
            latency_ms: latency.as_millis() as u64,
        }),
        SessionEvent::Usage(usage) => record.add_usage(usage),
    };
    if let Err(e) = applied {
        debug!(error = %e, "Dropping event for closed record");
    }
}

/// In-memory sink for tests in this crate and its dependents (`test-util`).
#[cfg(any(test, feature = "test-util"))]
pub mod testing {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sink that keeps every flushed record.
    #[derive(Default)]
    pub struct CapturingSink {
        pub flushes: AtomicUsize,
        pub records: Mutex<Vec<SessionRecord>>,
        pub fail: bool,
    }

    impl CapturingSink {
        pub fn flush_count(&self) -> usize {
            self.flushes.load(Ordering::SeqCst)
        }

        pub fn last_record(&self) -> Option<SessionRecord> {
            self.records().pop()
        }

        pub fn records(&self) -> Vec<SessionRecord> {
            self.records
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone()
        }
    }

    #[async_trait]
    impl EventSink for CapturingSink {
        async fn flush(&self, record: &SessionRecord) -> Result<(), MetricsFlushError> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            self.records
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(record.clone());
            if self.fail {
                Err(MetricsFlushError::Status(503))
            } else {
                Ok(())
            }
        }
    }
}
