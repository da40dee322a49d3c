use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::diagnostics::Diagnostics;
use crate::error::{Result, WealthError};
use crate::importer::{import_bytes, IngestReport, ParseOptions, ProgressSink};
use crate::models::ParsedObservation;

const READ_PERCENT: u8 = 5;
const ROWS_START_PERCENT: usize = 10;
const ROWS_END_PERCENT: usize = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ParseRequest {
    pub id: RequestId,
    pub file_bytes: Vec<u8>,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WorkerEvent {
    Progress {
        percent: u8,
    },
    Success {
        rows: Vec<ParsedObservation>,
        report: IngestReport,
    },
    Error {
        message: String,
    },
}

impl WorkerEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerEvent::Progress { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerMessage {
    pub request_id: RequestId,
    #[serde(flatten)]
    pub event: WorkerEvent,
}

// ---------------------------------------------------------------------------
// Progress metering
// ---------------------------------------------------------------------------

/// Forwards row progress as percentages, at most every `every_rows` rows or
/// `every` interval. Percentages never decrease.
pub struct ThrottledProgress {
    request_id: RequestId,
    tx: mpsc::UnboundedSender<WorkerMessage>,
    cancel: Arc<AtomicBool>,
    every_rows: usize,
    every: Duration,
    last_percent: Option<u8>,
    last_rows: usize,
    last_at: Instant,
}

impl ThrottledProgress {
    pub fn new(
        request_id: RequestId,
        tx: mpsc::UnboundedSender<WorkerMessage>,
        cancel: Arc<AtomicBool>,
        every_rows: usize,
        every: Duration,
    ) -> Self {
        Self {
            request_id,
            tx,
            cancel,
            every_rows: every_rows.max(1),
            every,
            last_percent: None,
            last_rows: 0,
            last_at: Instant::now(),
        }
    }

    /// Sends `percent` unless it would go backwards. Returns false once the
    /// receiving side is gone.
    pub fn emit(&mut self, percent: u8) -> bool {
        let percent = percent.min(100);
        if self.last_percent.is_some_and(|last| percent <= last) {
            return true;
        }
        self.last_percent = Some(percent);
        self.tx
            .send(WorkerMessage {
                request_id: self.request_id,
                event: WorkerEvent::Progress { percent },
            })
            .is_ok()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

impl ProgressSink for ThrottledProgress {
    fn report(&mut self, done: usize, total: usize) -> Result<()> {
        if self.is_cancelled() {
            return Err(WealthError::Cancelled);
        }
        let due = done == total
            || done.saturating_sub(self.last_rows) >= self.every_rows
            || self.last_at.elapsed() >= self.every;
        if !due {
            return Ok(());
        }
        self.last_rows = done;
        self.last_at = Instant::now();
        let span = ROWS_END_PERCENT - ROWS_START_PERCENT;
        let percent = ROWS_START_PERCENT + done.min(total) * span / total.max(1);
        if !self.emit(percent as u8) {
            return Err(WealthError::Cancelled);
        }
        Ok(())
    }
}

/// Runs one request to completion on the current thread. A cancelled parse
/// sends nothing further.
pub fn run_parse(
    request: ParseRequest,
    options: &ParseOptions,
    tx: mpsc::UnboundedSender<WorkerMessage>,
    cancel: Arc<AtomicBool>,
) {
    let _span = tracing::info_span!("parse", id = request.id.0, file = %request.file_name).entered();
    let mut progress = ThrottledProgress::new(
        request.id,
        tx.clone(),
        cancel,
        options.progress_every_rows,
        options.progress_every,
    );
    let mut diagnostics = Diagnostics::new(options.log_capacity);
    progress.emit(READ_PERCENT);

    let event = match import_bytes(
        &request.file_bytes,
        &request.file_name,
        options,
        &mut diagnostics,
        &mut progress,
    ) {
        Ok(ingested) => {
            progress.emit(100);
            WorkerEvent::Success {
                rows: ingested.observations,
                report: ingested.report,
            }
        }
        Err(WealthError::Cancelled) => {
            tracing::debug!("parse cancelled");
            return;
        }
        Err(e) => {
            tracing::warn!(error = %e, "parse failed");
            WorkerEvent::Error {
                message: e.to_string(),
            }
        }
    };
    let _ = tx.send(WorkerMessage {
        request_id: request.id,
        event,
    });
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

struct ActiveRequest {
    id: RequestId,
    cancel: Arc<AtomicBool>,
}

/// Owns the message channel and at most one in-flight request. Files are
/// parsed on the blocking pool; messages from a superseded or cancelled
/// request are dropped on receipt.
pub struct ParseSupervisor {
    options: ParseOptions,
    next_id: u64,
    active: Option<ActiveRequest>,
    tx: mpsc::UnboundedSender<WorkerMessage>,
    rx: mpsc::UnboundedReceiver<WorkerMessage>,
}

impl ParseSupervisor {
    pub fn new(options: ParseOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            options,
            next_id: 0,
            active: None,
            tx,
            rx,
        }
    }

    pub fn active(&self) -> Option<RequestId> {
        self.active.as_ref().map(|a| a.id)
    }

    /// Starts parsing `file_bytes`, superseding any request still in flight.
    /// Must be called from within a tokio runtime.
    pub fn submit(&mut self, file_bytes: Vec<u8>, file_name: impl Into<String>) -> RequestId {
        let options = self.options.clone();
        let file_name = file_name.into();
        self.dispatch(move |id, tx, cancel| {
            let request = ParseRequest {
                id,
                file_bytes,
                file_name,
            };
            run_parse(request, &options, tx, cancel);
        })
    }

    fn dispatch<F>(&mut self, job: F) -> RequestId
    where
        F: FnOnce(RequestId, mpsc::UnboundedSender<WorkerMessage>, Arc<AtomicBool>) + Send + 'static,
    {
        self.cancel();
        self.next_id += 1;
        let id = RequestId(self.next_id);
        let cancel = Arc::new(AtomicBool::new(false));
        self.active = Some(ActiveRequest {
            id,
            cancel: cancel.clone(),
        });
        tracing::debug!(%id, "parse submitted");

        let tx = self.tx.clone();
        tokio::spawn(async move {
            let worker_tx = tx.clone();
            let handle = tokio::task::spawn_blocking(move || job(id, worker_tx, cancel));
            if let Err(e) = handle.await {
                tracing::error!(%id, error = %e, "parse worker crashed");
                let _ = tx.send(WorkerMessage {
                    request_id: id,
                    event: WorkerEvent::Error {
                        message: format!("Parse worker failed: {e}"),
                    },
                });
            }
        });
        id
    }

    /// Invalidates the active request. Its remaining messages are discarded.
    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.store(true, Ordering::SeqCst);
            tracing::debug!(id = %active.id, "parse cancelled");
        }
    }

    /// Next message for the active request; `None` once it has delivered its
    /// terminal message or was cancelled.
    pub async fn next_event(&mut self) -> Option<WorkerMessage> {
        loop {
            let active = self.active()?;
            let message = self.rx.recv().await?;
            if message.request_id != active {
                tracing::trace!(stale = %message.request_id, %active, "discarding stale worker message");
                continue;
            }
            if message.event.is_terminal() {
                self.active = None;
            }
            return Some(message);
        }
    }
}

impl Drop for ParseSupervisor {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::MONTH_NAMES;

    fn matrix_csv(rows: usize, first_value: f64) -> Vec<u8> {
        let mut out = String::from("Anno,Mese,N26,Revolut\n");
        for i in 0..rows {
            let year = 2000 + i / 12;
            let month = MONTH_NAMES[i % 12];
            out.push_str(&format!("{year},{month},{},{}\n", first_value + i as f64, 10.0));
        }
        out.into_bytes()
    }

    fn eager_options() -> ParseOptions {
        ParseOptions {
            progress_every_rows: 1,
            progress_every: Duration::ZERO,
            ..ParseOptions::default()
        }
    }

    async fn drain(sup: &mut ParseSupervisor) -> Vec<WorkerMessage> {
        let mut out = Vec::new();
        while let Some(message) = sup.next_event().await {
            out.push(message);
        }
        out
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_terminal_is_last() {
        let mut sup = ParseSupervisor::new(eager_options());
        let id = sup.submit(matrix_csv(40, 100.0), "wealth.csv");
        let messages = drain(&mut sup).await;

        assert!(messages.iter().all(|m| m.request_id == id));
        let (last, rest) = messages.split_last().unwrap();
        assert!(matches!(&last.event, WorkerEvent::Success { rows, .. } if rows.len() == 80));

        let percents: Vec<u8> = rest
            .iter()
            .map(|m| match m.event {
                WorkerEvent::Progress { percent } => percent,
                ref other => panic!("non-terminal expected, got {other:?}"),
            })
            .collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
        assert_eq!(percents.first(), Some(&READ_PERCENT));
        assert_eq!(percents.last(), Some(&100));
        assert!(sup.active().is_none());
    }

    #[tokio::test]
    async fn test_resubmit_yields_only_second_result() {
        let mut sup = ParseSupervisor::new(eager_options());
        let first = sup.submit(matrix_csv(2000, 1.0), "first.csv");
        let second = sup.submit(matrix_csv(3, 500.0), "second.csv");
        assert_ne!(first, second);

        let messages = drain(&mut sup).await;
        assert!(messages.iter().all(|m| m.request_id == second));
        let successes: Vec<&WorkerMessage> = messages.iter().filter(|m| m.event.is_terminal()).collect();
        assert_eq!(successes.len(), 1);
        match &successes[0].event {
            WorkerEvent::Success { rows, .. } => {
                assert_eq!(rows.len(), 6);
                assert_eq!(rows[0].amount, 500.0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_store_keeps_only_resubmitted_parse() {
        use crate::db::MemoryStorage;
        use crate::models::to_positions;
        use crate::store::DataStore;

        let mut store = DataStore::open(Box::new(MemoryStorage::default()));
        let mut sup = ParseSupervisor::new(eager_options());
        sup.submit(matrix_csv(2000, 1.0), "first.csv");
        let second = sup.submit(matrix_csv(3, 500.0), "second.csv");

        while let Some(message) = sup.next_event().await {
            assert_eq!(message.request_id, second);
            if let WorkerEvent::Success { rows, .. } = message.event {
                store.replace_all(to_positions(&rows), None);
            }
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.positions.len(), 6);
        assert_eq!(snapshot.aggregate.monthly_series.len(), 3);
        assert!(snapshot.positions.iter().all(|p| p.date.format("%Y").to_string() == "2000"));
        assert_eq!(snapshot.aggregate.net_worth, 502.0 + 10.0);
    }

    #[tokio::test]
    async fn test_stale_messages_are_discarded() {
        let mut sup = ParseSupervisor::new(eager_options());
        let id = sup.submit(matrix_csv(2, 1.0), "w.csv");
        sup.tx
            .send(WorkerMessage {
                request_id: RequestId(id.0 + 41),
                event: WorkerEvent::Error {
                    message: "stale".to_string(),
                },
            })
            .unwrap();
        let messages = drain(&mut sup).await;
        assert!(!messages.is_empty());
        assert!(messages.iter().all(|m| m.request_id == id));
    }

    #[tokio::test]
    async fn test_cancel_ends_the_stream() {
        let mut sup = ParseSupervisor::new(eager_options());
        sup.submit(matrix_csv(500, 1.0), "w.csv");
        sup.cancel();
        assert!(sup.active().is_none());
        assert!(sup.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_parse_failure_becomes_error_message() {
        let mut sup = ParseSupervisor::new(eager_options());
        sup.submit(b"hello".to_vec(), "notes.txt");
        let messages = drain(&mut sup).await;
        match &messages.last().unwrap().event {
            WorkerEvent::Error { message } => assert!(message.contains("Unsupported file type")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_worker_panic_becomes_error_message() {
        let mut sup = ParseSupervisor::new(eager_options());
        let id = sup.dispatch(|_, _, _| panic!("boom"));
        let message = sup.next_event().await.unwrap();
        assert_eq!(message.request_id, id);
        assert!(matches!(message.event, WorkerEvent::Error { ref message } if message.contains("Parse worker failed")));
        assert!(sup.next_event().await.is_none());
    }

    #[test]
    fn test_throttle_respects_row_interval_and_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let mut progress = ThrottledProgress::new(RequestId(1), tx, cancel.clone(), 10, Duration::from_secs(3600));
        for done in 1..=25 {
            progress.report(done, 100).unwrap();
        }
        let mut percents = Vec::new();
        while let Ok(m) = rx.try_recv() {
            if let WorkerEvent::Progress { percent } = m.event {
                percents.push(percent);
            }
        }
        assert_eq!(percents, vec![18, 27]);

        cancel.store(true, Ordering::SeqCst);
        assert!(matches!(progress.report(26, 100), Err(WealthError::Cancelled)));
    }

    #[test]
    fn test_event_wire_format() {
        let message = WorkerMessage {
            request_id: RequestId(3),
            event: WorkerEvent::Progress { percent: 42 },
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json, serde_json::json!({"requestId": 3, "kind": "progress", "percent": 42}));

        let error: WorkerMessage =
            serde_json::from_str(r#"{"requestId": 4, "kind": "error", "message": "bad"}"#).unwrap();
        assert!(error.event.is_terminal());
    }
}
