//! Alert sinks
//!
//! Where alerts go once a module emits them. Every sink accepts concurrent
//! `record` calls from dispatch workers and never blocks them indefinitely.

use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::alerts::Alert;
use crate::error::SinkError;

const MAX_BACKOFF: Duration = Duration::from_millis(50);

/// Receives alerts emitted by scan modules
pub trait AlertSink: Send + Sync {
    /// Store or forward an alert
    fn record(&self, alert: Alert) -> Result<(), SinkError>;
}

/// In-memory append-only alert store
#[derive(Default)]
pub struct MemorySink {
    alerts: RwLock<Vec<Alert>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded alerts in arrival order
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().clone()
    }

    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AlertSink for MemorySink {
    fn record(&self, alert: Alert) -> Result<(), SinkError> {
        self.alerts.write().push(alert);
        Ok(())
    }
}

/// Drops alerts whose key has already been recorded
///
/// Alerts without a key always pass through.
pub struct DedupeSink {
    inner: Arc<dyn AlertSink>,
    keys: Mutex<HashSet<String>>,
    duplicates: AtomicUsize,
}

impl DedupeSink {
    pub fn new(inner: Arc<dyn AlertSink>) -> Self {
        Self {
            inner,
            keys: Mutex::new(HashSet::new()),
            duplicates: AtomicUsize::new(0),
        }
    }

    /// Number of alerts dropped as duplicates
    pub fn duplicates(&self) -> usize {
        self.duplicates.load(Ordering::Relaxed)
    }
}

impl AlertSink for DedupeSink {
    fn record(&self, alert: Alert) -> Result<(), SinkError> {
        if let Some(key) = alert.key() {
            if !self.keys.lock().insert(key.to_string()) {
                tracing::debug!(key, module = alert.source_module(), "Dropping duplicate alert");
                self.duplicates.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        }

        self.inner.record(alert)
    }
}

/// Bounded channel handoff to an asynchronous consumer
///
/// When the queue is full, `record` waits for room for at most `send_timeout`
/// before giving up with [`SinkError::Timeout`]. Call it from blocking
/// threads, not from async tasks.
pub struct ChannelSink {
    tx: mpsc::Sender<Alert>,
    capacity: usize,
    send_timeout: Duration,
}

impl ChannelSink {
    pub fn new(capacity: usize, send_timeout: Duration) -> (Self, mpsc::Receiver<Alert>) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                capacity,
                send_timeout,
            },
            rx,
        )
    }
}

impl AlertSink for ChannelSink {
    fn record(&self, alert: Alert) -> Result<(), SinkError> {
        let started = Instant::now();
        let mut backoff = Duration::from_millis(1);
        let mut pending = alert;

        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::TrySendError::Closed(_)) => return Err(SinkError::Closed),
                Err(mpsc::error::TrySendError::Full(alert)) => {
                    let waited = started.elapsed();
                    if waited >= self.send_timeout {
                        return Err(SinkError::Timeout {
                            capacity: self.capacity,
                            waited_ms: waited.as_millis() as u64,
                        });
                    }

                    std::thread::sleep(backoff.min(self.send_timeout - waited));
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    pending = alert;
                }
            }
        }
    }
}

/// Drain a channel into another sink until every sender is dropped
///
/// Returns the number of alerts the target accepted.
pub async fn forward_alerts(mut rx: mpsc::Receiver<Alert>, target: Arc<dyn AlertSink>) -> usize {
    let mut forwarded = 0;

    while let Some(alert) = rx.recv().await {
        let module = alert.source_module().to_string();
        match target.record(alert) {
            Ok(()) => forwarded += 1,
            Err(e) => tracing::error!(module = %module, error = %e, "Failed to forward alert"),
        }
    }

    forwarded
}

/// Writes each alert as one JSON line
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> AlertSink for JsonLinesSink<W> {
    fn record(&self, alert: Alert) -> Result<(), SinkError> {
        let line = serde_json::to_string(&alert)?;

        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}
