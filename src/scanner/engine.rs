//! Scan engine orchestration

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use super::dispatcher::{DispatchReport, Dispatcher};
use crate::http::Transaction;

/// Scan engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Running,
    Stopping,
}

/// Scan progress information
#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub state: ScanState,
    pub processed: usize,
    pub alerts: usize,
    pub module_failures: usize,
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self {
            state: ScanState::Idle,
            processed: 0,
            alerts: 0,
            module_failures: 0,
        }
    }
}

/// Main scan engine
///
/// Feeds captured transactions through the dispatcher, several at a time.
pub struct ScanEngine {
    /// Response-processor dispatcher
    dispatcher: Arc<Dispatcher>,

    /// Scan state
    state: Arc<RwLock<ScanState>>,

    /// Progress
    progress: Arc<RwLock<ScanProgress>>,

    /// Maximum transactions dispatched concurrently
    max_workers: usize,
}

impl ScanEngine {
    /// Create a new scan engine
    pub fn new(dispatcher: Dispatcher, max_workers: usize) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            state: Arc::new(RwLock::new(ScanState::Idle)),
            progress: Arc::new(RwLock::new(ScanProgress::default())),
            max_workers: max_workers.max(1),
        }
    }

    /// Dispatch a single transaction on the calling thread
    pub fn process(&self, transaction: Transaction) -> Option<DispatchReport> {
        if *self.state.read() == ScanState::Stopping {
            return None;
        }

        let transaction = Arc::new(transaction);
        let report = self.dispatcher.dispatch(&transaction);
        record_report(&self.progress, &report);
        Some(report)
    }

    /// Consume transactions until the channel closes or the engine is stopped
    ///
    /// Up to `max_workers` transactions are dispatched at once on the blocking
    /// thread pool. Returns the final progress once in-flight work finishes.
    pub async fn run(&self, mut rx: mpsc::Receiver<Transaction>) -> ScanProgress {
        self.set_state(ScanState::Running);
        tracing::info!(workers = self.max_workers, "Scan engine started");

        let permits = Arc::new(Semaphore::new(self.max_workers));
        let mut workers = JoinSet::new();

        while let Some(transaction) = rx.recv().await {
            if self.state() == ScanState::Stopping {
                tracing::info!("Scan engine stopping, no longer accepting transactions");
                break;
            }

            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            // stop() may have landed while waiting for a free worker
            if self.state() == ScanState::Stopping {
                tracing::info!("Scan engine stopping, no longer accepting transactions");
                break;
            }

            let dispatcher = Arc::clone(&self.dispatcher);
            let progress = Arc::clone(&self.progress);
            let transaction = Arc::new(transaction);

            workers.spawn_blocking(move || {
                let _permit = permit;
                let report = dispatcher.dispatch(&transaction);
                record_report(&progress, &report);
            });

            // Reap finished workers so the set does not grow with the input
            while let Some(joined) = workers.try_join_next() {
                log_join_error(joined);
            }
        }

        while let Some(joined) = workers.join_next().await {
            log_join_error(joined);
        }

        self.set_state(ScanState::Idle);

        let progress = self.progress();
        tracing::info!(
            processed = progress.processed,
            alerts = progress.alerts,
            module_failures = progress.module_failures,
            "Scan engine finished"
        );
        progress
    }

    /// Stop accepting transactions; in-flight work still completes
    pub fn stop(&self) {
        self.set_state(ScanState::Stopping);
    }

    fn set_state(&self, state: ScanState) {
        *self.state.write() = state;
        self.progress.write().state = state;
    }

    /// Get current scan state
    pub fn state(&self) -> ScanState {
        *self.state.read()
    }

    /// Get scan progress
    pub fn progress(&self) -> ScanProgress {
        self.progress.read().clone()
    }
}

fn record_report(progress: &RwLock<ScanProgress>, report: &DispatchReport) {
    let mut progress = progress.write();
    progress.processed += 1;
    progress.alerts += report.alerts();
    progress.module_failures += report.failures();
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Dispatch worker failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::ModulesConfig;
    use crate::error::ModuleError;
    use crate::http::{Request, Response};
    use crate::scanner::alerts::Alert;
    use crate::scanner::module::{ModuleContext, ModuleDescriptor, ScanModule};
    use crate::scanner::registry::ModuleRegistry;
    use crate::scanner::sink::{forward_alerts, AlertSink, ChannelSink, MemorySink};
    use parking_lot::Mutex;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;

    /// Holds each transaction until the test releases it
    struct GateModule {
        descriptor: ModuleDescriptor,
        started: mpsc::UnboundedSender<()>,
        release: Mutex<std_mpsc::Receiver<()>>,
    }

    impl ScanModule for GateModule {
        fn descriptor(&self) -> &ModuleDescriptor {
            &self.descriptor
        }

        fn run(&self, ctx: &ModuleContext<'_>) -> Result<(), ModuleError> {
            let _ = self.started.send(());
            let _ = self.release.lock().recv();
            ctx.publish_alert(Alert::builder(ctx.module_name(), ctx.transaction()).build());
            Ok(())
        }
    }

    fn engine(workers: usize) -> (ScanEngine, Arc<MemorySink>) {
        let registry = ModuleRegistry::with_defaults(&ModulesConfig::default()).unwrap();
        let sink = Arc::new(MemorySink::new());
        let target: Arc<dyn AlertSink> = sink.clone();
        let dispatcher = Dispatcher::new(Arc::new(RwLock::new(registry)), target);
        (ScanEngine::new(dispatcher, workers), sink)
    }

    fn page(path: &str, body: &str) -> Transaction {
        Transaction::new(
            Request::new("GET", &format!("https://example.com{}", path)),
            Response::new(200, body),
        )
    }

    #[test]
    fn test_process_updates_progress() {
        let (engine, sink) = engine(1);

        let report = engine
            .process(page("/", r#"<meta name="author" content="x">"#))
            .unwrap();
        assert_eq!(report.alerts(), 1);

        engine.process(page("/plain", "<p>nothing</p>"));

        let progress = engine.progress();
        assert_eq!(progress.processed, 2);
        assert_eq!(progress.alerts, 1);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_stopped_engine_skips_transactions() {
        let (engine, sink) = engine(1);
        engine.stop();
        assert!(engine.process(page("/", r#"<meta name="author" content="x">"#)).is_none());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_run_dispatches_all_transactions() {
        let (engine, sink) = engine(4);
        let (tx, rx) = mpsc::channel(8);

        let producer = tokio::spawn(async move {
            for i in 0..50 {
                let body = if i % 2 == 0 {
                    format!(r#"<meta name="author" content="user {}">"#, i)
                } else {
                    "<html></html>".to_string()
                };
                tx.send(page(&format!("/page/{}", i), &body)).await.unwrap();
            }
        });

        let progress = engine.run(rx).await;
        producer.await.unwrap();

        assert_eq!(progress.state, ScanState::Idle);
        assert_eq!(progress.processed, 50);
        assert_eq!(progress.alerts, 25);
        assert_eq!(progress.module_failures, 0);
        assert_eq!(sink.len(), 25);

        // author and user keywords both hit, one alert per transaction
        for alert in sink.alerts() {
            assert_eq!(alert.field("output").unwrap().lines().count(), 2);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_during_run_finishes_in_flight_work() {
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = std_mpsc::channel();

        let mut registry = ModuleRegistry::new();
        registry
            .register(Arc::new(GateModule {
                descriptor: ModuleDescriptor::response_processor("gate", "Gate"),
                started: started_tx,
                release: Mutex::new(release_rx),
            }))
            .unwrap();
        let sink = Arc::new(MemorySink::new());
        let target: Arc<dyn AlertSink> = sink.clone();
        let dispatcher = Dispatcher::new(Arc::new(RwLock::new(registry)), target);
        let engine = Arc::new(ScanEngine::new(dispatcher, 1));

        let (tx, rx) = mpsc::channel(8);
        for i in 0..3 {
            tx.send(page(&format!("/{}", i), "<html></html>")).await.unwrap();
        }

        let runner = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run(rx).await })
        };

        // First transaction is now in flight and holds the only worker
        started_rx.recv().await.unwrap();
        engine.stop();
        for _ in 0..3 {
            let _ = release_tx.send(());
        }
        drop(tx);

        let progress = runner.await.unwrap();
        assert_eq!(progress.processed, 1);
        assert_eq!(progress.alerts, 1);
        assert_eq!(sink.len(), 1);
        assert!(started_rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_loses_no_alerts_through_small_channel() {
        let registry = ModuleRegistry::with_defaults(&ModulesConfig::default()).unwrap();
        let (channel_sink, alert_rx) = ChannelSink::new(16, Duration::from_secs(30));
        let dispatcher = Dispatcher::new(Arc::new(RwLock::new(registry)), Arc::new(channel_sink));
        let engine = ScanEngine::new(dispatcher, 8);

        let memory = Arc::new(MemorySink::new());
        let target: Arc<dyn AlertSink> = memory.clone();
        let forwarder = tokio::spawn(forward_alerts(alert_rx, target));

        let (tx, rx) = mpsc::channel(64);
        let producer = tokio::spawn(async move {
            for i in 0..2000 {
                let body = r#"<meta name="author" content="x">"#;
                tx.send(page(&format!("/page/{}", i), body)).await.unwrap();
            }
        });

        let progress = engine.run(rx).await;
        producer.await.unwrap();

        // Last sender lives in the dispatcher
        drop(engine);
        let forwarded = forwarder.await.unwrap();

        assert_eq!(progress.processed, 2000);
        assert_eq!(progress.alerts, 2000);
        assert_eq!(forwarded, 2000);
        assert_eq!(memory.len(), 2000);
    }
}
