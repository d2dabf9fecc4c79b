//! The event loop: aggregation, quiescence, dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use notify::Event;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, sleep_until};

use super::aggregator::ChangeAggregator;
use super::error::MirrorError;
use super::event::RawEvent;
use super::registry::{NotifyBackend, WatchBackend, WatchRegistry};
use super::sync::{BatchReport, Synchronizer};

/// Mirror context: owns the event stream, the watch registry, the
/// destinations and the pending batch.
///
/// A single task drives [`Mirror::run`]; events and timer expiry are handled
/// one at a time, so none of the state needs locking.
pub struct Mirror {
    events: mpsc::Receiver<notify::Result<Event>>,
    registry: WatchRegistry,
    synchronizer: Synchronizer,
    aggregator: ChangeAggregator,
    quiescence: Duration,
    reports: Option<mpsc::UnboundedSender<BatchReport>>,
}

impl Mirror {
    /// Create a builder for configuring the mirror.
    pub fn builder() -> MirrorBuilder {
        MirrorBuilder::new()
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    /// Process events until the event source closes.
    ///
    /// Every recorded change restarts the quiescence timer. Notifications that
    /// map to no change, such as reads, and watcher errors leave it running.
    /// When the timer fires the pending batch is synchronized before the
    /// next event is read.
    pub async fn run(mut self) -> Result<(), MirrorError> {
        let mut deadline: Option<Instant> = None;

        crate::log_event!(
            "engine",
            "started",
            "{} directories watched, {} destination(s), quiescence {}ms",
            self.registry.len(),
            self.synchronizer.destinations().len(),
            self.quiescence.as_millis()
        );

        loop {
            tokio::select! {
                received = self.events.recv() => {
                    let Some(received) = received else {
                        return self.shutdown();
                    };

                    let recorded = match received {
                        Ok(event) => self.record(&event),
                        Err(e) => {
                            tracing::error!("[engine] watch error: {e}");
                            false
                        }
                    };
                    if recorded {
                        deadline = (!self.aggregator.is_empty())
                            .then(|| Instant::now() + self.quiescence);
                    }
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    let report = self.dispatch().await?;
                    if let Some(reports) = &self.reports {
                        // Nobody listening any more is fine
                        let _ = reports.send(report);
                    }
                }
            }
        }
    }

    /// Returns whether the event carried any change.
    fn record(&mut self, event: &Event) -> bool {
        let raw_events = RawEvent::from_notify(event);
        if raw_events.is_empty() {
            crate::debug_event!("engine", "ignored", "{:?} {:?}", event.kind, event.paths);
            return false;
        }

        for raw in raw_events {
            crate::debug_event!("engine", "event", "{:?} {}", raw.kind, raw.path.display());
            self.aggregator.record(raw);
        }
        true
    }

    async fn dispatch(&mut self) -> Result<BatchReport, MirrorError> {
        let batch = self.aggregator.take();
        crate::log_event!(
            "engine",
            "dispatching",
            "{} changed, {} removed",
            batch.changed.len(),
            batch.removed.len()
        );

        self.synchronizer
            .run(batch, &mut self.registry)
            .await
            .inspect_err(|e| tracing::error!("[engine] batch failed: {e}"))
    }

    fn shutdown(&self) -> Result<(), MirrorError> {
        let pending = self.aggregator.len();
        if pending > 0 {
            tracing::error!("[engine] event source closed with {pending} pending change(s)");
            return Err(MirrorError::SourceClosed { pending });
        }

        crate::log_event!("engine", "event source closed, stopping");
        Ok(())
    }
}

/// Builder for constructing a [`Mirror`].
pub struct MirrorBuilder {
    source_root: Option<PathBuf>,
    destinations: Vec<PathBuf>,
    quiescence_ms: u64,
    event_buffer: usize,
    prune_removed: bool,
    reports: Option<mpsc::UnboundedSender<BatchReport>>,
}

impl MirrorBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            source_root: None,
            destinations: Vec::new(),
            quiescence_ms: 5_000,
            event_buffer: 4_096,
            prune_removed: true,
            reports: None,
        }
    }

    /// Set the source root. Expected to be absolute and canonical.
    pub fn source_root(mut self, path: PathBuf) -> Self {
        self.source_root = Some(path);
        self
    }

    /// Add a destination root.
    pub fn destination(mut self, path: PathBuf) -> Self {
        self.destinations.push(path);
        self
    }

    /// Add several destination roots.
    pub fn destinations(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.destinations.extend(paths);
        self
    }

    /// Set the quiescence interval in milliseconds.
    pub fn quiescence_ms(mut self, ms: u64) -> Self {
        self.quiescence_ms = ms;
        self
    }

    /// Set the capacity of the event channel.
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    /// Whether removed directories are unregistered.
    pub fn prune_removed(mut self, prune: bool) -> Self {
        self.prune_removed = prune;
        self
    }

    /// Receive the report of every dispatched batch.
    pub fn reports(mut self, tx: mpsc::UnboundedSender<BatchReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Build over the platform notify watcher and seed the watch registry.
    pub fn build(self) -> Result<Mirror, MirrorError> {
        let (tx, rx) = mpsc::channel(self.event_buffer);

        // Blocks the notify thread while the engine is busy with a batch
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        })?;

        self.build_with(Box::new(NotifyBackend::new(watcher)), rx)
    }

    /// Build over a custom backend and event stream, then seed the registry.
    ///
    /// The stream ends, and the mirror stops, once every sender is dropped.
    pub fn build_with(
        self,
        backend: Box<dyn WatchBackend>,
        events: mpsc::Receiver<notify::Result<Event>>,
    ) -> Result<Mirror, MirrorError> {
        let source_root = self.source_root.ok_or_else(|| MirrorError::InitFailed {
            reason: "Source root is required".to_string(),
        })?;

        if self.destinations.is_empty() {
            return Err(MirrorError::InvalidDestination {
                path: PathBuf::new(),
                reason: "no destination directory given".to_string(),
            });
        }

        let mut registry = WatchRegistry::new(backend);
        registry.seed(&source_root)?;

        let destinations: Arc<[PathBuf]> = self.destinations.into();
        let synchronizer =
            Synchronizer::new(source_root, destinations).prune_removed(self.prune_removed);

        Ok(Mirror {
            events,
            registry,
            synchronizer,
            aggregator: ChangeAggregator::new(),
            quiescence: Duration::from_millis(self.quiescence_ms),
            reports: self.reports,
        })
    }
}

impl Default for MirrorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
