//! Daemon wiring: queues, dispatcher, acceptor and flushers under one
//! shutdown coordinator.

use std::sync::Arc;

use splitd_core::{ClientTag, Evaluator, Event, Impression, LocalRuleSet, Recorder};
use splitd_link::{Acceptor, V1Dispatcher};
use splitd_storage::{StatsSnapshot, TagFanIn};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::flusher::{FlushItem, FlushReport, Flusher, run_periodic};
use crate::recorder::{HttpRecorder, LogRecorder};
use crate::shutdown::{ShutdownCoordinator, ShutdownReason};

/// Counters reported when the daemon stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaemonReport {
    pub impressions: StatsSnapshot,
    pub events: StatsSnapshot,
    pub connections_accepted: u64,
    pub connections_rejected: u64,
}

/// A configured daemon, ready to [`run`](Daemon::run).
pub struct Daemon {
    config: Config,
    evaluator: Arc<dyn Evaluator>,
    recorder: Arc<dyn Recorder>,
    impressions: Arc<TagFanIn<ClientTag, Impression>>,
    events: Arc<TagFanIn<ClientTag, Event>>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("config", &self.config)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Build the evaluator and recorder the configuration asks for.
    ///
    /// # Errors
    ///
    /// Returns an error when the rules file cannot be loaded or the HTTP
    /// recorder cannot be built.
    pub fn from_config(config: Config) -> Result<Self> {
        let evaluator: Arc<dyn Evaluator> = match &config.sdk.rules_file {
            Some(path) => Arc::new(LocalRuleSet::from_file(path)?),
            None => {
                warn!("No rules file configured, every evaluation answers control");
                Arc::new(LocalRuleSet::default())
            }
        };

        let recorder: Arc<dyn Recorder> = match &config.recorder.url {
            Some(url) => {
                info!(url = %url, "Uploading to events backend");
                Arc::new(HttpRecorder::new(url, &config.recorder)?)
            }
            None => {
                warn!("No recorder url configured, flushed data is discarded");
                Arc::new(LogRecorder)
            }
        };

        Ok(Self::with_backends(config, evaluator, recorder))
    }

    #[must_use]
    pub fn with_backends(
        config: Config,
        evaluator: Arc<dyn Evaluator>,
        recorder: Arc<dyn Recorder>,
    ) -> Self {
        let impressions = Arc::new(TagFanIn::new(config.sdk.impressions_queue_size));
        let events = Arc::new(TagFanIn::new(config.sdk.events_queue_size));
        Self {
            config,
            evaluator,
            recorder,
            impressions,
            events,
            shutdown: Arc::new(ShutdownCoordinator::new()),
        }
    }

    /// Handle for stopping the daemon from elsewhere.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<ShutdownCoordinator> {
        Arc::clone(&self.shutdown)
    }

    #[must_use]
    pub fn impressions(&self) -> &Arc<TagFanIn<ClientTag, Impression>> {
        &self.impressions
    }

    #[must_use]
    pub fn events(&self) -> &Arc<TagFanIn<ClientTag, Event>> {
        &self.events
    }

    /// Serve until shutdown is initiated, then flush and report.
    ///
    /// A listener failure initiates shutdown itself; the flushers still run
    /// their final pass before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the codec is unknown, the socket cannot be bound,
    /// or the acceptor fails while running.
    pub async fn run(self) -> Result<DaemonReport> {
        let codec = self.config.link.codec()?;
        let dispatcher = Arc::new(V1Dispatcher::new(
            Arc::clone(&self.evaluator),
            Arc::clone(&self.impressions),
            Arc::clone(&self.events),
            codec,
        ));
        let acceptor = Acceptor::bind(self.config.link.acceptor(), dispatcher).await?;
        let acceptor_stats = acceptor.stats();

        // Flushers outlive the acceptor so the final flush sees records
        // queued during the connection grace period.
        let flush_stop = ShutdownCoordinator::new();
        let impressions_task = spawn_flusher(
            Arc::clone(&self.impressions),
            Arc::clone(&self.recorder),
            self.config.sdk.impressions_period(),
            &flush_stop,
        );
        let events_task = spawn_flusher(
            Arc::clone(&self.events),
            Arc::clone(&self.recorder),
            self.config.sdk.events_period(),
            &flush_stop,
        );

        info!(
            path = %self.config.link.socket_path.display(),
            flavor = %self.config.link.flavor,
            "splitd ready"
        );

        let served = acceptor.run(self.shutdown.subscribe().wait()).await;
        if let Err(e) = &served {
            error!(error = %e, "Acceptor failed");
            self.shutdown.initiate(ShutdownReason::AcceptorFailed);
        }

        flush_stop.initiate(ShutdownReason::Programmatic);
        join_flusher("impressions", impressions_task).await;
        join_flusher("events", events_task).await;

        let report = DaemonReport {
            impressions: self.impressions.stats().snapshot(),
            events: self.events.stats().snapshot(),
            connections_accepted: acceptor_stats.accepted(),
            connections_rejected: acceptor_stats.rejected(),
        };
        info!(
            impressions_queued = report.impressions.queued,
            impressions_dropped = report.impressions.dropped,
            events_queued = report.events.queued,
            events_dropped = report.events.dropped,
            connections_accepted = report.connections_accepted,
            connections_rejected = report.connections_rejected,
            "splitd stopped"
        );

        served?;
        Ok(report)
    }
}

fn spawn_flusher<T: FlushItem>(
    fan_in: Arc<TagFanIn<ClientTag, T>>,
    recorder: Arc<dyn Recorder>,
    period: std::time::Duration,
    stop: &ShutdownCoordinator,
) -> JoinHandle<Option<FlushReport>> {
    let flusher = Arc::new(Flusher::new(fan_in, recorder));
    tokio::spawn(run_periodic(flusher, period, stop.subscribe().wait()))
}

async fn join_flusher(kind: &'static str, task: JoinHandle<Option<FlushReport>>) {
    match task.await {
        Ok(Some(report)) if !report.is_clean() => {
            warn!(kind, failed = report.failed_items(), "Final flush had failures");
        }
        Ok(_) => {}
        Err(e) => error!(kind, error = %e, "Flusher task failed"),
    }
}
