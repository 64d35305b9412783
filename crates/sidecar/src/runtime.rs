// crates/sidecar/src/runtime.rs
//! Driver wiring: sink, updater, trackers, signals, graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use jobtail_core::{
    DeliverySink, ProgressTracker, ProgressUpdater, RedirectSink, SequenceCounter, SimpleSink,
    TrackerHandle, TrackerState,
};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;

/// How long shutdown waits for trackers to finish their forced flush.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pick the delivery strategy from config: a redirect budget of 0 selects
/// the simple fire-and-forget sink.
fn build_sink(config: &Config) -> Result<Box<dyn DeliverySink>> {
    if config.max_post_redirect_follow == 0 {
        let client = reqwest::Client::builder()
            .build()
            .context("building HTTP client")?;
        Ok(Box::new(SimpleSink::new(
            client,
            config.callback_url.clone(),
        )))
    } else {
        // Redirects must surface to the sink, not be followed silently.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("building HTTP client")?;
        Ok(Box::new(RedirectSink::new(
            client,
            config.callback_url.clone(),
            config.max_post_redirect_follow,
        )))
    }
}

/// A running set of progress trackers plus their shared updater.
pub struct Sidecar {
    shutdown_tx: watch::Sender<bool>,
    trackers: Vec<TrackerHandle>,
}

impl Sidecar {
    /// Wire everything up and start one tracker task per watched location.
    pub fn start(config: &Config) -> Result<Self> {
        config.log_summary();

        let sink = build_sink(config)?;
        let (updater, _updater_task) = ProgressUpdater::spawn(
            sink,
            config.max_message_length,
            config.sample_interval,
        );
        let sequences = Arc::new(SequenceCounter::new());
        let pattern = config.progress_regex.clone();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let locations = config.locations();
        info!(count = locations.len(), "progress will be tracked from watched locations");

        let trackers = locations
            .into_iter()
            .map(|(location, tag)| {
                info!(path = %location.display(), tag, "watching location");
                ProgressTracker::new(
                    location,
                    tag,
                    config.max_bytes_read_per_line,
                    pattern.clone(),
                    sequences.clone(),
                    updater.clone(),
                )
                .start(shutdown_rx.clone())
            })
            .collect();

        Ok(Self {
            shutdown_tx,
            trackers,
        })
    }

    /// Current lifecycle state of every tracker, for the diagnostic dump.
    pub fn tracker_states(&self) -> Vec<(&str, TrackerState)> {
        self.trackers
            .iter()
            .map(|t| (t.tag(), t.state()))
            .collect()
    }

    /// Broadcast shutdown and wait (bounded) for every tracker to finish
    /// its forced flush.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        let deadline = tokio::time::Instant::now() + SHUTDOWN_TIMEOUT;
        for tracker in self.trackers {
            let tag = tracker.tag().to_string();
            if tokio::time::timeout_at(deadline, tracker.join())
                .await
                .is_err()
            {
                warn!(tag = %tag, "tracker did not stop before the shutdown deadline");
            }
        }
    }
}

/// Run the sidecar until an interrupt or termination signal arrives, then
/// force-flush every tracker's last known progress before returning.
pub async fn run(config: Config) -> Result<()> {
    let sidecar = Sidecar::start(&config)?;

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut sigusr1 = signal(SignalKind::user_defined1()).context("installing SIGUSR1 handler")?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("waiting for interrupt signal")?;
                info!("progress reporter interrupted");
                break;
            }
            _ = sigterm.recv() => {
                info!("progress reporter terminated");
                break;
            }
            _ = sigusr1.recv() => {
                // Diagnostic only; tracker state is unaffected.
                for (tag, state) in sidecar.tracker_states() {
                    info!(tag, state = ?state, "tracker status");
                }
            }
        }
    }

    sidecar.shutdown().await;
    Ok(())
}
