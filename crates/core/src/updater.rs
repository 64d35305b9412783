// crates/core/src/updater.rs
//! Rate-limited, coalescing dispatch of progress records.
//!
//! Trackers detect progress far faster than the scheduler endpoint wants
//! to hear about it. The updater decouples the two rates: every submitted
//! record replaces the pending slot for its tag, and delivery happens at
//! most once per sampling interval, carrying each tag's latest record.
//!
//! Implemented as a single-consumer task over an mpsc channel, which
//! serializes delivery (at most one send in flight) and gives the sink's
//! mutable state a single owner without any locks.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::record::{ProgressPayload, ProgressRecord};
use crate::sink::DeliverySink;

const COMMAND_CHANNEL_CAPACITY: usize = 64;

enum UpdaterCommand {
    Submit(ProgressRecord),
    /// Immediate delivery ignoring the sampling gate; acked with the
    /// delivery outcome so shutdown can sequence on it.
    ForceSend(ProgressRecord, oneshot::Sender<bool>),
}

/// Cloneable handle shared by every tracker.
#[derive(Clone)]
pub struct ProgressUpdater {
    tx: mpsc::Sender<UpdaterCommand>,
}

impl ProgressUpdater {
    /// Spawn the updater task around a delivery sink.
    ///
    /// Startup counts as a send boundary: the first delivery happens once
    /// the first sampling interval elapses, so a burst of early records
    /// coalesces into one attempt.
    pub fn spawn(
        sink: Box<dyn DeliverySink>,
        max_message_length: usize,
        sample_interval: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let task = UpdaterTask {
            rx,
            sink,
            max_message_length,
            sample_interval,
            last_send: Instant::now(),
            pending: HashMap::new(),
        };
        let handle = tokio::spawn(task.run());
        (Self { tx }, handle)
    }

    /// Hand a record to the updater. The latest record per tag always wins;
    /// an earlier unsent record for the same tag is coalesced away.
    pub async fn submit(&self, record: ProgressRecord) {
        let _ = self.tx.send(UpdaterCommand::Submit(record)).await;
    }

    /// Deliver `record` immediately, ignoring the sampling gate. Returns
    /// whether delivery succeeded; false if the updater has already shut
    /// down.
    pub async fn force_send(&self, record: ProgressRecord) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .tx
            .send(UpdaterCommand::ForceSend(record, ack_tx))
            .await
            .is_err()
        {
            return false;
        }
        ack_rx.await.unwrap_or(false)
    }
}

struct UpdaterTask {
    rx: mpsc::Receiver<UpdaterCommand>,
    sink: Box<dyn DeliverySink>,
    max_message_length: usize,
    sample_interval: Duration,
    /// When the last delivery attempt finished. The gate opens one sampling
    /// interval after this, measured from attempt completion so a failing
    /// endpoint is not hammered.
    last_send: Instant,
    /// Latest unsent record per tag.
    pending: HashMap<String, ProgressRecord>,
}

impl UpdaterTask {
    async fn run(mut self) {
        loop {
            if self.pending.is_empty() {
                match self.rx.recv().await {
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                }
            } else {
                let deadline = self.last_send + self.sample_interval;
                tokio::select! {
                    cmd = self.rx.recv() => match cmd {
                        Some(cmd) => self.handle(cmd).await,
                        None => {
                            // Trackers are gone; deliver what is pending
                            // rather than dropping it on the floor.
                            self.flush().await;
                            break;
                        }
                    },
                    _ = tokio::time::sleep_until(deadline) => self.flush().await,
                }
            }
        }
        debug!("progress updater stopped");
    }

    async fn handle(&mut self, cmd: UpdaterCommand) {
        match cmd {
            UpdaterCommand::Submit(record) => {
                self.pending.insert(record.tag.clone(), record);
                if self.last_send.elapsed() >= self.sample_interval {
                    self.flush().await;
                }
            }
            UpdaterCommand::ForceSend(record, ack) => {
                // The forced record is the tracker's latest; whatever was
                // pending for that tag is superseded by it.
                self.pending.remove(&record.tag);
                let delivered = self.send_one(&record).await;
                self.last_send = Instant::now();
                let _ = ack.send(delivered);
            }
        }
    }

    /// Deliver every pending record, oldest sequence first, then restart
    /// the sampling interval.
    async fn flush(&mut self) {
        let mut records: Vec<ProgressRecord> = self.pending.drain().map(|(_, r)| r).collect();
        records.sort_by_key(|r| r.sequence);
        for record in &records {
            self.send_one(record).await;
        }
        self.last_send = Instant::now();
    }

    /// One delivery attempt. Failures are logged and swallowed: the sample
    /// is superseded by the next natural update, never redelivered.
    async fn send_one(&mut self, record: &ProgressRecord) -> bool {
        let payload = ProgressPayload::from_record(record, self.max_message_length);
        match self.sink.send(&payload).await {
            Ok(()) => {
                debug!(
                    sequence = record.sequence,
                    tag = %record.tag,
                    percent = record.percent,
                    "progress update delivered"
                );
                true
            }
            Err(e) => {
                warn!(
                    sequence = record.sequence,
                    tag = %record.tag,
                    error = %e,
                    "progress update dropped"
                );
                false
            }
        }
    }
}
