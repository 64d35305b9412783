// crates/core/src/tracker.rs
//! Per-location progress tracking task.
//!
//! One tracker owns one watched location (progress file, stdout, stderr):
//! a [`LineReader`] + extraction pipeline that turns appended lines into
//! [`ProgressRecord`]s and submits them to the shared updater. Trackers
//! run as independent tokio tasks; one location's read failure never
//! stops the others.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use regex_lite::Regex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::ReadError;
use crate::extract::extract_progress;
use crate::reader::LineReader;
use crate::record::ProgressRecord;
use crate::seq::SequenceCounter;
use crate::updater::ProgressUpdater;

/// How often the tailing loop polls for new lines. Governs reading only;
/// the updater's sampling interval governs sending.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Tracker lifecycle, published through an atomic so the driver's
/// diagnostic dump can read it without touching the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Created,
    Running,
    Stopped,
}

impl TrackerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

/// Handle returned by [`ProgressTracker::start`]: enough for the driver to
/// observe lifecycle state and await task exit at shutdown.
pub struct TrackerHandle {
    tag: String,
    state: Arc<AtomicU8>,
    join: JoinHandle<()>,
}

impl TrackerHandle {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn state(&self) -> TrackerState {
        TrackerState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Wait for the tracker task to exit (it flushes its last record first).
    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Tails one watched location and feeds matched progress lines to the
/// shared updater.
pub struct ProgressTracker {
    tag: String,
    reader: LineReader,
    pattern: Arc<Regex>,
    sequences: Arc<SequenceCounter>,
    updater: ProgressUpdater,
    last_record: Option<ProgressRecord>,
    state: Arc<AtomicU8>,
}

impl ProgressTracker {
    pub fn new(
        location: PathBuf,
        tag: impl Into<String>,
        max_line_bytes: usize,
        pattern: Arc<Regex>,
        sequences: Arc<SequenceCounter>,
        updater: ProgressUpdater,
    ) -> Self {
        Self {
            tag: tag.into(),
            reader: LineReader::new(location, max_line_bytes),
            pattern,
            sequences,
            updater,
            last_record: None,
            state: Arc::new(AtomicU8::new(TrackerState::Created as u8)),
        }
    }

    /// Spawn the tailing loop. It runs until the shutdown signal fires or
    /// a fatal read error occurs, then force-flushes the last known record
    /// so final state is not lost to an unlucky sampling window.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> TrackerHandle {
        let tag = self.tag.clone();
        let state = self.state.clone();
        let join = tokio::spawn(self.run(shutdown));
        TrackerHandle { tag, state, join }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        self.state
            .store(TrackerState::Running as u8, Ordering::Relaxed);
        info!(
            tag = %self.tag,
            path = %self.reader.path().display(),
            "progress tracker started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    debug!(tag = %self.tag, "shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {
                    if let Err(e) = self.poll_once().await {
                        error!(tag = %self.tag, error = %e, "stopping tracker after read failure");
                        break;
                    }
                }
            }
        }

        self.force_send_progress_update().await;
        self.state
            .store(TrackerState::Stopped as u8, Ordering::Relaxed);
        info!(tag = %self.tag, "progress tracker stopped");
    }

    /// One pass of the pipeline: drain new lines, extract, stamp, submit.
    /// Reaching end-of-file is not terminal; the file may still grow.
    pub async fn poll_once(&mut self) -> Result<(), ReadError> {
        for line in self.reader.poll().await? {
            let Some(matched) = extract_progress(&line.text, &self.pattern) else {
                continue;
            };
            let record = ProgressRecord {
                sequence: self.sequences.next(),
                tag: self.tag.clone(),
                percent: Some(matched.percent),
                message: matched.message,
                raw_truncated: line.truncated,
            };
            self.last_record = Some(record.clone());
            self.updater.submit(record).await;
        }
        Ok(())
    }

    /// Deliver the last known record immediately, bypassing the sampling
    /// gate. No-op if this tracker never produced a record. Used once per
    /// tracker during graceful shutdown.
    pub async fn force_send_progress_update(&self) -> bool {
        match &self.last_record {
            Some(record) => self.updater.force_send(record.clone()).await,
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn last_record(&self) -> Option<&ProgressRecord> {
        self.last_record.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingSink;
    use std::io::Write;
    use tempfile::tempdir;

    fn pattern() -> Arc<Regex> {
        Arc::new(Regex::new(r"progress: ([0-9]*\.?[0-9]+), (.*)").unwrap())
    }

    fn append(path: &std::path::Path, data: &str) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        write!(f, "{data}").unwrap();
    }

    const INTERVAL: Duration = Duration::from_millis(1000);

    fn tracker_over(
        path: PathBuf,
        tag: &str,
        sink: &RecordingSink,
    ) -> (ProgressTracker, Arc<SequenceCounter>) {
        let (updater, _task) = ProgressUpdater::spawn(Box::new(sink.clone()), 512, INTERVAL);
        let sequences = Arc::new(SequenceCounter::new());
        let tracker = ProgressTracker::new(
            path,
            tag,
            4096,
            pattern(),
            sequences.clone(),
            updater,
        );
        (tracker, sequences)
    }

    #[tokio::test(start_paused = true)]
    async fn poll_once_extracts_and_records_progress() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("job.progress");
        append(&path, "starting up\nprogress: 25, one quarter\nnoise\n");

        let sink = RecordingSink::default();
        let (mut tracker, _) = tracker_over(path.clone(), "progress", &sink);

        tracker.poll_once().await.unwrap();
        let last = tracker.last_record().unwrap();
        assert_eq!(last.sequence, 0);
        assert_eq!(last.percent, Some(25.0));
        assert_eq!(last.message, "one quarter");
        assert!(!last.raw_truncated);
    }

    #[tokio::test(start_paused = true)]
    async fn latest_match_wins_within_a_poll() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("job.progress");
        append(&path, "progress: 10, early\nprogress: 60, later\n");

        let sink = RecordingSink::default();
        let (mut tracker, _) = tracker_over(path.clone(), "progress", &sink);

        tracker.poll_once().await.unwrap();
        assert_eq!(tracker.last_record().unwrap().percent, Some(60.0));

        // Both submits fall in one sampling interval; the flush carries
        // only the later record.
        tokio::time::sleep(INTERVAL + Duration::from_millis(50)).await;
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message, "later");
    }

    #[tokio::test(start_paused = true)]
    async fn force_send_without_any_record_is_a_noop() {
        let dir = tempdir().unwrap();
        let sink = RecordingSink::default();
        let (tracker, _) = tracker_over(dir.path().join("absent"), "stdout", &sink);

        assert!(!tracker.force_send_progress_update().await);
        assert!(sink.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn force_send_delivers_regardless_of_gate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("job.progress");
        append(&path, "progress: 80, almost\n");

        let sink = RecordingSink::default();
        let (mut tracker, _) = tracker_over(path, "progress", &sink);
        tracker.poll_once().await.unwrap();

        // The gate has not opened yet, but the forced flush goes through.
        assert!(tracker.force_send_progress_update().await);
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message, "almost");
    }

    #[tokio::test(start_paused = true)]
    async fn started_tracker_flushes_on_shutdown() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("job.progress");
        append(&path, "progress: 42.5, halfway done\n");

        let sink = RecordingSink::default();
        let (tracker, _) = tracker_over(path, "progress", &sink);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tracker.start(shutdown_rx);
        assert_eq!(handle.tag(), "progress");

        // Let the poll loop pick the line up, then shut down inside the
        // first sampling interval.
        tokio::time::sleep(POLL_INTERVAL * 2).await;
        assert_eq!(handle.state(), TrackerState::Running);

        shutdown_tx.send(true).unwrap();
        handle.join().await;

        let sent = sink.sent();
        assert_eq!(sent.len(), 1, "forced flush must beat the sampling gate");
        assert_eq!(sent[0].percent, Some(42.5));
        assert_eq!(sent[0].message, "halfway done");
    }

    #[tokio::test(start_paused = true)]
    async fn trackers_share_one_sequence_space() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.progress");
        let b = dir.path().join("b.progress");
        append(&a, "progress: 1, from a\n");
        append(&b, "progress: 2, from b\n");

        let sink = RecordingSink::default();
        let (updater, _task) = ProgressUpdater::spawn(Box::new(sink.clone()), 512, INTERVAL);
        let sequences = Arc::new(SequenceCounter::new());

        let mut t1 = ProgressTracker::new(
            a,
            "progress",
            4096,
            pattern(),
            sequences.clone(),
            updater.clone(),
        );
        let mut t2 = ProgressTracker::new(
            b,
            "stdout",
            4096,
            pattern(),
            sequences.clone(),
            updater,
        );

        t1.poll_once().await.unwrap();
        t2.poll_once().await.unwrap();

        let s1 = t1.last_record().unwrap().sequence;
        let s2 = t2.last_record().unwrap().sequence;
        assert_ne!(s1, s2);
        assert_eq!(s1.min(s2), 0);
        assert_eq!(s1.max(s2), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn truncated_source_line_is_flagged_on_the_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("job.progress");

        let sink = RecordingSink::default();
        let (updater, _task) = ProgressUpdater::spawn(Box::new(sink.clone()), 512, INTERVAL);
        let mut tracker = ProgressTracker::new(
            path.clone(),
            "progress",
            // Tiny budget so the line splits; the first chunk still matches
            // the pattern.
            40,
            pattern(),
            Arc::new(SequenceCounter::new()),
            updater,
        );

        append(&path, &format!("progress: 10, {}\n", "x".repeat(80)));
        tracker.poll_once().await.unwrap();

        let last = tracker.last_record().unwrap();
        assert!(last.raw_truncated);
        assert_eq!(last.percent, Some(10.0));
    }
}
