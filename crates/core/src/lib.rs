// crates/core/src/lib.rs
//! Core progress-tracking pipeline for the jobtail sidecar.
//!
//! Watches a job's output files as they grow, extracts `(percent, message)`
//! progress signals with a configurable regex, and relays them to a remote
//! scheduler endpoint: rate-limited, coalesced, and delivered through a
//! redirect-aware sink. One tokio task per watched location feeds a single
//! updater task; a shared atomic counter stamps every record with a
//! process-wide sequence number.

pub mod error;
pub mod extract;
pub mod reader;
pub mod record;
pub mod seq;
pub mod sink;
pub mod tracker;
pub mod updater;

pub use error::{DeliveryError, ReadError};
pub use extract::{extract_progress, ProgressMatch};
pub use reader::{LineReader, TailedLine};
pub use record::{ProgressPayload, ProgressRecord};
pub use seq::SequenceCounter;
pub use sink::{DeliverySink, RedirectSink, SimpleSink};
pub use tracker::{ProgressTracker, TrackerHandle, TrackerState};
pub use updater::ProgressUpdater;
