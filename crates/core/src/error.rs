// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while tailing a watched file.
///
/// "File not found" and "file shrank" are expected conditions handled
/// inside [`crate::reader::LineReader`] and never surface here; anything
/// that does surface stops the affected tracker only.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Permission denied reading file: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReadError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Io { path, source },
        }
    }
}

/// Errors that can occur while delivering a progress payload.
///
/// Every variant is terminal for the sample being sent: the updater logs
/// it and moves on, and the redirect-aware sink resets its current URL to
/// the default before returning one of these.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Progress callback request failed: {source}")]
    Network {
        #[source]
        source: reqwest::Error,
    },

    #[error("Progress callback returned unexpected status {status}")]
    UnexpectedStatus { status: u16 },

    #[error("Redirect response missing a Location header")]
    MissingLocation,

    #[error("Redirect target is not a valid URL: {location}")]
    InvalidLocation { location: String },

    #[error("Redirect budget exhausted after {attempts} attempts")]
    RedirectBudgetExhausted { attempts: u32 },
}
