// crates/sidecar/src/config.rs
//! Environment-variable configuration for the sidecar.
//!
//! Resolved once at startup into an immutable [`Config`]; a missing
//! required variable is fatal and nothing is started. Numeric settings
//! are clamped to sane lower bounds rather than rejected.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use regex_lite::Regex;
use reqwest::Url;
use thiserror::Error;
use tracing::info;

/// Default name of the variable that points at the progress output file.
/// `PROGRESS_OUTPUT_FILE_ENV` can rename this indirection so executors
/// with a pre-existing convention can reuse it unchanged.
pub const DEFAULT_PROGRESS_OUTPUT_FILE_ENV: &str = "PROGRESS_OUTPUT_FILE";

const DEFAULT_PROGRESS_REGEX: &str = r"progress: ([0-9]*\.?[0-9]+), (.*)";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} not set in environment")]
    MissingVar { name: &'static str },

    #[error("{name} is not a valid integer: {value:?}")]
    InvalidNumber { name: String, value: String },

    #[error("progress regex {pattern:?} is invalid: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex_lite::Error,
    },

    #[error("progress callback URL is invalid: {url:?}")]
    InvalidUrl { url: String },
}

/// Immutable progress reporter configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where progress payloads are POSTed:
    /// `{SCHEDULER_REST_URL}/progress/{JOB_INSTANCE_ID}`.
    pub callback_url: Url,
    pub sandbox_directory: PathBuf,
    pub progress_output_file: PathBuf,
    /// Compiled extraction pattern, shared by every tracker.
    pub progress_regex: Arc<Regex>,
    pub max_bytes_read_per_line: usize,
    pub max_message_length: usize,
    pub sample_interval: Duration,
    /// Redirect budget for the resilient sink; 0 selects the simple
    /// fire-and-forget sink instead.
    pub max_post_redirect_follow: u32,
}

impl Config {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_map(&std::env::vars().collect())
    }

    /// Resolve configuration from an explicit environment map.
    pub fn from_map(env: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let instance_id = env
            .get("JOB_INSTANCE_ID")
            .ok_or(ConfigError::MissingVar {
                name: "JOB_INSTANCE_ID",
            })?
            .clone();
        let rest_url = env
            .get("SCHEDULER_REST_URL")
            .ok_or(ConfigError::MissingVar {
                name: "SCHEDULER_REST_URL",
            })?;

        let raw_callback = format!("{}/progress/{}", rest_url.trim_end_matches('/'), instance_id);
        let callback_url = Url::parse(&raw_callback).map_err(|_| ConfigError::InvalidUrl {
            url: raw_callback,
        })?;

        let sandbox_directory = PathBuf::from(env.get("JOB_SANDBOX_DIR").cloned().unwrap_or_default());

        // The progress file path goes through one level of indirection:
        // PROGRESS_OUTPUT_FILE_ENV names the variable that names the file.
        let progress_output_file_env = env
            .get("PROGRESS_OUTPUT_FILE_ENV")
            .cloned()
            .unwrap_or_else(|| DEFAULT_PROGRESS_OUTPUT_FILE_ENV.to_string());
        if !env.contains_key(&progress_output_file_env) {
            info!(
                variable = %progress_output_file_env,
                "no progress output file in the environment; using the default location"
            );
        }
        let default_progress_name = env
            .get("DEFAULT_PROGRESS_OUTPUT_NAME")
            .cloned()
            .unwrap_or_else(|| format!("{instance_id}.progress"));
        let progress_output_file = env
            .get(&progress_output_file_env)
            .map(PathBuf::from)
            .unwrap_or_else(|| sandbox_directory.join(default_progress_name));

        let pattern = env
            .get("PROGRESS_REGEX_STRING")
            .cloned()
            .unwrap_or_else(|| DEFAULT_PROGRESS_REGEX.to_string());
        let progress_regex = Regex::new(&pattern)
            .map(Arc::new)
            .map_err(|source| ConfigError::InvalidRegex { pattern, source })?;

        let max_bytes_read_per_line =
            parse_with_floor(env, "MAX_BYTES_READ_PER_LINE", 4096, 128)?;
        let max_message_length = parse_with_floor(env, "MAX_MESSAGE_LENGTH", 512, 64)?;
        let sample_interval_ms = parse_with_floor(env, "PROGRESS_SAMPLE_INTERVAL_MS", 1000, 100)?;
        let max_post_redirect_follow =
            parse_with_floor(env, "MAX_POST_REDIRECT_FOLLOW", 3, 0)? as u32;

        Ok(Self {
            callback_url,
            sandbox_directory,
            progress_output_file,
            progress_regex,
            max_bytes_read_per_line,
            max_message_length,
            sample_interval: Duration::from_millis(sample_interval_ms as u64),
            max_post_redirect_follow,
        })
    }

    pub fn stdout_file(&self) -> PathBuf {
        self.sandbox_directory.join("stdout")
    }

    pub fn stderr_file(&self) -> PathBuf {
        self.sandbox_directory.join("stderr")
    }

    /// The watched locations, each with its record tag.
    pub fn locations(&self) -> Vec<(PathBuf, &'static str)> {
        vec![
            (self.progress_output_file.clone(), "progress"),
            (self.stdout_file(), "stdout"),
            (self.stderr_file(), "stderr"),
        ]
    }

    pub fn log_summary(&self) {
        info!(callback_url = %self.callback_url, "progress update callback configured");
        info!(path = %self.progress_output_file.display(), "progress output file");
        info!(pattern = %self.progress_regex.as_str(), "progress regex");
        info!(
            max_bytes_read_per_line = self.max_bytes_read_per_line,
            max_message_length = self.max_message_length,
            sample_interval_ms = self.sample_interval.as_millis() as u64,
            max_post_redirect_follow = self.max_post_redirect_follow,
            "progress reporter limits"
        );
    }
}

fn parse_with_floor(
    env: &HashMap<String, String>,
    name: &str,
    default: usize,
    floor: usize,
) -> Result<usize, ConfigError> {
    match env.get(name) {
        None => Ok(default),
        Some(value) => value
            .parse::<usize>()
            .map(|v| v.max(floor))
            .map_err(|_| ConfigError::InvalidNumber {
                name: name.to_string(),
                value: value.clone(),
            }),
    }
}
