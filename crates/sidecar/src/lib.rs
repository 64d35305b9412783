// crates/sidecar/src/lib.rs
//! jobtail sidecar: configuration and driver wiring around the
//! `jobtail-core` progress pipeline.

pub mod config;
pub mod runtime;

pub use config::{Config, ConfigError};
pub use runtime::{run, Sidecar};
