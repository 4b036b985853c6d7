//! # livecfg
//!
//! Live configuration for long-running services.
//!
//! ## Overview
//!
//! `livecfg` keeps typed configurations current while a process runs:
//! - Each configuration is registered under a name with a [`Manager`](core::Manager)
//! - Command-line arguments and a YAML, JSON or TOML file are overlaid on a seed value
//! - Validators and appliers registered per name decide whether a candidate is committed
//! - The file is watched; every change reruns load, validate and apply
//! - Committed values are published atomically and broadcast to subscribers
//!
//! A value that failed validation or application is never observable: readers
//! keep the last committed value.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use livecfg::prelude::*;
//! use serde::{Deserialize, Serialize};
//! use std::path::{Path, PathBuf};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! #[serde(default)]
//! struct ServerConfig {
//!     config: Option<PathBuf>,
//!     port: u16,
//!     workers: usize,
//! }
//!
//! impl Configuration for ServerConfig {
//!     fn config_file(&self) -> Option<&Path> {
//!         self.config.as_deref()
//!     }
//! }
//!
//! # async fn example() -> livecfg::error::Result<()> {
//! let manager: Manager<&'static str, ServerConfig> = Manager::new();
//!
//! // The port can never change once the server is up
//! manager.add_validator("server", |prior: Option<&ServerConfig>, next: &ServerConfig| {
//!     match prior {
//!         Some(prior) if prior.port != next.port => vec![ValidationError::immutable("port")],
//!         _ => Vec::new(),
//!     }
//! });
//!
//! let args = ArgOverlay::new("server")
//!     .arg(ArgSpec::value("config", "config").short('c').help("Configuration file"))
//!     .arg(ArgSpec::value("workers", "workers").help("Worker threads"));
//!
//! manager
//!     .register_with("server", ServerConfig::default(), RegisterOptions::new().with_args(args))
//!     .await?;
//!
//! // Lock-free read of the current value
//! let cfg = manager.get("server").expect("registered");
//! println!("Port: {}", cfg.port);
//!
//! // Every later commit
//! let mut updates = manager.subscribe("server");
//! while let Some(cfg) = updates.recv().await {
//!     println!("Workers: {}", cfg.workers);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `yaml`, `json`, `toml` (default): file formats, selected by extension
//! - `metrics`: OpenTelemetry reload metrics

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod notify;
pub mod sources;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{Applier, Configuration, Manager, ManagerBuilder, RegisterOptions, Validator};
    pub use crate::error::{ApplyError, ConfigError, Result, ValidationError};
    pub use crate::notify::{BroadcastPolicy, Subscription, WatchScope};
    pub use crate::sources::{ArgOverlay, ArgSpec};
}
