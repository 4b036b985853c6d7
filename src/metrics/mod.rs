//! Built-in metrics for configuration operations.
//!
//! Provides OpenTelemetry metrics tracking, labelled by configuration name:
//! - Reload attempts/success/failures
//! - Reload duration
//! - Configuration age
//! - Active subscribers
//! - Validation failures
//!
//! # Examples
//!
//! ```rust,no_run
//! use livecfg::prelude::*;
//! use opentelemetry::global;
//!
//! # #[derive(Clone, serde::Serialize, serde::Deserialize)] struct AppConfig {}
//! # impl Configuration for AppConfig { fn config_file(&self) -> Option<&std::path::Path> { None } }
//! let manager: Manager<&'static str, AppConfig> = Manager::builder()
//!     .with_metrics(global::meter("my-app"))
//!     .build();
//! ```

mod config_metrics;

pub use config_metrics::ConfigMetrics;
