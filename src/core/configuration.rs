//! The capability set a configuration type provides.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// A configuration value managed by a [`Manager`](crate::core::Manager).
///
/// `Clone` is the copy step of the reload protocol: the candidate is derived
/// from the current value with `clone()`, so a configuration must not share
/// mutable state between clones.
///
/// Overlays go through serde. The candidate is serialized, the argument and
/// file layers are merged on top and the result is deserialized again.
/// Fields marked `#[serde(skip)]` come back as their `Default`.
///
/// # Examples
///
/// ```rust
/// use livecfg::core::Configuration;
/// use serde::{Deserialize, Serialize};
/// use std::path::{Path, PathBuf};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// #[serde(default)]
/// struct AppConfig {
///     file: Option<PathBuf>,
///     port: u16,
/// }
///
/// impl Configuration for AppConfig {
///     fn config_file(&self) -> Option<&Path> {
///         self.file.as_deref()
///     }
/// }
/// ```
pub trait Configuration: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Path of the file backing this configuration, if any.
    ///
    /// Read after the argument overlay, so a `--config` option can set it.
    fn config_file(&self) -> Option<&Path>;
}
