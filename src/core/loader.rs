//! Configuration loader that layers overlays on top of a candidate.

use crate::core::Configuration;
use crate::error::{ConfigError, Result};
use crate::sources::{ArgOverlay, ConfigSource, FileSnapshot, FileSource};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Result of loading a candidate.
pub(crate) struct Loaded<T> {
    /// The candidate with every overlay applied.
    pub(crate) config: T,
    /// The file content that was overlaid, if a file was read.
    pub(crate) snapshot: Option<FileSnapshot>,
}

/// Loads a candidate: argument overlay first, then the configuration file.
pub(crate) struct ConfigLoader {
    args: ArgOverlay,
}

impl ConfigLoader {
    /// Create a loader using the given argument overlay.
    pub(crate) fn new(args: ArgOverlay) -> Self {
        Self { args }
    }

    /// Overlay `candidate` with the command line, then with its file.
    ///
    /// The file path is read from the candidate after the argument overlay.
    /// Without a path, or with an unrecognized extension, the file step is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configured file cannot be read
    /// - The file or an argument value does not decode into `T`
    pub(crate) fn load<T>(&self, candidate: T) -> Result<Loaded<T>>
    where
        T: Configuration,
    {
        let overrides = self.args.resolve_or_exit();
        let candidate = if overrides.is_empty() {
            candidate
        } else {
            overlay(&candidate, &overrides)?
        };

        let Some(path) = candidate.config_file().map(|p| p.to_path_buf()) else {
            tracing::trace!("no configuration file set, skipping file overlay");
            return Ok(Loaded {
                config: candidate,
                snapshot: None,
            });
        };

        let source = FileSource::new(path);
        let Some(snapshot) = source.read()? else {
            tracing::debug!(
                path = %source.path().display(),
                "unrecognized configuration file extension, skipping file overlay"
            );
            return Ok(Loaded {
                config: candidate,
                snapshot: None,
            });
        };

        let config = overlay(&candidate, &snapshot)?;

        Ok(Loaded {
            config,
            snapshot: Some(snapshot),
        })
    }
}

/// Put `source` on top of `base` and deserialize the merged result.
///
/// `base` is serialized with serde, so fields marked `#[serde(skip)]` come
/// back as their `Default`.
pub(crate) fn overlay<T>(base: &T, source: &dyn ConfigSource) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut tree = serde_json::to_value(base).map_err(|e| {
        ConfigError::ParseError(format!("Failed to encode current configuration: {}", e))
    })?;

    source.overlay(&mut tree)?;

    serde_json::from_value(tree).map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize {}: {}", source.name(), e))
    })
}
