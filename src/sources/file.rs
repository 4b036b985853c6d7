//! File-based configuration overlay.

use super::{ConfigSource, merge};
use crate::error::{ConfigError, Result};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

/// Format of a configuration file, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    /// `.yaml`, `.yml`, or no extension at all.
    Yaml,
    /// `.json`, `.json5`. Comments and trailing commas are accepted.
    Json,
    /// `.toml`
    Toml,
}

impl FileFormat {
    /// Detect the format of `path` from its extension.
    ///
    /// Matching is case-insensitive. Returns `None` for an unrecognized
    /// extension or for a format whose cargo feature is disabled; such a file
    /// contributes nothing to the configuration.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use livecfg::sources::FileFormat;
    /// use std::path::Path;
    ///
    /// assert_eq!(FileFormat::from_path(Path::new("app.yml")), Some(FileFormat::Yaml));
    /// assert_eq!(FileFormat::from_path(Path::new("app.ini")), None);
    /// ```
    pub fn from_path(path: &Path) -> Option<Self> {
        let format = match path.extension() {
            None => Self::Yaml,
            Some(ext) => match ext.to_str()?.to_ascii_lowercase().as_str() {
                "yaml" | "yml" => Self::Yaml,
                "json" | "json5" => Self::Json,
                "toml" => Self::Toml,
                _ => return None,
            },
        };

        format.is_enabled().then_some(format)
    }

    /// Whether support for this format was compiled in.
    pub fn is_enabled(self) -> bool {
        match self {
            Self::Yaml => cfg!(feature = "yaml"),
            Self::Json => cfg!(feature = "json"),
            Self::Toml => cfg!(feature = "toml"),
        }
    }

    /// Decode `text` into a value tree.
    #[allow(unused_variables)]
    fn decode(self, text: &str) -> std::result::Result<Value, String> {
        match self {
            #[cfg(feature = "yaml")]
            Self::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
            #[cfg(feature = "json")]
            Self::Json => json5::from_str(text).map_err(|e| e.to_string()),
            #[cfg(feature = "toml")]
            Self::Toml => toml::from_str(text).map_err(|e| e.to_string()),
            #[allow(unreachable_patterns)]
            _ => Err(format!("Format {} is not enabled", self)),
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yaml => f.write_str("yaml"),
            Self::Json => f.write_str("json"),
            Self::Toml => f.write_str("toml"),
        }
    }
}

/// A configuration file path together with its detected format.
///
/// # Examples
///
/// ```rust,no_run
/// use livecfg::sources::FileSource;
///
/// let source = FileSource::new("config/app.yaml");
/// if let Some(snapshot) = source.read()? {
///     println!("read {} bytes", snapshot.text().len());
/// }
/// # Ok::<(), livecfg::error::ConfigError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    format: Option<FileFormat>,
}

impl FileSource {
    /// Create a file source; the format is detected from the extension.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = FileFormat::from_path(&path);
        Self { path, format }
    }

    /// The file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The detected format, `None` when the file is not decoded at all.
    pub fn format(&self) -> Option<FileFormat> {
        self.format
    }

    /// Read the file content.
    ///
    /// Returns `Ok(None)` without touching the filesystem when the extension
    /// is not recognized.
    ///
    /// # Errors
    ///
    /// Returns `LoadError` if the file is missing, unreadable, not UTF-8 or empty.
    pub fn read(&self) -> Result<Option<FileSnapshot>> {
        let Some(format) = self.format else {
            return Ok(None);
        };

        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            ConfigError::LoadError(format!("Failed to read {}: {}", self.path.display(), e))
        })?;

        // An in-place rewrite truncates before writing, an empty read is never final content.
        if text.trim().is_empty() {
            return Err(ConfigError::LoadError(format!(
                "Configuration file is empty: {}",
                self.path.display()
            )));
        }

        Ok(Some(FileSnapshot {
            path: self.path.clone(),
            format,
            text,
        }))
    }
}

/// Content of a configuration file as read at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    path: PathBuf,
    format: FileFormat,
    text: String,
}

impl FileSnapshot {
    /// Raw file text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Format the text is decoded with.
    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Path the text was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileSnapshot {
    fn overlay(&self, tree: &mut Value) -> Result<()> {
        let layer = self.format.decode(&self.text).map_err(|e| {
            ConfigError::ParseError(format!("Failed to decode {}: {}", self.path.display(), e))
        })?;

        // a document holding only comments
        if layer.is_null() {
            tracing::debug!(path = %self.path.display(), "configuration file has no values");
            return Ok(());
        }

        merge(tree, layer);
        Ok(())
    }

    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_detect_yaml() {
        assert_eq!(FileFormat::from_path(Path::new("config.yaml")), Some(FileFormat::Yaml));
        assert_eq!(FileFormat::from_path(Path::new("config.yml")), Some(FileFormat::Yaml));
        assert_eq!(FileFormat::from_path(Path::new("config.YAML")), Some(FileFormat::Yaml));
    }

    #[test]
    fn test_detect_without_extension_is_yaml() {
        assert_eq!(FileFormat::from_path(Path::new("/etc/app/config")), Some(FileFormat::Yaml));
    }

    #[test]
    fn test_detect_json_and_toml() {
        assert_eq!(FileFormat::from_path(Path::new("config.json")), Some(FileFormat::Json));
        assert_eq!(FileFormat::from_path(Path::new("config.json5")), Some(FileFormat::Json));
        assert_eq!(FileFormat::from_path(Path::new("config.toml")), Some(FileFormat::Toml));
    }

    #[test]
    fn test_detect_unknown() {
        assert_eq!(FileFormat::from_path(Path::new("config.ini")), None);
        assert_eq!(FileFormat::from_path(Path::new("config.txt")), None);
    }

    proptest! {
        #[test]
        fn test_unknown_extensions_are_skipped(ext in "[a-z]{1,6}") {
            prop_assume!(!["yaml", "yml", "json", "json5", "toml"].contains(&ext.as_str()));
            let path = PathBuf::from(format!("config.{}", ext));
            prop_assert_eq!(FileFormat::from_path(&path), None);
        }
    }

    #[test]
    fn test_read_unknown_extension_skips_io() {
        let source = FileSource::new("/nonexistent/config.ini");
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn test_read_missing_file() {
        let source = FileSource::new("/nonexistent/config.yaml");
        let err = source.read().unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)));
    }

    #[test]
    fn test_read_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "  \n").unwrap();

        let err = FileSource::new(&config_path).read().unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_read_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "port: 8080\n").unwrap();

        let snapshot = FileSource::new(&config_path).read().unwrap().unwrap();
        assert_eq!(snapshot.format(), FileFormat::Yaml);
        assert_eq!(snapshot.text(), "port: 8080\n");
        assert!(snapshot.name().contains("config.yaml"));
    }

    fn overlay_file(name: &str, text: &str, tree: &mut Value) -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(name);
        fs::write(&config_path, text).unwrap();
        FileSource::new(&config_path).read().unwrap().unwrap().overlay(tree)
    }

    #[test]
    fn test_overlay_each_format() {
        let mut tree = serde_json::json!({"server": {"host": "localhost", "port": 8080}});

        overlay_file("a.yaml", "server:\n  port: 1\n", &mut tree).unwrap();
        assert_eq!(tree["server"]["port"], 1);

        overlay_file("b.toml", "[server]\nport = 2\n", &mut tree).unwrap();
        assert_eq!(tree["server"]["port"], 2);

        overlay_file("c.json", "{ // relaxed\n \"server\": { \"port\": 3, }, }", &mut tree).unwrap();
        assert_eq!(tree["server"]["port"], 3);

        assert_eq!(tree["server"]["host"], "localhost");
    }

    #[test]
    fn test_overlay_comment_only_yaml_is_empty() {
        let mut tree = serde_json::json!({"port": 8080});
        overlay_file("config.yaml", "# nothing set yet\n", &mut tree).unwrap();
        assert_eq!(tree, serde_json::json!({"port": 8080}));
    }

    #[test]
    fn test_overlay_keeps_unsigned_range() {
        let mut tree = serde_json::json!({"limit": 1});
        overlay_file("config.yaml", "limit: 18446744073709551615\n", &mut tree).unwrap();
        assert_eq!(tree["limit"].as_u64(), Some(u64::MAX));
    }

    #[test]
    fn test_overlay_undecodable_text() {
        let mut tree = serde_json::json!({});
        let err = overlay_file("config.toml", "port = [\n", &mut tree).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
