//! File watching for automatic configuration reloads.

use crate::error::{ConfigError, Result};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Environment variable whose presence means the process runs in Kubernetes.
pub const ORCHESTRATOR_ENV_VAR: &str = "KUBERNETES_PORT";

/// Entry recreated by Kubernetes when a ConfigMap or Secret volume is updated.
pub const VOLUME_MARKER: &str = "..data";

/// What a file watch subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchScope {
    /// Only the configuration file.
    File,
    /// The file and its parent directory, for volumes updated by swapping a
    /// directory entry rather than writing the file.
    FileAndParent,
}

impl WatchScope {
    /// `FileAndParent` when [`ORCHESTRATOR_ENV_VAR`] is set and non-empty.
    pub fn from_env() -> Self {
        match std::env::var_os(ORCHESTRATOR_ENV_VAR) {
            Some(value) if !value.is_empty() => Self::FileAndParent,
            _ => Self::File,
        }
    }
}

/// A filesystem event that calls for a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// The configuration file was written.
    Written,
    /// The configuration file was created.
    Created,
    /// The volume marker was recreated next to the configuration file.
    VolumeSwapped,
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Written => f.write_str("file changed"),
            Self::Created => f.write_str("file created"),
            Self::VolumeSwapped => f.write_str("configmap volume updated"),
        }
    }
}

/// Stream of qualifying change events for one configuration file.
///
/// Every qualifying event is yielded; nothing is debounced or coalesced.
///
/// # Examples
///
/// ```rust,no_run
/// use livecfg::notify::{FileWatchSource, WatchScope};
///
/// # async fn example() -> livecfg::error::Result<()> {
/// let mut source = FileWatchSource::new("/etc/my-service/config.yaml", WatchScope::from_env())?;
///
/// while let Some(event) = source.next().await {
///     println!("config: {}", event);
/// }
/// # Ok(())
/// # }
/// ```
pub struct FileWatchSource {
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    path: PathBuf,
    targets: Vec<PathBuf>,
    scope: WatchScope,
}

impl FileWatchSource {
    /// Start watching `path`.
    ///
    /// # Errors
    ///
    /// Returns `WatchSetup` if the watcher cannot be created or the file (or
    /// its directory, depending on `scope`) cannot be watched.
    pub fn new(path: impl AsRef<Path>, scope: WatchScope) -> Result<Self> {
        let path = std::path::absolute(path.as_ref()).map_err(|e| {
            ConfigError::WatchSetup(format!("Failed to resolve path {}: {}", path.as_ref().display(), e))
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })
        .map_err(|e| ConfigError::WatchSetup(format!("Failed to create file watcher: {}", e)))?;

        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| {
                ConfigError::WatchSetup(format!("Failed to watch {}: {}", path.display(), e))
            })?;

        if scope == WatchScope::FileAndParent {
            let dir = path.parent().ok_or_else(|| {
                ConfigError::WatchSetup(format!("{} has no parent directory", path.display()))
            })?;
            tracing::info!(dir = %dir.display(), "In kubernetes context, adding directory to watch list");
            watcher.watch(dir, RecursiveMode::NonRecursive).map_err(|e| {
                ConfigError::WatchSetup(format!("Failed to watch {}: {}", dir.display(), e))
            })?;
        }

        let mut targets = vec![path.clone()];
        if let Ok(canonical) = path.canonicalize() {
            if canonical != path {
                targets.push(canonical);
            }
        }

        tracing::debug!(path = %path.display(), ?scope, "Watching config file");

        Ok(Self {
            _watcher: watcher,
            events: rx,
            path,
            targets,
            scope,
        })
    }

    /// The watched file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The watch scope in effect.
    pub fn scope(&self) -> WatchScope {
        self.scope
    }

    /// Wait for the next qualifying event.
    ///
    /// Backend errors are logged and skipped. Returns `None` once the
    /// underlying watcher has shut down.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        while let Some(res) = self.events.recv().await {
            match res {
                Ok(event) => {
                    tracing::debug!(kind = ?event.kind, paths = ?event.paths, "fsnotify event");
                    if let Some(qualifying) = self.classify(&event) {
                        return Some(qualifying);
                    }
                }
                Err(err) => tracing::error!("fsnotify: {}", err),
            }
        }
        None
    }

    /// Decide whether `event` calls for a reload.
    ///
    /// A rename counts as a creation of its destination: Kubernetes swaps
    /// volumes by renaming onto `..data`, and editors save by renaming onto
    /// the file.
    pub fn classify(&self, event: &Event) -> Option<WatchEvent> {
        let (created, paths) = match event.kind {
            EventKind::Create(_) => (true, event.paths.as_slice()),
            // source first, destination second
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                (true, event.paths.get(1..).unwrap_or_default())
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => {
                (true, event.paths.as_slice())
            }
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any)
            | EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
                (false, event.paths.as_slice())
            }
            _ => return None,
        };

        for path in paths {
            if self.is_target(path) {
                return Some(if created {
                    WatchEvent::Created
                } else {
                    WatchEvent::Written
                });
            }
            if created && self.is_volume_marker(path) {
                return Some(WatchEvent::VolumeSwapped);
            }
        }

        None
    }

    fn is_target(&self, path: &Path) -> bool {
        self.targets.iter().any(|target| target == path)
    }

    fn is_volume_marker(&self, path: &Path) -> bool {
        path.file_name() == Some(OsStr::new(VOLUME_MARKER))
            && self
                .targets
                .iter()
                .any(|target| target.parent() == path.parent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn source_for(temp_dir: &TempDir) -> FileWatchSource {
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "port: 8080").unwrap();
        FileWatchSource::new(&config_path, WatchScope::File).unwrap()
    }

    #[tokio::test]
    async fn test_watch_file() {
        let temp_dir = TempDir::new().unwrap();
        let source = source_for(&temp_dir);
        assert!(source.path().ends_with("config.yaml"));
        assert_eq!(source.scope(), WatchScope::File);
    }

    #[tokio::test]
    async fn test_watch_nonexistent_file() {
        let result = FileWatchSource::new("/nonexistent/config.yaml", WatchScope::File);
        assert!(matches!(result, Err(ConfigError::WatchSetup(_))));
    }

    #[tokio::test]
    async fn test_classify_write_and_create() {
        let temp_dir = TempDir::new().unwrap();
        let source = source_for(&temp_dir);
        let path = source.path().to_path_buf();

        let write = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(path.clone());
        assert_eq!(source.classify(&write), Some(WatchEvent::Written));

        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
        assert_eq!(source.classify(&create), Some(WatchEvent::Created));

        let close = Event::new(EventKind::Access(AccessKind::Close(AccessMode::Write)))
            .add_path(path.clone());
        assert_eq!(source.classify(&close), Some(WatchEvent::Written));
    }

    #[tokio::test]
    async fn test_classify_ignores_unrelated_events() {
        let temp_dir = TempDir::new().unwrap();
        let source = source_for(&temp_dir);
        let path = source.path().to_path_buf();

        let metadata = Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)))
            .add_path(path.clone());
        assert_eq!(source.classify(&metadata), None);

        let sibling = Event::new(EventKind::Create(CreateKind::File))
            .add_path(temp_dir.path().join("other.yaml"));
        assert_eq!(source.classify(&sibling), None);

        let sibling_write = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any)))
            .add_path(temp_dir.path().join("other.yaml"));
        assert_eq!(source.classify(&sibling_write), None);
    }

    #[tokio::test]
    async fn test_classify_volume_marker() {
        let temp_dir = TempDir::new().unwrap();
        let source = source_for(&temp_dir);
        let dir = source.path().parent().unwrap().to_path_buf();

        let swap = Event::new(EventKind::Create(CreateKind::Any)).add_path(dir.join(VOLUME_MARKER));
        assert_eq!(source.classify(&swap), Some(WatchEvent::VolumeSwapped));

        let elsewhere = Event::new(EventKind::Create(CreateKind::Any))
            .add_path(PathBuf::from("/somewhere/else").join(VOLUME_MARKER));
        assert_eq!(source.classify(&elsewhere), None);

        let marker_write = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Any)))
            .add_path(dir.join(VOLUME_MARKER));
        assert_eq!(source.classify(&marker_write), None);
    }

    #[tokio::test]
    async fn test_file_change_yields_event() {
        let temp_dir = TempDir::new().unwrap();
        let mut source = source_for(&temp_dir);
        let config_path = source.path().to_path_buf();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            fs::write(&config_path, "port: 9090").unwrap();
        });

        let result = timeout(Duration::from_secs(5), source.next()).await;
        assert!(matches!(
            result,
            Ok(Some(WatchEvent::Written | WatchEvent::Created))
        ));
    }

    #[tokio::test]
    async fn test_classify_renames() {
        let temp_dir = TempDir::new().unwrap();
        let source = source_for(&temp_dir);
        let path = source.path().to_path_buf();
        let dir = path.parent().unwrap().to_path_buf();

        let swap = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(dir.join("..data_tmp"))
            .add_path(dir.join(VOLUME_MARKER));
        assert_eq!(source.classify(&swap), Some(WatchEvent::VolumeSwapped));

        let swap_to = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(dir.join(VOLUME_MARKER));
        assert_eq!(source.classify(&swap_to), Some(WatchEvent::VolumeSwapped));

        let saved = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(dir.join(".config.yaml.swp"))
            .add_path(path.clone());
        assert_eq!(source.classify(&saved), Some(WatchEvent::Created));

        // only the destination of a rename counts
        let moved_away = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(path.clone())
            .add_path(dir.join("config.yaml.bak"));
        assert_eq!(source.classify(&moved_away), None);

        let from = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From))).add_path(path);
        assert_eq!(source.classify(&from), None);
    }

    /// Lays out a Kubernetes volume version: `dir/<version>/config.yaml`.
    #[cfg(unix)]
    fn project(dir: &Path, version: &str, port: u16) {
        let data = dir.join(version);
        fs::create_dir(&data).unwrap();
        fs::write(data.join("config.yaml"), format!("port: {}\n", port)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_parent_scope_sees_volume_swap() {
        use std::os::unix::fs::symlink;

        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        project(&dir, "..2024_01_01", 8080);
        symlink("..2024_01_01", dir.join(VOLUME_MARKER)).unwrap();
        symlink("..data/config.yaml", dir.join("config.yaml")).unwrap();

        let mut source =
            FileWatchSource::new(dir.join("config.yaml"), WatchScope::FileAndParent).unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            project(&dir, "..2024_01_02", 9090);
            symlink("..2024_01_02", dir.join("..data_tmp")).unwrap();
            fs::rename(dir.join("..data_tmp"), dir.join(VOLUME_MARKER)).unwrap();
        });

        let result = timeout(Duration::from_secs(5), source.next()).await;
        assert_eq!(result.unwrap(), Some(WatchEvent::VolumeSwapped));
    }
}
