//! The registry of named configurations.

use crate::core::watcher::{ConfigWatcher, ReloadStage, Trigger};
use crate::core::{Applier, Chain, ConfigLoader, Configuration, Validator};
use crate::error::{ConfigError, Result};
use crate::notify::subscriber::deliver;
use crate::notify::{BroadcastPolicy, Broadcaster, Delivery, FileWatchSource, Subscription, WatchScope};
use crate::sources::ArgOverlay;
use parking_lot::RwLock;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::Debug;
use std::hash::Hash;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use crate::metrics::ConfigMetrics;

/// Identity of a registered configuration.
///
/// Implemented for every type with the required bounds. A closed enum makes
/// a good name type:
///
/// ```rust
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum Subsystem {
///     Http,
///     Storage,
/// }
/// ```
pub trait ConfigName: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<K> ConfigName for K where K: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Settings shared by every name of a manager.
#[derive(Debug, Clone)]
pub(crate) struct ManagerOptions {
    pub(crate) broadcast: BroadcastPolicy,
    pub(crate) watch_scope: Option<WatchScope>,
    pub(crate) skip_unchanged: bool,
    pub(crate) exit_on_watch_failure: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            broadcast: BroadcastPolicy::default(),
            watch_scope: None,
            skip_unchanged: true,
            exit_on_watch_failure: true,
        }
    }
}

struct Registry<K, T> {
    watchers: HashMap<K, Arc<ConfigWatcher<K, T>>>,
    subscribers: HashMap<K, Broadcaster<T>>,
    chains: HashMap<K, Chain<T>>,
}

impl<K, T> Default for Registry<K, T> {
    fn default() -> Self {
        Self {
            watchers: HashMap::new(),
            subscribers: HashMap::new(),
            chains: HashMap::new(),
        }
    }
}

/// State shared between the manager handles and the watch tasks.
///
/// The registry lock is never held across an `.await`.
pub(crate) struct Shared<K, T> {
    registry: RwLock<Registry<K, T>>,
    options: ManagerOptions,
    root: CancellationToken,
    #[cfg(feature = "metrics")]
    metrics: Option<ConfigMetrics>,
}

impl<K, T> Shared<K, T>
where
    K: ConfigName,
    T: Configuration,
{
    pub(crate) fn options(&self) -> &ManagerOptions {
        &self.options
    }

    #[cfg(feature = "metrics")]
    pub(crate) fn metrics(&self) -> Option<&ConfigMetrics> {
        self.metrics.as_ref()
    }

    /// Snapshot of the validators and appliers registered for `name`.
    pub(crate) fn chain(&self, name: &K) -> Chain<T> {
        self.registry
            .read()
            .chains
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Deliver `value` to the subscribers of `name`, in subscription order.
    pub(crate) async fn broadcast(
        &self,
        name: &K,
        value: &Arc<T>,
        cancel: &CancellationToken,
    ) -> Delivery {
        let senders = {
            let registry = self.registry.read();
            match registry.subscribers.get(name) {
                Some(broadcaster) => broadcaster.senders(),
                None => return Delivery::default(),
            }
        };

        let delivery = deliver(&senders, value, &self.options.broadcast, cancel).await;

        if delivery.closed > 0 {
            let mut registry = self.registry.write();
            if let Some(broadcaster) = registry.subscribers.get_mut(name) {
                broadcaster.prune();
                self.record_subscribers(name, broadcaster.len());
            }
        }

        delivery
    }

    /// Drop the subscriber channels of `name`; receivers observe the end of
    /// the stream.
    pub(crate) fn close_subscribers(&self, name: &K) {
        let removed = self.registry.write().subscribers.remove(name);
        if let Some(broadcaster) = removed {
            tracing::debug!(config = ?name, subscribers = broadcaster.len(), "closing subscriber channels");
            self.record_subscribers(name, 0);
        }
    }

    #[allow(unused_variables)]
    fn record_subscribers(&self, name: &K, count: usize) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.update_subscriber_count(&format!("{:?}", name), count);
        }
    }
}

/// Builder for a [`Manager`].
///
/// # Examples
///
/// ```rust
/// use livecfg::prelude::*;
/// use std::time::Duration;
///
/// # #[derive(Clone, serde::Serialize, serde::Deserialize)] struct AppConfig {}
/// # impl Configuration for AppConfig { fn config_file(&self) -> Option<&std::path::Path> { None } }
/// let manager: Manager<&'static str, AppConfig> = Manager::builder()
///     .subscriber_capacity(4)
///     .send_timeout(Some(Duration::from_secs(1)))
///     .watch_scope(WatchScope::File)
///     .build();
/// ```
#[derive(Default)]
pub struct ManagerBuilder {
    options: ManagerOptions,
    #[cfg(feature = "metrics")]
    metrics: Option<ConfigMetrics>,
}

impl ManagerBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set buffering and back-pressure for subscriber channels.
    pub fn broadcast_policy(mut self, policy: BroadcastPolicy) -> Self {
        self.options.broadcast = policy;
        self
    }

    /// Number of values buffered per subscriber.
    pub fn subscriber_capacity(mut self, capacity: usize) -> Self {
        self.options.broadcast.capacity = capacity.max(1);
        self
    }

    /// How long a broadcast waits on a full subscriber; `None` waits forever.
    pub fn send_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.broadcast.send_timeout = timeout;
        self
    }

    /// Pin the watch scope instead of detecting it from the environment.
    pub fn watch_scope(mut self, scope: WatchScope) -> Self {
        self.options.watch_scope = Some(scope);
        self
    }

    /// Skip file-triggered reloads whose content equals the last commit.
    ///
    /// Enabled by default. One write usually produces several filesystem
    /// events; with the skip, subscribers see one value per distinct content.
    /// Disabled, every qualifying event runs the validators and appliers
    /// again and broadcasts its result, even when nothing changed. Manual
    /// reloads are never skipped.
    pub fn skip_unchanged(mut self, skip: bool) -> Self {
        self.options.skip_unchanged = skip;
        self
    }

    /// Terminate the process when a file watch cannot be set up.
    ///
    /// Enabled by default: without a watch the configuration would silently
    /// stop following its file. The failure is logged and the process exits
    /// with status 1. Disabled, [`Manager::register`] returns
    /// [`ConfigError::WatchSetup`] and rolls the registration back.
    pub fn exit_on_watch_failure(mut self, exit: bool) -> Self {
        self.options.exit_on_watch_failure = exit;
        self
    }

    /// Record reload metrics with the given meter.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, meter: opentelemetry::metrics::Meter) -> Self {
        self.metrics = Some(ConfigMetrics::new(meter));
        self
    }

    /// Build the manager.
    pub fn build<K, T>(self) -> Manager<K, T>
    where
        K: ConfigName,
        T: Configuration,
    {
        Manager {
            shared: Arc::new(Shared {
                registry: RwLock::new(Registry::default()),
                options: self.options,
                root: CancellationToken::new(),
                #[cfg(feature = "metrics")]
                metrics: self.metrics,
            }),
        }
    }
}

/// Per-registration settings.
///
/// # Examples
///
/// ```rust
/// use livecfg::prelude::*;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// let options = RegisterOptions::new()
///     .with_args(ArgOverlay::new("server").arg(ArgSpec::value("port", "port").short('p')))
///     .with_cancellation(token.clone());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    args: ArgOverlay,
    cancel: Option<CancellationToken>,
}

impl RegisterOptions {
    /// Options with no argument overlay, cancelled only by
    /// [`Manager::shutdown`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay command-line arguments before the file on every load.
    pub fn with_args(mut self, args: ArgOverlay) -> Self {
        self.args = args;
        self
    }

    /// Stop watching when `token` is cancelled.
    ///
    /// The subscribers of the name are closed on cancellation, whether or not
    /// the name has a file to watch.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Registry of named live configurations.
///
/// Each name owns a current value, a reload pipeline and, when the value has
/// a backing file, a background task reloading it on change. Cloning a
/// manager is cheap; clones share the registry.
///
/// # Examples
///
/// ```rust,no_run
/// use livecfg::prelude::*;
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
///
/// # async fn example() -> Result<()> {
/// let manager: Manager<&'static str, AppConfig> = Manager::new();
///
/// manager.add_validator("app", |_: Option<&AppConfig>, next: &AppConfig| {
///     if next.port == 0 {
///         vec![ValidationError::invalid_field("port", "must be non-zero")]
///     } else {
///         Vec::new()
///     }
/// });
///
/// let initial = AppConfig {
///     file: Some("config/app.yaml".into()),
///     ..Default::default()
/// };
/// manager.register("app", initial).await?;
///
/// let mut updates = manager.subscribe("app");
/// while let Some(config) = updates.recv().await {
///     println!("now listening on {}", config.port);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Manager<K, T> {
    shared: Arc<Shared<K, T>>,
}

impl<K, T> Clone for Manager<K, T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Manager<(), ()> {
    /// Start building a manager with custom settings.
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }
}

impl<K, T> Default for Manager<K, T>
where
    K: ConfigName,
    T: Configuration,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> Manager<K, T>
where
    K: ConfigName,
    T: Configuration,
{
    /// Create a manager with default settings.
    pub fn new() -> Self {
        ManagerBuilder::new().build()
    }

    /// Register `name` with default options.
    ///
    /// See [`register_with`](Self::register_with).
    pub async fn register(&self, name: K, initial: T) -> Result<Arc<T>> {
        self.register_with(name, initial, RegisterOptions::default())
            .await
    }

    /// Register `name`, load and commit its first value and start watching
    /// its file.
    ///
    /// `initial` is the seed of the first load: the argument overlay and the
    /// file are applied on top of it, then the validators and appliers
    /// registered for `name` run with no prior value. Nothing is broadcast
    /// for the first value.
    ///
    /// When the committed value has no file path, no watch task is started.
    /// On any failure the registration is rolled back and `name` can be
    /// registered again.
    ///
    /// A file watch that cannot be set up terminates the process unless the
    /// manager was built with
    /// [`exit_on_watch_failure(false)`](ManagerBuilder::exit_on_watch_failure).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `name` is already registered ([`ConfigError::DuplicateName`])
    /// - The file cannot be read or decoded
    /// - Validation or application of the first value fails
    /// - The file watch cannot be set up and exiting is disabled
    ///   ([`ConfigError::WatchSetup`])
    pub async fn register_with(&self, name: K, initial: T, options: RegisterOptions) -> Result<Arc<T>> {
        let RegisterOptions { args, cancel } = options;

        let watcher = Arc::new(ConfigWatcher::new(
            name.clone(),
            ConfigLoader::new(args),
            self.shared.root.child_token(),
        ));

        {
            let mut registry = self.shared.registry.write();
            match registry.watchers.entry(name.clone()) {
                Entry::Occupied(_) => return Err(ConfigError::DuplicateName(format!("{:?}", name))),
                Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(&watcher));
                }
            }
        }

        match self.start(&watcher, initial, cancel).await {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::error!(config = %watcher.label(), "registration failed: {}", e);
                watcher.cancel_token().cancel();
                self.shared.registry.write().watchers.remove(&name);
                Err(e)
            }
        }
    }

    async fn start(
        &self,
        watcher: &Arc<ConfigWatcher<K, T>>,
        initial: T,
        external: Option<CancellationToken>,
    ) -> Result<Arc<T>> {
        let value = watcher.initialize(&self.shared, initial).await?;

        let Some(path) = value.config_file().map(Path::to_path_buf) else {
            tracing::info!(config = %watcher.label(), "no configuration file, not watching");
            if let Some(external) = external {
                forward_cancellation(external, watcher.cancel_token().clone());
            }
            watcher.spawn_close_on_cancel(&self.shared);
            return Ok(value);
        };

        let scope = self
            .shared
            .options
            .watch_scope
            .unwrap_or_else(WatchScope::from_env);
        let source = match FileWatchSource::new(&path, scope) {
            Ok(source) => source,
            Err(e) if self.shared.options.exit_on_watch_failure => {
                tracing::error!(config = %watcher.label(), "{}", e);
                eprintln!("{}", e);
                std::process::exit(1);
            }
            Err(e) => return Err(e),
        };

        if let Some(external) = external {
            forward_cancellation(external, watcher.cancel_token().clone());
        }
        watcher.spawn_watch(Arc::clone(&self.shared), source);
        tracing::info!(
            config = %watcher.label(),
            path = %path.display(),
            ?scope,
            "watching configuration file"
        );

        Ok(value)
    }

    /// The current configuration of `name`.
    ///
    /// Returns `None` until the first value of `name` is committed.
    pub fn get<Q>(&self, name: &Q) -> Option<Arc<T>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shared.registry.read().watchers.get(name)?.current()
    }

    /// Receive every value committed for `name` from now on.
    ///
    /// `name` does not have to be registered yet. Once the watch of `name`
    /// has stopped, the returned subscription is already closed.
    pub fn subscribe(&self, name: K) -> Subscription<T> {
        let mut registry = self.shared.registry.write();

        if registry.watchers.get(&name).is_some_and(|w| w.is_stopped()) {
            return Subscription::closed();
        }

        let broadcaster = registry.subscribers.entry(name.clone()).or_default();
        let subscription = broadcaster.subscribe(self.shared.options.broadcast.capacity);
        let count = broadcaster.len();
        drop(registry);

        self.shared.record_subscribers(&name, count);
        subscription
    }

    /// Number of subscribers of `name`, including dropped ones not pruned yet.
    pub fn subscriber_count<Q>(&self, name: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shared
            .registry
            .read()
            .subscribers
            .get(name)
            .map_or(0, Broadcaster::len)
    }

    /// Append a validator to the chain of `name`.
    ///
    /// The chain is used by every later load of `name`, the registration
    /// pass included.
    pub fn add_validator<V>(&self, name: K, validator: V)
    where
        V: Validator<T> + 'static,
    {
        self.add_validators(name, [validator]);
    }

    /// Append validators to the chain of `name`, in order.
    pub fn add_validators<I, V>(&self, name: K, validators: I)
    where
        I: IntoIterator<Item = V>,
        V: Validator<T> + 'static,
    {
        let mut registry = self.shared.registry.write();
        let chain = registry.chains.entry(name).or_default();
        for validator in validators {
            chain.push_validator(Arc::new(validator));
        }
    }

    /// Append an applier to the chain of `name`.
    pub fn add_applier<A>(&self, name: K, applier: A)
    where
        A: Applier<T> + 'static,
    {
        self.add_appliers(name, [applier]);
    }

    /// Append appliers to the chain of `name`, in order.
    pub fn add_appliers<I, A>(&self, name: K, appliers: I)
    where
        I: IntoIterator<Item = A>,
        A: Applier<T> + 'static,
    {
        let mut registry = self.shared.registry.write();
        let chain = registry.chains.entry(name).or_default();
        for applier in appliers {
            chain.push_applier(Arc::new(applier));
        }
    }

    /// Reload `name` now and return the outcome.
    ///
    /// Runs the same pipeline as a file change. Unlike a file-triggered
    /// reload, the error is returned to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotRegistered`] for an unknown name, otherwise
    /// the load, validation or apply error. The current value is kept on
    /// error.
    pub async fn reload<Q>(&self, name: &Q) -> Result<Arc<T>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + Debug + ?Sized,
    {
        let watcher = self.watcher(name)?;
        watcher.reload(&self.shared, Trigger::Manual).await
    }

    /// Validate, apply and commit `value` as the configuration of `name`.
    ///
    /// The argument overlay and the file are not consulted.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotRegistered`] for an unknown name, otherwise
    /// the validation or apply error.
    pub async fn update<Q>(&self, name: &Q, value: T) -> Result<Arc<T>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + Debug + ?Sized,
    {
        let watcher = self.watcher(name)?;
        watcher.update(&self.shared, value).await
    }

    /// Whether a watch task is running for `name`.
    pub fn is_watching<Q>(&self, name: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shared
            .registry
            .read()
            .watchers
            .get(name)
            .is_some_and(|w| w.is_watching())
    }

    /// Stage of the latest reload of `name`.
    pub fn stage<Q>(&self, name: &Q) -> Option<ReloadStage>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shared
            .registry
            .read()
            .watchers
            .get(name)
            .map(|w| w.stage())
    }

    /// Registered names, in no particular order.
    pub fn names(&self) -> Vec<K> {
        self.shared.registry.read().watchers.keys().cloned().collect()
    }

    /// Stop every watch task and close every subscriber channel.
    ///
    /// Current values stay readable with [`get`](Self::get).
    pub fn shutdown(&self) {
        self.shared.root.cancel();
        let watchers: Vec<_> = self.shared.registry.read().watchers.values().cloned().collect();
        for watcher in watchers {
            watcher.stop(&self.shared);
        }
        tracing::info!("configuration manager shut down");
    }

    fn watcher<Q>(&self, name: &Q) -> Result<Arc<ConfigWatcher<K, T>>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + Debug + ?Sized,
    {
        self.shared
            .registry
            .read()
            .watchers
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::NotRegistered(format!("{:?}", name)))
    }
}

/// Cancel `target` when `source` is cancelled.
fn forward_cancellation(source: CancellationToken, target: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = source.cancelled() => target.cancel(),
            _ = target.cancelled() => {}
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use serde::{Deserialize, Serialize};
    use std::path::PathBuf;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct TestConfig {
        file: Option<PathBuf>,
        port: u16,
    }

    impl Configuration for TestConfig {
        fn config_file(&self) -> Option<&Path> {
            self.file.as_deref()
        }
    }

    fn config(port: u16) -> TestConfig {
        TestConfig { file: None, port }
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let manager: Manager<&str, TestConfig> = Manager::new();
        assert!(manager.get("app").is_none());

        manager.register("app", config(8080)).await.unwrap();

        assert_eq!(manager.get("app").unwrap().port, 8080);
        assert_eq!(manager.stage("app"), Some(ReloadStage::Committed));
        assert!(!manager.is_watching("app"));
        assert_eq!(manager.names(), vec!["app"]);
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let manager: Manager<String, TestConfig> = Manager::new();
        manager.register("app".to_string(), config(1)).await.unwrap();

        let err = manager
            .register("app".to_string(), config(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName(_)));
        assert_eq!(manager.get("app").unwrap().port, 1);
    }

    #[tokio::test]
    async fn test_failed_registration_rolls_back() {
        let manager: Manager<&str, TestConfig> = Manager::new();
        manager.add_validator("app", |_: Option<&TestConfig>, next: &TestConfig| {
            if next.port == 0 {
                vec![ValidationError::invalid_field("port", "must be non-zero")]
            } else {
                Vec::new()
            }
        });

        let err = manager.register("app", config(0)).await.unwrap_err();
        assert_eq!(err.validation_errors().len(), 1);
        assert!(manager.get("app").is_none());
        assert!(manager.names().is_empty());

        manager.register("app", config(80)).await.unwrap();
        assert_eq!(manager.get("app").unwrap().port, 80);
    }

    #[tokio::test]
    async fn test_unknown_name() {
        let manager: Manager<&str, TestConfig> = Manager::new();

        assert!(matches!(
            manager.reload("missing").await,
            Err(ConfigError::NotRegistered(_))
        ));
        assert!(matches!(
            manager.update("missing", config(1)).await,
            Err(ConfigError::NotRegistered(_))
        ));
        assert_eq!(manager.stage("missing"), None);
        assert_eq!(manager.subscriber_count("missing"), 0);
    }

    #[tokio::test]
    async fn test_update_broadcasts_to_subscribers() {
        let manager: Manager<&str, TestConfig> = Manager::new();
        let mut early = manager.subscribe("app");
        manager.register("app", config(1)).await.unwrap();
        let mut late = manager.subscribe("app");
        assert_eq!(manager.subscriber_count("app"), 2);

        // registration does not broadcast
        assert!(early.try_recv().is_none());

        manager.update("app", config(2)).await.unwrap();

        assert_eq!(early.recv().await.unwrap().port, 2);
        assert_eq!(late.recv().await.unwrap().port, 2);
        assert_eq!(manager.get("app").unwrap().port, 2);
    }

    #[tokio::test]
    async fn test_shutdown_closes_subscribers() {
        let manager: Manager<&str, TestConfig> = Manager::new();
        manager.register("app", config(1)).await.unwrap();
        let mut sub = manager.subscribe("app");

        manager.shutdown();

        assert!(sub.recv().await.is_none());
        assert!(manager.subscribe("app").recv().await.is_none());
        assert_eq!(manager.get("app").unwrap().port, 1);
    }

    #[tokio::test]
    async fn test_cancellation_closes_subscribers_without_file() {
        let token = CancellationToken::new();
        let manager: Manager<&str, TestConfig> = Manager::new();
        manager
            .register_with("app", config(1), RegisterOptions::new().with_cancellation(token.clone()))
            .await
            .unwrap();
        let mut sub = manager.subscribe("app");

        token.cancel();

        let closed = tokio::time::timeout(Duration::from_secs(5), sub.recv()).await.unwrap();
        assert!(closed.is_none());
        assert!(manager.subscribe("app").recv().await.is_none());
        assert_eq!(manager.get("app").unwrap().port, 1);
    }

    #[tokio::test]
    async fn test_watch_failure_returned_when_exit_disabled() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("app.yaml");
        std::fs::write(&config_path, "port: 9000\n").unwrap();

        let manager: Manager<&str, TestConfig> = Manager::builder()
            .watch_scope(WatchScope::File)
            .exit_on_watch_failure(false)
            .build();
        // gone by the time the watch is installed
        manager.add_applier(
            "app",
            |_: Option<&TestConfig>, next: &mut TestConfig| -> std::result::Result<(), crate::error::ApplyError> {
                if let Some(path) = &next.file {
                    std::fs::remove_file(path).unwrap();
                }
                Ok(())
            },
        );

        let initial = TestConfig {
            file: Some(config_path),
            port: 0,
        };
        let err = manager.register("app", initial).await.unwrap_err();

        assert!(matches!(err, ConfigError::WatchSetup(_)));
        assert!(manager.get("app").is_none());
        assert!(manager.names().is_empty());
    }

    #[test]
    fn test_builder_settings() {
        assert!(ManagerOptions::default().exit_on_watch_failure);

        let manager: Manager<&str, TestConfig> = Manager::builder()
            .subscriber_capacity(0)
            .send_timeout(None)
            .watch_scope(WatchScope::FileAndParent)
            .skip_unchanged(false)
            .exit_on_watch_failure(false)
            .build();

        let options = manager.shared.options();
        assert_eq!(options.broadcast.capacity, 1);
        assert_eq!(options.broadcast.send_timeout, None);
        assert_eq!(options.watch_scope, Some(WatchScope::FileAndParent));
        assert!(!options.skip_unchanged);
        assert!(!options.exit_on_watch_failure);
    }
}
