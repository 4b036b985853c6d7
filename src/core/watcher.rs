//! Per-name reload state machine.

use crate::core::manager::{ConfigName, Shared};
use crate::core::{ConfigLoader, Configuration};
use crate::error::{ConfigError, Result};
use crate::notify::{FileWatchSource, WatchEvent};
use crate::sources::FileSource;
use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Stage of the most recent reload of a configuration name.
///
/// A reload moves through `Loading`, `Validating` and `Applying` and ends in
/// `Committed` or `Rejected`. The final stage is kept until the next reload
/// starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadStage {
    /// No reload has run yet.
    Idle,
    /// Overlaying arguments and the configuration file onto the candidate.
    Loading,
    /// Running the validator chain.
    Validating,
    /// Running the applier chain.
    Applying,
    /// The candidate replaced the current configuration.
    Committed,
    /// The file content matched the last commit; nothing was done.
    Unchanged,
    /// The candidate was discarded; the current configuration is untouched.
    Rejected,
}

impl fmt::Display for ReloadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Validating => "validating",
            Self::Applying => "applying",
            Self::Committed => "committed",
            Self::Unchanged => "unchanged",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Why a reload ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The initial pass of a registration.
    Registration,
    /// A qualifying filesystem event.
    FileEvent(WatchEvent),
    /// An explicit [`Manager::reload`](crate::core::Manager::reload).
    Manual,
    /// An explicit [`Manager::update`](crate::core::Manager::update).
    Update,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registration => f.write_str("registration"),
            Self::FileEvent(event) => write!(f, "{}", event),
            Self::Manual => f.write_str("manual"),
            Self::Update => f.write_str("update"),
        }
    }
}

enum Input<T> {
    /// Load a candidate starting from this copy.
    Load(T),
    /// Use this candidate as is.
    Value(T),
}

struct ReloadState {
    last_file: Option<String>,
    commits: u64,
}

/// Owns the current configuration of one name and runs its reloads.
///
/// Reloads are serialized by `reload`, so the pipeline has a single writer
/// per name. Readers go through `current` and never wait on a reload.
pub(crate) struct ConfigWatcher<K, T> {
    name: K,
    label: String,
    current: ArcSwapOption<T>,
    loader: ConfigLoader,
    cancel: CancellationToken,
    reload: tokio::sync::Mutex<ReloadState>,
    stage: parking_lot::Mutex<ReloadStage>,
    watching: AtomicBool,
    stopped: AtomicBool,
}

impl<K, T> ConfigWatcher<K, T>
where
    K: ConfigName,
    T: Configuration,
{
    pub(crate) fn new(name: K, loader: ConfigLoader, cancel: CancellationToken) -> Self {
        let label = format!("{:?}", name);
        Self {
            name,
            label,
            current: ArcSwapOption::empty(),
            loader,
            cancel,
            reload: tokio::sync::Mutex::new(ReloadState {
                last_file: None,
                commits: 0,
            }),
            stage: parking_lot::Mutex::new(ReloadStage::Idle),
            watching: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub(crate) fn label(&self) -> &str {
        &self.label
    }

    /// The committed configuration, `None` until the initial pass succeeds.
    pub(crate) fn current(&self) -> Option<Arc<T>> {
        self.current.load_full()
    }

    pub(crate) fn stage(&self) -> ReloadStage {
        *self.stage.lock()
    }

    pub(crate) fn is_watching(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel the watch. Without a running watch task the subscribers are
    /// closed here.
    pub(crate) fn stop(&self, shared: &Shared<K, T>) {
        self.cancel.cancel();
        if !self.is_watching() {
            self.stopped.store(true, Ordering::SeqCst);
            shared.close_subscribers(&self.name);
        }
    }

    fn set_stage(&self, stage: ReloadStage) {
        *self.stage.lock() = stage;
    }

    /// Run the first pass with `initial` as the seed and no prior value.
    pub(crate) async fn initialize(&self, shared: &Shared<K, T>, initial: T) -> Result<Arc<T>> {
        let mut state = self.reload.lock().await;
        self.run(shared, &mut state, None, Input::Load(initial), Trigger::Registration)
            .await
    }

    /// Copy the current value and run the full protocol on the copy.
    pub(crate) async fn reload(&self, shared: &Shared<K, T>, trigger: Trigger) -> Result<Arc<T>> {
        let mut state = self.reload.lock().await;
        let prior = self.committed()?;
        let seed = T::clone(&prior);
        self.run(shared, &mut state, Some(prior), Input::Load(seed), trigger)
            .await
    }

    /// Validate, apply and commit `value` without loading anything.
    pub(crate) async fn update(&self, shared: &Shared<K, T>, value: T) -> Result<Arc<T>> {
        let mut state = self.reload.lock().await;
        let prior = self.committed()?;
        self.run(shared, &mut state, Some(prior), Input::Value(value), Trigger::Update)
            .await
    }

    fn committed(&self) -> Result<Arc<T>> {
        self.current
            .load_full()
            .ok_or_else(|| ConfigError::NotRegistered(self.label.clone()))
    }

    async fn run(
        &self,
        shared: &Shared<K, T>,
        state: &mut ReloadState,
        prior: Option<Arc<T>>,
        input: Input<T>,
        trigger: Trigger,
    ) -> Result<Arc<T>> {
        let span = tracing::info_span!("reload", config = %self.label, %trigger);

        #[cfg(feature = "metrics")]
        let timer = shared.metrics().map(|m| m.start_reload(&self.label));

        let result = self
            .pipeline(shared, state, prior, input, trigger)
            .instrument(span)
            .await;

        if result.is_err() {
            self.set_stage(ReloadStage::Rejected);
        }

        #[cfg(feature = "metrics")]
        if let (Some(metrics), Some(timer)) = (shared.metrics(), timer) {
            match &result {
                Ok(_) => metrics.record_reload_success(&self.label, timer),
                Err(_) => metrics.record_reload_failure(&self.label, timer),
            }
        }

        result
    }

    async fn pipeline(
        &self,
        shared: &Shared<K, T>,
        state: &mut ReloadState,
        prior: Option<Arc<T>>,
        input: Input<T>,
        trigger: Trigger,
    ) -> Result<Arc<T>> {
        let (mut candidate, snapshot) = match input {
            Input::Load(seed) => {
                self.set_stage(ReloadStage::Loading);
                let loaded = self
                    .loader
                    .load(seed)
                    .inspect_err(|e| tracing::error!("Error while loading conf: {}", e))?;
                (loaded.config, loaded.snapshot)
            }
            Input::Value(value) => (value, None),
        };

        if let (Some(prior), Some(snapshot), Trigger::FileEvent(_)) = (&prior, &snapshot, trigger) {
            if shared.options().skip_unchanged && state.last_file.as_deref() == Some(snapshot.text()) {
                tracing::debug!("file content unchanged since last commit");
                self.set_stage(ReloadStage::Unchanged);
                return Ok(Arc::clone(prior));
            }
        }

        let chain = shared.chain(&self.name);
        let prior = prior.as_deref();

        self.set_stage(ReloadStage::Validating);
        let errors = chain.validate(prior, &candidate);
        if !errors.is_empty() {
            for err in &errors {
                tracing::error!("Error while validating new conf: {}", err);
            }
            #[cfg(feature = "metrics")]
            if let Some(metrics) = shared.metrics() {
                metrics.record_validation_failures(&self.label, errors.len());
            }
            return Err(ConfigError::Validation(errors));
        }

        self.set_stage(ReloadStage::Applying);
        chain
            .apply(prior, &mut candidate)
            .inspect_err(|e| tracing::error!("Error while applying conf: {}", e))?;

        let committed = Arc::new(candidate);
        self.current.store(Some(Arc::clone(&committed)));
        state.last_file = snapshot.map(|s| s.text().to_owned());
        state.commits += 1;
        self.set_stage(ReloadStage::Committed);
        tracing::info!(commits = state.commits, "configuration committed");

        // the initial value is read with `get`, only later commits are broadcast
        if trigger != Trigger::Registration {
            let delivery = shared.broadcast(&self.name, &committed, &self.cancel).await;
            tracing::debug!(
                delivered = delivery.delivered,
                timed_out = delivery.timed_out,
                closed = delivery.closed,
                "broadcast new conf"
            );
        }

        Ok(committed)
    }

    /// Start the background task consuming `source`.
    pub(crate) fn spawn_watch(self: &Arc<Self>, shared: Arc<Shared<K, T>>, source: FileWatchSource) {
        self.watching.store(true, Ordering::SeqCst);
        tokio::spawn(Arc::clone(self).watch(shared, source));
    }

    /// Close the subscribers once the token is cancelled, for a name without
    /// a watch task.
    pub(crate) fn spawn_close_on_cancel(self: &Arc<Self>, shared: &Arc<Shared<K, T>>) {
        let cancel = self.cancel.clone();
        let watcher = Arc::downgrade(self);
        let shared = Arc::downgrade(shared);
        tokio::spawn(async move {
            cancel.cancelled().await;
            if let (Some(watcher), Some(shared)) = (Weak::upgrade(&watcher), Weak::upgrade(&shared)) {
                watcher.stop(&shared);
            }
        });
    }

    /// Reload if the file no longer holds the committed text.
    ///
    /// Writes between the first load and the watch setup produce no event.
    async fn catch_up(&self, shared: &Shared<K, T>) {
        let Some(path) = self.current().and_then(|c| c.config_file().map(|p| p.to_path_buf())) else {
            return;
        };
        let text = match FileSource::new(path).read() {
            Ok(Some(snapshot)) => snapshot.text().to_owned(),
            _ => return,
        };

        let stale = self.reload.lock().await.last_file.as_deref() != Some(text.as_str());
        if stale {
            tracing::info!(config = %self.label, "config: file changed before watch started, reloading");
            let _ = self
                .reload(shared, Trigger::FileEvent(WatchEvent::Written))
                .await;
        }
    }

    async fn watch(self: Arc<Self>, shared: Arc<Shared<K, T>>, mut source: FileWatchSource) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = self.catch_up(&shared) => {}
        }

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!(config = %self.label, "watch cancelled");
                    break;
                }
                event = source.next() => match event {
                    Some(event) => {
                        tracing::info!(config = %self.label, %event, "config: reloading config");
                        // failures are logged by the pipeline; the last good value stays current
                        let _ = self.reload(&shared, Trigger::FileEvent(event)).await;
                    }
                    None => {
                        tracing::error!(config = %self.label, "fsnotify: event stream closed");
                        break;
                    }
                },
            }
        }

        self.watching.store(false, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
        shared.close_subscribers(&self.name);
    }
}
