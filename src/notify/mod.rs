//! Configuration change notification system.
//!
//! Provides the file watch that triggers reloads and the broadcaster that
//! hands committed configurations to subscribers.

pub mod subscriber;
pub mod watcher;

pub use subscriber::{BroadcastPolicy, Broadcaster, Delivery, Subscription};
pub use watcher::{FileWatchSource, ORCHESTRATOR_ENV_VAR, VOLUME_MARKER, WatchEvent, WatchScope};
