//! Core configuration management types.

mod chain;
mod configuration;
mod loader;
mod manager;
mod watcher;

pub use chain::{Applier, Chain, Validator};
pub use configuration::Configuration;
pub(crate) use loader::ConfigLoader;
pub use manager::{ConfigName, Manager, ManagerBuilder, RegisterOptions};
pub use watcher::{ReloadStage, Trigger};
