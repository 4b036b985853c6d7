//! Configuration overlays: command-line arguments and the configuration file.

mod args;
mod config_source;
mod file;

pub use args::{ArgError, ArgKind, ArgOverlay, ArgOverrides, ArgSpec};
pub use config_source::ConfigSource;
pub(crate) use config_source::merge;
pub use file::{FileFormat, FileSnapshot, FileSource};
