//! Configuration overlay trait.

use crate::error::Result;
use serde_json::Value;

/// A layer that can be put on top of a configuration value.
///
/// The value is serialized into a [`Value`] tree, every layer writes into
/// that tree, and the result is deserialized back. Field names and map keys
/// are kept exactly as serde writes them.
///
/// Overlays are applied in a fixed order by the loader: argument overlay
/// first, then the configuration file. Each layer only touches the keys it
/// carries; everything else keeps the value it had in the layer below.
pub trait ConfigSource: Send + Sync {
    /// Put this layer on top of `tree`.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer cannot be decoded or does not fit the
    /// shape of `tree`.
    fn overlay(&self, tree: &mut Value) -> Result<()>;

    /// Get a human-readable name for this layer (for logging/debugging).
    fn name(&self) -> String;
}

/// Merge `layer` into `target`: objects merge key by key, arrays and
/// scalars replace.
pub(crate) fn merge(target: &mut Value, layer: Value) {
    match (target, layer) {
        (Value::Object(target), Value::Object(layer)) => {
            for (key, value) in layer {
                match target.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, layer) => *target = layer,
    }
}
