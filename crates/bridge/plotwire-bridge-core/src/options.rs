//! Bridge-level configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    /// Forward the module's internal logging to the host log.
    pub module_logging: bool,
    /// Cadence, in milliseconds, at which the embedder should drive
    /// [`Chart::update`](crate::chart::Chart::update). The bridge owns no
    /// timer of its own; this is the documented contract for whoever does.
    pub update_interval_ms: u32,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            module_logging: false,
            update_interval_ms: 25,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = BridgeOptions::default();
        assert!(!opts.module_logging);
        assert_eq!(opts.update_interval_ms, 25);
    }

    #[test]
    fn partial_deserialization_fills_defaults() {
        let opts: BridgeOptions = serde_json::from_str(r#"{"module_logging": true}"#).unwrap();
        assert!(opts.module_logging);
        assert_eq!(opts.update_interval_ms, 25);
    }
}
