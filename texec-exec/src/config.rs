use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Executor tunables. The workflow DSL/config loader itself is out of
/// scope; this is the executor's own knob set, `serde`-deserializable from
/// YAML the way the teacher's own structured data is, with sane defaults so
/// tests and small deployments need not write a file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Interval at which the polling monitor checks handlers (`spec.md`
    /// §4.7: "running at ~1s granularity").
    pub poll_interval_ms: u64,
    /// Root directory of the worker-local content cache.
    pub local_cache_root: PathBuf,
    /// Root directory under which scratch directories are created.
    pub scratch_root: PathBuf,
    /// Cap, in bytes, on the local cache's on-disk footprint.
    pub max_local_cache_bytes: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            poll_interval_ms: 1000,
            local_cache_root: PathBuf::from("/tmp/texec/cache"),
            scratch_root: PathBuf::from("/tmp/texec/scratch"),
            max_local_cache_bytes: 10 * 1024 * 1024 * 1024,
        }
    }
}

impl ExecutorConfig {
    /// Parse an [`ExecutorConfig`] from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// The poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = ExecutorConfig::default();
        assert_eq!(config.poll_interval_ms, 1000);
        assert!(config.max_local_cache_bytes > 0);
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let config = ExecutorConfig::from_yaml("poll_interval_ms: 250\n").unwrap();
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.scratch_root, ExecutorConfig::default().scratch_root);
    }
}
