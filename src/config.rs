// =============================================================================
// Runtime configuration
// =============================================================================
//
// All fields carry `#[serde(default)]` so that adding new fields never breaks
// loading an older config file. Persistence uses an atomic tmp + rename
// pattern to prevent corruption on crash.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::StreamMode;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_tokens() -> Vec<u32> {
    // RELIANCE and ACC on the NSE.
    vec![738561, 5633]
}

fn default_tick_interval_ms() -> u64 {
    500
}

fn default_credentials_path() -> String {
    "data/credentials.json".to_string()
}

fn default_status_log_secs() -> u64 {
    10
}

/// Top-level runtime configuration for the Ticker Hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Instrument tokens subscribed at startup.
    #[serde(default = "default_tokens")]
    pub tokens: Vec<u32>,

    /// Streaming mode used for the startup subscription.
    #[serde(default)]
    pub default_mode: StreamMode,

    /// Interval between simulated tick batches.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// When set, the simulated feed drops the connection every N tick
    /// batches to exercise reconnect-driven resubscription.
    #[serde(default)]
    pub sim_drop_after_batches: Option<u64>,

    /// Where the credential session store lives.
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,

    /// When set, tick history is exported here on shutdown.
    #[serde(default)]
    pub export_path: Option<String>,

    /// Interval of the periodic connection-status log line.
    #[serde(default = "default_status_log_secs")]
    pub status_log_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tokens: default_tokens(),
            default_mode: StreamMode::default(),
            tick_interval_ms: default_tick_interval_ms(),
            sim_drop_after_batches: None,
            credentials_path: default_credentials_path(),
            export_path: None,
            status_log_secs: default_status_log_secs(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            tokens = ?config.tokens,
            mode = %config.default_mode,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.tokens, vec![738561, 5633]);
        assert_eq!(cfg.default_mode, StreamMode::Quote);
        assert_eq!(cfg.tick_interval_ms, 500);
        assert!(cfg.sim_drop_after_batches.is_none());
        assert_eq!(cfg.credentials_path, "data/credentials.json");
        assert!(cfg.export_path.is_none());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.tokens, vec![738561, 5633]);
        assert_eq!(cfg.default_mode, StreamMode::Quote);
        assert_eq!(cfg.status_log_secs, 10);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "tokens": [408065], "default_mode": "full" }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.tokens, vec![408065]);
        assert_eq!(cfg.default_mode, StreamMode::Full);
        assert_eq!(cfg.tick_interval_ms, 500);
    }

    #[test]
    fn roundtrip_serialisation() {
        let mut cfg = RuntimeConfig::default();
        cfg.sim_drop_after_batches = Some(40);
        cfg.export_path = Some("ticks.json".to_string());

        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.tokens, cfg2.tokens);
        assert_eq!(cfg2.sim_drop_after_batches, Some(40));
        assert_eq!(cfg2.export_path.as_deref(), Some("ticks.json"));
    }
}
