// =============================================================================
// Tick-history export
// =============================================================================

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::info;

use crate::error::TickerError;
use crate::ticker::tracker::TickerTracker;

/// Serialise the tick history of the selected instruments (all when `tokens`
/// is `None`) to pretty-printed JSON at `path`.
///
/// The output is an object keyed by instrument token, each value an ordered
/// array of `{ "timestamp": <RFC 3339>, "data": <tick> }` entries,
/// oldest-first.
pub fn export_ticks(
    tracker: &TickerTracker,
    path: impl AsRef<Path>,
    tokens: Option<&[u32]>,
) -> Result<(), TickerError> {
    let path = path.as_ref();
    let snapshot = tracker.history_snapshot(tokens);

    let mut root = Map::new();
    for (token, records) in &snapshot {
        let rows = records
            .iter()
            .map(|record| serde_json::to_value(record).expect("tick records serialise to JSON"))
            .collect();
        root.insert(token.to_string(), Value::Array(rows));
    }

    let io_err = |source: std::io::Error| TickerError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &Value::Object(root))
        .map_err(|e| io_err(e.into()))?;

    info!(path = %path.display(), instruments = snapshot.len(), "tick data exported");
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticker::client::TickerClient;
    use crate::types::{StreamMode, Tick};
    use anyhow::Result;
    use std::sync::Arc;

    struct NullClient;

    impl TickerClient for NullClient {
        fn connect(&self) -> Result<()> {
            Ok(())
        }
        fn close(&self) -> Result<()> {
            Ok(())
        }
        fn subscribe(&self, _tokens: &[u32]) -> Result<()> {
            Ok(())
        }
        fn unsubscribe(&self, _tokens: &[u32]) -> Result<()> {
            Ok(())
        }
        fn set_mode(&self, _mode: StreamMode, _tokens: &[u32]) -> Result<()> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            false
        }
    }

    fn populated_tracker() -> TickerTracker {
        let tracker = TickerTracker::new(Arc::new(NullClient));
        tracker.subscribe(&[738561, 5633], StreamMode::Quote).unwrap();
        tracker.on_ticks(vec![Tick::ltp(738561, 2500.0), Tick::ltp(5633, 145.5)]);
        tracker.on_ticks(vec![Tick::ltp(738561, 2501.0)]);
        tracker
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("ticker-hub-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn export_writes_all_instruments() {
        let tracker = populated_tracker();
        let path = temp_path("all");

        export_ticks(&tracker, &path, None).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["738561"].as_array().unwrap().len(), 2);
        assert_eq!(value["5633"].as_array().unwrap().len(), 1);
        assert_eq!(value["738561"][1]["data"]["last_price"], 2501.0);
        // Timestamps are canonical RFC 3339 strings.
        let ts = value["738561"][0]["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn export_filters_selected_tokens() {
        let tracker = populated_tracker();
        let path = temp_path("filtered");

        export_ticks(&tracker, &path, Some(&[5633])).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert!(value.get("5633").is_some());
        assert!(value.get("738561").is_none());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn export_to_unwritable_path_is_an_io_error() {
        let tracker = populated_tracker();
        let err = export_ticks(&tracker, "/nonexistent-dir/ticks.json", None).unwrap_err();
        assert!(matches!(err, TickerError::Io { .. }));
    }
}
