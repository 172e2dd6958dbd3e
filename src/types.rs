// =============================================================================
// Shared types used across the Ticker Hub
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TickerError;

/// Streaming granularity for a subscribed instrument.
///
/// * `Ltp`   — last traded price only.
/// * `Quote` — price, volume and OHLC (the vendor default).
/// * `Full`  — everything in quote mode plus market depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    Ltp,
    Quote,
    Full,
}

impl Default for StreamMode {
    fn default() -> Self {
        Self::Quote
    }
}

impl std::fmt::Display for StreamMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ltp => write!(f, "ltp"),
            Self::Quote => write!(f, "quote"),
            Self::Full => write!(f, "full"),
        }
    }
}

impl std::str::FromStr for StreamMode {
    type Err = TickerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ltp" => Ok(Self::Ltp),
            "quote" => Ok(Self::Quote),
            "full" => Ok(Self::Full),
            other => Err(TickerError::InvalidMode(other.to_string())),
        }
    }
}

/// Connection state of the streaming session.
///
/// `Failed` is terminal: it is entered when the vendor client gives up
/// reconnecting and is only left by an explicit new `connect()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Failed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Open/high/low/close block carried by quote and full mode ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ohlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// A single decoded market-data update for one instrument, as delivered by
/// the streaming client. Fields beyond `last_price` are populated depending
/// on the streaming mode of the instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub instrument_token: u32,
    pub last_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_traded_quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_traded: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ohlc: Option<Ohlc>,
    /// Exchange timestamp in epoch milliseconds, when the vendor provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_timestamp: Option<i64>,
}

impl Tick {
    /// A minimal (LTP-mode) tick carrying only the last traded price.
    pub fn ltp(instrument_token: u32, last_price: f64) -> Self {
        Self {
            instrument_token,
            last_price,
            last_traded_quantity: None,
            volume_traded: None,
            ohlc: None,
            exchange_timestamp: None,
        }
    }
}

/// One entry of the per-instrument rolling tick history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickRecord {
    /// Arrival time of the tick, serialised as RFC 3339.
    #[serde(rename = "timestamp")]
    pub at: DateTime<Utc>,
    #[serde(rename = "data")]
    pub tick: Tick,
}

/// One entry of the order-update log. The payload shape is vendor-defined,
/// so it is kept as raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    #[serde(rename = "timestamp")]
    pub at: DateTime<Utc>,
    #[serde(rename = "data")]
    pub payload: serde_json::Value,
}

/// Point-in-time view of the streaming session, for status polling and the
/// periodic status log.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: ConnectionState,
    pub connection_count: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub subscribed_count: usize,
    pub is_connected: bool,
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn stream_mode_parses_vendor_names() {
        assert_eq!(StreamMode::from_str("ltp").unwrap(), StreamMode::Ltp);
        assert_eq!(StreamMode::from_str("QUOTE").unwrap(), StreamMode::Quote);
        assert_eq!(StreamMode::from_str("full").unwrap(), StreamMode::Full);
    }

    #[test]
    fn stream_mode_rejects_unknown_names() {
        let err = StreamMode::from_str("depth").unwrap_err();
        assert!(matches!(err, TickerError::InvalidMode(ref m) if m == "depth"));
    }

    #[test]
    fn stream_mode_default_is_quote() {
        assert_eq!(StreamMode::default(), StreamMode::Quote);
    }

    #[test]
    fn stream_mode_serde_roundtrip() {
        let json = serde_json::to_string(&StreamMode::Full).unwrap();
        assert_eq!(json, "\"full\"");
        let mode: StreamMode = serde_json::from_str("\"ltp\"").unwrap();
        assert_eq!(mode, StreamMode::Ltp);
    }

    #[test]
    fn connection_state_display_matches_serde() {
        let json = serde_json::to_string(&ConnectionState::Disconnected).unwrap();
        assert_eq!(json, format!("\"{}\"", ConnectionState::Disconnected));
    }

    #[test]
    fn tick_record_serialises_with_export_field_names() {
        let record = TickRecord {
            at: Utc::now(),
            tick: Tick::ltp(738561, 2500.0),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("timestamp").is_some());
        assert_eq!(value["data"]["instrument_token"], 738561);
        // Optional fields absent from an LTP tick must not be serialised.
        assert!(value["data"].get("ohlc").is_none());
    }
}
