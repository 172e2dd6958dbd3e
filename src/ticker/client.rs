// =============================================================================
// Streaming client capability — the seam between the tracker and the vendor
// =============================================================================
//
// The vendor SDK owns the wire protocol: binary tick decoding, heartbeats and
// the reconnect loop all happen on its side. The tracker only needs the small
// command surface below plus a stream of decoded events, so the vendor object
// is modelled as a trait with an explicit event channel instead of mutable
// callback slots.
// =============================================================================

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::ticker::tracker::TickerTracker;
use crate::types::{StreamMode, Tick};

/// Command surface of the vendor streaming client.
///
/// All calls are fire-and-forget from the tracker's point of view: timeouts
/// and retries are the vendor's responsibility, so no additional deadline is
/// imposed here.
pub trait TickerClient: Send + Sync {
    /// Open the streaming session. The vendor delivers a
    /// [`TickerEvent::Connected`] once the session is established.
    fn connect(&self) -> Result<()>;

    /// Close the streaming session.
    fn close(&self) -> Result<()>;

    /// Subscribe the given instrument tokens (in the vendor default mode).
    fn subscribe(&self, tokens: &[u32]) -> Result<()>;

    /// Unsubscribe the given instrument tokens.
    fn unsubscribe(&self, tokens: &[u32]) -> Result<()>;

    /// Change the streaming mode for the given tokens.
    fn set_mode(&self, mode: StreamMode, tokens: &[u32]) -> Result<()>;

    /// Whether the underlying session is currently live.
    fn is_connected(&self) -> bool;
}

/// Decoded events emitted by the streaming client.
#[derive(Debug, Clone)]
pub enum TickerEvent {
    /// Session established (both first connect and vendor auto-reconnect).
    Connected,
    /// Session closed by the server or the client.
    Closed { code: Option<u16>, reason: String },
    /// Transport or protocol error reported by the vendor.
    Error { code: Option<u16>, reason: String },
    /// A batch of decoded market-data updates.
    Ticks(Vec<Tick>),
    /// An order update for the authenticated account.
    OrderUpdate(serde_json::Value),
    /// The vendor is attempting to re-establish a dropped session.
    Reconnecting { attempt: u32 },
    /// The vendor exhausted its reconnect attempts and gave up.
    ReconnectGaveUp,
}

/// Receiving half of the event channel between a streaming client and the
/// tracker's event loop.
pub type EventReceiver = mpsc::UnboundedReceiver<TickerEvent>;

/// Sending half handed to streaming client implementations.
pub type EventSender = mpsc::UnboundedSender<TickerEvent>;

/// Drive the tracker from a stream of vendor events.
///
/// This is the single background worker of the system: every event handler
/// and observer runs on this task. The loop ends when the event channel
/// closes, or after a close event once the tracker has been stopped via
/// `disconnect()`. Spawn it and keep the `JoinHandle` so shutdown is
/// observable.
pub async fn run_event_loop(tracker: Arc<TickerTracker>, mut events: EventReceiver) {
    info!("ticker event loop started");

    while let Some(event) = events.recv().await {
        match event {
            TickerEvent::Connected => tracker.on_connect(),
            TickerEvent::Closed { code, reason } => {
                tracker.on_close(code, &reason);
                if !tracker.is_running() {
                    break;
                }
            }
            TickerEvent::Error { code, reason } => tracker.on_error(code, &reason),
            TickerEvent::Ticks(ticks) => tracker.on_ticks(ticks),
            TickerEvent::OrderUpdate(payload) => tracker.on_order_update(payload),
            TickerEvent::Reconnecting { attempt } => {
                warn!(attempt, "streaming client reconnecting");
            }
            TickerEvent::ReconnectGaveUp => tracker.on_no_reconnect(),
        }
    }

    info!("ticker event loop stopped");
}

/// Create the event channel shared by a streaming client and the event loop.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
