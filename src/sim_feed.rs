// =============================================================================
// Simulated streaming client — demo feed
// =============================================================================
//
// Stands in for the vendor SDK behind the `TickerClient` seam: a background
// generator task emits random-walk tick batches for whatever is currently
// subscribed, the occasional order update, and (when configured) a periodic
// simulated connection drop followed by the auto-reconnect a real vendor
// client would perform — which exercises the tracker's resubscription path
// end to end.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};
use uuid::Uuid;

use crate::ticker::{event_channel, EventReceiver, EventSender, TickerClient, TickerEvent};
use crate::types::{Ohlc, StreamMode, Tick};

/// Emit one simulated order update every this many tick batches.
const ORDER_UPDATE_EVERY: u64 = 25;

struct SimState {
    connected: AtomicBool,
    /// Server-side view of the subscriptions, as the vendor would hold it.
    subscriptions: RwLock<HashMap<u32, StreamMode>>,
}

/// In-process streaming client for demo mode and tests.
pub struct SimTicker {
    events: EventSender,
    state: Arc<SimState>,
}

impl SimTicker {
    /// Build the simulated client and its event channel; the generator task
    /// starts immediately but stays silent until `connect()`.
    ///
    /// `drop_after_batches` simulates a network drop (close + reconnect)
    /// every N tick batches.
    pub fn spawn(
        tick_interval: Duration,
        drop_after_batches: Option<u64>,
    ) -> (Self, EventReceiver) {
        let (events, receiver) = event_channel();
        let state = Arc::new(SimState {
            connected: AtomicBool::new(false),
            subscriptions: RwLock::new(HashMap::new()),
        });

        tokio::spawn(run_generator(
            events.clone(),
            state.clone(),
            tick_interval,
            drop_after_batches,
        ));

        (Self { events, state }, receiver)
    }

    fn send(&self, event: TickerEvent) -> Result<()> {
        if self.events.send(event).is_err() {
            bail!("event channel closed");
        }
        Ok(())
    }
}

impl TickerClient for SimTicker {
    fn connect(&self) -> Result<()> {
        self.state.connected.store(true, Ordering::SeqCst);
        self.send(TickerEvent::Connected)
    }

    fn close(&self) -> Result<()> {
        self.state.connected.store(false, Ordering::SeqCst);
        self.send(TickerEvent::Closed {
            code: Some(1000),
            reason: "closed by client".to_string(),
        })
    }

    fn subscribe(&self, tokens: &[u32]) -> Result<()> {
        let mut subs = self.state.subscriptions.write();
        for &token in tokens {
            // The vendor subscribes in its default mode; set_mode refines it.
            subs.entry(token).or_insert(StreamMode::Quote);
        }
        Ok(())
    }

    fn unsubscribe(&self, tokens: &[u32]) -> Result<()> {
        let mut subs = self.state.subscriptions.write();
        for token in tokens {
            subs.remove(token);
        }
        Ok(())
    }

    fn set_mode(&self, mode: StreamMode, tokens: &[u32]) -> Result<()> {
        let mut subs = self.state.subscriptions.write();
        for token in tokens {
            if let Some(tracked) = subs.get_mut(token) {
                *tracked = mode;
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }
}

/// Generator loop: one tick batch per interval while connected.
async fn run_generator(
    events: EventSender,
    state: Arc<SimState>,
    tick_interval: Duration,
    drop_after_batches: Option<u64>,
) {
    let mut interval = tokio::time::interval(tick_interval);
    let mut rng = StdRng::from_entropy();
    let mut prices: HashMap<u32, f64> = HashMap::new();
    let mut batches: u64 = 0;

    info!(interval_ms = tick_interval.as_millis() as u64, "simulated feed generator started");

    loop {
        interval.tick().await;

        if events.is_closed() {
            debug!("event channel closed; simulated feed generator stopping");
            return;
        }
        if !state.connected.load(Ordering::SeqCst) {
            continue;
        }

        let subscriptions: Vec<(u32, StreamMode)> = state
            .subscriptions
            .read()
            .iter()
            .map(|(&token, &mode)| (token, mode))
            .collect();
        if subscriptions.is_empty() {
            continue;
        }

        let ticks: Vec<Tick> = subscriptions
            .iter()
            .map(|&(token, mode)| next_tick(&mut rng, &mut prices, token, mode))
            .collect();

        if events.send(TickerEvent::Ticks(ticks)).is_err() {
            return;
        }
        batches += 1;

        if batches % ORDER_UPDATE_EVERY == 0 {
            let update = simulated_order_update(&mut rng, &subscriptions);
            if events.send(TickerEvent::OrderUpdate(update)).is_err() {
                return;
            }
        }

        // Simulated network drop; a real vendor client reconnects on its own
        // and re-emits Connected.
        if let Some(every) = drop_after_batches {
            if every > 0 && batches % every == 0 {
                info!("simulated feed dropping connection");
                let closed = TickerEvent::Closed {
                    code: Some(1006),
                    reason: "simulated network drop".to_string(),
                };
                if events.send(closed).is_err() || events.send(TickerEvent::Connected).is_err() {
                    return;
                }
            }
        }
    }
}

/// Advance the random walk for one instrument and build a tick with the
/// field richness its mode implies.
fn next_tick(
    rng: &mut StdRng,
    prices: &mut HashMap<u32, f64>,
    token: u32,
    mode: StreamMode,
) -> Tick {
    let price = prices.entry(token).or_insert_with(|| 100.0 + f64::from(token % 1000));
    *price = (*price * (1.0 + rng.gen_range(-0.001..0.001))).max(0.05);
    let last_price = (*price * 100.0).round() / 100.0;

    let mut tick = Tick::ltp(token, last_price);
    if mode != StreamMode::Ltp {
        tick.last_traded_quantity = Some(rng.gen_range(1..500));
        tick.volume_traded = Some(rng.gen_range(10_000..5_000_000));
        tick.ohlc = Some(Ohlc {
            open: last_price * 0.995,
            high: last_price * 1.01,
            low: last_price * 0.99,
            close: last_price,
        });
        tick.exchange_timestamp = Some(Utc::now().timestamp_millis());
    }
    tick
}

fn simulated_order_update(rng: &mut StdRng, subscriptions: &[(u32, StreamMode)]) -> serde_json::Value {
    let (token, _) = subscriptions[rng.gen_range(0..subscriptions.len())];
    serde_json::json!({
        "order_id": Uuid::new_v4().to_string(),
        "instrument_token": token,
        "status": "COMPLETE",
        "filled_quantity": rng.gen_range(1..100),
        "exchange_timestamp": Utc::now().to_rfc3339(),
    })
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticker::{run_event_loop, TickerTracker};

    #[tokio::test]
    async fn sim_feed_delivers_ticks_for_subscribed_tokens() {
        let (client, receiver) = SimTicker::spawn(Duration::from_millis(10), None);
        let client = Arc::new(client);
        let tracker = Arc::new(TickerTracker::new(client.clone()));
        let event_loop = tokio::spawn(run_event_loop(tracker.clone(), receiver));

        tracker.connect().unwrap();
        tracker.subscribe(&[738561], StreamMode::Full).unwrap();

        // Wait for at least one batch to arrive.
        for _ in 0..100 {
            if tracker.latest_tick(738561).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let latest = tracker.latest_tick(738561).expect("tick received");
        assert!(latest.last_price > 0.0);
        // Full mode carries the quote fields.
        assert!(latest.ohlc.is_some());
        assert_eq!(tracker.connection_status().state, crate::types::ConnectionState::Connected);

        tracker.disconnect();
        event_loop.await.unwrap();
    }

    #[tokio::test]
    async fn simulated_drop_triggers_resubscription() {
        let (client, receiver) = SimTicker::spawn(Duration::from_millis(5), Some(3));
        let client = Arc::new(client);
        let tracker = Arc::new(TickerTracker::new(client.clone()));
        let event_loop = tokio::spawn(run_event_loop(tracker.clone(), receiver));

        tracker.connect().unwrap();
        tracker.subscribe(&[100, 200], StreamMode::Quote).unwrap();

        // Wait until at least one drop + reconnect cycle has happened.
        for _ in 0..200 {
            if tracker.connection_status().connection_count >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let status = tracker.connection_status();
        assert!(status.connection_count >= 2, "expected a reconnect");
        // Resubscription kept the server-side set intact.
        assert_eq!(tracker.subscribed_instruments().len(), 2);

        tracker.disconnect();
        event_loop.await.unwrap();
    }

    #[test]
    fn next_tick_ltp_mode_is_minimal() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut prices = HashMap::new();
        let tick = next_tick(&mut rng, &mut prices, 42, StreamMode::Ltp);
        assert_eq!(tick.instrument_token, 42);
        assert!(tick.ohlc.is_none());
        assert!(tick.volume_traded.is_none());
    }

    #[test]
    fn next_tick_price_walk_stays_positive() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut prices = HashMap::new();
        for _ in 0..10_000 {
            let tick = next_tick(&mut rng, &mut prices, 7, StreamMode::Quote);
            assert!(tick.last_price > 0.0);
        }
    }
}
