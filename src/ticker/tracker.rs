// =============================================================================
// Subscription & Session Tracker — the core of the Ticker Hub
// =============================================================================
//
// Owns the authoritative streaming-session state: connection status, the
// subscription set (token → mode), the rolling per-instrument tick history,
// latest-tick snapshots and the order-update log. Event handlers run on the
// event-loop task; the public mutation methods may be called concurrently
// from any other task, so all shared state lives behind a single RwLock.
//
// Lock discipline: vendor client calls are always issued OUTSIDE the state
// lock. Subscription edits and reconnect-driven resubscription race by
// nature; the single lock keeps the tracked set consistent either way.
// =============================================================================

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::TickerError;
use crate::ticker::callbacks::CallbackRegistry;
use crate::ticker::client::TickerClient;
use crate::types::{ConnectionState, OrderRecord, StatusSnapshot, StreamMode, Tick, TickRecord};

/// Maximum retained ticks per instrument. Oldest entries are evicted first;
/// recency of arrival defines value, so this is FIFO, not LRU.
pub const TICK_HISTORY_CAP: usize = 1000;

/// All mutable session state, guarded by one lock.
#[derive(Default)]
struct TrackerState {
    state: ConnectionState,
    connection_count: u64,
    last_tick_at: Option<DateTime<Utc>>,
    running: bool,
    /// Source of truth for what must be re-subscribed after a reconnect.
    subscriptions: HashMap<u32, StreamMode>,
    history: HashMap<u32, VecDeque<TickRecord>>,
    latest: HashMap<u32, Tick>,
    /// Unbounded by design: the vendor applies no eviction to order updates,
    /// only `clear_data()` empties it.
    order_updates: Vec<OrderRecord>,
}

/// Tracks the streaming session and keeps the vendor's server-side
/// subscriptions consistent with the requested set across reconnects.
pub struct TickerTracker {
    client: Arc<dyn TickerClient>,
    callbacks: CallbackRegistry,
    inner: RwLock<TrackerState>,
}

impl TickerTracker {
    pub fn new(client: Arc<dyn TickerClient>) -> Self {
        Self {
            client,
            callbacks: CallbackRegistry::new(),
            inner: RwLock::new(TrackerState::default()),
        }
    }

    /// Observer registration points (tick / connect / disconnect / error /
    /// order).
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    // ── Session control ─────────────────────────────────────────────────

    /// Open the streaming session. On failure the session state is set to
    /// FAILED and error observers are notified in addition to the returned
    /// error.
    pub fn connect(&self) -> Result<(), TickerError> {
        self.inner.write().running = true;

        if let Err(e) = self.client.connect() {
            let reason = format!("{e:#}");
            {
                let mut inner = self.inner.write();
                inner.state = ConnectionState::Failed;
                inner.running = false;
            }
            error!(error = %reason, "failed to open streaming session");
            self.callbacks.emit_error(None, &reason);
            return Err(TickerError::Connection(reason));
        }

        info!("streaming session requested");
        Ok(())
    }

    /// Stop the session. Best effort: a close failure is logged, not
    /// returned, since the event loop will wind down either way.
    pub fn disconnect(&self) {
        self.inner.write().running = false;
        if let Err(e) = self.client.close() {
            error!(error = %e, "error closing streaming session");
        } else {
            info!("streaming session close requested");
        }
    }

    /// Whether `disconnect()` has not (yet) been requested.
    pub fn is_running(&self) -> bool {
        self.inner.read().running
    }

    // ── Subscription management (caller-invoked) ────────────────────────

    /// Subscribe `tokens` in `mode`, recording each token → mode. Already
    /// subscribed tokens have their mode overwritten. A vendor rejection
    /// propagates to the caller and leaves the tracked set untouched.
    pub fn subscribe(&self, tokens: &[u32], mode: StreamMode) -> Result<(), TickerError> {
        if tokens.is_empty() {
            return Ok(());
        }

        self.issue_subscribe(tokens, mode)
            .map_err(|e| TickerError::subscription("subscribe", e))?;

        let mut inner = self.inner.write();
        for &token in tokens {
            inner.subscriptions.insert(token, mode);
        }
        drop(inner);

        info!(count = tokens.len(), mode = %mode, "subscribed instruments");
        Ok(())
    }

    /// Unsubscribe `tokens`: the tracked entries and latest-tick snapshots
    /// are purged, the tick history is kept queryable.
    pub fn unsubscribe(&self, tokens: &[u32]) -> Result<(), TickerError> {
        if tokens.is_empty() {
            return Ok(());
        }

        self.client
            .unsubscribe(tokens)
            .map_err(|e| TickerError::subscription("unsubscribe", e))?;

        let mut inner = self.inner.write();
        for token in tokens {
            inner.subscriptions.remove(token);
            inner.latest.remove(token);
        }
        drop(inner);

        info!(count = tokens.len(), "unsubscribed instruments");
        Ok(())
    }

    /// Change the streaming mode. Tracking is updated only for tokens that
    /// are currently subscribed; unknown tokens are silently skipped — mode
    /// changes apply to active subscriptions only.
    pub fn set_mode(&self, mode: StreamMode, tokens: &[u32]) -> Result<(), TickerError> {
        if tokens.is_empty() {
            return Ok(());
        }

        self.client
            .set_mode(mode, tokens)
            .map_err(|e| TickerError::subscription("set_mode", e))?;

        let mut inner = self.inner.write();
        let mut updated = 0usize;
        for token in tokens {
            if let Some(tracked) = inner.subscriptions.get_mut(token) {
                *tracked = mode;
                updated += 1;
            }
        }
        drop(inner);

        info!(requested = tokens.len(), updated, mode = %mode, "set streaming mode");
        Ok(())
    }

    /// Issue subscribe (+ set_mode for non-default modes) to the vendor.
    /// Shared by the caller path and the resubscription path.
    fn issue_subscribe(&self, tokens: &[u32], mode: StreamMode) -> anyhow::Result<()> {
        self.client.subscribe(tokens)?;
        if mode != StreamMode::default() {
            self.client.set_mode(mode, tokens)?;
        }
        Ok(())
    }

    // ── Event handlers (event-loop task only) ───────────────────────────

    /// Session established. On a reconnect (connection count > 1) the full
    /// tracked subscription set is re-issued so that server-side state
    /// matches — subscriptions are never silently dropped by a reconnect.
    pub fn on_connect(&self) {
        let (attempt, resubscribe) = {
            let mut inner = self.inner.write();
            inner.state = ConnectionState::Connected;
            inner.connection_count += 1;
            let resubscribe = if inner.connection_count > 1 && !inner.subscriptions.is_empty() {
                Some(inner.subscriptions.clone())
            } else {
                None
            };
            (inner.connection_count, resubscribe)
        };

        info!(attempt, "connected to streaming client");

        if let Some(subscriptions) = resubscribe {
            info!(count = subscriptions.len(), "resubscribing instruments after reconnection");
            self.resubscribe_all(subscriptions);
        }

        self.callbacks.emit_connect();
    }

    pub fn on_close(&self, code: Option<u16>, reason: &str) {
        self.inner.write().state = ConnectionState::Disconnected;
        warn!(?code, reason, "streaming session closed");
        self.callbacks.emit_disconnect(code, reason);
    }

    pub fn on_error(&self, code: Option<u16>, reason: &str) {
        error!(?code, reason, "streaming session error");
        self.callbacks.emit_error(code, reason);
    }

    /// The vendor exhausted its reconnect attempts. Terminal until a new
    /// explicit `connect()`.
    pub fn on_no_reconnect(&self) {
        self.inner.write().state = ConnectionState::Failed;
        error!("streaming client gave up reconnecting; session marked FAILED");
        self.callbacks.emit_disconnect(None, "reconnect attempts exhausted");
    }

    /// Ingest a tick batch: per-tick history append (FIFO-capped) and
    /// latest-snapshot overwrite, then a single batch-level fan-out.
    pub fn on_ticks(&self, ticks: Vec<Tick>) {
        let now = Utc::now();
        {
            let mut guard = self.inner.write();
            let inner = &mut *guard;
            inner.last_tick_at = Some(now);
            for tick in &ticks {
                let ring = inner
                    .history
                    .entry(tick.instrument_token)
                    .or_insert_with(|| VecDeque::with_capacity(64));
                ring.push_back(TickRecord {
                    at: now,
                    tick: tick.clone(),
                });
                while ring.len() > TICK_HISTORY_CAP {
                    ring.pop_front();
                }
                inner.latest.insert(tick.instrument_token, tick.clone());
            }
        }

        self.callbacks.emit_ticks(&ticks);
        debug!(count = ticks.len(), "tick batch processed");
    }

    pub fn on_order_update(&self, payload: serde_json::Value) {
        let order_id = payload
            .get("order_id")
            .and_then(|v| v.as_str())
            .unwrap_or("<unknown>")
            .to_string();

        self.inner.write().order_updates.push(OrderRecord {
            at: Utc::now(),
            payload: payload.clone(),
        });

        self.callbacks.emit_order(&payload);
        info!(order_id = %order_id, "order update received");
    }

    /// Re-issue the tracked subscription set, one subscribe per distinct
    /// mode. A failure in one mode group is logged and must not abort the
    /// remaining groups — this runs on the event-delivery path, with no
    /// caller to report to.
    fn resubscribe_all(&self, subscriptions: HashMap<u32, StreamMode>) {
        let mut groups: HashMap<StreamMode, Vec<u32>> = HashMap::new();
        for (token, mode) in subscriptions {
            groups.entry(mode).or_default().push(token);
        }

        for (mode, mut tokens) in groups {
            tokens.sort_unstable();
            match self.issue_subscribe(&tokens, mode) {
                Ok(()) => {
                    info!(count = tokens.len(), mode = %mode, "resubscribed mode group");
                }
                Err(e) => {
                    error!(mode = %mode, tokens = ?tokens, error = %e, "failed to resubscribe mode group");
                }
            }
        }
    }

    // ── Query façade ────────────────────────────────────────────────────

    /// Most recent tick for an instrument. Absent if the instrument never
    /// ticked or was unsubscribed.
    pub fn latest_tick(&self, token: u32) -> Option<Tick> {
        self.inner.read().latest.get(&token).cloned()
    }

    /// The most recent `limit` history entries for an instrument (all when
    /// `limit` is `None`), oldest-first. Re-callable; history survives
    /// unsubscribe.
    pub fn tick_history(&self, token: u32, limit: Option<usize>) -> Vec<TickRecord> {
        let inner = self.inner.read();
        match inner.history.get(&token) {
            Some(ring) => {
                let skip = limit.map_or(0, |n| ring.len().saturating_sub(n));
                ring.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Currently subscribed instruments and their modes.
    pub fn subscribed_instruments(&self) -> HashMap<u32, StreamMode> {
        self.inner.read().subscriptions.clone()
    }

    /// The most recent `limit` order updates (all when `limit` is `None`),
    /// oldest-first.
    pub fn order_updates(&self, limit: Option<usize>) -> Vec<OrderRecord> {
        let inner = self.inner.read();
        let log = &inner.order_updates;
        let skip = limit.map_or(0, |n| log.len().saturating_sub(n));
        log[skip..].to_vec()
    }

    /// Snapshot of the session for status polling.
    pub fn connection_status(&self) -> StatusSnapshot {
        let inner = self.inner.read();
        StatusSnapshot {
            state: inner.state,
            connection_count: inner.connection_count,
            last_tick_at: inner.last_tick_at,
            subscribed_count: inner.subscriptions.len(),
            is_connected: self.client.is_connected(),
        }
    }

    /// Tick history for the selected instruments (all when `tokens` is
    /// `None`), keyed by token. Used by the export façade; BTreeMap keeps
    /// export output ordered deterministically.
    pub fn history_snapshot(&self, tokens: Option<&[u32]>) -> BTreeMap<u32, Vec<TickRecord>> {
        let inner = self.inner.read();
        let mut snapshot = BTreeMap::new();
        match tokens {
            Some(tokens) => {
                for token in tokens {
                    if let Some(ring) = inner.history.get(token) {
                        snapshot.insert(*token, ring.iter().cloned().collect());
                    }
                }
            }
            None => {
                for (token, ring) in &inner.history {
                    snapshot.insert(*token, ring.iter().cloned().collect());
                }
            }
        }
        snapshot
    }

    /// Drop all stored tick history, latest snapshots and order updates.
    /// The subscription set is untouched.
    pub fn clear_data(&self) {
        let mut inner = self.inner.write();
        inner.history.clear();
        inner.latest.clear();
        inner.order_updates.clear();
        drop(inner);
        info!("cleared stored tick data and order updates");
    }
}
