// =============================================================================
// Ticker Hub — Main Entry Point
// =============================================================================
//
// Runs the subscription & session tracker against the simulated streaming
// feed. A real vendor client slots in behind the same `TickerClient` trait;
// the login flow that produces access tokens lives outside this process and
// only its session store is read here.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod config;
mod error;
mod session_store;
mod sim_feed;
mod ticker;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::RuntimeConfig;
use crate::session_store::SessionStore;
use crate::sim_feed::SimTicker;
use crate::ticker::{export_ticks, run_event_loop, TickerTracker};

const CONFIG_PATH: &str = "ticker_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Ticker Hub starting up");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Override instrument tokens from env if available.
    if let Ok(tokens) = std::env::var("TICKERHUB_TOKENS") {
        let parsed: Vec<u32> = tokens
            .split(',')
            .filter_map(|t| t.trim().parse().ok())
            .collect();
        if !parsed.is_empty() {
            config.tokens = parsed;
        }
    }

    info!(tokens = ?config.tokens, mode = %config.default_mode, "Configured instruments");

    // ── 2. Session store ─────────────────────────────────────────────────
    let store = SessionStore::open(config.credentials_path.clone());
    match store.get_latest() {
        Ok(Some(credentials)) => {
            if credentials.access_token.is_some() {
                info!(api_key = %credentials.api_key, "Stored credentials found with access token");
            } else {
                warn!(
                    api_key = %credentials.api_key,
                    "Stored credentials have no access token; complete the login flow to obtain one"
                );
            }
        }
        Ok(None) => warn!(path = %store.path().display(), "No stored credentials; running with the simulated feed only"),
        Err(e) => error!(error = %e, "Failed to read session store"),
    }

    // ── 3. Streaming client + tracker ────────────────────────────────────
    let (client, events) = SimTicker::spawn(
        Duration::from_millis(config.tick_interval_ms),
        config.sim_drop_after_batches,
    );
    let tracker = Arc::new(TickerTracker::new(Arc::new(client)));

    // Demo observers: log session transitions and the first tick per batch.
    tracker.callbacks().add_connect_callback(|| {
        info!("observer: ticker connected");
        Ok(())
    });
    tracker.callbacks().add_disconnect_callback(|code, reason| {
        warn!(?code, reason, "observer: ticker disconnected");
        Ok(())
    });
    tracker.callbacks().add_error_callback(|code, reason| {
        error!(?code, reason, "observer: ticker error");
        Ok(())
    });
    tracker.callbacks().add_tick_callback(|ticks| {
        if let Some(tick) = ticks.first() {
            info!(
                token = tick.instrument_token,
                ltp = tick.last_price,
                batch = ticks.len(),
                "observer: tick batch"
            );
        }
        Ok(())
    });
    tracker.callbacks().add_order_callback(|payload| {
        info!(order = %payload, "observer: order update");
        Ok(())
    });

    // ── 4. Event loop + connection ───────────────────────────────────────
    let event_loop = tokio::spawn(run_event_loop(tracker.clone(), events));

    tracker.connect()?;
    tracker.subscribe(&config.tokens, config.default_mode)?;

    // ── 5. Periodic status log ───────────────────────────────────────────
    let status_tracker = tracker.clone();
    let status_every = Duration::from_secs(config.status_log_secs.max(1));
    let status_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(status_every);
        loop {
            interval.tick().await;
            let status = status_tracker.connection_status();
            info!(
                state = %status.state,
                connections = status.connection_count,
                subscribed = status.subscribed_count,
                last_tick_at = ?status.last_tick_at,
                "connection status"
            );
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");
    status_loop.abort();

    if let Some(path) = &config.export_path {
        match export_ticks(&tracker, path, None) {
            Ok(()) => info!(path = %path, "Tick history exported"),
            Err(e) => error!(error = %e, "Failed to export tick history"),
        }
    }

    tracker.disconnect();
    if let Err(e) = event_loop.await {
        error!(error = %e, "Event loop task failed");
    }

    if let Err(e) = config.save(CONFIG_PATH) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Ticker Hub shut down complete.");
    Ok(())
}
