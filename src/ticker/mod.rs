pub mod callbacks;
pub mod client;
pub mod export;
pub mod tracker;

// Re-export the main surface for convenient access (e.g. `use crate::ticker::TickerTracker`).
pub use callbacks::CallbackRegistry;
pub use client::{event_channel, run_event_loop, EventReceiver, EventSender, TickerClient, TickerEvent};
pub use export::export_ticks;
pub use tracker::{TickerTracker, TICK_HISTORY_CAP};
