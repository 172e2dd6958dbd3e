// =============================================================================
// Callback fan-out registry
// =============================================================================
//
// Five independent observer lists: tick, connect, disconnect, error and
// order. Registration appends (no removal, no de-duplication); dispatch runs
// observers in insertion order. An observer returning an error is logged and
// never suppresses the remaining observers — observers are external code and
// must not be able to corrupt tracker state.
// =============================================================================

use anyhow::Result;
use parking_lot::RwLock;
use tracing::error;

use crate::types::Tick;

pub type TickCallback = Box<dyn Fn(&[Tick]) -> Result<()> + Send + Sync>;
pub type ConnectCallback = Box<dyn Fn() -> Result<()> + Send + Sync>;
pub type DisconnectCallback = Box<dyn Fn(Option<u16>, &str) -> Result<()> + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(Option<u16>, &str) -> Result<()> + Send + Sync>;
pub type OrderCallback = Box<dyn Fn(&serde_json::Value) -> Result<()> + Send + Sync>;

/// Registry of external observers, one ordered list per event category.
#[derive(Default)]
pub struct CallbackRegistry {
    on_tick: RwLock<Vec<TickCallback>>,
    on_connect: RwLock<Vec<ConnectCallback>>,
    on_disconnect: RwLock<Vec<DisconnectCallback>>,
    on_error: RwLock<Vec<ErrorCallback>>,
    on_order: RwLock<Vec<OrderCallback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registration ────────────────────────────────────────────────────

    pub fn add_tick_callback<F>(&self, callback: F)
    where
        F: Fn(&[Tick]) -> Result<()> + Send + Sync + 'static,
    {
        self.on_tick.write().push(Box::new(callback));
    }

    pub fn add_connect_callback<F>(&self, callback: F)
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.on_connect.write().push(Box::new(callback));
    }

    pub fn add_disconnect_callback<F>(&self, callback: F)
    where
        F: Fn(Option<u16>, &str) -> Result<()> + Send + Sync + 'static,
    {
        self.on_disconnect.write().push(Box::new(callback));
    }

    pub fn add_error_callback<F>(&self, callback: F)
    where
        F: Fn(Option<u16>, &str) -> Result<()> + Send + Sync + 'static,
    {
        self.on_error.write().push(Box::new(callback));
    }

    pub fn add_order_callback<F>(&self, callback: F)
    where
        F: Fn(&serde_json::Value) -> Result<()> + Send + Sync + 'static,
    {
        self.on_order.write().push(Box::new(callback));
    }

    // ── Dispatch ────────────────────────────────────────────────────────

    /// Fan a tick batch out to all tick observers (one call per batch).
    pub fn emit_ticks(&self, ticks: &[Tick]) {
        for (index, callback) in self.on_tick.read().iter().enumerate() {
            if let Err(e) = callback(ticks) {
                error!(index, error = %e, "tick observer failed");
            }
        }
    }

    pub fn emit_connect(&self) {
        for (index, callback) in self.on_connect.read().iter().enumerate() {
            if let Err(e) = callback() {
                error!(index, error = %e, "connect observer failed");
            }
        }
    }

    pub fn emit_disconnect(&self, code: Option<u16>, reason: &str) {
        for (index, callback) in self.on_disconnect.read().iter().enumerate() {
            if let Err(e) = callback(code, reason) {
                error!(index, error = %e, "disconnect observer failed");
            }
        }
    }

    pub fn emit_error(&self, code: Option<u16>, reason: &str) {
        for (index, callback) in self.on_error.read().iter().enumerate() {
            if let Err(e) = callback(code, reason) {
                error!(index, error = %e, "error observer failed");
            }
        }
    }

    pub fn emit_order(&self, payload: &serde_json::Value) {
        for (index, callback) in self.on_order.read().iter().enumerate() {
            if let Err(e) = callback(payload) {
                error!(index, error = %e, "order observer failed");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn observers_run_in_insertion_order() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3 {
            let seen = seen.clone();
            registry.add_tick_callback(move |_| {
                seen.lock().push(id);
                Ok(())
            });
        }

        registry.emit_ticks(&[Tick::ltp(100, 1.0)]);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn failing_observer_does_not_suppress_later_ones() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        {
            let seen = seen.clone();
            registry.add_tick_callback(move |_| {
                seen.lock().push("first");
                Ok(())
            });
        }
        registry.add_tick_callback(|_| Err(anyhow!("observer blew up")));
        {
            let seen = seen.clone();
            registry.add_tick_callback(move |_| {
                seen.lock().push("last");
                Ok(())
            });
        }

        registry.emit_ticks(&[Tick::ltp(100, 1.0)]);
        assert_eq!(*seen.lock(), vec!["first", "last"]);
    }

    #[test]
    fn failure_in_one_category_leaves_other_categories_intact() {
        let registry = CallbackRegistry::new();
        let connected = Arc::new(Mutex::new(false));

        registry.add_tick_callback(|_| Err(anyhow!("tick observer failed")));
        {
            let connected = connected.clone();
            registry.add_connect_callback(move || {
                *connected.lock() = true;
                Ok(())
            });
        }

        registry.emit_ticks(&[Tick::ltp(1, 1.0)]);
        registry.emit_connect();
        assert!(*connected.lock());
    }

    #[test]
    fn disconnect_observers_receive_code_and_reason() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(None));

        {
            let seen = seen.clone();
            registry.add_disconnect_callback(move |code, reason| {
                *seen.lock() = Some((code, reason.to_string()));
                Ok(())
            });
        }

        registry.emit_disconnect(Some(1006), "abnormal closure");
        assert_eq!(*seen.lock(), Some((Some(1006), "abnormal closure".to_string())));
    }

    #[test]
    fn order_observers_receive_raw_payload() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(None));

        {
            let seen = seen.clone();
            registry.add_order_callback(move |payload| {
                *seen.lock() = payload.get("order_id").cloned();
                Ok(())
            });
        }

        registry.emit_order(&serde_json::json!({ "order_id": "X-1" }));
        assert_eq!(*seen.lock(), Some(serde_json::json!("X-1")));
    }
}
