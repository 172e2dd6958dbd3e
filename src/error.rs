// =============================================================================
// Error taxonomy for the Ticker Hub
// =============================================================================
//
// Direct-call failures (subscribe / unsubscribe / set_mode invoked by a
// caller) propagate as `TickerError` to that caller. Failures on the event
// delivery path (resubscription after a reconnect, observer dispatch) are
// logged and never thrown across the worker boundary — there is no caller
// there to receive them.
// =============================================================================

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TickerError {
    /// A streaming mode outside {ltp, quote, full} was supplied.
    #[error("invalid streaming mode '{0}' (expected one of: ltp, quote, full)")]
    InvalidMode(String),

    /// The streaming client rejected a subscribe / unsubscribe / set_mode
    /// request issued directly by a caller.
    #[error("streaming client rejected {action}: {cause:#}")]
    Subscription {
        action: &'static str,
        cause: anyhow::Error,
    },

    /// Connecting to or closing the streaming session failed. The session
    /// state is set to FAILED and error observers are notified as well.
    #[error("streaming connection failure: {0}")]
    Connection(String),

    /// Writing an export file failed.
    #[error("failed to write export file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TickerError {
    pub(crate) fn subscription(action: &'static str, cause: anyhow::Error) -> Self {
        Self::Subscription { action, cause }
    }
}
