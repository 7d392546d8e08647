//! Logging setup and point-in-time queue statistics.

use serde::{Deserialize, Serialize};

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// In-process view of one queue, for health and stats reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queue_id: String,
    /// Receives parked on the long-poll coordinator.
    pub waiting_receives: usize,
    /// Messages received and not yet visible again.
    pub in_flight: usize,
}
