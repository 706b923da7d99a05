//! Engine configuration.

use std::time::Duration;

/// Delay before retrying the socket after a clean close.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Interval between fetches while degraded to polling.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default channel capacity for link events (frames and poll ticks).
const DEFAULT_LINK_BUFFER: usize = 256;

/// Default channel capacity for session events delivered to the UI layer.
const DEFAULT_EVENT_BUFFER: usize = 64;

/// Tunables for the sync engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delay before a reconnect attempt after the socket closes.
    pub reconnect_delay: Duration,
    /// Fetch interval while degraded to polling.
    pub poll_interval: Duration,
    /// Capacity of the internal link event channel.
    pub link_buffer: usize,
    /// Capacity of the session event channel consumed by the UI layer.
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            link_buffer: DEFAULT_LINK_BUFFER,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}
