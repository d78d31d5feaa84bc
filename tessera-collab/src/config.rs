//! Collaboration configuration.

use std::time::Duration;

/// Tunables for one registry and every session it manages.
#[derive(Debug, Clone)]
pub struct CollabConfig {
    /// Master switch. When false, `CollabRegistry::acquire` returns
    /// `None` and no network activity ever happens.
    pub enabled: bool,
    /// Base URL of the sync endpoint, e.g. "https://example.com/wp-json".
    pub base_url: String,
    /// Delay between poll ticks.
    pub poll_interval: Duration,
    /// Per-request timeout for the HTTP exchange.
    pub request_timeout: Duration,
    /// Peers whose server-reported idle time exceeds
    /// `miss_threshold * poll_interval` render as disconnected.
    pub miss_threshold: u32,
    /// Consecutive failed polls before the local client reports itself
    /// disconnected.
    pub failure_threshold: u32,
    /// Local edits landing within this window of the previous edit
    /// collapse into one undo step.
    pub undo_capture_window: Duration,
    /// Maximum undo steps retained per session.
    pub undo_depth: usize,
    /// Maximum unacked updates queued per session. At capacity the
    /// queue collapses into a single diff against the last merged
    /// server state, so long offline stretches cost memory bounded by
    /// document size rather than edit count.
    pub max_pending_updates: usize,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: String::new(),
            poll_interval: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
            miss_threshold: 3,
            failure_threshold: 3,
            undo_capture_window: Duration::from_millis(500),
            undo_depth: 200,
            max_pending_updates: 10_000,
        }
    }
}

impl CollabConfig {
    /// How long a peer may go unseen before rendering as disconnected.
    pub fn peer_timeout(&self) -> Duration {
        self.poll_interval * self.miss_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_timeout_scales_with_interval() {
        let config = CollabConfig {
            poll_interval: Duration::from_secs(2),
            miss_threshold: 3,
            ..CollabConfig::default()
        };
        assert_eq!(config.peer_timeout(), Duration::from_secs(6));
    }
}
