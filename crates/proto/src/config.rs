use std::time::Duration;

pub const DEFAULT_MAX_PEERS: usize = 16;
pub const DEFAULT_HISTORY_CAPACITY: usize = 64;
pub const DEFAULT_PACKET_TIMEOUT: Duration = Duration::from_secs(2);

/// What to do when a peer's packet history has no free slot left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Refuse to send until the timeout scanner frees a slot.
    #[default]
    Reject,
    /// Drop the oldest unresolved record and accept that its fate is unknown.
    ExpireOldest,
}

#[derive(Debug, Clone)]
pub struct LayerConfig {
    pub max_peers: usize,
    pub history_capacity: usize,
    pub packet_timeout: Duration,
    pub overflow_policy: OverflowPolicy,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            max_peers: DEFAULT_MAX_PEERS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            packet_timeout: DEFAULT_PACKET_TIMEOUT,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}
