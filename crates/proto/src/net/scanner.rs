use std::time::{Duration, Instant};

use super::history::PacketHistory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Acked,
    TimedOut,
    /// Released early because the history was full.
    ForceExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPacket {
    pub sequence: u32,
    pub resolution: Resolution,
}

/// Frees history slots whose packets are acknowledged or past the timeout,
/// strictly in send order.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutScanner {
    timeout: Duration,
}

impl TimeoutScanner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Stops at the first record that is still waiting, so a later packet is
    /// never released ahead of an earlier one.
    pub fn scan(&self, history: &mut PacketHistory, now: Instant) -> Vec<ResolvedPacket> {
        let mut resolved = Vec::new();

        while let Some(oldest) = history.oldest() {
            let resolution = if oldest.acknowledged {
                Resolution::Acked
            } else if oldest.is_timed_out(now, self.timeout) {
                Resolution::TimedOut
            } else {
                break;
            };

            let sequence = oldest.sequence;
            history.release_oldest();
            resolved.push(ResolvedPacket {
                sequence,
                resolution,
            });
        }

        resolved
    }
}
