//! Per-room rate limit for `battle:state` snapshots.

use std::time::Duration;

/// Remembers when a room last sent a snapshot.
///
/// Immediate events never pass through here. Only the full snapshot is
/// limited, and a dropped snapshot is simply skipped; the next one carries
/// the newer data.
#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastThrottle {
    last_broadcast_ms: Option<u64>,
}

impl BroadcastThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and records the send if at least `min_interval` has
    /// passed since the last snapshot. Otherwise the snapshot is dropped.
    pub fn allow(&mut self, now_ms: u64, min_interval: Duration) -> bool {
        let min = min_interval.as_millis() as u64;
        let ready = match self.last_broadcast_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= min,
        };
        if ready {
            self.last_broadcast_ms = Some(now_ms);
        }
        ready
    }

    /// Records a snapshot that bypassed the limit.
    pub fn force(&mut self, now_ms: u64) {
        self.last_broadcast_ms = Some(now_ms);
    }

    pub fn last_broadcast_ms(&self) -> Option<u64> {
        self.last_broadcast_ms
    }
}
