//! Timer vocabulary shared by every [`TimerFactory`].

use std::fmt;
use std::time::Duration;

/// Identifies one started timer. Never reused within a factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub(crate) u64);

impl TimerId {
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// When a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Once, after the delay.
    Once(Duration),
    /// Repeatedly, first after one period. Late ticks are skipped, not
    /// replayed in a burst.
    Every(Duration),
}

impl Schedule {
    pub fn period(&self) -> Duration {
        match self {
            Self::Once(d) | Self::Every(d) => *d,
        }
    }
}

/// A timer went off. `tag` is whatever the owner attached at start time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired<T> {
    pub id: TimerId,
    pub tag: T,
}

/// Starts and cancels timers that report back with a tag.
pub trait TimerFactory<T>: Send + 'static {
    /// Starts a timer. The returned id is unique for this factory.
    fn start(&mut self, tag: T, schedule: Schedule) -> TimerId;

    /// Stops a timer. Cancelling an unknown or finished timer is a no-op.
    fn cancel(&mut self, id: TimerId);

    /// Number of timers that are started and not yet cancelled or spent.
    fn active(&self) -> usize;
}
