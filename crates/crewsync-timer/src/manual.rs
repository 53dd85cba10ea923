//! Simulated timers driven by a [`ManualClock`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{Clock, ManualClock, Schedule, TimerFactory, TimerFired, TimerId};

#[derive(Debug)]
struct Pending<T> {
    tag: T,
    schedule: Schedule,
    due_ms: u64,
}

#[derive(Debug)]
struct Inner<T> {
    pending: BTreeMap<TimerId, Pending<T>>,
    next_id: u64,
}

/// A [`TimerFactory`] that never fires on its own.
///
/// Tests advance the shared [`ManualClock`] and then drain due timers with
/// [`pop_due`](Self::pop_due), feeding each fire back to the owner one at a
/// time so a fire that cancels another timer is respected. Clones share
/// state, so a test can keep a handle while the engine owns another.
#[derive(Debug, Clone)]
pub struct ManualTimers<T> {
    clock: ManualClock,
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T: Clone> ManualTimers<T> {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            inner: Arc::new(Mutex::new(Inner {
                pending: BTreeMap::new(),
                next_id: 1,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // A panic while holding the lock only happens inside a failing
        // test; keep the data usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Removes and returns the earliest timer due at the clock's current
    /// time. Periodic timers are re-armed one period later.
    pub fn pop_due(&self) -> Option<TimerFired<T>> {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        let (id, _) = inner
            .pending
            .iter()
            .filter(|(_, p)| p.due_ms <= now)
            .min_by_key(|(id, p)| (p.due_ms, **id))?;
        let id = *id;

        let pending = inner.pending.get_mut(&id)?;
        let tag = pending.tag.clone();
        let schedule = pending.schedule;
        match schedule {
            Schedule::Once(_) => {
                inner.pending.remove(&id);
            }
            Schedule::Every(period) => {
                pending.due_ms += (period.as_millis() as u64).max(1);
            }
        }
        Some(TimerFired { id, tag })
    }

    /// Whether the timer is still armed.
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.lock().pending.contains_key(&id)
    }

    /// Tags of all armed timers, in start order.
    pub fn pending_tags(&self) -> Vec<T> {
        self.lock().pending.values().map(|p| p.tag.clone()).collect()
    }
}

impl<T: Clone + Send + 'static> TimerFactory<T> for ManualTimers<T> {
    fn start(&mut self, tag: T, schedule: Schedule) -> TimerId {
        let due_ms = self.clock.now_ms() + schedule.period().as_millis() as u64;
        let mut inner = self.lock();
        let id = TimerId(inner.next_id);
        inner.next_id += 1;
        inner.pending.insert(id, Pending { tag, schedule, due_ms });
        id
    }

    fn cancel(&mut self, id: TimerId) {
        self.lock().pending.remove(&id);
    }

    fn active(&self) -> usize {
        self.lock().pending.len()
    }
}
