//! Timers backed by Tokio tasks.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::{self, Instant as TokioInstant, MissedTickBehavior};
use tracing::trace;

use crate::{Schedule, TimerFactory, TimerFired, TimerId};

/// Spawns one Tokio task per timer; each fire is sent on an unbounded
/// channel to the owner.
///
/// Must be used from inside a Tokio runtime.
pub struct TokioTimers<T> {
    tx: mpsc::UnboundedSender<TimerFired<T>>,
    tasks: HashMap<TimerId, AbortHandle>,
    next_id: u64,
}

impl<T: Clone + Send + 'static> TokioTimers<T> {
    /// Creates the factory and the receiver its fires arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                tasks: HashMap::new(),
                next_id: 1,
            },
            rx,
        )
    }
}

impl<T: Clone + Send + 'static> TimerFactory<T> for TokioTimers<T> {
    fn start(&mut self, tag: T, schedule: Schedule) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;

        // Spent one-shot tasks are dropped here rather than on fire, since
        // the factory is not told when a task finishes.
        self.tasks.retain(|_, handle| !handle.is_finished());

        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            match schedule {
                Schedule::Once(delay) => {
                    time::sleep(delay).await;
                    trace!(timer = %id, "one-shot timer fired");
                    let _ = tx.send(TimerFired { id, tag });
                }
                Schedule::Every(period) => {
                    let mut ticker =
                        time::interval_at(TokioInstant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                    loop {
                        ticker.tick().await;
                        trace!(timer = %id, "periodic timer fired");
                        if tx.send(TimerFired { id, tag: tag.clone() }).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        self.tasks.insert(id, handle.abort_handle());
        id
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(handle) = self.tasks.remove(&id) {
            handle.abort();
            trace!(timer = %id, "timer cancelled");
        }
    }

    fn active(&self) -> usize {
        self.tasks.values().filter(|h| !h.is_finished()).count()
    }
}

impl<T> Drop for TokioTimers<T> {
    fn drop(&mut self) {
        for handle in self.tasks.values() {
            handle.abort();
        }
    }
}
