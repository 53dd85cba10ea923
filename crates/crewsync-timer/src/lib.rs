//! Clocks and per-room timers for crewsync.
//!
//! The battle engine needs two things from time: "what time is it" (for
//! throttling, cooldowns and snapshot timestamps) and "call me back later"
//! (task feed and round timeout). Both sit behind traits so the engine can
//! run against real time in production and simulated time in tests.
//!
//! | Concern | Trait | Production | Tests |
//! |---|---|---|---|
//! | current time | [`Clock`] | [`TokioClock`] | [`ManualClock`] |
//! | callbacks | [`TimerFactory`] | [`TokioTimers`] | [`ManualTimers`] |
//!
//! # Delivery model
//!
//! Timers never call into the engine directly. A fired timer produces a
//! [`TimerFired`] value carrying the caller's tag; the owner feeds it back
//! into its single command loop. This keeps every state mutation on one
//! task:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = commands.recv() => engine.handle(cmd),
//!         Some(fired) = timer_rx.recv() => engine.on_timer(fired),
//!     }
//! }
//! ```
//!
//! Cancelling is best-effort: a timer that already fired may still have a
//! [`TimerFired`] in flight. Owners must check the fired [`TimerId`]
//! against the one they currently hold before acting.

mod clock;
mod manual;
mod timer;
mod tokio_timers;

pub use clock::{Clock, ManualClock, TokioClock};
pub use manual::ManualTimers;
pub use timer::{Schedule, TimerFactory, TimerFired, TimerId};
pub use tokio_timers::TokioTimers;
