//! Battle rooms for crewsync.
//!
//! One engine owns every room. It runs as a single Tokio task (actor
//! model) that applies client actions, disconnects, and timer fires one
//! at a time.
//!
//! # Key types
//!
//! - [`BattleEngine`]: the room state machine, free of I/O
//! - [`EngineHandle`]: sends commands to the running engine actor
//! - [`BattleRoom`]: one battle's members, votes, scores, and eliminations
//! - [`RoomRegistry`]: battle id → room
//! - [`MatchPhase`]: Lobby → Active → Finished
//! - [`BattleConfig`]: intervals, cooldowns, damage range, task pool

mod actor;
mod config;
mod engine;
mod error;
mod registry;
mod room;
mod throttle;

pub use actor::{spawn_engine, ConnectionSender, EngineHandle, EngineStats};
pub use config::{BattleConfig, MatchPhase};
pub use engine::{BattleEngine, Dispatch, TimerKind, TimerTag};
pub use error::{BattleError, EngineUnavailable};
pub use registry::RoomRegistry;
pub use room::{BattleRoom, PlayerState};
pub use throttle::BroadcastThrottle;
