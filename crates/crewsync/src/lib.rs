//! # crewsync
//!
//! Real-time battle-room synchronization for crew-based web games.
//!
//! Players join a battle over WebSocket, agree to start a match through a
//! leader's invitation, then play scored rounds where the lowest scorer is
//! eliminated until one player is left. Every room change is broadcast to
//! the whole crew. All state lives in one engine actor, so each transition
//! is atomic.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crewsync::prelude::*;
//!
//! # async fn start() -> Result<(), CrewsyncError> {
//! let server = CrewsyncServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::CrewsyncError;
pub use server::{CrewsyncServer, CrewsyncServerBuilder, ServerConfig};

pub use crewsync_protocol as protocol;
pub use crewsync_room as room;
pub use crewsync_session as session;
pub use crewsync_timer as timer;
pub use crewsync_transport as transport;

/// The types most servers and clients need.
pub mod prelude {
    pub use crate::{CrewsyncError, CrewsyncServer, CrewsyncServerBuilder, ServerConfig};
    pub use crewsync_protocol::{
        AckFrame, BattleId, ClientEvent, Difficulty, ErrorCode, PlayerId, ServerEvent,
        ServerFrame,
    };
    pub use crewsync_room::{BattleConfig, EngineHandle, EngineStats};
    pub use crewsync_transport::ConnectionId;
}
