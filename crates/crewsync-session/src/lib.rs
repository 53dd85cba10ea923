//! Connection sessions for crewsync.
//!
//! A session is the server's record of one live connection:
//!
//! 1. **Identity binding**: after `joinBattle` a connection is bound to
//!    exactly one `(battleId, playerId)` pair, and every privileged action
//!    is checked against that binding rather than the ids the client puts
//!    in the payload ([`SessionManager::authorize`]).
//! 2. **Attack cooldown**: the time of the connection's last accepted
//!    attack ([`SessionManager::check_attack`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← asks "may this connection act as this player?"
//!     ↕
//! Session Layer (this crate)  ← connection → identity, cooldown state
//!     ↕
//! Protocol Layer (below)  ← provides BattleId, PlayerId
//! ```

mod error;
mod manager;
mod session;

pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Binding, Session, SessionConfig};
