//! Error types for the session layer.

use crewsync_protocol::{BattleId, PlayerId};
use crewsync_transport::ConnectionId;

/// Errors that can occur while checking a connection's session.
///
/// The room layer maps these onto wire error codes; which code depends on
/// the action (a failed identity check on `attack` is
/// `UNAUTHORIZED_ATTACK`, on `battle:score` it is `UNAUTHORIZED`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The connection was never opened, or has already been closed.
    #[error("no session for connection {0}")]
    NotFound(ConnectionId),

    /// The connection has not joined a battle yet.
    #[error("connection {0} has not joined a battle")]
    NotBound(ConnectionId),

    /// The connection is bound, but to a different battle or player.
    #[error("connection {connection_id} is not bound to player {player_id} in battle {battle_id}")]
    IdentityMismatch {
        connection_id: ConnectionId,
        battle_id: BattleId,
        player_id: PlayerId,
    },

    /// The previous accepted attack was too recent.
    #[error("attack rate limited, retry in {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
}
