//! Error types for the room layer.

use crewsync_protocol::{ErrorBody, ErrorCode};
use crewsync_session::SessionError;

/// A rejected battle action.
///
/// Every rejection carries the wire [`ErrorCode`] the client sees in
/// `battle:error`, plus a human-readable message. None of them are fatal:
/// the connection stays open and the room is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct BattleError {
    pub code: ErrorCode,
    pub message: String,
}

impl BattleError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_battle_id() -> Self {
        Self::new(ErrorCode::InvalidBattleId, "battleId is required")
    }

    pub fn invalid_player_id() -> Self {
        Self::new(ErrorCode::InvalidPlayerId, "playerId is required")
    }

    pub fn room_not_found(battle_id: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::RoomNotFound,
            format!("battle {battle_id} not found"),
        )
    }

    pub fn not_leader() -> Self {
        Self::new(ErrorCode::NotLeader, "only the leader can do that")
    }

    pub fn match_not_active() -> Self {
        Self::new(ErrorCode::MatchNotActive, "no match is running")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Maps a failed identity check to `code`.
    ///
    /// A rate-limit failure always maps to `ATTACK_RATE_LIMITED` whatever
    /// `code` says.
    pub fn from_session(err: SessionError, code: ErrorCode) -> Self {
        match err {
            SessionError::RateLimited { .. } => {
                Self::new(ErrorCode::AttackRateLimited, err.to_string())
            }
            other => Self::new(code, other.to_string()),
        }
    }

    /// The `battle:error` payload.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code,
            message: self.message.clone(),
        }
    }
}

/// The engine actor has stopped, so its command channel is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("battle engine is unavailable")]
pub struct EngineUnavailable;

impl From<BattleError> for ErrorBody {
    fn from(err: BattleError) -> Self {
        ErrorBody {
            code: err.code,
            message: err.message,
        }
    }
}
