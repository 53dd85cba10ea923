//! Identity and vocabulary types shared by every layer.
//!
//! Battle and player ids are opaque strings chosen by the surrounding
//! product (crew service, account system). The engine never parses them;
//! it only compares them, so they are newtypes over `String`.

use std::fmt;
use std::str::FromStr;

use crewsync_transport::ConnectionId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifies one battle room.
///
/// `#[serde(transparent)]` keeps the JSON shape a plain string, so
/// `BattleId::new("b1")` travels as `"b1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BattleId(String);

impl BattleId {
    /// Wraps a raw id. Callers validate non-emptiness first.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BattleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one player. Same shape as [`BattleId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Wraps a raw id. Callers validate non-emptiness first.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Difficulty
// ---------------------------------------------------------------------------

/// Match difficulty chosen by the leader when issuing an invitation.
///
/// The engine only stores and broadcasts it; tuning per difficulty lives
/// in the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// The wire spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a difficulty string is not one of `easy`, `medium`, `hard`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown difficulty {0:?}")]
pub struct UnknownDifficulty(pub String);

impl FromStr for Difficulty {
    type Err = UnknownDifficulty;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            _ => Err(UnknownDifficulty(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// Recipient: where a dispatch goes
// ---------------------------------------------------------------------------

/// Who should receive an outbound event.
///
/// The engine speaks in rooms and connections; the server resolves a
/// `Room` recipient to the connections of that room's current members at
/// delivery time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Every connection whose player is a member of the room.
    Room(BattleId),
    /// One specific connection (errors, acknowledgements).
    Connection(ConnectionId),
}

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

/// Machine-readable rejection reasons sent in `battle:error`.
///
/// None of these close the connection. Clients that see a not-found code
/// should send `broadcastState` to resynchronize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- validation --
    InvalidBattleId,
    InvalidPlayerId,
    InvalidAttack,
    InvalidDifficulty,
    InvalidScore,
    InvalidTarget,
    InvalidPlayers,
    InvalidPayload,
    UnknownEvent,

    // -- authorization --
    Unauthorized,
    UnauthorizedAttack,
    NotLeader,

    // -- rate limit --
    AttackRateLimited,

    // -- not found / state --
    RoomNotFound,
    InvitationNotFound,
    PlayerNotInRoom,
    MatchNotActive,
    PlayerEliminated,
    AttackerDefeated,

    // -- internal --
    JoinFailed,
    InternalError,
}

impl ErrorCode {
    /// The wire spelling, e.g. `"ATTACK_RATE_LIMITED"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidBattleId => "INVALID_BATTLE_ID",
            Self::InvalidPlayerId => "INVALID_PLAYER_ID",
            Self::InvalidAttack => "INVALID_ATTACK",
            Self::InvalidDifficulty => "INVALID_DIFFICULTY",
            Self::InvalidScore => "INVALID_SCORE",
            Self::InvalidTarget => "INVALID_TARGET",
            Self::InvalidPlayers => "INVALID_PLAYERS",
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::UnknownEvent => "UNKNOWN_EVENT",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::UnauthorizedAttack => "UNAUTHORIZED_ATTACK",
            Self::NotLeader => "NOT_LEADER",
            Self::AttackRateLimited => "ATTACK_RATE_LIMITED",
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::InvitationNotFound => "INVITATION_NOT_FOUND",
            Self::PlayerNotInRoom => "PLAYER_NOT_IN_ROOM",
            Self::MatchNotActive => "MATCH_NOT_ACTIVE",
            Self::PlayerEliminated => "PLAYER_ELIMINATED",
            Self::AttackerDefeated => "ATTACKER_DEFEATED",
            Self::JoinFailed => "JOIN_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// `true` for codes the client may simply retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AttackRateLimited)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&BattleId::new("b-1")).unwrap();
        assert_eq!(json, "\"b-1\"");
        let pid: PlayerId = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(pid, PlayerId::new("alice"));
        assert_eq!(pid.to_string(), "alice");
    }

    #[test]
    fn test_difficulty_parses_case_insensitively() {
        assert_eq!("easy".parse::<Difficulty>(), Ok(Difficulty::Easy));
        assert_eq!(" Hard ".parse::<Difficulty>(), Ok(Difficulty::Hard));
        assert_eq!(
            "nightmare".parse::<Difficulty>(),
            Err(UnknownDifficulty("nightmare".into()))
        );
    }

    #[test]
    fn test_difficulty_wire_format_is_lowercase() {
        let json = serde_json::to_string(&Difficulty::Medium).unwrap();
        assert_eq!(json, "\"medium\"");
    }

    #[test]
    fn test_error_code_wire_spelling_matches_as_str() {
        for code in [
            ErrorCode::InvalidBattleId,
            ErrorCode::UnauthorizedAttack,
            ErrorCode::AttackRateLimited,
            ErrorCode::InvitationNotFound,
            ErrorCode::JoinFailed,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn test_only_rate_limit_is_retryable() {
        assert!(ErrorCode::AttackRateLimited.is_retryable());
        assert!(!ErrorCode::NotLeader.is_retryable());
    }
}
