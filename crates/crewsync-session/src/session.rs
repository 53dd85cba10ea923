//! Session types: what the server remembers about one connection.

use std::time::Duration;

use crewsync_protocol::{BattleId, PlayerId};
use crewsync_transport::ConnectionId;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Minimum time between two accepted attacks from the same connection.
    ///
    /// Default: 800 ms.
    pub attack_cooldown: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            attack_cooldown: Duration::from_millis(800),
        }
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// The identity a connection acquired by joining a battle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    pub battle_id: BattleId,
    pub player_id: PlayerId,
}

impl Binding {
    pub fn new(battle_id: BattleId, player_id: PlayerId) -> Self {
        Self {
            battle_id,
            player_id,
        }
    }

    /// Whether this binding is exactly `(battle_id, player_id)`.
    pub fn matches(&self, battle_id: &BattleId, player_id: &PlayerId) -> bool {
        &self.battle_id == battle_id && &self.player_id == player_id
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One connection's session.
///
/// Created when the connection is accepted (or lazily on its first join)
/// and dropped when the connection closes. Unlike a player's room
/// membership, a session never outlives its connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: ConnectionId,

    /// `None` until the connection joins a battle. Cleared again if
    /// another connection takes over the same player.
    pub binding: Option<Binding>,

    /// Clock reading (ms) when the session was opened.
    pub opened_at_ms: u64,

    /// Clock reading (ms) of the last attack that was accepted. Rejected
    /// attacks never update this.
    pub last_attack_ms: Option<u64>,
}

impl Session {
    pub fn new(connection_id: ConnectionId, now_ms: u64) -> Self {
        Self {
            connection_id,
            binding: None,
            opened_at_ms: now_ms,
            last_attack_ms: None,
        }
    }

    pub fn is_bound_to(&self, battle_id: &BattleId, player_id: &PlayerId) -> bool {
        self.binding
            .as_ref()
            .is_some_and(|b| b.matches(battle_id, player_id))
    }
}
