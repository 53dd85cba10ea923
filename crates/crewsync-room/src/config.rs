//! Battle configuration and the match phase state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// BattleConfig
// ---------------------------------------------------------------------------

/// Tunables shared by every battle room on a server.
///
/// The defaults are what production runs with. Tests shrink the intervals,
/// and the binary lets operators override them from the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleConfig {
    /// How often an active match announces the next task.
    pub task_interval: Duration,

    /// How long a round lasts before it is force-completed.
    pub round_duration: Duration,

    /// Minimum gap between two throttled `battle:state` snapshots of the
    /// same room. Forced snapshots ignore it.
    pub min_broadcast_interval: Duration,

    /// Minimum gap between two accepted attacks from one connection.
    pub attack_cooldown: Duration,

    pub min_damage: i32,
    pub max_damage: i32,

    /// Used when the client sends no damage, or an unusable one.
    pub default_damage: i32,

    /// Hp every player joins with.
    pub max_hp: i32,

    /// Task prompts announced round-robin while a match is active.
    pub task_pool: Vec<String>,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            task_interval: Duration::from_secs(5),
            round_duration: Duration::from_secs(60),
            min_broadcast_interval: Duration::from_millis(250),
            attack_cooldown: Duration::from_millis(800),
            min_damage: 1,
            max_damage: 30,
            default_damage: 10,
            max_hp: 100,
            task_pool: default_task_pool(),
        }
    }
}

impl BattleConfig {
    /// Returns a copy with nonsense values repaired.
    ///
    /// Zero intervals would make a Tokio interval panic, an inverted damage
    /// range would make `clamp` panic, and an empty pool leaves nothing to
    /// announce.
    pub fn validated(mut self) -> Self {
        let floor = Duration::from_millis(1);
        self.task_interval = self.task_interval.max(floor);
        self.round_duration = self.round_duration.max(floor);
        self.max_hp = self.max_hp.max(1);
        if self.max_damage < self.min_damage {
            std::mem::swap(&mut self.max_damage, &mut self.min_damage);
        }
        self.min_damage = self.min_damage.max(0);
        self.max_damage = self.max_damage.max(self.min_damage);
        self.default_damage = self.default_damage.clamp(self.min_damage, self.max_damage);
        if self.task_pool.is_empty() {
            self.task_pool = default_task_pool();
        }
        self
    }

    /// Clamps a coerced damage value into the configured range and rounds
    /// it. `None` (missing, non-numeric, non-finite or negative input)
    /// becomes the default damage.
    pub fn resolve_damage(&self, raw: Option<f64>) -> i32 {
        match raw.filter(|d| d.is_finite() && *d >= 0.0) {
            Some(d) => {
                let clamped = d.clamp(self.min_damage as f64, self.max_damage as f64);
                clamped.round() as i32
            }
            None => self.default_damage,
        }
    }
}

fn default_task_pool() -> Vec<String> {
    [
        "Clear three lines at once",
        "Match five blocks of one color",
        "Build a combo of four",
        "Survive without using a hold",
        "Clear the bottom row",
        "Chain two combos in a row",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

// ---------------------------------------------------------------------------
// MatchPhase
// ---------------------------------------------------------------------------

/// Where a room is in its match lifecycle.
///
/// ```text
///           consensus              last survivor
/// Lobby ──────────────→ Active ──────────────────→ Finished
///                          ↑                          │
///                          └──────── consensus ───────┘
/// ```
///
/// - **Lobby**: players gather and vote on invitations.
/// - **Active**: rounds run, timers tick, scores and attacks count.
/// - **Finished**: a winner was declared (or everyone left). A fresh
///   invitation cycle can start the next match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchPhase {
    #[default]
    Lobby,
    Active,
    Finished,
}

impl MatchPhase {
    /// `matchActive` on the wire.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether a consensus may start a match from this phase.
    pub fn can_start(&self) -> bool {
        !self.is_active()
    }

    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Lobby, Self::Active)
                | (Self::Finished, Self::Active)
                | (Self::Active, Self::Finished)
        )
    }
}

impl std::fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lobby => write!(f, "Lobby"),
            Self::Active => write!(f, "Active"),
            Self::Finished => write!(f, "Finished"),
        }
    }
}
