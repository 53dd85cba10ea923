//! Battle room state: members, invitation votes, scores, and eliminations.
//!
//! A [`BattleRoom`] is plain data plus the small state transitions that
//! only touch that data. Anything that also needs timers, the clock, or
//! identity checks lives in the engine, which is the only code that holds
//! a `&mut BattleRoom`.

use std::collections::{BTreeMap, HashMap};

use crewsync_protocol::{BattleId, BattleSnapshot, Difficulty, PlayerId, PlayerView};
use crewsync_timer::TimerId;
use crewsync_transport::ConnectionId;

use crate::{BroadcastThrottle, MatchPhase};

/// One member of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub player_id: PlayerId,
    pub name: String,
    /// Always within `[0, max_hp]`.
    pub hp: i32,
    /// The connection currently acting as this player.
    pub connection_id: ConnectionId,
}

/// Everything the server knows about one battle.
#[derive(Debug)]
pub struct BattleRoom {
    battle_id: BattleId,
    players: HashMap<PlayerId, PlayerState>,
    /// Membership in join order. Drives elimination tie-breaks and leader
    /// reassignment.
    join_order: Vec<PlayerId>,
    leader_id: Option<PlayerId>,
    active_invitation_id: Option<String>,
    /// Set once the active invitation has started a match. A spent
    /// invitation still takes votes but can never start another one.
    invitation_spent: bool,
    invitation_responses: HashMap<PlayerId, bool>,
    phase: MatchPhase,
    difficulty: Difficulty,
    round: u32,
    scores: HashMap<PlayerId, i64>,
    /// Ordered, no duplicates.
    eliminated: Vec<PlayerId>,
    task_index: usize,
    created_at_ms: u64,
    last_event_ms: u64,
    pub(crate) throttle: BroadcastThrottle,
    pub(crate) task_timer: Option<TimerId>,
    pub(crate) round_timer: Option<TimerId>,
}

impl BattleRoom {
    pub fn new(battle_id: BattleId, now_ms: u64) -> Self {
        Self {
            battle_id,
            players: HashMap::new(),
            join_order: Vec::new(),
            leader_id: None,
            active_invitation_id: None,
            invitation_spent: false,
            invitation_responses: HashMap::new(),
            phase: MatchPhase::Lobby,
            difficulty: Difficulty::default(),
            round: 0,
            scores: HashMap::new(),
            eliminated: Vec::new(),
            task_index: 0,
            created_at_ms: now_ms,
            last_event_ms: now_ms,
            throttle: BroadcastThrottle::new(),
            task_timer: None,
            round_timer: None,
        }
    }

    // -- accessors --------------------------------------------------------

    pub fn battle_id(&self) -> &BattleId {
        &self.battle_id
    }

    pub fn player(&self, player_id: &PlayerId) -> Option<&PlayerState> {
        self.players.get(player_id)
    }

    pub(crate) fn player_mut(&mut self, player_id: &PlayerId) -> Option<&mut PlayerState> {
        self.players.get_mut(player_id)
    }

    pub fn contains(&self, player_id: &PlayerId) -> bool {
        self.players.contains_key(player_id)
    }

    /// Player ids in join order.
    pub fn join_order(&self) -> &[PlayerId] {
        &self.join_order
    }

    /// Members in join order.
    pub fn players(&self) -> impl Iterator<Item = &PlayerState> {
        self.join_order.iter().filter_map(|id| self.players.get(id))
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn leader_id(&self) -> Option<&PlayerId> {
        self.leader_id.as_ref()
    }

    pub fn active_invitation_id(&self) -> Option<&str> {
        self.active_invitation_id.as_deref()
    }

    /// Whether the active invitation already started a match.
    pub fn is_invitation_spent(&self) -> bool {
        self.invitation_spent
    }

    pub fn response(&self, player_id: &PlayerId) -> Option<bool> {
        self.invitation_responses.get(player_id).copied()
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn is_match_active(&self) -> bool {
        self.phase.is_active()
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    /// The recorded score, if the player has one.
    pub fn score(&self, player_id: &PlayerId) -> Option<i64> {
        self.scores.get(player_id).copied()
    }

    pub fn eliminated(&self) -> &[PlayerId] {
        &self.eliminated
    }

    pub fn is_eliminated(&self, player_id: &PlayerId) -> bool {
        self.eliminated.contains(player_id)
    }

    /// Non-eliminated members in join order.
    pub fn active_players(&self) -> impl Iterator<Item = &PlayerId> {
        self.join_order
            .iter()
            .filter(|id| !self.eliminated.contains(id))
    }

    pub fn task_index(&self) -> usize {
        self.task_index
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    pub fn last_event_ms(&self) -> u64 {
        self.last_event_ms
    }

    /// Whether the task feed and round timers are both installed.
    pub fn timers_running(&self) -> bool {
        self.task_timer.is_some() && self.round_timer.is_some()
    }

    pub(crate) fn touch(&mut self, now_ms: u64) {
        self.last_event_ms = now_ms;
    }

    // -- membership -------------------------------------------------------

    /// Inserts or refreshes a member. Returns the connection that acted as
    /// this player before, if it was a different one.
    ///
    /// A re-joining player keeps their join position. The first member
    /// becomes leader when the room has none.
    pub(crate) fn upsert_player(&mut self, player: PlayerState) -> Option<ConnectionId> {
        let player_id = player.player_id.clone();
        let new_conn = player.connection_id;
        let previous = self.players.insert(player_id.clone(), player);
        if previous.is_none() {
            self.join_order.push(player_id.clone());
        }
        if self.leader_id.is_none() {
            self.leader_id = Some(player_id);
        }
        previous
            .map(|p| p.connection_id)
            .filter(|conn| *conn != new_conn)
    }

    /// Hard-deletes a member from every collection. If they led the room,
    /// leadership passes to the earliest remaining member.
    pub(crate) fn remove_player(&mut self, player_id: &PlayerId) -> Option<PlayerState> {
        let removed = self.players.remove(player_id)?;
        self.join_order.retain(|id| id != player_id);
        self.scores.remove(player_id);
        self.eliminated.retain(|id| id != player_id);
        self.invitation_responses.remove(player_id);
        if self.leader_id.as_ref() == Some(player_id) {
            self.leader_id = self.join_order.first().cloned();
        }
        Some(removed)
    }

    // -- invitation -------------------------------------------------------

    /// Supersedes any previous invitation. The leader's own vote is a yes.
    pub(crate) fn open_invitation(
        &mut self,
        invitation_id: String,
        leader_id: PlayerId,
        difficulty: Difficulty,
    ) {
        self.active_invitation_id = Some(invitation_id);
        self.invitation_spent = false;
        self.invitation_responses.clear();
        self.invitation_responses.insert(leader_id, true);
        self.difficulty = difficulty;
    }

    pub(crate) fn record_response(&mut self, player_id: PlayerId, accepted: bool) {
        self.invitation_responses.insert(player_id, accepted);
    }

    /// A match starts only when none is running, the invitation has not
    /// started one already, and everybody present accepted. Responses from
    /// players who have since left do not count.
    pub fn start_condition_met(&self) -> bool {
        if !self.phase.can_start() || self.invitation_spent || self.players.is_empty() {
            return false;
        }
        self.players
            .keys()
            .all(|id| self.invitation_responses.get(id) == Some(&true))
    }

    // -- match lifecycle --------------------------------------------------

    /// Lobby/Finished → Active.
    pub(crate) fn begin_match(&mut self) {
        debug_assert!(self.phase.can_transition_to(MatchPhase::Active));
        self.phase = MatchPhase::Active;
        self.invitation_spent = true;
        self.invitation_responses.clear();
        self.eliminated.clear();
        self.scores = self.players.keys().map(|id| (id.clone(), 0)).collect();
        self.round = 1;
        self.task_index = 0;
    }

    pub(crate) fn set_score(&mut self, player_id: PlayerId, score: i64) {
        self.scores.insert(player_id, score);
    }

    /// The active player with the lowest score. A missing score counts as
    /// zero and ties go to the earliest joiner.
    pub fn lowest_scorer(&self) -> Option<(PlayerId, i64)> {
        let mut lowest: Option<(&PlayerId, i64)> = None;
        for id in self.active_players() {
            let score = self.scores.get(id).copied().unwrap_or(0);
            match lowest {
                Some((_, best)) if best <= score => {}
                _ => lowest = Some((id, score)),
            }
        }
        lowest.map(|(id, score)| (id.clone(), score))
    }

    pub(crate) fn eliminate(&mut self, player_id: PlayerId) {
        if !self.eliminated.contains(&player_id) {
            self.eliminated.push(player_id);
        }
    }

    /// Moves to the next round and zeroes the survivors' scores.
    pub(crate) fn advance_round(&mut self) {
        self.round += 1;
        let active: Vec<PlayerId> = self.active_players().cloned().collect();
        for id in active {
            self.scores.insert(id, 0);
        }
    }

    /// Active → Finished. The round counter is left as is.
    pub(crate) fn finish(&mut self) {
        debug_assert!(self.phase.can_transition_to(MatchPhase::Finished));
        self.phase = MatchPhase::Finished;
    }

    /// The next task from `pool`, round-robin. Returns its position in the
    /// feed and the prompt.
    pub(crate) fn next_task(&mut self, pool: &[String]) -> Option<(usize, String)> {
        if pool.is_empty() {
            return None;
        }
        let index = self.task_index;
        self.task_index += 1;
        Some((index, pool[index % pool.len()].clone()))
    }

    pub(crate) fn take_timers(&mut self) -> Vec<TimerId> {
        self.task_timer
            .take()
            .into_iter()
            .chain(self.round_timer.take())
            .collect()
    }

    // -- snapshot ---------------------------------------------------------

    /// The full `battle:state` view at `now_ms`.
    pub fn snapshot(&self, now_ms: u64) -> BattleSnapshot {
        let mut players: Vec<PlayerView> = self
            .players()
            .map(|p| PlayerView {
                player_id: p.player_id.clone(),
                name: p.name.clone(),
                hp: p.hp,
                score: self.scores.get(&p.player_id).copied().unwrap_or(0),
                eliminated: self.is_eliminated(&p.player_id),
            })
            .collect();
        // Stable, so equal hp keeps join order.
        players.sort_by(|a, b| b.hp.cmp(&a.hp));

        BattleSnapshot {
            battle_id: self.battle_id.to_string(),
            players,
            round: self.round,
            match_active: self.phase.is_active(),
            difficulty: self.difficulty,
            leader_id: self.leader_id.clone(),
            active_invitation_id: self.active_invitation_id.clone(),
            eliminated_player_ids: self.eliminated.clone(),
            scores: self
                .scores
                .iter()
                .map(|(id, score)| (id.clone(), *score))
                .collect::<BTreeMap<_, _>>(),
            timestamp: now_ms,
        }
    }
}
