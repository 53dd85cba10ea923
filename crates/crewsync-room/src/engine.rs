//! The battle engine: every room transition as one synchronous step.
//!
//! [`BattleEngine`] owns the room registry, the connection sessions, a
//! clock, and a timer factory. Each public operation validates its input
//! against the caller's bound identity, mutates at most one room, and
//! returns the events to deliver as `(Recipient, ServerEvent)` pairs. It
//! never does I/O, so tests drive it directly with a manual clock and
//! manual timers.
//!
//! # Snapshots
//!
//! Most operations end with a `battle:state` snapshot. Structural changes
//! (join, invitation, match start/finish, round start, manual refresh)
//! force one; high-frequency changes (attacks, scores, departures) go
//! through the room's [`BroadcastThrottle`](crate::BroadcastThrottle) and
//! may be dropped.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crewsync_protocol::{
    coerce_number, Attack, Attacked, BattleId, BroadcastState, ClientEvent, CompleteRound,
    Difficulty, Eliminated, ErrorCode, InvitationIssued, InvitationResponse, JoinBattle,
    MatchStarted, PlayerId, PlayerJoined, PlayerLeft, Recipient, ReportScore,
    RespondSyncInvitation, RoundStarted, ServerEvent, StartSyncInvitation, TaskAnnounced, Winner,
};
use crewsync_session::{Binding, SessionConfig, SessionManager};
use crewsync_timer::{Clock, Schedule, TimerFactory, TimerFired};
use crewsync_transport::ConnectionId;
use rand::Rng;
use tracing::{debug, info, trace, warn};

use crate::{BattleConfig, BattleError, BattleRoom, PlayerState, RoomRegistry};

/// One outbound event and who gets it.
pub type Dispatch = (Recipient, ServerEvent);

/// Which per-room timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Periodic task announcements.
    TaskFeed,
    /// Forces the current round to complete.
    RoundTimeout,
}

/// Attached to every timer the engine starts, so a fire can be routed
/// back to its room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerTag {
    pub battle_id: BattleId,
    pub kind: TimerKind,
}

impl TimerTag {
    pub fn new(battle_id: BattleId, kind: TimerKind) -> Self {
        Self { battle_id, kind }
    }
}

/// The room state machine.
pub struct BattleEngine<C, F> {
    config: BattleConfig,
    clock: C,
    timers: F,
    rooms: RoomRegistry,
    sessions: SessionManager,
}

impl<C: Clock, F: TimerFactory<TimerTag>> BattleEngine<C, F> {
    pub fn new(config: BattleConfig, clock: C, timers: F) -> Self {
        let config = config.validated();
        let sessions = SessionManager::new(SessionConfig {
            attack_cooldown: config.attack_cooldown,
        });
        Self {
            config,
            clock,
            timers,
            rooms: RoomRegistry::new(),
            sessions,
        }
    }

    // -- accessors --------------------------------------------------------

    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    pub fn room(&self, battle_id: &BattleId) -> Option<&BattleRoom> {
        self.rooms.get(battle_id)
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn timers(&self) -> &F {
        &self.timers
    }

    /// Connections of the room's current members, in join order.
    pub fn room_connections(&self, battle_id: &BattleId) -> Vec<ConnectionId> {
        self.rooms
            .get(battle_id)
            .map(|room| room.players().map(|p| p.connection_id).collect())
            .unwrap_or_default()
    }

    // -- entry points -----------------------------------------------------

    /// Registers a freshly accepted connection.
    pub fn connect(&mut self, conn: ConnectionId) {
        let now = self.clock.now_ms();
        self.sessions.open(conn, now);
    }

    /// Runs one client action under a panic guard.
    ///
    /// A panic inside a handler is reported to the caller as `JOIN_FAILED`
    /// for joins and `INTERNAL_ERROR` otherwise, and the engine stays
    /// usable.
    pub fn handle(
        &mut self,
        conn: ConnectionId,
        event: ClientEvent,
    ) -> Result<Vec<Dispatch>, BattleError> {
        let name = event.name();
        let failure_code = match event {
            ClientEvent::JoinBattle(_) => ErrorCode::JoinFailed,
            _ => ErrorCode::InternalError,
        };

        let result = match self.guarded(|engine| engine.apply(conn, event)) {
            Ok(result) => result,
            Err(reason) => {
                warn!(conn_id = %conn, event = name, %reason, "handler panicked");
                Err(BattleError::new(failure_code, format!("{name} failed")))
            }
        };
        if let Err(err) = &result {
            debug!(
                conn_id = %conn,
                event = name,
                code = %err.code,
                message = %err.message,
                "action rejected"
            );
        }
        result
    }

    fn apply(
        &mut self,
        conn: ConnectionId,
        event: ClientEvent,
    ) -> Result<Vec<Dispatch>, BattleError> {
        match event {
            ClientEvent::JoinBattle(req) => self.join(conn, req),
            ClientEvent::StartSyncInvitation(req) => self.start_invitation(conn, req),
            ClientEvent::RespondSyncInvitation(req) => self.respond_invitation(conn, req),
            ClientEvent::Attack(req) => self.attack(conn, req),
            ClientEvent::Score(req) => self.report_score(conn, req),
            ClientEvent::CompleteRound(req) => self.complete_round(conn, req),
            ClientEvent::BroadcastState(req) => self.broadcast_state(conn, req),
            ClientEvent::Ping => Ok(Vec::new()),
        }
    }

    /// A connection went away. Its session is released and, if it still
    /// acted as a room member, that member leaves.
    pub fn disconnect(&mut self, conn: ConnectionId) -> Vec<Dispatch> {
        let result = self.guarded(|engine| {
            let Some(session) = engine.sessions.close(conn) else {
                return Vec::new();
            };
            let Some(binding) = session.binding else {
                return Vec::new();
            };
            let now = engine.clock.now_ms();
            engine.leave(conn, binding, now)
        });
        result.unwrap_or_else(|reason| {
            warn!(conn_id = %conn, %reason, "disconnect handler panicked");
            Vec::new()
        })
    }

    /// Handles a timer fire.
    ///
    /// Fires are dropped unless the room still exists, its match is active,
    /// and the fired timer is the one currently installed in that slot. So
    /// a fire that raced with a cancel, a finished match, or a destroyed
    /// room is a no-op.
    pub fn on_timer(&mut self, fired: TimerFired<TimerTag>) -> Vec<Dispatch> {
        let TimerFired { id, tag } = fired;
        let live = self.rooms.get(&tag.battle_id).is_some_and(|room| {
            room.is_match_active()
                && match tag.kind {
                    TimerKind::TaskFeed => room.task_timer == Some(id),
                    TimerKind::RoundTimeout => room.round_timer == Some(id),
                }
        });
        if !live {
            trace!(timer = %id, battle_id = %tag.battle_id, "stale timer ignored");
            return Vec::new();
        }

        let result = self.guarded(|engine| {
            let now = engine.clock.now_ms();
            match tag.kind {
                TimerKind::TaskFeed => engine.announce_task(&tag.battle_id),
                TimerKind::RoundTimeout => {
                    if let Some(room) = engine.rooms.get_mut(&tag.battle_id) {
                        // Spent; the next round installs a new one.
                        room.round_timer = None;
                    }
                    info!(battle_id = %tag.battle_id, "round timed out");
                    engine.resolve_round(&tag.battle_id, now)
                }
            }
        });
        result.unwrap_or_else(|reason| {
            warn!(timer = %id, battle_id = %tag.battle_id, %reason, "timer handler panicked");
            Vec::new()
        })
    }

    // -- operations -------------------------------------------------------

    /// `joinBattle`: creates the room if needed, binds the connection to
    /// `(battleId, playerId)`, and (re)sets the player at full hp.
    pub fn join(
        &mut self,
        conn: ConnectionId,
        req: JoinBattle,
    ) -> Result<Vec<Dispatch>, BattleError> {
        let battle_id = parse_battle_id(&req.battle_id)?;
        let player_id = parse_player_id(&req.player_id)?;
        let name = req
            .name
            .as_deref()
            .and_then(required)
            .unwrap_or(player_id.as_str())
            .to_owned();
        let now = self.clock.now_ms();
        let mut out = Vec::new();

        // A connection plays in one room at a time.
        if let Some(previous) = self.sessions.binding(conn).cloned() {
            if !previous.matches(&battle_id, &player_id) {
                self.sessions.unbind(conn);
                out.extend(self.leave(conn, previous, now));
            }
        }
        self.sessions
            .bind(conn, battle_id.clone(), player_id.clone(), now);

        let hp = self.config.max_hp;
        let room = self.rooms.get_or_create(&battle_id, now);
        let replaced = room.upsert_player(PlayerState {
            player_id: player_id.clone(),
            name: name.clone(),
            hp,
            connection_id: conn,
        });
        room.touch(now);
        let leader_id = room.leader_id().cloned();
        let players = room.len();

        if let Some(old_conn) = replaced {
            // The stale connection may no longer act as this player, and
            // its eventual disconnect must not remove them.
            self.sessions.unbind(old_conn);
            info!(
                battle_id = %battle_id,
                player_id = %player_id,
                old_conn = %old_conn,
                conn_id = %conn,
                "player moved to a new connection"
            );
        }
        info!(
            battle_id = %battle_id,
            player_id = %player_id,
            conn_id = %conn,
            players,
            "player joined"
        );

        out.push(to_room(
            &battle_id,
            ServerEvent::PlayerJoined(PlayerJoined {
                battle_id: battle_id.to_string(),
                player_id,
                name,
                hp,
                leader_id,
            }),
        ));
        out.extend(self.snapshot(&battle_id, now, true));
        Ok(out)
    }

    /// `startSyncInvitation`: the leader proposes a match.
    pub fn start_invitation(
        &mut self,
        conn: ConnectionId,
        req: StartSyncInvitation,
    ) -> Result<Vec<Dispatch>, BattleError> {
        let battle_id = parse_battle_id(&req.battle_id)?;
        let leader_id = parse_player_id(&req.leader_id)?;
        self.sessions
            .authorize(conn, &battle_id, &leader_id)
            .map_err(|e| BattleError::from_session(e, ErrorCode::NotLeader))?;

        let now = self.clock.now_ms();
        let room = self
            .rooms
            .get_mut(&battle_id)
            .ok_or_else(|| BattleError::room_not_found(&battle_id))?;
        if room.leader_id() != Some(&leader_id) {
            return Err(BattleError::not_leader());
        }
        let difficulty: Difficulty = req
            .difficulty
            .parse()
            .map_err(|e: crewsync_protocol::UnknownDifficulty| {
                BattleError::new(ErrorCode::InvalidDifficulty, e.to_string())
            })?;

        let invitation_id = new_invitation_id(&battle_id, now, room.active_invitation_id());
        let leader_name = req
            .leader_name
            .as_deref()
            .and_then(required)
            .map(str::to_owned)
            .or_else(|| room.player(&leader_id).map(|p| p.name.clone()))
            .unwrap_or_else(|| leader_id.to_string());
        room.open_invitation(invitation_id.clone(), leader_id.clone(), difficulty);
        room.touch(now);

        info!(
            battle_id = %battle_id,
            leader_id = %leader_id,
            invitation_id = %invitation_id,
            %difficulty,
            "invitation issued"
        );

        let mut out = vec![to_room(
            &battle_id,
            ServerEvent::Invitation(InvitationIssued {
                invitation_id,
                battle_id: battle_id.to_string(),
                leader_id,
                leader_name,
                difficulty,
            }),
        )];
        out.extend(self.snapshot(&battle_id, now, true));
        Ok(out)
    }

    /// `respondSyncInvitation`: records a vote and starts the match once
    /// every current member has accepted.
    pub fn respond_invitation(
        &mut self,
        conn: ConnectionId,
        req: RespondSyncInvitation,
    ) -> Result<Vec<Dispatch>, BattleError> {
        let battle_id = parse_battle_id(&req.battle_id)?;
        let player_id = parse_player_id(&req.player_id)?;
        let invitation_id = req.invitation_id.trim();
        let now = self.clock.now_ms();

        let room = self
            .rooms
            .get_mut(&battle_id)
            .ok_or_else(|| BattleError::room_not_found(&battle_id))?;
        if invitation_id.is_empty() || room.active_invitation_id() != Some(invitation_id) {
            return Err(BattleError::new(
                ErrorCode::InvitationNotFound,
                format!("invitation {invitation_id:?} is not active"),
            ));
        }
        if !room.contains(&player_id) {
            return Err(BattleError::new(
                ErrorCode::PlayerNotInRoom,
                format!("player {player_id} is not in battle {battle_id}"),
            ));
        }
        self.sessions
            .authorize(conn, &battle_id, &player_id)
            .map_err(|e| BattleError::from_session(e, ErrorCode::Unauthorized))?;

        room.record_response(player_id.clone(), req.accepted);
        room.touch(now);
        let start = room.start_condition_met();
        debug!(
            battle_id = %battle_id,
            player_id = %player_id,
            accepted = req.accepted,
            "invitation response"
        );

        let mut out = vec![to_room(
            &battle_id,
            ServerEvent::InvitationResponse(InvitationResponse {
                invitation_id: invitation_id.to_owned(),
                player_id,
                accepted: req.accepted,
            }),
        )];
        if start {
            out.extend(self.start_match(&battle_id, now));
        }
        Ok(out)
    }

    /// `attack`: one player damages another.
    pub fn attack(
        &mut self,
        conn: ConnectionId,
        req: Attack,
    ) -> Result<Vec<Dispatch>, BattleError> {
        let (Some(battle_id), Some(attacker_id), Some(target_id)) = (
            required(&req.battle_id).map(BattleId::new),
            required(&req.attacker_id).map(PlayerId::new),
            required(&req.target_id).map(PlayerId::new),
        ) else {
            return Err(BattleError::new(
                ErrorCode::InvalidAttack,
                "attack needs battleId, attackerId and targetId",
            ));
        };
        self.sessions
            .authorize(conn, &battle_id, &attacker_id)
            .map_err(|e| BattleError::from_session(e, ErrorCode::UnauthorizedAttack))?;
        if attacker_id == target_id {
            return Err(BattleError::new(
                ErrorCode::InvalidTarget,
                "players cannot attack themselves",
            ));
        }

        let now = self.clock.now_ms();
        // Unlike join, attack never creates a room.
        let room = self
            .rooms
            .get_mut(&battle_id)
            .ok_or_else(|| BattleError::room_not_found(&battle_id))?;
        let invalid_players = || {
            BattleError::new(
                ErrorCode::InvalidPlayers,
                "attacker and target must both be in the battle",
            )
        };
        let attacker_hp = room.player(&attacker_id).ok_or_else(invalid_players)?.hp;
        if !room.contains(&target_id) {
            return Err(invalid_players());
        }
        if attacker_hp <= 0 {
            return Err(BattleError::new(
                ErrorCode::AttackerDefeated,
                "defeated players cannot attack",
            ));
        }
        self.sessions
            .check_attack(conn, now)
            .map_err(|e| BattleError::from_session(e, ErrorCode::AttackRateLimited))?;

        let damage = self
            .config
            .resolve_damage(req.damage.as_ref().and_then(coerce_number));
        let target = room.player_mut(&target_id).ok_or_else(invalid_players)?;
        target.hp = (target.hp - damage).max(0);
        let target_hp = target.hp;
        room.touch(now);
        self.sessions.record_attack(conn, now);

        debug!(
            battle_id = %battle_id,
            attacker_id = %attacker_id,
            target_id = %target_id,
            damage,
            target_hp,
            "attack applied"
        );

        let mut out = vec![to_room(
            &battle_id,
            ServerEvent::Attacked(Attacked {
                attacker_id,
                target_id,
                damage,
                target_hp,
            }),
        )];
        out.extend(self.snapshot(&battle_id, now, false));
        Ok(out)
    }

    /// `battle:score`: overwrites the player's score for the current round.
    pub fn report_score(
        &mut self,
        conn: ConnectionId,
        req: ReportScore,
    ) -> Result<Vec<Dispatch>, BattleError> {
        let battle_id = parse_battle_id(&req.battle_id)?;
        let player_id = parse_player_id(&req.player_id)?;
        self.sessions
            .authorize(conn, &battle_id, &player_id)
            .map_err(|e| BattleError::from_session(e, ErrorCode::Unauthorized))?;

        let now = self.clock.now_ms();
        let room = self
            .rooms
            .get_mut(&battle_id)
            .ok_or_else(|| BattleError::room_not_found(&battle_id))?;
        if !room.is_match_active() {
            return Err(BattleError::match_not_active());
        }
        if room.is_eliminated(&player_id) {
            return Err(BattleError::new(
                ErrorCode::PlayerEliminated,
                format!("player {player_id} is eliminated"),
            ));
        }
        let score = req
            .score
            .as_ref()
            .and_then(coerce_number)
            .filter(|s| *s >= 0.0)
            .ok_or_else(|| {
                BattleError::new(ErrorCode::InvalidScore, "score must be a non-negative number")
            })?;
        // `as` saturates, so huge scores cap at i64::MAX.
        let score = score.floor() as i64;

        room.set_score(player_id.clone(), score);
        room.touch(now);
        debug!(battle_id = %battle_id, player_id = %player_id, score, "score reported");

        Ok(self.snapshot(&battle_id, now, false).into_iter().collect())
    }

    /// `battle:completeRound`: the leader ends the round early.
    pub fn complete_round(
        &mut self,
        conn: ConnectionId,
        req: CompleteRound,
    ) -> Result<Vec<Dispatch>, BattleError> {
        let battle_id = parse_battle_id(&req.battle_id)?;
        let requested_by = parse_player_id(&req.requested_by)?;
        self.sessions
            .authorize(conn, &battle_id, &requested_by)
            .map_err(|e| BattleError::from_session(e, ErrorCode::NotLeader))?;

        let room = self
            .rooms
            .get(&battle_id)
            .ok_or_else(|| BattleError::room_not_found(&battle_id))?;
        if room.leader_id() != Some(&requested_by) {
            return Err(BattleError::not_leader());
        }
        if !room.is_match_active() {
            return Err(BattleError::match_not_active());
        }

        info!(battle_id = %battle_id, round = room.round(), "round completed by leader");
        let now = self.clock.now_ms();
        Ok(self.resolve_round(&battle_id, now))
    }

    /// `broadcastState`: sends a fresh snapshot to the room, bypassing the
    /// throttle.
    pub fn broadcast_state(
        &mut self,
        _conn: ConnectionId,
        req: BroadcastState,
    ) -> Result<Vec<Dispatch>, BattleError> {
        let battle_id = parse_battle_id(&req.battle_id)?;
        if !self.rooms.contains(&battle_id) {
            return Err(BattleError::room_not_found(&battle_id));
        }
        let now = self.clock.now_ms();
        Ok(self.snapshot(&battle_id, now, true).into_iter().collect())
    }

    // -- transitions ------------------------------------------------------

    /// Removes the member bound to `conn`, if `conn` still acts as them.
    fn leave(&mut self, conn: ConnectionId, binding: Binding, now: u64) -> Vec<Dispatch> {
        let Binding {
            battle_id,
            player_id,
        } = binding;
        let Some(room) = self.rooms.get_mut(&battle_id) else {
            return Vec::new();
        };
        if room.player(&player_id).map(|p| p.connection_id) != Some(conn) {
            return Vec::new();
        }
        room.remove_player(&player_id);
        room.touch(now);
        info!(
            battle_id = %battle_id,
            player_id = %player_id,
            conn_id = %conn,
            players = room.len(),
            "player left"
        );

        if room.is_empty() {
            self.destroy_room(&battle_id);
            return Vec::new();
        }
        let leader_id = room.leader_id().cloned();
        let match_active = room.is_match_active();

        let mut out = vec![to_room(
            &battle_id,
            ServerEvent::PlayerLeft(PlayerLeft {
                player_id,
                leader_id,
            }),
        )];
        if match_active {
            out.extend(self.check_survivors(&battle_id, now));
        }
        out.extend(self.snapshot(&battle_id, now, false));
        out
    }

    fn destroy_room(&mut self, battle_id: &BattleId) {
        if let Some(mut room) = self.rooms.destroy(battle_id) {
            for id in room.take_timers() {
                self.timers.cancel(id);
            }
        }
    }

    /// Ends the match if at most one active player is left.
    fn check_survivors(&mut self, battle_id: &BattleId, now: u64) -> Vec<Dispatch> {
        let Some(room) = self.rooms.get(battle_id) else {
            return Vec::new();
        };
        if !room.is_match_active() {
            return Vec::new();
        }
        let survivors: Vec<PlayerId> = room.active_players().cloned().collect();
        match survivors.as_slice() {
            [winner] => self.finish_match(battle_id, Some(winner.clone()), now),
            [] => self.finish_match(battle_id, None, now),
            _ => Vec::new(),
        }
    }

    /// Lobby/Finished → Active. Installs both timers.
    fn start_match(&mut self, battle_id: &BattleId, now: u64) -> Vec<Dispatch> {
        let Some(room) = self.rooms.get_mut(battle_id) else {
            return Vec::new();
        };
        for id in room.take_timers() {
            self.timers.cancel(id);
        }
        room.begin_match();
        room.touch(now);
        room.task_timer = Some(self.timers.start(
            TimerTag::new(battle_id.clone(), TimerKind::TaskFeed),
            Schedule::Every(self.config.task_interval),
        ));
        room.round_timer = Some(self.timers.start(
            TimerTag::new(battle_id.clone(), TimerKind::RoundTimeout),
            Schedule::Once(self.config.round_duration),
        ));

        let started = MatchStarted {
            battle_id: battle_id.to_string(),
            round: room.round(),
            difficulty: room.difficulty(),
            player_ids: room.join_order().to_vec(),
        };
        info!(
            battle_id = %battle_id,
            players = started.player_ids.len(),
            difficulty = %started.difficulty,
            "match started"
        );

        let mut out = vec![to_room(battle_id, ServerEvent::MatchStarted(started))];
        out.extend(self.snapshot(battle_id, now, true));
        out
    }

    /// Eliminates the lowest scorer, then either declares a winner or
    /// starts the next round.
    fn resolve_round(&mut self, battle_id: &BattleId, now: u64) -> Vec<Dispatch> {
        let Some(lowest) = self.rooms.get(battle_id).map(BattleRoom::lowest_scorer) else {
            return Vec::new();
        };
        let Some((loser, score)) = lowest else {
            return self.finish_match(battle_id, None, now);
        };
        let Some(room) = self.rooms.get_mut(battle_id) else {
            return Vec::new();
        };
        let round = room.round();
        room.eliminate(loser.clone());
        room.touch(now);
        let survivors: Vec<PlayerId> = room.active_players().cloned().collect();
        info!(
            battle_id = %battle_id,
            player_id = %loser,
            round,
            score,
            "player eliminated"
        );

        let mut out = vec![to_room(
            battle_id,
            ServerEvent::Eliminated(Eliminated {
                player_id: loser,
                round,
                score,
            }),
        )];
        match survivors.as_slice() {
            [winner] => out.extend(self.finish_match(battle_id, Some(winner.clone()), now)),
            [] => out.extend(self.finish_match(battle_id, None, now)),
            _ => out.extend(self.next_round(battle_id, now)),
        }
        out
    }

    /// Starts the next round with a full-length round timer.
    fn next_round(&mut self, battle_id: &BattleId, now: u64) -> Vec<Dispatch> {
        let Some(room) = self.rooms.get_mut(battle_id) else {
            return Vec::new();
        };
        room.advance_round();
        if let Some(old) = room.round_timer.take() {
            self.timers.cancel(old);
        }
        room.round_timer = Some(self.timers.start(
            TimerTag::new(battle_id.clone(), TimerKind::RoundTimeout),
            Schedule::Once(self.config.round_duration),
        ));
        let round = room.round();
        info!(battle_id = %battle_id, round, "round started");

        let mut out = vec![to_room(
            battle_id,
            ServerEvent::RoundStarted(RoundStarted { round }),
        )];
        out.extend(self.snapshot(battle_id, now, true));
        out
    }

    /// Active → Finished. Stops both timers; the round is not advanced.
    fn finish_match(
        &mut self,
        battle_id: &BattleId,
        winner: Option<PlayerId>,
        now: u64,
    ) -> Vec<Dispatch> {
        let Some(room) = self.rooms.get_mut(battle_id) else {
            return Vec::new();
        };
        room.finish();
        room.touch(now);
        for id in room.take_timers() {
            self.timers.cancel(id);
        }
        let round = room.round();

        let mut out = Vec::new();
        match winner {
            Some(player_id) => {
                info!(battle_id = %battle_id, player_id = %player_id, round, "match won");
                out.push(to_room(battle_id, ServerEvent::Winner(Winner { player_id })));
            }
            None => info!(battle_id = %battle_id, round, "match ended without a winner"),
        }
        out.extend(self.snapshot(battle_id, now, true));
        out
    }

    fn announce_task(&mut self, battle_id: &BattleId) -> Vec<Dispatch> {
        let Some(room) = self.rooms.get_mut(battle_id) else {
            return Vec::new();
        };
        let round = room.round();
        let Some((task_index, task)) = room.next_task(&self.config.task_pool) else {
            return Vec::new();
        };
        trace!(battle_id = %battle_id, round, task_index, "task announced");
        vec![to_room(
            battle_id,
            ServerEvent::Task(TaskAnnounced {
                round,
                task_index,
                task,
            }),
        )]
    }

    /// A `battle:state` dispatch, or `None` if the throttle drops it.
    fn snapshot(&mut self, battle_id: &BattleId, now: u64, force: bool) -> Option<Dispatch> {
        let room = self.rooms.get_mut(battle_id)?;
        if force {
            room.throttle.force(now);
        } else if !room.throttle.allow(now, self.config.min_broadcast_interval) {
            debug!(battle_id = %battle_id, "state snapshot throttled");
            return None;
        }
        Some(to_room(battle_id, ServerEvent::State(room.snapshot(now))))
    }

    fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> Result<T, String> {
        panic::catch_unwind(AssertUnwindSafe(|| f(self)))
            .map_err(|payload| panic_message(payload.as_ref()))
    }
}

fn to_room(battle_id: &BattleId, event: ServerEvent) -> Dispatch {
    (Recipient::Room(battle_id.clone()), event)
}

/// The trimmed value, or `None` if nothing is left.
fn required(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn parse_battle_id(raw: &str) -> Result<BattleId, BattleError> {
    required(raw)
        .map(BattleId::new)
        .ok_or_else(BattleError::invalid_battle_id)
}

fn parse_player_id(raw: &str) -> Result<PlayerId, BattleError> {
    required(raw)
        .map(PlayerId::new)
        .ok_or_else(BattleError::invalid_player_id)
}

/// `{battleId}-{issuedAtMs}-{nonce}`, never equal to `current`.
fn new_invitation_id(battle_id: &BattleId, now_ms: u64, current: Option<&str>) -> String {
    let mut rng = rand::rng();
    loop {
        let nonce: u32 = rng.random();
        let id = format!("{battle_id}-{now_ms}-{nonce:08x}");
        if current != Some(id.as_str()) {
            return id;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
