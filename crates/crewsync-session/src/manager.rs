//! The session manager: tracks every live connection's session.
//!
//! It answers two questions for the room layer:
//! - Who is this connection allowed to act as?
//! - May this connection attack right now?
//!
//! # Concurrency note
//!
//! `SessionManager` is a plain `HashMap` owned by the engine actor. Every
//! command the actor processes runs to completion before the next one, so
//! no locking is needed here.

use std::collections::HashMap;

use crewsync_protocol::{BattleId, PlayerId};
use crewsync_transport::ConnectionId;

use crate::{Binding, Session, SessionConfig, SessionError};

/// Registry of connection sessions.
///
/// ## Lifecycle
///
/// ```text
/// open() ──→ bind() ──→ authorize() / check_attack() ... ──→ close()
///              │                                             ▲
///              └──→ unbind() (takeover by another connection)┘
/// ```
#[derive(Debug)]
pub struct SessionManager {
    sessions: HashMap<ConnectionId, Session>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Registers a connection. Opening an already open connection keeps
    /// its existing session.
    pub fn open(&mut self, connection_id: ConnectionId, now_ms: u64) -> &Session {
        self.sessions.entry(connection_id).or_insert_with(|| {
            tracing::debug!(conn_id = %connection_id, "session opened");
            Session::new(connection_id, now_ms)
        })
    }

    /// Removes a connection's session and returns it, so the caller can
    /// act on the binding it held.
    pub fn close(&mut self, connection_id: ConnectionId) -> Option<Session> {
        let session = self.sessions.remove(&connection_id);
        if session.is_some() {
            tracing::debug!(conn_id = %connection_id, "session closed");
        }
        session
    }

    /// Binds a connection to `(battle_id, player_id)`, opening the session
    /// if needed. Returns the binding it replaced, if any.
    pub fn bind(
        &mut self,
        connection_id: ConnectionId,
        battle_id: BattleId,
        player_id: PlayerId,
        now_ms: u64,
    ) -> Option<Binding> {
        let session = self
            .sessions
            .entry(connection_id)
            .or_insert_with(|| Session::new(connection_id, now_ms));
        tracing::debug!(
            conn_id = %connection_id,
            battle_id = %battle_id,
            player_id = %player_id,
            "connection bound"
        );
        session.binding.replace(Binding::new(battle_id, player_id))
    }

    /// Clears a connection's binding without closing its session.
    pub fn unbind(&mut self, connection_id: ConnectionId) -> Option<Binding> {
        self.sessions
            .get_mut(&connection_id)
            .and_then(|s| s.binding.take())
    }

    /// The identity a connection is bound to, if any.
    pub fn binding(&self, connection_id: ConnectionId) -> Option<&Binding> {
        self.sessions
            .get(&connection_id)
            .and_then(|s| s.binding.as_ref())
    }

    /// Checks that the connection is bound to exactly
    /// `(battle_id, player_id)`.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] if the connection has no session.
    /// - [`SessionError::NotBound`] if it never joined.
    /// - [`SessionError::IdentityMismatch`] if it joined as someone else.
    pub fn authorize(
        &self,
        connection_id: ConnectionId,
        battle_id: &BattleId,
        player_id: &PlayerId,
    ) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get(&connection_id)
            .ok_or(SessionError::NotFound(connection_id))?;
        let binding = session
            .binding
            .as_ref()
            .ok_or(SessionError::NotBound(connection_id))?;
        if !binding.matches(battle_id, player_id) {
            return Err(SessionError::IdentityMismatch {
                connection_id,
                battle_id: battle_id.clone(),
                player_id: player_id.clone(),
            });
        }
        Ok(())
    }

    /// Checks the attack cooldown without recording anything.
    ///
    /// An attack is allowed when at least `attack_cooldown` has elapsed
    /// since the connection's last accepted attack.
    pub fn check_attack(
        &self,
        connection_id: ConnectionId,
        now_ms: u64,
    ) -> Result<(), SessionError> {
        let session = self
            .sessions
            .get(&connection_id)
            .ok_or(SessionError::NotFound(connection_id))?;
        let Some(last) = session.last_attack_ms else {
            return Ok(());
        };
        let cooldown = self.config.attack_cooldown.as_millis() as u64;
        let elapsed = now_ms.saturating_sub(last);
        if elapsed < cooldown {
            return Err(SessionError::RateLimited {
                retry_after_ms: cooldown - elapsed,
            });
        }
        Ok(())
    }

    /// Records an accepted attack. Call only after the attack has been
    /// applied.
    pub fn record_attack(&mut self, connection_id: ConnectionId, now_ms: u64) {
        if let Some(session) = self.sessions.get_mut(&connection_id) {
            session.last_attack_ms = Some(now_ms);
        }
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&connection_id)
    }

    /// Returns the number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionManager`.
    //!
    //! Naming convention: `test_{function}_{scenario}_{expected}`.
    //! Time is passed in explicitly, so cooldown tests need no sleeping.

    use std::time::Duration;

    use super::*;

    // -- Helpers ----------------------------------------------------------

    fn manager() -> SessionManager {
        SessionManager::new(SessionConfig::default())
    }

    fn conn(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn bid(id: &str) -> BattleId {
        BattleId::new(id)
    }

    fn pid(id: &str) -> PlayerId {
        PlayerId::new(id)
    }

    // =====================================================================
    // open() / close()
    // =====================================================================

    #[test]
    fn test_open_new_connection_is_unbound() {
        let mut mgr = manager();
        let session = mgr.open(conn(1), 100);

        assert_eq!(session.connection_id, conn(1));
        assert!(session.binding.is_none());
        assert_eq!(session.opened_at_ms, 100);
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_open_twice_keeps_existing_session() {
        let mut mgr = manager();
        mgr.bind(conn(1), bid("b1"), pid("p1"), 0);

        mgr.open(conn(1), 500);

        assert!(mgr.binding(conn(1)).is_some(), "binding must survive re-open");
        assert_eq!(mgr.get(conn(1)).unwrap().opened_at_ms, 0);
    }

    #[test]
    fn test_close_returns_session_with_binding() {
        let mut mgr = manager();
        mgr.bind(conn(1), bid("b1"), pid("p1"), 0);

        let closed = mgr.close(conn(1)).expect("session should exist");

        assert_eq!(closed.binding, Some(Binding::new(bid("b1"), pid("p1"))));
        assert!(mgr.is_empty());
        assert!(mgr.close(conn(1)).is_none(), "second close finds nothing");
    }

    // =====================================================================
    // bind() / unbind()
    // =====================================================================

    #[test]
    fn test_bind_returns_previous_binding() {
        let mut mgr = manager();
        assert!(mgr.bind(conn(1), bid("b1"), pid("p1"), 0).is_none());

        let previous = mgr.bind(conn(1), bid("b2"), pid("p1"), 0);

        assert_eq!(previous, Some(Binding::new(bid("b1"), pid("p1"))));
        assert_eq!(
            mgr.binding(conn(1)),
            Some(&Binding::new(bid("b2"), pid("p1")))
        );
    }

    #[test]
    fn test_unbind_clears_binding_but_keeps_session() {
        let mut mgr = manager();
        mgr.bind(conn(1), bid("b1"), pid("p1"), 0);

        let old = mgr.unbind(conn(1));

        assert!(old.is_some());
        assert!(mgr.binding(conn(1)).is_none());
        assert_eq!(mgr.len(), 1);
    }

    // =====================================================================
    // authorize()
    // =====================================================================

    #[test]
    fn test_authorize_matching_identity_ok() {
        let mut mgr = manager();
        mgr.bind(conn(1), bid("b1"), pid("p1"), 0);

        assert!(mgr.authorize(conn(1), &bid("b1"), &pid("p1")).is_ok());
    }

    #[test]
    fn test_authorize_other_player_is_mismatch() {
        // A client cannot act for someone else by putting their id in
        // the payload.
        let mut mgr = manager();
        mgr.bind(conn(1), bid("b1"), pid("p1"), 0);

        let result = mgr.authorize(conn(1), &bid("b1"), &pid("p2"));

        assert!(matches!(
            result,
            Err(SessionError::IdentityMismatch { ref player_id, .. }) if *player_id == pid("p2")
        ));
    }

    #[test]
    fn test_authorize_other_battle_is_mismatch() {
        let mut mgr = manager();
        mgr.bind(conn(1), bid("b1"), pid("p1"), 0);

        let result = mgr.authorize(conn(1), &bid("b2"), &pid("p1"));

        assert!(matches!(result, Err(SessionError::IdentityMismatch { .. })));
    }

    #[test]
    fn test_authorize_unbound_connection_is_not_bound() {
        let mut mgr = manager();
        mgr.open(conn(1), 0);

        assert_eq!(
            mgr.authorize(conn(1), &bid("b1"), &pid("p1")),
            Err(SessionError::NotBound(conn(1)))
        );
    }

    #[test]
    fn test_authorize_unknown_connection_is_not_found() {
        let mgr = manager();
        assert_eq!(
            mgr.authorize(conn(9), &bid("b1"), &pid("p1")),
            Err(SessionError::NotFound(conn(9)))
        );
    }

    // =====================================================================
    // check_attack() / record_attack()
    // =====================================================================

    #[test]
    fn test_check_attack_first_attack_allowed() {
        let mut mgr = manager();
        mgr.open(conn(1), 0);
        assert!(mgr.check_attack(conn(1), 0).is_ok());
    }

    #[test]
    fn test_check_attack_within_cooldown_rate_limited() {
        let mut mgr = manager();
        mgr.open(conn(1), 0);
        mgr.record_attack(conn(1), 1_000);

        let result = mgr.check_attack(conn(1), 1_300);

        assert_eq!(result, Err(SessionError::RateLimited { retry_after_ms: 500 }));
    }

    #[test]
    fn test_check_attack_after_cooldown_allowed() {
        let mut mgr = manager();
        mgr.open(conn(1), 0);
        mgr.record_attack(conn(1), 1_000);

        assert!(mgr.check_attack(conn(1), 1_800).is_ok());
    }

    #[test]
    fn test_check_attack_does_not_record() {
        // Only accepted attacks start a cooldown. A rejected attempt must
        // not push the window forward.
        let mut mgr = manager();
        mgr.open(conn(1), 0);
        mgr.record_attack(conn(1), 1_000);

        let _ = mgr.check_attack(conn(1), 1_500);

        assert!(mgr.check_attack(conn(1), 1_800).is_ok());
    }

    #[test]
    fn test_cooldown_is_per_connection() {
        let mut mgr = manager();
        mgr.open(conn(1), 0);
        mgr.open(conn(2), 0);
        mgr.record_attack(conn(1), 1_000);

        assert!(mgr.check_attack(conn(2), 1_001).is_ok());
    }

    #[test]
    fn test_custom_cooldown_is_respected() {
        let mut mgr = SessionManager::new(SessionConfig {
            attack_cooldown: Duration::from_millis(100),
        });
        mgr.open(conn(1), 0);
        mgr.record_attack(conn(1), 0);

        assert!(mgr.check_attack(conn(1), 99).is_err());
        assert!(mgr.check_attack(conn(1), 100).is_ok());
    }
}
