//! Unified error type for the crewsync server.

use crewsync_protocol::ProtocolError;
use crewsync_room::{BattleError, EngineUnavailable};
use crewsync_session::SessionError;
use crewsync_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// Rejected battle actions never surface here while serving; they go back
/// to the client as `battle:error`. This type covers what ends a
/// connection or the server itself.
#[derive(Debug, thiserror::Error)]
pub enum CrewsyncError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// An identity binding check failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A battle action was rejected.
    #[error(transparent)]
    Battle(#[from] BattleError),

    /// The engine actor is gone.
    #[error(transparent)]
    Engine(#[from] EngineUnavailable),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crewsync_protocol::ErrorCode;
    use crewsync_transport::ConnectionId;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let crewsync_err: CrewsyncError = err.into();
        assert!(matches!(crewsync_err, CrewsyncError::Transport(_)));
        assert!(crewsync_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::UnknownEvent("fly".into());
        let crewsync_err: CrewsyncError = err.into();
        assert!(matches!(crewsync_err, CrewsyncError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::NotBound(ConnectionId::new(3));
        let crewsync_err: CrewsyncError = err.into();
        assert!(matches!(crewsync_err, CrewsyncError::Session(_)));
    }

    #[test]
    fn test_from_battle_error_keeps_code_in_message() {
        let crewsync_err: CrewsyncError = BattleError::not_leader().into();
        assert!(matches!(
            &crewsync_err,
            CrewsyncError::Battle(e) if e.code == ErrorCode::NotLeader
        ));
        assert!(crewsync_err.to_string().starts_with("NOT_LEADER"));
    }

    #[test]
    fn test_from_engine_unavailable() {
        let crewsync_err: CrewsyncError = EngineUnavailable.into();
        assert_eq!(crewsync_err.to_string(), "battle engine is unavailable");
    }
}
