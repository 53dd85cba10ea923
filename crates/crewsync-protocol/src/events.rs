//! Frames and event payloads.
//!
//! Every frame is a JSON object naming an event:
//!
//! ```text
//! client → server   {"event": "attack", "data": {...}, "ack": 7}
//! server → client   {"event": "battle:attacked", "data": {...}}
//! server → client   {"ack": 7, "data": {"ok": true}}
//! ```
//!
//! Inbound frames are decoded in two steps. First the envelope
//! ([`RawFrame`]) so an unknown event name can be told apart from a
//! malformed payload, then the `data` object into the payload struct
//! for that event ([`ClientEvent::from_raw`]).
//!
//! Inbound id fields are plain `String`s defaulting to empty. A missing,
//! empty, `null` or non-string id is the same validation failure, reported
//! by the engine with a specific code instead of a generic decode error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Difficulty, ErrorCode, PlayerId, ProtocolError};

// ===========================================================================
// Inbound
// ===========================================================================

/// The outer shape of any client frame.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub ack: Option<u64>,
}

/// `joinBattle`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinBattle {
    #[serde(default, deserialize_with = "lenient_string")]
    pub battle_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub player_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// `startSyncInvitation`
///
/// `difficulty` stays a string here so an unknown value is reported as
/// `INVALID_DIFFICULTY` rather than failing the whole frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSyncInvitation {
    #[serde(default, deserialize_with = "lenient_string")]
    pub battle_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub leader_id: String,
    #[serde(default)]
    pub leader_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub difficulty: String,
}

/// `respondSyncInvitation`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondSyncInvitation {
    #[serde(default, deserialize_with = "lenient_string")]
    pub battle_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub invitation_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub player_id: String,
    pub accepted: bool,
}

/// `attack`
///
/// `damage` is loosely typed: clients send numbers, numeric strings, or
/// nothing, and the engine coerces it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attack {
    #[serde(default, deserialize_with = "lenient_string")]
    pub battle_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub attacker_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub target_id: String,
    #[serde(default)]
    pub damage: Option<Value>,
}

/// `battle:score`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportScore {
    #[serde(default, deserialize_with = "lenient_string")]
    pub battle_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub player_id: String,
    #[serde(default)]
    pub score: Option<Value>,
}

/// `battle:completeRound`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRound {
    #[serde(default, deserialize_with = "lenient_string")]
    pub battle_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub requested_by: String,
}

/// `broadcastState`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastState {
    #[serde(default, deserialize_with = "lenient_string")]
    pub battle_id: String,
}

/// A decoded client action.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    JoinBattle(JoinBattle),
    StartSyncInvitation(StartSyncInvitation),
    RespondSyncInvitation(RespondSyncInvitation),
    Attack(Attack),
    Score(ReportScore),
    CompleteRound(CompleteRound),
    BroadcastState(BroadcastState),
    /// Keepalive; only resets the gateway's idle timer.
    Ping,
}

impl ClientEvent {
    /// Decodes the payload of a [`RawFrame`] according to its event name.
    pub fn from_raw(event: &str, data: Value) -> Result<Self, ProtocolError> {
        // A missing `data` behaves like an empty object so that required-id
        // validation produces the specific error code.
        let data = if data.is_null() {
            Value::Object(Default::default())
        } else {
            data
        };
        let decoded = match event {
            "joinBattle" => Self::JoinBattle(decode(data)?),
            "startSyncInvitation" => Self::StartSyncInvitation(decode(data)?),
            "respondSyncInvitation" => Self::RespondSyncInvitation(decode(data)?),
            "attack" => Self::Attack(decode(data)?),
            "battle:score" => Self::Score(decode(data)?),
            "battle:completeRound" => Self::CompleteRound(decode(data)?),
            "broadcastState" => Self::BroadcastState(decode(data)?),
            "ping" => Self::Ping,
            other => return Err(ProtocolError::UnknownEvent(other.to_owned())),
        };
        Ok(decoded)
    }

    /// The wire name of this event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinBattle(_) => "joinBattle",
            Self::StartSyncInvitation(_) => "startSyncInvitation",
            Self::RespondSyncInvitation(_) => "respondSyncInvitation",
            Self::Attack(_) => "attack",
            Self::Score(_) => "battle:score",
            Self::CompleteRound(_) => "battle:completeRound",
            Self::BroadcastState(_) => "broadcastState",
            Self::Ping => "ping",
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(ProtocolError::Decode)
}

/// Reads a string field, mapping any other JSON value to `""`.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

/// Reads a JSON number or numeric string as `f64`.
///
/// Returns `None` for anything else, including non-finite results such as
/// `"inf"` or `"NaN"`.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

// ===========================================================================
// Outbound
// ===========================================================================

/// `battle:playerJoined`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoined {
    pub battle_id: String,
    pub player_id: PlayerId,
    pub name: String,
    pub hp: i32,
    pub leader_id: Option<PlayerId>,
}

/// `battle:invitation`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationIssued {
    pub invitation_id: String,
    pub battle_id: String,
    pub leader_id: PlayerId,
    pub leader_name: String,
    pub difficulty: Difficulty,
}

/// `battle:invitationResponse`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationResponse {
    pub invitation_id: String,
    pub player_id: PlayerId,
    pub accepted: bool,
}

/// `battle:matchStarted`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStarted {
    pub battle_id: String,
    pub round: u32,
    pub difficulty: Difficulty,
    pub player_ids: Vec<PlayerId>,
}

/// `battle:task`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAnnounced {
    pub round: u32,
    pub task_index: usize,
    pub task: String,
}

/// `battle:attacked`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attacked {
    pub attacker_id: PlayerId,
    pub target_id: PlayerId,
    pub damage: i32,
    pub target_hp: i32,
}

/// `battle:eliminated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eliminated {
    pub player_id: PlayerId,
    pub round: u32,
    pub score: i64,
}

/// `battle:winner`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    pub player_id: PlayerId,
}

/// `battle:roundStarted`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStarted {
    pub round: u32,
}

/// `battle:playerLeft`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLeft {
    pub player_id: PlayerId,
    pub leader_id: Option<PlayerId>,
}

/// One row of a state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub player_id: PlayerId,
    pub name: String,
    pub hp: i32,
    pub score: i64,
    pub eliminated: bool,
}

/// `battle:state`: the full room view.
///
/// `players` is sorted by descending hp; ties keep join order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleSnapshot {
    pub battle_id: String,
    pub players: Vec<PlayerView>,
    pub round: u32,
    pub match_active: bool,
    pub difficulty: Difficulty,
    pub leader_id: Option<PlayerId>,
    pub active_invitation_id: Option<String>,
    pub eliminated_player_ids: Vec<PlayerId>,
    pub scores: BTreeMap<PlayerId, i64>,
    pub timestamp: u64,
}

/// `battle:error`: sent to the originating connection only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

/// Every event the server pushes.
///
/// Adjacently tagged, so each variant is `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "battle:playerJoined")]
    PlayerJoined(PlayerJoined),
    #[serde(rename = "battle:invitation")]
    Invitation(InvitationIssued),
    #[serde(rename = "battle:invitationResponse")]
    InvitationResponse(InvitationResponse),
    #[serde(rename = "battle:matchStarted")]
    MatchStarted(MatchStarted),
    #[serde(rename = "battle:task")]
    Task(TaskAnnounced),
    #[serde(rename = "battle:attacked")]
    Attacked(Attacked),
    #[serde(rename = "battle:eliminated")]
    Eliminated(Eliminated),
    #[serde(rename = "battle:winner")]
    Winner(Winner),
    #[serde(rename = "battle:roundStarted")]
    RoundStarted(RoundStarted),
    #[serde(rename = "battle:playerLeft")]
    PlayerLeft(PlayerLeft),
    #[serde(rename = "battle:state")]
    State(BattleSnapshot),
    #[serde(rename = "battle:error")]
    Error(ErrorBody),
}

impl ServerEvent {
    /// The wire name of this event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlayerJoined(_) => "battle:playerJoined",
            Self::Invitation(_) => "battle:invitation",
            Self::InvitationResponse(_) => "battle:invitationResponse",
            Self::MatchStarted(_) => "battle:matchStarted",
            Self::Task(_) => "battle:task",
            Self::Attacked(_) => "battle:attacked",
            Self::Eliminated(_) => "battle:eliminated",
            Self::Winner(_) => "battle:winner",
            Self::RoundStarted(_) => "battle:roundStarted",
            Self::PlayerLeft(_) => "battle:playerLeft",
            Self::State(_) => "battle:state",
            Self::Error(_) => "battle:error",
        }
    }
}

/// Reply to a client frame that carried an `ack` id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckFrame {
    pub ack: u64,
    pub data: AckBody,
}

/// Body of an [`AckFrame`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckBody {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AckFrame {
    pub fn ok(ack: u64) -> Self {
        Self {
            ack,
            data: AckBody {
                ok: true,
                code: None,
                message: None,
            },
        }
    }

    pub fn rejected(ack: u64, error: &ErrorBody) -> Self {
        Self {
            ack,
            data: AckBody {
                ok: false,
                code: Some(error.code),
                message: Some(error.message.clone()),
            },
        }
    }
}

/// Anything the server writes to a socket. Used by clients and tests to
/// decode server output without knowing its kind up front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Event(ServerEvent),
    Ack(AckFrame),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(frame: Value) -> Result<(ClientEvent, Option<u64>), ProtocolError> {
        let raw: RawFrame = serde_json::from_value(frame).map_err(ProtocolError::Decode)?;
        Ok((ClientEvent::from_raw(&raw.event, raw.data)?, raw.ack))
    }

    #[test]
    fn test_join_frame_uses_camel_case_fields() {
        let (event, ack) = parse(json!({
            "event": "joinBattle",
            "data": {"battleId": "b1", "playerId": "p1", "name": "Ada"},
            "ack": 3
        }))
        .unwrap();
        assert_eq!(ack, Some(3));
        assert_eq!(
            event,
            ClientEvent::JoinBattle(JoinBattle {
                battle_id: "b1".into(),
                player_id: "p1".into(),
                name: Some("Ada".into()),
            })
        );
    }

    #[test]
    fn test_missing_ids_decode_as_empty_strings() {
        let (event, ack) = parse(json!({"event": "joinBattle"})).unwrap();
        assert_eq!(ack, None);
        assert_eq!(event, ClientEvent::JoinBattle(JoinBattle::default()));
    }

    #[test]
    fn test_null_and_numeric_ids_decode_as_empty_strings() {
        let (event, _) = parse(json!({
            "event": "joinBattle",
            "data": {"battleId": null, "playerId": "p1"}
        }))
        .unwrap();
        let ClientEvent::JoinBattle(join) = event else {
            panic!("expected joinBattle");
        };
        assert_eq!(join.battle_id, "");
        assert_eq!(join.player_id, "p1");

        let (event, _) = parse(json!({
            "event": "joinBattle",
            "data": {"battleId": 42, "playerId": {"id": 1}}
        }))
        .unwrap();
        assert_eq!(event, ClientEvent::JoinBattle(JoinBattle::default()));

        let (event, _) = parse(json!({
            "event": "attack",
            "data": {"battleId": "b1", "attackerId": 7, "targetId": false}
        }))
        .unwrap();
        let ClientEvent::Attack(attack) = event else {
            panic!("expected attack");
        };
        assert_eq!(attack.battle_id, "b1");
        assert_eq!(attack.attacker_id, "");
        assert_eq!(attack.target_id, "");
    }

    #[test]
    fn test_unknown_event_is_distinct_from_bad_payload() {
        let err = parse(json!({"event": "teleport", "data": {}})).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownEvent(name) if name == "teleport"));

        // `accepted` is required and must be a bool.
        let err = parse(json!({
            "event": "respondSyncInvitation",
            "data": {"battleId": "b1", "invitationId": "i", "playerId": "p", "accepted": "yes"}
        }))
        .unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_colon_event_names_route_to_battle_actions() {
        let (event, _) = parse(json!({
            "event": "battle:score",
            "data": {"battleId": "b1", "playerId": "p1", "score": 12.7}
        }))
        .unwrap();
        assert_eq!(event.name(), "battle:score");

        let (event, _) = parse(json!({
            "event": "battle:completeRound",
            "data": {"battleId": "b1", "requestedBy": "p1"}
        }))
        .unwrap();
        assert!(matches!(event, ClientEvent::CompleteRound(c) if c.requested_by == "p1"));
    }

    #[test]
    fn test_coerce_number_accepts_numbers_and_numeric_strings() {
        assert_eq!(coerce_number(&json!(12)), Some(12.0));
        assert_eq!(coerce_number(&json!("7.5")), Some(7.5));
        assert_eq!(coerce_number(&json!("lots")), None);
        assert_eq!(coerce_number(&json!("inf")), None);
        assert_eq!(coerce_number(&json!(null)), None);
        assert_eq!(coerce_number(&json!([1])), None);
    }

    #[test]
    fn test_server_event_is_adjacently_tagged() {
        let event = ServerEvent::Winner(Winner { player_id: PlayerId::new("p1") });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json, json!({"event": "battle:winner", "data": {"playerId": "p1"}}));
    }

    #[test]
    fn test_error_event_carries_screaming_code() {
        let event = ServerEvent::Error(ErrorBody {
            code: ErrorCode::AttackRateLimited,
            message: "slow down".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "battle:error");
        assert_eq!(json["data"]["code"], "ATTACK_RATE_LIMITED");
    }

    #[test]
    fn test_ack_frames_omit_error_fields_when_ok() {
        let json = serde_json::to_value(AckFrame::ok(9)).unwrap();
        assert_eq!(json, json!({"ack": 9, "data": {"ok": true}}));

        let body = ErrorBody { code: ErrorCode::NotLeader, message: "leader only".into() };
        let json = serde_json::to_value(AckFrame::rejected(9, &body)).unwrap();
        assert_eq!(json["data"]["ok"], false);
        assert_eq!(json["data"]["code"], "NOT_LEADER");
    }

    #[test]
    fn test_server_frame_decodes_both_shapes() {
        let ack: ServerFrame = serde_json::from_value(json!({"ack": 1, "data": {"ok": true}})).unwrap();
        assert!(matches!(ack, ServerFrame::Ack(AckFrame { ack: 1, .. })));

        let event: ServerFrame =
            serde_json::from_value(json!({"event": "battle:roundStarted", "data": {"round": 2}})).unwrap();
        assert_eq!(
            event,
            ServerFrame::Event(ServerEvent::RoundStarted(RoundStarted { round: 2 }))
        );
    }
}
