//! Integration tests for the crewsync server, handler, and full connection flow.

use std::time::Duration;

use crewsync::prelude::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Starts a server on a random port and returns its address and engine.
async fn start_server_with(builder: CrewsyncServerBuilder) -> (String, EngineHandle) {
    let server = builder
        .bind("127.0.0.1:0")
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let engine = server.engine().clone();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, engine)
}

async fn start_server() -> String {
    start_server_with(CrewsyncServerBuilder::new()).await.0
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, frame: Value) {
    ws.send(Message::Text(frame.to_string().into()))
        .await
        .expect("send frame");
}

/// Next text frame as JSON.
async fn recv(ws: &mut ClientWs) -> Value {
    loop {
        let msg = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("recv");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("server sends JSON");
        }
    }
}

/// Skips frames until the event `name` arrives and returns its data.
async fn wait_for(ws: &mut ClientWs, name: &str) -> Value {
    loop {
        let frame = recv(ws).await;
        if frame["event"] == name {
            return frame["data"].clone();
        }
    }
}

/// Skips frames until the ack with id `ack` arrives and returns its data.
async fn wait_for_ack(ws: &mut ClientWs, ack: u64) -> Value {
    loop {
        let frame = recv(ws).await;
        if frame["ack"] == ack {
            return frame["data"].clone();
        }
    }
}

async fn join(ws: &mut ClientWs, battle: &str, player: &str) {
    send(
        ws,
        json!({"event": "joinBattle", "data": {"battleId": battle, "playerId": player}}),
    )
    .await;
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_join_broadcasts_then_acks() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        json!({
            "event": "joinBattle",
            "data": {"battleId": "b1", "playerId": "p1", "name": "Ada"},
            "ack": 1
        }),
    )
    .await;

    let joined = recv(&mut ws).await;
    assert_eq!(joined["event"], "battle:playerJoined");
    assert_eq!(joined["data"]["playerId"], "p1");
    assert_eq!(joined["data"]["name"], "Ada");
    assert_eq!(joined["data"]["hp"], 100);
    assert_eq!(joined["data"]["leaderId"], "p1");

    let state = recv(&mut ws).await;
    assert_eq!(state["event"], "battle:state");
    assert_eq!(state["data"]["matchActive"], false);

    assert_eq!(recv(&mut ws).await, json!({"ack": 1, "data": {"ok": true}}));
}

#[tokio::test]
async fn test_room_events_reach_every_member() {
    let addr = start_server().await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;

    join(&mut a, "b1", "a").await;
    wait_for(&mut a, "battle:state").await;
    join(&mut b, "b1", "b").await;

    let seen_by_a = wait_for(&mut a, "battle:playerJoined").await;
    let seen_by_b = wait_for(&mut b, "battle:playerJoined").await;
    assert_eq!(seen_by_a["playerId"], "b");
    assert_eq!(seen_by_b["playerId"], "b");
}

#[tokio::test]
async fn test_rejection_goes_only_to_sender() {
    let addr = start_server().await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;
    join(&mut a, "b1", "a").await;
    wait_for(&mut a, "battle:state").await;
    join(&mut b, "b1", "b").await;
    wait_for(&mut a, "battle:playerJoined").await;
    // The snapshot that follows b's join.
    wait_for(&mut a, "battle:state").await;

    send(
        &mut b,
        json!({
            "event": "startSyncInvitation",
            "data": {"battleId": "b1", "leaderId": "b", "difficulty": "easy"},
            "ack": 5
        }),
    )
    .await;

    let error = wait_for(&mut b, "battle:error").await;
    assert_eq!(error["code"], "NOT_LEADER");
    let ack = wait_for_ack(&mut b, 5).await;
    assert_eq!(ack["ok"], false);
    assert_eq!(ack["code"], "NOT_LEADER");

    // a sees nothing for b's failed attempt; the next frame is a's own ack.
    send(&mut a, json!({"event": "ping", "ack": 6})).await;
    let next = recv(&mut a).await;
    assert_eq!(next["ack"], 6, "unexpected frame {next}");
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(Message::Text("not json at all".into()))
        .await
        .expect("send");
    let error = wait_for(&mut ws, "battle:error").await;
    assert_eq!(error["code"], "INVALID_PAYLOAD");

    send(&mut ws, json!({"event": "ping", "ack": 2})).await;
    assert_eq!(wait_for_ack(&mut ws, 2).await["ok"], true);
}

#[tokio::test]
async fn test_bad_payload_and_unknown_event_reject_ack() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        json!({
            "event": "respondSyncInvitation",
            "data": {"battleId": "b1", "invitationId": "i", "playerId": "p", "accepted": "yes"},
            "ack": 3
        }),
    )
    .await;
    let error = wait_for(&mut ws, "battle:error").await;
    assert_eq!(error["code"], "INVALID_PAYLOAD");
    assert_eq!(wait_for_ack(&mut ws, 3).await["code"], "INVALID_PAYLOAD");

    send(&mut ws, json!({"event": "fly", "data": {}, "ack": 4})).await;
    let error = wait_for(&mut ws, "battle:error").await;
    assert_eq!(error["code"], "UNKNOWN_EVENT");
    assert_eq!(wait_for_ack(&mut ws, 4).await["code"], "UNKNOWN_EVENT");
}

#[tokio::test]
async fn test_non_string_battle_id_is_an_invalid_battle_id() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        json!({"event": "joinBattle", "data": {"battleId": 7, "playerId": "p1"}, "ack": 1}),
    )
    .await;
    let error = wait_for(&mut ws, "battle:error").await;
    assert_eq!(error["code"], "INVALID_BATTLE_ID");
    assert_eq!(wait_for_ack(&mut ws, 1).await["code"], "INVALID_BATTLE_ID");

    send(
        &mut ws,
        json!({"event": "joinBattle", "data": {"battleId": null, "playerId": "p1"}, "ack": 2}),
    )
    .await;
    assert_eq!(wait_for_ack(&mut ws, 2).await["code"], "INVALID_BATTLE_ID");
}

#[tokio::test]
async fn test_closing_socket_removes_player() {
    let addr = start_server().await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;
    join(&mut a, "b1", "a").await;
    wait_for(&mut a, "battle:state").await;
    join(&mut b, "b1", "b").await;
    wait_for(&mut a, "battle:playerJoined").await;

    b.close(None).await.expect("close");

    let left = wait_for(&mut a, "battle:playerLeft").await;
    assert_eq!(left["playerId"], "b");
    assert_eq!(left["leaderId"], "a");
}

#[tokio::test]
async fn test_idle_connection_is_closed_and_cleaned_up() {
    let (addr, engine) =
        start_server_with(CrewsyncServerBuilder::new().idle_timeout(Duration::from_millis(200)))
            .await;
    let mut ws = connect(&addr).await;
    join(&mut ws, "b1", "a").await;
    wait_for(&mut ws, "battle:state").await;

    // Stay silent past the idle timeout.
    let closed = tokio::time::timeout(RECV_TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "server should close an idle connection");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = engine.stats().await.expect("engine running");
    assert_eq!(stats.rooms, 0);
    assert_eq!(stats.connections, 0);
}

#[tokio::test]
async fn test_two_player_match_over_websocket() {
    let addr = start_server().await;
    let mut p1 = connect(&addr).await;
    let mut p2 = connect(&addr).await;

    join(&mut p1, "B1", "P1").await;
    wait_for(&mut p1, "battle:state").await;
    join(&mut p2, "B1", "P2").await;
    wait_for(&mut p2, "battle:state").await;

    send(
        &mut p1,
        json!({
            "event": "startSyncInvitation",
            "data": {"battleId": "B1", "leaderId": "P1", "difficulty": "easy"}
        }),
    )
    .await;
    let invitation = wait_for(&mut p2, "battle:invitation").await;
    assert_eq!(invitation["difficulty"], "easy");
    let invitation_id = invitation["invitationId"].as_str().expect("id").to_owned();

    send(
        &mut p2,
        json!({
            "event": "respondSyncInvitation",
            "data": {
                "battleId": "B1",
                "invitationId": invitation_id,
                "playerId": "P2",
                "accepted": true
            }
        }),
    )
    .await;
    let started = wait_for(&mut p1, "battle:matchStarted").await;
    assert_eq!(started["round"], 1);

    send(
        &mut p1,
        json!({"event": "battle:score", "data": {"battleId": "B1", "playerId": "P1", "score": 50}}),
    )
    .await;
    send(
        &mut p2,
        json!({"event": "battle:score", "data": {"battleId": "B1", "playerId": "P2", "score": "30"}}),
    )
    .await;
    // Frames from different sockets have no mutual order, so wait for
    // P2's score to land before completing the round.
    send(&mut p2, json!({"event": "ping", "ack": 1})).await;
    wait_for_ack(&mut p2, 1).await;

    send(
        &mut p1,
        json!({"event": "battle:completeRound", "data": {"battleId": "B1", "requestedBy": "P1"}}),
    )
    .await;

    let eliminated = wait_for(&mut p2, "battle:eliminated").await;
    assert_eq!(eliminated["playerId"], "P2");
    assert_eq!(eliminated["score"], 30);
    let winner = wait_for(&mut p2, "battle:winner").await;
    assert_eq!(winner["playerId"], "P1");
    let state = wait_for(&mut p2, "battle:state").await;
    assert_eq!(state["matchActive"], false);
    assert_eq!(state["round"], 1);
}
