//! Integration tests for the WebSocket gateway transport.
//!
//! Each test binds to port 0 and asks the transport for the address the
//! OS picked, then drives a real `tokio-tungstenite` client against it.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use crewsync_transport::{Connection, Transport, WebSocketTransport};
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn connect_client(addr: &str) -> ClientWs {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client should connect");
        ws
    }

    async fn accept_pair() -> (crewsync_transport::WebSocketConnection, ClientWs) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("bound address").to_string();

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });
        let client = connect_client(&addr).await;
        let server_conn = server_handle.await.expect("accept task");
        (server_conn, client)
    }

    #[tokio::test]
    async fn test_json_frames_travel_as_text() {
        let (server_conn, mut client_ws) = accept_pair().await;
        assert!(server_conn.id().into_inner() > 0);
        assert!(server_conn.peer_addr().is_some());

        server_conn
            .send(br#"{"event":"battle:state"}"#)
            .await
            .expect("send should succeed");

        let msg = client_ws.next().await.unwrap().unwrap();
        match msg {
            Message::Text(text) => assert_eq!(text.as_str(), r#"{"event":"battle:state"}"#),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_client_text_frame_is_received_as_bytes() {
        let (server_conn, mut client_ws) = accept_pair().await;

        client_ws
            .send(Message::Text(r#"{"event":"ping"}"#.into()))
            .await
            .unwrap();

        let received = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should have data");
        assert_eq!(received, br#"{"event":"ping"}"#);
    }

    #[tokio::test]
    async fn test_send_while_reader_is_parked() {
        // The reader holds the stream half; the writer must not block on it.
        let (server_conn, mut client_ws) = accept_pair().await;
        let server_conn = std::sync::Arc::new(server_conn);

        let reader = std::sync::Arc::clone(&server_conn);
        let read_task = tokio::spawn(async move { reader.recv().await });

        tokio::time::timeout(Duration::from_secs(2), server_conn.send(b"{}"))
            .await
            .expect("send must not wait for the reader")
            .expect("send should succeed");

        let msg = client_ws.next().await.unwrap().unwrap();
        assert_eq!(msg.into_data().as_ref(), b"{}");

        client_ws.send(Message::Close(None)).await.unwrap();
        let result = read_task.await.unwrap().expect("recv should not error");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_recv_returns_none_on_client_close() {
        let (server_conn, mut client_ws) = accept_pair().await;

        client_ws.send(Message::Close(None)).await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }
}
