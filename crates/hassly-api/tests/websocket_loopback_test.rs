// End-to-end test over a real WebSocket on the loopback interface.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use hassly_api::command::{GetConfig, Ping};
use hassly_api::{CloseOutcome, Connection, ConnectionConfig, ConnectionState};

const WAIT: Duration = Duration::from_secs(5);

async fn next_json<S>(ws: &mut WebSocketStream<S>) -> Value
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(_)) => {}
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

async fn send_json<S>(ws: &mut WebSocketStream<S>, value: Value)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    ws.send(Message::text(value.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_round_trip_over_real_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        send_json(&mut ws, json!({ "type": "auth_required", "ha_version": "2024.6.1" })).await;
        let auth = next_json(&mut ws).await;
        assert_eq!(auth, json!({ "type": "auth", "access_token": "loopback-token" }));
        send_json(&mut ws, json!({ "type": "auth_ok", "ha_version": "2024.6.1" })).await;

        let ping = next_json(&mut ws).await;
        assert_eq!(ping, json!({ "id": 1, "type": "ping" }));
        send_json(&mut ws, json!({ "id": 1, "type": "pong" })).await;

        let get_config = next_json(&mut ws).await;
        assert_eq!(get_config, json!({ "id": 2, "type": "get_config" }));
        send_json(
            &mut ws,
            json!({
                "id": 2,
                "type": "result",
                "success": true,
                "result": { "location_name": "Home", "version": "2024.6.1" }
            }),
        )
        .await;

        // Read until the client's close frame; tungstenite answers it.
        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                break;
            }
        }
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut config =
        ConnectionConfig::new("127.0.0.1", SecretString::from("loopback-token".to_string()));
    config.port = Some(port);
    config.close_timeout = Duration::from_secs(2);

    let conn = Connection::open(config).unwrap();
    timeout(WAIT, conn.wait_ready()).await.unwrap().unwrap();
    assert_eq!(conn.server_version().await.as_deref(), Some("2024.6.1"));

    let pong = timeout(WAIT, conn.request(Ping::default())).await.unwrap().unwrap();
    assert_eq!(pong.id, 1);
    assert!(pong.success);

    let reply = timeout(WAIT, conn.request(GetConfig::default()))
        .await
        .unwrap()
        .unwrap();
    let core: Value = reply.parse().unwrap();
    assert_eq!(core["location_name"], "Home");

    assert_eq!(timeout(WAIT, conn.close()).await.unwrap(), CloseOutcome::Clean);
    assert_eq!(conn.current_state(), ConnectionState::Disconnected);

    timeout(WAIT, server).await.unwrap().unwrap();
}
