//! Session tests against an in-process WebSocket server.

use futures::{SinkExt, StreamExt};
use livedm_client::{ConnectionState, ReconnectPolicy, Session, SessionConfig, Subscription};
use livedm_protocol::{decode, DecodedPacket, Encoder, Operation};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type ServerWs = WebSocketStream<TcpStream>;

const WAIT: Duration = Duration::from_secs(5);

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/sub", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> ServerWs {
    let (tcp, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("no connection attempt")
        .unwrap();
    accept_async(tcp).await.unwrap()
}

/// Reads the next binary frame from the client and decodes it.
async fn next_client_frame(ws: &mut ServerWs) -> Option<DecodedPacket> {
    loop {
        match tokio::time::timeout(WAIT, ws.next()).await.ok()?? {
            Ok(Message::Binary(data)) => return Some(decode(&data).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

async fn send(ws: &mut ServerWs, frame: bytes::BytesMut) {
    ws.send(Message::binary(frame.freeze())).await.unwrap();
}

fn config(url: &str) -> SessionConfig {
    SessionConfig::new(url, 21452505)
        .with_uid(12345)
        .with_auth_token("test-token")
        .with_reconnect_policy(ReconnectPolicy::new(Duration::from_millis(100), 5))
}

fn collecting_session(
    session: &Session,
) -> (Subscription, mpsc::UnboundedReceiver<DecodedPacket>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sub = session.on_message(move |packet| {
        tx.send(packet.clone())?;
        Ok(())
    });
    (sub, rx)
}

async fn wait_for_state(session: &Session, state: ConnectionState) {
    let mut rx = session.watch_state();
    tokio::time::timeout(WAIT, rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("session never reached {state}"))
        .unwrap();
}

#[tokio::test]
async fn test_end_to_end_dispatch() {
    let (listener, url) = bind().await;
    let session = Session::new(config(&url));
    let (_sub, mut packets) = collecting_session(&session);

    session.connect(true).await;
    let mut server = accept(&listener).await;

    let auth = next_client_frame(&mut server).await.unwrap();
    assert_eq!(auth.op(), Some(Operation::Auth));
    assert_eq!(
        auth.messages,
        vec![json!({
            "uid": 12345,
            "roomid": 21452505,
            "protover": 3,
            "platform": "web",
            "type": 2,
            "key": "test-token",
        })]
    );

    let heartbeat = next_client_frame(&mut server).await.unwrap();
    assert_eq!(heartbeat.op(), Some(Operation::Heartbeat));
    assert!(heartbeat.messages.is_empty());

    wait_for_state(&session, ConnectionState::Live).await;

    let danmu = r#"{"cmd":"DANMU_MSG","info":[[0,1,25,16777215,1700000000000],"hello world",[42,"alice",0,0,0,10000,1,""]]}"#;
    send(&mut server, Encoder::auth_reply(0).unwrap()).await;
    send(&mut server, Encoder::heartbeat_reply(42)).await;
    send(&mut server, Encoder::raw(5, 0, 0, danmu.as_bytes())).await;

    let first = tokio::time::timeout(WAIT, packets.recv()).await.unwrap().unwrap();
    assert_eq!(first.op(), Some(Operation::HeartbeatReply));
    assert_eq!(first.messages, vec![json!({"count": 42})]);

    let second = tokio::time::timeout(WAIT, packets.recv()).await.unwrap().unwrap();
    assert_eq!(second.op(), Some(Operation::MessageReply));
    assert_eq!(
        second.messages,
        vec![serde_json::from_str::<Value>(danmu).unwrap()]
    );

    // The auth reply produced no delivery.
    assert!(tokio::time::timeout(Duration::from_millis(200), packets.recv())
        .await
        .is_err());

    session.disconnect().await;
    assert_eq!(session.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_compressed_packets_dispatched_in_order() {
    let (listener, url) = bind().await;
    let session = Session::new(config(&url));
    let (_sub, mut packets) = collecting_session(&session);

    session.connect(false).await;
    let mut server = accept(&listener).await;
    next_client_frame(&mut server).await.unwrap();
    next_client_frame(&mut server).await.unwrap();

    let values: Vec<Value> = (0..3).map(|i| json!({"cmd": "DANMU_MSG", "n": i})).collect();
    send(
        &mut server,
        Encoder::compressed_message_reply(livedm_protocol::BodyEncoding::Brotli, &values).unwrap(),
    )
    .await;

    let packet = tokio::time::timeout(WAIT, packets.recv()).await.unwrap().unwrap();
    assert_eq!(packet.protocol_version, 3);
    assert_eq!(packet.messages, values);

    session.disconnect().await;
}

#[tokio::test]
async fn test_malformed_frames_do_not_end_session() {
    let (listener, url) = bind().await;
    let session = Session::new(config(&url));
    let (_sub, mut packets) = collecting_session(&session);

    session.connect(true).await;
    let mut server = accept(&listener).await;
    next_client_frame(&mut server).await.unwrap();
    next_client_frame(&mut server).await.unwrap();

    // Truncated frame, unknown body version, unknown operation.
    let full = Encoder::message_reply(&json!({"cmd": "A"})).unwrap();
    send(&mut server, bytes::BytesMut::from(&full[..full.len() - 2])).await;
    send(&mut server, Encoder::raw(5, 9, 0, br#"{"cmd":"B"}"#)).await;
    send(&mut server, Encoder::raw(99, 0, 0, br#"{"cmd":"C"}"#)).await;
    send(&mut server, Encoder::message_reply(&json!({"cmd": "D"})).unwrap()).await;

    let packet = tokio::time::timeout(WAIT, packets.recv()).await.unwrap().unwrap();
    assert_eq!(packet.messages, vec![json!({"cmd": "D"})]);
    assert!(session.state().is_live());

    session.disconnect().await;
}

#[tokio::test]
async fn test_handler_panic_does_not_end_session() {
    let (listener, url) = bind().await;
    let session = Session::new(config(&url));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = session.on_message(move |packet| {
        if packet.heartbeat_count() == Some(1) {
            panic!("display surface crashed");
        }
        tx.send(packet.clone())?;
        Ok(())
    });

    session.connect(true).await;
    let mut server = accept(&listener).await;
    next_client_frame(&mut server).await.unwrap();
    next_client_frame(&mut server).await.unwrap();

    send(&mut server, Encoder::heartbeat_reply(1)).await;
    send(&mut server, Encoder::heartbeat_reply(2)).await;

    let packet = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(packet.heartbeat_count(), Some(2));
    assert!(session.state().is_live());

    session.disconnect().await;
}

#[tokio::test]
async fn test_periodic_heartbeat() {
    let (listener, url) = bind().await;
    let session = Session::new(config(&url).with_heartbeat_interval(Duration::from_millis(50)));

    session.connect(false).await;
    let mut server = accept(&listener).await;
    assert_eq!(
        next_client_frame(&mut server).await.unwrap().op(),
        Some(Operation::Auth)
    );

    for _ in 0..3 {
        let frame = next_client_frame(&mut server).await.unwrap();
        assert_eq!(frame.op(), Some(Operation::Heartbeat));
    }

    session.disconnect().await;
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let (listener, url) = bind().await;
    let session = Session::new(config(&url));

    session.connect(true).await;
    let mut first = accept(&listener).await;
    next_client_frame(&mut first).await.unwrap();
    wait_for_state(&session, ConnectionState::Live).await;

    first.close(None).await.unwrap();
    drop(first);

    let mut second = accept(&listener).await;
    let auth = next_client_frame(&mut second).await.unwrap();
    assert_eq!(auth.op(), Some(Operation::Auth));

    wait_for_state(&session, ConnectionState::Live).await;
    assert_eq!(session.retry_count(), 0);

    session.disconnect().await;
}

#[tokio::test]
async fn test_no_reconnect_when_disabled() {
    let (listener, url) = bind().await;
    let session = Session::new(config(&url));

    session.connect(false).await;
    let mut server = accept(&listener).await;
    next_client_frame(&mut server).await.unwrap();
    wait_for_state(&session, ConnectionState::Live).await;

    server.close(None).await.unwrap();
    drop(server);

    wait_for_state(&session, ConnectionState::Idle).await;
    assert!(
        tokio::time::timeout(Duration::from_millis(500), listener.accept())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_disconnect_suppresses_reconnect() {
    let (listener, url) = bind().await;
    let session = Session::new(config(&url));

    session.connect(true).await;
    let mut server = accept(&listener).await;
    next_client_frame(&mut server).await.unwrap();
    wait_for_state(&session, ConnectionState::Live).await;

    session.disconnect().await;
    assert_eq!(session.state(), ConnectionState::Idle);

    // The client's close is seen by the server, and nothing reconnects.
    while next_client_frame(&mut server).await.is_some() {}
    assert!(
        tokio::time::timeout(Duration::from_millis(500), listener.accept())
            .await
            .is_err()
    );
    assert_eq!(session.state(), ConnectionState::Idle);

    // Idempotent.
    session.disconnect().await;
    assert_eq!(session.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_reconnect_backoff_against_unreachable_server() {
    // Bind then drop to get a port nobody listens on.
    let (listener, url) = bind().await;
    drop(listener);

    let session = Session::new(config(&url));
    session.connect(true).await;

    wait_for_state(&session, ConnectionState::Reconnecting).await;
    assert!(session.retry_count() >= 1);

    let mut rx = session.watch_state();
    tokio::time::timeout(WAIT, async {
        while session.retry_count() < 3 {
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    session.disconnect().await;
    assert_eq!(session.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_connect_twice_replaces_socket() {
    let (listener, url) = bind().await;
    let session = Session::new(config(&url));

    session.connect(true).await;
    let mut first = accept(&listener).await;
    next_client_frame(&mut first).await.unwrap();
    wait_for_state(&session, ConnectionState::Live).await;

    session.connect(true).await;
    let mut second = accept(&listener).await;
    assert_eq!(
        next_client_frame(&mut second).await.unwrap().op(),
        Some(Operation::Auth)
    );

    // The first socket was closed by the client.
    while next_client_frame(&mut first).await.is_some() {}

    session.disconnect().await;
}

#[tokio::test]
async fn test_zero_heartbeat_interval_keeps_session_alive() {
    let (listener, url) = bind().await;
    let mut zero = config(&url);
    zero.heartbeat_interval = Duration::ZERO;
    let session = Session::new(zero);
    let (_sub, mut packets) = collecting_session(&session);

    session.connect(true).await;
    let mut server = accept(&listener).await;
    assert_eq!(
        next_client_frame(&mut server).await.unwrap().op(),
        Some(Operation::Auth)
    );
    for _ in 0..3 {
        let frame = next_client_frame(&mut server).await.unwrap();
        assert_eq!(frame.op(), Some(Operation::Heartbeat));
    }

    send(&mut server, Encoder::heartbeat_reply(7)).await;
    let packet = tokio::time::timeout(WAIT, packets.recv()).await.unwrap().unwrap();
    assert_eq!(packet.heartbeat_count(), Some(7));
    assert!(session.state().is_live());

    session.disconnect().await;
    assert_eq!(session.state(), ConnectionState::Idle);
}
