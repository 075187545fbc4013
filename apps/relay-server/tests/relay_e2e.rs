//! End-to-end relay tests: two real parties over real WebSockets, with the
//! crypto engine on each side. The relay only ever sees opaque bytes.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crypto_engine::CryptoEngine;
use relay_protocol::{ClientEvent, Role, ServerEvent, SESSION_ID_LEN};
use relay_server::{AppState, Config};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn start_relay(expiry_horizon: Duration) -> (SocketAddr, AppState) {
    let config = Config {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        public_origin: Some("https://sotto.test".to_string()),
        expiry_horizon,
        sweep_interval: Duration::from_secs(60),
    };
    let state = AppState::new(config);
    let app = relay_server::app(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

async fn connect(addr: SocketAddr) -> Socket {
    let (ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    ws
}

async fn send(ws: &mut Socket, event: &ClientEvent) {
    let json = serde_json::to_string(event).unwrap();
    ws.send(Message::Text(json.into())).await.unwrap();
}

async fn recv(ws: &mut Socket) -> ServerEvent {
    let deadline = tokio::time::sleep(RECV_TIMEOUT);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            frame = ws.next() => match frame.expect("socket closed").unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected frame: {other:?}"),
            },
            _ = &mut deadline => panic!("timed out waiting for event"),
        }
    }
}

/// Wait for a registry condition that settles after a disconnect.
async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn full_two_party_chat_flow() {
    let (addr, state) = start_relay(Duration::from_secs(24 * 60 * 60)).await;

    // A creates a session and receives the shareable link
    let mut a = connect(addr).await;
    send(&mut a, &ClientEvent::CreateSession).await;
    let (session_id, link) = match recv(&mut a).await {
        ServerEvent::SessionCreated {
            session_id,
            shareable_link,
        } => (session_id, shareable_link),
        other => panic!("expected SessionCreated, got {other:?}"),
    };
    assert_eq!(session_id.as_str().len(), SESSION_ID_LEN);
    assert_eq!(link, format!("https://sotto.test/chat/{session_id}"));

    // A generates keys while waiting
    let mut a_engine = CryptoEngine::new();
    let a_pub = a_engine.generate_key_pair();

    // B joins via the token from the link
    let mut b = connect(addr).await;
    send(
        &mut b,
        &ClientEvent::JoinSession {
            session_id: session_id.as_str().to_string(),
        },
    )
    .await;
    match recv(&mut b).await {
        ServerEvent::SessionJoined {
            role,
            shareable_link,
        } => {
            assert_eq!(role, Role::Joiner);
            assert!(shareable_link.is_none(), "joiner must not get a link");
        }
        other => panic!("expected SessionJoined, got {other:?}"),
    }

    // A is told the peer arrived and re-sends its public key
    let b_conn = match recv(&mut a).await {
        ServerEvent::PeerJoined { peer_id } => peer_id,
        other => panic!("expected PeerJoined, got {other:?}"),
    };
    send(&mut a, &ClientEvent::PublicKey { public_key: a_pub }).await;

    // B answers with its own key; both sides derive the same secret
    let mut b_engine = CryptoEngine::new();
    let b_pub = b_engine.generate_key_pair();
    send(&mut b, &ClientEvent::PublicKey { public_key: b_pub }).await;

    match recv(&mut b).await {
        ServerEvent::PublicKey { public_key } => b_engine.derive_shared_key(&public_key).unwrap(),
        other => panic!("expected PublicKey, got {other:?}"),
    }
    match recv(&mut a).await {
        ServerEvent::PublicKey { public_key } => a_engine.derive_shared_key(&public_key).unwrap(),
        other => panic!("expected PublicKey, got {other:?}"),
    }
    assert!(a_engine.is_ready() && b_engine.is_ready());

    // A -> B: encrypted hello
    let envelope = a_engine.encrypt(b"hello").unwrap();
    send(&mut a, &ClientEvent::Envelope { envelope }).await;
    match recv(&mut b).await {
        ServerEvent::Envelope {
            envelope,
            relay_timestamp_ms,
        } => {
            assert!(relay_timestamp_ms > 0);
            assert_eq!(b_engine.decrypt(&envelope).unwrap(), b"hello");
        }
        other => panic!("expected Envelope, got {other:?}"),
    }

    // typing notice is forwarded without ack
    send(&mut b, &ClientEvent::Typing { is_typing: true }).await;
    match recv(&mut a).await {
        ServerEvent::Typing { is_typing } => assert!(is_typing),
        other => panic!("expected Typing, got {other:?}"),
    }

    // a third connection cannot join the full session
    let mut c = connect(addr).await;
    send(
        &mut c,
        &ClientEvent::JoinSession {
            session_id: session_id.as_str().to_string(),
        },
    )
    .await;
    match recv(&mut c).await {
        ServerEvent::Error { message } => assert_eq!(message, "session not available"),
        other => panic!("expected Error, got {other:?}"),
    }

    // B leaves: A is notified, the session survives with A alone
    b.close(None).await.unwrap();
    match recv(&mut a).await {
        ServerEvent::PeerLeft { peer_id } => assert_eq!(peer_id, b_conn),
        other => panic!("expected PeerLeft, got {other:?}"),
    }
    assert_eq!(state.registry.len(), 1);

    // A leaves too: the emptied session is removed from the registry
    a.close(None).await.unwrap();
    let registry = state.registry.clone();
    wait_until(move || registry.len() == 0).await;
}

#[tokio::test]
async fn malformed_token_is_rejected_before_lookup() {
    let (addr, _state) = start_relay(Duration::from_secs(60)).await;

    let mut ws = connect(addr).await;
    send(
        &mut ws,
        &ClientEvent::JoinSession {
            session_id: "not-a-token".to_string(),
        },
    )
    .await;
    match recv(&mut ws).await {
        ServerEvent::Error { message } => assert_eq!(message, "invalid session id"),
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn envelope_without_session_is_an_error() {
    let (addr, _state) = start_relay(Duration::from_secs(60)).await;

    let mut ws = connect(addr).await;
    let mut engine = CryptoEngine::new();
    let mut peer = CryptoEngine::new();
    let peer_pub = peer.generate_key_pair();
    engine.generate_key_pair();
    engine.derive_shared_key(&peer_pub).unwrap();

    let envelope = engine.encrypt(b"nobody home").unwrap();
    send(&mut ws, &ClientEvent::Envelope { envelope }).await;
    match recv(&mut ws).await {
        ServerEvent::Error { message } => assert_eq!(message, "no active session"),
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn expired_session_rejects_join_and_relay() {
    let (addr, _state) = start_relay(Duration::from_millis(200)).await;

    let mut a = connect(addr).await;
    send(&mut a, &ClientEvent::CreateSession).await;
    let session_id = match recv(&mut a).await {
        ServerEvent::SessionCreated { session_id, .. } => session_id,
        other => panic!("expected SessionCreated, got {other:?}"),
    };

    tokio::time::sleep(Duration::from_millis(300)).await;

    // admission past the horizon fails with the generic message
    let mut b = connect(addr).await;
    send(
        &mut b,
        &ClientEvent::JoinSession {
            session_id: session_id.as_str().to_string(),
        },
    )
    .await;
    match recv(&mut b).await {
        ServerEvent::Error { message } => assert_eq!(message, "session not available"),
        other => panic!("expected Error, got {other:?}"),
    }

    // relay attempts by the remaining member fail too
    let mut engine = CryptoEngine::new();
    let mut peer = CryptoEngine::new();
    let peer_pub = peer.generate_key_pair();
    engine.generate_key_pair();
    engine.derive_shared_key(&peer_pub).unwrap();

    let envelope = engine.encrypt(b"too late").unwrap();
    send(&mut a, &ClientEvent::Envelope { envelope }).await;
    match recv(&mut a).await {
        ServerEvent::Error { message } => assert_eq!(message, "session is no longer valid"),
        other => panic!("expected Error, got {other:?}"),
    }
}
