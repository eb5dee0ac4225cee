//! Integration tests for dialog-client.
//!
//! These drive the public client API against an in-memory transport and
//! check the exact frames written and the events delivered.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dialog_client::codec::GzipCodec;
use dialog_client::protocol::{Compression, Frame, MessageType, Serialization};
use dialog_client::transport::{headers, MemoryConnector, MemoryPeer};
use dialog_client::{
    AckMode, ClientBuilder, ConnectionState, DialogClient, DialogError, FrameError, ServerEvent,
    ServerEventId, SessionConfig, SessionState,
};
use futures::channel::mpsc::UnboundedReceiver;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

fn builder(connector: MemoryConnector, mode: AckMode) -> ClientBuilder {
    DialogClient::builder("app-1", "secret")
        .connector(connector)
        .ack_mode(mode)
}

fn server_frame(id: ServerEventId, slot: &str, body: Value) -> Frame {
    Frame::new(MessageType::FullServerResponse, Serialization::Json)
        .with_event(id.as_u32())
        .with_session_id(slot)
        .with_payload(serde_json::to_vec(&body).unwrap())
}

fn body(frame: &Frame) -> Value {
    serde_json::from_slice(&frame.payload).unwrap()
}

async fn next_peer(peers: &mut UnboundedReceiver<MemoryPeer>) -> MemoryPeer {
    timeout(WAIT, peers.next()).await.unwrap().unwrap()
}

/// Connect with acknowledgement: answer StartConnection with ConnectionStarted.
async fn connect(client: &DialogClient, peers: &mut UnboundedReceiver<MemoryPeer>) -> MemoryPeer {
    let (result, peer) = tokio::join!(client.connect(), async {
        let mut peer = next_peer(peers).await;
        let start = peer.next_frame().await.unwrap();
        assert_eq!(start.event_id, Some(1));
        let connect_id = peer.handshake.connect_id.clone();
        peer.send(&server_frame(ServerEventId::ConnectionStarted, &connect_id, json!({})))
            .unwrap();
        peer
    });
    result.unwrap();
    peer
}

/// Start a session with acknowledgement.
async fn start_session(client: &DialogClient, peer: &mut MemoryPeer, dialog_id: &str) -> String {
    let (result, ()) = tokio::join!(client.start_session(SessionConfig::new("Bot")), async {
        let frame = peer.next_frame().await.unwrap();
        assert_eq!(frame.event_id, Some(100));
        let sid = frame.session_id.clone().unwrap();
        peer.send(&server_frame(
            ServerEventId::SessionStarted,
            &sid,
            json!({ "dialog_id": dialog_id }),
        ))
        .unwrap();
    });
    result.unwrap()
}

fn error_channel(client: &DialogClient) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.on_error(move |err| {
        let _ = tx.send(err.to_string());
    });
    rx
}

#[tokio::test]
async fn test_chat_scenario_writes_expected_frames() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::Optimistic).build().unwrap();

    client.connect().await.unwrap();
    assert!(client.is_connected());
    let connect_id = client.connect_id().unwrap();
    let mut peer = next_peer(&mut peers).await;

    let session_id = client
        .start_session(SessionConfig::new("Bot"))
        .await
        .unwrap();
    assert!(client.is_session_active());
    assert_eq!(client.current_session_id().as_deref(), Some(session_id.as_str()));

    client.send_chat_tts_text("你好", true, true).await.unwrap();
    client.finish_session().await.unwrap();
    assert_eq!(client.session_state(), SessionState::Inactive);

    // disconnect drops unwritten frames, so read these first
    let mut frames = Vec::new();
    for _ in 0..4 {
        frames.push(timeout(WAIT, peer.next_frame()).await.unwrap().unwrap());
    }
    client.disconnect().await.unwrap();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    let handshake = peer.handshake.clone();
    frames.extend(timeout(WAIT, peer.drain()).await.unwrap().unwrap());

    let events: Vec<_> = frames.iter().map(|f| f.event_id).collect();
    assert_eq!(
        events,
        vec![Some(1), Some(100), Some(500), Some(102), Some(2)]
    );

    assert!(frames[0].session_id.is_none());
    assert_eq!(body(&frames[1])["dialog"]["bot_name"], "Bot");
    assert_eq!(frames[1].session_id.as_deref(), Some(session_id.as_str()));
    assert_eq!(frames[2].message_type, MessageType::FullClientRequest);
    assert_eq!(
        &frames[2].payload[..],
        r#"{"start":true,"content":"你好","end":true}"#.as_bytes()
    );
    assert_eq!(frames[3].session_id.as_deref(), Some(session_id.as_str()));
    assert!(frames[4].session_id.is_none());

    let sent: Vec<_> = handshake.headers().into_iter().collect();
    assert!(sent.contains(&(headers::APP_ID, "app-1")));
    assert!(sent.contains(&(headers::ACCESS_KEY, "secret")));
    assert!(sent.contains(&(headers::RESOURCE_ID, "volc.speech.dialog")));
    assert!(sent.contains(&(headers::APP_KEY, "PlgvMymc7f3tQnJ6")));
    assert!(sent.contains(&(headers::CONNECT_ID, connect_id.as_str())));
}

#[tokio::test]
async fn test_ack_gated_connect_and_session() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::AwaitAck).build().unwrap();

    let mut peer = connect(&client, &mut peers).await;
    assert!(client.is_connected());

    let sid = start_session(&client, &mut peer, "dialog-7").await;
    assert!(client.is_session_active());
    assert_eq!(client.current_session_id(), Some(sid));
    assert_eq!(client.last_dialog_id().as_deref(), Some("dialog-7"));

    client.disconnect().await.unwrap();
    let rest = timeout(WAIT, peer.drain()).await.unwrap().unwrap();
    let events: Vec<_> = rest.iter().map(|f| f.event_id).collect();
    assert_eq!(events, vec![Some(102), Some(2)]);
    assert_eq!(client.last_dialog_id().as_deref(), Some("dialog-7"));
}

#[tokio::test]
async fn test_connection_failed_rejects_connect() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::AwaitAck).build().unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    client.on(ServerEventId::ConnectionFailed, move |event| {
        assert!(matches!(&event.event, ServerEvent::ConnectionFailed(p) if p.error == "invalid app id"));
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let (result, _peer) = tokio::join!(client.connect(), async {
        let mut peer = next_peer(&mut peers).await;
        peer.next_frame().await.unwrap();
        let connect_id = peer.handshake.connect_id.clone();
        peer.send(&server_frame(
            ServerEventId::ConnectionFailed,
            &connect_id,
            json!({ "error": "invalid app id" }),
        ))
        .unwrap();
        peer
    });

    assert!(matches!(result, Err(DialogError::ConnectionFailed(m)) if m == "invalid app id"));
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(client.connect_id(), None);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_ack_timeout() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::AwaitAck)
        .ack_timeout(Duration::from_secs(3))
        .build()
        .unwrap();

    let result = client.connect().await;
    assert!(matches!(result, Err(DialogError::AckTimeout("connection"))));
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    // the connection attempt did reach the transport
    let mut peer = next_peer(&mut peers).await;
    assert_eq!(peer.next_frame().await.unwrap().event_id, Some(1));
}

#[tokio::test]
async fn test_session_failed_rejects_start() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::AwaitAck).build().unwrap();
    let mut peer = connect(&client, &mut peers).await;

    let (result, ()) = tokio::join!(client.start_session(SessionConfig::new("Bot")), async {
        let frame = peer.next_frame().await.unwrap();
        let sid = frame.session_id.clone().unwrap();
        peer.send(&server_frame(
            ServerEventId::SessionFailed,
            &sid,
            json!({ "error": "unknown speaker" }),
        ))
        .unwrap();
    });

    assert!(matches!(result, Err(DialogError::SessionFailed(m)) if m == "unknown speaker"));
    assert_eq!(client.session_state(), SessionState::Inactive);
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_session_ack_timeout() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::AwaitAck)
        .ack_timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    let _peer = connect(&client, &mut peers).await;

    let result = client.start_session(SessionConfig::default()).await;
    assert!(matches!(result, Err(DialogError::AckTimeout("session"))));
    assert_eq!(client.session_state(), SessionState::Inactive);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_send_audio_requires_active_session() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::Optimistic).build().unwrap();
    client.connect().await.unwrap();

    let err = client.send_audio(vec![1u8, 2, 3]).await.unwrap_err();
    assert_eq!(err.to_string(), "Cannot send audio while session inactive");
    assert!(matches!(
        client.send_hello("hi").await,
        Err(DialogError::InvalidState { .. })
    ));

    client.start_session(SessionConfig::default()).await.unwrap();
    client.send_audio(vec![9u8, 8, 7]).await.unwrap();

    let mut peer = next_peer(&mut peers).await;
    let mut frames = Vec::new();
    for _ in 0..3 {
        frames.push(timeout(WAIT, peer.next_frame()).await.unwrap().unwrap());
    }
    client.disconnect().await.unwrap();

    let audio = frames
        .iter()
        .find(|f| f.message_type == MessageType::AudioOnlyRequest)
        .unwrap();
    assert_eq!(audio.event_id, Some(200));
    assert_eq!(audio.serialization, Serialization::Raw);
    assert_eq!(&audio.payload[..], &[9, 8, 7]);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::Optimistic).build().unwrap();

    client.disconnect().await.unwrap();
    assert!(peers.try_next().is_err());

    client.connect().await.unwrap();
    let mut peer = next_peer(&mut peers).await;
    let start = timeout(WAIT, peer.next_frame()).await.unwrap().unwrap();
    assert_eq!(start.event_id, Some(1));

    client.disconnect().await.unwrap();
    client.disconnect().await.unwrap();

    let frames = timeout(WAIT, peer.drain()).await.unwrap().unwrap();
    let events: Vec<_> = frames.iter().map(|f| f.event_id).collect();
    assert_eq!(events, vec![Some(2)]);
}

#[tokio::test]
async fn test_error_information_goes_to_error_handlers_only() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::Optimistic).build().unwrap();
    let dispatched = Arc::new(AtomicUsize::new(0));
    for id in ServerEventId::ALL {
        let counter = Arc::clone(&dispatched);
        client.on(id, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }
    let mut errors = error_channel(&client);

    client.connect().await.unwrap();
    let peer = next_peer(&mut peers).await;

    // header, then the payload length and body right away
    let body = br#"{"error":"quota exceeded"}"#;
    let mut bytes = vec![0x11, 0xF0, 0x10, 0x00];
    bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
    bytes.extend_from_slice(body);
    peer.send_raw(bytes).unwrap();

    let message = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert_eq!(message, "quota exceeded");
    assert!(errors.try_recv().is_err());
    assert_eq!(dispatched.load(Ordering::SeqCst), 0);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_error_code_slot_is_opt_in() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::Optimistic)
        .error_code_slot(true)
        .build()
        .unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on_error(move |err| {
        if let DialogError::Server { code, message } = err {
            let _ = tx.send((*code, message.clone()));
        }
    });

    client.connect().await.unwrap();
    let peer = next_peer(&mut peers).await;

    let error_frame = Frame::new(MessageType::ErrorInformation, Serialization::Json)
        .with_error_code(45_000_001)
        .with_payload(&br#"{"error":"quota exceeded"}"#[..]);
    peer.send(&error_frame).unwrap();

    let (code, message) = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(code, Some(45_000_001));
    assert_eq!(message, "quota exceeded");
}

#[tokio::test]
async fn test_disconnect_discards_unwritten_audio() {
    // the peer reads nothing until disconnect, so queued audio stays queued
    let (connector, mut peers) = MemoryConnector::bounded(0);
    let client = builder(connector, AckMode::AwaitAck).build().unwrap();

    let mut peer = connect(&client, &mut peers).await;
    start_session(&client, &mut peer, "dialog-1").await;

    for chunk in 0..20u8 {
        client.send_audio(vec![chunk; 640]).await.unwrap();
    }

    let (result, frames) = tokio::join!(client.disconnect(), async {
        timeout(WAIT, peer.drain()).await.unwrap().unwrap()
    });
    result.unwrap();

    let events: Vec<_> = frames.iter().map(|f| f.event_id).collect();
    let audio = events.iter().filter(|e| **e == Some(200)).count();
    assert!(audio <= 1, "{audio} queued audio frames reached the peer");
    assert_eq!(&events[events.len() - 2..], &[Some(102), Some(2)]);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_reports_failed_goodbye() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::AwaitAck).build().unwrap();

    let mut peer = connect(&client, &mut peers).await;
    peer.stop_reading();

    let err = client.disconnect().await.unwrap_err();
    assert!(matches!(err, DialogError::ConnectionClosed));
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert!(client.disconnect().await.is_ok());
}

#[tokio::test]
async fn test_disconnect_times_out_on_stalled_transport() {
    let (connector, mut peers) = MemoryConnector::bounded(0);
    let client = builder(connector, AckMode::AwaitAck)
        .close_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let mut peer = connect(&client, &mut peers).await;
    start_session(&client, &mut peer, "dialog-1").await;

    let err = timeout(WAIT, client.disconnect()).await.unwrap().unwrap_err();
    assert!(matches!(err, DialogError::Transport(m) if m.contains("close timeout")));
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    drop(peer);
}

#[tokio::test]
async fn test_malformed_frame_is_reported_and_reading_continues() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::Optimistic).build().unwrap();
    let mut errors = error_channel(&client);
    let (tx, mut chats) = mpsc::unbounded_channel();
    client.on(ServerEventId::ChatResponse, move |event| {
        let _ = tx.send(event.chat().map(|c| c.content.clone()));
        Ok(())
    });

    client.connect().await.unwrap();
    let peer = next_peer(&mut peers).await;

    peer.send_raw(vec![0x11u8, 0x94, 0x10, 0x00, 0x00, 0x00]).unwrap();
    let message = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert_eq!(
        message,
        DialogError::Frame(FrameError::Truncated {
            field: "frame",
            needed: 8,
            available: 6
        })
        .to_string()
    );

    peer.send(&server_frame(ServerEventId::ChatResponse, "s", json!({ "content": "still here" })))
        .unwrap();
    let chat = timeout(WAIT, chats.recv()).await.unwrap().unwrap();
    assert_eq!(chat.as_deref(), Some("still here"));
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_failing_handler_does_not_stop_others() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::Optimistic).build().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    client.on(ServerEventId::AsrEnded, |_| panic!("handler bug"));
    client.on(ServerEventId::AsrEnded, |_| {
        Err(DialogError::Handler("rejected".to_string()))
    });
    client.on(ServerEventId::AsrEnded, move |_| {
        let _ = tx.send(());
        Ok(())
    });

    client.connect().await.unwrap();
    let peer = next_peer(&mut peers).await;
    peer.send(&server_frame(ServerEventId::AsrEnded, "s", json!({})))
        .unwrap();
    peer.send(&server_frame(ServerEventId::AsrEnded, "s", json!({})))
        .unwrap();

    timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_typed_payloads_reach_handlers() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::Optimistic).build().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    for id in [
        ServerEventId::AsrResponse,
        ServerEventId::TtsResponse,
        ServerEventId::ChatResponse,
    ] {
        let tx = tx.clone();
        client.on(id, move |event| {
            let _ = tx.send(event.event.clone());
            Ok(())
        });
    }

    client.connect().await.unwrap();
    let peer = next_peer(&mut peers).await;

    peer.send(&server_frame(
        ServerEventId::AsrResponse,
        "s",
        json!({ "results": [{ "text": "turn left", "is_interim": false }] }),
    ))
    .unwrap();

    let audio = Frame::new(MessageType::AudioOnlyResponse, Serialization::Raw)
        .with_event(ServerEventId::TtsResponse.as_u32())
        .with_session_id("s")
        .with_payload(vec![0u8, 127, 255]);
    peer.send(&audio).unwrap();

    let gzipped = Frame::new(MessageType::FullServerResponse, Serialization::Json)
        .with_event(ServerEventId::ChatResponse.as_u32())
        .with_session_id("s")
        .with_compression(Compression::Gzip)
        .with_payload(GzipCodec::compress(br#"{"content":"ok, turning"}"#).unwrap());
    peer.send(&gzipped).unwrap();

    // unknown ids are skipped without reaching anyone
    let unknown = Frame::new(MessageType::FullServerResponse, Serialization::Json)
        .with_event(999)
        .with_session_id("s")
        .with_payload(&b"{}"[..]);
    peer.send(&unknown).unwrap();

    match timeout(WAIT, rx.recv()).await.unwrap().unwrap() {
        ServerEvent::AsrResponse(asr) => {
            assert_eq!(asr.results[0].text, "turn left");
            assert!(!asr.results[0].is_interim);
        }
        other => panic!("unexpected {other:?}"),
    }
    match timeout(WAIT, rx.recv()).await.unwrap().unwrap() {
        ServerEvent::TtsResponse(bytes) => assert_eq!(&bytes[..], &[0, 127, 255]),
        other => panic!("unexpected {other:?}"),
    }
    match timeout(WAIT, rx.recv()).await.unwrap().unwrap() {
        ServerEvent::ChatResponse(chat) => assert_eq!(chat.content, "ok, turning"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_transport_error_resets_state() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::Optimistic).build().unwrap();
    let mut errors = error_channel(&client);

    client.connect().await.unwrap();
    client.start_session(SessionConfig::default()).await.unwrap();
    let peer = next_peer(&mut peers).await;

    peer.fail(DialogError::Transport("connection reset".to_string()))
        .unwrap();
    let message = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert_eq!(message, "Transport error: connection reset");

    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(client.session_state(), SessionState::Inactive);
    assert_eq!(client.current_session_id(), None);
    assert!(matches!(
        client.send_audio(vec![0u8]).await,
        Err(DialogError::InvalidState { .. })
    ));

    // a fresh connect works afterwards
    client.connect().await.unwrap();
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_remote_close_is_reported() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::Optimistic).build().unwrap();
    let mut errors = error_channel(&client);

    client.connect().await.unwrap();
    next_peer(&mut peers).await.close();

    let message = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert_eq!(message, DialogError::ConnectionClosed.to_string());
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_server_finishes_connection() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::AwaitAck).build().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on(ServerEventId::ConnectionFinished, move |_| {
        let _ = tx.send(());
        Ok(())
    });

    let peer = connect(&client, &mut peers).await;
    let connect_id = peer.handshake.connect_id.clone();
    peer.send(&server_frame(ServerEventId::ConnectionFinished, &connect_id, json!({})))
        .unwrap();

    timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_server_finishes_session() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::AwaitAck).build().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on(ServerEventId::SessionFinished, move |_| {
        let _ = tx.send(());
        Ok(())
    });

    let mut peer = connect(&client, &mut peers).await;
    let sid = start_session(&client, &mut peer, "d").await;
    peer.send(&server_frame(ServerEventId::SessionFinished, &sid, json!({})))
        .unwrap();

    timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(client.session_state(), SessionState::Inactive);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_refused_transport() {
    let client = builder(MemoryConnector::refusing("connection refused"), AckMode::AwaitAck)
        .build()
        .unwrap();
    let mut errors = error_channel(&client);

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, DialogError::Transport(_)));
    assert_eq!(
        timeout(WAIT, errors.recv()).await.unwrap().unwrap(),
        "Transport error: connection refused"
    );
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let (connector, _peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::Optimistic).build().unwrap();
    client.connect().await.unwrap();
    assert!(matches!(
        client.connect().await,
        Err(DialogError::InvalidState { operation: "connect", .. })
    ));
}

#[tokio::test]
async fn test_off_stops_delivery() {
    let (connector, mut peers) = MemoryConnector::new();
    let client = builder(connector, AckMode::Optimistic).build().unwrap();
    let removed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&removed);
    let sub = client.on(ServerEventId::TtsEnded, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on(ServerEventId::TtsEnded, move |_| {
        let _ = tx.send(());
        Ok(())
    });
    assert!(client.off(&sub));

    client.connect().await.unwrap();
    let peer = next_peer(&mut peers).await;
    peer.send(&server_frame(ServerEventId::TtsEnded, "s", json!({})))
        .unwrap();

    timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(removed.load(Ordering::SeqCst), 0);
}
