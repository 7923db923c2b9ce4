// End-to-end tests for the connection handler
//
// Each test drives ConnectionHandler callbacks the way the WebSocket
// transport does and reads what the client would receive.

mod common;

use asr_relay::recognizer::{RecognitionConfig, RecognizerHolder, TranscriptEvent};
use asr_relay::relay::{ConnectionHandler, END_SIGNAL, NORMAL_CLOSURE};
use asr_relay::{ClientChannel, OutboundMessage, SessionState};
use common::{recv_message, wait_until, MockBackend, MockConnector};
use std::sync::Arc;

fn handler_with(connector: Arc<MockConnector>) -> ConnectionHandler {
    let holder = Arc::new(RecognizerHolder::new(connector));
    ConnectionHandler::new(holder, RecognitionConfig::default())
}

#[tokio::test]
async fn test_stream_partials_then_final_then_end() {
    let connector = MockConnector::new(MockBackend::new());
    let backend = connector.backend();
    let handler = handler_with(connector);

    let (channel, mut rx) = ClientChannel::new("conn-a");
    handler.on_connect(channel).await;
    assert_eq!(handler.session_count().await, 1);

    for i in 0..10u8 {
        handler.on_binary_message("conn-a", &[i; 320]).await;
    }
    assert_eq!(backend.send_count(), 10);

    backend.emit(TranscriptEvent::Partial("今天".to_string()));
    backend.emit(TranscriptEvent::Partial("今天天气".to_string()));
    backend.emit(TranscriptEvent::Final(Some("今天天气不错。".to_string())));

    assert_eq!(recv_message(&mut rx).await, OutboundMessage::partial("今天"));
    assert_eq!(recv_message(&mut rx).await, OutboundMessage::partial("今天天气"));
    assert_eq!(
        recv_message(&mut rx).await,
        OutboundMessage::final_result("今天天气不错。")
    );

    handler.on_text_message("conn-a", END_SIGNAL).await;

    let session = handler.session("conn-a").await.unwrap();
    assert_eq!(session.state().await, SessionState::Stopped);
    assert_eq!(backend.stop_count(), 1);

    handler.on_binary_message("conn-a", &[0u8; 320]).await;
    assert_eq!(backend.send_count(), 10, "No backend calls after end");

    handler.on_close("conn-a", NORMAL_CLOSURE, "").await;
    assert_eq!(backend.stop_count(), 1);
    assert_eq!(backend.start_count(), 1);
}

#[tokio::test]
async fn test_backend_unavailable_leaves_connection_sessionless() {
    let connector = MockConnector::unavailable("missing credentials");
    let handler = handler_with(connector.clone());

    let (channel, mut rx) = ClientChannel::new("conn-b");
    handler.on_connect(channel.clone()).await;

    let msg = recv_message(&mut rx).await;
    assert_eq!(
        msg,
        OutboundMessage::error("failed to start recognition: missing credentials")
    );
    assert!(channel.is_open(), "Connection stays open");
    assert_eq!(handler.session_count().await, 0);

    // Frames are dropped, end and close are still handled
    handler.on_binary_message("conn-b", &[0u8; 320]).await;
    handler.on_text_message("conn-b", END_SIGNAL).await;
    handler.on_close("conn-b", NORMAL_CLOSURE, "").await;

    assert!(rx.try_recv().is_err(), "Exactly one error message");
    assert_eq!(connector.backend().send_count(), 0);
}

#[tokio::test]
async fn test_failure_mid_stream_blocks_further_audio() {
    let connector = MockConnector::new(MockBackend::new());
    let backend = connector.backend();
    let handler = handler_with(connector);

    let (channel, mut rx) = ClientChannel::new("conn-c");
    handler.on_connect(channel).await;

    handler.on_binary_message("conn-c", &[0u8; 320]).await;
    backend.emit(TranscriptEvent::Failure {
        status: Some(40000004),
        message: Some("IDLE_TIMEOUT".to_string()),
    });

    assert_eq!(recv_message(&mut rx).await, OutboundMessage::error("IDLE_TIMEOUT"));
    assert!(wait_until(|| backend.stop_count() == 1).await);

    handler.on_binary_message("conn-c", &[0u8; 320]).await;
    handler.on_binary_message("conn-c", &[0u8; 320]).await;
    assert_eq!(backend.send_count(), 1);

    // Session stays registered until the client closes
    assert_eq!(handler.session_count().await, 1);
    handler.on_close("conn-c", 1006, "").await;
    assert_eq!(handler.session_count().await, 0);
    assert_eq!(backend.stop_count(), 1);
}

#[tokio::test]
async fn test_start_failure_sends_one_error() {
    let connector = MockConnector::new(MockBackend::failing("Gateway:ACCESS_DENIED"));
    let handler = handler_with(connector);

    let (channel, mut rx) = ClientChannel::new("conn-d");
    handler.on_connect(channel).await;

    assert_eq!(
        recv_message(&mut rx).await,
        OutboundMessage::error("failed to start recognition: Gateway:ACCESS_DENIED")
    );
    assert_eq!(handler.session_count().await, 0);
}

#[tokio::test]
async fn test_duplicate_connect_does_not_double_start() {
    let connector = MockConnector::new(MockBackend::new());
    let backend = connector.backend();
    let handler = handler_with(connector);

    let (channel, _rx) = ClientChannel::new("conn-e");
    handler.on_connect(channel.clone()).await;
    handler.on_connect(channel).await;

    assert_eq!(backend.start_count(), 1);
    assert_eq!(handler.session_count().await, 1);
}

#[tokio::test]
async fn test_other_text_is_ignored() {
    let connector = MockConnector::new(MockBackend::new());
    let backend = connector.backend();
    let handler = handler_with(connector);

    let (channel, _rx) = ClientChannel::new("conn-f");
    handler.on_connect(channel).await;

    handler.on_text_message("conn-f", "END").await;
    handler.on_text_message("conn-f", "{\"cmd\":\"end\"}").await;

    let session = handler.session("conn-f").await.unwrap();
    assert_eq!(session.state().await, SessionState::Active);
    assert_eq!(backend.stop_count(), 0);
}

#[tokio::test]
async fn test_close_stops_and_removes_session() {
    let connector = MockConnector::new(MockBackend::new());
    let backend = connector.backend();
    let handler = handler_with(connector);

    let (channel, _rx) = ClientChannel::new("conn-g");
    handler.on_connect(channel.clone()).await;
    let session = handler.session("conn-g").await.unwrap();

    channel.close();
    handler.on_close("conn-g", 1001, "going away").await;

    assert_eq!(session.state().await, SessionState::Stopped);
    assert_eq!(backend.stop_count(), 1);
    assert!(handler.session("conn-g").await.is_none());
}

#[tokio::test]
async fn test_connections_share_one_backend() {
    let connector = MockConnector::new(MockBackend::new());
    let backend = connector.backend();
    let handler = Arc::new(handler_with(connector.clone()));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let handler = Arc::clone(&handler);
        tasks.push(tokio::spawn(async move {
            let (channel, _rx) = ClientChannel::new(format!("conn-{}", i));
            handler.on_connect(channel).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(connector.connect_count(), 1);
    assert_eq!(backend.start_count(), 8);
    assert_eq!(handler.session_count().await, 8);

    let stats = handler.stats().await;
    assert_eq!(stats.len(), 8);
    assert!(stats.iter().all(|s| s.state == SessionState::Active));

    handler.stop_all().await;
    assert_eq!(handler.session_count().await, 0);
    assert_eq!(backend.stop_count(), 8);
}
