use crate::recognizer::{RecognitionConfig, RecognizerHolder};
use crate::session::{ClientChannel, OutboundMessage, RecognitionSession, SessionStats};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Text frame that asks for graceful end of recognition
pub const END_SIGNAL: &str = "end";

/// WebSocket close code for a normal closure
pub const NORMAL_CLOSURE: u16 = 1000;

/// Bridges client connections to recognition sessions
///
/// Callbacks for one connection are expected to arrive in order; different
/// connections may call in concurrently. The only state shared between
/// connections is the backend holder.
pub struct ConnectionHandler {
    /// Shared backend handle
    holder: Arc<RecognizerHolder>,

    /// Task parameters for every session
    config: RecognitionConfig,

    /// Live sessions (connection_id → session)
    sessions: RwLock<HashMap<String, Arc<RecognitionSession>>>,
}

impl ConnectionHandler {
    pub fn new(holder: Arc<RecognizerHolder>, config: RecognitionConfig) -> Self {
        Self {
            holder,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// A client connected: create and start its recognition session
    ///
    /// On failure the client gets one error message and the connection stays
    /// open without a session.
    pub async fn on_connect(&self, channel: ClientChannel) {
        let connection_id = channel.connection_id().to_string();
        info!("Connection {} established, starting recognition", connection_id);

        if self.sessions.read().await.contains_key(&connection_id) {
            warn!(
                "Connection {} already has a recognition session",
                connection_id
            );
            return;
        }

        let backend = match self.holder.get_client().await {
            Ok(backend) => backend,
            Err(e) => {
                error!(
                    "Recognition backend unavailable for connection {}: {}",
                    connection_id, e
                );
                Self::report_start_failure(&channel, e.detail());
                return;
            }
        };

        let session = RecognitionSession::new(channel.clone(), backend, self.config.clone());

        if let Err(e) = session.start().await {
            Self::report_start_failure(&channel, e.detail());
            return;
        }

        self.sessions.write().await.insert(connection_id, session);
    }

    /// Forward a binary audio frame to the connection's session
    pub async fn on_binary_message(&self, connection_id: &str, frame: &[u8]) {
        match self.session(connection_id).await {
            Some(session) => session.send(frame).await,
            None => debug!(
                "No session for connection {}, dropping {} bytes",
                connection_id,
                frame.len()
            ),
        }
    }

    /// Handle a text frame; only the end signal means anything
    pub async fn on_text_message(&self, connection_id: &str, text: &str) {
        if text != END_SIGNAL {
            debug!("Ignoring text message from {}: {:?}", connection_id, text);
            return;
        }

        info!("End signal received from connection {}", connection_id);

        if let Some(session) = self.session(connection_id).await {
            session.stop().await;
        }
    }

    /// The connection closed: drop and stop its session whatever the code
    pub async fn on_close(&self, connection_id: &str, code: u16, reason: &str) {
        let session = self.sessions.write().await.remove(connection_id);

        if let Some(session) = session {
            session.stop().await;
        }

        if code == NORMAL_CLOSURE {
            info!(
                "Connection {} closed normally (code=1000, reason={:?}): client stopped recording, left the page or timed out",
                connection_id, reason
            );
        } else {
            info!(
                "Connection {} closed (code={}, reason={:?})",
                connection_id, code, reason
            );
        }
    }

    /// Transport failure: log only, the transport owns the close
    pub fn on_transport_error(&self, connection_id: &str, error: &dyn Display) {
        warn!("Transport error on connection {}: {}", connection_id, error);
    }

    /// Stop every live session (process shutdown)
    pub async fn stop_all(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().collect();

        for (connection_id, session) in sessions {
            info!("Stopping session for connection {} on shutdown", connection_id);
            session.stop().await;
        }
    }

    pub async fn session(&self, connection_id: &str) -> Option<Arc<RecognitionSession>> {
        self.sessions.read().await.get(connection_id).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Statistics for every live session
    pub async fn stats(&self) -> Vec<SessionStats> {
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();

        let mut stats = Vec::with_capacity(sessions.len());
        for session in sessions {
            stats.push(session.get_stats().await);
        }
        stats
    }

    fn report_start_failure(channel: &ClientChannel, cause: &str) {
        channel.send(OutboundMessage::error(format!(
            "failed to start recognition: {}",
            cause
        )));
    }
}
