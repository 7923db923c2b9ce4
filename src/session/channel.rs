use super::message::OutboundMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Write half of a client connection
///
/// Cloned into every producer (connection handler, backend event pump).
/// Once closed, sends are silently dropped.
#[derive(Debug, Clone)]
pub struct ClientChannel {
    connection_id: String,
    tx: mpsc::UnboundedSender<OutboundMessage>,
    open: Arc<AtomicBool>,
}

impl ClientChannel {
    /// Create a channel and the receiver the transport writer drains
    pub fn new(connection_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Self {
            connection_id: connection_id.into(),
            tx,
            open: Arc::new(AtomicBool::new(true)),
        };
        (channel, rx)
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    /// Mark the connection closed; later sends are dropped
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Queue a message for the client
    ///
    /// Returns false when the message was dropped because the connection is gone.
    pub fn send(&self, message: OutboundMessage) -> bool {
        if !self.is_open() {
            debug!(
                "Dropping message for closed connection {}: {:?}",
                self.connection_id, message
            );
            return false;
        }

        self.tx.send(message).is_ok()
    }
}
