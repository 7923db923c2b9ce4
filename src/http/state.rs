use crate::config::TransportConfig;
use crate::relay::ConnectionHandler;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Connection handler shared by every socket
    pub handler: Arc<ConnectionHandler>,

    /// Client-facing socket limits
    pub transport: TransportConfig,
}

impl AppState {
    pub fn new(handler: Arc<ConnectionHandler>, transport: TransportConfig) -> Self {
        Self { handler, transport }
    }
}
