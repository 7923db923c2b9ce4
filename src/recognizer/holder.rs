use super::backend::{BackendConnector, RecognitionBackend};
use crate::error::RelayResult;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Process-wide holder for the shared recognition backend
///
/// The backend is created lazily by the first connection that needs it and
/// reused by every later one. Construct once at startup and pass it to the
/// connection handler.
pub struct RecognizerHolder {
    connector: Arc<dyn BackendConnector>,
    client: Mutex<Option<Arc<dyn RecognitionBackend>>>,
}

impl RecognizerHolder {
    pub fn new(connector: Arc<dyn BackendConnector>) -> Self {
        Self {
            connector,
            client: Mutex::new(None),
        }
    }

    /// Get the shared backend, connecting on first call
    ///
    /// Concurrent first calls serialize on the lock, so exactly one handle is
    /// created. A failed connect leaves the holder empty and the next call
    /// tries again.
    pub async fn get_client(&self) -> RelayResult<Arc<dyn RecognitionBackend>> {
        let mut client = self.client.lock().await;

        if let Some(existing) = client.as_ref() {
            return Ok(Arc::clone(existing));
        }

        info!("Creating shared recognition backend");

        let backend = self.connector.connect().await.map_err(|e| {
            error!("Failed to create recognition backend: {}", e);
            e
        })?;

        info!("Recognition backend ready: {}", backend.name());
        *client = Some(Arc::clone(&backend));

        Ok(backend)
    }

    /// Close the shared backend, if one was created
    pub async fn shutdown(&self) {
        let backend = self.client.lock().await.take();

        if let Some(backend) = backend {
            info!("Shutting down recognition backend: {}", backend.name());
            backend.shutdown().await;
        }
    }

    /// Whether the backend has been created
    pub async fn is_connected(&self) -> bool {
        self.client.lock().await.is_some()
    }
}
