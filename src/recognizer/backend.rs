use crate::config::RecognitionSettings;
use crate::error::{RelayError, RelayResult};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Asynchronous notification from a running recognition task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// The backend acknowledged the task
    Started { task_id: String },
    /// Intermediate text for the audio streamed so far
    Partial(String),
    /// Conclusive text; the last data event of a task
    Final(Option<String>),
    /// The backend gave up on the task
    Failure {
        status: Option<u32>,
        message: Option<String>,
    },
}

/// Error text used when the backend fails without a status text
pub const DEFAULT_FAILURE_MESSAGE: &str = "recognition failed";

impl TranscriptEvent {
    /// The error carried by a `Failure` event
    pub fn failure(&self) -> Option<RelayError> {
        match self {
            TranscriptEvent::Failure { message, .. } => Some(RelayError::RecognitionFailure(
                message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
            )),
            _ => None,
        }
    }
}

/// Channel the backend uses to deliver events to a session
pub type EventSender = mpsc::UnboundedSender<TranscriptEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TranscriptEvent>;

/// Parameters for a single recognition task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionConfig {
    /// Audio container/codec name as the backend knows it (raw PCM)
    pub format: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Emit partial results while audio is streaming
    pub enable_intermediate_result: bool,
    /// Let the backend segment speech by voice activity
    pub enable_voice_detection: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            format: "pcm".to_string(),
            sample_rate: 16000,
            enable_intermediate_result: true,
            enable_voice_detection: true,
        }
    }
}

impl From<&RecognitionSettings> for RecognitionConfig {
    fn from(settings: &RecognitionSettings) -> Self {
        Self {
            format: settings.format.clone(),
            sample_rate: settings.sample_rate,
            enable_intermediate_result: settings.enable_intermediate_result,
            enable_voice_detection: settings.enable_voice_detection,
        }
    }
}

/// Shared handle to a streaming recognition service
///
/// One instance serves every connection in the process. Implementations:
/// - NLS: Alibaba Cloud real-time speech recognition over WebSocket
/// - Mock: scripted backend used by the tests
#[async_trait::async_trait]
pub trait RecognitionBackend: Send + Sync {
    /// Start a task and wait for the backend to acknowledge it
    ///
    /// Events for the task are delivered on `events` until the task ends.
    async fn start(
        &self,
        config: &RecognitionConfig,
        events: EventSender,
    ) -> RelayResult<Box<dyn RecognitionTask>>;

    /// Release the handle at process teardown
    async fn shutdown(&self);

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// A running recognition task
#[async_trait::async_trait]
pub trait RecognitionTask: Send + Sync {
    /// Forward one raw audio chunk
    ///
    /// Must not wait on the network; implementations queue the chunk.
    async fn send(&mut self, audio: &[u8]) -> RelayResult<()>;

    /// Ask the backend to finish the task and release it
    async fn stop(&mut self) -> RelayResult<()>;

    fn task_id(&self) -> &str;
}

/// Creates the shared backend handle on first use
#[async_trait::async_trait]
pub trait BackendConnector: Send + Sync {
    /// Acquire credentials and open the backend handle
    ///
    /// Failures are reported as `RelayError::BackendUnavailable`.
    async fn connect(&self) -> RelayResult<Arc<dyn RecognitionBackend>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_event_is_recognition_failure() {
        let event = TranscriptEvent::Failure {
            status: Some(40000001),
            message: Some("Gateway:ACCESS_DENIED".to_string()),
        };

        let err = event.failure().unwrap();
        assert!(matches!(err, RelayError::RecognitionFailure(_)));
        assert_eq!(err.detail(), "Gateway:ACCESS_DENIED");
        assert_eq!(err.to_string(), "recognition failed: Gateway:ACCESS_DENIED");
    }

    #[test]
    fn test_failure_without_text_uses_default_message() {
        let event = TranscriptEvent::Failure {
            status: None,
            message: Some(String::new()),
        };

        assert_eq!(event.failure().unwrap().detail(), DEFAULT_FAILURE_MESSAGE);
        assert!(TranscriptEvent::Partial("hi".to_string()).failure().is_none());
    }
}
