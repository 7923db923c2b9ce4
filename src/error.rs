use thiserror::Error;

/// Errors raised while relaying audio to the recognition backend
///
/// None of these are fatal to the process. They are caught at the session
/// boundary and either logged or turned into a client error message.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// Credential acquisition or connection setup to the backend failed
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The recognition task could not be started
    #[error("start failed: {0}")]
    StartFailed(String),

    /// A single audio chunk could not be forwarded
    #[error("audio chunk dropped: {0}")]
    SendDropped(String),

    /// The backend did not acknowledge a stop request
    #[error("stop failed: {0}")]
    StopFailed(String),

    /// The backend reported a failure mid-task
    #[error("recognition failed: {0}")]
    RecognitionFailure(String),

    /// The backend sent a frame we could not understand
    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type RelayResult<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Message without the variant prefix
    pub fn detail(&self) -> &str {
        match self {
            RelayError::BackendUnavailable(msg)
            | RelayError::StartFailed(msg)
            | RelayError::SendDropped(msg)
            | RelayError::StopFailed(msg)
            | RelayError::RecognitionFailure(msg)
            | RelayError::Protocol(msg) => msg,
        }
    }
}
