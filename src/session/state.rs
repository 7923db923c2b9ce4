use serde::Serialize;
use std::fmt;

/// Lifecycle of a recognition session
///
/// `Idle → Starting → Active → Stopping → Stopped`, with `Stopped` terminal.
/// A failed start goes straight to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
    Stopped,
}

impl SessionState {
    /// Audio may be forwarded only once the task is running
    pub fn accepts_audio(self) -> bool {
        matches!(self, SessionState::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Active => "active",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
