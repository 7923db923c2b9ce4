use super::state::SessionState;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Statistics about a recognition session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Owning client connection
    pub connection_id: String,

    /// Backend task id, once started
    pub task_id: Option<String>,

    /// Current lifecycle state
    pub state: SessionState,

    /// When the session was created
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Audio chunks handed to the backend
    pub chunks_forwarded: usize,

    /// Audio bytes handed to the backend
    pub bytes_forwarded: usize,

    /// Chunks ignored (wrong state) or lost on the way to the backend
    pub chunks_dropped: usize,

    pub partial_results: usize,
    pub final_results: usize,
    pub failures: usize,
}
