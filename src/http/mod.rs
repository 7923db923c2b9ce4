//! HTTP API server
//!
//! This module serves the client-facing endpoints:
//! - GET /ws/asr - WebSocket: PCM audio in, transcript JSON out
//! - GET /sessions - Statistics of live recognition sessions
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;
mod ws;

pub use routes::create_router;
pub use state::AppState;
