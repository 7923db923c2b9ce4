//! Recognition session management
//!
//! This module provides the `RecognitionSession` abstraction that manages:
//! - The lifecycle of one backend recognition task per client connection
//! - Forwarding of raw PCM chunks to the backend
//! - Translation of backend events into client JSON messages
//! - Session statistics

mod channel;
mod message;
mod session;
mod state;
mod stats;

pub use channel::ClientChannel;
pub use message::{OutboundMessage, ResultKind, DEFAULT_FAILURE_MESSAGE};
pub use session::RecognitionSession;
pub use state::SessionState;
pub use stats::SessionStats;
