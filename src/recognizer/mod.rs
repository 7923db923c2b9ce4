//! Recognition backend contract
//!
//! The relay treats the speech recognizer as an opaque streaming capability:
//! start a task, push audio, stop it, and receive events on a channel. The
//! shared handle to it lives in `RecognizerHolder`.

mod backend;
mod holder;

pub use backend::{
    BackendConnector, EventReceiver, EventSender, RecognitionBackend, RecognitionConfig,
    RecognitionTask, TranscriptEvent, DEFAULT_FAILURE_MESSAGE,
};
pub use holder::RecognizerHolder;
