pub mod config;
pub mod error;
pub mod http;
pub mod nls;
pub mod recognizer;
pub mod relay;
pub mod session;

pub use config::Config;
pub use error::{RelayError, RelayResult};
pub use http::{create_router, AppState};
pub use nls::{NlsClient, NlsConnector};
pub use recognizer::{
    BackendConnector, RecognitionBackend, RecognitionConfig, RecognitionTask, RecognizerHolder,
    TranscriptEvent,
};
pub use relay::ConnectionHandler;
pub use session::{ClientChannel, OutboundMessage, RecognitionSession, SessionState, SessionStats};
