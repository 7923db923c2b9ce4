use crate::recognizer::{RecognitionConfig, TranscriptEvent};
use serde::{Deserialize, Serialize};

pub const NAMESPACE: &str = "SpeechRecognizer";

pub const START_RECOGNITION: &str = "StartRecognition";
pub const STOP_RECOGNITION: &str = "StopRecognition";

pub const RECOGNITION_STARTED: &str = "RecognitionStarted";
pub const RESULT_CHANGED: &str = "RecognitionResultChanged";
pub const RECOGNITION_COMPLETED: &str = "RecognitionCompleted";
pub const TASK_FAILED: &str = "TaskFailed";

/// Command sent to the NLS gateway
#[derive(Debug, Serialize, Deserialize)]
pub struct NlsRequest {
    pub header: RequestHeader,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<StartPayload>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RequestHeader {
    pub message_id: String,
    pub task_id: String,
    pub namespace: String,
    pub name: String,
    pub appkey: String,
}

/// Parameters of StartRecognition
#[derive(Debug, Serialize, Deserialize)]
pub struct StartPayload {
    pub format: String,
    pub sample_rate: u32,
    pub enable_intermediate_result: bool,
    pub enable_voice_detection: bool,
}

/// Event received from the NLS gateway
#[derive(Debug, Deserialize)]
pub struct NlsResponse {
    pub header: ResponseHeader,
    #[serde(default)]
    pub payload: Option<ResultPayload>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseHeader {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub status: Option<u32>,
    #[serde(default)]
    pub status_text: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultPayload {
    /// Recognized text so far (or final text)
    #[serde(default)]
    pub result: Option<String>,
    /// Sentence index
    #[serde(default)]
    pub index: Option<u32>,
    /// Audio time processed, in milliseconds
    #[serde(default)]
    pub time: Option<u64>,
}

/// 32-char hex id used for task and message ids
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl NlsRequest {
    pub fn start(task_id: &str, app_key: &str, config: &RecognitionConfig) -> Self {
        Self {
            header: RequestHeader::new(task_id, app_key, START_RECOGNITION),
            payload: Some(StartPayload {
                format: config.format.clone(),
                sample_rate: config.sample_rate,
                enable_intermediate_result: config.enable_intermediate_result,
                enable_voice_detection: config.enable_voice_detection,
            }),
        }
    }

    pub fn stop(task_id: &str, app_key: &str) -> Self {
        Self {
            header: RequestHeader::new(task_id, app_key, STOP_RECOGNITION),
            payload: None,
        }
    }
}

impl RequestHeader {
    fn new(task_id: &str, app_key: &str, name: &str) -> Self {
        Self {
            message_id: new_id(),
            task_id: task_id.to_string(),
            namespace: NAMESPACE.to_string(),
            name: name.to_string(),
            appkey: app_key.to_string(),
        }
    }
}

impl NlsResponse {
    /// Recognized text carried by the payload, if any
    pub fn result_text(&self) -> Option<String> {
        self.payload.as_ref().and_then(|p| p.result.clone())
    }

    /// Map a gateway event onto the backend-neutral event type
    ///
    /// Returns `None` for events the relay does not care about.
    pub fn to_event(&self) -> Option<TranscriptEvent> {
        match self.header.name.as_str() {
            RECOGNITION_STARTED => Some(TranscriptEvent::Started {
                task_id: self.header.task_id.clone().unwrap_or_default(),
            }),
            RESULT_CHANGED => Some(TranscriptEvent::Partial(
                self.result_text().unwrap_or_default(),
            )),
            RECOGNITION_COMPLETED => Some(TranscriptEvent::Final(self.result_text())),
            TASK_FAILED => Some(TranscriptEvent::Failure {
                status: self.header.status,
                message: self.header.status_text.clone(),
            }),
            _ => None,
        }
    }
}
