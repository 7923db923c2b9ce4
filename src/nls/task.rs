use super::messages::{
    new_id, NlsRequest, NlsResponse, RECOGNITION_COMPLETED, RECOGNITION_STARTED, TASK_FAILED,
};
use crate::error::{RelayError, RelayResult};
use crate::recognizer::{EventSender, RecognitionConfig, RecognitionTask, TranscriptEvent};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for the connection task after the socket is released
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Failure text when the gateway goes away mid-task
pub const CONNECTION_LOST: &str = "NLS connection closed before the task completed";

/// Parameters needed to open one NLS recognition task
pub(crate) struct TaskParams<'a> {
    pub gateway_url: &'a str,
    pub token: &'a str,
    pub app_key: &'a str,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
}

/// One SpeechRecognizer task on its own gateway WebSocket
///
/// A connection task owns the socket. Audio and commands reach it through an
/// unbounded queue, so `send` never waits on the network.
pub struct NlsTask {
    task_id: String,
    app_key: String,
    outgoing: Option<mpsc::UnboundedSender<Message>>,
    completed_rx: Option<oneshot::Receiver<()>>,
    stop_timeout: Duration,
    connection_handle: Option<JoinHandle<()>>,
}

impl NlsTask {
    /// Connect, send StartRecognition and wait for RecognitionStarted
    pub(crate) async fn start(
        params: TaskParams<'_>,
        config: &RecognitionConfig,
        events: EventSender,
    ) -> RelayResult<Self> {
        let task_id = new_id();

        let mut request = params
            .gateway_url
            .into_client_request()
            .map_err(|e| RelayError::StartFailed(format!("invalid gateway URL: {}", e)))?;
        let token = HeaderValue::from_str(params.token)
            .map_err(|e| RelayError::StartFailed(format!("invalid token: {}", e)))?;
        request.headers_mut().insert("X-NLS-Token", token);

        info!("Connecting to NLS gateway {} (task={})", params.gateway_url, task_id);

        let (ws_stream, _) = timeout(params.start_timeout, connect_async(request))
            .await
            .map_err(|_| RelayError::StartFailed("timed out connecting to NLS gateway".to_string()))?
            .map_err(|e| RelayError::StartFailed(format!("failed to connect to NLS gateway: {}", e)))?;

        let (mut sink, stream) = ws_stream.split();

        let start = serde_json::to_string(&NlsRequest::start(&task_id, params.app_key, config))
            .map_err(|e| RelayError::Protocol(e.to_string()))?;
        sink.send(Message::Text(start))
            .await
            .map_err(|e| RelayError::StartFailed(format!("failed to send StartRecognition: {}", e)))?;

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (started_tx, started_rx) = oneshot::channel();
        let (completed_tx, completed_rx) = oneshot::channel();

        let connection_handle = tokio::spawn(run_connection(
            task_id.clone(),
            sink,
            stream,
            outgoing_rx,
            events,
            started_tx,
            completed_tx,
        ));

        let started = match timeout(params.start_timeout, started_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RelayError::StartFailed(
                "connection closed before recognition started".to_string(),
            )),
            Err(_) => Err(RelayError::StartFailed(
                "timed out waiting for RecognitionStarted".to_string(),
            )),
        };

        if let Err(e) = started {
            connection_handle.abort();
            return Err(e);
        }

        Ok(Self {
            task_id,
            app_key: params.app_key.to_string(),
            outgoing: Some(outgoing_tx),
            completed_rx: Some(completed_rx),
            stop_timeout: params.stop_timeout,
            connection_handle: Some(connection_handle),
        })
    }

    async fn release_connection(&mut self) {
        if let Some(mut handle) = self.connection_handle.take() {
            if timeout(CLOSE_TIMEOUT, &mut handle).await.is_err() {
                warn!("NLS connection for task {} did not close, aborting", self.task_id);
                handle.abort();
            }
        }
    }
}

#[async_trait::async_trait]
impl RecognitionTask for NlsTask {
    async fn send(&mut self, audio: &[u8]) -> RelayResult<()> {
        let outgoing = self
            .outgoing
            .as_ref()
            .ok_or_else(|| RelayError::SendDropped("task already stopped".to_string()))?;

        outgoing
            .send(Message::Binary(audio.to_vec()))
            .map_err(|_| RelayError::SendDropped("NLS connection closed".to_string()))
    }

    async fn stop(&mut self) -> RelayResult<()> {
        let Some(outgoing) = self.outgoing.take() else {
            return Ok(());
        };

        if outgoing.is_closed() {
            debug!("NLS connection for task {} already ended", self.task_id);
            self.release_connection().await;
            return Ok(());
        }

        let stop = serde_json::to_string(&NlsRequest::stop(&self.task_id, &self.app_key))
            .map_err(|e| RelayError::Protocol(e.to_string()))?;

        let mut result = Ok(());

        if outgoing.send(Message::Text(stop)).is_err() {
            result = Err(RelayError::StopFailed("NLS connection closed".to_string()));
        } else if let Some(completed) = self.completed_rx.take() {
            if timeout(self.stop_timeout, completed).await.is_err() {
                result = Err(RelayError::StopFailed(
                    "timed out waiting for RecognitionCompleted".to_string(),
                ));
            }
        }

        // Dropping the queue ends the connection task, which closes the socket
        drop(outgoing);
        self.release_connection().await;

        result
    }

    fn task_id(&self) -> &str {
        &self.task_id
    }
}

/// Pump commands out and gateway events in until the task ends
async fn run_connection(
    task_id: String,
    mut sink: SplitSink<WsStream, Message>,
    mut stream: SplitStream<WsStream>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    events: EventSender,
    started_tx: oneshot::Sender<RelayResult<()>>,
    completed_tx: oneshot::Sender<()>,
) {
    let mut started_tx = Some(started_tx);
    let mut completed_tx = Some(completed_tx);
    // A terminal event (or start failure) has been reported
    let mut finished = false;
    // The task owner dropped the queue
    let mut released = false;

    debug!("NLS connection task started (task={})", task_id);

    loop {
        tokio::select! {
            message = outgoing.recv() => {
                let Some(message) = message else {
                    released = true;
                    break;
                };
                if let Err(e) = sink.send(message).await {
                    warn!("Failed to write to NLS gateway (task={}): {}", task_id, e);
                    break;
                }
            }

            incoming = stream.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => {
                        info!("NLS gateway closed task {}: {:?}", task_id, frame);
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        error!("NLS connection error (task={}): {}", task_id, e);
                        break;
                    }
                    None => break,
                };

                let response = match serde_json::from_str::<NlsResponse>(&text) {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("Failed to parse NLS message (task={}): {}", task_id, e);
                        continue;
                    }
                };

                debug!(
                    "NLS event {} (task={}, status={:?})",
                    response.header.name, task_id, response.header.status
                );

                match response.header.name.as_str() {
                    TASK_FAILED if started_tx.is_some() => {
                        let reason = response
                            .header
                            .status_text
                            .clone()
                            .unwrap_or_else(|| "TaskFailed".to_string());
                        if let Some(tx) = started_tx.take() {
                            let _ = tx.send(Err(RelayError::StartFailed(reason)));
                        }
                        finished = true;
                        break;
                    }
                    RECOGNITION_STARTED => {
                        forward(&events, &response);
                        if let Some(tx) = started_tx.take() {
                            let _ = tx.send(Ok(()));
                        }
                    }
                    RECOGNITION_COMPLETED | TASK_FAILED => {
                        forward(&events, &response);
                        finished = true;
                        if let Some(tx) = completed_tx.take() {
                            let _ = tx.send(());
                        }
                        break;
                    }
                    _ => forward(&events, &response),
                }
            }
        }
    }

    if let Err(e) = sink.close().await {
        debug!("Error closing NLS socket (task={}): {}", task_id, e);
    }

    if started_tx.is_none() && !finished && !released {
        warn!("NLS connection for task {} lost mid-task", task_id);
        let _ = events.send(TranscriptEvent::Failure {
            status: None,
            message: Some(CONNECTION_LOST.to_string()),
        });
    }

    debug!("NLS connection task stopped (task={})", task_id);
}

fn forward(events: &EventSender, response: &NlsResponse) {
    if let Some(event) = response.to_event() {
        // The session may already be gone
        let _ = events.send(event);
    }
}

