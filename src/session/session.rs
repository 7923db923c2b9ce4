use super::channel::ClientChannel;
use super::message::OutboundMessage;
use super::state::SessionState;
use super::stats::SessionStats;
use crate::error::{RelayError, RelayResult};
use crate::recognizer::{
    EventReceiver, RecognitionBackend, RecognitionConfig, RecognitionTask, TranscriptEvent,
};
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long `stop()` waits for trailing backend events to reach the client
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// One recognition task bound to one client connection
///
/// Inbound audio is forwarded with `send`, backend events are turned into
/// client messages by a pump task. State transitions and the task handle are
/// guarded by one lock, so `stop()` is safe against in-flight `send()` calls
/// and pending event deliveries.
pub struct RecognitionSession {
    /// Client write half
    channel: ClientChannel,

    /// Shared backend handle
    backend: Arc<dyn RecognitionBackend>,

    /// Audio format and feature flags for the task
    config: RecognitionConfig,

    /// When the session was created
    started_at: chrono::DateTime<chrono::Utc>,

    /// Lifecycle state and the running task
    inner: Mutex<SessionInner>,

    /// Held for the whole of a stop, so a second caller waits for the first
    stop_lock: Mutex<()>,

    /// Counters shared with the event pump
    counters: Arc<SessionCounters>,

    /// Handle for the backend event pump
    event_task_handle: Mutex<Option<JoinHandle<()>>>,
}

struct SessionInner {
    state: SessionState,
    task: Option<Box<dyn RecognitionTask>>,
    task_id: Option<String>,
}

#[derive(Default)]
struct SessionCounters {
    chunks_forwarded: AtomicUsize,
    bytes_forwarded: AtomicUsize,
    chunks_dropped: AtomicUsize,
    partial_results: AtomicUsize,
    final_results: AtomicUsize,
    failures: AtomicUsize,
}

impl RecognitionSession {
    /// Create an idle session for a connection
    pub fn new(
        channel: ClientChannel,
        backend: Arc<dyn RecognitionBackend>,
        config: RecognitionConfig,
    ) -> Arc<Self> {
        info!(
            "Creating recognition session for connection {} ({})",
            channel.connection_id(),
            backend.name()
        );

        Arc::new(Self {
            channel,
            backend,
            config,
            started_at: Utc::now(),
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                task: None,
                task_id: None,
            }),
            stop_lock: Mutex::new(()),
            counters: Arc::new(SessionCounters::default()),
            event_task_handle: Mutex::new(None),
        })
    }

    pub fn connection_id(&self) -> &str {
        self.channel.connection_id()
    }

    /// Start the recognition task and wait for the backend to acknowledge it
    ///
    /// Calling this on a session that already left `Idle` does nothing.
    pub async fn start(self: &Arc<Self>) -> RelayResult<()> {
        {
            let mut inner = self.inner.lock().await;
            if inner.state != SessionState::Idle {
                warn!(
                    "Recognition already started for connection {} (state={})",
                    self.connection_id(),
                    inner.state
                );
                return Ok(());
            }
            inner.state = SessionState::Starting;
        }

        info!(
            "Starting recognition for connection {} (format={}, sample_rate={}, intermediate={}, vad={})",
            self.connection_id(),
            self.config.format,
            self.config.sample_rate,
            self.config.enable_intermediate_result,
            self.config.enable_voice_detection
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.spawn_event_pump(events_rx).await;

        let result = self.backend.start(&self.config, events_tx).await;

        let mut inner = self.inner.lock().await;
        match result {
            Ok(mut task) => {
                if inner.state != SessionState::Starting {
                    // stop() ran while we were waiting for the acknowledgement
                    drop(inner);
                    info!(
                        "Connection {} stopped during start, releasing task {}",
                        self.connection_id(),
                        task.task_id()
                    );
                    if let Err(e) = task.stop().await {
                        warn!("Failed to stop task {}: {}", task.task_id(), e);
                    }
                    return Ok(());
                }

                info!(
                    "Recognition active for connection {} (task={})",
                    self.connection_id(),
                    task.task_id()
                );
                inner.task_id = Some(task.task_id().to_string());
                inner.task = Some(task);
                inner.state = SessionState::Active;
                Ok(())
            }
            Err(e) => {
                error!(
                    "Failed to start recognition for connection {}: {}",
                    self.connection_id(),
                    e
                );
                inner.state = SessionState::Stopped;
                Err(match e {
                    RelayError::StartFailed(msg) => RelayError::StartFailed(msg),
                    other => RelayError::StartFailed(other.to_string()),
                })
            }
        }
    }

    /// Forward one audio chunk to the backend
    ///
    /// Ignored unless the task is active. A failed write drops the chunk but
    /// keeps the session alive.
    pub async fn send(&self, audio: &[u8]) {
        let mut inner = self.inner.lock().await;

        if !inner.state.accepts_audio() {
            debug!(
                "Ignoring {} audio bytes for connection {} (state={})",
                audio.len(),
                self.connection_id(),
                inner.state
            );
            self.counters.chunks_dropped.fetch_add(1, Ordering::SeqCst);
            return;
        }

        let Some(task) = inner.task.as_mut() else {
            self.counters.chunks_dropped.fetch_add(1, Ordering::SeqCst);
            return;
        };

        match task.send(audio).await {
            Ok(()) => {
                self.counters.chunks_forwarded.fetch_add(1, Ordering::SeqCst);
                self.counters
                    .bytes_forwarded
                    .fetch_add(audio.len(), Ordering::SeqCst);
            }
            Err(e) => {
                warn!(
                    "Failed to forward audio for connection {}: {}",
                    self.connection_id(),
                    e
                );
                self.counters.chunks_dropped.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Stop the recognition task
    ///
    /// Idempotent. Backend errors are logged; the session always ends in
    /// `Stopped`. Returns after trailing events (the final result) have been
    /// handed to the client channel, or after a short drain timeout.
    pub async fn stop(&self) {
        self.stop_task().await;
        self.drain_events().await;
    }

    /// Stop the backend task and leave the session `Stopped`
    ///
    /// A caller that arrives while another stop is running waits for it.
    async fn stop_task(&self) {
        let _stopping = self.stop_lock.lock().await;

        let task = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                SessionState::Idle | SessionState::Starting => {
                    inner.state = SessionState::Stopped;
                    None
                }
                SessionState::Active => {
                    inner.state = SessionState::Stopping;
                    inner.task.take()
                }
                SessionState::Stopping | SessionState::Stopped => {
                    debug!(
                        "Recognition already stopped for connection {}",
                        self.connection_id()
                    );
                    return;
                }
            }
        };

        if let Some(mut task) = task {
            info!(
                "Stopping recognition task {} for connection {}",
                task.task_id(),
                self.connection_id()
            );
            if let Err(e) = task.stop().await {
                warn!("Failed to stop task {}: {}", task.task_id(), e);
            }
        }

        self.inner.lock().await.state = SessionState::Stopped;
        info!("Recognition stopped for connection {}", self.connection_id());
    }

    /// Wait for the event pump to forward what the backend already delivered
    async fn drain_events(&self) {
        let handle = self.event_task_handle.lock().await.take();

        if let Some(mut handle) = handle {
            match tokio::time::timeout(EVENT_DRAIN_TIMEOUT, &mut handle).await {
                Ok(Err(e)) => error!("Event pump panicked: {}", e),
                Ok(Ok(())) => {}
                Err(_) => {
                    warn!(
                        "Event pump for connection {} did not finish, aborting",
                        self.connection_id()
                    );
                    handle.abort();
                }
            }
        }
    }

    /// Current lifecycle state
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Get current session statistics
    pub async fn get_stats(&self) -> SessionStats {
        let (state, task_id) = {
            let inner = self.inner.lock().await;
            (inner.state, inner.task_id.clone())
        };
        let duration = Utc::now().signed_duration_since(self.started_at);
        let counters = &self.counters;

        SessionStats {
            connection_id: self.connection_id().to_string(),
            task_id,
            state,
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            chunks_forwarded: counters.chunks_forwarded.load(Ordering::SeqCst),
            bytes_forwarded: counters.bytes_forwarded.load(Ordering::SeqCst),
            chunks_dropped: counters.chunks_dropped.load(Ordering::SeqCst),
            partial_results: counters.partial_results.load(Ordering::SeqCst),
            final_results: counters.final_results.load(Ordering::SeqCst),
            failures: counters.failures.load(Ordering::SeqCst),
        }
    }

    /// Spawn the task that turns backend events into client messages
    ///
    /// Runs until the backend drops its event sender.
    async fn spawn_event_pump(self: &Arc<Self>, mut events_rx: EventReceiver) {
        let session: Weak<Self> = Arc::downgrade(self);
        let channel = self.channel.clone();
        let counters = Arc::clone(&self.counters);

        let pump = tokio::spawn(async move {
            debug!("Event pump started for connection {}", channel.connection_id());

            while let Some(event) = events_rx.recv().await {
                match &event {
                    TranscriptEvent::Started { task_id } => {
                        info!(
                            "Recognition started for connection {} (task={})",
                            channel.connection_id(),
                            task_id
                        );
                    }
                    TranscriptEvent::Partial(text) => {
                        debug!("Partial result for {}: {}", channel.connection_id(), text);
                        counters.partial_results.fetch_add(1, Ordering::SeqCst);
                    }
                    TranscriptEvent::Final(text) => {
                        info!(
                            "Final result for {}: {}",
                            channel.connection_id(),
                            text.as_deref().unwrap_or_default()
                        );
                        counters.final_results.fetch_add(1, Ordering::SeqCst);
                    }
                    TranscriptEvent::Failure { status, .. } => {
                        if let Some(failure) = event.failure() {
                            warn!(
                                "Task for {} ended with status {:?}: {}",
                                channel.connection_id(),
                                status,
                                failure
                            );
                        }
                        counters.failures.fetch_add(1, Ordering::SeqCst);
                    }
                }

                if let Some(message) = OutboundMessage::from_event(&event) {
                    channel.send(message);
                }

                if matches!(event, TranscriptEvent::Failure { .. }) {
                    if let Some(session) = session.upgrade() {
                        session.stop_task().await;
                    }
                }
            }

            debug!("Event pump finished for connection {}", channel.connection_id());
        });

        *self.event_task_handle.lock().await = Some(pump);
    }
}
