// Shared test doubles for the recognition backend
//
// MockBackend records every call so tests can assert on call counts, and
// lets the test inject backend events as if the recognizer produced them.

#![allow(dead_code)]

use asr_relay::recognizer::{
    BackendConnector, EventSender, RecognitionBackend, RecognitionConfig, RecognitionTask,
    TranscriptEvent,
};
use asr_relay::{OutboundMessage, RelayError, RelayResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Default)]
pub struct MockBackend {
    starts: AtomicUsize,
    sends: Arc<AtomicUsize>,
    bytes: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    shutdowns: AtomicUsize,
    fail_start: Option<String>,
    start_delay: Option<Duration>,
    stop_delay: Option<Duration>,
    last_config: Mutex<Option<RecognitionConfig>>,
    events: Arc<Mutex<Option<EventSender>>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Backend whose `start` always fails with `StartFailed(message)`
    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            fail_start: Some(message.to_string()),
            ..Self::default()
        })
    }

    /// Backend that takes `delay` to acknowledge a start
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            start_delay: Some(delay),
            ..Self::default()
        })
    }

    /// Backend whose tasks take `delay` to finish a stop
    pub fn slow_stop(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            stop_delay: Some(delay),
            ..Self::default()
        })
    }

    /// Deliver an event on the current task's channel
    pub fn emit(&self, event: TranscriptEvent) -> bool {
        match self.events.lock().unwrap().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn bytes_sent(&self) -> usize {
        self.bytes.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn last_config(&self) -> Option<RecognitionConfig> {
        self.last_config.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RecognitionBackend for MockBackend {
    async fn start(
        &self,
        config: &RecognitionConfig,
        events: EventSender,
    ) -> RelayResult<Box<dyn RecognitionTask>> {
        let n = self.starts.fetch_add(1, Ordering::SeqCst);
        *self.last_config.lock().unwrap() = Some(config.clone());

        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = &self.fail_start {
            return Err(RelayError::StartFailed(message.clone()));
        }

        let task_id = format!("mock-task-{}", n);
        let _ = events.send(TranscriptEvent::Started {
            task_id: task_id.clone(),
        });
        *self.events.lock().unwrap() = Some(events);

        Ok(Box::new(MockTask {
            task_id,
            sends: Arc::clone(&self.sends),
            bytes: Arc::clone(&self.bytes),
            stops: Arc::clone(&self.stops),
            stop_delay: self.stop_delay,
            events: Arc::clone(&self.events),
        }))
    }

    async fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct MockTask {
    task_id: String,
    sends: Arc<AtomicUsize>,
    bytes: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    stop_delay: Option<Duration>,
    events: Arc<Mutex<Option<EventSender>>>,
}

#[async_trait::async_trait]
impl RecognitionTask for MockTask {
    async fn send(&mut self, audio: &[u8]) -> RelayResult<()> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.bytes.fetch_add(audio.len(), Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) -> RelayResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.stop_delay {
            tokio::time::sleep(delay).await;
        }
        // Task over: release the event channel like a real backend would
        self.events.lock().unwrap().take();
        Ok(())
    }

    fn task_id(&self) -> &str {
        &self.task_id
    }
}

/// Connector handing out one shared MockBackend
pub struct MockConnector {
    backend: Arc<MockBackend>,
    connects: AtomicUsize,
    fail_with: Option<String>,
    delay: Option<Duration>,
}

impl MockConnector {
    pub fn new(backend: Arc<MockBackend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            connects: AtomicUsize::new(0),
            fail_with: None,
            delay: None,
        })
    }

    /// Connector that fails every connect with `BackendUnavailable(message)`
    pub fn unavailable(message: &str) -> Arc<Self> {
        Arc::new(Self {
            backend: MockBackend::new(),
            connects: AtomicUsize::new(0),
            fail_with: Some(message.to_string()),
            delay: None,
        })
    }

    /// Connector that takes `delay` to connect
    pub fn slow(backend: Arc<MockBackend>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            backend,
            connects: AtomicUsize::new(0),
            fail_with: None,
            delay: Some(delay),
        })
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn backend(&self) -> Arc<MockBackend> {
        Arc::clone(&self.backend)
    }
}

#[async_trait::async_trait]
impl BackendConnector for MockConnector {
    async fn connect(&self) -> RelayResult<Arc<dyn RecognitionBackend>> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = &self.fail_with {
            return Err(RelayError::BackendUnavailable(message.clone()));
        }

        Ok(self.backend.clone() as Arc<dyn RecognitionBackend>)
    }
}

/// Receive the next client message or fail the test
pub async fn recv_message(rx: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> OutboundMessage {
    tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for client message")
        .expect("client channel closed")
}

/// Poll `condition` until it holds or the timeout expires
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
