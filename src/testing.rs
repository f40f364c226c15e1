//! In-memory stand-ins for devices and the speech backend.

use crate::audio::{AudioClip, AudioFrame};
use crate::capture::AudioSource;
use crate::error::VoiceError;
use crate::playback::{AudioSink, ChunkId, Synthesizer};
use crate::transport::{Connector, Inbound, Link, Outbound};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use voice_duplex_types::{ClientEvent, ServerEvent};

pub const FRAME_SAMPLES: usize = 320;
pub const FRAME_DURATION: Duration = Duration::from_millis(20);

#[derive(Default)]
struct MicState {
    frames: Option<mpsc::Sender<AudioFrame>>,
    failure: Option<VoiceError>,
    opens: usize,
    closes: usize,
}

/// Test-side handle that feeds a [`FakeMicrophone`].
#[derive(Clone, Default)]
pub struct MicControl {
    state: Arc<Mutex<MicState>>,
}

impl MicControl {
    /// Sends `frames` frames of constant `amplitude`, paced at the real frame rate.
    pub async fn speak(&self, amplitude: f32, frames: usize) {
        for _ in 0..frames {
            let sender = self.state.lock().unwrap().frames.clone();
            if let Some(sender) = sender {
                let frame = AudioFrame::new(vec![amplitude; FRAME_SAMPLES], 16_000);
                let _ = sender.send(frame).await;
            }
            tokio::time::sleep(FRAME_DURATION).await;
        }
    }

    pub fn fail_with(&self, error: VoiceError) {
        self.state.lock().unwrap().failure = Some(error);
    }

    /// Ends the frame stream as if the device vanished.
    pub fn unplug(&self) {
        self.state.lock().unwrap().frames = None;
    }

    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().frames.is_some()
    }
}

pub struct FakeMicrophone {
    control: MicControl,
}

impl FakeMicrophone {
    pub fn new(control: MicControl) -> Self {
        Self { control }
    }
}

#[async_trait]
impl AudioSource for FakeMicrophone {
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>, VoiceError> {
        let mut state = self.control.state.lock().unwrap();
        if let Some(error) = state.failure.take() {
            return Err(error);
        }
        let (tx, rx) = mpsc::channel(64);
        state.frames = Some(tx);
        state.opens += 1;
        Ok(rx)
    }

    fn close(&mut self) {
        let mut state = self.control.state.lock().unwrap();
        if state.frames.take().is_some() {
            state.closes += 1;
        }
    }
}

struct ConnectorState {
    capacity: usize,
    refusals: usize,
    opens: usize,
}

/// Hands each opened link's far end to the test through [`FakeConnector::accept`].
#[derive(Clone)]
pub struct FakeConnector {
    state: Arc<Mutex<ConnectorState>>,
    accepted_tx: mpsc::UnboundedSender<ServerEnd>,
    accepted_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<ServerEnd>>>,
}

impl Default for FakeConnector {
    fn default() -> Self {
        Self::with_capacity(64)
    }
}

impl FakeConnector {
    pub fn with_capacity(capacity: usize) -> Self {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(ConnectorState {
                capacity,
                refusals: 0,
                opens: 0,
            })),
            accepted_tx,
            accepted_rx: Arc::new(tokio::sync::Mutex::new(accepted_rx)),
        }
    }

    /// The next `attempts` opens fail.
    pub fn refuse_next(&self, attempts: usize) {
        self.state.lock().unwrap().refusals = attempts;
    }

    /// Open attempts so far, refused ones included.
    pub fn opens(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    pub async fn accept(&self) -> ServerEnd {
        self.accepted_rx
            .lock()
            .await
            .recv()
            .await
            .expect("connector dropped")
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self) -> anyhow::Result<Link> {
        let capacity = {
            let mut state = self.state.lock().unwrap();
            state.opens += 1;
            if state.refusals > 0 {
                state.refusals -= 1;
                anyhow::bail!("connection refused");
            }
            state.capacity
        };
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (in_tx, in_rx) = mpsc::channel(64);
        let _ = self.accepted_tx.send(ServerEnd {
            received: out_rx,
            replies: in_tx,
        });
        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// The backend's side of a fake link. Dropping it looks like a lost connection.
pub struct ServerEnd {
    received: mpsc::Receiver<Outbound>,
    replies: mpsc::Sender<Inbound>,
}

impl ServerEnd {
    pub async fn next(&mut self) -> Option<Outbound> {
        self.received.recv().await
    }

    /// Next control event, skipping audio. `None` once the client closed.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        loop {
            match self.received.recv().await? {
                Outbound::Audio(_) => continue,
                Outbound::Event(event) => return Some(event),
                Outbound::Close => return None,
            }
        }
    }

    pub async fn send(&self, event: ServerEvent) {
        let _ = self.replies.send(Inbound::Event(event)).await;
    }

    pub async fn close(&self, code: Option<u16>, reason: &str) {
        let _ = self
            .replies
            .send(Inbound::Closed {
                code,
                reason: reason.to_string(),
            })
            .await;
    }
}

/// Returns each chunk's text bytes as its "audio".
#[derive(Clone, Default)]
pub struct FakeSynthesizer {
    requests: Arc<Mutex<Vec<String>>>,
    failures: Arc<Vec<String>>,
}

impl FakeSynthesizer {
    pub fn failing_on(texts: &[&str]) -> Self {
        Self {
            requests: Arc::default(),
            failures: Arc::new(texts.iter().map(|t| t.to_string()).collect()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, chunk: &ChunkId, text: &str) -> Result<AudioClip, VoiceError> {
        self.requests.lock().unwrap().push(text.to_string());
        if self.failures.iter().any(|f| f == text) {
            return Err(VoiceError::SynthesisFailed {
                chunk: chunk.to_string(),
                reason: "voice unavailable".to_string(),
            });
        }
        Ok(AudioClip::new(text.as_bytes().to_vec(), 16_000))
    }
}

#[derive(Default)]
struct SinkState {
    played: Vec<String>,
    stops: usize,
    playing: usize,
    max_concurrent: usize,
}

struct Playing(Arc<Mutex<SinkState>>);

impl Drop for Playing {
    fn drop(&mut self) {
        self.0.lock().unwrap().playing -= 1;
    }
}

/// Speaker that "plays" each clip for a fixed duration unless stopped.
#[derive(Clone)]
pub struct FakeSink {
    state: Arc<Mutex<SinkState>>,
    duration: Duration,
    stopped: Arc<Notify>,
}

impl Default for FakeSink {
    fn default() -> Self {
        Self::with_duration(Duration::from_millis(500))
    }
}

impl FakeSink {
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            state: Arc::default(),
            duration,
            stopped: Arc::new(Notify::new()),
        }
    }

    /// Text of every clip that started playing.
    pub fn played(&self) -> Vec<String> {
        self.state.lock().unwrap().played.clone()
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }

    pub fn playing(&self) -> usize {
        self.state.lock().unwrap().playing
    }

    pub fn max_concurrent(&self) -> usize {
        self.state.lock().unwrap().max_concurrent
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn play(&self, clip: AudioClip) -> Result<(), VoiceError> {
        let _playing = {
            let mut state = self.state.lock().unwrap();
            state.played.push(String::from_utf8_lossy(&clip.pcm16).into_owned());
            state.playing += 1;
            state.max_concurrent = state.max_concurrent.max(state.playing);
            Playing(self.state.clone())
        };
        tokio::select! {
            _ = tokio::time::sleep(self.duration) => {}
            _ = self.stopped.notified() => {}
        }
        Ok(())
    }

    fn stop(&self) {
        self.state.lock().unwrap().stops += 1;
        self.stopped.notify_waiters();
    }
}
