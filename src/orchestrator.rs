//! Host-facing surface of the engine.
//!
//! [`EngineBuilder`] wires the components together and spawns the conversation actor;
//! [`EngineHandle`] sends it commands and exposes read-only state. Control calls never
//! fail because of what happens in the session: problems are published as
//! [`ErrorReport`](crate::ErrorReport)s on the snapshot and the event stream.

mod engine;
mod state;

pub use state::{ConversationState, EngineEvent, SessionSnapshot, Transcript};

use crate::capture::{AudioSource, Capture};
use crate::config::Config;
use crate::error::VoiceError;
use crate::playback::{AudioSink, PlaybackQueue, Synthesizer};
use crate::reasoning::{HttpReasoner, Reasoner};
use crate::transport::{Connector, Stats, TransportSession, WsConnector};
use engine::{Channels, Command, Engine};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

const CAPTURE_CAPACITY: usize = 256;
const EVENT_CAPACITY: usize = 256;

pub struct EngineBuilder {
    config: Config,
    source: Option<Box<dyn AudioSource>>,
    sink: Option<Arc<dyn AudioSink>>,
    connector: Option<Arc<dyn Connector>>,
    reasoner: Option<Arc<dyn Reasoner>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
}

impl EngineBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            source: None,
            sink: None,
            connector: None,
            reasoner: None,
            synthesizer: None,
        }
    }

    pub fn with_source(mut self, source: impl AudioSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_sink(mut self, sink: impl AudioSink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Defaults to a [`WsConnector`] for the configured backend URL.
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Defaults to an [`HttpReasoner`] for the configured endpoint.
    pub fn with_reasoner(mut self, reasoner: impl Reasoner + 'static) -> Self {
        self.reasoner = Some(Arc::new(reasoner));
        self
    }

    /// Defaults to synthesis over the backend channel.
    pub fn with_synthesizer(mut self, synthesizer: impl Synthesizer + 'static) -> Self {
        self.synthesizer = Some(Arc::new(synthesizer));
        self
    }

    /// Spawns the engine on the current tokio runtime.
    pub fn spawn(self) -> Result<EngineHandle, VoiceError> {
        let source = self.source.ok_or(VoiceError::MissingComponent("audio source"))?;
        let sink = self.sink.ok_or(VoiceError::MissingComponent("audio sink"))?;
        let connector = match self.connector {
            Some(connector) => connector,
            None => Arc::new(WsConnector::new(&self.config.transport)),
        };
        let reasoner = match self.reasoner {
            Some(reasoner) => reasoner,
            None => Arc::new(
                HttpReasoner::new(&self.config.reasoning)
                    .map_err(|e| VoiceError::ReasoningFailed(format!("{:#}", e)))?,
            ),
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (capture_tx, capture_rx) = mpsc::channel(CAPTURE_CAPACITY);
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (playback_tx, playback_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let capture = Capture::new(source, self.config.vad.clone(), capture_tx);
        let transport =
            TransportSession::new(connector, self.config.transport.clone(), transport_tx);
        let synthesizer = match self.synthesizer {
            Some(synthesizer) => synthesizer,
            None => Arc::new(transport.clone()),
        };
        let playback = PlaybackQueue::new(
            synthesizer,
            sink,
            self.config.playback.clone(),
            playback_tx,
        );

        let engine = Engine::new(
            self.config,
            capture,
            transport.clone(),
            playback,
            reasoner,
            snapshot_tx,
            events_tx.clone(),
        );
        tokio::spawn(engine.run(Channels {
            commands: command_rx,
            capture: capture_rx,
            transport: transport_rx,
            playback: playback_rx,
        }));
        tracing::info!("Engine started");

        Ok(EngineHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
            events: events_tx,
            transport,
        })
    }
}

/// Cloneable control surface. Every method returns immediately; the only error is
/// [`VoiceError::EngineClosed`] once the engine has shut down.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    events: broadcast::Sender<EngineEvent>,
    transport: TransportSession,
}

impl EngineHandle {
    fn send(&self, command: Command) -> Result<(), VoiceError> {
        self.commands
            .send(command)
            .map_err(|_| VoiceError::EngineClosed)
    }

    /// Acquires the microphone, connects the backend and starts listening.
    pub fn start_session(&self) -> Result<(), VoiceError> {
        self.send(Command::StartSession)
    }

    /// Releases the microphone, stops speech and disconnects.
    pub fn end_session(&self) -> Result<(), VoiceError> {
        self.send(Command::EndSession)
    }

    /// Speaks `text` without a user turn. Honoured only while listening.
    pub fn speak(&self, text: &str) -> Result<(), VoiceError> {
        self.send(Command::Speak(text.to_string()))
    }

    /// Manual barge-in. Honoured only while speaking.
    pub fn interrupt(&self) -> Result<(), VoiceError> {
        self.send(Command::Interrupt)
    }

    /// Ends any session and stops the engine task.
    pub fn shutdown(&self) -> Result<(), VoiceError> {
        self.send(Command::Shutdown)
    }

    pub fn state(&self) -> ConversationState {
        self.snapshot.borrow().state
    }

    pub fn volume_level(&self) -> f32 {
        self.snapshot.borrow().volume_level
    }

    pub fn transcript(&self) -> Transcript {
        self.snapshot.borrow().transcript.clone()
    }

    pub fn is_speaking(&self) -> bool {
        self.snapshot.borrow().is_speaking
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn transport_stats(&self) -> Stats {
        self.transport.stats()
    }
}
