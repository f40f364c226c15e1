//! The conversation actor. It alone owns the session state; every other component reports
//! to it through channels and it decides what each report means in the current state.

use crate::barge_in::{BargeInDetector, BargeInTrigger, Verdict};
use crate::capture::{Capture, CaptureEvent};
use crate::config::Config;
use crate::error::VoiceError;
use crate::orchestrator::state::{ConversationState, EngineEvent, SessionSnapshot};
use crate::playback::{PlaybackEvent, PlaybackQueue, UtteranceId};
use crate::reasoning::{Reasoner, ReasoningRequest, Role, SessionContext};
use crate::transport::{TransportEvent, TransportSession};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug)]
pub(crate) enum Command {
    StartSession,
    EndSession,
    Speak(String),
    Interrupt,
    Shutdown,
}

type ReasoningResult = (u64, anyhow::Result<String>);

pub(crate) struct Channels {
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub capture: mpsc::Receiver<CaptureEvent>,
    pub transport: mpsc::UnboundedReceiver<TransportEvent>,
    pub playback: mpsc::UnboundedReceiver<PlaybackEvent>,
}

pub(crate) struct Engine {
    config: Config,
    state: ConversationState,
    capture: Capture,
    transport: TransportSession,
    playback: PlaybackQueue,
    reasoner: Arc<dyn Reasoner>,
    barge_in: BargeInDetector,
    barge_in_deadline: Option<Instant>,
    context: SessionContext,
    sessions: u64,
    /// Id of the reasoning call whose answer we still want.
    turn: u64,
    reasoning: Option<JoinHandle<()>>,
    reasoning_tx: mpsc::UnboundedSender<ReasoningResult>,
    reasoning_rx: mpsc::UnboundedReceiver<ReasoningResult>,
    /// Segment of the utterance being heard right now.
    current_segment: Option<u64>,
    /// Highest segment already turned into a final transcript.
    finalized_segment: Option<u64>,
    /// Final transcript that arrived while the assistant was talking.
    heard_while_speaking: Option<String>,
    snapshot: SessionSnapshot,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    events_tx: broadcast::Sender<EngineEvent>,
}

impl Engine {
    pub(crate) fn new(
        config: Config,
        capture: Capture,
        transport: TransportSession,
        playback: PlaybackQueue,
        reasoner: Arc<dyn Reasoner>,
        snapshot_tx: watch::Sender<SessionSnapshot>,
        events_tx: broadcast::Sender<EngineEvent>,
    ) -> Self {
        let (reasoning_tx, reasoning_rx) = mpsc::unbounded_channel();
        Self {
            barge_in: BargeInDetector::new(config.barge_in.clone()),
            config,
            state: ConversationState::Idle,
            capture,
            transport,
            playback,
            reasoner,
            barge_in_deadline: None,
            context: SessionContext::default(),
            sessions: 0,
            turn: 0,
            reasoning: None,
            reasoning_tx,
            reasoning_rx,
            current_segment: None,
            finalized_segment: None,
            heard_while_speaking: None,
            snapshot: SessionSnapshot::default(),
            snapshot_tx,
            events_tx,
        }
    }

    pub(crate) async fn run(mut self, mut channels: Channels) {
        let deadline = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(deadline);

        loop {
            let armed = self.barge_in_deadline.is_some();
            tokio::select! {
                command = channels.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.on_command(command).await,
                },
                Some(event) = channels.capture.recv() => self.on_capture(event),
                Some(event) = channels.transport.recv() => self.on_transport(event),
                Some(event) = channels.playback.recv() => self.on_playback(event),
                Some((turn, result)) = self.reasoning_rx.recv() => self.on_reasoning(turn, result),
                () = &mut deadline, if armed => {
                    self.barge_in_deadline = None;
                    let verdict = self.barge_in.on_deadline(Instant::now());
                    self.on_verdict(verdict);
                }
            }

            if let Some(at) = self.barge_in_deadline {
                if deadline.deadline() != at {
                    deadline.as_mut().reset(at);
                }
            }
        }

        if self.state != ConversationState::Idle {
            self.teardown();
            self.transition(ConversationState::Idle);
        }
        tracing::info!("Engine stopped");
    }

    async fn on_command(&mut self, command: Command) {
        tracing::debug!("Command {:?} in {:?}", command, self.state);
        match command {
            Command::StartSession => self.start_session().await,
            Command::EndSession => {
                if self.state == ConversationState::Idle {
                    tracing::debug!("No session to end");
                    return;
                }
                self.teardown();
                self.transition(ConversationState::Idle);
            }
            Command::Speak(text) => {
                if self.state != ConversationState::Listening {
                    tracing::warn!("Ignoring speak request in {:?}", self.state);
                    return;
                }
                self.transition(ConversationState::Processing);
                self.begin_utterance(&text);
            }
            Command::Interrupt => {
                if self.state != ConversationState::Speaking {
                    tracing::debug!("Nothing to interrupt in {:?}", self.state);
                    return;
                }
                self.confirm_barge_in(BargeInTrigger::Manual);
            }
            Command::Shutdown => {}
        }
    }

    async fn start_session(&mut self) {
        if self.state != ConversationState::Idle {
            tracing::debug!("Session already running ({:?})", self.state);
            return;
        }
        if let Err(e) = self.capture.start().await {
            self.report(e);
            return;
        }

        self.sessions += 1;
        self.context = SessionContext::new(&format!("session-{}", self.sessions));
        self.current_segment = None;
        self.finalized_segment = None;
        self.snapshot.transcript = Default::default();
        self.snapshot.last_error = None;
        self.transport.connect();
        self.transition(ConversationState::Listening);
    }

    /// Releases everything a session holds. The caller moves the state to `Idle`.
    fn teardown(&mut self) {
        self.capture.stop();
        self.abandon_reasoning();
        if let Some(id) = self.playback.cancel() {
            self.finish_utterance(id, true);
        }
        self.barge_in.disarm();
        self.barge_in_deadline = None;
        self.transport.disconnect();
        self.snapshot.transcript.partial.clear();
        self.snapshot.volume_level = 0.0;
    }

    fn on_capture(&mut self, event: CaptureEvent) {
        if self.state == ConversationState::Idle {
            return;
        }
        match event {
            CaptureEvent::Frame(frame) => {
                if let Err(e) = self.transport.send_audio(&frame) {
                    tracing::trace!("Audio frame not sent: {}", e);
                }
            }
            CaptureEvent::Volume(level) => {
                self.snapshot.volume_level = level;
                self.publish();
            }
            CaptureEvent::SpeechStart => {
                tracing::debug!("Speech started in {:?}", self.state);
                if self.state == ConversationState::Speaking {
                    self.barge_in.on_speech_start(Instant::now());
                }
            }
            CaptureEvent::SpeechEnd => match self.state {
                ConversationState::Listening => {
                    let text = self.snapshot.transcript.partial.trim().to_string();
                    if text.is_empty() {
                        tracing::debug!("Speech ended with nothing recognised");
                        return;
                    }
                    if let Err(e) = self.transport.commit_input(self.current_segment) {
                        tracing::debug!("Could not commit input: {}", e);
                    }
                    self.begin_turn(text);
                }
                ConversationState::Speaking => {
                    if self.barge_in.on_speech_end() {
                        self.barge_in_deadline = None;
                    }
                }
                state => tracing::debug!("Ignoring speech end in {:?}", state),
            },
            CaptureEvent::DeviceLost => {
                self.report(VoiceError::DeviceUnavailable(
                    "microphone stream ended".to_string(),
                ));
                self.teardown();
                self.transition(ConversationState::Idle);
            }
        }
    }

    fn on_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.set_connected(true),
            TransportEvent::Disconnected { reconnecting } => {
                self.set_connected(false);
                if reconnecting {
                    self.report(VoiceError::TransportClosed(
                        "connection lost, reconnecting".to_string(),
                    ));
                }
            }
            TransportEvent::PartialText { segment, text } => self.on_partial(segment, text),
            TransportEvent::FinalText { segment, text } => self.on_final(segment, text),
            TransportEvent::SynthesizedAudio { chunk_id } => {
                tracing::trace!("Audio arrived for chunk {}", chunk_id);
            }
            TransportEvent::StatusUpdate(flags) => {
                self.snapshot.backend_status = flags.clone();
                self.emit(EngineEvent::BackendStatus(flags));
                self.publish();
            }
            TransportEvent::ErrorNotice(message) => {
                let report = crate::error::ErrorReport::backend_notice(&message);
                tracing::warn!("Backend notice: {}", message);
                self.snapshot.last_error = Some(report.clone());
                self.emit(EngineEvent::Error(report));
                self.publish();
            }
        }
    }

    fn is_stale(&self, segment: u64) -> bool {
        self.finalized_segment.is_some_and(|done| segment <= done)
    }

    fn on_partial(&mut self, segment: u64, text: String) {
        if self.state == ConversationState::Idle {
            return;
        }
        if self.is_stale(segment) {
            tracing::debug!("Dropping stale partial for segment {}", segment);
            return;
        }
        self.current_segment = Some(segment);
        self.snapshot.transcript.partial = text.clone();
        self.emit(EngineEvent::PartialTranscript(text.clone()));
        self.publish();

        if self.state == ConversationState::Speaking {
            let verdict = self.barge_in.on_partial(&text, Instant::now());
            self.on_verdict(verdict);
        }
    }

    fn on_final(&mut self, segment: u64, text: String) {
        if self.state == ConversationState::Idle {
            return;
        }
        if self.is_stale(segment) {
            tracing::debug!("Dropping final for already finalized segment {}", segment);
            return;
        }
        self.finalized_segment = Some(segment);
        self.current_segment = None;
        self.snapshot.transcript.partial.clear();
        self.emit(EngineEvent::FinalTranscript(text.clone()));

        let text = text.trim().to_string();
        match self.state {
            ConversationState::Listening if !text.is_empty() => self.begin_turn(text),
            ConversationState::Speaking if !text.is_empty() => {
                let verdict = self.barge_in.on_partial(&text, Instant::now());
                if verdict != Verdict::Ignored {
                    // Becomes the next turn if this speech turns out to be a barge-in.
                    self.heard_while_speaking = Some(text);
                }
                self.publish();
                self.on_verdict(verdict);
            }
            state => {
                tracing::debug!("Final transcript starts no turn in {:?}", state);
                self.publish();
            }
        }
    }

    fn on_verdict(&mut self, verdict: Verdict) {
        match verdict {
            Verdict::Ignored => {}
            Verdict::Pending { deadline } => self.barge_in_deadline = Some(deadline),
            Verdict::Confirmed(trigger) => self.confirm_barge_in(trigger),
        }
    }

    /// Hands a finished user utterance to the reasoning collaborator.
    fn begin_turn(&mut self, text: String) {
        if let Some(segment) = self.current_segment.take() {
            self.finalized_segment = Some(self.finalized_segment.map_or(segment, |f| f.max(segment)));
        }
        self.snapshot.transcript.final_text = text.clone();
        self.snapshot.transcript.partial.clear();
        self.transition(ConversationState::Processing);

        let request = ReasoningRequest {
            utterance_text: text.clone(),
            session_context: self.context.clone(),
        };
        self.context
            .push(Role::User, &text, self.config.reasoning.context_turns);

        self.abandon_reasoning();
        let turn = self.turn;
        let reasoner = self.reasoner.clone();
        let results = self.reasoning_tx.clone();
        tracing::info!("Asking for a reply to {:?}", text);
        self.reasoning = Some(tokio::spawn(async move {
            let result = reasoner.reply(request).await;
            let _ = results.send((turn, result));
        }));
    }

    fn abandon_reasoning(&mut self) {
        self.turn += 1;
        if let Some(task) = self.reasoning.take() {
            task.abort();
        }
    }

    fn on_reasoning(&mut self, turn: u64, result: anyhow::Result<String>) {
        if turn != self.turn || self.state != ConversationState::Processing {
            tracing::debug!("Discarding reply for abandoned turn {}", turn);
            return;
        }
        self.reasoning = None;
        match result {
            Ok(reply) if reply.trim().is_empty() => {
                tracing::info!("Reply was empty, nothing to say");
                self.transition(ConversationState::Listening);
            }
            Ok(reply) => {
                self.context
                    .push(Role::Assistant, &reply, self.config.reasoning.context_turns);
                self.begin_utterance(&reply);
            }
            Err(e) => {
                self.report(VoiceError::ReasoningFailed(format!("{:#}", e)));
                let apology = self.config.reasoning.apology.clone();
                self.begin_utterance(&apology);
            }
        }
    }

    /// Starts speaking `text`. The state moves to `Speaking` once the first chunk plays.
    fn begin_utterance(&mut self, text: &str) {
        match self.playback.enqueue(text) {
            Ok(utterance) => {
                self.emit(EngineEvent::UtteranceStarted {
                    id: utterance.id,
                    chunks: utterance.sentence_chunks.len(),
                });
                self.snapshot.utterance = Some(utterance);
                self.publish();
            }
            Err(VoiceError::EmptyUtterance) => {
                tracing::info!("Nothing to speak");
                self.transition(ConversationState::Listening);
            }
            Err(e) => {
                self.report(e);
                self.transition(ConversationState::Listening);
            }
        }
    }

    fn is_current(&self, id: UtteranceId) -> bool {
        self.snapshot.utterance.as_ref().is_some_and(|u| u.id == id)
    }

    fn on_playback(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::ChunkStarted { utterance, index } if self.is_current(utterance) => {
                if let Some(current) = self.snapshot.utterance.as_mut() {
                    current.chunk_index = index;
                }
                if self.state == ConversationState::Processing {
                    self.snapshot.is_speaking = true;
                    self.barge_in.arm();
                    self.transition(ConversationState::Speaking);
                } else {
                    self.publish();
                }
            }
            PlaybackEvent::ChunkFailed {
                utterance, error, ..
            } if self.is_current(utterance) => self.report(error),
            PlaybackEvent::Done { utterance } if self.is_current(utterance) => {
                self.finish_utterance(utterance, false);
                if matches!(
                    self.state,
                    ConversationState::Speaking | ConversationState::Processing
                ) {
                    self.transition(ConversationState::Listening);
                }
            }
            other => tracing::trace!("Ignoring playback event {:?}", other),
        }
    }

    fn finish_utterance(&mut self, id: UtteranceId, interrupted: bool) {
        if let Some(text) = self.heard_while_speaking.take() {
            tracing::debug!("Dropping {:?}, heard while speaking", text);
        }
        self.barge_in.disarm();
        self.barge_in_deadline = None;
        self.snapshot.is_speaking = false;
        self.snapshot.utterance = None;
        self.emit(EngineEvent::UtteranceFinished { id, interrupted });
        self.publish();
    }

    fn confirm_barge_in(&mut self, trigger: BargeInTrigger) {
        if self.state != ConversationState::Speaking {
            return;
        }
        tracing::info!("Barge-in confirmed: {:?}", trigger);
        let question = match trigger {
            BargeInTrigger::Keyword(_) => {
                // A stop word is not a question; keep it out of the next turn.
                if let Some(segment) = self.current_segment.take() {
                    self.finalized_segment = Some(segment);
                }
                self.snapshot.transcript.partial.clear();
                self.heard_while_speaking = None;
                None
            }
            _ => self.heard_while_speaking.take(),
        };
        self.emit(EngineEvent::BargeIn(trigger));
        if let Some(id) = self.playback.cancel() {
            self.finish_utterance(id, true);
        }
        self.transition(ConversationState::Interrupted);
        self.transition(ConversationState::Listening);
        if let Some(question) = question {
            self.begin_turn(question);
        }
    }

    fn set_connected(&mut self, connected: bool) {
        if self.snapshot.connected != connected {
            self.snapshot.connected = connected;
            self.emit(EngineEvent::ConnectionChanged { connected });
            self.publish();
        }
    }

    fn transition(&mut self, to: ConversationState) {
        let from = self.state;
        if !from.can_transition(to) {
            tracing::warn!("Ignoring invalid transition {:?} -> {:?}", from, to);
            return;
        }
        tracing::info!("{:?} -> {:?}", from, to);
        self.state = to;
        self.snapshot.state = to;
        self.emit(EngineEvent::StateChanged { from, to });
        self.publish();
    }

    fn report(&mut self, error: VoiceError) {
        let report = error.report();
        if report.requires_user_action {
            tracing::error!("{}", report.message);
        } else {
            tracing::warn!("{}", report.message);
        }
        self.snapshot.last_error = Some(report.clone());
        self.emit(EngineEvent::Error(report));
        self.publish();
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events_tx.send(event);
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot.clone());
    }
}
