//! Persistent duplex channel to the speech backend.
//!
//! [`TransportSession`] owns the connection lifecycle. An unexpected close schedules exactly
//! one reconnect after a fixed backoff, and keeps doing so until [`TransportSession::disconnect`]
//! is called. Sends while no link is open fail fast with [`VoiceError::NotConnected`].
//!
//! The session also resolves synthesis requests: it implements [`Synthesizer`] by sending
//! `synthesis.request` and waiting for the `synthesis.audio` carrying the same chunk id.

mod link;
mod stats;
mod ws;

pub use link::{Connector, Inbound, Link, Outbound};
pub use stats::Stats;
pub use ws::WsConnector;

use crate::audio::{AudioClip, AudioFrame};
use crate::config::TransportConfig;
use crate::error::VoiceError;
use crate::playback::{ChunkId, Synthesizer};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use voice_duplex_types::audio::AudioFormat;
use voice_duplex_types::events::client::{
    InputAudioCommitEvent, SessionStartEvent, SynthesisCancelEvent, SynthesisRequestEvent,
};
use voice_duplex_types::{ClientEvent, ServerEvent, StatusFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// A close was requested and is still being flushed.
    Closing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected { reconnecting: bool },
    PartialText { segment: u64, text: String },
    FinalText { segment: u64, text: String },
    SynthesizedAudio { chunk_id: String },
    StatusUpdate(StatusFlags),
    /// A backend error not tied to a synthesis request.
    ErrorNotice(String),
}

type SynthesisReply = oneshot::Sender<Result<AudioClip, VoiceError>>;

struct Inner {
    state: ConnectionState,
    outbound: Option<mpsc::Sender<Outbound>>,
    /// Sender of a link we closed on purpose, kept until the close is flushed.
    closing: Option<mpsc::Sender<Outbound>>,
    /// Bumped for every attempt and on disconnect; stale tasks compare and bail.
    generation: u64,
    /// The orchestrator wants a live channel.
    wanted: bool,
    connection: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    pending: HashMap<String, SynthesisReply>,
}

struct Shared {
    connector: Arc<dyn Connector>,
    config: TransportConfig,
    events: mpsc::UnboundedSender<TransportEvent>,
    inner: Mutex<Inner>,
    stats: Mutex<Stats>,
}

#[derive(Clone)]
pub struct TransportSession {
    shared: Arc<Shared>,
}

impl TransportSession {
    pub fn new(
        connector: Arc<dyn Connector>,
        config: TransportConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        let inner = Inner {
            state: ConnectionState::Disconnected,
            outbound: None,
            closing: None,
            generation: 0,
            wanted: false,
            connection: None,
            reconnect: None,
            pending: HashMap::new(),
        };
        Self {
            shared: Arc::new(Shared {
                connector,
                config,
                events,
                inner: Mutex::new(inner),
                stats: Mutex::new(Stats::new()),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        let inner = self.shared.lock();
        match inner.state {
            ConnectionState::Disconnected
                if inner.closing.as_ref().is_some_and(|o| !o.is_closed()) =>
            {
                ConnectionState::Closing
            }
            state => state,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn stats(&self) -> Stats {
        self.shared
            .stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Starts connecting. A no-op while connected, connecting, or waiting to reconnect.
    pub fn connect(&self) {
        let mut inner = self.shared.lock();
        inner.wanted = true;
        inner.closing = None;
        if inner.state != ConnectionState::Disconnected || inner.reconnect.is_some() {
            tracing::debug!("Transport already {:?}, ignoring connect", inner.state);
            return;
        }
        self.shared.begin_attempt(&mut inner);
    }

    /// Closes the channel on purpose. No reconnect follows.
    pub fn disconnect(&self) {
        let (outbound, pending, was_live) = {
            let mut inner = self.shared.lock();
            inner.wanted = false;
            inner.generation += 1;
            if let Some(reconnect) = inner.reconnect.take() {
                reconnect.abort();
            }
            if let Some(connection) = inner.connection.take() {
                connection.abort();
            }
            let was_live = inner.state != ConnectionState::Disconnected;
            inner.state = ConnectionState::Disconnected;
            let outbound = inner.outbound.take();
            inner.closing = outbound.clone();
            (outbound, std::mem::take(&mut inner.pending), was_live)
        };

        if let Some(outbound) = outbound {
            if outbound.try_send(Outbound::Close).is_err() {
                tracing::debug!("Close frame could not be queued; link already gone");
            }
        }
        fail_pending(pending, "transport disconnected");
        if was_live {
            tracing::info!("Transport disconnected");
            self.shared.emit(TransportEvent::Disconnected {
                reconnecting: false,
            });
        }
    }

    /// Streams one captured frame. A full outbound channel drops the frame.
    pub fn send_audio(&self, frame: &AudioFrame) -> Result<(), VoiceError> {
        let outbound = self.shared.outbound()?;
        match outbound.try_send(Outbound::Audio(frame.to_pcm16())) {
            Ok(()) => {
                self.shared.record(Stats::record_frame_sent);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                tracing::trace!("Outbound channel full, dropping audio frame");
                self.shared.record(Stats::record_frame_dropped);
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(VoiceError::NotConnected),
        }
    }

    /// Tells the backend the user finished speaking.
    pub fn commit_input(&self, segment: Option<u64>) -> Result<(), VoiceError> {
        let mut commit = InputAudioCommitEvent::new();
        if let Some(segment) = segment {
            commit = commit.with_segment(segment);
        }
        self.send_event(ClientEvent::InputAudioCommit(commit))
    }

    pub fn send_event(&self, event: ClientEvent) -> Result<(), VoiceError> {
        let outbound = self.shared.outbound()?;
        match outbound.try_send(Outbound::Event(event)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(message)) => {
                // Control events are never dropped; wait for room off the caller's path.
                tokio::spawn(async move {
                    let _ = outbound.send(message).await;
                });
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(VoiceError::NotConnected),
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, update: impl FnOnce(&mut Stats)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(&mut stats);
        } else {
            tracing::error!("failed to update stats");
        }
    }

    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Transport event dropped: no listener");
        }
    }

    fn outbound(&self) -> Result<mpsc::Sender<Outbound>, VoiceError> {
        let inner = self.lock();
        match (&inner.state, &inner.outbound) {
            (ConnectionState::Open, Some(outbound)) => Ok(outbound.clone()),
            _ => Err(VoiceError::NotConnected),
        }
    }

    fn session_start(&self) -> ClientEvent {
        let format = AudioFormat::new().with_sample_rate(self.config.sample_rate);
        let mut start = SessionStartEvent::new(format);
        if let Some(language) = &self.config.language {
            start = start.with_language(language);
        }
        ClientEvent::SessionStart(start)
    }

    fn begin_attempt(self: &Arc<Self>, inner: &mut Inner) {
        inner.generation += 1;
        inner.state = ConnectionState::Connecting;
        let generation = inner.generation;
        tracing::debug!("Opening backend link (attempt {})", generation);
        inner.connection = Some(tokio::spawn(self.clone().run_connection(generation)));
    }

    fn schedule_reconnect(self: &Arc<Self>, inner: &mut Inner) {
        if let Some(previous) = inner.reconnect.take() {
            previous.abort();
        }
        let backoff = self.config.reconnect_backoff;
        tracing::info!("Reconnecting in {:?}", backoff);
        let shared = self.clone();
        inner.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(backoff).await;
            let mut inner = shared.lock();
            inner.reconnect = None;
            if !inner.wanted || inner.state != ConnectionState::Disconnected {
                return;
            }
            shared.record(Stats::record_reconnect_attempt);
            shared.begin_attempt(&mut inner);
        }));
    }

    async fn run_connection(self: Arc<Self>, generation: u64) {
        let Link {
            outbound,
            mut inbound,
        } = match self.connector.open().await {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!("Failed to open backend link: {:#}", e);
                self.connection_lost(generation, &e.to_string());
                return;
            }
        };

        if outbound
            .send(Outbound::Event(self.session_start()))
            .await
            .is_err()
        {
            self.connection_lost(generation, "link closed before session start");
            return;
        }

        {
            let mut inner = self.lock();
            if inner.generation != generation || !inner.wanted {
                let _ = outbound.try_send(Outbound::Close);
                return;
            }
            inner.state = ConnectionState::Open;
            inner.outbound = Some(outbound);
        }
        self.record(Stats::record_connect);
        tracing::info!("Transport open");
        self.emit(TransportEvent::Connected);

        let reason = loop {
            match inbound.recv().await {
                Some(Inbound::Event(event)) => self.dispatch(event),
                Some(Inbound::Closed { code, reason }) => {
                    tracing::info!("Backend closed the link (code {:?}): {}", code, reason);
                    break reason;
                }
                None => break "link lost".to_string(),
            }
        };
        self.connection_lost(generation, &reason);
    }

    /// Handles the end of a link we did not close ourselves.
    fn connection_lost(self: &Arc<Self>, generation: u64, reason: &str) {
        let (pending, reconnecting) = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return;
            }
            inner.state = ConnectionState::Disconnected;
            inner.outbound = None;
            inner.connection = None;
            let reconnecting = inner.wanted;
            if reconnecting {
                self.schedule_reconnect(&mut inner);
            }
            (std::mem::take(&mut inner.pending), reconnecting)
        };
        tracing::warn!("Transport closed unexpectedly: {}", reason);
        fail_pending(pending, reason);
        self.emit(TransportEvent::Disconnected { reconnecting });
    }

    fn dispatch(&self, event: ServerEvent) {
        self.record(Stats::record_event);
        match event {
            ServerEvent::PartialText(t) => self.emit(TransportEvent::PartialText {
                segment: t.segment(),
                text: t.text().to_string(),
            }),
            ServerEvent::FinalText(t) => self.emit(TransportEvent::FinalText {
                segment: t.segment(),
                text: t.text().to_string(),
            }),
            ServerEvent::SynthesizedAudio(audio) => {
                let chunk_id = audio.chunk_id().to_string();
                let waiter = self.lock().pending.remove(&chunk_id);
                match waiter {
                    Some(waiter) => {
                        let result = AudioClip::from_base64(audio.audio(), audio.sample_rate())
                            .ok_or_else(|| VoiceError::SynthesisFailed {
                                chunk: chunk_id.clone(),
                                reason: "undecodable audio".to_string(),
                            });
                        let _ = waiter.send(result);
                    }
                    None => tracing::debug!("Dropping audio for abandoned chunk {}", chunk_id),
                }
                self.emit(TransportEvent::SynthesizedAudio { chunk_id });
            }
            ServerEvent::StatusUpdate(status) => {
                self.emit(TransportEvent::StatusUpdate(status.flags().clone()))
            }
            ServerEvent::ErrorNotice(error) => {
                let waiter = error
                    .chunk_id()
                    .and_then(|chunk_id| self.lock().pending.remove(chunk_id));
                match (waiter, error.chunk_id()) {
                    (Some(waiter), Some(chunk_id)) => {
                        let _ = waiter.send(Err(VoiceError::SynthesisFailed {
                            chunk: chunk_id.to_string(),
                            reason: error.message().to_string(),
                        }));
                    }
                    _ => {
                        tracing::warn!(
                            "Backend error {}: {}",
                            error.code().unwrap_or("unknown"),
                            error.message()
                        );
                        self.emit(TransportEvent::ErrorNotice(error.message().to_string()));
                    }
                }
            }
        }
    }
}

fn fail_pending(pending: HashMap<String, SynthesisReply>, reason: &str) {
    for (chunk, waiter) in pending {
        let _ = waiter.send(Err(VoiceError::SynthesisFailed {
            chunk,
            reason: reason.to_string(),
        }));
    }
}

/// Withdraws a synthesis request that is dropped before its audio arrives.
struct PendingRequest {
    shared: Arc<Shared>,
    chunk_id: String,
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        let outbound = {
            let mut inner = self.shared.lock();
            if inner.pending.remove(&self.chunk_id).is_none() {
                return;
            }
            inner.outbound.clone()
        };
        if let Some(outbound) = outbound {
            let cancel = SynthesisCancelEvent::new(&self.chunk_id);
            if outbound
                .try_send(Outbound::Event(ClientEvent::SynthesisCancel(cancel)))
                .is_err()
            {
                tracing::debug!("Could not send cancel for chunk {}", self.chunk_id);
            }
        }
    }
}

#[async_trait]
impl Synthesizer for TransportSession {
    async fn synthesize(&self, chunk: &ChunkId, text: &str) -> Result<AudioClip, VoiceError> {
        let chunk_id = chunk.to_string();
        let failed = |reason: &str| VoiceError::SynthesisFailed {
            chunk: chunk_id.clone(),
            reason: reason.to_string(),
        };

        let (tx, rx) = oneshot::channel();
        let outbound = {
            let mut inner = self.shared.lock();
            let outbound = match (&inner.state, &inner.outbound) {
                (ConnectionState::Open, Some(outbound)) => outbound.clone(),
                _ => return Err(failed(&VoiceError::NotConnected.to_string())),
            };
            inner.pending.insert(chunk_id.clone(), tx);
            outbound
        };
        let _pending = PendingRequest {
            shared: self.shared.clone(),
            chunk_id: chunk_id.clone(),
        };

        let mut request = SynthesisRequestEvent::new(&chunk_id, text);
        if let Some(voice) = &self.shared.config.voice {
            request = request.with_voice(voice);
        }
        tracing::debug!("Requesting synthesis for chunk {}", chunk_id);
        if outbound
            .send(Outbound::Event(ClientEvent::SynthesisRequest(request)))
            .await
            .is_err()
        {
            return Err(failed("link closed"));
        }

        let timeout = self.shared.config.synthesis_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(failed("request abandoned")),
            Err(_) => Err(failed(&format!("no audio after {:?}", timeout))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeConnector;
    use base64::Engine;
    use std::time::Duration;
    use tokio::time::Instant;
    use voice_duplex_types::events::server::{
        ErrorEvent, StatusUpdateEvent, SynthesizedAudioEvent, TranscriptEvent,
    };

    fn config() -> TransportConfig {
        crate::config::Config::builder()
            .with_reconnect_backoff(Duration::from_secs(2))
            .with_synthesis_timeout(Duration::from_secs(10))
            .build()
            .transport
    }

    fn session(
        connector: &FakeConnector,
    ) -> (TransportSession, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            TransportSession::new(Arc::new(connector.clone()), config(), tx),
            rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn connect_announces_session_format() {
        let connector = FakeConnector::default();
        let (session, mut events) = session(&connector);

        session.connect();
        let mut server = connector.accept().await;
        assert_eq!(events.recv().await, Some(TransportEvent::Connected));
        assert!(session.is_connected());

        match server.next_event().await {
            Some(ClientEvent::SessionStart(start)) => {
                assert_eq!(start.audio().sample_rate(), 16_000);
            }
            other => panic!("expected session.start, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn audio_fails_fast_while_disconnected() {
        let connector = FakeConnector::default();
        let (session, mut events) = session(&connector);
        let frame = AudioFrame::new(vec![0.5; 4], 16_000);

        assert_eq!(session.send_audio(&frame), Err(VoiceError::NotConnected));

        session.connect();
        let mut server = connector.accept().await;
        events.recv().await;
        session.send_audio(&frame).unwrap();

        server.next_event().await;
        assert_eq!(server.next().await, Some(Outbound::Audio(frame.to_pcm16())));
        assert_eq!(session.stats().frames_sent(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_outbound_channel_drops_audio() {
        let connector = FakeConnector::with_capacity(2);
        let (session, mut events) = session(&connector);
        session.connect();
        let _server = connector.accept().await;
        events.recv().await;

        let frame = AudioFrame::new(vec![0.1; 4], 16_000);
        for _ in 0..4 {
            session.send_audio(&frame).unwrap();
        }
        let stats = session.stats();
        // session.start already holds one slot.
        assert_eq!(stats.frames_sent(), 1);
        assert_eq!(stats.frames_dropped(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_close_schedules_exactly_one_reconnect() {
        let connector = FakeConnector::default();
        let (session, mut events) = session(&connector);
        session.connect();
        let server = connector.accept().await;
        events.recv().await;

        server.close(Some(1011), "internal error").await;
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Disconnected { reconnecting: true })
        );
        assert_eq!(session.state(), ConnectionState::Disconnected);
        // Already waiting to reconnect; must not add an attempt.
        session.connect();

        let lost_at = Instant::now();
        let mut server = connector.accept().await;
        assert!(lost_at.elapsed() >= Duration::from_secs(2));
        assert_eq!(events.recv().await, Some(TransportEvent::Connected));
        assert!(matches!(
            server.next_event().await,
            Some(ClientEvent::SessionStart(_))
        ));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.opens(), 2);
        assert_eq!(session.stats().reconnect_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempts_keep_retrying_with_backoff() {
        let connector = FakeConnector::default();
        connector.refuse_next(2);
        let (session, mut events) = session(&connector);

        let started = Instant::now();
        session.connect();
        let _server = connector.accept().await;
        assert!(started.elapsed() >= Duration::from_secs(4));
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Disconnected { reconnecting: true })
        );

        let stats = session.stats();
        assert_eq!(stats.reconnect_attempts(), 2);
        assert_eq!(connector.opens(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn intentional_disconnect_never_reconnects() {
        let connector = FakeConnector::default();
        let (session, mut events) = session(&connector);
        session.connect();
        let mut server = connector.accept().await;
        events.recv().await;
        server.next_event().await;

        session.disconnect();
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Disconnected {
                reconnecting: false
            })
        );
        assert_eq!(server.next().await, Some(Outbound::Close));
        assert_eq!(session.state(), ConnectionState::Closing);
        drop(server);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.opens(), 1);
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_while_waiting_cancels_the_reconnect() {
        let connector = FakeConnector::default();
        let (session, mut events) = session(&connector);
        session.connect();
        let server = connector.accept().await;
        events.recv().await;

        drop(server);
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Disconnected { reconnecting: true })
        );
        session.disconnect();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_events_are_dispatched_in_order() {
        let connector = FakeConnector::default();
        let (session, mut events) = session(&connector);
        session.connect();
        let server = connector.accept().await;
        events.recv().await;

        server
            .send(ServerEvent::PartialText(TranscriptEvent::new(1, "what is")))
            .await;
        server
            .send(ServerEvent::FinalText(TranscriptEvent::new(1, "what is my pulse")))
            .await;
        server
            .send(ServerEvent::StatusUpdate(StatusUpdateEvent::new(
                StatusFlags::new().with_degraded(true),
            )))
            .await;
        server
            .send(ServerEvent::ErrorNotice(ErrorEvent::new("recognizer restarted")))
            .await;

        assert_eq!(
            events.recv().await,
            Some(TransportEvent::PartialText {
                segment: 1,
                text: "what is".into()
            })
        );
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::FinalText {
                segment: 1,
                text: "what is my pulse".into()
            })
        );
        match events.recv().await {
            Some(TransportEvent::StatusUpdate(flags)) => assert!(flags.degraded()),
            other => panic!("expected status, got {:?}", other),
        }
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::ErrorNotice("recognizer restarted".into()))
        );
        assert_eq!(session.stats().events_received(), 4);
    }

    async fn connected() -> (
        TransportSession,
        crate::testing::ServerEnd,
        mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let connector = FakeConnector::default();
        let (session, mut events) = session(&connector);
        session.connect();
        let mut server = connector.accept().await;
        events.recv().await;
        server.next_event().await;
        (session, server, events)
    }

    #[tokio::test(start_paused = true)]
    async fn synthesis_resolves_by_chunk_id() {
        let (session, mut server, _events) = connected().await;
        let chunk = ChunkId::new(crate::playback::UtteranceId(3), 0);

        let synthesizer = session.clone();
        let request =
            tokio::spawn(async move { synthesizer.synthesize(&chunk, "Hello there.").await });

        let Some(ClientEvent::SynthesisRequest(sent)) = server.next_event().await else {
            panic!("expected synthesis.request");
        };
        assert_eq!(sent.chunk_id(), "u3.c0");
        assert_eq!(sent.text(), "Hello there.");

        let audio = base64::engine::general_purpose::STANDARD.encode([1u8, 0, 2, 0]);
        server
            .send(ServerEvent::SynthesizedAudio(
                SynthesizedAudioEvent::new("u3.c0", audio).with_sample_rate(24_000),
            ))
            .await;

        let clip = request.await.unwrap().unwrap();
        assert_eq!(clip, AudioClip::new(vec![1, 0, 2, 0], 24_000));
    }

    #[tokio::test(start_paused = true)]
    async fn synthesis_error_notice_fails_the_chunk() {
        let (session, mut server, mut events) = connected().await;
        let chunk = ChunkId::new(crate::playback::UtteranceId(1), 2);

        let synthesizer = session.clone();
        let request = tokio::spawn(async move { synthesizer.synthesize(&chunk, "Fine.").await });
        server.next_event().await;
        server
            .send(ServerEvent::ErrorNotice(
                ErrorEvent::new("voice unavailable").with_chunk_id("u1.c2"),
            ))
            .await;

        assert_eq!(
            request.await.unwrap(),
            Err(VoiceError::SynthesisFailed {
                chunk: "u1.c2".into(),
                reason: "voice unavailable".into()
            })
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn synthesis_timeout_withdraws_the_request() {
        let (session, mut server, _events) = connected().await;
        let chunk = ChunkId::new(crate::playback::UtteranceId(1), 0);

        let started = Instant::now();
        let result = {
            let synthesizer = session.clone();
            let request = tokio::spawn(async move { synthesizer.synthesize(&chunk, "Hi.").await });
            request.await.unwrap()
        };
        assert!(matches!(result, Err(VoiceError::SynthesisFailed { .. })));
        assert!(started.elapsed() >= Duration::from_secs(10));

        assert!(matches!(
            server.next_event().await,
            Some(ClientEvent::SynthesisRequest(_))
        ));
        match server.next_event().await {
            Some(ClientEvent::SynthesisCancel(cancel)) => assert_eq!(cancel.chunk_id(), "u1.c0"),
            other => panic!("expected synthesis.cancel, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn synthesis_without_link_fails_immediately() {
        let connector = FakeConnector::default();
        let (session, _events) = session(&connector);
        let chunk = ChunkId::new(crate::playback::UtteranceId(1), 0);
        assert!(matches!(
            session.synthesize(&chunk, "Hi.").await,
            Err(VoiceError::SynthesisFailed { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn lost_link_fails_pending_synthesis() {
        let (session, mut server, _events) = connected().await;
        let chunk = ChunkId::new(crate::playback::UtteranceId(1), 0);
        let synthesizer = session.clone();
        let request = tokio::spawn(async move { synthesizer.synthesize(&chunk, "Hi.").await });
        server.next_event().await;

        drop(server);
        assert!(matches!(
            request.await.unwrap(),
            Err(VoiceError::SynthesisFailed { .. })
        ));
    }
}
