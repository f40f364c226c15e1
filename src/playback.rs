//! Sentence-chunked speech output.
//!
//! An [`Utterance`] is split into sentence chunks which are synthesized and played one at a
//! time, strictly in order. At most one utterance is active; it either finishes
//! ([`PlaybackEvent::Done`]) or is cancelled ([`PlaybackEvent::Interrupted`]), never both.

mod segment;

pub use segment::split_sentences;

use crate::audio::AudioClip;
use crate::config::PlaybackConfig;
use crate::error::VoiceError;
use async_trait::async_trait;
use futures::future::OptionFuture;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UtteranceId(pub u64);

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId {
    pub utterance: UtteranceId,
    pub index: usize,
}

impl ChunkId {
    pub fn new(utterance: UtteranceId, index: usize) -> Self {
        Self { utterance, index }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.c{}", self.utterance, self.index)
    }
}

/// One unit of assistant speech.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Utterance {
    pub id: UtteranceId,
    pub source_text: String,
    pub sentence_chunks: Vec<String>,
    /// Chunk currently playing.
    pub chunk_index: usize,
    pub cancelled: bool,
}

/// Turns a sentence chunk into audio.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, chunk: &ChunkId, text: &str) -> Result<AudioClip, VoiceError>;
}

/// Speaker output.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Plays a clip, resolving once it has finished sounding.
    async fn play(&self, clip: AudioClip) -> Result<(), VoiceError>;

    /// Silences whatever is sounding right now.
    fn stop(&self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Audio for the chunk is ready and has started playing.
    ChunkStarted { utterance: UtteranceId, index: usize },
    /// The chunk was skipped.
    ChunkFailed {
        utterance: UtteranceId,
        index: usize,
        error: VoiceError,
    },
    /// Every chunk was handled; playback ended naturally.
    Done { utterance: UtteranceId },
    /// `cancel()` stopped the utterance.
    Interrupted { utterance: UtteranceId },
}

struct Active {
    utterance: UtteranceId,
    task: JoinHandle<()>,
}

type ActiveSlot = Arc<Mutex<Option<Active>>>;

fn lock(slot: &ActiveSlot) -> MutexGuard<'_, Option<Active>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes `utterance` from the slot if it still owns it.
fn release(slot: &ActiveSlot, utterance: UtteranceId) -> bool {
    let mut active = lock(slot);
    if active.as_ref().is_some_and(|a| a.utterance == utterance) {
        *active = None;
        true
    } else {
        false
    }
}

pub struct PlaybackQueue {
    synthesizer: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
    config: PlaybackConfig,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    active: ActiveSlot,
    next_id: u64,
}

impl PlaybackQueue {
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        sink: Arc<dyn AudioSink>,
        config: PlaybackConfig,
        events: mpsc::UnboundedSender<PlaybackEvent>,
    ) -> Self {
        Self {
            synthesizer,
            sink,
            config,
            events,
            active: Arc::new(Mutex::new(None)),
            next_id: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        lock(&self.active).is_some()
    }

    pub fn active_utterance(&self) -> Option<UtteranceId> {
        lock(&self.active).as_ref().map(|a| a.utterance)
    }

    /// Segments `text` and starts playing it.
    ///
    /// Refuses with [`VoiceError::PlaybackActive`] while another utterance is active;
    /// replacing one means cancelling it first.
    pub fn enqueue(&mut self, text: &str) -> Result<Utterance, VoiceError> {
        let chunks = split_sentences(text);
        if chunks.is_empty() {
            return Err(VoiceError::EmptyUtterance);
        }

        let mut active = lock(&self.active);
        if active.is_some() {
            return Err(VoiceError::PlaybackActive);
        }
        self.next_id += 1;
        let utterance = Utterance {
            id: UtteranceId(self.next_id),
            source_text: text.to_string(),
            sentence_chunks: chunks.clone(),
            chunk_index: 0,
            cancelled: false,
        };
        tracing::debug!(
            "Enqueued utterance {} with {} chunk(s)",
            utterance.id,
            chunks.len()
        );

        let task = tokio::spawn(play_utterance(
            utterance.id,
            chunks,
            self.synthesizer.clone(),
            self.sink.clone(),
            self.events.clone(),
            self.active.clone(),
            self.config.prefetch_next,
        ));
        *active = Some(Active {
            utterance: utterance.id,
            task,
        });
        Ok(utterance)
    }

    /// Stops the active utterance immediately and drops its unplayed chunks.
    ///
    /// Returns the cancelled utterance, or `None` when nothing was active.
    pub fn cancel(&mut self) -> Option<UtteranceId> {
        let active = lock(&self.active).take()?;
        active.task.abort();
        self.sink.stop();
        tracing::debug!("Cancelled utterance {}", active.utterance);
        let _ = self.events.send(PlaybackEvent::Interrupted {
            utterance: active.utterance,
        });
        Some(active.utterance)
    }
}

impl Drop for PlaybackQueue {
    fn drop(&mut self) {
        if let Some(active) = lock(&self.active).take() {
            active.task.abort();
            self.sink.stop();
        }
    }
}

async fn play_utterance(
    utterance: UtteranceId,
    chunks: Vec<String>,
    synthesizer: Arc<dyn Synthesizer>,
    sink: Arc<dyn AudioSink>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    active: ActiveSlot,
    prefetch: bool,
) {
    let mut prefetched: Option<Result<AudioClip, VoiceError>> = None;

    for (index, text) in chunks.iter().enumerate() {
        let chunk = ChunkId::new(utterance, index);
        let synthesized = match prefetched.take() {
            Some(result) => result,
            None => synthesizer.synthesize(&chunk, text).await,
        };
        let clip = match synthesized {
            Ok(clip) => clip,
            Err(error) => {
                tracing::warn!("Skipping chunk {}: {}", chunk, error);
                let _ = events.send(PlaybackEvent::ChunkFailed {
                    utterance,
                    index,
                    error,
                });
                continue;
            }
        };

        let _ = events.send(PlaybackEvent::ChunkStarted { utterance, index });
        let next_chunk = ChunkId::new(utterance, index + 1);
        let next = chunks
            .get(index + 1)
            .filter(|_| prefetch)
            .map(|next_text| synthesizer.synthesize(&next_chunk, next_text));
        let (played, next) = tokio::join!(sink.play(clip), OptionFuture::from(next));
        prefetched = next;

        if let Err(error) = played {
            tracing::warn!("Playback of chunk {} failed: {}", chunk, error);
            let _ = events.send(PlaybackEvent::ChunkFailed {
                utterance,
                index,
                error,
            });
        }
    }

    if release(&active, utterance) {
        tracing::debug!("Utterance {} finished", utterance);
        let _ = events.send(PlaybackEvent::Done { utterance });
    }
}
