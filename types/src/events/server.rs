use crate::StatusFlags;
use crate::audio::{Base64EncodedAudioBytes, DEFAULT_SAMPLE_RATE};

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

/// `transcript.partial` and `transcript.final` events
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TranscriptEvent {
    /// Recognition segment the text belongs to. Segments increase monotonically.
    segment: u64,
    text: String,
}

impl TranscriptEvent {
    pub fn new(segment: u64, text: &str) -> Self {
        Self {
            segment,
            text: text.to_string(),
        }
    }

    pub fn segment(&self) -> u64 {
        self.segment
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// `synthesis.audio` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SynthesizedAudioEvent {
    chunk_id: String,
    /// PCM16 audio, base64 encoded
    audio: Base64EncodedAudioBytes,
    #[serde(default = "default_sample_rate")]
    sample_rate: u32,
}

impl SynthesizedAudioEvent {
    pub fn new(chunk_id: &str, audio: Base64EncodedAudioBytes) -> Self {
        Self {
            chunk_id: chunk_id.to_string(),
            audio,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn chunk_id(&self) -> &str {
        &self.chunk_id
    }

    pub fn audio(&self) -> &Base64EncodedAudioBytes {
        &self.audio
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// `status` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StatusUpdateEvent {
    #[serde(default)]
    flags: StatusFlags,
}

impl StatusUpdateEvent {
    pub fn new(flags: StatusFlags) -> Self {
        Self { flags }
    }

    pub fn flags(&self) -> &StatusFlags {
        &self.flags
    }
}

/// `error` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    /// Set when the error belongs to one synthesis request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chunk_id: Option<String>,
}

impl ErrorEvent {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            code: None,
            chunk_id: None,
        }
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }

    pub fn with_chunk_id(mut self, chunk_id: &str) -> Self {
        self.chunk_id = Some(chunk_id.to_string());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn chunk_id(&self) -> Option<&str> {
        self.chunk_id.as_deref()
    }
}
