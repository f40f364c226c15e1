use crate::audio::AudioFormat;

/// `session.start` event, sent after every (re)connect.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionStartEvent {
    /// Format of the binary audio frames that follow
    audio: AudioFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<String>,
}

impl SessionStartEvent {
    pub fn new(audio: AudioFormat) -> Self {
        Self {
            audio,
            language: None,
        }
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    pub fn audio(&self) -> &AudioFormat {
        &self.audio
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }
}

/// `input_audio.commit` event: the client decided the utterance ended.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InputAudioCommitEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    segment: Option<u64>,
}

impl InputAudioCommitEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_segment(mut self, segment: u64) -> Self {
        self.segment = Some(segment);
        self
    }

    pub fn segment(&self) -> Option<u64> {
        self.segment
    }
}

/// `synthesis.request` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SynthesisRequestEvent {
    chunk_id: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<String>,
}

impl SynthesisRequestEvent {
    pub fn new(chunk_id: &str, text: &str) -> Self {
        Self {
            chunk_id: chunk_id.to_string(),
            text: text.to_string(),
            voice: None,
        }
    }

    pub fn with_voice(mut self, voice: &str) -> Self {
        self.voice = Some(voice.to_string());
        self
    }

    pub fn chunk_id(&self) -> &str {
        &self.chunk_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn voice(&self) -> Option<&str> {
        self.voice.as_deref()
    }
}

/// `synthesis.cancel` event
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SynthesisCancelEvent {
    chunk_id: String,
}

impl SynthesisCancelEvent {
    pub fn new(chunk_id: &str) -> Self {
        Self {
            chunk_id: chunk_id.to_string(),
        }
    }

    pub fn chunk_id(&self) -> &str {
        &self.chunk_id
    }
}
