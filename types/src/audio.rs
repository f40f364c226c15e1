/// Audio data encoded as base64
pub type Base64EncodedAudioBytes = String;

/// Sample rate the speech backend expects for inbound PCM16 frames.
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    /// Little-endian signed 16-bit PCM.
    Pcm16,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AudioFormat {
    encoding: AudioEncoding,
    sample_rate: u32,
    channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            encoding: AudioEncoding::Pcm16,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
        }
    }
}

impl AudioFormat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn encoding(&self) -> AudioEncoding {
        self.encoding
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}
