//! Engine configuration.
//!
//! Every timing constant here is a tunable default rather than a contract. Values can be
//! set through [`ConfigBuilder`] or loaded from the environment with [`Config::from_env`].

use crate::consts::{
    DEFAULT_APOLOGY, DEFAULT_BACKEND_URL, DEFAULT_REASONING_URL, FILLER_WORDS, REASONING_API_KEY,
    REASONING_URL, STOP_KEYWORDS, VOICE_BACKEND_API_KEY, VOICE_BACKEND_URL, VOICE_LANGUAGE,
    VOICE_MIN_SPEECH_MS, VOICE_RECONNECT_BACKOFF_MS, VOICE_SILENCE_TIMEOUT_MS,
};
use secrecy::SecretString;
use std::env;
use std::time::Duration;
use voice_duplex_types::audio::DEFAULT_SAMPLE_RATE;

#[derive(Debug, Clone)]
pub struct VadConfig {
    /// RMS energy a frame must reach to count as voiced.
    pub threshold: f32,
    /// Consecutive voiced frames needed before `speechStart`.
    pub start_frames: usize,
    /// How long energy must stay below threshold before `speechEnd`.
    pub silence_timeout: Duration,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            start_frames: 2,
            silence_timeout: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BargeInConfig {
    pub min_speech: Duration,
    pub fillers: Vec<String>,
    pub stop_keywords: Vec<String>,
}

impl Default for BargeInConfig {
    fn default() -> Self {
        Self {
            min_speech: Duration::from_millis(300),
            fillers: FILLER_WORDS.iter().map(|w| w.to_string()).collect(),
            stop_keywords: STOP_KEYWORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    base_url: String,
    api_key: Option<SecretString>,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_backoff: Duration,
    pub synthesis_timeout: Duration,
    /// Outbound channel depth. Audio frames beyond it are dropped, not queued.
    pub outbound_capacity: usize,
    pub sample_rate: u32,
    pub language: Option<String>,
    pub voice: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
            api_key: None,
            reconnect_backoff: Duration::from_secs(2),
            synthesis_timeout: Duration::from_secs(10),
            outbound_capacity: 8,
            sample_rate: DEFAULT_SAMPLE_RATE,
            language: None,
            voice: None,
        }
    }
}

impl TransportConfig {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlaybackConfig {
    /// Request chunk N+1 as soon as chunk N starts playing.
    pub prefetch_next: bool,
}

#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    endpoint: String,
    api_key: Option<SecretString>,
    pub timeout: Duration,
    /// Conversation turns forwarded as session context.
    pub context_turns: usize,
    /// Spoken when the reasoning collaborator fails.
    pub apology: String,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_REASONING_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(30),
            context_turns: 10,
            apology: DEFAULT_APOLOGY.to_string(),
        }
    }
}

impl ReasoningConfig {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub vad: VadConfig,
    pub barge_in: BargeInConfig,
    pub transport: TransportConfig,
    pub playback: PlaybackConfig,
    pub reasoning: ReasoningConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: String, value: String },
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_backend_url(mut self, base_url: &str) -> Self {
        self.config.transport.base_url = base_url.to_string();
        self
    }

    pub fn with_backend_api_key(mut self, api_key: &str) -> Self {
        self.config.transport.api_key = Some(SecretString::from(api_key.to_string()));
        self
    }

    pub fn with_reasoning_url(mut self, endpoint: &str) -> Self {
        self.config.reasoning.endpoint = endpoint.to_string();
        self
    }

    pub fn with_reasoning_api_key(mut self, api_key: &str) -> Self {
        self.config.reasoning.api_key = Some(SecretString::from(api_key.to_string()));
        self
    }

    pub fn with_silence_timeout(mut self, timeout: Duration) -> Self {
        self.config.vad.silence_timeout = timeout;
        self
    }

    pub fn with_vad_threshold(mut self, threshold: f32) -> Self {
        self.config.vad.threshold = threshold;
        self
    }

    pub fn with_min_speech(mut self, min_speech: Duration) -> Self {
        self.config.barge_in.min_speech = min_speech;
        self
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.config.transport.reconnect_backoff = backoff;
        self
    }

    pub fn with_synthesis_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.synthesis_timeout = timeout;
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.config.transport.language = Some(language.to_string());
        self
    }

    pub fn with_voice(mut self, voice: &str) -> Self {
        self.config.transport.voice = Some(voice.to_string());
        self
    }

    pub fn with_prefetch(mut self, prefetch_next: bool) -> Self {
        self.config.playback.prefetch_next = prefetch_next;
        self
    }

    pub fn with_apology(mut self, apology: &str) -> Self {
        self.config.reasoning.apology = apology.to_string();
        self
    }

    pub fn with_context_turns(mut self, turns: usize) -> Self {
        self.config.reasoning.context_turns = turns;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Continues building from this configuration.
    pub fn into_builder(self) -> ConfigBuilder {
        ConfigBuilder { config: self }
    }

    /// Loads configuration from environment variables, falling back to defaults.
    ///
    // *   `VOICE_BACKEND_URL`: WebSocket URL of the speech backend.
    // *   `VOICE_BACKEND_API_KEY`: (Optional) bearer token for the speech backend.
    // *   `REASONING_URL`: chat endpoint of the reasoning collaborator.
    // *   `REASONING_API_KEY`: (Optional) bearer token for the reasoning collaborator.
    // *   `VOICE_SILENCE_TIMEOUT_MS`, `VOICE_MIN_SPEECH_MS`, `VOICE_RECONNECT_BACKOFF_MS`: timer tuning.
    // *   `VOICE_LANGUAGE`: (Optional) recognition language hint.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is ignored if not present.
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Ok(url) = env::var(VOICE_BACKEND_URL) {
            builder = builder.with_backend_url(&url);
        }
        if let Ok(key) = env::var(VOICE_BACKEND_API_KEY) {
            builder = builder.with_backend_api_key(&key);
        }
        if let Ok(url) = env::var(REASONING_URL) {
            builder = builder.with_reasoning_url(&url);
        }
        if let Ok(key) = env::var(REASONING_API_KEY) {
            builder = builder.with_reasoning_api_key(&key);
        }
        if let Ok(language) = env::var(VOICE_LANGUAGE) {
            builder = builder.with_language(&language);
        }
        if let Some(timeout) = millis_var(VOICE_SILENCE_TIMEOUT_MS)? {
            builder = builder.with_silence_timeout(timeout);
        }
        if let Some(min_speech) = millis_var(VOICE_MIN_SPEECH_MS)? {
            builder = builder.with_min_speech(min_speech);
        }
        if let Some(backoff) = millis_var(VOICE_RECONNECT_BACKOFF_MS)? {
            builder = builder.with_reconnect_backoff(backoff);
        }
        Ok(builder.build())
    }
}

fn millis_var(var: &str) -> Result<Option<Duration>, ConfigError> {
    match env::var(var) {
        Ok(value) => parse_millis(var, &value).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_millis(var: &str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn defaults_keep_ambient_noise_below_threshold() {
        let config = Config::default();
        assert!(config.vad.threshold > 0.005);
        assert_eq!(config.vad.silence_timeout, Duration::from_millis(1500));
        assert_eq!(config.barge_in.min_speech, Duration::from_millis(300));
        assert!(!config.playback.prefetch_next);
        assert!(config.transport.api_key().is_none());
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = Config::builder()
            .with_backend_url("wss://speech.example/v1")
            .with_backend_api_key("secret")
            .with_silence_timeout(Duration::from_secs(2))
            .with_reconnect_backoff(Duration::from_millis(500))
            .build();

        assert_eq!(config.transport.base_url(), "wss://speech.example/v1");
        assert_eq!(
            config.transport.api_key().map(|k| k.expose_secret().to_string()),
            Some("secret".to_string())
        );
        assert_eq!(config.vad.silence_timeout, Duration::from_secs(2));
        assert_eq!(config.transport.reconnect_backoff, Duration::from_millis(500));
    }

    #[test]
    fn into_builder_keeps_existing_values() {
        let config = Config::builder()
            .with_backend_api_key("secret")
            .with_min_speech(Duration::from_millis(450))
            .build()
            .into_builder()
            .with_backend_url("ws://localhost:9000")
            .build();

        assert_eq!(config.transport.base_url(), "ws://localhost:9000");
        assert!(config.transport.api_key().is_some());
        assert_eq!(config.barge_in.min_speech, Duration::from_millis(450));
    }

    #[test]
    fn millis_parsing_rejects_garbage() {
        assert_eq!(
            parse_millis("X", " 250 ").unwrap(),
            Duration::from_millis(250)
        );
        assert!(matches!(
            parse_millis("X", "soon"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
