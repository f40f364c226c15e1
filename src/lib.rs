mod audio;
mod barge_in;
mod capture;
mod config;
mod consts;
mod error;
mod orchestrator;
mod playback;
mod reasoning;
mod transport;

#[cfg(feature = "native-audio")]
pub mod native;

#[cfg(test)]
mod testing;

pub use voice_duplex_types as types;

pub use audio::{AudioClip, AudioFrame};
pub use barge_in::{BargeInDetector, BargeInTrigger, BargeInWindow, Verdict};
pub use capture::{AudioSource, Capture, CaptureEvent, Observation, VoiceActivityDetector};
pub use config::{
    BargeInConfig, Config, ConfigBuilder, ConfigError, PlaybackConfig, ReasoningConfig,
    TransportConfig, VadConfig,
};
pub use error::{ErrorKind, ErrorReport, VoiceError};
pub use orchestrator::{
    ConversationState, EngineBuilder, EngineEvent, EngineHandle, SessionSnapshot, Transcript,
};
pub use playback::{
    split_sentences, AudioSink, ChunkId, PlaybackEvent, PlaybackQueue, Synthesizer, Utterance,
    UtteranceId,
};
pub use reasoning::{ContextTurn, HttpReasoner, Reasoner, ReasoningRequest, Role, SessionContext};
pub use transport::{
    ConnectionState, Connector, Inbound, Link, Outbound, Stats, TransportEvent, TransportSession,
    WsConnector,
};

#[cfg(feature = "native-audio")]
pub use voice_duplex_utils as utils;
