pub mod client;
pub mod server;

use client::*;
use server::*;

/// Control events sent to the speech backend as JSON text frames.
///
/// Captured audio does not travel as an event; it is streamed as raw binary frames.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.start")]
    SessionStart(SessionStartEvent),
    #[serde(rename = "input_audio.commit")]
    InputAudioCommit(InputAudioCommitEvent),
    #[serde(rename = "synthesis.request")]
    SynthesisRequest(SynthesisRequestEvent),
    #[serde(rename = "synthesis.cancel")]
    SynthesisCancel(SynthesisCancelEvent),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "transcript.partial")]
    PartialText(TranscriptEvent),
    #[serde(rename = "transcript.final")]
    FinalText(TranscriptEvent),
    #[serde(rename = "synthesis.audio")]
    SynthesizedAudio(SynthesizedAudioEvent),
    #[serde(rename = "status")]
    StatusUpdate(StatusUpdateEvent),
    #[serde(rename = "error")]
    ErrorNotice(ErrorEvent),
}

impl ServerEvent {
    /// Wire name of the event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::PartialText(_) => "transcript.partial",
            ServerEvent::FinalText(_) => "transcript.final",
            ServerEvent::SynthesizedAudio(_) => "synthesis.audio",
            ServerEvent::StatusUpdate(_) => "status",
            ServerEvent::ErrorNotice(_) => "error",
        }
    }
}
