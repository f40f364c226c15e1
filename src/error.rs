use serde::Serialize;

/// Failures the engine can observe. Nothing here crosses the host boundary as a fault;
/// the orchestrator converts them into [`ErrorReport`]s on the status channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoiceError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("transport is not connected")]
    NotConnected,
    #[error("transport closed: {0}")]
    TransportClosed(String),
    #[error("synthesis failed for chunk {chunk}: {reason}")]
    SynthesisFailed { chunk: String, reason: String },
    #[error("reasoning failed: {0}")]
    ReasoningFailed(String),
    #[error("playback failed: {0}")]
    PlaybackFailed(String),
    #[error("an utterance is already active")]
    PlaybackActive,
    #[error("reply text has nothing to speak")]
    EmptyUtterance,
    #[error("engine is missing a {0}")]
    MissingComponent(&'static str),
    #[error("engine has shut down")]
    EngineClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Capture,
    Transport,
    Synthesis,
    Reasoning,
    Playback,
    Engine,
}

impl VoiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VoiceError::PermissionDenied(_) | VoiceError::DeviceUnavailable(_) => ErrorKind::Capture,
            VoiceError::NotConnected | VoiceError::TransportClosed(_) => ErrorKind::Transport,
            VoiceError::SynthesisFailed { .. } => ErrorKind::Synthesis,
            VoiceError::ReasoningFailed(_) => ErrorKind::Reasoning,
            VoiceError::PlaybackFailed(_)
            | VoiceError::PlaybackActive
            | VoiceError::EmptyUtterance => ErrorKind::Playback,
            VoiceError::MissingComponent(_) | VoiceError::EngineClosed => ErrorKind::Engine,
        }
    }

    /// Permission and device problems need the user to act; retrying will not help.
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            VoiceError::PermissionDenied(_) | VoiceError::DeviceUnavailable(_)
        )
    }

    /// Errors the session recovers from on its own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VoiceError::NotConnected
                | VoiceError::TransportClosed(_)
                | VoiceError::SynthesisFailed { .. }
                | VoiceError::ReasoningFailed(_)
                | VoiceError::PlaybackFailed(_)
        )
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
            requires_user_action: self.requires_user_action(),
            transient: self.is_transient(),
        }
    }
}

/// Host-facing description of an error, published on the status channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    pub requires_user_action: bool,
    pub transient: bool,
}

impl ErrorReport {
    /// A backend `error` notice that is not tied to a synthesis request.
    pub fn backend_notice(message: &str) -> Self {
        Self {
            kind: ErrorKind::Transport,
            message: message.to_string(),
            requires_user_action: false,
            transient: true,
        }
    }
}
