use crate::barge_in::BargeInTrigger;
use crate::error::ErrorReport;
use crate::playback::{Utterance, UtteranceId};
use serde::Serialize;
use voice_duplex_types::StatusFlags;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationState {
    #[default]
    Idle,
    Listening,
    Processing,
    Speaking,
    /// Passed through on a confirmed barge-in, on the way back to `Listening`.
    Interrupted,
}

impl ConversationState {
    pub fn can_transition(self, to: ConversationState) -> bool {
        use ConversationState::*;
        matches!(
            (self, to),
            (Idle, Listening)
                | (Listening, Processing)
                | (Processing, Speaking)
                | (Processing, Listening)
                | (Speaking, Listening)
                | (Speaking, Interrupted)
                | (Interrupted, Listening)
                | (Listening | Processing | Speaking | Interrupted, Idle)
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Transcript {
    /// Latest unconfirmed recognition text.
    pub partial: String,
    /// Last confirmed utterance.
    pub final_text: String,
}

/// Read-only view of the session for UI binding.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: ConversationState,
    pub connected: bool,
    pub transcript: Transcript,
    pub volume_level: f32,
    pub is_speaking: bool,
    pub utterance: Option<Utterance>,
    pub backend_status: StatusFlags,
    pub last_error: Option<ErrorReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StateChanged {
        from: ConversationState,
        to: ConversationState,
    },
    PartialTranscript(String),
    FinalTranscript(String),
    ConnectionChanged {
        connected: bool,
    },
    BackendStatus(StatusFlags),
    BargeIn(BargeInTrigger),
    UtteranceStarted {
        id: UtteranceId,
        chunks: usize,
    },
    UtteranceFinished {
        id: UtteranceId,
        interrupted: bool,
    },
    Error(ErrorReport),
}

#[cfg(test)]
mod tests {
    use super::ConversationState::*;

    #[test]
    fn only_defined_transitions_are_valid() {
        assert!(Idle.can_transition(Listening));
        assert!(Processing.can_transition(Listening));
        assert!(Speaking.can_transition(Interrupted));
        assert!(Speaking.can_transition(Idle));

        assert!(!Idle.can_transition(Speaking));
        assert!(!Idle.can_transition(Idle));
        assert!(!Listening.can_transition(Speaking));
        assert!(!Interrupted.can_transition(Speaking));
        assert!(!Speaking.can_transition(Processing));
    }
}
