//! Energy-based voice activity detection.

use crate::config::VadConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Observation {
    /// The frame's energy reached the threshold.
    pub voiced: bool,
    /// This frame completed the voiced run that starts speech.
    pub started: bool,
}

/// Tracks whether the user is speaking from per-frame RMS energy.
///
/// Speech starts after `start_frames` consecutive voiced frames. Ending speech is driven
/// from outside by the silence timer through [`VoiceActivityDetector::end_speech`].
#[derive(Debug, Clone)]
pub struct VoiceActivityDetector {
    threshold: f32,
    start_frames: usize,
    voiced_run: usize,
    speaking: bool,
}

impl VoiceActivityDetector {
    pub fn new(config: &VadConfig) -> Self {
        Self {
            threshold: config.threshold,
            start_frames: config.start_frames.max(1),
            voiced_run: 0,
            speaking: false,
        }
    }

    pub fn observe(&mut self, energy: f32) -> Observation {
        let voiced = energy >= self.threshold;
        if !voiced {
            self.voiced_run = 0;
            return Observation::default();
        }
        self.voiced_run = self.voiced_run.saturating_add(1);
        let started = !self.speaking && self.voiced_run >= self.start_frames;
        if started {
            self.speaking = true;
        }
        Observation { voiced, started }
    }

    /// Returns `true` if speech was in progress.
    pub fn end_speech(&mut self) -> bool {
        self.voiced_run = 0;
        std::mem::replace(&mut self.speaking, false)
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }
}
