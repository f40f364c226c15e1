//! Decides whether speech heard while the assistant talks is a real interruption.
//!
//! Evaluation order for every partial transcript:
//! 1. filler-only text is ignored and never opens or extends a window;
//! 2. a stop keyword confirms immediately;
//! 3. otherwise the window's speech must last `min_speech` to confirm.
//!
//! A window resolves at most once: confirming or discarding takes it out of the detector.

use crate::config::BargeInConfig;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BargeInTrigger {
    /// An explicit stop word was heard.
    Keyword(String),
    /// Non-filler speech lasted at least this long.
    SustainedSpeech(Duration),
    /// The host called `interrupt()`.
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Ignored,
    /// A window is open; re-evaluate at `deadline`.
    Pending { deadline: Instant },
    Confirmed(BargeInTrigger),
}

#[derive(Debug, Clone)]
pub struct BargeInWindow {
    speech_start_time: Instant,
    accumulated_text: String,
}

impl BargeInWindow {
    pub fn speech_start_time(&self) -> Instant {
        self.speech_start_time
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }
}

pub struct BargeInDetector {
    config: BargeInConfig,
    active: bool,
    window: Option<BargeInWindow>,
    /// When the VAD last reported speech starting during this speaking turn.
    vad_speech_since: Option<Instant>,
}

impl BargeInDetector {
    pub fn new(config: BargeInConfig) -> Self {
        Self {
            config,
            active: false,
            window: None,
            vad_speech_since: None,
        }
    }

    /// Starts watching; called when the assistant begins speaking.
    pub fn arm(&mut self) {
        self.active = true;
        self.window = None;
        self.vad_speech_since = None;
    }

    /// Stops watching and drops any open window without effect.
    pub fn disarm(&mut self) {
        if self.window.take().is_some() {
            tracing::debug!("Barge-in window discarded: assistant stopped speaking");
        }
        self.active = false;
        self.vad_speech_since = None;
    }

    pub fn is_armed(&self) -> bool {
        self.active
    }

    pub fn window(&self) -> Option<&BargeInWindow> {
        self.window.as_ref()
    }

    /// VAD speech start. Times the next window unless a filler-only partial follows it.
    pub fn on_speech_start(&mut self, now: Instant) {
        if self.active && self.vad_speech_since.is_none() {
            self.vad_speech_since = Some(now);
        }
    }

    /// The user fell silent. Returns `true` if an open window was discarded.
    pub fn on_speech_end(&mut self) -> bool {
        self.vad_speech_since = None;
        let discarded = self.window.take().is_some();
        if discarded {
            tracing::debug!("Barge-in window discarded: user fell silent");
        }
        discarded
    }

    pub fn on_partial(&mut self, text: &str, now: Instant) -> Verdict {
        if !self.active {
            return Verdict::Ignored;
        }
        let words = normalize(text);
        if words.is_empty() || self.is_filler(&words) {
            tracing::trace!("Ignoring filler partial {:?}", text);
            // Speech heard so far was filler; only a later VAD start may time the window.
            if self.window.is_none() {
                self.vad_speech_since = None;
            }
            return Verdict::Ignored;
        }
        if let Some(keyword) = self.stop_keyword(&words) {
            self.window = None;
            return Verdict::Confirmed(BargeInTrigger::Keyword(keyword));
        }

        let start = self.vad_speech_since.unwrap_or(now).min(now);
        let window = self.window.get_or_insert_with(|| BargeInWindow {
            speech_start_time: start,
            accumulated_text: String::new(),
        });
        window.accumulated_text = text.trim().to_string();
        self.evaluate(now)
    }

    /// Called when the pending deadline elapses.
    pub fn on_deadline(&mut self, now: Instant) -> Verdict {
        if !self.active {
            return Verdict::Ignored;
        }
        self.evaluate(now)
    }

    fn evaluate(&mut self, now: Instant) -> Verdict {
        let Some(window) = self.window.as_ref() else {
            return Verdict::Ignored;
        };
        let elapsed = now.saturating_duration_since(window.speech_start_time);
        if elapsed >= self.config.min_speech {
            self.window = None;
            Verdict::Confirmed(BargeInTrigger::SustainedSpeech(elapsed))
        } else {
            Verdict::Pending {
                deadline: window.speech_start_time + self.config.min_speech,
            }
        }
    }

    fn is_filler(&self, words: &[String]) -> bool {
        words
            .iter()
            .all(|w| self.config.fillers.iter().any(|f| f == w))
    }

    fn stop_keyword(&self, words: &[String]) -> Option<String> {
        let padded = format!(" {} ", words.join(" "));
        self.config
            .stop_keywords
            .iter()
            .find(|kw| padded.contains(&format!(" {} ", kw.to_lowercase())))
            .cloned()
    }
}

fn normalize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-'))
        .map(|w| w.trim_matches(|c| c == '\'' || c == '-').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}
