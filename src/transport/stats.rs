#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    frames_sent: u64,
    frames_dropped: u64,
    events_received: u64,
    reconnect_attempts: u64,
    connects: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_frame_sent(&mut self) {
        self.frames_sent += 1;
    }

    pub(crate) fn record_frame_dropped(&mut self) {
        self.frames_dropped += 1;
    }

    pub(crate) fn record_event(&mut self) {
        self.events_received += 1;
    }

    pub(crate) fn record_reconnect_attempt(&mut self) {
        self.reconnect_attempts += 1;
    }

    pub(crate) fn record_connect(&mut self) {
        self.connects += 1;
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Audio frames discarded because the outbound channel was full.
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    pub fn events_received(&self) -> u64 {
        self.events_received
    }

    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts
    }

    pub fn connects(&self) -> u64 {
        self.connects
    }
}
