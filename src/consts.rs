pub const VOICE_BACKEND_URL: &str = "VOICE_BACKEND_URL";
pub const VOICE_BACKEND_API_KEY: &str = "VOICE_BACKEND_API_KEY";
pub const REASONING_URL: &str = "REASONING_URL";
pub const REASONING_API_KEY: &str = "REASONING_API_KEY";
pub const VOICE_SILENCE_TIMEOUT_MS: &str = "VOICE_SILENCE_TIMEOUT_MS";
pub const VOICE_MIN_SPEECH_MS: &str = "VOICE_MIN_SPEECH_MS";
pub const VOICE_RECONNECT_BACKOFF_MS: &str = "VOICE_RECONNECT_BACKOFF_MS";
pub const VOICE_LANGUAGE: &str = "VOICE_LANGUAGE";

pub const DEFAULT_BACKEND_URL: &str = "ws://127.0.0.1:8765/v1/duplex";
pub const DEFAULT_REASONING_URL: &str = "http://127.0.0.1:8000/api/chat";

pub const AUTHORIZATION_HEADER: &str = "Authorization";

pub const DEFAULT_APOLOGY: &str = "Sorry, I had trouble answering that. Could you say it again?";

/// Short interjections that never count as an interruption on their own.
pub const FILLER_WORDS: &[&str] = &[
    "uh", "um", "uhm", "umm", "er", "erm", "ah", "eh", "hmm", "hm", "mm", "mhm", "uh-huh", "oh",
];

/// Words and phrases that stop the assistant immediately.
pub const STOP_KEYWORDS: &[&str] = &[
    "stop",
    "cancel",
    "wait",
    "enough",
    "quiet",
    "pause",
    "hold on",
    "shut up",
    "be quiet",
    "never mind",
];
