use std::env;
use std::str::FromStr;

use super::error::MeetingError;

pub const DEFAULT_SAMPLE_RATE: u32 = 32000;
pub const DEFAULT_CHANNELS: u16 = 1;
pub const DEFAULT_FRAME_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Process-wide bot configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfiguration {
    pub sdk_key: String,
    pub sdk_secret: String,

    /// `log` filter for the binary (default: "info").
    pub log_level: String,

    /// Sample rate of the raw PCM delivered by the SDK (default: 32000).
    pub audio_sample_rate: u32,

    /// Channel count of the raw PCM (default: 1).
    pub audio_channels: u16,

    /// Frames buffered between the native callback and the bus, per meeting.
    pub frame_queue_capacity: usize,

    /// Frames buffered per bus subscriber before drops start.
    pub subscriber_buffer: usize,
}

impl BotConfiguration {
    /// Defaults overlaid with `ZOOM_SDK_KEY`, `ZOOM_SDK_SECRET`, `LOG_LEVEL`,
    /// `AUDIO_SAMPLE_RATE` and `AUDIO_CHANNELS`.
    ///
    /// Unparsable numeric values keep their default.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(key) = lookup("ZOOM_SDK_KEY").filter(|v| !v.is_empty()) {
            cfg.sdk_key = key;
        }
        if let Some(secret) = lookup("ZOOM_SDK_SECRET").filter(|v| !v.is_empty()) {
            cfg.sdk_secret = secret;
        }
        if let Some(level) = lookup("LOG_LEVEL").filter(|v| !v.is_empty()) {
            cfg.log_level = level;
        }
        if let Some(rate) = parse_var(&lookup, "AUDIO_SAMPLE_RATE") {
            cfg.audio_sample_rate = rate;
        }
        if let Some(channels) = parse_var(&lookup, "AUDIO_CHANNELS") {
            cfg.audio_channels = channels;
        }
        cfg
    }

    pub fn validate(&self) -> Result<(), MeetingError> {
        if self.sdk_key.is_empty() {
            return Err(MeetingError::MissingSdkKey);
        }
        if self.sdk_secret.is_empty() {
            return Err(MeetingError::MissingSdkSecret);
        }
        if self.audio_sample_rate == 0 {
            return Err(MeetingError::ConfigurationFailed(
                "sample rate must be positive".into(),
            ));
        }
        if ![1, 2].contains(&self.audio_channels) {
            return Err(MeetingError::ConfigurationFailed(format!(
                "unsupported channel count: {}",
                self.audio_channels
            )));
        }
        if self.frame_queue_capacity == 0 || self.subscriber_buffer == 0 {
            return Err(MeetingError::ConfigurationFailed(
                "queue capacities must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for BotConfiguration {
    fn default() -> Self {
        Self {
            sdk_key: String::new(),
            sdk_secret: String::new(),
            log_level: "info".into(),
            audio_sample_rate: DEFAULT_SAMPLE_RATE,
            audio_channels: DEFAULT_CHANNELS,
            frame_queue_capacity: DEFAULT_FRAME_QUEUE_CAPACITY,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring unparsable {}={:?}", name, raw);
            None
        }
    }
}

/// Parameters for joining a single meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingConfiguration {
    pub meeting_id: String,

    /// Meeting passcode; `None` (or empty) is passed to the SDK as NULL.
    pub password: Option<String>,

    /// Name shown to other participants; `None` lets the SDK choose.
    pub display_name: Option<String>,

    /// Request raw audio delivery for this meeting.
    pub enable_audio: bool,
}

impl MeetingConfiguration {
    pub fn new(meeting_id: impl Into<String>) -> Self {
        Self {
            meeting_id: meeting_id.into(),
            password: None,
            display_name: None,
            enable_audio: true,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.password = (!password.is_empty()).then_some(password);
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.display_name = (!name.is_empty()).then_some(name);
        self
    }

    pub fn with_audio(mut self, enable: bool) -> Self {
        self.enable_audio = enable;
        self
    }

    pub fn validate(&self) -> Result<(), MeetingError> {
        if self.meeting_id.trim().is_empty() {
            return Err(MeetingError::ConfigurationFailed("meeting id is required".into()));
        }
        Ok(())
    }
}
