use std::env;
use std::str::FromStr;
use std::time::Duration;

use meeting_audio_core::models::config::{DEFAULT_CHANNELS, DEFAULT_SAMPLE_RATE, DEFAULT_SUBSCRIBER_BUFFER};

pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

/// Listener address, the audio format advertised to clients, and WebSocket
/// timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfiguration {
    pub http_addr: String,

    pub audio_sample_rate: u32,
    pub audio_channels: u16,

    /// Bus queue per WebSocket client, unless the client passes `queue_size`.
    pub subscriber_buffer: usize,

    /// Per-message write deadline.
    pub write_timeout: Duration,

    /// A client that sends nothing (not even a pong) for this long is dropped.
    pub read_timeout: Duration,

    pub ping_interval: Duration,

    /// PCM is aggregated per (node, type) and sent once per interval.
    pub audio_flush_interval: Duration,

    /// Bus subscribers that accepted no frame for this long are swept.
    /// `Duration::ZERO` disables the sweep.
    pub subscriber_idle_timeout: Duration,
}

impl Default for ServerConfiguration {
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.into(),
            audio_sample_rate: DEFAULT_SAMPLE_RATE,
            audio_channels: DEFAULT_CHANNELS,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            write_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(180),
            ping_interval: Duration::from_secs(60),
            audio_flush_interval: Duration::from_millis(100),
            subscriber_idle_timeout: Duration::from_secs(600),
        }
    }
}

impl ServerConfiguration {
    /// Defaults overlaid with `HTTP_ADDR`, `AUDIO_SAMPLE_RATE`,
    /// `AUDIO_CHANNELS`, `WEBSOCKET_WRITE_TIMEOUT`, `WEBSOCKET_READ_TIMEOUT`,
    /// `WEBSOCKET_PING_INTERVAL` (seconds), `WEBSOCKET_AUDIO_FLUSH_INTERVAL`
    /// (milliseconds) and `SUBSCRIBER_IDLE_TIMEOUT` (seconds).
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR").filter(|v| !v.is_empty()) {
            cfg.http_addr = normalize_addr(&addr);
        }
        if let Some(rate) = parse_var(&lookup, "AUDIO_SAMPLE_RATE") {
            cfg.audio_sample_rate = rate;
        }
        if let Some(channels) = parse_var(&lookup, "AUDIO_CHANNELS") {
            cfg.audio_channels = channels;
        }
        if let Some(secs) = parse_var(&lookup, "WEBSOCKET_WRITE_TIMEOUT") {
            cfg.write_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "WEBSOCKET_READ_TIMEOUT") {
            cfg.read_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "WEBSOCKET_PING_INTERVAL") {
            cfg.ping_interval = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var(&lookup, "WEBSOCKET_AUDIO_FLUSH_INTERVAL") {
            cfg.audio_flush_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var(&lookup, "SUBSCRIBER_IDLE_TIMEOUT") {
            cfg.subscriber_idle_timeout = Duration::from_secs(secs);
        }
        cfg
    }
}

/// `:8080` means every interface.
pub fn normalize_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
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
