//! JSON bodies and WebSocket control messages.
//!
//! Binary WebSocket messages carry [`AudioFrame::encode`] output:
//!
//! ```text
//! [0-7]    audio type (u64 LE)
//! [8-15]   node id (u64 LE)
//! [16-..]  S16LE PCM
//! ```
//!
//! [`AudioFrame::encode`]: meeting_audio_core::models::audio_models::AudioFrame::encode

use serde::{Deserialize, Serialize};

use meeting_audio_core::bus::audio_bus::SubscriberFilter;
use meeting_audio_core::models::audio_models::{AudioType, MeetingStats};
use meeting_audio_core::models::config::MeetingConfiguration;
use meeting_audio_core::models::state::MeetingStatus;

/// First text message on every audio stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormatMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: String,
}

impl AudioFormatMessage {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            kind: "audio_format".into(),
            sample_rate,
            channels,
            sample_format: "s16le".into(),
        }
    }
}

/// Sent before the server closes a stream on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl ErrorMessage {
    pub fn new(error: impl Into<String>, code: Option<u16>) -> Self {
        Self {
            kind: "error".into(),
            error: error.into(),
            code,
        }
    }
}

/// `POST /api/meetings` body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JoinMeetingRequest {
    pub meeting_id: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_true")]
    pub enable_audio: bool,
}

fn default_true() -> bool {
    true
}

impl JoinMeetingRequest {
    pub fn into_configuration(self) -> MeetingConfiguration {
        MeetingConfiguration::new(self.meeting_id)
            .with_password(self.password)
            .with_display_name(self.display_name)
            .with_audio(self.enable_audio)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeetingSummary {
    pub meeting_id: String,
    pub status: MeetingStatus,
}

/// `GET /api/meetings/{id}` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeetingDetail {
    pub meeting_id: String,
    pub status: MeetingStatus,
    pub stats: Option<MeetingStats>,
}

/// Per-connection options from the audio stream's query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    pub meeting_id: String,
    pub audio_types: Vec<AudioType>,
    pub node_ids: Vec<u32>,
    pub queue_size: usize,
}

impl StreamOptions {
    /// Parse `type=mixed&type=one_way&user_id=16778240&queue_size=500`.
    ///
    /// Unknown types and unparsable ids are skipped, so a client that asks
    /// only for garbage gets every frame of the meeting.
    pub fn parse(meeting_id: &str, query: &str, default_queue: usize) -> Self {
        let mut options = Self {
            meeting_id: meeting_id.to_string(),
            audio_types: Vec::new(),
            node_ids: Vec::new(),
            queue_size: default_queue,
        };

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "type" => match value.as_ref() {
                    "mixed" => options.audio_types.push(AudioType::Mixed),
                    "one_way" => options.audio_types.push(AudioType::OneWay),
                    "share" => options.audio_types.push(AudioType::Share),
                    other => log::debug!("Ignoring unknown audio type filter {:?}", other),
                },
                "user_id" => match value.parse() {
                    Ok(id) => options.node_ids.push(id),
                    Err(_) => log::debug!("Ignoring unparsable user_id {:?}", value),
                },
                "queue_size" => {
                    if let Ok(size) = value.parse::<usize>() {
                        options.queue_size = size.max(1);
                    }
                }
                _ => {}
            }
        }
        options
    }

    pub fn filter(&self) -> SubscriberFilter {
        SubscriberFilter::for_meeting(self.meeting_id.clone())
            .with_audio_types(self.audio_types.iter().copied())
            .with_node_ids(self.node_ids.iter().copied())
    }
}
