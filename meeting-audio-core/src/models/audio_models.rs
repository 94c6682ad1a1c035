use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::MeetingError;

/// Size of the binary frame header: audio type (u64 LE) + node id (u64 LE).
pub const BINARY_FRAME_HEADER_SIZE: usize = 16;

/// Kind of raw audio delivered by the SDK.
///
/// Discriminants match the native `ZOOM_AUDIO_TYPE_*` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioType {
    /// All participants mixed into one stream.
    Mixed = 0,
    /// A single participant, identified by the frame's node id.
    OneWay = 1,
    /// Screen-share audio.
    Share = 2,
}

impl AudioType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mixed => "mixed",
            Self::OneWay => "one_way",
            Self::Share => "share",
        }
    }
}

impl TryFrom<i32> for AudioType {
    type Error = MeetingError;

    fn try_from(tag: i32) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Self::Mixed),
            1 => Ok(Self::OneWay),
            2 => Ok(Self::Share),
            other => Err(MeetingError::InvalidFrame(format!("unknown audio type tag: {}", other))),
        }
    }
}

impl fmt::Display for AudioType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One buffer of raw PCM (S16LE) audio copied out of the SDK.
///
/// The native buffer is only valid for the duration of the callback, so a
/// frame always owns its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub audio_type: AudioType,
    /// Speaker node id for one-way audio; 0 for mixed audio.
    pub node_id: u32,
    pub data: Vec<u8>,
}

impl AudioFrame {
    pub fn new(audio_type: AudioType, node_id: u32, data: Vec<u8>) -> Self {
        Self {
            audio_type,
            node_id,
            data,
        }
    }

    /// Serialize for streaming to clients.
    ///
    /// Layout:
    /// ```text
    /// [0-7]    audio type (u64 LE)
    /// [8-15]   node id (u64 LE)
    /// [16-..]  PCM payload
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BINARY_FRAME_HEADER_SIZE + self.data.len());
        buf.extend_from_slice(&(self.audio_type as u64).to_le_bytes());
        buf.extend_from_slice(&(self.node_id as u64).to_le_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }

    /// Parse a buffer produced by [`AudioFrame::encode`].
    pub fn decode(buf: &[u8]) -> Result<Self, MeetingError> {
        if buf.len() < BINARY_FRAME_HEADER_SIZE {
            return Err(MeetingError::InvalidFrame(format!(
                "frame too short: {} bytes",
                buf.len()
            )));
        }

        let mut word = [0u8; 8];
        word.copy_from_slice(&buf[0..8]);
        let tag = u64::from_le_bytes(word);
        word.copy_from_slice(&buf[8..16]);
        let node_id = u64::from_le_bytes(word);

        let tag = i32::try_from(tag)
            .map_err(|_| MeetingError::InvalidFrame(format!("unknown audio type tag: {}", tag)))?;
        let node_id = u32::try_from(node_id)
            .map_err(|_| MeetingError::InvalidFrame(format!("node id out of range: {}", node_id)))?;

        Ok(Self {
            audio_type: AudioType::try_from(tag)?,
            node_id,
            data: buf[BINARY_FRAME_HEADER_SIZE..].to_vec(),
        })
    }

    /// Number of 16-bit samples in the payload (all channels).
    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }
}

/// Per-meeting audio counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingStats {
    pub started_at: DateTime<Utc>,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub bytes_received: u64,
    pub last_frame_at: Option<DateTime<Utc>>,
}

impl MeetingStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            frames_received: 0,
            frames_dropped: 0,
            bytes_received: 0,
            last_frame_at: None,
        }
    }
}

impl Default for MeetingStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Fan-out counters for the audio bus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusStats {
    pub total_frames: u64,
    pub dropped_frames: u64,
    pub active_subscribers: usize,
    pub last_frame_at: Option<DateTime<Utc>>,
}
