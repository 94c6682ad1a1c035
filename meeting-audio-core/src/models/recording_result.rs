use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::audio_models::AudioType;

/// Result returned when a recording is finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub duration_secs: f64,
    pub metadata: RecordingMetadata,
    pub checksum: String,
}

/// Metadata stored alongside a recording as a JSON sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub id: String,
    pub meeting_id: String,
    pub audio_type: AudioType,
    /// Set when the recording follows a single speaker.
    pub node_id: Option<u32>,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub file_path: String,
    pub checksum: String,
    pub created_at: String,
}

impl RecordingMetadata {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        meeting_id: &str,
        audio_type: AudioType,
        node_id: Option<u32>,
        duration_secs: f64,
        sample_rate: u32,
        channels: u16,
        file_path: &str,
        checksum: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            meeting_id: meeting_id.to_string(),
            audio_type,
            node_id,
            duration_secs,
            sample_rate,
            channels,
            file_path: file_path.to_string(),
            checksum: checksum.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
