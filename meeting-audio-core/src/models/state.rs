use std::fmt;

use serde::{Deserialize, Serialize};

/// Meeting session state machine.
///
/// State transitions:
/// ```text
/// idle → connecting → in_meeting → leaving → ended
///            ↓
///          failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Idle,
    Connecting,
    InMeeting,
    Leaving,
    Ended,
    Failed,
}

impl MeetingStatus {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Native resources are (or are being) held.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::InMeeting | Self::Leaving)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::InMeeting => "in_meeting",
            Self::Leaving => "leaving",
            Self::Ended => "ended",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(MeetingStatus::Idle.is_idle());
        assert!(MeetingStatus::InMeeting.is_active());
        assert!(!MeetingStatus::Ended.is_active());
        assert!(MeetingStatus::Failed.is_terminal());
        assert!(!MeetingStatus::Leaving.is_terminal());
    }

    #[test]
    fn display_matches_serde() {
        let json = serde_json::to_string(&MeetingStatus::InMeeting).unwrap();
        assert_eq!(json, format!("\"{}\"", MeetingStatus::InMeeting));
    }
}
