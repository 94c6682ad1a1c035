use thiserror::Error;

use meeting_audio_core::models::error::MeetingError;

/// Failures at the `zoomsdk_c` boundary.
///
/// The native library reports only null handles and `ZOOM_SDK_ERROR`,
/// so these variants carry nothing beyond what the caller passed in.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ZoomError {
    #[error("zoom_sdk_create returned no handle")]
    SdkCreateFailed,

    #[error("zoom_meeting_create_and_join returned no handle for meeting {0}")]
    JoinFailed(String),

    #[error("zoom_meeting_set_audio_callback returned ZOOM_SDK_ERROR")]
    CallbackRejected,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("already joined meeting {0}")]
    AlreadyJoined(String),

    #[error("zoomsdk_c is not linked into this build (enable the `native` feature)")]
    NotLinked,
}

impl From<ZoomError> for MeetingError {
    fn from(e: ZoomError) -> Self {
        match e {
            ZoomError::SdkCreateFailed => MeetingError::SdkCreateFailed,
            ZoomError::JoinFailed(id) => MeetingError::JoinFailed(id),
            ZoomError::CallbackRejected => MeetingError::CallbackRejected,
            ZoomError::InvalidArgument(msg) => MeetingError::InvalidArgument(msg),
            ZoomError::AlreadyJoined(id) => MeetingError::InvalidState(format!("already joined meeting {}", id)),
            ZoomError::NotLinked => MeetingError::BackendUnavailable("zoomsdk_c is not linked".into()),
        }
    }
}
