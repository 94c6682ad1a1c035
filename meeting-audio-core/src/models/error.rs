use thiserror::Error;

/// Errors surfaced by meeting sessions, the audio bus, and recording.
///
/// Native failures carry no detail beyond success/failure, so the
/// SDK-facing variants hold only the context the caller supplied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeetingError {
    #[error("SDK key is required (set ZOOM_SDK_KEY or --sdk-key)")]
    MissingSdkKey,

    #[error("SDK secret is required (set ZOOM_SDK_SECRET or --sdk-secret)")]
    MissingSdkSecret,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("failed to create SDK session")]
    SdkCreateFailed,

    #[error("failed to join meeting {0}")]
    JoinFailed(String),

    #[error("audio callback registration rejected")]
    CallbackRejected,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid audio frame: {0}")]
    InvalidFrame(String),

    #[error("meeting {0} already exists")]
    MeetingExists(String),

    #[error("meeting {0} not found")]
    MeetingNotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}
