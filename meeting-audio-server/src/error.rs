use thiserror::Error;

use meeting_audio_core::models::error::MeetingError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("request timed out")]
    Timeout,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Meeting(#[from] MeetingError),
}

/// HTTP status for a manager error surfaced through the REST API.
pub fn status_for(error: &MeetingError) -> u16 {
    match error {
        MeetingError::MeetingNotFound(_) => 404,
        MeetingError::MeetingExists(_) | MeetingError::InvalidState(_) => 409,
        MeetingError::ConfigurationFailed(_) | MeetingError::InvalidArgument(_) => 400,
        MeetingError::BackendUnavailable(_) => 503,
        _ => 500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_errors_map_to_statuses() {
        assert_eq!(status_for(&MeetingError::MeetingNotFound("1".into())), 404);
        assert_eq!(status_for(&MeetingError::MeetingExists("1".into())), 409);
        assert_eq!(status_for(&MeetingError::ConfigurationFailed("x".into())), 400);
        assert_eq!(status_for(&MeetingError::JoinFailed("1".into())), 500);
    }
}
