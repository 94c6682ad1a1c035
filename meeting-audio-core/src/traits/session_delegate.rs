use crate::models::error::MeetingError;
use crate::models::state::MeetingStatus;

/// Event delegate for meeting session notifications.
///
/// Status and error callbacks run on the thread driving the session;
/// `on_frames_dropped` runs on the session's processing thread.
pub trait SessionDelegate: Send + Sync {
    fn on_status_changed(&self, meeting_id: &str, status: MeetingStatus);

    fn on_error(&self, meeting_id: &str, error: &MeetingError);

    /// Called when the native callback outran the processing thread.
    fn on_frames_dropped(&self, _meeting_id: &str, _count: u64) {}
}
