use std::sync::Arc;

use crate::models::audio_models::AudioFrame;
use crate::models::config::MeetingConfiguration;
use crate::models::error::MeetingError;

/// Callback invoked for every audio frame the SDK delivers.
///
/// Runs on a thread owned by the native library: keep it short and never
/// block or call back into the backend that is delivering the frame.
pub type AudioFrameCallback = Arc<dyn Fn(AudioFrame) + Send + Sync + 'static>;

/// Interface for SDK-specific meeting connections.
///
/// Implemented by:
/// - `ZoomBackend` (meeting-audio-zoom)
pub trait MeetingBackend: Send {
    /// Whether the underlying SDK can be used in this build/process.
    fn is_available(&self) -> bool;

    /// Join the meeting, delivering audio via `callback` when
    /// `config.enable_audio` is set.
    fn join(
        &mut self,
        config: &MeetingConfiguration,
        callback: AudioFrameCallback,
    ) -> Result<(), MeetingError>;

    /// Leave the meeting and release every native resource. Idempotent.
    fn leave(&mut self) -> Result<(), MeetingError>;

    fn is_joined(&self) -> bool;

    /// Short identifier for logs.
    fn backend_name(&self) -> &str;
}

/// The SDK's process-wide event pump.
///
/// `run` blocks the calling thread and dispatches native callbacks until
/// `stop` is called from any other thread (or from inside a callback).
pub trait EventLoop: Send + Sync {
    fn run(&self);

    fn stop(&self);
}
