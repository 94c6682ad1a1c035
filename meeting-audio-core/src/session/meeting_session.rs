use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use crate::bus::audio_bus::AudioBus;
use crate::models::audio_models::{AudioFrame, MeetingStats};
use crate::models::config::{MeetingConfiguration, DEFAULT_FRAME_QUEUE_CAPACITY};
use crate::models::error::MeetingError;
use crate::models::state::MeetingStatus;
use crate::processing::ring_buffer::RingBuffer;
use crate::traits::meeting_backend::{AudioFrameCallback, MeetingBackend};
use crate::traits::session_delegate::SessionDelegate;

const PROCESSING_INTERVAL: Duration = Duration::from_millis(10);

/// Internal mutable session state, protected by `parking_lot::Mutex`.
struct SessionState {
    status: MeetingStatus,
    stats: MeetingStats,
    last_error: Option<MeetingError>,
    unreported_drops: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            status: MeetingStatus::Idle,
            stats: MeetingStats::new(),
            last_error: None,
            unreported_drops: 0,
        }
    }
}

/// One joined meeting: backend connection, frame queue, and bus publishing.
///
/// Data flow:
/// ```text
/// [native thread] → callback → [RingBuffer] → [processing thread] → [AudioBus]
/// ```
/// The callback only copies into the ring buffer, so the native thread is
/// never blocked by subscribers.
pub struct MeetingSession<B: MeetingBackend> {
    config: MeetingConfiguration,
    backend: B,
    bus: AudioBus,
    session_state: Arc<Mutex<SessionState>>,
    delegate: Option<Arc<dyn SessionDelegate>>,

    // Shared between the backend callback and the processing thread
    frame_queue: Arc<Mutex<RingBuffer<AudioFrame>>>,

    processing_running: Arc<AtomicBool>,
    processing_handle: Option<thread::JoinHandle<()>>,
}

impl<B: MeetingBackend> MeetingSession<B> {
    pub fn new(config: MeetingConfiguration, backend: B, bus: AudioBus) -> Self {
        Self::with_queue_capacity(config, backend, bus, DEFAULT_FRAME_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(
        config: MeetingConfiguration,
        backend: B,
        bus: AudioBus,
        queue_capacity: usize,
    ) -> Self {
        Self {
            config,
            backend,
            bus,
            session_state: Arc::new(Mutex::new(SessionState::new())),
            delegate: None,
            frame_queue: Arc::new(Mutex::new(RingBuffer::new(queue_capacity))),
            processing_running: Arc::new(AtomicBool::new(false)),
            processing_handle: None,
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn SessionDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn meeting_id(&self) -> &str {
        &self.config.meeting_id
    }

    pub fn config(&self) -> &MeetingConfiguration {
        &self.config
    }

    pub fn status(&self) -> MeetingStatus {
        self.session_state.lock().status
    }

    pub fn stats(&self) -> MeetingStats {
        self.session_state.lock().stats.clone()
    }

    pub fn last_error(&self) -> Option<MeetingError> {
        self.session_state.lock().last_error.clone()
    }

    /// Join the meeting. Transitions: idle → connecting → in_meeting (or failed).
    pub fn join(&mut self) -> Result<(), MeetingError> {
        if !self.status().is_idle() {
            return Err(MeetingError::InvalidState(
                "can only join from idle state".into(),
            ));
        }

        self.config.validate()?;

        if !self.backend.is_available() {
            let err = MeetingError::BackendUnavailable(self.backend.backend_name().to_string());
            self.fail(err.clone());
            return Err(err);
        }

        log::info!(
            "Joining meeting {} via {}",
            self.config.meeting_id,
            self.backend.backend_name()
        );
        self.set_status(MeetingStatus::Connecting);
        self.session_state.lock().stats = MeetingStats::new();
        self.frame_queue.lock().clear();

        if let Err(e) = self.start_processing_loop() {
            self.fail(e.clone());
            return Err(e);
        }

        let callback = self.frame_callback();
        if let Err(e) = self.backend.join(&self.config, callback) {
            self.stop_processing_loop();
            let _ = self.backend.leave();
            self.fail(e.clone());
            return Err(e);
        }

        self.set_status(MeetingStatus::InMeeting);
        log::info!("Joined meeting: {}", self.config.meeting_id);
        Ok(())
    }

    /// Leave the meeting. Transitions: in_meeting → leaving → ended.
    ///
    /// A no-op for sessions that never joined or already ended.
    pub fn leave(&mut self) -> Result<(), MeetingError> {
        if !self.status().is_active() {
            return Ok(());
        }

        log::info!("Leaving meeting: {}", self.config.meeting_id);
        self.set_status(MeetingStatus::Leaving);

        // Backend first: once it returns no callback can push another frame.
        let result = self.backend.leave();

        self.stop_processing_loop();
        publish_pending(
            &self.config.meeting_id,
            &self.frame_queue,
            &self.bus,
            &self.session_state,
        );

        if let Err(ref e) = result {
            log::error!("Error leaving meeting {}: {}", self.config.meeting_id, e);
            self.session_state.lock().last_error = Some(e.clone());
            if let Some(ref delegate) = self.delegate {
                delegate.on_error(&self.config.meeting_id, e);
            }
        }

        self.set_status(MeetingStatus::Ended);
        log::info!("Meeting session ended: {}", self.config.meeting_id);
        result
    }

    // --- Internal helpers ---

    fn set_status(&self, status: MeetingStatus) {
        self.session_state.lock().status = status;
        log::debug!("Meeting {} status: {}", self.config.meeting_id, status);
        if let Some(ref delegate) = self.delegate {
            delegate.on_status_changed(&self.config.meeting_id, status);
        }
    }

    fn fail(&self, error: MeetingError) {
        log::error!("Meeting {} failed: {}", self.config.meeting_id, error);
        self.session_state.lock().last_error = Some(error.clone());
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(&self.config.meeting_id, &error);
        }
        self.set_status(MeetingStatus::Failed);
    }

    /// The callback handed to the backend. Runs on a native thread.
    fn frame_callback(&self) -> AudioFrameCallback {
        let queue = Arc::clone(&self.frame_queue);
        let state = Arc::clone(&self.session_state);

        Arc::new(move |frame: AudioFrame| {
            let bytes = frame.data.len() as u64;
            let dropped = queue.lock().push(frame) as u64;

            let mut s = state.lock();
            s.stats.frames_received += 1;
            s.stats.bytes_received += bytes;
            s.stats.last_frame_at = Some(Utc::now());
            if dropped > 0 {
                s.stats.frames_dropped += dropped;
                s.unreported_drops += dropped;
            }
        })
    }

    /// Start the background loop that moves queued frames onto the bus.
    fn start_processing_loop(&mut self) -> Result<(), MeetingError> {
        self.processing_running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.processing_running);
        let queue = Arc::clone(&self.frame_queue);
        let state = Arc::clone(&self.session_state);
        let bus = self.bus.clone();
        let delegate = self.delegate.clone();
        let meeting_id = self.config.meeting_id.clone();

        let handle = thread::Builder::new()
            .name(format!("meeting-audio-{}", meeting_id))
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    thread::sleep(PROCESSING_INTERVAL);

                    publish_pending(&meeting_id, &queue, &bus, &state);

                    let drops = std::mem::take(&mut state.lock().unreported_drops);
                    if drops > 0 {
                        log::warn!("Dropped {} audio frames for meeting {}", drops, meeting_id);
                        if let Some(ref d) = delegate {
                            d.on_frames_dropped(&meeting_id, drops);
                        }
                    }
                }
            })
            .map_err(|e| {
                self.processing_running.store(false, Ordering::SeqCst);
                MeetingError::Unknown(format!("failed to spawn processing thread: {}", e))
            })?;

        self.processing_handle = Some(handle);
        Ok(())
    }

    fn stop_processing_loop(&mut self) {
        self.processing_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.processing_handle.take() {
            let _ = handle.join();
        }
    }
}

/// Drain the queue and publish each frame; bus rejections count as drops.
fn publish_pending(
    meeting_id: &str,
    queue: &Mutex<RingBuffer<AudioFrame>>,
    bus: &AudioBus,
    state: &Mutex<SessionState>,
) {
    let frames = queue.lock().drain_all();
    if frames.is_empty() {
        return;
    }

    let mut rejected = 0u64;
    for frame in frames {
        if !bus.publish(meeting_id, Arc::new(frame)) {
            rejected += 1;
        }
    }

    if rejected > 0 {
        let mut s = state.lock();
        s.stats.frames_dropped += rejected;
        s.unreported_drops += rejected;
    }
}

impl<B: MeetingBackend> Drop for MeetingSession<B> {
    fn drop(&mut self) {
        if let Err(e) = self.leave() {
            log::error!("Error leaving meeting {} on drop: {}", self.config.meeting_id, e);
        }
        self.stop_processing_loop();
    }
}
