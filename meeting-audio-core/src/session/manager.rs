use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::bus::audio_bus::AudioBus;
use crate::models::audio_models::MeetingStats;
use crate::models::config::{MeetingConfiguration, DEFAULT_FRAME_QUEUE_CAPACITY};
use crate::models::error::MeetingError;
use crate::models::state::MeetingStatus;
use crate::session::meeting_session::MeetingSession;
use crate::traits::meeting_backend::{EventLoop, MeetingBackend};
use crate::traits::session_delegate::SessionDelegate;

/// Builds a fresh backend for each meeting.
pub type BackendFactory<B> =
    Box<dyn Fn(&MeetingConfiguration) -> Result<B, MeetingError> + Send + Sync>;

struct RunningLoop {
    event_loop: Arc<dyn EventLoop>,
    handle: thread::JoinHandle<()>,
}

/// Runs any number of meetings in-process, all publishing to one bus.
pub struct MeetingManager<B: MeetingBackend + 'static> {
    meetings: Mutex<HashMap<String, MeetingSession<B>>>,
    factory: BackendFactory<B>,
    bus: AudioBus,
    queue_capacity: usize,
    delegate: Option<Arc<dyn SessionDelegate>>,
    event_loop: Mutex<Option<RunningLoop>>,
}

impl<B: MeetingBackend + 'static> MeetingManager<B> {
    pub fn new(factory: BackendFactory<B>, bus: AudioBus) -> Self {
        Self {
            meetings: Mutex::new(HashMap::new()),
            factory,
            bus,
            queue_capacity: DEFAULT_FRAME_QUEUE_CAPACITY,
            delegate: None,
            event_loop: Mutex::new(None),
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn SessionDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn bus(&self) -> &AudioBus {
        &self.bus
    }

    /// Create a backend and join a meeting. Fails if the id is already in use.
    pub fn join_meeting(&self, config: MeetingConfiguration) -> Result<(), MeetingError> {
        let meeting_id = config.meeting_id.clone();
        if self.meetings.lock().contains_key(&meeting_id) {
            return Err(MeetingError::MeetingExists(meeting_id));
        }

        let backend = (self.factory)(&config)?;
        let mut session =
            MeetingSession::with_queue_capacity(config, backend, self.bus.clone(), self.queue_capacity);
        if let Some(ref delegate) = self.delegate {
            session.set_delegate(Arc::clone(delegate));
        }

        // Joining is slow; the map stays unlocked meanwhile.
        session.join()?;

        let mut meetings = self.meetings.lock();
        if meetings.contains_key(&meeting_id) {
            drop(meetings);
            // Lost a race with a concurrent join of the same id.
            drop(session);
            return Err(MeetingError::MeetingExists(meeting_id));
        }
        meetings.insert(meeting_id.clone(), session);
        log::info!("Successfully joined meeting: {}", meeting_id);
        Ok(())
    }

    pub fn leave_meeting(&self, meeting_id: &str) -> Result<(), MeetingError> {
        let mut session = self
            .meetings
            .lock()
            .remove(meeting_id)
            .ok_or_else(|| MeetingError::MeetingNotFound(meeting_id.to_string()))?;

        // The session is gone from the map either way; its handles are released.
        session.leave().inspect_err(|e| {
            log::error!("Error stopping meeting {}: {}", meeting_id, e);
        })?;
        log::info!("Successfully left meeting: {}", meeting_id);
        Ok(())
    }

    pub fn list_meetings(&self) -> BTreeMap<String, MeetingStatus> {
        self.meetings
            .lock()
            .iter()
            .map(|(id, session)| (id.clone(), session.status()))
            .collect()
    }

    pub fn meeting_stats(&self, meeting_id: &str) -> Result<MeetingStats, MeetingError> {
        self.meetings
            .lock()
            .get(meeting_id)
            .map(|session| session.stats())
            .ok_or_else(|| MeetingError::MeetingNotFound(meeting_id.to_string()))
    }

    pub fn all_stats(&self) -> BTreeMap<String, MeetingStats> {
        self.meetings
            .lock()
            .iter()
            .map(|(id, session)| (id.clone(), session.stats()))
            .collect()
    }

    pub fn meeting_count(&self) -> usize {
        self.meetings.lock().len()
    }

    /// Run the SDK event loop on a dedicated thread until `shutdown`.
    pub fn start_event_loop(&self, event_loop: Arc<dyn EventLoop>) -> Result<(), MeetingError> {
        let mut slot = self.event_loop.lock();
        if slot.is_some() {
            return Err(MeetingError::InvalidState("event loop already running".into()));
        }

        let runner = Arc::clone(&event_loop);
        let handle = thread::Builder::new()
            .name("sdk-event-loop".into())
            .spawn(move || {
                log::debug!("Starting SDK event loop");
                runner.run();
                log::debug!("SDK event loop stopped");
            })
            .map_err(|e| MeetingError::Unknown(format!("failed to spawn event loop thread: {}", e)))?;

        *slot = Some(RunningLoop { event_loop, handle });
        Ok(())
    }

    /// Stop the event loop, if running, and wait for its thread.
    pub fn stop_event_loop(&self) {
        let running = self.event_loop.lock().take();
        if let Some(running) = running {
            running.event_loop.stop();
            if running.handle.join().is_err() {
                log::error!("SDK event loop thread panicked");
            }
        }
    }

    pub fn is_event_loop_running(&self) -> bool {
        self.event_loop.lock().is_some()
    }

    /// Leave every meeting, then stop the event loop.
    pub fn shutdown(&self) -> Result<(), MeetingError> {
        log::info!("Shutting down meeting manager");

        let sessions: Vec<(String, MeetingSession<B>)> = self.meetings.lock().drain().collect();
        let mut errors = Vec::new();
        for (id, mut session) in sessions {
            log::info!("Stopping meeting: {}", id);
            if let Err(e) = session.leave() {
                log::error!("Error stopping meeting {}: {}", id, e);
                errors.push(format!("meeting {}: {}", id, e));
            }
        }

        self.stop_event_loop();

        if !errors.is_empty() {
            return Err(MeetingError::Unknown(format!(
                "errors during shutdown: {}",
                errors.join("; ")
            )));
        }

        log::info!("Meeting manager shutdown complete");
        Ok(())
    }
}

impl<B: MeetingBackend + 'static> Drop for MeetingManager<B> {
    fn drop(&mut self) {
        if self.meeting_count() > 0 || self.is_event_loop_running() {
            let _ = self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::meeting_session::tests::FakeBackend;
    use parking_lot::Condvar;
    use std::time::Duration;

    fn manager_with(backends: Arc<Mutex<Vec<FakeBackend>>>) -> MeetingManager<FakeBackend> {
        let factory: BackendFactory<FakeBackend> = Box::new(move |config| {
            let backend = if config.meeting_id.starts_with("bad") {
                FakeBackend::failing()
            } else {
                FakeBackend::default()
            };
            backend.inner.lock().fail_leave = config.meeting_id.starts_with("stuck");
            backends.lock().push(backend.clone());
            Ok(backend)
        });
        MeetingManager::new(factory, AudioBus::new())
    }

    #[derive(Default)]
    struct FakeLoop {
        stopped: Mutex<bool>,
        cond: Condvar,
    }

    impl EventLoop for FakeLoop {
        fn run(&self) {
            let mut stopped = self.stopped.lock();
            while !*stopped {
                self.cond.wait(&mut stopped);
            }
        }

        fn stop(&self) {
            *self.stopped.lock() = true;
            self.cond.notify_all();
        }
    }

    #[test]
    fn join_list_and_leave() {
        let backends = Arc::new(Mutex::new(Vec::new()));
        let manager = manager_with(backends.clone());

        manager.join_meeting(MeetingConfiguration::new("111")).unwrap();
        manager.join_meeting(MeetingConfiguration::new("222")).unwrap();
        assert_eq!(manager.meeting_count(), 2);

        let listed = manager.list_meetings();
        assert_eq!(listed.get("111"), Some(&MeetingStatus::InMeeting));
        assert_eq!(listed.len(), 2);

        manager.leave_meeting("111").unwrap();
        assert_eq!(manager.meeting_count(), 1);
        assert!(!backends.lock()[0].is_joined());
    }

    #[test]
    fn duplicate_meeting_rejected() {
        let manager = manager_with(Arc::new(Mutex::new(Vec::new())));
        manager.join_meeting(MeetingConfiguration::new("111")).unwrap();
        assert_eq!(
            manager.join_meeting(MeetingConfiguration::new("111")),
            Err(MeetingError::MeetingExists("111".into()))
        );
    }

    #[test]
    fn failed_join_is_not_tracked() {
        let manager = manager_with(Arc::new(Mutex::new(Vec::new())));
        assert!(manager.join_meeting(MeetingConfiguration::new("bad-1")).is_err());
        assert_eq!(manager.meeting_count(), 0);
    }

    #[test]
    fn unknown_meeting_errors() {
        let manager = manager_with(Arc::new(Mutex::new(Vec::new())));
        assert_eq!(
            manager.leave_meeting("nope"),
            Err(MeetingError::MeetingNotFound("nope".into()))
        );
        assert!(manager.meeting_stats("nope").is_err());
    }

    #[test]
    fn stats_track_delivered_frames() {
        let backends = Arc::new(Mutex::new(Vec::new()));
        let manager = manager_with(backends.clone());
        manager.join_meeting(MeetingConfiguration::new("111")).unwrap();

        let backend = backends.lock()[0].clone();
        backend.deliver(crate::AudioFrame::new(crate::AudioType::Mixed, 0, vec![0u8; 100]));

        let stats = manager.meeting_stats("111").unwrap();
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.bytes_received, 100);
        assert_eq!(manager.all_stats().len(), 1);
    }

    #[test]
    fn shutdown_leaves_all_and_stops_loop() {
        let backends = Arc::new(Mutex::new(Vec::new()));
        let manager = manager_with(backends.clone());
        manager.join_meeting(MeetingConfiguration::new("111")).unwrap();
        manager.join_meeting(MeetingConfiguration::new("222")).unwrap();

        let event_loop = Arc::new(FakeLoop::default());
        manager.start_event_loop(event_loop.clone()).unwrap();
        assert!(manager.start_event_loop(event_loop.clone()).is_err());
        std::thread::sleep(Duration::from_millis(10));

        manager.shutdown().unwrap();
        assert_eq!(manager.meeting_count(), 0);
        assert!(!manager.is_event_loop_running());
        assert!(backends.lock().iter().all(|b| !b.is_joined()));
    }

    #[test]
    fn leave_errors_propagate_and_untrack() {
        let manager = manager_with(Arc::new(Mutex::new(Vec::new())));
        manager.join_meeting(MeetingConfiguration::new("stuck-1")).unwrap();

        assert_eq!(
            manager.leave_meeting("stuck-1"),
            Err(MeetingError::Unknown("leave rejected".into()))
        );
        assert_eq!(manager.meeting_count(), 0);
        assert_eq!(
            manager.leave_meeting("stuck-1"),
            Err(MeetingError::MeetingNotFound("stuck-1".into()))
        );
    }

    #[test]
    fn shutdown_reports_leave_errors() {
        let manager = manager_with(Arc::new(Mutex::new(Vec::new())));
        manager.join_meeting(MeetingConfiguration::new("111")).unwrap();
        manager.join_meeting(MeetingConfiguration::new("stuck-2")).unwrap();

        assert!(matches!(manager.shutdown(), Err(MeetingError::Unknown(msg)) if msg.contains("stuck-2")));
        assert_eq!(manager.meeting_count(), 0);
    }
}
