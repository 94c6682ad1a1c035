use std::sync::Arc;

use meeting_audio_core::models::config::{BotConfiguration, MeetingConfiguration};
use meeting_audio_core::models::error::MeetingError;
use meeting_audio_core::traits::meeting_backend::{AudioFrameCallback, MeetingBackend};

use crate::error::ZoomError;
use crate::ffi::{default_api, ZoomApi};
use crate::sdk::{ZoomMeeting, ZoomSdk};

enum SdkSource {
    /// Create a session per join and destroy it on leave.
    PerMeeting { sdk_key: String, sdk_secret: String },
    /// Join through a session shared with other meetings.
    Shared(Arc<ZoomSdk>),
}

/// `MeetingBackend` over `zoomsdk_c`.
///
/// Leaving destroys the meeting handle, and with a per-meeting session also
/// the SDK handle, which stops the native run loop. Share one session when
/// several meetings run under one event loop.
pub struct ZoomBackend {
    api: Option<&'static ZoomApi>,
    source: SdkSource,
    meeting: Option<ZoomMeeting>,
}

impl ZoomBackend {
    /// Per-meeting SDK session with the build's default API.
    pub fn new(sdk_key: impl Into<String>, sdk_secret: impl Into<String>) -> Self {
        Self {
            api: default_api(),
            source: SdkSource::PerMeeting {
                sdk_key: sdk_key.into(),
                sdk_secret: sdk_secret.into(),
            },
            meeting: None,
        }
    }

    pub fn from_config(config: &BotConfiguration) -> Self {
        Self::new(config.sdk_key.clone(), config.sdk_secret.clone())
    }

    /// Join every meeting through `sdk`.
    pub fn with_shared_sdk(sdk: Arc<ZoomSdk>) -> Self {
        Self {
            api: Some(sdk.api()),
            source: SdkSource::Shared(sdk),
            meeting: None,
        }
    }

    /// Override the API table (e.g. the stub).
    pub fn with_api(mut self, api: &'static ZoomApi) -> Self {
        self.api = Some(api);
        self
    }

    pub fn meeting(&self) -> Option<&ZoomMeeting> {
        self.meeting.as_ref()
    }

    fn sdk(&self) -> Result<Arc<ZoomSdk>, ZoomError> {
        match &self.source {
            SdkSource::Shared(sdk) => Ok(Arc::clone(sdk)),
            SdkSource::PerMeeting { sdk_key, sdk_secret } => {
                let api = self.api.ok_or(ZoomError::NotLinked)?;
                ZoomSdk::create(api, sdk_key, sdk_secret)
            }
        }
    }

    fn connect(
        &self,
        config: &MeetingConfiguration,
        callback: AudioFrameCallback,
    ) -> Result<ZoomMeeting, ZoomError> {
        if let Some(ref meeting) = self.meeting {
            return Err(ZoomError::AlreadyJoined(meeting.meeting_id().to_string()));
        }

        let sdk = self.sdk()?;
        // On any error below the meeting (and a per-meeting SDK) is dropped,
        // releasing the native handles.
        let mut meeting = ZoomMeeting::join(sdk, config)?;
        if config.enable_audio {
            meeting.set_audio_callback(callback)?;
        }
        Ok(meeting)
    }
}

impl MeetingBackend for ZoomBackend {
    fn is_available(&self) -> bool {
        self.api.is_some()
    }

    fn join(&mut self, config: &MeetingConfiguration, callback: AudioFrameCallback) -> Result<(), MeetingError> {
        let meeting = self.connect(config, callback)?;
        log::info!(
            "Joined meeting {} (audio: {})",
            config.meeting_id,
            if config.enable_audio { "on" } else { "off" }
        );
        self.meeting = Some(meeting);
        Ok(())
    }

    fn leave(&mut self) -> Result<(), MeetingError> {
        if let Some(meeting) = self.meeting.take() {
            log::info!("Leaving meeting {}", meeting.meeting_id());
            drop(meeting);
        }
        Ok(())
    }

    fn is_joined(&self) -> bool {
        self.meeting.is_some()
    }

    fn backend_name(&self) -> &str {
        "zoom"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::ZoomEventLoop;
    use crate::stub;
    use meeting_audio_core::bus::audio_bus::{AudioBus, SubscriberFilter};
    use meeting_audio_core::models::audio_models::AudioType;
    use meeting_audio_core::models::state::MeetingStatus;
    use meeting_audio_core::session::manager::{BackendFactory, MeetingManager};
    use meeting_audio_core::session::meeting_session::MeetingSession;
    use std::time::Duration;

    fn noop() -> AudioFrameCallback {
        Arc::new(|_| {})
    }

    #[test]
    fn join_and_leave_release_handles() {
        let _serial = stub::serial();
        let mut backend = ZoomBackend::new("key", "secret").with_api(stub::api());
        assert!(backend.is_available());

        backend.join(&MeetingConfiguration::new("123"), noop()).unwrap();
        assert!(backend.is_joined());
        assert_eq!(stub::live_sdk_count(), 1);
        assert_eq!(stub::live_meeting_count(), 1);
        assert!(backend.meeting().unwrap().has_audio_callback());

        backend.leave().unwrap();
        backend.leave().unwrap();
        assert!(!backend.is_joined());
        assert_eq!(stub::live_sdk_count(), 0);
        assert_eq!(stub::live_meeting_count(), 0);
    }

    #[test]
    fn bad_credentials_map_to_meeting_error() {
        let _serial = stub::serial();
        let mut backend = ZoomBackend::new("invalid", "secret").with_api(stub::api());
        assert_eq!(
            backend.join(&MeetingConfiguration::new("123"), noop()),
            Err(MeetingError::SdkCreateFailed)
        );
        assert!(!backend.is_joined());
    }

    #[test]
    fn failed_join_releases_per_meeting_sdk() {
        let _serial = stub::serial();
        let mut backend = ZoomBackend::new("key", "secret").with_api(stub::api());
        assert_eq!(
            backend.join(&MeetingConfiguration::new("fail"), noop()),
            Err(MeetingError::JoinFailed("fail".into()))
        );
        assert_eq!(stub::live_sdk_count(), 0);
    }

    #[test]
    fn second_join_is_rejected() {
        let _serial = stub::serial();
        let mut backend = ZoomBackend::new("key", "secret").with_api(stub::api());
        backend.join(&MeetingConfiguration::new("123"), noop()).unwrap();
        assert!(matches!(
            backend.join(&MeetingConfiguration::new("456"), noop()),
            Err(MeetingError::InvalidState(_))
        ));
        assert_eq!(stub::live_meeting_count(), 1);
    }

    #[test]
    fn audio_disabled_skips_callback() {
        let _serial = stub::serial();
        let mut backend = ZoomBackend::new("key", "secret").with_api(stub::api());
        backend
            .join(&MeetingConfiguration::new("123").with_audio(false), noop())
            .unwrap();
        assert!(!backend.meeting().unwrap().has_audio_callback());
        assert_eq!(stub::dispatch_to_all(&[0u8; 4], 0, 0), 0);
    }

    #[test]
    fn shared_sdk_outlives_meetings() {
        let _serial = stub::serial();
        let sdk = ZoomSdk::create(stub::api(), "key", "secret").unwrap();
        let mut first = ZoomBackend::with_shared_sdk(Arc::clone(&sdk));
        let mut second = ZoomBackend::with_shared_sdk(Arc::clone(&sdk));

        first.join(&MeetingConfiguration::new("111"), noop()).unwrap();
        second.join(&MeetingConfiguration::new("222"), noop()).unwrap();
        assert_eq!(stub::live_sdk_count(), 1);

        first.leave().unwrap();
        assert_eq!(stub::live_sdk_count(), 1);
        second.leave().unwrap();
        drop(sdk);
        assert_eq!(stub::live_sdk_count(), 1);

        drop(first);
        drop(second);
        assert_eq!(stub::live_sdk_count(), 0);
    }

    #[test]
    fn session_publishes_native_audio_to_bus() {
        let _serial = stub::serial();
        let bus = AudioBus::new();
        let sub = bus.subscribe(SubscriberFilter::for_meeting("123").with_audio_types([AudioType::OneWay]), 16);
        let backend = ZoomBackend::new("key", "secret").with_api(stub::api());
        let mut session = MeetingSession::new(MeetingConfiguration::new("123"), backend, bus);

        session.join().unwrap();
        assert_eq!(session.status(), MeetingStatus::InMeeting);

        assert_eq!(stub::dispatch_to_all(&[3u8; 640], 0, 0), 1);
        assert_eq!(stub::dispatch_to_all(&[4u8; 320], 1, 16778240), 1);

        let got = sub.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(got.frame.node_id, 16778240);
        assert_eq!(got.frame.data.len(), 320);

        session.leave().unwrap();
        assert_eq!(session.stats().frames_received, 2);
        assert_eq!(stub::live_meeting_count(), 0);
    }

    #[test]
    fn manager_runs_meetings_under_one_event_loop() {
        let _serial = stub::serial();
        let sdk = ZoomSdk::create(stub::api(), "key", "secret").unwrap();
        let factory_sdk = Arc::clone(&sdk);
        let factory: BackendFactory<ZoomBackend> =
            Box::new(move |_| Ok(ZoomBackend::with_shared_sdk(Arc::clone(&factory_sdk))));
        let manager = MeetingManager::new(factory, AudioBus::new());

        manager.start_event_loop(Arc::new(ZoomEventLoop::new(stub::api()))).unwrap();
        assert!(stub::wait_for_loop(Duration::from_secs(2)));

        manager.join_meeting(MeetingConfiguration::new("111")).unwrap();
        manager.join_meeting(MeetingConfiguration::new("222")).unwrap();
        assert_eq!(stub::dispatch_to_all(&[0u8; 64], 0, 0), 2);

        manager.leave_meeting("111").unwrap();
        assert!(stub::loop_running());

        manager.shutdown().unwrap();
        assert!(!stub::loop_running());
        assert_eq!(stub::live_meeting_count(), 0);
        drop(manager);
        drop(sdk);
        assert_eq!(stub::live_sdk_count(), 0);
    }
}
