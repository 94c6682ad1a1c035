//! Owned wrappers around `ZoomSDKHandle` and `MeetingHandle`.
//!
//! Each wrapper holds a non-null handle and releases it exactly once, in
//! `Drop`. A `ZoomMeeting` keeps its `ZoomSdk` alive, so an SDK session is
//! always destroyed after every meeting created from it.

use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::ptr::{self, NonNull};
use std::sync::Arc;

use meeting_audio_core::models::config::MeetingConfiguration;
use meeting_audio_core::traits::meeting_backend::AudioFrameCallback;

use crate::callback;
use crate::error::ZoomError;
use crate::ffi::{MeetingHandle, ZoomApi, ZoomSDKHandle, ZOOM_SDK_SUCCESS};

fn to_cstring(what: &str, value: &str) -> Result<CString, ZoomError> {
    CString::new(value).map_err(|_| ZoomError::InvalidArgument(format!("{} contains a NUL byte", what)))
}

fn to_optional_cstring(what: &str, value: Option<&str>) -> Result<Option<CString>, ZoomError> {
    value.filter(|v| !v.is_empty()).map(|v| to_cstring(what, v)).transpose()
}

fn as_ptr_or_null(value: &Option<CString>) -> *const c_char {
    value.as_ref().map_or(ptr::null(), |s| s.as_ptr())
}

/// An authenticated SDK session.
///
/// Destroying a session also stops the native run loop, so bots that run
/// several meetings should share one `Arc<ZoomSdk>` between them.
pub struct ZoomSdk {
    api: &'static ZoomApi,
    handle: NonNull<std::os::raw::c_void>,
}

// SAFETY: the handle is an opaque token only ever passed back to zoomsdk_c,
// which serializes access to its instance tables internally.
unsafe impl Send for ZoomSdk {}
unsafe impl Sync for ZoomSdk {}

impl ZoomSdk {
    /// Create and authenticate a session. Blocks while native code authenticates.
    pub fn create(api: &'static ZoomApi, sdk_key: &str, sdk_secret: &str) -> Result<Arc<Self>, ZoomError> {
        let key = to_cstring("SDK key", sdk_key)?;
        let secret = to_cstring("SDK secret", sdk_secret)?;

        // SAFETY: both pointers are valid NUL-terminated strings for the call.
        let raw = unsafe { (api.sdk_create)(key.as_ptr(), secret.as_ptr()) };
        let handle = NonNull::new(raw).ok_or_else(|| {
            log::error!("Failed to create SDK instance");
            ZoomError::SdkCreateFailed
        })?;

        log::debug!("Created SDK handle: {:p}", handle);
        Ok(Arc::new(Self { api, handle }))
    }

    pub fn api(&self) -> &'static ZoomApi {
        self.api
    }

    fn raw(&self) -> ZoomSDKHandle {
        self.handle.as_ptr()
    }
}

impl Drop for ZoomSdk {
    fn drop(&mut self) {
        log::debug!("Destroying SDK handle: {:p}", self.handle);
        // SAFETY: the handle came from sdk_create and is destroyed only here.
        unsafe { (self.api.sdk_destroy)(self.raw()) };
    }
}

impl std::fmt::Debug for ZoomSdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoomSdk").field("handle", &self.handle).finish()
    }
}

/// A joined meeting.
pub struct ZoomMeeting {
    sdk: Arc<ZoomSdk>,
    handle: NonNull<std::os::raw::c_void>,
    meeting_id: String,
    callback_registered: bool,
}

// SAFETY: see `ZoomSdk`.
unsafe impl Send for ZoomMeeting {}
unsafe impl Sync for ZoomMeeting {}

impl ZoomMeeting {
    /// Create the meeting and send the join request.
    ///
    /// Returns once native code accepted the request; audio arrives on the
    /// callback whenever the SDK starts delivering it.
    pub fn join(sdk: Arc<ZoomSdk>, config: &MeetingConfiguration) -> Result<Self, ZoomError> {
        let meeting_id = to_cstring("meeting id", &config.meeting_id)?;
        let password = to_optional_cstring("password", config.password.as_deref())?;
        let display_name = to_optional_cstring("display name", config.display_name.as_deref())?;

        // SAFETY: the SDK handle is live (we hold an Arc to it) and every
        // string pointer is valid or NULL for the duration of the call.
        let raw = unsafe {
            (sdk.api.meeting_create_and_join)(
                sdk.raw(),
                meeting_id.as_ptr(),
                as_ptr_or_null(&password),
                as_ptr_or_null(&display_name),
                config.enable_audio as c_int,
            )
        };
        let handle = NonNull::new(raw).ok_or_else(|| {
            log::error!("Failed to create and join meeting {}", config.meeting_id);
            ZoomError::JoinFailed(config.meeting_id.clone())
        })?;

        log::debug!("Created meeting handle: {:p} for meeting ID: {}", handle, config.meeting_id);
        Ok(Self {
            sdk,
            handle,
            meeting_id: config.meeting_id.clone(),
            callback_registered: false,
        })
    }

    /// Route this meeting's audio to `callback`, replacing any previous one.
    pub fn set_audio_callback(&mut self, callback: AudioFrameCallback) -> Result<(), ZoomError> {
        callback::register(self.raw(), callback);

        // SAFETY: the meeting handle is live until Drop.
        let rc = unsafe {
            (self.sdk.api.meeting_set_audio_callback)(self.raw(), callback::native_callback())
        };
        if rc != ZOOM_SDK_SUCCESS {
            callback::unregister(self.raw());
            self.callback_registered = false;
            log::error!("Failed to set audio callback for meeting {}", self.meeting_id);
            return Err(ZoomError::CallbackRejected);
        }

        self.callback_registered = true;
        log::debug!("Set audio callback for meeting handle: {:p}", self.handle);
        Ok(())
    }

    /// Stop audio delivery. Returns once no callback for this meeting is running.
    pub fn clear_audio_callback(&mut self) -> Result<(), ZoomError> {
        if !self.callback_registered {
            return Ok(());
        }

        // SAFETY: the meeting handle is live until Drop; NULL unregisters.
        let rc = unsafe { (self.sdk.api.meeting_set_audio_callback)(self.raw(), None) };
        callback::unregister(self.raw());
        self.callback_registered = false;

        if rc != ZOOM_SDK_SUCCESS {
            return Err(ZoomError::CallbackRejected);
        }
        Ok(())
    }

    pub fn has_audio_callback(&self) -> bool {
        self.callback_registered
    }

    pub fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    pub fn sdk(&self) -> &Arc<ZoomSdk> {
        &self.sdk
    }

    pub(crate) fn raw(&self) -> MeetingHandle {
        self.handle.as_ptr()
    }
}

impl Drop for ZoomMeeting {
    fn drop(&mut self) {
        if let Err(e) = self.clear_audio_callback() {
            log::warn!("Error clearing audio callback for meeting {}: {}", self.meeting_id, e);
        }
        log::debug!("Destroying meeting handle: {:p}", self.handle);
        // SAFETY: no Rust callback can run past clear_audio_callback, and the
        // handle is destroyed only here.
        unsafe { (self.sdk.api.meeting_destroy)(self.raw()) };
    }
}

impl std::fmt::Debug for ZoomMeeting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoomMeeting")
            .field("meeting_id", &self.meeting_id)
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub;
    use meeting_audio_core::models::audio_models::{AudioFrame, AudioType};
    use meeting_audio_core::models::error::MeetingError;
    use parking_lot::Mutex;

    #[test]
    fn create_with_valid_credentials() {
        let _serial = stub::serial();
        let sdk = ZoomSdk::create(stub::api(), "key", "secret").unwrap();
        assert_eq!(stub::live_sdk_count(), 1);
        drop(sdk);
        assert_eq!(stub::live_sdk_count(), 0);
    }

    #[test]
    fn rejected_credentials_are_an_error() {
        let _serial = stub::serial();
        assert_eq!(
            ZoomSdk::create(stub::api(), "invalid", "secret").unwrap_err(),
            ZoomError::SdkCreateFailed
        );
        assert_eq!(ZoomSdk::create(stub::api(), "", "").unwrap_err(), ZoomError::SdkCreateFailed);
        assert_eq!(stub::live_sdk_count(), 0);
    }

    #[test]
    fn nul_bytes_never_reach_native() {
        assert!(matches!(
            ZoomSdk::create(stub::api(), "ke\0y", "secret"),
            Err(ZoomError::InvalidArgument(_))
        ));
    }

    #[test]
    fn meeting_keeps_sdk_alive_and_destroys_once() {
        let _serial = stub::serial();
        let sdk = ZoomSdk::create(stub::api(), "key", "secret").unwrap();
        let config = MeetingConfiguration::new("123456789")
            .with_password("pw")
            .with_display_name("Bot 1");
        let meeting = ZoomMeeting::join(Arc::clone(&sdk), &config).unwrap();
        assert_eq!(meeting.meeting_id(), "123456789");

        let joined = stub::meeting_info(meeting.raw()).unwrap();
        assert_eq!(joined.password.as_deref(), Some("pw"));
        assert_eq!(joined.display_name.as_deref(), Some("Bot 1"));
        assert!(joined.enable_audio);

        drop(sdk);
        assert_eq!(stub::live_sdk_count(), 1);
        drop(meeting);
        assert_eq!(stub::live_meeting_count(), 0);
        assert_eq!(stub::live_sdk_count(), 0);
    }

    #[test]
    fn empty_optionals_pass_null() {
        let _serial = stub::serial();
        let sdk = ZoomSdk::create(stub::api(), "key", "secret").unwrap();
        let config = MeetingConfiguration::new("42").with_password("").with_audio(false);
        let meeting = ZoomMeeting::join(sdk, &config).unwrap();

        let joined = stub::meeting_info(meeting.raw()).unwrap();
        assert_eq!(joined.password, None);
        assert_eq!(joined.display_name, None);
        assert!(!joined.enable_audio);
    }

    #[test]
    fn failed_join_is_an_error() {
        let _serial = stub::serial();
        let sdk = ZoomSdk::create(stub::api(), "key", "secret").unwrap();
        let err = ZoomMeeting::join(sdk, &MeetingConfiguration::new("fail")).unwrap_err();
        assert_eq!(err, ZoomError::JoinFailed("fail".into()));
        assert_eq!(MeetingError::from(err), MeetingError::JoinFailed("fail".into()));
        assert_eq!(stub::live_meeting_count(), 0);
    }

    #[test]
    fn callback_receives_native_byte_count() {
        let _serial = stub::serial();
        let sdk = ZoomSdk::create(stub::api(), "key", "secret").unwrap();
        let mut meeting = ZoomMeeting::join(sdk, &MeetingConfiguration::new("123")).unwrap();

        let frames: Arc<Mutex<Vec<AudioFrame>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        meeting
            .set_audio_callback(Arc::new(move |frame| sink.lock().push(frame)))
            .unwrap();

        assert!(stub::dispatch_audio(meeting.raw(), &[7u8; 640], 0, 0));
        assert!(stub::dispatch_audio(meeting.raw(), &[1u8; 320], 1, 16778240));

        let frames = frames.lock();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data.len(), 640);
        assert_eq!(frames[1].data.len(), 320);
        assert_eq!(frames[1].audio_type, AudioType::OneWay);
        assert_eq!(frames[1].node_id, 16778240);
    }

    #[test]
    fn clearing_callback_stops_delivery() {
        let _serial = stub::serial();
        let sdk = ZoomSdk::create(stub::api(), "key", "secret").unwrap();
        let mut meeting = ZoomMeeting::join(sdk, &MeetingConfiguration::new("123")).unwrap();
        meeting.set_audio_callback(Arc::new(|_| {})).unwrap();
        assert!(callback::is_registered(meeting.raw()));

        meeting.clear_audio_callback().unwrap();
        assert!(!meeting.has_audio_callback());
        assert!(!callback::is_registered(meeting.raw()));
        assert!(!stub::dispatch_audio(meeting.raw(), &[0u8; 4], 0, 0));
    }

    #[test]
    fn drop_unregisters_before_destroy() {
        let _serial = stub::serial();
        let sdk = ZoomSdk::create(stub::api(), "key", "secret").unwrap();
        let mut meeting = ZoomMeeting::join(sdk, &MeetingConfiguration::new("123")).unwrap();
        meeting.set_audio_callback(Arc::new(|_| {})).unwrap();
        let raw = meeting.raw();

        drop(meeting);
        assert!(!callback::is_registered(raw));
        assert!(stub::meeting_info(raw).is_none());
    }
}
