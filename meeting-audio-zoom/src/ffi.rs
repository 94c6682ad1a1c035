//! Raw declarations for the `zoomsdk_c` C API.
//!
//! Everything here mirrors `zoom_sdk_c.h` one-to-one. Safe code never calls
//! these pointers directly; it goes through [`crate::sdk`],
//! [`crate::callback`] and [`crate::event_loop`].

use std::os::raw::{c_char, c_int, c_uint, c_void};

/// Opaque SDK session token. Never dereferenced on the Rust side.
pub type ZoomSDKHandle = *mut c_void;

/// Opaque meeting token. Never dereferenced on the Rust side.
pub type MeetingHandle = *mut c_void;

pub type ZoomSDKResult = c_int;

pub const ZOOM_SDK_SUCCESS: ZoomSDKResult = 0;
pub const ZOOM_SDK_ERROR: ZoomSDKResult = -1;

pub const ZOOM_AUDIO_TYPE_MIXED: c_int = 0;
pub const ZOOM_AUDIO_TYPE_ONE_WAY: c_int = 1;
pub const ZOOM_AUDIO_TYPE_SHARE: c_int = 2;

/// `(meeting, data, length, type, node_id)`, invoked on a native thread.
/// `data` is only valid until the callback returns.
pub type OnAudioDataReceivedCallback =
    Option<unsafe extern "C" fn(MeetingHandle, *const c_void, c_int, c_int, c_uint)>;

/// The seven entry points of `zoomsdk_c`, as a table so the linked library
/// and the in-crate stub are interchangeable.
#[derive(Clone, Copy)]
pub struct ZoomApi {
    pub sdk_create: unsafe extern "C" fn(*const c_char, *const c_char) -> ZoomSDKHandle,
    pub sdk_destroy: unsafe extern "C" fn(ZoomSDKHandle),
    pub meeting_create_and_join: unsafe extern "C" fn(
        ZoomSDKHandle,
        *const c_char,
        *const c_char,
        *const c_char,
        c_int,
    ) -> MeetingHandle,
    pub meeting_destroy: unsafe extern "C" fn(MeetingHandle),
    pub meeting_set_audio_callback:
        unsafe extern "C" fn(MeetingHandle, OnAudioDataReceivedCallback) -> ZoomSDKResult,
    pub run_loop: unsafe extern "C" fn(),
    pub stop_loop: unsafe extern "C" fn(),
}

impl std::fmt::Debug for ZoomApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoomApi")
            .field("sdk_create", &(self.sdk_create as *const ()))
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "native")]
mod linked {
    use super::*;

    #[link(name = "zoomsdk_c")]
    extern "C" {
        pub fn zoom_sdk_create(sdk_key: *const c_char, sdk_secret: *const c_char) -> ZoomSDKHandle;
        pub fn zoom_sdk_destroy(handle: ZoomSDKHandle);
        pub fn zoom_meeting_create_and_join(
            sdk_handle: ZoomSDKHandle,
            meeting_id: *const c_char,
            password: *const c_char,
            display_name: *const c_char,
            enable_audio: c_int,
        ) -> MeetingHandle;
        pub fn zoom_meeting_destroy(meeting_handle: MeetingHandle);
        pub fn zoom_meeting_set_audio_callback(
            meeting_handle: MeetingHandle,
            callback: OnAudioDataReceivedCallback,
        ) -> ZoomSDKResult;
        pub fn zoom_sdk_run_loop();
        pub fn zoom_sdk_stop_loop();
    }
}

#[cfg(feature = "native")]
static LINKED: ZoomApi = ZoomApi {
    sdk_create: linked::zoom_sdk_create,
    sdk_destroy: linked::zoom_sdk_destroy,
    meeting_create_and_join: linked::zoom_meeting_create_and_join,
    meeting_destroy: linked::zoom_meeting_destroy,
    meeting_set_audio_callback: linked::zoom_meeting_set_audio_callback,
    run_loop: linked::zoom_sdk_run_loop,
    stop_loop: linked::zoom_sdk_stop_loop,
};

#[cfg(feature = "native")]
impl ZoomApi {
    /// The real `libzoomsdk_c`.
    pub fn linked() -> &'static ZoomApi {
        &LINKED
    }
}

/// The API this build talks to: the linked library with `native`, the stub
/// with `stub` (or under test), otherwise none.
#[cfg(feature = "native")]
pub fn default_api() -> Option<&'static ZoomApi> {
    Some(ZoomApi::linked())
}

#[cfg(all(not(feature = "native"), any(test, feature = "stub")))]
pub fn default_api() -> Option<&'static ZoomApi> {
    Some(crate::stub::api())
}

#[cfg(all(not(feature = "native"), not(any(test, feature = "stub"))))]
pub fn default_api() -> Option<&'static ZoomApi> {
    None
}
