//! Routes native audio callbacks to Rust closures.
//!
//! `zoomsdk_c` accepts a bare C function pointer, so every meeting registers
//! the same [`audio_trampoline`] and this module maps the meeting handle back
//! to its `AudioFrameCallback`.
//!
//! Unregistering takes the registry's write lock and therefore waits for any
//! callback in flight on another thread. Never drop a `ZoomMeeting` from
//! inside its own audio callback: the write lock would wait on the read lock
//! held by that very callback.

use std::collections::HashMap;
use std::os::raw::{c_int, c_uint, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::slice;
use std::sync::LazyLock;

use parking_lot::RwLock;

use meeting_audio_core::models::audio_models::{AudioFrame, AudioType};
use meeting_audio_core::traits::meeting_backend::AudioFrameCallback;

use crate::ffi::{MeetingHandle, OnAudioDataReceivedCallback};

static REGISTRY: LazyLock<RwLock<HashMap<usize, AudioFrameCallback>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

fn key(handle: MeetingHandle) -> usize {
    handle as usize
}

pub(crate) fn register(handle: MeetingHandle, callback: AudioFrameCallback) {
    REGISTRY.write().insert(key(handle), callback);
    log::debug!("Registered audio callback for meeting handle {:p}", handle);
}

/// Remove a registration, waiting out any callback running on another thread.
pub(crate) fn unregister(handle: MeetingHandle) -> bool {
    let removed = REGISTRY.write().remove(&key(handle)).is_some();
    if removed {
        log::debug!("Unregistered audio callback for meeting handle {:p}", handle);
    }
    removed
}

pub fn is_registered(handle: MeetingHandle) -> bool {
    REGISTRY.read().contains_key(&key(handle))
}

/// The value handed to `zoom_meeting_set_audio_callback` for every meeting.
pub(crate) fn native_callback() -> OnAudioDataReceivedCallback {
    let trampoline: unsafe extern "C" fn(MeetingHandle, *const c_void, c_int, c_int, c_uint) = audio_trampoline;
    Some(trampoline)
}

pub(crate) extern "C" fn audio_trampoline(
    meeting: MeetingHandle,
    data: *const c_void,
    length: c_int,
    audio_type: c_int,
    node_id: c_uint,
) {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        deliver(meeting, data, length, audio_type, node_id);
    }));
    if result.is_err() {
        log::error!("Audio callback panicked for meeting handle {:p}", meeting);
    }
}

fn deliver(meeting: MeetingHandle, data: *const c_void, length: c_int, audio_type: c_int, node_id: c_uint) {
    if data.is_null() || length < 0 {
        log::warn!(
            "Ignoring audio callback with invalid buffer (data: {:p}, length: {})",
            data,
            length
        );
        return;
    }

    // SAFETY: native code guarantees `length` readable bytes at `data` for
    // the duration of this call; they are copied before returning.
    let bytes = unsafe { slice::from_raw_parts(data.cast::<u8>(), length as usize) }.to_vec();

    let audio_type = match AudioType::try_from(audio_type) {
        Ok(t) => t,
        Err(e) => {
            log::warn!("Dropping audio frame: {}", e);
            return;
        }
    };

    let registry = REGISTRY.read();
    match registry.get(&key(meeting)) {
        Some(callback) => callback(AudioFrame::new(audio_type, node_id, bytes)),
        None => log::warn!("Received audio data for unknown meeting handle: {:p}", meeting),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn fake_handle(addr: usize) -> MeetingHandle {
        std::ptr::without_provenance_mut(addr)
    }

    fn collecting() -> (AudioFrameCallback, Arc<Mutex<Vec<AudioFrame>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        let callback: AudioFrameCallback = Arc::new(move |frame| sink.lock().push(frame));
        (callback, frames)
    }

    #[test]
    fn trampoline_copies_exact_length() {
        let handle = fake_handle(0xA100);
        let (callback, frames) = collecting();
        register(handle, callback);

        let pcm: Vec<u8> = (0..=255).collect();
        audio_trampoline(handle, pcm.as_ptr().cast(), 100, 1, 16778240);

        unregister(handle);
        let frames = frames.lock();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, pcm[..100]);
        assert_eq!(frames[0].audio_type, AudioType::OneWay);
        assert_eq!(frames[0].node_id, 16778240);
    }

    #[test]
    fn trampoline_rejects_bad_buffers() {
        let handle = fake_handle(0xA200);
        let (callback, frames) = collecting();
        register(handle, callback);

        let pcm = [0u8; 4];
        audio_trampoline(handle, std::ptr::null(), 4, 0, 0);
        audio_trampoline(handle, pcm.as_ptr().cast(), -1, 0, 0);
        audio_trampoline(handle, pcm.as_ptr().cast(), 4, 9, 0);

        unregister(handle);
        assert!(frames.lock().is_empty());
    }

    #[test]
    fn zero_length_frame_is_delivered() {
        let handle = fake_handle(0xA300);
        let (callback, frames) = collecting();
        register(handle, callback);

        let pcm = [0u8; 1];
        audio_trampoline(handle, pcm.as_ptr().cast(), 0, 2, 0);

        unregister(handle);
        assert_eq!(frames.lock()[0].data.len(), 0);
        assert_eq!(frames.lock()[0].audio_type, AudioType::Share);
    }

    #[test]
    fn unknown_handle_is_ignored() {
        let pcm = [0u8; 4];
        audio_trampoline(fake_handle(0xA400), pcm.as_ptr().cast(), 4, 0, 0);
        assert!(!is_registered(fake_handle(0xA400)));
    }

    #[test]
    fn panicking_callback_does_not_unwind_into_native() {
        let handle = fake_handle(0xA500);
        register(handle, Arc::new(|_| panic!("consumer bug")));

        let pcm = [0u8; 4];
        audio_trampoline(handle, pcm.as_ptr().cast(), 4, 0, 0);

        // Registry lock survives the panic.
        assert!(unregister(handle));
    }
}
