//! In-process stand-in for `libzoomsdk_c`.
//!
//! Same ABI and observable behavior as the native library: handles are
//! tracked in instance tables, unknown handles are ignored (or rejected with
//! `ZOOM_SDK_ERROR`), destroying an SDK stops the run loop, and the run loop
//! returns at once if another one is already running.
//!
//! Scripted failures:
//! - `zoom_sdk_create` fails for an empty or `"invalid"` key or secret.
//! - `zoom_meeting_create_and_join` fails for an empty meeting id or `"fail"`.
//!
//! Tests that touch the instance tables or the run loop hold [`serial`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::ptr;
use std::sync::mpsc;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::ffi::{
    MeetingHandle, OnAudioDataReceivedCallback, ZoomApi, ZoomSDKHandle, ZoomSDKResult, ZOOM_SDK_ERROR,
    ZOOM_SDK_SUCCESS,
};

const FIRST_HANDLE: usize = 0x10_0000;
const HANDLE_STRIDE: usize = 0x10;

/// What the stub recorded for a joined meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedMeeting {
    pub meeting_id: String,
    pub password: Option<String>,
    pub display_name: Option<String>,
    pub enable_audio: bool,
    pub has_callback: bool,
}

struct StubMeeting {
    info: JoinedMeeting,
    callback: OnAudioDataReceivedCallback,
}

struct Instances {
    next_handle: usize,
    sdks: HashSet<usize>,
    meetings: HashMap<usize, StubMeeting>,
}

impl Instances {
    fn allocate(&mut self) -> usize {
        let handle = self.next_handle;
        self.next_handle += HANDLE_STRIDE;
        handle
    }
}

type LoopTask = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct LoopState {
    running: bool,
    quit: bool,
    tasks: VecDeque<LoopTask>,
}

static INSTANCES: LazyLock<Mutex<Instances>> = LazyLock::new(|| {
    Mutex::new(Instances {
        next_handle: FIRST_HANDLE,
        sdks: HashSet::new(),
        meetings: HashMap::new(),
    })
});

static MAIN_LOOP: LazyLock<(Mutex<LoopState>, Condvar)> =
    LazyLock::new(|| (Mutex::new(LoopState::default()), Condvar::new()));

static SERIAL: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

static API: ZoomApi = ZoomApi {
    sdk_create: zoom_sdk_create,
    sdk_destroy: zoom_sdk_destroy,
    meeting_create_and_join: zoom_meeting_create_and_join,
    meeting_destroy: zoom_meeting_destroy,
    meeting_set_audio_callback: zoom_meeting_set_audio_callback,
    run_loop: zoom_sdk_run_loop,
    stop_loop: zoom_sdk_stop_loop,
};

pub fn api() -> &'static ZoomApi {
    &API
}

fn to_handle(addr: usize) -> *mut c_void {
    ptr::without_provenance_mut(addr)
}

/// # Safety
/// `s` must be NULL or a valid NUL-terminated string.
unsafe fn read_str(s: *const c_char) -> Option<String> {
    if s.is_null() {
        return None;
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract.
    unsafe { CStr::from_ptr(s) }.to_str().ok().map(str::to_owned)
}

unsafe extern "C" fn zoom_sdk_create(sdk_key: *const c_char, sdk_secret: *const c_char) -> ZoomSDKHandle {
    // SAFETY: the ABI requires NULL or NUL-terminated strings.
    let (key, secret) = unsafe { (read_str(sdk_key), read_str(sdk_secret)) };
    let (Some(key), Some(secret)) = (key, secret) else {
        return ptr::null_mut();
    };
    if [key.as_str(), secret.as_str()].iter().any(|v| v.is_empty() || *v == "invalid") {
        return ptr::null_mut();
    }

    let mut instances = INSTANCES.lock();
    let handle = instances.allocate();
    instances.sdks.insert(handle);
    to_handle(handle)
}

unsafe extern "C" fn zoom_sdk_destroy(handle: ZoomSDKHandle) {
    if !INSTANCES.lock().sdks.remove(&(handle as usize)) {
        return;
    }
    // SAFETY: the stub's stop is always safe to call.
    unsafe { zoom_sdk_stop_loop() };
}

unsafe extern "C" fn zoom_meeting_create_and_join(
    sdk_handle: ZoomSDKHandle,
    meeting_id: *const c_char,
    password: *const c_char,
    display_name: *const c_char,
    enable_audio: c_int,
) -> MeetingHandle {
    // SAFETY: the ABI requires NULL or NUL-terminated strings.
    let (meeting_id, password, display_name) =
        unsafe { (read_str(meeting_id), read_str(password), read_str(display_name)) };

    let mut instances = INSTANCES.lock();
    if !instances.sdks.contains(&(sdk_handle as usize)) {
        return ptr::null_mut();
    }
    let meeting_id = meeting_id.unwrap_or_default();
    if meeting_id.is_empty() || meeting_id == "fail" {
        return ptr::null_mut();
    }

    let handle = instances.allocate();
    instances.meetings.insert(
        handle,
        StubMeeting {
            info: JoinedMeeting {
                meeting_id,
                password,
                display_name,
                enable_audio: enable_audio != 0,
                has_callback: false,
            },
            callback: None,
        },
    );
    to_handle(handle)
}

unsafe extern "C" fn zoom_meeting_destroy(handle: MeetingHandle) {
    INSTANCES.lock().meetings.remove(&(handle as usize));
}

unsafe extern "C" fn zoom_meeting_set_audio_callback(
    handle: MeetingHandle,
    callback: OnAudioDataReceivedCallback,
) -> ZoomSDKResult {
    let mut instances = INSTANCES.lock();
    match instances.meetings.get_mut(&(handle as usize)) {
        Some(meeting) => {
            meeting.callback = callback;
            meeting.info.has_callback = callback.is_some();
            ZOOM_SDK_SUCCESS
        }
        None => ZOOM_SDK_ERROR,
    }
}

unsafe extern "C" fn zoom_sdk_run_loop() {
    let (lock, cond) = &*MAIN_LOOP;
    let mut state = lock.lock();
    if state.running {
        return;
    }
    state.running = true;
    state.quit = false;
    cond.notify_all();

    while !state.quit {
        if let Some(task) = state.tasks.pop_front() {
            MutexGuard::unlocked(&mut state, task);
            continue;
        }
        cond.wait(&mut state);
    }

    state.running = false;
    state.quit = false;
    cond.notify_all();
}

unsafe extern "C" fn zoom_sdk_stop_loop() {
    let (lock, cond) = &*MAIN_LOOP;
    let mut state = lock.lock();
    if state.running {
        state.quit = true;
        cond.notify_all();
    }
}

/// Deliver `data` to `meeting`'s callback as the native audio thread would.
/// Returns `false` when the meeting is unknown or has no callback.
pub fn dispatch_audio(meeting: MeetingHandle, data: &[u8], audio_type: c_int, node_id: c_uint) -> bool {
    let callback = INSTANCES
        .lock()
        .meetings
        .get(&(meeting as usize))
        .and_then(|m| m.callback);

    match callback {
        Some(callback) => {
            // SAFETY: `data` outlives the call and its length is exact.
            unsafe { callback(meeting, data.as_ptr().cast(), data.len() as c_int, audio_type, node_id) };
            true
        }
        None => false,
    }
}

/// Deliver one frame to every meeting with a callback; returns how many got it.
pub fn dispatch_to_all(data: &[u8], audio_type: c_int, node_id: c_uint) -> usize {
    let handles: Vec<usize> = INSTANCES
        .lock()
        .meetings
        .iter()
        .filter(|(_, m)| m.callback.is_some())
        .map(|(h, _)| *h)
        .collect();

    handles
        .into_iter()
        .filter(|h| dispatch_audio(to_handle(*h), data, audio_type, node_id))
        .count()
}

/// Run `task` on the thread blocked in the run loop, as a GLib source
/// would. The receiver fires once it has run.
pub fn dispatch_on_loop_thread(task: impl FnOnce() + Send + 'static) -> mpsc::Receiver<()> {
    let (done_tx, done_rx) = mpsc::channel();
    let (lock, cond) = &*MAIN_LOOP;
    lock.lock().tasks.push_back(Box::new(move || {
        task();
        let _ = done_tx.send(());
    }));
    cond.notify_all();
    done_rx
}

/// Wait until some thread is blocked in the run loop.
pub fn wait_for_loop(timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let (lock, cond) = &*MAIN_LOOP;
    let mut state = lock.lock();
    while !state.running {
        if cond.wait_until(&mut state, deadline).timed_out() {
            return state.running;
        }
    }
    true
}

pub fn loop_running() -> bool {
    MAIN_LOOP.0.lock().running
}

pub fn live_sdk_count() -> usize {
    INSTANCES.lock().sdks.len()
}

pub fn live_meeting_count() -> usize {
    INSTANCES.lock().meetings.len()
}

pub fn meeting_info(meeting: MeetingHandle) -> Option<JoinedMeeting> {
    INSTANCES
        .lock()
        .meetings
        .get(&(meeting as usize))
        .map(|m| m.info.clone())
}

/// Serializes tests that share the stub's global state.
pub fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock()
}
