use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;

use meeting_audio_core::traits::meeting_backend::EventLoop;

use crate::ffi::ZoomApi;

const STOP_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// The process-wide `zoom_sdk_run_loop`, with a stop token.
///
/// The native stop is a no-op when no loop is running, so a bare
/// `zoom_sdk_stop_loop` issued just before `run` enters native code would
/// be lost. `stop` records the request first and keeps re-issuing the
/// native stop until `run` has returned.
pub struct ZoomEventLoop {
    api: &'static ZoomApi,
    stop_requested: AtomicBool,
    running: AtomicBool,
    loop_thread: Mutex<Option<ThreadId>>,
}

impl ZoomEventLoop {
    pub fn new(api: &'static ZoomApi) -> Self {
        Self {
            api,
            stop_requested: AtomicBool::new(false),
            running: AtomicBool::new(false),
            loop_thread: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_stop_pending(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn native_stop(&self) {
        // SAFETY: zoom_sdk_stop_loop is callable from any thread at any time.
        unsafe { (self.api.stop_loop)() };
    }
}

impl EventLoop for ZoomEventLoop {
    /// Block in the native loop until `stop`. Returns at once if a stop is
    /// already pending, consuming it.
    fn run(&self) {
        // Publish `running` before checking the token; `stop` does the reverse.
        self.running.store(true, Ordering::SeqCst);
        if self.stop_requested.swap(false, Ordering::SeqCst) {
            self.running.store(false, Ordering::SeqCst);
            log::debug!("Event loop stop was pending; not entering native loop");
            return;
        }

        *self.loop_thread.lock() = Some(thread::current().id());
        log::info!("Starting SDK event loop");
        // SAFETY: blocks until zoom_sdk_stop_loop; no Rust state is borrowed across it.
        unsafe { (self.api.run_loop)() };
        log::info!("SDK event loop stopped");

        *self.loop_thread.lock() = None;
        self.stop_requested.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }

    /// Make a blocked or imminent `run` return. Callable from any thread,
    /// including a callback dispatched by the loop itself.
    fn stop(&self) {
        log::debug!("Requesting SDK event loop to stop");
        self.stop_requested.store(true, Ordering::SeqCst);
        self.native_stop();

        // On the loop's own thread `run` cannot return until we do.
        if *self.loop_thread.lock() == Some(thread::current().id()) {
            return;
        }

        while self.running.load(Ordering::SeqCst) {
            thread::sleep(STOP_RETRY_INTERVAL);
            self.native_stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub;
    use std::sync::mpsc;
    use std::sync::Arc;

    fn spawn_run(event_loop: &Arc<ZoomEventLoop>) -> mpsc::Receiver<()> {
        let (done_tx, done_rx) = mpsc::channel();
        let runner = Arc::clone(event_loop);
        thread::spawn(move || {
            runner.run();
            let _ = done_tx.send(());
        });
        done_rx
    }

    #[test]
    fn stop_from_another_thread_unblocks_run() {
        let _serial = stub::serial();
        let event_loop = Arc::new(ZoomEventLoop::new(stub::api()));
        let done = spawn_run(&event_loop);

        assert!(stub::wait_for_loop(Duration::from_secs(2)));
        assert!(done.recv_timeout(Duration::from_millis(50)).is_err());

        event_loop.stop();
        done.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(!event_loop.is_running());
        assert!(!stub::loop_running());
    }

    #[test]
    fn stop_before_run_is_not_lost() {
        let _serial = stub::serial();
        let event_loop = Arc::new(ZoomEventLoop::new(stub::api()));
        event_loop.stop();
        assert!(event_loop.is_stop_pending());

        let done = spawn_run(&event_loop);
        done.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(!event_loop.is_stop_pending());
    }

    #[test]
    fn stop_from_audio_callback_unblocks_run() {
        let _serial = stub::serial();
        let event_loop = Arc::new(ZoomEventLoop::new(stub::api()));
        let done = spawn_run(&event_loop);
        assert!(stub::wait_for_loop(Duration::from_secs(2)));

        let stopper = Arc::clone(&event_loop);
        let callback_done = stub::dispatch_on_loop_thread(move || stopper.stop());
        callback_done.recv_timeout(Duration::from_secs(2)).unwrap();

        done.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(!event_loop.is_running());
    }

    #[test]
    fn loop_can_run_again_after_stop() {
        let _serial = stub::serial();
        let event_loop = Arc::new(ZoomEventLoop::new(stub::api()));

        for _ in 0..2 {
            let done = spawn_run(&event_loop);
            assert!(stub::wait_for_loop(Duration::from_secs(2)));
            event_loop.stop();
            done.recv_timeout(Duration::from_secs(2)).unwrap();
        }
    }
}
