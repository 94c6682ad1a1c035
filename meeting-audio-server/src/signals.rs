//! SIGINT/SIGTERM handling.
//!
//! Both the streaming server and the one-shot bot shut down through the same
//! orderly path (leave meetings, finalize recordings, stop the SDK loop), so a
//! signal only flips a watch channel that the caller polls or awaits.

use std::time::Duration;

use tokio::sync::watch;

/// Shared shutdown state. Clones observe and trigger the same signal.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Spawn a task on the current runtime that triggers shutdown on the
    /// first SIGINT or SIGTERM (Ctrl+C elsewhere).
    #[cfg(unix)]
    pub fn spawn_listener(&self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let tx = self.tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => log::info!("Received SIGTERM, initiating shutdown"),
                _ = sigint.recv() => log::info!("Received SIGINT, initiating shutdown"),
            }
            let _ = tx.send(true);
        });
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn spawn_listener(&self) -> std::io::Result<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Received Ctrl+C, initiating shutdown");
                let _ = tx.send(true);
            }
        });
        Ok(())
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // Only fails if every sender is gone, and `self` holds one.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Block the current (non-async) thread until shutdown or `timeout`.
    /// Returns whether shutdown was triggered.
    pub fn wait_blocking(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while !self.is_triggered() {
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(50)));
        }
        true
    }
}
