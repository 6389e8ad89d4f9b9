//! Interrupt handling while a run is in the foreground.
//!
//! The first SIGINT/SIGTERM is forwarded so the run can be stopped
//! gracefully; a second one exits immediately.

use std::io;
#[cfg(unix)]
use std::thread;
#[cfg(unix)]
use std::thread::JoinHandle;

#[cfg(unix)]
use signal_hook::consts::SIGINT;
#[cfg(unix)]
use signal_hook::consts::SIGTERM;
#[cfg(unix)]
use signal_hook::iterator::Handle;
#[cfg(unix)]
use signal_hook::iterator::Signals;
use tokio::sync::mpsc;
use tracing::info;
use tracing::warn;

#[cfg(unix)]
pub struct SignalHandler {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

#[cfg(unix)]
impl SignalHandler {
    /// Starts listening. The receiver yields the first signal only.
    pub fn setup() -> io::Result<(Self, mpsc::UnboundedReceiver<i32>)> {
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let handle = signals.handle();
        let (tx, rx) = mpsc::unbounded_channel();

        let thread = thread::Builder::new()
            .name("signal-handler".to_string())
            .spawn(move || {
                let mut received = 0u32;
                for sig in signals.forever() {
                    received += 1;
                    if received == 1 {
                        info!(signal = sig, "Received signal, stopping the run");
                        let _ = tx.send(sig);
                    } else {
                        warn!(signal = sig, "Received second signal, exiting");
                        std::process::exit(128 + sig);
                    }
                }
            })?;

        Ok((
            Self {
                handle,
                thread: Some(thread),
            },
            rx,
        ))
    }
}

#[cfg(unix)]
impl Drop for SignalHandler {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(not(unix))]
pub struct SignalHandler {
    task: tokio::task::JoinHandle<()>,
}

#[cfg(not(unix))]
impl SignalHandler {
    /// Starts listening for Ctrl-C. Must be called within a tokio runtime.
    pub fn setup() -> io::Result<(Self, mpsc::UnboundedReceiver<i32>)> {
        const SIGINT: i32 = 2;
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            info!(signal = SIGINT, "Received signal, stopping the run");
            let _ = tx.send(SIGINT);
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(signal = SIGINT, "Received second signal, exiting");
                std::process::exit(128 + SIGINT);
            }
        });
        Ok((Self { task }, rx))
    }
}

#[cfg(not(unix))]
impl Drop for SignalHandler {
    fn drop(&mut self) {
        self.task.abort();
    }
}
