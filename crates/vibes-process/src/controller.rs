use std::io;
use std::sync::Mutex;

use vibes_common::mutex_lock_or_recover;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Kill,
}

/// Delivers signals to whole process groups.
pub trait ProcessController: Send + Sync {
    /// Signals every process in group `pgid`. A group that no longer
    /// exists is not an error: `Ok(false)` is returned instead.
    fn signal_group(&self, pgid: u32, signal: Signal) -> io::Result<bool>;
}

pub struct UnixProcessController;

#[cfg(unix)]
impl ProcessController for UnixProcessController {
    fn signal_group(&self, pgid: u32, signal: Signal) -> io::Result<bool> {
        let pgid_t: libc::pid_t = pgid
            .try_into()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "PGID out of range"))?;
        if pgid_t <= 1 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "refusing to signal init or the caller's group",
            ));
        }

        let sig = match signal {
            Signal::Term => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };

        // SAFETY: killpg has no memory-safety preconditions.
        let result = unsafe { libc::killpg(pgid_t, sig) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ESRCH) => Ok(false),
            _ => Err(err),
        }
    }
}

/// Records signals instead of sending them.
#[derive(Default)]
pub struct RecordingProcessController {
    signals_sent: Mutex<Vec<(u32, Signal)>>,
}

impl RecordingProcessController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals_sent(&self) -> Vec<(u32, Signal)> {
        mutex_lock_or_recover(&self.signals_sent).clone()
    }
}

impl ProcessController for RecordingProcessController {
    fn signal_group(&self, pgid: u32, signal: Signal) -> io::Result<bool> {
        mutex_lock_or_recover(&self.signals_sent).push((pgid, signal));
        Ok(true)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn rejects_reserved_groups() {
        let controller = UnixProcessController;
        assert!(controller.signal_group(0, Signal::Term).is_err());
        assert!(controller.signal_group(1, Signal::Term).is_err());
    }

    #[test]
    fn recording_controller_keeps_order() {
        let controller = RecordingProcessController::new();
        controller.signal_group(42, Signal::Term).unwrap();
        controller.signal_group(42, Signal::Kill).unwrap();
        assert_eq!(
            controller.signals_sent(),
            vec![(42, Signal::Term), (42, Signal::Kill)]
        );
    }
}
