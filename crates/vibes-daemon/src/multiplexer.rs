//! Arbitration of shared display surfaces between concurrent runs.
//!
//! Several runs may target the same message. At most one of them is
//! unpaused at a time; the registration table only remembers which session
//! last claimed a surface and can go stale, so live runs are consulted first.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;
use vibes_channel::Surface;
use vibes_common::mutex_lock_or_recover;

use crate::record::SessionName;

/// What the multiplexer needs to know about a live run.
pub trait AttachedRun {
    /// The process is alive and the run has not finished.
    fn is_running(&self) -> bool;
    /// The surface the run's stream currently edits.
    fn surface(&self) -> Surface;
    fn is_paused(&self) -> bool;
    /// Pauses the run's stream; the next render is suppressed.
    fn pause(&mut self);
}

#[derive(Debug, Default)]
pub struct Multiplexer {
    registrations: Mutex<HashMap<Surface, SessionName>>,
}

impl Multiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_run_message(&self, surface: Surface, session: SessionName) {
        debug!(surface = %surface, session = %session, "surface registered");
        mutex_lock_or_recover(&self.registrations).insert(surface, session);
    }

    pub fn unregister_run_message(&self, surface: Surface) {
        mutex_lock_or_recover(&self.registrations).remove(&surface);
    }

    /// Last session registered for `surface`. May be stale.
    pub fn registered_session(&self, surface: Surface) -> Option<SessionName> {
        mutex_lock_or_recover(&self.registrations).get(&surface).cloned()
    }

    /// The session that currently owns `surface`.
    ///
    /// A running, unpaused run whose stream targets the surface wins; the
    /// registration table is only a fallback.
    pub fn resolve_attached_running_session<'a, R, I>(&self, surface: Surface, runs: I) -> Option<SessionName>
    where
        R: AttachedRun + 'a,
        I: IntoIterator<Item = (&'a SessionName, &'a R)>,
    {
        runs.into_iter()
            .find(|(_, run)| run.is_running() && !run.is_paused() && run.surface() == surface)
            .map(|(name, _)| name.clone())
            .or_else(|| self.registered_session(surface))
    }

    /// Pauses every unpaused run on `surface` except `except`. Returns the
    /// sessions that were paused.
    pub fn pause_other_attached_runs<'a, R, I>(
        &self,
        surface: Surface,
        except: Option<&SessionName>,
        runs: I,
    ) -> Vec<SessionName>
    where
        R: AttachedRun + 'a,
        I: IntoIterator<Item = (&'a SessionName, &'a mut R)>,
    {
        let mut paused = Vec::new();
        for (name, run) in runs {
            if except == Some(name) {
                continue;
            }
            if !run.is_running() || run.is_paused() || run.surface() != surface {
                continue;
            }
            run.pause();
            debug!(session = %name, surface = %surface, "run paused for another owner");
            paused.push(name.clone());
        }
        paused
    }
}
