use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::sync::MutexGuard;

use tracing::error;

static LOCK_RECOVERIES: AtomicU64 = AtomicU64::new(0);

/// Number of times a poisoned lock has been recovered in this process.
pub fn lock_recoveries() -> u64 {
    LOCK_RECOVERIES.load(Ordering::Relaxed)
}

/// Locks `lock`, taking the inner guard if a previous holder panicked.
///
/// Session tables must stay usable after a panicking reader task, so
/// poisoning is logged and counted rather than propagated.
pub fn mutex_lock_or_recover<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        LOCK_RECOVERIES.fetch_add(1, Ordering::Relaxed);
        error!("mutex poisoned by a panicked task; continuing with last written state");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn recovers_poisoned_mutex() {
        let shared = Arc::new(Mutex::new(vec![1]));
        let clone = Arc::clone(&shared);
        let _ = std::thread::spawn(move || {
            let mut guard = clone.lock().unwrap();
            guard.push(2);
            panic!("poison");
        })
        .join();

        let before = lock_recoveries();
        let guard = mutex_lock_or_recover(&shared);
        assert_eq!(*guard, vec![1, 2]);
        assert!(lock_recoveries() > before);
    }
}
