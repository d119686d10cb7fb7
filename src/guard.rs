//! Serialises mutating operations and rejects nested calls from collaborators
//!
//! Callers on other threads queue on the inner mutex. A call made from the
//! thread that already holds the guard can only be a collaborator calling back
//! in, and fails with `Reentrant` instead of deadlocking.
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crate::error::{CustodyError, Result};

#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    serial: Mutex<()>,
    owner: Mutex<Option<ThreadId>>,
}

/// Held for the duration of a guarded operation. Dropping it clears the owner
/// and releases the queue, so every exit path, including `?` returns and
/// panics, unlocks.
#[derive(Debug)]
pub struct GuardToken<'a> {
    guard: &'a ReentrancyGuard,
    _serial: MutexGuard<'a, ()>,
}

// neither mutex protects data that a panic could leave half written
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks while another thread holds the guard.
    pub fn enter(&self) -> Result<GuardToken<'_>> {
        let me = thread::current().id();
        if *lock(&self.owner) == Some(me) {
            return Err(CustodyError::Reentrant);
        }

        let serial = lock(&self.serial);
        *lock(&self.owner) = Some(me);
        Ok(GuardToken {
            guard: self,
            _serial: serial,
        })
    }

    pub fn is_locked(&self) -> bool {
        lock(&self.owner).is_some()
    }
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        // runs before `_serial` is released
        *lock(&self.guard.owner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn nested_entry_is_rejected() {
        let guard = ReentrancyGuard::new();

        let token = guard.enter().unwrap();
        assert!(guard.is_locked());
        assert!(matches!(guard.enter(), Err(CustodyError::Reentrant)));

        drop(token);
        assert!(!guard.is_locked());
        assert!(guard.enter().is_ok());
    }

    #[test]
    fn released_on_error_path() {
        let guard = ReentrancyGuard::new();

        let failing = || -> Result<()> {
            let _token = guard.enter()?;
            Err(CustodyError::ZeroAmount)
        };

        assert!(failing().is_err());
        assert!(!guard.is_locked());
    }

    #[test]
    fn other_threads_wait_instead_of_failing() {
        let guard = Arc::new(ReentrancyGuard::new());
        let inside = Arc::new(AtomicUsize::new(0));

        let token = guard.enter().unwrap();
        let waiter = {
            let guard = guard.clone();
            let inside = inside.clone();
            thread::spawn(move || {
                let _token = guard.enter().expect("second thread queues, not rejected");
                inside.fetch_add(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(inside.load(Ordering::SeqCst), 0);

        drop(token);
        waiter.join().unwrap();
        assert_eq!(inside.load(Ordering::SeqCst), 1);
        assert!(!guard.is_locked());
    }
}
