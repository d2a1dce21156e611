//! Reentrant entry lock guarding a session.
//!
//! A thread enters the session before issuing commands and leaves when the
//! returned [`Entered`] guard drops. Entries nest on the same thread; other
//! threads block until the outermost guard is released.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::trace;

use crate::{Error, Result};

#[derive(Debug, Default)]
struct LockState {
    owner: Option<ThreadId>,
    depth: usize,
}

/// Reentrant lock with an explicit owner and nesting depth.
#[derive(Debug, Default)]
pub struct EntryLock {
    state: Mutex<LockState>,
    released: Condvar,
}

impl EntryLock {
    /// Creates an unowned lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, LockState>> {
        self.state.lock().map_err(poisoned)
    }

    /// Enters on the current thread, blocking while another thread holds
    /// the lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalState`] if a previous holder panicked while
    /// updating the lock state.
    pub fn enter(lock: &Arc<Self>) -> Result<Entered> {
        let me = thread::current().id();
        let mut state = lock.state()?;
        while state.owner.is_some_and(|owner| owner != me) {
            state = lock.released.wait(state).map_err(poisoned)?;
        }
        state.owner = Some(me);
        state.depth += 1;
        trace!(depth = state.depth, "entered");
        drop(state);
        Ok(Entered {
            lock: Arc::clone(lock),
        })
    }

    /// Returns true if the current thread holds the lock.
    #[must_use]
    pub fn is_held_by_current_thread(&self) -> bool {
        let me = thread::current().id();
        self.state
            .lock()
            .is_ok_and(|state| state.owner == Some(me))
    }

    /// Current nesting depth; zero when unowned.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.state.lock().map_or(0, |state| state.depth)
    }

    fn leave(&self) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.depth = state.depth.saturating_sub(1);
        trace!(depth = state.depth, "left");
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.released.notify_one();
        }
    }
}

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::IllegalState("Session lock poisoned".to_string())
}

/// Proof that the current thread has entered a session.
///
/// Dropping the guard leaves; the lock is released when the outermost
/// guard drops.
#[derive(Debug)]
#[must_use = "the session is left as soon as the guard drops"]
pub struct Entered {
    lock: Arc<EntryLock>,
}

impl Entered {
    /// Nesting depth including this guard.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.lock.depth()
    }
}

impl Drop for Entered {
    fn drop(&mut self) {
        self.lock.leave();
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_reentrant_entries_nest() {
        let lock = Arc::new(EntryLock::new());
        assert!(!lock.is_held_by_current_thread());

        let outer = EntryLock::enter(&lock).unwrap();
        let inner = EntryLock::enter(&lock).unwrap();
        assert_eq!(inner.depth(), 2);
        drop(inner);
        assert!(lock.is_held_by_current_thread());
        assert_eq!(outer.depth(), 1);
        drop(outer);

        assert!(!lock.is_held_by_current_thread());
        assert_eq!(lock.depth(), 0);
    }

    #[test]
    fn test_other_thread_blocks_until_release() {
        let lock = Arc::new(EntryLock::new());
        let guard = EntryLock::enter(&lock).unwrap();

        let (tx, rx) = mpsc::channel();
        let contender = Arc::clone(&lock);
        let handle = thread::spawn(move || {
            let entered = EntryLock::enter(&contender).unwrap();
            tx.send(contender.is_held_by_current_thread()).unwrap();
            drop(entered);
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(guard);
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        handle.join().unwrap();
    }

    #[test]
    fn test_not_held_from_other_thread() {
        let lock = Arc::new(EntryLock::new());
        let _guard = EntryLock::enter(&lock).unwrap();
        let other = Arc::clone(&lock);
        let held = thread::spawn(move || other.is_held_by_current_thread())
            .join()
            .unwrap();
        assert!(!held);
    }
}
