//! The raw lock: a readers-writer state machine without a protected value.
//!
//! See the documentation for the [`RawRwLock`] type for details.

use crate::loom::sync::{Condvar, Mutex};
use core::fmt;

/// A blocking [readers-writer lock] state machine, not holding any data.
///
/// This type arbitrates access but protects nothing by itself: acquire and
/// release calls must be paired manually by the caller. It is useful when the
/// guarded resource is not a value the lock can own, such as a file on disk
/// or an external device. When the shared state *is* an in-memory value,
/// prefer [`RwLock`](crate::RwLock), which couples data access to lock
/// ownership and releases automatically.
///
/// Holds are anonymous: the lock does not record which thread acquired, so a
/// hold may be released from a different thread than the one that acquired
/// it. The flip side is that unpaired releases cannot be attributed; they are
/// detected against the aggregate state and panic.
///
/// # Fairness
///
/// This lock is *write-preferring*: while at least one writer is waiting, new
/// readers block, so a waiting writer only has to wait out the readers that
/// already hold the lock. A continuous stream of readers therefore cannot
/// starve a writer. No FIFO order is guaranteed among waiting threads of the
/// same kind, and a continuous stream of writers can starve readers.
///
/// # Loom-specific behavior
///
/// When `cfg(loom)` is enabled, the internal mutex and condition variable are
/// replaced with Loom's simulated versions.
///
/// [readers-writer lock]: https://en.wikipedia.org/wiki/Readers%E2%80%93writer_lock
pub struct RawRwLock {
    state: Mutex<State>,
    cond: Condvar,
}

/// Lock state, guarded by [`RawRwLock::state`].
#[derive(Debug)]
struct State {
    /// Number of threads currently holding read access.
    ///
    /// Invariant: nonzero only while `writer_active` is false.
    readers: usize,

    /// Set while a thread holds exclusive write access.
    writer_active: bool,

    /// Number of threads blocked in [`RawRwLock::acquire_write`].
    ///
    /// New readers are held back while this is nonzero, so a waiting writer
    /// cannot be starved by readers arriving after it.
    writers_waiting: usize,
}

// === impl RawRwLock ===

impl RawRwLock {
    loom_const_fn! {
        /// Returns a new, unlocked `RawRwLock`.
        ///
        /// # Examples
        ///
        /// ```
        /// use hypha::RawRwLock;
        ///
        /// let lock = RawRwLock::new();
        /// # drop(lock);
        /// ```
        #[must_use]
        pub fn new() -> Self {
            Self {
                state: Mutex::new(State {
                    readers: 0,
                    writer_active: false,
                    writers_waiting: 0,
                }),
                cond: Condvar::new(),
            }
        }
    }

    /// Acquires read access, blocking the calling thread until no writer
    /// holds or is waiting for the lock.
    ///
    /// Multiple threads may hold read access simultaneously. The hold must be
    /// released with a matching call to [`release_read`], from this thread or
    /// any other.
    ///
    /// [`release_read`]: Self::release_read
    #[cfg_attr(test, track_caller)]
    pub fn acquire_read(&self) {
        let mut state = self.state.lock();
        while state.writer_active || state.writers_waiting > 0 {
            trace!(
                readers = state.readers,
                writer_active = state.writer_active,
                writers_waiting = state.writers_waiting,
                "RawRwLock::acquire_read -> waiting"
            );
            self.cond.wait(&mut state);
        }
        assert!(
            state.readers < usize::MAX,
            "read lock counter overflow! this is very bad"
        );
        state.readers += 1;
        trace!(readers = state.readers, "RawRwLock::acquire_read -> acquired");
    }

    /// Attempts to acquire read access without blocking.
    ///
    /// Returns `true` if read access was acquired. Fails if a writer
    /// currently holds the lock *or* is waiting for it; the latter keeps this
    /// method consistent with [`acquire_read`]'s admission policy.
    ///
    /// [`acquire_read`]: Self::acquire_read
    #[cfg_attr(test, track_caller)]
    #[must_use = "if `true` is returned, the hold must be released with `release_read`"]
    pub fn try_acquire_read(&self) -> bool {
        let mut state = self.state.lock();
        if test_dbg!(state.writer_active || state.writers_waiting > 0) {
            return false;
        }
        assert!(
            state.readers < usize::MAX,
            "read lock counter overflow! this is very bad"
        );
        state.readers += 1;
        trace!(
            readers = state.readers,
            "RawRwLock::try_acquire_read -> acquired"
        );
        true
    }

    /// Releases read access previously acquired with [`acquire_read`] or
    /// [`try_acquire_read`].
    ///
    /// If this was the last outstanding read hold, all threads blocked on the
    /// lock are woken, allowing a waiting writer to proceed.
    ///
    /// # Panics
    ///
    /// Panics if no read hold is outstanding. The lock state is left
    /// untouched by such a call.
    ///
    /// [`acquire_read`]: Self::acquire_read
    /// [`try_acquire_read`]: Self::try_acquire_read
    #[track_caller]
    pub fn release_read(&self) {
        let mut state = self.state.lock();
        assert!(
            state.readers > 0,
            "tried to release a read lock that isn't held! this is a bug in the calling code"
        );
        debug_assert!(
            !state.writer_active,
            "a writer was active while a read lock was held, something is Very Wrong!"
        );
        state.readers -= 1;
        trace!(readers = state.readers, "RawRwLock::release_read");
        if state.readers == 0 {
            // last reader out; wake all waiters so a pending writer can
            // re-check and proceed.
            test_debug!("RawRwLock::release_read -> notifying all waiters");
            self.cond.notify_all();
        }
    }

    /// Acquires exclusive write access, blocking the calling thread until no
    /// readers hold the lock and no other writer is active.
    ///
    /// While this call is blocked it counts as a *waiting* writer: new
    /// readers are held back until it has acquired and released. The hold
    /// must be released with a matching call to [`release_write`], from this
    /// thread or any other.
    ///
    /// [`release_write`]: Self::release_write
    #[cfg_attr(test, track_caller)]
    pub fn acquire_write(&self) {
        let mut state = self.state.lock();
        state.writers_waiting += 1;
        while state.readers > 0 || state.writer_active {
            trace!(
                readers = state.readers,
                writer_active = state.writer_active,
                writers_waiting = state.writers_waiting,
                "RawRwLock::acquire_write -> waiting"
            );
            self.cond.wait(&mut state);
        }
        state.writers_waiting -= 1;
        state.writer_active = true;
        trace!("RawRwLock::acquire_write -> acquired");
    }

    /// Attempts to acquire exclusive write access without blocking.
    ///
    /// Returns `true` if write access was acquired, which requires the lock
    /// to be entirely free: no readers and no active writer. A `true` return
    /// must be paired with a call to [`release_write`].
    ///
    /// [`release_write`]: Self::release_write
    #[cfg_attr(test, track_caller)]
    #[must_use = "if `true` is returned, the hold must be released with `release_write`"]
    pub fn try_acquire_write(&self) -> bool {
        let mut state = self.state.lock();
        if test_dbg!(state.readers > 0 || state.writer_active) {
            return false;
        }
        state.writer_active = true;
        trace!("RawRwLock::try_acquire_write -> acquired");
        true
    }

    /// Releases exclusive write access previously acquired with
    /// [`acquire_write`] or [`try_acquire_write`].
    ///
    /// All threads blocked on the lock are woken; waiting readers and writers
    /// re-check their conditions and compete for the next hold.
    ///
    /// # Panics
    ///
    /// Panics if no write hold is outstanding. The lock state is left
    /// untouched by such a call.
    ///
    /// [`acquire_write`]: Self::acquire_write
    /// [`try_acquire_write`]: Self::try_acquire_write
    #[track_caller]
    pub fn release_write(&self) {
        let mut state = self.state.lock();
        assert!(
            state.writer_active,
            "tried to release a write lock that isn't held! this is a bug in the calling code"
        );
        debug_assert_eq!(
            state.readers, 0,
            "readers were active while a write lock was held, something is Very Wrong!"
        );
        state.writer_active = false;
        trace!("RawRwLock::release_write");
        // Wake all waiters; readers and writers re-check and compete.
        self.cond.notify_all();
    }

    /// Returns the current number of threads holding read access.
    ///
    /// # Note
    ///
    /// This method is not synchronized with attempts to acquire the lock, and
    /// its value may be out of date as soon as it is returned. It is **not**
    /// intended to be used for synchronization purposes! It is intended only
    /// for debugging purposes or for use as a heuristic.
    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.state.lock().readers
    }

    /// Returns `true` if a thread currently holds write access.
    ///
    /// # Note
    ///
    /// This method is not synchronized and its value may be out of date as
    /// soon as it is returned. It is **not** intended to be used for
    /// synchronization purposes! It is intended only for debugging purposes
    /// or for use as a heuristic.
    #[must_use]
    pub fn has_writer(&self) -> bool {
        self.state.lock().writer_active
    }

    /// Returns `true` if the lock is held in any way, shared or exclusive.
    ///
    /// # Note
    ///
    /// This method is not synchronized and its value may be out of date as
    /// soon as it is returned. It is **not** intended to be used for
    /// synchronization purposes! It is intended only for debugging purposes
    /// or for use as a heuristic.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        let state = self.state.lock();
        state.readers > 0 || state.writer_active
    }
}

impl Default for RawRwLock {
    /// Returns a new, unlocked `RawRwLock`.
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawRwLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("RawRwLock");
        match self.state.try_lock() {
            Some(state) => s
                .field("readers", &state.readers)
                .field("writer_active", &state.writer_active)
                .field("writers_waiting", &state.writers_waiting)
                .finish(),
            None => s.field("state", &format_args!("<locked>")).finish(),
        }
    }
}
