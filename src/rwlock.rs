//! A blocking [readers-writer lock] protecting a value.
//!
//! See the documentation for the [`RwLock`] type for details.
//!
//! [readers-writer lock]: https://en.wikipedia.org/wiki/Readers%E2%80%93writer_lock

use crate::{
    loom::cell::{ConstPtr, MutPtr, UnsafeCell},
    raw::RawRwLock,
};
use core::{
    fmt,
    ops::{Deref, DerefMut},
};

/// A blocking [readers-writer lock].
///
/// This type of lock allows a number of readers or at most one writer at any
/// point in time. The write portion of this lock typically allows
/// modification of the underlying data (exclusive access) and the read
/// portion of this lock typically allows for read-only access (shared
/// access).
///
/// Threads that cannot acquire the lock are put to sleep by the operating
/// system rather than spinning, so this lock is suited to critical sections
/// of any length. The lock arbitration itself is a [`RawRwLock`]; this type
/// couples it to the protected value, handing out RAII guards so that every
/// acquisition is released exactly once.
///
/// # Fairness
///
/// This lock is *write-preferring*: while a writer is waiting, new readers
/// are held back until the writer has acquired and released the lock. A
/// steady stream of readers therefore cannot starve writers. The reverse is
/// not guaranteed, and a steady stream of writers may starve readers.
///
/// One consequence of this policy is that read locks do not nest reliably.
/// If a thread that already holds a read lock acquires a second one while a
/// writer is waiting, the second acquisition blocks behind the writer, which
/// in turn is blocked on the first read hold, deadlocking the thread. Hold
/// at most one read lock at a time per thread.
///
/// # Examples
///
/// ```
/// use hypha::RwLock;
///
/// let lock = RwLock::new(5);
///
/// // many reader locks can be held at once
/// {
///     let r1 = lock.read();
///     let r2 = lock.read();
///     assert_eq!(*r1, 5);
///     assert_eq!(*r2, 5);
/// } // read locks are dropped at this point
///
/// // only one write lock may be held, however
/// {
///     let mut w = lock.write();
///     *w += 1;
///     assert_eq!(*w, 6);
/// } // write lock is dropped here
/// ```
///
/// # Loom-specific behavior
///
/// When `cfg(loom)` is enabled, this lock will use Loom's simulated mutex,
/// condition variable, and checked `UnsafeCell`.
///
/// [readers-writer lock]: https://en.wikipedia.org/wiki/Readers%E2%80%93writer_lock
pub struct RwLock<T: ?Sized> {
    lock: RawRwLock,
    data: UnsafeCell<T>,
}

/// An RAII implementation of a "scoped read lock" of a [`RwLock`]. When this
/// structure is dropped (falls out of scope), the lock will be unlocked.
///
/// The data protected by the [`RwLock`] can be immutably accessed through
/// this guard via its [`Deref`] implementation.
///
/// This structure is created by the [`read`] and [`try_read`] methods on
/// [`RwLock`].
///
/// [`read`]: RwLock::read
/// [`try_read`]: RwLock::try_read
#[must_use = "if unused, the `RwLock` will immediately unlock"]
pub struct RwLockReadGuard<'lock, T: ?Sized> {
    /// /!\ WARNING: semi-load-bearing drop order /!\
    ///
    /// This struct's field ordering is important for Loom tests; the
    /// `ConstPtr` must be dropped before the read lock is released, as
    /// releasing the lock may allow another thread to access the cell, and
    /// Loom will still consider the data to be "accessed" until the
    /// `ConstPtr` is dropped.
    data: ConstPtr<T>,
    _release: ReleaseRead<'lock>,
}

/// Releases a read hold on drop, after the guard's data pointer.
struct ReleaseRead<'lock>(&'lock RawRwLock);

/// An RAII implementation of a "scoped write lock" of a [`RwLock`]. When this
/// structure is dropped (falls out of scope), the lock will be unlocked.
///
/// The data protected by the [`RwLock`] can be mutably accessed through this
/// guard via its [`Deref`] and [`DerefMut`] implementations.
///
/// This structure is created by the [`write`] and [`try_write`] methods on
/// [`RwLock`].
///
/// [`write`]: RwLock::write
/// [`try_write`]: RwLock::try_write
#[must_use = "if unused, the `RwLock` will immediately unlock"]
pub struct RwLockWriteGuard<'lock, T: ?Sized> {
    /// /!\ WARNING: semi-load-bearing drop order /!\
    ///
    /// This struct's field ordering is important for Loom tests; the `MutPtr`
    /// must be dropped before the write lock is released, as releasing the
    /// lock may allow another thread to access the cell, and Loom will still
    /// consider the data to be "accessed mutably" until the `MutPtr` is
    /// dropped.
    data: MutPtr<T>,
    _release: ReleaseWrite<'lock>,
}

/// Releases a write hold on drop, after the guard's data pointer.
struct ReleaseWrite<'lock>(&'lock RawRwLock);

// === impl RwLock ===

impl<T> RwLock<T> {
    loom_const_fn! {
        /// Creates a new, unlocked `RwLock<T>` protecting the provided `data`.
        ///
        /// # Examples
        ///
        /// ```
        /// use hypha::RwLock;
        ///
        /// let lock = RwLock::new(5);
        /// # drop(lock);
        /// ```
        #[must_use]
        pub fn new(data: T) -> Self {
            Self {
                lock: RawRwLock::new(),
                data: UnsafeCell::new(data),
            }
        }
    }

    /// Consumes this `RwLock`, returning the guarded data.
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> RwLock<T> {
    fn read_guard(&self) -> RwLockReadGuard<'_, T> {
        RwLockReadGuard {
            data: self.data.get(),
            _release: ReleaseRead(&self.lock),
        }
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, T> {
        RwLockWriteGuard {
            data: self.data.get_mut(),
            _release: ReleaseWrite(&self.lock),
        }
    }

    /// Locks this `RwLock` for shared read access, blocking the calling
    /// thread until it can be acquired.
    ///
    /// The calling thread will sleep until there is no writer which holds or
    /// is waiting for the lock. There may be other readers currently inside
    /// the lock when this method returns.
    ///
    /// Returns an RAII guard which will release this thread's shared access
    /// once it is dropped.
    #[cfg_attr(test, track_caller)]
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.lock.acquire_read();
        self.read_guard()
    }

    /// Attempts to acquire this `RwLock` for shared read access.
    ///
    /// If the access could not be granted at this time, this method returns
    /// [`None`]. Otherwise, [`Some`]`(`[`RwLockReadGuard`]`)` containing a
    /// RAII guard is returned. The shared access is released when it is
    /// dropped.
    ///
    /// This method does not block. Like [`read`], it fails while a writer is
    /// *waiting* for the lock, not only while one holds it.
    ///
    /// [`read`]: Self::read
    #[cfg_attr(test, track_caller)]
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        if self.lock.try_acquire_read() {
            Some(self.read_guard())
        } else {
            None
        }
    }

    /// Locks this `RwLock` for exclusive write access, blocking the calling
    /// thread until write access can be acquired.
    ///
    /// This method will not return while other writers or other readers
    /// currently have access to the lock. While it blocks, it counts as a
    /// waiting writer and holds back new readers.
    ///
    /// Returns an RAII guard which will drop the write access of this
    /// `RwLock` when dropped.
    #[cfg_attr(test, track_caller)]
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.lock.acquire_write();
        self.write_guard()
    }

    /// Attempts to acquire this `RwLock` for exclusive write access.
    ///
    /// If the access could not be granted at this time, this method returns
    /// [`None`]. Otherwise, [`Some`]`(`[`RwLockWriteGuard`]`)` containing a
    /// RAII guard is returned. The write access is released when it is
    /// dropped.
    ///
    /// This method does not block.
    #[cfg_attr(test, track_caller)]
    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
        if self.lock.try_acquire_write() {
            Some(self.write_guard())
        } else {
            None
        }
    }

    /// Acquires a read lock, calls `f` with a shared reference to the guarded
    /// data, and releases the lock when `f` returns.
    ///
    /// The lock is released even if `f` panics.
    ///
    /// # Examples
    ///
    /// ```
    /// use hypha::RwLock;
    ///
    /// let lock = RwLock::new(String::from("hello"));
    /// let len = lock.with_read(|s| s.len());
    /// assert_eq!(len, 5);
    /// ```
    #[cfg_attr(test, track_caller)]
    pub fn with_read<U>(&self, f: impl FnOnce(&T) -> U) -> U {
        let guard = self.read();
        f(&guard)
    }

    /// Acquires the write lock, calls `f` with a mutable reference to the
    /// guarded data, and releases the lock when `f` returns.
    ///
    /// The lock is released even if `f` panics.
    ///
    /// # Examples
    ///
    /// ```
    /// use hypha::RwLock;
    ///
    /// let lock = RwLock::new(String::from("hello"));
    /// lock.with_write(|s| s.push_str(", world"));
    /// assert_eq!(lock.with_read(|s| s.clone()), "hello, world");
    /// ```
    #[cfg_attr(test, track_caller)]
    pub fn with_write<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        let mut guard = self.write();
        f(&mut guard)
    }

    /// Returns the current number of readers holding a read lock.
    ///
    /// # Note
    ///
    /// This method is not synchronized with attempts to increment the reader
    /// count, and its value may become out of date as soon as it is read.
    /// This is **not** intended to be used for synchronization purposes! It
    /// is intended only for debugging purposes or for use as a heuristic.
    #[inline]
    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.lock.reader_count()
    }

    /// Returns `true` if there is currently a writer holding a write lock.
    ///
    /// # Note
    ///
    /// This method is not synchronized and its value may become out of date
    /// as soon as it is read. This is **not** intended to be used for
    /// synchronization purposes! It is intended only for debugging purposes
    /// or for use as a heuristic.
    #[inline]
    #[must_use]
    pub fn has_writer(&self) -> bool {
        self.lock.has_writer()
    }

    /// Returns a mutable reference to the underlying data.
    ///
    /// Since this call borrows the `RwLock` mutably, no actual locking needs
    /// to take place -- the mutable borrow statically guarantees no locks
    /// exist.
    ///
    /// # Examples
    ///
    /// ```
    /// let mut lock = hypha::RwLock::new(0);
    /// *lock.get_mut() = 10;
    /// assert_eq!(*lock.read(), 10);
    /// ```
    pub fn get_mut(&mut self) -> &mut T {
        unsafe {
            // Safety: since this call borrows the `RwLock` mutably, no actual
            // locking needs to take place -- the mutable borrow statically
            // guarantees no locks exist.
            self.data.with_mut(|data| &mut *data)
        }
    }
}

impl<T: Default> Default for RwLock<T> {
    /// Creates a new `RwLock<T>`, with the `Default` value for T.
    fn default() -> RwLock<T> {
        RwLock::new(Default::default())
    }
}

impl<T> From<T> for RwLock<T> {
    /// Creates a new instance of an `RwLock<T>` which is unlocked.
    /// This is equivalent to [`RwLock::new`].
    fn from(t: T) -> Self {
        RwLock::new(t)
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("RwLock");
        match self.try_read() {
            Some(data) => s.field("data", &data),
            None => s.field("data", &format_args!("<write locked>")),
        };
        s.field("lock", &self.lock).finish()
    }
}

unsafe impl<T: ?Sized + Send> Send for RwLock<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for RwLock<T> {}

// === impl RwLockReadGuard ===

impl<T: ?Sized> Deref for RwLockReadGuard<'_, T> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &Self::Target {
        unsafe {
            // Safety: we are holding a read lock, so it is okay to dereference
            // the const pointer immutably.
            self.data.deref()
        }
    }
}

impl<T: ?Sized, R: ?Sized> AsRef<R> for RwLockReadGuard<'_, T>
where
    T: AsRef<R>,
{
    #[inline]
    fn as_ref(&self) -> &R {
        self.deref().as_ref()
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RwLockReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.deref().fmt(f)
    }
}

impl<T: ?Sized + fmt::Display> fmt::Display for RwLockReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.deref().fmt(f)
    }
}

/// A [`RwLockReadGuard`] is [`Sync`] if `T` is [`Sync`], as sharing the guard
/// only permits shared (`&T`) access to the data.
unsafe impl<T: ?Sized + Sync> Sync for RwLockReadGuard<'_, T> {}

/// A [`RwLockReadGuard`] is [`Send`] if `T` is [`Sync`], because sending a
/// `RwLockReadGuard` is equivalent to sending a `&T`. Read holds are
/// anonymous, so the lock permits a hold to be released from a different
/// thread than the one that acquired it.
unsafe impl<T: ?Sized + Sync> Send for RwLockReadGuard<'_, T> {}

impl Drop for ReleaseRead<'_> {
    #[inline]
    #[cfg_attr(test, track_caller)]
    fn drop(&mut self) {
        self.0.release_read();
    }
}

// === impl RwLockWriteGuard ===

impl<T: ?Sized> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;
    #[inline]
    fn deref(&self) -> &Self::Target {
        unsafe {
            // Safety: we are holding the write lock, so it is okay to
            // dereference the mut pointer.
            &*self.data.deref()
        }
    }
}

impl<T: ?Sized> DerefMut for RwLockWriteGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe {
            // Safety: we are holding the write lock, so it is okay to
            // dereference the mut pointer.
            self.data.deref()
        }
    }
}

impl<T: ?Sized, R: ?Sized> AsRef<R> for RwLockWriteGuard<'_, T>
where
    T: AsRef<R>,
{
    #[inline]
    fn as_ref(&self) -> &R {
        self.deref().as_ref()
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RwLockWriteGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.deref().fmt(f)
    }
}

impl<T: ?Sized + fmt::Display> fmt::Display for RwLockWriteGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.deref().fmt(f)
    }
}

/// A [`RwLockWriteGuard`] is only [`Send`] if `T` is [`Send`] and [`Sync`],
/// because it can be used to *move* a `T` across thread boundaries, as it
/// allows mutable access to the `T` that can be used with
/// [`core::mem::replace`] or [`core::mem::swap`].
unsafe impl<T: ?Sized + Send + Sync> Send for RwLockWriteGuard<'_, T> {}

/// A [`RwLockWriteGuard`] is only [`Sync`] if `T` is [`Send`] and [`Sync`],
/// because it can be used to *move* a `T` across thread boundaries, as it
/// allows mutable access to the `T` that can be used with
/// [`core::mem::replace`] or [`core::mem::swap`].
unsafe impl<T: ?Sized + Send + Sync> Sync for RwLockWriteGuard<'_, T> {}

impl Drop for ReleaseWrite<'_> {
    #[inline]
    #[cfg_attr(test, track_caller)]
    fn drop(&mut self) {
        self.0.release_write();
    }
}

#[cfg(test)]
mod tests;
