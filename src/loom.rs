//! Abstracts over `loom`'s instrumented types and the real `parking_lot`/std
//! ones, so the lock runs unmodified under the model checker.

#[allow(unused_imports)]
pub(crate) use self::inner::*;

#[cfg(loom)]
mod inner {
    #![allow(dead_code)]
    #![allow(unused_imports)]

    pub(crate) use loom::{cell, model, thread};

    pub(crate) mod sync {
        pub(crate) use loom::sync::Arc;

        use core::ops::{Deref, DerefMut};

        /// Mock version of `parking_lot::Mutex`, backed by `loom::sync::Mutex`.
        /// The API is slightly different, since the `parking_lot` mutex does
        /// not support poisoning.
        #[derive(Debug)]
        pub(crate) struct Mutex<T>(loom::sync::Mutex<T>);

        /// Mock version of `parking_lot::MutexGuard`.
        ///
        /// The inner guard is only ever `None` while `Condvar::wait` moves it
        /// through loom's poisoning-flavored `wait` signature.
        #[derive(Debug)]
        pub(crate) struct MutexGuard<'a, T>(Option<loom::sync::MutexGuard<'a, T>>);

        /// Mock version of `parking_lot::Condvar`, backed by
        /// `loom::sync::Condvar`.
        #[derive(Debug)]
        pub(crate) struct Condvar(loom::sync::Condvar);

        impl<T> Mutex<T> {
            #[track_caller]
            pub(crate) fn new(data: T) -> Self {
                Self(loom::sync::Mutex::new(data))
            }

            #[track_caller]
            pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
                let guard = self.0.lock().expect("loom mutex will never poison");
                MutexGuard(Some(guard))
            }

            #[track_caller]
            pub(crate) fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
                self.0.try_lock().ok().map(|guard| MutexGuard(Some(guard)))
            }
        }

        impl<T> Deref for MutexGuard<'_, T> {
            type Target = T;

            #[inline]
            fn deref(&self) -> &Self::Target {
                self.0.as_deref().expect("guard holds the lock until dropped")
            }
        }

        impl<T> DerefMut for MutexGuard<'_, T> {
            #[inline]
            fn deref_mut(&mut self) -> &mut Self::Target {
                self.0
                    .as_deref_mut()
                    .expect("guard holds the lock until dropped")
            }
        }

        impl Condvar {
            #[track_caller]
            pub(crate) fn new() -> Self {
                Self(loom::sync::Condvar::new())
            }

            /// Blocks until this condition variable is notified, releasing
            /// `guard`'s mutex while parked and reacquiring it before
            /// returning.
            #[track_caller]
            pub(crate) fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) {
                let taken = guard.0.take().expect("guard holds the lock until dropped");
                let reacquired = self.0.wait(taken).expect("loom mutex will never poison");
                guard.0 = Some(reacquired);
            }

            pub(crate) fn notify_one(&self) {
                self.0.notify_one();
            }

            pub(crate) fn notify_all(&self) {
                self.0.notify_all();
            }
        }
    }
}

#[cfg(not(loom))]
mod inner {
    #![allow(dead_code, unused_imports)]

    pub(crate) mod sync {
        pub(crate) use parking_lot::{Condvar, Mutex, MutexGuard};

        #[cfg(test)]
        pub(crate) use std::sync::Arc;
    }


    #[cfg(test)]
    pub(crate) fn model(f: impl FnOnce()) {
        let _trace = crate::util::test::trace_init();
        let _span = tracing::info_span!(
            "test",
            message = std::thread::current().name().unwrap_or("<unnamed>")
        )
        .entered();

        tracing::info!("started test...");
        f();
        tracing::info!("test completed successfully!");
    }

    pub(crate) mod cell {
        #[derive(Debug)]
        pub(crate) struct UnsafeCell<T: ?Sized>(core::cell::UnsafeCell<T>);

        impl<T> UnsafeCell<T> {
            pub(crate) const fn new(data: T) -> UnsafeCell<T> {
                UnsafeCell(core::cell::UnsafeCell::new(data))
            }

            #[inline(always)]
            #[must_use]
            pub(crate) fn into_inner(self) -> T {
                self.0.into_inner()
            }
        }

        impl<T: ?Sized> UnsafeCell<T> {
            #[inline(always)]
            pub(crate) fn with<F, R>(&self, f: F) -> R
            where
                F: FnOnce(*const T) -> R,
            {
                f(self.0.get())
            }

            #[inline(always)]
            pub(crate) fn with_mut<F, R>(&self, f: F) -> R
            where
                F: FnOnce(*mut T) -> R,
            {
                f(self.0.get())
            }

            #[inline(always)]
            pub(crate) fn get(&self) -> ConstPtr<T> {
                ConstPtr(self.0.get())
            }

            #[inline(always)]
            pub(crate) fn get_mut(&self) -> MutPtr<T> {
                MutPtr(self.0.get())
            }
        }

        #[derive(Debug)]
        pub(crate) struct ConstPtr<T: ?Sized>(*const T);

        impl<T: ?Sized> ConstPtr<T> {
            #[inline(always)]
            pub(crate) unsafe fn deref(&self) -> &T {
                &*self.0
            }
        }

        #[derive(Debug)]
        pub(crate) struct MutPtr<T: ?Sized>(*mut T);

        impl<T: ?Sized> MutPtr<T> {
            // Clippy knows that it's Bad and Wrong to construct a mutable reference
            // from an immutable one...but this function is intended to simulate a raw
            // pointer, so we have to do that here.
            #[allow(clippy::mut_from_ref)]
            #[inline(always)]
            pub(crate) unsafe fn deref(&self) -> &mut T {
                &mut *self.0
            }
        }
    }
}
