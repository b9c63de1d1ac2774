//! Locking interfaces compatible with [lock_api].
//!
//! This module implements [`lock_api::RawMutex`] for the non-recursive
//! [`raw::Monitor`] and exports [`Mutex`] and [`MutexGuard`] type aliases
//! backed by it. The guard is declared `!Send`: the monitor records its
//! owner's identity and must be released on the acquiring thread.
//!
//! [lock_api]: https://crates.io/crates/lock_api
//! [`lock_api::RawMutex`]: https://docs.rs/lock_api/latest/lock_api/trait.RawMutex.html

use lock_api::{GuardNoSend, RawMutex};

use crate::raw;

unsafe impl RawMutex for raw::Monitor {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = raw::Monitor::new(false);

    type GuardMarker = GuardNoSend;

    fn lock(&self) {
        raw::Monitor::lock(self);
    }

    fn try_lock(&self) -> bool {
        raw::Monitor::try_lock(self)
    }

    unsafe fn unlock(&self) {
        // SAFETY: lock_api guarantees the lock is held in this context, and
        // the `GuardNoSend` marker pins the guard to the acquiring thread.
        unsafe { raw::Monitor::unlock(self) };
    }

    fn is_locked(&self) -> bool {
        raw::Monitor::is_locked(self)
    }
}

/// A [`lock_api::Mutex`] backed by the monitor's contention protocol.
///
/// # Example
///
/// ```
/// let mutex = ondeck::lock_api::Mutex::new(0);
/// let mut guard = mutex.lock();
/// *guard += 1;
/// assert_eq!(*guard, 1);
/// ```
pub type Mutex<T> = lock_api::Mutex<raw::Monitor, T>;

/// A [`lock_api::MutexGuard`] backed by the monitor's contention protocol.
pub type MutexGuard<'a, T> = lock_api::MutexGuard<'a, raw::Monitor, T>;

#[cfg(all(test, not(loom)))]
mod test {
    use std::sync::Arc;
    use std::thread;

    use super::Mutex;

    #[test]
    fn smoke() {
        let mutex = Mutex::new(0);
        *mutex.lock() += 1;
        assert_eq!(*mutex.lock(), 1);
    }

    #[test]
    fn contended() {
        const THREADS: usize = 4;
        const ITERS: usize = 1000;

        let mutex = Arc::new(Mutex::new(0usize));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                thread::spawn(move || {
                    for _ in 0..ITERS {
                        *mutex.lock() += 1;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*mutex.lock(), THREADS * ITERS);
    }
}
