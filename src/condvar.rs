//! A monitor backed by an OS mutex and condition variable.
//!
//! Semantically equivalent to [`raw::Monitor`](crate::raw::Monitor) with two
//! deviations: `wait` is not supported on a recursive monitor, and the
//! notify operations may be called without holding the lock (and are
//! therefore safe functions here).

use core::cell::Cell;
use core::mem;
use core::ptr;
use core::sync::atomic::AtomicPtr;
use core::sync::atomic::Ordering::{Acquire, Release};

use parking_lot::{Condvar, Mutex};

use crate::thread::Thread;

/// A bare monitor backed by [`parking_lot`]'s mutex and condition variable,
/// optionally recursive.
///
/// As with the protocol-based monitor, the release operations require the
/// calling thread to own the monitor and are `unsafe`; the notify
/// operations are the exception and may be called from any thread.
pub struct Monitor {
    mutex: Mutex<()>,
    condvar: Condvar,
    /// Thread owning this monitor, null while unlocked.
    owner: AtomicPtr<Thread>,
    /// Times the owner has acquired this monitor. Touched only by the
    /// current owner.
    lock_count: Cell<u32>,
    recursive: bool,
}

// SAFETY: `lock_count` is accessed only by the monitor's current owner, and
// ownership transfer synchronizes through the mutex.
unsafe impl Send for Monitor {}
unsafe impl Sync for Monitor {}

impl Monitor {
    /// Creates a new, unlocked monitor.
    ///
    /// A recursive monitor may be re-acquired by its owner; each acquisition
    /// must be balanced by one release.
    #[must_use]
    pub const fn new(recursive: bool) -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            owner: AtomicPtr::new(ptr::null_mut()),
            lock_count: Cell::new(0),
            recursive,
        }
    }

    /// Returns `true` if the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.mutex.is_locked()
    }

    fn is_owner(&self, thread: &Thread) -> bool {
        ptr::eq(self.owner.load(Acquire), thread)
    }

    fn set_owner(&self, thread: *const Thread) {
        self.owner.store(thread.cast_mut(), Release);
    }

    /// Attempts to acquire this monitor without blocking.
    ///
    /// Returns `true` on acquisition, including a recursive re-entry by the
    /// current owner.
    pub fn try_lock(&self) -> bool {
        let thread = Thread::current();
        if self.recursive && self.is_owner(thread) {
            self.lock_count.set(self.lock_count.get() + 1);
            return true;
        }
        let Some(guard) = self.mutex.try_lock() else {
            return false;
        };
        // Ownership is tracked manually; the guard would release on drop.
        mem::forget(guard);
        self.set_owner(thread);
        self.lock_count.set(1);
        true
    }

    /// Acquires this monitor, blocking the current thread until it is able
    /// to do so.
    pub fn lock(&self) {
        let thread = Thread::current();
        if self.recursive && self.is_owner(thread) {
            self.lock_count.set(self.lock_count.get() + 1);
            return;
        }
        mem::forget(self.mutex.lock());
        self.set_owner(thread);
        self.lock_count.set(1);
    }

    /// Releases this monitor.
    ///
    /// For a recursive monitor the lock is only released once every
    /// acquisition has been balanced.
    ///
    /// # Safety
    ///
    /// The calling thread must be the monitor's current owner.
    pub unsafe fn unlock(&self) {
        debug_assert!(self.is_locked(), "unlock of an unlocked monitor");
        debug_assert!(self.is_owner(Thread::current()), "unlock by a non-owner thread");

        if self.recursive {
            let count = self.lock_count.get() - 1;
            self.lock_count.set(count);
            if count > 0 {
                return;
            }
        }

        self.set_owner(ptr::null());
        // SAFETY: the caller owns the mutex; its guard was forgotten on
        // acquisition.
        unsafe { self.mutex.force_unlock() };
    }

    /// Releases this monitor and suspends the calling thread until another
    /// thread notifies it; the monitor is reacquired before this returns.
    ///
    /// # Safety
    ///
    /// The calling thread must be the monitor's current owner, and the
    /// monitor must not be recursive.
    pub unsafe fn wait(&self) {
        let thread = Thread::current();
        debug_assert!(!self.recursive, "wait is not supported on a recursive monitor");
        debug_assert!(self.is_locked(), "wait on an unlocked monitor");
        debug_assert!(self.is_owner(thread), "wait by a non-owner thread");

        self.set_owner(ptr::null());
        // SAFETY: the caller owns the mutex; adopt its guard for the wait.
        let mut guard = unsafe { self.mutex.make_guard_unchecked() };
        self.condvar.wait(&mut guard);
        // The mutex is locked again; ownership stays with the caller.
        mem::forget(guard);
        self.set_owner(thread);
        self.lock_count.set(1);
    }

    /// Wakes one thread suspended in [`wait`](Monitor::wait) on this
    /// monitor.
    ///
    /// May be called with or without holding the lock.
    pub fn notify_one(&self) {
        self.condvar.notify_one();
    }

    /// Wakes every thread suspended in [`wait`](Monitor::wait) on this
    /// monitor.
    ///
    /// May be called with or without holding the lock.
    pub fn notify_all(&self) {
        self.condvar.notify_all();
    }
}
