//! The typed monitor surface: a data-owning monitor with RAII guards.

use core::cell::UnsafeCell;
use core::fmt;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use crate::raw;

/// A monitor protecting a value of type `T`.
///
/// Acquiring the monitor returns a [`MonitorGuard`] granting access to the
/// value; the guard releases the monitor when dropped, and exposes the
/// condition-variable operations so that ownership is proven by
/// construction. The wrapper is non-recursive; use [`raw::Monitor`] directly
/// when recursive acquisition is required.
///
/// # Examples
///
/// ```
/// use std::sync::mpsc::channel;
/// use std::sync::Arc;
/// use std::thread;
///
/// use ondeck::Monitor;
///
/// const N: usize = 10;
///
/// let data = Arc::new(Monitor::new(0));
///
/// let (tx, rx) = channel();
/// for _ in 0..N {
///     let (data, tx) = (Arc::clone(&data), tx.clone());
///     thread::spawn(move || {
///         let mut data = data.lock();
///         *data += 1;
///         if *data == N {
///             tx.send(()).unwrap();
///         }
///     });
/// }
///
/// rx.recv().unwrap();
/// ```
pub struct Monitor<T: ?Sized> {
    raw: raw::Monitor,
    data: UnsafeCell<T>,
}

// Same unsafe impls as `std::sync::Mutex`.
unsafe impl<T: ?Sized + Send> Send for Monitor<T> {}
unsafe impl<T: ?Sized + Send> Sync for Monitor<T> {}

impl<T> Monitor<T> {
    /// Creates a new, unlocked monitor protecting `value` (const).
    #[cfg(not(all(loom, test)))]
    pub const fn new(value: T) -> Self {
        Self { raw: raw::Monitor::new(false), data: UnsafeCell::new(value) }
    }

    /// Creates a new, unlocked monitor protecting `value` (non-const).
    #[cfg(all(loom, test))]
    pub fn new(value: T) -> Self {
        Self { raw: raw::Monitor::new(false), data: UnsafeCell::new(value) }
    }

    /// Consumes this monitor, returning the underlying data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Monitor<T> {
    /// Attempts to acquire this monitor without blocking.
    ///
    /// Returns [`None`] if the monitor is held by another thread. This
    /// function never blocks.
    pub fn try_lock(&self) -> Option<MonitorGuard<'_, T>> {
        self.raw.try_lock().then(|| MonitorGuard::new(self))
    }

    /// Acquires this monitor, blocking the current thread until it is able
    /// to do so.
    pub fn lock(&self) -> MonitorGuard<'_, T> {
        self.raw.lock();
        MonitorGuard::new(self)
    }

    /// Returns `true` if the lock is currently held.
    ///
    /// This function does not guarantee strong ordering, only atomicity.
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Returns a mutable reference to the underlying data.
    ///
    /// The mutable borrow statically guarantees no lock exists, so no
    /// locking takes place.
    pub fn get_mut(&mut self) -> &mut T {
        // SAFETY: the exclusive borrow of the monitor rules out any guard.
        unsafe { &mut *self.data.get() }
    }
}

impl<T: Default> Default for Monitor<T> {
    /// Creates a `Monitor<T>`, with the `Default` value for `T`.
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for Monitor<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Monitor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Monitor");
        match self.try_lock() {
            Some(guard) => d.field("data", &&*guard),
            None => d.field("data", &format_args!("<locked>")),
        };
        d.finish()
    }
}

/// An RAII implementation of a "scoped lock" of a monitor. When this
/// structure is dropped (falls out of scope), the monitor will be unlocked.
///
/// The protected data is accessible through the guard's [`Deref`] and
/// [`DerefMut`] implementations, and the monitor's condition-variable
/// operations through [`wait`], [`notify_one`] and [`notify_all`].
///
/// The guard cannot be sent to another thread: the monitor records its
/// owner's identity and must be released on the acquiring thread.
///
/// [`wait`]: MonitorGuard::wait
/// [`notify_one`]: MonitorGuard::notify_one
/// [`notify_all`]: MonitorGuard::notify_all
pub struct MonitorGuard<'a, T: ?Sized> {
    monitor: &'a Monitor<T>,
    marker: PhantomData<*mut ()>,
}

// Same unsafe Sync impl as `std::sync::MutexGuard`.
unsafe impl<T: ?Sized + Sync> Sync for MonitorGuard<'_, T> {}

impl<'a, T: ?Sized> MonitorGuard<'a, T> {
    fn new(monitor: &'a Monitor<T>) -> Self {
        Self { monitor, marker: PhantomData }
    }

    /// Releases the monitor and suspends the calling thread until another
    /// thread calls [`notify_one`] or [`notify_all`]; the monitor is
    /// reacquired before this returns.
    ///
    /// As with any condition variable, callers should re-check their
    /// predicate in a loop around `wait`.
    ///
    /// [`notify_one`]: MonitorGuard::notify_one
    /// [`notify_all`]: MonitorGuard::notify_all
    pub fn wait(&mut self) {
        // SAFETY: a live guard proves the calling thread owns the monitor,
        // and the exclusive borrow rules out outstanding data references
        // across the release window.
        unsafe { self.monitor.raw.wait() };
    }

    /// Wakes one thread suspended in [`wait`](MonitorGuard::wait) on this
    /// monitor.
    pub fn notify_one(&self) {
        // SAFETY: a live guard proves the calling thread owns the monitor.
        unsafe { self.monitor.raw.notify_one() };
    }

    /// Wakes every thread suspended in [`wait`](MonitorGuard::wait) on this
    /// monitor.
    pub fn notify_all(&self) {
        // SAFETY: a live guard proves the calling thread owns the monitor.
        unsafe { self.monitor.raw.notify_all() };
    }
}

impl<T: ?Sized> Deref for MonitorGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: a guard instance holds the monitor locked.
        unsafe { &*self.monitor.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MonitorGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: a guard instance holds the monitor locked.
        unsafe { &mut *self.monitor.data.get() }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MonitorGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: ?Sized + fmt::Display> fmt::Display for MonitorGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

impl<T: ?Sized> Drop for MonitorGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: a live guard proves the calling thread owns the monitor.
        unsafe { self.monitor.raw.unlock() }
    }
}
