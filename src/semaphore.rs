//! The counting park object backing per-thread blocking.

use core::time::Duration;

#[cfg(not(all(loom, test)))]
use std::time::Instant;

use crate::cfg::sync::{Condvar, Mutex, MutexGuard};

/// A counting semaphore used as a thread parker.
///
/// Posts accumulate until consumed by a [`wait`]. A thread calls [`reset`]
/// before enqueueing itself so that a stale post from a previous blocking
/// cycle cannot satisfy the next park. Spurious OS wakeups never leak out:
/// the count is re-checked under the mutex.
///
/// [`wait`]: Semaphore::wait
/// [`reset`]: Semaphore::reset
pub struct Semaphore {
    count: Mutex<u32>,
    condvar: Condvar,
}

impl Semaphore {
    /// Creates a new, unsignaled and core based semaphore (const).
    #[cfg(not(all(loom, test)))]
    #[must_use]
    pub const fn new() -> Self {
        Self { count: Mutex::new(0), condvar: Condvar::new() }
    }

    /// Creates a new, unsignaled and loom based semaphore (non-const).
    #[cfg(all(loom, test))]
    pub fn new() -> Self {
        Self { count: Mutex::new(0), condvar: Condvar::new() }
    }

    /// Drops any pending posts, returning the semaphore to the unsignaled
    /// state.
    pub fn reset(&self) {
        *self.lock_count() = 0;
    }

    /// Signals the semaphore, waking one parked thread if any.
    pub fn post(&self) {
        *self.lock_count() += 1;
        self.condvar.notify_one();
    }

    /// Parks the calling thread until a post is available, then consumes it.
    #[cfg(not(all(loom, test)))]
    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.condvar.wait(&mut count);
        }
        *count -= 1;
    }

    /// Parks the calling thread until a post is available, then consumes it.
    #[cfg(all(loom, test))]
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count == 0 {
            count = self.condvar.wait(count).unwrap();
        }
        *count -= 1;
    }

    /// Parks like [`wait`](Self::wait), giving up after `timeout`.
    ///
    /// Returns `true` if a post was consumed, `false` on timeout.
    #[cfg(not(all(loom, test)))]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count.lock();
        while *count == 0 {
            if self.condvar.wait_until(&mut count, deadline).timed_out() {
                return false;
            }
        }
        *count -= 1;
        true
    }

    /// Parks like [`wait`](Self::wait); loom has no timed condvar wait, and
    /// the timeout is only a stall safeguard the model scheduler rules out.
    #[cfg(all(loom, test))]
    pub fn wait_timeout(&self, _timeout: Duration) -> bool {
        self.wait();
        true
    }

    #[cfg(not(all(loom, test)))]
    fn lock_count(&self) -> MutexGuard<'_, u32> {
        self.count.lock()
    }

    #[cfg(all(loom, test))]
    fn lock_count(&self) -> MutexGuard<'_, u32> {
        self.count.lock().unwrap()
    }
}

#[cfg(not(all(loom, test)))]
impl Default for Semaphore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, not(loom)))]
mod test {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::Semaphore;

    #[test]
    fn post_then_wait_does_not_block() {
        let semaphore = Semaphore::new();
        semaphore.post();
        semaphore.wait();
    }

    #[test]
    fn reset_drops_pending_posts() {
        let semaphore = Semaphore::new();
        semaphore.post();
        semaphore.post();
        semaphore.reset();
        assert!(!semaphore.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn wait_timeout_expires() {
        let semaphore = Semaphore::new();
        assert!(!semaphore.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn post_wakes_parked_thread() {
        let semaphore = Arc::new(Semaphore::new());
        let parked = {
            let semaphore = Arc::clone(&semaphore);
            thread::spawn(move || semaphore.wait())
        };
        semaphore.post();
        parked.join().unwrap();
    }
}
