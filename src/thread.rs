//! The thread layer: a stable per-thread record owning the two reusable
//! park semaphores.

use crate::semaphore::Semaphore;

/// A per-thread record identifying the caller and owning its reusable park
/// semaphores.
///
/// The record is allocated on the thread's first use of any monitor and
/// leaked: an unlocking thread may still hold the address of a published
/// semaphore after its owner has resumed, so the storage must never move nor
/// be reclaimed. Identity comparisons use the record's address.
pub struct Thread {
    lock_semaphore: Semaphore,
    suspend_semaphore: Semaphore,
}

impl Thread {
    fn new() -> Self {
        Self { lock_semaphore: Semaphore::new(), suspend_semaphore: Semaphore::new() }
    }

    /// Returns the calling thread's record.
    #[cfg(not(all(loom, test)))]
    pub fn current() -> &'static Thread {
        std::thread_local! {
            static CURRENT: &'static Thread = Box::leak(Box::new(Thread::new()));
        }
        CURRENT.with(|thread| *thread)
    }

    /// Returns the calling thread's record.
    #[cfg(all(loom, test))]
    pub fn current() -> &'static Thread {
        loom::thread_local! {
            static CURRENT: &'static Thread = Box::leak(Box::new(Thread::new()));
        }
        CURRENT.with(|thread| *thread)
    }

    /// The semaphore this thread parks on while queued as a lock contender.
    pub fn lock_semaphore(&self) -> &Semaphore {
        &self.lock_semaphore
    }

    /// The semaphore this thread parks on while suspended in a wait queue.
    pub fn suspend_semaphore(&self) -> &Semaphore {
        &self.suspend_semaphore
    }
}

#[cfg(all(test, not(loom)))]
mod test {
    use std::thread;

    use super::Thread;

    #[test]
    fn current_is_stable_within_a_thread() {
        let first = Thread::current() as *const Thread;
        let second = Thread::current() as *const Thread;
        assert_eq!(first, second);
    }

    #[test]
    fn current_differs_across_threads() {
        let here = Thread::current() as *const Thread as usize;
        let there = thread::spawn(|| Thread::current() as *const Thread as usize)
            .join()
            .unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn semaphores_are_distinct() {
        let thread = Thread::current();
        let lock = thread.lock_semaphore() as *const _ as usize;
        let suspend = thread.suspend_semaphore() as *const _ as usize;
        assert_ne!(lock, suspend);
    }
}
