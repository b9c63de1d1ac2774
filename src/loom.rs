//! Loom models of the contention protocol.
//!
//! Thread counts are kept at two: the protocol's park edges multiply the
//! state space quickly, and two threads already cover the push, hand-off
//! and selection races.

use loom::cell::UnsafeCell;
use loom::sync::Arc;
use loom::{model, thread};

use crate::raw::Monitor;

/// A non-atomic counter protected by the raw monitor.
struct Counter {
    monitor: Monitor,
    value: UnsafeCell<u64>,
}

// SAFETY: `value` is only accessed while `monitor` is held.
unsafe impl Sync for Counter {}

impl Counter {
    fn new() -> Self {
        Self { monitor: Monitor::new(false), value: UnsafeCell::new(0) }
    }

    fn add(&self) {
        self.monitor.lock();
        // SAFETY: the monitor is held.
        self.value.with_mut(|value| unsafe { *value += 1 });
        // SAFETY: the calling thread owns the monitor.
        unsafe { self.monitor.unlock() };
    }

    fn try_add(&self) {
        if self.monitor.try_lock() {
            // SAFETY: the monitor is held.
            self.value.with_mut(|value| unsafe { *value += 1 });
            // SAFETY: the calling thread owns the monitor.
            unsafe { self.monitor.unlock() };
        }
    }

    fn get(&self) -> u64 {
        self.monitor.lock();
        // SAFETY: the monitor is held.
        let value = self.value.with(|value| unsafe { *value });
        // SAFETY: the calling thread owns the monitor.
        unsafe { self.monitor.unlock() };
        value
    }
}

/// A one-shot event over the raw monitor's wait/notify queue.
struct Event {
    monitor: Monitor,
    set: UnsafeCell<bool>,
}

// SAFETY: `set` is only accessed while `monitor` is held.
unsafe impl Sync for Event {}

impl Event {
    fn new() -> Self {
        Self { monitor: Monitor::new(false), set: UnsafeCell::new(false) }
    }

    fn wait(&self) {
        self.monitor.lock();
        while !self.set.with(|set| unsafe { *set }) {
            // SAFETY: the calling thread owns the monitor.
            unsafe { self.monitor.wait() };
        }
        // SAFETY: the calling thread owns the monitor.
        unsafe { self.monitor.unlock() };
    }

    fn set(&self) {
        self.monitor.lock();
        self.set.with_mut(|set| unsafe { *set = true });
        // SAFETY: the calling thread owns the monitor.
        unsafe {
            self.monitor.notify_one();
            self.monitor.unlock();
        }
    }
}

#[test]
fn lock_join() {
    model(|| {
        let counter = Arc::new(Counter::new());
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || counter.add())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.get(), 2);
    });
}

#[test]
fn mixed_lock_try_lock_join() {
    model(|| {
        let counter = Arc::new(Counter::new());
        let contender = {
            let counter = Arc::clone(&counter);
            thread::spawn(move || counter.add())
        };
        counter.try_add();
        contender.join().unwrap();
        let value = counter.get();
        assert!((1..=2).contains(&value));
    });
}

#[test]
fn wait_notify_handoff() {
    model(|| {
        let event = Arc::new(Event::new());
        let waiter = {
            let event = Arc::clone(&event);
            thread::spawn(move || event.wait())
        };
        event.set();
        waiter.join().unwrap();
    });
}
