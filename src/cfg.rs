pub mod atomic {
    #[cfg(not(all(loom, test)))]
    pub use core::sync::atomic::{fence, AtomicPtr, AtomicUsize};

    #[cfg(all(loom, test))]
    pub use loom::sync::atomic::{fence, AtomicPtr, AtomicUsize};
}

pub mod cell {
    #[cfg(not(all(loom, test)))]
    pub use core::cell::Cell;

    #[cfg(all(loom, test))]
    pub use loom::cell::Cell;
}

pub mod hint {
    #[cfg(not(all(loom, test)))]
    pub use core::hint::spin_loop;

    #[cfg(all(loom, test))]
    pub use loom::hint::spin_loop;
}

pub mod sync {
    #[cfg(not(all(loom, test)))]
    pub use parking_lot::{Condvar, Mutex, MutexGuard};

    #[cfg(all(loom, test))]
    pub use loom::sync::{Condvar, Mutex, MutexGuard};
}

pub mod thread {
    #[cfg(not(all(loom, test)))]
    pub use std::thread::yield_now;

    #[cfg(all(loom, test))]
    pub use loom::thread::yield_now;
}
