//! A user-space monitor: mutual exclusion fused with condition-variable
//! operations behind a single primitive.
//!
//! A [`Monitor<T>`] protects a value the way a mutex does, and additionally
//! lets the owning thread suspend itself ([`MonitorGuard::wait`]) until
//! another thread wakes it ([`MonitorGuard::notify_one`],
//! [`MonitorGuard::notify_all`]).
//!
//! Two interchangeable backends implement the same contract:
//!
//! - [`raw::Monitor`] is the default: a hybrid spin/queue/park lock built on
//!   a single atomic word that unions the lock bit with a LIFO stack of
//!   contenders, an "on-deck" slot naming the one thread allowed to acquire
//!   next, and per-thread semaphores for parking. Each unlock wakes at most
//!   one thread.
//! - [`condvar::Monitor`] backs the same operations with an OS mutex and
//!   condition variable. It additionally allows notifying without holding
//!   the lock, but does not support `wait` on a recursive monitor.
//!
//! Both backends optionally support recursive re-acquisition by their owner;
//! the typed [`Monitor<T>`] wrapper is non-recursive so its guard can hand
//! out `&mut T` soundly.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//!
//! use ondeck::Monitor;
//!
//! let ready = Arc::new(Monitor::new(false));
//! let worker = {
//!     let ready = Arc::clone(&ready);
//!     thread::spawn(move || {
//!         let mut guard = ready.lock();
//!         while !*guard {
//!             guard.wait();
//!         }
//!     })
//! };
//!
//! let mut guard = ready.lock();
//! *guard = true;
//! guard.notify_one();
//! drop(guard);
//!
//! worker.join().unwrap();
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(unexpected_cfgs)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::inline_always)]
#![allow(clippy::doc_markdown)]
#![warn(rust_2021_compatibility)]
#![warn(missing_docs)]

pub mod condvar;
pub mod raw;
pub mod semaphore;
pub mod thread;

#[cfg(all(feature = "lock_api", not(all(loom, test))))]
#[cfg_attr(docsrs, doc(cfg(feature = "lock_api")))]
pub mod lock_api;

mod monitor;
pub use monitor::{Monitor, MonitorGuard};

pub(crate) mod cfg;
pub(crate) mod relax;


#[cfg(all(loom, test))]
#[cfg(not(tarpaulin))]
pub(crate) mod loom;
