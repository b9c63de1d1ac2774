//! The contention protocol: a hybrid spin/queue/park monitor built on a
//! single atomic word, an on-deck successor slot and per-thread semaphores.
//!
//! The lock word unions the lock bit with a LIFO stack of contenders:
//!
//! - `0`: unlocked, no contenders.
//! - bit 0 set, upper bits zero: locked, no contenders.
//! - bit 0 set, upper bits nonzero: locked; the upper bits point at the head
//!   contender node.
//! - bit 0 clear, upper bits nonzero: unlocked with a leftover node chain, a
//!   transient state after an unlock. The chain still describes parked
//!   threads and is picked up again by the next push or selection.
//!
//! Contender and waiter nodes live on the blocked caller's stack frame. The
//! unlock protocol unlinks a node from every list before posting the owning
//! thread's semaphore, so a node never outlives its frame.
//!
//! The on-deck slot holds the semaphore address of the single thread allowed
//! to acquire next; its low bit is a microlock serializing successor
//! selection between racing unlockers. Waking exactly one thread per unlock
//! keeps the herd asleep while still guaranteeing progress: if contenders
//! exist when the lock is free, some thread is posted.

use core::ptr;
use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release, SeqCst};
use core::time::Duration;

use crate::cfg::atomic::{fence, AtomicPtr, AtomicUsize};
use crate::cfg::cell::Cell;
use crate::cfg::hint;
use crate::cfg::thread::yield_now;
use crate::relax::{Schedule, MAX_READ_SPIN_ITER, MAX_SPIN_ITER};
use crate::semaphore::Semaphore;
use crate::thread::Thread;

/// Low bit of the lock word, set iff some thread holds the monitor.
const LOCKED: usize = 0b1;

/// Low bit of the on-deck word, held transiently while a successor is
/// selected.
const MICROLOCK: usize = 0b1;

/// Interval at which a parked waiter re-checks the on-deck slot.
const WAIT_RECHECK: Duration = Duration::from_millis(10);

/// A queue record linking a blocked thread's semaphore into the contenders
/// stack or the waiters list.
///
/// Nodes are stack-allocated in the blocking call's frame and referenced
/// through raw addresses; the address doubles as the stack link with the
/// lock bit folded into bit 0, which the node's alignment keeps free.
struct WaitNode {
    semaphore: &'static Semaphore,
    next: Cell<*const WaitNode>,
}

impl WaitNode {
    fn new(semaphore: &'static Semaphore) -> Self {
        Self { semaphore, next: Cell::new(ptr::null()) }
    }

    fn as_usize(&self) -> usize {
        let addr = self as *const Self as usize;
        debug_assert!(addr & LOCKED == 0, "node address must keep bit 0 free");
        addr
    }
}

fn semaphore_addr(semaphore: &Semaphore) -> usize {
    let addr = semaphore as *const Semaphore as usize;
    debug_assert!(addr & MICROLOCK == 0, "semaphore address must keep bit 0 free");
    addr
}

/// A bare monitor: a mutual-exclusion lock fused with wait/notify queues,
/// optionally recursive.
///
/// This is the protocol core. It protects no data of its own; see
/// [`Monitor<T>`](crate::Monitor) for the typed RAII surface. The release
/// operations are `unsafe` because ownership cannot be proven here: calling
/// [`unlock`], [`wait`], [`notify_one`] or [`notify_all`] from a thread that
/// does not own the monitor is undefined behavior (debug builds assert).
///
/// [`unlock`]: Monitor::unlock
/// [`wait`]: Monitor::wait
/// [`notify_one`]: Monitor::notify_one
/// [`notify_all`]: Monitor::notify_all
pub struct Monitor {
    /// Lock bit unioned with the head of the contenders stack.
    contenders: AtomicUsize,
    /// Microlock bit unioned with the designated successor's semaphore
    /// address, or zero.
    on_deck: AtomicUsize,
    /// Head of the waiters list. Touched only by the current owner.
    waiters: Cell<*const WaitNode>,
    /// Thread owning this monitor, null while unlocked.
    owner: AtomicPtr<Thread>,
    /// Times the owner has acquired this monitor. Touched only by the
    /// current owner.
    lock_count: Cell<u32>,
    recursive: bool,
}

// SAFETY: `waiters` and `lock_count` are accessed only by the monitor's
// current owner, and ownership transfer synchronizes through the lock
// word's release/acquire edges.
unsafe impl Send for Monitor {}
unsafe impl Sync for Monitor {}

impl Monitor {
    /// Creates a new, unlocked and core based monitor (const).
    ///
    /// A recursive monitor may be re-acquired by its owner; each acquisition
    /// must be balanced by one release.
    #[cfg(not(all(loom, test)))]
    #[must_use]
    pub const fn new(recursive: bool) -> Self {
        Self {
            contenders: AtomicUsize::new(0),
            on_deck: AtomicUsize::new(0),
            waiters: Cell::new(ptr::null()),
            owner: AtomicPtr::new(ptr::null_mut()),
            lock_count: Cell::new(0),
            recursive,
        }
    }

    /// Creates a new, unlocked and loom based monitor (non-const).
    #[cfg(all(loom, test))]
    pub fn new(recursive: bool) -> Self {
        Self {
            contenders: AtomicUsize::new(0),
            on_deck: AtomicUsize::new(0),
            waiters: Cell::new(ptr::null()),
            owner: AtomicPtr::new(ptr::null_mut()),
            lock_count: Cell::new(0),
            recursive,
        }
    }

    /// Returns `true` if the lock is currently held.
    ///
    /// This function does not guarantee strong ordering, only atomicity.
    pub fn is_locked(&self) -> bool {
        self.contenders.load(Relaxed) & LOCKED != 0
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
    /// current owner. The attempt is single-shot: a `false` return leaves
    /// the monitor state untouched and nothing is retried internally.
    pub fn try_lock(&self) -> bool {
        let thread = Thread::current();
        let word = self.contenders.load(Acquire);

        if word & LOCKED != 0 {
            if self.recursive && self.is_owner(thread) {
                self.lock_count.set(self.lock_count.get() + 1);
                return true;
            }
            return false;
        }

        // The word may still carry a leftover node chain from a previous
        // unlock; preserve it while setting the lock bit. The attempt is
        // single-shot, so a weak CAS and its spurious failures are fine.
        if self.contenders.compare_exchange_weak(word, word | LOCKED, AcqRel, Relaxed).is_err() {
            return false;
        }

        // Ownership must publish after the winning CAS.
        self.set_owner(thread);
        self.lock_count.set(1);
        true
    }

    /// Acquires this monitor, blocking the current thread until it is able
    /// to do so.
    pub fn lock(&self) {
        if !self.try_lock() {
            self.lock_slow();
        }
    }

    /// Attempts to acquire the monitor within the bounded spin budget.
    fn try_lock_spin(&self) -> bool {
        if self.try_lock() {
            return true;
        }

        for iter in 0..MAX_SPIN_ITER {
            // First be SMT friendly, then be SMP friendly.
            if iter < MAX_READ_SPIN_ITER {
                hint::spin_loop();
            } else {
                yield_now();
            }
            if !self.is_locked() && self.try_lock() {
                return true;
            }
        }

        false
    }

    /// The contended acquisition path: spin, enqueue, park until on-deck,
    /// then race for the lock.
    #[cold]
    fn lock_slow(&self) {
        if self.try_lock_spin() {
            return;
        }

        let thread = Thread::current();
        let semaphore = thread.lock_semaphore();
        semaphore.reset();
        let node = WaitNode::new(semaphore);

        // Push the node onto the contenders stack. The push may only land
        // while the lock bit is set; an unlocked word means the lock itself
        // is up for grabs instead.
        let mut head = self.contenders.load(Acquire);
        loop {
            if head & LOCKED == 0 {
                if self.try_lock() {
                    return;
                }
                head = self.contenders.load(Acquire);
                continue;
            }
            node.next.set((head & !LOCKED) as *const WaitNode);
            match self.contenders.compare_exchange_weak(
                head,
                node.as_usize() | LOCKED,
                AcqRel,
                Acquire,
            ) {
                Ok(_) => break,
                Err(new) => {
                    head = new;
                    yield_now();
                }
            }
        }

        // Park until this thread's semaphore is installed as on-deck.
        let mut schedule = Schedule::new();
        while self.on_deck.load(Acquire) & !MICROLOCK != semaphore_addr(semaphore) {
            schedule.relax_or_park(|| semaphore.wait());
        }

        // On-deck from here until the lock is ours; only barging `try_lock`
        // callers can still get in the way.
        let mut schedule = Schedule::new();
        while !self.try_lock() {
            schedule.relax_or_park(|| semaphore.wait());
        }

        // Successor selection unlinked the node before posting us.
        debug_assert!(node.next.get().is_null(), "node must be unlinked before wakeup");
        self.on_deck.store(0, Release);
    }

    /// Releases this monitor.
    ///
    /// For a recursive monitor the lock is only released once every
    /// acquisition has been balanced; inner releases merely decrement the
    /// count. A releasing unlock wakes at most one successor and never
    /// blocks.
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

        // Clear the lock bit, preserving the contender chain.
        let mut word = self.contenders.load(Acquire);
        while let Err(new) =
            self.contenders.compare_exchange_weak(word, word & !LOCKED, AcqRel, Acquire)
        {
            word = new;
        }

        // StoreLoad: the lock-bit clear must be visible before the loads
        // below, or a fresh contender could go unnoticed by both sides.
        fence(SeqCst);

        let on_deck = self.on_deck.load(Acquire);
        if on_deck != 0 {
            if on_deck & MICROLOCK == 0 {
                // SAFETY: semaphores published through the on-deck slot
                // belong to leaked per-thread records and are never freed.
                unsafe { &*(on_deck as *const Semaphore) }.post();
            }
            // A set microlock means another thread is mid-selection and
            // will finish the job.
            return;
        }

        let head = self.contenders.load(Acquire);
        if head == 0 || head & LOCKED != 0 {
            return;
        }

        self.unlock_slow();
    }

    /// Successor selection: pop one contender, install its semaphore as
    /// on-deck and post it.
    #[cold]
    fn unlock_slow(&self) {
        loop {
            // The microlock serializes selection; losing the race means the
            // winner picks the successor.
            if self.on_deck.compare_exchange(0, MICROLOCK, AcqRel, Acquire).is_err() {
                return;
            }

            let mut head = self.contenders.load(Acquire);
            let chosen = loop {
                if head == 0 {
                    break ptr::null::<WaitNode>();
                }
                if head & LOCKED != 0 {
                    // The lock was reacquired; the new owner's unlock will
                    // drive the next selection.
                    break ptr::null();
                }
                let node = head as *const WaitNode;
                // SAFETY: nodes reachable from the contenders stack live on
                // the frames of threads still parked in `lock` or `wait`.
                let next = unsafe { &*node }.next.get();
                match self.contenders.compare_exchange_weak(head, next as usize, AcqRel, Acquire)
                {
                    Ok(_) => break node,
                    Err(new) => head = new,
                }
            };

            if !chosen.is_null() {
                // SAFETY: the popped node is no longer reachable from the
                // stack and its owner stays parked until the post below.
                let node = unsafe { &*chosen };
                node.next.set(ptr::null());
                let semaphore = node.semaphore;
                // Installing the successor also releases the microlock.
                self.on_deck.store(semaphore_addr(semaphore), Release);
                semaphore.post();
                return;
            }

            self.on_deck.store(0, Release);

            // StoreLoad: the on-deck clear must be visible before rereading
            // the contenders stack.
            fence(SeqCst);

            let head = self.contenders.load(Acquire);
            if head == 0 || head & LOCKED != 0 {
                return;
            }
            // A contender pushed while the slot was being cleared; select
            // again.
        }
    }

    /// Releases this monitor and suspends the calling thread until another
    /// thread notifies it.
    ///
    /// A recursively acquired monitor drops all levels across the wait; the
    /// caller's recursion depth is restored before this returns. The 10 ms
    /// timed park is internal plumbing, not a user-visible timeout: the
    /// suspended thread periodically re-checks the on-deck slot while
    /// waiting to be selected.
    ///
    /// # Safety
    ///
    /// The calling thread must be the monitor's current owner.
    pub unsafe fn wait(&self) {
        let thread = Thread::current();
        debug_assert!(self.is_locked(), "wait on an unlocked monitor");
        debug_assert!(self.is_owner(thread), "wait by a non-owner thread");

        let semaphore = thread.suspend_semaphore();
        semaphore.reset();

        let node = WaitNode::new(semaphore);
        node.next.set(self.waiters.get());
        self.waiters.set(&node as *const WaitNode);

        // A recursively acquired monitor releases all levels at once.
        let lock_count = self.lock_count.get();
        self.lock_count.set(1);

        // SAFETY: the caller owns the monitor.
        unsafe { self.unlock() };

        // Park until this thread's semaphore is installed as on-deck.
        let mut schedule = Schedule::new();
        while self.on_deck.load(Acquire) & !MICROLOCK != semaphore_addr(semaphore) {
            schedule.relax_or_park(|| {
                semaphore.wait_timeout(WAIT_RECHECK);
            });
        }

        let mut schedule = Schedule::new();
        while !self.try_lock_spin() {
            schedule.relax_or_park(|| semaphore.wait());
        }

        self.lock_count.set(lock_count);
        self.on_deck.store(0, Release);
    }

    /// Moves one waiter, if any, to the contenders stack; it becomes
    /// eligible to wake on a following unlock.
    ///
    /// # Safety
    ///
    /// The calling thread must be the monitor's current owner.
    pub unsafe fn notify_one(&self) {
        debug_assert!(self.is_locked(), "notify on an unlocked monitor");
        debug_assert!(self.is_owner(Thread::current()), "notify by a non-owner thread");

        let waiter = self.waiters.get();
        if waiter.is_null() {
            return;
        }
        // SAFETY: waiter nodes live on the frames of threads parked in
        // `wait`, and only the owner edits the list.
        self.waiters.set(unsafe { &*waiter }.next.get());

        // Push the waiter onto the contenders stack. The lock bit stays set
        // throughout: the caller holds the monitor.
        let mut head = self.contenders.load(Acquire);
        loop {
            // SAFETY: the node was just unlinked from the waiters list and
            // its thread stays parked until a future selection posts it.
            unsafe { &*waiter }.next.set((head & !LOCKED) as *const WaitNode);
            match self.contenders.compare_exchange_weak(
                head,
                waiter as usize | LOCKED,
                AcqRel,
                Acquire,
            ) {
                Ok(_) => break,
                Err(new) => head = new,
            }
        }
    }

    /// Moves every waiter to the contenders stack.
    ///
    /// # Safety
    ///
    /// The calling thread must be the monitor's current owner.
    pub unsafe fn notify_all(&self) {
        // Nodes move one at a time; this is not a hot path.
        while !self.waiters.get().is_null() {
            // SAFETY: upheld by the caller.
            unsafe { self.notify_one() };
        }
    }
}

#[cfg(all(test, not(loom)))]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::Monitor;
    use crate::test as harness;

    #[test]
    fn uncontended_lock_cycle() {
        harness::uncontended_lock_cycle::<Monitor>();
    }

    #[test]
    fn try_lock_contended_is_pure() {
        harness::try_lock_contended_is_pure::<Monitor>();
    }

    #[test]
    fn recursive_balance() {
        harness::recursive_balance::<Monitor>();
    }

    #[test]
    fn recursive_excludes_other_threads() {
        harness::recursive_excludes_other_threads::<Monitor>();
    }

    #[test]
    fn contended_handoff() {
        harness::contended_handoff::<Monitor>();
    }

    #[test]
    fn wait_notify_roundtrip() {
        harness::wait_notify_roundtrip::<Monitor>();
    }

    #[test]
    fn notify_all_fanout() {
        harness::notify_all_fanout::<Monitor>();
    }

    #[test]
    fn notify_without_waiters_is_noop() {
        harness::notify_without_waiters_is_noop::<Monitor>();
    }

    #[test]
    fn stress_counter() {
        harness::stress_counter::<Monitor>();
    }

    #[test]
    fn contenders_wake_in_lifo_order() {
        fn contend(monitor: &Arc<Monitor>, turns: &Arc<AtomicUsize>) -> thread::JoinHandle<usize> {
            let (monitor, turns) = (Arc::clone(monitor), Arc::clone(turns));
            thread::spawn(move || {
                monitor.lock();
                let turn = turns.fetch_add(1, Ordering::SeqCst);
                // SAFETY: this thread owns the monitor.
                unsafe { monitor.unlock() };
                turn
            })
        }

        let monitor = Arc::new(Monitor::new(false));
        let turns = Arc::new(AtomicUsize::new(0));

        monitor.lock();

        // Stagger the contenders so each exhausts its spin budget and is
        // enqueued before the next arrives: the stack head is the most
        // recent arrival.
        let first = contend(&monitor, &turns);
        thread::sleep(Duration::from_millis(200));
        let second = contend(&monitor, &turns);
        thread::sleep(Duration::from_millis(200));

        // SAFETY: this thread owns the monitor.
        unsafe { monitor.unlock() };

        // LIFO: the later contender is put on deck first; the earlier one
        // stays parked until the next unlock selects it.
        assert_eq!(second.join().unwrap(), 0);
        assert_eq!(first.join().unwrap(), 1);
    }

    #[test]
    fn wait_preserves_recursion_depth() {
        struct Shared {
            monitor: Monitor,
            parked: std::cell::Cell<bool>,
        }

        // SAFETY: `parked` is only accessed while `monitor` is held.
        unsafe impl Sync for Shared {}

        let shared = Arc::new(Shared {
            monitor: Monitor::new(true),
            parked: std::cell::Cell::new(false),
        });

        let waiter = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                shared.monitor.lock();
                shared.monitor.lock();
                shared.monitor.lock();
                shared.parked.set(true);
                // Drops all three levels, then restores them on wakeup.
                unsafe { shared.monitor.wait() };
                unsafe { shared.monitor.unlock() };
                assert!(shared.monitor.is_locked());
                unsafe { shared.monitor.unlock() };
                assert!(shared.monitor.is_locked());
                unsafe { shared.monitor.unlock() };
                assert!(!shared.monitor.is_locked());
            })
        };

        loop {
            shared.monitor.lock();
            let parked = shared.parked.get();
            if parked {
                unsafe { shared.monitor.notify_one() };
            }
            unsafe { shared.monitor.unlock() };
            if parked {
                break;
            }
            thread::yield_now();
        }

        waiter.join().unwrap();
    }
}
