//! Thread abstraction and the scheduler contract.
//!
//! The kernel model is a single CPU with cooperative threads, where
//! atomicity comes from masking interrupts and blocking means handing the
//! CPU back to the scheduler. This hosted rendition keeps the *contract*
//! of that scheduler and maps it onto host threads:
//!
//! - `ready(thread)` becomes [`ParkHandle::unpark`];
//! - `sleep()` becomes [`Current::park_with`], which registers a wake-up
//!   handle and blocks the calling thread;
//! - `current()` becomes [`Current::handle`], yielding the calling
//!   thread's registry entry (name, priority, id);
//! - interrupt masking becomes the short critical sections of
//!   [`SpinLock`].
//!
//! Every thread participating in kernel synchronization is spawned through
//! [`ThreadBuilder`], which registers it under a name and a priority level
//! in `0..NUM_QUEUES`. Threads not spawned this way (the test harness
//! thread, for instance) are registered lazily with priority 0.
//!
//! [`SpinLock`]: crate::sync::SpinLock

use crate::constants::NUM_QUEUES;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

static NEXT_TID: AtomicU64 = AtomicU64::new(0);

/// Registry entry for a live thread.
///
/// Synchronization primitives refer to threads through this handle: locks
/// record their owner with it and priority donation adjusts the priority
/// stored here. The handle is shared, so a `Lock` holding one observes
/// priority changes made by other threads.
pub struct ThreadHandle {
    tid: u64,
    name: String,
    priority: AtomicU32,
}

impl ThreadHandle {
    fn new(name: impl Into<String>, priority: u32) -> Arc<Self> {
        assert!(priority < NUM_QUEUES, "priority out of range");
        Arc::new(Self {
            tid: NEXT_TID.fetch_add(1, Ordering::SeqCst),
            name: name.into(),
            priority: AtomicU32::new(priority),
        })
    }

    /// Thread id, unique for the lifetime of the process.
    pub fn tid(&self) -> u64 {
        self.tid
    }

    /// Thread name, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current priority level.
    pub fn priority(&self) -> u32 {
        self.priority.load(Ordering::SeqCst)
    }

    /// Set the priority level. Used by the spawner and by priority
    /// donation.
    pub fn set_priority(&self, priority: u32) {
        assert!(priority < NUM_QUEUES, "priority out of range");
        self.priority.store(priority, Ordering::SeqCst);
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<ThreadHandle>>> = const { RefCell::new(None) };
}

/// Access to the calling thread's identity and blocking support.
pub struct Current;

impl Current {
    /// The calling thread's registry handle, created on first use for
    /// threads that were not spawned through [`ThreadBuilder`].
    pub fn handle() -> Arc<ThreadHandle> {
        CURRENT.with(|c| {
            let mut slot = c.borrow_mut();
            if slot.is_none() {
                let name = std::thread::current()
                    .name()
                    .unwrap_or("main")
                    .to_string();
                *slot = Some(ThreadHandle::new(name, 0));
            }
            slot.as_ref().unwrap().clone()
        })
    }

    /// Block the calling thread after running `register`.
    ///
    /// `register` receives the [`ParkHandle`] that will wake this thread
    /// and must publish it (typically by appending it to a wait queue)
    /// before returning; any lock protecting that queue must be released
    /// inside the closure, because the thread blocks as soon as it
    /// returns. A wake-up that arrives before the thread has parked is
    /// not lost.
    pub fn park_with(register: impl FnOnce(ParkHandle)) {
        let parker = Arc::new(Parker {
            unparked: Mutex::new(false),
            condvar: Condvar::new(),
        });
        register(ParkHandle {
            parker: parker.clone(),
        });
        let mut unparked = parker.unparked.lock().unwrap();
        while !*unparked {
            unparked = parker.condvar.wait(unparked).unwrap();
        }
    }
}

struct Parker {
    unparked: Mutex<bool>,
    condvar: Condvar,
}

/// Handle to wake up one parked thread.
///
/// Obtained inside [`Current::park_with`] and consumed by
/// [`ParkHandle::unpark`], the "make it ready" half of the scheduler
/// contract.
pub struct ParkHandle {
    parker: Arc<Parker>,
}

impl ParkHandle {
    /// Make the parked thread runnable again.
    pub fn unpark(self) {
        let mut unparked = self.parker.unparked.lock().unwrap();
        *unparked = true;
        self.parker.condvar.notify_one();
    }
}

/// Builder for a named kernel thread with a priority level.
///
/// # Examples
///
/// ```
/// use pampero::thread::ThreadBuilder;
///
/// let worker = ThreadBuilder::new("worker").priority(3).spawn(|| 1 + 1);
/// assert_eq!(worker.join().unwrap(), 2);
/// ```
pub struct ThreadBuilder {
    name: String,
    priority: u32,
}

impl ThreadBuilder {
    /// Start building a thread with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 0,
        }
    }

    /// Set the thread's priority level, in `0..NUM_QUEUES`.
    pub fn priority(mut self, priority: u32) -> Self {
        assert!(priority < NUM_QUEUES, "priority out of range");
        self.priority = priority;
        self
    }

    /// Spawn the thread, registering it under its name and priority.
    pub fn spawn<F, T>(self, f: F) -> std::thread::JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let handle = ThreadHandle::new(self.name.clone(), self.priority);
        std::thread::Builder::new()
            .name(self.name)
            .spawn(move || {
                CURRENT.with(|c| *c.borrow_mut() = Some(handle));
                f()
            })
            .expect("failed to spawn thread")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawned_thread_sees_its_registration() {
        ThreadBuilder::new("registered")
            .priority(7)
            .spawn(|| {
                let me = Current::handle();
                assert_eq!(me.name(), "registered");
                assert_eq!(me.priority(), 7);
            })
            .join()
            .unwrap();
    }

    #[test]
    fn unpark_before_park_is_not_lost() {
        // Publish the handle to another thread which unparks immediately;
        // park_with must still return.
        Current::park_with(|handle| {
            std::thread::spawn(move || handle.unpark());
        });
    }

    #[test]
    fn foreign_threads_register_lazily() {
        let a = Current::handle();
        let b = Current::handle();
        assert_eq!(a.tid(), b.tid());
    }
}
