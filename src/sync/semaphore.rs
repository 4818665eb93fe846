//! Counting semaphore.
//!
//! The semaphore is the base blocking primitive of the kernel: it keeps a
//! nonnegative count of permits and a strictly FIFO queue of threads
//! waiting for one. All the other blocking primitives — [`Lock`],
//! [`Condition`], [`Port`], [`RwMutex`] — are built from it, and several
//! of them (the Hoare condition variable in particular) depend on the
//! queue really being FIFO, so [`Semaphore::v`] hands a released permit
//! directly to the thread at the head of the queue rather than making it
//! visible to whichever thread happens to run next.
//!
//! A semaphore initialized to zero doubles as an event: `v()` announces
//! the event and `p()` awaits it.
//!
//! [`Lock`]: crate::sync::Lock
//! [`Condition`]: crate::sync::Condition
//! [`Port`]: crate::sync::Port
//! [`RwMutex`]: crate::sync::RwMutex

use crate::sync::SpinLock;
use crate::thread::{Current, ParkHandle};
use std::collections::VecDeque;

struct SemaphoreInner {
    value: usize,
    queue: VecDeque<ParkHandle>,
}

/// Counting semaphore over a FIFO wait queue.
///
/// Invariant: a positive value implies the queue is empty; waiters only
/// accumulate while the value is zero.
///
/// # Examples
///
/// ```
/// use pampero::sync::Semaphore;
/// use pampero::thread::ThreadBuilder;
/// use std::sync::Arc;
///
/// let done = Arc::new(Semaphore::new("done", 0));
/// let signaller = Arc::clone(&done);
/// ThreadBuilder::new("worker").spawn(move || signaller.v());
/// done.p(); // blocks until the worker signals
/// ```
pub struct Semaphore {
    name: String,
    inner: SpinLock<SemaphoreInner>,
}

impl Semaphore {
    /// Creates a semaphore with `initial_value` permits.
    pub fn new(name: impl Into<String>, initial_value: usize) -> Self {
        Self {
            name: name.into(),
            inner: SpinLock::new(SemaphoreInner {
                value: initial_value,
                queue: VecDeque::new(),
            }),
        }
    }

    /// Debug name given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait until a permit is available, then consume it.
    ///
    /// If no permit is available the calling thread joins the tail of the
    /// wait queue and sleeps; it is woken exactly when a permit has been
    /// handed to it.
    pub fn p(&self) {
        let mut inner = self.inner.lock();
        if inner.value > 0 {
            inner.value -= 1;
            return;
        }
        Current::park_with(|handle| {
            inner.queue.push_back(handle);
            drop(inner);
        });
        // The permit was transferred by the waker; nothing to decrement.
    }

    /// Release one permit, waking the longest-waiting thread if any.
    ///
    /// When a waiter exists, the permit is handed to it directly and the
    /// value stays zero; otherwise the value is incremented.
    pub fn v(&self) {
        let mut inner = self.inner.lock();
        match inner.queue.pop_front() {
            Some(handle) => {
                drop(inner);
                handle.unpark();
            }
            None => inner.value += 1,
        }
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        // Destroying a semaphore someone still waits on is a caller bug.
        assert!(
            self.inner.lock().queue.is_empty(),
            "semaphore `{}` destroyed with blocked waiters",
            self.name
        );
    }
}
