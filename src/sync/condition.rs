//! Condition variable with Hoare-style signaling.
//!
//! Built from three semaphores `(S, X, H)` with initial values
//! `(0, 1, 0)`: `X` is a mutex over the waiter count, `S` releases
//! waiters, and `H` completes the handoff back to the signaler. The
//! construction gives true Hoare semantics — a signal transfers control
//! atomically into exactly one awoken waiter, so the condition the
//! signaler just made true is still true when that waiter resumes. The
//! construction depends on the semaphores' FIFO wake order; substituting
//! an unordered primitive would break it.

use crate::sync::{Lock, Semaphore, SpinLock};
use std::sync::Arc;

/// A condition variable bound to a [`Lock`].
///
/// Callers must hold the bound lock around [`wait`]; the lock is released
/// while the thread sleeps and re-acquired before `wait` returns.
/// [`signal`] wakes the longest-waiting thread and blocks until it has
/// taken over; [`broadcast`] releases every current waiter.
///
/// [`wait`]: Condition::wait
/// [`signal`]: Condition::signal
/// [`broadcast`]: Condition::broadcast
pub struct Condition {
    name: String,
    lock: Arc<Lock>,
    waiters: SpinLock<usize>,
    sem_s: Semaphore,
    sem_x: Semaphore,
    sem_h: Semaphore,
}

impl Condition {
    /// Creates a condition variable bound to `lock`.
    pub fn new(name: impl Into<String>, lock: Arc<Lock>) -> Self {
        let name = name.into();
        Self {
            sem_s: Semaphore::new(format!("{name}:S"), 0),
            sem_x: Semaphore::new(format!("{name}:X"), 1),
            sem_h: Semaphore::new(format!("{name}:H"), 0),
            name,
            lock,
            waiters: SpinLock::new(0),
        }
    }

    /// Debug name given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the bound lock, sleep until signaled, then re-acquire it.
    ///
    /// # Panics
    /// Panics if the calling thread does not hold the bound lock.
    pub fn wait(&self) {
        assert!(
            self.lock.is_held_by_current_thread(),
            "wait on condition `{}` without holding its lock",
            self.name
        );
        self.sem_x.p();
        *self.waiters.lock() += 1;
        self.sem_x.v();

        self.lock.release();
        self.sem_s.p();
        self.sem_h.v();
        self.lock.acquire();
    }

    /// Wake the longest-waiting thread, if any, and wait for its handoff.
    pub fn signal(&self) {
        self.sem_x.p();
        if *self.waiters.lock() > 0 {
            *self.waiters.lock() -= 1;
            self.sem_s.v();
            self.sem_h.p();
        }
        self.sem_x.v();
    }

    /// Wake every waiting thread, then drain their handoffs.
    pub fn broadcast(&self) {
        self.sem_x.p();
        let count = *self.waiters.lock();
        for _ in 0..count {
            self.sem_s.v();
        }
        for _ in 0..count {
            *self.waiters.lock() -= 1;
            self.sem_h.p();
        }
        self.sem_x.v();
    }
}
