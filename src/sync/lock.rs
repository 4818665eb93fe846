//! Mutual exclusion with owner tracking and priority donation.

use crate::sync::{Semaphore, SpinLock};
use crate::thread::{Current, ThreadHandle};
use std::sync::Arc;

struct Owner {
    thread: Arc<ThreadHandle>,
    /// The owner's priority before the first donation, restored on
    /// release. `None` while no donation has happened.
    saved_priority: Option<u32>,
}

/// A mutual-exclusion lock.
///
/// Unlike a poisoning host mutex this lock follows the kernel contract:
/// acquiring a lock already held by the calling thread, or releasing a
/// lock it does not hold, is a precondition violation and panics.
///
/// The lock tracks its owner and donates priority: if a thread acquires
/// a lock whose owner has a lower priority level, the owner is raised to
/// the caller's level until it releases, which prevents a mid-priority
/// thread from starving the owner while the caller waits. Only one level
/// of donation is modeled — the priority saved by the first donation is
/// the one restored, so nested re-donations do not stack.
///
/// The owner reference is only meaningful while the lock is held; it is
/// cleared on release (the lock never keeps a thread alive beyond that).
pub struct Lock {
    name: String,
    semaphore: Semaphore,
    owner: SpinLock<Option<Owner>>,
}

impl Lock {
    /// Creates an unlocked lock.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            semaphore: Semaphore::new(name.clone(), 1),
            name,
            owner: SpinLock::new(None),
        }
    }

    /// Debug name given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquire the lock, blocking until it is free.
    ///
    /// # Panics
    /// Panics if the calling thread already holds the lock.
    pub fn acquire(&self) {
        let me = Current::handle();
        assert!(
            !self.is_held_by_current_thread(),
            "thread `{}` re-acquired lock `{}`",
            me.name(),
            self.name
        );
        {
            let mut owner = self.owner.lock();
            if let Some(owner) = owner.as_mut() {
                if owner.thread.priority() < me.priority() {
                    if owner.saved_priority.is_none() {
                        owner.saved_priority = Some(owner.thread.priority());
                    }
                    owner.thread.set_priority(me.priority());
                }
            }
        }
        self.semaphore.p();
        *self.owner.lock() = Some(Owner {
            thread: me,
            saved_priority: None,
        });
    }

    /// Release the lock, restoring any donated priority.
    ///
    /// # Panics
    /// Panics if the calling thread does not hold the lock.
    pub fn release(&self) {
        assert!(
            self.is_held_by_current_thread(),
            "lock `{}` released by a thread that does not hold it",
            self.name
        );
        {
            let mut owner = self.owner.lock();
            if let Some(owner) = owner.take() {
                if let Some(saved) = owner.saved_priority {
                    owner.thread.set_priority(saved);
                }
            }
        }
        self.semaphore.v();
    }

    /// Whether the calling thread is the current owner.
    pub fn is_held_by_current_thread(&self) -> bool {
        let owner = self.owner.lock();
        owner
            .as_ref()
            .is_some_and(|o| o.thread.tid() == Current::handle().tid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadBuilder;

    #[test]
    fn excludes_concurrent_critical_sections() {
        let lock = Arc::new(Lock::new("counter"));
        let count = Arc::new(SpinLock::new(0u32));

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let lock = Arc::clone(&lock);
                let count = Arc::clone(&count);
                ThreadBuilder::new(format!("adder-{i}")).spawn(move || {
                    for _ in 0..100 {
                        lock.acquire();
                        let v = *count.lock();
                        std::thread::yield_now();
                        *count.lock() = v + 1;
                        lock.release();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(*count.lock(), 800);
    }

    #[test]
    fn donates_and_restores_priority() {
        let lock = Arc::new(Lock::new("donated"));
        let holder_ready = Arc::new(Semaphore::new("holder ready", 0));

        let holder = {
            let lock = Arc::clone(&lock);
            let holder_ready = Arc::clone(&holder_ready);
            ThreadBuilder::new("low").priority(2).spawn(move || {
                lock.acquire();
                holder_ready.v();
                // The priority-9 contender raises this thread when it
                // reaches acquire(); the boost itself is the rendezvous.
                while Current::handle().priority() != 9 {
                    std::thread::yield_now();
                }
                lock.release();
                assert_eq!(Current::handle().priority(), 2);
            })
        };

        holder_ready.p();
        let contender = {
            let lock = Arc::clone(&lock);
            ThreadBuilder::new("high").priority(9).spawn(move || {
                lock.acquire();
                lock.release();
            })
        };

        holder.join().unwrap();
        contender.join().unwrap();
    }

    #[test]
    #[should_panic(expected = "re-acquired")]
    fn double_acquire_is_a_contract_violation() {
        let lock = Lock::new("twice");
        lock.acquire();
        lock.acquire();
    }
}
