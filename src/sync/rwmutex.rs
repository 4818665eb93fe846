//! Readers/writer mutex.
//!
//! Counter-biased encoding in the style of Go's `sync.RWMutex`: readers
//! increment `reader_count` and proceed while it is nonnegative. A writer
//! first serializes against other writers, then subtracts [`MAX_READERS`]
//! from `reader_count`, driving it negative — readers that arrive during
//! the writer's turn observe a negative count and block on the reader
//! semaphore. `reader_wait` counts the readers that were already active
//! when the writer announced itself; the last of them to leave wakes the
//! writer. On unlock the writer adds [`MAX_READERS`] back and releases
//! every reader that queued up in the interim.
//!
//! One deliberate exception: a thread holding the write side may re-enter
//! the read side without touching the counters (ownership of the writer
//! mutex is the evidence). Such a reader must issue its `read_unlock`
//! before `write_unlock`, not after.

use crate::constants::MAX_READERS;
use crate::sync::{Lock, Semaphore};
use std::sync::atomic::{AtomicI32, Ordering};

/// A readers/writer mutex: many readers or one writer.
///
/// The counters are only mutated inside the atomic-section lock; the
/// atomics carry the values between sections, they are not the
/// synchronization themselves.
pub struct RwMutex {
    atomic: Lock,
    writer_mutex: Lock,
    reader_sem: Semaphore,
    writer_sem: Semaphore,
    reader_count: AtomicI32,
    reader_wait: AtomicI32,
}

impl Default for RwMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl RwMutex {
    /// Creates an unlocked readers/writer mutex.
    pub fn new() -> Self {
        Self {
            atomic: Lock::new("rwmutex:atomic"),
            writer_mutex: Lock::new("rwmutex:writer"),
            reader_sem: Semaphore::new("rwmutex:readers", 0),
            writer_sem: Semaphore::new("rwmutex:writers", 0),
            reader_count: AtomicI32::new(0),
            reader_wait: AtomicI32::new(0),
        }
    }

    /// Acquire the read side, blocking while a writer is pending or
    /// active. Re-entrant (and a no-op) for the thread holding the write
    /// side.
    pub fn read_lock(&self) {
        if self.writer_mutex.is_held_by_current_thread() {
            return;
        }
        self.atomic.acquire();
        let r = self.reader_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.atomic.release();
        if r < 0 {
            // A writer is pending.
            self.reader_sem.p();
        }
    }

    /// Release the read side. No-op for the thread holding the write side.
    pub fn read_unlock(&self) {
        if self.writer_mutex.is_held_by_current_thread() {
            return;
        }
        self.atomic.acquire();
        let r = self.reader_count.fetch_sub(1, Ordering::SeqCst) - 1;
        self.atomic.release();
        if r < 0 {
            debug_assert!(
                r + 1 != 0 && r + 1 != -MAX_READERS,
                "read_unlock of an unlocked RwMutex"
            );
            // A writer is pending; the last active reader unblocks it.
            self.atomic.acquire();
            let remaining = self.reader_wait.fetch_sub(1, Ordering::SeqCst) - 1;
            self.atomic.release();
            if remaining == 0 {
                self.writer_sem.v();
            }
        }
    }

    /// Acquire the write side, draining the active readers first.
    pub fn write_lock(&self) {
        // Resolve competition with other writers.
        self.writer_mutex.acquire();

        self.atomic.acquire();
        let active = self.reader_count.load(Ordering::SeqCst);
        let wait = self.reader_wait.fetch_add(active, Ordering::SeqCst) + active;
        let must_wait = active != 0 && wait != 0;
        self.reader_count.fetch_sub(MAX_READERS, Ordering::SeqCst);
        self.atomic.release();

        if must_wait {
            self.writer_sem.p();
        }
    }

    /// Release the write side, waking every reader that queued up.
    pub fn write_unlock(&self) {
        self.atomic.acquire();
        let r = self.reader_count.fetch_add(MAX_READERS, Ordering::SeqCst) + MAX_READERS;
        self.atomic.release();
        debug_assert!(r < MAX_READERS, "write_unlock of an unlocked RwMutex");

        for _ in 0..r {
            self.reader_sem.v();
        }
        self.writer_mutex.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SpinLock;
    use crate::thread::ThreadBuilder;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn readers_share_writers_exclude() {
        let rw = Arc::new(RwMutex::new());
        let readers_in = Arc::new(AtomicUsize::new(0));
        let writers_in = Arc::new(AtomicUsize::new(0));
        let violations = Arc::new(AtomicUsize::new(0));

        let mut threads = Vec::new();
        for i in 0..6 {
            let rw = Arc::clone(&rw);
            let readers_in = Arc::clone(&readers_in);
            let writers_in = Arc::clone(&writers_in);
            let violations = Arc::clone(&violations);
            threads.push(ThreadBuilder::new(format!("reader-{i}")).spawn(move || {
                for _ in 0..50 {
                    rw.read_lock();
                    readers_in.fetch_add(1, Ordering::SeqCst);
                    if writers_in.load(Ordering::SeqCst) != 0 {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    readers_in.fetch_sub(1, Ordering::SeqCst);
                    rw.read_unlock();
                }
            }));
        }
        for i in 0..3 {
            let rw = Arc::clone(&rw);
            let readers_in = Arc::clone(&readers_in);
            let writers_in = Arc::clone(&writers_in);
            let violations = Arc::clone(&violations);
            threads.push(ThreadBuilder::new(format!("writer-{i}")).spawn(move || {
                for _ in 0..20 {
                    rw.write_lock();
                    writers_in.fetch_add(1, Ordering::SeqCst);
                    if readers_in.load(Ordering::SeqCst) != 0
                        || writers_in.load(Ordering::SeqCst) != 1
                    {
                        violations.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::yield_now();
                    writers_in.fetch_sub(1, Ordering::SeqCst);
                    rw.write_unlock();
                }
            }));
        }
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(violations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn writer_may_reenter_read_side() {
        let rw = Arc::new(RwMutex::new());
        let log = Arc::new(SpinLock::new(Vec::new()));
        let writer = {
            let rw = Arc::clone(&rw);
            let log = Arc::clone(&log);
            ThreadBuilder::new("writer").spawn(move || {
                rw.write_lock();
                rw.read_lock();
                log.lock().push("read under write");
                rw.read_unlock();
                rw.write_unlock();
            })
        };
        writer.join().unwrap();
        assert_eq!(*log.lock(), vec!["read under write"]);
    }
}
