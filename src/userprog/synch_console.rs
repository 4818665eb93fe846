//! Synchronous console access.
//!
//! Wraps the raw console device the same way [`SynchDisk`] wraps the
//! disk: each direction has a completion semaphore signaled from the
//! device interrupt, and a lock admitting one request at a time. The
//! two directions are serialized independently — a thread blocked
//! reading does not stop another from writing.
//!
//! [`SynchDisk`]: crate::fs::SynchDisk

use crate::machine::console::{Console, ConsoleInput, ConsoleOutput};
use crate::sync::{Lock, Semaphore};
use std::sync::Arc;

/// Blocking console interface, serialized per direction.
pub struct SynchConsole {
    console: Console,
    read_lock: Lock,
    write_lock: Lock,
    read_avail: Arc<Semaphore>,
    write_done: Arc<Semaphore>,
}

impl SynchConsole {
    /// Creates a synchronous console over the given endpoints.
    pub fn new(input: Box<dyn ConsoleInput>, output: Box<dyn ConsoleOutput>) -> Self {
        let read_avail = Arc::new(Semaphore::new("console read avail", 0));
        let write_done = Arc::new(Semaphore::new("console write done", 0));
        let console = Console::new(input, output, {
            let read_avail = Arc::clone(&read_avail);
            Arc::new(move || read_avail.v())
        }, {
            let write_done = Arc::clone(&write_done);
            Arc::new(move || write_done.v())
        });
        Self {
            console,
            read_lock: Lock::new("console read"),
            write_lock: Lock::new("console write"),
            read_avail,
            write_done,
        }
    }

    /// Emit one byte, blocking until the device has taken it.
    pub fn put_char(&self, byte: u8) {
        self.write_lock.acquire();
        self.console.put_char(byte);
        self.write_done.p();
        self.write_lock.release();
    }

    /// Fetch one byte, blocking until the device has one.
    pub fn get_char(&self) -> u8 {
        self.read_lock.acquire();
        let byte = self.console.get_char();
        self.read_avail.p();
        self.read_lock.release();
        byte
    }

    /// Emit every byte of `bytes`.
    pub fn put_bytes(&self, bytes: &[u8]) {
        for &byte in bytes {
            self.put_char(byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::console::{MemoryInput, MemoryOutput};

    #[test]
    fn echoes_bytes_through_both_directions() {
        let input = MemoryInput::new();
        let output = MemoryOutput::new();
        input.feed(b"hi");
        let console = SynchConsole::new(Box::new(input), Box::new(output.clone()));
        let a = console.get_char();
        let b = console.get_char();
        console.put_char(a);
        console.put_char(b);
        assert_eq!(output.contents(), b"hi");
        // Exhausted input reads as zero.
        assert_eq!(console.get_char(), 0);
    }
}
