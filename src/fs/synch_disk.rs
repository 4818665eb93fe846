//! Synchronous disk access.
//!
//! The raw [`Disk`] is a request/interrupt device; this wrapper turns it
//! into the blocking `read_sector`/`write_sector` interface the file
//! system wants. A request lock admits one outstanding request at a
//! time, and the completion semaphore — signaled from the device's
//! completion interrupt — blocks the requester until its data has
//! actually moved.

use crate::constants::SECTOR_SIZE;
use crate::machine::Disk;
use crate::sync::{Lock, Semaphore};
use std::sync::Arc;

/// Blocking, one-request-at-a-time disk interface.
pub struct SynchDisk {
    disk: Disk,
    lock: Lock,
    request_done: Arc<Semaphore>,
}

impl Default for SynchDisk {
    fn default() -> Self {
        Self::new()
    }
}

impl SynchDisk {
    fn with_disk(build: impl FnOnce(Arc<Semaphore>) -> Disk) -> Self {
        let request_done = Arc::new(Semaphore::new("disk request done", 0));
        Self {
            disk: build(Arc::clone(&request_done)),
            lock: Lock::new("synch disk"),
            request_done,
        }
    }

    /// Creates a synchronous interface over a zeroed disk.
    pub fn new() -> Self {
        Self::with_disk(|sem| Disk::new(Arc::new(move || sem.v())))
    }

    /// Creates a synchronous interface over an existing disk image.
    pub fn from_image(image: Vec<u8>) -> Self {
        Self::with_disk(|sem| Disk::from_image(image, Arc::new(move || sem.v())))
    }

    /// Snapshot the raw disk contents.
    pub fn image(&self) -> Vec<u8> {
        self.disk.image()
    }

    /// Read `sector` into `buf`, blocking until the data is in place.
    pub fn read_sector(&self, sector: usize, buf: &mut [u8; SECTOR_SIZE]) {
        self.lock.acquire();
        self.disk.read_request(sector, buf);
        self.request_done.p();
        self.lock.release();
    }

    /// Write `buf` to `sector`, blocking until the data is stored.
    pub fn write_sector(&self, sector: usize, buf: &[u8; SECTOR_SIZE]) {
        self.lock.acquire();
        self.disk.write_request(sector, buf);
        self.request_done.p();
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_sector() {
        let disk = SynchDisk::new();
        let mut out = [0u8; SECTOR_SIZE];
        out[0] = 0x42;
        out[SECTOR_SIZE - 1] = 0x24;
        disk.write_sector(7, &out);
        let mut back = [0u8; SECTOR_SIZE];
        disk.read_sector(7, &mut back);
        assert_eq!(out, back);
    }
}
