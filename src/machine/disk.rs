//! Raw sector disk device.
//!
//! The device model is asynchronous: a request completes "later" and
//! raises a completion interrupt. This simulation completes requests
//! inline, but keeps the interrupt structure — each request ends by
//! invoking the completion handler installed at construction, and the
//! synchronous wrapper built on top ([`SynchDisk`]) blocks on a semaphore
//! that the handler signals. Only the wrapper talks to the device, one
//! request at a time.
//!
//! [`SynchDisk`]: crate::fs::SynchDisk

use crate::constants::{NUM_SECTORS, SECTOR_SIZE};
use crate::sync::SpinLock;
use std::sync::Arc;

/// Completion-interrupt handler installed by the device's owner.
pub type CompletionHandler = Arc<dyn Fn() + Send + Sync>;

/// An in-memory disk of [`NUM_SECTORS`] sectors.
pub struct Disk {
    sectors: SpinLock<Vec<u8>>,
    request_done: CompletionHandler,
}

impl Disk {
    /// Creates a zeroed disk whose completion interrupt runs
    /// `request_done`.
    pub fn new(request_done: CompletionHandler) -> Self {
        Self {
            sectors: SpinLock::new(vec![0; NUM_SECTORS * SECTOR_SIZE]),
            request_done,
        }
    }

    /// Creates a disk from a raw image, as produced by [`image`].
    ///
    /// # Panics
    /// Panics if the image is not exactly `NUM_SECTORS * SECTOR_SIZE`
    /// bytes.
    ///
    /// [`image`]: Self::image
    pub fn from_image(image: Vec<u8>, request_done: CompletionHandler) -> Self {
        assert_eq!(
            image.len(),
            NUM_SECTORS * SECTOR_SIZE,
            "disk image has the wrong size"
        );
        Self {
            sectors: SpinLock::new(image),
            request_done,
        }
    }

    /// Snapshot the raw contents, for persisting a disk image.
    pub fn image(&self) -> Vec<u8> {
        self.sectors.lock().clone()
    }

    /// Request a sector read into `buf`. The completion handler fires
    /// when the data is in place.
    pub fn read_request(&self, sector: usize, buf: &mut [u8; SECTOR_SIZE]) {
        assert!(sector < NUM_SECTORS, "sector out of range");
        {
            let sectors = self.sectors.lock();
            buf.copy_from_slice(&sectors[sector * SECTOR_SIZE..(sector + 1) * SECTOR_SIZE]);
        }
        (self.request_done)();
    }

    /// Request a sector write from `buf`. The completion handler fires
    /// when the data has been stored.
    pub fn write_request(&self, sector: usize, buf: &[u8; SECTOR_SIZE]) {
        assert!(sector < NUM_SECTORS, "sector out of range");
        {
            let mut sectors = self.sectors.lock();
            sectors[sector * SECTOR_SIZE..(sector + 1) * SECTOR_SIZE].copy_from_slice(buf);
        }
        (self.request_done)();
    }
}
