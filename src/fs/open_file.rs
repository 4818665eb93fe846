//! Open-file handles.
//!
//! An [`OpenFile`] is an offset-bearing handle over a file header.
//! Every `open` produces an independent handle with its own seek
//! position; what handles on the same file share is the file system's
//! per-file bookkeeping entry, whose readers/writer mutex coordinates
//! them — reads share, writes (and the extensions they trigger)
//! exclude. Reads and writes clamp to the file length rather than
//! erroring, stage partial sectors through a sector-sized scratch
//! buffer, and report the bytes actually moved.
//!
//! Dropping the handle tells the file system a handle closed; the last
//! close of a file with a pending removal releases its storage.

use crate::constants::SECTOR_SIZE;
use crate::fs::file_header::FileHeader;
use crate::fs::{FileEntry, FileSystem, SynchDisk};
use crate::sync::SpinLock;
use std::sync::Arc;

/// Copy bytes out of the file described by `header`, starting at
/// `position`, clamped to the file length. Returns the bytes read.
pub(crate) fn read_file_at(
    disk: &SynchDisk,
    header: &FileHeader,
    buf: &mut [u8],
    position: usize,
) -> usize {
    let length = header.length();
    if position >= length || buf.is_empty() {
        return 0;
    }
    let count = buf.len().min(length - position);
    let mut scratch = [0u8; SECTOR_SIZE];
    let mut done = 0;
    while done < count {
        let at = position + done;
        let sector = header.byte_to_sector(at);
        let offset = at % SECTOR_SIZE;
        let chunk = (SECTOR_SIZE - offset).min(count - done);
        disk.read_sector(sector, &mut scratch);
        buf[done..done + chunk].copy_from_slice(&scratch[offset..offset + chunk]);
        done += chunk;
    }
    count
}

/// Copy bytes into the file described by `header`, starting at
/// `position`, clamped to the file length (growth is the caller's
/// responsibility). Partial sectors are read, patched and rewritten.
/// Returns the bytes written.
pub(crate) fn write_file_at(
    disk: &SynchDisk,
    header: &FileHeader,
    buf: &[u8],
    position: usize,
) -> usize {
    let length = header.length();
    if position >= length || buf.is_empty() {
        return 0;
    }
    let count = buf.len().min(length - position);
    let mut scratch = [0u8; SECTOR_SIZE];
    let mut done = 0;
    while done < count {
        let at = position + done;
        let sector = header.byte_to_sector(at);
        let offset = at % SECTOR_SIZE;
        let chunk = (SECTOR_SIZE - offset).min(count - done);
        if chunk < SECTOR_SIZE {
            disk.read_sector(sector, &mut scratch);
        }
        scratch[offset..offset + chunk].copy_from_slice(&buf[done..done + chunk]);
        disk.write_sector(sector, &scratch);
        done += chunk;
    }
    count
}

/// A handle on an open file.
pub struct OpenFile {
    fs: Arc<FileSystem>,
    entry: Arc<FileEntry>,
    sector: usize,
    header: SpinLock<FileHeader>,
    seek_position: SpinLock<u64>,
}

impl OpenFile {
    pub(crate) fn new(
        fs: Arc<FileSystem>,
        entry: Arc<FileEntry>,
        sector: usize,
        header: FileHeader,
    ) -> Self {
        Self {
            fs,
            entry,
            sector,
            header: SpinLock::new(header),
            seek_position: SpinLock::new(0),
        }
    }

    /// The sector holding this file's header.
    pub fn sector(&self) -> usize {
        self.sector
    }

    /// Current file length in bytes.
    pub fn length(&self) -> usize {
        self.header.lock().length()
    }

    /// Set the seek position.
    pub fn seek(&self, position: u64) {
        *self.seek_position.lock() = position;
    }

    /// Current seek position.
    pub fn tell(&self) -> u64 {
        *self.seek_position.lock()
    }

    /// Read up to `buf.len()` bytes at `position` under the file's read
    /// lock. Returns the bytes read; 0 at end of file.
    pub fn read_at(&self, buf: &mut [u8], position: u64) -> usize {
        self.entry.rw.read_lock();
        let header = self.header.lock().clone();
        let count = read_file_at(self.fs.disk(), &header, buf, position as usize);
        self.entry.rw.read_unlock();
        count
    }

    /// Read at the seek position, advancing it by the bytes read.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let position = self.tell();
        let count = self.read_at(buf, position);
        *self.seek_position.lock() = position + count as u64;
        count
    }

    /// Write `buf` at `position` under the file's write lock, growing
    /// the file first when the write reaches past the current end. On
    /// allocation failure the write is truncated to what fits. Returns
    /// the bytes written.
    pub fn write_at(&self, buf: &[u8], position: u64) -> usize {
        if buf.is_empty() {
            return 0;
        }
        self.entry.rw.write_lock();
        let end = position as usize + buf.len();
        if end > self.header.lock().length() {
            let length = self.header.lock().length();
            self.fs.grow_file(&self.header, self.sector, end - length);
        }
        let header = self.header.lock().clone();
        let count = write_file_at(self.fs.disk(), &header, buf, position as usize);
        self.entry.rw.write_unlock();
        count
    }

    /// Write at the seek position, advancing it by the bytes written.
    pub fn write(&self, buf: &[u8]) -> usize {
        let position = self.tell();
        let count = self.write_at(buf, position);
        *self.seek_position.lock() = position + count as u64;
        count
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        self.fs.note_closed(self.sector);
    }
}
