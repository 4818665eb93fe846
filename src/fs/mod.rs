//! The on-disk file system.
//!
//! Layout: sector 0 holds the file header of the free-sector bitmap,
//! sector 1 the header of the directory; both are ordinary files kept
//! permanently "open" by the file system. Every other file is a header
//! sector claimed from the bitmap plus the data sectors its header
//! chain describes.
//!
//! Concurrency model (two levels):
//! - one global lock serializes every directory and bitmap mutation
//!   (create, remove, growth, reclamation);
//! - each live file owns a [`RwMutex`]; handles take its read side
//!   around reads and its write side around writes and extensions.
//!
//! Removal is deferred: removing an open file hides it from subsequent
//! `open` calls but keeps its storage until the last handle closes.
//! Removing a closed file reclaims immediately. Either way, once the
//! storage is gone the name is gone, and removing it again reports
//! not-found.

mod directory;
mod file_header;
mod open_file;
mod synch_disk;

pub use directory::{DIRECTORY_ENTRY_SIZE, DIRECTORY_FILE_SIZE, Directory};
pub use file_header::{FileHeader, RawFileHeader};
pub use open_file::OpenFile;
pub use synch_disk::SynchDisk;

use crate::KernelError;
use crate::constants::{
    DIRECTORY_SECTOR, FILE_NAME_MAX_LEN, FREE_MAP_SECTOR, NUM_SECTORS, SECTOR_SIZE,
};
use crate::sync::{Lock, RwMutex, SpinLock};
use crate::util::{Bitmap, FilePath};
use open_file::{read_file_at, write_file_at};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Size of the free-sector bitmap file: one bit per sector.
pub const FREE_MAP_FILE_SIZE: usize = NUM_SECTORS / 8;

pub(crate) struct FileMeta {
    pub open_count: usize,
    pub pending_removal: bool,
}

/// Per-file bookkeeping shared by every handle on the same file.
pub(crate) struct FileEntry {
    pub rw: RwMutex,
    pub meta: SpinLock<FileMeta>,
}

/// The file system service.
pub struct FileSystem {
    disk: Arc<SynchDisk>,
    lock: Lock,
    free_map_header: FileHeader,
    directory_header: FileHeader,
    entries: SpinLock<BTreeMap<usize, Arc<FileEntry>>>,
    working_dir: SpinLock<FilePath>,
}

impl FileSystem {
    /// Bring up the file system on `disk`. With `format`, the disk is
    /// initialized to an empty directory and a fresh bitmap; otherwise
    /// the two system files are opened as-is.
    pub fn new(disk: Arc<SynchDisk>, format: bool) -> Arc<Self> {
        let (free_map_header, directory_header) = if format {
            debug!("formatting the file system");
            let mut free_map = Bitmap::new(NUM_SECTORS);
            free_map.mark(FREE_MAP_SECTOR);
            free_map.mark(DIRECTORY_SECTOR);

            let mut free_map_header = FileHeader::default();
            assert!(
                free_map_header.allocate(&mut free_map, FREE_MAP_FILE_SIZE),
                "no room for the free-map file"
            );
            let mut directory_header = FileHeader::default();
            assert!(
                directory_header.allocate(&mut free_map, DIRECTORY_FILE_SIZE),
                "no room for the directory file"
            );

            // Headers first: opening a file reads its header off disk.
            free_map_header.write_back(&disk, FREE_MAP_SECTOR);
            directory_header.write_back(&disk, DIRECTORY_SECTOR);
            write_file_at(&disk, &free_map_header, &free_map.to_bytes(), 0);
            write_file_at(&disk, &directory_header, &Directory::default().encode(), 0);
            (free_map_header, directory_header)
        } else {
            (
                FileHeader::fetch_from(&disk, FREE_MAP_SECTOR),
                FileHeader::fetch_from(&disk, DIRECTORY_SECTOR),
            )
        };

        Arc::new(Self {
            disk,
            lock: Lock::new("file system"),
            free_map_header,
            directory_header,
            entries: SpinLock::new(BTreeMap::new()),
            working_dir: SpinLock::new(FilePath::default()),
        })
    }

    pub(crate) fn disk(&self) -> &SynchDisk {
        &self.disk
    }

    fn fetch_free_map(&self) -> Bitmap {
        let mut free_map = Bitmap::new(NUM_SECTORS);
        let mut bytes = vec![0u8; free_map.byte_len()];
        read_file_at(&self.disk, &self.free_map_header, &mut bytes, 0);
        free_map.load_bytes(&bytes);
        free_map
    }

    fn store_free_map(&self, free_map: &Bitmap) {
        write_file_at(&self.disk, &self.free_map_header, &free_map.to_bytes(), 0);
    }

    fn fetch_directory(&self) -> Directory {
        let mut bytes = vec![0u8; DIRECTORY_FILE_SIZE];
        read_file_at(&self.disk, &self.directory_header, &mut bytes, 0);
        Directory::decode(&bytes)
    }

    fn store_directory(&self, directory: &Directory) {
        write_file_at(&self.disk, &self.directory_header, &directory.encode(), 0);
    }

    fn entry_for(&self, sector: usize) -> Arc<FileEntry> {
        let mut entries = self.entries.lock();
        Arc::clone(entries.entry(sector).or_insert_with(|| {
            Arc::new(FileEntry {
                rw: RwMutex::new(),
                meta: SpinLock::new(FileMeta {
                    open_count: 0,
                    pending_removal: false,
                }),
            })
        }))
    }

    /// Create `name` with `initial_size` bytes of storage.
    pub fn create(&self, name: &str, initial_size: usize) -> Result<(), KernelError> {
        if name.is_empty() || name.len() > FILE_NAME_MAX_LEN {
            return Err(KernelError::NameTooLong);
        }
        debug!(name, initial_size, "creating file");
        self.lock.acquire();
        let result = (|| {
            let mut directory = self.fetch_directory();
            if directory.find(name).is_some() {
                return Err(KernelError::FileExists);
            }
            let mut free_map = self.fetch_free_map();
            let sector = free_map.find().ok_or(KernelError::NoSpace)?;
            if !directory.add(name, sector) {
                return Err(KernelError::NoSpace);
            }
            let mut header = FileHeader::default();
            if !header.allocate(&mut free_map, initial_size) {
                return Err(KernelError::NoSpace);
            }
            // All claims succeeded; only now touch the disk.
            header.write_back(&self.disk, sector);
            self.store_directory(&directory);
            self.store_free_map(&free_map);
            Ok(())
        })();
        self.lock.release();
        result
    }

    /// Open `name` for reading and writing.
    pub fn open(self: &Arc<Self>, name: &str) -> Result<OpenFile, KernelError> {
        debug!(name, "opening file");
        self.lock.acquire();
        let result = (|| {
            let directory = self.fetch_directory();
            let sector = directory.find(name).ok_or(KernelError::NoSuchEntry)?;
            let entry = self.entry_for(sector);
            {
                let mut meta = entry.meta.lock();
                if meta.pending_removal {
                    return Err(KernelError::NoSuchEntry);
                }
                meta.open_count += 1;
            }
            let header = FileHeader::fetch_from(&self.disk, sector);
            Ok(OpenFile::new(Arc::clone(self), entry, sector, header))
        })();
        self.lock.release();
        result
    }

    /// Remove `name`. With no open handles the storage is reclaimed on
    /// the spot; with handles open the removal is deferred — the name
    /// stops resolving in `open`, the storage goes when the last handle
    /// closes, and repeating the remove meanwhile succeeds again.
    pub fn remove(&self, name: &str) -> Result<(), KernelError> {
        debug!(name, "removing file");
        self.lock.acquire();
        let result = (|| {
            let mut directory = self.fetch_directory();
            let sector = directory.find(name).ok_or(KernelError::NoSuchEntry)?;
            let entry = self.entry_for(sector);
            {
                let mut meta = entry.meta.lock();
                if meta.open_count > 0 {
                    meta.pending_removal = true;
                    return Ok(());
                }
            }
            self.reclaim_locked(sector, &mut directory);
            Ok(())
        })();
        self.lock.release();
        result
    }

    /// Names in the directory, in table order.
    pub fn list(&self) -> Vec<String> {
        self.lock.acquire();
        let directory = self.fetch_directory();
        self.lock.release();
        directory.names()
    }

    /// Change the working directory. The directory is flat, so the only
    /// reachable directory is the root: any path that normalizes to it
    /// (`/`, `.`, `a/..`, …) succeeds, everything else does not resolve.
    pub fn change_dir(&self, path: &str) -> Result<(), KernelError> {
        let mut target = self.working_dir.lock().clone();
        target.change_dir(path);
        if target.is_empty() {
            *self.working_dir.lock() = target;
            Ok(())
        } else {
            Err(KernelError::NoSuchEntry)
        }
    }

    /// Verify the on-disk structures: every reachable header chain claims
    /// sectors exactly once, sector counts match file sizes, and the
    /// free map agrees with what is reachable.
    pub fn check(&self) -> bool {
        fn claim(header: &FileHeader, shadow: &mut Bitmap) -> bool {
            for sector in header.claimed_sectors() {
                if sector >= NUM_SECTORS || shadow.test(sector) {
                    return false;
                }
                shadow.mark(sector);
            }
            true
        }

        self.lock.acquire();
        let ok = (|| {
            let mut shadow = Bitmap::new(NUM_SECTORS);
            shadow.mark(FREE_MAP_SECTOR);
            shadow.mark(DIRECTORY_SECTOR);
            if !claim(&self.free_map_header, &mut shadow)
                || !claim(&self.directory_header, &mut shadow)
            {
                return false;
            }
            for (_, sector) in self.fetch_directory().entries() {
                if sector >= NUM_SECTORS || shadow.test(sector) {
                    return false;
                }
                shadow.mark(sector);
                let header = FileHeader::fetch_from(&self.disk, sector);
                if !claim(&header, &mut shadow) {
                    return false;
                }
                if header.raw().num_sectors as usize
                    != header.length().div_ceil(SECTOR_SIZE)
                {
                    return false;
                }
            }
            let free_map = self.fetch_free_map();
            (0..NUM_SECTORS).all(|sector| free_map.test(sector) == shadow.test(sector))
        })();
        self.lock.release();
        ok
    }

    /// Grow the file whose header sits in `header_slot` by up to
    /// `wanted` bytes, persisting the header and bitmap. On exhaustion
    /// the growth falls back to the slack left in the file's last
    /// sector, so the caller's write is truncated rather than failed.
    /// Returns the bytes actually granted.
    pub(crate) fn grow_file(
        &self,
        header_slot: &SpinLock<FileHeader>,
        sector: usize,
        wanted: usize,
    ) -> usize {
        self.lock.acquire();
        let mut free_map = self.fetch_free_map();
        let mut header = header_slot.lock().clone();
        let granted = if header.extend(&mut free_map, wanted) {
            wanted
        } else {
            let slack = header.raw().num_sectors as usize * SECTOR_SIZE - header.length();
            let fallback = wanted.min(slack);
            // Growth inside already-claimed sectors cannot fail.
            assert!(header.extend(&mut free_map, fallback));
            fallback
        };
        if granted > 0 {
            header.write_back(&self.disk, sector);
            self.store_free_map(&free_map);
            *header_slot.lock() = header;
        }
        self.lock.release();
        granted
    }

    /// A handle on the file at `sector` closed.
    pub(crate) fn note_closed(&self, sector: usize) {
        self.lock.acquire();
        let entry = self.entries.lock().get(&sector).cloned();
        if let Some(entry) = entry {
            let reclaim = {
                let mut meta = entry.meta.lock();
                meta.open_count -= 1;
                meta.open_count == 0 && meta.pending_removal
            };
            if reclaim {
                let mut directory = self.fetch_directory();
                self.reclaim_locked(sector, &mut directory);
            }
        }
        self.lock.release();
    }

    /// Release the header, data sectors and directory entry of the file
    /// at `sector`. Caller holds the global lock.
    fn reclaim_locked(&self, sector: usize, directory: &mut Directory) {
        debug!(sector, "reclaiming file storage");
        let mut free_map = self.fetch_free_map();
        let mut header = FileHeader::fetch_from(&self.disk, sector);
        header.deallocate(&mut free_map);
        free_map.clear(sector);
        if let Some(name) = directory.find_by_sector(sector) {
            directory.remove(&name);
        }
        self.store_directory(directory);
        self.store_free_map(&free_map);
        self.entries.lock().remove(&sector);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_fs() -> Arc<FileSystem> {
        FileSystem::new(Arc::new(SynchDisk::new()), true)
    }

    #[test]
    fn create_open_write_read_back() {
        let fs = fresh_fs();
        fs.create("f", 0).unwrap();
        let file = fs.open("f").unwrap();
        assert_eq!(file.write(b"hello, disk"), 11);
        file.seek(0);
        let mut buf = [0u8; 11];
        assert_eq!(file.read(&mut buf), 11);
        assert_eq!(&buf, b"hello, disk");
        assert!(fs.check());
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let fs = fresh_fs();
        fs.create("dup", 10).unwrap();
        assert_eq!(fs.create("dup", 10), Err(KernelError::FileExists));
    }

    #[test]
    fn long_names_are_rejected() {
        let fs = fresh_fs();
        assert_eq!(
            fs.create("much-too-long-name", 0),
            Err(KernelError::NameTooLong)
        );
    }

    #[test]
    fn zero_length_file_reads_nothing() {
        let fs = fresh_fs();
        fs.create("empty", 0).unwrap();
        let file = fs.open("empty").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(file.read(&mut buf), 0);
    }

    #[test]
    fn remove_of_closed_file_reclaims_immediately() {
        let fs = fresh_fs();
        fs.create("gone", 3 * SECTOR_SIZE).unwrap();
        drop(fs.open("gone").unwrap());
        fs.remove("gone").unwrap();
        assert!(fs.open("gone").is_err());
        // Only the first remove succeeds.
        for _ in 0..5 {
            assert_eq!(fs.remove("gone"), Err(KernelError::NoSuchEntry));
        }
        assert!(fs.check());
    }

    #[test]
    fn remove_of_open_file_defers_reclamation() {
        let fs = fresh_fs();
        let clear_before = fs.fetch_free_map().count_clear();
        fs.create("held", 0).unwrap();
        let file = fs.open("held").unwrap();
        // Removing an open file succeeds any number of times.
        for _ in 0..5 {
            fs.remove("held").unwrap();
        }
        assert!(fs.open("held").is_err());

        // The handle stays fully usable, extension included.
        assert_eq!(file.write(b"0123456789"), 10);
        file.seek(0);
        let mut buf = [0u8; 10];
        assert_eq!(file.read(&mut buf), 10);
        assert_eq!(&buf, b"0123456789");

        drop(file);
        assert!(fs.open("held").is_err());
        assert_eq!(fs.fetch_free_map().count_clear(), clear_before);
        assert!(fs.check());
    }

    #[test]
    fn growth_crosses_into_indirection() {
        let fs = fresh_fs();
        fs.create("big", 0).unwrap();
        let file = fs.open("big").unwrap();
        let chunk = vec![0xa5u8; 1000];
        let mut written = 0;
        while written < crate::constants::MAX_DIRECT_SPAN + 2 * SECTOR_SIZE {
            assert_eq!(file.write(&chunk), chunk.len());
            written += chunk.len();
        }
        file.seek(0);
        let mut back = vec![0u8; written];
        assert_eq!(file.read(&mut back), written);
        assert!(back.iter().all(|&b| b == 0xa5));
        assert!(fs.check());
    }

    #[test]
    fn survives_a_remount() {
        let disk = Arc::new(SynchDisk::new());
        {
            let fs = FileSystem::new(Arc::clone(&disk), true);
            fs.create("keep", 0).unwrap();
            let file = fs.open("keep").unwrap();
            file.write(b"persistent");
        }
        let image = disk.image();
        let fs = FileSystem::new(Arc::new(SynchDisk::from_image(image)), false);
        let file = fs.open("keep").unwrap();
        let mut buf = [0u8; 10];
        assert_eq!(file.read(&mut buf), 10);
        assert_eq!(&buf, b"persistent");
        assert!(fs.check());
    }

    #[test]
    fn flat_root_is_the_only_directory() {
        let fs = fresh_fs();
        fs.change_dir("/").unwrap();
        fs.change_dir("a/..").unwrap();
        assert_eq!(fs.change_dir("a/b"), Err(KernelError::NoSuchEntry));
    }
}
