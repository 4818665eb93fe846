//! User processes.
//!
//! A process is the kernel's record of one running user program: a pid,
//! a priority level, an address space, a fixed-size file-descriptor
//! table, and the exit plumbing its parent joins on. Descriptors 0 and
//! 1 name the console and never occupy table slots; real files get the
//! lowest free descriptor from 2 up.

use crate::KernelError;
use crate::constants::NUM_FILE_DESCRIPTORS;
use crate::fs::OpenFile;
use crate::sync::{Semaphore, SpinLock};
use crate::vm::{AddressSpace, SpaceId};
use std::sync::Arc;

/// First descriptor available for files; 0 and 1 are the console.
const FIRST_FILE_DESCRIPTOR: usize = 2;

/// One user process.
pub struct Process {
    pid: SpaceId,
    name: String,
    priority: u32,
    /// The address space; `None` before `exec` finishes setting it up
    /// and again after the process exits.
    pub(crate) space: SpinLock<Option<AddressSpace>>,
    files: SpinLock<[Option<Arc<OpenFile>>; NUM_FILE_DESCRIPTORS]>,
    exit_status: SpinLock<Option<i32>>,
    join_sem: Semaphore,
}

impl Process {
    /// Creates a process record with an empty descriptor table and no
    /// address space yet.
    pub fn new(pid: SpaceId, name: impl Into<String>, priority: u32) -> Arc<Self> {
        let name = name.into();
        Arc::new(Self {
            pid,
            join_sem: Semaphore::new(format!("join {name}"), 0),
            name,
            priority,
            space: SpinLock::new(None),
            files: SpinLock::new(std::array::from_fn(|_| None)),
            exit_status: SpinLock::new(None),
        })
    }

    /// Process id.
    pub fn pid(&self) -> SpaceId {
        self.pid
    }

    /// Process name (the executable path it was spawned from).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Priority level inherited from the spawning thread.
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Number of pages in the process's address space, if it has one.
    pub fn num_pages(&self) -> Option<usize> {
        self.space.lock().as_ref().map(|space| space.num_pages())
    }

    /// Install an open file in the lowest free descriptor slot.
    pub fn add_file(&self, file: Arc<OpenFile>) -> Result<i32, KernelError> {
        let mut files = self.files.lock();
        for fid in FIRST_FILE_DESCRIPTOR..NUM_FILE_DESCRIPTORS {
            if files[fid].is_none() {
                files[fid] = Some(file);
                return Ok(fid as i32);
            }
        }
        Err(KernelError::TooManyOpenFiles)
    }

    /// The file behind descriptor `fid`, if open.
    pub fn get_file(&self, fid: i32) -> Option<Arc<OpenFile>> {
        let fid = usize::try_from(fid).ok()?;
        if !(FIRST_FILE_DESCRIPTOR..NUM_FILE_DESCRIPTORS).contains(&fid) {
            return None;
        }
        self.files.lock()[fid].clone()
    }

    /// Release descriptor `fid`, returning its file so the caller can
    /// drop the last handle outside the table lock.
    pub fn remove_file(&self, fid: i32) -> Option<Arc<OpenFile>> {
        let fid = usize::try_from(fid).ok()?;
        if !(FIRST_FILE_DESCRIPTOR..NUM_FILE_DESCRIPTORS).contains(&fid) {
            return None;
        }
        self.files.lock()[fid].take()
    }

    /// Drop every open descriptor.
    pub(crate) fn close_all_files(&self) {
        let mut files = self.files.lock();
        for slot in files.iter_mut() {
            *slot = None;
        }
    }

    /// Record the exit status and wake the joiner.
    pub(crate) fn finish(&self, status: i32) {
        *self.exit_status.lock() = Some(status);
        self.join_sem.v();
    }

    /// Block until the process finishes, then return its status. The
    /// status stays readable through [`exit_status`] until the process
    /// table entry is retired.
    ///
    /// [`exit_status`]: Self::exit_status
    pub fn join(&self) -> i32 {
        self.join_sem.p();
        self.exit_status
            .lock()
            .expect("joined process has no exit status")
    }

    /// The exit status, if the process has finished.
    pub fn exit_status(&self) -> Option<i32> {
        *self.exit_status.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadBuilder;

    #[test]
    fn descriptors_start_at_two() {
        let fs = crate::fs::FileSystem::new(Arc::new(crate::fs::SynchDisk::new()), true);
        fs.create("f", 0).unwrap();
        let process = Process::new(1, "p", 0);
        let fid = process.add_file(Arc::new(fs.open("f").unwrap())).unwrap();
        assert_eq!(fid, 2);
        assert!(process.get_file(fid).is_some());
        assert!(process.get_file(0).is_none());
        assert!(process.remove_file(fid).is_some());
        assert!(process.get_file(fid).is_none());
    }

    #[test]
    fn table_overflow_is_reported() {
        let fs = crate::fs::FileSystem::new(Arc::new(crate::fs::SynchDisk::new()), true);
        fs.create("f", 0).unwrap();
        let file = Arc::new(fs.open("f").unwrap());
        let process = Process::new(1, "p", 0);
        for _ in 2..NUM_FILE_DESCRIPTORS {
            process.add_file(Arc::clone(&file)).unwrap();
        }
        assert_eq!(
            process.add_file(file),
            Err(KernelError::TooManyOpenFiles)
        );
    }

    #[test]
    fn join_returns_the_exit_status() {
        let process = Process::new(3, "child", 0);
        let finisher = Arc::clone(&process);
        ThreadBuilder::new("finisher").spawn(move || finisher.finish(42));
        assert_eq!(process.join(), 42);
        assert_eq!(process.exit_status(), Some(42));
    }
}
