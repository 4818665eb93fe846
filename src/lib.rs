//! # pampero
//!
//! An educational operating-system kernel for a simulated MIPS machine.
//!
//! The kernel runs user programs compiled to the NOFF format on a
//! single-CPU machine with a small software-managed TLB, a sector disk,
//! and a byte console. The interesting engineering lives in three
//! tightly coupled subsystems:
//!
//! 1. **Synchronization** ([`sync`]) — semaphores over FIFO wait queues,
//!    locks with priority donation, condition variables with Hoare-style
//!    signaling, readers/writer mutexes, and synchronous message ports.
//! 2. **The file system** ([`fs`]) — single-indirection file headers, a
//!    free-sector bitmap and a flat directory kept in two well-known
//!    sectors, and open-file handles coordinated by a per-file
//!    readers/writer policy with deferred deletion.
//! 3. **Virtual memory** ([`vm`]) — per-process page tables kept
//!    coherent with the TLB, a frame table with an improved
//!    second-chance replacement policy, demand loading from the
//!    executable, and per-process swap files.
//!
//! The [`userprog`] layer bridges user programs and these services: it
//! decodes system calls from the trap registers, copies buffers and
//! strings across the translation boundary, and routes page faults into
//! the VM subsystem. [`kernel::Kernel`] bundles the machine and the
//! services into one context that all handlers receive.
//!
//! The MIPS interpreter, the raw device timing models, and the user-land
//! toolchain are external collaborators; the crate sees them only as the
//! interfaces in [`machine`].

#![warn(missing_docs)]

pub mod constants;
pub mod fs;
pub mod kernel;
pub mod machine;
pub mod sync;
pub mod thread;
pub mod userprog;
pub mod util;
pub mod vm;

use thiserror::Error;

/// Errors a kernel operation can report to its caller.
///
/// These are the *recoverable* failures — the ones a system call turns
/// into an error return value. Broken kernel invariants and violated
/// calling contracts are not represented here; those abort via
/// `panic!`/`assert!`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No such file or directory. (ENOENT)
    #[error("no such file or directory")]
    NoSuchEntry,
    /// Disk or device I/O failed. (EIO)
    #[error("i/o error")]
    IoError,
    /// Not a valid executable image. (ENOEXEC)
    #[error("exec format error")]
    NoExec,
    /// Descriptor is not open or out of range. (EBADF)
    #[error("bad file descriptor")]
    BadFileDescriptor,
    /// A user pointer did not survive translation. (EFAULT)
    #[error("bad address")]
    BadAddress,
    /// The file already exists. (EEXIST)
    #[error("file exists")]
    FileExists,
    /// A size or argument is out of range. (EINVAL)
    #[error("invalid argument")]
    InvalidArgument,
    /// The file-descriptor table is full. (EMFILE)
    #[error("too many open files")]
    TooManyOpenFiles,
    /// Out of disk sectors, directory slots, or frames. (ENOSPC)
    #[error("no space left on device")]
    NoSpace,
    /// The file name exceeds `FILE_NAME_MAX_LEN`. (ENAMETOOLONG)
    #[error("file name too long")]
    NameTooLong,
    /// Unknown system-call number. (ENOSYS)
    #[error("invalid system call number")]
    NoSuchSyscall,
}

impl KernelError {
    /// The errno-flavored code for this error, as a negative value.
    pub fn into_isize(self) -> isize {
        match self {
            KernelError::NoSuchEntry => -2,
            KernelError::IoError => -5,
            KernelError::NoExec => -8,
            KernelError::BadFileDescriptor => -9,
            KernelError::BadAddress => -14,
            KernelError::FileExists => -17,
            KernelError::InvalidArgument => -22,
            KernelError::TooManyOpenFiles => -24,
            KernelError::NoSpace => -28,
            KernelError::NameTooLong => -36,
            KernelError::NoSuchSyscall => -38,
        }
    }
}
