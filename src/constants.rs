//! Geometry and limits of the simulated machine.
//!
//! The sector size, page size and register-file layout follow the simulated
//! MIPS machine this kernel targets. The file-header constants are tied
//! together: one [`RawFileHeader`] must serialize into exactly one sector,
//! which fixes `NUM_DIRECT` at `(SECTOR_SIZE - 2 * 4) / 4`.
//!
//! [`RawFileHeader`]: crate::fs::RawFileHeader

/// Bytes per disk sector, the granularity of all disk I/O.
pub const SECTOR_SIZE: usize = 128;

/// Bytes per virtual-memory page. Equal to the sector size so that one
/// page maps onto exactly one swap-file sector.
pub const PAGE_SIZE: usize = SECTOR_SIZE;

/// Total number of sectors on the simulated disk.
pub const NUM_SECTORS: usize = 1024;

/// Number of sector slots in a file header, including the tail link.
pub const NUM_DIRECT: usize = (SECTOR_SIZE - 2 * 4) / 4;

/// Bytes a single file header covers through its direct slots.
pub const MAX_DIRECT_SPAN: usize = (NUM_DIRECT - 1) * SECTOR_SIZE;

/// Sector holding the free-sector bitmap's file header.
pub const FREE_MAP_SECTOR: usize = 0;

/// Sector holding the directory's file header.
pub const DIRECTORY_SECTOR: usize = 1;

/// Capacity of the flat directory.
pub const NUM_DIR_ENTRIES: usize = 32;

/// Longest permitted file name, excluding the terminating NUL.
pub const FILE_NAME_MAX_LEN: usize = 9;

/// Size of a process's file-descriptor table. Descriptors 0 and 1 are
/// reserved for console input and output.
pub const NUM_FILE_DESCRIPTORS: usize = 16;

/// File descriptor naming the console input stream.
pub const CONSOLE_INPUT: i32 = 0;

/// File descriptor naming the console output stream.
pub const CONSOLE_OUTPUT: i32 = 1;

/// Upper bound on a single `Read` system call.
pub const MAX_READ_SIZE: usize = 1024 * 1024;

/// Upper bound on a single `Write` system call.
pub const MAX_WRITE_SIZE: usize = 1024 * 1024;

/// Default number of physical page frames. Tests shrink this to force
/// eviction; see [`MachineConfig`].
///
/// [`MachineConfig`]: crate::machine::MachineConfig
pub const NUM_PHYS_PAGES: usize = 32;

/// Number of software-managed TLB entries.
pub const TLB_SIZE: usize = 4;

/// Bytes of user stack appended past the loaded segments.
pub const USER_STACK_SIZE: usize = 1024;

/// Number of priority levels; valid priorities are `0..NUM_QUEUES`.
pub const NUM_QUEUES: u32 = 64;

/// A pending writer subtracts this from the reader count, driving it
/// negative so arriving readers know to block.
pub const MAX_READERS: i32 = 1 << 30;
