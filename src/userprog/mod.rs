//! The bridge between user programs and kernel services.
//!
//! A trap from user code lands in [`exception::handle_exception`],
//! which routes system calls to the [`syscall`] dispatcher and page
//! faults into the VM subsystem. The dispatcher consults the calling
//! process's descriptor table or the process table, moves data across
//! the translation boundary through [`transfer`], and talks to the
//! file system or the [`SynchConsole`].

pub mod exception;
pub mod process;
pub mod syscall;
pub mod synch_console;
pub mod transfer;

pub use exception::ExceptionType;
pub use process::Process;
pub use synch_console::SynchConsole;
pub use syscall::Syscall;
