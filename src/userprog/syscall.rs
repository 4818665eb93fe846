//! The system-call dispatcher.
//!
//! Calling convention: the system-call number arrives in R2, the
//! arguments in R4 through R7, and whatever result the call produces
//! goes back in R2. After servicing, the program counters advance past
//! the trap instruction.
//!
//! Failures of value-returning calls (`Open`, `Read`, `Exec`, `Join`)
//! surface to the program as −1; the other calls report nothing and
//! their failures are only logged.

use crate::KernelError;
use crate::constants::{
    CONSOLE_INPUT, CONSOLE_OUTPUT, FILE_NAME_MAX_LEN, MAX_READ_SIZE, MAX_WRITE_SIZE,
};
use crate::kernel::Kernel;
use crate::machine::{ARG_REGS, RESULT_REG};
use crate::userprog::{Process, transfer};
use crate::vm::SpaceId;
use std::sync::Arc;
use tracing::debug;

/// The system-call numbers user programs place in R2.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Syscall {
    /// Shut the simulated machine down.
    Halt = 1,
    /// Terminate the calling process with a status.
    Exit = 2,
    /// Spawn a child process from an executable.
    Exec = 3,
    /// Wait for a child to terminate.
    Join = 4,
    /// Create an empty file.
    Create = 5,
    /// Remove a file (possibly deferred).
    Remove = 6,
    /// Open a file, yielding a descriptor.
    Open = 7,
    /// Release a descriptor.
    Close = 8,
    /// Read from a descriptor (0 is the console).
    Read = 9,
    /// Write to a descriptor (1 is the console).
    Write = 10,
    /// List the directory.
    Ls = 11,
    /// Change the working directory.
    Cd = 12,
}

impl TryFrom<i32> for Syscall {
    type Error = KernelError;

    fn try_from(number: i32) -> Result<Self, KernelError> {
        match number {
            1 => Ok(Syscall::Halt),
            2 => Ok(Syscall::Exit),
            3 => Ok(Syscall::Exec),
            4 => Ok(Syscall::Join),
            5 => Ok(Syscall::Create),
            6 => Ok(Syscall::Remove),
            7 => Ok(Syscall::Open),
            8 => Ok(Syscall::Close),
            9 => Ok(Syscall::Read),
            10 => Ok(Syscall::Write),
            11 => Ok(Syscall::Ls),
            12 => Ok(Syscall::Cd),
            _ => Err(KernelError::NoSuchSyscall),
        }
    }
}

struct SyscallFrame {
    number: i32,
    args: [i32; 4],
}

fn fetch_frame(kernel: &Kernel) -> SyscallFrame {
    let machine = kernel.machine.lock();
    SyscallFrame {
        number: machine.read_register(RESULT_REG),
        args: ARG_REGS.map(|reg| machine.read_register(reg)),
    }
}

fn set_result(kernel: &Kernel, value: i32) {
    kernel.machine.lock().write_register(RESULT_REG, value);
}

/// Read a file name argument: a non-null user pointer to a
/// NUL-terminated string of at most [`FILE_NAME_MAX_LEN`] bytes.
fn read_filename(kernel: &Kernel, addr: i32) -> Result<String, KernelError> {
    if addr == 0 {
        return Err(KernelError::BadAddress);
    }
    transfer::read_string_from_user(kernel, addr as usize, FILE_NAME_MAX_LEN)
}

/// Decode and execute the system call pending in the machine
/// registers, then advance the program counters.
pub fn handle_syscall(kernel: &Arc<Kernel>) {
    let frame = fetch_frame(kernel);
    match Syscall::try_from(frame.number) {
        Ok(call) => dispatch(kernel, call, frame.args),
        Err(_) => {
            debug!(number = frame.number, "unknown system call");
            set_result(kernel, KernelError::NoSuchSyscall.into_isize() as i32);
        }
    }
    kernel.machine.lock().advance_pc();
}

fn dispatch(kernel: &Arc<Kernel>, call: Syscall, args: [i32; 4]) {
    match call {
        Syscall::Halt => kernel.halt(),
        Syscall::Exit => {
            if let Some(process) = kernel.current_process() {
                kernel.finish_process(&process, args[0]);
            }
        }
        Syscall::Exec => {
            let result = sys_exec(kernel, args[0], args[1]);
            set_result(kernel, result.map_or(-1, |pid| pid as i32));
        }
        Syscall::Join => {
            let result = sys_join(kernel, args[0]);
            set_result(kernel, result.unwrap_or(-1));
        }
        Syscall::Create => {
            if let Err(e) = read_filename(kernel, args[0])
                .and_then(|name| kernel.file_system.create(&name, 0))
            {
                debug!(error = %e, "Create failed");
            }
        }
        Syscall::Remove => {
            if let Err(e) =
                read_filename(kernel, args[0]).and_then(|name| kernel.file_system.remove(&name))
            {
                debug!(error = %e, "Remove failed");
            }
        }
        Syscall::Open => {
            let result = sys_open(kernel, args[0]);
            set_result(kernel, result.unwrap_or(-1));
        }
        Syscall::Close => {
            if let Err(e) = sys_close(kernel, args[0]) {
                debug!(error = %e, "Close failed");
            }
        }
        Syscall::Read => {
            let result = sys_read(kernel, args[0], args[1], args[2]);
            set_result(kernel, result.unwrap_or(0));
        }
        Syscall::Write => {
            if let Err(e) = sys_write(kernel, args[0], args[1], args[2]) {
                debug!(error = %e, "Write failed");
            }
        }
        Syscall::Ls => {
            for name in kernel.file_system.list() {
                kernel.console.put_bytes(name.as_bytes());
                kernel.console.put_char(b'\n');
            }
        }
        Syscall::Cd => {
            let result = (|| {
                if args[0] == 0 {
                    return Err(KernelError::BadAddress);
                }
                let path = transfer::read_string_from_user(kernel, args[0] as usize, 128)?;
                kernel.file_system.change_dir(&path)
            })();
            if let Err(e) = result {
                debug!(error = %e, "Cd failed");
            }
        }
    }
}

fn current(kernel: &Kernel) -> Result<Arc<Process>, KernelError> {
    kernel.current_process().ok_or(KernelError::NoSuchEntry)
}

fn sys_exec(kernel: &Arc<Kernel>, name_addr: i32, _argv_addr: i32) -> Result<SpaceId, KernelError> {
    let name = read_filename(kernel, name_addr)?;
    let priority = kernel
        .current_process()
        .map_or(0, |process| process.priority());
    kernel.exec(&name, priority)
}

fn sys_join(kernel: &Kernel, pid: i32) -> Result<i32, KernelError> {
    let pid = SpaceId::try_from(pid).map_err(|_| KernelError::NoSuchEntry)?;
    kernel.join(pid)
}

fn sys_open(kernel: &Kernel, name_addr: i32) -> Result<i32, KernelError> {
    let name = read_filename(kernel, name_addr)?;
    let file = kernel.file_system.open(&name)?;
    current(kernel)?.add_file(Arc::new(file))
}

fn sys_close(kernel: &Kernel, fid: i32) -> Result<(), KernelError> {
    current(kernel)?
        .remove_file(fid)
        .map(drop)
        .ok_or(KernelError::BadFileDescriptor)
}

fn sys_read(kernel: &Kernel, addr: i32, size: i32, fid: i32) -> Result<i32, KernelError> {
    if addr == 0 {
        return Err(KernelError::BadAddress);
    }
    let size = usize::try_from(size).map_err(|_| KernelError::InvalidArgument)?;
    if size > MAX_READ_SIZE {
        return Err(KernelError::InvalidArgument);
    }

    if fid == CONSOLE_INPUT {
        let bytes: Vec<u8> = (0..size).map(|_| kernel.console.get_char()).collect();
        transfer::write_buffer_to_user(kernel, &bytes, addr as usize)?;
        return Ok(bytes.len() as i32);
    }
    if fid == CONSOLE_OUTPUT {
        return Err(KernelError::BadFileDescriptor);
    }

    let file = current(kernel)?
        .get_file(fid)
        .ok_or(KernelError::BadFileDescriptor)?;
    let mut buffer = vec![0u8; size];
    let count = file.read(&mut buffer);
    if count > 0 {
        transfer::write_buffer_to_user(kernel, &buffer[..count], addr as usize)?;
    }
    Ok(count as i32)
}

fn sys_write(kernel: &Kernel, addr: i32, size: i32, fid: i32) -> Result<(), KernelError> {
    if addr == 0 {
        return Err(KernelError::BadAddress);
    }
    let size = usize::try_from(size).map_err(|_| KernelError::InvalidArgument)?;
    if size > MAX_WRITE_SIZE {
        return Err(KernelError::InvalidArgument);
    }
    let bytes = transfer::read_buffer_from_user(kernel, addr as usize, size)?;

    if fid == CONSOLE_OUTPUT {
        kernel.console.put_bytes(&bytes);
        return Ok(());
    }
    if fid == CONSOLE_INPUT {
        return Err(KernelError::BadFileDescriptor);
    }

    let file = current(kernel)?
        .get_file(fid)
        .ok_or(KernelError::BadFileDescriptor)?;
    file.write(&bytes);
    Ok(())
}
