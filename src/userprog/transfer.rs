//! Safe data transfer between user and kernel space.
//!
//! User addresses are only meaningful through the current process's
//! translations, and any byte may fault on the way — the page might
//! never have been loaded, or might be sitting in the swap file. These
//! routines therefore move one byte at a time through the MMU and, on a
//! translation miss, invoke the page-fault handler and retry the same
//! address; they return only when the byte has actually moved or the
//! address is genuinely bad. Every successful access is recorded in the
//! core map so the replacement policy sees it.

use crate::KernelError;
use crate::kernel::Kernel;
use crate::machine::TranslationError;
use crate::userprog::exception;

/// Read one byte from user address `addr`, resolving faults.
pub fn read_byte_from_user(kernel: &Kernel, addr: usize) -> Result<u8, KernelError> {
    loop {
        let outcome = kernel.machine.lock().mmu.read_byte(addr);
        match outcome {
            Ok((byte, frame)) => {
                kernel.core_map.lock().mark_accessed(frame);
                return Ok(byte);
            }
            Err(TranslationError::PageFault { vaddr }) => {
                exception::handle_page_fault(kernel, vaddr)?;
            }
            Err(_) => return Err(KernelError::BadAddress),
        }
    }
}

/// Write one byte to user address `addr`, resolving faults.
pub fn write_byte_to_user(kernel: &Kernel, addr: usize, byte: u8) -> Result<(), KernelError> {
    loop {
        let outcome = kernel.machine.lock().mmu.write_byte(addr, byte);
        match outcome {
            Ok(frame) => {
                kernel.core_map.lock().mark_modified(frame);
                return Ok(());
            }
            Err(TranslationError::PageFault { vaddr }) => {
                exception::handle_page_fault(kernel, vaddr)?;
            }
            Err(_) => return Err(KernelError::BadAddress),
        }
    }
}

/// Copy `count` bytes out of user memory starting at `addr`.
pub fn read_buffer_from_user(
    kernel: &Kernel,
    addr: usize,
    count: usize,
) -> Result<Vec<u8>, KernelError> {
    let mut buffer = Vec::with_capacity(count);
    for offset in 0..count {
        buffer.push(read_byte_from_user(kernel, addr + offset)?);
    }
    Ok(buffer)
}

/// Copy `bytes` into user memory starting at `addr`.
pub fn write_buffer_to_user(kernel: &Kernel, bytes: &[u8], addr: usize) -> Result<(), KernelError> {
    for (offset, &byte) in bytes.iter().enumerate() {
        write_byte_to_user(kernel, addr + offset, byte)?;
    }
    Ok(())
}

/// Read a NUL-terminated string of at most `max_len` bytes from user
/// memory. A missing terminator within the bound reports
/// [`KernelError::NameTooLong`].
pub fn read_string_from_user(
    kernel: &Kernel,
    addr: usize,
    max_len: usize,
) -> Result<String, KernelError> {
    let mut bytes = Vec::new();
    for offset in 0..=max_len {
        let byte = read_byte_from_user(kernel, addr + offset)?;
        if byte == 0 {
            return String::from_utf8(bytes).map_err(|_| KernelError::InvalidArgument);
        }
        bytes.push(byte);
    }
    Err(KernelError::NameTooLong)
}

/// Write `string` plus its NUL terminator into user memory.
pub fn write_string_to_user(kernel: &Kernel, string: &str, addr: usize) -> Result<(), KernelError> {
    write_buffer_to_user(kernel, string.as_bytes(), addr)?;
    write_byte_to_user(kernel, addr + string.len(), 0)
}
