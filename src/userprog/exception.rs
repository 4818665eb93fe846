//! Exception routing.
//!
//! Control re-enters the kernel from user code for two reasons: the
//! program asked for a service (a system call) or did something the
//! CPU cannot complete (a page fault, a bad address, an arithmetic
//! error). System calls go to the dispatcher, page faults to the VM
//! subsystem; everything else is fatal for the offending process,
//! which is terminated as if it had called `Exit(-1)`.

use crate::KernelError;
use crate::constants::PAGE_SIZE;
use crate::kernel::Kernel;
use crate::machine::BAD_VADDR_REG;
use crate::userprog::syscall;
use std::sync::Arc;
use tracing::error;

/// The exception classes the machine reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionType {
    /// No exception pending.
    NoException,
    /// A system-call trap.
    Syscall,
    /// No valid translation for the access.
    PageFault,
    /// Write to a read-only page.
    ReadOnly,
    /// Invalid physical reference.
    BusError,
    /// Unaligned or out-of-range address.
    AddressError,
    /// Integer overflow.
    Overflow,
    /// Undecodable instruction.
    IllegalInstruction,
}

/// Route an exception raised while the current process was running.
pub fn handle_exception(kernel: &Arc<Kernel>, exception: ExceptionType) {
    match exception {
        ExceptionType::Syscall => syscall::handle_syscall(kernel),
        ExceptionType::PageFault => {
            let vaddr = kernel.machine.lock().read_register(BAD_VADDR_REG) as usize;
            if handle_page_fault(kernel, vaddr).is_err() {
                fatal(kernel, exception, vaddr);
            }
        }
        ExceptionType::NoException => {}
        _ => {
            let vaddr = kernel.machine.lock().read_register(BAD_VADDR_REG) as usize;
            fatal(kernel, exception, vaddr);
        }
    }
}

/// A fault the kernel cannot service: report it and terminate the
/// process as `Exit(-1)`.
fn fatal(kernel: &Arc<Kernel>, exception: ExceptionType, vaddr: usize) {
    error!(?exception, vaddr, "unexpected user-mode exception");
    if let Some(process) = kernel.current_process() {
        kernel.finish_process(&process, -1);
    }
}

/// Resolve a page fault at `vaddr` for the current process.
///
/// A page never loaded is demand-loaded from the executable; a page
/// sitting in swap is brought back from the process's swap file. Either
/// way the fresh translation is installed in the TLB at a rotating
/// slot, and the displaced entry's `use`/`dirty` bits are folded back
/// into the page table. An address outside the space, or a swap store
/// the disk can no longer grow, surfaces as an error — the router
/// above turns that into a fatal fault for the faulting process only.
pub fn handle_page_fault(kernel: &Kernel, vaddr: usize) -> Result<(), KernelError> {
    let vpn = vaddr / PAGE_SIZE;
    let process = kernel.current_process().ok_or(KernelError::BadAddress)?;
    let mut slot = process.space.lock();
    let space = slot.as_mut().ok_or(KernelError::BadAddress)?;
    if vpn >= space.num_pages() {
        return Err(KernelError::BadAddress);
    }

    let entry = space.entry(vpn);
    if !entry.valid {
        space.load_page(kernel, vpn)?;
    } else if !entry.in_memory {
        space.load_page_from_swap(kernel, vpn)?;
    }

    let entry = space.entry(vpn);
    let mut machine = kernel.machine.lock();
    let slot_index = kernel.next_tlb_slot(machine.mmu.tlb_len());
    let displaced = machine.mmu.set_tlb_entry(slot_index, entry);
    drop(machine);
    if displaced.valid && displaced.virtual_page != vpn {
        space.sync_tlb_bits(displaced);
    }
    Ok(())
}
