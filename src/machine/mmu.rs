//! Software-managed address translation.
//!
//! The MMU owns the machine's physical memory and a small TLB. Every
//! user-mode access is translated through the TLB alone — there is no
//! hardware page-table walk. A miss surfaces as
//! [`TranslationError::PageFault`], and it is kernel software (the
//! page-fault handler) that loads the missing translation into a TLB
//! slot. The MMU sets the `use` and `dirty` bits of the entry it hits;
//! the kernel copies those bits back into the owning page table whenever
//! it displaces or invalidates an entry.

use crate::constants::PAGE_SIZE;
use thiserror::Error;

/// One virtual-to-physical translation.
///
/// The same record is used for page-table entries and TLB entries. For a
/// page-table entry, `valid == false` means the page was never loaded,
/// while `valid && !in_memory` means the page currently lives in the
/// process's swap file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TranslationEntry {
    /// Virtual page number.
    pub virtual_page: usize,
    /// Physical frame number; meaningful only while `in_memory`.
    pub physical_page: usize,
    /// Whether the translation may be used at all.
    pub valid: bool,
    /// Whether writes through this translation are forbidden.
    pub read_only: bool,
    /// Set by the MMU on any access; cleared by replacement policies.
    pub use_bit: bool,
    /// Set by the MMU on writes; cleared when the page matches its
    /// backing store.
    pub dirty: bool,
    /// Whether the page currently occupies a physical frame.
    pub in_memory: bool,
}

/// A failed address translation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslationError {
    /// No valid TLB entry covers the address. Resolvable by the
    /// page-fault handler.
    #[error("page fault at virtual address {vaddr:#x}")]
    PageFault {
        /// The faulting virtual address.
        vaddr: usize,
    },
    /// A write hit a read-only translation.
    #[error("write to read-only virtual address {vaddr:#x}")]
    ReadOnly {
        /// The faulting virtual address.
        vaddr: usize,
    },
    /// The address lies outside the address space entirely.
    #[error("address error at virtual address {vaddr:#x}")]
    AddressError {
        /// The faulting virtual address.
        vaddr: usize,
    },
}

/// Memory-management unit: physical memory plus the TLB.
pub struct Mmu {
    memory: Vec<u8>,
    tlb: Vec<TranslationEntry>,
    num_frames: usize,
}

impl Mmu {
    /// Creates an MMU with `num_frames` zeroed physical frames and
    /// `tlb_size` invalid TLB entries.
    pub fn new(num_frames: usize, tlb_size: usize) -> Self {
        Self {
            memory: vec![0; num_frames * PAGE_SIZE],
            tlb: vec![TranslationEntry::default(); tlb_size],
            num_frames,
        }
    }

    /// Number of physical frames.
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    fn translate(&mut self, vaddr: usize, writing: bool) -> Result<usize, TranslationError> {
        let vpn = vaddr / PAGE_SIZE;
        let offset = vaddr % PAGE_SIZE;
        for entry in &mut self.tlb {
            if entry.valid && entry.virtual_page == vpn {
                if writing && entry.read_only {
                    return Err(TranslationError::ReadOnly { vaddr });
                }
                if entry.physical_page >= self.num_frames {
                    return Err(TranslationError::AddressError { vaddr });
                }
                entry.use_bit = true;
                if writing {
                    entry.dirty = true;
                }
                return Ok(entry.physical_page * PAGE_SIZE + offset);
            }
        }
        Err(TranslationError::PageFault { vaddr })
    }

    /// Read one byte at virtual address `vaddr`, returning the byte and
    /// the frame it was read from.
    pub fn read_byte(&mut self, vaddr: usize) -> Result<(u8, usize), TranslationError> {
        let paddr = self.translate(vaddr, false)?;
        Ok((self.memory[paddr], paddr / PAGE_SIZE))
    }

    /// Write one byte at virtual address `vaddr`, returning the frame it
    /// was written to.
    pub fn write_byte(&mut self, vaddr: usize, byte: u8) -> Result<usize, TranslationError> {
        let paddr = self.translate(vaddr, true)?;
        self.memory[paddr] = byte;
        Ok(paddr / PAGE_SIZE)
    }

    /// The contents of physical frame `frame`.
    pub fn frame(&self, frame: usize) -> &[u8] {
        &self.memory[frame * PAGE_SIZE..(frame + 1) * PAGE_SIZE]
    }

    /// Mutable contents of physical frame `frame`.
    pub fn frame_mut(&mut self, frame: usize) -> &mut [u8] {
        &mut self.memory[frame * PAGE_SIZE..(frame + 1) * PAGE_SIZE]
    }

    /// The TLB entry in slot `index`.
    pub fn tlb_entry(&self, index: usize) -> TranslationEntry {
        self.tlb[index]
    }

    /// Overwrite TLB slot `index`, returning the displaced entry so the
    /// caller can write its `use`/`dirty` bits back to the page table.
    pub fn set_tlb_entry(&mut self, index: usize, entry: TranslationEntry) -> TranslationEntry {
        std::mem::replace(&mut self.tlb[index], entry)
    }

    /// Number of TLB slots.
    pub fn tlb_len(&self) -> usize {
        self.tlb.len()
    }

    /// Invalidate every TLB entry, returning the displaced valid entries.
    /// Called on context switch into a different address space.
    pub fn invalidate_tlb(&mut self) -> Vec<TranslationEntry> {
        let mut displaced = Vec::new();
        for entry in &mut self.tlb {
            if entry.valid {
                displaced.push(std::mem::take(entry));
            }
        }
        displaced
    }

    /// Invalidate any TLB entry mapping virtual page `vpn`, returning the
    /// displaced entry if there was one.
    pub fn invalidate_vpn(&mut self, vpn: usize) -> Option<TranslationEntry> {
        for entry in &mut self.tlb {
            if entry.valid && entry.virtual_page == vpn {
                return Some(std::mem::take(entry));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapped(vpn: usize, frame: usize) -> TranslationEntry {
        TranslationEntry {
            virtual_page: vpn,
            physical_page: frame,
            valid: true,
            in_memory: true,
            ..Default::default()
        }
    }

    #[test]
    fn miss_reports_page_fault() {
        let mut mmu = Mmu::new(4, 2);
        assert_eq!(
            mmu.read_byte(0x10),
            Err(TranslationError::PageFault { vaddr: 0x10 })
        );
    }

    #[test]
    fn hit_sets_use_and_dirty_bits() {
        let mut mmu = Mmu::new(4, 2);
        mmu.set_tlb_entry(0, mapped(1, 2));
        mmu.write_byte(PAGE_SIZE + 5, 0xab).unwrap();
        assert_eq!(mmu.read_byte(PAGE_SIZE + 5).unwrap().0, 0xab);
        let entry = mmu.tlb_entry(0);
        assert!(entry.use_bit && entry.dirty);
        assert_eq!(mmu.frame(2)[5], 0xab);
    }

    #[test]
    fn read_only_pages_reject_writes() {
        let mut mmu = Mmu::new(4, 2);
        let mut entry = mapped(0, 0);
        entry.read_only = true;
        mmu.set_tlb_entry(0, entry);
        assert_eq!(
            mmu.write_byte(3, 1),
            Err(TranslationError::ReadOnly { vaddr: 3 })
        );
    }
}
