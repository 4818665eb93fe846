//! Address spaces: per-process page tables, demand loading, swapping.
//!
//! An address space is sized from its NOFF executable (code +
//! initialized data + uninitialized data + user stack) at construction,
//! but no page is brought into memory until it faults. A first-touch
//! fault loads the page from the executable image (zero-filling
//! whatever no segment covers); once a page has been evicted, later
//! faults bring it back from the process's swap file, `swap.<pid>`,
//! which is created empty alongside the space and read and written at
//! `vpn * PAGE_SIZE`.
//!
//! Locking order on the fault path: the faulting process's address
//! space, then the core map, then (for a cross-process eviction) the
//! victim's address space, then machine memory and the file system.
//! Page faults are serialized by the single-CPU execution model, so two
//! evictions never chase each other's locks.
//!
//! A full disk is survivable: when a dirty victim cannot be written to
//! its swap file, the load reports [`KernelError::NoSpace`] up the
//! fault path and only the faulting process pays for it.

use crate::constants::{PAGE_SIZE, USER_STACK_SIZE};
use crate::fs::{FileSystem, OpenFile};
use crate::kernel::Kernel;
use crate::machine::TranslationEntry;
use crate::machine::noff::{NOFF_HEADER_SIZE, NoffHeader, Segment};
use crate::vm::SpaceId;
use crate::KernelError;
use std::sync::Arc;
use tracing::{debug, trace};

/// A user program's memory: page table, executable and swap file.
pub struct AddressSpace {
    pid: SpaceId,
    num_pages: usize,
    page_table: Vec<TranslationEntry>,
    noff: NoffHeader,
    executable: OpenFile,
    swap_file: OpenFile,
    swap_name: String,
}

impl AddressSpace {
    /// Build the address space for `executable`, owned by process
    /// `pid`. Parses the NOFF header, sizes the page table, and creates
    /// the (initially empty) swap file.
    pub fn new(
        fs: &Arc<FileSystem>,
        executable: OpenFile,
        pid: SpaceId,
    ) -> Result<Self, KernelError> {
        let mut header_bytes = [0u8; NOFF_HEADER_SIZE];
        if executable.read_at(&mut header_bytes, 0) != NOFF_HEADER_SIZE {
            return Err(KernelError::NoExec);
        }
        let noff = NoffHeader::parse(&header_bytes)?;

        let size = noff.memory_span() + USER_STACK_SIZE;
        let num_pages = size.div_ceil(PAGE_SIZE);
        let page_table = (0..num_pages)
            .map(|vpn| TranslationEntry {
                virtual_page: vpn,
                ..Default::default()
            })
            .collect();

        let swap_name = format!("swap.{pid}");
        fs.create(&swap_name, 0)?;
        let swap_file = fs.open(&swap_name)?;
        debug!(pid, num_pages, "created address space");

        Ok(Self {
            pid,
            num_pages,
            page_table,
            noff,
            executable,
            swap_file,
            swap_name,
        })
    }

    /// Owning process id.
    pub fn pid(&self) -> SpaceId {
        self.pid
    }

    /// Pages in the space, stack included.
    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    /// Name of the swap file, for teardown.
    pub fn swap_name(&self) -> &str {
        &self.swap_name
    }

    /// The page-table entry for `vpn`.
    pub fn entry(&self, vpn: usize) -> TranslationEntry {
        self.page_table[vpn]
    }

    /// Fold the `use`/`dirty` bits of a displaced TLB entry back into
    /// the page table, so replacement decisions see them.
    pub fn sync_tlb_bits(&mut self, displaced: TranslationEntry) {
        let entry = &mut self.page_table[displaced.virtual_page];
        entry.use_bit |= displaced.use_bit;
        entry.dirty |= displaced.dirty;
    }

    /// Get a frame for `vpn`, evicting a victim when none is free.
    ///
    /// Reports [`KernelError::NoSpace`] when the victim is dirty and the
    /// disk cannot hold its swap image; the victim page stays resident
    /// and the core map unchanged in that case.
    fn acquire_frame(&mut self, kernel: &Kernel, vpn: usize) -> Result<usize, KernelError> {
        let mut core_map = kernel.core_map.lock();
        if let Some(frame) = core_map.reserve_next_available(vpn, self.pid) {
            return Ok(frame);
        }
        let frame = core_map.frame_to_swap();
        let (victim_pid, victim_vpn) = core_map
            .entry(frame)
            .owner
            .expect("occupied frame with no owner");
        drop(core_map);

        trace!(frame, victim_pid, victim_vpn, "evicting frame");
        if victim_pid == self.pid {
            self.evict(kernel, victim_vpn, frame)?;
        } else {
            kernel
                .with_address_space(victim_pid, |space| space.evict(kernel, victim_vpn, frame))
                .expect("victim frame owned by a dead process")?;
        }
        // The frame changes hands only once its old contents are safe.
        kernel.core_map.lock().stamp(frame, vpn, self.pid);
        Ok(frame)
    }

    /// Push the page at `vpn` (held in `frame`) out of memory, writing
    /// it to this space's swap file if it is dirty. A swap write the
    /// disk cannot fully grant is resource exhaustion, reported as
    /// [`KernelError::NoSpace`] with the page left resident.
    fn evict(&mut self, kernel: &Kernel, vpn: usize, frame: usize) -> Result<(), KernelError> {
        // If the page is in the current TLB its freshest bits live
        // there; pull them back before looking at `dirty`.
        if kernel.is_current_pid(self.pid) {
            if let Some(displaced) = kernel.machine.lock().mmu.invalidate_vpn(vpn) {
                self.sync_tlb_bits(displaced);
            }
        }

        let entry = self.page_table[vpn];
        assert!(
            entry.valid && entry.in_memory && entry.physical_page == frame,
            "core map and page table disagree about frame {frame}"
        );
        if entry.dirty {
            let bytes = kernel.machine.lock().mmu.frame(frame).to_vec();
            let written = self.swap_file.write_at(&bytes, (vpn * PAGE_SIZE) as u64);
            if written != PAGE_SIZE {
                return Err(KernelError::NoSpace);
            }
        }
        self.page_table[vpn].in_memory = false;
        Ok(())
    }

    fn segment_overlap(&self, kernel: &Kernel, segment: Segment, vpn: usize, frame: usize) {
        if segment.size == 0 {
            return;
        }
        let page_start = vpn * PAGE_SIZE;
        let page_end = page_start + PAGE_SIZE;
        let seg_start = segment.virtual_addr as usize;
        let seg_end = segment.virtual_end() as usize;
        if page_start >= seg_end || page_end <= seg_start {
            return;
        }
        let from = page_start.max(seg_start);
        let until = page_end.min(seg_end);
        let file_position = from - seg_start + segment.in_file_addr as usize;

        let mut bytes = vec![0u8; until - from];
        let read = self.executable.read_at(&mut bytes, file_position as u64);
        assert_eq!(read, bytes.len(), "executable image truncated");
        kernel.machine.lock().mmu.frame_mut(frame)[from - page_start..until - page_start]
            .copy_from_slice(&bytes);
    }

    /// First-touch fault: claim a frame, zero it, and copy in the
    /// pieces of the code and initialized-data segments that overlap
    /// this page. The entry comes up dirty — from here on the swap
    /// file, not the executable, is this page's backing store.
    pub fn load_page(&mut self, kernel: &Kernel, vpn: usize) -> Result<usize, KernelError> {
        let frame = self.acquire_frame(kernel, vpn)?;
        debug!(pid = self.pid, vpn, frame, "demand-loading page");
        kernel.machine.lock().mmu.frame_mut(frame).fill(0);

        self.segment_overlap(kernel, self.noff.code, vpn, frame);
        self.segment_overlap(kernel, self.noff.init_data, vpn, frame);

        self.page_table[vpn] = TranslationEntry {
            virtual_page: vpn,
            physical_page: frame,
            valid: true,
            read_only: false,
            use_bit: false,
            dirty: true,
            in_memory: true,
        };
        Ok(frame)
    }

    /// Re-fault: claim a frame and read the page back from the swap
    /// file. The entry comes up clean, so an untouched page can be
    /// dropped without rewriting it.
    pub fn load_page_from_swap(&mut self, kernel: &Kernel, vpn: usize) -> Result<usize, KernelError> {
        let frame = self.acquire_frame(kernel, vpn)?;
        debug!(pid = self.pid, vpn, frame, "loading page from swap");

        let mut bytes = vec![0u8; PAGE_SIZE];
        let read = self.swap_file.read_at(&mut bytes, (vpn * PAGE_SIZE) as u64);
        assert_eq!(read, PAGE_SIZE, "swap file read fell short");
        kernel.machine.lock().mmu.frame_mut(frame).copy_from_slice(&bytes);

        let entry = &mut self.page_table[vpn];
        assert!(entry.valid && entry.virtual_page == vpn);
        entry.physical_page = frame;
        entry.use_bit = false;
        entry.dirty = false;
        entry.in_memory = true;
        Ok(frame)
    }
}
