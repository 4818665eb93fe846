//! The kernel context.
//!
//! Rather than file-scope globals for the machine, the file system, the
//! console and the process table, everything is bundled into one
//! [`Kernel`] value handed down to the exception and system-call
//! handlers.
//!
//! Lock order, outermost first: faulting process's address space →
//! core map → victim's address space → machine / file system. The
//! single-CPU execution model serializes page faults, so the cross
//! orderings the table forbids cannot arise.

use crate::KernelError;
use crate::fs::{FileSystem, SynchDisk};
use crate::machine::console::{ConsoleInput, ConsoleOutput, MemoryInput, MemoryOutput};
use crate::machine::{Machine, MachineConfig};
use crate::sync::SpinLock;
use crate::thread::ThreadBuilder;
use crate::userprog::{Process, SynchConsole};
use crate::vm::{AddressSpace, CoreMap, SpaceId};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info};

/// Hook that runs a freshly spawned user program. The machine's fetch/
/// execute loop is outside this crate, so whoever embeds the kernel
/// (the simulator binary, or a test) supplies the code that drives the
/// child; the kernel calls it on a new thread and treats its return as
/// the program running to completion.
pub type ProgramRunner = Arc<dyn Fn(Arc<Kernel>, Arc<Process>) + Send + Sync>;

/// Builder assembling a [`Kernel`] from its collaborators.
pub struct KernelBuilder {
    machine_config: MachineConfig,
    disk_image: Option<Vec<u8>>,
    format: bool,
    console_input: Box<dyn ConsoleInput>,
    console_output: Box<dyn ConsoleOutput>,
    runner: Option<ProgramRunner>,
}

impl Default for KernelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelBuilder {
    /// Start from defaults: a freshly formatted in-memory disk, memory
    /// console endpoints, and no program runner.
    pub fn new() -> Self {
        Self {
            machine_config: MachineConfig::default(),
            disk_image: None,
            format: true,
            console_input: Box::new(MemoryInput::new()),
            console_output: Box::new(MemoryOutput::new()),
            runner: None,
        }
    }

    /// Machine geometry (frame count, TLB size).
    pub fn machine_config(mut self, config: MachineConfig) -> Self {
        self.machine_config = config;
        self
    }

    /// Boot from an existing disk image instead of formatting.
    pub fn disk_image(mut self, image: Vec<u8>) -> Self {
        self.disk_image = Some(image);
        self.format = false;
        self
    }

    /// Console endpoints.
    pub fn console(
        mut self,
        input: Box<dyn ConsoleInput>,
        output: Box<dyn ConsoleOutput>,
    ) -> Self {
        self.console_input = input;
        self.console_output = output;
        self
    }

    /// The hook that drives spawned user programs.
    pub fn runner(mut self, runner: ProgramRunner) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Assemble the kernel.
    pub fn build(self) -> Arc<Kernel> {
        let disk = Arc::new(match self.disk_image {
            Some(image) => SynchDisk::from_image(image),
            None => SynchDisk::new(),
        });
        let num_phys_pages = self.machine_config.num_phys_pages;
        Arc::new(Kernel {
            machine: SpinLock::new(Machine::new(self.machine_config)),
            file_system: FileSystem::new(disk, self.format),
            console: Arc::new(SynchConsole::new(self.console_input, self.console_output)),
            core_map: SpinLock::new(CoreMap::new(num_phys_pages)),
            processes: SpinLock::new(BTreeMap::new()),
            current: SpinLock::new(None),
            next_pid: AtomicU32::new(0),
            tlb_pointer: SpinLock::new(0),
            runner: self.runner,
        })
    }
}

/// The bundled kernel singletons.
pub struct Kernel {
    /// Registers, memory and TLB of the simulated machine.
    pub machine: SpinLock<Machine>,
    /// The file-system service.
    pub file_system: Arc<FileSystem>,
    /// The synchronous console.
    pub console: Arc<SynchConsole>,
    /// The frame table.
    pub core_map: SpinLock<CoreMap>,
    processes: SpinLock<BTreeMap<SpaceId, Arc<Process>>>,
    current: SpinLock<Option<Arc<Process>>>,
    next_pid: AtomicU32,
    tlb_pointer: SpinLock<usize>,
    runner: Option<ProgramRunner>,
}

impl Kernel {
    /// The process currently bound to the machine, if any.
    pub fn current_process(&self) -> Option<Arc<Process>> {
        self.current.lock().clone()
    }

    /// Whether `pid` is the current process.
    pub fn is_current_pid(&self, pid: SpaceId) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|p| p.pid() == pid)
    }

    /// The process with id `pid`, if still in the table.
    pub fn process(&self, pid: SpaceId) -> Option<Arc<Process>> {
        self.processes.lock().get(&pid).cloned()
    }

    /// Switch the machine to `process`'s address space: every TLB entry
    /// is invalidated, with its `use`/`dirty` bits folded back into the
    /// outgoing space's page table first.
    pub fn activate(&self, process: &Arc<Process>) {
        let previous = self.current.lock().clone();
        let displaced = self.machine.lock().mmu.invalidate_tlb();
        if let Some(previous) = previous {
            let mut space = previous.space.lock();
            if let Some(space) = space.as_mut() {
                for entry in displaced {
                    space.sync_tlb_bits(entry);
                }
            }
        }
        *self.current.lock() = Some(Arc::clone(process));
    }

    /// Run `f` against the address space of `pid`, used when an
    /// eviction crosses process boundaries.
    pub(crate) fn with_address_space<R>(
        &self,
        pid: SpaceId,
        f: impl FnOnce(&mut AddressSpace) -> R,
    ) -> Option<R> {
        let process = self.process(pid)?;
        let mut slot = process.space.lock();
        slot.as_mut().map(f)
    }

    /// Claim the next TLB slot, round-robin.
    pub(crate) fn next_tlb_slot(&self, tlb_len: usize) -> usize {
        let mut pointer = self.tlb_pointer.lock();
        let slot = *pointer;
        *pointer = (slot + 1) % tlb_len;
        slot
    }

    /// Spawn a user program: open `path`, build its address space and
    /// swap file, register the child, and hand it to the program
    /// runner on a fresh thread. Returns the child's pid.
    pub fn exec(self: &Arc<Self>, path: &str, priority: u32) -> Result<SpaceId, KernelError> {
        let executable = self.file_system.open(path)?;
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let process = Process::new(pid, path, priority);
        let space = AddressSpace::new(&self.file_system, executable, pid)?;
        *process.space.lock() = Some(space);
        self.processes.lock().insert(pid, Arc::clone(&process));
        info!(pid, path, "spawned user program");

        if let Some(runner) = self.runner.clone() {
            let kernel = Arc::clone(self);
            let child = Arc::clone(&process);
            ThreadBuilder::new(path)
                .priority(priority)
                .spawn(move || runner(kernel, child));
        }
        Ok(pid)
    }

    /// Block until `pid` exits and return its status, retiring the
    /// process-table entry.
    pub fn join(&self, pid: SpaceId) -> Result<i32, KernelError> {
        let process = self.process(pid).ok_or(KernelError::NoSuchEntry)?;
        let status = process.join();
        self.processes.lock().remove(&pid);
        Ok(status)
    }

    /// Terminate `process` with `status`: release its frames, its swap
    /// file and its descriptors, and wake its joiner. The exit status
    /// stays retrievable until the process is joined.
    pub fn finish_process(&self, process: &Arc<Process>, status: i32) {
        debug!(pid = process.pid(), status, "process finished");
        let space = process.space.lock().take();
        if let Some(space) = space {
            self.core_map.lock().free_process_frames(process.pid());
            if self.is_current_pid(process.pid()) {
                // Those frames are gone; no stale translations may
                // survive them.
                self.machine.lock().mmu.invalidate_tlb();
            }
            let swap_name = space.swap_name().to_string();
            drop(space);
            let _ = self.file_system.remove(&swap_name);
        }
        process.close_all_files();
        process.finish(status);
    }

    /// Stop the simulated machine.
    pub fn halt(&self) {
        info!("machine halted by user program");
        self.machine.lock().halt();
    }
}
