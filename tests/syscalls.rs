//! System-call scenarios driven through the machine registers, the way
//! the trap path delivers them.

use pampero::constants::PAGE_SIZE;
use pampero::kernel::{Kernel, KernelBuilder};
use pampero::machine::console::{MemoryInput, MemoryOutput};
use pampero::machine::noff::NoffHeader;
use pampero::machine::{ARG_REGS, NEXT_PC_REG, PC_REG, RESULT_REG};
use pampero::userprog::{ExceptionType, Process, Syscall, exception, transfer};
use std::sync::Arc;

/// Install a minimal (headers-only) executable under `name`.
fn install_program(kernel: &Arc<Kernel>, name: &str) {
    kernel.file_system.create(name, 0).unwrap();
    let file = kernel.file_system.open(name).unwrap();
    file.write(&NoffHeader::default().to_bytes());
}

fn spawn_current(kernel: &Arc<Kernel>, name: &str) -> Arc<Process> {
    install_program(kernel, name);
    let pid = kernel.exec(name, 0).unwrap();
    let process = kernel.process(pid).unwrap();
    kernel.activate(&process);
    process
}

/// Place a NUL-terminated string in the current process's memory.
fn stage_string(kernel: &Arc<Kernel>, addr: usize, s: &str) {
    transfer::write_string_to_user(kernel, s, addr).unwrap();
}

/// Load the trap registers and fire the system-call exception.
fn trap(kernel: &Arc<Kernel>, call: Syscall, args: [i32; 4]) -> i32 {
    {
        let mut machine = kernel.machine.lock();
        machine.write_register(RESULT_REG, call as i32);
        for (reg, value) in ARG_REGS.into_iter().zip(args) {
            machine.write_register(reg, value);
        }
    }
    exception::handle_exception(kernel, ExceptionType::Syscall);
    kernel.machine.lock().read_register(RESULT_REG)
}

#[test]
fn create_open_write_read_close_via_traps() {
    let kernel = KernelBuilder::new().build();
    spawn_current(&kernel, "init");

    let name_addr = 8;
    let data_addr = PAGE_SIZE;
    stage_string(&kernel, name_addr, "notes");
    trap(&kernel, Syscall::Create, [name_addr as i32, 0, 0, 0]);

    let fid = trap(&kernel, Syscall::Open, [name_addr as i32, 0, 0, 0]);
    assert!(fid >= 2, "file descriptors start at 2, got {fid}");

    transfer::write_buffer_to_user(&kernel, b"trapdata", data_addr).unwrap();
    trap(&kernel, Syscall::Write, [data_addr as i32, 8, fid, 0]);

    // A second descriptor on the same file has its own position.
    let fid2 = trap(&kernel, Syscall::Open, [name_addr as i32, 0, 0, 0]);
    assert!(fid2 >= 2 && fid2 != fid);
    let read_addr = 2 * PAGE_SIZE;
    let count = trap(&kernel, Syscall::Read, [read_addr as i32, 8, fid2, 0]);
    assert_eq!(count, 8);
    assert_eq!(
        transfer::read_buffer_from_user(&kernel, read_addr, 8).unwrap(),
        b"trapdata"
    );

    trap(&kernel, Syscall::Close, [fid, 0, 0, 0]);
    trap(&kernel, Syscall::Close, [fid2, 0, 0, 0]);
    trap(&kernel, Syscall::Remove, [name_addr as i32, 0, 0, 0]);
    assert!(kernel.file_system.open("notes").is_err());
}

#[test]
fn console_descriptors_bridge_to_the_console() {
    let input = MemoryInput::new();
    let output = MemoryOutput::new();
    input.feed(b"ping");
    let kernel = KernelBuilder::new()
        .console(Box::new(input), Box::new(output.clone()))
        .build();
    spawn_current(&kernel, "init");

    let addr = 8;
    let count = trap(&kernel, Syscall::Read, [addr as i32, 4, 0, 0]);
    assert_eq!(count, 4);
    trap(&kernel, Syscall::Write, [addr as i32, 4, 1, 0]);
    assert_eq!(output.contents(), b"ping");
}

#[test]
fn exec_and_join_round_trip_the_exit_status() {
    let kernel = KernelBuilder::new()
        .runner(Arc::new(|kernel, process| {
            // Stand-in for the machine's run loop: the child just exits
            // with a recognizable status.
            kernel.finish_process(&process, 7);
        }))
        .build();
    spawn_current(&kernel, "init");
    install_program(&kernel, "child");

    let name_addr = 8;
    stage_string(&kernel, name_addr, "child");
    let pid = trap(&kernel, Syscall::Exec, [name_addr as i32, 0, 0, 0]);
    assert!(pid >= 0, "exec failed");

    let status = trap(&kernel, Syscall::Join, [pid, 0, 0, 0]);
    assert_eq!(status, 7);
    // Joined processes are retired from the table.
    assert!(kernel.process(pid as u32).is_none());
}

#[test]
fn exec_of_a_missing_program_reports_failure() {
    let kernel = KernelBuilder::new().build();
    spawn_current(&kernel, "init");
    let name_addr = 8;
    stage_string(&kernel, name_addr, "nope");
    assert_eq!(trap(&kernel, Syscall::Exec, [name_addr as i32, 0, 0, 0]), -1);
}

#[test]
fn halt_stops_the_machine_and_traps_advance_the_pc() {
    let kernel = KernelBuilder::new().build();
    spawn_current(&kernel, "init");
    {
        let mut machine = kernel.machine.lock();
        machine.write_register(PC_REG, 64);
        machine.write_register(NEXT_PC_REG, 68);
    }
    trap(&kernel, Syscall::Halt, [0, 0, 0, 0]);
    let machine = kernel.machine.lock();
    assert!(machine.is_halted());
    assert_eq!(machine.read_register(PC_REG), 68);
    assert_eq!(machine.read_register(NEXT_PC_REG), 72);
}

#[test]
fn exit_records_the_status_for_the_joiner() {
    let kernel = KernelBuilder::new().build();
    let process = spawn_current(&kernel, "init");
    trap(&kernel, Syscall::Exit, [41, 0, 0, 0]);
    assert_eq!(process.exit_status(), Some(41));
    assert_eq!(kernel.join(process.pid()).unwrap(), 41);
}

#[test]
fn fatal_exceptions_terminate_like_exit_minus_one() {
    let kernel = KernelBuilder::new().build();
    let process = spawn_current(&kernel, "init");
    exception::handle_exception(&kernel, ExceptionType::IllegalInstruction);
    assert_eq!(process.exit_status(), Some(-1));
}

#[test]
fn unknown_syscall_numbers_are_rejected() {
    let kernel = KernelBuilder::new().build();
    spawn_current(&kernel, "init");
    let result = {
        let mut machine = kernel.machine.lock();
        machine.write_register(RESULT_REG, 99);
        drop(machine);
        exception::handle_exception(&kernel, ExceptionType::Syscall);
        kernel.machine.lock().read_register(RESULT_REG)
    };
    assert_eq!(result, -38);
}

#[test]
fn ls_writes_directory_names_to_the_console() {
    let output = MemoryOutput::new();
    let kernel = KernelBuilder::new()
        .console(Box::new(MemoryInput::new()), Box::new(output.clone()))
        .build();
    let process = spawn_current(&kernel, "init");
    trap(&kernel, Syscall::Ls, [0, 0, 0, 0]);
    let listing = String::from_utf8(output.contents()).unwrap();
    assert!(listing.contains("init"));
    assert!(listing.contains(&format!("swap.{}", process.pid())));
}

#[test]
fn cd_accepts_only_paths_resolving_to_the_root() {
    let kernel = KernelBuilder::new().build();
    spawn_current(&kernel, "init");
    let path_addr = 8;
    stage_string(&kernel, path_addr, "/");
    trap(&kernel, Syscall::Cd, [path_addr as i32, 0, 0, 0]);
    // A path into a nonexistent directory leaves the cwd at the root;
    // the call reports failure only through the log, so just observe
    // the file system still resolves names afterwards.
    stage_string(&kernel, path_addr, "no/such");
    trap(&kernel, Syscall::Cd, [path_addr as i32, 0, 0, 0]);
    assert!(kernel.file_system.open("init").is_ok());
}
