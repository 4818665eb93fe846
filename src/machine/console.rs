//! Raw console device.
//!
//! Byte-in/byte-out device with one completion interrupt per direction,
//! mirroring the disk's shape: `put_char` raises `write_done` when the
//! byte has been emitted, `get_char` raises `read_avail` when a byte has
//! been fetched. The synchronous wrapper lives in
//! [`userprog::synch_console`].
//!
//! [`userprog::synch_console`]: crate::userprog::synch_console

use crate::machine::disk::CompletionHandler;
use crate::sync::SpinLock;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::Arc;

/// Where console input bytes come from.
pub trait ConsoleInput: Send {
    /// Fetch the next byte; `0` at end of input.
    fn get_byte(&mut self) -> u8;
}

/// Where console output bytes go.
pub trait ConsoleOutput: Send {
    /// Emit one byte.
    fn put_byte(&mut self, byte: u8);
}

/// The console device.
pub struct Console {
    input: SpinLock<Box<dyn ConsoleInput>>,
    output: SpinLock<Box<dyn ConsoleOutput>>,
    read_avail: CompletionHandler,
    write_done: CompletionHandler,
}

impl Console {
    /// Creates a console over the given endpoints, with per-direction
    /// completion handlers.
    pub fn new(
        input: Box<dyn ConsoleInput>,
        output: Box<dyn ConsoleOutput>,
        read_avail: CompletionHandler,
        write_done: CompletionHandler,
    ) -> Self {
        Self {
            input: SpinLock::new(input),
            output: SpinLock::new(output),
            read_avail,
            write_done,
        }
    }

    /// Emit `byte`; the `write_done` interrupt fires once it is out.
    pub fn put_char(&self, byte: u8) {
        self.output.lock().put_byte(byte);
        (self.write_done)();
    }

    /// Fetch a byte; the `read_avail` interrupt fires once it is in.
    pub fn get_char(&self) -> u8 {
        let byte = self.input.lock().get_byte();
        (self.read_avail)();
        byte
    }
}

/// In-memory input endpoint, shared so tests can feed it.
#[derive(Clone, Default)]
pub struct MemoryInput(Arc<SpinLock<VecDeque<u8>>>);

impl MemoryInput {
    /// Creates an empty input buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes for the console to consume.
    pub fn feed(&self, bytes: &[u8]) {
        self.0.lock().extend(bytes.iter().copied());
    }
}

impl ConsoleInput for MemoryInput {
    fn get_byte(&mut self) -> u8 {
        self.0.lock().pop_front().unwrap_or(0)
    }
}

/// In-memory output endpoint, shared so tests can inspect it.
#[derive(Clone, Default)]
pub struct MemoryOutput(Arc<SpinLock<Vec<u8>>>);

impl MemoryOutput {
    /// Creates an empty output buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().clone()
    }
}

impl ConsoleOutput for MemoryOutput {
    fn put_byte(&mut self, byte: u8) {
        self.0.lock().push(byte);
    }
}

/// Host standard input as the console input.
pub struct StdinInput;

impl ConsoleInput for StdinInput {
    fn get_byte(&mut self) -> u8 {
        let mut byte = [0u8];
        match std::io::stdin().read(&mut byte) {
            Ok(1) => byte[0],
            _ => 0,
        }
    }
}

/// Host standard output as the console output.
pub struct StdoutOutput;

impl ConsoleOutput for StdoutOutput {
    fn put_byte(&mut self, byte: u8) {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(&[byte]);
        let _ = stdout.flush();
    }
}
