//! The NOFF executable format.
//!
//! A NOFF binary is a magic word followed by three segment descriptors
//! (code, initialized data, uninitialized data), each a triple of
//! `(size, virtual_addr, in_file_addr)`. All fields are 32-bit
//! little-endian on disk; a header whose magic only matches after
//! byte-swapping was produced on a big-endian host and is swapped
//! wholesale on load.

use crate::KernelError;

/// Magic word identifying a NOFF binary.
pub const NOFF_MAGIC: u32 = 0xbadfad;

/// Size of the encoded header in bytes.
pub const NOFF_HEADER_SIZE: usize = 40;

/// One loadable segment of the executable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Segment {
    /// Bytes in the segment; zero for an absent segment.
    pub size: u32,
    /// Virtual address the segment starts at.
    pub virtual_addr: u32,
    /// Offset of the segment's bytes within the executable file.
    pub in_file_addr: u32,
}

impl Segment {
    fn decode(bytes: &[u8], swap: bool) -> Self {
        let word = |i: usize| {
            let raw: [u8; 4] = bytes[i * 4..i * 4 + 4].try_into().unwrap();
            if swap {
                u32::from_be_bytes(raw)
            } else {
                u32::from_le_bytes(raw)
            }
        };
        Self {
            size: word(0),
            virtual_addr: word(1),
            in_file_addr: word(2),
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&self.virtual_addr.to_le_bytes());
        out.extend_from_slice(&self.in_file_addr.to_le_bytes());
    }

    /// End of the segment's virtual range, exclusive.
    pub fn virtual_end(&self) -> u32 {
        self.virtual_addr + self.size
    }
}

/// The parsed NOFF header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoffHeader {
    /// Executable code.
    pub code: Segment,
    /// Initialized data.
    pub init_data: Segment,
    /// Uninitialized data; occupies address space but no file bytes.
    pub uninit_data: Segment,
}

impl NoffHeader {
    /// Decode a header from the first [`NOFF_HEADER_SIZE`] bytes of an
    /// executable.
    pub fn parse(bytes: &[u8]) -> Result<Self, KernelError> {
        if bytes.len() < NOFF_HEADER_SIZE {
            return Err(KernelError::NoExec);
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let swap = if magic == NOFF_MAGIC {
            false
        } else if magic.swap_bytes() == NOFF_MAGIC {
            true
        } else {
            return Err(KernelError::NoExec);
        };
        Ok(Self {
            code: Segment::decode(&bytes[4..16], swap),
            init_data: Segment::decode(&bytes[16..28], swap),
            uninit_data: Segment::decode(&bytes[28..40], swap),
        })
    }

    /// Encode the header, little-endian. Used when synthesizing
    /// executables for tests and tooling.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NOFF_HEADER_SIZE);
        out.extend_from_slice(&NOFF_MAGIC.to_le_bytes());
        self.code.encode(&mut out);
        self.init_data.encode(&mut out);
        self.uninit_data.encode(&mut out);
        out
    }

    /// Bytes of address space the executable needs, stack excluded.
    pub fn memory_span(&self) -> usize {
        (self.code.size + self.init_data.size + self.uninit_data.size) as usize
    }
}
