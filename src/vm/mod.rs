//! The virtual-memory subsystem.
//!
//! Per-process page tables kept coherent with the machine's TLB, a
//! frame table with an improved second-chance replacement policy, and
//! demand paging from the executable with per-process swap files.

mod address_space;
mod core_map;

pub use address_space::AddressSpace;
pub use core_map::{CoreEntry, CoreMap, SpaceId};
