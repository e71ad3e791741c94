//! Inspect and mutate the virtual address space of another running process.
//!
//! The crate attaches to a target by executable name, walks its memory
//! regions, validates candidate address ranges, and performs buffered reads
//! and protection-safe writes, plus a heuristic mode that plants a value in
//! the first writable region it finds. Everything is synchronous and
//! blocking, targets the Windows region-based virtual memory contract, and
//! surfaces each failure as a distinct [`Error`] variant carrying the raw OS
//! error code.
//!
//! The OS is reached through the [`VirtualMemory`] trait; [`ProcessHandle`]
//! is its Win32 implementation, and the portable core (region walk, range
//! validation, the accessor) works against any implementation of it.

mod accessor;
mod decode;
mod error;
mod protection;
mod region;
mod target;

#[cfg(windows)]
mod handle;
#[cfg(windows)]
mod process;

pub use accessor::MemoryAccessor;
pub use decode::Decode;
pub use error::{Error, OsError, Result};
pub use protection::{Protection, RegionState, RegionType};
pub use region::{enumerate_regions, is_address_valid, MemoryRegion, RegionMap};
pub use target::VirtualMemory;

#[cfg(windows)]
pub use handle::ProcessHandle;
#[cfg(windows)]
pub use process::find_process_id;
