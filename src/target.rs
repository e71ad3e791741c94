use crate::error::OsError;
use crate::protection::Protection;
use crate::region::MemoryRegion;

/// OS primitives over one foreign process's virtual address space.
///
/// Implemented for the real Win32 handle and by the synthetic address space
/// the integration tests drive. Every method is a single blocking OS call;
/// failures carry the raw OS error code and nothing else; mapping a failure
/// to an operation-level [`crate::Error`] is the caller's job.
pub trait VirtualMemory {
    /// Queries the region covering `address`.
    ///
    /// An `Err` also signals the end of the address space during an
    /// enumeration walk; it is not necessarily fatal.
    fn query(&self, address: usize) -> Result<MemoryRegion, OsError>;

    /// Changes the protection of `size` bytes at `address`, returning the
    /// previous protection.
    fn protect(
        &self,
        address: usize,
        size: usize,
        protection: Protection,
    ) -> Result<Protection, OsError>;

    /// Reads `buf.len()` bytes from `address` into `buf`.
    fn read(&self, address: usize, buf: &mut [u8]) -> Result<(), OsError>;

    /// Writes `bytes` at `address` without touching protection, returning the
    /// number of bytes the OS reports written.
    fn write(&self, address: usize, bytes: &[u8]) -> Result<usize, OsError>;
}
