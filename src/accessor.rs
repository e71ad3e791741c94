use tracing::{debug, trace};

use crate::decode::Decode;
use crate::error::{Error, Result};
use crate::protection::{Protection, RegionState};
use crate::region::{enumerate_regions, is_address_valid, RegionMap};
use crate::target::VirtualMemory;

/// Buffered, protection-aware access to one foreign process's memory.
///
/// Holds the attach state (process name, lazily-resolved pid, an optional
/// open backend) and an owned read buffer that grows to the largest read
/// seen and never shrinks. Not for concurrent use: every operation is one
/// or more blocking OS calls with no internal locking and no timeout.
pub struct MemoryAccessor<M> {
    process_name: String,
    pid: Option<u32>,
    target: Option<M>,
    buffer: Vec<u8>,
    last_read: usize,
}

impl<M: VirtualMemory> MemoryAccessor<M> {
    /// Creates a detached accessor for the named process.
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
            pid: None,
            target: None,
            buffer: Vec::new(),
            last_read: 0,
        }
    }

    /// Executable name this accessor resolves on open.
    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// The resolved process id, if resolution has happened.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Installs `target` as the open backend, closing any prior one first so
    /// re-attaching never leaks the previous capability.
    pub fn attach_target(&mut self, target: M) {
        self.close();
        self.target = Some(target);
    }

    /// Detaches from the target, releasing the backend. Idempotent.
    pub fn close(&mut self) {
        if self.target.take().is_some() {
            debug!(process = %self.process_name, "detached");
        }
    }

    /// Whether a backend is currently attached.
    pub fn is_attached(&self) -> bool {
        self.target.is_some()
    }

    fn target(&self) -> Result<&M> {
        self.target.as_ref().ok_or(Error::NotAttached)
    }

    /// Snapshot of the committed, readable regions of the target, keyed and
    /// ordered by base address. Rebuilt on every call.
    pub fn memory_regions(&self) -> Result<RegionMap> {
        let target = self.target()?;
        let regions = enumerate_regions(target);
        trace!(count = regions.len(), "enumerated regions");
        Ok(regions)
    }

    /// Whether `size` bytes at `address` fall inside one committed, writable
    /// region. See [`is_address_valid`].
    pub fn is_address_valid(&self, address: usize, size: usize) -> Result<bool> {
        let target = self.target()?;
        Ok(is_address_valid(target, address, size))
    }

    /// Reads `size` bytes at `source` into the internal buffer and returns
    /// the freshly-read slice.
    ///
    /// Performs no validation; callers wanting a guarantee should check
    /// [`Self::is_address_valid`] first. Buffer bytes beyond the returned
    /// slice are stale leftovers of earlier reads.
    pub fn read(&mut self, source: usize, size: usize) -> Result<&[u8]> {
        let target = self.target.as_ref().ok_or(Error::NotAttached)?;

        if self.buffer.len() < size {
            self.buffer.resize(size, 0);
        }

        target
            .read(source, &mut self.buffer[..size])
            .map_err(|e| Error::ReadFailed {
                address: source,
                size,
                source: e,
            })?;
        self.last_read = size;

        Ok(&self.buffer[..size])
    }

    /// Decodes the head of the most recent read as `T` (little-endian).
    ///
    /// Fails with [`Error::DecodeOutOfBounds`] when the last read produced
    /// fewer than `size_of::<T>()` bytes, rather than reinterpreting stale
    /// buffer contents.
    pub fn decode<T: Decode>(&self) -> Result<T> {
        let needed = size_of::<T>();
        if needed > self.last_read {
            return Err(Error::DecodeOutOfBounds {
                needed,
                available: self.last_read,
            });
        }
        Ok(T::decode(&self.buffer[..needed]))
    }

    /// The internal read buffer. Only the first `n` bytes of the most recent
    /// `read(_, n)` are current; the rest is stale.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Writes `bytes` at `destination` behind a protection change.
    ///
    /// Best-effort, non-transactional sequence: query the destination,
    /// relax its protection to read-write-execute while capturing the prior
    /// value, copy the bytes, then restore the captured protection. The
    /// prior protection comes back only on the fully successful path: a
    /// rejected or short write returns with the region still relaxed, and a
    /// failed restore leaves it permanently altered. The target's own
    /// threads can observe every intermediate state.
    pub fn write(&mut self, bytes: &[u8], destination: usize) -> Result<()> {
        let target = self.target.as_ref().ok_or(Error::NotAttached)?;
        let size = bytes.len();

        let region = target.query(destination).map_err(|e| Error::QueryFailed {
            address: destination,
            source: e,
        })?;
        if region.state() != RegionState::Committed || region.protection().is_empty() {
            return Err(Error::RegionInaccessible {
                address: destination,
            });
        }

        let relaxed = Protection::READ | Protection::WRITE | Protection::EXECUTE;
        let previous = target
            .protect(destination, size, relaxed)
            .map_err(|e| Error::ProtectionChange {
                address: destination,
                size,
                source: e,
            })?;
        trace!(address = destination, %previous, "relaxed protection");

        // Failure paths below intentionally leave the relaxed protection in
        // place; restoring only happens after a complete write.
        let written = target
            .write(destination, bytes)
            .map_err(|e| Error::WriteFailed {
                address: destination,
                size,
                source: e,
            })?;
        if written != size {
            return Err(Error::PartialWrite {
                address: destination,
                written,
                expected: size,
            });
        }

        target
            .protect(destination, size, previous)
            .map_err(|e| Error::ProtectionRestore {
                address: destination,
                source: e,
            })?;

        debug!(address = destination, size, "wrote memory");
        Ok(())
    }

    /// Plants `bytes` in the first suitable region of the target.
    ///
    /// Walks the region map in ascending base-address order, picks regions
    /// whose protection includes read-write and whose size fits `bytes`, and
    /// issues a raw write at the region base, with no protection change and no
    /// restore. The first write the OS reports successful wins and its base
    /// address is returned. Deliberately weaker than [`Self::write`]; the
    /// two are never substituted for one another.
    pub fn scan_and_write(&mut self, bytes: &[u8]) -> Result<usize> {
        let target = self.target.as_ref().ok_or(Error::NotAttached)?;

        for region in enumerate_regions(target).values() {
            if !region
                .protection()
                .contains(Protection::READ | Protection::WRITE)
            {
                continue;
            }
            if region.size() < bytes.len() {
                trace!(base = region.base_address(), "region too small, skipping");
                continue;
            }

            match target.write(region.base_address(), bytes) {
                Ok(_) => {
                    debug!(address = region.base_address(), "planted value");
                    return Ok(region.base_address());
                }
                Err(e) => {
                    trace!(base = region.base_address(), %e, "write refused, trying next");
                }
            }
        }

        Err(Error::NoWritableRegion)
    }
}

#[cfg(windows)]
impl MemoryAccessor<crate::ProcessHandle> {
    /// Attaches to the target over the real Win32 backend.
    ///
    /// Resolves the process id on first use (cached afterwards), then
    /// requests an access capability with `rights`. An already-open handle
    /// is closed first rather than overwritten, so re-opening never leaks.
    pub fn open(
        &mut self,
        rights: windows::Win32::System::Threading::PROCESS_ACCESS_RIGHTS,
    ) -> Result<()> {
        self.close();

        let pid = match self.pid {
            Some(pid) => pid,
            None => {
                let pid = crate::process::find_process_id(&self.process_name)?;
                self.pid = Some(pid);
                pid
            }
        };

        let handle = crate::ProcessHandle::open(pid, rights)?;
        debug!(process = %self.process_name, pid, "attached");
        self.target = Some(handle);
        Ok(())
    }
}
