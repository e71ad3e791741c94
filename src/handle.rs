use std::ffi::c_void;

use tracing::warn;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
use windows::Win32::System::Memory::{
    VirtualProtectEx, VirtualQueryEx, MEMORY_BASIC_INFORMATION, PAGE_PROTECTION_FLAGS,
};
use windows::Win32::System::Threading::{OpenProcess, PROCESS_ACCESS_RIGHTS};

use crate::error::{Error, OsError, Result};
use crate::protection::Protection;
use crate::region::MemoryRegion;
use crate::target::VirtualMemory;

/// Owning wrapper around the Win32 capability to access another process.
///
/// The handle exists only while open; dropping it releases the OS resource
/// exactly once. It must not be duplicated; re-attaching goes through
/// [`crate::MemoryAccessor::open`], which drops the prior handle first.
pub struct ProcessHandle {
    pid: u32,
    raw: HANDLE,
}

impl ProcessHandle {
    /// Requests an access capability for `pid` with the given rights.
    pub fn open(pid: u32, rights: PROCESS_ACCESS_RIGHTS) -> Result<Self> {
        let raw = unsafe { OpenProcess(rights, false, pid) }.map_err(|e| Error::Attach {
            pid,
            source: e.into(),
        })?;
        Ok(Self { pid, raw })
    }

    /// The process id this handle grants access to.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub(crate) fn raw(&self) -> HANDLE {
        self.raw
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if let Err(e) = unsafe { CloseHandle(self.raw) } {
            warn!(pid = self.pid, error = %e, "failed to close process handle");
        }
    }
}

impl VirtualMemory for ProcessHandle {
    fn query(&self, address: usize) -> std::result::Result<MemoryRegion, OsError> {
        let mut info = MEMORY_BASIC_INFORMATION::default();
        let len = unsafe {
            VirtualQueryEx(
                self.raw,
                Some(address as *const c_void),
                &mut info,
                size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if len == 0 {
            return Err(OsError::last());
        }

        Ok(MemoryRegion::new(
            info.BaseAddress as usize,
            info.RegionSize,
            info.State.into(),
            info.Protect.into(),
            info.Type.into(),
        ))
    }

    fn protect(
        &self,
        address: usize,
        size: usize,
        protection: Protection,
    ) -> std::result::Result<Protection, OsError> {
        let mut previous = PAGE_PROTECTION_FLAGS::default();
        unsafe {
            VirtualProtectEx(
                self.raw,
                address as *const c_void,
                size,
                protection.into(),
                &mut previous,
            )
        }
        .map_err(OsError::from)?;
        Ok(previous.into())
    }

    fn read(&self, address: usize, buf: &mut [u8]) -> std::result::Result<(), OsError> {
        let mut bytes_read = 0usize;
        unsafe {
            ReadProcessMemory(
                self.raw,
                address as *const c_void,
                buf.as_mut_ptr() as *mut c_void,
                buf.len(),
                Some(&mut bytes_read),
            )
        }
        .map_err(OsError::from)
    }

    fn write(&self, address: usize, bytes: &[u8]) -> std::result::Result<usize, OsError> {
        let mut bytes_written = 0usize;
        unsafe {
            WriteProcessMemory(
                self.raw,
                address as *const c_void,
                bytes.as_ptr() as *const c_void,
                bytes.len(),
                Some(&mut bytes_written),
            )
        }
        .map_err(OsError::from)?;
        Ok(bytes_written)
    }
}
