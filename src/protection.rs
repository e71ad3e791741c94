use std::fmt;

use bitflags::bitflags;
#[cfg(windows)]
use windows::Win32::System::Memory::{
    MEM_COMMIT, MEM_IMAGE, MEM_MAPPED, MEM_PRIVATE, MEM_RESERVE, PAGE_EXECUTE,
    PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY, PAGE_PROTECTION_FLAGS,
    PAGE_READONLY, PAGE_READWRITE, PAGE_TYPE, PAGE_WRITECOPY, VIRTUAL_ALLOCATION_TYPE,
};

bitflags! {
    /// Access rights of a memory region.
    ///
    /// An empty set is no-access. Copy-on-write pages carry `READ | WRITE`
    /// plus the `COPY_ON_WRITE` marker so the conversion to and from the
    /// canonical Win32 `PAGE_*` values stays lossless.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Protection: u32 {
        const NO_ACCESS = 0;
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
        const COPY_ON_WRITE = 1 << 3;
    }
}

impl Protection {
    /// The region can be read from.
    pub fn is_readable(&self) -> bool {
        self.contains(Self::READ)
    }

    /// The region accepts writes (plain or copy-on-write).
    pub fn is_writable(&self) -> bool {
        self.contains(Self::WRITE)
    }
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NO_ACCESS");
        }

        let mut parts = Vec::new();
        if self.contains(Self::READ) {
            parts.push("READ");
        }
        if self.contains(Self::WRITE) {
            parts.push("WRITE");
        }
        if self.contains(Self::EXECUTE) {
            parts.push("EXECUTE");
        }
        if self.contains(Self::COPY_ON_WRITE) {
            parts.push("COPY_ON_WRITE");
        }

        write!(f, "{}", parts.join(" | "))
    }
}

#[cfg(windows)]
impl From<PAGE_PROTECTION_FLAGS> for Protection {
    /// Converts a Win32 page protection value into our internal library type.
    ///
    /// Modifier bits (guard, no-cache, write-combine) are dropped; a free
    /// region's zeroed protection word maps to the empty set.
    fn from(protection: PAGE_PROTECTION_FLAGS) -> Self {
        match protection {
            p if p == PAGE_READONLY => Self::READ,
            p if p == PAGE_READWRITE => Self::READ | Self::WRITE,
            p if p == PAGE_WRITECOPY => Self::READ | Self::WRITE | Self::COPY_ON_WRITE,
            p if p == PAGE_EXECUTE => Self::EXECUTE,
            p if p == PAGE_EXECUTE_READ => Self::READ | Self::EXECUTE,
            p if p == PAGE_EXECUTE_READWRITE => Self::READ | Self::WRITE | Self::EXECUTE,
            p if p == PAGE_EXECUTE_WRITECOPY => {
                Self::READ | Self::WRITE | Self::EXECUTE | Self::COPY_ON_WRITE
            }
            _ => Self::NO_ACCESS,
        }
    }
}

#[cfg(windows)]
impl From<Protection> for PAGE_PROTECTION_FLAGS {
    /// Converts our protection flags to the equivalent Win32 constant.
    ///
    /// Inverse of the conversion above over the eight canonical protections,
    /// so a captured pre-write value restores to exactly what was queried.
    fn from(protection: Protection) -> Self {
        match protection {
            p if p == Protection::READ => PAGE_READONLY,
            p if p == (Protection::READ | Protection::WRITE) => PAGE_READWRITE,
            p if p == (Protection::READ | Protection::WRITE | Protection::COPY_ON_WRITE) => {
                PAGE_WRITECOPY
            }
            p if p == Protection::EXECUTE => PAGE_EXECUTE,
            p if p == (Protection::READ | Protection::EXECUTE) => PAGE_EXECUTE_READ,
            p if p == (Protection::READ | Protection::WRITE | Protection::EXECUTE) => {
                PAGE_EXECUTE_READWRITE
            }
            p if p
                == (Protection::READ
                    | Protection::WRITE
                    | Protection::EXECUTE
                    | Protection::COPY_ON_WRITE) =>
            {
                PAGE_EXECUTE_WRITECOPY
            }
            _ => windows::Win32::System::Memory::PAGE_NOACCESS,
        }
    }
}

/// Commit state of a memory region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    /// Backed by storage and accessible subject to its protection.
    Committed,
    /// Address range reserved but not backed.
    Reserved,
    /// Unallocated.
    Free,
}

impl fmt::Display for RegionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Committed => "COMMIT",
            Self::Reserved => "RESERVE",
            Self::Free => "FREE",
        };
        write!(f, "{s}")
    }
}

#[cfg(windows)]
impl From<VIRTUAL_ALLOCATION_TYPE> for RegionState {
    fn from(state: VIRTUAL_ALLOCATION_TYPE) -> Self {
        match state {
            s if s == MEM_COMMIT => Self::Committed,
            s if s == MEM_RESERVE => Self::Reserved,
            _ => Self::Free,
        }
    }
}

/// Backing kind of a memory region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionType {
    /// Private pages of the process.
    Private,
    /// A mapped view of a file or section.
    Mapped,
    /// Pages of a loaded executable image.
    Image,
    /// The OS reported no type (free regions).
    Unknown,
}

impl fmt::Display for RegionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Private => "PRIVATE",
            Self::Mapped => "MAPPED",
            Self::Image => "IMAGE",
            Self::Unknown => "-",
        };
        write!(f, "{s}")
    }
}

#[cfg(windows)]
impl From<PAGE_TYPE> for RegionType {
    fn from(kind: PAGE_TYPE) -> Self {
        match kind {
            t if t == MEM_PRIVATE => Self::Private,
            t if t == MEM_MAPPED => Self::Mapped,
            t if t == MEM_IMAGE => Self::Image,
            _ => Self::Unknown,
        }
    }
}
