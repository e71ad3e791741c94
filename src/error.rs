use thiserror::Error;

/// Raw OS error code captured at the failure site.
///
/// On Windows this is the `GetLastError` value (or the HRESULT carried by a
/// `windows::core::Error`). Kept as a plain integer so the portable core and
/// the synthetic test backend can produce one without touching the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("OS error {0:#010x}")]
pub struct OsError(pub i32);

impl OsError {
    /// Captures the calling thread's last OS error.
    #[cfg(windows)]
    pub(crate) fn last() -> Self {
        Self(std::io::Error::last_os_error().raw_os_error().unwrap_or(0))
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for OsError {
    fn from(e: windows::core::Error) -> Self {
        Self(e.code().0)
    }
}

/// Every way an operation on a foreign process can fail.
///
/// The core never retries or recovers; each variant is surfaced to the caller
/// as-is, with the underlying OS error code attached where one exists.
#[derive(Debug, Error)]
pub enum Error {
    /// No running process matched the requested executable name.
    #[error("no process named {0:?} was found")]
    ProcessNotFound(String),

    /// Listing the system's processes during name resolution failed.
    #[error("failed to enumerate processes")]
    ProcessEnumeration {
        #[source]
        source: OsError,
    },

    /// The OS refused to hand out an access capability for the process.
    #[error("failed to open process {pid}")]
    Attach {
        pid: u32,
        #[source]
        source: OsError,
    },

    /// An operation was invoked before a successful `open`.
    #[error("no process is attached")]
    NotAttached,

    /// A region query failed at an address an operation required.
    #[error("region query at {address:#x} failed")]
    QueryFailed {
        address: usize,
        #[source]
        source: OsError,
    },

    /// The destination region is not committed or carries no access rights.
    #[error("region at {address:#x} is not committed or is inaccessible")]
    RegionInaccessible { address: usize },

    /// Relaxing the destination's protection for the write was denied.
    #[error("failed to change protection of {size} bytes at {address:#x}")]
    ProtectionChange {
        address: usize,
        size: usize,
        #[source]
        source: OsError,
    },

    /// The write landed but the original protection could not be restored.
    /// The destination region is left with relaxed protection.
    #[error("failed to restore protection at {address:#x}; region left writable")]
    ProtectionRestore {
        address: usize,
        #[source]
        source: OsError,
    },

    /// The OS rejected the write outright. Protection is not restored.
    #[error("write of {size} bytes at {address:#x} failed")]
    WriteFailed {
        address: usize,
        size: usize,
        #[source]
        source: OsError,
    },

    /// The OS reported fewer bytes written than requested. Protection is not
    /// restored on this path.
    #[error("short write at {address:#x}: {written} of {expected} bytes")]
    PartialWrite {
        address: usize,
        written: usize,
        expected: usize,
    },

    /// The OS rejected the read.
    #[error("read of {size} bytes at {address:#x} failed")]
    ReadFailed {
        address: usize,
        size: usize,
        #[source]
        source: OsError,
    },

    /// A typed decode asked for more bytes than the last read produced.
    #[error("decode needs {needed} bytes but the last read produced {available}")]
    DecodeOutOfBounds { needed: usize, available: usize },

    /// Scan-and-write found no region it could plant the value in.
    #[error("no writable region accepted the value")]
    NoWritableRegion,
}

pub type Result<T> = std::result::Result<T, Error>;
