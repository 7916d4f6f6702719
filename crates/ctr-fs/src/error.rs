use std::io;

use ctr_kernel::KernelError;
use ctr_mem::MemoryError;
use thiserror::Error;

pub type FsResult<T> = Result<T, FsError>;

/// Result codes reported to the guest for filesystem failures.
pub mod result {
    pub const ALREADY_EXISTS: u32 = 0x0820_44BE;
    pub const NO_SPACE: u32 = 0x0860_44D2;
    pub const NOT_FOUND: u32 = 0xC880_4470;
    pub const INVALID_PATH: u32 = 0xE0E0_46BE;
    /// Catch-all for host I/O and staging failures.
    pub const FAILURE: u32 = 0xFFFF_FFFF;
}

#[derive(Debug, Error)]
pub enum FsError {
    /// Offsets with any of the upper 32 bits set are not supported by the staging path.
    #[error("64-bit offset 0x{offset:x} not supported")]
    UnsupportedWideOffset { offset: u64 },

    #[error("unsafe path {0:?}")]
    UnsafePath(String),

    #[error("{0:?} already exists")]
    AlreadyExists(String),

    #[error("{0:?} not found")]
    NotFound(String),

    #[error("no space left on host device")]
    NoSpace,

    #[error("short transfer: expected {expected} bytes, got {actual}")]
    ShortTransfer { expected: usize, actual: usize },

    #[error("invalid archive path: {0}")]
    InvalidArchivePath(&'static str),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl FsError {
    pub fn result_code(&self) -> u32 {
        match self {
            FsError::AlreadyExists(_) => result::ALREADY_EXISTS,
            FsError::NoSpace => result::NO_SPACE,
            FsError::NotFound(_) => result::NOT_FOUND,
            FsError::UnsafePath(_) | FsError::InvalidArchivePath(_) => result::INVALID_PATH,
            FsError::UnsupportedWideOffset { .. }
            | FsError::ShortTransfer { .. }
            | FsError::Io(_)
            | FsError::Memory(_) => result::FAILURE,
        }
    }

    /// Maps a host error for `path`, folding the cases the guest distinguishes.
    pub(crate) fn from_host(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists(path.to_owned()),
            io::ErrorKind::NotFound => FsError::NotFound(path.to_owned()),
            _ if err.raw_os_error() == Some(ENOSPC) => FsError::NoSpace,
            _ => FsError::Io(err),
        }
    }
}

#[cfg(unix)]
const ENOSPC: i32 = 28;
#[cfg(windows)]
const ENOSPC: i32 = 112; // ERROR_DISK_FULL
#[cfg(not(any(unix, windows)))]
const ENOSPC: i32 = -1;

impl From<FsError> for KernelError {
    fn from(err: FsError) -> Self {
        KernelError::Backend {
            code: err.result_code(),
            message: err.to_string(),
        }
    }
}
