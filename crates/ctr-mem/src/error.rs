use thiserror::Error;

use crate::mapping::AccessKind;

pub type MemoryResult<T> = Result<T, MemoryError>;

/// Errors reported by an [`AddressSpace`](crate::AddressSpace).
///
/// Mapping errors are returned before the region table is touched, so a failed
/// `add_*` call never leaves a partial mapping behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("mapping table full ({max} mappings)")]
    CapacityExceeded { max: usize },

    #[error(
        "mapping base=0x{base:08x} size=0x{size:08x} overlaps existing mapping base=0x{existing_base:08x} size=0x{existing_size:08x}"
    )]
    OverlapRejected {
        base: u32,
        size: u32,
        existing_base: u32,
        existing_size: u32,
    },

    #[error("failed to allocate backing storage for base=0x{base:08x} size=0x{size:08x}")]
    AllocationFailed { base: u32, size: u32 },

    #[error("mapping base=0x{base:08x} size=0x{size:08x} wraps past the 32-bit address space")]
    AddressOverflow { base: u32, size: u32 },

    #[error("shared buffer holds {available} bytes but the mapping needs {size}")]
    BufferTooSmall { size: u32, available: usize },

    #[error("unmapped {kind} of {len} bytes at 0x{addr:08x}")]
    UnmappedAccess {
        addr: u32,
        len: usize,
        kind: AccessKind,
    },

    #[error("write of {len} bytes to read-only memory at 0x{addr:08x}")]
    ReadOnly { addr: u32, len: usize },

    #[error("no mapping starts at 0x{base:08x}")]
    NoSuchMapping { base: u32 },

    #[error("process slot {slot} out of range (have {count})")]
    InvalidProcessSlot { slot: usize, count: usize },
}
