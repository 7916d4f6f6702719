use ctr_mem::MemoryError;
use thiserror::Error;

use crate::handle::{Handle, HandleType};

pub type KernelResult<T> = Result<T, KernelError>;

/// Guest-visible result codes.
///
/// Every [`KernelError`] resolves to one of these through [`KernelError::result_code`].
pub mod result {
    pub const SUCCESS: u32 = 0;
    pub const INVALID_HANDLE: u32 = 0xD8E0_07F7;
    pub const WRONG_HANDLE_TYPE: u32 = 0xD8E0_07F9;
    pub const OUT_OF_HANDLES: u32 = 0xD860_0413;
    pub const OUT_OF_MEMORY: u32 = 0xD860_07F3;
    pub const INVALID_ADDRESS: u32 = 0xE0E0_1BF5;
    pub const MISALIGNED_ADDRESS: u32 = 0xE0E0_1BF1;
    pub const MISALIGNED_SIZE: u32 = 0xE0E0_1BF2;
    pub const OUT_OF_RANGE: u32 = 0xE0E0_1BFD;
    pub const INVALID_ENUM_VALUE: u32 = 0xD8E0_93ED;
    pub const TIMEOUT: u32 = 0x0940_1BFE;
    pub const NOT_FOUND: u32 = 0xD880_07FA;
    pub const ALREADY_EXISTS: u32 = 0xD900_1BFC;
    pub const PORT_NAME_TOO_LONG: u32 = 0xE0E0_181E;
    pub const MAX_CONNECTIONS: u32 = 0xD040_1834;
    pub const NOT_OWNER: u32 = 0xD8E0_041F;
    pub const NOT_IMPLEMENTED: u32 = 0xF8C0_07F4;
    pub const NO_PENDING_SESSION: u32 = 0xD840_1823;
    pub const SESSION_CLOSED: u32 = 0xC920_181A;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("invalid handle {0}")]
    InvalidHandle(Handle),

    #[error("handle {handle} is a {actual}, expected {expected}")]
    WrongHandleType {
        handle: Handle,
        expected: HandleType,
        actual: HandleType,
    },

    #[error("handle {handle} ({actual}) cannot be waited on")]
    NotWaitable { handle: Handle, actual: HandleType },

    #[error("handle table full ({max} handles)")]
    OutOfHandles { max: usize },

    #[error("out of memory")]
    OutOfMemory,

    #[error("invalid address 0x{addr:08x}")]
    InvalidAddress { addr: u32 },

    #[error("misaligned address 0x{addr:08x}")]
    MisalignedAddress { addr: u32 },

    #[error("misaligned size 0x{size:08x}")]
    MisalignedSize { size: u32 },

    #[error("{what} out of range: {value}")]
    OutOfRange { what: &'static str, value: i64 },

    #[error("invalid {what} value {value}")]
    InvalidEnumValue { what: &'static str, value: u32 },

    #[error("wait timed out")]
    Timeout,

    #[error("no port named {0:?}")]
    PortNotFound(String),

    #[error("port {0:?} already registered")]
    PortExists(String),

    #[error("port name longer than 11 bytes")]
    PortNameTooLong,

    #[error("port has reached its session limit of {max}")]
    MaxConnections { max: u32 },

    #[error("calling thread does not own mutex {handle}")]
    NotOwner { handle: Handle },

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("no session pending on port {handle}")]
    NoPendingSession { handle: Handle },

    #[error("session {handle} is closed")]
    SessionClosed { handle: Handle },

    #[error("unknown syscall 0x{num:02x} ({name})")]
    UnknownSyscall { num: u8, name: &'static str },

    /// A service or filesystem backend failed with its own result code.
    #[error("backend error 0x{code:08x}: {message}")]
    Backend { code: u32, message: String },

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl KernelError {
    pub fn result_code(&self) -> u32 {
        use result::*;

        match self {
            KernelError::InvalidHandle(_) => INVALID_HANDLE,
            KernelError::WrongHandleType { .. } => WRONG_HANDLE_TYPE,
            KernelError::NotWaitable { .. } => WRONG_HANDLE_TYPE,
            KernelError::OutOfHandles { .. } => OUT_OF_HANDLES,
            KernelError::OutOfMemory => OUT_OF_MEMORY,
            KernelError::InvalidAddress { .. } => INVALID_ADDRESS,
            KernelError::MisalignedAddress { .. } => MISALIGNED_ADDRESS,
            KernelError::MisalignedSize { .. } => MISALIGNED_SIZE,
            KernelError::OutOfRange { .. } => OUT_OF_RANGE,
            KernelError::InvalidEnumValue { .. } => INVALID_ENUM_VALUE,
            KernelError::Timeout => TIMEOUT,
            KernelError::PortNotFound(_) => NOT_FOUND,
            KernelError::PortExists(_) => ALREADY_EXISTS,
            KernelError::PortNameTooLong => PORT_NAME_TOO_LONG,
            KernelError::MaxConnections { .. } => MAX_CONNECTIONS,
            KernelError::NotOwner { .. } => NOT_OWNER,
            KernelError::NotImplemented(_) => NOT_IMPLEMENTED,
            KernelError::NoPendingSession { .. } => NO_PENDING_SESSION,
            KernelError::SessionClosed { .. } => SESSION_CLOSED,
            // The dispatcher writes 0 for unknown syscalls; this is only seen by host callers.
            KernelError::UnknownSyscall { .. } => NOT_IMPLEMENTED,
            KernelError::Backend { code, .. } => *code,
            KernelError::Memory(err) => match err {
                MemoryError::CapacityExceeded { .. } | MemoryError::AllocationFailed { .. } => {
                    OUT_OF_MEMORY
                }
                _ => INVALID_ADDRESS,
            },
        }
    }
}
