//! Emulated kernel for an ARM11 handheld: handle table, kernel objects and the supervisor call
//! dispatcher.
//!
//! The kernel runs on the host thread that drives the CPU core. Guest threads are scheduled by a
//! host-provided [`Scheduler`]; syscalls that would block only record waiters and end the current
//! quantum.

mod config;
mod cpu;
mod error;
mod halt;
mod handle;
mod names;
mod object;
mod scheduler;
mod svc;

pub use config::{KernelConfig, UnknownSyscallPolicy};
pub use cpu::GuestCpu;
pub use error::{result, KernelError, KernelResult};
pub use halt::{DiagnosticHalt, HaltReport, LogHalt};
pub use handle::{Handle, HandleTable, HandleType, ObjectRef};
pub use names::syscall_name;
pub use object::{
    Arbiter, Event, GuestDir, GuestFile, KernelObject, Mutex, Port, PortState, ResetType,
    Semaphore, ServiceHandler, ServiceRef, Session, SessionState, SharedMemory, Side, Thread,
};
pub use scheduler::{Scheduler, ThreadId, ThreadParams, WaitRequest, WakeReason};
pub use svc::ipc::MAX_PORT_NAME;
pub use svc::{DispatchOutcome, Kernel, TerminationReason};
