use core::fmt;

use crate::error::KernelResult;
use crate::handle::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

/// Parameters of `CreateThread`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadParams {
    pub entry: u32,
    pub arg: u32,
    pub stack_top: u32,
    pub priority: u32,
    pub core: i32,
}

/// Why the current thread stopped running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitRequest {
    /// Waiting on synchronization objects. `timeout_ns == None` waits forever.
    Objects {
        handles: Vec<Handle>,
        wait_all: bool,
        timeout_ns: Option<u64>,
    },
    /// Waiting on an address arbiter.
    Address { addr: u32, timeout_ns: Option<u64> },
}

/// How a blocked thread was released by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// One of the awaited objects became ready. `index` is the position in the wait list
    /// (`0` for wait-all).
    Signaled { index: usize },
    /// Released by `ArbitrateAddress` signal.
    Arbitrated,
}

/// Guest thread scheduler driven by the host.
///
/// The kernel never blocks the host thread; it records waiters and tells the scheduler which
/// thread stops and which may run again. Timeouts belong to the scheduler, which reports them with
/// [`Kernel::cancel_wait`](crate::Kernel::cancel_wait).
pub trait Scheduler {
    fn current_thread(&self) -> ThreadId;

    fn spawn(&mut self, params: ThreadParams) -> KernelResult<ThreadId>;

    /// Removes the calling thread. Other threads are untouched.
    fn exit_current(&mut self);

    fn sleep_current(&mut self, ns: u64);

    fn block_current(&mut self, request: WaitRequest);

    fn wake(&mut self, thread: ThreadId, reason: WakeReason);

    fn is_alive(&self, thread: ThreadId) -> bool;

    /// Monotonic CPU tick count.
    fn system_tick(&self) -> u64;

    /// Guest address of `thread`'s thread local storage block.
    fn thread_local_storage(&self, thread: ThreadId) -> u32;
}

/// Decodes a signed guest timeout; negative values wait forever.
#[inline]
pub(crate) fn timeout_from_raw(raw: u64) -> Option<u64> {
    let ns = raw as i64;
    (ns >= 0).then_some(ns as u64)
}
