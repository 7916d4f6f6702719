use core::fmt;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::{Rc, Weak};

use ctr_mem::{AddressSpace, SharedBuffer};

use crate::error::KernelResult;
use crate::handle::{HandleType, ObjectRef};
use crate::scheduler::ThreadId;

/// Host-side implementation of a named service reached through `ConnectToPort`.
pub trait ServiceHandler {
    /// Handles the IPC command buffer at guest address `cmd_buf`; replies are written in place.
    fn handle_request(&mut self, mem: &mut AddressSpace, cmd_buf: u32) -> KernelResult<()>;
}

pub type ServiceRef = Rc<RefCell<dyn ServiceHandler>>;

/// Open file as seen by the kernel. Bytes are staged through guest memory.
pub trait GuestFile: fmt::Debug {
    /// Reads up to `len` bytes at `offset` into guest memory at `addr`; returns the byte count.
    fn read(&mut self, mem: &mut AddressSpace, offset: u64, addr: u32, len: u32) -> KernelResult<u32>;
    /// Writes `len` bytes from guest memory at `addr` to `offset`; returns the byte count.
    fn write(
        &mut self,
        mem: &mut AddressSpace,
        offset: u64,
        addr: u32,
        len: u32,
        flush: bool,
    ) -> KernelResult<u32>;
    fn size(&mut self) -> KernelResult<u64>;
    fn close(&mut self);
}

/// Open directory as seen by the kernel.
pub trait GuestDir: fmt::Debug {
    /// Writes up to `count` directory entry records at `addr`; returns how many were written.
    fn read_entries(&mut self, mem: &mut AddressSpace, addr: u32, count: u32) -> KernelResult<u32>;
    fn close(&mut self);
}

#[derive(Debug, Default)]
pub struct Mutex {
    pub owner: Option<ThreadId>,
    pub lock_count: u32,
    pub waiters: Vec<ThreadId>,
}

impl Mutex {
    pub fn new(locked_by: Option<ThreadId>) -> Self {
        Self {
            owner: locked_by,
            lock_count: u32::from(locked_by.is_some()),
            waiters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetType {
    /// Cleared when a waiter consumes the signal.
    OneShot,
    /// Stays signaled until `ClearEvent`.
    Sticky,
    /// Releases current waiters, then clears.
    Pulse,
}

impl ResetType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(ResetType::OneShot),
            1 => Some(ResetType::Sticky),
            2 => Some(ResetType::Pulse),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Event {
    pub reset: ResetType,
    pub signaled: bool,
    pub waiters: Vec<ThreadId>,
}

impl Event {
    pub fn new(reset: ResetType) -> Self {
        Self {
            reset,
            signaled: false,
            waiters: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Semaphore {
    pub count: i32,
    pub max: i32,
    pub waiters: Vec<ThreadId>,
}

#[derive(Debug)]
pub struct Thread {
    pub id: ThreadId,
    pub waiters: Vec<ThreadId>,
}

/// Futex-like waiters keyed by guest address, in arrival order.
#[derive(Debug, Default)]
pub struct Arbiter {
    pub waiters: BTreeMap<u32, VecDeque<ThreadId>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Server,
    Client,
}

#[derive(Default)]
pub struct PortState {
    pub name: Option<String>,
    pub max_sessions: u32,
    pub sessions: u32,
    /// Server ends of sessions created by clients and not yet accepted.
    pub pending: VecDeque<ObjectRef>,
    pub service: Option<ServiceRef>,
}

impl fmt::Debug for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortState")
            .field("name", &self.name)
            .field("max_sessions", &self.max_sessions)
            .field("sessions", &self.sessions)
            .field("pending", &self.pending.len())
            .field("service", &self.service.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Port {
    pub side: Side,
    pub state: Rc<RefCell<PortState>>,
}

#[derive(Default)]
pub struct SessionState {
    pub service: Option<ServiceRef>,
    pub port: Option<Weak<RefCell<PortState>>>,
    pub requests: u64,
    pub closed: bool,
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("service", &self.service.is_some())
            .field("requests", &self.requests)
            .field("closed", &self.closed)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub side: Side,
    pub state: Rc<RefCell<SessionState>>,
}

#[derive(Debug)]
pub struct SharedMemory {
    pub buffer: SharedBuffer,
    pub size: u32,
}

#[derive(Debug)]
pub enum KernelObject {
    Mutex(Mutex),
    Event(Event),
    Semaphore(Semaphore),
    Thread(Thread),
    Arbiter(Arbiter),
    Session(Session),
    Port(Port),
    SharedMemory(SharedMemory),
    File(Box<dyn GuestFile>),
    Dir(Box<dyn GuestDir>),
}

impl KernelObject {
    pub fn handle_type(&self) -> HandleType {
        match self {
            KernelObject::Mutex(_) => HandleType::Mutex,
            KernelObject::Event(_) => HandleType::Event,
            KernelObject::Semaphore(_) => HandleType::Semaphore,
            KernelObject::Thread(_) => HandleType::Thread,
            KernelObject::Arbiter(_) => HandleType::Arbiter,
            KernelObject::Session(_) => HandleType::Session,
            KernelObject::Port(_) => HandleType::Port,
            KernelObject::SharedMemory(_) => HandleType::SharedMemory,
            KernelObject::File(_) => HandleType::File,
            KernelObject::Dir(_) => HandleType::Dir,
        }
    }

    /// Waiter list of objects usable with `WaitSynchronization*`.
    pub(crate) fn waiters_mut(&mut self) -> Option<&mut Vec<ThreadId>> {
        match self {
            KernelObject::Mutex(m) => Some(&mut m.waiters),
            KernelObject::Event(e) => Some(&mut e.waiters),
            KernelObject::Semaphore(s) => Some(&mut s.waiters),
            KernelObject::Thread(t) => Some(&mut t.waiters),
            _ => None,
        }
    }

    /// Called when the last handle to the object is closed.
    pub(crate) fn release(&mut self) {
        match self {
            KernelObject::File(file) => file.close(),
            KernelObject::Dir(dir) => dir.close(),
            KernelObject::Session(session) => {
                let mut state = session.state.borrow_mut();
                if !state.closed {
                    state.closed = true;
                    if let Some(port) = state.port.as_ref().and_then(Weak::upgrade) {
                        let mut port = port.borrow_mut();
                        port.sessions = port.sessions.saturating_sub(1);
                    }
                }
            }
            _ => {}
        }
    }
}
