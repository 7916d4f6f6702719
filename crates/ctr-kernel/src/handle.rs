use core::fmt;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, KernelResult};
use crate::object::KernelObject;

/// Shared reference to a kernel object. Duplicated handles point at the same object.
pub type ObjectRef = Rc<RefCell<KernelObject>>;

/// Opaque guest handle value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle(pub u32);

impl Handle {
    /// First value handed out by a [`HandleTable`].
    pub const FIRST: Handle = Handle(0x0001_0000);
    /// Pseudo-handle naming the calling thread.
    pub const CURRENT_THREAD: Handle = Handle(0xFFFF_8000);
    /// Pseudo-handle naming the calling process.
    pub const CURRENT_PROCESS: Handle = Handle(0xFFFF_8001);

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleType {
    File,
    Dir,
    Mutex,
    Event,
    Semaphore,
    Thread,
    Arbiter,
    Session,
    Port,
    SharedMemory,
}

impl fmt::Display for HandleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleType::File => "FILE",
            HandleType::Dir => "DIR",
            HandleType::Mutex => "MUTEX",
            HandleType::Event => "EVENT",
            HandleType::Semaphore => "SEMAPHORE",
            HandleType::Thread => "THREAD",
            HandleType::Arbiter => "ARBITER",
            HandleType::Session => "SESSION",
            HandleType::Port => "PORT",
            HandleType::SharedMemory => "SHARED_MEMORY",
        };
        f.write_str(name)
    }
}

/// Registry of live handles for one guest process.
///
/// Values are allocated upward from [`Handle::FIRST`] and are not reused while the previous owner
/// of a value is still open. `0` is never a valid handle.
#[derive(Debug)]
pub struct HandleTable {
    entries: BTreeMap<u32, ObjectRef>,
    next: u32,
    max: usize,
}

impl HandleTable {
    pub fn new(max: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            next: Handle::FIRST.0,
            max,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.contains_key(&handle.0)
    }

    /// Registers a new object and returns its handle.
    pub fn insert(&mut self, object: KernelObject) -> KernelResult<Handle> {
        self.insert_ref(Rc::new(RefCell::new(object)))
    }

    /// Registers another handle for an existing object.
    pub fn insert_ref(&mut self, object: ObjectRef) -> KernelResult<Handle> {
        if self.entries.len() >= self.max {
            return Err(KernelError::OutOfHandles { max: self.max });
        }

        let mut value = self.next;
        while value < Handle::FIRST.0
            || value >= Handle::CURRENT_THREAD.0
            || self.entries.contains_key(&value)
        {
            value = value.wrapping_add(1);
            if value >= Handle::CURRENT_THREAD.0 {
                value = Handle::FIRST.0;
            }
        }
        self.next = value.wrapping_add(1);
        self.entries.insert(value, object);
        Ok(Handle(value))
    }

    pub fn get(&self, handle: Handle) -> KernelResult<ObjectRef> {
        self.entries
            .get(&handle.0)
            .cloned()
            .ok_or(KernelError::InvalidHandle(handle))
    }

    /// Looks up `handle` and checks that it names an object of type `expected`.
    pub fn get_typed(&self, handle: Handle, expected: HandleType) -> KernelResult<ObjectRef> {
        let object = self.get(handle)?;
        let actual = object.borrow().handle_type();
        if actual != expected {
            return Err(KernelError::WrongHandleType {
                handle,
                expected,
                actual,
            });
        }
        Ok(object)
    }

    pub fn duplicate(&mut self, handle: Handle) -> KernelResult<Handle> {
        let object = self.get(handle)?;
        self.insert_ref(object)
    }

    /// Removes `handle` and returns the object it referred to.
    pub fn close(&mut self, handle: Handle) -> KernelResult<ObjectRef> {
        self.entries
            .remove(&handle.0)
            .ok_or(KernelError::InvalidHandle(handle))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &ObjectRef)> {
        self.entries.iter().map(|(&h, obj)| (Handle(h), obj))
    }
}
