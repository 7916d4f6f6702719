use core::fmt;
use std::cell::{Ref, RefCell, RefMut};
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use bitflags::bitflags;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::Read => write!(f, "read"),
            AccessKind::Write => write!(f, "write"),
        }
    }
}

bitflags! {
    /// Per-mapping attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MappingFlags: u8 {
        /// Guest writes are rejected with [`MemoryError::ReadOnly`](crate::MemoryError::ReadOnly).
        const READ_ONLY = 1 << 0;
        /// Every access is logged on the `ctr_mem::watch` target together with the guest PC.
        const WATCH = 1 << 1;
    }
}

/// Backing store owned by the caller and lent to an address space.
///
/// The address space keeps a clone of the handle; the bytes live as long as any clone does, so
/// dropping the mapping table never frees memory the caller still uses (VRAM shared with a display
/// sampler, kernel shared-memory blocks, ...).
///
/// Accesses borrow the buffer for the duration of a single load/store. Holding a
/// [`borrow_mut`](Self::borrow_mut) guard while the guest runs is a logic error and panics on the
/// next guest access.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    inner: Rc<RefCell<Box<[u8]>>>,
}

impl SharedBuffer {
    pub fn new(len: usize) -> Self {
        Self::from_vec(vec![0u8; len])
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(bytes.into_boxed_slice())),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn borrow(&self) -> Ref<'_, [u8]> {
        Ref::map(self.inner.borrow(), |b| &**b)
    }

    pub fn borrow_mut(&self) -> RefMut<'_, [u8]> {
        RefMut::map(self.inner.borrow_mut(), |b| &mut **b)
    }

    /// Returns true if both handles refer to the same storage.
    pub fn ptr_eq(&self, other: &SharedBuffer) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("len", &self.len())
            .field("refs", &Rc::strong_count(&self.inner))
            .finish()
    }
}

#[derive(Debug)]
pub(crate) enum Backing {
    Owned(Box<[u8]>),
    Shared(SharedBuffer),
}

/// One entry of the region table.
#[derive(Debug)]
pub(crate) struct Mapping {
    pub(crate) base: u32,
    pub(crate) size: u32,
    pub(crate) flags: MappingFlags,
    pub(crate) backing: Backing,
}

impl Mapping {
    #[inline]
    pub(crate) fn end(&self) -> u64 {
        u64::from(self.base) + u64::from(self.size)
    }

    /// True if `[addr, addr + len)` lies entirely inside this mapping.
    #[inline]
    pub(crate) fn contains(&self, addr: u32, len: usize) -> bool {
        let start = u64::from(addr);
        match start.checked_add(len as u64) {
            Some(end) => u64::from(self.base) <= start && end <= self.end(),
            None => false,
        }
    }

    /// Half-open interval intersection with `[base, base + size)`.
    #[inline]
    pub(crate) fn overlaps(&self, base: u32, size: u32) -> bool {
        let other_end = u64::from(base) + u64::from(size);
        u64::from(self.base) < other_end && u64::from(base) < self.end()
    }

    pub(crate) fn with_bytes<R>(&self, off: usize, len: usize, f: impl FnOnce(&[u8]) -> R) -> R {
        match &self.backing {
            Backing::Owned(data) => f(&data[off..off + len]),
            Backing::Shared(buf) => f(&buf.borrow()[off..off + len]),
        }
    }

    pub(crate) fn with_bytes_mut<R>(
        &mut self,
        off: usize,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> R {
        match &mut self.backing {
            Backing::Owned(data) => f(&mut data[off..off + len]),
            Backing::Shared(buf) => f(&mut buf.borrow_mut()[off..off + len]),
        }
    }

    pub(crate) fn info(&self) -> MappingInfo {
        MappingInfo {
            base: self.base,
            size: self.size,
            flags: self.flags,
            shared: matches!(self.backing, Backing::Shared(_)),
        }
    }
}

/// Diagnostic snapshot of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingInfo {
    pub base: u32,
    pub size: u32,
    pub flags: MappingFlags,
    /// Backed by a caller-owned [`SharedBuffer`].
    pub shared: bool,
}

/// Read view into a single mapping's storage, returned by
/// [`AddressSpace::raw`](crate::AddressSpace::raw).
pub enum RawView<'a> {
    Owned(&'a [u8]),
    Shared(Ref<'a, [u8]>),
}

impl Deref for RawView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            RawView::Owned(bytes) => bytes,
            RawView::Shared(bytes) => bytes,
        }
    }
}

/// Write view into a single writable mapping's storage.
pub enum RawViewMut<'a> {
    Owned(&'a mut [u8]),
    Shared(RefMut<'a, [u8]>),
}

impl Deref for RawViewMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            RawViewMut::Owned(bytes) => bytes,
            RawViewMut::Shared(bytes) => bytes,
        }
    }
}

impl DerefMut for RawViewMut<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match self {
            RawViewMut::Owned(bytes) => bytes,
            RawViewMut::Shared(bytes) => bytes,
        }
    }
}
