use tracing::{debug, error, warn};

use crate::config::{MemoryConfig, PcCell, UnmappedPolicy};
use crate::error::{MemoryError, MemoryResult};
use crate::mapping::{
    AccessKind, Backing, Mapping, MappingFlags, MappingInfo, RawView, RawViewMut, SharedBuffer,
};

/// A flat 32-bit guest physical address space made of non-overlapping regions.
///
/// Regions are kept in insertion order and searched linearly; the table is small and bounded by
/// [`MemoryConfig::max_mappings`]. Accesses must be fully contained in one region, except bulk
/// [`read`](Self::read)/[`write`](Self::write) transfers which are split at region boundaries.
#[derive(Debug)]
pub struct AddressSpace {
    config: MemoryConfig,
    mappings: Vec<Mapping>,
    pc: PcCell,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

impl AddressSpace {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            mappings: Vec::new(),
            pc: PcCell::new(),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Handle the CPU core updates with its program counter.
    pub fn pc_cell(&self) -> PcCell {
        self.pc.clone()
    }

    pub fn set_pc_cell(&mut self, pc: PcCell) {
        self.pc = pc;
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn mappings(&self) -> impl Iterator<Item = MappingInfo> + '_ {
        self.mappings.iter().map(Mapping::info)
    }

    /// Registers a zero-filled region owned by the address space.
    ///
    /// `size == 0` succeeds without creating a region.
    pub fn add_mapping(&mut self, base: u32, size: u32) -> MemoryResult<()> {
        if size == 0 {
            return Ok(());
        }
        self.check_candidate(base, size)?;

        let mut data = Vec::new();
        if data.try_reserve_exact(size as usize).is_err() {
            error!("failed to allocate 0x{size:08x} bytes for mapping at 0x{base:08x}");
            return Err(MemoryError::AllocationFailed { base, size });
        }
        data.resize(size as usize, 0);

        self.push(base, size, Backing::Owned(data.into_boxed_slice()));
        Ok(())
    }

    /// Registers a region backed by `buffer`. The caller keeps ownership of the storage.
    pub fn add_mapping_shared(
        &mut self,
        base: u32,
        size: u32,
        buffer: SharedBuffer,
    ) -> MemoryResult<()> {
        if size == 0 {
            return Ok(());
        }
        self.check_candidate(base, size)?;
        let available = buffer.len();
        if available < size as usize {
            return Err(MemoryError::BufferTooSmall { size, available });
        }

        self.push(base, size, Backing::Shared(buffer));
        Ok(())
    }

    /// [`add_mapping`](Self::add_mapping) followed by a copy of `data` into the new region.
    ///
    /// At most `size` bytes are copied; a shorter `data` leaves the tail zeroed.
    pub fn add_segment(&mut self, base: u32, size: u32, data: Option<&[u8]>) -> MemoryResult<()> {
        debug!("adding segment 0x{base:08x} size=0x{size:08x}");
        self.add_mapping(base, size)?;

        if let (Some(data), Some(mapping)) = (data, self.mappings.last_mut()) {
            if size != 0 {
                let len = data.len().min(size as usize);
                mapping.with_bytes_mut(0, len, |dst| dst.copy_from_slice(&data[..len]));
            }
        }
        Ok(())
    }

    /// Replaces the flags of the mapping starting at `base`.
    pub fn set_flags(&mut self, base: u32, flags: MappingFlags) -> MemoryResult<()> {
        let mapping = self
            .mappings
            .iter_mut()
            .find(|m| m.base == base)
            .ok_or(MemoryError::NoSuchMapping { base })?;
        mapping.flags = flags;
        Ok(())
    }

    /// True if a single mapping contains `[addr, addr + len)`.
    pub fn is_mapped(&self, addr: u32, len: usize) -> bool {
        self.find(addr, len).is_some()
    }

    pub fn read_u8(&self, addr: u32) -> MemoryResult<u8> {
        let m = self.lookup(addr, 1, AccessKind::Read)?;
        let value = m.with_bytes((addr - m.base) as usize, 1, |b| b[0]);
        self.watch(m, AccessKind::Read, 8, addr, u32::from(value));
        Ok(value)
    }

    pub fn read_u16(&self, addr: u32) -> MemoryResult<u16> {
        let m = self.lookup(addr, 2, AccessKind::Read)?;
        let value = m.with_bytes((addr - m.base) as usize, 2, |b| {
            u16::from_le_bytes([b[0], b[1]])
        });
        self.watch(m, AccessKind::Read, 16, addr, u32::from(value));
        Ok(value)
    }

    /// Word load with the ARM11 bus behaviour for misaligned addresses.
    ///
    /// The word at the 4-byte unit containing `addr` is fetched little-endian and rotated left by
    /// `8 * (addr & 3)` bits. The result is *not* the four bytes starting at `addr`.
    pub fn read_u32(&self, addr: u32) -> MemoryResult<u32> {
        let m = self.lookup(addr, 4, AccessKind::Read)?;
        let off = (addr - m.base) as usize;
        let rot = addr & 3;
        let unit = match off.checked_sub(rot as usize) {
            Some(unit) => unit,
            // Aligned unit starts before an unaligned mapping base.
            None => return Err(self.unmapped(addr, 4, AccessKind::Read)),
        };
        let word = m.with_bytes(unit, 4, |b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]));
        let value = word.rotate_left(8 * rot);
        self.watch(m, AccessKind::Read, 32, addr, value);
        Ok(value)
    }

    pub fn write_u8(&mut self, addr: u32, value: u8) -> MemoryResult<()> {
        self.store(addr, &[value], 8, u32::from(value))
    }

    pub fn write_u16(&mut self, addr: u32, value: u16) -> MemoryResult<()> {
        self.store(addr, &value.to_le_bytes(), 16, u32::from(value))
    }

    /// Word store. Misaligned stores write the four bytes little-endian starting at `addr`.
    pub fn write_u32(&mut self, addr: u32, value: u32) -> MemoryResult<()> {
        self.store(addr, &value.to_le_bytes(), 32, value)
    }

    /// Bulk read into `buf`, splitting across adjacent regions when needed.
    pub fn read(&self, addr: u32, buf: &mut [u8]) -> MemoryResult<()> {
        if buf.is_empty() {
            return Ok(());
        }

        let mut first_region = None;
        for m in &self.mappings {
            if m.contains(addr, buf.len()) {
                m.with_bytes((addr - m.base) as usize, buf.len(), |src| {
                    buf.copy_from_slice(src)
                });
                return Ok(());
            }
            if m.contains(addr, 1) {
                first_region = Some(m.end());
            }
        }

        let Some(end) = first_region else {
            return Err(self.unmapped(addr, buf.len(), AccessKind::Read));
        };
        let head_len = (end - u64::from(addr)) as usize;
        let Ok(next) = u32::try_from(end) else {
            return Err(self.unmapped(addr, buf.len(), AccessKind::Read));
        };
        let (head, tail) = buf.split_at_mut(head_len);
        self.read(addr, head)?;
        self.read(next, tail)
    }

    /// Bulk write from `buf`, splitting across adjacent regions when needed.
    ///
    /// When the second piece fails the first piece has already been written.
    pub fn write(&mut self, addr: u32, buf: &[u8]) -> MemoryResult<()> {
        if buf.is_empty() {
            return Ok(());
        }

        let mut first_region = None;
        let mut full = None;
        for (idx, m) in self.mappings.iter().enumerate() {
            if m.contains(addr, buf.len()) {
                full = Some(idx);
                break;
            }
            if m.contains(addr, 1) {
                first_region = Some(m.end());
            }
        }

        if let Some(idx) = full {
            self.check_writable(idx, addr, buf.len())?;
            let m = &mut self.mappings[idx];
            let off = (addr - m.base) as usize;
            m.with_bytes_mut(off, buf.len(), |dst| dst.copy_from_slice(buf));
            return Ok(());
        }

        let Some(end) = first_region else {
            return Err(self.unmapped(addr, buf.len(), AccessKind::Write));
        };
        let head_len = (end - u64::from(addr)) as usize;
        let Ok(next) = u32::try_from(end) else {
            return Err(self.unmapped(addr, buf.len(), AccessKind::Write));
        };
        let (head, tail) = buf.split_at(head_len);
        self.write(addr, head)?;
        self.write(next, tail)
    }

    /// Direct view of `size` bytes at `addr` for trusted consumers (display sampling, dumps).
    pub fn raw(&self, addr: u32, size: usize) -> MemoryResult<RawView<'_>> {
        let m = self.lookup(addr, size, AccessKind::Read)?;
        let off = (addr - m.base) as usize;
        Ok(match &m.backing {
            Backing::Owned(data) => RawView::Owned(&data[off..off + size]),
            Backing::Shared(buf) => {
                RawView::Shared(std::cell::Ref::map(buf.borrow(), |b| &b[off..off + size]))
            }
        })
    }

    /// Mutable direct view; refused for read-only mappings.
    pub fn raw_mut(&mut self, addr: u32, size: usize) -> MemoryResult<RawViewMut<'_>> {
        let idx = match self.find(addr, size) {
            Some(idx) => idx,
            None => return Err(self.unmapped(addr, size, AccessKind::Write)),
        };
        self.check_writable(idx, addr, size)?;
        let m = &mut self.mappings[idx];
        let off = (addr - m.base) as usize;
        Ok(match &mut m.backing {
            Backing::Owned(data) => RawViewMut::Owned(&mut data[off..off + size]),
            Backing::Shared(buf) => RawViewMut::Shared(std::cell::RefMut::map(
                buf.borrow_mut(),
                |b| &mut b[off..off + size],
            )),
        })
    }

    pub(crate) fn take_mappings(&mut self) -> Vec<Mapping> {
        std::mem::take(&mut self.mappings)
    }

    pub(crate) fn restore_mappings(&mut self, mappings: Vec<Mapping>) {
        self.mappings = mappings;
    }

    fn check_candidate(&self, base: u32, size: u32) -> MemoryResult<()> {
        if self.mappings.len() >= self.config.max_mappings {
            error!("too many mappings (max {})", self.config.max_mappings);
            return Err(MemoryError::CapacityExceeded {
                max: self.config.max_mappings,
            });
        }
        if u64::from(base) + u64::from(size) > 1 << 32 {
            error!("mapping 0x{base:08x} size=0x{size:08x} wraps the address space");
            return Err(MemoryError::AddressOverflow { base, size });
        }
        if let Some(existing) = self.mappings.iter().find(|m| m.overlaps(base, size)) {
            error!("trying to add overlapping mapping 0x{base:08x}, size=0x{size:08x}");
            return Err(MemoryError::OverlapRejected {
                base,
                size,
                existing_base: existing.base,
                existing_size: existing.size,
            });
        }
        Ok(())
    }

    fn push(&mut self, base: u32, size: u32, backing: Backing) {
        let mut flags = MappingFlags::empty();
        if self.config.watch.iter().any(|rule| rule.matches(base)) {
            flags |= MappingFlags::WATCH;
        }
        self.mappings.push(Mapping {
            base,
            size,
            flags,
            backing,
        });
    }

    #[inline]
    fn find(&self, addr: u32, len: usize) -> Option<usize> {
        self.mappings.iter().position(|m| m.contains(addr, len))
    }

    fn lookup(&self, addr: u32, len: usize, kind: AccessKind) -> MemoryResult<&Mapping> {
        match self.find(addr, len) {
            Some(idx) => Ok(&self.mappings[idx]),
            None => Err(self.unmapped(addr, len, kind)),
        }
    }

    fn store(&mut self, addr: u32, bytes: &[u8], width: u8, value: u32) -> MemoryResult<()> {
        let idx = match self.find(addr, bytes.len()) {
            Some(idx) => idx,
            None => return Err(self.unmapped(addr, bytes.len(), AccessKind::Write)),
        };
        self.check_writable(idx, addr, bytes.len())?;
        self.watch(&self.mappings[idx], AccessKind::Write, width, addr, value);

        let m = &mut self.mappings[idx];
        let off = (addr - m.base) as usize;
        m.with_bytes_mut(off, bytes.len(), |dst| dst.copy_from_slice(bytes));
        Ok(())
    }

    fn check_writable(&self, idx: usize, addr: u32, len: usize) -> MemoryResult<()> {
        if self.mappings[idx].flags.contains(MappingFlags::READ_ONLY) {
            warn!(
                "rejected write of {len} bytes to read-only 0x{addr:08x} (pc=0x{:08x})",
                self.pc.get()
            );
            return Err(MemoryError::ReadOnly { addr, len });
        }
        Ok(())
    }

    fn watch(&self, m: &Mapping, kind: AccessKind, width: u8, addr: u32, value: u32) {
        if m.flags.contains(MappingFlags::WATCH) {
            debug!(
                target: "ctr_mem::watch",
                "{kind}{width} 0x{addr:08x} value=0x{value:x} pc=0x{:08x}",
                self.pc.get()
            );
        }
    }

    fn unmapped(&self, addr: u32, len: usize, kind: AccessKind) -> MemoryError {
        error!(
            "trying to {kind} {len} bytes at unmapped addr 0x{addr:08x} (pc=0x{:08x})",
            self.pc.get()
        );
        if self.config.unmapped == UnmappedPolicy::Abort {
            error!("unmapped access policy is abort; terminating");
            std::process::exit(1);
        }
        MemoryError::UnmappedAccess { addr, len, kind }
    }
}
