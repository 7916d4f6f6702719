use tracing::debug;

use crate::address_space::AddressSpace;
use crate::bus::GuestBus;
use crate::config::MemoryConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::mapping::Mapping;

/// Per-process mapping tables with one active [`AddressSpace`].
///
/// Switching moves the active table out into the current slot and the target slot's table in.
/// Backing storage is never copied, so the cost only depends on the number of mappings.
#[derive(Debug)]
pub struct ProcessSlots {
    active: AddressSpace,
    parked: Vec<Vec<Mapping>>,
    current: usize,
}

impl ProcessSlots {
    /// Creates `count` empty slots (at least one) sharing `config`. Slot 0 starts active.
    pub fn new(count: usize, config: MemoryConfig) -> Self {
        let count = count.max(1);
        Self {
            active: AddressSpace::new(config),
            parked: (0..count).map(|_| Vec::new()).collect(),
            current: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.parked.len()
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn active(&self) -> &AddressSpace {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut AddressSpace {
        &mut self.active
    }

    pub fn switch_to(&mut self, slot: usize) -> MemoryResult<()> {
        if slot >= self.parked.len() {
            return Err(MemoryError::InvalidProcessSlot {
                slot,
                count: self.parked.len(),
            });
        }
        if slot == self.current {
            return Ok(());
        }

        debug!("switching process slot {} -> {}", self.current, slot);
        self.parked[self.current] = self.active.take_mappings();
        let incoming = std::mem::take(&mut self.parked[slot]);
        self.active.restore_mappings(incoming);
        self.current = slot;
        Ok(())
    }
}

impl GuestBus for ProcessSlots {
    fn load8(&mut self, addr: u32) -> u8 {
        self.active.load8(addr)
    }

    fn load16(&mut self, addr: u32) -> u16 {
        self.active.load16(addr)
    }

    fn load32(&mut self, addr: u32) -> u32 {
        self.active.load32(addr)
    }

    fn store8(&mut self, addr: u32, val: u8) {
        self.active.store8(addr, val)
    }

    fn store16(&mut self, addr: u32, val: u16) {
        self.active.store16(addr, val)
    }

    fn store32(&mut self, addr: u32, val: u32) {
        self.active.store32(addr, val)
    }

    fn load_bytes(&mut self, addr: u32, buf: &mut [u8]) {
        self.active.load_bytes(addr, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switching_isolates_mapping_tables() {
        let mut slots = ProcessSlots::new(2, MemoryConfig::default());
        slots.active_mut().add_mapping(0x0010_0000, 0x1000).unwrap();
        slots.active_mut().write_u32(0x0010_0000, 0x1111_1111).unwrap();

        slots.switch_to(1).unwrap();
        assert!(slots.active().is_empty());
        slots.active_mut().add_mapping(0x0010_0000, 0x1000).unwrap();
        slots.active_mut().write_u32(0x0010_0000, 0x2222_2222).unwrap();

        slots.switch_to(0).unwrap();
        assert_eq!(slots.current(), 0);
        assert_eq!(slots.active().read_u32(0x0010_0000).unwrap(), 0x1111_1111);

        slots.switch_to(1).unwrap();
        assert_eq!(slots.active().read_u32(0x0010_0000).unwrap(), 0x2222_2222);
    }

    #[test]
    fn switching_to_the_current_slot_is_a_noop() {
        let mut slots = ProcessSlots::new(1, MemoryConfig::default());
        slots.active_mut().add_mapping(0x1000, 0x10).unwrap();
        slots.switch_to(0).unwrap();
        assert_eq!(slots.active().len(), 1);
    }

    #[test]
    fn out_of_range_slot_is_rejected() {
        let mut slots = ProcessSlots::new(2, MemoryConfig::default());
        assert_eq!(
            slots.switch_to(2),
            Err(MemoryError::InvalidProcessSlot { slot: 2, count: 2 })
        );
        assert_eq!(slots.current(), 0);
    }
}
