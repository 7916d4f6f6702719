use crate::address_space::AddressSpace;

/// Infallible guest memory access as seen by the CPU core.
///
/// Faults are already logged by the address space (and under
/// [`UnmappedPolicy::Abort`](crate::UnmappedPolicy::Abort) never return); on this layer an
/// unmapped or rejected load yields `0` and a rejected store is dropped.
pub trait GuestBus {
    fn load8(&mut self, addr: u32) -> u8;
    fn load16(&mut self, addr: u32) -> u16;
    fn load32(&mut self, addr: u32) -> u32;

    fn store8(&mut self, addr: u32, val: u8);
    fn store16(&mut self, addr: u32, val: u16);
    fn store32(&mut self, addr: u32, val: u32);

    /// Bulk load; bytes of a failed transfer read as zero.
    fn load_bytes(&mut self, addr: u32, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.load8(addr.wrapping_add(i as u32));
        }
    }
}

impl GuestBus for AddressSpace {
    #[inline]
    fn load8(&mut self, addr: u32) -> u8 {
        self.read_u8(addr).unwrap_or(0)
    }

    #[inline]
    fn load16(&mut self, addr: u32) -> u16 {
        self.read_u16(addr).unwrap_or(0)
    }

    #[inline]
    fn load32(&mut self, addr: u32) -> u32 {
        self.read_u32(addr).unwrap_or(0)
    }

    #[inline]
    fn store8(&mut self, addr: u32, val: u8) {
        let _ = self.write_u8(addr, val);
    }

    #[inline]
    fn store16(&mut self, addr: u32, val: u16) {
        let _ = self.write_u16(addr, val);
    }

    #[inline]
    fn store32(&mut self, addr: u32, val: u32) {
        let _ = self.write_u32(addr, val);
    }

    fn load_bytes(&mut self, addr: u32, buf: &mut [u8]) {
        if self.read(addr, buf).is_err() {
            buf.fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_loads_read_zero_and_stores_are_dropped() {
        let mut space = AddressSpace::default();
        space.add_mapping(0x1000, 0x10).unwrap();

        space.store32(0x2000, 0xFFFF_FFFF);
        assert_eq!(space.load32(0x2000), 0);
        assert_eq!(space.load8(0x100F), 0);

        space.store16(0x100E, 0xBEEF);
        assert_eq!(space.load16(0x100E), 0xBEEF);
    }

    #[test]
    fn bulk_load_zero_fills_on_fault() {
        let mut space = AddressSpace::default();
        space.add_segment(0x1000, 4, Some(&[1, 2, 3, 4])).unwrap();

        let mut buf = [0xAAu8; 8];
        space.load_bytes(0x1000, &mut buf);
        assert_eq!(buf, [0; 8]);

        let mut buf = [0u8; 4];
        space.load_bytes(0x1000, &mut buf);
        assert_eq!(buf, [1, 2, 3, 4]);
    }
}
