use ctr_mem::{
    AddressSpace, GuestBus, MappingFlags, MemoryConfig, MemoryError, ProcessSlots, SharedBuffer,
};

fn adjacent_pair() -> AddressSpace {
    let mut space = AddressSpace::default();
    space.add_mapping(0x1000, 0x10).unwrap();
    space.add_mapping(0x1010, 0x10).unwrap();
    space
}

#[test]
fn full_region_write_then_read_roundtrips() {
    let mut space = AddressSpace::default();
    space.add_mapping(0x0800_0000, 0x100).unwrap();

    let pattern: Vec<u8> = (0..0x100).map(|i| (i * 7) as u8).collect();
    space.write(0x0800_0000, &pattern).unwrap();

    let mut out = vec![0u8; 0x100];
    space.read(0x0800_0000, &mut out).unwrap();
    assert_eq!(out, pattern);
}

#[test]
fn overlapping_mapping_leaves_table_unchanged() {
    let mut space = AddressSpace::default();
    space.add_mapping(0x1000, 0x100).unwrap();
    space.write_u8(0x1080, 0x42).unwrap();
    let before: Vec<_> = space.mappings().collect();

    for (base, size) in [(0x1000, 0x100), (0x0F00, 0x101), (0x10FF, 1), (0x0800, 0x1000)] {
        assert!(matches!(
            space.add_mapping(base, size),
            Err(MemoryError::OverlapRejected {
                existing_base: 0x1000,
                existing_size: 0x100,
                ..
            })
        ));
    }

    assert_eq!(space.mappings().collect::<Vec<_>>(), before);
    assert_eq!(space.read_u8(0x1080).unwrap(), 0x42);
    space.add_mapping(0x1100, 0x100).unwrap();
}

#[test]
fn word_read_at_offset_one_rotates_by_one_byte() {
    let mut space = AddressSpace::default();
    space.add_segment(0x2000, 8, Some(&[0x11, 0x22, 0x33, 0x44])).unwrap();

    let aligned = space.read_u32(0x2000).unwrap();
    assert_eq!(aligned, 0x4433_2211);
    assert_eq!(space.read_u32(0x2001).unwrap(), aligned.rotate_left(8));
    assert_ne!(space.read_u32(0x2001).unwrap(), 0x0044_3322);
}

#[test]
fn straddling_bulk_access_matches_split_halves() {
    let mut split = adjacent_pair();
    split.write(0x100E, &[0xA1, 0xB2, 0xC3, 0xD4]).unwrap();

    let mut halves = adjacent_pair();
    halves.write(0x100E, &[0xA1, 0xB2]).unwrap();
    halves.write(0x1010, &[0xC3, 0xD4]).unwrap();

    let mut a = [0u8; 4];
    let mut b = [0u8; 4];
    split.read(0x100E, &mut a).unwrap();
    halves.read(0x100E, &mut b).unwrap();
    assert_eq!(a, [0xA1, 0xB2, 0xC3, 0xD4]);
    assert_eq!(a, b);

    assert_eq!(split.read_u16(0x100E).unwrap(), 0xB2A1);
    assert_eq!(split.read_u16(0x1010).unwrap(), 0xD4C3);
}

#[test]
fn shared_memory_survives_process_switch() {
    let block = SharedBuffer::new(0x1000);
    let mut slots = ProcessSlots::new(2, MemoryConfig::default());
    slots
        .active_mut()
        .add_mapping_shared(0x1000_0000, 0x1000, block.clone())
        .unwrap();
    slots.switch_to(1).unwrap();
    slots
        .active_mut()
        .add_mapping_shared(0x2000_0000, 0x1000, block.clone())
        .unwrap();

    slots.store32(0x2000_0000, 0xCAFE_F00D);
    slots.switch_to(0).unwrap();
    assert_eq!(slots.load32(0x1000_0000), 0xCAFE_F00D);
    assert_eq!(slots.load32(0x2000_0000), 0);
}

#[test]
fn loader_populates_then_protects() {
    let mut space = AddressSpace::default();
    space
        .add_segment(0x0010_0000, 0x10, Some(b"\x00\x00\xA0\xE3"))
        .unwrap();
    space
        .set_flags(0x0010_0000, MappingFlags::READ_ONLY)
        .unwrap();

    space.store32(0x0010_0000, 0);
    assert_eq!(space.load32(0x0010_0000), 0xE3A0_0000);
    assert!(space.mappings().all(|m| m.flags == MappingFlags::READ_ONLY));
}
