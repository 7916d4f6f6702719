#![cfg(not(target_arch = "wasm32"))]

use ctr_mem::{AddressSpace, MemoryError};
use proptest::prelude::*;

prop_compose! {
    fn arb_region()(base in 0u32..0x0010_0000, size in 1u32..0x400) -> (u32, u32) {
        (base, size)
    }
}

proptest! {
    #[test]
    fn written_bytes_read_back(
        (base, size) in arb_region(),
        seed in any::<u8>(),
    ) {
        let mut space = AddressSpace::default();
        space.add_mapping(base, size).unwrap();

        let data: Vec<u8> = (0..size).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect();
        space.write(base, &data).unwrap();

        let mut out = vec![0u8; size as usize];
        space.read(base, &mut out).unwrap();
        prop_assert_eq!(out, data);
    }

    #[test]
    fn accepted_mappings_never_overlap(regions in proptest::collection::vec(arb_region(), 1..24)) {
        let mut space = AddressSpace::default();
        for (base, size) in regions {
            let before = space.len();
            match space.add_mapping(base, size) {
                Ok(()) => prop_assert_eq!(space.len(), before + 1),
                Err(MemoryError::OverlapRejected { .. } | MemoryError::CapacityExceeded { .. }) => {
                    prop_assert_eq!(space.len(), before)
                }
                Err(e) => prop_assert!(false, "unexpected error {e}"),
            }
        }

        let maps: Vec<_> = space.mappings().collect();
        prop_assert!(maps.len() <= ctr_mem::MAX_MAPPINGS);
        for (i, a) in maps.iter().enumerate() {
            for b in &maps[i + 1..] {
                let a_end = u64::from(a.base) + u64::from(a.size);
                let b_end = u64::from(b.base) + u64::from(b.size);
                prop_assert!(a_end <= u64::from(b.base) || b_end <= u64::from(a.base));
            }
        }
    }

    #[test]
    fn misaligned_word_read_is_rotation_of_aligned_word(
        word in any::<u32>(),
        offset in 0u32..4,
    ) {
        let mut space = AddressSpace::default();
        space.add_mapping(0x4000, 8).unwrap();
        space.write_u32(0x4000, word).unwrap();
        prop_assert_eq!(space.read_u32(0x4000 + offset).unwrap(), word.rotate_left(8 * offset));
    }
}
