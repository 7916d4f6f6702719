#![cfg(not(target_arch = "wasm32"))]

use std::collections::BTreeSet;

use ctr_kernel::{Event, Handle, HandleTable, KernelObject, ResetType};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Create,
    Duplicate(usize),
    Close(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Create),
        1 => any::<usize>().prop_map(Op::Duplicate),
        2 => any::<usize>().prop_map(Op::Close),
    ]
}

proptest! {
    #[test]
    fn live_handles_are_unique_and_closed_ones_stay_invalid(ops in proptest::collection::vec(arb_op(), 1..64)) {
        let mut table = HandleTable::new(1024);
        let mut live: Vec<Handle> = Vec::new();
        let mut closed: BTreeSet<Handle> = BTreeSet::new();

        for op in ops {
            match op {
                Op::Create => {
                    let h = table.insert(KernelObject::Event(Event::new(ResetType::Sticky))).unwrap();
                    prop_assert!(h.raw() >= Handle::FIRST.raw());
                    prop_assert!(!live.contains(&h));
                    closed.remove(&h);
                    live.push(h);
                }
                Op::Duplicate(i) if !live.is_empty() => {
                    let src = live[i % live.len()];
                    let h = table.duplicate(src).unwrap();
                    prop_assert!(!live.contains(&h));
                    closed.remove(&h);
                    live.push(h);
                }
                Op::Close(i) if !live.is_empty() => {
                    let h = live.swap_remove(i % live.len());
                    table.close(h).unwrap();
                    closed.insert(h);
                }
                _ => {}
            }

            prop_assert_eq!(table.len(), live.len());
            for h in &live {
                prop_assert!(table.get(*h).is_ok());
            }
            for h in &closed {
                prop_assert!(table.get(*h).is_err());
            }
        }
    }
}
