use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Default size of the region table.
pub const MAX_MAPPINGS: usize = 16;

/// What to do when the guest touches an address no mapping covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedPolicy {
    /// Log the access and report `UnmappedAccess`; the CPU-facing bus reads zero and drops writes.
    #[default]
    Log,
    /// Log the access and terminate the host process.
    Abort,
}

/// Selects mappings that get [`MappingFlags::WATCH`](crate::MappingFlags::WATCH) when they are
/// created: `mapping.base & mask == base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRule {
    pub base: u32,
    pub mask: u32,
}

impl WatchRule {
    pub const fn exact(base: u32) -> Self {
        Self {
            base,
            mask: 0xFFFF_FFFF,
        }
    }

    #[inline]
    pub fn matches(&self, mapping_base: u32) -> bool {
        mapping_base & self.mask == self.base
    }
}

/// AXI WRAM pages, the IO window and the linear FCRAM heap.
pub const DEFAULT_WATCH_RULES: [WatchRule; 3] = [
    WatchRule {
        base: 0x1FF8_0000,
        mask: 0xFFFF_0000,
    },
    WatchRule::exact(0x1000_0000),
    WatchRule::exact(0x1400_0000),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub max_mappings: usize,
    pub unmapped: UnmappedPolicy,
    pub watch: Vec<WatchRule>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_mappings: MAX_MAPPINGS,
            unmapped: UnmappedPolicy::Log,
            watch: Vec::new(),
        }
    }
}

impl MemoryConfig {
    pub fn max_mappings(mut self, max: usize) -> Self {
        self.max_mappings = max;
        self
    }

    pub fn unmapped(mut self, policy: UnmappedPolicy) -> Self {
        self.unmapped = policy;
        self
    }

    pub fn watch(mut self, rule: WatchRule) -> Self {
        self.watch.push(rule);
        self
    }
}

/// Program counter published by the CPU core for watch and fault logging.
#[derive(Debug, Clone, Default)]
pub struct PcCell(Rc<Cell<u32>>);

impl PcCell {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn set(&self, pc: u32) {
        self.0.set(pc);
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_watch_rules_cover_wram_io_and_heap() {
        let [wram, io, heap] = DEFAULT_WATCH_RULES;
        assert!(wram.matches(0x1FF8_0000));
        assert!(wram.matches(0x1FF8_1000));
        assert!(!wram.matches(0x1FF0_0000));
        assert!(io.matches(0x1000_0000));
        assert!(!io.matches(0x1000_1000));
        assert!(heap.matches(0x1400_0000));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: MemoryConfig = serde_json::from_str(r#"{ "unmapped": "abort" }"#).unwrap();
        assert_eq!(cfg.unmapped, UnmappedPolicy::Abort);
        assert_eq!(cfg.max_mappings, MAX_MAPPINGS);
        assert!(cfg.watch.is_empty());
    }

    #[test]
    fn pc_cell_clones_share_state() {
        let pc = PcCell::new();
        let cpu_side = pc.clone();
        cpu_side.set(0x0010_0040);
        assert_eq!(pc.get(), 0x0010_0040);
    }
}
