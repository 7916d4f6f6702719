//! Guest physical memory for an ARM11 handheld.
//!
//! An [`AddressSpace`] is a sparse set of non-overlapping regions with the bus quirks the guest
//! relies on: misaligned word loads rotate the containing word, and bulk transfers are split at
//! region boundaries. [`ProcessSlots`] keeps one mapping table per guest process and swaps the
//! active one in place.

mod address_space;
mod bus;
mod config;
mod dump;
mod error;
mod mapping;
mod slots;

pub use address_space::AddressSpace;
pub use bus::GuestBus;
pub use config::{MemoryConfig, PcCell, UnmappedPolicy, WatchRule, DEFAULT_WATCH_RULES, MAX_MAPPINGS};
pub use dump::dump_mappings;
pub use error::{MemoryError, MemoryResult};
pub use mapping::{AccessKind, MappingFlags, MappingInfo, RawView, RawViewMut, SharedBuffer};
pub use slots::ProcessSlots;
