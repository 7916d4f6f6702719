//! Core of an ARM11 handheld console emulator.
//!
//! [`Emulator`] ties together the guest address spaces ([`ctr_mem`]) and the emulated kernel
//! ([`ctr_kernel`]). The host drives a CPU core and a scheduler and calls [`Emulator::svc`] each
//! time the guest executes `SVC`. Archives backed by host directories come from [`ctr_fs`].

mod config;
mod emulator;

pub use config::{ConfigError, EmulatorConfig, DEFAULT_PROCESS_SLOTS};
pub use emulator::Emulator;

pub use ctr_fs;
pub use ctr_kernel;
pub use ctr_mem;

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Guest debug output is logged on the `ctr_kernel::guest` target and per-region access tracing
/// on `ctr_mem::watch`, e.g. `RUST_LOG=info,ctr_mem::watch=debug`. Calling this more than once is
/// harmless; only the first subscriber is installed.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
