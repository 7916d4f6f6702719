use std::io;
use std::path::{Path, PathBuf};

use ctr_kernel::{DispatchOutcome, GuestCpu, Kernel, Scheduler};
use ctr_mem::{dump_mappings, AddressSpace, MemoryResult, ProcessSlots};
use tracing::{debug, info};

use crate::config::EmulatorConfig;

/// Owns the guest address spaces and the kernel that services their syscalls.
///
/// The CPU core and the scheduler stay with the host; they are lent to [`Emulator::svc`] for the
/// duration of a single supervisor call.
#[derive(Debug)]
pub struct Emulator {
    slots: ProcessSlots,
    kernel: Kernel,
}

impl Emulator {
    pub fn new(config: EmulatorConfig) -> Self {
        debug!(
            "emulator: {} process slot(s), {} mappings each",
            config.process_slots.max(1),
            config.memory.max_mappings
        );
        Self {
            slots: ProcessSlots::new(config.process_slots, config.memory),
            kernel: Kernel::new(config.kernel),
        }
    }

    /// Address space of the running process.
    pub fn memory(&self) -> &AddressSpace {
        self.slots.active()
    }

    pub fn memory_mut(&mut self) -> &mut AddressSpace {
        self.slots.active_mut()
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut Kernel {
        &mut self.kernel
    }

    pub fn current_process(&self) -> usize {
        self.slots.current()
    }

    /// Services supervisor call `num` against the running process.
    pub fn svc(
        &mut self,
        num: u8,
        cpu: &mut dyn GuestCpu,
        sched: &mut dyn Scheduler,
    ) -> DispatchOutcome {
        self.kernel.dispatch(num, cpu, self.slots.active_mut(), sched)
    }

    /// Makes `slot` the running process. Its mapping table becomes visible to the CPU and to
    /// syscalls; the previous one is kept intact.
    pub fn switch_process(&mut self, slot: usize) -> MemoryResult<()> {
        let from = self.slots.current();
        self.slots.switch_to(slot)?;
        if from != slot {
            info!("switched process {from} -> {slot}");
        }
        Ok(())
    }

    /// Writes every mapping of the running process to `dir`, one file per region.
    pub fn dump_memory(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        dump_mappings(self.slots.active(), dir)
    }
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new(EmulatorConfig::default())
    }
}
