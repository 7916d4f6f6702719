//! Supervisor call dispatch.
//!
//! Every path through [`Kernel::dispatch`] ends with a write to r0: `0` on success, the guest
//! result code of the [`KernelError`] on failure, and `0` for syscalls without a handler.

mod debug;
pub(crate) mod ipc;
mod memory;
mod sync;
mod thread;
mod wait;

use std::collections::{BTreeMap, HashMap};
use std::cell::RefCell;
use std::rc::Rc;

use ctr_mem::AddressSpace;
use tracing::{debug, error, warn};

use crate::config::{KernelConfig, UnknownSyscallPolicy};
use crate::cpu::GuestCpu;
use crate::error::{result, KernelError};
use crate::halt::{DiagnosticHalt, HaltReport, LogHalt};
use crate::handle::{HandleTable, ObjectRef};
use crate::names::syscall_name;
use crate::object::PortState;
use crate::scheduler::{Scheduler, ThreadId};

use wait::PendingWait;

/// Why guest execution stopped for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    ExitProcess,
    Break { reason: u32 },
}

/// Result of one dispatched syscall, for the host loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler ran; r0 holds its result code.
    Completed,
    /// The calling thread stopped (wait, sleep, exit). The quantum was ended.
    Suspended,
    /// A placeholder handler ran; r0 is `0` but no real kernel semantics were applied.
    Stubbed,
    /// No handler exists; r0 is `0` and the halt hook was notified.
    Halted,
    /// The guest process is gone. No further syscalls are serviced.
    Terminated(TerminationReason),
}

impl DispatchOutcome {
    pub fn is_terminated(&self) -> bool {
        matches!(self, DispatchOutcome::Terminated(_))
    }
}

/// What a handler hands back to the dispatcher: the r0 value and the outcome.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SvcReply {
    r0: u32,
    outcome: DispatchOutcome,
}

impl SvcReply {
    pub(crate) fn with_r0(r0: u32) -> Self {
        Self {
            r0,
            outcome: DispatchOutcome::Completed,
        }
    }
}

impl From<DispatchOutcome> for SvcReply {
    fn from(outcome: DispatchOutcome) -> Self {
        Self {
            r0: result::SUCCESS,
            outcome,
        }
    }
}

pub(crate) type SvcResult = Result<SvcReply, KernelError>;

/// Collaborators borrowed for the duration of one syscall.
pub(crate) struct SvcContext<'a> {
    pub cpu: &'a mut dyn GuestCpu,
    pub mem: &'a mut AddressSpace,
    pub sched: &'a mut dyn Scheduler,
}

/// Emulated kernel state for one guest process.
pub struct Kernel {
    config: KernelConfig,
    handles: HandleTable,
    ports: BTreeMap<String, Rc<RefCell<PortState>>>,
    linear_next: u32,
    console: Vec<u8>,
    halt: Box<dyn DiagnosticHalt>,
    waits: HashMap<ThreadId, PendingWait>,
    arbiter_waits: HashMap<ThreadId, (ObjectRef, u32)>,
    termination: Option<TerminationReason>,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            handles: HandleTable::new(config.max_handles),
            linear_next: config.linear_heap_base,
            config,
            ports: BTreeMap::new(),
            console: Vec::new(),
            halt: Box::new(LogHalt),
            waits: HashMap::new(),
            arbiter_waits: HashMap::new(),
            termination: None,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub fn handles_mut(&mut self) -> &mut HandleTable {
        &mut self.handles
    }

    /// Replaces the hook notified about syscalls without a handler.
    pub fn set_halt_hook(&mut self, hook: Box<dyn DiagnosticHalt>) {
        self.halt = hook;
    }

    pub fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }

    pub fn termination(&self) -> Option<TerminationReason> {
        self.termination
    }

    /// Services syscall `num` for the thread currently running on `cpu`.
    pub fn dispatch(
        &mut self,
        num: u8,
        cpu: &mut dyn GuestCpu,
        mem: &mut AddressSpace,
        sched: &mut dyn Scheduler,
    ) -> DispatchOutcome {
        if let Some(reason) = self.termination {
            cpu.stop_quantum();
            return DispatchOutcome::Terminated(reason);
        }

        let name = syscall_name(num);
        debug!("-- svc{name} (0x{num:02x}) pc=0x{:08x} --", cpu.pc());

        let mut ctx = SvcContext { cpu, mem, sched };
        let result = match num {
            0x01 => self.svc_control_memory(&mut ctx),
            0x02 => self.svc_query_memory(&mut ctx),
            0x03 => Ok(self.terminate(&mut ctx, TerminationReason::ExitProcess)),
            0x08 => self.svc_create_thread(&mut ctx),
            0x09 => self.svc_exit_thread(&mut ctx),
            0x0A => self.svc_sleep_thread(&mut ctx),
            0x13 => self.svc_create_mutex(&mut ctx),
            0x14 => self.svc_release_mutex(&mut ctx),
            0x15 => self.svc_create_semaphore(&mut ctx),
            0x16 => self.svc_release_semaphore(&mut ctx),
            0x17 => self.svc_create_event(&mut ctx),
            0x18 => self.svc_signal_event(&mut ctx),
            0x19 => self.svc_clear_event(&mut ctx),
            0x1F => self.svc_map_memory_block(&mut ctx),
            0x21 => self.svc_create_address_arbiter(&mut ctx),
            0x22 => self.svc_arbitrate_address(&mut ctx),
            0x23 => self.svc_close_handle(&mut ctx),
            0x24 => self.svc_wait_synchronization1(&mut ctx),
            0x25 => self.svc_wait_synchronization_n(&mut ctx),
            0x27 => self.svc_duplicate_handle(&mut ctx),
            0x28 => self.svc_get_system_tick(&mut ctx),
            0x2D => self.svc_connect_to_port(&mut ctx),
            0x2E..=0x32 => self.svc_send_sync_request(&mut ctx),
            0x38 => self.svc_get_resource_limit(&mut ctx),
            0x39 | 0x3A => self.svc_get_resource_limit_values(&mut ctx, num),
            0x3C => {
                let reason = ctx.cpu.reg(0);
                error!("guest called Break (reason {reason}) at pc=0x{:08x}", ctx.cpu.pc());
                Ok(self.terminate(&mut ctx, TerminationReason::Break { reason }))
            }
            0x3D => self.svc_output_debug_string(&mut ctx),
            0x47 => self.svc_create_port(&mut ctx),
            0x48 => self.svc_create_session_to_port(&mut ctx),
            0x49 => self.svc_create_session(&mut ctx),
            0x4A => self.svc_accept_session(&mut ctx),
            0xFF if self.config.debug_putchar => self.svc_debug_putchar(&mut ctx),
            _ => return self.unknown(num, ctx.cpu),
        };

        match result {
            Ok(reply) => {
                ctx.cpu.set_reg(0, reply.r0);
                reply.outcome
            }
            Err(err) => {
                warn!("svc{name} failed: {err}");
                ctx.cpu.set_reg(0, err.result_code());
                DispatchOutcome::Completed
            }
        }
    }

    fn terminate(&mut self, ctx: &mut SvcContext<'_>, reason: TerminationReason) -> SvcReply {
        debug!("guest process terminated: {reason:?}");
        self.termination = Some(reason);
        ctx.cpu.stop_quantum();
        DispatchOutcome::Terminated(reason).into()
    }

    fn unknown(&mut self, num: u8, cpu: &mut dyn GuestCpu) -> DispatchOutcome {
        let name = syscall_name(num);
        error!("{}", KernelError::UnknownSyscall { num, name });

        cpu.set_reg(0, 0);
        self.halt.halt(&HaltReport {
            num,
            name,
            pc: cpu.pc(),
            regs: cpu.regs(),
        });

        if self.config.unknown_syscall == UnknownSyscallPolicy::Abort {
            error!("unknown syscall policy is abort; terminating");
            std::process::exit(1);
        }
        DispatchOutcome::Halted
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("config", &self.config)
            .field("handles", &self.handles.len())
            .field("ports", &self.ports.keys().collect::<Vec<_>>())
            .field("waits", &self.waits.len())
            .field("termination", &self.termination)
            .finish()
    }
}
