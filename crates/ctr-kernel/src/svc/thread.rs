use std::rc::Rc;

use tracing::debug;

use super::{DispatchOutcome, Kernel, SvcContext, SvcResult, SvcReply};
use crate::cpu::reg_pair;
use crate::error::KernelError;
use crate::handle::ObjectRef;
use crate::object::{KernelObject, Thread};
use crate::scheduler::ThreadParams;

const LOWEST_PRIORITY: u32 = 0x3F;

impl Kernel {
    /// `CreateThread(priority, entry, arg, stack_top, core) -> handle`
    pub(super) fn svc_create_thread(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let params = ThreadParams {
            priority: ctx.cpu.reg(0),
            entry: ctx.cpu.reg(1),
            arg: ctx.cpu.reg(2),
            stack_top: ctx.cpu.reg(3),
            core: ctx.cpu.reg(4) as i32,
        };
        if params.priority > LOWEST_PRIORITY {
            return Err(KernelError::OutOfRange {
                what: "thread priority",
                value: i64::from(params.priority),
            });
        }

        let id = ctx.sched.spawn(params)?;
        let handle = self.handles.insert(KernelObject::Thread(Thread {
            id,
            waiters: Vec::new(),
        }))?;

        debug!(
            "created {id} entry=0x{:08x} stack=0x{:08x} prio={} as {handle}",
            params.entry, params.stack_top, params.priority
        );
        ctx.cpu.set_reg(1, handle.raw());
        Ok(DispatchOutcome::Completed.into())
    }

    pub(super) fn svc_exit_thread(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let id = ctx.sched.current_thread();
        debug!("{id} exiting");

        ctx.cpu.stop_quantum();
        ctx.sched.exit_current();

        let exited: Vec<ObjectRef> = self
            .handles
            .iter()
            .filter(|(_, obj)| matches!(&*obj.borrow(), KernelObject::Thread(t) if t.id == id))
            .map(|(_, obj)| Rc::clone(obj))
            .collect();
        for object in &exited {
            self.signal(object, ctx.sched);
        }

        Ok(DispatchOutcome::Suspended.into())
    }

    /// `SleepThread(ns_lo, ns_hi)`; a zero duration yields.
    pub(super) fn svc_sleep_thread(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let ns = (reg_pair(&*ctx.cpu, 0, 1) as i64).max(0) as u64;
        ctx.sched.sleep_current(ns);
        ctx.cpu.stop_quantum();
        Ok(DispatchOutcome::Suspended.into())
    }

    /// `GetSystemTick() -> (lo, hi)`
    pub(super) fn svc_get_system_tick(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let tick = ctx.sched.system_tick();
        ctx.cpu.set_reg(1, (tick >> 32) as u32);
        Ok(SvcReply::with_r0(tick as u32))
    }
}
