use std::rc::Rc;

use tracing::{debug, trace};

use super::{DispatchOutcome, Kernel, SvcContext, SvcResult};
use crate::cpu::reg_pair;
use crate::error::{KernelError, KernelResult};
use crate::handle::{Handle, HandleType, ObjectRef};
use crate::object::{Arbiter, KernelObject, ResetType};
use crate::scheduler::{timeout_from_raw, Scheduler, ThreadId, WaitRequest, WakeReason};

/// Upper bound of `WaitSynchronizationN` handle lists.
const MAX_WAIT_OBJECTS: u32 = 256;

const ARBITRATION_SIGNAL: u32 = 0;
const ARBITRATION_WAIT_IF_LESS_THAN: u32 = 1;
const ARBITRATION_DECREMENT_AND_WAIT_IF_LESS_THAN: u32 = 2;
const ARBITRATION_WAIT_IF_LESS_THAN_TIMEOUT: u32 = 3;
const ARBITRATION_DECREMENT_AND_WAIT_IF_LESS_THAN_TIMEOUT: u32 = 4;

/// A thread blocked in `WaitSynchronization*`.
#[derive(Debug)]
pub(crate) struct PendingWait {
    objects: Vec<ObjectRef>,
    wait_all: bool,
}

fn is_ready(object: &KernelObject, thread: ThreadId, sched: &dyn Scheduler) -> bool {
    match object {
        KernelObject::Mutex(m) => m.owner.map_or(true, |owner| owner == thread),
        KernelObject::Event(e) => e.signaled,
        KernelObject::Semaphore(s) => s.count > 0,
        KernelObject::Thread(t) => !sched.is_alive(t.id),
        _ => false,
    }
}

/// Applies the side effect of a successful wait on behalf of `thread`.
fn acquire(object: &mut KernelObject, thread: ThreadId) {
    match object {
        KernelObject::Mutex(m) => {
            m.owner = Some(thread);
            m.lock_count += 1;
        }
        KernelObject::Event(e) if e.reset == ResetType::OneShot => e.signaled = false,
        KernelObject::Semaphore(s) => s.count -= 1,
        _ => {}
    }
}

fn remove_waiter(object: &ObjectRef, thread: ThreadId) {
    if let Some(waiters) = object.borrow_mut().waiters_mut() {
        waiters.retain(|&t| t != thread);
    }
}

impl Kernel {
    /// Releases threads waiting on `object` now that its state changed.
    pub(crate) fn signal(&mut self, object: &ObjectRef, sched: &mut dyn Scheduler) {
        let waiters = match object.borrow_mut().waiters_mut() {
            Some(waiters) => waiters.clone(),
            None => return,
        };

        for thread in waiters {
            let Some(pending) = self.waits.get(&thread) else {
                continue;
            };
            let ready = if pending.wait_all {
                pending
                    .objects
                    .iter()
                    .all(|o| is_ready(&o.borrow(), thread, &*sched))
            } else {
                is_ready(&object.borrow(), thread, &*sched)
            };
            if !ready {
                continue;
            }

            let Some(pending) = self.waits.remove(&thread) else {
                continue;
            };
            let index = if pending.wait_all {
                for o in &pending.objects {
                    acquire(&mut o.borrow_mut(), thread);
                }
                0
            } else {
                acquire(&mut object.borrow_mut(), thread);
                pending
                    .objects
                    .iter()
                    .position(|o| Rc::ptr_eq(o, object))
                    .unwrap_or(0)
            };
            for o in &pending.objects {
                remove_waiter(o, thread);
            }

            trace!("waking {thread} (index {index})");
            sched.wake(thread, WakeReason::Signaled { index });
        }

        if let KernelObject::Event(event) = &mut *object.borrow_mut() {
            if event.reset == ResetType::Pulse {
                event.signaled = false;
            }
        }
    }

    /// Drops the pending wait of `thread`, typically after the scheduler timed it out.
    ///
    /// Returns true if the thread was waiting. The scheduler resumes it with
    /// [`result::TIMEOUT`](crate::result::TIMEOUT) in r0.
    pub fn cancel_wait(&mut self, thread: ThreadId) -> bool {
        let mut found = false;
        if let Some(pending) = self.waits.remove(&thread) {
            for o in &pending.objects {
                remove_waiter(o, thread);
            }
            found = true;
        }
        if let Some((arbiter, addr)) = self.arbiter_waits.remove(&thread) {
            if let KernelObject::Arbiter(arb) = &mut *arbiter.borrow_mut() {
                if let Some(queue) = arb.waiters.get_mut(&addr) {
                    queue.retain(|&t| t != thread);
                    if queue.is_empty() {
                        arb.waiters.remove(&addr);
                    }
                }
            }
            found = true;
        }
        found
    }

    /// True if `thread` is blocked on synchronization objects or an arbiter.
    pub fn is_waiting(&self, thread: ThreadId) -> bool {
        self.waits.contains_key(&thread) || self.arbiter_waits.contains_key(&thread)
    }

    /// `WaitSynchronization1(handle, _, timeout_lo, timeout_hi)`
    pub(super) fn svc_wait_synchronization1(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let handle = Handle(ctx.cpu.reg(0));
        let timeout = reg_pair(&*ctx.cpu, 2, 3);
        self.wait_on(ctx, vec![handle], false, timeout)
    }

    /// `WaitSynchronizationN(timeout_lo, handles, count, wait_all, timeout_hi) -> index`
    pub(super) fn svc_wait_synchronization_n(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        ctx.cpu.stop_quantum();

        let ptr = ctx.cpu.reg(1);
        let count = ctx.cpu.reg(2);
        let wait_all = ctx.cpu.reg(3) != 0;
        let timeout = reg_pair(&*ctx.cpu, 0, 4);

        if count > MAX_WAIT_OBJECTS {
            return Err(KernelError::OutOfRange {
                what: "handle count",
                value: i64::from(count as i32),
            });
        }

        let mut raw = vec![0u8; count as usize * 4];
        ctx.mem.read(ptr, &mut raw)?;
        let handles = raw
            .chunks_exact(4)
            .map(|b| Handle(u32::from_le_bytes([b[0], b[1], b[2], b[3]])))
            .collect();

        self.wait_on(ctx, handles, wait_all, timeout)
    }

    fn wait_on(
        &mut self,
        ctx: &mut SvcContext<'_>,
        handles: Vec<Handle>,
        wait_all: bool,
        raw_timeout: u64,
    ) -> SvcResult {
        ctx.cpu.stop_quantum();
        let thread = ctx.sched.current_thread();

        let mut objects = Vec::with_capacity(handles.len());
        for &handle in &handles {
            let object = self.handles.get(handle)?;
            if object.borrow_mut().waiters_mut().is_none() {
                let actual = object.borrow().handle_type();
                return Err(KernelError::NotWaitable { handle, actual });
            }
            objects.push(object);
        }
        if wait_all {
            // Aliased handles name one object; it is acquired once.
            let mut unique: Vec<ObjectRef> = Vec::with_capacity(objects.len());
            for object in objects {
                if !unique.iter().any(|o| Rc::ptr_eq(o, &object)) {
                    unique.push(object);
                }
            }
            objects = unique;
        }

        let ready: Vec<bool> = objects
            .iter()
            .map(|o| is_ready(&o.borrow(), thread, &*ctx.sched))
            .collect();

        if wait_all {
            if ready.iter().all(|&r| r) {
                for o in &objects {
                    acquire(&mut o.borrow_mut(), thread);
                }
                return Ok(DispatchOutcome::Completed.into());
            }
        } else if let Some(index) = ready.iter().position(|&r| r) {
            acquire(&mut objects[index].borrow_mut(), thread);
            ctx.cpu.set_reg(1, index as u32);
            return Ok(DispatchOutcome::Completed.into());
        }

        let timeout_ns = timeout_from_raw(raw_timeout);
        if timeout_ns == Some(0) {
            return Err(KernelError::Timeout);
        }

        debug!("{thread} waiting on {handles:?} (all={wait_all}, timeout={timeout_ns:?})");
        for o in &objects {
            if let Some(waiters) = o.borrow_mut().waiters_mut() {
                waiters.push(thread);
            }
        }
        self.waits.insert(thread, PendingWait { objects, wait_all });
        ctx.sched.block_current(WaitRequest::Objects {
            handles,
            wait_all,
            timeout_ns,
        });
        Ok(DispatchOutcome::Suspended.into())
    }

    pub(super) fn svc_create_address_arbiter(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let handle = self.handles.insert(KernelObject::Arbiter(Arbiter::default()))?;
        ctx.cpu.set_reg(1, handle.raw());
        Ok(DispatchOutcome::Completed.into())
    }

    /// `ArbitrateAddress(handle, addr, type, value, timeout_lo, timeout_hi)`
    pub(super) fn svc_arbitrate_address(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let handle = Handle(ctx.cpu.reg(0));
        let addr = ctx.cpu.reg(1);
        let kind = ctx.cpu.reg(2);
        let value = ctx.cpu.reg(3) as i32;

        let arbiter = self.handles.get_typed(handle, HandleType::Arbiter)?;

        match kind {
            ARBITRATION_SIGNAL => {
                let woken = release_arbiter_waiters(&arbiter, handle, addr, value)?;
                for thread in woken {
                    self.arbiter_waits.remove(&thread);
                    ctx.sched.wake(thread, WakeReason::Arbitrated);
                }
                Ok(DispatchOutcome::Completed.into())
            }
            ARBITRATION_WAIT_IF_LESS_THAN
            | ARBITRATION_DECREMENT_AND_WAIT_IF_LESS_THAN
            | ARBITRATION_WAIT_IF_LESS_THAN_TIMEOUT
            | ARBITRATION_DECREMENT_AND_WAIT_IF_LESS_THAN_TIMEOUT => {
                let current = ctx.mem.read_u32(addr)? as i32;
                if current >= value {
                    return Ok(DispatchOutcome::Completed.into());
                }

                let decrement = matches!(
                    kind,
                    ARBITRATION_DECREMENT_AND_WAIT_IF_LESS_THAN
                        | ARBITRATION_DECREMENT_AND_WAIT_IF_LESS_THAN_TIMEOUT
                );
                if decrement {
                    ctx.mem.write_u32(addr, current.wrapping_sub(1) as u32)?;
                }
                let timeout_ns = if kind >= ARBITRATION_WAIT_IF_LESS_THAN_TIMEOUT {
                    timeout_from_raw(reg_pair(&*ctx.cpu, 4, 5))
                } else {
                    None
                };

                let thread = ctx.sched.current_thread();
                if let KernelObject::Arbiter(arb) = &mut *arbiter.borrow_mut() {
                    arb.waiters.entry(addr).or_default().push_back(thread);
                }
                self.arbiter_waits.insert(thread, (Rc::clone(&arbiter), addr));

                debug!("{thread} waiting on arbiter {handle} at 0x{addr:08x} ({current} < {value})");
                ctx.cpu.stop_quantum();
                ctx.sched
                    .block_current(WaitRequest::Address { addr, timeout_ns });
                Ok(DispatchOutcome::Suspended.into())
            }
            _ => Err(KernelError::InvalidEnumValue {
                what: "arbitration type",
                value: kind,
            }),
        }
    }
}

/// Pops up to `count` waiters on `addr` in arrival order; a negative count releases all.
fn release_arbiter_waiters(
    arbiter: &ObjectRef,
    handle: Handle,
    addr: u32,
    count: i32,
) -> KernelResult<Vec<ThreadId>> {
    let mut object = arbiter.borrow_mut();
    let KernelObject::Arbiter(arb) = &mut *object else {
        return Err(KernelError::InvalidHandle(handle));
    };
    let Some(queue) = arb.waiters.get_mut(&addr) else {
        return Ok(Vec::new());
    };

    let n = if count < 0 {
        queue.len()
    } else {
        (count as usize).min(queue.len())
    };
    let woken: Vec<ThreadId> = queue.drain(..n).collect();
    if queue.is_empty() {
        arb.waiters.remove(&addr);
    }
    Ok(woken)
}
