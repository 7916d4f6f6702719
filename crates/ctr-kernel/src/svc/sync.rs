use std::rc::Rc;

use tracing::debug;

use super::{DispatchOutcome, Kernel, SvcContext, SvcResult};
use crate::error::KernelError;
use crate::handle::{Handle, HandleType};
use crate::object::{Event, KernelObject, Mutex, ResetType, Semaphore, Thread};

impl Kernel {
    /// `CreateMutex(_, initially_locked) -> handle`
    pub(super) fn svc_create_mutex(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let locked = ctx.cpu.reg(1) != 0;
        let owner = locked.then(|| ctx.sched.current_thread());
        let handle = self.handles.insert(KernelObject::Mutex(Mutex::new(owner)))?;
        ctx.cpu.set_reg(1, handle.raw());
        Ok(DispatchOutcome::Completed.into())
    }

    /// `ReleaseMutex(handle)`
    pub(super) fn svc_release_mutex(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let handle = Handle(ctx.cpu.reg(0));
        let object = self.handles.get_typed(handle, HandleType::Mutex)?;
        let thread = ctx.sched.current_thread();

        let unlocked = {
            let mut guard = object.borrow_mut();
            let KernelObject::Mutex(mutex) = &mut *guard else {
                return Err(KernelError::InvalidHandle(handle));
            };
            if mutex.owner != Some(thread) {
                return Err(KernelError::NotOwner { handle });
            }
            mutex.lock_count -= 1;
            if mutex.lock_count == 0 {
                mutex.owner = None;
            }
            mutex.owner.is_none()
        };

        if unlocked {
            self.signal(&object, ctx.sched);
        }
        Ok(DispatchOutcome::Completed.into())
    }

    /// `CreateSemaphore(_, initial, max) -> handle`
    pub(super) fn svc_create_semaphore(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let initial = ctx.cpu.reg(1) as i32;
        let max = ctx.cpu.reg(2) as i32;
        if max < 0 || initial < 0 || initial > max {
            return Err(KernelError::OutOfRange {
                what: "semaphore count",
                value: i64::from(initial),
            });
        }

        let handle = self.handles.insert(KernelObject::Semaphore(Semaphore {
            count: initial,
            max,
            waiters: Vec::new(),
        }))?;
        ctx.cpu.set_reg(1, handle.raw());
        Ok(DispatchOutcome::Completed.into())
    }

    /// `ReleaseSemaphore(_, handle, count) -> previous count`
    pub(super) fn svc_release_semaphore(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let handle = Handle(ctx.cpu.reg(1));
        let release = ctx.cpu.reg(2) as i32;
        let object = self.handles.get_typed(handle, HandleType::Semaphore)?;

        let previous = {
            let mut guard = object.borrow_mut();
            let KernelObject::Semaphore(sem) = &mut *guard else {
                return Err(KernelError::InvalidHandle(handle));
            };
            let next = sem.count.checked_add(release).filter(|&n| release >= 0 && n <= sem.max);
            let Some(next) = next else {
                return Err(KernelError::OutOfRange {
                    what: "semaphore release count",
                    value: i64::from(release),
                });
            };
            std::mem::replace(&mut sem.count, next)
        };

        self.signal(&object, ctx.sched);
        ctx.cpu.set_reg(1, previous as u32);
        Ok(DispatchOutcome::Completed.into())
    }

    /// `CreateEvent(_, reset_type) -> handle`
    pub(super) fn svc_create_event(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let raw = ctx.cpu.reg(1);
        let reset = ResetType::from_raw(raw).ok_or(KernelError::InvalidEnumValue {
            what: "reset type",
            value: raw,
        })?;
        let handle = self.handles.insert(KernelObject::Event(Event::new(reset)))?;
        ctx.cpu.set_reg(1, handle.raw());
        Ok(DispatchOutcome::Completed.into())
    }

    pub(super) fn svc_signal_event(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let handle = Handle(ctx.cpu.reg(0));
        let object = self.handles.get_typed(handle, HandleType::Event)?;
        if let KernelObject::Event(event) = &mut *object.borrow_mut() {
            event.signaled = true;
        }
        self.signal(&object, ctx.sched);
        Ok(DispatchOutcome::Completed.into())
    }

    pub(super) fn svc_clear_event(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let handle = Handle(ctx.cpu.reg(0));
        let object = self.handles.get_typed(handle, HandleType::Event)?;
        if let KernelObject::Event(event) = &mut *object.borrow_mut() {
            event.signaled = false;
        }
        Ok(DispatchOutcome::Completed.into())
    }

    pub(super) fn svc_close_handle(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let handle = Handle(ctx.cpu.reg(0));
        let object = self.handles.close(handle)?;
        if Rc::strong_count(&object) == 1 {
            object.borrow_mut().release();
        }
        debug!("closed {handle}");
        Ok(DispatchOutcome::Completed.into())
    }

    /// `DuplicateHandle(_, handle) -> handle`
    pub(super) fn svc_duplicate_handle(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let handle = Handle(ctx.cpu.reg(1));
        let duplicate = if handle == Handle::CURRENT_THREAD {
            self.handles.insert(KernelObject::Thread(Thread {
                id: ctx.sched.current_thread(),
                waiters: Vec::new(),
            }))?
        } else {
            self.handles.duplicate(handle)?
        };
        ctx.cpu.set_reg(1, duplicate.raw());
        Ok(DispatchOutcome::Completed.into())
    }
}
