use ctr_mem::SharedBuffer;
use tracing::{debug, warn};

use super::{DispatchOutcome, Kernel, SvcContext, SvcResult};
use crate::error::{KernelError, KernelResult};
use crate::handle::{Handle, HandleType};
use crate::object::{KernelObject, SharedMemory};

const PAGE_MASK: u32 = 0xFFF;

const MEMOP_COMMIT: u32 = 3;
const MEMOP_LINEAR: u32 = 0x1_0000;

impl Kernel {
    /// `ControlMemory(op, addr0, addr1, size, perm) -> addr`
    pub(super) fn svc_control_memory(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let op = ctx.cpu.reg(0);
        let addr0 = ctx.cpu.reg(1);
        let size = ctx.cpu.reg(3);

        if op & 0xFF != MEMOP_COMMIT {
            warn!("ControlMemory op=0x{op:x} addr0=0x{addr0:08x} size=0x{size:x} unsupported");
            return Err(KernelError::NotImplemented("ControlMemory operation"));
        }
        if size & PAGE_MASK != 0 {
            return Err(KernelError::MisalignedSize { size });
        }

        let addr = if op & MEMOP_LINEAR != 0 {
            let addr = self.linear_next;
            let next = addr.checked_add(size).ok_or(KernelError::OutOfMemory)?;
            ctx.mem.add_mapping(addr, size)?;
            self.linear_next = next;
            addr
        } else {
            if addr0 & PAGE_MASK != 0 {
                return Err(KernelError::MisalignedAddress { addr: addr0 });
            }
            if addr0 == 0 {
                return Err(KernelError::InvalidAddress { addr: addr0 });
            }
            ctx.mem.add_mapping(addr0, size)?;
            addr0
        };

        debug!("committed 0x{size:x} bytes at 0x{addr:08x}");
        ctx.cpu.set_reg(1, addr);
        Ok(DispatchOutcome::Completed.into())
    }

    pub(super) fn svc_query_memory(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        warn!("QueryMemory(addr=0x{:08x}) stubbed", ctx.cpu.reg(2));
        for reg in 1..=5 {
            ctx.cpu.set_reg(reg, 0);
        }
        Ok(DispatchOutcome::Stubbed.into())
    }

    /// `MapMemoryBlock(handle, addr, my_perm, other_perm)`
    pub(super) fn svc_map_memory_block(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let handle = Handle(ctx.cpu.reg(0));
        let addr = ctx.cpu.reg(1);

        let object = self.handles.get_typed(handle, HandleType::SharedMemory)?;
        let object = object.borrow();
        let KernelObject::SharedMemory(block) = &*object else {
            return Err(KernelError::InvalidHandle(handle));
        };

        if addr == 0 {
            return Err(KernelError::InvalidAddress { addr });
        }
        if addr & PAGE_MASK != 0 {
            return Err(KernelError::MisalignedAddress { addr });
        }
        ctx.mem
            .add_mapping_shared(addr, block.size, block.buffer.clone())?;

        debug!("mapped shared memory {handle} at 0x{addr:08x}");
        Ok(DispatchOutcome::Completed.into())
    }

    /// Creates a zeroed shared memory block the guest can map with `MapMemoryBlock`.
    pub fn create_shared_memory(&mut self, size: u32) -> KernelResult<Handle> {
        if size == 0 || size & PAGE_MASK != 0 {
            return Err(KernelError::MisalignedSize { size });
        }
        self.handles.insert(KernelObject::SharedMemory(SharedMemory {
            buffer: SharedBuffer::new(size as usize),
            size,
        }))
    }

    /// Backing store of a shared memory block, for host-side producers.
    pub fn shared_memory_buffer(&self, handle: Handle) -> KernelResult<SharedBuffer> {
        let object = self.handles.get_typed(handle, HandleType::SharedMemory)?;
        let object = object.borrow();
        match &*object {
            KernelObject::SharedMemory(block) => Ok(block.buffer.clone()),
            _ => Err(KernelError::InvalidHandle(handle)),
        }
    }
}
