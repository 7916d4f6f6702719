use tracing::{info, warn};

use super::{DispatchOutcome, Kernel, SvcContext, SvcResult};
use crate::error::KernelError;

/// Largest name list accepted by the resource limit stubs.
const MAX_RESOURCE_NAMES: u32 = 32;

impl Kernel {
    /// `OutputDebugString(ptr, len)`
    pub(super) fn svc_output_debug_string(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let ptr = ctx.cpu.reg(0);
        let len = ctx.cpu.reg(1) as usize;
        let len = len.min(self.config.debug_string_limit.saturating_sub(1));

        let mut buf = vec![0u8; len];
        ctx.mem.read(ptr, &mut buf)?;
        if let Some(nul) = buf.iter().position(|&b| b == 0) {
            buf.truncate(nul);
        }

        info!(target: "ctr_kernel::guest", "{}", String::from_utf8_lossy(&buf).trim_end());
        Ok(DispatchOutcome::Completed.into())
    }

    /// `GetResourceLimit(_, process) -> handle`. Placeholder handle `0`.
    pub(super) fn svc_get_resource_limit(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        warn!(
            "GetResourceLimit(process=0x{:08x}) not implemented; returning placeholder",
            ctx.cpu.reg(1)
        );
        ctx.cpu.set_reg(1, 0);
        Ok(DispatchOutcome::Stubbed.into())
    }

    /// `GetResourceLimit{Limit,Current}Values(values, limit, names, count)`. Writes zeros.
    pub(super) fn svc_get_resource_limit_values(
        &mut self,
        ctx: &mut SvcContext<'_>,
        num: u8,
    ) -> SvcResult {
        let values = ctx.cpu.reg(0);
        let count = ctx.cpu.reg(3);
        warn!(
            "{}(values=0x{values:08x}, limit=0x{:08x}, names=0x{:08x}, count={count}) not implemented; zero-filling",
            crate::syscall_name(num),
            ctx.cpu.reg(1),
            ctx.cpu.reg(2)
        );

        if count > MAX_RESOURCE_NAMES {
            return Err(KernelError::OutOfRange {
                what: "resource name count",
                value: i64::from(count),
            });
        }
        ctx.mem.write(values, &vec![0u8; count as usize * 8])?;
        Ok(DispatchOutcome::Stubbed.into())
    }

    /// Development shim: `svc 0xFF` prints the low byte of r0. Not part of the hardware ABI.
    pub(super) fn svc_debug_putchar(&mut self, ctx: &mut SvcContext<'_>) -> SvcResult {
        let ch = ctx.cpu.reg(0) as u8;
        if ch == b'\n' {
            self.flush_console();
        } else {
            self.console.push(ch);
        }
        Ok(DispatchOutcome::Completed.into())
    }

    /// Emits any buffered `svc 0xFF` output.
    pub fn flush_console(&mut self) {
        if self.console.is_empty() {
            return;
        }
        info!(target: "ctr_kernel::guest", "{}", String::from_utf8_lossy(&self.console));
        self.console.clear();
    }

    /// Bytes written through the putchar shim since the last newline.
    pub fn console_pending(&self) -> &[u8] {
        &self.console
    }
}
