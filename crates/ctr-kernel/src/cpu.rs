/// Register file and quantum control of the CPU core servicing a syscall.
///
/// Registers are indexed `0..=15`; `15` is the PC.
pub trait GuestCpu {
    fn reg(&self, index: usize) -> u32;
    fn set_reg(&mut self, index: usize, value: u32);

    fn pc(&self) -> u32 {
        self.reg(15)
    }

    /// Ends the current execution quantum once the syscall returns (zero remaining budget).
    fn stop_quantum(&mut self);

    fn regs(&self) -> [u32; 16] {
        let mut regs = [0u32; 16];
        for (i, r) in regs.iter_mut().enumerate() {
            *r = self.reg(i);
        }
        regs
    }
}

/// Reads a 64-bit value split across two registers, low word first.
#[inline]
pub(crate) fn reg_pair(cpu: &dyn GuestCpu, lo: usize, hi: usize) -> u64 {
    u64::from(cpu.reg(lo)) | (u64::from(cpu.reg(hi)) << 32)
}
