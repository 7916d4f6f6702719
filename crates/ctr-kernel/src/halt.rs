use tracing::error;

/// Register snapshot taken when the dispatcher meets a syscall it has no handler for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaltReport {
    pub num: u8,
    pub name: &'static str,
    pub pc: u32,
    pub regs: [u32; 16],
}

/// Receives [`HaltReport`]s for operator inspection.
pub trait DiagnosticHalt {
    fn halt(&mut self, report: &HaltReport);
}

/// Logs the report and lets the guest continue.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHalt;

impl DiagnosticHalt for LogHalt {
    fn halt(&mut self, report: &HaltReport) {
        error!(
            "unhandled svc 0x{:02x} ({}) at pc=0x{:08x}",
            report.num, report.name, report.pc
        );
        for (row, chunk) in report.regs.chunks(4).enumerate() {
            error!(
                "  r{:<2}=0x{:08x} r{:<2}=0x{:08x} r{:<2}=0x{:08x} r{:<2}=0x{:08x}",
                row * 4,
                chunk[0],
                row * 4 + 1,
                chunk[1],
                row * 4 + 2,
                chunk[2],
                row * 4 + 3,
                chunk[3]
            );
        }
    }
}
