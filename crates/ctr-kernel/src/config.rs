use serde::{Deserialize, Serialize};

/// What the dispatcher does after reporting a syscall it has no handler for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownSyscallPolicy {
    /// Write `0` to r0, report through the halt hook and keep running.
    #[default]
    Halt,
    /// Report, then terminate the host process.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub unknown_syscall: UnknownSyscallPolicy,
    /// Enables the development-only `svc 0xFF` character output shim.
    pub debug_putchar: bool,
    /// First address handed out for `ControlMemory` linear allocations.
    pub linear_heap_base: u32,
    /// Size of the `OutputDebugString` staging buffer, including the terminator.
    pub debug_string_limit: usize,
    pub max_handles: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            unknown_syscall: UnknownSyscallPolicy::Halt,
            debug_putchar: false,
            linear_heap_base: 0x1400_0000,
            debug_string_limit: 256,
            max_handles: 4096,
        }
    }
}

impl KernelConfig {
    pub fn unknown_syscall(mut self, policy: UnknownSyscallPolicy) -> Self {
        self.unknown_syscall = policy;
        self
    }

    pub fn debug_putchar(mut self, enabled: bool) -> Self {
        self.debug_putchar = enabled;
        self
    }

    pub fn linear_heap_base(mut self, base: u32) -> Self {
        self.linear_heap_base = base;
        self
    }

    pub fn max_handles(mut self, max: usize) -> Self {
        self.max_handles = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: KernelConfig =
            serde_json::from_str(r#"{ "debug_putchar": true, "unknown_syscall": "abort" }"#)
                .unwrap();
        assert!(cfg.debug_putchar);
        assert_eq!(cfg.unknown_syscall, UnknownSyscallPolicy::Abort);
        assert_eq!(cfg.debug_string_limit, 256);
        assert_eq!(cfg.linear_heap_base, 0x1400_0000);
    }
}
