use ctr_kernel::KernelConfig;
use ctr_mem::MemoryConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Guest processes the emulator keeps mapping tables for by default.
pub const DEFAULT_PROCESS_SLOTS: usize = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid emulator config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("process_slots must be at least 1")]
    NoProcessSlots,
}

/// Top-level configuration, usually loaded from a JSON file.
///
/// ```json
/// {
///   "memory": { "unmapped": "abort" },
///   "kernel": { "debug_putchar": true },
///   "process_slots": 2
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    pub memory: MemoryConfig,
    pub kernel: KernelConfig,
    pub process_slots: usize,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            kernel: KernelConfig::default(),
            process_slots: DEFAULT_PROCESS_SLOTS,
        }
    }
}

impl EmulatorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        if config.process_slots == 0 {
            return Err(ConfigError::NoProcessSlots);
        }
        Ok(config)
    }

    pub fn memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    pub fn kernel(mut self, kernel: KernelConfig) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn process_slots(mut self, count: usize) -> Self {
        self.process_slots = count;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctr_kernel::UnknownSyscallPolicy;
    use ctr_mem::UnmappedPolicy;

    #[test]
    fn empty_object_is_default() {
        assert_eq!(EmulatorConfig::from_json("{}").unwrap(), EmulatorConfig::default());
    }

    #[test]
    fn nested_sections_override_defaults() {
        let config = EmulatorConfig::from_json(
            r#"{
                "memory": { "unmapped": "abort", "max_mappings": 24 },
                "kernel": { "unknown_syscall": "abort", "debug_putchar": true },
                "process_slots": 3
            }"#,
        )
        .unwrap();

        assert_eq!(config.memory.unmapped, UnmappedPolicy::Abort);
        assert_eq!(config.memory.max_mappings, 24);
        assert_eq!(config.kernel.unknown_syscall, UnknownSyscallPolicy::Abort);
        assert!(config.kernel.debug_putchar);
        assert_eq!(config.kernel.debug_string_limit, KernelConfig::default().debug_string_limit);
        assert_eq!(config.process_slots, 3);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            EmulatorConfig::from_json(r#"{ "process_slots": 0 }"#),
            Err(ConfigError::NoProcessSlots)
        ));
        assert!(matches!(
            EmulatorConfig::from_json(r#"{ "memory": { "unmapped": "ignore" } }"#),
            Err(ConfigError::Json(_))
        ));
    }
}
