use ctr::ctr_kernel::{
    result, DispatchOutcome, GuestCpu, KernelResult, Scheduler, TerminationReason, ThreadId,
    ThreadParams, WaitRequest, WakeReason,
};
use ctr::ctr_mem::MemoryError;
use ctr::{Emulator, EmulatorConfig};

const HEAP: u32 = 0x0800_0000;
const SHARED: u32 = 0x1000_0000;

#[derive(Default)]
struct Cpu {
    regs: [u32; 16],
    stopped: bool,
}

impl Cpu {
    fn with(values: &[u32]) -> Self {
        let mut cpu = Self::default();
        cpu.regs[..values.len()].copy_from_slice(values);
        cpu
    }
}

impl GuestCpu for Cpu {
    fn reg(&self, index: usize) -> u32 {
        self.regs[index]
    }

    fn set_reg(&mut self, index: usize, value: u32) {
        self.regs[index] = value;
    }

    fn stop_quantum(&mut self) {
        self.stopped = true;
    }
}

/// Single-thread scheduler; nothing ever blocks in these tests.
struct OneThread;

impl Scheduler for OneThread {
    fn current_thread(&self) -> ThreadId {
        ThreadId(1)
    }

    fn spawn(&mut self, _params: ThreadParams) -> KernelResult<ThreadId> {
        Ok(ThreadId(2))
    }

    fn exit_current(&mut self) {}

    fn sleep_current(&mut self, _ns: u64) {}

    fn block_current(&mut self, _request: WaitRequest) {}

    fn wake(&mut self, _thread: ThreadId, _reason: WakeReason) {}

    fn is_alive(&self, _thread: ThreadId) -> bool {
        true
    }

    fn system_tick(&self) -> u64 {
        0
    }

    fn thread_local_storage(&self, _thread: ThreadId) -> u32 {
        HEAP + 0x800
    }
}

fn two_processes() -> Emulator {
    let config = EmulatorConfig::from_json(r#"{ "process_slots": 2 }"#).unwrap();
    let mut emu = Emulator::new(config);
    for slot in 0..2 {
        emu.switch_process(slot).unwrap();
        emu.memory_mut().add_mapping(HEAP, 0x1000).unwrap();
    }
    emu.switch_process(0).unwrap();
    emu
}

#[test]
fn shared_memory_block_is_visible_from_both_processes() {
    let mut emu = two_processes();
    let handle = emu.kernel_mut().create_shared_memory(0x1000).unwrap();

    let mut cpu = Cpu::with(&[handle.raw(), SHARED]);
    assert_eq!(emu.svc(0x1F, &mut cpu, &mut OneThread), DispatchOutcome::Completed);
    assert_eq!(cpu.regs[0], result::SUCCESS);
    emu.memory_mut().write_u32(SHARED + 8, 0xCAFE_F00D).unwrap();

    emu.switch_process(1).unwrap();
    assert!(!emu.memory().is_mapped(SHARED));
    let mut cpu = Cpu::with(&[handle.raw(), SHARED]);
    emu.svc(0x1F, &mut cpu, &mut OneThread);
    assert_eq!(emu.memory().read_u32(SHARED + 8).unwrap(), 0xCAFE_F00D);

    emu.memory_mut().write_u8(SHARED, 0x77).unwrap();
    emu.switch_process(0).unwrap();
    assert_eq!(emu.memory().read_u8(SHARED).unwrap(), 0x77);
}

#[test]
fn syscalls_use_the_running_process() {
    let mut emu = two_processes();
    emu.switch_process(1).unwrap();
    emu.memory_mut().write(HEAP, b"only in slot 1").unwrap();

    let mut cpu = Cpu::with(&[HEAP, 14]);
    assert_eq!(emu.svc(0x3D, &mut cpu, &mut OneThread), DispatchOutcome::Completed);
    assert_eq!(cpu.regs[0], result::SUCCESS);

    // A string running past the end of the heap is rejected.
    emu.switch_process(0).unwrap();
    let mut cpu = Cpu::with(&[HEAP + 0x1000 - 4, 64]);
    emu.svc(0x3D, &mut cpu, &mut OneThread);
    assert_eq!(cpu.regs[0], result::INVALID_ADDRESS);
}

#[test]
fn switching_to_a_missing_slot_fails() {
    let mut emu = two_processes();
    assert!(matches!(
        emu.switch_process(2),
        Err(MemoryError::InvalidProcessSlot { slot: 2, count: 2 })
    ));
    assert_eq!(emu.current_process(), 0);
}

#[test]
fn exit_process_stops_dispatch() {
    let mut emu = Emulator::default();
    let mut cpu = Cpu::default();
    let outcome = emu.svc(0x03, &mut cpu, &mut OneThread);
    assert_eq!(outcome, DispatchOutcome::Terminated(TerminationReason::ExitProcess));
    assert!(cpu.stopped);
    assert!(emu.kernel().is_terminated());

    let mut cpu = Cpu::default();
    assert!(emu.svc(0x28, &mut cpu, &mut OneThread).is_terminated());
}

#[test]
fn dump_writes_active_process_regions() {
    let mut emu = two_processes();
    emu.memory_mut().write_u8(HEAP, 0x42).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let files = emu.dump_memory(dir.path()).unwrap();
    assert_eq!(files.len(), 1);
    let bytes = std::fs::read(&files[0]).unwrap();
    assert_eq!(bytes.len(), 0x1000);
    assert_eq!(bytes[0], 0x42);
}

#[test]
fn init_tracing_can_be_called_twice() {
    ctr::init_tracing();
    ctr::init_tracing();
}
