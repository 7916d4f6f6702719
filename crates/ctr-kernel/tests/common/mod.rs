#![allow(dead_code)]

use std::collections::BTreeMap;

use ctr_kernel::{
    GuestCpu, Kernel, KernelConfig, KernelResult, Scheduler, ThreadId, ThreadParams, WaitRequest,
    WakeReason,
};
use ctr_mem::AddressSpace;

pub const TLS_BASE: u32 = 0x1FF8_2000;
pub const TLS_SIZE: u32 = 0x200;

#[derive(Debug, Default)]
pub struct MockCpu {
    pub regs: [u32; 16],
    pub quantum_stopped: bool,
}

impl MockCpu {
    pub fn with_regs(values: &[u32]) -> Self {
        let mut cpu = Self::default();
        cpu.regs[..values.len()].copy_from_slice(values);
        cpu
    }
}

impl GuestCpu for MockCpu {
    fn reg(&self, index: usize) -> u32 {
        self.regs[index]
    }

    fn set_reg(&mut self, index: usize, value: u32) {
        self.regs[index] = value;
    }

    fn stop_quantum(&mut self) {
        self.quantum_stopped = true;
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MockThread {
    pub alive: bool,
    pub blocked: Option<WaitRequest>,
    pub slept_ns: Option<u64>,
    pub wakes: Vec<WakeReason>,
    pub params: Option<ThreadParams>,
}

#[derive(Debug)]
pub struct MockScheduler {
    pub threads: BTreeMap<ThreadId, MockThread>,
    pub current: ThreadId,
    pub next_id: u32,
    pub tick: u64,
}

impl MockScheduler {
    /// Threads `1..=count`, thread 1 running.
    pub fn with_threads(count: u32) -> Self {
        let threads = (1..=count)
            .map(|id| {
                (
                    ThreadId(id),
                    MockThread {
                        alive: true,
                        ..MockThread::default()
                    },
                )
            })
            .collect();
        Self {
            threads,
            current: ThreadId(1),
            next_id: count + 1,
            tick: 0,
        }
    }

    pub fn run(&mut self, id: u32) {
        self.current = ThreadId(id);
    }

    pub fn thread(&self, id: u32) -> &MockThread {
        &self.threads[&ThreadId(id)]
    }
}

impl Scheduler for MockScheduler {
    fn current_thread(&self) -> ThreadId {
        self.current
    }

    fn spawn(&mut self, params: ThreadParams) -> KernelResult<ThreadId> {
        let id = ThreadId(self.next_id);
        self.next_id += 1;
        self.threads.insert(
            id,
            MockThread {
                alive: true,
                params: Some(params),
                ..MockThread::default()
            },
        );
        Ok(id)
    }

    fn exit_current(&mut self) {
        if let Some(t) = self.threads.get_mut(&self.current) {
            t.alive = false;
        }
    }

    fn sleep_current(&mut self, ns: u64) {
        if let Some(t) = self.threads.get_mut(&self.current) {
            t.slept_ns = Some(ns);
        }
    }

    fn block_current(&mut self, request: WaitRequest) {
        if let Some(t) = self.threads.get_mut(&self.current) {
            t.blocked = Some(request);
        }
    }

    fn wake(&mut self, thread: ThreadId, reason: WakeReason) {
        if let Some(t) = self.threads.get_mut(&thread) {
            t.blocked = None;
            t.wakes.push(reason);
        }
    }

    fn is_alive(&self, thread: ThreadId) -> bool {
        self.threads.get(&thread).map_or(false, |t| t.alive)
    }

    fn system_tick(&self) -> u64 {
        self.tick
    }

    fn thread_local_storage(&self, thread: ThreadId) -> u32 {
        TLS_BASE + thread.0 * TLS_SIZE
    }
}

pub struct Harness {
    pub kernel: Kernel,
    pub mem: AddressSpace,
    pub sched: MockScheduler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        let mut mem = AddressSpace::default();
        mem.add_mapping(0x1000_0000, 0x1000).unwrap();
        mem.add_mapping(TLS_BASE, 0x1000).unwrap();
        Self {
            kernel: Kernel::new(config),
            mem,
            sched: MockScheduler::with_threads(3),
        }
    }

    /// Dispatches `num` with the given leading registers and returns the CPU afterwards.
    pub fn svc(&mut self, num: u8, regs: &[u32]) -> (ctr_kernel::DispatchOutcome, MockCpu) {
        let mut cpu = MockCpu::with_regs(regs);
        let outcome = self
            .kernel
            .dispatch(num, &mut cpu, &mut self.mem, &mut self.sched);
        (outcome, cpu)
    }

    /// Dispatches and returns `(r0, r1)`.
    pub fn call(&mut self, num: u8, regs: &[u32]) -> (u32, u32) {
        let (_, cpu) = self.svc(num, regs);
        (cpu.regs[0], cpu.regs[1])
    }

    pub fn write_str(&mut self, addr: u32, s: &str) {
        self.mem.write(addr, s.as_bytes()).unwrap();
        self.mem.write_u8(addr + s.len() as u32, 0).unwrap();
    }
}
