/*!
 * Kernel Façade
 * Composes the subsystems into one explicit context object
 *
 * There is no global singleton: every handle an application needs hangs
 * off a `Kernel` built from a `KernelConfig`. The cooperative tick loop
 * lives here too, driving process bodies one suspension point at a time.
 */

use crate::config::KernelConfig;
use crate::core::types::{Pid, Priority, Size};
use crate::core::Result;
use crate::ipc::{
    IpcManager, IpcStats, PipeReadOutcome, PipeWriteOutcome, RecvOutcome, SemOutcome, Wakeup,
};
use crate::memory::{MemoryManager, MemoryStats};
use crate::process::task::{ProcessBody, Resume, Syscall};
use crate::process::{ProcessInfo, ProcessState, ProcessTable};
use crate::sched::{Decision, Scheduler, SchedulerStats};
use crate::services::{Service, ServiceRegistry, ServiceStatus};
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The named process ran one step
    Ran(Pid),
    /// Nothing was runnable
    Idle,
}

/// Aggregate kernel statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KernelStats {
    pub ticks: u64,
    pub processes: usize,
    pub services: usize,
    pub memory: MemoryStats,
    pub scheduler: SchedulerStats,
    pub ipc: IpcStats,
}

pub struct Kernel {
    config: KernelConfig,
    memory: MemoryManager,
    table: ProcessTable,
    scheduler: Scheduler,
    ipc: IpcManager,
    services: ServiceRegistry,
    /// Continuation records for processes the tick loop drives
    bodies: DashMap<Pid, Mutex<Box<dyn ProcessBody>>, RandomState>,
    /// Resume payload each process receives on its next step
    pending: DashMap<Pid, Resume, RandomState>,
    ticks: AtomicU64,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Self {
        let memory = MemoryManager::new(config.kernel.memory_limit);
        let table = ProcessTable::new(config.kernel.max_processes, memory.clone());
        let scheduler = Scheduler::new(
            config.scheduler.algorithm,
            // The quantum is counted in ticks; one tick per time slice ms
            config.scheduler.time_quantum_ms.min(u32::MAX as u64) as u32,
        );
        let ipc = IpcManager::new(table.clone(), memory.clone(), config.kernel.mailbox_limit);

        info!(
            "Kernel booted: {} process slots, {} bytes, policy {}",
            config.kernel.max_processes, config.kernel.memory_limit, scheduler.policy()
        );
        Self {
            config,
            memory,
            table,
            scheduler,
            ipc,
            services: ServiceRegistry::new(),
            bodies: DashMap::with_hasher(RandomState::new()),
            pending: DashMap::with_hasher(RandomState::new()),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    pub fn processes(&self) -> &ProcessTable {
        &self.table
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn ipc(&self) -> &IpcManager {
        &self.ipc
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    // Process lifecycle

    /// Create a process record and its mailbox; it is not scheduled yet
    pub fn create_process(
        &self,
        name: impl Into<String>,
        priority: Priority,
        memory_request: Size,
    ) -> Result<Pid> {
        let pid = self.table.create(name, priority, memory_request)?;
        self.ipc.register_process(pid);
        Ok(pid)
    }

    /// Admit a created process to the scheduler's ready set
    pub fn start_process(&self, pid: Pid) -> Result<()> {
        let info = self.table.get(pid)?;
        self.scheduler.admit(pid, info.priority, info.arrival_seq)?;
        self.pending.entry(pid).or_insert(Resume::Start);
        Ok(())
    }

    /// Create, attach a body, and start in one call
    pub fn spawn(
        &self,
        name: impl Into<String>,
        priority: Priority,
        memory_request: Size,
        body: Box<dyn ProcessBody>,
    ) -> Result<Pid> {
        let pid = self.create_process(name, priority, memory_request)?;
        self.bodies.insert(pid, Mutex::new(body));
        self.start_process(pid)?;
        Ok(pid)
    }

    /// Tear a process down everywhere: scheduler, IPC queues, table, memory
    pub fn terminate_process(&self, pid: Pid) -> Result<ProcessInfo> {
        self.scheduler.remove(pid);
        self.ipc.cleanup_process(pid);
        self.bodies.remove(&pid);
        self.pending.remove(&pid);
        let info = self.table.terminate(pid)?;
        Ok(info)
    }

    // Direct IPC surface, for callers outside the tick loop

    pub fn send(&self, from: Pid, to: Pid, data: Vec<u8>) -> Result<()> {
        if let Some(wakeup) = self.ipc.send(from, to, data)? {
            self.apply_wakeup(wakeup);
        }
        Ok(())
    }

    pub fn receive(&self, pid: Pid, timeout: Option<Duration>) -> Result<RecvOutcome> {
        Ok(self.ipc.receive(pid, timeout)?)
    }

    pub fn sem_create(&self, name: impl Into<String>, initial: u32) -> Result<()> {
        Ok(self.ipc.sem_create(name, initial)?)
    }

    pub fn sem_wait(&self, name: &str, pid: Pid) -> Result<SemOutcome> {
        Ok(self.ipc.sem_wait(name, pid)?)
    }

    pub fn sem_signal(&self, name: &str) -> Result<()> {
        if let Some(wakeup) = self.ipc.sem_signal(name)? {
            self.apply_wakeup(wakeup);
        }
        Ok(())
    }

    pub fn shm_create(&self, name: impl Into<String>, size: Size, owner: Pid) -> Result<()> {
        Ok(self.ipc.shm_create(name, size, owner)?)
    }

    pub fn shm_attach(&self, name: &str, pid: Pid) -> Result<()> {
        Ok(self.ipc.shm_attach(name, pid)?)
    }

    pub fn shm_detach(&self, name: &str, pid: Pid) -> Result<()> {
        Ok(self.ipc.shm_detach(name, pid)?)
    }

    pub fn shm_write(&self, name: &str, pid: Pid, offset: Size, data: &[u8]) -> Result<()> {
        Ok(self.ipc.shm_write(name, pid, offset, data)?)
    }

    pub fn shm_read(&self, name: &str, pid: Pid, offset: Size, len: Size) -> Result<Vec<u8>> {
        Ok(self.ipc.shm_read(name, pid, offset, len)?)
    }

    pub fn pipe_create(&self, name: impl Into<String>, capacity: Size, owner: Pid) -> Result<()> {
        Ok(self.ipc.pipe_create(name, capacity, owner)?)
    }

    pub fn pipe_write(&self, name: &str, pid: Pid, data: &[u8]) -> Result<PipeWriteOutcome> {
        let (outcome, wakeups) = self.ipc.pipe_write(name, pid, data)?;
        self.apply_wakeups(wakeups);
        Ok(outcome)
    }

    pub fn pipe_read(&self, name: &str, pid: Pid) -> Result<PipeReadOutcome> {
        let (outcome, wakeups) = self.ipc.pipe_read(name, pid)?;
        self.apply_wakeups(wakeups);
        Ok(outcome)
    }

    pub fn pipe_close_write(&self, name: &str) -> Result<()> {
        let wakeups = self.ipc.pipe_close_write(name)?;
        self.apply_wakeups(wakeups);
        Ok(())
    }

    // Services

    pub fn register_service(&self, name: impl Into<String>, service: Box<dyn Service>) -> Result<()> {
        Ok(self.services.register(name, service)?)
    }

    pub fn fail_service(&self, name: &str) -> Result<()> {
        Ok(self.services.mark_failed(name)?)
    }

    pub fn recover_service(&self, name: &str) -> Result<()> {
        Ok(self.services.mark_recovered(name)?)
    }

    pub fn test_service(&self, name: &str) -> Result<()> {
        Ok(self.services.test(name)?)
    }

    pub fn call_service(&self, name: &str, op: &str, args: &[&str]) -> Result<String> {
        Ok(self.services.call(name, op, args)?)
    }

    pub fn service_status(&self) -> Vec<ServiceStatus> {
        self.services.status()
    }

    // Tick loop

    /// Run one cooperative scheduling tick
    ///
    /// Expires receive deadlines, picks at most one process, steps its body
    /// with the pending resume payload, and dispatches the syscall it
    /// returns. Exactly one process runs per tick.
    pub fn tick(&self) -> TickOutcome {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.apply_wakeups(self.ipc.poll_timeouts(Instant::now()));

        // A process still current here neither blocked, yielded, nor exited
        // last tick; if the decision picks someone else, its quantum expired
        // and it went back to the ready tail.
        let previous = self.scheduler.current();
        let pid = match self.scheduler.next() {
            Decision::Run(pid) => pid,
            Decision::Idle => return TickOutcome::Idle,
        };
        if let Some(preempted) = previous.filter(|p| *p != pid) {
            let _ = self.table.set_state(preempted, ProcessState::Ready);
        }
        let _ = self.table.set_state(pid, ProcessState::Running);

        let resume = self
            .pending
            .remove(&pid)
            .map(|(_, r)| r)
            .unwrap_or(Resume::Next);

        // Body-less processes are driven externally; running them is a no-op
        // that still consumes scheduler time.
        let syscall = if let Some(cell) = self.bodies.get(&pid) {
            let step = cell.lock().step(resume);
            drop(cell);
            Some(step)
        } else {
            None
        };

        if let Some(syscall) = syscall {
            self.dispatch(pid, syscall);
        }
        TickOutcome::Ran(pid)
    }

    /// Tick until the scheduler idles or `max_ticks` elapse; returns the
    /// number of ticks that ran a process
    pub fn run(&self, max_ticks: u64) -> u64 {
        let mut ran = 0;
        for _ in 0..max_ticks {
            match self.tick() {
                TickOutcome::Ran(_) => ran += 1,
                TickOutcome::Idle => break,
            }
        }
        ran
    }

    pub fn stats(&self) -> KernelStats {
        KernelStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            processes: self.table.count(),
            services: self.services.count(),
            memory: self.memory.stats(),
            scheduler: self.scheduler.stats(),
            ipc: self.ipc.stats(),
        }
    }

    fn dispatch(&self, pid: Pid, syscall: Syscall) {
        debug!("PID {} syscall: {:?}", pid, syscall);
        match syscall {
            Syscall::Yield => {
                self.scheduler.yield_current();
                let _ = self.table.set_state(pid, ProcessState::Ready);
            }
            Syscall::Exit => {
                self.scheduler.exit_current();
                if let Err(e) = self.terminate_process(pid) {
                    warn!("Exit of PID {}: {}", pid, e);
                }
            }
            Syscall::Send { to, data } => match self.ipc.send(pid, to, data) {
                Ok(wakeup) => {
                    if let Some(wakeup) = wakeup {
                        self.apply_wakeup(wakeup);
                    }
                    self.pending.insert(pid, Resume::Next);
                }
                Err(e) => {
                    self.pending.insert(pid, Resume::Error(e));
                }
            },
            Syscall::Receive { timeout } => match self.ipc.receive(pid, timeout) {
                Ok(RecvOutcome::Message(m)) => {
                    self.pending.insert(pid, Resume::Message(m));
                }
                Ok(RecvOutcome::Blocked) => self.block(pid),
                Err(e) => {
                    self.pending.insert(pid, Resume::Error(e));
                }
            },
            Syscall::SemWait { name } => match self.ipc.sem_wait(&name, pid) {
                Ok(SemOutcome::Acquired) => {
                    self.pending.insert(pid, Resume::SemAcquired);
                }
                Ok(SemOutcome::Blocked) => self.block(pid),
                Err(e) => {
                    self.pending.insert(pid, Resume::Error(e));
                }
            },
            Syscall::SemSignal { name } => match self.ipc.sem_signal(&name) {
                Ok(wakeup) => {
                    if let Some(wakeup) = wakeup {
                        self.apply_wakeup(wakeup);
                    }
                    self.pending.insert(pid, Resume::Next);
                }
                Err(e) => {
                    self.pending.insert(pid, Resume::Error(e));
                }
            },
            Syscall::PipeWrite { name, data } => match self.ipc.pipe_write(&name, pid, &data) {
                Ok((outcome, wakeups)) => {
                    self.apply_wakeups(wakeups);
                    match outcome {
                        PipeWriteOutcome::Written(n) => {
                            self.pending.insert(pid, Resume::Written(n));
                        }
                        PipeWriteOutcome::Blocked => self.block(pid),
                    }
                }
                Err(e) => {
                    self.pending.insert(pid, Resume::Error(e));
                }
            },
            Syscall::PipeRead { name } => match self.ipc.pipe_read(&name, pid) {
                Ok((outcome, wakeups)) => {
                    self.apply_wakeups(wakeups);
                    match outcome {
                        PipeReadOutcome::Data(data) => {
                            self.pending.insert(pid, Resume::PipeData(data));
                        }
                        PipeReadOutcome::Eof => {
                            self.pending.insert(pid, Resume::PipeEof);
                        }
                        PipeReadOutcome::Blocked => self.block(pid),
                    }
                }
                Err(e) => {
                    self.pending.insert(pid, Resume::Error(e));
                }
            },
        }
    }

    /// Suspend the running process until an IPC wakeup re-admits it
    fn block(&self, pid: Pid) {
        self.scheduler.block_current();
        let _ = self.table.set_state(pid, ProcessState::Blocked);
    }

    /// Deliver a wakeup: record the resume payload, mark the process ready,
    /// and re-admit it to the scheduler
    fn apply_wakeup(&self, wakeup: Wakeup) {
        let Ok(info) = self.table.get(wakeup.pid) else {
            // Terminated between the mutation and delivery
            return;
        };
        self.pending.insert(wakeup.pid, wakeup.resume);
        let _ = self.table.set_state(wakeup.pid, ProcessState::Ready);
        if !self.scheduler.contains(wakeup.pid) {
            let _ = self.scheduler.admit(wakeup.pid, info.priority, info.arrival_seq);
        }
    }

    fn apply_wakeups(&self, wakeups: Vec<Wakeup>) {
        for wakeup in wakeups {
            self.apply_wakeup(wakeup);
        }
    }
}
