/*!
 * Inter-Process Communication
 * Mailboxes, semaphores, shared memory, and pipes behind one façade
 */

pub mod mailbox;
pub mod pipe;
pub mod semaphore;
pub mod shm;
pub mod types;

pub use mailbox::MailboxManager;
pub use pipe::{PipeInfo, PipeManager};
pub use semaphore::{SemaphoreInfo, SemaphoreManager};
pub use shm::{SegmentInfo, ShmManager};
pub use types::{
    IpcError, IpcResult, IpcStats, Message, PipeReadOutcome, PipeWriteOutcome, RecvOutcome,
    SemOutcome, Wakeup,
};

use crate::core::types::{Pid, Size};
use crate::memory::MemoryManager;
use crate::process::ProcessTable;
use log::info;
use std::time::{Duration, Instant};

/// Unified IPC entry point
///
/// Operations that name a process validate it against the live table, so a
/// terminated pid can never register as a waiter or receive a message.
#[derive(Clone)]
pub struct IpcManager {
    table: ProcessTable,
    mailboxes: MailboxManager,
    semaphores: SemaphoreManager,
    shm: ShmManager,
    pipes: PipeManager,
}

impl IpcManager {
    pub fn new(table: ProcessTable, memory: MemoryManager, mailbox_limit: usize) -> Self {
        info!("IPC manager initialized");
        Self {
            table,
            mailboxes: MailboxManager::new(mailbox_limit),
            semaphores: SemaphoreManager::new(),
            shm: ShmManager::new(memory.clone()),
            pipes: PipeManager::new(memory),
        }
    }

    /// Create the mailbox for a freshly created process
    pub fn register_process(&self, pid: Pid) {
        self.mailboxes.ensure(pid);
    }

    // Messages

    pub fn send(&self, from: Pid, to: Pid, data: Vec<u8>) -> IpcResult<Option<Wakeup>> {
        if !self.table.exists(from) {
            return Err(IpcError::UnknownProcess(from));
        }
        self.mailboxes.send(Message::new(from, to, data))
    }

    pub fn receive(&self, pid: Pid, timeout: Option<Duration>) -> IpcResult<RecvOutcome> {
        if !self.table.exists(pid) {
            return Err(IpcError::UnknownProcess(pid));
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        self.mailboxes.receive(pid, deadline)
    }

    pub fn pending_messages(&self, pid: Pid) -> usize {
        self.mailboxes.pending(pid)
    }

    // Semaphores

    pub fn sem_create(&self, name: impl Into<String>, initial: u32) -> IpcResult<()> {
        self.semaphores.create(name, initial)
    }

    pub fn sem_wait(&self, name: &str, pid: Pid) -> IpcResult<SemOutcome> {
        if !self.table.exists(pid) {
            return Err(IpcError::UnknownProcess(pid));
        }
        self.semaphores.wait(name, pid)
    }

    pub fn sem_signal(&self, name: &str) -> IpcResult<Option<Wakeup>> {
        self.semaphores.signal(name)
    }

    pub fn sem_value(&self, name: &str) -> IpcResult<u32> {
        self.semaphores.value(name)
    }

    // Shared memory

    pub fn shm_create(&self, name: impl Into<String>, size: Size, owner: Pid) -> IpcResult<()> {
        self.shm.create(name, size, owner)
    }

    pub fn shm_attach(&self, name: &str, pid: Pid) -> IpcResult<()> {
        if !self.table.exists(pid) {
            return Err(IpcError::UnknownProcess(pid));
        }
        self.shm.attach(name, pid)
    }

    pub fn shm_detach(&self, name: &str, pid: Pid) -> IpcResult<()> {
        self.shm.detach(name, pid)
    }

    pub fn shm_write(&self, name: &str, pid: Pid, offset: Size, data: &[u8]) -> IpcResult<()> {
        self.shm.write(name, pid, offset, data)
    }

    pub fn shm_read(&self, name: &str, pid: Pid, offset: Size, len: Size) -> IpcResult<Vec<u8>> {
        self.shm.read(name, pid, offset, len)
    }

    pub fn shm_destroy(&self, name: &str) -> IpcResult<()> {
        self.shm.destroy(name)
    }

    // Pipes

    pub fn pipe_create(&self, name: impl Into<String>, capacity: Size, owner: Pid) -> IpcResult<()> {
        self.pipes.create(name, capacity, owner)
    }

    pub fn pipe_write(
        &self,
        name: &str,
        pid: Pid,
        data: &[u8],
    ) -> IpcResult<(PipeWriteOutcome, Vec<Wakeup>)> {
        if !self.table.exists(pid) {
            return Err(IpcError::UnknownProcess(pid));
        }
        self.pipes.write(name, pid, data)
    }

    pub fn pipe_read(&self, name: &str, pid: Pid) -> IpcResult<(PipeReadOutcome, Vec<Wakeup>)> {
        if !self.table.exists(pid) {
            return Err(IpcError::UnknownProcess(pid));
        }
        self.pipes.read(name, pid)
    }

    pub fn pipe_close_write(&self, name: &str) -> IpcResult<Vec<Wakeup>> {
        self.pipes.close_write(name)
    }

    pub fn pipe_destroy(&self, name: &str) -> IpcResult<()> {
        self.pipes.destroy(name)
    }

    // Housekeeping

    /// Wake receivers whose bounded waits have expired
    pub fn poll_timeouts(&self, now: Instant) -> Vec<Wakeup> {
        self.mailboxes.poll_timeouts(now)
    }

    /// Remove a terminated process from every queue and wait list
    pub fn cleanup_process(&self, pid: Pid) {
        self.mailboxes.cleanup_process(pid);
        self.semaphores.cleanup_process(pid);
        self.shm.cleanup_process(pid);
        self.pipes.cleanup_process(pid);
    }

    pub fn semaphore_info(&self) -> Vec<SemaphoreInfo> {
        self.semaphores.info()
    }

    pub fn segment_info(&self) -> Vec<SegmentInfo> {
        self.shm.info()
    }

    pub fn pipe_info(&self) -> Vec<PipeInfo> {
        self.pipes.info()
    }

    pub fn stats(&self) -> IpcStats {
        IpcStats {
            pending_messages: self.mailboxes.total_pending(),
            semaphores: self.semaphores.count(),
            shm_segments: self.shm.count(),
            shm_bytes: self.shm.total_bytes(),
            pipes: self.pipes.count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fixture() -> (IpcManager, ProcessTable) {
        let memory = MemoryManager::new(1 << 20);
        let table = ProcessTable::new(16, memory.clone());
        let ipc = IpcManager::new(table.clone(), memory, 0);
        (ipc, table)
    }

    fn spawn(ipc: &IpcManager, table: &ProcessTable, name: &str) -> Pid {
        let pid = table.create(name, 1, 64).unwrap();
        ipc.register_process(pid);
        pid
    }

    #[test]
    fn test_send_requires_live_sender() {
        let (ipc, table) = fixture();
        let dest = spawn(&ipc, &table, "dest");

        assert_eq!(
            ipc.send(99, dest, b"x".to_vec()),
            Err(IpcError::UnknownProcess(99))
        );
    }

    #[test]
    fn test_dead_pid_cannot_wait() {
        let (ipc, table) = fixture();
        let pid = spawn(&ipc, &table, "worker");
        ipc.sem_create("s", 0).unwrap();

        table.terminate(pid).unwrap();
        ipc.cleanup_process(pid);

        assert_eq!(ipc.sem_wait("s", pid), Err(IpcError::UnknownProcess(pid)));
    }

    #[test]
    fn test_cleanup_sweeps_all_primitives() {
        let (ipc, table) = fixture();
        let a = spawn(&ipc, &table, "a");
        let b = spawn(&ipc, &table, "b");

        ipc.sem_create("s", 0).unwrap();
        ipc.sem_wait("s", a).unwrap();
        ipc.shm_create("seg", 64, a).unwrap();
        ipc.shm_attach("seg", a).unwrap();
        ipc.pipe_create("p", 8, a).unwrap();
        ipc.pipe_read("p", a).unwrap();
        ipc.send(b, a, b"late".to_vec()).unwrap();

        table.terminate(a).unwrap();
        ipc.cleanup_process(a);

        let stats = ipc.stats();
        assert_eq!(stats.pending_messages, 0);
        assert_eq!(stats.shm_segments, 0);

        // The signal must not go to the removed waiter
        assert!(ipc.sem_signal("s").unwrap().is_none());
        assert_eq!(ipc.sem_value("s").unwrap(), 1);
    }

    #[test]
    fn test_stats_reflect_primitives() {
        let (ipc, table) = fixture();
        let pid = spawn(&ipc, &table, "p");

        ipc.sem_create("s", 1).unwrap();
        ipc.shm_create("seg", 128, pid).unwrap();
        ipc.pipe_create("pipe", 32, pid).unwrap();

        let stats = ipc.stats();
        assert_eq!(stats.semaphores, 1);
        assert_eq!(stats.shm_segments, 1);
        assert_eq!(stats.shm_bytes, 128);
        assert_eq!(stats.pipes, 1);
    }
}
