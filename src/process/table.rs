/*!
 * Process Table
 * Owns process records; creation and teardown are paired with memory accounting
 */

use super::types::{ProcessError, ProcessInfo, ProcessResult, ProcessState};
use crate::core::types::{now_micros, Pid, Priority, Size};
use crate::memory::MemoryManager;
use ahash::RandomState;
use dashmap::DashMap;
use log::{info, warn};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

pub struct ProcessTable {
    processes: Arc<DashMap<Pid, ProcessInfo, RandomState>>,
    next_pid: Arc<AtomicU32>,
    arrival_seq: Arc<AtomicU64>,
    max_processes: usize,
    memory: MemoryManager,
}

impl ProcessTable {
    pub fn new(max_processes: usize, memory: MemoryManager) -> Self {
        info!("Process table initialized ({} slots)", max_processes);
        Self {
            processes: Arc::new(DashMap::with_hasher(RandomState::new())),
            next_pid: Arc::new(AtomicU32::new(1)),
            arrival_seq: Arc::new(AtomicU64::new(0)),
            max_processes,
            memory,
        }
    }

    /// Create a process, reserving `memory_request` bytes for it
    ///
    /// Creation is atomic: either both the reservation and the table slot
    /// succeed, or neither mutation is visible.
    pub fn create(
        &self,
        name: impl Into<String>,
        priority: Priority,
        memory_request: Size,
    ) -> ProcessResult<Pid> {
        let name = name.into();

        if self.processes.len() >= self.max_processes {
            return Err(ProcessError::TableFull {
                count: self.processes.len(),
                limit: self.max_processes,
            });
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let allocation = self.memory.allocate(memory_request, pid)?;

        // Re-check under the reservation; roll back on a lost race so the
        // failed create leaves no trace.
        if self.processes.len() >= self.max_processes {
            let _ = self.memory.release(allocation);
            return Err(ProcessError::TableFull {
                count: self.processes.len(),
                limit: self.max_processes,
            });
        }

        let info = ProcessInfo {
            pid,
            name: name.clone(),
            priority,
            state: ProcessState::Ready,
            arrival_seq: self.arrival_seq.fetch_add(1, Ordering::SeqCst),
            memory_bytes: memory_request,
            allocation: Some(allocation),
            created_at: now_micros(),
        };
        self.processes.insert(pid, info);

        info!(
            "Created process '{}' (PID {}, priority {}, {} bytes)",
            name, pid, priority, memory_request
        );
        Ok(pid)
    }

    /// Terminate a process and release its memory
    ///
    /// Idempotent against a second call: the record is removed on the first
    /// terminate, so a repeat reports `NotFound` and nothing is double-freed.
    pub fn terminate(&self, pid: Pid) -> ProcessResult<ProcessInfo> {
        let (_, mut info) = self
            .processes
            .remove(&pid)
            .ok_or(ProcessError::NotFound(pid))?;

        info.state = ProcessState::Terminated;
        if let Some(allocation) = info.allocation.take() {
            if let Err(e) = self.memory.release(allocation) {
                warn!("Terminating PID {}: stale allocation: {}", pid, e);
            }
        }

        info!("Terminated process '{}' (PID {})", info.name, pid);
        Ok(info)
    }

    pub fn get(&self, pid: Pid) -> ProcessResult<ProcessInfo> {
        self.processes
            .get(&pid)
            .map(|entry| entry.clone())
            .ok_or(ProcessError::NotFound(pid))
    }

    /// Whether the pid refers to a live (non-terminated) process
    pub fn exists(&self, pid: Pid) -> bool {
        self.processes.contains_key(&pid)
    }

    pub fn set_state(&self, pid: Pid, state: ProcessState) -> ProcessResult<()> {
        let mut entry = self
            .processes
            .get_mut(&pid)
            .ok_or(ProcessError::NotFound(pid))?;
        entry.state = state;
        Ok(())
    }

    pub fn list(&self) -> Vec<ProcessInfo> {
        let mut all: Vec<ProcessInfo> = self.processes.iter().map(|e| e.clone()).collect();
        all.sort_by_key(|p| p.arrival_seq);
        all
    }

    pub fn count(&self) -> usize {
        self.processes.len()
    }
}

impl Clone for ProcessTable {
    fn clone(&self) -> Self {
        Self {
            processes: Arc::clone(&self.processes),
            next_pid: Arc::clone(&self.next_pid),
            arrival_seq: Arc::clone(&self.arrival_seq),
            max_processes: self.max_processes,
            memory: self.memory.clone(),
        }
    }
}
