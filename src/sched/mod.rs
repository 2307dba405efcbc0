/*!
 * Scheduler
 * Selects the next process to run under a fixed, configured policy
 */

use crate::core::types::{Pid, Priority};
use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

mod entry;

use entry::Entry;

/// Scheduler operation result
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("process {0} is already scheduled")]
    AlreadyAdmitted(Pid),
}

/// Scheduling policy, fixed at kernel start and never hot-swapped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Rotating arrival order with a per-slice tick budget
    RoundRobin,
    /// Numerically highest priority first; equal priorities round-robin
    /// within the tier. No priority inheritance or aging (known limitation,
    /// not a defect).
    Priority,
    /// Strict arrival order, run to voluntary completion or block
    Fifo,
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Policy::RoundRobin => write!(f, "round_robin"),
            Policy::Priority => write!(f, "priority"),
            Policy::Fifo => write!(f, "fifo"),
        }
    }
}

/// Outcome of a scheduling decision
///
/// An empty ready set yields `Idle` rather than blocking the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Run(Pid),
    Idle,
}

/// Scheduler statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerStats {
    pub policy: Policy,
    pub quantum_ticks: u32,
    pub total_scheduled: u64,
    pub context_switches: u64,
    pub preemptions: u64,
    pub ready_count: usize,
}

struct Inner {
    ready: VecDeque<Entry>,
    current: Option<Entry>,
    total_scheduled: u64,
    context_switches: u64,
    preemptions: u64,
}

pub struct Scheduler {
    policy: Policy,
    quantum: u32,
    inner: Arc<RwLock<Inner>>,
}

impl Scheduler {
    /// Create a scheduler with a per-slice budget of `quantum` ticks
    ///
    /// The quantum applies to `RoundRobin` and `Priority`; `Fifo` never
    /// preempts.
    pub fn new(policy: Policy, quantum: u32) -> Self {
        let quantum = quantum.max(1);
        info!(
            "Scheduler initialized: policy={}, quantum={} ticks",
            policy, quantum
        );
        Self {
            policy,
            quantum,
            inner: Arc::new(RwLock::new(Inner {
                ready: VecDeque::new(),
                current: None,
                total_scheduled: 0,
                context_switches: 0,
                preemptions: 0,
            })),
        }
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Admit a process to the ready set
    pub fn admit(&self, pid: Pid, priority: Priority, arrival_seq: u64) -> SchedulerResult<()> {
        let mut inner = self.inner.write();
        let present = inner.ready.iter().any(|e| e.pid == pid)
            || inner.current.as_ref().is_some_and(|e| e.pid == pid);
        if present {
            return Err(SchedulerError::AlreadyAdmitted(pid));
        }
        inner
            .ready
            .push_back(Entry::new(pid, priority, arrival_seq, self.quantum));
        debug!("Admitted PID {} (priority {})", pid, priority);
        Ok(())
    }

    /// Pick the process to run this tick
    pub fn next(&self) -> Decision {
        let mut inner = self.inner.write();

        if let Some(mut cur) = inner.current.take() {
            match self.policy {
                // FIFO runs the current process until it blocks or exits
                Policy::Fifo => {
                    let pid = cur.pid;
                    inner.current = Some(cur);
                    return Decision::Run(pid);
                }
                Policy::RoundRobin | Policy::Priority => {
                    if cur.slice_remaining > 0 {
                        cur.slice_remaining -= 1;
                        let pid = cur.pid;
                        inner.current = Some(cur);
                        return Decision::Run(pid);
                    }
                    // Quantum expired: back to the tail of the rotation
                    cur.recharge(self.quantum);
                    inner.preemptions += 1;
                    inner.ready.push_back(cur);
                }
            }
        }

        self.dispatch_next(&mut inner)
    }

    fn dispatch_next(&self, inner: &mut Inner) -> Decision {
        let index = match self.policy {
            Policy::RoundRobin => {
                if inner.ready.is_empty() {
                    None
                } else {
                    Some(0)
                }
            }
            Policy::Fifo => inner
                .ready
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.arrival_seq)
                .map(|(i, _)| i),
            // Highest priority wins; ties resolve to the front-most entry,
            // which rotates expired slices within the tier
            Policy::Priority => inner
                .ready
                .iter()
                .enumerate()
                .max_by(|(ia, a), (ib, b)| {
                    a.priority.cmp(&b.priority).then(ib.cmp(ia))
                })
                .map(|(i, _)| i),
        };

        match index {
            Some(i) => {
                let mut entry = inner.ready.remove(i).expect("index from enumerate");
                entry.slice_remaining = self.quantum - 1;
                inner.total_scheduled += 1;
                inner.context_switches += 1;
                let pid = entry.pid;
                inner.current = Some(entry);
                Decision::Run(pid)
            }
            None => Decision::Idle,
        }
    }

    /// The running process suspended on an IPC wait; it leaves the scheduler
    /// until it is re-admitted on wake
    pub fn block_current(&self) -> Option<Pid> {
        let mut inner = self.inner.write();
        inner.current.take().map(|e| e.pid)
    }

    /// The running process gave up the rest of its slice
    pub fn yield_current(&self) -> Option<Pid> {
        let mut inner = self.inner.write();
        let mut cur = inner.current.take()?;
        cur.recharge(self.quantum);
        let pid = cur.pid;
        inner.ready.push_back(cur);
        Some(pid)
    }

    /// The running process finished
    pub fn exit_current(&self) -> Option<Pid> {
        let mut inner = self.inner.write();
        inner.current.take().map(|e| e.pid)
    }

    /// Remove a process wherever it sits (ready or current)
    pub fn remove(&self, pid: Pid) -> bool {
        let mut inner = self.inner.write();
        if inner.current.as_ref().is_some_and(|e| e.pid == pid) {
            inner.current = None;
            return true;
        }
        if let Some(i) = inner.ready.iter().position(|e| e.pid == pid) {
            inner.ready.remove(i);
            return true;
        }
        false
    }

    pub fn current(&self) -> Option<Pid> {
        self.inner.read().current.as_ref().map(|e| e.pid)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        let inner = self.inner.read();
        inner.current.as_ref().is_some_and(|e| e.pid == pid)
            || inner.ready.iter().any(|e| e.pid == pid)
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read();
        inner.ready.len() + usize::from(inner.current.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> SchedulerStats {
        let inner = self.inner.read();
        SchedulerStats {
            policy: self.policy,
            quantum_ticks: self.quantum,
            total_scheduled: inner.total_scheduled,
            context_switches: inner.context_switches,
            preemptions: inner.preemptions,
            ready_count: inner.ready.len(),
        }
    }
}

impl Clone for Scheduler {
    fn clone(&self) -> Self {
        Self {
            policy: self.policy,
            quantum: self.quantum,
            inner: Arc::clone(&self.inner),
        }
    }
}
