/*!
 * Scheduler Entry Types
 * Internal data structures for ready-queue entries
 */

use crate::core::types::{Pid, Priority};

/// Ready-queue entry
///
/// The scheduler owns nothing the process table does not already expose
/// except the per-slice budget.
#[derive(Debug, Clone)]
pub(super) struct Entry {
    pub pid: Pid,
    pub priority: Priority,
    /// Creation order, the tie-break for simultaneous arrival
    pub arrival_seq: u64,
    /// Remaining ticks in the current slice
    pub slice_remaining: u32,
}

impl Entry {
    pub fn new(pid: Pid, priority: Priority, arrival_seq: u64, quantum: u32) -> Self {
        Self {
            pid,
            priority,
            arrival_seq,
            slice_remaining: quantum,
        }
    }

    pub fn recharge(&mut self, quantum: u32) {
        self.slice_remaining = quantum;
    }
}
