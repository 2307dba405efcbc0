/*!
 * Process Types
 * Common types for process management
 */

use crate::core::types::{AllocationId, Pid, Priority, Size, Timestamp};
use crate::memory::MemoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Process operation result
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Process errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("process {0} not found")]
    NotFound(Pid),

    #[error("process table full: {count} of {limit} slots in use")]
    TableFull { count: usize, limit: usize },

    #[error("memory allocation failed: {0}")]
    Memory(#[from] MemoryError),
}

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Ready to run
    Ready,
    /// Currently running (at most one process at a time)
    Running,
    /// Suspended on an IPC wait
    Blocked,
    /// Finished; record kept only transiently
    Terminated,
}

/// Process record owned by the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessInfo {
    pub pid: Pid,
    pub name: String,
    pub priority: Priority,
    pub state: ProcessState,
    /// Creation order, used as the scheduling tie-break
    pub arrival_seq: u64,
    pub memory_bytes: Size,
    /// Reservation held for this process; released exactly once at termination
    #[serde(skip)]
    pub allocation: Option<AllocationId>,
    pub created_at: Timestamp,
}
