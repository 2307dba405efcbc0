/*!
 * Memory Types
 * Common types for memory accounting
 */

use crate::core::types::{AllocationId, Pid, Size};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Memory operation result
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Memory accounting errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("out of memory: requested {requested} bytes, {available} available ({used} used / {total} total)")]
    OutOfMemory {
        requested: Size,
        available: Size,
        used: Size,
        total: Size,
    },

    #[error("unknown allocation: {0}")]
    UnknownAllocation(AllocationId),
}

/// A single outstanding reservation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Allocation {
    pub id: AllocationId,
    pub owner_pid: Pid,
    pub size: Size,
}

/// Accountant-wide statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MemoryStats {
    pub total_memory: Size,
    pub used_memory: Size,
    pub available_memory: Size,
    pub usage_percentage: f64,
    pub allocations: usize,
}
