/*!
 * Core Module
 * Shared types and the unified error enum
 */

pub mod errors;
pub mod types;

pub use errors::{KernelError, Result};
pub use types::{now_micros, AllocationId, Pid, Priority, Size, Timestamp};
