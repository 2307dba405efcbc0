/*!
 * Memory Accounting
 * Reservation bookkeeping against a configured ceiling
 */

pub mod manager;
pub mod types;

pub use manager::MemoryManager;
pub use types::{Allocation, MemoryError, MemoryResult, MemoryStats};
