/*!
 * Memory Accountant
 * Tracks reserved bytes against a configured ceiling with graceful OOM handling
 */

use super::types::{Allocation, MemoryError, MemoryResult, MemoryStats};
use crate::core::types::{AllocationId, Pid, Size};
use ahash::RandomState;
use dashmap::DashMap;
use log::{error, info};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Memory accountant
///
/// Allocations are all-or-nothing: a request that would breach the ceiling is
/// rejected without reserving anything. Reserved bytes can never exceed the
/// configured capacity and never go negative.
pub struct MemoryManager {
    allocations: Arc<DashMap<AllocationId, Allocation, RandomState>>,
    next_id: Arc<AtomicU64>,
    total_memory: Size,
    // used_memory is guarded by a lock (not an atomic) so the capacity check
    // and the reservation happen as one step.
    used_memory: Arc<RwLock<Size>>,
}

impl MemoryManager {
    pub fn new(total_memory: Size) -> Self {
        info!("Memory accountant initialized with {} bytes", total_memory);
        Self {
            allocations: Arc::new(DashMap::with_hasher(RandomState::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            total_memory,
            used_memory: Arc::new(RwLock::new(0)),
        }
    }

    /// Reserve `size` bytes for `pid`
    pub fn allocate(&self, size: Size, pid: Pid) -> MemoryResult<AllocationId> {
        let mut used = self.used_memory.write();

        // Compared against the headroom, not `used + size`, so absurd
        // requests near usize::MAX cannot overflow the check.
        let available = self.total_memory - *used;
        if size > available {
            error!(
                "OOM: PID {} requested {} bytes, only {} available ({} used / {} total)",
                pid, size, available, *used, self.total_memory
            );
            return Err(MemoryError::OutOfMemory {
                requested: size,
                available,
                used: *used,
                total: self.total_memory,
            });
        }

        *used += size;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.allocations.insert(
            id,
            Allocation {
                id,
                owner_pid: pid,
                size,
            },
        );

        info!("Reserved {} bytes for PID {} (allocation {})", size, pid, id);
        Ok(id)
    }

    /// Release a single reservation
    ///
    /// The allocation id is removed on the first release, so a second release
    /// of the same id reports `UnknownAllocation` instead of double-freeing.
    pub fn release(&self, id: AllocationId) -> MemoryResult<Size> {
        let (_, alloc) = self
            .allocations
            .remove(&id)
            .ok_or(MemoryError::UnknownAllocation(id))?;

        let mut used = self.used_memory.write();
        *used = used.saturating_sub(alloc.size);

        info!(
            "Released {} bytes from PID {} ({} bytes now available)",
            alloc.size,
            alloc.owner_pid,
            self.total_memory - *used
        );
        Ok(alloc.size)
    }

    /// Release every reservation owned by `pid`, returning the freed byte count
    pub fn release_process(&self, pid: Pid) -> Size {
        let ids: Vec<AllocationId> = self
            .allocations
            .iter()
            .filter(|entry| entry.owner_pid == pid)
            .map(|entry| entry.id)
            .collect();

        let mut freed = 0;
        for id in ids {
            if let Ok(size) = self.release(id) {
                freed += size;
            }
        }

        if freed > 0 {
            info!("Cleaned up {} bytes from terminated PID {}", freed, pid);
        }
        freed
    }

    /// Bytes reserved by a specific process
    pub fn process_memory(&self, pid: Pid) -> Size {
        self.allocations
            .iter()
            .filter(|entry| entry.owner_pid == pid)
            .map(|entry| entry.size)
            .sum()
    }

    /// Overall memory info: (total, used, available)
    pub fn info(&self) -> (Size, Size, Size) {
        let used = *self.used_memory.read();
        (self.total_memory, used, self.total_memory - used)
    }

    pub fn stats(&self) -> MemoryStats {
        let used = *self.used_memory.read();
        MemoryStats {
            total_memory: self.total_memory,
            used_memory: used,
            available_memory: self.total_memory - used,
            usage_percentage: if self.total_memory == 0 {
                0.0
            } else {
                (used as f64 / self.total_memory as f64) * 100.0
            },
            allocations: self.allocations.len(),
        }
    }
}

impl Clone for MemoryManager {
    fn clone(&self) -> Self {
        Self {
            allocations: Arc::clone(&self.allocations),
            next_id: Arc::clone(&self.next_id),
            total_memory: self.total_memory,
            used_memory: Arc::clone(&self.used_memory),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_allocate_and_release() {
        let mem = MemoryManager::new(2048);

        let id = mem.allocate(1024, 1).unwrap();
        assert_eq!(mem.info(), (2048, 1024, 1024));

        mem.release(id).unwrap();
        assert_eq!(mem.info(), (2048, 0, 2048));
    }

    #[test]
    fn test_over_capacity_rejected_without_partial_grant() {
        let mem = MemoryManager::new(2048);
        mem.allocate(1024, 1).unwrap();

        let err = mem.allocate(2048, 2).unwrap_err();
        assert_eq!(
            err,
            MemoryError::OutOfMemory {
                requested: 2048,
                available: 1024,
                used: 1024,
                total: 2048,
            }
        );
        // Capacity unchanged by the failed request
        assert_eq!(mem.info(), (2048, 1024, 1024));
    }

    #[test]
    fn test_double_release_reports_unknown() {
        let mem = MemoryManager::new(1024);
        let id = mem.allocate(512, 1).unwrap();

        mem.release(id).unwrap();
        assert_eq!(mem.release(id), Err(MemoryError::UnknownAllocation(id)));
        assert_eq!(mem.info(), (1024, 0, 1024));
    }

    #[test]
    fn test_release_process_frees_all_owned() {
        let mem = MemoryManager::new(4096);
        mem.allocate(1024, 7).unwrap();
        mem.allocate(512, 7).unwrap();
        mem.allocate(256, 8).unwrap();

        assert_eq!(mem.release_process(7), 1536);
        assert_eq!(mem.process_memory(7), 0);
        assert_eq!(mem.process_memory(8), 256);
    }

    #[test]
    fn test_huge_request_rejected_not_overflowed() {
        let mem = MemoryManager::new(2048);
        mem.allocate(1024, 1).unwrap();

        // usize::MAX plus anything reserved would wrap a naive sum
        let err = mem.allocate(usize::MAX, 2).unwrap_err();
        assert!(matches!(err, MemoryError::OutOfMemory { .. }));
        assert_eq!(mem.info(), (2048, 1024, 1024));
    }

    #[test]
    fn test_exact_fit() {
        let mem = MemoryManager::new(1024);
        mem.allocate(1024, 1).unwrap();
        assert!(mem.allocate(1, 2).is_err());
    }
}
