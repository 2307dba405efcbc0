/*!
 * Semaphores
 * Named counting semaphores with strict FIFO wake order
 */

use super::types::{IpcError, IpcResult, SemOutcome, Wakeup};
use crate::core::types::Pid;
use crate::process::task::Resume;
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Snapshot of one semaphore
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SemaphoreInfo {
    pub name: String,
    pub count: u32,
    pub waiters: usize,
}

#[derive(Debug)]
struct Semaphore {
    // u32 keeps the count non-negative by construction
    count: u32,
    waiters: VecDeque<Pid>,
}

/// Semaphore manager
///
/// Classic counting-semaphore discipline: a signal either increments the
/// count or wakes exactly the longest waiter, never both. A woken process
/// owns the permit directly (grant-on-wake), so no later arrival can steal
/// it between the signal and the resume.
pub struct SemaphoreManager {
    sems: Arc<DashMap<String, Semaphore, RandomState>>,
}

impl SemaphoreManager {
    pub fn new() -> Self {
        info!("Semaphore manager initialized");
        Self {
            sems: Arc::new(DashMap::with_hasher(RandomState::new())),
        }
    }

    pub fn create(&self, name: impl Into<String>, initial: u32) -> IpcResult<()> {
        let name = name.into();
        if self.sems.contains_key(&name) {
            return Err(IpcError::DuplicateName {
                kind: "semaphore",
                name,
            });
        }
        debug!("Semaphore '{}' created with count {}", name, initial);
        self.sems.insert(
            name,
            Semaphore {
                count: initial,
                waiters: VecDeque::new(),
            },
        );
        Ok(())
    }

    /// Decrement if positive, otherwise join the FIFO wait queue
    pub fn wait(&self, name: &str, pid: Pid) -> IpcResult<SemOutcome> {
        let mut sem = self.sems.get_mut(name).ok_or_else(|| IpcError::UnknownName {
            kind: "semaphore",
            name: name.to_string(),
        })?;

        if sem.count > 0 {
            sem.count -= 1;
            debug!("PID {} acquired '{}' (count now {})", pid, name, sem.count);
            return Ok(SemOutcome::Acquired);
        }

        sem.waiters.push_back(pid);
        debug!("PID {} waiting on '{}'", pid, name);
        Ok(SemOutcome::Blocked)
    }

    /// Increment the count or wake the longest waiter, never both
    pub fn signal(&self, name: &str) -> IpcResult<Option<Wakeup>> {
        let mut sem = self.sems.get_mut(name).ok_or_else(|| IpcError::UnknownName {
            kind: "semaphore",
            name: name.to_string(),
        })?;

        if let Some(waiter) = sem.waiters.pop_front() {
            debug!("Signal on '{}' wakes PID {}", name, waiter);
            return Ok(Some(Wakeup::new(waiter, Resume::SemAcquired)));
        }

        sem.count += 1;
        debug!("Signal on '{}' (count now {})", name, sem.count);
        Ok(None)
    }

    pub fn value(&self, name: &str) -> IpcResult<u32> {
        self.sems
            .get(name)
            .map(|s| s.count)
            .ok_or_else(|| IpcError::UnknownName {
                kind: "semaphore",
                name: name.to_string(),
            })
    }

    pub fn info(&self) -> Vec<SemaphoreInfo> {
        let mut all: Vec<SemaphoreInfo> = self
            .sems
            .iter()
            .map(|entry| SemaphoreInfo {
                name: entry.key().clone(),
                count: entry.count,
                waiters: entry.waiters.len(),
            })
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn count(&self) -> usize {
        self.sems.len()
    }

    /// Drop a terminated process from every wait queue
    pub fn cleanup_process(&self, pid: Pid) {
        for mut entry in self.sems.iter_mut() {
            entry.waiters.retain(|p| *p != pid);
        }
    }
}

impl Default for SemaphoreManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SemaphoreManager {
    fn clone(&self) -> Self {
        Self {
            sems: Arc::clone(&self.sems),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wait_decrements_when_positive() {
        let sm = SemaphoreManager::new();
        sm.create("mutex", 1).unwrap();

        assert_eq!(sm.wait("mutex", 1).unwrap(), SemOutcome::Acquired);
        assert_eq!(sm.value("mutex").unwrap(), 0);
    }

    #[test]
    fn test_wait_on_zero_blocks() {
        let sm = SemaphoreManager::new();
        sm.create("mutex", 0).unwrap();

        assert_eq!(sm.wait("mutex", 1).unwrap(), SemOutcome::Blocked);
        assert_eq!(sm.value("mutex").unwrap(), 0);
    }

    #[test]
    fn test_signal_wakes_longest_waiter_without_increment() {
        let sm = SemaphoreManager::new();
        sm.create("mutex", 0).unwrap();

        sm.wait("mutex", 1).unwrap();
        sm.wait("mutex", 2).unwrap();

        let wake = sm.signal("mutex").unwrap().unwrap();
        assert_eq!(wake, Wakeup::new(1, Resume::SemAcquired));
        // Count untouched: the permit went to the waiter
        assert_eq!(sm.value("mutex").unwrap(), 0);

        let wake = sm.signal("mutex").unwrap().unwrap();
        assert_eq!(wake.pid, 2);
        assert_eq!(sm.value("mutex").unwrap(), 0);

        // No waiters left: this signal increments
        assert!(sm.signal("mutex").unwrap().is_none());
        assert_eq!(sm.value("mutex").unwrap(), 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let sm = SemaphoreManager::new();
        sm.create("s", 1).unwrap();
        assert!(matches!(
            sm.create("s", 1),
            Err(IpcError::DuplicateName { kind: "semaphore", .. })
        ));
    }

    #[test]
    fn test_cleanup_removes_from_wait_queue() {
        let sm = SemaphoreManager::new();
        sm.create("s", 0).unwrap();
        sm.wait("s", 1).unwrap();
        sm.wait("s", 2).unwrap();

        sm.cleanup_process(1);

        // PID 1 no longer in line; the signal goes to PID 2
        let wake = sm.signal("s").unwrap().unwrap();
        assert_eq!(wake.pid, 2);
    }

    #[test]
    fn test_unknown_semaphore() {
        let sm = SemaphoreManager::new();
        assert!(matches!(
            sm.signal("ghost"),
            Err(IpcError::UnknownName { kind: "semaphore", .. })
        ));
    }
}
