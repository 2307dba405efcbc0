/*!
 * Shared Memory
 * Named byte segments with reference-counted lifetime
 */

use super::types::{IpcError, IpcResult};
use crate::core::types::{AllocationId, Pid, Size};
use crate::memory::MemoryManager;
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Snapshot of one segment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SegmentInfo {
    pub name: String,
    pub size: Size,
    pub attached: usize,
}

#[derive(Debug)]
struct Segment {
    size: Size,
    allocation: AllocationId,
    data: Vec<u8>,
    attached: HashSet<Pid>,
    /// Refcount-zero release only applies after the first attach
    ever_attached: bool,
}

/// Shared memory manager
///
/// The primitive does not serialize concurrent writers: overlapping writes
/// are last-write-wins, mirroring real shared-memory semantics. This is a
/// documented hazard, not a bug.
pub struct ShmManager {
    segments: Arc<DashMap<String, Segment, RandomState>>,
    memory: MemoryManager,
}

impl ShmManager {
    pub fn new(memory: MemoryManager) -> Self {
        info!("Shared memory manager initialized");
        Self {
            segments: Arc::new(DashMap::with_hasher(RandomState::new())),
            memory,
        }
    }

    /// Create a segment, reserving its backing store with the accountant
    pub fn create(&self, name: impl Into<String>, size: Size, owner_pid: Pid) -> IpcResult<()> {
        let name = name.into();
        if self.segments.contains_key(&name) {
            return Err(IpcError::DuplicateName {
                kind: "shared memory segment",
                name,
            });
        }

        let allocation = self
            .memory
            .allocate(size, owner_pid)
            .map_err(|e| IpcError::AllocationFailed(e.to_string()))?;

        debug!("Segment '{}' created ({} bytes)", name, size);
        self.segments.insert(
            name,
            Segment {
                size,
                allocation,
                data: vec![0; size],
                attached: HashSet::new(),
                ever_attached: false,
            },
        );
        Ok(())
    }

    pub fn attach(&self, name: &str, pid: Pid) -> IpcResult<()> {
        let mut seg = self.segment_mut(name)?;
        seg.attached.insert(pid);
        seg.ever_attached = true;
        debug!("PID {} attached to '{}' (refcount {})", pid, name, seg.attached.len());
        Ok(())
    }

    /// Detach; the backing store is released when the last attachment drops
    pub fn detach(&self, name: &str, pid: Pid) -> IpcResult<()> {
        let release = {
            let mut seg = self.segment_mut(name)?;
            if !seg.attached.remove(&pid) {
                return Err(IpcError::NotAttached {
                    name: name.to_string(),
                    pid,
                });
            }
            seg.attached.is_empty() && seg.ever_attached
        };

        if release {
            self.destroy(name)?;
        }
        Ok(())
    }

    pub fn write(&self, name: &str, pid: Pid, offset: Size, data: &[u8]) -> IpcResult<()> {
        let mut seg = self.segment_mut(name)?;
        if !seg.attached.contains(&pid) {
            return Err(IpcError::NotAttached {
                name: name.to_string(),
                pid,
            });
        }
        // Overflow-safe bounds check: huge offsets must reject, not wrap
        if offset > seg.size || data.len() > seg.size - offset {
            return Err(IpcError::OutOfBounds {
                name: name.to_string(),
                offset,
                len: data.len(),
                size: seg.size,
            });
        }
        seg.data[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn read(&self, name: &str, pid: Pid, offset: Size, len: Size) -> IpcResult<Vec<u8>> {
        let seg = self.segment(name)?;
        if !seg.attached.contains(&pid) {
            return Err(IpcError::NotAttached {
                name: name.to_string(),
                pid,
            });
        }
        if offset > seg.size || len > seg.size - offset {
            return Err(IpcError::OutOfBounds {
                name: name.to_string(),
                offset,
                len,
                size: seg.size,
            });
        }
        Ok(seg.data[offset..offset + len].to_vec())
    }

    /// Explicitly release a segment regardless of its refcount
    pub fn destroy(&self, name: &str) -> IpcResult<()> {
        let (_, seg) = self
            .segments
            .remove(name)
            .ok_or_else(|| IpcError::UnknownName {
                kind: "shared memory segment",
                name: name.to_string(),
            })?;

        if let Err(e) = self.memory.release(seg.allocation) {
            warn!("Destroying segment '{}': stale allocation: {}", name, e);
        }
        info!("Segment '{}' destroyed ({} bytes reclaimed)", name, seg.size);
        Ok(())
    }

    /// Detach a terminated process everywhere, releasing zero-ref segments
    pub fn cleanup_process(&self, pid: Pid) {
        let names: Vec<String> = self
            .segments
            .iter()
            .filter(|entry| entry.attached.contains(&pid))
            .map(|entry| entry.key().clone())
            .collect();

        for name in names {
            if let Err(e) = self.detach(&name, pid) {
                warn!("Cleanup detach of PID {} from '{}': {}", pid, name, e);
            }
        }
    }

    pub fn info(&self) -> Vec<SegmentInfo> {
        let mut all: Vec<SegmentInfo> = self
            .segments
            .iter()
            .map(|entry| SegmentInfo {
                name: entry.key().clone(),
                size: entry.size,
                attached: entry.attached.len(),
            })
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn count(&self) -> usize {
        self.segments.len()
    }

    pub fn total_bytes(&self) -> Size {
        self.segments.iter().map(|entry| entry.size).sum()
    }

    fn segment(&self, name: &str) -> IpcResult<dashmap::mapref::one::Ref<'_, String, Segment, RandomState>> {
        self.segments.get(name).ok_or_else(|| IpcError::UnknownName {
            kind: "shared memory segment",
            name: name.to_string(),
        })
    }

    fn segment_mut(
        &self,
        name: &str,
    ) -> IpcResult<dashmap::mapref::one::RefMut<'_, String, Segment, RandomState>> {
        self.segments.get_mut(name).ok_or_else(|| IpcError::UnknownName {
            kind: "shared memory segment",
            name: name.to_string(),
        })
    }
}

impl Clone for ShmManager {
    fn clone(&self) -> Self {
        Self {
            segments: Arc::clone(&self.segments),
            memory: self.memory.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn shm(capacity: Size) -> (ShmManager, MemoryManager) {
        let mem = MemoryManager::new(capacity);
        (ShmManager::new(mem.clone()), mem)
    }

    #[test]
    fn test_create_reserves_backing_store() {
        let (shm, mem) = shm(4096);
        shm.create("buf", 1024, 1).unwrap();
        assert_eq!(mem.info().1, 1024);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (shm, _) = shm(4096);
        shm.create("buf", 64, 1).unwrap();
        assert!(matches!(
            shm.create("buf", 64, 1),
            Err(IpcError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_attach_read_write() {
        let (shm, _) = shm(4096);
        shm.create("buf", 64, 1).unwrap();
        shm.attach("buf", 1).unwrap();
        shm.attach("buf", 2).unwrap();

        shm.write("buf", 1, 8, b"hello").unwrap();
        assert_eq!(shm.read("buf", 2, 8, 5).unwrap(), b"hello");
    }

    #[test]
    fn test_unattached_access_rejected() {
        let (shm, _) = shm(4096);
        shm.create("buf", 64, 1).unwrap();
        assert!(matches!(
            shm.write("buf", 9, 0, b"x"),
            Err(IpcError::NotAttached { .. })
        ));
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let (shm, _) = shm(4096);
        shm.create("buf", 16, 1).unwrap();
        shm.attach("buf", 1).unwrap();
        assert!(matches!(
            shm.write("buf", 1, 12, b"toolong"),
            Err(IpcError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_huge_offset_rejected_not_overflowed() {
        let (shm, _) = shm(4096);
        shm.create("buf", 16, 1).unwrap();
        shm.attach("buf", 1).unwrap();

        // offset + len would wrap a naive sum; both directions must reject
        assert!(matches!(
            shm.read("buf", 1, usize::MAX, 2),
            Err(IpcError::OutOfBounds { .. })
        ));
        assert!(matches!(
            shm.write("buf", 1, usize::MAX, b"xx"),
            Err(IpcError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_last_detach_releases_backing_store() {
        let (shm, mem) = shm(4096);
        shm.create("buf", 1024, 1).unwrap();
        shm.attach("buf", 1).unwrap();
        shm.attach("buf", 2).unwrap();

        shm.detach("buf", 1).unwrap();
        assert_eq!(mem.info().1, 1024);

        shm.detach("buf", 2).unwrap();
        assert_eq!(mem.info().1, 0);
        assert_eq!(shm.count(), 0);
    }

    #[test]
    fn test_never_attached_segment_survives() {
        let (shm, mem) = shm(4096);
        shm.create("buf", 256, 1).unwrap();
        // No attach yet: refcount-zero does not release
        assert_eq!(shm.count(), 1);
        assert_eq!(mem.info().1, 256);
    }

    #[test]
    fn test_cleanup_detaches_terminated_process() {
        let (shm, mem) = shm(4096);
        shm.create("buf", 512, 1).unwrap();
        shm.attach("buf", 1).unwrap();

        shm.cleanup_process(1);
        assert_eq!(shm.count(), 0);
        assert_eq!(mem.info().1, 0);
    }

    #[test]
    fn test_last_write_wins() {
        let (shm, _) = shm(4096);
        shm.create("buf", 8, 1).unwrap();
        shm.attach("buf", 1).unwrap();
        shm.attach("buf", 2).unwrap();

        shm.write("buf", 1, 0, b"AAAA").unwrap();
        shm.write("buf", 2, 0, b"BBBB").unwrap();
        assert_eq!(shm.read("buf", 1, 0, 4).unwrap(), b"BBBB");
    }
}
