/*!
 * Pipes
 * Named bounded byte channels with ringbuf-based circular buffers
 */

use super::types::{IpcError, IpcResult, PipeReadOutcome, PipeWriteOutcome, Wakeup};
use crate::core::types::{AllocationId, Pid, Size};
use crate::memory::MemoryManager;
use crate::process::task::Resume;
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, info, warn};
use ringbuf::{traits::*, HeapRb};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Snapshot of one pipe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipeInfo {
    pub name: String,
    pub capacity: Size,
    pub buffered: Size,
    pub write_closed: bool,
    pub blocked_readers: usize,
    pub blocked_writers: usize,
}

/// A writer suspended on a full buffer, with the bytes it still owes
#[derive(Debug)]
struct BlockedWrite {
    pid: Pid,
    pending: VecDeque<u8>,
    written: Size,
}

struct Pipe {
    buffer: HeapRb<u8>,
    capacity: Size,
    allocation: AllocationId,
    write_closed: bool,
    read_waiters: VecDeque<Pid>,
    blocked_writes: VecDeque<BlockedWrite>,
}

impl Pipe {
    /// Move data toward waiting readers and drain blocked writers until no
    /// further progress is possible, collecting the wakeups produced.
    fn service(&mut self, wakeups: &mut Vec<Wakeup>) {
        loop {
            let mut progressed = false;

            if !self.read_waiters.is_empty() && !self.buffer.is_empty() {
                let reader = self.read_waiters.pop_front().expect("checked non-empty");
                let mut data = vec![0u8; self.buffer.occupied_len()];
                let n = self.buffer.pop_slice(&mut data);
                data.truncate(n);
                wakeups.push(Wakeup::new(reader, Resume::PipeData(data)));
                progressed = true;
            }

            if let Some(front) = self.blocked_writes.front_mut() {
                if self.buffer.vacant_len() > 0 && !front.pending.is_empty() {
                    front.pending.make_contiguous();
                    let (chunk, _) = front.pending.as_slices();
                    let n = self.buffer.push_slice(chunk);
                    front.pending.drain(..n);
                    front.written += n;
                    progressed |= n > 0;
                }
                if front.pending.is_empty() {
                    let done = self.blocked_writes.pop_front().expect("checked front");
                    wakeups.push(Wakeup::new(done.pid, Resume::Written(done.written)));
                    progressed = true;
                }
            }

            // Once the write end is closed and the buffer drains, pending
            // reads see end-of-stream instead of blocking forever.
            if self.write_closed && self.buffer.is_empty() && !self.read_waiters.is_empty() {
                for reader in self.read_waiters.drain(..) {
                    wakeups.push(Wakeup::new(reader, Resume::PipeEof));
                }
                progressed = true;
            }

            if !progressed {
                break;
            }
        }
    }

    fn buffered(&self) -> Size {
        self.buffer.occupied_len()
    }
}

/// Pipe manager
///
/// Byte order is strictly preserved: writes append in call order, blocked
/// writers drain in FIFO order, and readers wake in FIFO order.
pub struct PipeManager {
    pipes: Arc<DashMap<String, Pipe, RandomState>>,
    memory: MemoryManager,
}

impl PipeManager {
    pub fn new(memory: MemoryManager) -> Self {
        info!("Pipe manager initialized");
        Self {
            pipes: Arc::new(DashMap::with_hasher(RandomState::new())),
            memory,
        }
    }

    /// Create a pipe, reserving its buffer with the accountant
    pub fn create(&self, name: impl Into<String>, capacity: Size, owner_pid: Pid) -> IpcResult<()> {
        let name = name.into();
        let capacity = capacity.max(1);
        if self.pipes.contains_key(&name) {
            return Err(IpcError::DuplicateName { kind: "pipe", name });
        }

        let allocation = self
            .memory
            .allocate(capacity, owner_pid)
            .map_err(|e| IpcError::AllocationFailed(e.to_string()))?;

        debug!("Pipe '{}' created (capacity {} bytes)", name, capacity);
        self.pipes.insert(
            name,
            Pipe {
                buffer: HeapRb::new(capacity),
                capacity,
                allocation,
                write_closed: false,
                read_waiters: VecDeque::new(),
                blocked_writes: VecDeque::new(),
            },
        );
        Ok(())
    }

    /// Append bytes; a write that does not fully fit blocks the writer until
    /// readers free enough space
    pub fn write(
        &self,
        name: &str,
        pid: Pid,
        data: &[u8],
    ) -> IpcResult<(PipeWriteOutcome, Vec<Wakeup>)> {
        let mut pipe = self.pipe_mut(name)?;
        if pipe.write_closed {
            return Err(IpcError::Closed(name.to_string()));
        }

        let mut wakeups = Vec::new();
        let outcome = if !pipe.blocked_writes.is_empty() {
            // Earlier writers drain first to preserve byte order
            pipe.blocked_writes.push_back(BlockedWrite {
                pid,
                pending: data.iter().copied().collect(),
                written: 0,
            });
            PipeWriteOutcome::Blocked
        } else {
            let n = pipe.buffer.push_slice(data);
            if n == data.len() {
                PipeWriteOutcome::Written(n)
            } else {
                pipe.blocked_writes.push_back(BlockedWrite {
                    pid,
                    pending: data[n..].iter().copied().collect(),
                    written: n,
                });
                PipeWriteOutcome::Blocked
            }
        };

        pipe.service(&mut wakeups);
        if outcome == PipeWriteOutcome::Blocked {
            // A waiting reader may drain the queue before the writer ever
            // suspends; report completion via the outcome, not a wakeup.
            if let Some(i) = wakeups.iter().position(|w| w.pid == pid) {
                if let Resume::Written(n) = wakeups.remove(i).resume {
                    debug!("Pipe '{}' write by PID {} drained inline", name, pid);
                    return Ok((PipeWriteOutcome::Written(n), wakeups));
                }
            }
        }
        Ok((outcome, wakeups))
    }

    /// Drain available bytes; an empty open pipe blocks the reader
    pub fn read(&self, name: &str, pid: Pid) -> IpcResult<(PipeReadOutcome, Vec<Wakeup>)> {
        let mut pipe = self.pipe_mut(name)?;
        let mut wakeups = Vec::new();

        // Readers already in line go first
        if pipe.read_waiters.is_empty() && !pipe.buffer.is_empty() {
            let mut data = vec![0u8; pipe.buffer.occupied_len()];
            let n = pipe.buffer.pop_slice(&mut data);
            data.truncate(n);
            pipe.service(&mut wakeups);
            return Ok((PipeReadOutcome::Data(data), wakeups));
        }

        if pipe.write_closed && pipe.buffer.is_empty() && pipe.blocked_writes.is_empty() {
            return Ok((PipeReadOutcome::Eof, wakeups));
        }

        pipe.read_waiters.push_back(pid);
        debug!("PID {} blocked reading pipe '{}'", pid, name);
        pipe.service(&mut wakeups);
        if let Some(i) = wakeups.iter().position(|w| w.pid == pid) {
            // Data surfaced while joining the queue
            let wake = wakeups.remove(i);
            let outcome = match wake.resume {
                Resume::PipeData(data) => PipeReadOutcome::Data(data),
                Resume::PipeEof => PipeReadOutcome::Eof,
                other => {
                    warn!("unexpected inline pipe resume: {:?}", other);
                    PipeReadOutcome::Blocked
                }
            };
            return Ok((outcome, wakeups));
        }
        Ok((PipeReadOutcome::Blocked, wakeups))
    }

    /// Close the write end: pending and future reads drain remaining data
    /// then observe end-of-stream
    pub fn close_write(&self, name: &str) -> IpcResult<Vec<Wakeup>> {
        let mut pipe = self.pipe_mut(name)?;
        pipe.write_closed = true;

        let mut wakeups = Vec::new();
        // Writers still owing bytes can never complete
        for blocked in pipe.blocked_writes.drain(..) {
            wakeups.push(Wakeup::new(
                blocked.pid,
                Resume::Error(IpcError::Closed(name.to_string())),
            ));
        }
        pipe.service(&mut wakeups);
        info!("Pipe '{}' write end closed", name);
        Ok(wakeups)
    }

    pub fn destroy(&self, name: &str) -> IpcResult<()> {
        let (_, pipe) = self
            .pipes
            .remove(name)
            .ok_or_else(|| IpcError::UnknownName {
                kind: "pipe",
                name: name.to_string(),
            })?;

        if let Err(e) = self.memory.release(pipe.allocation) {
            warn!("Destroying pipe '{}': stale allocation: {}", name, e);
        }
        info!("Pipe '{}' destroyed ({} bytes reclaimed)", name, pipe.capacity);
        Ok(())
    }

    /// Drop a terminated process from every wait queue
    pub fn cleanup_process(&self, pid: Pid) {
        for mut entry in self.pipes.iter_mut() {
            entry.read_waiters.retain(|p| *p != pid);
            entry.blocked_writes.retain(|w| w.pid != pid);
        }
    }

    pub fn info(&self) -> Vec<PipeInfo> {
        let mut all: Vec<PipeInfo> = self
            .pipes
            .iter()
            .map(|entry| PipeInfo {
                name: entry.key().clone(),
                capacity: entry.capacity,
                buffered: entry.buffered(),
                write_closed: entry.write_closed,
                blocked_readers: entry.read_waiters.len(),
                blocked_writers: entry.blocked_writes.len(),
            })
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn count(&self) -> usize {
        self.pipes.len()
    }

    fn pipe_mut(
        &self,
        name: &str,
    ) -> IpcResult<dashmap::mapref::one::RefMut<'_, String, Pipe, RandomState>> {
        self.pipes.get_mut(name).ok_or_else(|| IpcError::UnknownName {
            kind: "pipe",
            name: name.to_string(),
        })
    }
}

impl Clone for PipeManager {
    fn clone(&self) -> Self {
        Self {
            pipes: Arc::clone(&self.pipes),
            memory: self.memory.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pipes() -> PipeManager {
        PipeManager::new(MemoryManager::new(1 << 20))
    }

    #[test]
    fn test_write_then_read_preserves_order() {
        let pm = pipes();
        pm.create("p", 64, 1).unwrap();

        let (out, _) = pm.write("p", 1, b"abc").unwrap();
        assert_eq!(out, PipeWriteOutcome::Written(3));

        let (out, _) = pm.read("p", 2).unwrap();
        assert_eq!(out, PipeReadOutcome::Data(b"abc".to_vec()));
    }

    #[test]
    fn test_read_empty_blocks_until_write() {
        let pm = pipes();
        pm.create("p", 64, 1).unwrap();

        let (out, wakeups) = pm.read("p", 2).unwrap();
        assert_eq!(out, PipeReadOutcome::Blocked);
        assert!(wakeups.is_empty());

        let (out, wakeups) = pm.write("p", 1, b"data").unwrap();
        assert_eq!(out, PipeWriteOutcome::Written(4));
        assert_eq!(
            wakeups,
            vec![Wakeup::new(2, Resume::PipeData(b"data".to_vec()))]
        );
    }

    #[test]
    fn test_write_full_blocks_until_read() {
        let pm = pipes();
        pm.create("p", 4, 1).unwrap();

        let (out, _) = pm.write("p", 1, b"abcd").unwrap();
        assert_eq!(out, PipeWriteOutcome::Written(4));

        // Buffer full: the next write blocks with its payload queued
        let (out, wakeups) = pm.write("p", 3, b"ef").unwrap();
        assert_eq!(out, PipeWriteOutcome::Blocked);
        assert!(wakeups.is_empty());

        // A read frees space, drains the blocked writer, and wakes it
        let (out, wakeups) = pm.read("p", 2).unwrap();
        assert_eq!(out, PipeReadOutcome::Data(b"abcd".to_vec()));
        assert_eq!(wakeups, vec![Wakeup::new(3, Resume::Written(2))]);

        let (out, _) = pm.read("p", 2).unwrap();
        assert_eq!(out, PipeReadOutcome::Data(b"ef".to_vec()));
    }

    #[test]
    fn test_partial_write_blocks_for_remainder() {
        let pm = pipes();
        pm.create("p", 4, 1).unwrap();

        let (out, _) = pm.write("p", 1, b"abcdef").unwrap();
        assert_eq!(out, PipeWriteOutcome::Blocked);

        let (out, wakeups) = pm.read("p", 2).unwrap();
        assert_eq!(out, PipeReadOutcome::Data(b"abcd".to_vec()));
        assert_eq!(wakeups, vec![Wakeup::new(1, Resume::Written(6))]);

        let (out, _) = pm.read("p", 2).unwrap();
        assert_eq!(out, PipeReadOutcome::Data(b"ef".to_vec()));
    }

    #[test]
    fn test_close_write_drains_then_eof() {
        let pm = pipes();
        pm.create("p", 64, 1).unwrap();
        pm.write("p", 1, b"tail").unwrap();

        pm.close_write("p").unwrap();

        let (out, _) = pm.read("p", 2).unwrap();
        assert_eq!(out, PipeReadOutcome::Data(b"tail".to_vec()));

        let (out, _) = pm.read("p", 2).unwrap();
        assert_eq!(out, PipeReadOutcome::Eof);
    }

    #[test]
    fn test_close_write_wakes_blocked_reader_with_eof() {
        let pm = pipes();
        pm.create("p", 64, 1).unwrap();

        let (out, _) = pm.read("p", 2).unwrap();
        assert_eq!(out, PipeReadOutcome::Blocked);

        let wakeups = pm.close_write("p").unwrap();
        assert_eq!(wakeups, vec![Wakeup::new(2, Resume::PipeEof)]);
    }

    #[test]
    fn test_write_after_close_rejected() {
        let pm = pipes();
        pm.create("p", 64, 1).unwrap();
        pm.close_write("p").unwrap();
        assert!(matches!(
            pm.write("p", 1, b"x"),
            Err(IpcError::Closed(_))
        ));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let pm = pipes();
        pm.create("p", 8, 1).unwrap();
        assert!(matches!(
            pm.create("p", 8, 1),
            Err(IpcError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_cleanup_removes_waiters() {
        let pm = pipes();
        pm.create("p", 4, 1).unwrap();
        pm.read("p", 2).unwrap();

        pm.cleanup_process(2);
        let (out, wakeups) = pm.write("p", 1, b"x").unwrap();
        assert_eq!(out, PipeWriteOutcome::Written(1));
        assert!(wakeups.is_empty());
    }
}
