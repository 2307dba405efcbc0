/*!
 * Mailboxes
 * Per-process ordered message queues with bounded receive waits
 */

use super::types::{IpcError, IpcResult, Message, RecvOutcome, Wakeup};
use crate::core::types::Pid;
use crate::process::task::Resume;
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, info};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// Mailbox manager
///
/// Delivery preserves send order. A process waits only on its own mailbox,
/// so at most one waiter exists per queue.
pub struct MailboxManager {
    queues: Arc<DashMap<Pid, VecDeque<Message>, RandomState>>,
    /// Blocked receivers and their optional deadlines
    waiting: Arc<DashMap<Pid, Option<Instant>, RandomState>>,
    /// Maximum queued messages per mailbox; 0 means unbounded
    limit: usize,
}

impl MailboxManager {
    pub fn new(limit: usize) -> Self {
        info!(
            "Mailbox manager initialized (per-mailbox limit: {})",
            if limit == 0 { "unbounded".to_string() } else { limit.to_string() }
        );
        Self {
            queues: Arc::new(DashMap::with_hasher(RandomState::new())),
            waiting: Arc::new(DashMap::with_hasher(RandomState::new())),
            limit,
        }
    }

    /// Create the mailbox for a new process
    pub fn ensure(&self, pid: Pid) {
        self.queues.entry(pid).or_default();
    }

    /// Append a message to the destination mailbox
    ///
    /// If the destination is blocked in a receive, the message is handed to
    /// it directly and a wakeup is produced.
    pub fn send(&self, message: Message) -> IpcResult<Option<Wakeup>> {
        let to = message.to;
        let mut queue = self
            .queues
            .get_mut(&to)
            .ok_or(IpcError::UnknownDestination(to))?;

        if self.limit > 0 && queue.len() >= self.limit {
            return Err(IpcError::MailboxFull {
                pid: to,
                limit: self.limit,
            });
        }

        debug!("Message {} -> {} ({} bytes)", message.from, to, message.data.len());
        queue.push_back(message);

        if self.waiting.remove(&to).is_some() {
            let delivered = queue.pop_front().expect("just pushed");
            return Ok(Some(Wakeup::new(to, Resume::Message(delivered))));
        }
        Ok(None)
    }

    /// Pop the oldest pending message, or register the caller as a waiter
    pub fn receive(&self, pid: Pid, deadline: Option<Instant>) -> IpcResult<RecvOutcome> {
        let mut queue = self
            .queues
            .get_mut(&pid)
            .ok_or(IpcError::UnknownProcess(pid))?;

        if let Some(message) = queue.pop_front() {
            return Ok(RecvOutcome::Message(message));
        }

        self.waiting.insert(pid, deadline);
        debug!("PID {} blocked on empty mailbox", pid);
        Ok(RecvOutcome::Blocked)
    }

    /// Wake every waiter whose deadline has passed with a `Timeout` payload
    pub fn poll_timeouts(&self, now: Instant) -> Vec<Wakeup> {
        let expired: Vec<Pid> = self
            .waiting
            .iter()
            .filter(|entry| entry.value().is_some_and(|d| d <= now))
            .map(|entry| *entry.key())
            .collect();

        expired
            .into_iter()
            .filter(|pid| self.waiting.remove(pid).is_some())
            .map(|pid| Wakeup::new(pid, Resume::Timeout))
            .collect()
    }

    pub fn pending(&self, pid: Pid) -> usize {
        self.queues.get(&pid).map(|q| q.len()).unwrap_or(0)
    }

    pub fn total_pending(&self) -> usize {
        self.queues.iter().map(|q| q.len()).sum()
    }

    /// Remove all trace of a terminated process
    pub fn cleanup_process(&self, pid: Pid) {
        self.queues.remove(&pid);
        self.waiting.remove(&pid);
    }
}

impl Clone for MailboxManager {
    fn clone(&self) -> Self {
        Self {
            queues: Arc::clone(&self.queues),
            waiting: Arc::clone(&self.waiting),
            limit: self.limit,
        }
    }
}
