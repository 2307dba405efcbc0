/*!
 * IPC Types
 * Common types for inter-process communication
 */

use crate::core::types::{now_micros, Pid, Size, Timestamp};
use crate::process::task::Resume;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// IPC operation result
pub type IpcResult<T> = Result<T, IpcError>;

/// Unified IPC error type
// Serialize only: the static `kind` tags cannot be borrowed back out of a
// deserializer.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum IpcError {
    #[error("unknown destination process {0}")]
    UnknownDestination(Pid),

    #[error("process {0} not found")]
    UnknownProcess(Pid),

    #[error("no {kind} named '{name}'")]
    UnknownName { kind: &'static str, name: String },

    #[error("{kind} '{name}' already exists")]
    DuplicateName { kind: &'static str, name: String },

    #[error("mailbox for process {pid} full ({limit} messages)")]
    MailboxFull { pid: Pid, limit: usize },

    #[error("process {pid} is not attached to segment '{name}'")]
    NotAttached { name: String, pid: Pid },

    #[error("access beyond segment '{name}': offset {offset} + {len} > {size}")]
    OutOfBounds {
        name: String,
        offset: Size,
        len: Size,
        size: Size,
    },

    #[error("write end of pipe '{0}' is closed")]
    Closed(String),

    #[error("allocation failed: {0}")]
    AllocationFailed(String),
}

/// IPC message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub from: Pid,
    pub to: Pid,
    pub data: Vec<u8>,
    pub timestamp: Timestamp,
}

impl Message {
    pub fn new(from: Pid, to: Pid, data: Vec<u8>) -> Self {
        Self {
            from,
            to,
            data,
            timestamp: now_micros(),
        }
    }
}

/// A process to wake, with the payload its body receives on resume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wakeup {
    pub pid: Pid,
    pub resume: Resume,
}

impl Wakeup {
    pub fn new(pid: Pid, resume: Resume) -> Self {
        Self { pid, resume }
    }
}

/// Immediate outcome of a receive attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecvOutcome {
    Message(Message),
    /// Mailbox empty; the caller is registered as a waiter
    Blocked,
}

/// Immediate outcome of a semaphore wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemOutcome {
    Acquired,
    /// Count was zero; the caller joined the FIFO wait queue
    Blocked,
}

/// Immediate outcome of a pipe read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeReadOutcome {
    Data(Vec<u8>),
    /// Write end closed and buffer drained
    Eof,
    /// Buffer empty; the caller joined the reader wait queue
    Blocked,
}

/// Immediate outcome of a pipe write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeWriteOutcome {
    Written(Size),
    /// Buffer full; the remainder is queued with the blocked writer
    Blocked,
}

/// IPC statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IpcStats {
    pub pending_messages: usize,
    pub semaphores: usize,
    pub shm_segments: usize,
    pub shm_bytes: Size,
    pub pipes: usize,
}
