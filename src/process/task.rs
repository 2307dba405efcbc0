/*!
 * Process Bodies
 * Resumable continuation records for cooperative execution
 *
 * A process body is an explicit state machine, not a language-level
 * coroutine: each step receives the payload produced by its previous
 * suspension point and returns the next kernel request. Blocking and
 * unblocking are driven entirely by the kernel tick loop.
 */

use crate::core::types::{Pid, Size};
use crate::ipc::types::{IpcError, Message};
use std::time::Duration;

/// Request issued by a process body at a suspension point
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Syscall {
    /// Give up the remainder of the slice voluntarily
    Yield,
    /// Finish execution; the kernel terminates the process
    Exit,
    /// Fire-and-forget message to another mailbox
    Send { to: Pid, data: Vec<u8> },
    /// Pop the oldest pending message, blocking while the mailbox is empty
    Receive { timeout: Option<Duration> },
    /// Decrement the semaphore, blocking while its count is zero
    SemWait { name: String },
    /// Increment the semaphore or wake its longest waiter
    SemSignal { name: String },
    /// Append to the pipe, blocking while the buffer is full
    PipeWrite { name: String, data: Vec<u8> },
    /// Drain the pipe, blocking while it is empty and the write end is open
    PipeRead { name: String },
}

/// Payload delivered to a body when it resumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resume {
    /// First step after the process is started
    Start,
    /// Previous request completed with nothing to deliver
    Next,
    /// A message arrived for a pending receive
    Message(Message),
    /// The bounded receive wait expired
    Timeout,
    /// The semaphore permit was granted
    SemAcquired,
    /// Pipe data for a pending read
    PipeData(Vec<u8>),
    /// The pipe write end closed and the buffer is drained
    PipeEof,
    /// A pipe write fully completed
    Written(Size),
    /// The previous request was rejected
    Error(IpcError),
}

/// A resumable process body
pub trait ProcessBody: Send {
    fn step(&mut self, resume: Resume) -> Syscall;
}

impl<F> ProcessBody for F
where
    F: FnMut(Resume) -> Syscall + Send,
{
    fn step(&mut self, resume: Resume) -> Syscall {
        self(resume)
    }
}
