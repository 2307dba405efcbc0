/*!
 * Microkernel Simulator
 *
 * A userspace simulation of a minimal kernel: process table with memory
 * accounting, pluggable scheduling policies, cooperative IPC primitives
 * (mailboxes, semaphores, shared memory, pipes), and a health-gated
 * registry of user-space services.
 *
 * Everything hangs off an explicit [`Kernel`] context object; there is no
 * global state. Blocking is simulated cooperatively: process bodies are
 * resumable continuation records driven by the kernel tick loop.
 */

pub mod config;
pub mod core;
pub mod ipc;
pub mod kernel;
pub mod memory;
pub mod process;
pub mod sched;
pub mod services;
pub mod shell;

pub use crate::config::KernelConfig;
pub use crate::core::{KernelError, Result};
pub use crate::ipc::{IpcManager, Message};
pub use crate::kernel::{Kernel, KernelStats, TickOutcome};
pub use crate::memory::MemoryManager;
pub use crate::process::task::{ProcessBody, Resume, Syscall};
pub use crate::process::{ProcessState, ProcessTable};
pub use crate::sched::{Policy, Scheduler};
pub use crate::services::{Health, Service, ServiceRegistry};
pub use crate::shell::Shell;
