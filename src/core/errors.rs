/*!
 * Error Types
 * Centralized error handling with thiserror
 */

use thiserror::Error;

pub use crate::ipc::types::IpcError;
pub use crate::memory::types::MemoryError;
pub use crate::process::types::ProcessError;
pub use crate::sched::SchedulerError;
pub use crate::services::ServiceError;

/// Unified kernel error type
///
/// No variant is fatal to the kernel itself: every rejection is a typed
/// outcome returned to the caller, never an uncontrolled abort.
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("ipc error: {0}")]
    Ipc(#[from] IpcError),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for KernelError {
    fn from(err: std::io::Error) -> Self {
        KernelError::Io(err.to_string())
    }
}

/// Result type for kernel operations
pub type Result<T> = std::result::Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_error_display() {
        let err = KernelError::Configuration("bad quantum".into());
        assert_eq!(err.to_string(), "configuration error: bad quantum");
    }

    #[test]
    fn test_memory_error_converts() {
        let mem = MemoryError::OutOfMemory {
            requested: 2048,
            available: 1024,
            used: 1024,
            total: 2048,
        };
        let err: KernelError = mem.into();
        assert!(matches!(err, KernelError::Memory(_)));
    }
}
