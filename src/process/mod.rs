/*!
 * Process Management
 * Process table, record types, and resumable body contracts
 */

pub mod table;
pub mod task;
pub mod types;

pub use table::ProcessTable;
pub use task::{ProcessBody, Resume, Syscall};
pub use types::{ProcessError, ProcessInfo, ProcessResult, ProcessState};
