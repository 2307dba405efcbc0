/*!
 * Core Types
 * Common types used across the kernel simulation
 */

/// Process ID type
pub type Pid = u32;

/// Size type for memory operations
pub type Size = usize;

/// Priority level (0-255, higher is more urgent)
pub type Priority = u8;

/// Timestamp in microseconds since the Unix epoch
pub type Timestamp = u64;

/// Identifier of a memory reservation held by the accountant
pub type AllocationId = u64;

/// Current wall-clock timestamp in microseconds
pub fn now_micros() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as Timestamp)
        .unwrap_or(0)
}
