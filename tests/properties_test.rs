/*!
 * Property Tests
 * Model-checked invariants for memory accounting, semaphores, and pipes
 */

use microkernel_sim::core::types::AllocationId;
use microkernel_sim::ipc::{PipeReadOutcome, PipeWriteOutcome, SemOutcome, SemaphoreManager};
use microkernel_sim::memory::MemoryManager;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum MemOp {
    Alloc(usize),
    Release(usize),
}

fn mem_op() -> impl Strategy<Value = MemOp> {
    prop_oneof![
        (1usize..4096).prop_map(MemOp::Alloc),
        (0usize..32).prop_map(MemOp::Release),
    ]
}

proptest! {
    /// For every allocate/release sequence, used memory tracks the live
    /// reservations exactly and never exceeds capacity.
    #[test]
    fn memory_accounting_is_exact(ops in proptest::collection::vec(mem_op(), 1..64)) {
        let capacity = 16 * 1024;
        let mem = MemoryManager::new(capacity);
        let mut live: Vec<(AllocationId, usize)> = Vec::new();
        let mut model_used = 0usize;

        for op in ops {
            match op {
                MemOp::Alloc(size) => {
                    match mem.allocate(size, 1) {
                        Ok(id) => {
                            live.push((id, size));
                            model_used += size;
                        }
                        Err(_) => {
                            // A rejected allocation must leave no trace
                            prop_assert!(model_used + size > capacity);
                        }
                    }
                }
                MemOp::Release(pick) => {
                    if !live.is_empty() {
                        let (id, size) = live.remove(pick % live.len());
                        prop_assert_eq!(mem.release(id).unwrap(), size);
                        model_used -= size;
                    }
                }
            }

            let (total, used, available) = mem.info();
            prop_assert_eq!(used, model_used);
            prop_assert!(used <= total);
            prop_assert_eq!(available, total - used);
        }
    }

    /// A signal increments the count or wakes exactly one waiter, never
    /// both; the count can never go negative (it is unsigned by type).
    #[test]
    fn semaphore_signal_increments_xor_wakes(
        initial in 0u32..4,
        ops in proptest::collection::vec(any::<bool>(), 1..64),
    ) {
        let sm = SemaphoreManager::new();
        sm.create("s", initial).unwrap();

        let mut next_pid = 1u32;
        let mut model_count = initial;
        let mut model_waiters = 0usize;

        for is_wait in ops {
            if is_wait {
                let outcome = sm.wait("s", next_pid).unwrap();
                next_pid += 1;
                if model_count > 0 {
                    prop_assert_eq!(outcome, SemOutcome::Acquired);
                    model_count -= 1;
                } else {
                    prop_assert_eq!(outcome, SemOutcome::Blocked);
                    model_waiters += 1;
                }
            } else {
                let woke = sm.signal("s").unwrap();
                if model_waiters > 0 {
                    // Grant-on-wake: the waiter got the permit, count untouched
                    prop_assert!(woke.is_some());
                    model_waiters -= 1;
                } else {
                    prop_assert!(woke.is_none());
                    model_count += 1;
                }
            }
            prop_assert_eq!(sm.value("s").unwrap(), model_count);
        }
    }

    /// Draining a pipe returns exactly the concatenation of everything
    /// written, in write order.
    #[test]
    fn pipe_preserves_byte_order(
        chunks in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..16),
            1..10,
        ),
    ) {
        let k = microkernel_sim::Kernel::new(microkernel_sim::KernelConfig::default());
        let writer = k.create_process("writer", 1, 16).unwrap();
        let reader = k.create_process("reader", 1, 16).unwrap();
        k.pipe_create("p", 1024, writer).unwrap();

        let mut expected = Vec::new();
        for chunk in &chunks {
            let outcome = k.pipe_write("p", writer, chunk).unwrap();
            prop_assert_eq!(outcome, PipeWriteOutcome::Written(chunk.len()));
            expected.extend_from_slice(chunk);
        }

        match k.pipe_read("p", reader).unwrap() {
            PipeReadOutcome::Data(data) => prop_assert_eq!(data, expected),
            PipeReadOutcome::Blocked => prop_assert!(expected.is_empty()),
            PipeReadOutcome::Eof => prop_assert!(false, "write end never closed"),
        }
    }
}
