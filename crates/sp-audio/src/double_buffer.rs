//! Double-buffered synthesis → callback handoff
//!
//! Two slots per channel, each one synthesis block long. The producer (the
//! synthesis driver) fills the slot selected by `write_index`, marks it
//! ready and flips the index; the audio callback always drains the opposite
//! slot and never blocks.
//!
//! CRITICAL: the consumer side is the audio thread. All of its operations
//! are wait-free: an atomic ready check, a plain read of the slot data, an
//! atomic release. Only the producer parks on the condvar (when the
//! callback has not yet drained the target slot).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use sp_core::Sample;

/// One handoff slot: a stereo pair of block-sized buffers and a ready flag.
///
/// `ready = false`: writable by the producer. `ready = true`: readable by
/// the consumer. The flag is flipped with release stores and observed with
/// acquire loads, which orders the buffer contents across threads.
struct AudioSlot {
    ready: AtomicBool,
    left: UnsafeCell<Box<[Sample]>>,
    right: UnsafeCell<Box<[Sample]>>,
}

impl AudioSlot {
    fn new(block_size: usize) -> Self {
        Self {
            ready: AtomicBool::new(false),
            left: UnsafeCell::new(vec![0.0; block_size].into_boxed_slice()),
            right: UnsafeCell::new(vec![0.0; block_size].into_boxed_slice()),
        }
    }
}

/// The two-slot audio double buffer.
pub struct AudioDoubleBuffer {
    slots: [AudioSlot; 2],
    /// Slot the producer targets next; the consumer reads the opposite one.
    write_index: AtomicUsize,
    /// Producer-only parking. The consumer never takes this lock.
    produce_lock: Mutex<()>,
    slot_freed: Condvar,
    shutdown: AtomicBool,
    block_size: usize,
}

// SAFETY: slot buffers are accessed under the ready-flag protocol. The
// producer writes a slot only while `ready == false` and publishes with a
// release store; the consumer reads only after an acquire load observes
// `ready == true` and relinquishes with a release store back to false.
// Each flag transition is a happens-before edge over the buffer contents.
unsafe impl Send for AudioDoubleBuffer {}
unsafe impl Sync for AudioDoubleBuffer {}

impl AudioDoubleBuffer {
    pub fn new(block_size: usize) -> Self {
        Self {
            slots: [AudioSlot::new(block_size), AudioSlot::new(block_size)],
            write_index: AtomicUsize::new(0),
            produce_lock: Mutex::new(()),
            slot_freed: Condvar::new(),
            shutdown: AtomicBool::new(false),
            block_size,
        }
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Unblock a producer stuck waiting for a slot (used at teardown, after
    /// the audio stream has been stopped).
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.slot_freed.notify_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    // ── Producer side (synthesis driver) ────────────────────────────────

    /// Write one block into the current write slot, blocking while the slot
    /// is still unread. Returns false when shut down before the slot freed.
    pub fn write_block(&self, left: &[Sample], right: &[Sample]) -> bool {
        debug_assert_eq!(left.len(), self.block_size);
        debug_assert_eq!(right.len(), self.block_size);

        let idx = self.write_index.load(Ordering::Relaxed);
        {
            let mut guard = self.produce_lock.lock();
            while self.slots[idx].ready.load(Ordering::Acquire) {
                if self.is_shut_down() {
                    return false;
                }
                let _ = self
                    .slot_freed
                    .wait_for(&mut guard, Duration::from_millis(10));
            }
        }

        // SAFETY: ready == false observed above, so the consumer will not
        // touch this slot until the release store below.
        unsafe {
            (*self.slots[idx].left.get()).copy_from_slice(left);
            (*self.slots[idx].right.get()).copy_from_slice(right);
        }

        self.slots[idx].ready.store(true, Ordering::Release);
        self.write_index.store(1 - idx, Ordering::Release);
        true
    }

    // ── Consumer side (audio callback; wait-free) ───────────────────────

    /// Check whether a slot holds an unread block.
    #[inline]
    pub fn slot_ready(&self, idx: usize) -> bool {
        self.slots[idx & 1].ready.load(Ordering::Acquire)
    }

    /// Borrow a slot's channel data.
    ///
    /// # Safety
    /// Callers must have observed `slot_ready(idx)` and must not hold the
    /// borrow past `release_slot(idx)`.
    #[inline]
    pub unsafe fn slot_data(&self, idx: usize) -> (&[Sample], &[Sample]) {
        let slot = &self.slots[idx & 1];
        (&*slot.left.get(), &*slot.right.get())
    }

    /// Hand a drained slot back to the producer.
    #[inline]
    pub fn release_slot(&self, idx: usize) {
        self.slots[idx & 1].ready.store(false, Ordering::Release);
        self.slot_freed.notify_one();
    }

    /// Index the producer will fill next (test/diagnostic aid).
    pub fn write_index(&self) -> usize {
        self.write_index.load(Ordering::Acquire)
    }
}
