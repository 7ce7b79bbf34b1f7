mod __test__;

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::slot::Slot;

/// Default number of slots in a logger's ring.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Fixed-capacity circular buffer of [`Slot`]s with a single atomic write
/// cursor. This is the concurrent append primitive: producers claim an index
/// with one CAS and then run the slot's own state machine, so the hot path
/// takes no mutex.
///
/// The cursor is monotonic modulo the capacity. Claiming an index does not
/// mean the slot is free: after a wrap the slot may still be DIRTY (waiting
/// for the flusher) or FLUSHING. Cooperation with the flusher on such slots
/// is the caller's job, because it needs the output sink. Two producers may
/// finish out of claim order; the flusher tolerates that, it only requires
/// DIRTY slots, not contiguous ones.
pub struct Ring {
  slots: Box<[Slot]>,
  cursor: AtomicUsize,
}

impl Ring {
  pub fn new(capacity: usize) -> Self {
    assert!(capacity > 0, "ring capacity must be greater than 0");
    let slots: Vec<Slot> = (0..capacity).map(|_| Slot::new()).collect();
    Self {
      slots: slots.into_boxed_slice(),
      cursor: AtomicUsize::new(0),
    }
  }

  /// Claim the next ring index. Retries the CAS until it wins; the returned
  /// index is owned by the caller for one record.
  pub fn reserve(&self) -> usize {
    loop {
      let cur = self.cursor.load(Ordering::Relaxed);
      let next = (cur + 1) % self.slots.len();
      if self
        .cursor
        .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Relaxed)
        .is_ok()
      {
        return cur;
      }
    }
  }

  /// Next index a producer would claim; flush sweeps start here so the
  /// oldest pending record is written first.
  #[inline]
  pub fn cursor(&self) -> usize {
    self.cursor.load(Ordering::Acquire)
  }

  #[inline]
  pub fn slot(&self, index: usize) -> &Slot {
    &self.slots[index]
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.slots.len()
  }

  /// True if any slot still holds an unflushed record.
  pub fn has_dirty(&self) -> bool {
    self.slots.iter().any(|s| s.needs_flush())
  }
}
