
use std::cell::UnsafeCell;
use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};

/// Fixed capacity of one slot's message buffer. Records longer than this
/// are truncated, which is permitted and non-fatal.
pub const MSG_SIZE: usize = 4096;

const CLEAN: u8 = 0;
const WRITING: u8 = 1;
const DIRTY: u8 = 2;
const FLUSHING: u8 = 3;

/// One ring cell: a fixed-size byte buffer plus a four-state status machine.
///
/// The status atomic is the only field touched concurrently. Buffer bytes and
/// length are written only while the status is WRITING and read only while it
/// is FLUSHING; the CAS transitions CLEAN→WRITING and DIRTY→FLUSHING grant
/// that exclusive access, and the release stores WRITING→DIRTY and
/// FLUSHING→CLEAN publish it. Acquire on the CAS pairs with the release on
/// the store, so the producer's buffer write happens-before the flusher's
/// read without any lock.
pub struct Slot {
  status: AtomicU8,
  len: UnsafeCell<usize>,
  buf: UnsafeCell<[u8; MSG_SIZE]>,
}

// Concurrent access to `len` and `buf` is serialized by the status machine.
unsafe impl Sync for Slot {}

impl Slot {
  pub fn new() -> Self {
    Self {
      status: AtomicU8::new(CLEAN),
      len: UnsafeCell::new(0),
      buf: UnsafeCell::new([0u8; MSG_SIZE]),
    }
  }

  /// Try to store a record. Fails without side effects when the slot is not
  /// CLEAN (still dirty, or mid-flush).
  pub fn try_write(&self, msg: &[u8]) -> bool {
    if self
      .status
      .compare_exchange(CLEAN, WRITING, Ordering::Acquire, Ordering::Relaxed)
      .is_err()
    {
      return false;
    }

    let n = msg.len().min(MSG_SIZE);
    unsafe {
      (&mut *self.buf.get())[..n].copy_from_slice(&msg[..n]);
      *self.len.get() = n;
    }

    self.status.store(DIRTY, Ordering::Release);
    true
  }

  /// Try to drain a dirty record into `sink`. Fails without side effects
  /// when the slot is not DIRTY. Sink errors are swallowed; the slot still
  /// returns to CLEAN so the ring never wedges on a bad file handle.
  pub fn try_flush<W: Write>(&self, sink: &mut W) -> bool {
    if self
      .status
      .compare_exchange(DIRTY, FLUSHING, Ordering::Acquire, Ordering::Relaxed)
      .is_err()
    {
      return false;
    }

    unsafe {
      let n = *self.len.get();
      let _ = sink.write_all(&(&*self.buf.get())[..n]);
    }

    self.status.store(CLEAN, Ordering::Release);
    true
  }

  /// True if the slot holds a record waiting for the flusher.
  #[inline]
  pub fn needs_flush(&self) -> bool {
    self.status.load(Ordering::Acquire) == DIRTY
  }

  /// True if no other thread is working on the slot right now.
  #[inline]
  pub fn is_available(&self) -> bool {
    matches!(self.status.load(Ordering::Acquire), CLEAN | DIRTY)
  }
}

impl Default for Slot {
  fn default() -> Self {
    Self::new()
  }
}
