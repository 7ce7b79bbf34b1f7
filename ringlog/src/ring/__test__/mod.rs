#[cfg(test)]
mod __test__ {

  use crate::ring::Ring;

  use std::collections::HashSet;
  use std::sync::{Arc, Mutex};
  use std::thread;

  #[test]
  fn test_reserve_cycles_through_indices() {
    let ring = Ring::new(4);
    assert_eq!(ring.reserve(), 0);
    assert_eq!(ring.reserve(), 1);
    assert_eq!(ring.reserve(), 2);
    assert_eq!(ring.reserve(), 3);
    assert_eq!(ring.reserve(), 0);
  }

  #[test]
  fn test_cursor_points_at_next_claim() {
    let ring = Ring::new(8);
    assert_eq!(ring.cursor(), 0);
    ring.reserve();
    ring.reserve();
    assert_eq!(ring.cursor(), 2);
  }

  #[test]
  fn test_concurrent_reserve_hands_out_unique_indices() {
    // Total reservations stay below the capacity so every claimed index
    // must be distinct.
    let ring = Arc::new(Ring::new(1024));
    let claimed = Arc::new(Mutex::new(Vec::new()));
    let num_threads = 4;
    let per_thread = 200;

    let mut handles = vec![];
    for _ in 0..num_threads {
      let ring = Arc::clone(&ring);
      let claimed = Arc::clone(&claimed);
      handles.push(thread::spawn(move || {
        let mut local = Vec::with_capacity(per_thread);
        for _ in 0..per_thread {
          local.push(ring.reserve());
        }
        claimed.lock().unwrap().extend(local);
      }));
    }
    for handle in handles {
      handle.join().unwrap();
    }

    let claimed = claimed.lock().unwrap();
    let unique: HashSet<usize> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), num_threads * per_thread);
    assert_eq!(unique.len(), num_threads * per_thread);
  }

  #[test]
  fn test_has_dirty_tracks_slot_state() {
    let ring = Ring::new(4);
    assert!(!ring.has_dirty());

    let idx = ring.reserve();
    assert!(ring.slot(idx).try_write(b"pending\n"));
    assert!(ring.has_dirty());

    let mut sink = Vec::new();
    assert!(ring.slot(idx).try_flush(&mut sink));
    assert!(!ring.has_dirty());
  }
}
