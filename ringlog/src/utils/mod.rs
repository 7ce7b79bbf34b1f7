
use std::cell::Cell;

fn hash_current_thread() -> u32 {
  use std::collections::hash_map::DefaultHasher;
  use std::hash::{Hash, Hasher};
  let mut hasher = DefaultHasher::new();
  std::thread::current().id().hash(&mut hasher);
  (hasher.finish() & 0xffff) as u32
}

thread_local! {
  static THREAD_HASH: Cell<Option<u32>> = const { Cell::new(None) };
}

/// Low 16 bits of the current thread id's hash, stable for the thread's
/// lifetime. Computed once per thread.
pub fn current_thread_hash() -> u32 {
  THREAD_HASH.with(|cached| match cached.get() {
    Some(h) => h,
    None => {
      let h = hash_current_thread();
      cached.set(Some(h));
      h
    },
  })
}

/// Kernel-level thread id. Zero on platforms without one.
#[cfg(target_os = "linux")]
pub fn kernel_tid() -> u64 {
  unsafe { libc::syscall(libc::SYS_gettid) as u64 }
}

#[cfg(not(target_os = "linux"))]
pub fn kernel_tid() -> u64 {
  0
}
