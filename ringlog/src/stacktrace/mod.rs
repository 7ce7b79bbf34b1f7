mod __test__;

use std::fmt::Write;

use smallvec::SmallVec;

/// Capture depth bound. Frames beyond this are dropped.
pub const MAX_FRAMES: usize = 128;

/// Raw return addresses with inline storage, so capturing never allocates.
pub type FrameBuf = SmallVec<[usize; MAX_FRAMES]>;

/// Capture the current thread's raw return addresses.
///
/// Only walks the stack; no symbolication, no allocation. This is the half
/// that runs inside signal handlers.
pub fn capture() -> FrameBuf {
  let mut frames = FrameBuf::new();
  unsafe {
    backtrace::trace_unsynchronized(|frame| {
      frames.push(frame.ip() as usize);
      frames.len() < MAX_FRAMES
    });
  }
  frames
}

/// Resolve raw addresses into `#NN 0x<addr> in <name>() at <file>:<line>`
/// lines appended to `out`. Symbolication may allocate and take locks, so
/// this half runs only after every thread has deposited its raw pointers.
pub fn interpret(frames: &[usize], out: &mut String) {
  // The first frame is the capture call itself.
  for (num, addr) in frames.iter().copied().skip(1).enumerate() {
    let _ = write!(out, "#{:<2} 0x{:016x} in ", num, addr);
    let mut resolved = false;
    backtrace::resolve(addr as *mut std::ffi::c_void, |symbol| {
      if resolved {
        return;
      }
      resolved = true;
      match symbol.name() {
        Some(name) => {
          let _ = write!(out, "{}()", name);
        },
        None => {
          let _ = out.write_str("<unknown>()");
        },
      }
      match (symbol.filename(), symbol.lineno()) {
        (Some(file), Some(line)) => {
          let _ = write!(out, " at {}:{}", file.display(), line);
        },
        _ => {
          let _ = out.write_str(" at ??:?");
        },
      }
    });
    if !resolved {
      let _ = out.write_str("<unknown>() at ??:?");
    }
    out.push('\n');
  }
}
