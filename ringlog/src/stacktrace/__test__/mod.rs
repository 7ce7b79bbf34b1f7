#[cfg(test)]
mod __test__ {

  use crate::stacktrace::{capture, interpret, MAX_FRAMES};

  #[inline(never)]
  fn nested_capture() -> crate::stacktrace::FrameBuf {
    capture()
  }

  #[test]
  fn test_capture_returns_frames() {
    let frames = nested_capture();
    assert!(!frames.is_empty());
    assert!(frames.len() <= MAX_FRAMES);
  }

  #[test]
  fn test_capture_spills_nothing_inline() {
    let frames = nested_capture();
    assert!(!frames.spilled());
  }

  #[test]
  fn test_interpret_formats_frame_lines() {
    let frames = nested_capture();
    let mut out = String::new();
    interpret(&frames, &mut out);

    assert!(!out.is_empty());
    for line in out.lines() {
      assert!(line.starts_with('#'), "bad frame line: {}", line);
      assert!(line.contains(" in "), "bad frame line: {}", line);
      assert!(line.contains(" at "), "bad frame line: {}", line);
    }
  }

  #[test]
  fn test_interpret_empty_input() {
    let mut out = String::new();
    interpret(&[], &mut out);
    assert!(out.is_empty());
  }
}
