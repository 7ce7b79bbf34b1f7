
/// Severity taxonomy, ordered from most to least important.
///
/// A record at level `L` is persisted iff `L as i8 <= log threshold` and
/// displayed on the console iff `L as i8 <= display threshold`. Thresholds
/// range over `[-1, 6]`; `-1` disables the channel entirely, which is why
/// they are carried as `i8` rather than as a `Level`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
  Sys = 0,
  Fatal = 1,
  Error = 2,
  Warn = 3,
  Info = 4,
  Debug = 5,
  Trace = 6,
}

/// Threshold value that disables a channel.
pub const DISABLED: i8 = -1;

/// Highest meaningful threshold; `set_log_level`/`set_disp_level` ignore
/// anything above it.
pub const MAX_LEVEL: i8 = 6;

impl Level {
  /// Four-character tag used in the record line.
  pub fn tag(self) -> &'static str {
    match self {
      Level::Sys => "====",
      Level::Fatal => "FATL",
      Level::Error => "ERRO",
      Level::Warn => "WARN",
      Level::Info => "INFO",
      Level::Debug => "DEBG",
      Level::Trace => "TRAC",
    }
  }

  pub fn from_i8(value: i8) -> Option<Self> {
    match value {
      0 => Some(Level::Sys),
      1 => Some(Level::Fatal),
      2 => Some(Level::Error),
      3 => Some(Level::Warn),
      4 => Some(Level::Info),
      5 => Some(Level::Debug),
      6 => Some(Level::Trace),
      _ => None,
    }
  }

  #[inline]
  pub fn as_i8(self) -> i8 {
    self as i8
  }
}

impl std::fmt::Display for Level {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.tag())
  }
}
