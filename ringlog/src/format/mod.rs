mod __test__;

use std::fmt::{self, Write};

use chrono::{DateTime, FixedOffset, Local, Utc};

use crate::level::Level;

const RESET: &str = "\x1b[0m";
const GREEN: &str = "\x1b[32m";
const D_GRAY: &str = "\x1b[1;30m";
const B_RED: &str = "\x1b[1;31m";
const B_BROWN: &str = "\x1b[1;33m";
const B_MAGENTA: &str = "\x1b[1;35m";
const WHITE_FG_RED_BG: &str = "\x1b[37;41m";

/// Call-site location injected by the log macros.
#[derive(Debug, Clone, Copy)]
pub struct SourceLoc {
  pub file: &'static str,
  pub func: &'static str,
  pub line: u32,
}

impl SourceLoc {
  pub fn new(file: &'static str, func: &'static str, line: u32) -> Self {
    Self { file, func, line }
  }
}

/// Suffix after the last `/` or `\`.
pub fn basename(path: &str) -> &str {
  match path.rfind(|c| c == '/' || c == '\\') {
    Some(idx) => &path[idx + 1..],
    None => path,
  }
}

/// Local timezone as a fixed offset, sampled once.
pub fn local_tz_offset() -> FixedOffset {
  let secs = Local::now().offset().local_minus_utc();
  FixedOffset::east_opt(secs).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
}

/// Renders records into byte buffers.
///
/// The file form is the fixed grammar
/// `<iso-ts> [<tid-hex4>] [<lvl4>] <body>[\t[<basename>:<line>, <func>()]]\n`;
/// the console form drops the date and wraps the level tag (and, for Sys and
/// Fatal, the body) in ANSI colors. The timezone offset is captured at
/// construction so every record of a logger carries the same `±HH:MM`.
pub struct Formatter {
  tz: FixedOffset,
}

impl Formatter {
  pub fn new() -> Self {
    Self {
      tz: local_tz_offset(),
    }
  }

  /// Fixed offset variant, used by tests to pin the rendered offset.
  pub fn with_offset(tz: FixedOffset) -> Self {
    Self { tz }
  }

  /// Current instant in the formatter's timezone.
  pub fn now(&self) -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&self.tz)
  }

  /// Render the file form of one record into `out`.
  pub fn render_file(
    &self,
    out: &mut String,
    now: &DateTime<FixedOffset>,
    tid_hash: u32,
    level: Level,
    loc: Option<&SourceLoc>,
    args: fmt::Arguments<'_>,
  ) {
    let _ = write!(
      out,
      "{} [{:04x}] [{}] ",
      now.format("%Y-%m-%dT%H:%M:%S%.6f%:z"),
      tid_hash,
      level.tag()
    );
    let _ = out.write_fmt(args);
    Self::render_loc(out, loc);
    out.push('\n');
  }

  /// Render the colored console form of one record into `out`.
  pub fn render_console(
    &self,
    out: &mut String,
    now: &DateTime<FixedOffset>,
    tid_hash: u32,
    level: Level,
    loc: Option<&SourceLoc>,
    args: fmt::Arguments<'_>,
  ) {
    let _ = write!(
      out,
      "{} [{:04x}] {} ",
      now.format("%H:%M:%S%.3f"),
      tid_hash,
      colored_tag(level)
    );
    match body_color(level) {
      Some(color) => {
        out.push_str(color);
        let _ = out.write_fmt(args);
        out.push_str(RESET);
      },
      None => {
        let _ = out.write_fmt(args);
      },
    }
    Self::render_loc(out, loc);
    out.push('\n');
  }

  fn render_loc(out: &mut String, loc: Option<&SourceLoc>) {
    if let Some(loc) = loc {
      let _ = write!(out, "\t[{}:{}, {}()]", basename(loc.file), loc.line, loc.func);
    }
  }
}

impl Default for Formatter {
  fn default() -> Self {
    Self::new()
  }
}

fn colored_tag(level: Level) -> String {
  let color = match level {
    Level::Sys => B_BROWN,
    Level::Fatal => WHITE_FG_RED_BG,
    Level::Error => B_RED,
    Level::Warn => B_MAGENTA,
    Level::Info => GREEN,
    Level::Debug => D_GRAY,
    Level::Trace => D_GRAY,
  };
  format!("{}[{}]{}", color, level.tag(), RESET)
}

fn body_color(level: Level) -> Option<&'static str> {
  match level {
    Level::Sys => Some(B_BROWN),
    Level::Fatal => Some(WHITE_FG_RED_BG),
    _ => None,
  }
}
