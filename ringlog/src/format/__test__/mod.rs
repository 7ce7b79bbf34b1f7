#[cfg(test)]
mod __test__ {

  use crate::format::{basename, Formatter, SourceLoc};
  use crate::level::Level;

  use chrono::{DateTime, Duration, FixedOffset, TimeZone};

  fn fixed_instant(tz: FixedOffset) -> DateTime<FixedOffset> {
    tz.with_ymd_and_hms(2026, 8, 1, 12, 34, 56).unwrap() + Duration::microseconds(123_456)
  }

  #[test]
  fn test_basename_extraction() {
    assert_eq!(basename("src/logger/mod.rs"), "mod.rs");
    assert_eq!(basename("C:\\logs\\app.rs"), "app.rs");
    assert_eq!(basename("plain.rs"), "plain.rs");
    assert_eq!(basename("trailing/"), "");
  }

  #[test]
  fn test_file_form_with_location() {
    let tz = FixedOffset::east_opt(9 * 3600).unwrap();
    let formatter = Formatter::with_offset(tz);
    let now = fixed_instant(tz);
    let loc = SourceLoc::new("src/worker/pool.rs", "drain", 42);

    let mut out = String::new();
    formatter.render_file(
      &mut out,
      &now,
      0xabcd,
      Level::Info,
      Some(&loc),
      format_args!("accepted {} jobs", 7),
    );

    assert_eq!(
      out,
      "2026-08-01T12:34:56.123456+09:00 [abcd] [INFO] accepted 7 jobs\t[pool.rs:42, drain()]\n"
    );
  }

  #[test]
  fn test_file_form_without_location() {
    let tz = FixedOffset::east_opt(-5 * 3600).unwrap();
    let formatter = Formatter::with_offset(tz);
    let now = fixed_instant(tz);

    let mut out = String::new();
    formatter.render_file(&mut out, &now, 0x1, Level::Trace, None, format_args!("{}", 123456));

    assert!(out.ends_with("123456\n"));
    assert!(!out.contains('\t'));
    assert!(out.contains("-05:00 "));
  }

  #[test]
  fn test_file_form_parses_back() {
    let tz = FixedOffset::east_opt(3600).unwrap();
    let formatter = Formatter::with_offset(tz);
    let now = fixed_instant(tz);
    let loc = SourceLoc::new("a/b.rs", "run", 9);

    let mut out = String::new();
    formatter.render_file(&mut out, &now, 0x00ff, Level::Warn, Some(&loc), format_args!("body text"));

    let line = out.strip_suffix('\n').unwrap();
    let (head, trailer) = line.split_once('\t').unwrap();
    assert_eq!(trailer, "[b.rs:9, run()]");

    let mut parts = head.splitn(4, ' ');
    let ts = parts.next().unwrap();
    let tid = parts.next().unwrap();
    let tag = parts.next().unwrap();
    let body = parts.next().unwrap();

    let parsed = DateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.6f%:z").unwrap();
    assert_eq!(parsed, now);
    assert_eq!(tid, "[00ff]");
    assert_eq!(tag, "[WARN]");
    assert_eq!(body, "body text");
  }

  #[test]
  fn test_console_form_drops_date_and_colors_tag() {
    let tz = FixedOffset::east_opt(0).unwrap();
    let formatter = Formatter::with_offset(tz);
    let now = fixed_instant(tz);

    let mut out = String::new();
    formatter.render_console(&mut out, &now, 0x2, Level::Error, None, format_args!("oops"));

    assert!(out.starts_with("12:34:56.123 [0002] "));
    assert!(out.contains("\x1b["));
    assert!(out.contains("[ERRO]"));
    assert!(!out.contains("2026"));
  }

  #[test]
  fn test_console_form_colors_fatal_body() {
    let tz = FixedOffset::east_opt(0).unwrap();
    let formatter = Formatter::with_offset(tz);
    let now = fixed_instant(tz);

    let mut out = String::new();
    formatter.render_console(&mut out, &now, 0x2, Level::Fatal, None, format_args!("dead"));

    assert!(out.contains("\x1b[37;41mdead\x1b[0m"));
  }
}
