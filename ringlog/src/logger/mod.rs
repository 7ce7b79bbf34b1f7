mod __test__;

use std::cell::RefCell;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI8, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;

use crate::errors::RingLogError;
use crate::format::{Formatter, SourceLoc};
use crate::level::{Level, DISABLED, MAX_LEVEL};
use crate::manager::{self, Manager};
use crate::ring::{Ring, DEFAULT_CAPACITY};
use crate::rotation::Rotation;
use crate::slot::MSG_SIZE;
use crate::utils;

/// Default per-file size limit before rotation kicks in.
pub const DEFAULT_FILE_SIZE_LIMIT: u64 = 32 * 1024 * 1024;

/// Default number of retained rotated files.
pub const DEFAULT_MAX_FILES: u64 = 16;

const DEFAULT_LOG_LEVEL: i8 = 6;
const DEFAULT_DISP_LEVEL: i8 = 4;

thread_local! {
  static SCRATCH: RefCell<String> = RefCell::new(String::with_capacity(MSG_SIZE));
}

/// One log target: a slot ring in front of an append-only file.
///
/// Construction does no I/O; `start` opens the file (resuming at the highest
/// existing revision) and registers with the [`Manager`] so the background
/// flusher picks the ring up. `put` is the hot path: render into a
/// thread-local scratch buffer, claim a slot with one CAS, copy. All file
/// I/O happens on whichever thread wins the single-flusher flag, never on a
/// caller that did not opt in.
///
/// Dropping the logger stops it.
pub struct Logger {
  inner: Arc<LoggerInner>,
}

impl Logger {
  /// Configuration only. `file_size_limit == 0` disables rotation,
  /// `max_files == 0` disables retention trimming.
  pub fn new(
    path: impl Into<PathBuf>,
    ring_capacity: usize,
    file_size_limit: u64,
    max_files: u64,
  ) -> Self {
    let inner = Arc::new_cyclic(|weak: &Weak<LoggerInner>| LoggerInner {
      weak_self: weak.clone(),
      formatter: Formatter::new(),
      ring: Ring::new(ring_capacity),
      file: Mutex::new(None),
      is_open: AtomicBool::new(false),
      rotation: Rotation::new(path.into(), file_size_limit, max_files),
      log_level: AtomicI8::new(DEFAULT_LOG_LEVEL),
      disp_level: AtomicI8::new(DEFAULT_DISP_LEVEL),
      flushing: AtomicBool::new(false),
      rotate_failed: AtomicBool::new(false),
    });
    Self { inner }
  }

  /// The original defaults: 4096 slots, 32 MiB per file, 16 retained files.
  pub fn with_defaults(path: impl Into<PathBuf>) -> Self {
    Self::new(path, DEFAULT_CAPACITY, DEFAULT_FILE_SIZE_LIMIT, DEFAULT_MAX_FILES)
  }

  /// Open the output file and register with the manager. Resumes appending
  /// at the highest revision already on disk. On failure the logger stays
  /// inert: `put` is a no-op until a later `start` succeeds.
  pub fn start(&self) -> Result<(), RingLogError> {
    let inner = &self.inner;
    if inner.is_open.load(Ordering::Acquire) {
      return Ok(());
    }

    let mgr = Manager::get();
    inner.rotation.discover();
    let path = inner.rotation.active_path();
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        let _ = fs::create_dir_all(parent);
      }
    }
    let file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&path)
      .map_err(|source| RingLogError::FileOpen {
        path: path.clone(),
        source,
      })?;

    *inner.file.lock().unwrap_or_else(|e| e.into_inner()) = Some(file);
    inner.is_open.store(true, Ordering::Release);
    mgr.add_logger(Arc::clone(inner));

    inner.put(
      Level::Sys,
      Some(SourceLoc::new(file!(), "start", line!())),
      format_args!(
        "Start logger: {} ({} MB per file, up to {} files)",
        path.display(),
        inner.rotation.size_limit() / 1024 / 1024,
        inner.rotation.max_files()
      ),
    );

    let info = mgr.critical_info();
    if !info.is_empty() {
      inner.put(
        Level::Info,
        Some(SourceLoc::new(file!(), "start", line!())),
        format_args!("{}", info),
      );
    }
    Ok(())
  }

  /// Drain the ring, close the file and deregister. Idempotent.
  pub fn stop(&self) {
    self.inner.stop();
    if let Some(mgr) = Manager::try_get() {
      mgr.remove_logger(&self.inner);
    }
  }

  /// Append one record. No-op when the level is gated or the file is not
  /// open. Never blocks on file I/O; the caller pays for the render and the
  /// slot CAS loop only.
  pub fn put(&self, level: Level, loc: Option<SourceLoc>, args: fmt::Arguments<'_>) {
    self.inner.put(level, loc, args);
  }

  /// Sweep the whole ring once, starting at the current cursor.
  pub fn flush_all(&self) {
    self.inner.flush_all();
  }

  #[inline]
  pub fn log_allowed(&self, level: Level) -> bool {
    self.inner.log_allowed(level)
  }

  #[inline]
  pub fn disp_allowed(&self, level: Level) -> bool {
    self.inner.disp_allowed(level)
  }

  /// Values outside `[-1, 6]` are ignored.
  pub fn set_log_level(&self, level: i8) {
    self.inner.set_log_level(level);
  }

  /// Values outside `[-1, 6]` are ignored.
  pub fn set_disp_level(&self, level: i8) {
    self.inner.set_disp_level(level);
  }

  pub fn log_level(&self) -> i8 {
    self.inner.log_level()
  }

  pub fn disp_level(&self) -> i8 {
    self.inner.disp_level()
  }

  /// Revision number of the active output file.
  pub fn current_revision(&self) -> u64 {
    self.inner.rotation.cur_rev()
  }
}

impl Drop for Logger {
  fn drop(&mut self) {
    self.stop();
  }
}

pub(crate) struct LoggerInner {
  weak_self: Weak<LoggerInner>,
  formatter: Formatter,
  ring: Ring,
  file: Mutex<Option<File>>,
  is_open: AtomicBool,
  rotation: Rotation,
  log_level: AtomicI8,
  disp_level: AtomicI8,
  flushing: AtomicBool,
  rotate_failed: AtomicBool,
}

impl LoggerInner {
  #[inline]
  pub(crate) fn log_allowed(&self, level: Level) -> bool {
    level.as_i8() <= self.log_level.load(Ordering::Relaxed)
  }

  #[inline]
  pub(crate) fn disp_allowed(&self, level: Level) -> bool {
    level.as_i8() <= self.disp_level.load(Ordering::Relaxed)
  }

  pub(crate) fn set_log_level(&self, level: i8) {
    if (DISABLED..=MAX_LEVEL).contains(&level) {
      self.log_level.store(level, Ordering::Relaxed);
    }
  }

  pub(crate) fn set_disp_level(&self, level: i8) {
    if (DISABLED..=MAX_LEVEL).contains(&level) {
      self.disp_level.store(level, Ordering::Relaxed);
    }
  }

  pub(crate) fn log_level(&self) -> i8 {
    self.log_level.load(Ordering::Relaxed)
  }

  pub(crate) fn disp_level(&self) -> i8 {
    self.disp_level.load(Ordering::Relaxed)
  }

  pub(crate) fn put(&self, level: Level, loc: Option<SourceLoc>, args: fmt::Arguments<'_>) {
    if !self.is_open.load(Ordering::Acquire) || !self.log_allowed(level) {
      return;
    }

    manager::register_current_thread();

    let tid = utils::current_thread_hash();
    let now = self.formatter.now();

    let rendered = SCRATCH
      .try_with(|cell| match cell.try_borrow_mut() {
        Ok(mut buf) => {
          buf.clear();
          self.render_and_store(&mut buf, &now, tid, level, loc.as_ref(), args);
          true
        },
        Err(_) => false,
      })
      .unwrap_or(false);

    if !rendered {
      // A signal handler interrupted a put on this thread (or its TLS is
      // gone); render into a one-off buffer instead.
      let mut buf = String::with_capacity(MSG_SIZE);
      self.render_and_store(&mut buf, &now, tid, level, loc.as_ref(), args);
    }
  }

  fn render_and_store(
    &self,
    buf: &mut String,
    now: &chrono::DateTime<chrono::FixedOffset>,
    tid: u32,
    level: Level,
    loc: Option<&SourceLoc>,
    args: fmt::Arguments<'_>,
  ) {
    self.formatter.render_file(buf, now, tid, level, loc, args);
    self.store(buf.as_bytes());

    if self.disp_allowed(level) {
      buf.clear();
      self.formatter.render_console(buf, now, tid, level, loc, args);
      let _guard = manager::display_lock();
      let mut stdout = io::stdout().lock();
      let _ = stdout.write_all(buf.as_bytes());
      let _ = stdout.flush();
    }
  }

  /// Claim a slot and copy the rendered record in, cooperating with the
  /// flusher when the claimed slot still holds an unflushed record.
  fn store(&self, bytes: &[u8]) {
    let idx = self.ring.reserve();
    let slot = self.ring.slot(idx);
    loop {
      if slot.needs_flush() {
        // The ring wrapped onto a pending record. Either become the flusher
        // or wait for whoever already is.
        if !self.flush(idx) {
          while slot.needs_flush() {
            thread::yield_now();
          }
        }
        continue;
      }
      if slot.try_write(bytes) {
        return;
      }
      thread::yield_now();
    }
  }

  pub(crate) fn flush_all(&self) {
    self.flush(self.ring.cursor());
  }

  /// Sweep `[start_pos, N)` then `[0, start_pos)`, draining every DIRTY slot
  /// to the file. Returns false immediately when another thread holds the
  /// flush flag. Slots busy mid-write are skipped; the next sweep gets them.
  pub(crate) fn flush(&self, start_pos: usize) -> bool {
    if self
      .flushing
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return false;
    }

    let mut guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
    match guard.as_mut() {
      Some(file) => {
        self.sweep(start_pos, file);
        let _ = file.flush();
      },
      None => {
        // File closed (stopped, or a failed rotation reopen): keep the ring
        // draining so producers never wedge on DIRTY slots.
        self.sweep(start_pos, &mut io::sink());
      },
    }
    self.maybe_rotate(&mut guard);
    drop(guard);

    self.flushing.store(false, Ordering::Release);
    true
  }

  fn sweep<W: Write>(&self, start_pos: usize, sink: &mut W) {
    let n = self.ring.capacity();
    for idx in (start_pos..n).chain(0..start_pos) {
      self.ring.slot(idx).try_flush(sink);
    }
  }

  /// Size trigger, run inside the flush critical section.
  fn maybe_rotate(&self, file: &mut Option<File>) {
    let written = match file.as_ref() {
      Some(f) => f.metadata().map(|m| m.len()).unwrap_or(0),
      None => return,
    };
    if !self.rotation.should_rotate(written) {
      return;
    }

    let (finished, next_path) = self.rotation.advance();
    *file = None;
    match OpenOptions::new().create(true).append(true).open(&next_path) {
      Ok(next) => {
        *file = Some(next);
        let weak = self.weak_self.clone();
        self.rotation.spawn_compress(finished, move |msg| match weak.upgrade() {
          Some(logger) => logger.put(
            Level::Error,
            Some(SourceLoc::new(file!(), "compress_worker", line!())),
            format_args!("{}", msg),
          ),
          None => eprintln!("[ringlog] {}", msg),
        });
      },
      Err(err) => {
        self.is_open.store(false, Ordering::Release);
        if !self.rotate_failed.swap(true, Ordering::AcqRel) {
          eprintln!(
            "[ringlog] cannot open next revision {}: {}; logger disabled, ring drains to null",
            next_path.display(),
            err
          );
        }
      },
    }
  }

  pub(crate) fn stop(&self) {
    if !self.is_open.load(Ordering::Acquire) {
      return;
    }

    self.put(
      Level::Sys,
      Some(SourceLoc::new(file!(), "stop", line!())),
      format_args!("Stop logger: {}", self.rotation.active_path().display()),
    );
    self.is_open.store(false, Ordering::Release);
    self.drain();

    let mut guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(mut file) = guard.take() {
      let _ = file.flush();
      let _ = file.sync_all();
    }
    drop(guard);

    self.rotation.wait_workers();
  }

  /// Synchronously flush until nothing is dirty. Competes politely with a
  /// concurrent flusher sweep.
  fn drain(&self) {
    loop {
      if self.flush(self.ring.cursor()) && !self.ring.has_dirty() {
        return;
      }
      thread::yield_now();
    }
  }
}
