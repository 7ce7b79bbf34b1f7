
use std::cell::UnsafeCell;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Write};
use std::mem;
use std::ptr;

use chrono::{DateTime, Local};
use libc::c_int;
use signal_hook::consts::{SIGABRT, SIGSEGV};

use crate::level::Level;
use crate::manager::Manager;
use crate::slot::MSG_SIZE;
use crate::stacktrace::{self, FrameBuf};
use crate::utils;

/// Signal used to ask another thread for its stack.
#[cfg(target_os = "linux")]
const STACK_TRACE_SIGNAL: c_int = libc::SIGUSR2;

/// One thread's raw stack snapshot, captured inside a signal handler and
/// resolved later.
pub struct RawStackInfo {
  pub tid_hash: u32,
  pub kernel_tid: u64,
  pub frames: FrameBuf,
  pub crash_origin: bool,
}

/// Pre-reserved snapshot storage. Writes are serialized by the crash
/// handshake: the origin thread and each signaled thread deposit one entry
/// at a time, never concurrently.
pub(crate) struct CrashStacks(UnsafeCell<Vec<RawStackInfo>>);

unsafe impl Sync for CrashStacks {}

impl CrashStacks {
  pub(crate) fn with_capacity(capacity: usize) -> Self {
    Self(UnsafeCell::new(Vec::with_capacity(capacity)))
  }

  /// Caller must hold the handshake's implicit exclusivity. Entries beyond
  /// the reserved capacity are dropped rather than reallocating in a
  /// signal handler.
  pub(crate) unsafe fn push(&self, info: RawStackInfo) {
    let entries = &mut *self.0.get();
    if entries.len() < entries.capacity() {
      entries.push(info);
    }
  }

  pub(crate) unsafe fn entries(&self) -> &[RawStackInfo] {
    &*self.0.get()
  }
}

/// Install the segfault and abort handlers, returning the previous
/// dispositions so `shutdown` can put them back.
pub(crate) unsafe fn install_fatal_handlers() -> (libc::sigaction, libc::sigaction) {
  let old_segv = install_handler(SIGSEGV, handle_segfault as libc::sighandler_t, 0);
  let old_abort = install_handler(SIGABRT, handle_abort as libc::sighandler_t, 0);
  (old_segv, old_abort)
}

pub(crate) unsafe fn restore_fatal_handlers(old_segv: &libc::sigaction, old_abort: &libc::sigaction) {
  libc::sigaction(SIGSEGV, old_segv, ptr::null_mut());
  libc::sigaction(SIGABRT, old_abort, ptr::null_mut());
}

unsafe fn install_handler(sig: c_int, handler: libc::sighandler_t, flags: c_int) -> libc::sigaction {
  let mut action: libc::sigaction = mem::zeroed();
  action.sa_sigaction = handler;
  libc::sigfillset(&mut action.sa_mask);
  action.sa_flags = flags;
  let mut old: libc::sigaction = mem::zeroed();
  libc::sigaction(sig, &action, &mut old);
  old
}

extern "C" fn handle_segfault(sig: c_int) {
  let mgr = match Manager::try_get() {
    Some(mgr) => mgr,
    None => unsafe {
      libc::signal(sig, libc::SIG_DFL);
      libc::raise(sig);
      return;
    },
  };

  // First thing: put the previous disposition back, so a second fault
  // inside this handler terminates instead of recursing.
  unsafe {
    libc::sigaction(sig, &mgr.old_segv, ptr::null_mut());
  }

  mgr.enable_only_one_displayer();
  mgr.flush_all_loggers_with(Level::Fatal, "Segmentation fault");
  log_stack_backtrace(mgr);

  println!("[SEG FAULT] Flushed all logs safely.");
  let _ = io::stdout().flush();
  let _ = signal_hook::low_level::raise(sig);
}

extern "C" fn handle_abort(sig: c_int) {
  let mgr = match Manager::try_get() {
    Some(mgr) => mgr,
    None => unsafe {
      libc::signal(sig, libc::SIG_DFL);
      libc::abort();
    },
  };

  unsafe {
    libc::sigaction(sig, &mgr.old_abort, ptr::null_mut());
  }

  mgr.enable_only_one_displayer();
  mgr.flush_all_loggers_with(Level::Fatal, "Abort");
  log_stack_backtrace(mgr);

  println!("[ABORT] Flushed all logs safely.");
  let _ = io::stdout().flush();
  unsafe { libc::abort() }
}

/// Crash-dump pipeline: open the dump file, emit critical info, capture the
/// faulting thread's raw stack, stop the world (one signal per registered
/// thread, linux only), then resolve and emit every snapshot.
fn log_stack_backtrace(mgr: &'static Manager) {
  let mut dump = open_dump_file(mgr);
  flush_critical_info(mgr, &mut dump);
  add_raw_stack_info(mgr, true);

  let my_tid = unsafe { libc::pthread_self() as u64 };
  if mgr
    .crash_origin
    .compare_exchange(0, my_tid, std::sync::atomic::Ordering::AcqRel, std::sync::atomic::Ordering::Acquire)
    .is_err()
  {
    // Another thread is already coordinating the dump.
    return;
  }

  #[cfg(target_os = "linux")]
  if !mgr.stack_trace_origin_only() {
    stop_the_world(mgr, my_tid, &mut dump);
  }

  // Every thread has deposited raw pointers; symbolication is free to
  // allocate and do ordinary I/O from here on.
  let entries = unsafe { mgr.thread_stacks.entries() };
  for info in entries {
    flush_stack_info(mgr, info, &mut dump);
  }

  mgr.flush_all_loggers();
}

#[cfg(target_os = "linux")]
fn stop_the_world(mgr: &Manager, my_tid: u64, dump: &mut Option<File>) {
  let threads = mgr.active_threads_snapshot();
  let msg = format!("captured {} active threads", threads.len());
  mgr.flush_all_loggers_with(Level::Error, &msg);
  if let Some(dump) = dump.as_mut() {
    let _ = writeln!(dump, "{}\n", msg);
  }

  for tid in threads {
    if tid == my_tid {
      continue;
    }
    unsafe {
      install_stack_trace_handler();
      if libc::pthread_kill(tid as libc::pthread_t, STACK_TRACE_SIGNAL) != 0 {
        // Thread exited between snapshot and signal.
        continue;
      }
      let mut mask: libc::sigset_t = mem::zeroed();
      libc::sigfillset(&mut mask);
      libc::sigdelset(&mut mask, STACK_TRACE_SIGNAL);
      libc::sigsuspend(&mask);
    }
  }

  mgr.flush_all_loggers_with(Level::Error, "got all stack traces, now flushing them");
}

#[cfg(target_os = "linux")]
unsafe fn install_stack_trace_handler() {
  install_handler(
    STACK_TRACE_SIGNAL,
    handle_stack_trace as libc::sighandler_t,
    libc::SA_SIGINFO,
  );
}

/// Runs in each signaled thread: deposit raw frames, wake the origin.
/// Getting exact symbols here would be far too expensive; raw pointers are
/// kept and interpreted after the handshake.
#[cfg(target_os = "linux")]
extern "C" fn handle_stack_trace(_sig: c_int, _info: *mut libc::siginfo_t, _ctx: *mut libc::c_void) {
  let mgr = match Manager::try_get() {
    Some(mgr) => mgr,
    None => return,
  };
  let origin = mgr.crash_origin.load(std::sync::atomic::Ordering::Acquire);
  if origin == 0 {
    return;
  }
  let myself = unsafe { libc::pthread_self() as u64 };
  if origin == myself {
    return;
  }

  add_raw_stack_info(mgr, false);

  unsafe {
    libc::pthread_kill(origin as libc::pthread_t, STACK_TRACE_SIGNAL);
  }
}

fn add_raw_stack_info(mgr: &Manager, crash_origin: bool) {
  let info = RawStackInfo {
    tid_hash: utils::current_thread_hash(),
    kernel_tid: utils::kernel_tid(),
    frames: stacktrace::capture(),
    crash_origin,
  };
  unsafe {
    mgr.thread_stacks.push(info);
  }
}

fn open_dump_file(mgr: &Manager) -> Option<File> {
  let dir = mgr.crash_dump_dir()?;
  let now = Local::now();
  let path = dir.join(dump_file_name(&now));
  let mut dump = File::create(path).ok()?;

  let _ = writeln!(dump, "When: {}", now.format("%Y-%m-%dT%H:%M:%S%.6f%:z"));
  let hostname = gethostname::gethostname().to_string_lossy().into_owned();
  let _ = writeln!(dump, "Host: {} (pid {})", hostname, std::process::id());
  let _ = writeln!(dump);
  Some(dump)
}

pub(crate) fn dump_file_name(now: &DateTime<Local>) -> String {
  now.format("dump_%Y%m%d_%H%M%S%z.txt").to_string()
}

fn flush_critical_info(mgr: &Manager, dump: &mut Option<File>) {
  let info = mgr.critical_info();
  let mut msg = format!(" === Critical info (given by user): {} bytes ===", info.len());
  if !info.is_empty() {
    msg.push('\n');
    msg.push_str(&info);
  }
  mgr.flush_all_loggers_with(Level::Error, &msg);
  if let Some(dump) = dump.as_mut() {
    let _ = writeln!(dump, "{}\n", msg);
  }
}

/// Resolve one snapshot and emit it to every logger (in slot-sized chunks)
/// and to the dump file.
fn flush_stack_info(mgr: &Manager, info: &RawStackInfo, dump: &mut Option<File>) {
  let mut scratch = mgr.trace_scratch.lock().unwrap_or_else(|e| e.into_inner());
  scratch.clear();

  let _ = write!(scratch, "\nThread {:04x}", info.tid_hash);
  if info.kernel_tid != 0 {
    let _ = write!(scratch, " ({})", info.kernel_tid);
  }
  if info.crash_origin {
    scratch.push_str(" (crashed here)");
  }
  scratch.push_str("\n\n");
  stacktrace::interpret(&info.frames, &mut scratch);

  let per_record = MSG_SIZE - 1024;
  for chunk in scratch.as_bytes().chunks(per_record) {
    let text = String::from_utf8_lossy(chunk);
    mgr.flush_all_loggers_with(Level::Error, &text);
  }

  if let Some(dump) = dump.as_mut() {
    let _ = writeln!(dump, "{}", scratch);
  }
}
