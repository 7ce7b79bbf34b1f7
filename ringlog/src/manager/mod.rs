
use std::collections::HashSet;
use std::path::PathBuf;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::format::SourceLoc;
use crate::level::Level;
use crate::logger::LoggerInner;

#[cfg(unix)]
use crate::crash;

/// How often the background flusher sweeps every registered logger.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(500);

#[cfg(unix)]
const TRACE_SCRATCH_CAPACITY: usize = 64 * 1024;
#[cfg(unix)]
const MAX_CRASH_THREADS: usize = 64;

static INSTANCE: AtomicPtr<Manager> = AtomicPtr::new(ptr::null_mut());
static INSTANCE_LOCK: Mutex<()> = Mutex::new(());
static DISPLAY_LOCK: Mutex<()> = Mutex::new(());

/// Process-wide guard serializing console output, so only one record line
/// reaches stdout at a time.
pub(crate) fn display_lock() -> MutexGuard<'static, ()> {
  DISPLAY_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// The logger registry, shared between the manager and its flusher thread
/// so teardown never races the sweep.
pub(crate) struct Registry {
  loggers: Mutex<Vec<Weak<LoggerInner>>>,
  termination: AtomicBool,
}

impl Registry {
  /// Flush every registered logger, optionally putting `notice` into each
  /// one first.
  pub(crate) fn flush_all(&self, notice: Option<(Level, &str)>) {
    let loggers = self.loggers.lock().unwrap_or_else(|e| e.into_inner());
    for weak in loggers.iter() {
      if let Some(logger) = weak.upgrade() {
        if let Some((level, msg)) = notice {
          logger.put(
            level,
            Some(SourceLoc::new(file!(), "flush_all", line!())),
            format_args!("{}", msg),
          );
        }
        logger.flush_all();
      }
    }
  }
}

/// Process-wide singleton owning everything that must exist exactly once:
/// the registries of loggers and live threads, the flusher thread, the
/// saved fatal-signal handlers and the crash-dump state.
///
/// Lazily constructed with double-checked locking on first use; torn down
/// explicitly by [`Manager::shutdown`], which joins the flusher and restores
/// the previous signal handlers. Teardown is deliberate rather than left to
/// process exit, because exit-time destruction order is unreliable.
pub struct Manager {
  registry: Arc<Registry>,
  active_threads: Mutex<HashSet<u64>>,
  flusher: Mutex<Option<JoinHandle<()>>>,
  wake_tx: Sender<()>,
  critical_info: Mutex<String>,
  crash_dump_dir: Mutex<Option<PathBuf>>,
  origin_only: AtomicBool,
  #[cfg(unix)]
  pub(crate) crash_origin: std::sync::atomic::AtomicU64,
  #[cfg(unix)]
  pub(crate) thread_stacks: crash::CrashStacks,
  #[cfg(unix)]
  pub(crate) trace_scratch: Mutex<String>,
  #[cfg(unix)]
  pub(crate) old_segv: libc::sigaction,
  #[cfg(unix)]
  pub(crate) old_abort: libc::sigaction,
}

impl Manager {
  /// The singleton, constructed on first use.
  pub fn get() -> &'static Manager {
    let instance = INSTANCE.load(Ordering::Acquire);
    if !instance.is_null() {
      return unsafe { &*instance };
    }
    Self::init()
  }

  fn init() -> &'static Manager {
    let _guard = INSTANCE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let instance = INSTANCE.load(Ordering::Acquire);
    if !instance.is_null() {
      return unsafe { &*instance };
    }
    let instance = Box::into_raw(Box::new(Manager::new()));
    INSTANCE.store(instance, Ordering::Release);
    unsafe { &*instance }
  }

  /// The singleton if it exists; never constructs one.
  pub fn try_get() -> Option<&'static Manager> {
    let instance = INSTANCE.load(Ordering::Acquire);
    if instance.is_null() {
      None
    } else {
      Some(unsafe { &*instance })
    }
  }

  /// Flush everything, stop the flusher, restore the previous signal
  /// handlers and destroy the singleton. A later `get` starts fresh.
  pub fn shutdown() {
    let _guard = INSTANCE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let instance = INSTANCE.swap(ptr::null_mut(), Ordering::AcqRel);
    if instance.is_null() {
      return;
    }
    let manager = unsafe { Box::from_raw(instance) };
    manager.registry.flush_all(None);
    drop(manager);
  }

  fn new() -> Self {
    let (wake_tx, wake_rx) = bounded::<()>(1);
    let registry = Arc::new(Registry {
      loggers: Mutex::new(Vec::new()),
      termination: AtomicBool::new(false),
    });

    let flusher = {
      let registry = Arc::clone(&registry);
      thread::Builder::new()
        .name("ringlog-flush".to_string())
        .spawn(move || flush_worker(registry, wake_rx))
        .ok()
    };

    #[cfg(unix)]
    let (old_segv, old_abort) = unsafe { crash::install_fatal_handlers() };

    Self {
      registry,
      active_threads: Mutex::new(HashSet::new()),
      flusher: Mutex::new(flusher),
      wake_tx,
      critical_info: Mutex::new(String::new()),
      crash_dump_dir: Mutex::new(None),
      origin_only: AtomicBool::new(true),
      #[cfg(unix)]
      crash_origin: std::sync::atomic::AtomicU64::new(0),
      #[cfg(unix)]
      thread_stacks: crash::CrashStacks::with_capacity(MAX_CRASH_THREADS),
      #[cfg(unix)]
      trace_scratch: Mutex::new(String::with_capacity(TRACE_SCRATCH_CAPACITY)),
      #[cfg(unix)]
      old_segv,
      #[cfg(unix)]
      old_abort,
    }
  }

  pub(crate) fn add_logger(&self, logger: Arc<LoggerInner>) {
    let mut loggers = self.registry.loggers.lock().unwrap_or_else(|e| e.into_inner());
    loggers.retain(|w| w.strong_count() > 0);
    loggers.push(Arc::downgrade(&logger));
  }

  pub(crate) fn remove_logger(&self, logger: &Arc<LoggerInner>) {
    let mut loggers = self.registry.loggers.lock().unwrap_or_else(|e| e.into_inner());
    loggers.retain(|w| w.strong_count() > 0 && !ptr::eq(w.as_ptr(), Arc::as_ptr(logger)));
  }

  pub(crate) fn add_thread(&self, tid: u64) {
    let mut threads = self.active_threads.lock().unwrap_or_else(|e| e.into_inner());
    threads.insert(tid);
  }

  pub(crate) fn remove_thread(&self, tid: u64) {
    let mut threads = self.active_threads.lock().unwrap_or_else(|e| e.into_inner());
    threads.remove(&tid);
  }

  /// Copy of the live-thread set. The lock is released before the caller
  /// touches any logger (lock order: loggers before threads, never nested).
  pub(crate) fn active_threads_snapshot(&self) -> Vec<u64> {
    let threads = self.active_threads.lock().unwrap_or_else(|e| e.into_inner());
    threads.iter().copied().collect()
  }

  /// Flush every registered logger once.
  pub fn flush_all_loggers(&self) {
    self.registry.flush_all(None);
  }

  pub(crate) fn flush_all_loggers_with(&self, level: Level, msg: &str) {
    self.registry.flush_all(Some((level, msg)));
  }

  /// During crash handling only the first registered logger keeps console
  /// output, so the dump is not interleaved.
  pub(crate) fn enable_only_one_displayer(&self) {
    let loggers = self.registry.loggers.lock().unwrap_or_else(|e| e.into_inner());
    let mut marked = false;
    for weak in loggers.iter() {
      if let Some(logger) = weak.upgrade() {
        if !marked {
          if logger.log_level() < Level::Info.as_i8() {
            logger.set_log_level(Level::Info.as_i8());
          }
          logger.set_disp_level(Level::Info.as_i8());
          marked = true;
        } else {
          logger.set_disp_level(crate::level::DISABLED);
        }
      }
    }
  }

  /// User-supplied context emitted into every logger and the dump file at
  /// the start of crash handling, and at Info on every `start`.
  pub fn set_critical_info(info: impl Into<String>) {
    let mgr = Self::get();
    *mgr.critical_info.lock().unwrap_or_else(|e| e.into_inner()) = info.into();
  }

  pub fn critical_info(&self) -> String {
    self.critical_info.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  /// Directory crash dumps are written to. Unset means no dump file.
  pub fn set_crash_dump_dir(dir: impl Into<PathBuf>) {
    let mgr = Self::get();
    *mgr.crash_dump_dir.lock().unwrap_or_else(|e| e.into_inner()) = Some(dir.into());
  }

  pub fn crash_dump_dir(&self) -> Option<PathBuf> {
    self.crash_dump_dir.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  /// When set (the default), a crash dumps only the faulting thread; when
  /// cleared, every registered thread is stopped and walked.
  pub fn set_stack_trace_origin_only(enabled: bool) {
    Self::get().origin_only.store(enabled, Ordering::Release);
  }

  pub fn stack_trace_origin_only(&self) -> bool {
    self.origin_only.load(Ordering::Acquire)
  }
}

impl Drop for Manager {
  fn drop(&mut self) {
    self.registry.termination.store(true, Ordering::Release);
    let _ = self.wake_tx.try_send(());
    let handle = self.flusher.lock().unwrap_or_else(|e| e.into_inner()).take();
    if let Some(handle) = handle {
      let _ = handle.join();
    }
    #[cfg(unix)]
    unsafe {
      crash::restore_fatal_handlers(&self.old_segv, &self.old_abort);
    }
  }
}

fn flush_worker(registry: Arc<Registry>, wake: Receiver<()>) {
  while !registry.termination.load(Ordering::Acquire) {
    let _ = wake.recv_timeout(FLUSH_INTERVAL);
    if registry.termination.load(Ordering::Acquire) {
      break;
    }
    registry.flush_all(None);
  }
}

/// Touch the thread-local sentinel so the current thread is in the crash
/// registry. Registration happens on the first log call from a thread,
/// deregistration when the thread exits; both tolerate a missing manager.
pub(crate) fn register_current_thread() {
  let _ = THREAD_SENTINEL.try_with(|_| {});
}

thread_local! {
  static THREAD_SENTINEL: ThreadSentinel = ThreadSentinel::new();
}

struct ThreadSentinel {
  tid: u64,
}

impl ThreadSentinel {
  fn new() -> Self {
    let tid = current_thread_token();
    if let Some(mgr) = Manager::try_get() {
      mgr.add_thread(tid);
    }
    Self { tid }
  }
}

impl Drop for ThreadSentinel {
  fn drop(&mut self) {
    if let Some(mgr) = Manager::try_get() {
      mgr.remove_thread(self.tid);
    }
  }
}

#[cfg(unix)]
fn current_thread_token() -> u64 {
  unsafe { libc::pthread_self() as u64 }
}

#[cfg(not(unix))]
fn current_thread_token() -> u64 {
  crate::utils::current_thread_hash() as u64
}
