use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ringlog::logger::Logger;
use ringlog::manager::Manager;

fn worker(logger: Arc<Logger>, id: usize) {
  let secs = 5;
  ringlog::info!(logger, "worker {} parked for {} seconds", id, secs);
  thread::sleep(Duration::from_secs(secs));
}

fn deepest(depth: usize) -> i32 {
  if depth > 0 {
    return deepest(depth - 1);
  }
  // Deliberate fault so the crash-dump pipeline runs.
  unsafe { std::ptr::null_mut::<i32>().write(42) };
  0
}

fn middle(value: i32) -> i32 {
  deepest(10) + value
}

fn outer(a: i32, b: i32) -> i32 {
  middle(a) + b
}

fn main() {
  // Dump every registered thread, not only the one that faults.
  Manager::set_stack_trace_origin_only(false);
  Manager::set_crash_dump_dir(".");
  Manager::set_critical_info("ringlog crash demo");

  let logger = Arc::new(Logger::with_defaults("./example_log.log"));
  logger.start().expect("open log file");

  let mut threads = Vec::new();
  for id in 0..4 {
    let logger = Arc::clone(&logger);
    threads.push(thread::spawn(move || worker(logger, id)));
  }

  thread::sleep(Duration::from_millis(100));

  let value = outer(1, 2);
  ringlog::info!(logger, "never reached: {}", value);

  for handle in threads {
    let _ = handle.join();
  }
  logger.stop();
  Manager::shutdown();
}
