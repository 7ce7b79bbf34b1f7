use ringlog::logger::Logger;
use ringlog::manager::Manager;

fn main() {
  let logger = Logger::with_defaults("./example_log.log");
  logger.start().expect("open log file");

  // -1 disables; 0 logs only System records, 6 logs everything.
  logger.set_log_level(6);
  logger.set_disp_level(6);

  ringlog::fatal!(logger, "fatal error");
  ringlog::err!(logger, "error");
  ringlog::warn!(logger, "warning");
  ringlog::info!(logger, "info");
  ringlog::debug!(logger, "debug");
  ringlog::trace!(logger, "trace");
  ringlog::trace!(logger, "parameters {} {} {}", 1, 2, "3");

  logger.stop();
  logger.start().expect("reopen log file");

  ringlog::info!(logger, "second session, resumed at revision {}", logger.current_revision());
  ringlog::trace!(logger, "multi\nlines {}", 123);

  logger.stop();
  Manager::shutdown();
}
