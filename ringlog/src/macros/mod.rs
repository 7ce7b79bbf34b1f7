//! Consumer-side log macros.
//!
//! Each macro checks the logger's threshold before touching its arguments.
//! A gated record costs one atomic load and nothing else; arguments are
//! never evaluated for a level the logger rejects.


/// Last path segment of the enclosing function's name.
#[macro_export]
macro_rules! function_name {
  () => {{
    fn f() {}
    fn type_name_of<T>(_: T) -> &'static str {
      ::core::any::type_name::<T>()
    }
    let name = type_name_of(f);
    let name = name.strip_suffix("::f").unwrap_or(name);
    match name.rfind("::") {
      Some(idx) => &name[idx + 2..],
      None => name,
    }
  }};
}

#[macro_export]
macro_rules! log_put {
  ($logger:expr, $level:expr, $($arg:tt)+) => {{
    let logger = &$logger;
    if logger.log_allowed($level) {
      logger.put(
        $level,
        ::core::option::Option::Some($crate::format::SourceLoc::new(
          file!(),
          $crate::function_name!(),
          line!(),
        )),
        format_args!($($arg)+),
      );
    }
  }};
}

#[macro_export]
macro_rules! sys {
  ($logger:expr, $($arg:tt)+) => {
    $crate::log_put!($logger, $crate::level::Level::Sys, $($arg)+)
  };
}

#[macro_export]
macro_rules! fatal {
  ($logger:expr, $($arg:tt)+) => {
    $crate::log_put!($logger, $crate::level::Level::Fatal, $($arg)+)
  };
}

#[macro_export]
macro_rules! err {
  ($logger:expr, $($arg:tt)+) => {
    $crate::log_put!($logger, $crate::level::Level::Error, $($arg)+)
  };
}

#[macro_export]
macro_rules! warn {
  ($logger:expr, $($arg:tt)+) => {
    $crate::log_put!($logger, $crate::level::Level::Warn, $($arg)+)
  };
}

#[macro_export]
macro_rules! info {
  ($logger:expr, $($arg:tt)+) => {
    $crate::log_put!($logger, $crate::level::Level::Info, $($arg)+)
  };
}

#[macro_export]
macro_rules! debug {
  ($logger:expr, $($arg:tt)+) => {
    $crate::log_put!($logger, $crate::level::Level::Debug, $($arg)+)
  };
}

#[macro_export]
macro_rules! trace {
  ($logger:expr, $($arg:tt)+) => {
    $crate::log_put!($logger, $crate::level::Level::Trace, $($arg)+)
  };
}
