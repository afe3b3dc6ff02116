/// Logging macro with explicit level selection.
///
/// Forwards to [`tracing`] macros. During tests it prints to `stdout`, preserving the level for
/// context, so test output shows the exchange trail without installing a subscriber.
macro_rules! sdk_log {
    ($level:ident, $($arg:tt)*) => {
        #[cfg(not(test))]
        tracing::$level!($($arg)*);
        #[cfg(test)]
        println!("[{}] {}", stringify!($level), format_args!($($arg)*));
    };
}

pub(crate) use sdk_log;
