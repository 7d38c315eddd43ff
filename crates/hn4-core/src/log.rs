//! Pluggable leveled logging for the allocator.
//!
//! A direct generalization of `hadron_core::log`: a global, swappable
//! [`LogFn`] behind an `AtomicPtr`, with `hn4log!`/`hn4info!`/`hn4warn!`/
//! `hn4err!`/`hn4fatal!`/`hn4debug!`/`hn4trace!` convenience macros. Renamed
//! away from the teacher's `k`-for-"kernel" prefix since this crate is not
//! kernel-resident. Before [`set_log_fn`] is called, log calls are silently
//! discarded — callers embedding the allocator register their own sink.

use std::fmt;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Allocator log severity level, lower is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Unrecoverable condition (e.g. PANIC flag set).
    Fatal = 0,
    /// Something failed but the volume may continue.
    Error = 1,
    /// Unexpected condition, not necessarily an error (e.g. a heal).
    Warn = 2,
    /// High-level progress (mount, saturation transitions).
    Info = 3,
    /// Detailed diagnostic information.
    Debug = 4,
    /// Very verbose, per-allocation tracing.
    Trace = 5,
}

impl LogLevel {
    /// Human-readable, fixed-width name for aligned output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN ",
            Self::Info => "INFO ",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }
}

/// Signature of the global leveled log function.
pub type LogFn = fn(LogLevel, fmt::Arguments<'_>);

fn null_log(_level: LogLevel, _args: fmt::Arguments<'_>) {}

static LOG_FN: AtomicPtr<()> = AtomicPtr::new(null_log as *mut ());

/// Registers the global log sink. May be called more than once; the most
/// recent registration wins. Uses `Release` ordering so subsequent loads
/// (from any thread) see the new function.
pub fn set_log_fn(f: LogFn) {
    LOG_FN.store(f as *mut (), Ordering::Release);
}

#[inline]
fn load_log_fn() -> LogFn {
    let ptr = LOG_FN.load(Ordering::Acquire);
    // SAFETY: only ever set via `set_log_fn`, which only accepts `LogFn`.
    unsafe { std::mem::transmute::<*mut (), LogFn>(ptr) }
}

/// Implementation detail for [`hn4log!`]. Not public API.
#[doc(hidden)]
#[allow(clippy::used_underscore_items, reason = "doc(hidden) macro plumbing, not a real leading-underscore API")]
pub fn _log(level: LogLevel, args: fmt::Arguments<'_>) {
    load_log_fn()(level, args);
}

/// Logs a message at the given level.
#[macro_export]
macro_rules! hn4log {
    ($level:expr, $($arg:tt)*) => {
        #[allow(clippy::used_underscore_items, reason = "doc(hidden) macro plumbing, not a real leading-underscore API")]
        {
            $crate::log::_log($level, format_args!($($arg)*))
        }
    };
}

/// Logs a fatal-level message.
#[macro_export]
macro_rules! hn4fatal {
    ($($arg:tt)*) => { $crate::hn4log!($crate::log::LogLevel::Fatal, $($arg)*) };
}

/// Logs an error-level message.
#[macro_export]
macro_rules! hn4err {
    ($($arg:tt)*) => { $crate::hn4log!($crate::log::LogLevel::Error, $($arg)*) };
}

/// Logs a warning-level message.
#[macro_export]
macro_rules! hn4warn {
    ($($arg:tt)*) => { $crate::hn4log!($crate::log::LogLevel::Warn, $($arg)*) };
}

/// Logs an info-level message.
#[macro_export]
macro_rules! hn4info {
    ($($arg:tt)*) => { $crate::hn4log!($crate::log::LogLevel::Info, $($arg)*) };
}

/// Logs a debug-level message.
#[macro_export]
macro_rules! hn4debug {
    ($($arg:tt)*) => { $crate::hn4log!($crate::log::LogLevel::Debug, $($arg)*) };
}

/// Logs a trace-level message.
#[macro_export]
macro_rules! hn4trace {
    ($($arg:tt)*) => { $crate::hn4log!($crate::log::LogLevel::Trace, $($arg)*) };
}
