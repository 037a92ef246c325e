// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Minimal leveled logging for the library.
//!
//! Records go through the `ds_debug!`, `ds_info!`, `ds_warn!` and `ds_error!` macros and are
//! printed when their level passes the process wide filter, which defaults to
//! [`LevelFilter::Error`].

use std::{
    cmp::Ordering,
    fmt,
    str::FromStr,
    sync::atomic::{self, AtomicUsize},
};

static MAX_LEVEL: AtomicUsize = AtomicUsize::new(LevelFilter::Error as usize);

pub(crate) fn set_max_level(filter: LevelFilter) {
    MAX_LEVEL.store(filter as usize, atomic::Ordering::Relaxed)
}

pub fn max_level() -> LevelFilter {
    LevelFilter::from_usize(MAX_LEVEL.load(atomic::Ordering::Relaxed))
}

/// Most verbose level printed by the library
#[repr(usize)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[non_exhaustive]
pub enum LevelFilter {
    Off = 0,
    #[default]
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl LevelFilter {
    const ALL: [LevelFilter; 5] = [
        LevelFilter::Off,
        LevelFilter::Error,
        LevelFilter::Warn,
        LevelFilter::Info,
        LevelFilter::Debug,
    ];

    fn from_usize(value: usize) -> Self {
        Self::ALL
            .get(value)
            .copied()
            .unwrap_or(LevelFilter::Debug)
    }

    fn as_str(&self) -> &'static str {
        match self {
            LevelFilter::Off => "OFF",
            LevelFilter::Error => "ERROR",
            LevelFilter::Warn => "WARN",
            LevelFilter::Info => "INFO",
            LevelFilter::Debug => "DEBUG",
        }
    }
}

impl FromStr for LevelFilter {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|filter| s.trim().eq_ignore_ascii_case(filter.as_str()))
            .ok_or("expected one of OFF, ERROR, WARN, INFO, DEBUG")
    }
}

impl fmt::Display for LevelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a record, ordered from the least to the most verbose
#[repr(usize)]
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Level {
    Error = LevelFilter::Error as usize,
    Warn = LevelFilter::Warn as usize,
    Info = LevelFilter::Info as usize,
    Debug = LevelFilter::Debug as usize,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(LevelFilter::from_usize(*self as usize).as_str())
    }
}

impl PartialEq<LevelFilter> for Level {
    fn eq(&self, other: &LevelFilter) -> bool {
        *self as usize == *other as usize
    }
}

impl PartialOrd<LevelFilter> for Level {
    fn partial_cmp(&self, other: &LevelFilter) -> Option<Ordering> {
        Some((*self as usize).cmp(&(*other as usize)))
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod test_logger {
    //! Per thread capture of log records.
    //!
    //! [`activate_test_logger`] starts capturing what the current thread logs, and
    //! [`take_test_logs`] hands the captured records out. Spawned threads report to the same
    //! capture when their closure is wrapped with [`with_local_logger`].
    use std::{
        cell::RefCell,
        sync::{Arc, Mutex},
    };

    use super::Level;

    type Records = Arc<Mutex<Vec<(Level, String)>>>;

    thread_local! {
        static CAPTURE: RefCell<Option<Records>> = const { RefCell::new(None) };
    }

    pub fn print_log(lvl: Level, log: std::fmt::Arguments, _file: &str, _line: u32) {
        let _ = CAPTURE.try_with(|capture| {
            if let Some(records) = &*capture.borrow() {
                records
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push((lvl, log.to_string()));
            }
        });
    }

    /// Restores the previous capture of the thread when dropped
    pub struct LoggerGuard {
        previous: Option<Records>,
    }

    impl Drop for LoggerGuard {
        fn drop(&mut self) {
            CAPTURE.set(self.previous.take());
        }
    }

    pub fn activate_test_logger() -> LoggerGuard {
        LoggerGuard {
            previous: CAPTURE.replace(Some(Records::default())),
        }
    }

    pub fn with_local_logger<F: FnOnce() -> R, R>(f: F) -> impl FnOnce() -> R {
        let records = CAPTURE.try_with(|c| c.borrow().clone()).ok().flatten();
        move || {
            let _guard = LoggerGuard {
                previous: CAPTURE.replace(records),
            };
            f()
        }
    }

    pub fn take_test_logs() -> Option<Vec<(Level, String)>> {
        CAPTURE
            .try_with(|capture| {
                capture.borrow().as_ref().map(|records| {
                    std::mem::take(&mut *records.lock().unwrap_or_else(|e| e.into_inner()))
                })
            })
            .ok()
            .flatten()
    }
}

/// Wraps a closure run on another thread so it reports to the caller's test capture, if any.
pub fn with_local_logger<F: FnOnce() -> R, R>(f: F) -> impl FnOnce() -> R {
    #[cfg(any(test, feature = "test-utils"))]
    {
        test_logger::with_local_logger(f)
    }
    #[cfg(not(any(test, feature = "test-utils")))]
    {
        f
    }
}

pub fn print_log(lvl: Level, log: fmt::Arguments, file: &str, line: u32) {
    match lvl {
        Level::Error => eprintln!("[dynamic-sampling] {lvl} {file}:{line} - {log}"),
        _ => println!("[dynamic-sampling] {lvl} {file}:{line} - {log}"),
    }
}

#[macro_export]
macro_rules! ds_debug {
    ($($arg:tt)+) => { $crate::ds_log!($crate::log::Level::Debug, $($arg)+) };
}

#[macro_export]
macro_rules! ds_info {
    ($($arg:tt)+) => { $crate::ds_log!($crate::log::Level::Info, $($arg)+) };
}

#[macro_export]
macro_rules! ds_warn {
    ($($arg:tt)+) => { $crate::ds_log!($crate::log::Level::Warn, $($arg)+) };
}

#[macro_export]
macro_rules! ds_error {
    ($($arg:tt)+) => { $crate::ds_log!($crate::log::Level::Error, $($arg)+) };
}

/// `ds_log!(Level::Warn, "retrying in {}s", 5)`
#[macro_export]
macro_rules! ds_log {
    ($lvl:expr, $($arg:tt)+) => {{
        let lvl: $crate::log::Level = $lvl;
        let loc = ::std::panic::Location::caller();
        if lvl <= $crate::log::max_level() {
            $crate::log::print_log(lvl, format_args!($($arg)+), loc.file(), loc.line());
        }
        #[cfg(any(test, feature = "test-utils"))]
        {
            $crate::log::test_logger::print_log(lvl, format_args!($($arg)+), loc.file(), loc.line());
        }
    }};
}
