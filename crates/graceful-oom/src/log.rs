//! Leveled logging to stderr.
//!
//! Logging is off until a level is selected with [`set_max_level`], so the
//! library stays silent unless the application asks for it. Nothing on the
//! allocation-failure path logs.

use core::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};
use std::io::{self, IsTerminal as _, Write as _};

use ansi_term::{Color, WithFg};

macro_rules! log {
    ($level:expr, $($arg:tt)*) => {
        $crate::log::log($level, format_args!($($arg)*));
    };
}

#[expect(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => {
        log!($crate::log::LogLevel::Trace, $($arg)*);
    };
}

macro_rules! debug {
    ($($arg:tt)*) => {
        log!($crate::log::LogLevel::Debug, $($arg)*);
    };
}

macro_rules! info {
    ($($arg:tt)*) => {
        log!($crate::log::LogLevel::Info, $($arg)*);
    };
}

macro_rules! warn {
    ($($arg:tt)*) => {
        log!($crate::log::LogLevel::Warn, $($arg)*);
    };
}

#[expect(unused_macros)]
macro_rules! error {
    ($($arg:tt)*) => {
        log!($crate::log::LogLevel::Error, $($arg)*);
    };
}

const OFF: u8 = u8::MAX;

static MAX_LEVEL: AtomicU8 = AtomicU8::new(OFF);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn from_u8(value: u8) -> Option<Self> {
        let level = match value {
            0 => Self::Trace,
            1 => Self::Debug,
            2 => Self::Info,
            3 => Self::Warn,
            4 => Self::Error,
            _ => return None,
        };
        Some(level)
    }
}

/// Sets the least severe level that is still written; `None` turns logging
/// off.
pub fn set_max_level(level: Option<LogLevel>) {
    MAX_LEVEL.store(level.map_or(OFF, |level| level as u8), Ordering::Relaxed);
}

#[must_use]
pub fn max_level() -> Option<LogLevel> {
    LogLevel::from_u8(MAX_LEVEL.load(Ordering::Relaxed))
}

#[must_use]
pub fn enabled(level: LogLevel) -> bool {
    max_level().is_some_and(|max| level >= max)
}

pub fn log(level: LogLevel, message: fmt::Arguments) {
    if !enabled(level) {
        return;
    }
    let stderr = io::stderr();
    let color = stderr.is_terminal();
    let pid = std::process::id();
    // There is nowhere left to report a failing stderr.
    let _ = writeln!(
        stderr.lock(),
        "{} [{pid}] {message}",
        LevelFormat(level, color)
    );
}

struct LevelFormat(LogLevel, bool);

impl fmt::Display for LevelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let color = match self.0 {
            LogLevel::Trace => Color::Magenta,
            LogLevel::Debug => Color::Blue,
            LogLevel::Info => Color::Green,
            LogLevel::Warn => Color::Yellow,
            LogLevel::Error => Color::Red,
        };
        let msg = match self.0 {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => " INFO",
            LogLevel::Warn => " WARN",
            LogLevel::Error => "ERROR",
        };
        write!(f, "{}", WithFg::new(color, msg).enabled(self.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        set_max_level(None);
        assert_eq!(max_level(), None);
        assert!(!enabled(LogLevel::Error));

        set_max_level(Some(LogLevel::Info));
        assert_eq!(max_level(), Some(LogLevel::Info));
        assert!(!enabled(LogLevel::Trace));
        assert!(!enabled(LogLevel::Debug));
        assert!(enabled(LogLevel::Info));
        assert!(enabled(LogLevel::Error));

        set_max_level(Some(LogLevel::Trace));
        assert!(enabled(LogLevel::Trace));

        set_max_level(None);
    }

    #[test]
    fn test_level_format() {
        assert_eq!(
            format!("{}", LevelFormat(LogLevel::Info, false)),
            " INFO"
        );
        assert_eq!(
            format!("{}", LevelFormat(LogLevel::Warn, true)),
            "\x1B[33;1m WARN\x1B[0m"
        );
    }
}
