//! ANSI escape sequences for the log and error-report output.
//!
//! Only foreground colors are supported. Every wrapper can be switched to
//! plain output so that callers can honor a non-terminal sink without a
//! second formatting path.

#![cfg_attr(not(test), no_std)]

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
}

impl Color {
    fn fg(self) -> u8 {
        match self {
            Self::Red => 31,
            Self::Green => 32,
            Self::Yellow => 33,
            Self::Blue => 34,
            Self::Magenta => 35,
        }
    }
}

/// Displays a value in bold with the given foreground color.
pub struct WithFg<T> {
    color: Option<Color>,
    value: T,
}

impl<T> fmt::Display for WithFg<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = &self.value;
        match self.color {
            Some(color) => {
                let fg = color.fg();
                write!(f, "\x1B[{fg};1m{value}\x1B[0m")
            }
            None => write!(f, "{value}"),
        }
    }
}

impl<T> WithFg<T> {
    pub fn new(color: Color, value: T) -> Self {
        Self {
            color: Some(color),
            value,
        }
    }

    /// Drops the escape sequences when `enabled` is `false`.
    #[must_use]
    pub fn enabled(self, enabled: bool) -> Self {
        Self {
            color: self.color.filter(|_| enabled),
            value: self.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colored_output() {
        let s = format!("{}", WithFg::new(Color::Red, "oom"));
        assert_eq!(s, "\x1B[31;1moom\x1B[0m");

        let s = format!("{}", WithFg::new(Color::Magenta, 42));
        assert_eq!(s, "\x1B[35;1m42\x1B[0m");
    }

    #[test]
    fn test_disabled_output_is_plain() {
        let s = format!("{}", WithFg::new(Color::Green, "reserve").enabled(false));
        assert_eq!(s, "reserve");

        let s = format!("{}", WithFg::new(Color::Green, "reserve").enabled(true));
        assert_eq!(s, "\x1B[32;1mreserve\x1B[0m");
    }
}
