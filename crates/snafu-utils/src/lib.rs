//! Error plumbing shared by the workspace crates.
//!
//! Library errors carry an implicit [`Location`] per variant. Binaries use
//! [`GenericError`] for ad-hoc failures and print them through [`Report`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::{boxed::Box, string::String};
use core::{error::Error, fmt};

use ansi_term::{Color, WithFg};
use snafu::{GenerateImplicitData, Snafu};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location(&'static core::panic::Location<'static>);

impl Default for Location {
    #[track_caller]
    fn default() -> Self {
        Self(core::panic::Location::caller())
    }
}

impl GenerateImplicitData for Location {
    #[track_caller]
    fn generate() -> Self {
        Self::default()
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Snafu)]
#[snafu(whatever, display("{message}"))]
pub struct GenericError {
    message: String,
    #[snafu(implicit)]
    location: Location,
    #[snafu(source(from(Box<dyn core::error::Error>, Some)))]
    source: Option<Box<dyn core::error::Error>>,
}

impl GenericError {
    #[must_use]
    pub fn location(&self) -> Location {
        self.location
    }
}

/// Formats an error and its chain of sources, one per line.
pub struct Report<E> {
    error: E,
    color: bool,
}

impl<E> fmt::Debug for Report<E>
where
    E: Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<E> fmt::Display for Report<E>
where
    E: Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error: {}", self.red(&self.error))?;
        let mut source = self.error.source();
        if source.is_some() {
            writeln!(f)?;
            writeln!(f, "Caused by:")?;
        }
        let mut index = 0;
        while let Some(s) = source {
            writeln!(f, "{index:4}: {}", self.red(s))?;
            source = s.source();
            index += 1;
        }
        Ok(())
    }
}

impl<E> Report<E> {
    pub fn new(error: E) -> Self {
        Self { error, color: true }
    }

    fn red<T>(&self, value: T) -> WithFg<T> {
        WithFg::new(Color::Red, value).enabled(self.color)
    }

    /// Enables or disables ANSI colors in the rendered report.
    #[must_use]
    pub fn color(self, color: bool) -> Self {
        Self {
            error: self.error,
            color,
        }
    }
}
