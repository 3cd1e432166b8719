//! Severity levels and sinks for diagnostics reported to users.

#![warn(missing_docs)]

#[cfg(test)]
pub(crate) mod tests;

use std::fmt::Display;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::Level;

/// An enumeration of possible severity levels.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    /// An informational message.
    Info,
    /// A warning.
    #[default]
    Warning,
    /// An error. Often, but not always, fatal.
    Error,
}

impl Severity {
    /// Returns log level corresponding to this severity.
    #[inline]
    pub const fn as_tracing_level(&self) -> Level {
        match *self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error => Level::ERROR,
        }
    }

    /// Returns `true` if the severity is [`Severity::Error`].
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(*self, Self::Error)
    }

    /// The severity used to report a count of failed checks.
    ///
    /// Zero failures are informational; anything else is an error.
    #[inline]
    pub fn for_count(count: u64) -> Self {
        if count == 0 { Self::Info } else { Self::Error }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A destination for leveled diagnostic messages.
pub trait DiagnosticSink {
    /// Reports a single message at the given severity.
    fn emit(&self, severity: Severity, message: &str);

    /// Reports each message in order at the given severity.
    fn emit_all<'a>(&self, severity: Severity, messages: impl IntoIterator<Item = &'a str>)
    where
        Self: Sized,
    {
        for message in messages {
            self.emit(severity, message);
        }
    }
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for &T {
    fn emit(&self, severity: Severity, message: &str) {
        (**self).emit(severity, message)
    }
}

/// Forwards diagnostics to [`tracing`] at the level matching their severity.
#[derive(Copy, Clone, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => tracing::event!(Level::INFO, "{}", message),
            Severity::Warning => tracing::event!(Level::WARN, "{}", message),
            Severity::Error => tracing::event!(Level::ERROR, "{}", message),
        }
    }
}

/// Records every diagnostic it receives, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(Severity, String)>>,
}

impl RecordingSink {
    /// Creates a new, empty sink.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all recorded diagnostics.
    pub fn records(&self) -> Vec<(Severity, String)> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the messages recorded at the given severity.
    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(s, _)| *s == severity)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    /// The number of recorded errors.
    pub fn num_errors(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(s, _)| s.is_error())
            .count()
    }

    /// Removes all recorded diagnostics.
    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, severity: Severity, message: &str) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((severity, message.to_string()));
    }
}
