//! Shared error primitives.
#![deny(warnings)]
#![deny(missing_docs)]

use std::{error::Error, fmt};

/// A type-erased error.
///
/// Used at the seams where collaborators (upload clients, configuration providers) may fail for reasons that are not
/// known ahead of time.
pub type GenericError = anyhow::Error;

/// Macro for constructing a generic error.
///
/// The resulting value evaluates to [`GenericError`], and can be constructed from a string literal, a format string
/// (with arguments accepted, in the same order as `std::format!`), or a value which implements `Debug` and `Display`,
/// such as an existing error that implements `std::error::Error`.
#[macro_export]
macro_rules! generic_error {
    ($msg:literal $(,)?) => { $crate::_anyhow!($msg) };
    ($err:expr $(,)?) => { $crate::_anyhow!($err) };
    ($fmt:expr, $($arg:tt)*) => { $crate::_anyhow!($fmt, $($arg)*) };
}

#[doc(hidden)]
pub use anyhow::anyhow as _anyhow;

/// A collection of errors reported together.
///
/// Best-effort operations keep going after an individual failure, and report everything that went wrong at the end.
/// `MultiError` is the container for that report. It renders as `[first; second; ...]`.
#[derive(Debug)]
pub struct MultiError<E> {
    errors: Vec<E>,
}

impl<E> MultiError<E> {
    /// Creates a new `MultiError` from the given errors.
    pub fn new(errors: Vec<E>) -> Self {
        Self { errors }
    }

    /// Returns the number of errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns `true` if there are no errors.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns an iterator over the errors.
    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.errors.iter()
    }

    /// Consumes `self`, returning the errors.
    pub fn into_inner(self) -> Vec<E> {
        self.errors
    }
}

impl<E: fmt::Display> fmt::Display for MultiError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", error)?;
        }
        f.write_str("]")
    }
}

impl<E: Error> Error for MultiError<E> {}

impl<E> IntoIterator for MultiError<E> {
    type Item = E;
    type IntoIter = std::vec::IntoIter<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}
