//! Defines the error types used by the crate.

use std::fmt;

/// The error enum for the fallible configuration surface.
///
/// The concurrent operations themselves (`insert`, `get`, `remove`) are
/// infallible by design: they retry internally until they linearize.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The builder was handed a parameter outside its valid domain, e.g. a
    /// branching probability not in `(0, 1)` or a block capacity below 2.
    Configuration(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for Error {}
