//! Routing error taxonomy
//!
//! Backends report a soft miss as [`RoutingError::NotFound`]; everything else
//! a backend returns is a hard failure. Require-all calls collect hard failures
//! into a [`MultiError`] so callers can inspect each cause individually.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("routing: not found")]
    NotFound,
    #[error("routing: operation or key not supported")]
    NotSupported,
    #[error("context canceled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
    #[error("backend error: {0}")]
    Backend(String),
    #[error("{0}")]
    Aggregate(MultiError),
}

impl RoutingError {
    /// Shorthand for a backend failure with a message
    pub fn backend(message: impl Into<String>) -> Self {
        RoutingError::Backend(message.into())
    }

    /// Whether this error is (or wraps) a soft miss
    pub fn is_not_found(&self) -> bool {
        match self {
            RoutingError::NotFound => true,
            RoutingError::Aggregate(multi) => multi.iter().any(RoutingError::is_not_found),
            _ => false,
        }
    }

    /// Whether this error came from a cancelled or expired scope
    pub fn is_context_error(&self) -> bool {
        matches!(self, RoutingError::Cancelled | RoutingError::DeadlineExceeded)
    }
}

/// Ordered collection of every hard failure seen during a require-all call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiError {
    errors: Vec<RoutingError>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure; nested aggregates are flattened in order
    pub fn push(&mut self, error: RoutingError) {
        match error {
            RoutingError::Aggregate(inner) => self.errors.extend(inner.errors),
            other => self.errors.push(other),
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoutingError> {
        self.errors.iter()
    }

    pub fn errors(&self) -> &[RoutingError] {
        &self.errors
    }

    /// `Ok(())` when nothing was recorded, otherwise the aggregate
    pub fn into_result(self) -> Result<(), RoutingError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(RoutingError::Aggregate(self))
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            1 => write!(f, "1 error occurred:")?,
            n => write!(f, "{} errors occurred:", n)?,
        }
        for error in &self.errors {
            write!(f, "\n\t* {}", error)?;
        }
        Ok(())
    }
}

impl Extend<RoutingError> for MultiError {
    fn extend<I: IntoIterator<Item = RoutingError>>(&mut self, iter: I) {
        for error in iter {
            self.push(error);
        }
    }
}

impl FromIterator<RoutingError> for MultiError {
    fn from_iter<I: IntoIterator<Item = RoutingError>>(iter: I) -> Self {
        let mut multi = MultiError::new();
        multi.extend(iter);
        multi
    }
}
