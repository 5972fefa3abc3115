//! Explicit success/failure return contract.
//!
//! `Outcome` is what engine entry points hand back to the presentation
//! layer. Domain failures travel as `Failure`; only programmer error panics.
//! Reading the wrong side of an outcome is such an error.

use serde::{Deserialize, Serialize};

/// Success value XOR failure reason.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Outcome<T, E> {
    /// Operation completed.
    Success(T),
    /// Operation failed for a domain reason.
    Failure(E),
}

impl<T, E> Outcome<T, E> {
    /// Create a successful outcome.
    pub const fn success(value: T) -> Self {
        Self::Success(value)
    }

    /// Create a failed outcome.
    pub const fn failure(reason: E) -> Self {
        Self::Failure(reason)
    }

    /// Whether this is a success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether this is a failure.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Borrow the success value.
    ///
    /// # Panics
    ///
    /// Panics when called on a failure.
    #[track_caller]
    pub fn value(&self) -> &T {
        match self {
            Self::Success(value) => value,
            Self::Failure(_) => panic!("Outcome::value called on a failure outcome"),
        }
    }

    /// Borrow the failure reason.
    ///
    /// # Panics
    ///
    /// Panics when called on a success.
    #[track_caller]
    pub fn reason(&self) -> &E {
        match self {
            Self::Failure(reason) => reason,
            Self::Success(_) => panic!("Outcome::reason called on a success outcome"),
        }
    }

    /// Take the success value.
    ///
    /// # Panics
    ///
    /// Panics when called on a failure.
    #[track_caller]
    pub fn into_value(self) -> T {
        match self {
            Self::Success(value) => value,
            Self::Failure(_) => panic!("Outcome::into_value called on a failure outcome"),
        }
    }

    /// Take the failure reason.
    ///
    /// # Panics
    ///
    /// Panics when called on a success.
    #[track_caller]
    pub fn into_reason(self) -> E {
        match self {
            Self::Failure(reason) => reason,
            Self::Success(_) => panic!("Outcome::into_reason called on a success outcome"),
        }
    }

    /// Convert to a `Result` for `?`-style propagation.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(reason) => Err(reason),
        }
    }

    /// Borrow both sides.
    pub const fn as_ref(&self) -> Outcome<&T, &E> {
        match self {
            Self::Success(value) => Outcome::Success(value),
            Self::Failure(reason) => Outcome::Failure(reason),
        }
    }

    /// Transform the success value.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U, E> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::Failure(reason) => Outcome::Failure(reason),
        }
    }

    /// Transform the failure reason.
    pub fn map_failure<G, F: FnOnce(E) -> G>(self, f: F) -> Outcome<T, G> {
        match self {
            Self::Success(value) => Outcome::Success(value),
            Self::Failure(reason) => Outcome::Failure(f(reason)),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(reason) => Self::Failure(reason),
        }
    }
}

impl<T, E> From<Outcome<T, E>> for Result<T, E> {
    fn from(outcome: Outcome<T, E>) -> Self {
        outcome.into_result()
    }
}
