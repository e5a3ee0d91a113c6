//! Error types for the effect runtime.
//!
//! Every failure an [`Effect`](super::Effect) can raise is an [`Error`].
//! Cancellation is a distinct variant so that retry loops and handlers can
//! recognise it and let it pass through unaltered.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::runtime::BlockingError;

/// Shorthand for results produced by the effect runtime.
pub type EffectResult<A> = Result<A, Error>;

/// A domain failure: a message plus an optional underlying error.
///
/// The source is shared behind an `Arc` so that failures can be cloned
/// cheaply, for example when several callers join the same fork.
///
/// # Examples
///
/// ```rust
/// use effector::effect::Failure;
///
/// let failure = Failure::new("disk full");
/// assert_eq!(failure.message(), "disk full");
/// assert!(failure.source_error().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct Failure {
    message: Arc<str>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Failure {
    /// Creates a failure carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Arc::from(message.into()),
            source: None,
        }
    }

    /// Creates a failure wrapping an existing error.
    ///
    /// The message is the `Display` rendering of `error`.
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: Arc::from(error.to_string()),
            source: Some(Arc::new(error)),
        }
    }

    /// Returns the failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the wrapped error, if any.
    pub fn source_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Attempts to view the wrapped error as a concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.source.as_deref().and_then(|source| source.downcast_ref::<E>())
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.message)
    }
}

/// Represents every way an effect can fail.
///
/// # Examples
///
/// ```rust
/// use effector::effect::Error;
///
/// let error = Error::failure("connection refused");
/// assert!(!error.is_cancelled());
/// assert_eq!(format!("{error}"), "connection refused");
///
/// assert!(Error::Cancelled.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub enum Error {
    /// The environment's cancellation signal was raised.
    ///
    /// Cancellation is fatal to the current chain: handlers never see it and
    /// retry loops never retry it.
    Cancelled,
    /// An application failure.
    Failure(Failure),
    /// An invariant was violated: a step yielded neither a value nor an
    /// error. The payload names the broken invariant.
    Bottom(&'static str),
    /// A panic was caught at a thread or async boundary.
    Panicked(String),
}

impl Error {
    /// Creates a domain failure from a message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(Failure::new(message))
    }

    /// Creates a domain failure wrapping an existing error.
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failure(Failure::from_error(error))
    }

    /// Converts a caught panic payload into an error.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "Unknown panic".to_string()
        };
        Self::Panicked(message)
    }

    /// Returns `true` for [`Error::Cancelled`].
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` for [`Error::Bottom`].
    pub const fn is_bottom(&self) -> bool {
        matches!(self, Self::Bottom(_))
    }

    /// Returns the domain failure, if this is one.
    pub const fn as_failure(&self) -> Option<&Failure> {
        match self {
            Self::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(formatter, "effect cancelled"),
            Self::Failure(failure) => write!(formatter, "{failure}"),
            Self::Bottom(invariant) => write!(formatter, "invariant violated: {invariant}"),
            Self::Panicked(message) => write!(formatter, "effect panicked: {message}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Failure(failure) => failure
                .source
                .as_deref()
                .map(|source| source as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

/// Errors compare by kind and message; wrapped sources are not compared.
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Cancelled, Self::Cancelled) => true,
            (Self::Failure(left), Self::Failure(right)) => left.message == right.message,
            (Self::Bottom(left), Self::Bottom(right)) => left == right,
            (Self::Panicked(left), Self::Panicked(right)) => left == right,
            _ => false,
        }
    }
}

impl Eq for Error {}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        Self::Failure(failure)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::from_error(error)
    }
}

impl From<BlockingError> for Error {
    fn from(error: BlockingError) -> Self {
        Self::from_error(error)
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Self::failure(message)
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Self::failure(message)
    }
}
