//! Error types for the bucketkit library.
//!
//! ## Key Components
//!
//! - [`QueueError`]: Returned by queue and bucket operations that cannot
//!   complete (strict `add` rejection, unsupported bulk operations, underflow,
//!   interrupted waits, bucket-creation failure).
//! - [`ConfigError`]: Returned when builder parameters are invalid
//!   (e.g. zero bucket capacity).
//! - [`BoxError`]: Error type produced by user-supplied queue and sensor
//!   factories.
//!
//! Admission rejection by a sensor is *not* an error: `offer`/`put` report it
//! as `false`. Only the strict `add` contract turns it into
//! [`QueueError::IllegalState`].
//!
//! ## Example Usage
//!
//! ```
//! use bucketkit::builder::BucketedQueueBuilder;
//! use bucketkit::error::QueueError;
//!
//! let queue = BucketedQueueBuilder::new(|x: &u32| *x % 2).build();
//! assert!(matches!(queue.remove(), Err(QueueError::NoSuchElement)));
//! ```

use std::error::Error;
use std::fmt;

/// Boxed error returned by queue and sensor factories.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

// ---------------------------------------------------------------------------
// QueueError
// ---------------------------------------------------------------------------

/// Error returned by bucketed queue operations.
#[derive(Debug)]
pub enum QueueError {
    /// The operation's contract could not be honoured in the current state.
    ///
    /// Raised by the strict `add` path when a sensor denies the insert or a
    /// bounded bucket is full, and when lazy bucket creation fails (the
    /// factory error is kept as `source`).
    IllegalState {
        message: String,
        source: Option<BoxError>,
    },
    /// The operation is deliberately unsupported.
    NotImplemented(&'static str),
    /// `remove()`/`element()` found no eligible bucket.
    NoSuchElement,
    /// A blocking wait was interrupted before it completed.
    Interrupted,
}

impl QueueError {
    /// Creates an `IllegalState` error without a cause.
    #[inline]
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an `IllegalState` error wrapping `source`.
    #[inline]
    pub fn illegal_state_caused_by(message: impl Into<String>, source: BoxError) -> Self {
        Self::IllegalState {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Returns `true` if this error is an interrupted wait.
    #[inline]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalState { message, .. } => f.write_str(message),
            Self::NotImplemented(op) => write!(f, "{op} is not implemented"),
            Self::NoSuchElement => f.write_str("no bucket has an element to remove"),
            Self::Interrupted => f.write_str("blocking wait was interrupted"),
        }
    }
}

impl Error for QueueError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::IllegalState {
                source: Some(source),
                ..
            } => Some(source.as_ref()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when queue configuration parameters are invalid.
///
/// Produced by [`BucketedQueueBuilder::try_build`](crate::builder::BucketedQueueBuilder::try_build)
/// and [`BlockingDeque::try_bounded`](crate::queue::BlockingDeque::try_bounded).
///
/// # Example
///
/// ```
/// use bucketkit::builder::BucketedQueueBuilder;
///
/// let err = BucketedQueueBuilder::new(|x: &u64| *x)
///     .bounded(0)
///     .try_build()
///     .unwrap_err();
/// assert!(err.to_string().contains("capacity"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for ConfigError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
