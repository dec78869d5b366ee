//! Failure types shared by every effect.
//!
//! An [`Effect`](crate::Effect) carries its own error type `E`. The only thing
//! the runtime needs from it is a way to report that an execution was
//! cancelled before it settled, which is what [`Cancelled`] and the
//! [`Failure`] bound provide.
//!
//! # Example
//!
//! ```rust
//! use undertow::Cancelled;
//!
//! let message: String = Cancelled.into();
//! assert_eq!(message, "execution was cancelled");
//!
//! let io: std::io::Error = Cancelled.into();
//! assert_eq!(io.kind(), std::io::ErrorKind::Interrupted);
//! ```

use std::fmt;

/// Failure reported when an execution is cancelled before it settles.
///
/// The async bridge settles a pending callback with this value when its
/// [`Connection`](crate::Connection) is cancelled, and execution contexts that
/// drop a continuation report it as well.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("execution was cancelled")
    }
}

impl std::error::Error for Cancelled {}

impl From<Cancelled> for String {
    fn from(cancelled: Cancelled) -> Self {
        cancelled.to_string()
    }
}

impl From<Cancelled> for std::io::Error {
    fn from(cancelled: Cancelled) -> Self {
        std::io::Error::new(std::io::ErrorKind::Interrupted, cancelled)
    }
}

/// Bound required of an effect's error channel.
///
/// Implemented automatically for every `Send + 'static` type that is `Debug`
/// (failures that nobody observes anymore are logged) and can represent a
/// cancellation.
pub trait Failure: From<Cancelled> + fmt::Debug + Send + 'static {}

impl<E> Failure for E where E: From<Cancelled> + fmt::Debug + Send + 'static {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_displays_message() {
        assert_eq!(Cancelled.to_string(), "execution was cancelled");
    }

    #[test]
    fn cancelled_converts_to_io_error() {
        let error = std::io::Error::from(Cancelled);
        assert_eq!(error.kind(), std::io::ErrorKind::Interrupted);
        assert!(error.get_ref().is_some_and(|inner| inner.is::<Cancelled>()));
    }

    #[test]
    fn string_is_a_failure() {
        fn assert_failure<E: Failure>() {}
        assert_failure::<String>();
        assert_failure::<std::io::Error>();
    }
}
