//! Error handling for castctl.
//!
//! Provides a unified error type based on gRPC status codes, with mapping
//! from the transport, codec and configuration errors underneath.
//!
//! # Error Categories
//!
//! The protocol client surfaces these categories:
//! * Not connected, or the device refused the connection (`Unavailable`)
//! * Connection torn down while a request was in flight (`Aborted`)
//! * No reply within the configured send timeout (`DeadlineExceeded`)
//! * Undecodable frames or payloads (`DataLoss`)
//! * Missing application descriptors or sessions (`NotFound`)
//! * Commands issued before the device reported a media session
//!   (`FailedPrecondition`)
//! * Invalid caller input such as a malformed URL (`InvalidArgument`)
//!
//! # Example
//!
//! ```rust
//! use castctl::error::{Error, ErrorKind, Result};
//!
//! fn check(level: f64) -> Result<()> {
//!     if !(0.0..=1.0).contains(&level) {
//!         return Err(Error::out_of_range(format!("volume {level} out of range")));
//!     }
//!     Ok(())
//! }
//! ```

#![allow(clippy::enum_glob_use)]

use std::fmt;
use thiserror::Error;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

impl Error {
    /// Attempts to downcast the underlying error to a concrete type.
    ///
    /// # Example
    /// ```
    /// use std::io;
    ///
    /// let error = Error::from(io::Error::new(io::ErrorKind::Other, "oh no!"));
    /// if let Some(io_err) = error.downcast::<io::Error>() {
    ///     println!("IO error kind: {:?}", io_err.kind());
    /// }
    /// ```
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }
}

/// Standard result type for castctl operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories based on gRPC status codes.
///
/// See [gRPC status codes](https://github.com/googleapis/googleapis/blob/master/google/rpc/code.proto)
/// for the original definitions.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u32)]
pub enum ErrorKind {
    /// The operation was cancelled, typically by the caller.
    #[error("operation was cancelled")]
    Cancelled = 1,

    /// Error that does not fit any other category.
    #[error("unknown error")]
    Unknown = 2,

    /// The caller specified an invalid argument.
    #[error("invalid argument specified")]
    InvalidArgument = 3,

    /// No reply arrived before the deadline.
    #[error("operation timed out")]
    DeadlineExceeded = 4,

    /// Some requested entity was not found.
    #[error("not found")]
    NotFound = 5,

    /// The entity that a client attempted to create already exists.
    #[error("attempt to create what already exists")]
    AlreadyExists = 6,

    /// The caller does not have permission to execute the operation.
    #[error("permission denied")]
    PermissionDenied = 7,

    /// Some resource has been exhausted.
    #[error("resource has been exhausted")]
    ResourceExhausted = 8,

    /// The system is not in a state required for the operation.
    #[error("invalid state")]
    FailedPrecondition = 9,

    /// The operation was aborted, typically because the connection died.
    #[error("operation aborted")]
    Aborted = 10,

    /// The operation was attempted past the valid range.
    #[error("out of range")]
    OutOfRange = 11,

    /// The operation is not implemented or not supported.
    #[error("not implemented")]
    Unimplemented = 12,

    /// Invariants expected by the underlying system have been broken.
    #[error("internal error")]
    Internal = 13,

    /// The device is currently unavailable or not connected.
    #[error("service unavailable")]
    Unavailable = 14,

    /// Unrecoverable data loss or corruption.
    #[error("unrecoverable data loss or corruption")]
    DataLoss = 15,
}

impl Error {
    /// Creates a new error with specified kind and details.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::new(ErrorKind::NotFound, "application not running");
    /// assert_eq!(err.kind, ErrorKind::NotFound);
    /// ```
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Creates an error for operations interrupted mid-flight.
    ///
    /// Used when the connection is torn down while a caller awaits a reply.
    pub fn aborted<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Aborted, error)
    }

    /// Creates an error for duplicate resource creation attempts.
    pub fn already_exists<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::AlreadyExists, error)
    }

    /// Creates an error for cancelled operations.
    pub fn cancelled<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Cancelled, error)
    }

    /// Creates an error for data corruption or loss.
    ///
    /// Used for frames and payloads that cannot be decoded.
    pub fn data_loss<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DataLoss, error)
    }

    /// Creates an error for operations that exceeded their deadline.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::deadline_exceeded("no reply to request 42");
    /// assert_eq!(err.kind, ErrorKind::DeadlineExceeded);
    /// ```
    pub fn deadline_exceeded<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::DeadlineExceeded, error)
    }

    /// Creates an error for operations that failed due to current state.
    pub fn failed_precondition<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::FailedPrecondition, error)
    }

    /// Creates an error for unexpected internal errors.
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Internal, error)
    }

    /// Creates an error for invalid arguments.
    pub fn invalid_argument<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::InvalidArgument, error)
    }

    /// Creates an error for missing resources.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::not_found("transport id and session id not found");
    /// assert_eq!(err.kind, ErrorKind::NotFound);
    /// ```
    pub fn not_found<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::NotFound, error)
    }

    /// Creates an error for values outside valid range.
    pub fn out_of_range<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::OutOfRange, error)
    }

    /// Creates an error for permission denied conditions.
    pub fn permission_denied<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::PermissionDenied, error)
    }

    /// Creates an error for exhausted resources.
    pub fn resource_exhausted<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::ResourceExhausted, error)
    }

    /// Creates an error for an unreachable or disconnected device.
    ///
    /// # Examples
    ///
    /// ```rust
    /// let err = Error::unavailable("not connected");
    /// assert_eq!(err.kind, ErrorKind::Unavailable);
    /// ```
    pub fn unavailable<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unavailable, error)
    }

    /// Creates an error for unsupported features.
    pub fn unimplemented<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unimplemented, error)
    }

    /// Creates an error for unknown errors.
    pub fn unknown<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::new(ErrorKind::Unknown, error)
    }
}

/// Returns the underlying error source.
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Formats the error for display, showing both kind and details.
///
/// Format: "{kind}: {details}"
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

/// Converts IO errors into appropriate error kinds.
///
/// A short read from the device surfaces as `UnexpectedEof`, which maps to
/// `DataLoss`; a peer that resets the connection maps to `Aborted`.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            NotFound => Self::not_found(err),
            PermissionDenied => Self::permission_denied(err),
            AddrInUse | AlreadyExists => Self::already_exists(err),
            AddrNotAvailable | ConnectionRefused | NotConnected => Self::unavailable(err),
            BrokenPipe | ConnectionReset | ConnectionAborted => Self::aborted(err),
            Interrupted | WouldBlock => Self::cancelled(err),
            UnexpectedEof => Self::data_loss(err),
            TimedOut => Self::deadline_exceeded(err),
            InvalidInput | InvalidData => Self::invalid_argument(err),
            WriteZero => Self::resource_exhausted(err),
            _ => Self::unknown(err),
        }
    }
}

/// Converts JSON errors to `DataLoss`.
///
/// JSON only flows through the payload of received or sent frames, so any
/// failure means the payload document is corrupt.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::data_loss(err)
    }
}

/// Converts Protocol Buffer errors to `DataLoss`.
impl From<protobuf::Error> for Error {
    fn from(err: protobuf::Error) -> Self {
        Self::data_loss(err)
    }
}

/// Converts TLS errors into appropriate error kinds.
///
/// Maps TLS errors:
/// * Configuration and crypto provider errors -> `Internal`
/// * Alerts and handshake failures -> `Unavailable`
impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        use rustls::Error::*;
        match err {
            General(_) | FailedToGetCurrentTime | FailedToGetRandomBytes => Self::internal(err),
            _ => Self::unavailable(err),
        }
    }
}

/// Converts invalid server names to `InvalidArgument`.
impl From<rustls::pki_types::InvalidDnsNameError> for Error {
    fn from(e: rustls::pki_types::InvalidDnsNameError) -> Self {
        Self::invalid_argument(e)
    }
}

/// Converts timeout errors to `DeadlineExceeded`.
impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Self::deadline_exceeded(e.to_string())
    }
}

/// Converts URL parsing errors to `InvalidArgument`.
impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

/// Converts configuration file errors to `InvalidArgument`.
impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

/// Converts IP address parsing errors to `InvalidArgument`.
impl From<std::net::AddrParseError> for Error {
    fn from(e: std::net::AddrParseError) -> Self {
        Self::invalid_argument(e)
    }
}
