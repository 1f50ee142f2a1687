/*!
 * Error types for smb-bridge
 *
 * Every generation's client library raises its own failure shape. The adapter
 * boundary re-expresses all of them as a single [`StatusError`] that keeps the
 * server-reported NTSTATUS code (0 when there is none) and the original error
 * as its source.
 */

use std::fmt;
use std::io;

use thiserror::Error;

use crate::generation::ProtocolGeneration;
use crate::ntstatus::NtStatus;

pub type Result<T> = std::result::Result<T, StatusError>;

/// Status code carried by failures that are not SMB/CIFS protocol statuses
pub const NO_STATUS: u32 = 0;

/// Boxed originating error kept as the `cause` of a [`StatusError`]
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Failure reported by the remote server with a numeric status code
    Protocol,

    /// Local or I/O-level failure without a protocol status
    Transport,

    /// A context or handle could not be built, or a precondition failed
    /// before any request was issued
    Construction,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Protocol => write!(f, "protocol"),
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Construction => write!(f, "construction"),
        }
    }
}

/// Normalized failure for every facade operation
///
/// Immutable once built; only the constructors below create one.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct StatusError {
    message: String,
    status_code: u32,
    kind: ErrorKind,
    generation: Option<ProtocolGeneration>,
    #[source]
    cause: Option<Cause>,
}

impl StatusError {
    /// Server-reported failure. A zero code degrades to a transport error.
    pub fn protocol(message: impl Into<String>, status_code: u32, cause: Option<Cause>) -> Self {
        let kind = if status_code == NO_STATUS {
            ErrorKind::Transport
        } else {
            ErrorKind::Protocol
        };
        Self {
            message: message.into(),
            status_code,
            kind,
            generation: None,
            cause,
        }
    }

    /// Local failure without a protocol status
    pub fn transport(message: impl Into<String>, cause: Option<Cause>) -> Self {
        Self {
            message: message.into(),
            status_code: NO_STATUS,
            kind: ErrorKind::Transport,
            generation: None,
            cause,
        }
    }

    /// A context or handle could not be built
    pub fn construction(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: NO_STATUS,
            kind: ErrorKind::Construction,
            generation: None,
            cause: None,
        }
    }

    /// Construction failure caused by a collaborator error
    pub fn construction_caused_by(message: impl Into<String>, cause: Cause) -> Self {
        Self {
            cause: Some(cause),
            ..Self::construction(message)
        }
    }

    /// Tag the error with the generation that raised it
    pub fn with_generation(mut self, generation: ProtocolGeneration) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Numeric protocol status, or [`NO_STATUS`]
    pub fn status_code(&self) -> u32 {
        self.status_code
    }

    pub fn nt_status(&self) -> NtStatus {
        NtStatus::from(self.status_code)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn generation(&self) -> Option<ProtocolGeneration> {
        self.generation
    }

    /// The originating error, if one was wrapped
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn is_protocol(&self) -> bool {
        self.kind == ErrorKind::Protocol
    }

    pub fn is_transport(&self) -> bool {
        self.kind == ErrorKind::Transport
    }

    pub fn is_construction(&self) -> bool {
        self.kind == ErrorKind::Construction
    }
}

impl From<io::Error> for StatusError {
    fn from(err: io::Error) -> Self {
        StatusError::transport(err.to_string(), Some(Box::new(err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_protocol_error_keeps_code() {
        let err = StatusError::protocol("Access denied", 0xC000_0022, None);
        assert_eq!(err.status_code(), 0xC000_0022);
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.to_string(), "Access denied");
        assert_eq!(err.nt_status(), NtStatus::ACCESS_DENIED);
    }

    #[test]
    fn test_zero_code_is_transport() {
        let err = StatusError::protocol("socket closed", NO_STATUS, None);
        assert!(err.is_transport());
        assert_eq!(err.status_code(), 0);
    }

    #[test]
    fn test_construction_has_no_status() {
        let err = StatusError::construction("no client registered for SMB1");
        assert!(err.is_construction());
        assert_eq!(err.status_code(), NO_STATUS);
        assert!(err.cause().is_none());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        let err: StatusError = io_err.into();

        assert!(err.is_transport());
        assert_eq!(err.status_code(), 0);
        assert!(err.message().contains("reset by peer"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_with_generation() {
        let err = StatusError::construction("closed").with_generation(ProtocolGeneration::Smb212);
        assert_eq!(err.generation(), Some(ProtocolGeneration::Smb212));
    }
}
