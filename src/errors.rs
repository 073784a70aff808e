use std::str::Utf8Error;
use std::time::Duration;

/// All error types that can occur while talking to a Deako hub.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to serialize a request to JSON.
    #[error("failed to dump json: {0:?}")]
    JsonDump(serde_json::Error),

    /// A frame received from the hub was not valid JSON.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),

    /// A network socket operation failed while communicating with the hub.
    #[error("connection {action} error: {err:?}")]
    Connection { action: String, err: std::io::Error },

    /// A request was issued while no connection to the hub is open.
    #[error("not connected to the hub")]
    NotConnected,

    /// The session ended while an operation was still waiting on it.
    #[error("disconnected from the hub: {reason}")]
    Disconnected { reason: String },

    /// A frame received from the hub contained invalid UTF-8.
    #[error("utf8 decoding error: {0:?}")]
    Utf8Decode(Utf8Error),

    /// A frame was well-formed JSON but did not match the expected shape.
    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    /// The hub sent more than `max` bytes without a frame delimiter.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLong { len: usize, max: usize },

    /// An operation did not complete within its time budget.
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// The requested device has never been reported by the hub.
    #[error("device not found {0}")]
    DeviceNotFound(String),

    /// A dim level outside 0-100 percent.
    #[error("invalid dim level {0}; expected 0-100")]
    InvalidDim(String),
}

impl Error {
    /// Create a new connection error
    pub fn connection(action: &str, err: std::io::Error) -> Self {
        Error::Connection {
            action: action.to_string(),
            err,
        }
    }

    /// Create a new disconnected error
    pub fn disconnected(reason: &str) -> Self {
        Error::Disconnected {
            reason: reason.to_string(),
        }
    }

    /// Create a new protocol error
    pub fn protocol(reason: impl Into<String>) -> Self {
        Error::Protocol {
            reason: reason.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout(operation: &str, after: Duration) -> Self {
        Error::Timeout {
            operation: operation.to_string(),
            after,
        }
    }

    /// Network-level failure: connect, send, or the session dropping.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Error::Connection { .. } | Error::NotConnected | Error::Disconnected { .. }
        )
    }

    /// Malformed or undecodable data from the hub.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Error::Protocol { .. }
                | Error::JsonLoad(_)
                | Error::Utf8Decode(_)
                | Error::FrameTooLong { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::DeviceNotFound(_))
    }

    /// Decode errors after which the byte stream cannot be resynchronized.
    pub(crate) fn is_fatal(&self) -> bool {
        matches!(self, Error::FrameTooLong { .. })
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let refused = Error::connection(
            "connect",
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        );
        assert!(refused.is_connection());
        assert!(Error::NotConnected.is_connection());
        assert!(Error::disconnected("reset").is_connection());

        assert!(Error::protocol("missing uuid").is_protocol());
        assert!(Error::FrameTooLong { len: 10, max: 5 }.is_protocol());
        assert!(Error::FrameTooLong { len: 10, max: 5 }.is_fatal());
        assert!(!Error::protocol("missing uuid").is_fatal());

        assert!(Error::timeout("discovery", Duration::from_secs(1)).is_timeout());
        assert!(Error::DeviceNotFound("A".into()).is_not_found());
        assert!(!Error::DeviceNotFound("A".into()).is_connection());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Error::DeviceNotFound("abc".into()).to_string(),
            "device not found abc"
        );
        assert_eq!(
            Error::disconnected("closed by hub").to_string(),
            "disconnected from the hub: closed by hub"
        );
    }
}
