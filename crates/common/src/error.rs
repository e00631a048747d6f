//! Error taxonomy shared by every layer.

use serde::Serialize;

/// Classification every error in the service maps into.
///
/// Transports translate a kind into their own status codes; nothing else
/// about an error is inspected at a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// The order or product does not exist.
    NotFound,
    /// The request can never succeed as sent: empty order, cost mismatch,
    /// malformed identifier, protocol misuse.
    InvalidArgument,
    /// Storage, network, decoding or cancellation failure.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
