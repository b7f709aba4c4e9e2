//! Client-side error types.

use thiserror::Error;

/// How a call to the ledger API failed.
///
/// Transport failures are expected and recoverable: they flip the client
/// offline and reroute the write into the queue. Rejections are the
/// server's typed answer and are surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFailure {
    /// The request never produced an HTTP response (timeout, refused
    /// connection, DNS failure).
    Transport(String),
    /// The server answered with a failure envelope.
    Rejected { status: u16, message: String },
}

impl ApiFailure {
    /// True when the server rejected the call with a booking conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiFailure::Rejected { status: 409, .. })
    }
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiFailure::Transport(detail) => write!(f, "transport failure: {detail}"),
            ApiFailure::Rejected { status, message } => {
                write!(f, "rejected ({status}): {message}")
            }
        }
    }
}

/// Errors surfaced to the application by the reconciler.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server rejected an online write (validation, not-found,
    /// conflict). Transport failures never surface here; they fall back
    /// to the offline path.
    #[error("ledger rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// A payload could not be encoded or decoded.
    #[error("invalid payload: {0}")]
    Payload(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Payload(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_detection() {
        let conflict = ApiFailure::Rejected {
            status: 409,
            message: "garment 1 already rented".into(),
        };
        assert!(conflict.is_conflict());

        let bad_request = ApiFailure::Rejected {
            status: 400,
            message: "invalid interval".into(),
        };
        assert!(!bad_request.is_conflict());

        let transport = ApiFailure::Transport("connection refused".into());
        assert!(!transport.is_conflict());
    }
}
