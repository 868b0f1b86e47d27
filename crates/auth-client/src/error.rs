//! Error types for dispatch and refresh operations

use transport::TransportError;

/// Errors surfaced to callers of the dispatcher and client.
///
/// An expired credential is not an error here: it is recovered internally
/// and the caller only ever sees the replayed response, `RefreshFailed`, or
/// `AuthFinal`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("authentication rejected: {0}")]
    AuthFinal(String),

    #[error("authentication failed: {0}")]
    Auth(#[from] auth_session::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Whether this error ended the session (refresh failure tears it down).
    pub fn is_session_ended(&self) -> bool {
        matches!(self, Error::RefreshFailed(_))
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_convert() {
        let err: Error = TransportError::Http("refused".into()).into();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.to_string().contains("refused"), "got: {err}");
    }

    #[test]
    fn only_refresh_failure_ends_session() {
        assert!(Error::RefreshFailed("x".into()).is_session_ended());
        assert!(!Error::AuthFinal("x".into()).is_session_ended());
        assert!(!Error::InvalidRequest("x".into()).is_session_ended());
    }

    #[test]
    fn error_debug_includes_variant() {
        let err = Error::AuthFinal("401 after refresh".into());
        let debug = format!("{err:?}");
        assert!(
            debug.contains("AuthFinal"),
            "Debug should include variant name, got: {debug}"
        );
    }
}
