//! Error types for session and auth endpoint operations

/// Errors from login, registration, refresh and session persistence.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<transport::TransportError> for Error {
    fn from(err: transport::TransportError) -> Self {
        Error::Http(err.to_string())
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_map_to_http() {
        let err: Error = transport::TransportError::Timeout("after 30s".into()).into();
        assert!(matches!(err, Error::Http(_)));
        assert!(err.to_string().contains("after 30s"), "got: {err}");
    }

    #[test]
    fn error_display_includes_context() {
        let err = Error::InvalidCredentials("wrong password".into());
        assert_eq!(err.to_string(), "invalid credentials: wrong password");
    }
}
