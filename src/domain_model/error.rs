use std::fmt;

/// Failures raised by the backing token store. Infrastructure errors are kept
/// separate from authorization failures so callers can tell a broken Redis
/// connection apart from a revoked token.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("misconfigured: {0}")]
    Malconfigured(String),
    #[error("cannot decode the token: {0}")]
    Decode(String),
    #[error("claims verification failed: {0}")]
    ClaimsVerification(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("{token_type} token payload does not contain {field}")]
    InvalidPayload {
        token_type: TokenType,
        field: &'static str,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    /// True for every failure a caller should map to an HTTP 401 equivalent.
    /// `ClaimsVerification` and `Decode` are kept as distinct variants so they
    /// can be logged differently, but they still count as unauthorized.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            SessionError::Unauthorized(_)
                | SessionError::ClaimsVerification(_)
                | SessionError::Decode(_)
        )
    }
}
