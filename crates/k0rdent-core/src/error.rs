//! Error taxonomy shared by every tool, producer and HTTP surface.

use thiserror::Error;

/// Every failure the server can surface to a client maps to one of these
/// variants. Tool handlers translate upstream failures (Kubernetes API status
/// codes, Helm stderr, catalog fetch errors) into this taxonomy at the
/// boundary; nothing else crosses it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("malformed authorization header: {0}")]
    Malformed(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable code for the variant, used in error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidParams(_) => "invalidParams",
            Error::Unauthorized(_) => "unauthorized",
            Error::Malformed(_) => "malformed",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "notFound",
            Error::Conflict(_) => "conflict",
            Error::Timeout(_) => "timeout",
            Error::Unavailable(_) => "unavailable",
            Error::Cancelled => "cancelled",
            Error::Internal(_) => "internal",
        }
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Error::InvalidParams(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidParams(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::InvalidParams("x".into()).code(), "invalidParams");
        assert_eq!(Error::Unauthorized("x".into()).code(), "unauthorized");
        assert_eq!(Error::Malformed("x".into()).code(), "malformed");
        assert_eq!(Error::Forbidden("x".into()).code(), "forbidden");
        assert_eq!(Error::NotFound("x".into()).code(), "notFound");
        assert_eq!(Error::Conflict("x".into()).code(), "conflict");
        assert_eq!(Error::Timeout("x".into()).code(), "timeout");
        assert_eq!(Error::Unavailable("x".into()).code(), "unavailable");
        assert_eq!(Error::Cancelled.code(), "cancelled");
        assert_eq!(Error::Internal("x".into()).code(), "internal");
    }

    #[test]
    fn json_errors_become_invalid_params() {
        let err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        assert!(matches!(Error::from(err), Error::InvalidParams(_)));
    }
}
