//! Error taxonomy shared by every deskrag layer.
//!
//! Low-level adapters (stores, provider clients) report raw failures as
//! [`Error::Upstream`]. The document processor and the RAG service attach
//! context with [`Error::context`] before the error reaches the API
//! boundary, which is the only place that turns a variant into an HTTP
//! status via [`Error::status_code`].

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A required provider credential or setting is missing. Not retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed input: missing field, empty query, unknown doc type.
    #[error("{0}")]
    Validation(String),

    /// No authenticated session.
    #[error("unauthorized: {0}")]
    Authorization(String),

    /// Authenticated, but the role is not allowed to perform the action.
    #[error("insufficient permissions: {0}")]
    Permission(String),

    /// The referenced document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Embedding, completion, or store call failed or timed out.
    #[error("upstream error: {0}")]
    Upstream(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Prefix the message with `ctx`, keeping the variant.
    ///
    /// ```rust
    /// use deskrag_core::error::Error;
    ///
    /// let err = Error::Upstream("timeout".into()).context("chunk 3");
    /// assert_eq!(err.to_string(), "upstream error: chunk 3: timeout");
    /// ```
    pub fn context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            Error::Configuration(m) => Error::Configuration(format!("{}: {}", ctx, m)),
            Error::Validation(m) => Error::Validation(format!("{}: {}", ctx, m)),
            Error::Authorization(m) => Error::Authorization(format!("{}: {}", ctx, m)),
            Error::Permission(m) => Error::Permission(format!("{}: {}", ctx, m)),
            Error::NotFound(m) => Error::NotFound(format!("{}: {}", ctx, m)),
            Error::Upstream(m) => Error::Upstream(format!("{}: {}", ctx, m)),
        }
    }

    /// HTTP status used by the API boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Authorization(_) => 401,
            Error::Permission(_) => 403,
            Error::NotFound(_) => 404,
            Error::Configuration(_) | Error::Upstream(_) => 500,
        }
    }

    /// Machine-readable error code for JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::Validation(_) => "bad_request",
            Error::Authorization(_) => "unauthorized",
            Error::Permission(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::Upstream(_) => "upstream",
        }
    }

    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Error::Upstream(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Upstream(format!("json: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_variant() {
        let err = Error::NotFound("document abc".into()).context("update");
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "not found: update: document abc");
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(Error::Validation("x".into()).status_code(), 400);
        assert_eq!(Error::Authorization("x".into()).status_code(), 401);
        assert_eq!(Error::Permission("x".into()).status_code(), 403);
        assert_eq!(Error::Upstream("x".into()).status_code(), 500);
        assert_eq!(Error::Configuration("x".into()).status_code(), 500);
    }
}
