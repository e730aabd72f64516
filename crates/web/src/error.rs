use http::StatusCode;
use thiserror::Error;
use weft_runtime::WriteError;

/// Errors boxed out of user middleware and handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A failure while translating between a transaction map and the native
/// objects: an extraction or a response-side coercion went wrong.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("unsupported body type: {kind}")]
    UnsupportedBodyType { kind: &'static str },

    #[error("invalid value for {key}: {reason}")]
    InvalidField { key: &'static str, reason: String },
}

impl AdapterError {
    pub fn unsupported_body_type(kind: &'static str) -> Self {
        Self::UnsupportedBodyType { kind }
    }

    pub fn invalid_field<S: ToString>(key: &'static str, reason: S) -> Self {
        Self::InvalidField { key, reason: reason.to_string() }
    }
}

/// Everything that can go wrong inside one request's pipeline traversal.
///
/// Expected routing rejections (404/405/406/415) are not errors; they are
/// [`Rejection`](crate::route::Rejection) outcomes. This taxonomy covers
/// true failures only.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("adapter error: {source}")]
    Adapter {
        #[from]
        source: AdapterError,
    },

    #[error("handler error: {source}")]
    Handler { source: BoxError },

    #[error("write error: {source}")]
    Write {
        #[from]
        source: WriteError,
    },
}

impl PipelineError {
    pub fn handler<E: Into<BoxError>>(e: E) -> Self {
        Self::Handler { source: e.into() }
    }

    /// The status the error-handler registry is consulted with.
    pub fn status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
