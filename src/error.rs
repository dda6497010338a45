//! # Hub Errors

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by hub and adapter operations.
///
/// Each variant maps to one HTTP status. Authorization failures carry a
/// fixed message: the specific failed check is logged where it is detected,
/// never returned, so callers cannot probe which check failed.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input, a disallowed spec kind, or a dangling reference
    /// supplied by the caller.
    #[error("{0}")]
    BadRequest(String),

    /// A referenced entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The request names a spec or operator kind the hub does not support.
    #[error("{0}")]
    NotImplemented(String),

    /// The presented capability did not verify.
    #[error("not authorized")]
    Unauthorized,

    /// An upstream call exceeded its deadline.
    #[error("{0}")]
    DeadlineExceeded(String),

    /// Storage, crypto or upstream collaborator failure.
    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// The HTTP status the error maps to.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::DeadlineExceeded(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error body shape shared by every endpoint.
#[derive(Debug, Deserialize, Serialize)]
pub struct ErrorBody {
    /// Human-readable cause.
    #[serde(rename = "errMessage")]
    pub err_message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = ErrorBody { err_message: self.to_string() };
        (self.status(), Json(body)).into_response()
    }
}
