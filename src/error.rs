//! Error types for the session store and its HTTP surface.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::session::ImageRejection;

/// Seconds a client should wait before retrying after backpressure.
const RETRY_AFTER_SECS: u64 = 5;

/// Failure of a session store operation.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The request carried no images.
    #[error("at least one image is required")]
    NoImages,

    /// More images than a session may hold.
    #[error("too many images: {count} supplied, at most {max} allowed")]
    TooManyImages { count: usize, max: usize },

    /// One or more payloads failed to decode or exceeded the size limit.
    #[error("invalid images: {}", join_rejections(.0))]
    InvalidImages(Vec<ImageRejection>),

    /// The store holds as many live sessions as it is allowed to.
    #[error("session store is full ({limit} live sessions), retry later")]
    CapacityExceeded { limit: usize },

    /// Unknown or expired session. Both cases are reported identically.
    #[error("session not found")]
    NotFound,

    /// Unexpected failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of [`SessionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// User-correctable input problem.
    InvalidInput,
    /// Missing or expired session.
    NotFound,
    /// Backpressure; the caller may retry.
    Capacity,
    /// Anything else.
    Internal,
}

impl SessionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoImages | Self::TooManyImages { .. } | Self::InvalidImages(_) => {
                ErrorKind::InvalidInput
            }
            Self::CapacityExceeded { .. } => ErrorKind::Capacity,
            Self::NotFound => ErrorKind::NotFound,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Capacity
    }
}

fn join_rejections(items: &[ImageRejection]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// JSON error body returned by the API.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ImageRejection>,
}

/// Error returned by HTTP handlers.
#[derive(Debug)]
pub enum ApiError {
    /// A store operation failed.
    Session(SessionError),
    /// The request was refused before reaching the store.
    Rejected { status: StatusCode, message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::rejected(StatusCode::BAD_REQUEST, message)
    }

    pub fn too_many_requests() -> Self {
        Self::rejected(StatusCode::TOO_MANY_REQUESTS, "too many requests, slow down")
    }

    pub fn timed_out() -> Self {
        Self::rejected(StatusCode::REQUEST_TIMEOUT, "request timed out")
    }

    fn rejected(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self::Session(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            Self::Rejected { status, message } => {
                return (
                    status,
                    Json(ErrorBody {
                        error: message,
                        details: Vec::new(),
                    }),
                )
                    .into_response();
            }
            Self::Session(err) => err,
        };

        let status = match err.kind() {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Capacity => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match err {
            SessionError::InvalidImages(details) => ErrorBody {
                error: "one or more images are invalid".to_string(),
                details,
            },
            SessionError::Internal(detail) => {
                tracing::error!(name: "api.internal_error", detail = %detail, "Internal error");
                ErrorBody {
                    error: "internal server error".to_string(),
                    details: Vec::new(),
                }
            }
            other => ErrorBody {
                error: other.to_string(),
                details: Vec::new(),
            },
        };

        if status == StatusCode::SERVICE_UNAVAILABLE {
            return (
                status,
                [(header::RETRY_AFTER, RETRY_AFTER_SECS.to_string())],
                Json(body),
            )
                .into_response();
        }
        (status, Json(body)).into_response()
    }
}
