//! API Error Handling
//!
//! Structured error responses with proper HTTP status codes and request tracking.
//! Game rejections keep their machine code so clients can tell them apart.

use crate::errors::{NodeError, RoundError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (NOT_FOUND, BAD_REQUEST, ALREADY_PLAYED, etc.)
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// API error types with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    /// Rejected game operation
    Rejected { status: StatusCode, code: &'static str, message: String },
    InternalError(String),
}

/// HTTP status for a game rejection
pub fn round_error_status(error: &RoundError) -> StatusCode {
    match error {
        RoundError::InvalidBetAmount { .. } => StatusCode::BAD_REQUEST,
        RoundError::AlreadyPlayed { .. }
        | RoundError::BettingClosed { .. }
        | RoundError::RoundNotActive { .. }
        | RoundError::RoundAlreadyFinalized { .. }
        | RoundError::CannotFinalizeYet { .. }
        | RoundError::BlockhashUnavailable { .. } => StatusCode::CONFLICT,
        RoundError::PayoutFailed { .. } | RoundError::DepositRejected { .. } => StatusCode::BAD_GATEWAY,
    }
}

impl ApiError {
    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn internal_error(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::InternalError(message),
            request_id,
        }
    }

    pub fn rejected(request_id: String, error: &RoundError) -> Self {
        Self {
            kind: ApiErrorKind::Rejected {
                status: round_error_status(error),
                code: error.code(),
                message: error.to_string(),
            },
            request_id,
        }
    }

    pub fn from_node(request_id: String, error: NodeError) -> Self {
        match error {
            NodeError::Round(round_error) => Self::rejected(request_id, &round_error),
            other => Self::internal_error(request_id, other.to_string()),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::BadRequest(msg) => write!(f, "[{}] Bad Request: {}", self.request_id, msg),
            ApiErrorKind::Rejected { code, message, .. } => write!(f, "[{}] {}: {}", self.request_id, code, message),
            ApiErrorKind::InternalError(msg) => write!(f, "[{}] Internal Error: {}", self.request_id, msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self.kind {
            ApiErrorKind::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiErrorKind::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiErrorKind::Rejected { status, code, message } => (status, code, message),
            ApiErrorKind::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = Json(ErrorResponse {
            request_id: self.request_id,
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}
