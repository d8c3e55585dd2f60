//! HTTP error mapping for the daemon.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use patchwright_core::{CompileError, PatchwrightError};
use serde::Serialize;
use thiserror::Error;

/// Errors returned by the HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed or incomplete request body.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The component failed to compile.
    #[error("syntax error: {message}")]
    Syntax {
        message: String,
        line: Option<u32>,
        column: Option<u32>,
    },

    /// The component compiled but threw while rendering.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// A required collaborator (compiler, store) is not reachable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    column: Option<u32>,
}

impl ApiError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Syntax { .. } | Self::Evaluation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::Syntax { .. } => "syntax",
            Self::Evaluation(_) => "evaluation",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (line, column) = match &self {
            Self::Syntax { line, column, .. } => (*line, *column),
            _ => (None, None),
        };
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                "internal server error".to_string()
            }
            Self::Syntax { message, .. } => message.clone(),
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: self.kind(),
            message,
            line,
            column,
        };
        (status, Json(body)).into_response()
    }
}

impl From<PatchwrightError> for ApiError {
    fn from(err: PatchwrightError) -> Self {
        match err {
            PatchwrightError::InvalidRequest(reason) => ApiError::InvalidRequest(reason),
            err @ PatchwrightError::FileNotFound { .. } => ApiError::NotFound(err.to_string()),
            PatchwrightError::Storage(err) => ApiError::Unavailable(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CompileError> for ApiError {
    fn from(err: CompileError) -> Self {
        match err {
            CompileError::InvalidRequest(reason) => ApiError::InvalidRequest(reason),
            CompileError::Syntax {
                message,
                line,
                column,
            } => ApiError::Syntax {
                message,
                line,
                column,
            },
            CompileError::Evaluation { message } => ApiError::Evaluation(message),
            CompileError::CompilerUnavailable(reason) => ApiError::Unavailable(reason),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_class() {
        assert_eq!(
            ApiError::InvalidRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(CompileError::Evaluation {
                message: "boom".into()
            })
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(CompileError::CompilerUnavailable("gone".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(PatchwrightError::FileNotFound {
                project_id: "p".into(),
                filename: "A.svelte".into(),
            })
            .status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn syntax_errors_keep_their_position() {
        let err = ApiError::from(CompileError::Syntax {
            message: "Unexpected token".into(),
            line: Some(3),
            column: Some(7),
        });
        match err {
            ApiError::Syntax { line, column, .. } => {
                assert_eq!(line, Some(3));
                assert_eq!(column, Some(7));
            }
            other => panic!("expected Syntax, got {other:?}"),
        }
    }
}
