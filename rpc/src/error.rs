//! HTTP error mapping.

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ekyc_types::TypeError;
use ekyc_verification::{ErrorKind, VerificationError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("server error: {0}")]
    Server(String),
}

impl From<TypeError> for RpcError {
    fn from(e: TypeError) -> Self {
        RpcError::InvalidRequest(e.to_string())
    }
}

impl From<JsonRejection> for RpcError {
    fn from(e: JsonRejection) -> Self {
        RpcError::InvalidRequest(e.body_text())
    }
}

impl From<QueryRejection> for RpcError {
    fn from(e: QueryRejection) -> Self {
        RpcError::InvalidRequest(e.body_text())
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_remaining: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guesses_remaining: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

/// Status code for each error kind. Stable: front-ends branch on it.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::RateLimitExceeded | ErrorKind::CooldownActive => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::InvalidCode
        | ErrorKind::GuessesExhausted
        | ErrorKind::ValidationError
        | ErrorKind::NoChanges
        | ErrorKind::ExtractionFailed
        | ErrorKind::FaceMismatch => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::ExpiredChallenge => StatusCode::GONE,
        ErrorKind::NoActiveChallenge => StatusCode::NOT_FOUND,
        ErrorKind::ConflictStaleSnapshot => StatusCode::CONFLICT,
        ErrorKind::SnapshotNotLoaded | ErrorKind::PreconditionNotMet => {
            StatusCode::PRECONDITION_FAILED
        }
        ErrorKind::NetworkError | ErrorKind::BackendError => StatusCode::BAD_GATEWAY,
        ErrorKind::SessionClosed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let detail = self.to_string();
        let mut body = ErrorResponse {
            error: "ValidationError",
            detail,
            seconds_remaining: None,
            guesses_remaining: None,
            attempts: None,
            max_attempts: None,
        };

        let status = match &self {
            RpcError::Verification(e) => {
                body.error = e.kind().as_str();
                match e {
                    VerificationError::CooldownActive { seconds_remaining } => {
                        body.seconds_remaining = Some(*seconds_remaining);
                    }
                    VerificationError::InvalidCode { guesses_remaining } => {
                        body.guesses_remaining = Some(*guesses_remaining);
                    }
                    VerificationError::RateLimitExceeded { attempts, max } => {
                        body.attempts = Some(*attempts);
                        body.max_attempts = Some(*max);
                    }
                    _ => {}
                }
                status_for(e.kind())
            }
            RpcError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RpcError::Server(_) => {
                body.error = "ServerError";
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = body.error, detail = %body.detail, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = body.error, "request rejected");
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ekyc_types::VerificationStage;

    #[test]
    fn kinds_have_stable_statuses() {
        assert_eq!(status_for(ErrorKind::CooldownActive), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for(ErrorKind::ConflictStaleSnapshot), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::ExpiredChallenge), StatusCode::GONE);
        assert_eq!(status_for(ErrorKind::NetworkError), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn precondition_is_not_a_server_error() {
        let e = RpcError::from(VerificationError::PreconditionNotMet {
            required: VerificationStage::DocumentConfirmed,
            actual: VerificationStage::PhoneVerified,
        });
        assert_eq!(e.into_response().status(), StatusCode::PRECONDITION_FAILED);
    }

    #[test]
    fn malformed_input_is_bad_request() {
        let e = RpcError::from(TypeError::InvalidSubject("empty".into()));
        assert_eq!(e.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
