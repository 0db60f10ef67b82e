use ekyc_verification::VerificationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),

    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("rejected with HTTP {status}: {detail}")]
    Rejected {
        status: u16,
        detail: String,
        seconds_remaining: Option<u64>,
        guesses_remaining: Option<u32>,
        attempts: Option<u32>,
        max_attempts: Option<u32>,
    },
}

impl From<GatewayError> for VerificationError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Unreachable(msg) | GatewayError::RequestFailed(msg) => {
                VerificationError::Network(msg)
            }
            GatewayError::InvalidUrl(msg) | GatewayError::InvalidResponse(msg) => {
                VerificationError::Backend(msg)
            }
            GatewayError::Rejected {
                status,
                detail,
                seconds_remaining,
                guesses_remaining,
                attempts,
                max_attempts,
            } => match status {
                429 => match seconds_remaining {
                    Some(s) if s > 0 => VerificationError::CooldownActive { seconds_remaining: s },
                    _ => VerificationError::RateLimitExceeded {
                        attempts: attempts.unwrap_or(0),
                        max: max_attempts.unwrap_or(0),
                    },
                },
                409 => VerificationError::ConflictStaleSnapshot,
                410 => VerificationError::ExpiredChallenge,
                422 => match guesses_remaining {
                    Some(g) => VerificationError::InvalidCode { guesses_remaining: g },
                    None => VerificationError::Validation(detail),
                },
                500..=599 => VerificationError::Network(format!("HTTP {status}: {detail}")),
                _ => VerificationError::Backend(format!("HTTP {status}: {detail}")),
            },
        }
    }
}
