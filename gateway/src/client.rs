//! HTTP client for the code channel and the verification backend.

use crate::error::GatewayError;
use crate::wire::{
    CaptureRequest, CaptureResponse, ConfirmRequest, ErrorBody, FaceMatchRequest,
    FaceMatchResponse, SendCodeRequest, SendCodeResponse, SnapshotResponse, UpdateFieldsRequest,
    VerifyCodeRequest, VerifyCodeResponse,
};
use async_trait::async_trait;
use ekyc_types::{
    CaptureRef, DocumentFields, DocumentSnapshot, OtpCode, PhoneNumber, SubjectId,
    VerificationProfile,
};
use ekyc_verification::{
    ExtractionResult, FaceMatchResult, OtpGateway, SendReceipt, VerificationBackend,
    VerificationError,
};
use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for a whole request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the verification REST API. Cheap to clone; clones share the
/// connection pool.
#[derive(Clone, Debug)]
pub struct HttpGateway {
    /// HTTP client (reusable connection pool).
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpGateway {
    /// Create a gateway with default timeout settings.
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let base_url = Url::parse(base_url).map_err(|e| GatewayError::InvalidUrl(format!("{base_url}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(GatewayError::InvalidUrl(format!(
                "{base_url}: expected an http(s) base URL"
            )));
        }
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::RequestFailed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/v1/{segments...}` with every segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    fn subject_endpoint(&self, subject: &SubjectId, tail: &[&str]) -> Result<Url, GatewayError> {
        let mut segments = vec!["subjects", subject.as_str()];
        segments.extend_from_slice(tail);
        self.endpoint(&segments)
    }

    /// Send a request and fail on any non-success status.
    async fn execute(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Unreachable(format!("request timed out: {e}"))
            } else if e.is_connect() {
                GatewayError::Unreachable(format!("connection failed: {e}"))
            } else {
                GatewayError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().path().to_owned();
        let body: ErrorBody = response.json().await.unwrap_or_default();
        let detail = body
            .detail
            .or(body.error)
            .unwrap_or_else(|| status.to_string());
        warn!(status = status.as_u16(), %url, %detail, "verification API rejected request");
        Err(GatewayError::Rejected {
            status: status.as_u16(),
            detail,
            seconds_remaining: body.seconds_remaining,
            guesses_remaining: body.guesses_remaining,
            attempts: body.attempts,
            max_attempts: body.max_attempts,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = self.execute(request).await?;
        response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("failed to parse response: {e}")))
    }
}

#[async_trait]
impl OtpGateway for HttpGateway {
    async fn send_code(&self, destination: &PhoneNumber) -> Result<SendReceipt, VerificationError> {
        let url = self.endpoint(&["otp", "send"])?;
        debug!(destination = %destination.masked(), "POST send-code");
        let resp: SendCodeResponse = self
            .fetch(self.http_client.post(url).json(&SendCodeRequest {
                destination: destination.as_str(),
            }))
            .await?;
        Ok(SendReceipt {
            cooldown_secs: resp.cooldown_seconds,
        })
    }

    async fn verify_code(&self, destination: &PhoneNumber, code: &OtpCode) -> Result<bool, VerificationError> {
        let url = self.endpoint(&["otp", "verify"])?;
        debug!(destination = %destination.masked(), "POST verify-code");
        let resp: VerifyCodeResponse = self
            .fetch(self.http_client.post(url).json(&VerifyCodeRequest {
                destination: destination.as_str(),
                code: code.expose(),
            }))
            .await?;
        Ok(resp.verified)
    }
}

#[async_trait]
impl VerificationBackend for HttpGateway {
    async fn fetch_status(&self, subject: &SubjectId) -> Result<VerificationProfile, VerificationError> {
        let url = self.subject_endpoint(subject, &["verification-status"])?;
        let profile: VerificationProfile = self.fetch(self.http_client.get(url)).await?;
        if &profile.subject_id != subject {
            return Err(GatewayError::InvalidResponse(format!(
                "status for {} returned for subject {subject}",
                profile.subject_id
            ))
            .into());
        }
        Ok(profile)
    }

    async fn capture_document(
        &self,
        subject: &SubjectId,
        capture: &CaptureRef,
    ) -> Result<ExtractionResult, VerificationError> {
        let url = self.subject_endpoint(subject, &["document-capture"])?;
        let resp: CaptureResponse = self
            .fetch(self.http_client.post(url).json(&CaptureRequest {
                capture_ref: capture.as_str(),
            }))
            .await?;
        Ok(ExtractionResult {
            document_id: resp.document_id,
            succeeded: resp.succeeded,
            reason: resp.reason,
        })
    }

    async fn fetch_document_snapshot(&self, subject: &SubjectId) -> Result<DocumentSnapshot, VerificationError> {
        let url = self.subject_endpoint(subject, &["document-snapshot"])?;
        let resp: SnapshotResponse = self.fetch(self.http_client.get(url)).await?;
        Ok(DocumentSnapshot {
            document_id: resp.document_id,
            fields: resp.fields,
        })
    }

    async fn confirm_document(&self, subject: &SubjectId, fields: &DocumentFields) -> Result<(), VerificationError> {
        let url = self.subject_endpoint(subject, &["confirm-document"])?;
        self.execute(self.http_client.post(url).json(&ConfirmRequest { fields }))
            .await?;
        Ok(())
    }

    async fn update_document_fields(
        &self,
        subject: &SubjectId,
        changed: &DocumentFields,
    ) -> Result<(), VerificationError> {
        let url = self.subject_endpoint(subject, &["document-fields"])?;
        self.execute(self.http_client.patch(url).json(&UpdateFieldsRequest {
            changed_fields: changed,
        }))
        .await?;
        Ok(())
    }

    async fn face_match(
        &self,
        subject: &SubjectId,
        live_capture: &CaptureRef,
    ) -> Result<FaceMatchResult, VerificationError> {
        let url = self.subject_endpoint(subject, &["face-match"])?;
        let resp: FaceMatchResponse = self
            .fetch(self.http_client.post(url).json(&FaceMatchRequest {
                live_capture: live_capture.as_str(),
            }))
            .await?;
        Ok(FaceMatchResult {
            matched: resp.matched,
            score: resp.score,
        })
    }
}
