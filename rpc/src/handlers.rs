//! Request handlers and their JSON bodies.

use crate::error::RpcError;
use crate::extract::{ApiJson, ApiQuery};
use crate::server::AppState;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use ekyc_types::{
    CaptureRef, DocumentFields, FieldName, OtpCode, PhoneNumber, SubjectId, VerificationProfile,
    VerificationStage,
};
use ekyc_verification::{
    ChallengeStatus, ChallengeTicket, DocumentSubmission, EditEffect, FaceMatchReport, SubmitMode,
};
use ekyc_utils::format_countdown;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type ApiState = State<Arc<AppState>>;

fn subject(raw: String) -> Result<SubjectId, RpcError> {
    Ok(SubjectId::parse(raw)?)
}

// ── Challenge ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SendCodeRequest {
    pub destination: String,
}

pub async fn send_code(
    State(state): ApiState,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<SendCodeRequest>,
) -> Result<Json<ChallengeTicket>, RpcError> {
    let subject = subject(id)?;
    let destination = PhoneNumber::parse(&req.destination)?;
    match state.service.request_code(&subject, &destination).await {
        Ok(ticket) => {
            state.metrics.codes_sent.inc();
            Ok(Json(ticket))
        }
        Err(e) => {
            state.metrics.send_rejections.inc();
            Err(e.into())
        }
    }
}

#[derive(Deserialize)]
pub struct VerifyCodeRequest {
    pub code: String,
}

#[derive(Serialize)]
pub struct StageResponse {
    pub stage: VerificationStage,
}

pub async fn verify_code(
    State(state): ApiState,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<VerifyCodeRequest>,
) -> Result<Json<StageResponse>, RpcError> {
    let subject = subject(id)?;
    let code = OtpCode::parse(&req.code)?;
    state.metrics.verify_attempts.inc();
    let stage = state.service.verify_code(&subject, &code).await?;
    state.metrics.verifications_succeeded.inc();
    Ok(Json(StageResponse { stage }))
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub reset: bool,
}

pub async fn reset_challenge(
    State(state): ApiState,
    Path(id): Path<String>,
) -> Result<Json<ResetResponse>, RpcError> {
    let subject = subject(id)?;
    let reset = state.service.reset_challenge(&subject).await;
    Ok(Json(ResetResponse { reset }))
}

// ── Status ───────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct StatusQuery {
    /// Skip the backend round-trip and answer from local state.
    #[serde(default)]
    pub local: bool,
}

#[derive(Serialize)]
pub struct ChallengeSummary {
    pub status: ChallengeStatus,
    pub attempts_remaining: u32,
    pub cooldown_remaining: u64,
    /// `cooldown_remaining` as the resend button shows it (`mm:ss`).
    pub resend_in: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub stage: VerificationStage,
    pub profile: VerificationProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<ChallengeSummary>,
}

pub async fn status(
    State(state): ApiState,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<StatusQuery>,
) -> Result<Json<StatusResponse>, RpcError> {
    let subject = subject(id)?;
    let profile = if query.local {
        state.service.status(&subject)
    } else {
        state.service.refresh_status(&subject).await?
    };
    let challenge = state.service.challenge(&subject).map(|c| {
        let cooldown_remaining = state.service.cooldown_remaining(&subject);
        ChallengeSummary {
            status: c.status,
            attempts_remaining: c.attempts_remaining(),
            cooldown_remaining,
            resend_in: format_countdown(cooldown_remaining),
        }
    });
    Ok(Json(StatusResponse {
        stage: profile.stage(),
        profile,
        challenge,
    }))
}

// ── Document ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CaptureRequest {
    pub capture_ref: String,
}

pub async fn capture_document(
    State(state): ApiState,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<CaptureRequest>,
) -> Result<Json<StageResponse>, RpcError> {
    let subject = subject(id)?;
    let capture = CaptureRef::parse(req.capture_ref)?;
    let stage = state.service.capture_document(&subject, &capture).await?;
    Ok(Json(StageResponse { stage }))
}

#[derive(Serialize)]
pub struct DocumentView {
    pub document_id: String,
    /// What the subject should see: extracted, then confirmed, then pending values.
    pub fields: DocumentFields,
    pub pending: DocumentFields,
    pub confirmed: bool,
    pub fingerprint: String,
}

/// Load (or rebase onto) the latest snapshot and return the editing view.
pub async fn document(
    State(state): ApiState,
    Path(id): Path<String>,
) -> Result<Json<DocumentView>, RpcError> {
    let subject = subject(id)?;
    state.service.load_document(&subject).await?;
    let record = state
        .service
        .document(&subject)
        .ok_or_else(|| RpcError::Server(format!("document for {subject} vanished after load")))?;
    Ok(Json(DocumentView {
        document_id: record.document_id.clone(),
        fields: record.merged_view(),
        pending: record.pending.clone(),
        confirmed: record.confirmed_once,
        fingerprint: record.fingerprint.to_string(),
    }))
}

#[derive(Deserialize)]
pub struct EditRequest {
    pub field: String,
    pub value: String,
}

#[derive(Serialize)]
pub struct EditResponse {
    pub effect: EditEffect,
    pub pending: DocumentFields,
}

pub async fn edit_field(
    State(state): ApiState,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<EditRequest>,
) -> Result<Json<EditResponse>, RpcError> {
    let subject = subject(id)?;
    let field = FieldName::parse(req.field)?;
    let effect = state.service.edit_field(&subject, field, &req.value)?;
    let pending = state
        .service
        .document(&subject)
        .map(|r| r.pending)
        .unwrap_or_default();
    Ok(Json(EditResponse { effect, pending }))
}

#[derive(Serialize)]
pub struct DiscardResponse {
    pub discarded: usize,
}

pub async fn discard_edits(
    State(state): ApiState,
    Path(id): Path<String>,
) -> Result<Json<DiscardResponse>, RpcError> {
    let subject = subject(id)?;
    let discarded = state.service.discard_edits(&subject);
    Ok(Json(DiscardResponse { discarded }))
}

#[derive(Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubmitKind {
    #[default]
    Edits,
    ConfirmAsIs,
}

#[derive(Deserialize, Default)]
pub struct SubmitRequest {
    #[serde(default)]
    pub mode: SubmitKind,
}

pub async fn submit_document(
    State(state): ApiState,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<SubmitRequest>,
) -> Result<Json<DocumentSubmission>, RpcError> {
    let subject = subject(id)?;
    let mode = match req.mode {
        SubmitKind::Edits => SubmitMode::Edits,
        SubmitKind::ConfirmAsIs => SubmitMode::ConfirmAsIs,
    };
    state.metrics.document_submits.inc();
    Ok(Json(state.service.submit_document(&subject, mode).await?))
}

// ── Face match ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct FaceMatchRequest {
    pub live_capture: String,
}

pub async fn face_match(
    State(state): ApiState,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<FaceMatchRequest>,
) -> Result<Json<FaceMatchReport>, RpcError> {
    let subject = subject(id)?;
    let capture = CaptureRef::parse(req.live_capture)?;
    let report = state.service.request_face_match(&subject, &capture).await?;
    if report.score.is_some() {
        state.metrics.face_matches_succeeded.inc();
    }
    Ok(Json(report))
}

// ── Operations ───────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub fully_verified: usize,
}

pub async fn health(State(state): ApiState) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        fully_verified: state.service.fully_verified_count(),
    })
}

pub async fn metrics(State(state): ApiState) -> Result<impl IntoResponse, RpcError> {
    let body = state
        .metrics
        .render(&state.service)
        .map_err(|e| RpcError::Server(format!("failed to encode metrics: {e}")))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
