//! JSON bodies exchanged with the verification API.

use ekyc_types::DocumentFields;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCodeRequest<'a> {
    pub destination: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCodeResponse {
    #[serde(default)]
    pub cooldown_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeRequest<'a> {
    pub destination: &'a str,
    pub code: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeResponse {
    pub verified: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest<'a> {
    pub capture_ref: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResponse {
    pub document_id: String,
    pub succeeded: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub document_id: String,
    pub fields: DocumentFields,
}

#[derive(Debug, Serialize)]
pub struct ConfirmRequest<'a> {
    pub fields: &'a DocumentFields,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFieldsRequest<'a> {
    pub changed_fields: &'a DocumentFields,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceMatchRequest<'a> {
    pub live_capture: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct FaceMatchResponse {
    pub matched: bool,
    pub score: f64,
}

/// Error body returned with any non-success status. Every field is optional;
/// the status code alone decides the error kind.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorBody {
    pub error: Option<String>,
    pub detail: Option<String>,
    pub seconds_remaining: Option<u64>,
    pub guesses_remaining: Option<u32>,
    pub attempts: Option<u32>,
    pub max_attempts: Option<u32>,
}
