//! One-time codes and opaque capture handles.

use crate::error::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A one-time code typed by the subject. 4 to 8 ASCII digits.
///
/// The buffer is wiped on drop and never printed.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct OtpCode(String);

impl OtpCode {
    pub const MIN_LEN: usize = 4;
    pub const MAX_LEN: usize = 8;

    pub fn parse(raw: impl AsRef<str>) -> Result<Self, TypeError> {
        let s = raw.as_ref().trim();
        if !(Self::MIN_LEN..=Self::MAX_LEN).contains(&s.len()) {
            return Err(TypeError::InvalidCode(format!(
                "expected {}-{} digits",
                Self::MIN_LEN,
                Self::MAX_LEN
            )));
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TypeError::InvalidCode("code must be numeric".into()));
        }
        Ok(Self(s.to_string()))
    }

    /// Expose the digits for transmission to the verifying collaborator.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OtpCode(***)")
    }
}

/// Handle to a capture (document photo, live selfie) already uploaded by the
/// capture SDK. The orchestrator never sees image bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CaptureRef(String);

impl CaptureRef {
    pub fn parse(raw: impl Into<String>) -> Result<Self, TypeError> {
        let s = raw.into();
        if s.trim().is_empty() {
            return Err(TypeError::InvalidCapture("empty".into()));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CaptureRef {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<CaptureRef> for String {
    fn from(c: CaptureRef) -> Self {
        c.0
    }
}
