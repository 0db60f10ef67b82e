//! Subject identifier: the person (account) going through verification.

use crate::error::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a verification subject, as issued by the system of record.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Longest identifier the system of record hands out.
    pub const MAX_LEN: usize = 128;

    /// Parse a subject id. Must be non-empty, at most [`Self::MAX_LEN`] bytes,
    /// and free of whitespace and control characters.
    pub fn parse(raw: impl Into<String>) -> Result<Self, TypeError> {
        let s = raw.into();
        if s.is_empty() {
            return Err(TypeError::InvalidSubject("empty".into()));
        }
        if s.len() > Self::MAX_LEN {
            return Err(TypeError::InvalidSubject(format!(
                "{} bytes exceeds limit of {}",
                s.len(),
                Self::MAX_LEN
            )));
        }
        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(TypeError::InvalidSubject(format!("{s:?} contains whitespace")));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SubjectId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<SubjectId> for String {
    fn from(id: SubjectId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        let id = SubjectId::parse("farmer-00042").unwrap();
        assert_eq!(id.as_str(), "farmer-00042");
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        assert!(SubjectId::parse("").is_err());
        assert!(SubjectId::parse("a b").is_err());
        assert!(SubjectId::parse("tab\there").is_err());
    }

    #[test]
    fn rejects_oversized() {
        assert!(SubjectId::parse("x".repeat(SubjectId::MAX_LEN + 1)).is_err());
        assert!(SubjectId::parse("x".repeat(SubjectId::MAX_LEN)).is_ok());
    }

    #[test]
    fn deserialization_validates() {
        let ok: Result<SubjectId, _> = serde_json::from_str("\"s-1\"");
        assert!(ok.is_ok());
        let bad: Result<SubjectId, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }
}
