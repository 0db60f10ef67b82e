//! Document fields as extracted by OCR and confirmed by the subject.

use crate::error::TypeError;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

type Blake2b256 = Blake2b<U32>;

/// Name of a document field, e.g. `full_name` or `date_of_birth`.
///
/// Lowercase ASCII letters, digits and underscores; 1 to 64 characters.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldName(String);

impl FieldName {
    pub const MAX_LEN: usize = 64;

    pub fn parse(raw: impl Into<String>) -> Result<Self, TypeError> {
        let s = raw.into();
        if s.is_empty() || s.len() > Self::MAX_LEN {
            return Err(TypeError::InvalidField(format!(
                "{s:?} must be 1-{} characters",
                Self::MAX_LEN
            )));
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        {
            return Err(TypeError::InvalidField(format!(
                "{s:?} must be lowercase snake_case"
            )));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the field carries a calendar date (`YYYY-MM-DD`).
    pub fn is_date(&self) -> bool {
        self.0 == "dob" || self.0.ends_with("_date") || self.0.starts_with("date_")
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for FieldName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<FieldName> for String {
    fn from(f: FieldName) -> Self {
        f.0
    }
}

/// Ordered field map. Ordering keeps fingerprints and wire payloads stable.
pub type DocumentFields = BTreeMap<FieldName, String>;

/// Blake2b-256 digest of a snapshot's content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotFingerprint([u8; 32]);

impl SnapshotFingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SnapshotFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotFingerprint({})", &hex::encode(self.0)[..16])
    }
}

impl fmt::Display for SnapshotFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Machine-extracted fields of one captured identity document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    /// Identifier of the captured document in the system of record.
    pub document_id: String,
    /// OCR output keyed by field name.
    pub fields: DocumentFields,
}

impl DocumentSnapshot {
    /// Content digest used to detect that the extraction changed server-side
    /// between load and submit.
    pub fn fingerprint(&self) -> SnapshotFingerprint {
        let mut hasher = Blake2b256::new();
        hasher.update(self.document_id.as_bytes());
        for (name, value) in &self.fields {
            // Length prefixes keep ("ab","c") and ("a","bc") apart.
            hasher.update((name.as_str().len() as u64).to_le_bytes());
            hasher.update(name.as_str().as_bytes());
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        }
        let result = hasher.finalize();
        let mut output = [0u8; 32];
        output.copy_from_slice(&result);
        SnapshotFingerprint(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> FieldName {
        FieldName::parse(name).unwrap()
    }

    fn snapshot(pairs: &[(&str, &str)]) -> DocumentSnapshot {
        DocumentSnapshot {
            document_id: "doc-1".into(),
            fields: pairs
                .iter()
                .map(|(k, v)| (field(k), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn field_names_are_snake_case() {
        assert!(FieldName::parse("full_name").is_ok());
        assert!(FieldName::parse("FullName").is_err());
        assert!(FieldName::parse("").is_err());
        assert!(FieldName::parse("with space").is_err());
    }

    #[test]
    fn date_fields_are_recognized() {
        assert!(field("dob").is_date());
        assert!(field("expiry_date").is_date());
        assert!(field("date_of_birth").is_date());
        assert!(!field("full_name").is_date());
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let a = snapshot(&[("name", "A"), ("dob", "1990-01-01")]);
        let b = snapshot(&[("dob", "1990-01-01"), ("name", "A")]);
        let c = snapshot(&[("name", "B"), ("dob", "1990-01-01")]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn fingerprint_separates_field_boundaries() {
        let a = snapshot(&[("ab", "c")]);
        let b = snapshot(&[("a", "bc")]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fields_serialize_as_plain_json_object() {
        let snap = snapshot(&[("name", "A")]);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["fields"]["name"], "A");
        let back: DocumentSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snap);
    }
}
