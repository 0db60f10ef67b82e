//! Phone number destination for one-time codes.

use crate::error::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A phone number in E.164 form: `+` followed by 8 to 15 digits.
///
/// Common separators (spaces, dashes, dots, parentheses) are stripped on parse,
/// so `"+84 912-345-678"` and `"+84912345678"` compare equal.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    const MIN_DIGITS: usize = 8;
    const MAX_DIGITS: usize = 15;

    pub fn parse(raw: impl AsRef<str>) -> Result<Self, TypeError> {
        let raw = raw.as_ref().trim();
        let Some(rest) = raw.strip_prefix('+') else {
            return Err(TypeError::InvalidPhone("missing leading '+'".into()));
        };

        let mut digits = String::with_capacity(rest.len());
        for c in rest.chars() {
            match c {
                '0'..='9' => digits.push(c),
                ' ' | '-' | '.' | '(' | ')' => {}
                other => {
                    return Err(TypeError::InvalidPhone(format!(
                        "unexpected character {other:?}"
                    )))
                }
            }
        }

        if !(Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&digits.len()) {
            return Err(TypeError::InvalidPhone(format!(
                "expected {}-{} digits, got {}",
                Self::MIN_DIGITS,
                Self::MAX_DIGITS,
                digits.len()
            )));
        }
        if digits.starts_with('0') {
            return Err(TypeError::InvalidPhone("country code cannot start with 0".into()));
        }

        Ok(Self(format!("+{digits}")))
    }

    /// The normalized E.164 string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rendering safe for logs and audit entries: only the last three digits survive.
    pub fn masked(&self) -> String {
        let visible = 3;
        let digits = self.0.len() - 1;
        format!("+{}{}", "*".repeat(digits - visible), &self.0[self.0.len() - visible..])
    }
}

// Debug is masked so a stray `{:?}` never leaks a full number into logs.
impl fmt::Debug for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PhoneNumber").field(&self.masked()).finish()
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<PhoneNumber> for String {
    fn from(p: PhoneNumber) -> Self {
        p.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_separators() {
        let a = PhoneNumber::parse("+84 912-345-678").unwrap();
        let b = PhoneNumber::parse("+84912345678").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "+84912345678");
    }

    #[test]
    fn rejects_malformed() {
        assert!(PhoneNumber::parse("0912345678").is_err());
        assert!(PhoneNumber::parse("+12").is_err());
        assert!(PhoneNumber::parse("+1234567890123456").is_err());
        assert!(PhoneNumber::parse("+84abc45678").is_err());
        assert!(PhoneNumber::parse("+0912345678").is_err());
    }

    #[test]
    fn masked_keeps_last_three_digits() {
        let p = PhoneNumber::parse("+84912345678").unwrap();
        assert_eq!(p.masked(), "+********678");
        assert!(!format!("{p:?}").contains("912345"));
    }
}
