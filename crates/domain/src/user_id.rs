//! Validated user identifiers.
//!
//! A user id is used verbatim as a directory name under the store root, so
//! anything outside `[A-Za-z0-9-]` is rejected up front rather than
//! sanitized. Nothing downstream of [`UserId::parse`] re-checks the value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An opaque, path-safe user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Validate `raw` and wrap it. Empty input or any character outside
    /// ASCII alphanumerics and `-` yields [`Error::InvalidUserId`].
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() || !raw.chars().all(is_id_char) {
            return Err(Error::InvalidUserId);
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, used as a log prefix.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_alphanumeric_and_hyphen() {
        let id = UserId::parse("abc-123").unwrap();
        assert_eq!(id.as_str(), "abc-123");
        assert!(UserId::parse("A1b2-C3").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(UserId::parse(""), Err(Error::InvalidUserId)));
    }

    #[test]
    fn rejects_path_traversal_and_separators() {
        for bad in ["../etc", "a/b", "a\\b", "a.b", "a b", "a_b", "ü-1", "a\0b"] {
            assert!(UserId::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn short_prefix_handles_short_ids() {
        assert_eq!(UserId::parse("abc").unwrap().short(), "abc");
        assert_eq!(
            UserId::parse("0123456789abcdef").unwrap().short(),
            "01234567"
        );
    }

    #[test]
    fn deserialize_validates() {
        let ok: UserId = serde_json::from_str("\"user-1\"").unwrap();
        assert_eq!(ok.as_str(), "user-1");
        assert!(serde_json::from_str::<UserId>("\"../x\"").is_err());
    }
}
