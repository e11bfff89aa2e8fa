//! Symbolic labels used to select scenarios and query the step registry

use crate::error::TagError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated tag such as `pre_migrations`
///
/// Tags are non-empty and consist of lowercase ASCII letters, digits and `_`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tag(String);

impl Tag {
    /// Parse and validate a tag
    pub fn new(tag: impl Into<String>) -> Result<Self, TagError> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(TagError::Empty);
        }
        if let Some(ch) = tag
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_'))
        {
            return Err(TagError::InvalidChar { tag, ch });
        }
        Ok(Self(tag))
    }

    /// Borrow the tag text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Tag {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Tag {
    type Error = TagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_snake_case() {
        let tag = Tag::new("pre_upgrade_checks").unwrap();
        assert_eq!(tag.as_str(), "pre_upgrade_checks");
        assert_eq!(tag.to_string(), "pre_upgrade_checks");
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(Tag::new(""), Err(TagError::Empty));
    }

    #[test]
    fn rejects_uppercase_and_dashes() {
        assert_eq!(
            Tag::new("Pre-upgrade"),
            Err(TagError::InvalidChar {
                tag: "Pre-upgrade".into(),
                ch: 'P'
            })
        );
        assert!("pre-upgrade".parse::<Tag>().is_err());
    }

    #[test]
    fn serde_validates() {
        let ok: Tag = serde_json::from_str("\"migrations\"").unwrap();
        assert_eq!(ok.as_str(), "migrations");
        assert!(serde_json::from_str::<Tag>("\"Bad Tag\"").is_err());
    }
}
