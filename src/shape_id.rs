//! Shape identifiers
//!
//! A `ShapeId` is the fully-qualified name of a shape in a Weave model:
//! `namespace#name` for top-level shapes, `namespace#name$member` for
//! members. Shape ids are the universal graph-node key, so they are
//! immutable, cheap to clone, and totally ordered for deterministic
//! iteration and output.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error produced when a shape id fails to parse
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid shape id `{text}`: {reason}")]
pub struct ShapeIdError {
    pub text: String,
    pub reason: &'static str,
}

impl ShapeIdError {
    fn new(text: &str, reason: &'static str) -> Self {
        Self {
            text: text.to_string(),
            reason,
        }
    }
}

/// Fully-qualified identifier of a shape
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShapeId {
    namespace: String,
    name: String,
    member: Option<String>,
}

impl ShapeId {
    /// Build a shape id from parts without validation.
    ///
    /// Intended for known-good literals (prelude shapes, tests); user
    /// input goes through `FromStr`.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        member: Option<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            member,
        }
    }

    /// Parse an absolute shape id: `namespace#name` or `namespace#name$member`
    pub fn parse(text: &str) -> Result<Self, ShapeIdError> {
        let (namespace, rest) = text
            .split_once('#')
            .ok_or_else(|| ShapeIdError::new(text, "missing `#` between namespace and name"))?;

        if !is_valid_namespace(namespace) {
            return Err(ShapeIdError::new(text, "invalid namespace"));
        }

        let (name, member) = match rest.split_once('$') {
            Some((name, member)) => (name, Some(member)),
            None => (rest, None),
        };

        if !is_identifier(name) {
            return Err(ShapeIdError::new(text, "invalid shape name"));
        }

        if let Some(member) = member {
            if !is_identifier(member) {
                return Err(ShapeIdError::new(text, "invalid member name"));
            }
        }

        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            member: member.map(str::to_string),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn member(&self) -> Option<&str> {
        self.member.as_deref()
    }

    /// True if this id addresses a member of a container shape
    pub fn is_member_id(&self) -> bool {
        self.member.is_some()
    }

    /// Id of the given member within this shape
    pub fn with_member(&self, member: impl Into<String>) -> Self {
        Self {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            member: Some(member.into()),
        }
    }

    /// Id of the containing shape, dropping any member segment
    pub fn without_member(&self) -> Self {
        Self {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            member: None,
        }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_valid_namespace(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_identifier)
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.namespace, self.name)?;
        if let Some(member) = &self.member {
            write!(f, "${}", member)?;
        }
        Ok(())
    }
}

impl FromStr for ShapeId {
    type Err = ShapeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ShapeId {
    type Error = ShapeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShapeId> for String {
    fn from(id: ShapeId) -> Self {
        id.to_string()
    }
}

impl PartialOrd for ShapeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ShapeId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.namespace
            .cmp(&other.namespace)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.member.cmp(&other.member))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute_id() {
        let id = ShapeId::parse("example.weather#GetForecast").unwrap();
        assert_eq!(id.namespace(), "example.weather");
        assert_eq!(id.name(), "GetForecast");
        assert_eq!(id.member(), None);
    }

    #[test]
    fn test_parse_member_id() {
        let id = ShapeId::parse("ns#Foo$bar").unwrap();
        assert_eq!(id.member(), Some("bar"));
        assert!(id.is_member_id());
        assert_eq!(id.without_member().to_string(), "ns#Foo");
    }

    #[test]
    fn test_reject_malformed_ids() {
        assert!(ShapeId::parse("NoNamespace").is_err());
        assert!(ShapeId::parse("#MissingNamespace").is_err());
        assert!(ShapeId::parse("ns#").is_err());
        assert!(ShapeId::parse("ns#1Invalid").is_err());
        assert!(ShapeId::parse("bad..ns#Name").is_err());
        assert!(ShapeId::parse("ns#Foo$").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for text in ["ns#Foo", "a.b.c#Bar$baz"] {
            let id = ShapeId::parse(text).unwrap();
            assert_eq!(id.to_string(), text);
        }
    }

    #[test]
    fn test_ordering_is_total_and_stable() {
        let mut ids = vec![
            ShapeId::parse("zz#A").unwrap(),
            ShapeId::parse("aa#B$m").unwrap(),
            ShapeId::parse("aa#B").unwrap(),
            ShapeId::parse("aa#A").unwrap(),
        ];
        ids.sort();
        let rendered: Vec<String> = ids.iter().map(ShapeId::to_string).collect();
        assert_eq!(rendered, vec!["aa#A", "aa#B", "aa#B$m", "zz#A"]);
    }
}
