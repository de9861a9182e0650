//! PropertyPath: dot-separated address of one leaf value within a nested
//! configuration/style/options tree.
//!
//! The empty path addresses the tree root; it is how "clear everything" is
//! expressed on the wire (root path, literal `"null"` value). Interior
//! empty segments are invalid.

use crate::error::BridgeError;
use crate::Result;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath {
    raw: String,
}

impl PropertyPath {
    /// The empty path addressing the whole tree.
    pub fn root() -> Self {
        Self { raw: String::new() }
    }

    pub fn parse(s: &str) -> Result<Self> {
        if !s.is_empty() && s.split('.').any(|segment| segment.is_empty()) {
            return Err(BridgeError::marshalling(format!(
                "invalid property path '{s}': empty segment"
            )));
        }
        Ok(Self { raw: s.to_string() })
    }

    /// Append one key. Keys may themselves contain dots (they address
    /// deeper levels, exactly as if the tree had been nested); only an
    /// empty key is invalid.
    pub fn join(&self, key: &str) -> Result<Self> {
        if key.is_empty() || key.split('.').any(|segment| segment.is_empty()) {
            return Err(BridgeError::marshalling(format!(
                "invalid property key '{key}' under '{}'",
                self.raw
            )));
        }
        let raw = if self.raw.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.raw)
        };
        Ok(Self { raw })
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.raw.is_empty()
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Segments in order; empty for the root path.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.raw.split('.').filter(|s| !s.is_empty())
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PropertyPath {
    type Err = BridgeError;
    fn from_str(s: &str) -> Result<Self> {
        PropertyPath::parse(s)
    }
}

impl Serialize for PropertyPath {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for PropertyPath {
    fn deserialize<D>(deserializer: D) -> std::result::Result<PropertyPath, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PropertyPath::parse(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_segments() {
        let p = PropertyPath::parse("channels.x.set").unwrap();
        assert_eq!(
            p.segments().collect::<Vec<_>>(),
            vec!["channels", "x", "set"]
        );
        assert_eq!(p.to_string(), "channels.x.set");
    }

    #[test]
    fn root_path_is_valid_and_empty() {
        let root = PropertyPath::parse("").unwrap();
        assert!(root.is_root());
        assert_eq!(root.segments().count(), 0);
        assert_eq!(root, PropertyPath::root());
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(PropertyPath::parse("a..b").is_err());
        assert!(PropertyPath::parse(".a").is_err());
        assert!(PropertyPath::parse("a.").is_err());
    }

    #[test]
    fn join_builds_on_root() {
        let p = PropertyPath::root().join("title").unwrap();
        assert_eq!(p.as_str(), "title");
        let q = p.join("color").unwrap();
        assert_eq!(q.as_str(), "title.color");
        assert!(q.join("").is_err());
        assert!(q.join("a..b").is_err());
    }

    #[test]
    fn dotted_keys_address_deeper_levels() {
        let p = PropertyPath::root().join("channels.x").unwrap();
        assert_eq!(p.segments().count(), 2);
    }
}
