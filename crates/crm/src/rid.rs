//! Resource identifiers
//!
//! A RID is `<group>#<index>` or `<group>.<name>` and is unique within an
//! object, e.g. `ip#1`, `app#web`, `fs.data`.

use crate::error::{Error, Result};
use std::fmt;

/// A parsed resource identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rid {
    group: String,
    name: String,
    sep: char,
}

impl Rid {
    /// Parse a RID string
    pub fn parse(s: &str) -> Result<Self> {
        let (pos, sep) = s
            .char_indices()
            .find(|(_, c)| *c == '#' || *c == '.')
            .ok_or_else(|| Error::InvalidRid(s.to_string()))?;
        let group = &s[..pos];
        let name = &s[pos + 1..];
        if !is_group_name(group) || name.is_empty() || !name.chars().all(is_rid_char) {
            return Err(Error::InvalidRid(s.to_string()));
        }
        Ok(Self {
            group: group.to_string(),
            name: name.to_string(),
            sep,
        })
    }

    /// Whether a string looks like a RID (used to tell resource sections apart)
    pub fn is_rid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// Driver group (`ip`, `disk`, `app`, ...)
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Index or name part after the separator
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.group, self.sep, self.name)
    }
}

/// Driver group of a RID string, without validating the rest
pub fn group_of(rid: &str) -> &str {
    rid.split(['#', '.']).next().unwrap_or(rid)
}

pub(crate) fn is_group_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

fn is_rid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_indexed_and_named() {
        let rid = Rid::parse("ip#1").unwrap();
        assert_eq!(rid.group(), "ip");
        assert_eq!(rid.name(), "1");
        assert_eq!(rid.to_string(), "ip#1");

        let rid = Rid::parse("fs.data").unwrap();
        assert_eq!(rid.group(), "fs");
        assert_eq!(rid.to_string(), "fs.data");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Rid::parse("DEFAULT").is_err());
        assert!(Rid::parse("#1").is_err());
        assert!(Rid::parse("ip#").is_err());
        assert!(Rid::parse("ip#a b").is_err());
    }

    #[test]
    fn test_group_of() {
        assert_eq!(group_of("disk#2"), "disk");
        assert_eq!(group_of("app"), "app");
    }
}
