//! Bus object paths.
//!
//! Paths are validated on construction so that every path the broker hands
//! out, or accepts from a caller, is one a real bus connection would accept.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{BrokerError, BrokerResult};

/// A validated bus object path such as `/session/3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Validate and wrap a path string.
    pub fn new(path: impl Into<String>) -> BrokerResult<Self> {
        let path = path.into();
        validate(&path)?;
        Ok(Self(path))
    }

    /// Wrap a compile-time constant known to be well formed.
    pub(crate) fn from_static(path: &'static str) -> Self {
        debug_assert!(validate(path).is_ok(), "malformed constant path {path}");
        Self(path.to_string())
    }

    /// The root path `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Append a single element, e.g. `/session` + `7` -> `/session/7`.
    pub fn child(&self, element: impl fmt::Display) -> BrokerResult<Self> {
        let joined = if self.0 == "/" {
            format!("/{}", element)
        } else {
            format!("{}/{}", self.0, element)
        };
        Self::new(joined)
    }

    /// Whether `self` lies strictly below `prefix`.
    pub fn is_child_of(&self, prefix: &ObjectPath) -> bool {
        if prefix.0 == "/" {
            return self.0 != "/";
        }
        self.0
            .strip_prefix(prefix.0.as_str())
            .is_some_and(|rest| rest.len() > 1 && rest.starts_with('/'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(path: &str) -> BrokerResult<()> {
    if path == "/" {
        return Ok(());
    }
    let Some(rest) = path.strip_prefix('/') else {
        return Err(BrokerError::InvalidObjectPath(format!(
            "{path:?} must start with '/'"
        )));
    };
    for element in rest.split('/') {
        if element.is_empty() {
            return Err(BrokerError::InvalidObjectPath(format!(
                "{path:?} contains an empty element"
            )));
        }
        if !element
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(BrokerError::InvalidObjectPath(format!(
                "{path:?} contains characters outside [A-Za-z0-9_]"
            )));
        }
    }
    Ok(())
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectPath {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ObjectPath {
    type Error = BrokerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectPath> for String {
    fn from(path: ObjectPath) -> Self {
        path.0
    }
}

impl AsRef<str> for ObjectPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_paths() {
        for p in ["/", "/session/1", "/com/google/code/AccountsSSO/SingleSignOn", "/a_b/C9"] {
            assert!(ObjectPath::new(p).is_ok(), "{p} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_paths() {
        for p in ["", "session/1", "/session/", "//x", "/session/1-2", "/a b"] {
            assert!(ObjectPath::new(p).is_err(), "{p} should be rejected");
        }
    }

    #[test]
    fn child_joins_elements() {
        let base = ObjectPath::new("/session").unwrap();
        assert_eq!(base.child(7).unwrap().as_str(), "/session/7");
        assert_eq!(ObjectPath::root().child("identity").unwrap().as_str(), "/identity");
    }

    #[test]
    fn child_relationship() {
        let prefix = ObjectPath::new("/session").unwrap();
        assert!(ObjectPath::new("/session/4").unwrap().is_child_of(&prefix));
        assert!(!ObjectPath::new("/session").unwrap().is_child_of(&prefix));
        assert!(!ObjectPath::new("/sessions/4").unwrap().is_child_of(&prefix));
    }

    #[test]
    fn deserialization_validates() {
        let ok: ObjectPath = serde_json::from_str("\"/identity/45000\"").unwrap();
        assert_eq!(ok.as_str(), "/identity/45000");
        assert!(serde_json::from_str::<ObjectPath>("\"identity\"").is_err());
    }
}
