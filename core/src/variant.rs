//! Values carried in bus calls.
//!
//! Session data bundles travel as `a{sv}` dictionaries; [`Variant`] covers the
//! basic types sign-on clients put into them. Serialization is untagged so a
//! bundle reads naturally in JSON or TOML (`{ OneKey = "OneValue" }`). Typed
//! integers other than `int64`/`uint64` and object paths serialize as plain
//! values and come back as the nearest untagged form.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::path::ObjectPath;

/// String-keyed dictionary of variants (`a{sv}`).
pub type VariantMap = BTreeMap<String, Variant>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Variant {
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(String),
    StringList(Vec<String>),
    Map(VariantMap),
    Byte(u8),
    Int32(i32),
    UInt32(u32),
    ObjectPath(ObjectPath),
}

impl Variant {
    /// Bus type signature of the contained value.
    pub fn signature(&self) -> &'static str {
        match self {
            Variant::Bool(_) => "b",
            Variant::Byte(_) => "y",
            Variant::Int32(_) => "i",
            Variant::UInt32(_) => "u",
            Variant::Int64(_) => "x",
            Variant::UInt64(_) => "t",
            Variant::Double(_) => "d",
            Variant::String(_) => "s",
            Variant::ObjectPath(_) => "o",
            Variant::StringList(_) => "as",
            Variant::Map(_) => "a{sv}",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            _ => None,
        }
    }

    /// Unsigned 32-bit value. Any other integer is accepted when it fits, since
    /// untagged sources (JSON, TOML) cannot express the narrower type.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Variant::UInt32(v) => Some(*v),
            Variant::Byte(v) => Some(u32::from(*v)),
            Variant::Int32(v) => u32::try_from(*v).ok(),
            Variant::Int64(v) => u32::try_from(*v).ok(),
            Variant::UInt64(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_object_path(&self) -> Option<&ObjectPath> {
        match self {
            Variant::ObjectPath(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&VariantMap> {
        match self {
            Variant::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<VariantMap> {
        match self {
            Variant::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Bool(v) => write!(f, "{v}"),
            Variant::Byte(v) => write!(f, "{v}"),
            Variant::Int32(v) => write!(f, "{v}"),
            Variant::UInt32(v) => write!(f, "{v}"),
            Variant::Int64(v) => write!(f, "{v}"),
            Variant::UInt64(v) => write!(f, "{v}"),
            Variant::Double(v) => write!(f, "{v}"),
            Variant::String(v) => write!(f, "{v:?}"),
            Variant::ObjectPath(v) => write!(f, "{v}"),
            Variant::StringList(items) => write!(f, "{items:?}"),
            Variant::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<u8> for Variant {
    fn from(v: u8) -> Self {
        Variant::Byte(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int32(v)
    }
}

impl From<u32> for Variant {
    fn from(v: u32) -> Self {
        Variant::UInt32(v)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int64(v)
    }
}

impl From<u64> for Variant {
    fn from(v: u64) -> Self {
        Variant::UInt64(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Double(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::String(v)
    }
}

impl From<ObjectPath> for Variant {
    fn from(v: ObjectPath) -> Self {
        Variant::ObjectPath(v)
    }
}

impl From<Vec<String>> for Variant {
    fn from(v: Vec<String>) -> Self {
        Variant::StringList(v)
    }
}

impl From<VariantMap> for Variant {
    fn from(v: VariantMap) -> Self {
        Variant::Map(v)
    }
}

/// Build a [`VariantMap`] from key/value pairs.
///
/// ```
/// use signon_mock_core::variant_map;
/// let data = variant_map([("OneKey", "OneValue")]);
/// assert_eq!(data["OneKey"].as_str(), Some("OneValue"));
/// ```
pub fn variant_map<K, V, I>(entries: I) -> VariantMap
where
    K: Into<String>,
    V: Into<Variant>,
    I: IntoIterator<Item = (K, V)>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures() {
        assert_eq!(Variant::from(3u32).signature(), "u");
        assert_eq!(Variant::from("x").signature(), "s");
        assert_eq!(Variant::from(VariantMap::new()).signature(), "a{sv}");
        assert_eq!(
            Variant::from(ObjectPath::new("/identity/1").unwrap()).signature(),
            "o"
        );
    }

    #[test]
    fn u32_accepts_fitting_wide_integers() {
        assert_eq!(Variant::Int64(45000).as_u32(), Some(45000));
        assert_eq!(Variant::Int64(-1).as_u32(), None);
        assert_eq!(Variant::UInt64(u64::MAX).as_u32(), None);
        assert_eq!(Variant::Int32(7).as_u32(), Some(7));
        assert_eq!(Variant::Int32(-7).as_u32(), None);
        assert_eq!(Variant::from("45000").as_u32(), None);
    }

    #[test]
    fn bundle_reads_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            data: VariantMap,
        }
        let doc: Doc = toml::from_str(
            r#"
            data = { OneKey = "OneValue", Count = 3, Scopes = ["a", "b"], Nested = { Flag = true } }
            "#,
        )
        .unwrap();
        assert_eq!(doc.data["OneKey"], Variant::from("OneValue"));
        assert_eq!(doc.data["Count"], Variant::Int64(3));
        assert_eq!(
            doc.data["Scopes"],
            Variant::StringList(vec!["a".into(), "b".into()])
        );
        assert_eq!(
            doc.data["Nested"].as_map().and_then(|m| m.get("Flag")),
            Some(&Variant::Bool(true))
        );
    }

    #[test]
    fn display_is_compact() {
        let map = variant_map([("A", Variant::from("x")), ("B", Variant::from(2u32))]);
        assert_eq!(Variant::Map(map).to_string(), r#"{"A": "x", "B": 2}"#);
    }
}
