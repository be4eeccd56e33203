//! Query key codec.
//!
//! A [`QueryKey`] is an ordered sequence of primitive parts. The cache indexes
//! entries by the key's [`EncodedKey`], a JSON array rendering that is
//! deterministic, order-sensitive and injective: two keys share an encoding
//! only if their parts are identical.
//!
//! # Format
//!
//! - strings: JSON strings (`"abc"`), escaped the way `serde_json` escapes
//! - integers: JSON integers (`42`, `-7`)
//! - finite floats: always carry a fraction or exponent (`1.0`, `2.5`, `1e21`)
//! - booleans: `true` / `false`
//! - non-finite floats: `{"f64":"NaN"}`, `{"f64":"inf"}`, `{"f64":"-inf"}`
//!
//! The empty key encodes to `[]`.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;

/// Canonical encoding of the empty key.
pub const EMPTY_KEY: &str = "[]";

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// One primitive component of a query key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyPart {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl KeyPart {
    /// Returns the string payload, if this part is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    fn write_encoded(&self, out: &mut String) {
        match self {
            Self::Str(s) => write_json_string(s, out),
            Self::Int(n) => out.push_str(&n.to_string()),
            Self::Float(f) if f.is_finite() => out.push_str(&format!("{:?}", f)),
            Self::Float(f) => {
                out.push_str("{\"f64\":\"");
                out.push_str(non_finite_label(*f));
                out.push_str("\"}");
            }
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        }
    }
}

fn non_finite_label(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f.is_sign_positive() {
        "inf"
    } else {
        "-inf"
    }
}

/// Append `s` as a JSON string literal.
fn write_json_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                let b = c as u8;
                out.push_str("\\u00");
                out.push(HEX_DIGITS[(b >> 4) as usize] as char);
                out.push(HEX_DIGITS[(b & 0x0f) as usize] as char);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

impl Serialize for KeyPart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Str(s) => serializer.serialize_str(s),
            Self::Int(n) => serializer.serialize_i64(*n),
            Self::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Self::Float(f) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("f64", non_finite_label(*f))?;
                map.end()
            }
            Self::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for KeyPart {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// An ordered sequence of key parts identifying one cache entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct QueryKey {
    parts: Vec<KeyPart>,
}

impl QueryKey {
    /// Create an empty key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a key from already-built parts.
    pub fn from_parts(parts: Vec<KeyPart>) -> Self {
        Self { parts }
    }

    /// Append a part, builder style.
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.parts.push(part.into());
        self
    }

    /// Append a part in place.
    pub fn push(&mut self, part: impl Into<KeyPart>) {
        self.parts.push(part.into());
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// The last string part of the key, if any.
    ///
    /// Producers that fetch by user input conventionally put the input last.
    pub fn last_str(&self) -> Option<&str> {
        self.parts.iter().rev().find_map(KeyPart::as_str)
    }

    /// Serialize this key into its cache index form.
    pub fn encode(&self) -> EncodedKey {
        let mut out = String::with_capacity(2 + self.parts.len() * 8);
        out.push('[');
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            part.write_encoded(&mut out);
        }
        out.push(']');
        EncodedKey(out)
    }
}

impl<P: Into<KeyPart>> FromIterator<P> for QueryKey {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            parts: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<Vec<KeyPart>> for QueryKey {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self::from_parts(parts)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode().as_str())
    }
}

/// Build a [`QueryKey`] from a list of values convertible into [`KeyPart`].
///
/// ```
/// use querygate_core::query_key;
///
/// let key = query_key!["enabled", "abc", 3];
/// assert_eq!(key.encode().as_str(), r#"["enabled","abc",3]"#);
/// ```
#[macro_export]
macro_rules! query_key {
    () => {
        $crate::key::QueryKey::new()
    };
    ($($part:expr),+ $(,)?) => {
        $crate::key::QueryKey::new()$(.with($part))+
    };
}

/// The serialized, hashable form of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EncodedKey(String);

impl EncodedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the encoding of the empty key.
    pub fn is_empty_key(&self) -> bool {
        self.0 == EMPTY_KEY
    }
}

impl fmt::Display for EncodedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EncodedKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&QueryKey> for EncodedKey {
    fn from(key: &QueryKey) -> Self {
        key.encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_key_is_canonical() {
        let key = QueryKey::new();
        assert!(key.is_empty());
        assert_eq!(key.encode().as_str(), EMPTY_KEY);
        assert!(key.encode().is_empty_key());
    }

    #[test]
    fn test_encode_mixed_parts() {
        let key = query_key!["enabled", 42i64, true, 1.5];
        assert_eq!(key.encode().as_str(), r#"["enabled",42,true,1.5]"#);
    }

    #[test]
    fn test_encode_is_order_sensitive() {
        let a = query_key!["a", "b"];
        let b = query_key!["b", "a"];
        assert_ne!(a.encode(), b.encode());
    }

    #[test]
    fn test_string_and_number_do_not_collide() {
        let text = query_key!["1"];
        let int = query_key![1i64];
        let float = query_key![1.0];
        let flag = query_key!["true"];
        let boolean = query_key![true];

        assert_ne!(text.encode(), int.encode());
        assert_ne!(int.encode(), float.encode());
        assert_ne!(flag.encode(), boolean.encode());
        assert_eq!(float.encode().as_str(), "[1.0]");
    }

    #[test]
    fn test_separator_inside_string_does_not_collide() {
        let joined = query_key!["a\",\"b"];
        let split = query_key!["a", "b"];
        assert_ne!(joined.encode(), split.encode());
    }

    #[test]
    fn test_string_escaping() {
        let key = query_key!["line\nbreak\t\"quoted\" \\ \u{01}"];
        assert_eq!(
            key.encode().as_str(),
            r#"["line\nbreak\t\"quoted\" \\ \u0001"]"#
        );
    }

    #[test]
    fn test_non_finite_floats() {
        assert_eq!(query_key![f64::NAN].encode().as_str(), r#"[{"f64":"NaN"}]"#);
        assert_eq!(
            query_key![f64::INFINITY].encode().as_str(),
            r#"[{"f64":"inf"}]"#
        );
        assert_eq!(
            query_key![f64::NEG_INFINITY].encode().as_str(),
            r#"[{"f64":"-inf"}]"#
        );
        assert_ne!(query_key![f64::NAN].encode(), query_key!["NaN"].encode());
    }

    #[test]
    fn test_negative_zero_is_distinct() {
        assert_ne!(query_key![0.0].encode(), query_key![-0.0].encode());
    }

    #[test]
    fn test_encoding_matches_serde_json() {
        let key = query_key!["skipToken", "abc", -3i64, false, 2.5, "q\"uote"];
        let via_serde = serde_json::to_string(&key).expect("serialize key");
        assert_eq!(key.encode().as_str(), via_serde);
    }

    #[test]
    fn test_last_str() {
        let key = query_key!["enabled", "abc", 7i64];
        assert_eq!(key.last_str(), Some("abc"));
        assert_eq!(query_key![1i64].last_str(), None);
    }

    #[test]
    fn test_from_iterator_and_display() {
        let key: QueryKey = vec!["a", "b"].into_iter().collect();
        assert_eq!(key.len(), 2);
        assert_eq!(key.to_string(), r#"["a","b"]"#);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn part_strategy() -> impl Strategy<Value = KeyPart> {
        prop_oneof![
            any::<String>().prop_map(KeyPart::Str),
            any::<i64>().prop_map(KeyPart::Int),
            any::<f64>().prop_map(KeyPart::Float),
            any::<bool>().prop_map(KeyPart::Bool),
        ]
    }

    fn key_strategy() -> impl Strategy<Value = QueryKey> {
        prop::collection::vec(part_strategy(), 0..6).prop_map(QueryKey::from_parts)
    }

    /// Structural equality where NaN equals NaN and 0.0 differs from -0.0,
    /// which is the equivalence the codec promises.
    fn same_parts(a: &QueryKey, b: &QueryKey) -> bool {
        a.len() == b.len()
            && a.parts().iter().zip(b.parts()).all(|(x, y)| match (x, y) {
                (KeyPart::Float(x), KeyPart::Float(y)) => x.to_bits() == y.to_bits()
                    || (x.is_nan() && y.is_nan()),
                _ => x == y,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1000))]

        /// Property: encoding is stable across calls.
        #[test]
        fn prop_encoding_is_deterministic(key in key_strategy()) {
            prop_assert_eq!(key.encode(), key.clone().encode());
        }

        /// Property: distinct keys never share an encoding.
        #[test]
        fn prop_encoding_is_injective(a in key_strategy(), b in key_strategy()) {
            if same_parts(&a, &b) {
                prop_assert_eq!(a.encode(), b.encode());
            } else {
                prop_assert_ne!(a.encode(), b.encode());
            }
        }

        /// Property: every encoding is a bracketed array.
        #[test]
        fn prop_encoding_is_bracketed(key in key_strategy()) {
            let encoded = key.encode();
            prop_assert!(encoded.as_str().starts_with('['));
            prop_assert!(encoded.as_str().ends_with(']'));
        }

        /// Property: string-only keys parse back as the same JSON array.
        #[test]
        fn prop_string_keys_are_valid_json(parts in prop::collection::vec(any::<String>(), 0..5)) {
            let key: QueryKey = parts.iter().collect();
            let parsed: Vec<String> = serde_json::from_str(key.encode().as_str())
                .expect("encoded key should be JSON");
            prop_assert_eq!(parsed, parts);
        }
    }
}
