//! Identifier canonicalization.
//!
//! # Responsibility
//! - Map both stored identifier encodings onto one comparable form.
//! - Be the only place where identifier values are compared.
//!
//! # Invariants
//! - `{"$oid": "66FA..."}`, `"66fa..."` and `"66FA..."` canonicalize to the
//!   same `CanonicalId`.
//! - Canonicalization is pure: no I/O, no global state.
//! - Malformed values are rejected, never coerced.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Extended-JSON key used by binary object identifiers.
pub const OBJECT_ID_KEY: &str = "$oid";

static OBJECT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").expect("valid object id regex"));
static PLAIN_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:\-]{0,127}$").expect("valid plain id regex")
});

/// Malformed identifier value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierError {
    /// Short rendering of the rejected value.
    pub value: String,
    /// Which shape check failed.
    pub reason: &'static str,
}

impl IdentifierError {
    fn new(value: impl Into<String>, reason: &'static str) -> Self {
        Self {
            value: value.into(),
            reason,
        }
    }
}

impl Display for IdentifierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid identifier `{}`: {}", self.value, self.reason)
    }
}

impl Error for IdentifierError {}

/// Encoding-independent identifier form.
///
/// Object-id shaped values are lowercased; plain strings are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalId(String);

impl CanonicalId {
    /// Parses a bare string in either shape.
    ///
    /// Surrounding whitespace is rejected rather than trimmed, so a padded
    /// stored key never matches the unpadded one.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        if raw.trim().is_empty() {
            return Err(IdentifierError::new(raw, "identifier is empty"));
        }
        if raw.trim() != raw {
            return Err(IdentifierError::new(
                truncate(raw),
                "identifier has surrounding whitespace",
            ));
        }
        if OBJECT_ID_RE.is_match(raw) {
            return Ok(Self(raw.to_ascii_lowercase()));
        }
        if PLAIN_ID_RE.is_match(raw) {
            return Ok(Self(raw.to_string()));
        }
        Err(IdentifierError::new(
            truncate(raw),
            "matches neither object id nor plain string shape",
        ))
    }

    /// Generates a fresh plain-string identifier.
    ///
    /// Simple-format UUIDs are 32 hex digits, so they never take the
    /// 24-digit object-id shape.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Renders as a plain-string document value.
    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }

}

impl Display for CanonicalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CanonicalId {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CanonicalId> for String {
    fn from(value: CanonicalId) -> Self {
        value.0
    }
}

/// Canonicalizes a stored identifier value.
///
/// Accepts a JSON string or an `{"$oid": "<24 hex>"}` object. Everything else
/// (numbers, null, arrays, objects with other keys) is rejected.
pub fn canonicalize(value: &Value) -> Result<CanonicalId, IdentifierError> {
    match value {
        Value::String(raw) => CanonicalId::parse(raw),
        Value::Object(map) => {
            if map.len() != 1 {
                return Err(IdentifierError::new(
                    truncate(&value.to_string()),
                    "object identifier must only contain `$oid`",
                ));
            }
            match map.get(OBJECT_ID_KEY) {
                Some(Value::String(hex)) if OBJECT_ID_RE.is_match(hex) => {
                    Ok(CanonicalId(hex.to_ascii_lowercase()))
                }
                Some(Value::String(hex)) if hex.is_empty() => {
                    Err(IdentifierError::new("", "identifier is empty"))
                }
                _ => Err(IdentifierError::new(
                    truncate(&value.to_string()),
                    "`$oid` must be 24 hexadecimal digits",
                )),
            }
        }
        Value::Null => Err(IdentifierError::new("null", "identifier is empty")),
        other => Err(IdentifierError::new(
            truncate(&other.to_string()),
            "identifier must be a string or `$oid` object",
        )),
    }
}

/// Compares two stored identifier values by canonical form.
///
/// Returns `false` when either side is malformed.
pub fn equals(a: &Value, b: &Value) -> bool {
    match (canonicalize(a), canonicalize(b)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

fn truncate(raw: &str) -> String {
    const MAX_CHARS: usize = 64;
    let mut out: String = raw.chars().take(MAX_CHARS).collect();
    if raw.chars().count() > MAX_CHARS {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{canonicalize, equals, CanonicalId};
    use serde_json::json;

    const HEX: &str = "66fa1b2c3d4e5f6a7b8c9d0e";

    #[test]
    fn object_and_plain_encodings_converge() {
        let object = canonicalize(&json!({ "$oid": HEX.to_uppercase() })).unwrap();
        let plain = canonicalize(&json!(HEX)).unwrap();
        assert_eq!(object, plain);
        assert_eq!(object.as_str(), HEX);
    }

    #[test]
    fn plain_keys_are_kept_verbatim() {
        let id = canonicalize(&json!("B2")).unwrap();
        assert_eq!(id.as_str(), "B2");
        assert_ne!(id, canonicalize(&json!("b2")).unwrap());
    }

    #[test]
    fn malformed_values_are_rejected() {
        for value in [
            json!(""),
            json!("   "),
            json!(null),
            json!(42),
            json!(["a"]),
            json!({ "$oid": "xyz" }),
            json!({ "$oid": "" }),
            json!({ "$oid": HEX, "extra": 1 }),
            json!("has space"),
            json!("-leading-dash"),
        ] {
            assert!(canonicalize(&value).is_err(), "{value} should be rejected");
        }
    }

    #[test]
    fn equals_is_an_equivalence() {
        let a = json!({ "$oid": HEX });
        let b = json!(HEX);
        let c = json!(HEX.to_uppercase());
        assert!(equals(&a, &a));
        assert!(equals(&a, &b) && equals(&b, &a));
        assert!(equals(&a, &b) && equals(&b, &c) && equals(&a, &c));
        assert!(!equals(&a, &json!("S1")));
        assert!(!equals(&json!(""), &json!("")));
    }

    #[test]
    fn padded_identifiers_are_rejected_not_trimmed() {
        for raw in [" S1", "S1 ", " S1 ", "\tB2", " 66fa1b2c3d4e5f6a7b8c9d0e"] {
            let err = CanonicalId::parse(raw).unwrap_err();
            assert_eq!(err.reason, "identifier has surrounding whitespace", "{raw:?}");
        }
        assert!(canonicalize(&json!({ "$oid": format!(" {HEX}") })).is_err());
        assert_eq!(CanonicalId::parse("S1").unwrap().as_str(), "S1");
    }

    #[test]
    fn generated_ids_are_plain_and_unique() {
        let a = CanonicalId::generate();
        let b = CanonicalId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert_eq!(CanonicalId::parse(a.as_str()).unwrap(), a);
    }

    #[test]
    fn serde_roundtrip_validates() {
        let id: CanonicalId = serde_json::from_value(json!("S1")).unwrap();
        assert_eq!(serde_json::to_value(&id).unwrap(), json!("S1"));
        assert!(serde_json::from_value::<CanonicalId>(json!("")).is_err());
    }
}
