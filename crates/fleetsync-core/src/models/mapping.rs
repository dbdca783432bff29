//! Identifier mappings, watermarks and write batches
//!
//! All of these are rebuilt from live store queries every cycle and
//! discarded afterwards.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use super::position::{EntityClass, PositionRecord};

/// The record store's key for a registered vehicle or tracker.
///
/// Keeps the JSON type the registry answered with so writes send the key
/// back unchanged: `7` stays a number and `"007"` stays a string. Equality
/// and hashing look at the text only, since watermark rows may render the
/// same key either way.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub struct InternalKey {
    text: String,
    numeric: bool,
}

impl InternalKey {
    /// A textual key
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            text: key.into(),
            numeric: false,
        }
    }

    /// A key the store holds as a number
    pub fn numeric(key: impl Into<String>) -> Self {
        Self {
            text: key.into(),
            numeric: true,
        }
    }

    /// Key from a registry column value; `None` for null, blank and non-scalar values
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::numeric(n.to_string())),
            Value::String(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| Self::new(s))
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric
    }

    /// The key as the store expects it in a foreign-key field
    pub fn to_value(&self) -> Value {
        if self.numeric {
            if let Ok(n) = self.text.parse::<Number>() {
                return Value::Number(n);
            }
        }
        Value::String(self.text.clone())
    }
}

impl PartialEq for InternalKey {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for InternalKey {}

impl Hash for InternalKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl fmt::Display for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl From<&str> for InternalKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<InternalKey> for Value {
    fn from(key: InternalKey) -> Self {
        key.to_value()
    }
}

impl TryFrom<Value> for InternalKey {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value).ok_or_else(|| format!("not a store key: {}", value))
    }
}

/// `externalIdentifier -> internalKey` for one entity class.
///
/// Identifiers the store does not know are simply absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityMapping(HashMap<String, InternalKey>);

impl EntityMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identifier: impl Into<String>, key: InternalKey) -> Option<InternalKey> {
        self.0.insert(identifier.into(), key)
    }

    pub fn get(&self, identifier: &str) -> Option<&InternalKey> {
        self.0.get(identifier)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, InternalKey)> for EntityMapping {
    fn from_iter<I: IntoIterator<Item = (String, InternalKey)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// `internalKey -> lastObservedAt` in the store's raw string format.
///
/// At most one entry per key: the latest row the store already holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Watermarks(HashMap<InternalKey, String>);

impl Watermarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: InternalKey, last_observed_at: impl Into<String>) -> Option<String> {
        self.0.insert(key, last_observed_at.into())
    }

    pub fn get(&self, key: &InternalKey) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(InternalKey, String)> for Watermarks {
    fn from_iter<I: IntoIterator<Item = (InternalKey, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A position accepted for writing, addressed by its resolved key
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPosition {
    pub key: InternalKey,
    pub record: PositionRecord,
}

/// Ordered positions destined for one entity class's table
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub entity_class: EntityClass,
    pub entries: Vec<ResolvedPosition>,
}

impl Batch {
    pub fn new(entity_class: EntityClass) -> Self {
        Self {
            entity_class,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, key: InternalKey, record: PositionRecord) {
        self.entries.push(ResolvedPosition { key, record });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedPosition> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_key_keeps_registry_type() {
        let numeric = InternalKey::from_value(&json!(7)).unwrap();
        let padded = InternalKey::from_value(&json!("007")).unwrap();

        assert_eq!(numeric.to_value(), json!(7));
        assert_eq!(padded.to_value(), json!("007"));
        assert!(numeric.is_numeric());
        assert!(!padded.is_numeric());
        assert_ne!(numeric, padded);
    }

    #[test]
    fn test_blank_and_null_are_not_keys() {
        assert_eq!(InternalKey::from_value(&json!(null)), None);
        assert_eq!(InternalKey::from_value(&json!("  ")), None);
    }

    #[test]
    fn test_watermarks_match_keys_rendered_as_text() {
        let watermarks: Watermarks = [(InternalKey::new("12"), "01/03/2024 10:00:00".to_string())]
            .into_iter()
            .collect();

        assert_eq!(
            watermarks.get(&InternalKey::numeric("12")),
            Some("01/03/2024 10:00:00")
        );
    }

    #[test]
    fn test_serialize_as_store_value() {
        assert_eq!(serde_json::to_value(InternalKey::numeric("12")).unwrap(), json!(12));
        let key: InternalKey = serde_json::from_value(json!("007")).unwrap();
        assert_eq!(key.to_value(), json!("007"));
    }
}
