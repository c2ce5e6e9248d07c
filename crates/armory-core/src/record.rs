//! # Record Reader
//!
//! Lenient, defaults-aware access to raw records during `load`.
//!
//! A `Record` pairs a raw record with the variant's default record. Every
//! accessor reads the raw value first and falls back to the default when the
//! field is missing, `null`, or of the wrong shape. Malformed values are
//! logged and repaired, never surfaced as errors: hand-authored data drifts,
//! and one bad optional field must not make a whole entry unloadable.
//!
//! The one exception is a reference whose type tag is unknown. That is a
//! schema contract violation and is returned as an error.

use crate::{ArmoryError, EntryType, RawRecord, RefToken};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Read-only view over a raw record with default backfill.
#[derive(Debug, Clone, Copy, Default)]
pub struct Record<'a> {
    raw: Option<&'a RawRecord>,
    defaults: Option<&'a RawRecord>,
}

impl<'a> Record<'a> {
    #[must_use]
    pub fn new(raw: &'a RawRecord, defaults: &'a RawRecord) -> Self {
        Self {
            raw: Some(raw),
            defaults: Some(defaults),
        }
    }

    /// A record with neither raw values nor defaults.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    fn raw_field(&self, name: &str) -> Option<&'a Value> {
        self.raw
            .and_then(|raw| raw.get(name))
            .filter(|value| !value.is_null())
    }

    fn default_field(&self, name: &str) -> Option<&'a Value> {
        self.defaults.and_then(|defaults| defaults.get(name))
    }

    /// Check if the raw record carries a non-null value for a field.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.raw_field(name).is_some()
    }

    /// Read a field with a shape check, falling back to the default.
    fn read<T>(&self, name: &str, parse: impl Fn(&Value) -> Option<T>) -> Option<T> {
        if let Some(value) = self.raw_field(name) {
            if let Some(parsed) = parse(value) {
                return Some(parsed);
            }
            tracing::warn!(field = name, value = %value, "malformed field, using default");
        }
        self.default_field(name).and_then(parse)
    }

    // =========================================================================
    // SCALARS
    // =========================================================================

    /// String field. Missing everywhere ⇒ empty string.
    #[must_use]
    pub fn text(&self, name: &str) -> String {
        self.read(name, |v| v.as_str().map(str::to_string))
            .unwrap_or_default()
    }

    /// Optional string field; no default applies.
    #[must_use]
    pub fn opt_text(&self, name: &str) -> Option<String> {
        self.raw_field(name)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Integer field. Numeric strings (`"12"`) are accepted.
    #[must_use]
    pub fn int(&self, name: &str) -> i64 {
        self.read(name, parse_int).unwrap_or_default()
    }

    /// Boolean field.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.read(name, Value::as_bool).unwrap_or_default()
    }

    /// Enum (or any serde-shaped) field.
    #[must_use]
    pub fn choice<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        self.read(name, |v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// List of value objects. Malformed elements are dropped.
    #[must_use]
    pub fn values<V: DeserializeOwned>(&self, name: &str) -> Vec<V> {
        let Some(items) = self.read(name, |v| v.as_array().cloned()) else {
            return Vec::new();
        };
        items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(field = name, error = %e, "dropping malformed value");
                    None
                }
            })
            .collect()
    }

    // =========================================================================
    // REFERENCES
    // =========================================================================

    /// Reference field. Missing or malformed ⇒ `None`.
    pub fn token(&self, name: &str) -> Result<Option<RefToken>, ArmoryError> {
        match self.raw_field(name) {
            Some(value) => parse_token(value),
            None => Ok(None),
        }
    }

    /// List of references. Malformed elements are dropped.
    pub fn tokens(&self, name: &str) -> Result<Vec<RefToken>, ArmoryError> {
        let Some(items) = self.raw_field(name).and_then(Value::as_array) else {
            return Ok(Vec::new());
        };
        let mut tokens = Vec::with_capacity(items.len());
        for item in items {
            if let Some(token) = parse_token(item)? {
                tokens.push(token);
            }
        }
        Ok(tokens)
    }

    /// Reference field that must point at `expected`.
    ///
    /// A well-formed token of any other type is a schema violation.
    pub fn token_of(
        &self,
        name: &str,
        expected: EntryType,
    ) -> Result<Option<RefToken>, ArmoryError> {
        let token = self.token(name)?;
        if let Some(token) = &token {
            check_token_type(token, expected)?;
        }
        Ok(token)
    }

    /// List of references that must all point at `expected`.
    pub fn tokens_of(&self, name: &str, expected: EntryType) -> Result<Vec<RefToken>, ArmoryError> {
        let tokens = self.tokens(name)?;
        for token in &tokens {
            check_token_type(token, expected)?;
        }
        Ok(tokens)
    }

    // =========================================================================
    // NESTING
    // =========================================================================

    /// Nested object field, with the matching nested defaults.
    #[must_use]
    pub fn nested(&self, name: &str) -> Record<'a> {
        Record {
            raw: self.raw_field(name).and_then(Value::as_object),
            defaults: self.default_field(name).and_then(Value::as_object),
        }
    }

    /// List of nested objects, each backfilled from `item_defaults`.
    #[must_use]
    pub fn items<'b>(&self, name: &str, item_defaults: &'b RawRecord) -> Vec<Record<'b>>
    where
        'a: 'b,
    {
        self.raw_field(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|raw| Record::new(raw, item_defaults))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn check_token_type(token: &RefToken, expected: EntryType) -> Result<(), ArmoryError> {
    if token.entry_type() == expected {
        Ok(())
    } else {
        Err(ArmoryError::TypeMismatch {
            expected,
            found: token.entry_type(),
        })
    }
}

/// Parse an integer from a number or a numeric string.
pub(crate) fn parse_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a normalized reference token.
///
/// Returns `Ok(None)` for shapes that are not tokens at all, and an error
/// when the shape is a token but its type tag is unknown.
pub fn parse_token(value: &Value) -> Result<Option<RefToken>, ArmoryError> {
    let Some(obj) = value.as_object() else {
        return Ok(None);
    };
    let (Some(tag), Some(id)) = (
        obj.get("type").and_then(Value::as_str),
        obj.get("id").and_then(Value::as_str),
    ) else {
        return Ok(None);
    };
    let entry_type: EntryType = tag.parse()?;

    let mut token = RefToken::new(entry_type, id);
    if let Some(brew) = obj.get("brew").and_then(Value::as_str) {
        token = token.with_brew(brew);
    }
    if let Some(label) = obj.get("fallback").and_then(Value::as_str) {
        token = token.with_fallback(label);
    }
    Ok(Some(token))
}

const TOKEN_KEYS: [&str; 4] = ["type", "id", "brew", "fallback"];

/// Collect every token nested anywhere inside a raw value.
///
/// Only objects made purely of token keys count, so value objects that
/// happen to carry a `type` field are walked into, not parsed.
pub fn collect_tokens(value: &Value, out: &mut Vec<RefToken>) -> Result<(), ArmoryError> {
    match value {
        Value::Object(obj) => {
            if obj.keys().all(|k| TOKEN_KEYS.contains(&k.as_str())) {
                if let Some(token) = parse_token(value)? {
                    out.push(token);
                    return Ok(());
                }
            }
            for nested in obj.values() {
                collect_tokens(nested, out)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                collect_tokens(item, out)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Serialize a list of tokens into a raw JSON array.
#[must_use]
pub fn tokens_to_value(tokens: impl IntoIterator<Item = RefToken>) -> Value {
    Value::Array(tokens.into_iter().map(|t| t.to_value()).collect())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn missing_fields_use_defaults() {
        let raw = map(json!({"name": "Everest"}));
        let defaults = map(json!({"name": "", "hp": 8, "armored": true}));
        let record = Record::new(&raw, &defaults);

        assert_eq!(record.text("name"), "Everest");
        assert_eq!(record.int("hp"), 8);
        assert!(record.flag("armored"));
        assert_eq!(record.int("unknown"), 0);
    }

    #[test]
    fn malformed_fields_are_repaired() {
        let raw = map(json!({"hp": "lots", "heat": "4", "loaded": "yes"}));
        let defaults = map(json!({"hp": 10, "heat": 0, "loaded": true}));
        let record = Record::new(&raw, &defaults);

        assert_eq!(record.int("hp"), 10);
        assert_eq!(record.int("heat"), 4);
        assert!(record.flag("loaded"));
    }

    #[test]
    fn null_counts_as_missing() {
        let raw = map(json!({"name": null}));
        let defaults = map(json!({"name": "Unnamed"}));
        let record = Record::new(&raw, &defaults);

        assert!(!record.has("name"));
        assert_eq!(record.text("name"), "Unnamed");
    }

    #[test]
    fn token_parsing() {
        let raw = map(json!({
            "frame": {"type": "frame", "id": "everest", "brew": "core"},
            "weapons": [{"type": "weapon", "id": "w1"}, "garbage", {"type": "weapon"}],
        }));
        let defaults = RawRecord::new();
        let record = Record::new(&raw, &defaults);

        let frame = record.token("frame").expect("token").expect("present");
        assert_eq!(frame.entry_type(), EntryType::Frame);
        assert_eq!(frame.brew(), Some("core"));

        let weapons = record.tokens("weapons").expect("tokens");
        assert_eq!(weapons, vec![RefToken::new(EntryType::Weapon, "w1")]);
    }

    #[test]
    fn unknown_token_type_is_fatal() {
        let raw = map(json!({"frame": {"type": "starship", "id": "x"}}));
        let defaults = RawRecord::new();
        let record = Record::new(&raw, &defaults);

        assert!(matches!(
            record.token("frame"),
            Err(ArmoryError::UnknownEntryType(_))
        ));
    }

    #[test]
    fn typed_token_rejects_foreign_type() {
        let raw = map(json!({
            "frame": {"type": "weapon", "id": "w1"},
            "systems": [{"type": "system", "id": "s1"}],
        }));
        let defaults = RawRecord::new();
        let record = Record::new(&raw, &defaults);

        assert!(matches!(
            record.token_of("frame", EntryType::Frame),
            Err(ArmoryError::TypeMismatch {
                expected: EntryType::Frame,
                found: EntryType::Weapon
            })
        ));
        assert_eq!(
            record.tokens_of("systems", EntryType::System).expect("tokens").len(),
            1
        );
        assert!(record.token_of("missing", EntryType::Frame).expect("token").is_none());
    }

    #[test]
    fn collect_tokens_skips_value_objects() {
        let value = json!({
            "damage": [{"type": "kinetic", "val": 3}],
            "tags": [{"id": "tg_limited", "val": 2}],
            "mounts": [{"slots": [{"weapon": {"type": "weapon", "id": "w1"}}]}],
            "systems": [{"type": "system", "id": "s1", "fallback": "Shield"}],
        });
        let mut tokens = Vec::new();
        collect_tokens(&value, &mut tokens).expect("collect");

        assert_eq!(
            tokens,
            vec![
                RefToken::new(EntryType::Weapon, "w1"),
                RefToken::new(EntryType::System, "s1"),
            ]
        );
    }

    #[test]
    fn nested_and_items_carry_defaults() {
        let raw = map(json!({
            "stats": {"hp": 12},
            "mounts": [{"mount_type": "heavy"}, {}],
        }));
        let defaults = map(json!({"stats": {"hp": 8, "armor": 1}}));
        let item_defaults = map(json!({"mount_type": "main"}));
        let record = Record::new(&raw, &defaults);

        let stats = record.nested("stats");
        assert_eq!(stats.int("hp"), 12);
        assert_eq!(stats.int("armor"), 1);

        let mounts = record.items("mounts", &item_defaults);
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].text("mount_type"), "heavy");
        assert_eq!(mounts[1].text("mount_type"), "main");
    }
}
