//! # Pack / Unpack
//!
//! Conversion between the *packed* form of a record (hand-authored or
//! exported: references are bare id strings) and the *normalized* form the
//! engine loads (references are typed tokens).
//!
//! Conversion is schema-driven. Each entry type declares a static list of
//! `Field`s; the shape of a field decides how its value converts.
//!
//! Unpacking never rejects a record for bad data:
//! - unparsable numbers and unknown enum strings are kept as opaque literals
//!   and reported as `UnpackFlag`s
//! - a reference authored as an object (`{"id": "w1", "destroyed": true}`)
//!   becomes a token, and its status fields are lifted into a per-path
//!   `StatusPatch`
//!
//! The one fatal case is a heterogeneous reference (`"type:id"`) naming an
//! unknown entry type.

use crate::content::{GearState, schema};
use crate::primitives::{ANY_REF_SEPARATOR, ID_FIELD, MAX_ID_LENGTH};
use crate::record::{parse_int, parse_token};
use crate::{ArmoryError, EntryType, RawRecord, RefToken};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// SCHEMA
// =============================================================================

/// One field of an authored-data schema.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub shape: FieldShape,
}

impl Field {
    #[must_use]
    pub const fn new(name: &'static str, shape: FieldShape) -> Self {
        Self { name, shape }
    }
}

/// How a field's value converts between packed and normalized form.
#[derive(Debug, Clone, Copy)]
pub enum FieldShape {
    /// Free text, passed through.
    Text,
    /// Integer; numeric strings are converted.
    Int,
    /// Boolean; `"true"`/`"false"` strings are converted.
    Flag,
    /// One of a fixed set of lowercase names.
    Choice(&'static [&'static str]),
    /// Array of value objects, passed through.
    Values,
    /// Single reference to the given entry type.
    Ref(EntryType),
    /// List of references to the given entry type.
    RefList(EntryType),
    /// List of references of mixed types, authored as `"type:id"`.
    AnyRefList,
    /// Nested object.
    Nested(&'static [Field]),
    /// List of nested objects.
    NestedList(&'static [Field]),
}

fn find(fields: &[Field], name: &str) -> Option<FieldShape> {
    fields.iter().find(|f| f.name == name).map(|f| f.shape)
}

// =============================================================================
// OUTCOME
// =============================================================================

/// Why a packed value was kept as an opaque literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    UnparsableNumber,
    UnknownChoice,
    MalformedReference,
    OverlongId,
    UnexpectedShape,
}

/// A packed value that did not convert cleanly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnpackFlag {
    pub path: String,
    pub reason: FlagReason,
    pub value: Value,
}

/// Runtime status fields authored on a reference.
///
/// `None` means the field was not authored and must not be touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatusPatch {
    pub destroyed: Option<bool>,
    pub cascading: Option<bool>,
    pub loaded: Option<bool>,
    pub uses: Option<i64>,
}

impl StatusPatch {
    fn from_object(obj: &RawRecord) -> Self {
        Self {
            destroyed: obj.get("destroyed").and_then(Value::as_bool),
            cascading: obj.get("cascading").and_then(Value::as_bool),
            loaded: obj.get("loaded").and_then(Value::as_bool),
            uses: obj.get("uses").and_then(parse_int),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlay the authored fields. Returns `true` if the state changed.
    pub fn apply(&self, state: &mut GearState) -> bool {
        let before = *state;
        if let Some(destroyed) = self.destroyed {
            state.destroyed = destroyed;
        }
        if let Some(cascading) = self.cascading {
            state.cascading = cascading;
        }
        if let Some(loaded) = self.loaded {
            state.loaded = loaded;
        }
        if let Some(uses) = self.uses {
            state.uses = uses;
        }
        *state != before
    }
}

/// Result of unpacking one record.
#[derive(Debug, Clone, Default)]
pub struct UnpackOutcome {
    /// The normalized record, ready for `create_live`.
    pub record: RawRecord,
    /// Values kept as opaque literals.
    pub flags: Vec<UnpackFlag>,
    /// Status overlays keyed by the path of the reference they came from.
    pub statuses: BTreeMap<String, StatusPatch>,
}

impl UnpackOutcome {
    /// The authored id, if the record carried one.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.record.get(ID_FIELD).and_then(Value::as_str)
    }
}

// =============================================================================
// UNPACK
// =============================================================================

/// Convert a packed record of the given type into normalized form.
pub fn unpack(entry_type: EntryType, packed: &RawRecord) -> Result<UnpackOutcome, ArmoryError> {
    let mut unpacker = Unpacker::default();
    let mut record = RawRecord::new();

    if let Some(id) = packed.get(ID_FIELD) {
        match id_string(id) {
            Some(id) if id.len() <= MAX_ID_LENGTH => {
                record.insert(ID_FIELD.to_string(), Value::String(id));
            }
            Some(_) => unpacker.flag(ID_FIELD, FlagReason::OverlongId, id),
            None => unpacker.flag(ID_FIELD, FlagReason::MalformedReference, id),
        }
    }
    unpacker.fill(&mut record, schema(entry_type), packed, "")?;

    for flag in &unpacker.flags {
        tracing::warn!(
            entry_type = %entry_type,
            path = %flag.path,
            reason = ?flag.reason,
            "kept packed value as literal"
        );
    }

    Ok(UnpackOutcome {
        record,
        flags: unpacker.flags,
        statuses: unpacker.statuses,
    })
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn child(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

#[derive(Default)]
struct Unpacker {
    flags: Vec<UnpackFlag>,
    statuses: BTreeMap<String, StatusPatch>,
}

impl Unpacker {
    fn flag(&mut self, path: &str, reason: FlagReason, value: &Value) {
        self.flags.push(UnpackFlag {
            path: path.to_string(),
            reason,
            value: value.clone(),
        });
    }

    /// Convert every field of `packed` into `out`. Fields the schema does not
    /// know pass through unchanged.
    fn fill(
        &mut self,
        out: &mut RawRecord,
        fields: &[Field],
        packed: &RawRecord,
        prefix: &str,
    ) -> Result<(), ArmoryError> {
        for (name, value) in packed {
            if prefix.is_empty() && name == ID_FIELD {
                continue;
            }
            let converted = match find(fields, name) {
                Some(shape) => self.value(shape, value, &child(prefix, name))?,
                None => value.clone(),
            };
            out.insert(name.clone(), converted);
        }
        Ok(())
    }

    fn value(&mut self, shape: FieldShape, value: &Value, path: &str) -> Result<Value, ArmoryError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let converted = match shape {
            FieldShape::Text | FieldShape::Values => value.clone(),
            FieldShape::Int => match parse_int(value) {
                Some(n) => n.into(),
                None => {
                    self.flag(path, FlagReason::UnparsableNumber, value);
                    value.clone()
                }
            },
            FieldShape::Flag => match value {
                Value::Bool(_) => value.clone(),
                Value::String(s) if s == "true" || s == "false" => Value::Bool(s == "true"),
                _ => {
                    self.flag(path, FlagReason::UnexpectedShape, value);
                    value.clone()
                }
            },
            FieldShape::Choice(names) => {
                let normalized = value.as_str().map(|s| s.trim().to_ascii_lowercase());
                match normalized {
                    Some(name) if names.contains(&name.as_str()) => Value::String(name),
                    _ => {
                        self.flag(path, FlagReason::UnknownChoice, value);
                        value.clone()
                    }
                }
            }
            FieldShape::Ref(entry_type) => self.reference(entry_type, value, path)?,
            FieldShape::RefList(entry_type) => {
                let Some(items) = value.as_array() else {
                    self.flag(path, FlagReason::UnexpectedShape, value);
                    return Ok(value.clone());
                };
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(self.reference(entry_type, item, &format!("{path}[{i}]"))?);
                }
                Value::Array(out)
            }
            FieldShape::AnyRefList => {
                let Some(items) = value.as_array() else {
                    self.flag(path, FlagReason::UnexpectedShape, value);
                    return Ok(value.clone());
                };
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(self.any_reference(item, &format!("{path}[{i}]"))?);
                }
                Value::Array(out)
            }
            FieldShape::Nested(fields) => match value.as_object() {
                Some(obj) => {
                    let mut out = RawRecord::new();
                    self.fill(&mut out, fields, obj, path)?;
                    Value::Object(out)
                }
                None => {
                    self.flag(path, FlagReason::UnexpectedShape, value);
                    value.clone()
                }
            },
            FieldShape::NestedList(fields) => {
                let Some(items) = value.as_array() else {
                    self.flag(path, FlagReason::UnexpectedShape, value);
                    return Ok(value.clone());
                };
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let item_path = format!("{path}[{i}]");
                    match item.as_object() {
                        Some(obj) => {
                            let mut nested = RawRecord::new();
                            self.fill(&mut nested, fields, obj, &item_path)?;
                            out.push(Value::Object(nested));
                        }
                        None => {
                            self.flag(&item_path, FlagReason::UnexpectedShape, item);
                            out.push(item.clone());
                        }
                    }
                }
                Value::Array(out)
            }
        };
        Ok(converted)
    }

    /// Convert one single-type reference.
    fn reference(
        &mut self,
        entry_type: EntryType,
        value: &Value,
        path: &str,
    ) -> Result<Value, ArmoryError> {
        let (id, extra) = match value {
            Value::Null => return Ok(Value::Null),
            Value::Object(obj) if obj.contains_key("type") => {
                // Already normalized.
                return match parse_token(value)? {
                    Some(token) if token.entry_type() == entry_type => Ok(value.clone()),
                    Some(token) => Err(ArmoryError::TypeMismatch {
                        expected: entry_type,
                        found: token.entry_type(),
                    }),
                    None => {
                        self.flag(path, FlagReason::MalformedReference, value);
                        Ok(value.clone())
                    }
                };
            }
            Value::Object(obj) => (obj.get(ID_FIELD).and_then(id_string), Some(obj)),
            other => (id_string(other), None),
        };

        let Some(id) = id else {
            self.flag(path, FlagReason::MalformedReference, value);
            return Ok(value.clone());
        };
        if id.len() > MAX_ID_LENGTH {
            self.flag(path, FlagReason::OverlongId, value);
            return Ok(Value::Null);
        }

        let mut token = RefToken::new(entry_type, id);
        if let Some(obj) = extra {
            if let Some(brew) = obj.get("brew").and_then(Value::as_str) {
                token = token.with_brew(brew);
            }
            if let Some(label) = obj.get("fallback").and_then(Value::as_str) {
                token = token.with_fallback(label);
            }
            let patch = StatusPatch::from_object(obj);
            if !patch.is_empty() {
                self.statuses.insert(path.to_string(), patch);
            }
        }
        Ok(token.to_value())
    }

    /// Convert one element of a heterogeneous reference list.
    fn any_reference(&mut self, value: &Value, path: &str) -> Result<Value, ArmoryError> {
        match value {
            Value::String(s) => match s.split_once(ANY_REF_SEPARATOR) {
                Some((tag, id)) if !id.is_empty() => {
                    let entry_type: EntryType = tag.parse()?;
                    Ok(RefToken::new(entry_type, id).to_value())
                }
                _ => {
                    self.flag(path, FlagReason::MalformedReference, value);
                    Ok(value.clone())
                }
            },
            Value::Object(_) => match parse_token(value)? {
                Some(_) => Ok(value.clone()),
                None => {
                    self.flag(path, FlagReason::MalformedReference, value);
                    Ok(value.clone())
                }
            },
            _ => {
                self.flag(path, FlagReason::MalformedReference, value);
                Ok(value.clone())
            }
        }
    }
}

// =============================================================================
// PACK
// =============================================================================

/// Convert a normalized record back into packed form.
///
/// Tokens become bare ids (`"type:id"` in heterogeneous lists). Status
/// fields are not re-embedded: they live on the referenced records.
#[must_use]
pub fn pack(entry_type: EntryType, normalized: &RawRecord) -> RawRecord {
    pack_fields(schema(entry_type), normalized)
}

fn pack_fields(fields: &[Field], normalized: &RawRecord) -> RawRecord {
    normalized
        .iter()
        .map(|(name, value)| {
            let packed = match find(fields, name) {
                Some(shape) => pack_value(shape, value),
                None => value.clone(),
            };
            (name.clone(), packed)
        })
        .collect()
}

fn pack_value(shape: FieldShape, value: &Value) -> Value {
    match (shape, value) {
        (FieldShape::Ref(_), _) => bare_id(value),
        (FieldShape::RefList(_), Value::Array(items)) => {
            Value::Array(items.iter().map(bare_id).collect())
        }
        (FieldShape::AnyRefList, Value::Array(items)) => Value::Array(
            items
                .iter()
                .map(|item| match parse_token(item) {
                    Ok(Some(token)) => Value::String(format!(
                        "{}{}{}",
                        token.entry_type(),
                        ANY_REF_SEPARATOR,
                        token.id()
                    )),
                    _ => item.clone(),
                })
                .collect(),
        ),
        (FieldShape::Nested(fields), Value::Object(obj)) => Value::Object(pack_fields(fields, obj)),
        (FieldShape::NestedList(fields), Value::Array(items)) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(obj) => Value::Object(pack_fields(fields, obj)),
                    other => other.clone(),
                })
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn bare_id(value: &Value) -> Value {
    match parse_token(value) {
        Ok(Some(token)) => Value::String(token.id().to_string()),
        _ => value.clone(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn bare_ids_become_typed_tokens() {
        let packed = raw(json!({
            "id": "m1",
            "name": "Bastion",
            "frame": "everest",
            "systems": ["shield", "patch"],
        }));
        let outcome = unpack(EntryType::Mech, &packed).expect("unpack");

        assert_eq!(outcome.id(), Some("m1"));
        assert_eq!(outcome.record["frame"], json!({"type": "frame", "id": "everest"}));
        assert_eq!(
            outcome.record["systems"],
            json!([
                {"type": "system", "id": "shield"},
                {"type": "system", "id": "patch"},
            ])
        );
        assert!(outcome.flags.is_empty());
    }

    #[test]
    fn nested_slots_unpack_with_status_overlays() {
        let packed = raw(json!({
            "mounts": [{
                "mount_type": "Main",
                "slots": [{"size": "main", "weapon": {"id": "w1", "destroyed": true, "uses": "2"}}],
            }],
        }));
        let outcome = unpack(EntryType::Mech, &packed).expect("unpack");

        let slot = &outcome.record["mounts"][0]["slots"][0];
        assert_eq!(slot["weapon"], json!({"type": "weapon", "id": "w1"}));
        assert_eq!(outcome.record["mounts"][0]["mount_type"], json!("main"));

        let patch = outcome.statuses["mounts[0].slots[0].weapon"];
        assert_eq!(patch.destroyed, Some(true));
        assert_eq!(patch.uses, Some(2));
        assert_eq!(patch.loaded, None);
    }

    #[test]
    fn unparsable_scalars_are_kept_and_flagged() {
        let packed = raw(json!({"hp": "twelve", "heat": "3", "name": "X"}));
        let outcome = unpack(EntryType::Mech, &packed).expect("unpack");

        assert_eq!(outcome.record["hp"], json!("twelve"));
        assert_eq!(outcome.record["heat"], json!(3));
        assert_eq!(
            outcome.flags,
            vec![UnpackFlag {
                path: "hp".into(),
                reason: FlagReason::UnparsableNumber,
                value: json!("twelve"),
            }]
        );
    }

    #[test]
    fn unknown_choice_is_flagged() {
        let packed = raw(json!({"size": "colossal"}));
        let outcome = unpack(EntryType::Weapon, &packed).expect("unpack");
        assert_eq!(outcome.record["size"], json!("colossal"));
        assert_eq!(outcome.flags[0].reason, FlagReason::UnknownChoice);
    }

    #[test]
    fn any_refs_parse_type_prefix() {
        let packed = raw(json!({"integrated": ["weapon:core_gun", "system:core_shield", "junk"]}));
        let outcome = unpack(EntryType::Frame, &packed).expect("unpack");

        assert_eq!(
            outcome.record["integrated"],
            json!([
                {"type": "weapon", "id": "core_gun"},
                {"type": "system", "id": "core_shield"},
                "junk",
            ])
        );
        assert_eq!(outcome.flags[0].path, "integrated[2]");
    }

    #[test]
    fn unknown_any_ref_type_is_fatal() {
        let packed = raw(json!({"integrated": ["starship:x"]}));
        assert!(matches!(
            unpack(EntryType::Frame, &packed),
            Err(ArmoryError::UnknownEntryType(_))
        ));
    }

    #[test]
    fn normalized_token_of_wrong_type_is_fatal() {
        let packed = raw(json!({"frame": {"type": "weapon", "id": "w1"}}));
        assert!(matches!(
            unpack(EntryType::Mech, &packed),
            Err(ArmoryError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn pack_restores_bare_ids() {
        let normalized = raw(json!({
            "id": "f1",
            "name": "Everest",
            "integrated": [{"type": "weapon", "id": "core_gun"}],
        }));
        let packed = pack(EntryType::Frame, &normalized);
        assert_eq!(packed["integrated"], json!(["weapon:core_gun"]));
        assert_eq!(packed["id"], json!("f1"));

        let outcome = unpack(EntryType::Frame, &packed).expect("unpack");
        assert_eq!(outcome.record, normalized);
    }

    #[test]
    fn status_patch_only_touches_authored_fields() {
        let mut state = GearState {
            destroyed: false,
            cascading: true,
            loaded: false,
            uses: 3,
        };
        let patch = StatusPatch {
            destroyed: Some(true),
            ..StatusPatch::default()
        };
        assert!(patch.apply(&mut state));
        assert!(state.destroyed);
        assert!(state.cascading);
        assert!(!state.loaded);
        assert_eq!(state.uses, 3);

        assert!(!patch.apply(&mut state));
    }
}
