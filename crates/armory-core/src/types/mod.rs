//! # Core Type Definitions
//!
//! This module contains the vocabulary shared by every layer of the engine:
//! - Entry kinds and record keys (`EntryType`, `EntryKey`)
//! - Untyped persisted state (`RawRecord`)
//! - Typed pointers between records (`RefToken`)
//! - Error types (`ArmoryError`)
//!
//! ## Determinism Guarantees
//!
//! All key types implement `Ord` so identity maps and store tables can use
//! `BTreeMap`/`BTreeSet` and enumerate in a stable order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Untyped, serializable field map for one record.
///
/// This is what a live entry's `save()` produces and what the backing store
/// persists. It carries no object identity.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// ENTRY TYPE
// =============================================================================

/// Closed tag naming a kind of content record.
///
/// The tag selects the category inside a registry and the live-entry variant
/// used to load the record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Frame,
    Weapon,
    WeaponMod,
    System,
    Quirk,
    Pilot,
    Mech,
}

impl EntryType {
    /// Every entry type, in table order.
    pub const ALL: [EntryType; 7] = [
        EntryType::Frame,
        EntryType::Weapon,
        EntryType::WeaponMod,
        EntryType::System,
        EntryType::Quirk,
        EntryType::Pilot,
        EntryType::Mech,
    ];

    /// Stable string form used in tokens, store tables and archives.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Frame => "frame",
            Self::Weapon => "weapon",
            Self::WeaponMod => "weapon_mod",
            Self::System => "system",
            Self::Quirk => "quirk",
            Self::Pilot => "pilot",
            Self::Mech => "mech",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = ArmoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| ArmoryError::UnknownEntryType(s.to_string()))
    }
}

// =============================================================================
// ENTRY KEY
// =============================================================================

/// Identity of one record inside a content universe: `(entry_type, id)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    pub entry_type: EntryType,
    pub id: String,
}

impl EntryKey {
    #[must_use]
    pub fn new(entry_type: EntryType, id: impl Into<String>) -> Self {
        Self {
            entry_type,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entry_type, self.id)
    }
}

// =============================================================================
// REFERENCE TOKEN
// =============================================================================

/// Serializable pointer to another record.
///
/// A token is a lookup key, not an owning pointer: it may dangle, and two
/// tokens naming the same `(type, id, brew)` are the same logical target.
/// The `fallback` label is display-only and does not take part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefToken {
    #[serde(rename = "type")]
    entry_type: EntryType,
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    brew: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fallback: Option<String>,
}

impl RefToken {
    /// Create a token naming `(entry_type, id)`.
    #[must_use]
    pub fn new(entry_type: EntryType, id: impl Into<String>) -> Self {
        Self {
            entry_type,
            id: id.into(),
            brew: None,
            fallback: None,
        }
    }

    /// Tag the token with the content source it came from.
    #[must_use]
    pub fn with_brew(mut self, brew: impl Into<String>) -> Self {
        self.brew = Some(brew.into());
        self
    }

    /// Attach a human-readable label shown when the target is missing.
    #[must_use]
    pub fn with_fallback(mut self, label: impl Into<String>) -> Self {
        self.fallback = Some(label.into());
        self
    }

    #[must_use]
    pub fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn brew(&self) -> Option<&str> {
        self.brew.as_deref()
    }

    #[must_use]
    pub fn fallback(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    /// The identity-map key this token resolves through.
    #[must_use]
    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.entry_type, self.id.clone())
    }

    /// Serialize the token into its raw-record form.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl PartialEq for RefToken {
    fn eq(&self, other: &Self) -> bool {
        self.entry_type == other.entry_type && self.id == other.id && self.brew == other.brew
    }
}

impl Eq for RefToken {}

impl Hash for RefToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entry_type.hash(state);
        self.id.hash(state);
        self.brew.hash(state);
    }
}

impl fmt::Display for RefToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.brew {
            Some(brew) => write!(f, "{}/{}@{}", self.entry_type, self.id, brew),
            None => write!(f, "{}/{}", self.entry_type, self.id),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Armory engine.
///
/// Not-found targets and malformed optional fields are NOT errors: they
/// surface as `None` and as defaulted values. What remains here is either a
/// schema contract violation (fatal) or a failure of the host's store.
#[derive(Debug, Error)]
pub enum ArmoryError {
    /// A type tag string did not name any known entry type.
    #[error("Unknown entry type: {0:?}")]
    UnknownEntryType(String),

    /// The registry has no category for the requested entry type.
    #[error("No category registered for entry type {0}")]
    UnknownCategory(EntryType),

    /// A token was resolved against a category of a different type.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: EntryType,
        found: EntryType,
    },

    /// A record id was empty or longer than `MAX_ID_LENGTH`.
    #[error("Invalid id: {0:?}")]
    InvalidId(String),

    /// A live entry's load was aborted by a fatal error elsewhere.
    #[error("Load aborted for {0}")]
    LoadAborted(EntryKey),

    /// The entry is still loading (or failed) and cannot be saved.
    #[error("Entry not ready: {0}")]
    NotReady(EntryKey),

    /// Writeback targeted a row that no longer exists in the store.
    #[error("Dangling writeback: {0} has no backing row")]
    DanglingWriteback(EntryKey),

    /// A required entry does not exist.
    ///
    /// Resolution itself reports missing targets as `None`; this is for
    /// callers that were asked for one specific entry.
    #[error("Entry not found: {0}")]
    NotFound(EntryKey),

    /// A storage backend operation failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A host file could not be read or written.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl ArmoryError {
    /// True for schema contract violations that abort a whole operation.
    #[must_use]
    pub fn is_type_confusion(&self) -> bool {
        matches!(
            self,
            Self::UnknownEntryType(_) | Self::UnknownCategory(_) | Self::TypeMismatch { .. }
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_type_string_roundtrip() {
        for ty in EntryType::ALL {
            assert_eq!(ty.as_str().parse::<EntryType>().expect("parse"), ty);
        }
        assert!(matches!(
            "npc_thing".parse::<EntryType>(),
            Err(ArmoryError::UnknownEntryType(_))
        ));
    }

    #[test]
    fn token_serializes_with_type_tag() {
        let token = RefToken::new(EntryType::WeaponMod, "m1");
        let value = token.to_value();

        assert_eq!(value, serde_json::json!({"type": "weapon_mod", "id": "m1"}));
    }

    #[test]
    fn token_equality_ignores_fallback_label() {
        let a = RefToken::new(EntryType::Weapon, "w1").with_fallback("Assault Rifle");
        let b = RefToken::new(EntryType::Weapon, "w1");
        let c = RefToken::new(EntryType::Weapon, "w1").with_brew("homebrew");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.key(), c.key());
    }

    #[test]
    fn type_confusion_classification() {
        assert!(ArmoryError::UnknownCategory(EntryType::Mech).is_type_confusion());
        assert!(!ArmoryError::StorageError("disk".into()).is_type_confusion());
    }
}
