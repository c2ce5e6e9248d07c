//! Pilots and their quirks.

use super::{body_variant, object, refs_value};
use crate::entry::{EntryKind, LiveRef, Loader};
use crate::pack::{Field, FieldShape};
use crate::record::Record;
use crate::{ArmoryError, EntryType, RawRecord};
use async_trait::async_trait;
use serde_json::json;

// =============================================================================
// QUIRK
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quirk {
    pub name: String,
    pub description: String,
}

pub(super) const QUIRK_SCHEMA: &[Field] = &[
    Field::new("name", FieldShape::Text),
    Field::new("description", FieldShape::Text),
];

#[async_trait]
impl EntryKind for Quirk {
    const ENTRY_TYPE: EntryType = EntryType::Quirk;

    fn defaults() -> RawRecord {
        object(json!({"name": "", "description": ""}))
    }

    async fn load(record: Record<'_>, _loader: &Loader<'_>) -> Result<Self, ArmoryError> {
        Ok(Self {
            name: record.text("name"),
            description: record.text("description"),
        })
    }

    fn save(&self) -> RawRecord {
        object(json!({"name": self.name, "description": self.description}))
    }

    body_variant!(Quirk);
}

// =============================================================================
// PILOT
// =============================================================================

/// A pilot owns its mechs; each mech points back through a weak link.
#[derive(Debug, Clone)]
pub struct Pilot {
    pub name: String,
    pub callsign: String,
    pub level: i64,
    pub quirks: Vec<LiveRef>,
    pub mechs: Vec<LiveRef>,
}

impl Pilot {
    /// Position of a mech in this pilot's list.
    #[must_use]
    pub fn mech_index(&self, id: &str) -> Option<usize> {
        self.mechs.iter().position(|mech| mech.id() == id)
    }
}

pub(super) const PILOT_SCHEMA: &[Field] = &[
    Field::new("name", FieldShape::Text),
    Field::new("callsign", FieldShape::Text),
    Field::new("level", FieldShape::Int),
    Field::new("quirks", FieldShape::RefList(EntryType::Quirk)),
    Field::new("mechs", FieldShape::RefList(EntryType::Mech)),
];

#[async_trait]
impl EntryKind for Pilot {
    const ENTRY_TYPE: EntryType = EntryType::Pilot;

    fn defaults() -> RawRecord {
        object(json!({
            "name": "",
            "callsign": "",
            "level": 0,
            "quirks": [],
            "mechs": [],
        }))
    }

    async fn load(record: Record<'_>, loader: &Loader<'_>) -> Result<Self, ArmoryError> {
        let quirks = loader.resolve_many(&record.tokens_of("quirks", EntryType::Quirk)?).await?;
        let mechs = loader.resolve_many(&record.tokens_of("mechs", EntryType::Mech)?).await?;
        Ok(Self {
            name: record.text("name"),
            callsign: record.text("callsign"),
            level: record.int("level"),
            quirks: quirks.into_iter().flatten().collect(),
            mechs: mechs.into_iter().flatten().collect(),
        })
    }

    fn save(&self) -> RawRecord {
        object(json!({
            "name": self.name,
            "callsign": self.callsign,
            "level": self.level,
            "quirks": refs_value(&self.quirks),
            "mechs": refs_value(&self.mechs),
        }))
    }

    body_variant!(Pilot);
}
