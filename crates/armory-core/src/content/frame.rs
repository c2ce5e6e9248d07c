//! Mech frames: the chassis a mech is built on.

use super::{body_variant, object, refs_value, values_value};
use crate::entry::{EntryKind, LiveRef, Loader};
use crate::pack::{Field, FieldShape};
use crate::record::Record;
use crate::values::Action;
use crate::{ArmoryError, EntryType, RawRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Mount slot layout offered by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountType {
    #[default]
    Main,
    Heavy,
    Aux,
    AuxAux,
    MainAux,
    Flex,
    Integrated,
}

impl MountType {
    pub const NAMES: &'static [&'static str] = &[
        "main",
        "heavy",
        "aux",
        "aux_aux",
        "main_aux",
        "flex",
        "integrated",
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FrameStats {
    pub hp: i64,
    pub heat_cap: i64,
    pub armor: i64,
    pub evasion: i64,
    pub speed: i64,
    pub size: i64,
}

impl FrameStats {
    fn load(record: &Record<'_>) -> Self {
        Self {
            hp: record.int("hp"),
            heat_cap: record.int("heat_cap"),
            armor: record.int("armor"),
            evasion: record.int("evasion"),
            speed: record.int("speed"),
            size: record.int("size"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub name: String,
    pub source: String,
    pub stats: FrameStats,
    pub mounts: Vec<MountType>,
    pub traits: Vec<Action>,
    /// Gear built into the frame. Mixed types; missing targets are dropped.
    pub integrated: Vec<LiveRef>,
}

const STATS_SCHEMA: &[Field] = &[
    Field::new("hp", FieldShape::Int),
    Field::new("heat_cap", FieldShape::Int),
    Field::new("armor", FieldShape::Int),
    Field::new("evasion", FieldShape::Int),
    Field::new("speed", FieldShape::Int),
    Field::new("size", FieldShape::Int),
];

pub(super) const SCHEMA: &[Field] = &[
    Field::new("name", FieldShape::Text),
    Field::new("source", FieldShape::Text),
    Field::new("stats", FieldShape::Nested(STATS_SCHEMA)),
    Field::new("mounts", FieldShape::Values),
    Field::new("traits", FieldShape::Values),
    Field::new("integrated", FieldShape::AnyRefList),
];

#[async_trait]
impl EntryKind for Frame {
    const ENTRY_TYPE: EntryType = EntryType::Frame;

    fn defaults() -> RawRecord {
        object(json!({
            "name": "",
            "source": "",
            "stats": {
                "hp": 10,
                "heat_cap": 6,
                "armor": 0,
                "evasion": 8,
                "speed": 4,
                "size": 1,
            },
            "mounts": ["main"],
            "traits": [],
            "integrated": [],
        }))
    }

    async fn load(record: Record<'_>, loader: &Loader<'_>) -> Result<Self, ArmoryError> {
        let integrated = loader
            .resolve_many_rough(&record.tokens("integrated")?)
            .await?;
        Ok(Self {
            name: record.text("name"),
            source: record.text("source"),
            stats: FrameStats::load(&record.nested("stats")),
            mounts: record.values("mounts"),
            traits: record.values("traits"),
            integrated,
        })
    }

    fn save(&self) -> RawRecord {
        object(json!({
            "name": self.name,
            "source": self.source,
            "stats": self.stats,
            "mounts": values_value(&self.mounts),
            "traits": values_value(&self.traits),
            "integrated": refs_value(&self.integrated),
        }))
    }

    body_variant!(Frame);
}
