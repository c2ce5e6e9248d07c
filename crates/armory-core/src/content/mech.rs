//! Mechs: a frame plus mounted gear, owned by a pilot.
//!
//! A mech's loadout is positional. Mounts hold weapon slots, each slot holds
//! at most one weapon and one mod; systems form a flat list. Re-sync matches
//! gear by position, so the paths below are stable names for each position.

use super::{
    MountType, Weapon, WeaponMod, WeaponProfile, WeaponSize, body_variant, choice_value, object,
    ref_value, refs_value,
};
use crate::entry::{BackLink, EntryKind, LiveRef, Loader};
use crate::pack::{Field, FieldShape};
use crate::record::Record;
use crate::{ArmoryError, EntryType, RawRecord};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Status path of a slot's weapon or mod (`field` is `weapon` or `mod`).
#[must_use]
pub fn slot_path(mount: usize, slot: usize, field: &str) -> String {
    format!("mounts[{mount}].slots[{slot}].{field}")
}

/// Status path of a system position.
#[must_use]
pub fn system_path(index: usize) -> String {
    format!("systems[{index}]")
}

// =============================================================================
// LOADOUT
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct WeaponSlot {
    pub size: WeaponSize,
    pub weapon: Option<LiveRef>,
    pub weapon_mod: Option<LiveRef>,
}

impl WeaponSlot {
    /// Merged profile of the mounted weapon and mod.
    #[must_use]
    pub fn profile(&self) -> Option<WeaponProfile> {
        let weapon = self.weapon.as_ref()?.view::<Weapon, _>(Clone::clone)?;
        let weapon_mod = self
            .weapon_mod
            .as_ref()
            .and_then(|entry| entry.view::<WeaponMod, _>(Clone::clone));
        Some(WeaponProfile::of(&weapon, weapon_mod.as_ref()))
    }

    fn save(&self) -> Value {
        json!({
            "size": choice_value(&self.size),
            "weapon": ref_value(self.weapon.as_ref()),
            "mod": ref_value(self.weapon_mod.as_ref()),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Mount {
    pub mount_type: MountType,
    pub slots: Vec<WeaponSlot>,
}

impl Mount {
    fn save(&self) -> Value {
        json!({
            "mount_type": choice_value(&self.mount_type),
            "slots": self.slots.iter().map(WeaponSlot::save).collect::<Vec<_>>(),
        })
    }
}

// =============================================================================
// MECH
// =============================================================================

#[derive(Debug, Clone)]
pub struct Mech {
    pub name: String,
    pub frame: Option<LiveRef>,
    /// Owner back-edge; does not keep the pilot alive.
    pub pilot: Option<BackLink>,
    pub hp: i64,
    pub heat: i64,
    pub mounts: Vec<Mount>,
    pub systems: Vec<LiveRef>,
}

impl Mech {
    /// Every mounted piece of gear with its status path.
    #[must_use]
    pub fn gear(&self) -> Vec<(String, LiveRef)> {
        let mut gear = Vec::new();
        for (m, mount) in self.mounts.iter().enumerate() {
            for (s, slot) in mount.slots.iter().enumerate() {
                if let Some(weapon) = &slot.weapon {
                    gear.push((slot_path(m, s, "weapon"), weapon.clone()));
                }
                if let Some(weapon_mod) = &slot.weapon_mod {
                    gear.push((slot_path(m, s, "mod"), weapon_mod.clone()));
                }
            }
        }
        for (i, system) in self.systems.iter().enumerate() {
            gear.push((system_path(i), system.clone()));
        }
        gear
    }

    /// Merged profiles of every armed slot, in mount order.
    #[must_use]
    pub fn weapon_profiles(&self) -> Vec<WeaponProfile> {
        self.mounts
            .iter()
            .flat_map(|mount| &mount.slots)
            .filter_map(WeaponSlot::profile)
            .collect()
    }
}

const SLOT_SCHEMA: &[Field] = &[
    Field::new("size", FieldShape::Choice(WeaponSize::NAMES)),
    Field::new("weapon", FieldShape::Ref(EntryType::Weapon)),
    Field::new("mod", FieldShape::Ref(EntryType::WeaponMod)),
];

const MOUNT_SCHEMA: &[Field] = &[
    Field::new("mount_type", FieldShape::Choice(MountType::NAMES)),
    Field::new("slots", FieldShape::NestedList(SLOT_SCHEMA)),
];

pub(super) const SCHEMA: &[Field] = &[
    Field::new("name", FieldShape::Text),
    Field::new("frame", FieldShape::Ref(EntryType::Frame)),
    Field::new("pilot", FieldShape::Ref(EntryType::Pilot)),
    Field::new("hp", FieldShape::Int),
    Field::new("heat", FieldShape::Int),
    Field::new("mounts", FieldShape::NestedList(MOUNT_SCHEMA)),
    Field::new("systems", FieldShape::RefList(EntryType::System)),
];

fn mount_defaults() -> RawRecord {
    object(json!({"mount_type": "main", "slots": []}))
}

fn slot_defaults() -> RawRecord {
    object(json!({"size": "main", "weapon": null, "mod": null}))
}

#[async_trait]
impl EntryKind for Mech {
    const ENTRY_TYPE: EntryType = EntryType::Mech;

    fn defaults() -> RawRecord {
        object(json!({
            "name": "",
            "frame": null,
            "pilot": null,
            "hp": 0,
            "heat": 0,
            "mounts": [],
            "systems": [],
        }))
    }

    async fn load(record: Record<'_>, loader: &Loader<'_>) -> Result<Self, ArmoryError> {
        let frame = loader.resolve_opt(record.token_of("frame", EntryType::Frame)?.as_ref()).await?;
        let pilot = match record.token_of("pilot", EntryType::Pilot)? {
            Some(token) => Some(loader.back_link(token).await?),
            None => None,
        };

        let mount_defaults = mount_defaults();
        let slot_defaults = slot_defaults();
        let mut mounts = Vec::new();
        for mount in record.items("mounts", &mount_defaults) {
            let mut slots = Vec::new();
            for slot in mount.items("slots", &slot_defaults) {
                slots.push(WeaponSlot {
                    size: slot.choice("size"),
                    weapon: loader.resolve_opt(slot.token_of("weapon", EntryType::Weapon)?.as_ref()).await?,
                    weapon_mod: loader.resolve_opt(slot.token_of("mod", EntryType::WeaponMod)?.as_ref()).await?,
                });
            }
            mounts.push(Mount {
                mount_type: mount.choice("mount_type"),
                slots,
            });
        }

        let systems = loader.resolve_many(&record.tokens_of("systems", EntryType::System)?).await?;

        Ok(Self {
            name: record.text("name"),
            frame,
            pilot,
            hp: record.int("hp"),
            heat: record.int("heat"),
            mounts,
            systems: systems.into_iter().flatten().collect(),
        })
    }

    fn save(&self) -> RawRecord {
        object(json!({
            "name": self.name,
            "frame": ref_value(self.frame.as_ref()),
            "pilot": self
                .pilot
                .as_ref()
                .map_or(Value::Null, |link| link.token().to_value()),
            "hp": self.hp,
            "heat": self.heat,
            "mounts": self.mounts.iter().map(Mount::save).collect::<Vec<_>>(),
            "systems": refs_value(&self.systems),
        }))
    }

    body_variant!(Mech);
}
