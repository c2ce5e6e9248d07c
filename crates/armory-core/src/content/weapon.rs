//! Mountable gear: weapons, weapon mods and systems.

use super::{GearState, body_variant, choice_value, object, values_value};
use crate::entry::{EntryKind, Loader};
use crate::pack::{Field, FieldShape};
use crate::primitives::ORIGIN_FIELD;
use crate::record::Record;
use crate::values::{Action, Damage, Range, Tag, merge};
use crate::{ArmoryError, EntryType, RawRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponSize {
    Aux,
    #[default]
    Main,
    Heavy,
    Superheavy,
}

impl WeaponSize {
    pub const NAMES: &'static [&'static str] = &["aux", "main", "heavy", "superheavy"];
}

// =============================================================================
// WEAPON
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Weapon {
    pub name: String,
    pub source: String,
    pub size: WeaponSize,
    pub damage: Vec<Damage>,
    pub range: Vec<Range>,
    pub tags: Vec<Tag>,
    pub state: GearState,
    /// Source record this placement was installed from.
    pub origin: Option<String>,
}

pub(super) const WEAPON_SCHEMA: &[Field] = &[
    Field::new("name", FieldShape::Text),
    Field::new("source", FieldShape::Text),
    Field::new("size", FieldShape::Choice(WeaponSize::NAMES)),
    Field::new("damage", FieldShape::Values),
    Field::new("range", FieldShape::Values),
    Field::new("tags", FieldShape::Values),
    Field::new("destroyed", FieldShape::Flag),
    Field::new("cascading", FieldShape::Flag),
    Field::new("loaded", FieldShape::Flag),
    Field::new("uses", FieldShape::Int),
];

#[async_trait]
impl EntryKind for Weapon {
    const ENTRY_TYPE: EntryType = EntryType::Weapon;

    fn defaults() -> RawRecord {
        let mut raw = object(json!({
            "name": "",
            "source": "",
            "size": "main",
            "damage": [],
            "range": [],
            "tags": [],
        }));
        GearState::defaults_into(&mut raw);
        raw.insert(ORIGIN_FIELD.to_string(), Value::Null);
        raw
    }

    async fn load(record: Record<'_>, _loader: &Loader<'_>) -> Result<Self, ArmoryError> {
        Ok(Self {
            name: record.text("name"),
            source: record.text("source"),
            size: record.choice("size"),
            damage: record.values("damage"),
            range: record.values("range"),
            tags: record.values("tags"),
            state: GearState::load(&record),
            origin: record.opt_text(ORIGIN_FIELD),
        })
    }

    fn save(&self) -> RawRecord {
        let mut raw = object(json!({
            "name": self.name,
            "source": self.source,
            "size": choice_value(&self.size),
            "damage": values_value(&self.damage),
            "range": values_value(&self.range),
            "tags": values_value(&self.tags),
        }));
        self.state.save_into(&mut raw);
        raw.insert(ORIGIN_FIELD.to_string(), json!(self.origin));
        raw
    }

    body_variant!(Weapon);
}

// =============================================================================
// WEAPON MOD
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct WeaponMod {
    pub name: String,
    pub source: String,
    /// Sizes this mod can be fitted to. Empty means any.
    pub allowed_sizes: Vec<WeaponSize>,
    pub added_damage: Vec<Damage>,
    pub added_range: Vec<Range>,
    pub added_tags: Vec<Tag>,
    pub state: GearState,
    pub origin: Option<String>,
}

impl WeaponMod {
    #[must_use]
    pub fn fits(&self, size: WeaponSize) -> bool {
        self.allowed_sizes.is_empty() || self.allowed_sizes.contains(&size)
    }
}

pub(super) const MOD_SCHEMA: &[Field] = &[
    Field::new("name", FieldShape::Text),
    Field::new("source", FieldShape::Text),
    Field::new("allowed_sizes", FieldShape::Values),
    Field::new("added_damage", FieldShape::Values),
    Field::new("added_range", FieldShape::Values),
    Field::new("added_tags", FieldShape::Values),
    Field::new("destroyed", FieldShape::Flag),
    Field::new("cascading", FieldShape::Flag),
    Field::new("loaded", FieldShape::Flag),
    Field::new("uses", FieldShape::Int),
];

#[async_trait]
impl EntryKind for WeaponMod {
    const ENTRY_TYPE: EntryType = EntryType::WeaponMod;

    fn defaults() -> RawRecord {
        let mut raw = object(json!({
            "name": "",
            "source": "",
            "allowed_sizes": [],
            "added_damage": [],
            "added_range": [],
            "added_tags": [],
        }));
        GearState::defaults_into(&mut raw);
        raw.insert(ORIGIN_FIELD.to_string(), Value::Null);
        raw
    }

    async fn load(record: Record<'_>, _loader: &Loader<'_>) -> Result<Self, ArmoryError> {
        Ok(Self {
            name: record.text("name"),
            source: record.text("source"),
            allowed_sizes: record.values("allowed_sizes"),
            added_damage: record.values("added_damage"),
            added_range: record.values("added_range"),
            added_tags: record.values("added_tags"),
            state: GearState::load(&record),
            origin: record.opt_text(ORIGIN_FIELD),
        })
    }

    fn save(&self) -> RawRecord {
        let mut raw = object(json!({
            "name": self.name,
            "source": self.source,
            "allowed_sizes": values_value(&self.allowed_sizes),
            "added_damage": values_value(&self.added_damage),
            "added_range": values_value(&self.added_range),
            "added_tags": values_value(&self.added_tags),
        }));
        self.state.save_into(&mut raw);
        raw.insert(ORIGIN_FIELD.to_string(), json!(self.origin));
        raw
    }

    body_variant!(WeaponMod);
}

// =============================================================================
// SYSTEM
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MechSystem {
    pub name: String,
    pub source: String,
    /// System point cost.
    pub sp: i64,
    pub tags: Vec<Tag>,
    pub actions: Vec<Action>,
    pub state: GearState,
    pub origin: Option<String>,
}

pub(super) const SYSTEM_SCHEMA: &[Field] = &[
    Field::new("name", FieldShape::Text),
    Field::new("source", FieldShape::Text),
    Field::new("sp", FieldShape::Int),
    Field::new("tags", FieldShape::Values),
    Field::new("actions", FieldShape::Values),
    Field::new("destroyed", FieldShape::Flag),
    Field::new("cascading", FieldShape::Flag),
    Field::new("loaded", FieldShape::Flag),
    Field::new("uses", FieldShape::Int),
];

#[async_trait]
impl EntryKind for MechSystem {
    const ENTRY_TYPE: EntryType = EntryType::System;

    fn defaults() -> RawRecord {
        let mut raw = object(json!({
            "name": "",
            "source": "",
            "sp": 0,
            "tags": [],
            "actions": [],
        }));
        GearState::defaults_into(&mut raw);
        raw.insert(ORIGIN_FIELD.to_string(), Value::Null);
        raw
    }

    async fn load(record: Record<'_>, _loader: &Loader<'_>) -> Result<Self, ArmoryError> {
        Ok(Self {
            name: record.text("name"),
            source: record.text("source"),
            sp: record.int("sp"),
            tags: record.values("tags"),
            actions: record.values("actions"),
            state: GearState::load(&record),
            origin: record.opt_text(ORIGIN_FIELD),
        })
    }

    fn save(&self) -> RawRecord {
        let mut raw = object(json!({
            "name": self.name,
            "source": self.source,
            "sp": self.sp,
            "tags": values_value(&self.tags),
            "actions": values_value(&self.actions),
        }));
        self.state.save_into(&mut raw);
        raw.insert(ORIGIN_FIELD.to_string(), json!(self.origin));
        raw
    }

    body_variant!(System);
}

// =============================================================================
// PROFILE
// =============================================================================

/// Combined damage, range and tags of a weapon with its mod fitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeaponProfile {
    pub damage: Vec<Damage>,
    pub range: Vec<Range>,
    pub tags: Vec<Tag>,
}

impl WeaponProfile {
    /// Merge a weapon with an optional mod using each value kind's policy.
    ///
    /// A destroyed mod, or one that does not fit the weapon's size,
    /// contributes nothing.
    #[must_use]
    pub fn of(weapon: &Weapon, weapon_mod: Option<&WeaponMod>) -> Self {
        let weapon_mod = weapon_mod.filter(|m| !m.state.destroyed && m.fits(weapon.size));
        let (damage, range, tags) = match weapon_mod {
            Some(m) => (
                merge(weapon.damage.iter().chain(&m.added_damage).cloned()),
                merge(weapon.range.iter().chain(&m.added_range).cloned()),
                merge(weapon.tags.iter().chain(&m.added_tags).cloned()),
            ),
            None => (
                merge(weapon.damage.iter().cloned()),
                merge(weapon.range.iter().cloned()),
                merge(weapon.tags.iter().cloned()),
            ),
        };
        Self {
            damage,
            range,
            tags,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::{DamageType, RangeType};

    fn rifle() -> Weapon {
        Weapon {
            name: "Assault Rifle".into(),
            source: "GMS".into(),
            size: WeaponSize::Main,
            damage: vec![Damage::new(DamageType::Kinetic, 4)],
            range: vec![Range::new(RangeType::Range, 10)],
            tags: vec![Tag::new("tg_reliable", Some(2))],
            state: GearState::default(),
            origin: None,
        }
    }

    fn nanocomposite() -> WeaponMod {
        WeaponMod {
            name: "Nanocomposite Adaptation".into(),
            source: "SSC".into(),
            allowed_sizes: vec![WeaponSize::Main, WeaponSize::Aux],
            added_damage: vec![Damage::new(DamageType::Kinetic, 1)],
            added_range: vec![Range::new(RangeType::Range, 5)],
            added_tags: vec![Tag::new("tg_smart", None), Tag::new("tg_reliable", Some(1))],
            state: GearState::default(),
            origin: None,
        }
    }

    #[test]
    fn profile_merges_mod_values() {
        let profile = WeaponProfile::of(&rifle(), Some(&nanocomposite()));

        assert_eq!(profile.damage, vec![Damage::new(DamageType::Kinetic, 5)]);
        assert_eq!(profile.range, vec![Range::new(RangeType::Range, 10)]);
        assert_eq!(
            profile.tags,
            vec![Tag::new("tg_reliable", Some(2)), Tag::new("tg_smart", None)]
        );
    }

    #[test]
    fn destroyed_or_ill_fitting_mod_is_ignored() {
        let mut broken = nanocomposite();
        broken.state.destroyed = true;
        assert_eq!(WeaponProfile::of(&rifle(), Some(&broken)).damage[0].val, 4);

        let mut heavy = rifle();
        heavy.size = WeaponSize::Heavy;
        assert_eq!(
            WeaponProfile::of(&heavy, Some(&nanocomposite())).damage[0].val,
            4
        );
    }

    #[test]
    fn weapon_defaults_are_loaded_and_intact() {
        let defaults = Weapon::defaults();
        assert_eq!(defaults.get("loaded"), Some(&json!(true)));
        assert_eq!(defaults.get("destroyed"), Some(&json!(false)));
        assert_eq!(defaults.get("size"), Some(&json!("main")));
        assert_eq!(defaults.get("origin"), Some(&Value::Null));
    }

    #[test]
    fn origin_survives_save() {
        let mut weapon = rifle();
        weapon.origin = Some("w1".into());
        assert_eq!(weapon.save().get("origin"), Some(&json!("w1")));
        assert_eq!(rifle().save().get("origin"), Some(&Value::Null));
    }
}
