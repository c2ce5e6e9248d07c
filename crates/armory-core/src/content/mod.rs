//! # Content
//!
//! The closed set of concrete entry kinds, and the tagged `EntryBody` that
//! holds one of them inside a live entry.
//!
//! Kinds carry only what the engine needs to exercise resolution: scalar
//! fields, value objects, references (single, list, heterogeneous) and one
//! owner back-edge. No rules math lives here.
//!
//! | Tag | Kind | References |
//! |-----|------|------------|
//! | `frame` | `Frame` | integrated gear (any type) |
//! | `weapon` | `Weapon` | - |
//! | `weapon_mod` | `WeaponMod` | - |
//! | `system` | `MechSystem` | - |
//! | `quirk` | `Quirk` | - |
//! | `pilot` | `Pilot` | quirks, mechs |
//! | `mech` | `Mech` | frame, pilot (back-edge), mounted gear |

mod frame;
mod mech;
mod pilot;
mod weapon;

pub use frame::{Frame, FrameStats, MountType};
pub use mech::{Mech, Mount, WeaponSlot, slot_path, system_path};
pub use pilot::{Pilot, Quirk};
pub use weapon::{MechSystem, Weapon, WeaponMod, WeaponProfile, WeaponSize};

use crate::entry::{EntryKind, LiveRef, Loader};
use crate::pack::Field;
use crate::record::{Record, tokens_to_value};
use crate::{ArmoryError, EntryType, RawRecord};
use serde::Serialize;
use serde_json::Value;

// =============================================================================
// ENTRY BODY
// =============================================================================

/// The loaded state of a live entry, one variant per entry type.
#[derive(Debug, Clone)]
pub enum EntryBody {
    Frame(Frame),
    Weapon(Weapon),
    WeaponMod(WeaponMod),
    System(MechSystem),
    Quirk(Quirk),
    Pilot(Pilot),
    Mech(Mech),
}

impl EntryBody {
    /// Load the variant selected by `entry_type` from a raw record.
    pub(crate) async fn load(
        entry_type: EntryType,
        raw: &RawRecord,
        loader: &Loader<'_>,
    ) -> Result<Self, ArmoryError> {
        match entry_type {
            EntryType::Frame => load_as::<Frame>(raw, loader).await,
            EntryType::Weapon => load_as::<Weapon>(raw, loader).await,
            EntryType::WeaponMod => load_as::<WeaponMod>(raw, loader).await,
            EntryType::System => load_as::<MechSystem>(raw, loader).await,
            EntryType::Quirk => load_as::<Quirk>(raw, loader).await,
            EntryType::Pilot => load_as::<Pilot>(raw, loader).await,
            EntryType::Mech => load_as::<Mech>(raw, loader).await,
        }
    }

    #[must_use]
    pub fn entry_type(&self) -> EntryType {
        match self {
            Self::Frame(_) => EntryType::Frame,
            Self::Weapon(_) => EntryType::Weapon,
            Self::WeaponMod(_) => EntryType::WeaponMod,
            Self::System(_) => EntryType::System,
            Self::Quirk(_) => EntryType::Quirk,
            Self::Pilot(_) => EntryType::Pilot,
            Self::Mech(_) => EntryType::Mech,
        }
    }

    /// Serialize to a raw record (without the id field).
    #[must_use]
    pub fn save(&self) -> RawRecord {
        match self {
            Self::Frame(v) => v.save(),
            Self::Weapon(v) => v.save(),
            Self::WeaponMod(v) => v.save(),
            Self::System(v) => v.save(),
            Self::Quirk(v) => v.save(),
            Self::Pilot(v) => v.save(),
            Self::Mech(v) => v.save(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Frame(v) => &v.name,
            Self::Weapon(v) => &v.name,
            Self::WeaponMod(v) => &v.name,
            Self::System(v) => &v.name,
            Self::Quirk(v) => &v.name,
            Self::Pilot(v) => &v.name,
            Self::Mech(v) => &v.name,
        }
    }

    /// Runtime status of mountable gear. `None` for other kinds.
    #[must_use]
    pub fn gear_state(&self) -> Option<&GearState> {
        match self {
            Self::Weapon(v) => Some(&v.state),
            Self::WeaponMod(v) => Some(&v.state),
            Self::System(v) => Some(&v.state),
            _ => None,
        }
    }

    /// Id of the source record a gear placement was installed from.
    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        match self {
            Self::Weapon(v) => v.origin.as_deref(),
            Self::WeaponMod(v) => v.origin.as_deref(),
            Self::System(v) => v.origin.as_deref(),
            _ => None,
        }
    }

    pub fn gear_state_mut(&mut self) -> Option<&mut GearState> {
        match self {
            Self::Weapon(v) => Some(&mut v.state),
            Self::WeaponMod(v) => Some(&mut v.state),
            Self::System(v) => Some(&mut v.state),
            _ => None,
        }
    }
}

async fn load_as<T: EntryKind>(raw: &RawRecord, loader: &Loader<'_>) -> Result<EntryBody, ArmoryError> {
    let defaults = T::defaults();
    let value = T::load(Record::new(raw, &defaults), loader).await?;
    Ok(value.into_body())
}

/// Default record for an entry type.
#[must_use]
pub fn defaults(entry_type: EntryType) -> RawRecord {
    match entry_type {
        EntryType::Frame => Frame::defaults(),
        EntryType::Weapon => Weapon::defaults(),
        EntryType::WeaponMod => WeaponMod::defaults(),
        EntryType::System => MechSystem::defaults(),
        EntryType::Quirk => Quirk::defaults(),
        EntryType::Pilot => Pilot::defaults(),
        EntryType::Mech => Mech::defaults(),
    }
}

/// Authored-data schema for an entry type.
#[must_use]
pub fn schema(entry_type: EntryType) -> &'static [Field] {
    match entry_type {
        EntryType::Frame => frame::SCHEMA,
        EntryType::Weapon => weapon::WEAPON_SCHEMA,
        EntryType::WeaponMod => weapon::MOD_SCHEMA,
        EntryType::System => weapon::SYSTEM_SCHEMA,
        EntryType::Quirk => pilot::QUIRK_SCHEMA,
        EntryType::Pilot => pilot::PILOT_SCHEMA,
        EntryType::Mech => mech::SCHEMA,
    }
}

/// Generates the `EntryBody` conversions of an `EntryKind` impl.
macro_rules! body_variant {
    ($variant:ident) => {
        fn into_body(self) -> $crate::content::EntryBody {
            $crate::content::EntryBody::$variant(self)
        }

        fn from_body(body: &$crate::content::EntryBody) -> Option<&Self> {
            match body {
                $crate::content::EntryBody::$variant(v) => Some(v),
                _ => None,
            }
        }

        fn from_body_mut(body: &mut $crate::content::EntryBody) -> Option<&mut Self> {
            match body {
                $crate::content::EntryBody::$variant(v) => Some(v),
                _ => None,
            }
        }
    };
}
use body_variant;

// =============================================================================
// GEAR STATE
// =============================================================================

/// Runtime status carried by mountable gear.
///
/// This is the state a positional re-sync must preserve: authored data
/// usually omits it, and only the fields it does carry are overlaid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GearState {
    pub destroyed: bool,
    pub cascading: bool,
    pub loaded: bool,
    pub uses: i64,
}

impl Default for GearState {
    fn default() -> Self {
        Self {
            destroyed: false,
            cascading: false,
            loaded: true,
            uses: 0,
        }
    }
}

impl GearState {
    /// Field names of the status overlay, in record order.
    pub const FIELDS: [&'static str; 4] = ["destroyed", "cascading", "loaded", "uses"];

    fn load(record: &Record<'_>) -> Self {
        Self {
            destroyed: record.flag("destroyed"),
            cascading: record.flag("cascading"),
            loaded: record.flag("loaded"),
            uses: record.int("uses"),
        }
    }

    fn save_into(&self, raw: &mut RawRecord) {
        raw.insert("destroyed".into(), self.destroyed.into());
        raw.insert("cascading".into(), self.cascading.into());
        raw.insert("loaded".into(), self.loaded.into());
        raw.insert("uses".into(), self.uses.into());
    }

    fn defaults_into(raw: &mut RawRecord) {
        Self::default().save_into(raw);
    }
}

// =============================================================================
// SAVE HELPERS
// =============================================================================

fn object(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        _ => RawRecord::new(),
    }
}

fn ref_value(entry: Option<&LiveRef>) -> Value {
    entry.map_or(Value::Null, |e| e.to_ref().to_value())
}

fn refs_value(entries: &[LiveRef]) -> Value {
    tokens_to_value(entries.iter().map(|e| e.to_ref()))
}

fn values_value<V: Serialize>(values: &[V]) -> Value {
    serde_json::to_value(values).unwrap_or_else(|_| Value::Array(Vec::new()))
}

fn choice_value<T: Serialize>(choice: &T) -> Value {
    serde_json::to_value(choice).unwrap_or(Value::Null)
}
