//! # armory-core
//!
//! The typed content registry and reference-resolution engine for Armory -
//! THE LOGIC.
//!
//! This crate stores game-rule content (frames, weapons, mods, systems,
//! quirks, pilots, mechs) as raw records and turns them into live, fully
//! linked entries on demand.
//!
//! ## Layers
//!
//! - `types` / `primitives`: entry types, reference tokens, errors, limits
//! - `store`: the `BackingStore` contract plus memory and redb stores
//! - `context` / `entry` / `registry`: single-flight, cycle-safe resolution
//! - `record` / `values` / `content`: raw-record access and the entry kinds
//! - `pack` / `sync`: authored-data conversion and positional re-sync
//! - `formats`: binary archive of a whole registry
//!
//! ## Architectural Constraints
//!
//! - No process-wide state: every operation receives its `Registry` and
//!   `ResolutionContext` explicitly
//! - A context guarantees one live instance per `(type, id)`; it never
//!   extends an entry's lifetime beyond the operation
//! - Not-found references resolve to `None`; only type confusion and store
//!   failures are errors
//! - Async only at the store boundary; the only threads are the blocking
//!   pool `RedbStore` hands its transactions to

// =============================================================================
// MODULES
// =============================================================================

pub mod content;
pub mod context;
pub mod entry;
pub mod formats;
pub mod pack;
pub mod primitives;
pub mod record;
pub mod registry;
pub mod store;
pub mod sync;
pub mod types;
pub mod values;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{ArmoryError, EntryKey, EntryType, RawRecord, RefToken};

// =============================================================================
// RE-EXPORTS: Resolution Engine
// =============================================================================

pub use context::ResolutionContext;
pub use entry::{BackLink, EntryKind, LiveEntry, LiveRef, Loader, Phase};
pub use record::Record;
pub use registry::{Category, Registry, RegistryBuilder};
pub use store::{BackingStore, MemoryStore, RedbStore, SharedStore};

// =============================================================================
// RE-EXPORTS: Content
// =============================================================================

pub use content::{
    EntryBody, Frame, FrameStats, GearState, Mech, MechSystem, Mount, MountType, Pilot, Quirk,
    Weapon, WeaponMod, WeaponProfile, WeaponSize, WeaponSlot,
};
pub use values::{
    Action, Activation, Damage, DamageType, MergePolicy, Range, RangeType, Tag, ValueObject, merge,
};

// =============================================================================
// RE-EXPORTS: Conversion & Sync
// =============================================================================

pub use pack::{FlagReason, StatusPatch, UnpackFlag, UnpackOutcome, pack, unpack};
pub use sync::{Converter, SlotPlan, SyncReport, plan_slots};

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{
    Archive, ArchiveHeader, archive_from_bytes, archive_to_bytes, export_registry,
    restore_registry,
};
