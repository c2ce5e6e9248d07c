//! # Sync
//!
//! Reconciliation of freshly imported packed data against entries that are
//! already live, and first-time import of packed data.
//!
//! A `Converter` works between two registries:
//! - *home*: where live entries are written back (a roster)
//! - *source*: where fresh content is resolved from (a compendium)
//!
//! Re-sync is positional. For every sub-slot the old and new ids are
//! compared by `plan_slots`:
//!
//! | Old | New | Plan | Effect |
//! |-----|-----|------|--------|
//! | a | a | `Keep` | same instance; authored status overlaid; written back |
//! | a | b | `Replace` | fresh copy of `b` from the source, adopted into home |
//! | - | b | `Replace` | as above |
//! | a | - | `Clear` | slot emptied |
//! | - | - | `Vacant` | nothing |
//!
//! Runtime state that the packed data does not carry (destroyed flags, use
//! counters) therefore survives a re-sync of unchanged gear, and is
//! discarded only when the gear itself changes.
//!
//! Gear (weapons, mods and systems) is installed per placement: every
//! mounted item gets its own home row under a fresh id, with the source id
//! kept in its `origin` field. Slots are compared by origin, and two mechs
//! carrying the same source weapon never share a row.

use crate::content::{
    Mech, Mount, MountType, Pilot, WeaponSize, WeaponSlot, slot_path, system_path,
};
use crate::context::ResolutionContext;
use crate::entry::{BackLink, LiveRef};
use crate::pack::{StatusPatch, UnpackFlag, unpack};
use crate::primitives::{ID_FIELD, MAX_IMPORT_DEPTH, ORIGIN_FIELD};
use crate::record::{collect_tokens, parse_token};
use crate::registry::Registry;
use crate::{ArmoryError, EntryType, RawRecord, RefToken};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

// =============================================================================
// PLAN
// =============================================================================

/// What to do with one positional slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotPlan {
    /// Empty before and after.
    Vacant,
    /// Same id: keep the existing instance.
    Keep,
    /// New or different id: resolve fresh and replace.
    Replace(String),
    /// Occupied before, empty now.
    Clear,
}

/// Diff old and new slot ids by position.
///
/// The plan covers every position of the longer list; positions past the
/// end of `new` are treated as empty.
#[must_use]
pub fn plan_slots(old: &[Option<&str>], new: &[Option<&str>]) -> Vec<SlotPlan> {
    let len = old.len().max(new.len());
    (0..len)
        .map(|i| {
            let before = old.get(i).copied().flatten();
            let after = new.get(i).copied().flatten();
            match (before, after) {
                (None, None) => SlotPlan::Vacant,
                (Some(a), Some(b)) if a == b => SlotPlan::Keep,
                (_, Some(b)) => SlotPlan::Replace(b.to_string()),
                (Some(_), None) => SlotPlan::Clear,
            }
        })
        .collect()
}

// =============================================================================
// REPORT
// =============================================================================

/// Counts of what a sync or import did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub kept: usize,
    pub replaced: usize,
    pub cleared: usize,
    /// Replacements whose target is missing from the source.
    pub missing: usize,
    /// Top-level entries created.
    pub imported: usize,
    /// Mechs dropped from a pilot.
    pub detached: usize,
    /// Shared rows copied from source to home.
    pub copied: usize,
    /// Gear placements created from source records.
    pub installed: usize,
    pub flags: Vec<UnpackFlag>,
}

impl SyncReport {
    fn absorb(&mut self, other: SyncReport) {
        self.kept += other.kept;
        self.replaced += other.replaced;
        self.cleared += other.cleared;
        self.missing += other.missing;
        self.imported += other.imported;
        self.detached += other.detached;
        self.copied += other.copied;
        self.installed += other.installed;
        self.flags.extend(other.flags);
    }
}

// =============================================================================
// CONVERTER
// =============================================================================

/// Imports and re-syncs packed data from a source registry into a home one.
#[derive(Debug, Clone)]
pub struct Converter {
    home: Registry,
    source: Registry,
}

/// Per-operation state threaded through one sync.
struct SyncRun<'a> {
    ctx: &'a ResolutionContext,
    statuses: &'a BTreeMap<String, StatusPatch>,
    report: SyncReport,
}

impl Converter {
    #[must_use]
    pub fn new(home: Registry, source: Registry) -> Self {
        Self { home, source }
    }

    #[must_use]
    pub fn home(&self) -> &Registry {
        &self.home
    }

    #[must_use]
    pub fn source(&self) -> &Registry {
        &self.source
    }

    // =========================================================================
    // IMPORT
    // =========================================================================

    /// Import a packed record as a new home entry.
    ///
    /// Mounted gear is installed as new placements, and every other record
    /// the entry references, directly or transitively, is copied from the
    /// source first, so the new entry resolves completely inside home.
    /// Authored status overlays are applied afterwards.
    pub async fn import(
        &self,
        ctx: &ResolutionContext,
        entry_type: EntryType,
        packed: &RawRecord,
    ) -> Result<(LiveRef, SyncReport), ArmoryError> {
        let outcome = unpack(entry_type, packed)?;
        let mut report = SyncReport {
            flags: outcome.flags.clone(),
            ..SyncReport::default()
        };

        let mut record = outcome.record;
        let mut pending = Vec::new();
        if entry_type == EntryType::Mech {
            pending = self.localize_gear(&mut record, &mut report).await?;
        }
        pending.extend(tokens_in(&record)?);
        self.copy_closure(pending, &mut report).await?;
        let entry = self.home.create_live(ctx, entry_type, record).await?;
        report.imported = 1;

        let gear = entry.view::<Mech, _>(Mech::gear).unwrap_or_default();
        for (path, item) in gear {
            if let Some(patch) = outcome.statuses.get(&path) {
                if overlay(&item, patch) {
                    item.writeback(&self.home).await?;
                }
            }
        }

        tracing::info!(
            key = %entry.key(),
            copied = report.copied,
            installed = report.installed,
            flags = report.flags.len(),
            "imported entry"
        );
        Ok((entry, report))
    }

    /// Copy the transitive closure of `tokens` from source to home.
    ///
    /// Rows already present in home are left alone and not walked into.
    /// Gear mounted on a copied mech is installed rather than shared.
    async fn copy_closure(
        &self,
        tokens: Vec<RefToken>,
        report: &mut SyncReport,
    ) -> Result<(), ArmoryError> {
        let mut visited = BTreeSet::new();
        let mut frontier = tokens;

        for _ in 0..MAX_IMPORT_DEPTH {
            if frontier.is_empty() {
                return Ok(());
            }
            let mut next = Vec::new();
            for token in frontier {
                let key = token.key();
                if !visited.insert(key.clone()) {
                    continue;
                }
                let home = self.home.category(key.entry_type)?;
                if home.store().contains(key.entry_type, &key.id).await? {
                    continue;
                }
                let Some(mut row) = self.source_row(&token).await? else {
                    continue;
                };
                if key.entry_type == EntryType::Mech {
                    next.extend(self.localize_gear(&mut row, report).await?);
                }
                for value in row.values() {
                    collect_tokens(value, &mut next)?;
                }
                home.store().put(key.entry_type, &key.id, &row).await?;
                report.copied += 1;
            }
            frontier = next;
        }

        if !frontier.is_empty() {
            tracing::warn!(
                remaining = frontier.len(),
                depth = MAX_IMPORT_DEPTH,
                "reference closure truncated"
            );
        }
        Ok(())
    }

    /// Raw source row for `token`, warning when it is absent.
    async fn source_row(&self, token: &RefToken) -> Result<Option<RawRecord>, ArmoryError> {
        let source = self.source.category(token.entry_type())?;
        let row = source.store().get(token.entry_type(), token.id()).await?;
        if row.is_none() {
            tracing::warn!(
                key = %token.key(),
                fallback = token.fallback().unwrap_or("-"),
                "referenced record missing from source"
            );
        }
        Ok(row)
    }

    /// Install one gear placement: copy the source row to home under a
    /// fresh id, recording the source id as its origin.
    ///
    /// Returns the token of the new row and the references the row carries.
    async fn install(
        &self,
        token: &RefToken,
    ) -> Result<Option<(RefToken, Vec<RefToken>)>, ArmoryError> {
        let Some(mut row) = self.source_row(token).await? else {
            return Ok(None);
        };
        row.remove(ID_FIELD);
        let origin = row
            .get(ORIGIN_FIELD)
            .and_then(Value::as_str)
            .unwrap_or(token.id())
            .to_string();
        row.insert(ORIGIN_FIELD.to_string(), Value::from(origin));

        let mut local = RefToken::new(token.entry_type(), uuid::Uuid::new_v4().to_string());
        if let Some(fallback) = token.fallback() {
            local = local.with_fallback(fallback);
        }
        let refs = tokens_in(&row)?;
        let home = self.home.category(token.entry_type())?;
        home.store().put(token.entry_type(), local.id(), &row).await?;
        tracing::debug!(origin = %token.key(), key = %local.key(), "installed gear");
        Ok(Some((local, refs)))
    }

    /// Install every gear reference in a mech record and point the record
    /// at the new placements.
    ///
    /// References the source cannot satisfy are left as they are. Returns
    /// the references carried by the installed rows.
    async fn localize_gear(
        &self,
        record: &mut RawRecord,
        report: &mut SyncReport,
    ) -> Result<Vec<RefToken>, ArmoryError> {
        let mut refs = Vec::new();
        for value in gear_values(record) {
            let Some(token) = parse_token(value)? else {
                continue;
            };
            if !is_gear(token.entry_type()) {
                continue;
            }
            if let Some((local, carried)) = self.install(&token).await? {
                *value = local.to_value();
                refs.extend(carried);
                report.installed += 1;
            }
        }
        Ok(refs)
    }

    /// Bring a replacement target into home as a new instance.
    ///
    /// Gear is installed as a new placement. Anything else is copied from
    /// the source and created under its own id, replacing the home row and
    /// whatever `ctx` held under that key. Nothing already live is reused.
    async fn adopt(
        &self,
        run: &mut SyncRun<'_>,
        token: &RefToken,
    ) -> Result<Option<LiveRef>, ArmoryError> {
        let entry_type = token.entry_type();
        if is_gear(entry_type) {
            let Some((local, refs)) = self.install(token).await? else {
                return Ok(None);
            };
            run.report.installed += 1;
            self.copy_closure(refs, &mut run.report).await?;
            return self.home.resolve(run.ctx, &local).await;
        }

        let Some(mut row) = self.source_row(token).await? else {
            return Ok(None);
        };
        let mut pending = Vec::new();
        if entry_type == EntryType::Mech {
            pending = self.localize_gear(&mut row, &mut run.report).await?;
        }
        pending.extend(tokens_in(&row)?);
        self.copy_closure(pending, &mut run.report).await?;
        row.insert(ID_FIELD.to_string(), Value::from(token.id()));
        let entry = self.home.create_live(run.ctx, entry_type, row).await?;
        Ok(Some(entry))
    }

    /// Carry out one slot plan.
    async fn apply_plan(
        &self,
        run: &mut SyncRun<'_>,
        plan: &SlotPlan,
        old: Option<&LiveRef>,
        new: Option<&RefToken>,
        path: &str,
    ) -> Result<Option<LiveRef>, ArmoryError> {
        match (plan, old, new) {
            (SlotPlan::Keep, Some(entry), _) => {
                if let Some(patch) = run.statuses.get(path) {
                    overlay(entry, patch);
                }
                entry.writeback(&self.home).await?;
                run.report.kept += 1;
                Ok(Some(entry.clone()))
            }
            (SlotPlan::Replace(_), _, Some(token)) => {
                let Some(entry) = self.adopt(run, token).await? else {
                    run.report.missing += 1;
                    return Ok(None);
                };
                if let Some(patch) = run.statuses.get(path) {
                    if overlay(&entry, patch) {
                        entry.writeback(&self.home).await?;
                    }
                }
                run.report.replaced += 1;
                Ok(Some(entry))
            }
            (SlotPlan::Clear, ..) => {
                run.report.cleared += 1;
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    // =========================================================================
    // MECH SYNC
    // =========================================================================

    /// Reconcile a live mech against a packed mech record.
    ///
    /// Scalars present in the packed record overwrite; the frame, every
    /// weapon slot and the system list are reconciled by position. The mech
    /// keeps its pilot link. The mech is written back at the end.
    pub async fn sync_mech(
        &self,
        ctx: &ResolutionContext,
        mech: &LiveRef,
        packed: &RawRecord,
    ) -> Result<SyncReport, ArmoryError> {
        expect_type(mech, EntryType::Mech)?;
        let outcome = unpack(EntryType::Mech, packed)?;
        let record = &outcome.record;
        let old = mech
            .view::<Mech, _>(Clone::clone)
            .ok_or_else(|| ArmoryError::NotReady(mech.key().clone()))?;

        let mut run = SyncRun {
            ctx,
            statuses: &outcome.statuses,
            report: SyncReport {
                flags: outcome.flags.clone(),
                ..SyncReport::default()
            },
        };

        // Frame: a one-slot reconciliation.
        let frame = match record.get("frame") {
            Some(value) => {
                let token = parse_token(value)?;
                let plan = plan_slots(
                    &[old.frame.as_ref().map(|f| f.id())],
                    &[token.as_ref().map(RefToken::id)],
                );
                match plan.first() {
                    Some(plan) => {
                        self.apply_plan(&mut run, plan, old.frame.as_ref(), token.as_ref(), "frame")
                            .await?
                    }
                    None => None,
                }
            }
            None => old.frame.clone(),
        };

        let mounts = match record.get("mounts").and_then(Value::as_array) {
            Some(new_mounts) => self.sync_mounts(&mut run, &old.mounts, new_mounts).await?,
            None => old.mounts.clone(),
        };

        let systems = match record.get("systems").and_then(Value::as_array) {
            Some(new_systems) => {
                let tokens = tokens_at(new_systems)?;
                let old_systems = origins_of(&old.systems);
                let plans = plan_slots(&as_ids(&old_systems), &token_ids(&tokens));
                let mut systems = Vec::new();
                for (i, plan) in plans.iter().enumerate() {
                    let old_system = old.systems.get(i);
                    let new_system = tokens.get(i).and_then(Option::as_ref);
                    if let Some(system) = self
                        .apply_plan(&mut run, plan, old_system, new_system, &system_path(i))
                        .await?
                    {
                        systems.push(system);
                    }
                }
                systems
            }
            None => old.systems.clone(),
        };

        mech.update::<Mech, _>(|m| {
            if let Some(name) = scalar::<String>(record, "name") {
                m.name = name;
            }
            if let Some(hp) = scalar::<i64>(record, "hp") {
                m.hp = hp;
            }
            if let Some(heat) = scalar::<i64>(record, "heat") {
                m.heat = heat;
            }
            m.frame = frame;
            m.mounts = mounts;
            m.systems = systems;
        });
        mech.writeback(&self.home).await?;

        let report = run.report;
        tracing::info!(
            key = %mech.key(),
            kept = report.kept,
            replaced = report.replaced,
            cleared = report.cleared,
            missing = report.missing,
            "synced mech"
        );
        Ok(report)
    }

    async fn sync_mounts(
        &self,
        run: &mut SyncRun<'_>,
        old_mounts: &[Mount],
        new_mounts: &[Value],
    ) -> Result<Vec<Mount>, ArmoryError> {
        let mut mounts = Vec::with_capacity(new_mounts.len());

        for (m, new_mount) in new_mounts.iter().enumerate() {
            let old_slots: &[WeaponSlot] = old_mounts
                .get(m)
                .map(|mount| mount.slots.as_slice())
                .unwrap_or_default();
            let new_slots: &[Value] = new_mount
                .get("slots")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();

            let weapons = slot_tokens(new_slots, "weapon")?;
            let mods = slot_tokens(new_slots, "mod")?;
            let old_weapons: Vec<Option<String>> = old_slots
                .iter()
                .map(|s| s.weapon.as_ref().map(|w| w.origin_id()))
                .collect();
            let old_mods: Vec<Option<String>> = old_slots
                .iter()
                .map(|s| s.weapon_mod.as_ref().map(|w| w.origin_id()))
                .collect();
            let weapon_plans = plan_slots(&as_ids(&old_weapons), &token_ids(&weapons));
            let mod_plans = plan_slots(&as_ids(&old_mods), &token_ids(&mods));

            let mut slots = Vec::with_capacity(new_slots.len());
            for s in 0..weapon_plans.len().max(mod_plans.len()) {
                let old_slot = old_slots.get(s);
                let weapon = match weapon_plans.get(s) {
                    Some(plan) => {
                        self.apply_plan(
                            run,
                            plan,
                            old_slot.and_then(|slot| slot.weapon.as_ref()),
                            weapons.get(s).and_then(Option::as_ref),
                            &slot_path(m, s, "weapon"),
                        )
                        .await?
                    }
                    None => None,
                };
                let weapon_mod = match mod_plans.get(s) {
                    Some(plan) => {
                        self.apply_plan(
                            run,
                            plan,
                            old_slot.and_then(|slot| slot.weapon_mod.as_ref()),
                            mods.get(s).and_then(Option::as_ref),
                            &slot_path(m, s, "mod"),
                        )
                        .await?
                    }
                    None => None,
                };
                if let Some(new_slot) = new_slots.get(s) {
                    let size = new_slot
                        .get("size")
                        .and_then(choice::<WeaponSize>)
                        .or_else(|| old_slot.map(|slot| slot.size))
                        .unwrap_or_default();
                    slots.push(WeaponSlot {
                        size,
                        weapon,
                        weapon_mod,
                    });
                }
            }

            let mount_type = new_mount
                .get("mount_type")
                .and_then(choice::<MountType>)
                .or_else(|| old_mounts.get(m).map(|mount| mount.mount_type))
                .unwrap_or_default();
            mounts.push(Mount { mount_type, slots });
        }

        // Mounts that no longer exist clear everything they held.
        for mount in old_mounts.iter().skip(new_mounts.len()) {
            for slot in &mount.slots {
                run.report.cleared += usize::from(slot.weapon.is_some());
                run.report.cleared += usize::from(slot.weapon_mod.is_some());
            }
        }

        Ok(mounts)
    }

    // =========================================================================
    // PILOT SYNC
    // =========================================================================

    /// Reconcile a live pilot against a packed pilot record.
    ///
    /// Mechs are matched by id, not position: a listed mech that the pilot
    /// already owns is re-synced from its packed record in `mechs` (if one
    /// is given), a new one is imported from its packed record or resolved,
    /// and an owned mech no longer listed is detached. Quirks are replaced
    /// by id. Every owned mech's back-link is pointed at `pilot`.
    pub async fn sync_pilot(
        &self,
        ctx: &ResolutionContext,
        pilot: &LiveRef,
        packed: &RawRecord,
        mechs: &[RawRecord],
    ) -> Result<SyncReport, ArmoryError> {
        expect_type(pilot, EntryType::Pilot)?;
        let outcome = unpack(EntryType::Pilot, packed)?;
        let record = &outcome.record;
        let old = pilot
            .view::<Pilot, _>(Clone::clone)
            .ok_or_else(|| ArmoryError::NotReady(pilot.key().clone()))?;

        let mut report = SyncReport {
            flags: outcome.flags.clone(),
            ..SyncReport::default()
        };

        let quirks = match record.get("quirks").and_then(Value::as_array) {
            Some(items) => {
                let tokens: Vec<RefToken> = tokens_at(items)?.into_iter().flatten().collect();
                self.copy_closure(tokens.clone(), &mut report).await?;
                self.home.resolve_many_rough(ctx, &tokens).await?
            }
            None => old.quirks.clone(),
        };

        let packs: BTreeMap<&str, &RawRecord> = mechs
            .iter()
            .filter_map(|mech| mech.get(ID_FIELD).and_then(Value::as_str).map(|id| (id, mech)))
            .collect();

        let listed: Vec<RefToken> = match record.get("mechs").and_then(Value::as_array) {
            Some(items) => tokens_at(items)?.into_iter().flatten().collect(),
            None => {
                let mut ids: Vec<&str> = old.mechs.iter().map(|m| m.id()).collect();
                ids.extend(packs.keys().copied().filter(|id| old.mech_index(id).is_none()));
                ids.into_iter()
                    .map(|id| RefToken::new(EntryType::Mech, id))
                    .collect()
            }
        };

        let mut owned = Vec::with_capacity(listed.len());
        for token in &listed {
            let existing = old.mech_index(token.id()).and_then(|i| old.mechs.get(i));
            let pack = packs.get(token.id()).copied();
            let mech = match (existing, pack) {
                (Some(mech), Some(pack)) => {
                    report.absorb(self.sync_mech(ctx, mech, pack).await?);
                    Some(mech.clone())
                }
                (Some(mech), None) => Some(mech.clone()),
                (None, Some(pack)) => {
                    let (mech, imported) = self.import(ctx, EntryType::Mech, pack).await?;
                    report.absorb(imported);
                    Some(mech)
                }
                (None, None) => match self.home.resolve(ctx, token).await? {
                    Some(mech) => Some(mech),
                    None => {
                        let mut run = SyncRun {
                            ctx,
                            statuses: &outcome.statuses,
                            report: SyncReport::default(),
                        };
                        let adopted = self.adopt(&mut run, token).await?;
                        report.absorb(run.report);
                        adopted
                    }
                },
            };
            match mech {
                Some(mech) => owned.push(mech),
                None => report.missing += 1,
            }
        }

        for mech in &old.mechs {
            if owned.iter().any(|m| m.id() == mech.id()) {
                continue;
            }
            mech.update::<Mech, _>(|m| m.pilot = None);
            mech.writeback(&self.home).await?;
            report.detached += 1;
        }

        for mech in &owned {
            let relinked = mech.update::<Mech, _>(|m| {
                let current = m.pilot.as_ref().and_then(BackLink::get);
                if current.is_some_and(|p| Arc::ptr_eq(&p, pilot)) {
                    return false;
                }
                m.pilot = Some(BackLink::new(pilot.to_ref(), Some(pilot)));
                true
            });
            if relinked == Some(true) {
                mech.writeback(&self.home).await?;
            }
        }

        pilot.update::<Pilot, _>(|p| {
            if let Some(name) = scalar::<String>(record, "name") {
                p.name = name;
            }
            if let Some(callsign) = scalar::<String>(record, "callsign") {
                p.callsign = callsign;
            }
            if let Some(level) = scalar::<i64>(record, "level") {
                p.level = level;
            }
            p.quirks = quirks;
            p.mechs = owned;
        });
        pilot.writeback(&self.home).await?;

        tracing::info!(
            key = %pilot.key(),
            imported = report.imported,
            detached = report.detached,
            missing = report.missing,
            "synced pilot"
        );
        Ok(report)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn expect_type(entry: &LiveRef, expected: EntryType) -> Result<(), ArmoryError> {
    if entry.entry_type() == expected {
        Ok(())
    } else {
        Err(ArmoryError::TypeMismatch {
            expected,
            found: entry.entry_type(),
        })
    }
}

/// Overlay a status patch onto gear. Returns `true` if anything changed.
fn overlay(entry: &LiveRef, patch: &StatusPatch) -> bool {
    entry
        .update_body(|body| body.gear_state_mut().map(|state| patch.apply(state)))
        .flatten()
        .unwrap_or(false)
}

/// Every token referenced anywhere in a record.
fn tokens_in(record: &RawRecord) -> Result<Vec<RefToken>, ArmoryError> {
    let mut tokens = Vec::new();
    for value in record.values() {
        collect_tokens(value, &mut tokens)?;
    }
    Ok(tokens)
}

/// Parse a list of normalized references, keeping positions.
fn tokens_at(items: &[Value]) -> Result<Vec<Option<RefToken>>, ArmoryError> {
    items.iter().map(parse_token).collect()
}

/// Parse one reference field of each slot, keeping positions.
fn slot_tokens(slots: &[Value], field: &str) -> Result<Vec<Option<RefToken>>, ArmoryError> {
    slots
        .iter()
        .map(|slot| match slot.get(field) {
            Some(value) => parse_token(value),
            None => Ok(None),
        })
        .collect()
}

fn token_ids(tokens: &[Option<RefToken>]) -> Vec<Option<&str>> {
    tokens.iter().map(|t| t.as_ref().map(RefToken::id)).collect()
}

fn origins_of(entries: &[LiveRef]) -> Vec<Option<String>> {
    entries.iter().map(|e| Some(e.origin_id())).collect()
}

fn as_ids(ids: &[Option<String>]) -> Vec<Option<&str>> {
    ids.iter().map(Option::as_deref).collect()
}

fn is_gear(entry_type: EntryType) -> bool {
    matches!(
        entry_type,
        EntryType::Weapon | EntryType::WeaponMod | EntryType::System
    )
}

/// The mounted-gear reference values of a mech record: every slot's weapon
/// and mod, then the system list.
fn gear_values(record: &mut RawRecord) -> Vec<&mut Value> {
    let mut values = Vec::new();
    for (name, value) in record.iter_mut() {
        match name.as_str() {
            "mounts" => {
                for mount in value.as_array_mut().into_iter().flatten() {
                    let slots = mount.get_mut("slots").and_then(Value::as_array_mut);
                    for slot in slots.into_iter().flatten() {
                        let fields = slot.as_object_mut().into_iter().flatten();
                        values.extend(
                            fields
                                .filter(|(field, _)| matches!(field.as_str(), "weapon" | "mod"))
                                .map(|(_, v)| v),
                        );
                    }
                }
            }
            "systems" => values.extend(value.as_array_mut().into_iter().flatten()),
            _ => {}
        }
    }
    values
}

fn choice<T: DeserializeOwned>(value: &Value) -> Option<T> {
    serde_json::from_value(value.clone()).ok()
}

/// A well-formed scalar present in the record. Flagged literals are skipped.
fn scalar<T: DeserializeOwned>(record: &RawRecord, name: &str) -> Option<T> {
    record.get(name).filter(|v| !v.is_null()).and_then(choice)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gear_values_cover_slots_and_systems_only() {
        let mut record = serde_json::json!({
            "frame": "everest",
            "mounts": [{
                "mount_type": "main",
                "slots": [{"size": "main", "weapon": "w1", "mod": "m1"}],
            }],
            "systems": ["s1", "s2"],
        })
        .as_object()
        .cloned()
        .unwrap_or_default();

        let found: Vec<String> = gear_values(&mut record)
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        assert_eq!(found, vec!["w1", "m1", "s1", "s2"]);
    }

    #[test]
    fn plan_keeps_same_ids() {
        let plan = plan_slots(&[Some("w1"), Some("w2")], &[Some("w1"), Some("w3")]);
        assert_eq!(plan, vec![SlotPlan::Keep, SlotPlan::Replace("w3".into())]);
    }

    #[test]
    fn plan_clears_removed_and_trailing_slots() {
        let plan = plan_slots(&[Some("w1"), None, Some("w2")], &[None, None]);
        assert_eq!(
            plan,
            vec![SlotPlan::Clear, SlotPlan::Vacant, SlotPlan::Clear]
        );
    }

    #[test]
    fn plan_fills_new_slots() {
        let plan = plan_slots(&[], &[Some("w1"), None]);
        assert_eq!(plan, vec![SlotPlan::Replace("w1".into()), SlotPlan::Vacant]);
    }

    #[test]
    fn plan_is_positional_not_by_identity() {
        // Swapping two weapons replaces both slots.
        let plan = plan_slots(&[Some("a"), Some("b")], &[Some("b"), Some("a")]);
        assert_eq!(
            plan,
            vec![SlotPlan::Replace("b".into()), SlotPlan::Replace("a".into())]
        );
    }

    #[test]
    fn report_absorbs_counts() {
        let mut report = SyncReport {
            kept: 1,
            ..SyncReport::default()
        };
        report.absorb(SyncReport {
            kept: 2,
            cleared: 1,
            ..SyncReport::default()
        });
        assert_eq!(report.kept, 3);
        assert_eq!(report.cleared, 1);
    }
}
