//! # Property-Based Tests
//!
//! Invariants of the pure parts of the engine: the positional slot plan,
//! value merging and the pack/unpack conversion.

use armory_core::{
    Damage, DamageType, EntryType, Range, RangeType, RawRecord, SlotPlan, merge, pack,
    plan_slots, unpack,
};
use proptest::collection::vec;
use proptest::option;
use proptest::prelude::*;
use serde_json::{Value, json};
use std::collections::BTreeSet;

fn slot_ids() -> impl Strategy<Value = Vec<Option<String>>> {
    vec(option::of("[a-d]"), 0..8)
}

fn as_refs(ids: &[Option<String>]) -> Vec<Option<&str>> {
    ids.iter().map(Option::as_deref).collect()
}

fn damage_type() -> impl Strategy<Value = DamageType> {
    prop_oneof![
        Just(DamageType::Kinetic),
        Just(DamageType::Energy),
        Just(DamageType::Explosive),
        Just(DamageType::Heat),
        Just(DamageType::Burn),
    ]
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// The plan covers every position of the longer list, and each entry
    /// follows from the ids at that position alone.
    #[test]
    fn plan_is_positional(old in slot_ids(), new in slot_ids()) {
        let plan = plan_slots(&as_refs(&old), &as_refs(&new));
        prop_assert_eq!(plan.len(), old.len().max(new.len()));

        for (i, step) in plan.iter().enumerate() {
            let before = old.get(i).cloned().flatten();
            let after = new.get(i).cloned().flatten();
            match step {
                SlotPlan::Vacant => {
                    prop_assert!(before.is_none() && after.is_none());
                }
                SlotPlan::Keep => {
                    prop_assert!(before.is_some());
                    prop_assert_eq!(before, after);
                }
                SlotPlan::Replace(id) => {
                    prop_assert_eq!(Some(id.clone()), after);
                    prop_assert_ne!(before, Some(id.clone()));
                }
                SlotPlan::Clear => {
                    prop_assert!(before.is_some() && after.is_none());
                }
            }
        }
    }

    /// Planning a list against itself keeps every occupied slot.
    #[test]
    fn plan_against_self_changes_nothing(ids in slot_ids()) {
        let refs = as_refs(&ids);
        let plan = plan_slots(&refs, &refs);
        prop_assert!(plan
            .iter()
            .all(|step| matches!(step, SlotPlan::Keep | SlotPlan::Vacant)));
    }

    /// Summed damage keeps one entry per type and preserves the total.
    #[test]
    fn damage_merge_sums_per_type(
        parts in vec((damage_type(), 0i64..1000), 0..20)
    ) {
        let damage: Vec<Damage> = parts.iter().map(|&(kind, val)| Damage::new(kind, val)).collect();
        let merged = merge(damage.clone());

        let kinds: BTreeSet<DamageType> = damage.iter().map(|d| d.kind).collect();
        prop_assert_eq!(merged.len(), kinds.len());

        let total: i64 = damage.iter().map(|d| d.val).sum();
        let merged_total: i64 = merged.iter().map(|d| d.val).sum();
        prop_assert_eq!(total, merged_total);

        // First-seen order is kept.
        let mut first_seen = Vec::new();
        for d in &damage {
            if !first_seen.contains(&d.kind) {
                first_seen.push(d.kind);
            }
        }
        let merged_kinds: Vec<DamageType> = merged.iter().map(|d| d.kind).collect();
        prop_assert_eq!(merged_kinds, first_seen);
    }

    /// Ranges of one type collapse to the largest.
    #[test]
    fn range_merge_takes_maximum(vals in vec(0i64..50, 1..10)) {
        let ranges: Vec<Range> = vals.iter().map(|&v| Range::new(RangeType::Threat, v)).collect();
        let merged = merge(ranges);
        prop_assert_eq!(merged.len(), 1);
        prop_assert_eq!(merged[0].val, vals.iter().copied().max().unwrap_or_default());
    }

    /// Bare-id packed mechs survive an unpack/pack cycle unchanged.
    #[test]
    fn packed_mech_survives_unpack(
        frame in "[a-z]{1,8}",
        systems in vec("[a-z0-9_]{1,12}", 0..6),
        weapons in vec(option::of("[a-z]{1,6}"), 0..4),
    ) {
        let slots: Vec<Value> = weapons
            .iter()
            .map(|w| json!({"size": "main", "weapon": w, "mod": null}))
            .collect();
        let packed: RawRecord = json!({
            "id": "mk",
            "frame": frame,
            "mounts": [{"mount_type": "flex", "slots": slots}],
            "systems": systems,
        })
        .as_object()
        .cloned()
        .unwrap_or_default();

        let outcome = unpack(EntryType::Mech, &packed).expect("unpack");
        prop_assert!(outcome.flags.is_empty());
        prop_assert_eq!(pack(EntryType::Mech, &outcome.record), packed);
    }
}
