//! # Value Objects
//!
//! Plain serializable leaf data carried inside entries: damage, ranges, tags,
//! actions. Value objects have no registry identity and are never
//! deduplicated; copies are independent.
//!
//! Each kind declares how two values with the same merge key combine when a
//! profile is assembled from several sources (a weapon plus its mod):
//! - `Sum`: magnitudes add (saturating)
//! - `Min` / `Max`: the smaller / larger magnitude wins
//! - `KeepBoth`: both values are kept
//! - `DiscardDuplicate`: the first value wins

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// MERGE POLICY
// =============================================================================

/// How values sharing a merge key combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    Sum,
    Min,
    Max,
    KeepBoth,
    DiscardDuplicate,
}

/// A serializable leaf value with a declared merge rule.
pub trait ValueObject: Clone + Serialize + DeserializeOwned {
    /// Policy applied to values sharing a merge key.
    const MERGE: MergePolicy;

    /// Values with equal keys are combined according to `MERGE`.
    fn merge_key(&self) -> String;

    /// Numeric magnitude combined by `Sum`/`Min`/`Max`.
    fn magnitude(&self) -> i64 {
        0
    }

    /// Copy of this value with a different magnitude.
    #[must_use]
    fn with_magnitude(&self, _magnitude: i64) -> Self {
        self.clone()
    }
}

/// Merge values in order, combining those that share a key.
///
/// The output keeps the position of the first value seen for each key.
pub fn merge<V: ValueObject>(values: impl IntoIterator<Item = V>) -> Vec<V> {
    let mut merged: Vec<V> = Vec::new();
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();

    for value in values {
        if V::MERGE == MergePolicy::KeepBoth {
            merged.push(value);
            continue;
        }
        let key = value.merge_key();
        let Some(&idx) = seen.get(&key) else {
            seen.insert(key, merged.len());
            merged.push(value);
            continue;
        };
        let current = merged[idx].magnitude();
        let incoming = value.magnitude();
        merged[idx] = match V::MERGE {
            MergePolicy::Sum => merged[idx].with_magnitude(current.saturating_add(incoming)),
            MergePolicy::Min => merged[idx].with_magnitude(current.min(incoming)),
            MergePolicy::Max => merged[idx].with_magnitude(current.max(incoming)),
            MergePolicy::KeepBoth | MergePolicy::DiscardDuplicate => continue,
        };
    }

    merged
}

// =============================================================================
// DAMAGE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    #[default]
    Kinetic,
    Energy,
    Explosive,
    Heat,
    Burn,
    Variable,
}

/// Flat damage of one type. Same-type damage sums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Damage {
    #[serde(rename = "type", default)]
    pub kind: DamageType,
    #[serde(default)]
    pub val: i64,
}

impl Damage {
    #[must_use]
    pub fn new(kind: DamageType, val: i64) -> Self {
        Self { kind, val }
    }
}

impl ValueObject for Damage {
    const MERGE: MergePolicy = MergePolicy::Sum;

    fn merge_key(&self) -> String {
        format!("{:?}", self.kind)
    }

    fn magnitude(&self) -> i64 {
        self.val
    }

    fn with_magnitude(&self, magnitude: i64) -> Self {
        Self::new(self.kind, magnitude)
    }
}

// =============================================================================
// RANGE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeType {
    #[default]
    Range,
    Threat,
    Thrown,
    Line,
    Cone,
    Blast,
    Burst,
}

/// Reach of one pattern. Same-pattern ranges keep the larger value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    #[serde(rename = "type", default)]
    pub kind: RangeType,
    #[serde(default)]
    pub val: i64,
}

impl Range {
    #[must_use]
    pub fn new(kind: RangeType, val: i64) -> Self {
        Self { kind, val }
    }
}

impl ValueObject for Range {
    const MERGE: MergePolicy = MergePolicy::Max;

    fn merge_key(&self) -> String {
        format!("{:?}", self.kind)
    }

    fn magnitude(&self) -> i64 {
        self.val
    }

    fn with_magnitude(&self, magnitude: i64) -> Self {
        Self::new(self.kind, magnitude)
    }
}

// =============================================================================
// TAG
// =============================================================================

/// Rules tag (`tg_limited`, `tg_heat_self`, ...). The first tag of an id wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<i64>,
}

impl Tag {
    #[must_use]
    pub fn new(id: impl Into<String>, val: Option<i64>) -> Self {
        Self { id: id.into(), val }
    }
}

impl ValueObject for Tag {
    const MERGE: MergePolicy = MergePolicy::DiscardDuplicate;

    fn merge_key(&self) -> String {
        self.id.clone()
    }
}

// =============================================================================
// ACTION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Quick,
    Full,
    Free,
    Protocol,
    Reaction,
    Invade,
}

/// Activated ability granted by gear. Actions never collapse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default)]
    pub detail: String,
}

impl ValueObject for Action {
    const MERGE: MergePolicy = MergePolicy::KeepBoth;

    fn merge_key(&self) -> String {
        self.name.clone()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal value kind exercising the `Min` policy.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Limit {
        scope: String,
        max: i64,
    }

    impl ValueObject for Limit {
        const MERGE: MergePolicy = MergePolicy::Min;

        fn merge_key(&self) -> String {
            self.scope.clone()
        }

        fn magnitude(&self) -> i64 {
            self.max
        }

        fn with_magnitude(&self, magnitude: i64) -> Self {
            Self {
                scope: self.scope.clone(),
                max: magnitude,
            }
        }
    }

    #[test]
    fn damage_sums_by_type() {
        let merged = merge(vec![
            Damage::new(DamageType::Kinetic, 3),
            Damage::new(DamageType::Energy, 2),
            Damage::new(DamageType::Kinetic, 1),
        ]);
        assert_eq!(
            merged,
            vec![
                Damage::new(DamageType::Kinetic, 4),
                Damage::new(DamageType::Energy, 2),
            ]
        );
    }

    #[test]
    fn range_keeps_max() {
        let merged = merge(vec![Range::new(RangeType::Range, 10), Range::new(RangeType::Range, 15)]);
        assert_eq!(merged, vec![Range::new(RangeType::Range, 15)]);
    }

    #[test]
    fn limit_keeps_min() {
        let limit = |max| Limit {
            scope: "scene".into(),
            max,
        };
        assert_eq!(merge(vec![limit(3), limit(1), limit(2)]), vec![limit(1)]);
    }

    #[test]
    fn tags_discard_duplicates() {
        let merged = merge(vec![
            Tag::new("tg_limited", Some(3)),
            Tag::new("tg_loading", None),
            Tag::new("tg_limited", Some(1)),
        ]);
        assert_eq!(
            merged,
            vec![Tag::new("tg_limited", Some(3)), Tag::new("tg_loading", None)]
        );
    }

    #[test]
    fn actions_keep_both() {
        let action = Action {
            name: "Overcharge".into(),
            activation: Activation::Quick,
            detail: String::new(),
        };
        assert_eq!(merge(vec![action.clone(), action]).len(), 2);
    }

    #[test]
    fn damage_sum_saturates() {
        let merged = merge(vec![
            Damage::new(DamageType::Heat, i64::MAX),
            Damage::new(DamageType::Heat, 1),
        ]);
        assert_eq!(merged[0].val, i64::MAX);
    }
}
