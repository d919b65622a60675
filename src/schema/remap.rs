//! Per-dataset remap tables.
//!
//! A [`RemapTable`] records, for every locally declared category or class,
//! what should happen to annotations that reference it. It is built from
//! name equality against the canonical schema, used for exactly one
//! dataset, then dropped: two datasets may use the same local ID for
//! different names.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Class names whose annotations are removed rather than remapped.
pub const DEFAULT_DAMAGE_CLASSES: [&str; 6] = [
    "Móp, bẹp(thụng)",
    "Vỡ, nứt",
    "Trầy, xước",
    "Thủng, rách",
    "Long, rụng",
    "Mất",
];

/// Trim a category/class name for comparison.
#[inline]
pub fn normalize_name(name: &str) -> &str {
    name.trim()
}

/// What happens to annotations referencing one local ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemapOutcome<I> {
    /// The local name matched the canonical schema.
    Mapped(I),
    /// The local name is a damage class; its annotations are dropped.
    Removed,
    /// The local name matched nothing; the caller's [`UnmappedPolicy`] decides.
    Unmapped,
}

/// How references to unmapped IDs are treated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedPolicy {
    /// Leave the reference (or label line) as it is.
    #[default]
    Keep,
    /// Remove the annotation or label line.
    Drop,
    /// Abort processing of the current file or dataset.
    Fail,
}

/// One entry of a remap table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemapEntry<I> {
    /// Trimmed local name.
    pub name: String,
    pub outcome: RemapOutcome<I>,
}

/// Local ID → remap outcome, scoped to a single dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemapTable<I: Ord> {
    entries: BTreeMap<I, RemapEntry<I>>,
}

impl<I: Ord> Default for RemapTable<I> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<I: Ord + Copy> RemapTable<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome for a local ID. A later declaration of the same
    /// local ID replaces the earlier one.
    pub fn insert(&mut self, local: I, name: impl Into<String>, outcome: RemapOutcome<I>) {
        self.entries.insert(
            local,
            RemapEntry {
                name: name.into(),
                outcome,
            },
        );
    }

    /// Outcome for a local ID, or `None` if the dataset never declared it.
    pub fn outcome(&self, local: I) -> Option<RemapOutcome<I>> {
        self.entries.get(&local).map(|entry| entry.outcome)
    }

    pub fn entry(&self, local: I) -> Option<&RemapEntry<I>> {
        self.entries.get(&local)
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &RemapEntry<I>)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn mapped_count(&self) -> usize {
        self.count_where(|o| matches!(o, RemapOutcome::Mapped(_)))
    }

    /// Mapped entries whose canonical ID differs from the local one.
    pub fn changed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(local, entry)| matches!(entry.outcome, RemapOutcome::Mapped(id) if id != **local))
            .count()
    }

    pub fn removed_count(&self) -> usize {
        self.count_where(|o| matches!(o, RemapOutcome::Removed))
    }

    /// Local IDs and names that matched nothing, in ID order.
    pub fn unmapped(&self) -> Vec<(I, &str)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.outcome == RemapOutcome::Unmapped)
            .map(|(id, entry)| (*id, entry.name.as_str()))
            .collect()
    }

    fn count_where(&self, pred: impl Fn(&RemapOutcome<I>) -> bool) -> usize {
        self.entries.values().filter(|e| pred(&e.outcome)).count()
    }
}

/// The fixed set of damage class names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DamageSet {
    names: BTreeSet<String>,
}

impl Default for DamageSet {
    fn default() -> Self {
        Self::from_names(DEFAULT_DAMAGE_CLASSES)
    }
}

impl DamageSet {
    /// Build a set from names; each name is trimmed.
    pub fn from_names<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names
                .into_iter()
                .map(|name| normalize_name(name.as_ref()).to_string())
                .collect(),
        }
    }

    /// An empty set: nothing is removed.
    pub fn empty() -> Self {
        Self {
            names: BTreeSet::new(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(normalize_name(name))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
