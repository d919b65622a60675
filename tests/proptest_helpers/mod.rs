#![allow(dead_code)]

use labelprep::schema::{ClassId, RemapOutcome, RemapTable};
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// Largest local class ID a generated table declares. Lines may reference
/// IDs above it, which are undeclared.
pub const MAX_DECLARED: u32 = 7;
pub const MAX_REFERENCED: u32 = 10;

/// A remap table over local IDs `0..=MAX_DECLARED`, each outcome chosen at
/// random.
pub fn arb_table() -> BoxedStrategy<RemapTable<ClassId>> {
    let outcome = prop_oneof![
        4 => (0u32..12).prop_map(|id| RemapOutcome::Mapped(ClassId(id))),
        1 => Just(RemapOutcome::Removed),
        1 => Just(RemapOutcome::Unmapped),
    ];
    prop::collection::vec(outcome, (MAX_DECLARED + 1) as usize)
        .prop_map(|outcomes| {
            let mut table = RemapTable::new();
            for (local, outcome) in outcomes.into_iter().enumerate() {
                table.insert(ClassId(local as u32), format!("class_{local}"), outcome);
            }
            table
        })
        .boxed()
}

/// One generated annotation line.
#[derive(Clone, Debug)]
pub struct GenLine {
    pub class_id: u32,
    pub geometry: Vec<String>,
    pub leading: String,
    pub trailing: String,
}

impl GenLine {
    pub fn render(&self) -> String {
        format!(
            "{}{} {}{}",
            self.leading,
            self.class_id,
            self.geometry.join(" "),
            self.trailing
        )
    }
}

pub fn arb_line() -> BoxedStrategy<GenLine> {
    (
        0u32..=MAX_REFERENCED,
        prop::collection::vec((0.0f64..1.0).prop_map(|v| format!("{v:.4}")), 1..6),
        prop::sample::select(vec!["", " ", "\t", "  "]),
        prop::sample::select(vec!["", " ", "\r", " \t"]),
    )
        .prop_map(|(class_id, geometry, leading, trailing)| GenLine {
            class_id,
            geometry,
            leading: leading.to_string(),
            trailing: trailing.to_string(),
        })
        .boxed()
}

/// Generated file content: annotation lines interleaved with blank and
/// malformed lines.
#[derive(Clone, Debug)]
pub enum GenEntry {
    Line(GenLine),
    Blank,
    Malformed(String),
}

pub fn arb_entries() -> BoxedStrategy<Vec<GenEntry>> {
    let entry = prop_oneof![
        8 => arb_line().prop_map(GenEntry::Line),
        1 => Just(GenEntry::Blank),
        1 => prop::sample::select(vec!["3", "x 0.1 0.2", "1.5 0.1", "0x1 0.5 0.5"])
            .prop_map(|s| GenEntry::Malformed(s.to_string())),
    ];
    prop::collection::vec(entry, 0..40).boxed()
}

pub fn render(entries: &[GenEntry]) -> String {
    entries
        .iter()
        .map(|entry| match entry {
            GenEntry::Line(line) => line.render(),
            GenEntry::Blank => String::new(),
            GenEntry::Malformed(s) => s.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The table a second run sees: every canonical target maps to itself.
pub fn identity_over_targets(table: &RemapTable<ClassId>) -> RemapTable<ClassId> {
    let mut identity = RemapTable::new();
    for (_, entry) in table.iter() {
        if let RemapOutcome::Mapped(target) = entry.outcome {
            identity.insert(target, entry.name.clone(), RemapOutcome::Mapped(target));
        }
    }
    identity
}
