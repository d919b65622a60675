//! Reconciliation report types.
//!
//! Every file or dataset produces one immutable report; run reports are
//! built by folding them. Nothing here is shared or locked while a run is
//! in progress.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use super::label::LabelLineStats;

/// A file or dataset that could not be processed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedUnit {
    pub path: PathBuf,
    pub error: String,
}

/// A locally declared category or class that matched nothing canonical.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UnmappedName {
    pub id: i64,
    pub name: String,
}

// ============================================================================
// COCO
// ============================================================================

/// Outcome of reconciling one `annotations.json`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CocoFileReport {
    pub file: PathBuf,
    /// Categories declared by the file.
    pub categories_found: usize,
    /// Declared categories whose name matched the canonical list.
    pub categories_mapped: usize,
    /// Mapped categories whose ID changed.
    pub categories_normalized: usize,
    /// Annotations whose `category_id` changed.
    pub annotations_updated: usize,
    /// Annotations removed under the `drop` unmapped policy.
    pub annotations_dropped: usize,
    /// Annotations left pointing at an ID absent from the canonical list.
    pub dangling_references: usize,
    pub unmapped_categories: Vec<UnmappedName>,
    /// False for dry runs and for files without a `categories` field.
    pub written: bool,
}

/// Aggregated COCO counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CocoTotals {
    pub files: usize,
    pub categories_found: usize,
    pub categories_mapped: usize,
    pub categories_normalized: usize,
    pub annotations_updated: usize,
    pub annotations_dropped: usize,
    pub dangling_references: usize,
}

impl CocoTotals {
    fn add_file(mut self, file: &CocoFileReport) -> Self {
        self.files += 1;
        self.categories_found += file.categories_found;
        self.categories_mapped += file.categories_mapped;
        self.categories_normalized += file.categories_normalized;
        self.annotations_updated += file.annotations_updated;
        self.annotations_dropped += file.annotations_dropped;
        self.dangling_references += file.dangling_references;
        self
    }
}

/// Outcome of a whole `coco-normalize` run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CocoRunReport {
    pub dry_run: bool,
    pub totals: CocoTotals,
    /// Distinct unmapped names across all files.
    pub unmapped_names: BTreeSet<String>,
    pub files: Vec<CocoFileReport>,
    pub failures: Vec<FailedUnit>,
}

impl CocoRunReport {
    /// Fold per-file results into a run report.
    pub fn from_results(
        dry_run: bool,
        files: Vec<CocoFileReport>,
        failures: Vec<FailedUnit>,
    ) -> Self {
        let totals = files.iter().fold(CocoTotals::default(), CocoTotals::add_file);
        let unmapped_names = files
            .iter()
            .flat_map(|file| file.unmapped_categories.iter().map(|u| u.name.clone()))
            .collect();
        Self {
            dry_run,
            totals,
            unmapped_names,
            files,
            failures,
        }
    }
}

impl fmt::Display for CocoRunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.totals;
        writeln!(f, "COCO normalization summary")?;
        writeln!(f, "  Files processed:        {}", t.files)?;
        writeln!(f, "  Categories found:       {}", t.categories_found)?;
        writeln!(f, "  Categories mapped:      {}", t.categories_mapped)?;
        writeln!(f, "  Categories normalized:  {}", t.categories_normalized)?;
        writeln!(f, "  Annotations updated:    {}", t.annotations_updated)?;
        if t.annotations_dropped > 0 {
            writeln!(f, "  Annotations dropped:    {}", t.annotations_dropped)?;
        }

        if self.unmapped_names.is_empty() {
            writeln!(f, "\nAll categories mapped.")?;
        } else {
            writeln!(
                f,
                "\nWarning: {} unmapped categor{}:",
                self.unmapped_names.len(),
                if self.unmapped_names.len() == 1 { "y" } else { "ies" }
            )?;
            for name in &self.unmapped_names {
                writeln!(f, "  - {}", name)?;
            }
        }

        if t.dangling_references > 0 {
            writeln!(
                f,
                "\nWarning: {} annotation(s) reference category IDs missing from the canonical list:",
                t.dangling_references
            )?;
            for file in self.files.iter().filter(|file| file.dangling_references > 0) {
                writeln!(f, "  - {} ({})", file.file.display(), file.dangling_references)?;
            }
        }

        write_failures(f, &self.failures)?;
        write_dry_run_footer(f, self.dry_run)
    }
}

// ============================================================================
// YOLO
// ============================================================================

/// Outcome of reconciling one YOLO dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct YoloDatasetReport {
    pub dataset: String,
    pub manifest: PathBuf,
    pub label_files: usize,
    /// Label files that had to be decoded as Latin-1.
    pub fallback_decoded: usize,
    pub classes_mapped: usize,
    /// Mapped classes whose index changed.
    pub classes_changed: usize,
    pub damage_classes: usize,
    pub unmapped_classes: Vec<UnmappedName>,
    /// Whether the manifest bytes differed from the canonical manifest.
    pub manifest_changed: bool,
    pub lines: LabelLineStats,
    pub written: bool,
}

/// Outcome of a whole `yolo-normalize` run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct YoloRunReport {
    pub dry_run: bool,
    pub datasets_processed: usize,
    pub label_files: usize,
    pub lines: LabelLineStats,
    pub datasets: Vec<YoloDatasetReport>,
    pub failures: Vec<FailedUnit>,
}

impl YoloRunReport {
    /// Fold per-dataset results into a run report.
    pub fn from_results(
        dry_run: bool,
        datasets: Vec<YoloDatasetReport>,
        failures: Vec<FailedUnit>,
    ) -> Self {
        Self {
            dry_run,
            datasets_processed: datasets.len(),
            label_files: datasets.iter().map(|d| d.label_files).sum(),
            lines: datasets.iter().map(|d| d.lines).sum(),
            datasets,
            failures,
        }
    }
}

impl fmt::Display for YoloRunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "YOLO normalization summary")?;
        writeln!(f, "  Datasets processed:           {}", self.datasets_processed)?;
        writeln!(f, "  Label files processed:        {}", self.label_files)?;
        writeln!(f, "  Annotations remapped:         {}", self.lines.remapped)?;
        writeln!(f, "  Annotations removed (damage): {}", self.lines.removed)?;
        if self.lines.kept_unmapped > 0 {
            writeln!(f, "  Unmapped lines kept:          {}", self.lines.kept_unmapped)?;
        }
        if self.lines.dropped_unmapped > 0 {
            writeln!(f, "  Unmapped lines dropped:       {}", self.lines.dropped_unmapped)?;
        }
        if self.lines.malformed > 0 {
            writeln!(f, "  Malformed lines dropped:      {}", self.lines.malformed)?;
        }

        let with_unmapped: Vec<&YoloDatasetReport> = self
            .datasets
            .iter()
            .filter(|d| !d.unmapped_classes.is_empty())
            .collect();
        if !with_unmapped.is_empty() {
            writeln!(f, "\nWarning: unmapped classes:")?;
            for dataset in with_unmapped {
                for class in &dataset.unmapped_classes {
                    writeln!(f, "  - {}: '{}' (id {})", dataset.dataset, class.name, class.id)?;
                }
            }
        }

        write_failures(f, &self.failures)?;
        write_dry_run_footer(f, self.dry_run)
    }
}

fn write_failures(f: &mut fmt::Formatter<'_>, failures: &[FailedUnit]) -> fmt::Result {
    if failures.is_empty() {
        return Ok(());
    }
    writeln!(f, "\nFailed ({}):", failures.len())?;
    for failure in failures {
        writeln!(f, "  - {}: {}", failure.path.display(), failure.error)?;
    }
    Ok(())
}

fn write_dry_run_footer(f: &mut fmt::Formatter<'_>, dry_run: bool) -> fmt::Result {
    if dry_run {
        writeln!(f, "\nThis was a DRY RUN: no files were modified.")
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coco_run_report_folds_files() {
        let a = CocoFileReport {
            file: PathBuf::from("a/annotations.json"),
            categories_found: 3,
            categories_mapped: 2,
            categories_normalized: 1,
            annotations_updated: 10,
            unmapped_categories: vec![UnmappedName {
                id: 9,
                name: "spoiler".into(),
            }],
            ..Default::default()
        };
        let b = CocoFileReport {
            file: PathBuf::from("b/annotations.json"),
            categories_found: 2,
            categories_mapped: 1,
            dangling_references: 4,
            unmapped_categories: vec![UnmappedName {
                id: 1,
                name: "spoiler".into(),
            }],
            ..Default::default()
        };

        let report = CocoRunReport::from_results(true, vec![a, b], vec![]);
        assert_eq!(report.totals.files, 2);
        assert_eq!(report.totals.categories_found, 5);
        assert_eq!(report.totals.annotations_updated, 10);
        assert_eq!(report.unmapped_names.len(), 1);

        let text = report.to_string();
        assert!(text.contains("1 unmapped category:"));
        assert!(text.contains("b/annotations.json (4)"));
        assert!(text.contains("DRY RUN"));
    }

    #[test]
    fn yolo_run_report_lists_failures() {
        let report = YoloRunReport::from_results(
            false,
            vec![YoloDatasetReport {
                dataset: "ds1".into(),
                label_files: 2,
                lines: LabelLineStats {
                    remapped: 5,
                    removed: 1,
                    ..Default::default()
                },
                ..Default::default()
            }],
            vec![FailedUnit {
                path: PathBuf::from("ds2/data.yaml"),
                error: "bad yaml".into(),
            }],
        );

        assert_eq!(report.datasets_processed, 1);
        assert_eq!(report.lines.remapped, 5);
        let text = report.to_string();
        assert!(text.contains("Annotations removed (damage): 1"));
        assert!(text.contains("ds2/data.yaml: bad yaml"));
        assert!(!text.contains("DRY RUN"));
    }
}
