//! YOLO-style class-ID reconciliation.
//!
//! Per dataset: the local `data.yaml` names are matched to the canonical
//! mapping, damage classes are flagged for removal, the manifest is replaced
//! by the canonical manifest, and every label file is rewritten through the
//! resulting remap table.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::label::{rewrite_label_text, LabelLineStats};
use super::report::{FailedUnit, UnmappedName, YoloDatasetReport, YoloRunReport};
use super::ReconcileOptions;
use crate::error::PrepError;
use crate::layout::{self, LabelManifest};
use crate::schema::canonical::parse_names_yaml;
use crate::schema::{
    normalize_name, ClassId, ClassMapping, DamageSet, RemapOutcome, RemapTable, UnmappedPolicy,
};
use crate::textio::{self, TextEncoding};

/// Split paths written into every normalized manifest.
pub const TRAIN_SPLIT_PATH: &str = "images/train";
pub const VAL_SPLIT_PATH: &str = "images/val";

/// Build the remap table for one dataset's declared class names.
///
/// Damage membership is checked first, so a name that is both a damage
/// class and a canonical class is removed, never remapped.
pub fn build_class_table(
    local_names: &BTreeMap<ClassId, String>,
    canonical: &ClassMapping,
    damage: &DamageSet,
) -> RemapTable<ClassId> {
    let mut table = RemapTable::new();
    for (&local, name) in local_names {
        let name = normalize_name(name);
        let outcome = if damage.contains(name) {
            RemapOutcome::Removed
        } else if let Some(canonical_id) = canonical.lookup(name) {
            RemapOutcome::Mapped(canonical_id)
        } else {
            RemapOutcome::Unmapped
        };
        table.insert(local, name, outcome);
    }
    table
}

#[derive(Serialize)]
struct CanonicalManifest<'a> {
    train: &'static str,
    val: &'static str,
    names: &'a BTreeMap<ClassId, String>,
}

/// Render the manifest every dataset is normalized to.
///
/// Depends only on the canonical mapping, so the bytes are identical for
/// every dataset and every run.
pub fn canonical_manifest_yaml(canonical: &ClassMapping) -> Result<String, PrepError> {
    serde_yaml::to_string(&CanonicalManifest {
        train: TRAIN_SPLIT_PATH,
        val: VAL_SPLIT_PATH,
        names: canonical.names(),
    })
    .map_err(PrepError::YamlWrite)
}

/// Outcome of rewriting one label file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LabelFileReport {
    pub stats: LabelLineStats,
    /// `None` when the file did not exist.
    pub encoding: Option<TextEncoding>,
}

/// A label file rewritten in memory and not yet written back.
struct PendingLabelFile<'a> {
    path: &'a Path,
    lines: Vec<String>,
    report: LabelFileReport,
}

/// Read and rewrite one label file without touching the disk.
///
/// `None` when the file does not exist.
fn prepare_label_file<'a>(
    path: &'a Path,
    table: &RemapTable<ClassId>,
    policy: UnmappedPolicy,
) -> Result<Option<PendingLabelFile<'a>>, PrepError> {
    let Some((text, encoding)) = textio::read_text(path)? else {
        return Ok(None);
    };
    if encoding == TextEncoding::Latin1 {
        warn!("Could not read {} as UTF-8, read as Latin-1", path.display());
    }

    let rewrite = rewrite_label_text(&text, table, policy, path)?;
    Ok(Some(PendingLabelFile {
        path,
        lines: rewrite.lines,
        report: LabelFileReport {
            stats: rewrite.stats,
            encoding: Some(encoding),
        },
    }))
}

/// Rewrite one label file through `table`.
///
/// A missing file yields an empty report. Non-UTF-8 files are read as
/// Latin-1 and written back as UTF-8.
pub fn reconcile_label_file(
    path: &Path,
    table: &RemapTable<ClassId>,
    opts: &ReconcileOptions,
) -> Result<LabelFileReport, PrepError> {
    let Some(pending) = prepare_label_file(path, table, opts.unmapped)? else {
        return Ok(LabelFileReport::default());
    };
    if !opts.dry_run {
        textio::write_lines(pending.path, &pending.lines)?;
    }
    Ok(pending.report)
}

/// Reconcile one dataset: its manifest at `manifest_path` and the label
/// files listed in `labels`.
///
/// Every label file is rewritten in memory before anything is written, so
/// an error leaves the manifest and all label files as they were.
pub fn reconcile_yolo_dataset(
    manifest_path: &Path,
    labels: &LabelManifest,
    canonical: &ClassMapping,
    damage: &DamageSet,
    opts: &ReconcileOptions,
) -> Result<YoloDatasetReport, PrepError> {
    let dataset = layout::dataset_name(manifest_path);
    let original = fs::read_to_string(manifest_path).map_err(PrepError::io_at(manifest_path))?;

    let local_names = match parse_names_yaml(&original, manifest_path)? {
        Some(names) => names,
        None => {
            warn!("No 'names' field in {}", manifest_path.display());
            BTreeMap::new()
        }
    };
    let table = build_class_table(&local_names, canonical, damage);

    let unmapped_classes: Vec<UnmappedName> = table
        .unmapped()
        .into_iter()
        .map(|(id, name)| UnmappedName {
            id: i64::from(id.as_u32()),
            name: name.to_string(),
        })
        .collect();
    for class in &unmapped_classes {
        if opts.unmapped == UnmappedPolicy::Fail {
            return Err(PrepError::UnmappedRejected {
                path: manifest_path.to_path_buf(),
                kind: "class",
                name: class.name.clone(),
                id: class.id,
            });
        }
        warn!(
            "Class '{}' (ID {}) not found in reference mapping (dataset: {})",
            class.name, class.id, dataset
        );
    }

    let mut pending = Vec::with_capacity(labels.len());
    for label_path in labels.files() {
        if let Some(file) = prepare_label_file(label_path, &table, opts.unmapped)? {
            pending.push(file);
        }
    }

    let manifest = canonical_manifest_yaml(canonical)?;
    let manifest_changed = manifest != original;
    if opts.dry_run {
        info!("[DRY RUN] Would normalize: {}", manifest_path.display());
    } else {
        fs::write(manifest_path, &manifest).map_err(PrepError::io_at(manifest_path))?;
        for file in &pending {
            textio::write_lines(file.path, &file.lines)?;
        }
    }

    let lines: LabelLineStats = pending.iter().map(|file| file.report.stats).sum();
    let fallback_decoded = pending
        .iter()
        .filter(|file| file.report.encoding == Some(TextEncoding::Latin1))
        .count();

    Ok(YoloDatasetReport {
        dataset,
        manifest: manifest_path.to_path_buf(),
        label_files: labels.len(),
        fallback_decoded,
        classes_mapped: table.mapped_count(),
        classes_changed: table.changed_count(),
        damage_classes: table.removed_count(),
        unmapped_classes,
        manifest_changed,
        lines,
        written: !opts.dry_run,
    })
}

/// Reconcile every dataset (`data.yaml`) under `root`.
///
/// Label files are discovered per dataset with
/// [`LabelManifest::discover`]. Per-dataset failures are logged and
/// collected; the run continues.
pub fn run_yolo_normalize(
    root: &Path,
    canonical: &ClassMapping,
    damage: &DamageSet,
    opts: &ReconcileOptions,
) -> Result<YoloRunReport, PrepError> {
    layout::require_dir(root)?;

    let manifests = layout::find_files_named(root, layout::YOLO_DATA_YAML)?;
    info!("Found {} data.yaml files in {}", manifests.len(), root.display());
    let manifests = layout::filter_by_substring(manifests, opts.dataset_filter.as_deref());
    if let Some(filter) = opts.dataset_filter.as_deref() {
        info!("Filtered to {} datasets matching '{}'", manifests.len(), filter);
    }
    if opts.dry_run {
        info!("=== DRY RUN MODE - No files will be modified ===");
    }

    let mut reports = Vec::with_capacity(manifests.len());
    let mut failures = Vec::new();

    for manifest_path in manifests {
        let result = manifest_path
            .parent()
            .ok_or_else(|| PrepError::InvalidDocument {
                path: manifest_path.clone(),
                message: "manifest has no parent directory".to_string(),
            })
            .and_then(LabelManifest::discover)
            .and_then(|labels| {
                reconcile_yolo_dataset(&manifest_path, &labels, canonical, damage, opts)
            });

        match result {
            Ok(report) => {
                debug!(
                    "{}: {} files, {} remapped, {} removed",
                    report.dataset, report.label_files, report.lines.remapped, report.lines.removed
                );
                reports.push(report);
            }
            Err(err) => {
                error!("Error processing {}: {}", manifest_path.display(), err);
                failures.push(FailedUnit {
                    path: manifest_path,
                    error: err.to_string(),
                });
            }
        }
    }

    Ok(YoloRunReport::from_results(opts.dry_run, reports, failures))
}
