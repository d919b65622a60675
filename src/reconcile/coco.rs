//! COCO-style category reconciliation.
//!
//! Each `annotations.json` declares its own `categories` list. Categories are
//! matched to the canonical list by trimmed name, every annotation's
//! `category_id` is rewritten, and the declared list is replaced by the full
//! canonical list sorted by ID.
//!
//! The document is handled as an untyped JSON object so that fields this
//! module does not know about (`images`, `info`, segmentation data, ...)
//! survive the rewrite byte-for-byte in key order.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::report::{CocoFileReport, CocoRunReport, FailedUnit, UnmappedName};
use super::ReconcileOptions;
use crate::error::PrepError;
use crate::layout;
use crate::schema::{
    normalize_name, CanonicalCategories, CategoryId, RemapOutcome, RemapTable, UnmappedPolicy,
};

/// A category as declared by one annotation file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalCategory {
    pub id: CategoryId,
    pub name: String,
}

/// Build the remap table for one file's declared categories.
///
/// Damage classes do not apply to COCO files, so outcomes are only ever
/// `Mapped` or `Unmapped`.
pub fn build_category_table(
    local: &[LocalCategory],
    canonical: &CanonicalCategories,
) -> RemapTable<CategoryId> {
    let mut table = RemapTable::new();
    for cat in local {
        let name = normalize_name(&cat.name);
        let outcome = match canonical.lookup(name) {
            Some(canon) => RemapOutcome::Mapped(canon.id),
            None => RemapOutcome::Unmapped,
        };
        table.insert(cat.id, name, outcome);
    }
    table
}

/// Reconcile an in-memory COCO document.
///
/// `path` is used for the report and for error context only. A document
/// without a `categories` field is left untouched.
pub fn reconcile_coco_document(
    doc: &mut Map<String, Value>,
    canonical: &CanonicalCategories,
    policy: UnmappedPolicy,
    path: &Path,
) -> Result<CocoFileReport, PrepError> {
    let mut report = CocoFileReport {
        file: path.to_path_buf(),
        ..Default::default()
    };

    let Some(categories) = doc.get("categories") else {
        debug!("{} has no categories; skipping", path.display());
        return Ok(report);
    };

    let local = parse_local_categories(categories, path)?;
    let table = build_category_table(&local, canonical);

    report.categories_found = local.len();
    report.categories_mapped = table.mapped_count();
    report.categories_normalized = table.changed_count();
    report.unmapped_categories = table
        .unmapped()
        .into_iter()
        .map(|(id, name)| UnmappedName {
            id: id.as_i64(),
            name: name.to_string(),
        })
        .collect();

    for unmapped in &report.unmapped_categories {
        if policy == UnmappedPolicy::Fail {
            return Err(PrepError::UnmappedRejected {
                path: path.to_path_buf(),
                kind: "category",
                name: unmapped.name.clone(),
                id: unmapped.id,
            });
        }
        warn!(
            "Category '{}' (id {}) in {} not found in canonical list",
            unmapped.name,
            unmapped.id,
            path.display()
        );
    }

    if let Some(Value::Array(annotations)) = doc.get_mut("annotations") {
        annotations.retain_mut(|ann| {
            let Some(old) = ann.get("category_id").and_then(Value::as_i64) else {
                return true;
            };
            match table.outcome(CategoryId::new(old)) {
                Some(RemapOutcome::Mapped(new)) => {
                    if new.as_i64() != old {
                        ann["category_id"] = Value::from(new.as_i64());
                        report.annotations_updated += 1;
                    }
                    true
                }
                Some(RemapOutcome::Unmapped) if policy == UnmappedPolicy::Drop => {
                    report.annotations_dropped += 1;
                    false
                }
                Some(RemapOutcome::Removed) => {
                    report.annotations_dropped += 1;
                    false
                }
                Some(RemapOutcome::Unmapped) | None => true,
            }
        });

        report.dangling_references = annotations
            .iter()
            .filter_map(|ann| ann.get("category_id").and_then(Value::as_i64))
            .filter(|id| !canonical.contains_id(CategoryId::new(*id)))
            .count();
    }

    if report.dangling_references > 0 {
        warn!(
            "{} annotation(s) in {} reference category IDs absent from the canonical list",
            report.dangling_references,
            path.display()
        );
    }

    let canonical_list = serde_json::to_value(canonical.sorted()).map_err(|source| {
        PrepError::JsonWrite {
            path: path.to_path_buf(),
            source,
        }
    })?;
    doc.insert("categories".to_string(), canonical_list);

    Ok(report)
}

/// Reconcile a COCO document held in a string.
///
/// Returns the rewritten pretty-printed JSON alongside the report.
pub fn reconcile_coco_str(
    json: &str,
    canonical: &CanonicalCategories,
    policy: UnmappedPolicy,
) -> Result<(String, CocoFileReport), PrepError> {
    let path = Path::new("<memory>");
    let mut doc = parse_document(
        serde_json::from_str(json).map_err(|source| PrepError::JsonParse {
            path: path.to_path_buf(),
            source,
        })?,
        path,
    )?;
    let report = reconcile_coco_document(&mut doc, canonical, policy, path)?;
    let out = serde_json::to_string_pretty(&doc).map_err(|source| PrepError::JsonWrite {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((out, report))
}

/// Reconcile one `annotations.json` on disk.
///
/// The file is overwritten in place unless `opts.dry_run` is set or the
/// document declares no categories.
pub fn reconcile_coco_file(
    path: &Path,
    canonical: &CanonicalCategories,
    opts: &ReconcileOptions,
) -> Result<CocoFileReport, PrepError> {
    let file = File::open(path).map_err(PrepError::io_at(path))?;
    let value: Value =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| PrepError::JsonParse {
            path: path.to_path_buf(),
            source,
        })?;
    let mut doc = parse_document(value, path)?;

    let has_categories = doc.contains_key("categories");
    let mut report = reconcile_coco_document(&mut doc, canonical, opts.unmapped, path)?;

    if has_categories && !opts.dry_run {
        write_document(path, &doc)?;
        report.written = true;
    }

    Ok(report)
}

/// Reconcile every `annotations.json` under `root`.
///
/// Per-file failures are logged and collected; the run continues.
pub fn run_coco_normalize(
    root: &Path,
    canonical: &CanonicalCategories,
    opts: &ReconcileOptions,
) -> Result<CocoRunReport, PrepError> {
    layout::require_dir(root)?;

    let files = layout::filter_by_substring(
        layout::find_files_named(root, layout::COCO_ANNOTATIONS_FILE)?,
        opts.dataset_filter.as_deref(),
    );
    info!("Found {} annotation files under {}", files.len(), root.display());
    if opts.dry_run {
        info!("DRY RUN: no files will be modified");
    }

    let mut reports = Vec::with_capacity(files.len());
    let mut failures = Vec::new();

    for path in files {
        match reconcile_coco_file(&path, canonical, opts) {
            Ok(report) => {
                debug!(
                    "{}: {} categories, {} normalized, {} annotations updated",
                    path.display(),
                    report.categories_found,
                    report.categories_normalized,
                    report.annotations_updated
                );
                reports.push(report);
            }
            Err(err) => {
                error!("Error processing {}: {}", path.display(), err);
                failures.push(FailedUnit {
                    path,
                    error: err.to_string(),
                });
            }
        }
    }

    Ok(CocoRunReport::from_results(opts.dry_run, reports, failures))
}

fn parse_document(value: Value, path: &Path) -> Result<Map<String, Value>, PrepError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(PrepError::InvalidDocument {
            path: path.to_path_buf(),
            message: "top-level value must be an object".to_string(),
        }),
    }
}

fn parse_local_categories(value: &Value, path: &Path) -> Result<Vec<LocalCategory>, PrepError> {
    let invalid = |message: String| PrepError::InvalidDocument {
        path: path.to_path_buf(),
        message,
    };

    let items = value
        .as_array()
        .ok_or_else(|| invalid("'categories' must be a list".to_string()))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let id = item
                .get("id")
                .and_then(Value::as_i64)
                .ok_or_else(|| invalid(format!("categories[{index}] has no integer 'id'")))?;
            let name = item
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid(format!("categories[{index}] has no string 'name'")))?;
            Ok(LocalCategory {
                id: CategoryId::new(id),
                name: name.to_string(),
            })
        })
        .collect()
}

fn write_document(path: &Path, doc: &Map<String, Value>) -> Result<(), PrepError> {
    let file = File::create(path).map_err(PrepError::io_at(path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, doc).map_err(|source| PrepError::JsonWrite {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(PrepError::io_at(path))
}

/// Fuzz-only entrypoint: reconcile an arbitrary document against a small
/// fixed canonical list.
#[cfg(feature = "fuzzing")]
pub fn fuzz_reconcile_coco(json: &str) {
    use crate::schema::CanonicalCategory;

    let Ok(canonical) = CanonicalCategories::from_categories(
        vec![
            CanonicalCategory::new(0, "bumper"),
            CanonicalCategory::new(1, "door"),
            CanonicalCategory::new(2, "mirror"),
        ],
        Path::new("<fuzz>"),
    ) else {
        return;
    };
    for policy in [UnmappedPolicy::Keep, UnmappedPolicy::Drop, UnmappedPolicy::Fail] {
        let _ = reconcile_coco_str(json, &canonical, policy);
    }
}
