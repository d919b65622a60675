//! Bulk image download from `images.json` manifests.
//!
//! Every dataset under the raw root that carries an `images.json` (a list of
//! `{name, url}` items) is downloaded into one merged output tree:
//!
//! ```text
//! <output>/images/train/<file>
//! <output>/labels/train/<stem>.txt
//! ```
//!
//! Items are fetched on a bounded worker pool. Each worker owns its item
//! from name resolution to label copy and returns an immutable
//! [`ItemReport`]; the only state shared between workers is a progress
//! counter.

mod fetch;

pub use fetch::{fetch_to_file, Fetcher, HttpFetcher, RetryPolicy};

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::PrepError;
use crate::layout;
use crate::reconcile::FailedUnit;
use crate::split::label_file_name;

/// Extensions recognized as image files, in detection order.
pub const IMAGE_EXTENSIONS: [&str; 8] = [
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".tiff", ".svg",
];

const DEFAULT_EXTENSION: &str = ".jpg";

/// One entry of an `images.json` manifest.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ImageItem {
    pub name: String,
    pub url: String,
}

/// Read an `images.json` manifest.
pub fn read_image_list(path: &Path) -> Result<Vec<ImageItem>, PrepError> {
    let text = fs::read_to_string(path).map_err(PrepError::io_at(path))?;
    serde_json::from_str(&text).map_err(|source| PrepError::JsonParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Image extension guessed from the path part of `url`.
///
/// The first known extension that occurs anywhere in the lowercased path
/// wins; `.jpg` when none does.
pub fn extension_from_url(url: &str) -> &'static str {
    let path = url_path(url).to_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .copied()
        .find(|ext| path.contains(ext))
        .unwrap_or(DEFAULT_EXTENSION)
}

fn url_path(url: &str) -> &str {
    let after_scheme = match url.find("://") {
        Some(pos) => &url[pos + 3..],
        None => url,
    };
    let path = match after_scheme.find('/') {
        Some(pos) => &after_scheme[pos..],
        None => "",
    };
    let end = path.find(&['?', '#'][..]).unwrap_or(path.len());
    &path[..end]
}

/// File name an item is saved under, before conflict resolution.
pub fn target_file_name(item: &ImageItem) -> String {
    let lower = item.name.to_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        item.name.clone()
    } else {
        format!("{}{}", item.name, extension_from_url(&item.url))
    }
}

/// Dataset name reduced to characters that are safe in a file name.
pub fn sanitize_prefix(dataset: &str) -> String {
    dataset
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Settings for a download run.
#[derive(Clone, Debug)]
pub struct DownloadOptions {
    pub max_workers: usize,
    pub dataset_filter: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            max_workers: 50,
            dataset_filter: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// What happened to one item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Downloaded { file_name: String },
    /// Both the plain and the dataset-prefixed name already existed.
    Skipped { file_name: String },
    Failed { file_name: String, error: String },
}

impl ItemOutcome {
    /// File present in the output directory for this item, if any.
    pub fn present_file(&self) -> Option<&str> {
        match self {
            ItemOutcome::Downloaded { file_name } | ItemOutcome::Skipped { file_name } => {
                Some(file_name)
            }
            ItemOutcome::Failed { .. } => None,
        }
    }
}

/// Per-item result, produced by exactly one worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub original_name: String,
    pub outcome: ItemOutcome,
    pub label_copied: bool,
}

/// Download one item into `images_dir`.
pub fn download_item(
    item: &ImageItem,
    images_dir: &Path,
    dataset: &str,
    fetcher: &dyn Fetcher,
    retry: &RetryPolicy,
) -> ItemOutcome {
    let mut file_name = target_file_name(item);
    let mut path = images_dir.join(&file_name);

    if path.exists() {
        file_name = format!("{}_{}", sanitize_prefix(dataset), file_name);
        path = images_dir.join(&file_name);
        if path.exists() {
            return ItemOutcome::Skipped { file_name };
        }
    }

    match fetch_to_file(fetcher, &item.url, &path, retry) {
        Ok(bytes) => {
            debug!("Downloaded {} ({} bytes)", file_name, bytes);
            ItemOutcome::Downloaded { file_name }
        }
        Err(err) => ItemOutcome::Failed {
            file_name,
            error: err.to_string(),
        },
    }
}

/// Copy the label of `original_name` from the dataset's `labels/train` to
/// `<labels_dir>/<stem of file_name>.txt`.
///
/// Returns `Ok(false)` when the dataset has no label for the item.
pub fn copy_label(
    file_name: &str,
    original_name: &str,
    dataset_dir: &Path,
    labels_dir: &Path,
) -> Result<bool, PrepError> {
    let source = dataset_dir
        .join("labels")
        .join("train")
        .join(label_file_name(original_name));
    if !source.is_file() {
        return Ok(false);
    }
    let dest = labels_dir.join(label_file_name(file_name));
    fs::copy(&source, &dest).map_err(PrepError::io_at(&dest))?;
    Ok(true)
}

/// An item that could not be fetched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedItem {
    pub file_name: String,
    pub error: String,
}

/// Outcome of downloading one dataset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DatasetDownloadReport {
    pub dataset: String,
    pub total: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub labels_copied: usize,
    pub errors: Vec<FailedItem>,
}

impl DatasetDownloadReport {
    /// Fold per-item reports.
    pub fn from_items(dataset: String, items: &[ItemReport]) -> Self {
        let mut report = Self {
            dataset,
            total: items.len(),
            ..Default::default()
        };
        for item in items {
            match &item.outcome {
                ItemOutcome::Downloaded { .. } => report.downloaded += 1,
                ItemOutcome::Skipped { .. } => report.skipped += 1,
                ItemOutcome::Failed { file_name, error } => report.errors.push(FailedItem {
                    file_name: file_name.clone(),
                    error: error.clone(),
                }),
            }
            if item.label_copied {
                report.labels_copied += 1;
            }
        }
        report
    }
}

/// Download every item of one `images.json` on `pool`.
pub fn download_dataset(
    images_json: &Path,
    images_dir: &Path,
    labels_dir: &Path,
    fetcher: &dyn Fetcher,
    opts: &DownloadOptions,
    pool: &rayon::ThreadPool,
) -> Result<DatasetDownloadReport, PrepError> {
    let dataset_dir = images_json.parent().unwrap_or(Path::new("."));
    let dataset = layout::dataset_name(images_json);
    let items = read_image_list(images_json)?;
    info!("Processing {} ({} images)", dataset, items.len());

    let total = items.len();
    let completed = AtomicUsize::new(0);

    let results: Vec<ItemReport> = pool.install(|| {
        items
            .par_iter()
            .map(|item| {
                let outcome = download_item(item, images_dir, &dataset, fetcher, &opts.retry);
                let label_copied = match outcome.present_file() {
                    Some(file_name) => {
                        match copy_label(file_name, &item.name, dataset_dir, labels_dir) {
                            Ok(copied) => copied,
                            Err(err) => {
                                warn!("Failed to copy label for {}: {}", file_name, err);
                                false
                            }
                        }
                    }
                    None => false,
                };
                if let ItemOutcome::Failed { file_name, error } = &outcome {
                    warn!("Failed to download {}: {}", file_name, error);
                }

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("[{}] {}/{}", dataset, done, total);

                ItemReport {
                    original_name: item.name.clone(),
                    outcome,
                    label_copied,
                }
            })
            .collect()
    });

    let report = DatasetDownloadReport::from_items(dataset, &results);
    info!(
        "{}: {} downloaded, {} skipped, {} failed, {} labels copied",
        report.dataset,
        report.downloaded,
        report.skipped,
        report.errors.len(),
        report.labels_copied
    );
    Ok(report)
}

/// Outcome of a whole `download` run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DownloadRunReport {
    pub images_dir: PathBuf,
    pub labels_dir: PathBuf,
    pub datasets: Vec<DatasetDownloadReport>,
    /// Datasets whose manifest could not be read.
    pub failures: Vec<FailedUnit>,
    pub duration_secs: f64,
}

impl DownloadRunReport {
    pub fn total_images(&self) -> usize {
        self.datasets.iter().map(|d| d.total).sum()
    }

    pub fn downloaded(&self) -> usize {
        self.datasets.iter().map(|d| d.downloaded).sum()
    }

    pub fn skipped(&self) -> usize {
        self.datasets.iter().map(|d| d.skipped).sum()
    }

    pub fn errors(&self) -> usize {
        self.datasets.iter().map(|d| d.errors.len()).sum()
    }

    pub fn labels_copied(&self) -> usize {
        self.datasets.iter().map(|d| d.labels_copied).sum()
    }
}

impl fmt::Display for DownloadRunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Download summary")?;
        writeln!(f, "  Datasets processed: {}", self.datasets.len())?;
        writeln!(f, "  Total images:       {}", self.total_images())?;
        writeln!(f, "  Downloaded:         {}", self.downloaded())?;
        writeln!(f, "  Skipped:            {}", self.skipped())?;
        writeln!(f, "  Errors:             {}", self.errors())?;
        writeln!(f, "  Labels copied:      {}", self.labels_copied())?;
        if !self.failures.is_empty() {
            writeln!(f, "  Failed datasets:    {}", self.failures.len())?;
            for failure in &self.failures {
                writeln!(f, "  - {}: {}", failure.path.display(), failure.error)?;
            }
        }
        let speed = if self.duration_secs > 0.0 {
            self.downloaded() as f64 / self.duration_secs
        } else {
            0.0
        };
        writeln!(f)?;
        writeln!(f, "Duration:  {:.2}s ({:.2} images/s)", self.duration_secs, speed)?;
        writeln!(f, "Images:    {}", self.images_dir.display())?;
        writeln!(f, "Labels:    {}", self.labels_dir.display())
    }
}

/// Download every dataset under `raw_root` into `output_dir`.
pub fn run_download(
    raw_root: &Path,
    output_dir: &Path,
    opts: &DownloadOptions,
    fetcher: &dyn Fetcher,
) -> Result<DownloadRunReport, PrepError> {
    layout::require_dir(raw_root)?;
    if opts.max_workers == 0 {
        return Err(PrepError::InvalidOptions(
            "max workers must be at least 1".to_string(),
        ));
    }

    let images_dir = output_dir.join("images").join("train");
    let labels_dir = output_dir.join("labels").join("train");
    fs::create_dir_all(&images_dir).map_err(PrepError::io_at(&images_dir))?;
    fs::create_dir_all(&labels_dir).map_err(PrepError::io_at(&labels_dir))?;

    let manifests = layout::find_files_named(raw_root, layout::IMAGES_JSON)?;
    let manifests = layout::filter_by_substring(manifests, opts.dataset_filter.as_deref());
    info!(
        "Found {} datasets under {} ({} workers)",
        manifests.len(),
        raw_root.display(),
        opts.max_workers
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.max_workers)
        .build()
        .map_err(|err| PrepError::InvalidOptions(err.to_string()))?;

    let started = Instant::now();
    let mut report = DownloadRunReport {
        images_dir,
        labels_dir,
        ..Default::default()
    };

    for (index, images_json) in manifests.iter().enumerate() {
        debug!("[{}/{}] {}", index + 1, manifests.len(), images_json.display());
        match download_dataset(
            images_json,
            &report.images_dir,
            &report.labels_dir,
            fetcher,
            opts,
            &pool,
        ) {
            Ok(dataset) => report.datasets.push(dataset),
            Err(err) => {
                error!("Error processing {}: {}", images_json.display(), err);
                report.failures.push(FailedUnit {
                    path: images_json.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    report.duration_secs = started.elapsed().as_secs_f64();
    Ok(report)
}
