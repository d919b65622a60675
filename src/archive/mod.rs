//! Zip archive extraction.
//!
//! Every `.zip` under a root is extracted next to itself into a directory
//! named after the archive stem: `parent/export.zip` → `parent/export/`.
//! Archives whose target directory already exists are skipped.

use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::PrepError;
use crate::layout;
use crate::reconcile::FailedUnit;

const ZIP_EXTENSION: &str = "zip";

/// Outcome of an unzip run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct UnzipReport {
    pub dry_run: bool,
    pub total: usize,
    pub extracted: usize,
    pub skipped: usize,
    pub failures: Vec<FailedUnit>,
}

impl fmt::Display for UnzipReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Unzip summary")?;
        writeln!(f, "  Zip files found:        {}", self.total)?;
        writeln!(f, "  Extracted:              {}", self.extracted)?;
        writeln!(f, "  Already present (skip): {}", self.skipped)?;
        writeln!(f, "  Failed:                 {}", self.failures.len())?;
        for failure in &self.failures {
            writeln!(f, "  - {}: {}", failure.path.display(), failure.error)?;
        }
        if self.dry_run {
            writeln!(f, "\nThis was a DRY RUN: nothing was extracted.")?;
        }
        Ok(())
    }
}

/// Directory an archive extracts into.
pub fn extract_dir_for(zip_path: &Path) -> PathBuf {
    let stem = zip_path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    zip_path.with_file_name(stem)
}

/// Extract `zip_path` into `dest`, returning the number of files written.
///
/// Entries whose names would escape `dest` are skipped.
pub fn extract_zip(zip_path: &Path, dest: &Path) -> Result<usize, PrepError> {
    let file = File::open(zip_path).map_err(PrepError::io_at(zip_path))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|source| PrepError::Archive {
        path: zip_path.to_path_buf(),
        source,
    })?;
    fs::create_dir_all(dest).map_err(PrepError::io_at(dest))?;

    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|source| PrepError::Archive {
            path: zip_path.to_path_buf(),
            source,
        })?;

        let Some(rel) = entry.enclosed_name() else {
            warn!("Skipping unsafe entry '{}' in {}", entry.name(), zip_path.display());
            continue;
        };
        let out_path = dest.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(PrepError::io_at(&out_path))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(PrepError::io_at(parent))?;
        }
        let mut out = File::create(&out_path).map_err(PrepError::io_at(&out_path))?;
        std::io::copy(&mut entry, &mut out).map_err(PrepError::io_at(&out_path))?;
        written += 1;
    }

    Ok(written)
}

/// Extract every archive under `root`.
///
/// A corrupt archive is recorded as a failure and its partially extracted
/// directory removed; the run continues.
pub fn run_unzip(root: &Path, dry_run: bool) -> Result<UnzipReport, PrepError> {
    layout::require_dir(root)?;
    let archives = layout::find_files_with_extension(root, ZIP_EXTENSION)?;
    info!("Found {} zip files under {}", archives.len(), root.display());

    let mut report = UnzipReport {
        dry_run,
        total: archives.len(),
        ..Default::default()
    };

    for (index, zip_path) in archives.iter().enumerate() {
        let rel = zip_path.strip_prefix(root).unwrap_or(zip_path);
        let dest = extract_dir_for(zip_path);
        if dest.exists() {
            info!("[{}/{}] {} already extracted, skipping", index + 1, archives.len(), rel.display());
            report.skipped += 1;
            continue;
        }

        if dry_run {
            info!("[{}/{}] Would extract {}", index + 1, archives.len(), rel.display());
            report.extracted += 1;
            continue;
        }

        info!("[{}/{}] Extracting {}", index + 1, archives.len(), rel.display());
        match extract_zip(zip_path, &dest) {
            Ok(files) => {
                info!("Extracted {} files from {}", files, rel.display());
                report.extracted += 1;
            }
            Err(err) => {
                error!("Failed to extract {}: {}", zip_path.display(), err);
                if dest.exists() {
                    if let Err(cleanup) = fs::remove_dir_all(&dest) {
                        warn!("Could not remove {}: {}", dest.display(), cleanup);
                    }
                }
                report.failures.push(FailedUnit {
                    path: zip_path.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    Ok(report)
}
