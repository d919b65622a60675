//! Train/validation splitting by filename list.
//!
//! The list names images (one per line). Each listed image is moved from
//! `images/train` to `images/val`, and its label (`<stem>.txt`) from
//! `labels/train` to `labels/val`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::PrepError;
use crate::layout;

/// Directory layout of a split.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SplitDirs {
    pub train_images: PathBuf,
    pub val_images: PathBuf,
    pub train_labels: PathBuf,
    pub val_labels: PathBuf,
}

impl SplitDirs {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            train_images: data_dir.join("images").join("train"),
            val_images: data_dir.join("images").join("val"),
            train_labels: data_dir.join("labels").join("train"),
            val_labels: data_dir.join("labels").join("val"),
        }
    }
}

/// Outcome of a split run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SplitReport {
    pub dry_run: bool,
    pub listed: usize,
    pub images_moved: usize,
    pub images_not_found: usize,
    pub labels_moved: usize,
    pub labels_not_found: usize,
    pub dirs: SplitDirs,
}

impl fmt::Display for SplitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Split summary ({} listed)", self.listed)?;
        writeln!(f, "  Images moved:      {}", self.images_moved)?;
        writeln!(f, "  Images not found:  {}", self.images_not_found)?;
        writeln!(f, "  Labels moved:      {}", self.labels_moved)?;
        writeln!(f, "  Labels not found:  {}", self.labels_not_found)?;
        if self.dry_run {
            writeln!(f, "\nThis was a DRY RUN: no files were moved.")
        } else {
            writeln!(f)?;
            writeln!(f, "Train images: {}", self.dirs.train_images.display())?;
            writeln!(f, "Val images:   {}", self.dirs.val_images.display())?;
            writeln!(f, "Train labels: {}", self.dirs.train_labels.display())?;
            writeln!(f, "Val labels:   {}", self.dirs.val_labels.display())
        }
    }
}

/// Read image names from a list file: trimmed, blank lines skipped.
pub fn read_name_list(path: &Path) -> Result<Vec<String>, PrepError> {
    let text = fs::read_to_string(path).map_err(PrepError::io_at(path))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Move the listed images and their labels from train to val.
pub fn split_train_val(
    val_list: &Path,
    data_dir: &Path,
    dry_run: bool,
) -> Result<SplitReport, PrepError> {
    layout::require_dir(data_dir)?;
    let dirs = SplitDirs::new(data_dir);
    let names = read_name_list(val_list)?;
    info!(
        "Found {} validation images in {}",
        names.len(),
        val_list.display()
    );

    if !dry_run {
        fs::create_dir_all(&dirs.val_images).map_err(PrepError::io_at(&dirs.val_images))?;
        fs::create_dir_all(&dirs.val_labels).map_err(PrepError::io_at(&dirs.val_labels))?;
    }

    let mut report = SplitReport {
        dry_run,
        listed: names.len(),
        images_moved: 0,
        images_not_found: 0,
        labels_moved: 0,
        labels_not_found: 0,
        dirs,
    };

    for image_name in &names {
        let image_src = report.dirs.train_images.join(image_name);
        let image_dst = report.dirs.val_images.join(image_name);
        let label_name = label_file_name(image_name);
        let label_src = report.dirs.train_labels.join(&label_name);
        let label_dst = report.dirs.val_labels.join(&label_name);

        let image_exists = image_src.is_file();
        if image_exists {
            if dry_run {
                info!("Would move image: {}", image_name);
            } else {
                move_file(&image_src, &image_dst)?;
            }
            report.images_moved += 1;
        } else {
            warn!("Image not found: {}", image_name);
            report.images_not_found += 1;
        }

        if label_src.is_file() {
            if dry_run {
                info!("Would move label: {}", label_name);
            } else {
                move_file(&label_src, &label_dst)?;
            }
            report.labels_moved += 1;
        } else {
            if image_exists {
                warn!("Label not found: {}", label_name);
            }
            report.labels_not_found += 1;
        }
    }

    Ok(report)
}

/// `<stem>.txt` for an image file name.
pub fn label_file_name(image_name: &str) -> String {
    let stem = Path::new(image_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| image_name.to_string());
    format!("{stem}.txt")
}

/// Rename, falling back to copy + remove when rename is not possible
/// (e.g. across filesystems).
pub(crate) fn move_file(src: &Path, dst: &Path) -> Result<(), PrepError> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    fs::copy(src, dst).map_err(PrepError::io_at(dst))?;
    fs::remove_file(src).map_err(PrepError::io_at(src))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).expect("create parent");
        fs::write(path, content).expect("write file");
    }

    fn sample(root: &Path) {
        write(&root.join("images/train/a.jpg"), "a");
        write(&root.join("images/train/b.png"), "b");
        write(&root.join("images/train/c.jpg"), "c");
        write(&root.join("labels/train/a.txt"), "0 0.5 0.5 0.1 0.1\n");
        write(&root.join("labels/train/c.txt"), "1 0.5 0.5 0.1 0.1\n");
        write(&root.join("val.txt"), "a.jpg\n\n  b.png \nmissing.jpg\n");
    }

    #[test]
    fn label_name_replaces_extension() {
        assert_eq!(label_file_name("img.001.jpeg"), "img.001.txt");
        assert_eq!(label_file_name("noext"), "noext.txt");
    }

    #[test]
    fn split_moves_images_and_labels() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let root = temp.path();
        sample(root);

        let report = split_train_val(&root.join("val.txt"), root, false).expect("split");
        assert_eq!(report.listed, 3);
        assert_eq!(report.images_moved, 2);
        assert_eq!(report.images_not_found, 1);
        assert_eq!(report.labels_moved, 1);
        assert_eq!(report.labels_not_found, 2);

        assert!(root.join("images/val/a.jpg").is_file());
        assert!(root.join("images/val/b.png").is_file());
        assert!(!root.join("images/train/a.jpg").exists());
        assert!(root.join("images/train/c.jpg").is_file());
        assert!(root.join("labels/val/a.txt").is_file());
        assert!(root.join("labels/train/c.txt").is_file());
    }

    #[test]
    fn dry_run_moves_nothing() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let root = temp.path();
        sample(root);

        let report = split_train_val(&root.join("val.txt"), root, true).expect("split");
        assert_eq!(report.images_moved, 2);
        assert_eq!(report.labels_moved, 1);
        assert!(root.join("images/train/a.jpg").is_file());
        assert!(!root.join("images/val").exists());
    }
}
