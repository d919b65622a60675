//! Dataset tree discovery.
//!
//! Everything that decides *which* files a job touches lives here, so the
//! reconcilers only ever receive explicit file lists.

use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::PrepError;

/// Per-dataset manifest file for COCO-style annotations.
pub const COCO_ANNOTATIONS_FILE: &str = "annotations.json";
/// Per-dataset manifest file for YOLO-style class names.
pub const YOLO_DATA_YAML: &str = "data.yaml";
/// Per-dataset list of images to download.
pub const IMAGES_JSON: &str = "images.json";

const LABEL_EXTENSION: &str = "txt";
const LABELS_DIR: &str = "labels";
const SPLIT_DIRS: [&str; 2] = ["train", "val"];

/// Fail with [`PrepError::RootNotFound`] unless `root` is a directory.
pub fn require_dir(root: &Path) -> Result<(), PrepError> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(PrepError::RootNotFound(root.to_path_buf()))
    }
}

/// All files named `file_name` under `root`, sorted by path.
pub fn find_files_named(root: &Path, file_name: &str) -> Result<Vec<PathBuf>, PrepError> {
    collect_files(root, |path| {
        path.file_name()
            .and_then(|name| name.to_str())
            .map(|name| name == file_name)
            .unwrap_or(false)
    })
}

/// All files under `root` with extension `ext` (case-insensitive), sorted.
pub fn find_files_with_extension(root: &Path, ext: &str) -> Result<Vec<PathBuf>, PrepError> {
    collect_files(root, |path| has_extension(path, ext))
}

/// Keep only paths containing `needle`; `None` keeps everything.
pub fn filter_by_substring(paths: Vec<PathBuf>, needle: Option<&str>) -> Vec<PathBuf> {
    match needle {
        Some(needle) => paths
            .into_iter()
            .filter(|path| path.to_string_lossy().contains(needle))
            .collect(),
        None => paths,
    }
}

/// Name of the directory containing `file`, used to identify a dataset.
pub fn dataset_name(file: &Path) -> String {
    file.parent()
        .and_then(|dir| dir.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// The explicit list of label files a YOLO dataset owns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelManifest {
    files: Vec<PathBuf>,
}

impl LabelManifest {
    pub fn new(mut files: Vec<PathBuf>) -> Self {
        files.sort();
        files.dedup();
        Self { files }
    }

    /// Discover label files under a dataset directory.
    ///
    /// A `.txt` file is a label file when a directory between the dataset
    /// root and the file is named `labels`, or when its parent directory is
    /// `train` or `val`.
    pub fn discover(dataset_dir: &Path) -> Result<Self, PrepError> {
        let files = find_files_with_extension(dataset_dir, LABEL_EXTENSION)?
            .into_iter()
            .filter(|path| is_label_path(dataset_dir, path))
            .collect();
        Ok(Self::new(files))
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_label_path(dataset_dir: &Path, path: &Path) -> bool {
    let in_split_dir = path
        .parent()
        .and_then(|dir| dir.file_name())
        .and_then(|name| name.to_str())
        .map(|name| SPLIT_DIRS.contains(&name))
        .unwrap_or(false);
    if in_split_dir {
        return true;
    }

    let rel = path.strip_prefix(dataset_dir).unwrap_or(path);
    let Some(rel_dir) = rel.parent() else {
        return false;
    };
    rel_dir
        .components()
        .any(|component| matches!(component, Component::Normal(name) if name == LABELS_DIR))
}

fn collect_files(
    root: &Path,
    keep: impl Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, PrepError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|source| PrepError::Traverse {
            path: root.to_path_buf(),
            message: source.to_string(),
        })?;

        if entry.file_type().is_file() && keep(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

fn has_extension(path: &Path, allowed: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(allowed))
        .unwrap_or(false)
}
