#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

pub const CANONICAL_CATEGORIES: &str = r#"[
  {"id": 0, "name": "bumper", "supercategory": "exterior"},
  {"id": 1, "name": "door", "supercategory": "exterior"},
  {"id": 2, "name": "hood", "supercategory": "exterior"}
]"#;

pub const REFERENCE_YAML: &str = "train: images/train
val: images/val
names:
  0: bumper
  1: door
  2: hood
  3: mirror
";

pub fn write(path: &Path, content: impl AsRef<[u8]>) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, content).expect("write file");
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).expect("read file")
}

/// Every file under `root` with its bytes, keyed by relative path.
pub fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .map(|entry| entry.expect("walk"))
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let rel = entry.path().strip_prefix(root).unwrap().to_path_buf();
            (rel, fs::read(entry.path()).expect("read file"))
        })
        .collect()
}
