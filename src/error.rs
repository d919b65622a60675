use std::path::PathBuf;
use thiserror::Error;

/// The main error type for labelprep operations.
#[derive(Debug, Error)]
pub enum PrepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error at {path}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON from {path}: {source}")]
    JsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write JSON to {path}: {source}")]
    JsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse YAML from {path}: {source}")]
    YamlParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to render YAML: {0}")]
    YamlWrite(#[source] serde_yaml::Error),

    #[error("Canonical schema file not found: {0}")]
    CanonicalNotFound(PathBuf),

    #[error("Root directory not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Canonical schema {path} declares '{name}' more than once (ids {first} and {second})")]
    DuplicateCanonicalName {
        path: PathBuf,
        name: String,
        first: i64,
        second: i64,
    },

    #[error("Invalid document {path}: {message}")]
    InvalidDocument { path: PathBuf, message: String },

    #[error("Unmapped {kind} '{name}' (id {id}) in {path} and the unmapped policy is 'fail'")]
    UnmappedRejected {
        path: PathBuf,
        kind: &'static str,
        name: String,
        id: i64,
    },

    #[error("Label {path} line {line} references unmapped class {class_id} and the unmapped policy is 'fail'")]
    UnmappedLabelRejected {
        path: PathBuf,
        line: usize,
        class_id: i64,
    },

    #[error("Failed while traversing {path}: {message}")]
    Traverse { path: PathBuf, message: String },

    #[error("Failed to render report: {0}")]
    ReportRender(#[source] serde_json::Error),

    #[error("Failed to read zip archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

impl PrepError {
    /// Wrap an IO error with the path it occurred at.
    pub(crate) fn io_at(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| PrepError::IoAt { path, source }
    }
}
