//! Category and class-ID reconciliation.
//!
//! Both reconcilers follow the same shape: build a [`RemapTable`] for one
//! dataset from name equality against the canonical schema, apply it to
//! every dependent file, and return an immutable report.
//!
//! - [`coco`]: COCO `annotations.json` category remapping.
//! - [`yolo`]: YOLO `data.yaml` + label file class-ID remapping with
//!   damage-class removal.
//!
//! [`RemapTable`]: crate::schema::RemapTable

pub mod coco;
pub mod label;
pub mod report;
pub mod yolo;

use crate::schema::UnmappedPolicy;

pub use label::{LabelLineStats, LabelRewrite};
pub use report::{
    CocoFileReport, CocoRunReport, FailedUnit, UnmappedName, YoloDatasetReport, YoloRunReport,
};

/// Options shared by both reconcilers.
#[derive(Clone, Debug, Default)]
pub struct ReconcileOptions {
    /// Perform every read and computation but write nothing.
    pub dry_run: bool,
    /// What to do with references to unmapped names.
    pub unmapped: UnmappedPolicy,
    /// Only process manifests whose path contains this substring.
    pub dataset_filter: Option<String>,
}
