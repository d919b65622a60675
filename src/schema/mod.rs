//! Canonical schema and per-dataset remap tables.
//!
//! The canonical schema is the single authoritative category/class list
//! every dataset is normalized to. Each dataset declares its own local IDs;
//! a [`RemapTable`] built from trimmed-name equality translates them.

pub mod canonical;
mod ids;
pub mod remap;

pub use canonical::{CanonicalCategories, CanonicalCategory, ClassMapping};
pub use ids::{CategoryId, ClassId};
pub use remap::{
    normalize_name, DamageSet, RemapEntry, RemapOutcome, RemapTable, UnmappedPolicy,
    DEFAULT_DAMAGE_CLASSES,
};
