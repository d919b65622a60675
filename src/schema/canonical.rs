//! Loading the canonical schema.
//!
//! Two shapes are supported: a JSON list of COCO-style category records
//! (`categories.json`) and a YOLO reference `data.yaml` whose `names` field
//! maps class index to class name. Both are loaded once per run and are
//! read-only afterwards.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::ids::{CategoryId, ClassId};
use super::remap::normalize_name;
use crate::error::PrepError;

/// One canonical category record.
///
/// Fields other than `id` and `name` are carried through untouched so that
/// the list written into annotation files matches the canonical file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalCategory {
    pub id: CategoryId,
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CanonicalCategory {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: CategoryId::new(id),
            name: name.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// The canonical category list, indexed by trimmed name.
#[derive(Clone, Debug)]
pub struct CanonicalCategories {
    /// Sorted ascending by ID.
    categories: Vec<CanonicalCategory>,
    by_name: BTreeMap<String, usize>,
}

impl CanonicalCategories {
    /// Load a JSON list of `{id, name, ...}` records.
    pub fn load(path: &Path) -> Result<Self, PrepError> {
        if !path.is_file() {
            return Err(PrepError::CanonicalNotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(PrepError::io_at(path))?;
        let categories: Vec<CanonicalCategory> =
            serde_json::from_str(&text).map_err(|source| PrepError::JsonParse {
                path: path.to_path_buf(),
                source,
            })?;

        let canonical = Self::from_categories(categories, path)?;
        info!(
            "Loaded {} canonical categories from {}",
            canonical.len(),
            path.display()
        );
        Ok(canonical)
    }

    /// Build from records. `source` only labels errors.
    pub fn from_categories(
        mut categories: Vec<CanonicalCategory>,
        source: &Path,
    ) -> Result<Self, PrepError> {
        categories.sort_by_key(|cat| cat.id);

        let mut by_name: BTreeMap<String, usize> = BTreeMap::new();
        for (index, cat) in categories.iter().enumerate() {
            let key = normalize_name(&cat.name).to_string();
            if let Some(&previous) = by_name.get(&key) {
                return Err(PrepError::DuplicateCanonicalName {
                    path: source.to_path_buf(),
                    name: key,
                    first: categories[previous].id.as_i64(),
                    second: cat.id.as_i64(),
                });
            }
            by_name.insert(key, index);
        }

        Ok(Self {
            categories,
            by_name,
        })
    }

    /// Look up a category by (untrimmed) name.
    pub fn lookup(&self, name: &str) -> Option<&CanonicalCategory> {
        self.by_name
            .get(normalize_name(name))
            .map(|&index| &self.categories[index])
    }

    pub fn contains_id(&self, id: CategoryId) -> bool {
        self.categories
            .binary_search_by_key(&id, |cat| cat.id)
            .is_ok()
    }

    /// All records, sorted ascending by ID.
    pub fn sorted(&self) -> &[CanonicalCategory] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// The canonical class-index mapping of a reference `data.yaml`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassMapping {
    names: BTreeMap<ClassId, String>,
    by_name: BTreeMap<String, ClassId>,
}

impl ClassMapping {
    /// Load the `names` field of a reference `data.yaml`.
    pub fn load(path: &Path) -> Result<Self, PrepError> {
        if !path.is_file() {
            return Err(PrepError::CanonicalNotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(PrepError::io_at(path))?;
        let names = parse_names_yaml(&text, path)?.ok_or_else(|| PrepError::InvalidDocument {
            path: path.to_path_buf(),
            message: "reference data.yaml has no 'names' field".to_string(),
        })?;

        let mapping = Self::from_names(names, path)?;
        info!(
            "Loaded reference mapping with {} classes from {}",
            mapping.len(),
            path.display()
        );
        Ok(mapping)
    }

    /// Build from an index → name map. Names are stored trimmed.
    pub fn from_names(
        names: BTreeMap<ClassId, String>,
        source: &Path,
    ) -> Result<Self, PrepError> {
        let mut trimmed = BTreeMap::new();
        let mut by_name: BTreeMap<String, ClassId> = BTreeMap::new();

        for (id, name) in names {
            let key = normalize_name(&name).to_string();
            if let Some(previous) = by_name.get(&key) {
                return Err(PrepError::DuplicateCanonicalName {
                    path: source.to_path_buf(),
                    name: key,
                    first: i64::from(previous.as_u32()),
                    second: i64::from(id.as_u32()),
                });
            }
            by_name.insert(key.clone(), id);
            trimmed.insert(id, key);
        }

        Ok(Self {
            names: trimmed,
            by_name,
        })
    }

    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(normalize_name(name)).copied()
    }

    pub fn contains_id(&self, id: ClassId) -> bool {
        self.names.contains_key(&id)
    }

    /// Index → trimmed name, ascending by index.
    pub fn names(&self) -> &BTreeMap<ClassId, String> {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct DataYaml {
    #[serde(default)]
    names: Option<DataYamlNames>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataYamlNames {
    Sequence(Vec<String>),
    Mapping(BTreeMap<u32, String>),
}

/// Parse the `names` field of a `data.yaml` document.
///
/// Both the list form and the index mapping form are accepted. Returns
/// `None` when the document has no `names` field.
pub fn parse_names_yaml(
    text: &str,
    path: &Path,
) -> Result<Option<BTreeMap<ClassId, String>>, PrepError> {
    let parsed: DataYaml = serde_yaml::from_str(text).map_err(|source| PrepError::YamlParse {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(parsed.names.map(|names| match names {
        DataYamlNames::Sequence(names) => names
            .into_iter()
            .enumerate()
            .map(|(index, name)| (ClassId::new(index as u32), name))
            .collect(),
        DataYamlNames::Mapping(mapping) => mapping
            .into_iter()
            .map(|(index, name)| (ClassId::new(index), name))
            .collect(),
    }))
}
