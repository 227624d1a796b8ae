//! YAML catalog loader: the external configuration collaborator that loads
//! a `paths.yml`-shaped document keyed by catalog entry name.
//!
//! A relative `yaml_path` is resolved against the directory containing the
//! running executable, not the process's current working directory, so a
//! catalog shipped alongside a binary is found regardless of where that
//! binary is invoked from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::collection::{filter_all, DatasetCollection, UniqueRules};
use crate::dataset::{ClashDefault, ClashRule};
use crate::error::{Error, Result};
use crate::filter::SearchTerms;

/// A YAML scalar or sequence of scalars — the same "accepts a string or a
/// list" polymorphism `select` supports, applied here to
/// `format_dirs`/`format_file`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawClashDefault {
    High,
    Low,
    Error,
}

impl From<RawClashDefault> for ClashDefault {
    fn from(value: RawClashDefault) -> Self {
        match value {
            RawClashDefault::High => ClashDefault::High,
            RawClashDefault::Low => ClashDefault::Low,
            RawClashDefault::Error => ClashDefault::Error,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawClashRule {
    #[serde(default)]
    pub preferences: Vec<String>,
    pub default: RawClashDefault,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub format_dirs: OneOrMany,
    pub format_file: OneOrMany,
    #[serde(default)]
    pub unique: Option<HashMap<String, RawClashRule>>,
}

/// The full parsed catalog: every top-level key mapped to its entry.
pub type Catalog = HashMap<String, CatalogEntry>;

/// Resolves `yaml_path` against the running executable's directory when
/// relative.
fn resolve_yaml_path(yaml_path: &Path) -> PathBuf {
    if yaml_path.is_absolute() {
        return yaml_path.to_path_buf();
    }
    match std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
        Some(dir) => dir.join(yaml_path),
        None => yaml_path.to_path_buf(),
    }
}

fn load_catalog(yaml_path: &Path) -> Result<Catalog> {
    let resolved = resolve_yaml_path(yaml_path);
    let contents = std::fs::read_to_string(&resolved)?;
    let catalog: Catalog = serde_yaml::from_str(&contents)?;
    Ok(catalog)
}

fn entry_for<'a>(catalog: &'a Catalog, key: &str, yaml_path: &Path) -> Result<&'a CatalogEntry> {
    catalog.get(key).ok_or_else(|| Error::ConfigKeyMissing {
        key: key.to_string(),
        yaml_path: yaml_path.to_path_buf(),
    })
}

fn unique_rules(entry: &CatalogEntry) -> Result<Option<UniqueRules>> {
    let Some(raw) = &entry.unique else { return Ok(None) };
    let mut rules = UniqueRules::new();
    for (key, rule) in raw {
        rules.insert(key.clone(), ClashRule::new(rule.preferences.clone(), rule.default.into()));
    }
    Ok(Some(rules))
}

/// Loads catalog entry `key` from `yaml_path` and returns a closure that
/// calls `filter_all` with its `format_dirs`/`format_file`/`unique` already
/// bound.
pub fn paths(key: &str, yaml_path: &Path) -> Result<impl Fn(bool, SearchTerms) -> Result<DatasetCollection>> {
    let catalog = load_catalog(yaml_path)?;
    let entry = entry_for(&catalog, key, yaml_path)?.clone();
    let unique = unique_rules(&entry)?;
    let format_dirs = entry.format_dirs.into_vec();
    let format_file = entry.format_file.into_vec();

    Ok(move |exact: bool, search: SearchTerms| filter_all(&format_dirs, &format_file, unique.as_ref(), exact, search))
}

/// Loads catalog entry `key` from `yaml_path` and immediately searches,
/// equivalent to `paths(key, yaml_path)(exact, search)` but without the
/// intermediate closure.
pub fn get_datasets(key: &str, yaml_path: &Path, exact: bool, search: SearchTerms) -> Result<DatasetCollection> {
    let catalog = load_catalog(yaml_path)?;
    let entry = entry_for(&catalog, key, yaml_path)?;
    let unique = unique_rules(entry)?;
    let format_dirs = entry.format_dirs.clone().into_vec();
    let format_file = entry.format_file.clone().into_vec();
    filter_all(&format_dirs, &format_file, unique.as_ref(), exact, search)
}
