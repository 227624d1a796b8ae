//! `DatasetCollection` and the top-level `filter_all` orchestrator, the
//! engine's top-level entry point: it walks directory templates, groups
//! matches into datasets, adopts a working file template per dataset, and
//! applies clash-resolution priority rules across the whole collection.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::path::{Path, MAIN_SEPARATOR};

use ahash::AHasher;
use indexmap::IndexMap;

use crate::dataset::{ensure_trailing_sep, resolve_clash, ClashDefault, ClashRule, Dataset};
use crate::error::Result;
use crate::filter::{ExactOverrides, SearchTerms};
use crate::format::{extract, placeholder_names};
use crate::walk::{split_at_first_placeholder, walk};

/// Per-coordinate clash rules supplied to `filter_all`, matching the
/// catalog's `unique:` block.
pub type UniqueRules = HashMap<String, ClashRule>;

/// An ordered collection of [`Dataset`]s, none of which share identical
/// `data` — datasets with matching coordinates must be merged instead.
#[derive(Debug, Clone, Default)]
pub struct DatasetCollection {
    pub items: Vec<Dataset>,
}

impl DatasetCollection {
    pub fn new() -> Self {
        DatasetCollection { items: Vec::new() }
    }

    pub fn add(&mut self, item: Dataset) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The de-duplicated, first-seen-order list of `data[key]` values across
    /// every member dataset.
    pub fn get_all(&self, key: &str) -> Vec<String> {
        let mut values = Vec::new();
        for item in &self.items {
            if let Some(value) = item.data.get(key) {
                if !values.contains(value) {
                    values.push(value.clone());
                }
            }
        }
        values
    }

    /// Applies `select` to every member dataset.
    pub fn select(&mut self, exact: bool, terms: &SearchTerms) -> &mut Self {
        for item in self.items.iter_mut() {
            item.select(exact, terms.clone());
        }
        self
    }

    /// Applies `deselect` to every member dataset.
    pub fn deselect(&mut self, keys: &[&str]) -> &mut Self {
        for item in self.items.iter_mut() {
            item.deselect(keys);
        }
        self
    }

    /// First filters via `includes` (dropping datasets the selection would
    /// leave empty), then applies `select` to the survivors.
    pub fn select_remove_empty(&mut self, exact: bool, terms: &SearchTerms) -> Result<&mut Self> {
        let survivors = self.includes(exact, terms)?;
        self.items = survivors.items;
        self.select(exact, terms);
        Ok(self)
    }

    /// Flattens every member dataset's resolved file list into one `Vec`.
    pub fn get_files(&mut self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for item in self.items.iter_mut() {
            files.extend(item.get_files()?);
        }
        Ok(files)
    }

    /// Returns the subset of members whose coordinates match `terms`
    /// (`Dataset::match`).
    pub fn filter(&self, exact: bool, terms: &SearchTerms) -> DatasetCollection {
        DatasetCollection {
            items: self.items.iter().filter(|item| item.r#match(exact, terms)).cloned().collect(),
        }
    }

    /// Returns the subset of members whose collated file info matches
    /// `terms` (`Dataset::includes`).
    pub fn includes(&self, exact: bool, terms: &SearchTerms) -> Result<DatasetCollection> {
        let mut kept = Vec::new();
        for item in &self.items {
            let mut item = item.clone();
            if item.includes(exact, terms)? {
                kept.push(item);
            }
        }
        Ok(DatasetCollection { items: kept })
    }

    fn compare(&self, other: &DatasetCollection, match_keys: Option<&[String]>) -> (Vec<usize>, Vec<usize>) {
        let mut matched = Vec::new();
        let mut unmatched = Vec::new();

        'item: for (i, item) in self.items.iter().enumerate() {
            let mut success = false;
            for check in &other.items {
                let common_keys: Vec<String> = match match_keys {
                    Some(keys) => {
                        if keys.iter().any(|k| !item.data.contains_key(k)) {
                            break;
                        }
                        if keys.iter().any(|k| !check.data.contains_key(k)) {
                            break;
                        }
                        keys.to_vec()
                    }
                    None => {
                        let common: Vec<String> = item
                            .data
                            .keys()
                            .filter(|k| check.data.contains_key(k.as_str()))
                            .cloned()
                            .collect();
                        if common.is_empty() {
                            break;
                        }
                        common
                    }
                };

                success = common_keys.iter().all(|key| item.data.get(key) == check.data.get(key));
                if success {
                    break;
                }
            }

            if success {
                matched.push(i);
            } else {
                unmatched.push(i);
            }
            continue 'item;
        }

        (matched, unmatched)
    }

    /// Datasets in `self` whose coordinates (restricted to `match_keys`, or
    /// every shared key when `None`) match some dataset in `other`.
    pub fn find_matches(&self, other: &DatasetCollection, match_keys: Option<&[String]>) -> DatasetCollection {
        let (matched, _) = self.compare(other, match_keys);
        DatasetCollection {
            items: matched.into_iter().map(|i| self.items[i].clone()).collect(),
        }
    }

    /// Datasets in `self` whose coordinates do not appear in `other`.
    pub fn find_missing(&self, other: &DatasetCollection, match_keys: Option<&[String]>) -> DatasetCollection {
        let (_, unmatched) = self.compare(other, match_keys);
        DatasetCollection {
            items: unmatched.into_iter().map(|i| self.items[i].clone()).collect(),
        }
    }

    /// A tabular projection of every member dataset, made concrete as plain
    /// rows since this crate has no dataframe dependency of its own.
    pub fn to_rows(&mut self) -> Result<Vec<IndexMap<String, serde_json::Value, BuildHasherDefault<AHasher>>>> {
        self.items.iter_mut().map(|item| item.to_row()).collect()
    }

    /// Removes `column` from every dataset's coordinates, merging datasets
    /// that newly share identical remaining coordinates. Where two merging
    /// datasets differ on `column`'s value, the winner is chosen the same
    /// way `Dataset::get_files` resolves a file-level clash — by `column`'s
    /// priority rule, registering a default `{preferences: [], default:
    /// Error}` rule first if none of the member datasets declared one.
    pub fn condense(&mut self, column: &str) -> Result<()> {
        let rule = self
            .items
            .iter()
            .find_map(|d| d.priority.get(column).cloned())
            .unwrap_or_else(|| ClashRule::new(Vec::new(), ClashDefault::Error));

        let mut condensed: Vec<Dataset> = Vec::new();
        let mut representative: Vec<String> = Vec::new();

        for dataset in std::mem::take(&mut self.items) {
            let Some(column_value) = dataset.data.get(column).cloned() else {
                condensed.push(dataset);
                representative.push(String::new());
                continue;
            };

            let mut remaining_data = dataset.data.clone();
            remaining_data.shift_remove(column);

            match condensed.iter().position(|existing| existing.data == remaining_data) {
                None => {
                    let mut new_dataset = dataset;
                    new_dataset.data = remaining_data;
                    condensed.push(new_dataset);
                    representative.push(column_value);
                }
                Some(idx) => {
                    let old_value = representative[idx].clone();
                    if resolve_clash(&rule, column, &old_value, &column_value)? {
                        let mut winner = dataset;
                        winner.data = remaining_data;
                        winner.attempt_merge(&condensed[idx]);
                        condensed[idx] = winner;
                        representative[idx] = column_value;
                    }
                }
            }
        }

        self.items = condensed;
        Ok(())
    }
}

impl<'a> IntoIterator for &'a DatasetCollection {
    type Item = &'a Dataset;
    type IntoIter = std::slice::Iter<'a, Dataset>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl std::ops::Index<usize> for DatasetCollection {
    type Output = Dataset;

    fn index(&self, index: usize) -> &Self::Output {
        &self.items[index]
    }
}

/// Searches one or more directory templates, groups matching entries into
/// datasets by directory coordinates, probes each candidate file template in
/// order and adopts the first that actually yields files, merges datasets
/// sharing identical coordinates, then applies `unique` clash-resolution
/// rules to every dataset.
pub fn filter_all(
    format_dirs: &[String],
    format_file: &[String],
    unique: Option<&UniqueRules>,
    exact: bool,
    search: SearchTerms,
) -> Result<DatasetCollection> {
    let mut collection = DatasetCollection::new();
    let exact_overrides = ExactOverrides::new();

    for dir_template in format_dirs {
        let (start_path, columns) = split_at_first_placeholder(dir_template);
        let start_path_buf = Path::new(&start_path);
        if !start_path_buf.exists() {
            continue;
        }
        let joined_columns = columns.join(&MAIN_SEPARATOR.to_string());

        for entry in walk(start_path_buf, &columns, &search, exact, &exact_overrides) {
            let (relative_root, _children) = entry?;
            let Ok(coordinates) = extract(&joined_columns, &relative_root) else {
                continue;
            };

            let absolute_root = ensure_trailing_sep(format!("{start_path}{relative_root}"));

            let mut adopted: Option<Dataset> = None;
            for file_template in format_file {
                let mut trial = Dataset::new(coordinates.clone(), absolute_root.clone(), file_template.clone());
                match trial.generate_info(true) {
                    Ok(files) if !files.is_empty() => {
                        adopted = Some(trial);
                        break;
                    }
                    _ => continue,
                }
            }

            let Some(mut new_dataset) = adopted else { continue };

            if let Ok(names) = placeholder_names(&new_dataset.format_file) {
                for (key, values) in &search {
                    if !coordinates.contains_key(key) && names.iter().any(|n| n == key) {
                        new_dataset.selected.insert(key.clone(), values.clone());
                        new_dataset.exact_match_dict.insert(key.clone(), exact);
                    }
                }
            }

            let mut merged = false;
            for existing in collection.items.iter_mut() {
                if existing.attempt_merge(&new_dataset) {
                    merged = true;
                    break;
                }
            }
            if !merged {
                collection.add(new_dataset);
            }
        }
    }

    if let Some(unique) = unique {
        for dataset in collection.items.iter_mut() {
            for (key, rule) in unique {
                dataset.prioritise(key, rule.preferences.clone(), Some(rule.default));
            }
        }
    }

    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct Scratch(std::path::PathBuf);
    impl Scratch {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!("dsfind-collection-{name}-{}", std::process::id()));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).unwrap();
            Scratch(dir)
        }
    }
    impl Drop for Scratch {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn filter_all_groups_by_directory_coordinates() {
        let scratch = Scratch::new("basic");
        let root = &scratch.0;
        for (model, scenario, var, year) in [
            ("ACCESS", "hist", "tas", "1960"),
            ("ACCESS", "hist", "pr", "1960"),
            ("ACCESS", "ssp245", "tas", "1960"),
            ("CSIRO", "hist", "tas", "1960"),
        ] {
            let dir = root.join(model).join(scenario).join(var);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join(format!("{year}.nc")), "").unwrap();
        }

        let dir_template = format!("{}{MAIN_SEPARATOR}{{model}}{MAIN_SEPARATOR}{{scenario}}{MAIN_SEPARATOR}", root.display());
        let file_template = format!("{MAIN_SEPARATOR}{{var}}{MAIN_SEPARATOR}{{year}}.nc");

        let mut collection = filter_all(
            &[dir_template],
            &[file_template],
            None,
            false,
            SearchTerms::new(),
        )
        .unwrap();

        assert_eq!(collection.len(), 3);
        let files = collection.get_files().unwrap();
        assert_eq!(files.len(), 4);
    }

    #[test]
    fn filter_all_merges_same_coordinates_across_two_roots() {
        let scratch = Scratch::new("tworoots");
        let a = scratch.0.join("a");
        let b = scratch.0.join("b");
        fs::create_dir_all(a.join("ACCESS")).unwrap();
        fs::write(a.join("ACCESS").join("tas.nc"), "").unwrap();
        fs::create_dir_all(b.join("ACCESS")).unwrap();
        fs::write(b.join("ACCESS").join("pr.nc"), "").unwrap();

        let dir_templates = vec![
            format!("{}{MAIN_SEPARATOR}{{model}}{MAIN_SEPARATOR}", a.display()),
            format!("{}{MAIN_SEPARATOR}{{model}}{MAIN_SEPARATOR}", b.display()),
        ];
        let file_template = "{var}.nc".to_string();

        let mut collection = filter_all(&dir_templates, &[file_template], None, false, SearchTerms::new()).unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.items[0].roots.len(), 2);
        let files = collection.get_files().unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn find_missing_returns_unmatched_by_keys() {
        let scratch = Scratch::new("missing");
        let root = &scratch.0;
        fs::create_dir_all(root.join("ACCESS")).unwrap();
        fs::write(root.join("ACCESS").join("tas.nc"), "").unwrap();
        fs::create_dir_all(root.join("CSIRO")).unwrap();
        fs::write(root.join("CSIRO").join("tas.nc"), "").unwrap();

        let dir_template = format!("{}{MAIN_SEPARATOR}{{model}}{MAIN_SEPARATOR}", root.display());
        let all = filter_all(&[dir_template], &["{var}.nc".to_string()], None, false, SearchTerms::new()).unwrap();

        let mut only_access = DatasetCollection::new();
        only_access.items.push(all.items.iter().find(|d| d.data.get("model").unwrap() == "ACCESS").unwrap().clone());

        let missing = all.find_missing(&only_access, Some(&["model".to_string()]));
        assert_eq!(missing.len(), 1);
        assert_eq!(missing.items[0].data.get("model").unwrap(), "CSIRO");
    }

    #[test]
    fn condense_merges_and_resolves_dropped_coordinate() {
        let mut a = Dataset::new(
            {
                let mut b = crate::format::Bindings::default();
                b.insert("model".to_string(), "ACCESS".to_string());
                b.insert("version".to_string(), "v1".to_string());
                b
            },
            "/a/",
            "{var}.nc",
        );
        a.prioritise("version", vec![], Some(ClashDefault::High));

        let b = Dataset::new(
            {
                let mut m = crate::format::Bindings::default();
                m.insert("model".to_string(), "ACCESS".to_string());
                m.insert("version".to_string(), "v2".to_string());
                m
            },
            "/b/",
            "{var}.nc",
        );

        let mut collection = DatasetCollection { items: vec![a, b] };
        collection.condense("version").unwrap();

        assert_eq!(collection.len(), 1);
        assert!(!collection.items[0].data.contains_key("version"));
        assert_eq!(collection.items[0].data.get("model").unwrap(), "ACCESS");
    }
}
