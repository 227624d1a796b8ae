//! `Dataset`: a group of files sharing identical directory-template
//! coordinates. `get_files` below implements a full priority-based clash
//! resolution procedure: candidates are compared pairwise against whatever
//! has already been accepted, and differences on priority keys are settled
//! by each key's `ClashRule`.

use std::hash::BuildHasherDefault;
use std::path::MAIN_SEPARATOR;

use ahash::AHasher;
use indexmap::IndexMap;

use crate::color::print_clash_notice;
use crate::error::{Error, Result};
use crate::filter::{match_values, year_range, ExactOverrides, SearchTerms};
use crate::format::{extract, split_range_tag};
use crate::walk::{split_literal_prefix, walk_to_depth};

/// Order-preserving map of coordinate/priority-key name to a single string,
/// reusing the same hasher as [`crate::format::Bindings`].
pub type PriorityRules = IndexMap<String, ClashRule, BuildHasherDefault<AHasher>>;

/// De-duplicated, sorted value lists keyed by placeholder name, the result
/// of collating every file's bindings across a dataset.
pub type CollatedInfo = IndexMap<String, Vec<String>, BuildHasherDefault<AHasher>>;

/// Governs which value wins when two candidate files differ only in this
/// key. `preferences` establishes a total order (lower index wins); values
/// outside it fall back to `default`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClashRule {
    pub preferences: Vec<String>,
    pub default: ClashDefault,
}

impl ClashRule {
    pub fn new(preferences: Vec<String>, default: ClashDefault) -> Self {
        ClashRule { preferences, default }
    }
}

/// How to resolve a clash between two values neither of which appears in
/// `ClashRule::preferences`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClashDefault {
    High,
    Low,
    Error,
}

/// Picks a winner between `old` and `new` for `key` under `rule`. Returns
/// `true` if `new` wins. `preferences` establishes a total order (earlier
/// entries win); a value outside it falls back to `rule.default`.
pub(crate) fn resolve_clash(rule: &ClashRule, key: &str, old: &str, new: &str) -> Result<bool> {
    let old_rank = rule.preferences.iter().position(|p| p == old);
    let new_rank = rule.preferences.iter().position(|p| p == new);
    match (old_rank, new_rank) {
        (Some(o), Some(n)) => Ok(n < o),
        (Some(_), None) => Ok(false),
        (None, Some(_)) => Ok(true),
        (None, None) => match rule.default {
            ClashDefault::High => Ok(new > old),
            ClashDefault::Low => Ok(new < old),
            ClashDefault::Error => Err(Error::UnresolvedClash {
                key: key.to_string(),
                old: old.to_string(),
                new: new.to_string(),
            }),
        },
    }
}

/// A group of files sharing identical directory-template coordinates.
///
/// `data` keys are exactly the placeholder names (`!` stripped) that appear
/// in the directory template; `roots` is non-empty, deduplicated, and every
/// entry ends with [`MAIN_SEPARATOR`].
#[derive(Debug, Clone)]
pub struct Dataset {
    pub data: crate::format::Bindings,
    pub roots: Vec<String>,
    pub format_file: String,
    pub selected: SearchTerms,
    pub priority: PriorityRules,
    pub exact_match_dict: ExactOverrides,
    info: Option<CollatedInfo>,
    unfiltered_cache: Option<Vec<(crate::format::Bindings, String)>>,
    filtered_cache: Option<Vec<(crate::format::Bindings, String)>>,
}

impl Dataset {
    pub fn new(data: crate::format::Bindings, root: impl Into<String>, format_file: impl Into<String>) -> Self {
        Dataset {
            data,
            roots: vec![ensure_trailing_sep(root.into())],
            format_file: format_file.into(),
            selected: SearchTerms::new(),
            priority: PriorityRules::default(),
            exact_match_dict: ExactOverrides::new(),
            info: None,
            unfiltered_cache: None,
            filtered_cache: None,
        }
    }

    /// Adds or replaces entries in `selected`, applying `exact` to each
    /// supplied key. Invalidates the filtered-enumeration cache only — the
    /// unfiltered cache is still valid since the underlying files haven't
    /// changed.
    pub fn select(&mut self, exact: bool, terms: SearchTerms) -> &mut Self {
        for (key, values) in terms {
            self.exact_match_dict.insert(key.clone(), exact);
            self.selected.insert(key, values);
        }
        self.filtered_cache = None;
        self.info = None;
        self
    }

    /// Removes entries from `selected`. Invalidates the filtered cache only.
    pub fn deselect(&mut self, keys: &[&str]) -> &mut Self {
        for key in keys {
            self.selected.remove(*key);
            self.exact_match_dict.remove(*key);
        }
        self.filtered_cache = None;
        self.info = None;
        self
    }

    /// Adds or updates `priority[key]`. When both `preferences` is empty and
    /// `default` is `None`, defaults to `{preferences: [], default: Error}`;
    /// a later call replaces `preferences` unconditionally and `default`
    /// only when supplied.
    pub fn prioritise(&mut self, key: &str, preferences: Vec<String>, default: Option<ClashDefault>) -> &mut Self {
        match self.priority.get_mut(key) {
            None => {
                let resolved_default = default.unwrap_or(ClashDefault::Error);
                self.priority.insert(key.to_string(), ClashRule::new(preferences, resolved_default));
            }
            Some(rule) => {
                rule.preferences = preferences;
                if let Some(default) = default {
                    rule.default = default;
                }
            }
        }
        self
    }

    /// `true` iff `self.data == other.data`; when true, appends any of
    /// `other`'s roots not already present and, if that changed anything,
    /// clears the cached enumeration so the new root gets walked too.
    pub fn attempt_merge(&mut self, other: &Dataset) -> bool {
        if self.data != other.data {
            return false;
        }
        let mut changed = false;
        for root in &other.roots {
            if !self.roots.contains(root) {
                self.roots.push(root.clone());
                changed = true;
            }
        }
        if changed {
            self.unfiltered_cache = None;
            self.filtered_cache = None;
            self.info = None;
        }
        true
    }

    /// Enumerates `(bindings, absolute_path)` pairs for every file (or, in
    /// folder mode, terminal directory) under every root. Bindings already
    /// present in `self.data` are elided, since that coordinate is implicit
    /// at the dataset level.
    pub fn generate_info(&mut self, apply_filter: bool) -> Result<Vec<(crate::format::Bindings, String)>> {
        if apply_filter {
            if let Some(cached) = &self.filtered_cache {
                return Ok(cached.clone());
            }
        } else if let Some(cached) = &self.unfiltered_cache {
            return Ok(cached.clone());
        }

        let stripped = self
            .format_file
            .strip_prefix(MAIN_SEPARATOR)
            .unwrap_or(self.format_file.as_str());
        let folder_mode = stripped.ends_with(MAIN_SEPARATOR);
        let trimmed = if folder_mode {
            stripped.trim_end_matches(MAIN_SEPARATOR)
        } else {
            stripped
        };
        let (prefix, residual) = split_literal_prefix(trimmed);
        let depth = residual.matches(MAIN_SEPARATOR).count();

        let mut results = Vec::new();
        for root in self.roots.clone() {
            let start_path = std::path::Path::new(&root).join(&prefix);
            if !start_path.exists() {
                continue;
            }
            for entry in walk_to_depth(&start_path, depth, folder_mode) {
                let (relative_root, mut names) = entry?;
                let mut candidates: Vec<String> = names
                    .drain(..)
                    .map(|name| join_relative(&relative_root, &name))
                    .collect();

                if apply_filter && !self.selected.is_empty() {
                    match_values(&mut candidates, &residual, &self.selected, false, &self.exact_match_dict);
                }

                for candidate in candidates {
                    let Ok(extracted) = extract(&residual, &candidate) else {
                        continue;
                    };
                    let mut bindings = crate::format::Bindings::default();
                    for (key, value) in extracted {
                        if !self.data.contains_key(&key) {
                            bindings.insert(key, value);
                        }
                    }
                    let absolute = normalize_path(&format!("{root}{prefix}{candidate}"));
                    results.push((bindings, absolute));
                }
            }
        }

        if apply_filter {
            self.filtered_cache = Some(results.clone());
        } else {
            self.unfiltered_cache = Some(results.clone());
        }
        Ok(results)
    }

    /// Aggregates every file's bindings into `info`: for each key, the
    /// sorted, de-duplicated list of observed values, with `!start`/`!end`
    /// pairs expanded into the full inclusive integer range under the base
    /// name. Unlike `filter::match_values`'s range expansion, a non-integer
    /// range bound here is *not* swallowed — it propagates to the caller.
    pub fn collate_info(&mut self) -> Result<CollatedInfo> {
        let mut info: CollatedInfo = CollatedInfo::default();
        for (bindings, _path) in self.generate_info(true)? {
            for (raw_key, value) in &bindings {
                let (base, tag) = split_range_tag(raw_key);
                if tag == Some("end") {
                    continue;
                }
                let values = if tag == Some("start") {
                    let end_key = format!("{base}!end");
                    let end_value = bindings.get(&end_key).ok_or_else(|| Error::FormatMismatch {
                        format: self.format_file.clone(),
                        input: format!("missing paired '{end_key}' for range start '{raw_key}'"),
                    })?;
                    year_range(value, end_value)?
                } else {
                    vec![value.clone()]
                };

                let entry = info.entry(base.to_string()).or_default();
                for v in values {
                    if !entry.contains(&v) {
                        entry.push(v);
                    }
                }
            }
        }
        for values in info.values_mut() {
            values.sort();
        }
        self.info = Some(info.clone());
        Ok(info)
    }

    /// Returns the collated info, computing it via `collate_info` if not
    /// already cached.
    pub fn get_info(&mut self) -> Result<&CollatedInfo> {
        if self.info.is_none() {
            self.collate_info()?;
        }
        Ok(self.info.as_ref().expect("just populated"))
    }

    /// `true` iff every key in `terms` is present in `data` and at least one
    /// of its values matches `data[key]` (substring, or exact when `exact`
    /// is set). Matching is case-folded regardless of `exact`.
    pub fn r#match(&self, exact: bool, terms: &SearchTerms) -> bool {
        for (key, values) in terms {
            let Some(data_value) = self.data.get(key) else {
                return false;
            };
            let data_folded = data_value.to_lowercase();
            let matched = values.iter().any(|term| {
                let term_folded = term.to_lowercase();
                if exact {
                    term_folded == data_folded
                } else {
                    data_folded.contains(&term_folded)
                }
            });
            if !matched {
                return false;
            }
        }
        true
    }

    /// Same test as `match`, but against the collated `info` (post-
    /// enumeration file values) rather than the directory coordinates.
    pub fn includes(&mut self, exact: bool, terms: &SearchTerms) -> Result<bool> {
        let info = self.get_info()?.clone();
        for (key, values) in terms {
            let Some(observed) = info.get(key) else {
                return Ok(false);
            };
            let matched = values.iter().any(|term| {
                let term_folded = term.to_lowercase();
                observed.iter().any(|candidate| {
                    let candidate_folded = candidate.to_lowercase();
                    if exact {
                        term_folded == candidate_folded
                    } else {
                        candidate_folded.contains(&term_folded)
                    }
                })
            });
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Enumerates every candidate file, resolves clashes between them, and
    /// returns the winning, path-normalised list.
    ///
    /// For each candidate, compares it against every already-accepted entry:
    /// identical bindings are a duplicate (dropped); any differing key not
    /// under a priority rule means the two coexist as distinct members; if
    /// every differing key *is* under a priority rule, each key's rule picks
    /// a winner, and a disagreement between keys raises `UnresolvedClash`.
    pub fn get_files(&mut self) -> Result<Vec<String>> {
        let candidates = self.generate_info(true)?;
        let mut accepted: Vec<(crate::format::Bindings, String)> = Vec::new();

        'candidate: for (new_info, new_path) in candidates {
            let mut idx = 0;
            while idx < accepted.len() {
                let (old_info, old_path) = accepted[idx].clone();
                let unmatched = differing_keys(&new_info, &old_info);

                if unmatched.is_empty() {
                    continue 'candidate;
                }

                let non_priority_key = unmatched.iter().find(|k| !self.priority.contains_key(*k));
                if non_priority_key.is_some() {
                    idx += 1;
                    continue;
                }

                let mut new_wins: Option<bool> = None;
                for key in &unmatched {
                    let rule = &self.priority[key];
                    let old_value = old_info.get(key).cloned().unwrap_or_default();
                    let new_value = new_info.get(key).cloned().unwrap_or_default();
                    let this_winner_is_new = resolve_clash(rule, key, &old_value, &new_value)?;
                    match new_wins {
                        None => new_wins = Some(this_winner_is_new),
                        Some(previous) if previous == this_winner_is_new => {}
                        Some(_) => {
                            return Err(Error::UnresolvedClash {
                                key: key.clone(),
                                old: old_value,
                                new: new_value,
                            })
                        }
                    }
                }

                if new_wins.unwrap_or(false) {
                    print_clash_notice(&unmatched.join(","), &new_path, &old_path);
                    accepted.remove(idx);
                    continue;
                } else {
                    continue 'candidate;
                }
            }
            accepted.push((new_info, new_path));
        }

        Ok(accepted.into_iter().map(|(_, path)| normalize_path(&path)).collect())
    }

    /// A tabular projection of this dataset: its coordinates plus, for every
    /// collated key with a single observed value, that value directly
    /// (multi-valued keys stay a JSON array).
    pub fn to_row(&mut self) -> Result<IndexMap<String, serde_json::Value, BuildHasherDefault<AHasher>>> {
        let info = self.get_info()?.clone();
        let mut row: IndexMap<String, serde_json::Value, BuildHasherDefault<AHasher>> = IndexMap::default();
        for (key, value) in &self.data {
            row.insert(key.clone(), serde_json::Value::String(value.clone()));
        }
        for (key, values) in &info {
            let value = if values.len() == 1 {
                serde_json::Value::String(values[0].clone())
            } else {
                serde_json::Value::Array(values.iter().cloned().map(serde_json::Value::String).collect())
            };
            row.insert(key.clone(), value);
        }
        row.insert(
            "roots".to_string(),
            serde_json::Value::Array(self.roots.iter().cloned().map(serde_json::Value::String).collect()),
        );
        Ok(row)
    }
}

/// Collects the set of keys whose value differs between `a` and `b`
/// (including keys present in only one of the two maps).
fn differing_keys(a: &crate::format::Bindings, b: &crate::format::Bindings) -> Vec<String> {
    let mut keys: Vec<String> = a.keys().cloned().collect();
    for key in b.keys() {
        if !keys.contains(key) {
            keys.push(key.clone());
        }
    }
    keys.into_iter().filter(|key| a.get(key) != b.get(key)).collect()
}

/// Appends `MAIN_SEPARATOR` to `root` if it doesn't already end with one,
/// so every root in `Dataset::roots` is directly joinable with a relative
/// path.
pub fn ensure_trailing_sep(mut root: String) -> String {
    if !root.ends_with(MAIN_SEPARATOR) {
        root.push(MAIN_SEPARATOR);
    }
    root
}

fn join_relative(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}{MAIN_SEPARATOR}{name}")
    }
}

/// Collapses any accidental doubled path separator left over from joining
/// a root, literal prefix, and relative candidate path.
pub fn normalize_path(path: &str) -> String {
    let doubled = format!("{MAIN_SEPARATOR}{MAIN_SEPARATOR}");
    let mut out = path.to_string();
    while out.contains(&doubled) {
        out = out.replace(&doubled, &MAIN_SEPARATOR.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Bindings;
    use std::fs;

    fn bindings(pairs: &[(&str, &str)]) -> Bindings {
        let mut map = Bindings::default();
        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }
        map
    }

    #[test]
    fn attempt_merge_is_idempotent() {
        let mut a = Dataset::new(bindings(&[("model", "ACCESS")]), "/a/", "{var}.nc");
        let clone = a.clone();
        assert!(a.attempt_merge(&clone));
        assert_eq!(a.roots, vec!["/a/".to_string()]);
    }

    #[test]
    fn attempt_merge_unions_roots_on_matching_coordinates() {
        let mut a = Dataset::new(bindings(&[("model", "ACCESS")]), "/a/", "{var}.nc");
        let b = Dataset::new(bindings(&[("model", "ACCESS")]), "/b/", "{var}.nc");
        assert!(a.attempt_merge(&b));
        assert_eq!(a.roots, vec!["/a/".to_string(), "/b/".to_string()]);
    }

    #[test]
    fn attempt_merge_rejects_different_coordinates() {
        let mut a = Dataset::new(bindings(&[("model", "ACCESS")]), "/a/", "{var}.nc");
        let b = Dataset::new(bindings(&[("model", "CSIRO")]), "/b/", "{var}.nc");
        assert!(!a.attempt_merge(&b));
        assert_eq!(a.roots, vec!["/a/".to_string()]);
    }

    #[test]
    fn prioritise_defaults_to_error_with_no_preferences() {
        let mut d = Dataset::new(bindings(&[("model", "ACCESS")]), "/a/", "{var}.nc");
        d.prioritise("date", vec![], None);
        assert_eq!(d.priority["date"].default, ClashDefault::Error);
        assert!(d.priority["date"].preferences.is_empty());
    }

    #[test]
    fn prioritise_replaces_preferences_but_keeps_default_when_unspecified() {
        let mut d = Dataset::new(bindings(&[("model", "ACCESS")]), "/a/", "{var}.nc");
        d.prioritise("date", vec!["v1".to_string()], Some(ClashDefault::High));
        d.prioritise("date", vec!["v2".to_string()], None);
        assert_eq!(d.priority["date"].preferences, vec!["v2".to_string()]);
        assert_eq!(d.priority["date"].default, ClashDefault::High);
    }

    #[test]
    fn get_files_resolves_clash_by_default_high() {
        let tmp = std::env::temp_dir().join(format!("dsfind-dataset-test-{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        fs::write(tmp.join("data_v20240101.nc"), "").unwrap();
        fs::write(tmp.join("data_v20240301.nc"), "").unwrap();

        let root = ensure_trailing_sep(tmp.to_string_lossy().into_owned());
        let mut d = Dataset::new(Bindings::default(), root, "data_v{date}.nc");
        d.prioritise("date", vec![], Some(ClashDefault::High));

        let files = d.get_files().unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("data_v20240301.nc"));

        fs::remove_dir_all(&tmp).unwrap();
    }

    #[test]
    fn get_files_keeps_entries_that_differ_on_non_priority_key() {
        let tmp = std::env::temp_dir().join(format!("dsfind-dataset-coexist-{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        fs::write(tmp.join("tas_1960.nc"), "").unwrap();
        fs::write(tmp.join("pr_1960.nc"), "").unwrap();

        let root = ensure_trailing_sep(tmp.to_string_lossy().into_owned());
        let mut d = Dataset::new(Bindings::default(), root, "{var}_{year}.nc");
        let files = d.get_files().unwrap();
        assert_eq!(files.len(), 2);

        fs::remove_dir_all(&tmp).unwrap();
    }

    #[test]
    fn range_expansion_in_collated_info() {
        let tmp = std::env::temp_dir().join(format!("dsfind-dataset-range-{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();
        fs::write(tmp.join("1960-1963.nc"), "").unwrap();

        let root = ensure_trailing_sep(tmp.to_string_lossy().into_owned());
        let mut d = Dataset::new(Bindings::default(), root, "{year!start}-{year!end}.nc");
        let info = d.get_info().unwrap();
        assert_eq!(
            info["year"],
            vec!["1960".to_string(), "1961".to_string(), "1962".to_string(), "1963".to_string()]
        );

        fs::remove_dir_all(&tmp).unwrap();
    }

    #[test]
    fn normalize_path_collapses_double_separators() {
        assert_eq!(normalize_path("/a//b///c.nc"), "/a/b/c.nc");
    }

    #[test]
    fn generate_info_preserves_literal_prefix_in_absolute_paths() {
        let tmp = std::env::temp_dir().join(format!("dsfind-dataset-prefix-{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(tmp.join("fixed")).unwrap();
        fs::write(tmp.join("fixed").join("tas.nc"), "").unwrap();

        let root = ensure_trailing_sep(tmp.to_string_lossy().into_owned());
        let mut d = Dataset::new(Bindings::default(), root, "fixed/{var}.nc");
        let files = d.get_files().unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].contains(&format!("fixed{MAIN_SEPARATOR}tas.nc")));
        assert!(fs::metadata(&files[0]).is_ok(), "resolved path must actually exist on disk");

        fs::remove_dir_all(&tmp).unwrap();
    }
}
