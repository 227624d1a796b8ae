//! FilterMatcher: removes candidate strings whose extracted placeholder
//! values don't satisfy a set of search terms. Error handling here is
//! all-or-nothing per item: any failure while processing a single item (a
//! format mismatch, or a non-integer `!start`/`!end` range bound) simply
//! drops that item rather than aborting the whole filter. Contrast with
//! `dataset::Dataset::collate_info`, where the same range expansion is
//! *not* guarded and a parse failure legitimately propagates to the caller.

use std::collections::HashMap;

use crate::error::Result;
use crate::format::extract;

pub type SearchTerms = HashMap<String, Vec<String>>;
pub type ExactOverrides = HashMap<String, bool>;

/// Normalises a raw `{key: "single" | ["a", "b"]}`-shaped map into
/// `SearchTerms`, promoting a lone string into a singleton list.
pub fn search_terms_from<I, V>(iter: I) -> SearchTerms
where
    I: IntoIterator<Item = (String, V)>,
    V: Into<OneOrMany>,
{
    iter.into_iter()
        .map(|(k, v)| (k, v.into().into_vec()))
        .collect()
}

/// A value that is either a single string or a list of strings, the
/// polymorphism `select` and other search-term-accepting calls support.
#[derive(Debug, Clone)]
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

impl From<String> for OneOrMany {
    fn from(value: String) -> Self {
        OneOrMany::One(value)
    }
}

impl From<&str> for OneOrMany {
    fn from(value: &str) -> Self {
        OneOrMany::One(value.to_string())
    }
}

impl From<Vec<String>> for OneOrMany {
    fn from(value: Vec<String>) -> Self {
        OneOrMany::Many(value)
    }
}

/// Generates the inclusive `[start, end]` year range as strings, used to
/// expand a `!start`/`!end` placeholder pair into its full set of values.
/// Both bounds must parse as integers; a non-integer bound fails the whole
/// range rather than falling back to a default.
pub fn year_range(start: &str, end: &str) -> Result<Vec<String>> {
    let start: i64 = start.trim().parse()?;
    let end: i64 = end.trim().parse()?;
    Ok((start..=end).map(|year| year.to_string()).collect())
}

fn evaluate_item(
    item: &str,
    format: &str,
    search: &SearchTerms,
    exact: bool,
    exact_overrides: &ExactOverrides,
) -> bool {
    let extracted = match extract(format, item) {
        Ok(bindings) => bindings,
        Err(_) => return false,
    };

    for (raw_key, value) in &extracted {
        let (base, tag) = match raw_key.split_once('!') {
            Some((base, "start")) => (base, Some("start")),
            Some((base, "end")) => (base, Some("end")),
            _ => (raw_key.as_str(), None),
        };
        if tag == Some("end") {
            continue;
        }

        let is_range = tag == Some("start");
        let range_values: Vec<String> = if is_range {
            let end_key = format!("{base}!end");
            let Some(end_value) = extracted.get(&end_key) else {
                return false;
            };
            match year_range(value, end_value) {
                Ok(values) => values,
                Err(_) => return false,
            }
        } else {
            Vec::new()
        };

        let Some(queries) = search.get(base) else {
            continue;
        };

        let mut passed = false;
        for query in queries {
            if is_range {
                if range_values.iter().any(|v| v == query) {
                    passed = true;
                }
            } else {
                let use_exact = exact_overrides.get(base).copied().unwrap_or(exact);
                if use_exact {
                    if query.to_lowercase() == value.to_lowercase() {
                        passed = true;
                    }
                } else if value.to_lowercase().contains(&query.to_lowercase()) {
                    passed = true;
                }
            }
            if passed {
                break;
            }
        }
        if !passed {
            return false;
        }
    }

    true
}

/// Filters `items` in place, keeping only those whose placeholder values
/// (as extracted via `format`) satisfy every key present in `search`.
pub fn match_values(
    items: &mut Vec<String>,
    format: &str,
    search: &SearchTerms,
    exact: bool,
    exact_overrides: &ExactOverrides,
) {
    items.retain(|item| evaluate_item(item, format, search, exact, exact_overrides));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(pairs: &[(&str, &[&str])]) -> SearchTerms {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let mut items = vec!["access-cm2".to_string(), "csiro-mk3".to_string()];
        let search = terms(&[("model", &["ACCESS"])]);
        match_values(&mut items, "{model}", &search, false, &ExactOverrides::new());
        assert_eq!(items, vec!["access-cm2".to_string()]);
    }

    #[test]
    fn exact_match_rejects_substrings() {
        let mut items = vec!["access-cm2".to_string(), "access".to_string()];
        let search = terms(&[("model", &["access"])]);
        match_values(&mut items, "{model}", &search, true, &ExactOverrides::new());
        assert_eq!(items, vec!["access".to_string()]);
    }

    #[test]
    fn range_binding_matches_any_year_in_range() {
        let mut items = vec!["1960-1963".to_string(), "1970-1975".to_string()];
        let search = terms(&[("year", &["1962"])]);
        match_values(
            &mut items,
            "{year!start}-{year!end}",
            &search,
            false,
            &ExactOverrides::new(),
        );
        assert_eq!(items, vec!["1960-1963".to_string()]);
    }

    #[test]
    fn malformed_item_is_dropped_not_propagated() {
        let mut items = vec!["keep.nc".to_string(), "no-match.txt".to_string()];
        let search = SearchTerms::new();
        match_values(&mut items, "{var}.nc", &search, false, &ExactOverrides::new());
        assert_eq!(items, vec!["keep.nc".to_string()]);
    }
}
