//! FormatCodec: parses `{name}` / `{name:width}` placeholders out of a format
//! string and matches them against an input string, in either direction.
//!
//! The matching algorithm walks the format left-to-right and locates each
//! placeholder's end by a literal substring search for the next separator,
//! rather than anything regex-based — general glob/regex matching isn't
//! needed here. Locating separators by first occurrence means a placeholder
//! value that itself contains the following separator text is mis-parsed:
//! the first occurrence wins. This is a documented limitation, not a bug,
//! and is covered by `first_occurrence_wins_on_ambiguous_separator` below.

use std::hash::BuildHasherDefault;

use ahash::AHasher;
use indexmap::IndexMap;

use crate::error::{Error, Result};

/// Order-preserving string map used throughout the engine for placeholder
/// bindings and dataset coordinates; insertion order always matches
/// placeholder order in the format string.
pub type Bindings = IndexMap<String, String, BuildHasherDefault<AHasher>>;

pub fn bindings_from<I: IntoIterator<Item = (String, String)>>(iter: I) -> Bindings {
    let mut map = Bindings::default();
    for (k, v) in iter {
        map.insert(k, v);
    }
    map
}

/// A single `{name}` or `{name:width}` slot in a format string. The name `*`
/// means "extract but discard"; a `!start`/`!end` suffix pairs this
/// placeholder with another of the same base name into an inclusive range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub name: String,
    pub width: Option<usize>,
}

impl Placeholder {
    /// Splits off a trailing `!start` / `!end` tag, if present. Returns the
    /// base name and the tag.
    pub fn range_tag(&self) -> (&str, Option<&'static str>) {
        match self.name.split_once('!') {
            Some((base, "start")) => (base, Some("start")),
            Some((base, "end")) => (base, Some("end")),
            _ => (&self.name, None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// An ordered sequence of literal and placeholder segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatString {
    pub segments: Vec<Segment>,
}

impl FormatString {
    /// Splits `format` into alternating literal/placeholder segments and
    /// checks that at most one placeholder bears a given `!start`/`!end`
    /// tag pair.
    pub fn parse(format: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = format;

        loop {
            match rest.find('{') {
                None => {
                    if !rest.is_empty() {
                        segments.push(Segment::Literal(rest.to_string()));
                    }
                    break;
                }
                Some(start) => {
                    if start > 0 {
                        segments.push(Segment::Literal(rest[..start].to_string()));
                    }
                    let after_brace = &rest[start + 1..];
                    let end = after_brace.find('}').ok_or_else(|| Error::FormatMismatch {
                        format: format.to_string(),
                        input: String::new(),
                    })?;
                    let body = &after_brace[..end];
                    let (name, width) = match body.split_once(':') {
                        Some((name, width)) => (
                            name.to_string(),
                            Some(width.parse::<usize>().map_err(|_| Error::FormatMismatch {
                                format: format.to_string(),
                                input: String::new(),
                            })?),
                        ),
                        None => (body.to_string(), None),
                    };
                    segments.push(Segment::Placeholder(Placeholder { name, width }));
                    rest = &after_brace[end + 1..];
                }
            }
        }

        let mut seen_start: Vec<&str> = Vec::new();
        let mut seen_end: Vec<&str> = Vec::new();
        for segment in &segments {
            if let Segment::Placeholder(p) = segment {
                let (base, tag) = p.range_tag();
                match tag {
                    Some("start") => seen_start.push(base),
                    Some("end") => seen_end.push(base),
                    _ => {}
                }
            }
        }
        for base in &seen_start {
            if seen_start.iter().filter(|b| *b == base).count() > 1 {
                return Err(Error::FormatMismatch {
                    format: format.to_string(),
                    input: String::new(),
                });
            }
        }
        for base in &seen_end {
            if seen_end.iter().filter(|b| *b == base).count() > 1 {
                return Err(Error::FormatMismatch {
                    format: format.to_string(),
                    input: String::new(),
                });
            }
        }

        Ok(FormatString { segments })
    }
}

/// Resolves a signed slice index (negative counts back from the end) into a
/// valid byte offset: non-negative indices are clamped to `len`; a negative
/// index counts back from the end, clamped to 0. Used for the fallback when
/// a separator is absent from the remaining input, which quietly takes
/// "everything but the last character" rather than failing.
fn resolve_slice_pos(pos: isize, len: usize) -> usize {
    if pos >= 0 {
        (pos as usize).min(len)
    } else {
        let adjusted = len as isize + pos;
        if adjusted < 0 {
            0
        } else {
            adjusted as usize
        }
    }
}

/// Extracts placeholder bindings from `input` according to `format`.
///
/// Walks both strings left to right: each placeholder's value runs up to the
/// first occurrence of the literal text that follows it (or, for a
/// fixed-width placeholder, exactly `width` characters). When that following
/// literal can't be found in the remaining input, the value falls back to
/// "everything but the last character" rather than failing outright — a
/// quirk preserved from the extraction this engine was modeled on.
pub fn extract(format: &str, input: &str) -> Result<Bindings> {
    // Validates the !start/!end invariant up front; the scan below operates
    // on raw slices directly, same as the reference algorithm.
    FormatString::parse(format)?;

    let mismatch = || Error::FormatMismatch {
        format: format.to_string(),
        input: input.to_string(),
    };

    let mut extracted = Bindings::default();
    let mut fmt = format;
    let mut inp = input;

    loop {
        if fmt.is_empty() {
            break;
        }
        let Some(arg_start) = fmt.find('{') else {
            if fmt != inp {
                return Err(mismatch());
            }
            break;
        };

        if arg_start > inp.len() || fmt[..arg_start] != inp[..arg_start.min(inp.len())] {
            return Err(mismatch());
        }

        fmt = &fmt[arg_start + 1..];
        inp = &inp[arg_start..];

        let arg_end = fmt.find('}').ok_or_else(mismatch)?;
        let mut var_name = fmt[..arg_end].to_string();
        fmt = &fmt[arg_end + 1..];

        let mut var_length: usize = 0;
        if let Some((name, width)) = var_name.split_once(':') {
            var_length = width.parse::<usize>().map_err(|_| mismatch())?;
            var_name = name.to_string();
        }

        let var_value: String;
        if !fmt.is_empty() {
            let sep_pos: usize = if var_length > 0 {
                var_length.min(inp.len())
            } else {
                let sep = match fmt.find('{') {
                    Some(sep_end) => &fmt[..sep_end],
                    None => fmt,
                };
                if sep.is_empty() {
                    0
                } else {
                    match inp.find(sep) {
                        Some(pos) => pos,
                        None => resolve_slice_pos(-1, inp.len()),
                    }
                }
            };
            var_value = inp[..sep_pos].to_string();
            inp = &inp[sep_pos..];
        } else {
            var_value = inp.to_string();
            inp = "";
        }

        if var_name != "*" {
            extracted.insert(var_name, var_value);
        }
    }

    Ok(extracted)
}

/// Splits a placeholder's raw key (as it appears in a [`Bindings`] map) into
/// its base name and an optional `!start`/`!end` tag. Shared by every module
/// that needs to recognise a range-pair placeholder by name alone, without
/// re-parsing a `Placeholder`.
pub fn split_range_tag(key: &str) -> (&str, Option<&'static str>) {
    match key.split_once('!') {
        Some((base, "start")) => (base, Some("start")),
        Some((base, "end")) => (base, Some("end")),
        _ => (key, None),
    }
}

/// Returns the base placeholder names appearing in `format`, in order,
/// dropping `*` and collapsing `!start`/`!end` pairs to their shared base
/// name. Used by `collection::filter_all` to decide which search terms
/// belong on a file template rather than a directory template.
pub fn placeholder_names(format: &str) -> Result<Vec<String>> {
    let parsed = FormatString::parse(format)?;
    let mut names = Vec::new();
    for segment in parsed.segments {
        if let Segment::Placeholder(p) = segment {
            if p.name == "*" {
                continue;
            }
            let (base, _) = split_range_tag(&p.name);
            if !names.iter().any(|n| n == base) {
                names.push(base.to_string());
            }
        }
    }
    Ok(names)
}

/// Inverse of `extract`: substitutes each `{name}` in `format` with its value
/// from `bindings` and concatenates literals, producing a concrete path.
/// Used to build concrete paths from a dataset's coordinates.
pub fn format_with(format: &str, bindings: &Bindings) -> Result<String> {
    let parsed = FormatString::parse(format)?;
    let mut out = String::new();
    for segment in parsed.segments {
        match segment {
            Segment::Literal(lit) => out.push_str(&lit),
            Segment::Placeholder(p) => {
                if p.name == "*" {
                    continue;
                }
                match bindings.get(&p.name) {
                    Some(value) => out.push_str(value),
                    None => {
                        return Err(Error::FormatMismatch {
                            format: format.to_string(),
                            input: format!("<missing binding for {}>", p.name),
                        })
                    }
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_placeholder() {
        let bindings = extract("{a:3}{b}", "abcdef").unwrap();
        assert_eq!(bindings.get("a").unwrap(), "abc");
        assert_eq!(bindings.get("b").unwrap(), "def");
    }

    #[test]
    fn ignore_placeholder_is_dropped() {
        let bindings = extract("{*}_{year}.nc", "junk_1999.nc").unwrap();
        assert!(!bindings.contains_key("*"));
        assert_eq!(bindings.get("year").unwrap(), "1999");
    }

    #[test]
    fn literal_prefix_mismatch_fails() {
        assert!(extract("v1-{a}", "v2-foo").is_err());
    }

    #[test]
    fn trailing_literal_residual_must_match() {
        assert!(extract("{a}.nc", "1960.txt").is_err());
        assert!(extract("{a}.nc", "1960.nc").is_ok());
    }

    #[test]
    fn first_occurrence_wins_on_ambiguous_separator() {
        // Documented limitation: "a" greedily stops at the first "_".
        let bindings = extract("{a}_{b}", "1_2_3").unwrap();
        assert_eq!(bindings.get("a").unwrap(), "1");
        assert_eq!(bindings.get("b").unwrap(), "2_3");
    }

    #[test]
    fn round_trip_without_ambiguous_separators() {
        let format = "{model}/{scenario}/{var}_{year}.nc";
        let mut bindings = Bindings::default();
        bindings.insert("model".to_string(), "ACCESS".to_string());
        bindings.insert("scenario".to_string(), "ssp245".to_string());
        bindings.insert("var".to_string(), "tas".to_string());
        bindings.insert("year".to_string(), "1960".to_string());

        let built = format_with(format, &bindings).unwrap();
        assert_eq!(built, "ACCESS/ssp245/tas_1960.nc");

        let round_tripped = extract(format, &built).unwrap();
        assert_eq!(round_tripped, bindings);
    }

    #[test]
    fn range_tag_pair_invariant_rejects_duplicates() {
        assert!(FormatString::parse("{year!start}-{year!start}").is_err());
    }

    #[test]
    fn placeholder_names_collapses_range_pairs_and_drops_ignore() {
        let names = placeholder_names("{model}/{*}/{year!start}-{year!end}.nc").unwrap();
        assert_eq!(names, vec!["model".to_string(), "year".to_string()]);
    }
}
