//! TreeWalker: a depth-limited, pruning directory traversal. At each depth
//! `d` below `len(columns)` it filters the subdirectory list against
//! `columns[d]` via `FilterMatcher::match_values` before descending; once
//! `d >= columns.len()` it yields `(relative_root, subdirectory_names)` and
//! stops.
//!
//! A top-down walk that prunes subdirectories against each column's format
//! before descending into them, implemented as a hand-rolled, explicit-stack
//! `Iterator` rather than a wrapper around a general crawling crate: a
//! consumer that stops pulling early leaves the rest of the tree untouched.

use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use crate::error::{Error, Result};
use crate::filter::{match_values, ExactOverrides, SearchTerms};

struct Frame {
    dir: PathBuf,
    relative_root: String,
    depth: usize,
}

/// Lazily walks `start_path`, pruning subdirectories at each depth against
/// `columns` and the supplied search terms, yielding terminal directories.
pub struct TreeWalker<'a> {
    columns: &'a [String],
    search: &'a SearchTerms,
    exact: bool,
    exact_overrides: &'a ExactOverrides,
    stack: Vec<Frame>,
}

pub fn walk<'a>(
    start_path: &Path,
    columns: &'a [String],
    search: &'a SearchTerms,
    exact: bool,
    exact_overrides: &'a ExactOverrides,
) -> TreeWalker<'a> {
    TreeWalker {
        columns,
        search,
        exact,
        exact_overrides,
        stack: vec![Frame {
            dir: start_path.to_path_buf(),
            relative_root: String::new(),
            depth: 0,
        }],
    }
}

/// Reads `dir`'s immediate children, following symlinks to classify them,
/// and returns subdirectory names in sorted (lexicographic) order, so that
/// repeated walks over the same tree produce identical output.
fn sorted_subdirectories(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_dir = entry.file_type()?.is_dir()
            || (entry.path().is_symlink() && entry.path().is_dir());
        if is_dir {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

fn join_relative(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}{MAIN_SEPARATOR}{name}")
    }
}

impl<'a> Iterator for TreeWalker<'a> {
    type Item = Result<(String, Vec<String>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.pop()?;

            if frame.depth >= self.columns.len() {
                return match sorted_subdirectories(&frame.dir) {
                    Ok(children) => Some(Ok((frame.relative_root, children))),
                    Err(err) => Some(Err(err)),
                };
            }

            let mut children = match sorted_subdirectories(&frame.dir) {
                Ok(children) => children,
                Err(err) => return Some(Err(err)),
            };

            match_values(
                &mut children,
                &self.columns[frame.depth],
                self.search,
                self.exact,
                self.exact_overrides,
            );

            // Push in reverse so the lexicographically first child is popped
            // first, preserving sorted, depth-first pre-order traversal.
            for name in children.into_iter().rev() {
                let child_dir = frame.dir.join(&name);
                let relative_root = join_relative(&frame.relative_root, &name);
                self.stack.push(Frame {
                    dir: child_dir,
                    relative_root,
                    depth: frame.depth + 1,
                });
            }
        }
    }
}

/// Splits a template on its first placeholder into a literal prefix and a
/// residual template string: find the last path separator strictly before
/// the first `{`, and treat everything up to and including it as the
/// literal prefix. Shared by `split_at_first_placeholder` (directory
/// templates, which further split the residual into per-depth columns) and
/// `Dataset::generate_info` (file templates, which keep the residual as one
/// string since a file-level placeholder can span embedded separators, e.g.
/// `{var}/{year}.nc`).
pub fn split_literal_prefix(template: &str) -> (String, String) {
    match template.find('{') {
        None => (template.to_string(), String::new()),
        Some(first_arg_pos) => {
            let prefix = &template[..first_arg_pos];
            let split_at = prefix.rfind(MAIN_SEPARATOR).map_or(0, |pos| pos + 1);
            (template[..split_at].to_string(), template[split_at..].to_string())
        }
    }
}

/// Splits a directory-style format string on its first placeholder into a
/// literal `start_path` and the ordered per-depth `columns` that remain.
pub fn split_at_first_placeholder(template: &str) -> (String, Vec<String>) {
    let (start_path, residual) = split_literal_prefix(template);
    if residual.is_empty() {
        return (start_path, Vec::new());
    }
    let mut columns: Vec<String> = residual.split(MAIN_SEPARATOR).map(|s| s.to_string()).collect();
    if columns.last().map_or(false, |s| s.is_empty()) {
        columns.pop();
    }
    (start_path, columns)
}

/// Returns sorted non-directory entry names in `dir` (a symlink counts as a
/// directory only if it resolves to one, matching `sorted_subdirectories`).
fn sorted_files(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_dir = entry.file_type()?.is_dir() || (entry.path().is_symlink() && entry.path().is_dir());
        if !is_dir {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Walks down to exactly `depth` path components below `start_path` with no
/// per-level filtering, yielding the terminal entries (files, or
/// subdirectories when `folder_mode` is set). Used by
/// `Dataset::generate_info`, where placeholder matching happens once against
/// the terminal entries rather than while descending.
pub struct DepthWalker {
    stack: Vec<Frame>,
    depth: usize,
    folder_mode: bool,
}

pub fn walk_to_depth(start_path: &Path, depth: usize, folder_mode: bool) -> DepthWalker {
    DepthWalker {
        stack: vec![Frame {
            dir: start_path.to_path_buf(),
            relative_root: String::new(),
            depth: 0,
        }],
        depth,
        folder_mode,
    }
}

impl Iterator for DepthWalker {
    type Item = Result<(String, Vec<String>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.pop()?;

            if frame.depth == self.depth {
                let result = if self.folder_mode {
                    sorted_subdirectories(&frame.dir)
                } else {
                    sorted_files(&frame.dir)
                };
                return match result {
                    Ok(entries) => Some(Ok((frame.relative_root, entries))),
                    Err(err) => Some(Err(err)),
                };
            }

            let children = match sorted_subdirectories(&frame.dir) {
                Ok(children) => children,
                Err(err) => return Some(Err(err)),
            };
            for name in children.into_iter().rev() {
                self.stack.push(Frame {
                    dir: frame.dir.join(&name),
                    relative_root: join_relative(&frame.relative_root, &name),
                    depth: frame.depth + 1,
                });
            }
        }
    }
}
