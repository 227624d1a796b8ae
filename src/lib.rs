//! A path-templated dataset discovery engine: walks one or more directory
//! trees described by `{placeholder}` templates, groups the files it finds
//! into datasets keyed by their directory coordinates, and resolves clashes
//! between candidate files that share those coordinates but differ on a
//! "priority" key such as a processing version.
//!
//! The engine is organised bottom-up: a format/placeholder codec
//! ([`format`]), a substring/exact filter ([`filter`]), a pruning directory
//! walker ([`walk`]), a single dataset ([`dataset`]) and a collection of
//! them ([`collection`]), plus a YAML catalog loader ([`config`]) and a
//! `clap` front end ([`cli`]) for the `dsfind` binary.

pub mod cli;
pub mod collection;
pub mod color;
pub mod config;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod format;
pub mod walk;

pub use error::{Error, Result};
