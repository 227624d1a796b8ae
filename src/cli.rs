//! `DsfindArgs`: the command-line surface for the `dsfind` binary, built
//! declaratively with `clap` (`Command::new`, ordered flags, short + long
//! aliases) to expose the dataset-engine's knobs.

use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};

use crate::dataset::{ClashDefault, ClashRule};
use crate::filter::SearchTerms;
use crate::{ansi_color, color::ERROR_COLOR};

/// Parsed command-line arguments for the `dsfind` binary.
#[derive(Debug)]
pub struct DsfindArgs {
    /// One or more directory templates (`--dir-template`, repeatable).
    pub dir_templates: Vec<String>,
    /// One or more file templates tried in order (`--file-template`).
    pub file_templates: Vec<String>,
    /// `--select key=value[,value...]` search terms.
    pub select: SearchTerms,
    /// `--exact`: require exact rather than substring matches.
    pub exact: bool,
    /// `--prioritise key=pref1,pref2:default` clash-resolution rules.
    pub priorities: std::collections::HashMap<String, ClashRule>,
    /// `--config`: path to a YAML catalog, used together with `--key`.
    pub config: Option<PathBuf>,
    /// `--key`: the catalog entry name to look up in `--config`.
    pub key: Option<String>,
    /// `--json`: emit the resolved `DatasetCollection` as JSON instead of a table.
    pub json: bool,
}

fn build_command() -> Command {
    Command::new("dsfind")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Ante Tonkovic-Capin")
        .about("Walks one or more placeholder-templated directory trees, groups matching files into datasets by directory coordinates, and resolves clashes between candidate files sharing those coordinates.")
        .disable_version_flag(true)
        .disable_help_flag(true)
        .after_help("For example, run `dsfind --dir-template '/data/{model}/{scenario}/' --file-template '/{var}/{year}.nc'` to enumerate datasets under /data.")
        .arg(Arg::new("dir-template")
            .short('D')
            .long("dir-template")
            .value_name("TEMPLATE")
            .display_order(0)
            .action(ArgAction::Append)
            .help("Directory template to walk, e.g. '/data/{model}/{scenario}/'"))
        .arg(Arg::new("file-template")
            .short('F')
            .long("file-template")
            .value_name("TEMPLATE")
            .display_order(1)
            .action(ArgAction::Append)
            .help("File template tried against each matched directory, e.g. '/{var}/{year}.nc'"))
        .arg(Arg::new("select")
            .short('S')
            .long("select")
            .value_name("KEY=VALUE[,VALUE...]")
            .display_order(2)
            .action(ArgAction::Append)
            .help("Restrict results to placeholder KEY matching one of the comma-separated VALUEs"))
        .arg(Arg::new("exact")
            .short('E')
            .long("exact")
            .action(ArgAction::SetTrue)
            .display_order(3)
            .help("Match --select values exactly rather than by substring"))
        .arg(Arg::new("prioritise")
            .short('P')
            .long("prioritise")
            .value_name("KEY=PREF1,PREF2:default")
            .display_order(4)
            .action(ArgAction::Append)
            .help("Clash-resolution rule for KEY: preference order before ':', 'high'|'low'|'error' default after"))
        .arg(Arg::new("config")
            .short('C')
            .long("config")
            .value_name("YAML")
            .display_order(5)
            .action(ArgAction::Set)
            .help("Load directory/file templates from this YAML catalog instead of --dir-template/--file-template"))
        .arg(Arg::new("key")
            .short('K')
            .long("key")
            .value_name("CATALOG_KEY")
            .display_order(6)
            .action(ArgAction::Set)
            .help("Catalog entry name to look up in --config"))
        .arg(Arg::new("json")
            .short('J')
            .long("json")
            .action(ArgAction::SetTrue)
            .display_order(7)
            .help("Emit the resolved datasets as JSON instead of a table"))
        .arg(Arg::new("version")
            .short('v')
            .long("version")
            .display_order(1000)
            .action(clap::ArgAction::Version)
            .help("Display the version of dsfind"))
        .arg(Arg::new("help")
            .short('h')
            .long("help")
            .display_order(1000)
            .action(clap::ArgAction::Help)
            .help("Display help and usage information for dsfind"))
}

fn parse_select(raw: &str) -> Option<(String, Vec<String>)> {
    let (key, values) = raw.split_once('=')?;
    let values: Vec<String> = values.split(',').filter(|v| !v.is_empty()).map(str::to_string).collect();
    Some((key.to_string(), values))
}

/// Parses a `--prioritise KEY=PREF1,PREF2:default` argument. Returns
/// `Err(raw_default)` when `default` is present but isn't one of
/// `high`/`low`/`error`, so an invalid rule is rejected eagerly rather than
/// silently substituted.
fn parse_prioritise(raw: &str) -> Option<std::result::Result<(String, ClashRule), String>> {
    let (key, rest) = raw.split_once('=')?;
    let (prefs_part, default_part) = match rest.split_once(':') {
        Some((p, d)) => (p, Some(d)),
        None => (rest, None),
    };
    let preferences: Vec<String> = prefs_part.split(',').filter(|v| !v.is_empty()).map(str::to_string).collect();
    let default = match default_part.map(str::to_lowercase).as_deref() {
        Some("high") => ClashDefault::High,
        Some("low") => ClashDefault::Low,
        Some("error") | None => ClashDefault::Error,
        Some(_) => return Some(Err(default_part.unwrap().to_string())),
    };
    Some(Ok((key.to_string(), ClashRule::new(preferences, default))))
}

/// Parses arguments from `input` if given, or `std::env::args()` otherwise.
/// Accepting an explicit argument vector keeps this testable without
/// touching the real process environment.
pub fn parse_args(input: Option<Vec<String>>) -> DsfindArgs {
    let command = build_command();
    let matches = match input {
        Some(args) => command.get_matches_from(args),
        None => command.get_matches(),
    };

    let dir_templates: Vec<String> = matches
        .get_many::<String>("dir-template")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();

    let file_templates: Vec<String> = matches
        .get_many::<String>("file-template")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();

    let mut select = SearchTerms::new();
    if let Some(values) = matches.get_many::<String>("select") {
        for raw in values {
            if let Some((key, mut values)) = parse_select(raw) {
                select.entry(key).or_default().append(&mut values);
            } else {
                let error_fmt = ansi_color!(ERROR_COLOR, bold = true, "error:");
                eprintln!("{error_fmt} malformed --select '{raw}', expected KEY=VALUE[,VALUE...]");
                std::process::exit(1);
            }
        }
    }

    let exact = matches.get_flag("exact");

    let mut priorities = std::collections::HashMap::new();
    if let Some(values) = matches.get_many::<String>("prioritise") {
        for raw in values {
            match parse_prioritise(raw) {
                Some(Ok((key, rule))) => {
                    priorities.insert(key, rule);
                }
                Some(Err(bad_default)) => {
                    let error_fmt = ansi_color!(ERROR_COLOR, bold = true, "error:");
                    eprintln!(
                        "{error_fmt} invalid clash rule default '{bad_default}' in --prioritise '{raw}', expected 'high', 'low', or 'error'"
                    );
                    std::process::exit(1);
                }
                None => {
                    let error_fmt = ansi_color!(ERROR_COLOR, bold = true, "error:");
                    eprintln!("{error_fmt} malformed --prioritise '{raw}', expected KEY=PREF1,PREF2:default");
                    std::process::exit(1);
                }
            }
        }
    }

    let config = matches.get_one::<String>("config").map(PathBuf::from);
    let key = matches.get_one::<String>("key").cloned();
    let json = matches.get_flag("json");

    DsfindArgs {
        dir_templates,
        file_templates,
        select,
        exact,
        priorities,
        config,
        key,
        json,
    }
}
