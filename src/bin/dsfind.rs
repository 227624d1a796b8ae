use std::sync::LazyLock;

use dsfind::ansi_color;
use dsfind::cli::{self, DsfindArgs};
use dsfind::collection::{filter_all, DatasetCollection};
use dsfind::color::ERROR_COLOR;
use dsfind::config;

fn main() {
    static ARGS: LazyLock<DsfindArgs> = LazyLock::new(|| cli::parse_args(None));

    match resolve_collection(&ARGS) {
        Ok(collection) => {
            if ARGS.json {
                print_json(collection);
            } else {
                print_table(collection);
            }
        }
        Err(e) => {
            eprintln!("{} {}", ansi_color!(ERROR_COLOR, bold = true, "error:"), e);
            std::process::exit(1);
        }
    }
}

/// Resolves a `DatasetCollection` either from a YAML catalog entry
/// (`--config`/`--key`) or directly from `--dir-template`/`--file-template`,
/// then layers any `--prioritise` rules on top regardless of which path was
/// taken.
fn resolve_collection(args: &DsfindArgs) -> dsfind::Result<DatasetCollection> {
    let mut collection = match (&args.config, &args.key) {
        (Some(yaml_path), Some(key)) => config::get_datasets(key, yaml_path, args.exact, args.select.clone())?,
        _ => filter_all(&args.dir_templates, &args.file_templates, None, args.exact, args.select.clone())?,
    };

    for (key, rule) in &args.priorities {
        for dataset in collection.items.iter_mut() {
            dataset.prioritise(key, rule.preferences.clone(), Some(rule.default));
        }
    }

    Ok(collection)
}

fn print_table(mut collection: DatasetCollection) {
    if collection.is_empty() {
        println!("no datasets found");
        return;
    }
    for dataset in collection.items.iter_mut() {
        let coords: Vec<String> = dataset.data.iter().map(|(k, v)| format!("{k}={v}")).collect();
        match dataset.get_files() {
            Ok(files) => println!("roots={:<3} files={:<5} {}", dataset.roots.len(), files.len(), coords.join(", ")),
            Err(e) => eprintln!("{} {} ({})", ansi_color!(ERROR_COLOR, bold = true, "error:"), e, coords.join(", ")),
        }
    }
}

fn print_json(mut collection: DatasetCollection) {
    match collection.to_rows() {
        Ok(rows) => match serde_json::to_string_pretty(&rows) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("{} {}", ansi_color!(ERROR_COLOR, bold = true, "error:"), e),
        },
        Err(e) => eprintln!("{} {}", ansi_color!(ERROR_COLOR, bold = true, "error:"), e),
    }
}
