//! `livepatch groups`: list the invalidation groups of a source file.

use std::collections::BTreeSet;

use livepatch_engine::{select_for_lines, ComposeGroup, GroupExtractor, SourceLines};
use livepatch_source::SourceDb;
use serde::Serialize;

use crate::pipeline::{load_config, parse_options, read_class};
use crate::{GlobalArgs, GroupsArgs, ReportFormat};

#[derive(Serialize)]
struct Report<'a> {
    groups: &'a [ComposeGroup],
    selected: Option<i32>,
}

/// Runs the `livepatch groups` command.
pub fn run(args: &GroupsArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = load_config(global)?;
    let model = read_class(&args.key_meta, &parse_options(&config))?;
    let extractor = GroupExtractor::from_config(&config.groups);
    if !extractor.is_key_meta_class(&model) {
        return Err(format!(
            "{} carries no {} annotation",
            model.name, config.groups.key_meta_annotation
        )
        .into());
    }

    let mut db = SourceDb::new();
    db.load_file(&args.source)
        .map_err(|e| format!("cannot read {}: {e}", args.source.display()))?;
    let groups = extractor.extract(Some(&model), &args.source, &db);

    let selected = if args.lines.is_empty() {
        None
    } else {
        let lines: BTreeSet<u32> = args.lines.iter().copied().collect();
        select_for_lines(&groups, &lines, db.line_count(&args.source)).group().map(|g| g.key)
    };

    match args.format {
        ReportFormat::Text => {
            for group in &groups {
                println!(
                    "{:>11}  lines {}-{}",
                    group.key,
                    group.lines.start(),
                    group.lines.end()
                );
            }
            if !args.lines.is_empty() {
                match selected {
                    Some(key) => println!("selected {key}"),
                    None => println!("no enclosing group"),
                }
            }
        }
        ReportFormat::Json => {
            let report = Report {
                groups: &groups,
                selected,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(0)
}
