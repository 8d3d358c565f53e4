//! `livepatch diff`: compare two versions of a class.

use std::fmt::Write as _;

use livepatch_diff::{ClassDiff, FieldChange};

use crate::pipeline::{load_config, parse_options, read_class};
use crate::{DiffArgs, GlobalArgs, ReportFormat};

/// Runs the `livepatch diff` command.
///
/// Exits with 0 when the classes are equivalent and 1 when they differ.
pub fn run(args: &DiffArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = load_config(global)?;
    let options = parse_options(&config);
    let old = read_class(&args.old, &options)?;
    let new = read_class(&args.new, &options)?;
    let diff = livepatch_diff::diff(&old, &new);

    match args.format {
        ReportFormat::Text => match diff {
            Some(ref diff) => print!("{}", render(diff)),
            None => {
                if !global.quiet {
                    println!("{}: no changes", new.name);
                }
            }
        },
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&diff)?),
    }
    Ok(if diff.is_some() { 1 } else { 0 })
}

fn render(diff: &ClassDiff) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}:", diff.class);
    if diff.super_type_changed {
        out.push_str("  ~ supertypes\n");
    }
    if diff.access_changed {
        out.push_str("  ~ access flags\n");
    }
    for method in &diff.added_methods {
        let _ = writeln!(out, "  + {}", method.signature());
    }
    for method in &diff.removed_methods {
        let _ = writeln!(out, "  - {}", method.signature());
    }
    for method in &diff.modified_methods {
        let _ = writeln!(out, "  ~ {}", method.new.signature());
    }
    for field in &diff.modified_fields {
        let marker = match field {
            FieldChange::Added(_) => '+',
            FieldChange::Removed(_) => '-',
            FieldChange::Changed { .. } => '~',
        };
        let _ = writeln!(out, "  {marker} field {}", field.name());
    }
    for annotation in &diff.modified_annotations {
        let _ = writeln!(out, "  ~ @{annotation}");
    }
    out
}
