//! `livepatch patch`: run one pass over compiled classes.
//!
//! The classes under `--classes` stand in for the front-end compiler's output
//! for `--source`; they are compared against the deployed classes under the
//! baseline directory. The pass runs with the manual policy.

use std::sync::Arc;

use livepatch_engine::{
    CompileOutput, CompileRequest, DirBaseline, InvocationPolicy, LiveSession, PassError,
};
use livepatch_source::SourceDb;
use serde::Serialize;

use crate::pipeline::{load_config, parse_options, PrecompiledCompiler};
use crate::{GlobalArgs, PatchArgs, ReportFormat};

#[derive(Serialize)]
struct ClassSummary<'a> {
    name: &'a str,
    kind: livepatch_engine::ClassKind,
    size: usize,
}

#[derive(Serialize)]
struct Summary<'a> {
    invalidate_mode: livepatch_engine::InvalidateMode,
    group_ids_to_invalidate: Vec<i32>,
    classes: Vec<ClassSummary<'a>>,
}

impl<'a> Summary<'a> {
    fn new(output: &'a CompileOutput) -> Self {
        Self {
            invalidate_mode: output.invalidate_mode,
            group_ids_to_invalidate: output.group_ids_to_invalidate.iter().copied().collect(),
            classes: output
                .classes
                .iter()
                .map(|c| ClassSummary {
                    name: &c.name,
                    kind: c.kind,
                    size: c.bytes.len(),
                })
                .collect(),
        }
    }
}

/// Runs the `livepatch patch` command.
///
/// Returns exit code 0 when the edit was accepted and 1 when it was rejected
/// or did not compile.
pub fn run(args: &PatchArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = load_config(global)?;
    let baseline_dir = args
        .baseline
        .clone()
        .unwrap_or_else(|| config.session.baseline_dir.clone());
    if !baseline_dir.is_dir() {
        return Err(format!("baseline directory {} does not exist", baseline_dir.display()).into());
    }

    if global.verbose {
        eprintln!(
            "   Patching {} against {}",
            args.source.display(),
            baseline_dir.display()
        );
    }

    let mut db = SourceDb::new();
    db.load_file(&args.source)
        .map_err(|e| format!("cannot read {}: {e}", args.source.display()))?;

    let mut session = LiveSession::new(
        Box::new(PrecompiledCompiler::new(&args.classes)),
        Box::new(DirBaseline::with_options(&baseline_dir, parse_options(&config))),
        Arc::new(db),
        &config,
    );
    let request = CompileRequest::new(&args.source, args.changed.clone());

    let output = match session.submit(request, &InvocationPolicy::Manual) {
        Ok(output) => output,
        Err(err @ (PassError::Rejected(_) | PassError::Compiler(_))) => {
            eprintln!("{err}");
            return Ok(1);
        }
        Err(err) => return Err(err.into()),
    };

    let summary = Summary::new(&output);
    match args.format {
        ReportFormat::Text => {
            if !global.quiet {
                println!("mode: {:?}", summary.invalidate_mode);
                if !summary.group_ids_to_invalidate.is_empty() {
                    let keys: Vec<String> =
                        summary.group_ids_to_invalidate.iter().map(i32::to_string).collect();
                    println!("groups: {}", keys.join(", "));
                }
                for class in &summary.classes {
                    println!("  {:?} {} ({} bytes)", class.kind, class.name, class.size);
                }
            }
        }
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }
    Ok(0)
}
