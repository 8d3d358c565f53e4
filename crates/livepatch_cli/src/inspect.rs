//! `livepatch inspect`: dump one parsed class.

use std::fmt::Write as _;

use livepatch_classfile::{ClassModel, MethodModel};
use livepatch_engine::{ChangeClassifier, Classification};
use serde::Serialize;

use crate::pipeline::{load_config, parse_options, read_class};
use crate::{GlobalArgs, InspectArgs, ReportFormat};

#[derive(Serialize)]
struct Report<'a> {
    class: &'a ClassModel,
    classification: Classification,
}

/// Runs the `livepatch inspect` command.
pub fn run(args: &InspectArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let config = load_config(global)?;
    let model = read_class(&args.class, &parse_options(&config))?;
    let classification = ChangeClassifier::new(&config.classify.lambda_supertypes).classify(&model);

    match args.format {
        ReportFormat::Text => print!("{}", render(&model, &classification)),
        ReportFormat::Json => {
            let report = Report {
                class: &model,
                classification,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(0)
}

fn render(model: &ClassModel, classification: &Classification) -> String {
    let mut out = String::new();
    let _ = write!(out, "class {}", model.name);
    if let Some(ref parent) = model.super_name {
        let _ = write!(out, " extends {parent}");
    }
    out.push('\n');
    if !model.interfaces.is_empty() {
        let _ = writeln!(out, "  implements {}", model.interfaces.join(", "));
    }
    let _ = writeln!(
        out,
        "  access {:#06x}, version {}.{}",
        model.access.bits(),
        model.version.0,
        model.version.1
    );
    match classification.rule {
        Some(rule) => {
            let _ = writeln!(out, "  kind {:?} ({rule:?})", classification.kind);
        }
        None => {
            let _ = writeln!(out, "  kind {:?}", classification.kind);
        }
    }
    if let Some(ref file) = model.source_file_name {
        let _ = writeln!(out, "  source {file}");
    }
    if let Some(ref enclosing) = model.enclosing_method {
        match enclosing.method {
            Some((ref name, ref descriptor)) => {
                let _ = writeln!(out, "  enclosed by {}.{name}{descriptor}", enclosing.class);
            }
            None => {
                let _ = writeln!(out, "  enclosed by {}", enclosing.class);
            }
        }
    }
    for annotation in &model.annotations {
        let _ = writeln!(out, "  @{}", annotation.descriptor);
    }
    if !model.fields.is_empty() {
        out.push_str("fields:\n");
        for field in &model.fields {
            let _ = writeln!(out, "  {:#06x} {} {}", field.access.bits(), field.name, field.descriptor);
        }
    }
    if !model.methods.is_empty() {
        out.push_str("methods:\n");
        for method in &model.methods {
            let _ = writeln!(out, "  {}", describe_method(method));
        }
    }
    out
}

fn describe_method(method: &MethodModel) -> String {
    let mut line = format!(
        "{:#06x} {}{} ({} instructions",
        method.access.bits(),
        method.name,
        method.descriptor,
        method.instructions.len()
    );
    if let (Some(first), Some(last)) = (method.lines.first(), method.lines.last()) {
        let _ = write!(line, ", lines {first}-{last}");
    }
    if method.is_inline {
        line.push_str(", inline");
    }
    line.push(')');
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use livepatch_classfile::code::opcodes::RETURN;
    use livepatch_classfile::{AccessFlags, ClassWriter, CodeOp, MethodDef};

    #[test]
    fn text_report_lists_members() {
        let mut w = ClassWriter::new("a/MainKt$f$1", Some("kotlin/jvm/internal/Lambda"));
        w.source_file("Main.kt");
        w.field(AccessFlags::PRIVATE, "count", "I");
        w.method(
            MethodDef::new(AccessFlags::PUBLIC, "invoke", "()V")
                .code(vec![CodeOp::Line(4), CodeOp::Raw(RETURN), CodeOp::Line(6), CodeOp::Raw(RETURN)]),
        );
        let model = ClassModel::parse(&w.finish()).unwrap();
        let classification = ChangeClassifier::default().classify(&model);
        let text = render(&model, &classification);

        assert!(text.starts_with("class a/MainKt$f$1 extends kotlin/jvm/internal/Lambda\n"));
        assert!(text.contains("kind Support (LambdaSupertype)"));
        assert!(text.contains("source Main.kt"));
        assert!(text.contains("count I"));
        assert!(text.contains("invoke()V (2 instructions, lines 4-6)"));
    }
}
