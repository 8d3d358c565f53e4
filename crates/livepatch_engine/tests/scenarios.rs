//! End-to-end passes through a [`LiveSession`] with a scripted compiler.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use livepatch_classfile::code::opcodes::{ACONST_NULL, INVOKESTATIC, POP, RETURN};
use livepatch_classfile::{
    AccessFlags, Annotation, ClassModel, ClassWriter, CodeOp, ElementValue, MethodDef, CONSTRUCTOR,
};
use livepatch_config::{LivePatchConfig, DEFAULT_KEY_META_CLASS};
use livepatch_engine::{
    BaselineProvider, ClassKind, CompileOutput, CompileRequest, CompiledClass,
    CompilerDiagnosticError, DirBaseline, FrontEndCompiler, InvalidateMode, InvocationPolicy,
    LiveSession, ModificationTracker, PassError, RejectReason,
};
use livepatch_source::SourceDb;

const MAIN: &str = "src/a/Main.kt";
const OTHER: &str = "src/a/Other.kt";
const COMPOSABLE: &str = "(Landroidx/compose/runtime/Composer;I)V";
const LINE_WIDTH: u32 = 11;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

type Outputs = HashMap<PathBuf, Result<Vec<CompiledClass>, CompilerDiagnosticError>>;

#[derive(Clone, Default)]
struct FakeCompiler {
    outputs: Arc<Mutex<Outputs>>,
    calls: Arc<AtomicUsize>,
    bump_once: Arc<Mutex<Option<ModificationTracker>>>,
}

impl FakeCompiler {
    fn set(&self, source: &str, classes: Vec<(&str, Vec<u8>)>) {
        let compiled = classes
            .into_iter()
            .map(|(name, bytes)| CompiledClass::new(format!("{name}.class"), bytes))
            .collect();
        self.outputs
            .lock()
            .unwrap()
            .insert(PathBuf::from(source), Ok(compiled));
    }

    fn fail(&self, source: &str, diagnostics: &[&str]) {
        let err = CompilerDiagnosticError {
            source_file: PathBuf::from(source),
            diagnostics: diagnostics.iter().map(|d| d.to_string()).collect(),
        };
        self.outputs
            .lock()
            .unwrap()
            .insert(PathBuf::from(source), Err(err));
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FrontEndCompiler for FakeCompiler {
    fn compile(
        &self,
        source: &Path,
        _changed_declarations: &[String],
    ) -> Result<Vec<CompiledClass>, CompilerDiagnosticError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(tracker) = self.bump_once.lock().unwrap().take() {
            tracker.bump();
        }
        self.outputs
            .lock()
            .unwrap()
            .get(source)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

struct MapBaseline(HashMap<String, ClassModel>);

impl BaselineProvider for MapBaseline {
    fn get_class(&self, _source: &Path, class_name: &str) -> Option<ClassModel> {
        self.0.get(class_name).cloned()
    }
}

fn parse(bytes: &[u8]) -> ClassModel {
    ClassModel::parse(bytes).unwrap()
}

/// Forty lines of `// line NN\n`, so line `n` starts at `(n - 1) * LINE_WIDTH`.
fn source_db() -> SourceDb {
    let text: String = (1..=40).map(|n| format!("// line {n:02}\n")).collect();
    let mut db = SourceDb::new();
    db.add_source(MAIN, text.clone());
    db.add_source(OTHER, text);
    db
}

struct Harness {
    compiler: FakeCompiler,
    session: LiveSession,
}

impl Harness {
    fn new(baseline: Vec<Vec<u8>>) -> Self {
        let models = baseline
            .iter()
            .map(|bytes| {
                let model = parse(bytes);
                (model.name.clone(), model)
            })
            .collect();
        Self::with_provider(Box::new(MapBaseline(models)))
    }

    fn with_provider(baseline: Box<dyn BaselineProvider>) -> Self {
        let compiler = FakeCompiler::default();
        let session = LiveSession::new(
            Box::new(compiler.clone()),
            baseline,
            Arc::new(source_db()),
            &LivePatchConfig::default(),
        );
        Self { compiler, session }
    }

    fn pass(&mut self, classes: Vec<(&str, Vec<u8>)>) -> Result<CompileOutput, PassError> {
        self.compiler.set(MAIN, classes);
        self.session
            .submit(CompileRequest::new(MAIN, Vec::new()), &InvocationPolicy::Manual)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn body(line: u32, value: i32) -> Vec<CodeOp> {
    vec![
        CodeOp::Line(line),
        CodeOp::Iconst(value),
        CodeOp::Raw(POP),
        CodeOp::Raw(RETURN),
    ]
}

fn static_fn(name: &str, descriptor: &str, line: u32, value: i32) -> MethodDef {
    MethodDef::new(AccessFlags::PUBLIC | AccessFlags::STATIC, name, descriptor).code(body(line, value))
}

/// `a/MainKt` with a composable `Greeting` on `line` pushing `value`.
fn main_kt(value: i32, line: u32) -> Vec<u8> {
    let mut w = ClassWriter::new("a/MainKt", Some("java/lang/Object"));
    w.source_file("Main.kt");
    w.method(static_fn("Greeting", COMPOSABLE, line, value));
    w.method(static_fn("onCreate", "()V", 30, 0));
    w.finish()
}

fn int_array(values: impl Iterator<Item = i32>) -> ElementValue {
    ElementValue::Array(values.map(ElementValue::Int).collect())
}

/// Key-meta class listing `(key, first_line, last_line)` groups of Main.kt.
fn key_meta(groups: &[(i32, u32, u32)]) -> Vec<u8> {
    let keys = groups.iter().map(|g| g.0);
    let starts = groups.iter().map(|g| ((g.1 - 1) * LINE_WIDTH) as i32);
    let ends = groups.iter().map(|g| (g.2 * LINE_WIDTH) as i32);
    let annotation = Annotation {
        descriptor: DEFAULT_KEY_META_CLASS.to_string(),
        elements: vec![
            ("file".to_string(), ElementValue::String("Main.kt".to_string())),
            ("key".to_string(), int_array(keys)),
            ("startOffset".to_string(), int_array(starts)),
            ("endOffset".to_string(), int_array(ends)),
        ],
        visible: false,
    };
    let mut w = ClassWriter::new("a/MainKt$KeyMeta", Some("java/lang/Object"));
    w.annotation(annotation);
    w.finish()
}

fn lambda(name: &str, enclosing: (&str, &str, &str), invoke_line: u32, value: i32) -> Vec<u8> {
    let mut w = ClassWriter::new(name, Some("kotlin/jvm/internal/Lambda"));
    w.enclosing_method(enclosing.0, Some((enclosing.1, enclosing.2)));
    w.method(
        MethodDef::new(AccessFlags::PUBLIC | AccessFlags::FINAL, "invoke", COMPOSABLE)
            .code(body(invoke_line, value)),
    );
    w.finish()
}

/// The lambda `Greeting` registers to recompose itself: its `invoke` calls
/// `Greeting` again.
fn restart_lambda(name: &str, invoke_line: u32, value: i32) -> Vec<u8> {
    let mut w = ClassWriter::new(name, Some("kotlin/jvm/internal/Lambda"));
    w.enclosing_method("a/MainKt", Some(("Greeting", COMPOSABLE)));
    let mut code = body(invoke_line, value);
    code.splice(
        3..3,
        [
            CodeOp::Raw(ACONST_NULL),
            CodeOp::Iconst(0),
            CodeOp::invoke(INVOKESTATIC, "a/MainKt", "Greeting", COMPOSABLE),
        ],
    );
    w.method(MethodDef::new(AccessFlags::PUBLIC | AccessFlags::FINAL, "invoke", COMPOSABLE).code(code));
    w.finish()
}

/// `a/MainKt` whose `helper` only carries a line past the end of Main.kt,
/// as code inlined from another file does.
fn main_kt_with_foreign_helper(helper_value: i32) -> Vec<u8> {
    let mut w = ClassWriter::new("a/MainKt", Some("java/lang/Object"));
    w.source_file("Main.kt");
    w.method(static_fn("Greeting", COMPOSABLE, 8, 1));
    w.method(static_fn("helper", "()V", 900, helper_value));
    w.finish()
}

fn model_class(ctor_value: i32) -> Vec<u8> {
    let mut w = ClassWriter::new("a/Model", Some("java/lang/Object"));
    w.method(MethodDef::new(AccessFlags::PUBLIC, CONSTRUCTOR, "()V").code(body(3, ctor_value)));
    w.finish()
}

fn util(access: AccessFlags, value: i32) -> Vec<u8> {
    let mut w = ClassWriter::new("a/Util", Some("java/lang/Object"));
    w.method(
        MethodDef::new(access | AccessFlags::STATIC, "twice", "()V")
            .code(body(12, value))
            .annotation("Lkotlin/internal/InlineOnly;", false),
    );
    w.finish()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn edit_inside_group_invalidates_that_group() {
    let mut h = Harness::new(vec![main_kt(1, 8)]);
    let out = h
        .pass(vec![
            ("a/MainKt", main_kt(2, 8)),
            ("a/MainKt$KeyMeta", key_meta(&[(1, 5, 15)])),
        ])
        .unwrap();

    assert_eq!(out.invalidate_mode, InvalidateMode::InvalidateGroups);
    assert_eq!(out.group_ids_to_invalidate, BTreeSet::from([1]));
    assert_eq!(out.classes.len(), 1);
    assert_eq!(out.classes[0].name, "a/MainKt");
    assert_eq!(out.classes[0].kind, ClassKind::Normal);
    assert!(out.class("a/MainKt$KeyMeta").is_none());
    assert!(h.session.cache().contains("a/MainKt"));
    assert!(!h.session.cache().contains("a/MainKt$KeyMeta"));
}

#[test]
fn new_user_class_is_rejected_and_cache_untouched() {
    let mut h = Harness::new(vec![main_kt(1, 8)]);
    let added = ClassWriter::new("a/Screen", Some("java/lang/Object")).finish();
    let err = h
        .pass(vec![("a/MainKt", main_kt(2, 8)), ("a/Screen", added)])
        .unwrap_err();

    match err {
        PassError::Rejected(rejected) => {
            assert_eq!(rejected.class, "a/Screen");
            assert_eq!(rejected.reason, RejectReason::AddedClass);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(h.session.cache().is_empty());
    assert_eq!(h.session.pending().len(), 1);
}

#[test]
fn private_inline_edit_is_accepted() {
    let mut h = Harness::new(vec![util(AccessFlags::PRIVATE, 1)]);
    let out = h.pass(vec![("a/Util", util(AccessFlags::PRIVATE, 2))]).unwrap();
    assert_eq!(out.classes.len(), 1);
    assert_eq!(out.invalidate_mode, InvalidateMode::SaveAndLoad);
}

#[test]
fn public_inline_edit_is_rejected() {
    let mut h = Harness::new(vec![util(AccessFlags::PUBLIC, 1)]);
    let err = h
        .pass(vec![("a/Util", util(AccessFlags::PUBLIC, 2))])
        .unwrap_err();
    assert!(err.is_user_facing());
    assert!(err
        .to_string()
        .contains("modified non-private inline function twice()V"));
}

#[test]
fn new_lambda_is_support_and_accepted() {
    let mut h = Harness::new(vec![main_kt(1, 8)]);
    let out = h
        .pass(vec![
            ("a/MainKt", main_kt(2, 8)),
            (
                "a/MainKt$Greeting$1",
                lambda("a/MainKt$Greeting$1", ("a/MainKt", "Greeting", COMPOSABLE), 9, 0),
            ),
            ("a/MainKt$KeyMeta", key_meta(&[(1, 5, 15)])),
        ])
        .unwrap();

    let shipped = out.class("a/MainKt$Greeting$1").unwrap();
    assert_eq!(shipped.kind, ClassKind::Support);
    assert_eq!(out.invalidate_mode, InvalidateMode::InvalidateGroups);
    assert_eq!(out.group_ids_to_invalidate, BTreeSet::from([1]));
    assert!(!h.session.is_restart_lambda("a/MainKt$Greeting$1"));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn identical_output_ships_nothing() {
    let mut h = Harness::new(vec![main_kt(1, 8)]);
    let out = h.pass(vec![("a/MainKt", main_kt(1, 8))]).unwrap();
    assert_eq!(out, CompileOutput::empty());
    assert!(h.session.cache().contains("a/MainKt"));
}

#[test]
fn tightest_group_is_selected() {
    let mut h = Harness::new(vec![main_kt(1, 22)]);
    let out = h
        .pass(vec![
            ("a/MainKt", main_kt(2, 22)),
            ("a/MainKt$KeyMeta", key_meta(&[(10, 10, 35), (20, 20, 30)])),
        ])
        .unwrap();
    assert_eq!(out.group_ids_to_invalidate, BTreeSet::from([20]));
}

#[test]
fn edit_outside_every_group_restarts() {
    let mut h = Harness::new(vec![main_kt(1, 8)]);
    let out = h
        .pass(vec![
            ("a/MainKt", main_kt(2, 25)),
            ("a/MainKt$KeyMeta", key_meta(&[(1, 5, 15)])),
        ])
        .unwrap();
    assert_eq!(out.invalidate_mode, InvalidateMode::RestartActivity);
    assert!(out.group_ids_to_invalidate.is_empty());
}

#[test]
fn missing_group_metadata_saves_and_loads() {
    let mut h = Harness::new(vec![main_kt(1, 8)]);
    let out = h.pass(vec![("a/MainKt", main_kt(2, 8))]).unwrap();
    assert_eq!(out.invalidate_mode, InvalidateMode::SaveAndLoad);
    assert!(out.group_ids_to_invalidate.is_empty());
}

#[test]
fn restart_lambda_edit_saves_and_loads() {
    let name = "a/MainKt$Greeting$1";
    let mut h = Harness::new(vec![main_kt(1, 8), restart_lambda(name, 9, 1)]);
    let out = h
        .pass(vec![
            ("a/MainKt", main_kt(1, 8)),
            (name, restart_lambda(name, 9, 2)),
            ("a/MainKt$KeyMeta", key_meta(&[(1, 5, 15)])),
        ])
        .unwrap();
    assert_eq!(out.invalidate_mode, InvalidateMode::SaveAndLoad);
    assert_eq!(out.classes.len(), 1);
    assert!(h.session.is_restart_lambda(name));
}

#[test]
fn content_lambda_edit_invalidates_its_group() {
    let name = "a/MainKt$Greeting$1";
    let enclosing = ("a/MainKt", "Greeting", COMPOSABLE);
    let mut h = Harness::new(vec![main_kt(1, 8), lambda(name, enclosing, 9, 1)]);
    let out = h
        .pass(vec![
            ("a/MainKt", main_kt(1, 8)),
            (name, lambda(name, enclosing, 9, 2)),
            ("a/MainKt$KeyMeta", key_meta(&[(1, 5, 15)])),
        ])
        .unwrap();
    assert_eq!(out.invalidate_mode, InvalidateMode::InvalidateGroups);
    assert_eq!(out.group_ids_to_invalidate, BTreeSet::from([1]));
    assert!(!h.session.is_restart_lambda(name));
}

#[test]
fn change_without_lines_in_the_file_adds_no_group() {
    let mut h = Harness::new(vec![main_kt_with_foreign_helper(1)]);
    let out = h
        .pass(vec![
            ("a/MainKt", main_kt_with_foreign_helper(2)),
            ("a/MainKt$KeyMeta", key_meta(&[(1, 5, 15)])),
        ])
        .unwrap();
    assert_eq!(out.classes.len(), 1);
    assert_eq!(out.invalidate_mode, InvalidateMode::InvalidateGroups);
    assert!(out.group_ids_to_invalidate.is_empty());
}

#[test]
fn lambda_added_outside_groups_restarts() {
    let name = "a/MainKt$onCreate$1";
    let mut h = Harness::new(vec![main_kt(1, 8)]);
    let out = h
        .pass(vec![
            ("a/MainKt", main_kt(1, 8)),
            (name, lambda(name, ("a/MainKt", "onCreate", "()V"), 31, 0)),
            ("a/MainKt$KeyMeta", key_meta(&[(1, 5, 15)])),
        ])
        .unwrap();
    assert_eq!(out.invalidate_mode, InvalidateMode::RestartActivity);
    assert_eq!(out.classes.len(), 1);
}

#[test]
fn constructor_change_tolerated_only_on_first_observation() {
    let mut h = Harness::new(vec![model_class(1)]);
    h.pass(vec![("a/Model", model_class(2))]).unwrap();

    let err = h.pass(vec![("a/Model", model_class(3))]).unwrap_err();
    let PassError::Rejected(rejected) = err else {
        panic!("expected rejection");
    };
    assert_eq!(rejected.reason.code(), "LP003");
    assert_eq!(
        h.session.cache().get("a/Model").map(|m| m.content_hash),
        Some(parse(&model_class(2)).content_hash)
    );

    h.session.reset_session();
    assert!(h.session.cache().is_empty());
    assert!(h.pass(vec![("a/Model", model_class(3))]).is_ok());
}

#[test]
fn rejection_in_one_file_discards_the_whole_pass() {
    let mut h = Harness::new(vec![main_kt(1, 8)]);
    h.compiler.set(MAIN, vec![("a/MainKt", main_kt(2, 8))]);
    h.compiler.set(
        OTHER,
        vec![("a/Other", ClassWriter::new("a/Other", Some("java/lang/Object")).finish())],
    );
    h.session.record_edit(CompileRequest::new(MAIN, Vec::new()));
    h.session.record_edit(CompileRequest::new(OTHER, Vec::new()));
    let err = h.session.flush(&InvocationPolicy::Manual).unwrap_err();
    assert!(matches!(err, PassError::Rejected(_)));
    assert!(h.session.cache().is_empty());
    assert_eq!(h.session.pending().len(), 2);
}

#[test]
fn compiler_diagnostics_surface_verbatim() {
    let mut h = Harness::new(vec![main_kt(1, 8)]);
    h.compiler
        .fail(MAIN, &["Main.kt:8:5: error: unresolved reference: Txet"]);
    let err = h
        .session
        .submit(CompileRequest::new(MAIN, Vec::new()), &InvocationPolicy::Manual)
        .unwrap_err();
    let PassError::Compiler(diag) = err else {
        panic!("expected compiler error");
    };
    assert_eq!(
        diag.diagnostics,
        vec!["Main.kt:8:5: error: unresolved reference: Txet"]
    );
    assert!(h.session.cache().is_empty());

    let out = h.pass(vec![("a/MainKt", main_kt(2, 8))]).unwrap();
    assert_eq!(out.classes.len(), 1);
    assert!(h.session.pending().is_empty());
}

#[test]
fn malformed_output_fails_the_pass() {
    let mut h = Harness::new(vec![main_kt(1, 8)]);
    let err = h
        .pass(vec![("a/MainKt", b"\xCA\xFE\xBA\xBE\x00".to_vec())])
        .unwrap_err();
    assert!(matches!(err, PassError::MalformedClass { ref class, .. } if class == "a/MainKt.class"));
    assert!(!err.is_user_facing());
}

#[test]
fn misplaced_class_file_is_an_internal_error() {
    let mut h = Harness::new(vec![main_kt(1, 8)]);
    let err = h.pass(vec![("a/Wrong", main_kt(2, 8))]).unwrap_err();
    assert!(matches!(err, PassError::Internal(_)));
}

#[test]
fn concurrent_edit_restarts_automatic_pass() {
    let mut h = Harness::new(vec![main_kt(1, 8)]);
    h.compiler.set(
        MAIN,
        vec![
            ("a/MainKt", main_kt(2, 8)),
            ("a/MainKt$KeyMeta", key_meta(&[(1, 5, 15)])),
        ],
    );
    *h.compiler.bump_once.lock().unwrap() = Some(h.session.tracker().clone());

    let policy = InvocationPolicy::Automatic {
        quiet_period: Duration::from_millis(5),
        max_retries: 3,
        poll_interval: Duration::from_millis(1),
    };
    let out = h
        .session
        .submit(CompileRequest::new(MAIN, Vec::new()), &policy)
        .unwrap();
    assert_eq!(h.compiler.calls(), 2);
    assert_eq!(out.group_ids_to_invalidate, BTreeSet::from([1]));
}

#[test]
fn manual_pass_is_not_preempted() {
    let mut h = Harness::new(vec![main_kt(1, 8)]);
    h.compiler.set(MAIN, vec![("a/MainKt", main_kt(2, 8))]);
    *h.compiler.bump_once.lock().unwrap() = Some(h.session.tracker().clone());
    h.session
        .submit(CompileRequest::new(MAIN, Vec::new()), &InvocationPolicy::Manual)
        .unwrap();
    assert_eq!(h.compiler.calls(), 1);
}

#[test]
fn directory_baseline_feeds_first_comparison() {
    let dir = tempfile::tempdir().unwrap();
    let provider = DirBaseline::new(dir.path());
    let path = provider.class_path("a/MainKt");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, main_kt(1, 8)).unwrap();

    let mut h = Harness::with_provider(Box::new(provider));
    let out = h.pass(vec![("a/MainKt", main_kt(1, 8))]).unwrap();
    assert!(out.is_empty());
    let out = h.pass(vec![("a/MainKt", main_kt(2, 8))]).unwrap();
    assert_eq!(out.classes.len(), 1);
}
