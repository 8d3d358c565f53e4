//! One live-patching session.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use livepatch_cache::{BaselineProvider, ClassCache};
use livepatch_classfile::{ClassModel, ParseOptions};
use livepatch_common::{InternalError, LiveResult};
use livepatch_config::LivePatchConfig;
use livepatch_diff::diff;
use livepatch_source::SourceLines;

use crate::classify::{is_restart_lambda, ChangeClassifier};
use crate::error::{CompilerDiagnosticError, PassError};
use crate::groups::GroupExtractor;
use crate::output::{CompileOutput, CompileOutputBuilder};
use crate::scheduler::{Checkpoint, CompileScheduler, InvocationPolicy, ModificationTracker, ReadToken};
use crate::validate::validate;

/// One class file produced by the front-end compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledClass {
    /// Output path relative to the class root, `com/example/MainKt.class`.
    pub relative_path: String,
    /// Class-file bytes.
    pub bytes: Vec<u8>,
}

impl CompiledClass {
    /// Creates an output entry.
    pub fn new(relative_path: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            relative_path: relative_path.into(),
            bytes,
        }
    }

    /// Internal class name implied by the output path.
    pub fn class_name(&self) -> String {
        let path = self.relative_path.replace('\\', "/");
        let path = path.trim_start_matches('/');
        path.strip_suffix(".class").unwrap_or(path).to_string()
    }
}

/// Compiles one source file into class files.
pub trait FrontEndCompiler: Send + Sync {
    /// Compiles `source`. `changed_declarations` names the declarations
    /// edited since the last pass, for compilers that can narrow their work.
    fn compile(
        &self,
        source: &Path,
        changed_declarations: &[String],
    ) -> Result<Vec<CompiledClass>, CompilerDiagnosticError>;
}

/// An edited source file waiting for a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    /// The edited file.
    pub source: PathBuf,
    /// Names of the edited declarations.
    pub changed_declarations: Vec<String>,
}

impl CompileRequest {
    /// Creates a request for `source`.
    pub fn new(source: impl Into<PathBuf>, changed_declarations: Vec<String>) -> Self {
        Self {
            source: source.into(),
            changed_declarations,
        }
    }
}

/// Everything an accepted pass commits.
struct PassOutcome {
    output: CompileOutput,
    accepted: Vec<ClassModel>,
    restart_lambdas: Vec<String>,
}

/// State of one live session against one running program.
///
/// The session owns the [`ClassCache`]. A pass either commits every class it
/// compiled or nothing: rejected, failed and cancelled passes leave the cache
/// and the pending edits as they were.
pub struct LiveSession {
    compiler: Box<dyn FrontEndCompiler>,
    baseline: Box<dyn BaselineProvider>,
    lines: Arc<dyn SourceLines>,
    classifier: ChangeClassifier,
    extractor: GroupExtractor,
    parse_options: ParseOptions,
    scheduler: CompileScheduler,
    cache: ClassCache,
    restart_lambdas: HashSet<String>,
    pending: Vec<CompileRequest>,
}

impl LiveSession {
    /// Creates a session with an empty cache.
    pub fn new(
        compiler: Box<dyn FrontEndCompiler>,
        baseline: Box<dyn BaselineProvider>,
        lines: Arc<dyn SourceLines>,
        config: &LivePatchConfig,
    ) -> Self {
        Self {
            compiler,
            baseline,
            lines,
            classifier: ChangeClassifier::new(&config.classify.lambda_supertypes),
            extractor: GroupExtractor::from_config(&config.groups),
            parse_options: ParseOptions::with_inline_markers(config.classify.inline_markers.iter().cloned()),
            scheduler: CompileScheduler::new(),
            cache: ClassCache::new(),
            restart_lambdas: HashSet::new(),
            pending: Vec::new(),
        }
    }

    /// The tracker editors bump on every source mutation.
    pub fn tracker(&self) -> &ModificationTracker {
        self.scheduler.tracker()
    }

    /// The session cache.
    pub fn cache(&self) -> &ClassCache {
        &self.cache
    }

    /// Edits recorded but not yet flushed by a successful pass.
    pub fn pending(&self) -> &[CompileRequest] {
        &self.pending
    }

    /// Returns `true` if `class_name` was identified as a restart lambda.
    pub fn is_restart_lambda(&self, class_name: &str) -> bool {
        self.restart_lambdas.contains(class_name)
    }

    /// Records an edit for the next pass.
    pub fn record_edit(&mut self, request: CompileRequest) {
        self.scheduler.tracker().bump();
        match self.pending.iter_mut().find(|p| p.source == request.source) {
            Some(existing) => {
                for decl in request.changed_declarations {
                    if !existing.changed_declarations.contains(&decl) {
                        existing.changed_declarations.push(decl);
                    }
                }
            }
            None => self.pending.push(request),
        }
    }

    /// Records `request` and runs a pass over every pending edit.
    pub fn submit(
        &mut self,
        request: CompileRequest,
        policy: &InvocationPolicy,
    ) -> Result<CompileOutput, PassError> {
        self.record_edit(request);
        self.flush(policy)
    }

    /// Runs a pass over every pending edit.
    pub fn flush(&mut self, policy: &InvocationPolicy) -> Result<CompileOutput, PassError> {
        if self.pending.is_empty() {
            return Ok(CompileOutput::empty());
        }
        let requests = self.pending.clone();
        let outcome = {
            let this = &*self;
            this.scheduler
                .run(policy, |token| this.run_pass(&requests, token))
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                if err.is_user_facing() {
                    tracing::info!(error = %err, "pass produced no output");
                }
                return Err(err);
            }
        };

        tracing::info!(
            files = requests.len(),
            classes = outcome.output.classes.len(),
            mode = ?outcome.output.invalidate_mode,
            groups = outcome.output.group_ids_to_invalidate.len(),
            "pass complete"
        );
        self.cache.commit(outcome.accepted);
        self.restart_lambdas.extend(outcome.restart_lambdas);
        self.pending.clear();
        Ok(outcome.output)
    }

    /// Forgets everything learned in the session.
    ///
    /// Called when the target program is redeployed or disconnected.
    pub fn reset_session(&mut self) {
        tracing::debug!(cached = self.cache.len(), "resetting live session");
        self.cache.clear();
        self.restart_lambdas.clear();
        self.pending.clear();
    }

    fn run_pass(&self, requests: &[CompileRequest], token: &ReadToken) -> Result<PassOutcome, PassError> {
        let mut builder = CompileOutputBuilder::new();
        let mut accepted = Vec::new();
        let mut restart_lambdas = Vec::new();

        for request in requests {
            let source = request.source.as_path();
            tracing::debug!(source = %source.display(), "compiling");
            let compiled = self.compiler.compile(source, &request.changed_declarations)?;
            token.checkpoint(Checkpoint::PostCompile)?;

            let mut key_meta = None;
            let mut classes = Vec::new();
            for class in &compiled {
                let model = self.parse_output(source, class)?;
                if self.extractor.is_key_meta_class(&model) {
                    key_meta = Some(model);
                } else {
                    classes.push((model, class));
                }
            }
            let groups = self.extractor.extract(key_meta.as_ref(), source, self.lines.as_ref());
            let line_count = self.lines.line_count(source);
            token.checkpoint(Checkpoint::PreDiff)?;

            for (model, class) in &classes {
                let old = match self.cache.get(&model.name) {
                    Some(cached) => Some(Cow::Borrowed(cached)),
                    None => self.baseline.get_class(source, &model.name).map(Cow::Owned),
                };
                let first_observation = !self.cache.contains(&model.name);
                let diff = old.as_deref().and_then(|old| diff(old, model));
                let classification = self.classifier.classify(model);
                tracing::debug!(
                    class = %model.name,
                    kind = ?classification.kind,
                    baseline = old.is_some(),
                    changed = diff.is_some(),
                    "compared class"
                );
                token.checkpoint(Checkpoint::PreValidate)?;
                validate(old.as_deref(), model, diff.as_ref(), &classification, first_observation)?;

                let restart = self.restart_lambdas.contains(&model.name)
                    || is_restart_lambda(model, &classification);
                if restart {
                    restart_lambdas.push(model.name.clone());
                }

                match (&old, &diff) {
                    (None, _) => {
                        builder.add_class(&model.name, class.bytes.clone(), classification.kind);
                        let scope = self.scope_lines(model, &classes);
                        builder.record_added_support_class(&model.name, &scope, &groups, line_count);
                    }
                    (Some(_), Some(diff)) => {
                        builder.add_class(&model.name, class.bytes.clone(), classification.kind);
                        let changed = diff
                            .modified_methods
                            .iter()
                            .map(|m| &m.new)
                            .chain(&diff.added_methods);
                        for method in changed {
                            builder.record_modified_method(&model.name, method, &groups, restart, line_count);
                        }
                    }
                    (Some(_), None) => {}
                }
            }
            accepted.extend(classes.into_iter().map(|(model, _)| model));
        }

        Ok(PassOutcome {
            output: builder.build(),
            accepted,
            restart_lambdas,
        })
    }

    fn parse_output(&self, source: &Path, class: &CompiledClass) -> Result<ClassModel, PassError> {
        let model = ClassModel::parse_with(&class.bytes, &self.parse_options).map_err(|err| {
            tracing::error!(
                source = %source.display(),
                path = %class.relative_path,
                len = class.bytes.len(),
                error = %err,
                "compiler produced a malformed class file"
            );
            PassError::MalformedClass {
                class: class.relative_path.clone(),
                source: err,
            }
        })?;
        check_output_path(class, &model)?;
        Ok(model)
    }

    /// Lines of the code that instantiates a new support class: its enclosing
    /// method if known, otherwise the class's own lines.
    fn scope_lines(&self, model: &ClassModel, siblings: &[(ClassModel, &CompiledClass)]) -> BTreeSet<u32> {
        let enclosing = model.enclosing_method.as_ref().and_then(|enclosing| {
            let (name, descriptor) = enclosing.method.as_ref()?;
            let owner = siblings
                .iter()
                .map(|(m, _)| m)
                .find(|m| m.name == enclosing.class)
                .or_else(|| self.cache.get(&enclosing.class))?;
            owner.method(name, descriptor).map(|m| m.lines.clone())
        });
        enclosing.unwrap_or_else(|| model.lines())
    }
}

/// The compiler must write every class to the path its name implies.
fn check_output_path(class: &CompiledClass, model: &ClassModel) -> LiveResult<()> {
    if model.name == class.class_name() {
        Ok(())
    } else {
        Err(InternalError::new(format!(
            "class {} was written to {}",
            model.name, class.relative_path
        )))
    }
}
