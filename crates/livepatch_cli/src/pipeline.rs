//! Shared helpers for CLI commands: configuration lookup, class loading and
//! the directory-backed compiler used by `patch`.

use std::path::{Path, PathBuf};

use livepatch_classfile::{ClassModel, ParseOptions};
use livepatch_config::LivePatchConfig;
use livepatch_engine::{CompiledClass, CompilerDiagnosticError, FrontEndCompiler};

use crate::GlobalArgs;

/// Loads `livepatch.toml`.
///
/// `--config` may name the file itself or its directory; without it the
/// current directory is used. A missing file yields the defaults.
pub fn load_config(global: &GlobalArgs) -> Result<LivePatchConfig, Box<dyn std::error::Error>> {
    match global.config {
        Some(ref path) if path.is_file() => {
            let content = std::fs::read_to_string(path)?;
            Ok(livepatch_config::load_config_from_str(&content)?)
        }
        Some(ref dir) => Ok(livepatch_config::load_config(dir)?),
        None => Ok(livepatch_config::load_config(Path::new("."))?),
    }
}

/// Parse options honoring the configured inline markers.
pub fn parse_options(config: &LivePatchConfig) -> ParseOptions {
    ParseOptions::with_inline_markers(config.classify.inline_markers.iter().cloned())
}

/// Reads and parses one class file.
pub fn read_class(path: &Path, options: &ParseOptions) -> Result<ClassModel, Box<dyn std::error::Error>> {
    let bytes = std::fs::read(path).map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let model = ClassModel::parse_with(&bytes, options).map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(model)
}

/// A "compiler" that returns the class files already present in a directory.
///
/// Lets `patch` run a pass over the output of an external build.
pub struct PrecompiledCompiler {
    root: PathBuf,
}

impl PrecompiledCompiler {
    /// Serves the classes under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn collect(&self, dir: &Path, out: &mut Vec<CompiledClass>) -> std::io::Result<()> {
        let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let path = entry.path();
            if path.is_dir() {
                self.collect(&path, out)?;
            } else if path.extension().is_some_and(|ext| ext == "class") {
                let relative = path.strip_prefix(&self.root).unwrap_or(&path);
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push(CompiledClass::new(relative, std::fs::read(&path)?));
            }
        }
        Ok(())
    }
}

impl FrontEndCompiler for PrecompiledCompiler {
    fn compile(
        &self,
        source: &Path,
        _changed_declarations: &[String],
    ) -> Result<Vec<CompiledClass>, CompilerDiagnosticError> {
        let mut out = Vec::new();
        self.collect(&self.root, &mut out)
            .map_err(|e| CompilerDiagnosticError {
                source_file: source.to_path_buf(),
                diagnostics: vec![format!("cannot read {}: {e}", self.root.display())],
            })?;
        tracing::debug!(root = %self.root.display(), classes = out.len(), "collected precompiled classes");
        Ok(out)
    }
}
