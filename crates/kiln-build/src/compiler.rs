use std::path::{Path, PathBuf};

use kiln_classpath::ClasspathEntry;
use kiln_core::{Diagnostic, FileId};
use kiln_deps::SyntaxTree;
use kiln_project::Project;

/// Everything a compiler needs to build one source file.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub file: FileId,
    pub path: &'a Path,
    pub project: &'a Project,
    /// The project's aggregated classpath, its own build root first.
    pub classpath: &'a [ClasspathEntry],
}

impl CompileRequest<'_> {
    /// Where artifacts for this file are written.
    pub fn build_root(&self) -> &Path {
        self.project.build_root()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum CompileStatus {
    Success,
    /// Failed for a reason a later pass may fix (a dependency that is not
    /// compiled yet).
    Retryable,
    /// A genuine source error.
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutput {
    pub status: CompileStatus,
    /// Artifacts written by this compile, nested types included.
    pub artifacts: Vec<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileOutput {
    pub fn success(artifacts: Vec<PathBuf>) -> Self {
        Self {
            status: CompileStatus::Success,
            artifacts,
            diagnostics: Vec::new(),
        }
    }

    pub fn failed(status: CompileStatus, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            status,
            artifacts: Vec::new(),
            diagnostics,
        }
    }
}

/// Turns one source file into artifacts under the project's build root.
///
/// Calls are synchronous and may block indefinitely.
pub trait Compiler: Send + Sync {
    fn compile(&self, request: &CompileRequest<'_>) -> CompileOutput;
}

/// Front-end parser producing syntax trees on demand.
pub trait Parser: Send + Sync {
    fn parse_source(&self, path: &Path, text: &str) -> Option<SyntaxTree>;
}
