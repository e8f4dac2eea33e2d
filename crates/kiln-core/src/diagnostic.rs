use std::path::PathBuf;

use crate::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Information,
    Hint,
}

/// A compiler or build diagnostic attached to a source file.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Diagnostic {
    pub file: PathBuf,
    pub range: Range,
    pub severity: DiagnosticSeverity,
    pub message: String,
    /// Producer of the diagnostic (e.g. `compiler`, `kiln`).
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(file: impl Into<PathBuf>, range: Range, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            range,
            severity: DiagnosticSeverity::Error,
            message: message.into(),
            source: None,
        }
    }

    pub fn warning(file: impl Into<PathBuf>, range: Range, message: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            ..Self::error(file, range, message)
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}
