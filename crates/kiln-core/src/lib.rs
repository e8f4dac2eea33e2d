//! Core shared types for Kiln.
//!
//! This crate is intentionally small: ids, positions, diagnostics and the
//! name helpers every other crate agrees on.

mod diagnostic;
mod file_id;
mod name;

pub use diagnostic::{Diagnostic, DiagnosticSeverity};
pub use file_id::FileId;
pub use name::{
    binary_to_internal, internal_to_binary, is_system_name, outer_binary_name, package_of,
    root_binary_name, simple_name, DEFAULT_SYSTEM_PREFIXES, NESTED_SEPARATOR,
};

/// Cooperative interruption flag shared between a running build and the
/// threads that want to stop it.
pub use tokio_util::sync::CancellationToken;

/// A position in a text document expressed as (line, UTF-16 code unit offset).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[inline]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A half-open range in a text document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[inline]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Empty range at the start of a document.
    pub const fn zero() -> Self {
        Self::new(Position::new(0, 0), Position::new(0, 0))
    }
}
