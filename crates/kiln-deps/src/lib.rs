//! Symbol-level dependency tracking.
//!
//! [`extract_references`] turns one compiled artifact into the set of
//! declarations it uses; [`FileDependencyCache`] folds those sets into
//! symmetric file-to-file edges.

mod cache;
mod defined;
mod references;

pub use cache::{DependencySnapshot, DependencyUpdate, FileDependencyCache, SourceMap, SyntaxTree};
pub use defined::{defined_declarations, DefinedDeclarations};
pub use references::{artifact_references, extract_references};
