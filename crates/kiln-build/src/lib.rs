//! Incremental build scheduling.
//!
//! [`BuildScheduler`] keeps the set of files awaiting compilation, orders it
//! by the file dependency graph, drives an external [`Compiler`] and feeds
//! the produced artifacts back into the
//! [`FileDependencyCache`](kiln_deps::FileDependencyCache) so edits propagate
//! to exactly the files that depend on them.

mod compiler;
mod fs_cleanup;
mod queue;
mod scheduler;
mod syntax;
mod topo;

use thiserror::Error;

pub use compiler::{CompileOutput, CompileRequest, CompileStatus, Compiler, Parser};
pub use queue::{BuildQueue, EntryState};
pub use scheduler::{BuildOptions, BuildOutcome, BuildScheduler, BuildStatus};
pub use syntax::SyntaxCache;
pub use topo::topological_order;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Project(#[from] kiln_project::ProjectError),

    /// A broken internal invariant; aborts the current build pass.
    #[error("internal build error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BuildError>;
