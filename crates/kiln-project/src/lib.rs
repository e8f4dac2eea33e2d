//! Multi-project workspace composition.
//!
//! A [`Workspace`] owns a set of [`Project`]s, each with a source root, a
//! build root and library classpath entries, plus the names of the projects
//! it depends on. Source/artifact lookups and classpath aggregation walk a
//! project's dependency closure in declaration order.

mod file_id;
mod project;
mod workspace;

use thiserror::Error;

pub use file_id::FileIdRegistry;
pub use project::Project;
pub use workspace::{ProjectSources, Workspace};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectError {
    #[error("unknown project `{0}`")]
    UnknownProject(String),
    #[error("duplicate project `{0}`")]
    DuplicateProject(String),
}

pub type Result<T> = std::result::Result<T, ProjectError>;
