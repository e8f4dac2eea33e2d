use std::path::Path;
use std::sync::Arc;

use kiln_core::FileId;
use kiln_deps::{FileDependencyCache, SyntaxTree};

use crate::compiler::Parser;

/// Lazily parsed syntax trees, stored alongside the file's dependency record
/// and dropped whenever the file is marked stale.
pub struct SyntaxCache {
    parser: Arc<dyn Parser>,
    deps: Arc<FileDependencyCache>,
}

impl SyntaxCache {
    pub fn new(parser: Arc<dyn Parser>, deps: Arc<FileDependencyCache>) -> Self {
        Self { parser, deps }
    }

    /// Returns the cached tree for `file`, parsing `path` on a miss.
    pub fn syntax_tree(&self, file: FileId, path: &Path) -> Option<SyntaxTree> {
        if let Some(tree) = self.deps.syntax_tree(file) {
            return Some(tree);
        }

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                tracing::debug!(
                    target = "kiln.build",
                    path = %path.display(),
                    error = %err,
                    "failed to read source for parsing"
                );
                return None;
            }
        };

        let tree = self.parser.parse_source(path, &text)?;
        self.deps.set_syntax_tree(file, Arc::clone(&tree));
        Some(tree)
    }
}
