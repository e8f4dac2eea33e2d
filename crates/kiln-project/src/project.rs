use std::path::{Path, PathBuf};

use kiln_classpath::ClasspathEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    name: String,
    source_root: PathBuf,
    build_root: PathBuf,
    classpath: Vec<ClasspathEntry>,
    depends_on: Vec<String>,
}

impl Project {
    pub fn new(
        name: impl Into<String>,
        source_root: impl Into<PathBuf>,
        build_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            source_root: source_root.into(),
            build_root: build_root.into(),
            classpath: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_classpath(mut self, entry: ClasspathEntry) -> Self {
        self.classpath.push(entry);
        self
    }

    pub fn with_dependency(mut self, project: impl Into<String>) -> Self {
        self.depends_on.push(project.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn build_root(&self) -> &Path {
        &self.build_root
    }

    /// Library entries, excluding the project's own build root.
    pub fn classpath(&self) -> &[ClasspathEntry] {
        &self.classpath
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    pub(crate) fn set_depends_on(&mut self, depends_on: Vec<String>) {
        self.depends_on = depends_on;
    }

    /// The build root followed by the library entries.
    pub fn own_classpath(&self) -> impl Iterator<Item = ClasspathEntry> + '_ {
        std::iter::once(ClasspathEntry::ClassDir(self.build_root.clone()))
            .chain(self.classpath.iter().cloned())
    }

    pub fn contains_source(&self, path: &Path) -> bool {
        path.starts_with(&self.source_root)
    }
}
