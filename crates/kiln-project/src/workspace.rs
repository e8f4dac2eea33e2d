use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use kiln_classpath::{Classpath, ClasspathEntry};
use kiln_config::KilnConfig;
use kiln_core::{root_binary_name, FileId};
use kiln_deps::SourceMap;
use parking_lot::{Mutex, RwLock};
use walkdir::WalkDir;

use crate::file_id::FileIdRegistry;
use crate::project::Project;
use crate::{ProjectError, Result};

/// Projects of one workspace plus the caches derived from their dependency
/// lists.
///
/// Closures and aggregated classpaths are computed on first use and cached;
/// [`set_dependencies`](Self::set_dependencies) drops the cache entries of the
/// edited project and of every project that (transitively) depends on it.
pub struct Workspace {
    projects: IndexMap<String, Project>,
    source_extension: String,
    artifact_extension: String,
    closures: Mutex<HashMap<String, Arc<[String]>>>,
    classpaths: Mutex<HashMap<String, Arc<[ClasspathEntry]>>>,
    files: RwLock<FileIdRegistry>,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("projects", &self.projects.keys().collect::<Vec<_>>())
            .field("source_extension", &self.source_extension)
            .field("artifact_extension", &self.artifact_extension)
            .finish()
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_extensions("java", "class")
    }

    pub fn with_extensions(source: &str, artifact: &str) -> Self {
        Self {
            projects: IndexMap::new(),
            source_extension: source.to_owned(),
            artifact_extension: artifact.to_owned(),
            closures: Mutex::new(HashMap::new()),
            classpaths: Mutex::new(HashMap::new()),
            files: RwLock::new(FileIdRegistry::new()),
        }
    }

    /// Builds a workspace from the `[[project]]` entries of a manifest.
    pub fn from_config(config: &KilnConfig) -> Result<Self> {
        let mut workspace =
            Self::with_extensions(&config.build.source_extension, &config.build.artifact_extension);
        for entry in &config.projects {
            let mut project = Project::new(&entry.name, &entry.source_root, &entry.build_root);
            for path in &entry.classpath {
                project = project.with_classpath(ClasspathEntry::from_path(path));
            }
            for dep in &entry.depends_on {
                project = project.with_dependency(dep);
            }
            workspace.add_project(project)?;
        }
        Ok(workspace)
    }

    pub fn source_extension(&self) -> &str {
        &self.source_extension
    }

    pub fn artifact_extension(&self) -> &str {
        &self.artifact_extension
    }

    pub fn add_project(&mut self, project: Project) -> Result<()> {
        if self.projects.contains_key(project.name()) {
            return Err(ProjectError::DuplicateProject(project.name().to_owned()));
        }
        let name = project.name().to_owned();
        self.projects.insert(name.clone(), project);
        // Earlier lookups may have skipped this name as missing.
        self.invalidate(&name);
        Ok(())
    }

    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.get(name)
    }

    /// Projects in declaration order.
    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    /// Replaces `name`'s dependency list and invalidates every cache entry
    /// derived from it.
    pub fn set_dependencies(&mut self, name: &str, depends_on: Vec<String>) -> Result<()> {
        let project = self
            .projects
            .get_mut(name)
            .ok_or_else(|| ProjectError::UnknownProject(name.to_owned()))?;
        project.set_depends_on(depends_on);
        self.invalidate(name);
        Ok(())
    }

    /// Drops cached closures and classpaths of `name` and of every project
    /// whose dependency graph reaches it.
    fn invalidate(&self, name: &str) {
        let mut affected = HashSet::from([name.to_owned()]);
        let mut queue = VecDeque::from([name.to_owned()]);
        while let Some(target) = queue.pop_front() {
            for project in self.projects.values() {
                if project.depends_on().iter().any(|d| *d == target)
                    && affected.insert(project.name().to_owned())
                {
                    queue.push_back(project.name().to_owned());
                }
            }
        }

        let mut closures = self.closures.lock();
        let mut classpaths = self.classpaths.lock();
        for project in &affected {
            closures.remove(project);
            classpaths.remove(project);
        }
        tracing::debug!(
            target = "kiln.project",
            project = name,
            affected = affected.len(),
            "invalidated dependency closures"
        );
    }

    /// `name` followed by every project it transitively depends on,
    /// depth-first in declaration order, each listed once.
    pub fn dependency_closure(&self, name: &str) -> Result<Arc<[String]>> {
        if let Some(closure) = self.closures.lock().get(name) {
            return Ok(Arc::clone(closure));
        }
        if !self.projects.contains_key(name) {
            return Err(ProjectError::UnknownProject(name.to_owned()));
        }

        let mut closure = Vec::new();
        let mut seen = HashSet::new();
        self.collect_closure(name, &mut seen, &mut closure);
        let closure: Arc<[String]> = closure.into();

        Ok(Arc::clone(
            self.closures
                .lock()
                .entry(name.to_owned())
                .or_insert(closure),
        ))
    }

    fn collect_closure(&self, name: &str, seen: &mut HashSet<String>, out: &mut Vec<String>) {
        if !seen.insert(name.to_owned()) {
            return;
        }
        let Some(project) = self.projects.get(name) else {
            tracing::warn!(
                target = "kiln.project",
                project = name,
                "dependency on unknown project ignored"
            );
            return;
        };
        out.push(name.to_owned());
        for dep in project.depends_on() {
            self.collect_closure(dep, seen, out);
        }
    }

    fn closure_projects(&self, name: &str) -> Result<Vec<&Project>> {
        Ok(self
            .dependency_closure(name)?
            .iter()
            .filter_map(|p| self.projects.get(p))
            .collect())
    }

    /// First existing `source_root/relative` across `name`'s closure.
    pub fn resolve_source(&self, name: &str, relative: &Path) -> Result<Option<PathBuf>> {
        Ok(self
            .closure_projects(name)?
            .into_iter()
            .map(|p| p.source_root().join(relative))
            .find(|path| path.exists()))
    }

    /// First existing `build_root/relative` across `name`'s closure.
    pub fn resolve_artifact(&self, name: &str, relative: &Path) -> Result<Option<PathBuf>> {
        Ok(self
            .closure_projects(name)?
            .into_iter()
            .map(|p| p.build_root().join(relative))
            .find(|path| path.exists()))
    }

    /// Own entries of every project in the closure, de-duplicated by path in
    /// discovery order.
    pub fn classpath(&self, name: &str) -> Result<Arc<[ClasspathEntry]>> {
        if let Some(entries) = self.classpaths.lock().get(name) {
            return Ok(Arc::clone(entries));
        }

        let mut seen = HashSet::new();
        let entries: Arc<[ClasspathEntry]> = self
            .closure_projects(name)?
            .into_iter()
            .flat_map(Project::own_classpath)
            .filter(|entry| seen.insert(entry.path().to_path_buf()))
            .collect();

        Ok(Arc::clone(
            self.classpaths
                .lock()
                .entry(name.to_owned())
                .or_insert(entries),
        ))
    }

    pub fn class_finder(&self, name: &str) -> Result<Classpath> {
        Ok(Classpath::new(self.classpath(name)?.to_vec()))
    }

    /// Union of every project's aggregated classpath, in project order.
    pub fn workspace_classpath(&self) -> Classpath {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for name in self.projects.keys() {
            let Ok(classpath) = self.classpath(name) else {
                continue;
            };
            entries.extend(
                classpath
                    .iter()
                    .filter(|entry| seen.insert(entry.path().to_path_buf()))
                    .cloned(),
            );
        }
        Classpath::new(entries)
    }

    /// Project whose source root contains `path`.
    pub fn project_for_source(&self, path: &Path) -> Option<&Project> {
        self.projects.values().find(|p| p.contains_source(path))
    }

    fn source_relative(&self, binary: &str) -> PathBuf {
        let root = root_binary_name(binary);
        PathBuf::from(format!("{}.{}", root.replace('.', "/"), self.source_extension))
    }

    /// Source file defining the outermost type of `binary`, searched across
    /// projects in declaration order.
    pub fn source_for_type(&self, binary: &str) -> Option<PathBuf> {
        let relative = self.source_relative(binary);
        self.projects
            .values()
            .map(|p| p.source_root().join(&relative))
            .find(|path| path.is_file())
    }

    /// Like [`source_for_type`](Self::source_for_type), but only within the
    /// dependency closure of project `name`, in closure order.
    pub fn source_for_type_in(&self, name: &str, binary: &str) -> Result<Option<PathBuf>> {
        let relative = self.source_relative(binary);
        Ok(self
            .closure_projects(name)?
            .into_iter()
            .map(|p| p.source_root().join(&relative))
            .find(|path| path.is_file()))
    }

    /// Source map for files of project `name`: types resolve only to sources
    /// the project can see.
    pub fn sources_visible_from<'a>(&'a self, name: &'a str) -> ProjectSources<'a> {
        ProjectSources {
            workspace: self,
            project: name,
        }
    }

    /// Binary name of the top-level type `path` defines by its location.
    pub fn types_for_source(&self, path: &Path) -> Option<String> {
        let project = self.project_for_source(path)?;
        let relative = path.strip_prefix(project.source_root()).ok()?;
        if relative.extension()?.to_str()? != self.source_extension {
            return None;
        }
        let relative = relative.with_extension("");
        let segments: Option<Vec<&str>> = relative.iter().map(|c| c.to_str()).collect();
        Some(segments?.join("."))
    }

    /// Existing artifacts compiled from `path`: the top-level type's artifact
    /// and every nested type's (`Outer$...`).
    pub fn artifacts_for_source(&self, path: &Path) -> Vec<PathBuf> {
        let (Some(project), Some(binary)) =
            (self.project_for_source(path), self.types_for_source(path))
        else {
            return Vec::new();
        };
        let internal = kiln_core::binary_to_internal(&binary);
        let candidate = project.build_root().join(&internal);
        let (Some(dir), Some(stem)) = (
            candidate.parent(),
            candidate.file_name().and_then(|n| n.to_str()),
        ) else {
            return Vec::new();
        };

        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let nested = format!("{stem}$");
        let mut artifacts: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().and_then(|e| e.to_str()) == Some(self.artifact_extension.as_str())
                    && path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .is_some_and(|s| s == stem || s.starts_with(&nested))
            })
            .collect();
        artifacts.sort();
        artifacts
    }

    /// Every source file under every project's source root, sorted.
    pub fn source_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .projects
            .values()
            .flat_map(|p| {
                WalkDir::new(p.source_root())
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_file())
                    .map(|entry| entry.into_path())
            })
            .filter(|path| {
                path.extension().and_then(|e| e.to_str()) == Some(self.source_extension.as_str())
            })
            .collect();
        files.sort();
        files.dedup();
        files
    }

    pub fn file_id(&self, path: &Path) -> FileId {
        if let Some(id) = self.files.read().get_id(path) {
            return id;
        }
        self.files.write().file_id(path)
    }

    pub fn lookup_file(&self, path: &Path) -> Option<FileId> {
        self.files.read().get_id(path)
    }

    pub fn path_of(&self, file: FileId) -> Option<PathBuf> {
        self.files.read().get_path(file).map(Path::to_path_buf)
    }
}

impl SourceMap for Workspace {
    fn file_for_type(&self, binary: &str) -> Option<FileId> {
        self.source_for_type(binary).map(|path| self.file_id(&path))
    }
}

/// [`SourceMap`] scoped to one project's dependency closure.
#[derive(Debug, Clone, Copy)]
pub struct ProjectSources<'a> {
    workspace: &'a Workspace,
    project: &'a str,
}

impl SourceMap for ProjectSources<'_> {
    fn file_for_type(&self, binary: &str) -> Option<FileId> {
        let path = self
            .workspace
            .source_for_type_in(self.project, binary)
            .ok()
            .flatten()?;
        Some(self.workspace.file_id(&path))
    }
}
