use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_config::BuildConfig;
use kiln_core::{CancellationToken, Diagnostic, FileId};
use kiln_deps::FileDependencyCache;
use kiln_project::Workspace;
use parking_lot::Mutex;

use crate::compiler::{CompileOutput, CompileRequest, CompileStatus, Compiler};
use crate::fs_cleanup::remove_file_best_effort;
use crate::queue::{BuildQueue, EntryState};
use crate::topo::topological_order;
use crate::{BuildError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    /// Retryable failures tolerated per build before it is interrupted.
    pub max_error_count: usize,
    /// Runnable sets larger than this are ordered topologically.
    pub sort_threshold: usize,
    pub cycle_probe_limit: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from(&BuildConfig::default())
    }
}

impl From<&BuildConfig> for BuildOptions {
    fn from(config: &BuildConfig) -> Self {
        Self {
            max_error_count: config.max_error_count,
            sort_threshold: config.sort_threshold,
            cycle_probe_limit: config.cycle_probe_limit,
        }
    }
}

/// Result of one [`BuildScheduler::build`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BuildOutcome {
    /// Files compiled successfully, in compile order.
    pub compiled: Vec<FileId>,
    /// Files left queued with source errors.
    pub failed: Vec<FileId>,
    /// Stopped early by the interrupt flag or the retry ceiling; remaining
    /// work stays queued.
    pub interrupted: bool,
}

impl BuildOutcome {
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty() && !self.interrupted
    }
}

/// Point-in-time view of the scheduler for editors.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BuildStatus {
    pub queued: Vec<(FileId, EntryState)>,
    pub diagnostics: BTreeMap<FileId, Vec<Diagnostic>>,
    pub interrupted: bool,
    pub needs_build: bool,
    pub last_build: Option<BuildOutcome>,
}

#[derive(Default)]
struct SchedulerState {
    queue: BuildQueue,
    diagnostics: BTreeMap<FileId, Vec<Diagnostic>>,
    interrupted: bool,
    last_build: Option<BuildOutcome>,
}

/// Drives incremental compilation of a workspace.
///
/// Edits and deletions may be reported from any thread while a build runs;
/// they are merged into the queue and picked up by the next pass. Only one
/// build runs at a time.
pub struct BuildScheduler {
    workspace: Arc<Workspace>,
    deps: Arc<FileDependencyCache>,
    compiler: Arc<dyn Compiler>,
    options: BuildOptions,
    state: Mutex<SchedulerState>,
    build_lock: Mutex<()>,
}

impl std::fmt::Debug for BuildScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildScheduler")
            .field("workspace", &self.workspace)
            .field("options", &self.options)
            .field("queued", &self.state.lock().queue.len())
            .finish()
    }
}

enum Step {
    Continue,
    Interrupt,
}

impl BuildScheduler {
    pub fn new(
        workspace: Arc<Workspace>,
        deps: Arc<FileDependencyCache>,
        compiler: Arc<dyn Compiler>,
        options: BuildOptions,
    ) -> Self {
        Self {
            workspace,
            deps,
            compiler,
            options,
            state: Mutex::new(SchedulerState::default()),
            build_lock: Mutex::new(()),
        }
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    pub fn dependency_cache(&self) -> &Arc<FileDependencyCache> {
        &self.deps
    }

    /// Queues `path` after an edit.
    pub fn mark_dirty(&self, path: &Path) -> FileId {
        let file = self.workspace.file_id(path);
        self.deps.mark_stale(file);
        if self.state.lock().queue.enqueue(file) {
            tracing::trace!(target = "kiln.build", path = %path.display(), "queued");
        }
        file
    }

    /// Queues every source file of the workspace (initial load).
    pub fn mark_all_dirty(&self) -> usize {
        let files = self.workspace.source_files();
        for path in &files {
            self.mark_dirty(path);
        }
        files.len()
    }

    /// Handles deletion of `path`: dependents are queued, the file's edges
    /// are cleared, and its artifacts, nested types included, are deleted.
    ///
    /// Returns the dependents that were queued.
    pub fn remove_file(&self, path: &Path) -> Vec<FileId> {
        let file = self.workspace.file_id(path);
        for artifact in self.workspace.artifacts_for_source(path) {
            remove_file_best_effort(&artifact, "source deleted");
        }
        if let Some(binary) = self.workspace.types_for_source(path) {
            self.deps.table().evict_class(&binary);
        }

        let dependents = self.deps.remove_file(file);
        let mut state = self.state.lock();
        state.queue.remove(file);
        state.diagnostics.remove(&file);
        for &dependent in &dependents {
            state.queue.enqueue(dependent);
        }
        tracing::debug!(
            target = "kiln.build",
            path = %path.display(),
            dependents = dependents.len(),
            "source removed"
        );
        dependents
    }

    pub fn needs_build(&self) -> bool {
        !self.state.lock().queue.is_empty()
    }

    /// Whether the most recent build stopped before finishing its queue.
    pub fn interrupt_flag(&self) -> bool {
        self.state.lock().interrupted
    }

    pub fn queued_files(&self) -> Vec<FileId> {
        self.state.lock().queue.files()
    }

    pub fn diagnostics(&self, file: FileId) -> Vec<Diagnostic> {
        self.state
            .lock()
            .diagnostics
            .get(&file)
            .cloned()
            .unwrap_or_default()
    }

    pub fn status(&self) -> BuildStatus {
        let state = self.state.lock();
        BuildStatus {
            queued: state
                .queue
                .files()
                .into_iter()
                .filter_map(|file| Some((file, state.queue.state(file)?)))
                .collect(),
            diagnostics: state.diagnostics.clone(),
            interrupted: state.interrupted,
            needs_build: !state.queue.is_empty(),
            last_build: state.last_build.clone(),
        }
    }

    /// Compiles queued files until the queue holds only failed files, `cancel`
    /// fires, or the retry ceiling is reached.
    ///
    /// Only internal invariant violations are returned as errors; compile
    /// failures are reported through the outcome and [`diagnostics`](Self::diagnostics).
    pub fn build(&self, cancel: &CancellationToken) -> Result<BuildOutcome> {
        let _build = self.build_lock.lock();
        {
            let mut state = self.state.lock();
            state.queue.reset_failed();
            state.interrupted = false;
        }

        let mut outcome = BuildOutcome::default();
        let mut retries = 0usize;
        let mut retry_diagnostics: BTreeMap<FileId, Vec<Diagnostic>> = BTreeMap::new();

        'passes: loop {
            let runnable = self.state.lock().queue.runnable();
            if runnable.is_empty() {
                break;
            }
            let order = self.order(&runnable)?;
            tracing::debug!(target = "kiln.build", files = order.len(), "build pass");

            for file in order {
                if cancel.is_cancelled() {
                    tracing::info!(target = "kiln.build", "build interrupted");
                    outcome.interrupted = true;
                    break 'passes;
                }
                {
                    let mut state = self.state.lock();
                    match state.queue.state(file) {
                        Some(EntryState::Pending | EntryState::Retrying) => {
                            state.queue.set_state(file, EntryState::Compiling);
                        }
                        // Removed or failed since the pass was planned.
                        _ => continue,
                    }
                }

                let step =
                    self.compile_one(file, &mut outcome, &mut retries, &mut retry_diagnostics)?;
                if let Step::Interrupt = step {
                    outcome.interrupted = true;
                    break 'passes;
                }
            }
        }

        let mut state = self.state.lock();
        if outcome.interrupted {
            // Surface the errors that exhausted the retry budget.
            for (file, diagnostics) in retry_diagnostics {
                if state.queue.contains(file) {
                    state.diagnostics.insert(file, diagnostics);
                }
            }
        }
        outcome.failed = state
            .queue
            .files()
            .into_iter()
            .filter(|file| state.queue.state(*file) == Some(EntryState::Failed))
            .collect();
        state.interrupted = outcome.interrupted;
        state.last_build = Some(outcome.clone());
        tracing::info!(
            target = "kiln.build",
            compiled = outcome.compiled.len(),
            failed = outcome.failed.len(),
            interrupted = outcome.interrupted,
            "build finished"
        );
        Ok(outcome)
    }

    fn order(&self, runnable: &[FileId]) -> Result<Vec<FileId>> {
        if runnable.len() <= self.options.sort_threshold {
            return Ok(runnable.to_vec());
        }
        topological_order(
            runnable,
            |file| self.deps.dependencies(file),
            self.options.cycle_probe_limit,
        )
    }

    fn compile_one(
        &self,
        file: FileId,
        outcome: &mut BuildOutcome,
        retries: &mut usize,
        retry_diagnostics: &mut BTreeMap<FileId, Vec<Diagnostic>>,
    ) -> Result<Step> {
        let Some(path) = self.workspace.path_of(file) else {
            return Err(BuildError::Internal(format!("{file} has no path")));
        };
        let Some(project) = self.workspace.project_for_source(&path) else {
            tracing::warn!(
                target = "kiln.build",
                path = %path.display(),
                "file is outside every project; dropping it from the queue"
            );
            self.state.lock().queue.remove(file);
            return Ok(Step::Continue);
        };
        let classpath = self.workspace.classpath(project.name())?;

        let request = CompileRequest {
            file,
            path: &path,
            project,
            classpath: &classpath,
        };
        tracing::debug!(target = "kiln.build", path = %path.display(), "compiling");
        let output = self.compiler.compile(&request);

        match output.status {
            CompileStatus::Success => {
                self.on_success(file, &path, project.name(), output);
                outcome.compiled.push(file);
                retry_diagnostics.remove(&file);
                Ok(Step::Continue)
            }
            CompileStatus::Retryable => {
                *retries += 1;
                retry_diagnostics.insert(file, output.diagnostics);
                let mut state = self.state.lock();
                if state.queue.state(file) == Some(EntryState::Compiling) {
                    state.queue.set_state(file, EntryState::Retrying);
                }
                if *retries >= self.options.max_error_count {
                    tracing::warn!(
                        target = "kiln.build",
                        retries = *retries,
                        "retry ceiling reached; interrupting build"
                    );
                    return Ok(Step::Interrupt);
                }
                Ok(Step::Continue)
            }
            CompileStatus::Fatal => {
                tracing::debug!(
                    target = "kiln.build",
                    path = %path.display(),
                    diagnostics = output.diagnostics.len(),
                    "compile failed"
                );
                let mut state = self.state.lock();
                state.diagnostics.insert(file, output.diagnostics);
                if state.queue.state(file) == Some(EntryState::Compiling) {
                    state.queue.set_state(file, EntryState::Failed);
                }
                retry_diagnostics.remove(&file);
                Ok(Step::Continue)
            }
        }
    }

    fn on_success(&self, file: FileId, path: &Path, project: &str, output: CompileOutput) {
        if !self.state.lock().queue.contains(file) {
            tracing::debug!(
                target = "kiln.build",
                path = %path.display(),
                "source removed while compiling; discarding result"
            );
            for artifact in &output.artifacts {
                remove_file_best_effort(artifact, "source deleted");
            }
            return;
        }

        let artifacts = if output.artifacts.is_empty() {
            self.workspace.artifacts_for_source(path)
        } else {
            self.remove_stale_artifacts(path, &output.artifacts);
            output.artifacts
        };

        let sources = self.workspace.sources_visible_from(project);
        let update = self.deps.update_dependencies(file, &artifacts, &sources);

        let mut state = self.state.lock();
        // An edit that arrived mid-compile keeps the file queued.
        if state.queue.state(file) == Some(EntryState::Compiling) {
            state.queue.remove(file);
        }
        if output.diagnostics.is_empty() {
            state.diagnostics.remove(&file);
        } else {
            state.diagnostics.insert(file, output.diagnostics);
        }

        if update.declarations_changed {
            let mut queued = Vec::new();
            for dependent in self.deps.dependents(file) {
                if state.queue.enqueue(dependent) {
                    queued.push(dependent);
                }
            }
            if !queued.is_empty() {
                tracing::debug!(
                    target = "kiln.build",
                    path = %path.display(),
                    dependents = ?queued,
                    "declarations changed; queued dependents"
                );
            }
        }
    }

    /// Deletes artifacts of `path` that the latest compile no longer produced
    /// (nested types that were removed from the source).
    fn remove_stale_artifacts(&self, path: &Path, produced: &[PathBuf]) {
        let produced: HashSet<&Path> = produced.iter().map(PathBuf::as_path).collect();
        let mut removed = false;
        for artifact in self.workspace.artifacts_for_source(path) {
            if !produced.contains(artifact.as_path()) {
                removed |= remove_file_best_effort(&artifact, "stale nested artifact");
            }
        }
        if removed {
            if let Some(binary) = self.workspace.types_for_source(path) {
                self.deps.table().evict_class(&binary);
            }
        }
    }
}
