//! A toy line-oriented compiler and a scratch workspace to drive the
//! scheduler end to end.
//!
//! Source files hold one directive per line:
//!
//! ```text
//! extends p.Base
//! implements p.Iface
//! field name: p.Type
//! method name(p.Arg, int): p.Ret
//! inner Name
//! uses p.Other
//! error message
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kiln_build::{
    BuildOptions, BuildOutcome, BuildScheduler, CompileOutput, CompileRequest, CompileStatus,
    Compiler,
};
use kiln_classpath::{ClassFinder, Classpath};
use kiln_core::{
    binary_to_internal, root_binary_name, CancellationToken, Diagnostic, FileId, Range,
    DEFAULT_SYSTEM_PREFIXES,
};
use kiln_decl::DeclTable;
use kiln_deps::FileDependencyCache;
use kiln_project::{Project, Workspace};
use kiln_test_utils::fixture::write_file;
use kiln_test_utils::{ClassWriter, MemberSpec};
use parking_lot::Mutex;

const ACC_PUBLIC_STATIC: u16 = 0x0009;

#[derive(Debug, Default)]
struct Unit {
    extends: Option<String>,
    implements: Vec<String>,
    fields: Vec<(String, String)>,
    methods: Vec<(String, Vec<String>, String)>,
    inner: Vec<String>,
    uses: Vec<String>,
    errors: Vec<String>,
}

impl Unit {
    fn parse(text: &str) -> Result<Self, String> {
        let mut unit = Unit::default();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            let (directive, rest) = line.split_once(' ').unwrap_or((line, ""));
            let rest = rest.trim();
            match directive {
                "extends" => unit.extends = Some(rest.to_string()),
                "implements" => unit.implements.push(rest.to_string()),
                "inner" => unit.inner.push(rest.to_string()),
                "uses" => unit.uses.push(rest.to_string()),
                "error" => unit.errors.push(rest.to_string()),
                "field" => {
                    let (name, ty) = rest.split_once(':').ok_or("field needs a type")?;
                    unit.fields.push((name.trim().into(), ty.trim().into()));
                }
                "method" => {
                    let (name, rest) = rest.split_once('(').ok_or("method needs parameters")?;
                    let (params, ret) = rest.split_once(')').ok_or("unclosed parameter list")?;
                    let params = params
                        .split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string)
                        .collect();
                    let ret = ret.trim().trim_start_matches(':').trim();
                    let ret = if ret.is_empty() { "void" } else { ret };
                    unit.methods.push((name.trim().into(), params, ret.into()));
                }
                other => return Err(format!("unknown directive `{other}`")),
            }
        }
        Ok(unit)
    }

    fn referenced_types(&self) -> impl Iterator<Item = &str> {
        self.extends
            .iter()
            .chain(&self.implements)
            .chain(&self.uses)
            .chain(self.fields.iter().map(|(_, ty)| ty))
            .chain(
                self.methods
                    .iter()
                    .flat_map(|(_, params, ret)| params.iter().chain(std::iter::once(ret))),
            )
            .map(|ty| ty.trim_end_matches("[]"))
            .filter(|ty| !is_primitive(ty))
    }
}

fn is_primitive(ty: &str) -> bool {
    matches!(
        ty,
        "void" | "boolean" | "byte" | "char" | "short" | "int" | "long" | "float" | "double"
    )
}

fn descriptor(ty: &str) -> String {
    if let Some(element) = ty.strip_suffix("[]") {
        return format!("[{}", descriptor(element));
    }
    match ty {
        "void" => "V".into(),
        "boolean" => "Z".into(),
        "byte" => "B".into(),
        "char" => "C".into(),
        "short" => "S".into(),
        "int" => "I".into(),
        "long" => "J".into(),
        "float" => "F".into(),
        "double" => "D".into(),
        other => format!("L{};", binary_to_internal(other)),
    }
}

/// Compiles toy sources into class artifacts under the project's build root.
///
/// A referenced type must already be compiled on the request's classpath.
/// When it is not, the failure is retryable if some project has its source
/// and fatal otherwise.
pub struct ToyCompiler {
    workspace: Arc<Workspace>,
    attempts: Mutex<Vec<String>>,
}

impl ToyCompiler {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self {
            workspace,
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Binary names of every compile attempt since the last call.
    pub fn take_attempts(&self) -> Vec<String> {
        std::mem::take(&mut *self.attempts.lock())
    }

    fn fail(status: CompileStatus, path: &Path, message: String) -> CompileOutput {
        CompileOutput::failed(
            status,
            vec![Diagnostic::error(path, Range::zero(), message).with_source("toyc")],
        )
    }
}

impl Compiler for ToyCompiler {
    fn compile(&self, request: &CompileRequest<'_>) -> CompileOutput {
        let Some(binary) = self.workspace.types_for_source(request.path) else {
            return Self::fail(CompileStatus::Fatal, request.path, "not a source file".into());
        };
        self.attempts.lock().push(binary.clone());

        let text = match std::fs::read_to_string(request.path) {
            Ok(text) => text,
            Err(err) => return Self::fail(CompileStatus::Fatal, request.path, err.to_string()),
        };
        let unit = match Unit::parse(&text) {
            Ok(unit) => unit,
            Err(message) => return Self::fail(CompileStatus::Fatal, request.path, message),
        };
        if let Some(message) = unit.errors.first() {
            return Self::fail(CompileStatus::Fatal, request.path, message.clone());
        }

        let classpath = Classpath::new(request.classpath.to_vec());
        for ty in unit.referenced_types() {
            if ty.starts_with("java.") || root_binary_name(ty) == binary {
                continue;
            }
            if matches!(classpath.find_class(&binary_to_internal(ty)), Ok(Some(_))) {
                continue;
            }
            let status = if self.workspace.source_for_type(ty).is_some() {
                CompileStatus::Retryable
            } else {
                CompileStatus::Fatal
            };
            return Self::fail(status, request.path, format!("cannot find symbol {ty}"));
        }

        let internal = binary_to_internal(&binary);
        let mut class = ClassWriter::new(&internal);
        if let Some(base) = &unit.extends {
            class = class.super_class(&binary_to_internal(base));
        }
        for iface in &unit.implements {
            class = class.interface(&binary_to_internal(iface));
        }
        for used in &unit.uses {
            class = class.class_ref(&binary_to_internal(used));
        }
        for (name, ty) in &unit.fields {
            class = class.field(MemberSpec::new(name, &descriptor(ty)));
        }
        for (name, params, ret) in &unit.methods {
            let params: String = params.iter().map(|p| descriptor(p)).collect();
            class = class.method(MemberSpec::new(name, &format!("({params}){}", descriptor(ret))));
        }

        let build_root = request.build_root();
        let mut artifacts = Vec::new();
        for name in &unit.inner {
            let nested = format!("{internal}${name}");
            class = class.inner_class(&nested, Some(&internal), Some(name), ACC_PUBLIC_STATIC);
            let bytes = ClassWriter::new(&nested)
                .inner_class(&nested, Some(&internal), Some(name), ACC_PUBLIC_STATIC)
                .build();
            artifacts.push(write_file(build_root, &format!("{nested}.class"), bytes));
        }
        artifacts.insert(0, write_file(build_root, &format!("{internal}.class"), class.build()));

        tracing::debug!(
            target = "kiln.test",
            binary = %binary,
            artifacts = artifacts.len(),
            "toy compile"
        );
        CompileOutput::success(artifacts)
    }
}

/// Runs `hook` before delegating to the toy compiler.
struct Hooked<F> {
    toy: Arc<ToyCompiler>,
    hook: F,
}

impl<F> Compiler for Hooked<F>
where
    F: Fn(&CompileRequest<'_>) + Send + Sync,
{
    fn compile(&self, request: &CompileRequest<'_>) -> CompileOutput {
        (self.hook)(request);
        self.toy.compile(request)
    }
}

/// A scratch workspace wired to a scheduler and the toy compiler.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub workspace: Arc<Workspace>,
    pub toy: Arc<ToyCompiler>,
    pub scheduler: Arc<BuildScheduler>,
}

impl Harness {
    /// One project named `app`.
    pub fn new() -> Self {
        Self::with_hook(BuildOptions::default(), |_| {})
    }

    pub fn with_options(options: BuildOptions) -> Self {
        Self::with_hook(options, |_| {})
    }

    pub fn with_hook<F>(options: BuildOptions, hook: F) -> Self
    where
        F: Fn(&CompileRequest<'_>) + Send + Sync + 'static,
    {
        Self::with_projects(&[("app", None)], options, hook)
    }

    /// `projects` lists (name, dependency); each gets `<name>/src` and
    /// `<name>/build` under a temp dir.
    pub fn with_projects<F>(
        projects: &[(&str, Option<&str>)],
        options: BuildOptions,
        hook: F,
    ) -> Self
    where
        F: Fn(&CompileRequest<'_>) + Send + Sync + 'static,
    {
        kiln_test_utils::init_test_tracing();
        let dir = tempfile::tempdir().unwrap();
        let mut workspace = Workspace::new();
        for (name, dependency) in projects {
            let root = dir.path().join(name);
            std::fs::create_dir_all(root.join("src")).unwrap();
            std::fs::create_dir_all(root.join("build")).unwrap();
            let mut project = Project::new(*name, root.join("src"), root.join("build"));
            if let Some(dependency) = dependency {
                project = project.with_dependency(*dependency);
            }
            workspace.add_project(project).unwrap();
        }
        let workspace = Arc::new(workspace);

        let table = Arc::new(DeclTable::new(Arc::new(workspace.workspace_classpath())));
        let prefixes = DEFAULT_SYSTEM_PREFIXES.iter().map(|p| p.to_string()).collect();
        let deps = Arc::new(FileDependencyCache::new(table, prefixes));
        let toy = Arc::new(ToyCompiler::new(Arc::clone(&workspace)));
        let compiler = Arc::new(Hooked {
            toy: Arc::clone(&toy),
            hook,
        });
        let scheduler = Arc::new(BuildScheduler::new(
            Arc::clone(&workspace),
            deps,
            compiler,
            options,
        ));
        Self {
            dir,
            workspace,
            toy,
            scheduler,
        }
    }

    /// Writes the source of `binary` into `project` and returns its path.
    pub fn write_in(&self, project: &str, binary: &str, text: &str) -> PathBuf {
        let root = self.dir.path().join(project).join("src");
        write_file(&root, &format!("{}.java", binary_to_internal(binary)), text)
    }

    pub fn write(&self, binary: &str, text: &str) -> PathBuf {
        self.write_in("app", binary, text)
    }

    pub fn artifact_in(&self, project: &str, internal: &str) -> PathBuf {
        self.dir
            .path()
            .join(project)
            .join("build")
            .join(format!("{internal}.class"))
    }

    pub fn artifact(&self, internal: &str) -> PathBuf {
        self.artifact_in("app", internal)
    }

    pub fn file(&self, path: &Path) -> FileId {
        self.workspace.file_id(path)
    }

    pub fn build(&self) -> BuildOutcome {
        self.scheduler.build(&CancellationToken::new()).unwrap()
    }

    /// Builds everything and clears the attempt log.
    pub fn build_all(&self) -> BuildOutcome {
        self.scheduler.mark_all_dirty();
        let outcome = self.build();
        assert!(outcome.succeeded(), "{outcome:?}");
        self.toy.take_attempts();
        outcome
    }

    /// Binary names of `files`, in order.
    pub fn names(&self, files: &[FileId]) -> Vec<String> {
        files
            .iter()
            .map(|file| {
                let path = self.workspace.path_of(*file).unwrap();
                self.workspace.types_for_source(&path).unwrap()
            })
            .collect()
    }

    pub fn dependencies(&self, path: &Path) -> Vec<String> {
        let deps = self.scheduler.dependency_cache().dependencies(self.file(path));
        self.names(&deps)
    }

    pub fn dependents(&self, path: &Path) -> Vec<String> {
        let deps = self.scheduler.dependency_cache().dependents(self.file(path));
        self.names(&deps)
    }
}

/// A hook that fires once after being armed.
#[derive(Clone, Default)]
pub struct Trigger(Arc<AtomicBool>);

impl Trigger {
    pub fn arm(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn fire(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}
