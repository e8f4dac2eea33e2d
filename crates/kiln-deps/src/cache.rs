use std::any::Any;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_classfile::ClassFile;
use kiln_core::{internal_to_binary, is_system_name, root_binary_name, FileId};
use kiln_decl::{Decl, DeclTable};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use smol_str::SmolStr;

use crate::defined::defined_declarations;
use crate::references::extract_references;

/// Parsed syntax tree produced by the external parser collaborator.
pub type SyntaxTree = Arc<dyn Any + Send + Sync>;

/// Maps top-level types back to the workspace source file defining them.
pub trait SourceMap: Send + Sync {
    /// `binary` is the binary name of an outermost type (`p.q.Outer`).
    fn file_for_type(&self, binary: &str) -> Option<FileId>;
}

impl<F> SourceMap for F
where
    F: Fn(&str) -> Option<FileId> + Send + Sync,
{
    fn file_for_type(&self, binary: &str) -> Option<FileId> {
        self(binary)
    }
}

/// Outcome of [`FileDependencyCache::update_dependencies`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DependencyUpdate {
    /// The file's observable declarations changed; dependents must rebuild.
    pub declarations_changed: bool,
    /// The referenced-declaration set or the file-level edges changed.
    pub references_changed: bool,
}

impl DependencyUpdate {
    pub fn changed(self) -> bool {
        self.declarations_changed || self.references_changed
    }
}

/// Point-in-time view of one file's record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencySnapshot {
    pub file: FileId,
    pub dependencies: Vec<FileId>,
    pub dependents: Vec<FileId>,
    pub defined: Vec<SmolStr>,
    pub referenced: Vec<SmolStr>,
    pub stale: bool,
}

#[derive(Default)]
struct FileRecord {
    defined: HashSet<Decl>,
    shape: BTreeSet<String>,
    referenced: HashSet<Decl>,
    dependencies: BTreeSet<FileId>,
    dependents: BTreeSet<FileId>,
    stale: bool,
    syntax_tree: Option<SyntaxTree>,
}

/// A record plus the guard serialising whole updates of it.
///
/// `update` is held for the full read-modify-write of one file, while
/// `record` is only held for individual reads and edge flips. Holders of
/// `update` never wait on another file's `update`.
#[derive(Default)]
struct Slot {
    update: Mutex<()>,
    record: Mutex<FileRecord>,
}

/// Per-file dependency records with symmetric file-level edges.
///
/// Each record sits behind its own lock. An edge change locks both ends in
/// `FileId` order, so `a ∈ dependents(b)` iff `b ∈ dependencies(a)` holds
/// whenever no update is in flight, and unrelated files update concurrently.
pub struct FileDependencyCache {
    table: Arc<DeclTable>,
    system_prefixes: Vec<String>,
    records: RwLock<HashMap<FileId, Arc<Slot>>>,
}

impl std::fmt::Debug for FileDependencyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDependencyCache")
            .field("files", &self.records.read().len())
            .field("system_prefixes", &self.system_prefixes)
            .finish()
    }
}

impl FileDependencyCache {
    pub fn new(table: Arc<DeclTable>, system_prefixes: Vec<String>) -> Self {
        Self {
            table,
            system_prefixes,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn table(&self) -> &Arc<DeclTable> {
        &self.table
    }

    fn slot(&self, file: FileId) -> Arc<Slot> {
        if let Some(slot) = self.records.read().get(&file) {
            return Arc::clone(slot);
        }
        Arc::clone(self.records.write().entry(file).or_default())
    }

    fn existing(&self, file: FileId) -> Option<Arc<Slot>> {
        self.records.read().get(&file).cloned()
    }

    /// Runs `f` with `from` and `to` locked, always acquiring the lower id
    /// first.
    fn with_edge(
        &self,
        from: FileId,
        to: FileId,
        f: impl FnOnce(&mut FileRecord, &mut FileRecord),
    ) {
        debug_assert_ne!(from, to);
        let from_slot = self.slot(from);
        let to_slot = self.slot(to);
        if from < to {
            let mut a = from_slot.record.lock();
            let mut b = to_slot.record.lock();
            f(&mut a, &mut b);
        } else {
            let mut b = to_slot.record.lock();
            let mut a = from_slot.record.lock();
            f(&mut a, &mut b);
        }
    }

    fn link(&self, from: FileId, to: FileId) {
        self.with_edge(from, to, |a, b| {
            a.dependencies.insert(to);
            b.dependents.insert(from);
        });
    }

    fn unlink(&self, from: FileId, to: FileId) {
        self.with_edge(from, to, |a, b| {
            a.dependencies.remove(&to);
            b.dependents.remove(&from);
        });
    }

    /// Recomputes `file`'s records from its compiled `artifacts`.
    ///
    /// Unreadable or undecodable artifacts are skipped individually. Edges are
    /// derived from class declarations only: each referenced class maps,
    /// through its outermost enclosing type, to the source file that defines
    /// it. System-namespace types and self-references never form edges.
    ///
    /// Edges are reconciled against the current dependency set even when the
    /// referenced declarations are unchanged, so edges dropped by a
    /// dependency's removal come back once it is defined again. Concurrent
    /// updates of the same file are serialised.
    pub fn update_dependencies(
        &self,
        file: FileId,
        artifacts: &[PathBuf],
        sources: &dyn SourceMap,
    ) -> DependencyUpdate {
        let classes: Vec<ClassFile> = artifacts
            .iter()
            .filter_map(|path| load_artifact(path))
            .collect();
        for class in &classes {
            let binary = internal_to_binary(&class.this_class);
            self.table.evict_class(root_binary_name(&binary));
        }

        let defined = defined_declarations(&classes, &self.table);
        let mut referenced = HashSet::new();
        for class in &classes {
            referenced.extend(extract_references(class, &self.table));
        }

        let targets = self.edge_targets(file, &referenced, sources);

        let slot = self.slot(file);
        let _update = slot.update.lock();
        let (declarations_changed, referenced_changed, old_deps) = {
            let mut record = slot.record.lock();
            let declarations_changed = record.shape != defined.shape;
            let referenced_changed = record.referenced != referenced;
            record.defined = defined.decls;
            record.shape = defined.shape;
            record.referenced = referenced;
            record.syntax_tree = None;
            record.stale = false;
            (declarations_changed, referenced_changed, record.dependencies.clone())
        };
        if old_deps == targets {
            return DependencyUpdate {
                declarations_changed,
                references_changed: referenced_changed,
            };
        }

        let added: Vec<FileId> = targets.difference(&old_deps).copied().collect();
        let removed: Vec<FileId> = old_deps.difference(&targets).copied().collect();
        for &to in &added {
            self.link(file, to);
        }
        for &to in &removed {
            self.unlink(file, to);
        }
        tracing::debug!(
            target = "kiln.deps",
            %file,
            added = ?added,
            removed = ?removed,
            "file dependencies updated"
        );

        DependencyUpdate {
            declarations_changed,
            references_changed: true,
        }
    }

    fn edge_targets(
        &self,
        file: FileId,
        referenced: &HashSet<Decl>,
        sources: &dyn SourceMap,
    ) -> BTreeSet<FileId> {
        let roots: HashSet<Decl> = referenced
            .iter()
            .filter(|decl| decl.is_class())
            .filter_map(|decl| decl.root_class())
            .collect();
        roots
            .iter()
            .filter(|root| !is_system_name(root.id(), &self.system_prefixes))
            .filter_map(|root| sources.file_for_type(root.id()))
            .filter(|&target| target != file)
            .collect()
    }

    /// Files `file` depends on, ascending.
    pub fn dependencies(&self, file: FileId) -> Vec<FileId> {
        self.existing(file)
            .map(|s| s.record.lock().dependencies.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Files depending on `file`, ascending.
    pub fn dependents(&self, file: FileId) -> Vec<FileId> {
        self.existing(file)
            .map(|s| s.record.lock().dependents.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn defined(&self, file: FileId) -> Vec<Decl> {
        self.existing(file)
            .map(|s| s.record.lock().defined.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn referenced(&self, file: FileId) -> Vec<Decl> {
        self.existing(file)
            .map(|s| s.record.lock().referenced.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every file with a record, ascending.
    pub fn files(&self) -> Vec<FileId> {
        let mut files: Vec<_> = self.records.read().keys().copied().collect();
        files.sort();
        files
    }

    /// Marks `file` edited: its cached tree is dropped until reparsed.
    pub fn mark_stale(&self, file: FileId) {
        let slot = self.slot(file);
        let mut record = slot.record.lock();
        record.stale = true;
        record.syntax_tree = None;
    }

    pub fn is_stale(&self, file: FileId) -> bool {
        self.existing(file).is_some_and(|s| s.record.lock().stale)
    }

    pub fn syntax_tree(&self, file: FileId) -> Option<SyntaxTree> {
        self.existing(file)
            .and_then(|s| s.record.lock().syntax_tree.clone())
    }

    pub fn set_syntax_tree(&self, file: FileId, tree: SyntaxTree) {
        self.slot(file).record.lock().syntax_tree = Some(tree);
    }

    /// Removes every edge touching `file` in both directions and forgets its
    /// declaration sets; returns the files that depended on it.
    pub fn clear_file(&self, file: FileId) -> Vec<FileId> {
        let Some(slot) = self.existing(file) else {
            return Vec::new();
        };
        let _update = slot.update.lock();
        let (dependencies, dependents) = {
            let mut record = slot.record.lock();
            record.defined.clear();
            record.shape.clear();
            record.referenced.clear();
            record.syntax_tree = None;
            (
                record.dependencies.iter().copied().collect::<Vec<_>>(),
                record.dependents.iter().copied().collect::<Vec<_>>(),
            )
        };
        for to in dependencies {
            self.unlink(file, to);
        }
        for &from in &dependents {
            self.unlink(from, file);
        }
        dependents
    }

    /// Like [`clear_file`](Self::clear_file), then drops the record itself.
    pub fn remove_file(&self, file: FileId) -> Vec<FileId> {
        let dependents = self.clear_file(file);
        self.records.write().remove(&file);
        dependents
    }

    /// Drops every record (before a full re-scan).
    pub fn clear(&self) {
        self.records.write().clear();
    }

    pub fn snapshot(&self, file: FileId) -> DependencySnapshot {
        let mut snapshot = DependencySnapshot {
            file,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            defined: Vec::new(),
            referenced: Vec::new(),
            stale: false,
        };
        let Some(slot) = self.existing(file) else {
            return snapshot;
        };
        let record = slot.record.lock();
        snapshot.dependencies = record.dependencies.iter().copied().collect();
        snapshot.dependents = record.dependents.iter().copied().collect();
        snapshot.defined = sorted_ids(&record.defined);
        snapshot.referenced = sorted_ids(&record.referenced);
        snapshot.stale = record.stale;
        snapshot
    }
}

fn sorted_ids(decls: &HashSet<Decl>) -> Vec<SmolStr> {
    let mut ids: Vec<SmolStr> = decls.iter().map(|d| SmolStr::new(d.id())).collect();
    ids.sort();
    ids
}

fn load_artifact(path: &Path) -> Option<ClassFile> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::debug!(
                target = "kiln.deps",
                path = %path.display(),
                error = %err,
                "failed to read artifact"
            );
            return None;
        }
    };
    match ClassFile::parse(&bytes) {
        Ok(class) => Some(class),
        Err(err) => {
            tracing::warn!(
                target = "kiln.deps",
                path = %path.display(),
                error = %err,
                "failed to decode artifact"
            );
            None
        }
    }
}
