use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;

use kiln_classpath::{Classpath, ClasspathEntry};
use kiln_core::{FileId, DEFAULT_SYSTEM_PREFIXES};
use kiln_decl::DeclTable;
use kiln_deps::{FileDependencyCache, SourceMap};
use kiln_test_utils::fixture::write_class;
use kiln_test_utils::{ClassWriter, MemberSpec};

struct Fixture {
    dir: tempfile::TempDir,
    cache: FileDependencyCache,
    types: HashMap<String, FileId>,
}

impl Fixture {
    /// `files` lists (top-level binary name, file id).
    fn new(files: &[(&str, u32)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let classpath = Classpath::new(vec![ClasspathEntry::ClassDir(dir.path().to_path_buf())]);
        let table = Arc::new(DeclTable::new(Arc::new(classpath)));
        let prefixes = DEFAULT_SYSTEM_PREFIXES.iter().map(|p| p.to_string()).collect();
        Self {
            dir,
            cache: FileDependencyCache::new(table, prefixes),
            types: files
                .iter()
                .map(|(name, id)| (name.to_string(), FileId::from_raw(*id)))
                .collect(),
        }
    }

    fn class(&self, writer: ClassWriter, internal: &str) -> PathBuf {
        write_class(self.dir.path(), internal, &writer.build())
    }

    fn update(&self, file: u32, artifacts: &[PathBuf]) -> kiln_deps::DependencyUpdate {
        let types = &self.types;
        let sources = |binary: &str| types.get(binary).copied();
        self.cache
            .update_dependencies(FileId::from_raw(file), artifacts, &sources)
    }

    fn deps(&self, file: u32) -> Vec<u32> {
        raw(self.cache.dependencies(FileId::from_raw(file)))
    }

    fn dependents(&self, file: u32) -> Vec<u32> {
        raw(self.cache.dependents(FileId::from_raw(file)))
    }

    fn assert_symmetric(&self) {
        for file in self.cache.files() {
            for dep in self.cache.dependencies(file) {
                assert!(self.cache.dependents(dep).contains(&file), "{file} -> {dep}");
            }
            for dependent in self.cache.dependents(file) {
                assert!(self.cache.dependencies(dependent).contains(&file));
            }
            assert!(!self.cache.dependencies(file).contains(&file));
            assert!(!self.cache.dependents(file).contains(&file));
        }
    }
}

fn raw(files: Vec<FileId>) -> Vec<u32> {
    files.into_iter().map(FileId::to_raw).collect()
}

#[test]
fn field_type_creates_symmetric_edge() {
    let fx = Fixture::new(&[("p.A", 0), ("p.B", 1)]);
    let a = fx.class(
        ClassWriter::new("p/A").field(MemberSpec::new("b", "Lp/B;")),
        "p/A",
    );
    let b = fx.class(ClassWriter::new("p/B"), "p/B");

    assert!(fx.update(1, &[b]).changed());
    let update = fx.update(0, &[a]);
    assert!(update.references_changed);

    assert_eq!(fx.deps(0), vec![1]);
    assert_eq!(fx.dependents(1), vec![0]);
    assert!(fx.deps(1).is_empty());
    fx.assert_symmetric();

    let referenced: Vec<_> = fx
        .cache
        .referenced(FileId::from_raw(0))
        .iter()
        .map(|d| d.id().to_string())
        .collect();
    assert_eq!(referenced, vec!["p.B"]);
}

#[test]
fn self_and_same_file_references_never_form_edges() {
    let fx = Fixture::new(&[("p.A", 0), ("p.Helper", 0)]);
    let a = fx.class(
        ClassWriter::new("p/A")
            .class_ref("p/A$Inner")
            .class_ref("p/Helper")
            .field(MemberSpec::new("self", "Lp/A;")),
        "p/A",
    );
    let inner = fx.class(ClassWriter::new("p/A$Inner").class_ref("p/A"), "p/A$Inner");
    let helper = fx.class(ClassWriter::new("p/Helper").class_ref("p/A"), "p/Helper");

    fx.update(0, &[a, inner, helper]);
    assert!(fx.deps(0).is_empty());
    assert!(fx.dependents(0).is_empty());
    // Helper is still a referenced declaration, it just maps back to file 0.
    let referenced = fx.cache.referenced(FileId::from_raw(0));
    assert!(referenced.iter().any(|d| d.id() == "p.Helper"));
}

#[test]
fn dependency_set_tracks_the_latest_references_only() {
    let fx = Fixture::new(&[("p.A", 0), ("p.B", 1), ("p.C", 2)]);
    fx.class(ClassWriter::new("p/B"), "p/B");
    fx.class(ClassWriter::new("p/C"), "p/C");
    let a = fx.class(
        ClassWriter::new("p/A")
            .class_ref("p/B")
            .method(MemberSpec::new("c", "()Lp/C;")),
        "p/A",
    );
    fx.update(0, std::slice::from_ref(&a));
    assert_eq!(fx.deps(0), vec![1, 2]);

    fx.class(
        ClassWriter::new("p/A").method(MemberSpec::new("c", "()Lp/C;")),
        "p/A",
    );
    let update = fx.update(0, &[a]);
    assert!(update.references_changed);
    assert_eq!(fx.deps(0), vec![2]);
    assert!(fx.dependents(1).is_empty());
    assert_eq!(fx.dependents(2), vec![0]);
    fx.assert_symmetric();
}

#[test]
fn supertypes_and_generic_bounds_are_dependencies() {
    let fx = Fixture::new(&[("p.A", 0), ("p.Base", 1), ("p.Bound", 2), ("p.Api", 3)]);
    fx.class(ClassWriter::new("p/Base"), "p/Base");
    fx.class(ClassWriter::new("p/Bound"), "p/Bound");
    fx.class(ClassWriter::new("p/Api").access(0x0601), "p/Api");
    let a = fx.class(
        ClassWriter::new("p/A")
            .super_class("p/Base")
            .interface("p/Api")
            .signature("<T:Lp/Bound;>Lp/Base;Lp/Api;"),
        "p/A",
    );
    fx.update(0, &[a]);
    assert_eq!(fx.deps(0), vec![1, 2, 3]);
}

#[test]
fn system_namespaces_are_not_tracked() {
    let fx = Fixture::new(&[("p.A", 0), ("java.util.Fake", 1)]);
    fx.class(ClassWriter::new("java/util/Fake"), "java/util/Fake");
    let a = fx.class(ClassWriter::new("p/A").class_ref("java/util/Fake"), "p/A");
    fx.update(0, &[a]);
    assert!(fx
        .cache
        .referenced(FileId::from_raw(0))
        .iter()
        .any(|d| d.id() == "java.util.Fake"));
    assert!(fx.deps(0).is_empty());
}

#[test]
fn broken_artifacts_are_skipped_individually() {
    let fx = Fixture::new(&[("p.A", 0), ("p.B", 1)]);
    fx.class(ClassWriter::new("p/B"), "p/B");
    let a = fx.class(ClassWriter::new("p/A").class_ref("p/B"), "p/A");
    let garbage = write_class(fx.dir.path(), "p/A$Broken", b"\xCA\xFE\xBA\xBE\x00");
    let missing = fx.dir.path().join("p/A$Gone.class");

    fx.update(0, &[garbage, a, missing]);
    assert_eq!(fx.deps(0), vec![1]);
}

#[test]
fn shape_changes_are_reported_only_for_visible_edits() {
    let fx = Fixture::new(&[("p.B", 1)]);
    let b = fx.class(
        ClassWriter::new("p/B").method(MemberSpec::new("run", "()V").flags(0x0001)),
        "p/B",
    );
    assert!(fx.update(1, std::slice::from_ref(&b)).declarations_changed);

    let again = fx.update(1, std::slice::from_ref(&b));
    assert!(!again.declarations_changed);
    assert!(!again.changed());

    fx.class(
        ClassWriter::new("p/B")
            .method(MemberSpec::new("run", "()V").flags(0x0001))
            .method(MemberSpec::new("hidden", "()V").flags(0x0002)),
        "p/B",
    );
    assert!(!fx.update(1, std::slice::from_ref(&b)).declarations_changed);

    fx.class(
        ClassWriter::new("p/B").method(MemberSpec::new("run", "(I)V").flags(0x0001)),
        "p/B",
    );
    assert!(fx.update(1, &[b]).declarations_changed);
}

#[test]
fn removing_a_file_clears_both_directions() {
    let fx = Fixture::new(&[("p.A", 0), ("p.B", 1), ("p.C", 2)]);
    fx.class(ClassWriter::new("p/C"), "p/C");
    let b = fx.class(ClassWriter::new("p/B").class_ref("p/C"), "p/B");
    let a = fx.class(ClassWriter::new("p/A").class_ref("p/B"), "p/A");
    fx.update(1, &[b]);
    fx.update(0, &[a]);
    assert_eq!(fx.deps(1), vec![2]);

    let dependents = fx.cache.remove_file(FileId::from_raw(1));
    assert_eq!(raw(dependents), vec![0]);
    assert!(fx.deps(0).is_empty());
    assert!(fx.dependents(2).is_empty());
    assert!(!fx.cache.files().contains(&FileId::from_raw(1)));
    fx.assert_symmetric();
}

#[test]
fn unchanged_references_relink_a_removed_dependency() {
    let fx = Fixture::new(&[("p.A", 0), ("p.B", 1)]);
    let b = fx.class(ClassWriter::new("p/B"), "p/B");
    let a = fx.class(ClassWriter::new("p/A").class_ref("p/B"), "p/A");
    fx.update(1, std::slice::from_ref(&b));
    fx.update(0, std::slice::from_ref(&a));

    fx.cache.remove_file(FileId::from_raw(1));
    assert!(fx.deps(0).is_empty());

    fx.update(1, &[b]);
    let update = fx.update(0, &[a]);
    assert!(update.references_changed);
    assert!(!update.declarations_changed);
    assert_eq!(fx.deps(0), vec![1]);
    assert_eq!(fx.dependents(1), vec![0]);
    fx.assert_symmetric();
}

#[test]
fn stale_files_drop_their_syntax_tree() {
    let fx = Fixture::new(&[]);
    let file = FileId::from_raw(7);
    fx.cache.set_syntax_tree(file, Arc::new(String::from("tree")));
    assert!(fx.cache.syntax_tree(file).is_some());
    assert!(!fx.cache.is_stale(file));

    fx.cache.mark_stale(file);
    assert!(fx.cache.is_stale(file));
    assert!(fx.cache.syntax_tree(file).is_none());

    let snapshot = fx.cache.snapshot(file);
    assert!(snapshot.stale);
    assert!(snapshot.dependencies.is_empty());
}

#[test]
fn snapshot_serializes_for_editors() {
    let fx = Fixture::new(&[("p.A", 0), ("p.B", 1)]);
    let a = fx.class(
        ClassWriter::new("p/A").field(MemberSpec::new("b", "Lp/B;")),
        "p/A",
    );
    fx.class(ClassWriter::new("p/B"), "p/B");
    fx.update(0, &[a]);

    let json = serde_json::to_value(fx.cache.snapshot(FileId::from_raw(0))).unwrap();
    assert_eq!(json["dependencies"], serde_json::json!([1]));
    assert_eq!(json["stale"], false);
    let referenced = json["referenced"].as_array().unwrap();
    assert!(referenced.contains(&serde_json::json!("p.B")));
    let defined = json["defined"].as_array().unwrap();
    assert!(defined.contains(&serde_json::json!("p.A#b")));
}

#[test]
fn concurrent_updates_keep_edges_symmetric() {
    let fx = Arc::new(Fixture::new(&[
        ("p.F0", 0),
        ("p.F1", 1),
        ("p.F2", 2),
        ("p.F3", 3),
    ]));
    let mut artifacts = Vec::new();
    for i in 0..4u32 {
        let mut writer = ClassWriter::new(&format!("p/F{i}"));
        for j in 0..4u32 {
            if i != j {
                writer = writer.class_ref(&format!("p/F{j}"));
            }
        }
        artifacts.push(fx.class(writer, &format!("p/F{i}")));
    }

    let handles: Vec<_> = artifacts
        .into_iter()
        .enumerate()
        .map(|(i, artifact)| {
            let fx = Arc::clone(&fx);
            thread::spawn(move || {
                fx.update(i as u32, &[artifact]);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..4 {
        let expected: Vec<u32> = (0..4).filter(|&j| j != i).collect();
        assert_eq!(fx.deps(i), expected);
        assert_eq!(fx.dependents(i), expected);
    }
    fx.assert_symmetric();
}

#[test]
fn concurrent_updates_of_one_file_agree_with_its_references() {
    let fx = Arc::new(Fixture::new(&[("p.A", 0), ("p.B", 1), ("p.C", 2)]));
    fx.class(ClassWriter::new("p/B"), "p/B");
    fx.class(ClassWriter::new("p/C"), "p/C");
    let to_b = fx.class(ClassWriter::new("p/A").class_ref("p/B"), "v1/A");
    let to_c = fx.class(ClassWriter::new("p/A").class_ref("p/C"), "v2/A");

    for _ in 0..50 {
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [to_b.clone(), to_c.clone()]
            .into_iter()
            .map(|artifact| {
                let fx = Arc::clone(&fx);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    fx.update(0, &[artifact]);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = fx.cache.snapshot(FileId::from_raw(0));
        let expected = if snapshot.referenced.iter().any(|id| id.as_str() == "p.B") {
            vec![FileId::from_raw(1)]
        } else {
            vec![FileId::from_raw(2)]
        };
        assert_eq!(snapshot.dependencies, expected);
        fx.assert_symmetric();
    }
}

#[test]
fn closures_and_trait_objects_both_map_sources() {
    struct Fixed;
    impl SourceMap for Fixed {
        fn file_for_type(&self, binary: &str) -> Option<FileId> {
            (binary == "p.B").then(|| FileId::from_raw(1))
        }
    }
    let fx = Fixture::new(&[]);
    fx.class(ClassWriter::new("p/B"), "p/B");
    let a = fx.class(ClassWriter::new("p/A").class_ref("p/B"), "p/A");
    fx.cache
        .update_dependencies(FileId::from_raw(0), &[a], &Fixed);
    assert_eq!(fx.deps(0), vec![1]);
}
