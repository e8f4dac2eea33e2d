use std::path::{Path, PathBuf};

use kiln_deps::SourceMap;
use kiln_project::{Project, Workspace};
use kiln_test_utils::fixture::{write_file, TempProject};

fn workspace(fx: &TempProject) -> Workspace {
    let mut ws = Workspace::new();
    ws.add_project(Project::new("main", &fx.source_root, &fx.build_root))
        .unwrap();
    ws
}

#[test]
fn types_map_to_sources_through_their_outermost_type() {
    let fx = TempProject::new();
    let source = fx.write_source("p/q/Outer.java", "class Outer {}");
    let ws = workspace(&fx);

    assert_eq!(ws.source_for_type("p.q.Outer"), Some(source.clone()));
    assert_eq!(ws.source_for_type("p.q.Outer$Inner$Deep"), Some(source.clone()));
    assert_eq!(ws.source_for_type("p.q.Missing"), None);
    assert_eq!(ws.types_for_source(&source).as_deref(), Some("p.q.Outer"));
    assert_eq!(ws.types_for_source(Path::new("/elsewhere/X.java")), None);

    let id = ws.file_for_type("p.q.Outer$Inner").unwrap();
    assert_eq!(ws.path_of(id), Some(source.clone()));
    assert_eq!(ws.lookup_file(&source), Some(id));
    assert_eq!(ws.file_id(&source), id);
}

#[test]
fn nested_artifacts_are_matched_by_prefix() {
    let fx = TempProject::new();
    let source = fx.write_source("p/A.java", "class A {}");
    let a = fx.write_class("p/A", b"a");
    let inner = fx.write_class("p/A$Inner", b"a");
    let anon = fx.write_class("p/A$1", b"a");
    fx.write_class("p/AB", b"not ours");
    fx.write_class("p/B$A", b"not ours");
    let ws = workspace(&fx);

    let mut expected = vec![a, anon, inner];
    expected.sort();
    assert_eq!(ws.artifacts_for_source(&source), expected);
    assert!(ws
        .artifacts_for_source(&fx.source_root.join("p/Gone.java"))
        .is_empty());
}

#[test]
fn source_files_are_listed_by_extension() {
    let fx = TempProject::new();
    fx.write_source("p/A.java", "");
    fx.write_source("p/q/B.java", "");
    fx.write_source("p/notes.txt", "");
    let ws = workspace(&fx);

    let files: Vec<PathBuf> = ws
        .source_files()
        .into_iter()
        .map(|p| p.strip_prefix(&fx.source_root).unwrap().to_path_buf())
        .collect();
    assert_eq!(files, vec![PathBuf::from("p/A.java"), PathBuf::from("p/q/B.java")]);
}

#[test]
fn project_sources_resolve_within_the_dependency_closure() {
    let dir = tempfile::tempdir().unwrap();
    let root = |name: &str, part: &str| dir.path().join(name).join(part);
    let mut ws = Workspace::new();
    for (name, dependency) in [("one", None), ("two", None), ("app", Some("two"))] {
        let mut project = Project::new(name, root(name, "src"), root(name, "build"));
        if let Some(dependency) = dependency {
            project = project.with_dependency(dependency);
        }
        ws.add_project(project).unwrap();
    }
    let in_one = write_file(&root("one", "src"), "p/Dup.java", "");
    let in_two = write_file(&root("two", "src"), "p/Dup.java", "");

    assert_eq!(ws.source_for_type("p.Dup"), Some(in_one.clone()));
    assert_eq!(ws.source_for_type_in("app", "p.Dup$Inner").unwrap(), Some(in_two.clone()));
    assert_eq!(ws.source_for_type_in("one", "p.Dup").unwrap(), Some(in_one));
    assert!(ws.source_for_type_in("missing", "p.Dup").is_err());

    let sources = ws.sources_visible_from("app");
    assert_eq!(sources.file_for_type("p.Dup"), Some(ws.file_id(&in_two)));
    assert_eq!(sources.file_for_type("p.Nowhere"), None);

    let own = write_file(&root("app", "src"), "p/Dup.java", "");
    assert_eq!(sources.file_for_type("p.Dup"), Some(ws.file_id(&own)));
}
