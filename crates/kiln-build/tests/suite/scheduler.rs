use std::sync::{Arc, Barrier};
use std::thread;

use kiln_build::{BuildOptions, EntryState};
use kiln_core::CancellationToken;

use crate::suite::support::{Harness, Trigger};

#[test]
fn initial_build_retries_until_dependencies_exist() {
    let h = Harness::new();
    let a = h.write("p.A", "field b: p.B");
    let b = h.write("p.B", "extends p.C\nmethod run(): void");
    h.write("p.C", "method base(): int");

    assert_eq!(h.scheduler.mark_all_dirty(), 3);
    assert!(h.scheduler.needs_build());
    let outcome = h.build();

    assert!(outcome.succeeded(), "{outcome:?}");
    assert_eq!(h.names(&outcome.compiled), ["p.C", "p.B", "p.A"]);
    assert_eq!(h.toy.take_attempts(), ["p.A", "p.B", "p.C", "p.A", "p.B", "p.A"]);
    assert!(!h.scheduler.needs_build());
    assert!(h.artifact("p/A").is_file());

    assert_eq!(h.dependencies(&a), ["p.B"]);
    assert_eq!(h.dependencies(&b), ["p.C"]);
    assert_eq!(h.dependents(&b), ["p.A"]);
}

#[test]
fn rebuild_follows_dependency_order() {
    let h = Harness::new();
    h.write("p.A", "field b: p.B");
    h.write("p.B", "extends p.C");
    h.write("p.C", "");
    h.build_all();

    h.scheduler.mark_all_dirty();
    let outcome = h.build();

    assert_eq!(h.names(&outcome.compiled), ["p.C", "p.B", "p.A"]);
    assert_eq!(h.toy.take_attempts(), ["p.C", "p.B", "p.A"]);
}

#[test]
fn signature_change_rebuilds_dependents() {
    let h = Harness::new();
    h.write("p.A", "field b: p.B");
    let b = h.write("p.B", "method run(): void");
    h.write("p.C", "method base(): int");
    h.build_all();

    h.write("p.B", "method run(int): void");
    h.scheduler.mark_dirty(&b);
    let outcome = h.build();

    assert!(outcome.succeeded());
    assert_eq!(h.names(&outcome.compiled), ["p.B", "p.A"]);
}

#[test]
fn body_only_edit_rebuilds_just_the_file() {
    let h = Harness::new();
    h.write("p.A", "field b: p.B");
    let b = h.write("p.B", "method run(): void");
    h.write("p.C", "");
    h.build_all();
    assert!(h.dependencies(&b).is_empty());

    h.write("p.B", "method run(): void\nuses p.C");
    h.scheduler.mark_dirty(&b);
    let outcome = h.build();

    assert_eq!(h.names(&outcome.compiled), ["p.B"]);
    assert_eq!(h.dependencies(&b), ["p.C"]);
}

#[test]
fn deleting_a_source_requeues_dependents_and_drops_artifacts() {
    let h = Harness::new();
    let a = h.write("p.A", "field b: p.B");
    let b = h.write("p.B", "inner Node");
    h.build_all();
    assert!(h.artifact("p/B$Node").is_file());

    std::fs::remove_file(&b).unwrap();
    let requeued = h.scheduler.remove_file(&b);

    assert_eq!(h.names(&requeued), ["p.A"]);
    assert!(!h.artifact("p/B").exists());
    assert!(!h.artifact("p/B$Node").exists());
    assert!(h.dependencies(&a).is_empty());
    assert_eq!(h.scheduler.queued_files(), [h.file(&a)]);

    let outcome = h.build();
    assert!(!outcome.interrupted);
    assert_eq!(outcome.failed, [h.file(&a)]);
    let diagnostics = h.scheduler.diagnostics(h.file(&a));
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].message, "cannot find symbol p.B");
    assert!(h.scheduler.needs_build());
}

#[test]
fn recreated_dependency_restores_edges() {
    let h = Harness::new();
    let a = h.write("p.A", "field b: p.B");
    let b = h.write("p.B", "method run(): void");
    h.build_all();

    std::fs::remove_file(&b).unwrap();
    h.scheduler.remove_file(&b);
    assert!(h.dependencies(&a).is_empty());

    h.write("p.B", "method run(): void");
    h.scheduler.mark_dirty(&b);
    let outcome = h.build();
    assert!(outcome.succeeded(), "{outcome:?}");
    assert_eq!(h.names(&outcome.compiled), ["p.B", "p.A"]);
    assert_eq!(h.dependencies(&a), ["p.B"]);
    assert_eq!(h.dependents(&b), ["p.A"]);

    h.write("p.B", "method run(int): void");
    h.scheduler.mark_dirty(&b);
    let outcome = h.build();
    assert_eq!(h.names(&outcome.compiled), ["p.B", "p.A"]);
}

#[test]
fn retry_ceiling_interrupts_the_build() {
    let h = Harness::with_options(BuildOptions {
        max_error_count: 3,
        ..BuildOptions::default()
    });
    let a = h.write("p.A", "field b: p.B");
    let b = h.write("p.B", "error broken");

    h.scheduler.mark_all_dirty();
    let outcome = h.build();

    assert!(outcome.interrupted);
    assert!(h.scheduler.interrupt_flag());
    assert_eq!(outcome.failed, [h.file(&b)]);
    assert_eq!(h.toy.take_attempts(), ["p.A", "p.B", "p.A", "p.A"]);
    assert_eq!(
        h.scheduler.diagnostics(h.file(&a))[0].message,
        "cannot find symbol p.B"
    );
    assert_eq!(h.scheduler.diagnostics(h.file(&b))[0].message, "broken");

    let status = h.scheduler.status();
    assert_eq!(
        status.queued,
        [(h.file(&a), EntryState::Retrying), (h.file(&b), EntryState::Failed)]
    );
    assert_eq!(status.last_build.as_ref(), Some(&outcome));

    h.write("p.B", "");
    h.scheduler.mark_dirty(&b);
    let outcome = h.build();
    assert!(outcome.succeeded(), "{outcome:?}");
    assert!(!h.scheduler.interrupt_flag());
    assert_eq!(h.names(&outcome.compiled), ["p.B", "p.A"]);
    assert!(h.scheduler.diagnostics(h.file(&a)).is_empty());
}

#[test]
fn fatal_error_does_not_block_independent_files() {
    let h = Harness::new();
    let x = h.write("p.X", "error oops");
    h.write("p.Y", "method y(): void");
    h.write("p.Z", "field y: p.Y");

    h.scheduler.mark_all_dirty();
    let outcome = h.build();

    assert!(!outcome.interrupted);
    assert!(!outcome.succeeded());
    assert_eq!(h.names(&outcome.compiled), ["p.Y", "p.Z"]);
    assert_eq!(outcome.failed, [h.file(&x)]);
    assert_eq!(h.scheduler.status().queued, [(h.file(&x), EntryState::Failed)]);
    assert_eq!(h.scheduler.diagnostics(h.file(&x))[0].message, "oops");
    assert!(h.scheduler.diagnostics(h.file(&x))[0].is_error());

    let status = serde_json::to_value(h.scheduler.status()).unwrap();
    assert_eq!(status["needs_build"], true);
    assert_eq!(status["queued"][0][1], "Failed");
    assert_eq!(status["last_build"]["interrupted"], false);

    h.write("p.X", "");
    h.scheduler.mark_dirty(&x);
    let outcome = h.build();
    assert_eq!(h.names(&outcome.compiled), ["p.X"]);
    assert!(h.scheduler.diagnostics(h.file(&x)).is_empty());
    assert!(!h.scheduler.needs_build());
}

#[test]
fn cancellation_keeps_pending_work() {
    let token = CancellationToken::new();
    let trigger = Trigger::default();
    let hook = {
        let token = token.clone();
        let trigger = trigger.clone();
        move |request: &kiln_build::CompileRequest<'_>| {
            if request.path.ends_with("B.java") && trigger.fire() {
                token.cancel();
            }
        }
    };
    let h = Harness::with_hook(BuildOptions::default(), hook);
    h.write("p.A", "");
    h.write("p.B", "");
    let c = h.write("p.C", "");

    h.scheduler.mark_all_dirty();
    trigger.arm();
    let outcome = h.scheduler.build(&token).unwrap();

    assert!(outcome.interrupted);
    assert_eq!(h.names(&outcome.compiled), ["p.A", "p.B"]);
    assert_eq!(h.scheduler.queued_files(), [h.file(&c)]);
    assert!(h.scheduler.status().needs_build);

    let outcome = h.build();
    assert!(outcome.succeeded());
    assert_eq!(h.names(&outcome.compiled), ["p.C"]);
}

#[test]
fn edits_during_a_build_are_merged_into_it() {
    let started = Arc::new(Barrier::new(2));
    let resume = Arc::new(Barrier::new(2));
    let trigger = Trigger::default();
    let hook = {
        let (started, resume, trigger) = (started.clone(), resume.clone(), trigger.clone());
        move |request: &kiln_build::CompileRequest<'_>| {
            if request.path.ends_with("A.java") && trigger.fire() {
                started.wait();
                resume.wait();
            }
        }
    };
    let h = Harness::with_hook(BuildOptions::default(), hook);
    let a = h.write("p.A", "");
    let b = h.write("p.B", "");
    h.build_all();

    h.scheduler.mark_dirty(&a);
    trigger.arm();
    let scheduler = Arc::clone(&h.scheduler);
    let build = thread::spawn(move || scheduler.build(&CancellationToken::new()).unwrap());

    started.wait();
    h.scheduler.mark_dirty(&b);
    h.scheduler.mark_dirty(&a);
    resume.wait();
    let outcome = build.join().unwrap();

    assert!(outcome.succeeded());
    assert_eq!(h.names(&outcome.compiled), ["p.A", "p.A", "p.B"]);
    assert!(!h.scheduler.needs_build());
}

#[test]
fn removed_nested_types_lose_their_artifacts() {
    let h = Harness::new();
    let a = h.write("p.A", "inner In\ninner Other");
    h.build_all();
    assert!(h.artifact("p/A$Other").is_file());

    h.write("p.A", "inner In");
    h.scheduler.mark_dirty(&a);
    h.build();

    assert!(h.artifact("p/A").is_file());
    assert!(h.artifact("p/A$In").is_file());
    assert!(!h.artifact("p/A$Other").exists());
}

#[test]
fn dependency_projects_are_on_the_classpath() {
    let h = Harness::with_projects(
        &[("lib", None), ("app", Some("lib"))],
        BuildOptions::default(),
        |_| {},
    );
    let l = h.write_in("lib", "p.L", "method l(): void");
    let a = h.write("q.A", "field l: p.L");

    h.scheduler.mark_all_dirty();
    let outcome = h.build();

    assert!(outcome.succeeded(), "{outcome:?}");
    assert!(h.artifact_in("lib", "p/L").is_file());
    assert!(h.artifact("q/A").is_file());
    assert_eq!(h.dependencies(&a), ["p.L"]);
    assert_eq!(h.dependents(&l), ["q.A"]);
}

#[test]
fn duplicate_types_link_to_the_visible_project() {
    let h = Harness::with_projects(
        &[("other", None), ("lib", None), ("app", Some("lib"))],
        BuildOptions::default(),
        |_| {},
    );
    let hidden = h.write_in("other", "p.L", "method hidden(): void");
    let visible = h.write_in("lib", "p.L", "method l(): void");
    let a = h.write("q.A", "field l: p.L");

    h.scheduler.mark_all_dirty();
    let outcome = h.build();

    assert!(outcome.succeeded(), "{outcome:?}");
    let deps = h.scheduler.dependency_cache();
    assert_eq!(deps.dependencies(h.file(&a)), [h.file(&visible)]);
    assert!(deps.dependents(h.file(&hidden)).is_empty());
}

#[test]
fn files_outside_every_project_are_dropped() {
    let h = Harness::new();
    let stray = h.dir.path().join("Stray.java");
    std::fs::write(&stray, "").unwrap();

    h.scheduler.mark_dirty(&stray);
    let outcome = h.build();

    assert!(outcome.compiled.is_empty());
    assert!(!h.scheduler.needs_build());
}
