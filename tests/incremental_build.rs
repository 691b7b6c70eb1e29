//! Integration tests for incremental builds: each test runs the driver more
//! than once over the same caches directory.

mod support;

use std::rc::Rc;

use tempfile::TempDir;

use symproc::inputs::InputSet;
use symproc::lookup::LookupStorage;
use symproc::raw::RawFile;
use symproc::visitor::validate;
use symproc::{Dependencies, ProcessingConfig, ProcessingUnit, RoundDriver};

use support::{
    class_file, class_file_in, classes_in, events, generated_class, paths, recorded, Events,
};

fn config(dir: &TempDir) -> ProcessingConfig {
    ProcessingConfig::new("app")
        .with_caches_dir(dir.path().join("caches"))
        .with_incremental(true)
}

const BASE_DIR: &str = "/work/app";

fn sources() -> Vec<Rc<RawFile>> {
    vec![
        class_file("A", &[]),
        class_file("B", &["A"]),
        class_file("C", &[]),
    ]
}

/// The same module as [`sources`], with absolute paths under [`BASE_DIR`].
fn absolute_sources() -> Vec<Rc<RawFile>> {
    let dir = format!("{BASE_DIR}/src");
    vec![
        class_file_in(&dir, "A", &[]),
        class_file_in(&dir, "B", &["A"]),
        class_file_in(&dir, "C", &[]),
    ]
}

/// Validates the classes of every new file, which records their lookups,
/// and logs the new files of each round.
fn checker(seen: &Events) -> Box<dyn ProcessingUnit> {
    let seen = Rc::clone(seen);
    support::unit("check", &events(), move |env, new_files, _| {
        seen.borrow_mut().push(paths(env, new_files).join(","));
        let s = env.session();
        for class in classes_in(env, new_files) {
            validate(s, class);
        }
        Vec::new()
    })
}

/// Like [`checker`], and also emits one aggregating index in the first round.
fn indexer(seen: &Events) -> Box<dyn ProcessingUnit> {
    let seen = Rc::clone(seen);
    support::unit("index", &events(), move |env, new_files, _| {
        seen.borrow_mut().push(paths(env, new_files).join(","));
        if env.round() == 1 && !new_files.is_empty() {
            env.emit_file(generated_class("Index"), Dependencies::aggregating(new_files.to_vec()));
        }
        Vec::new()
    })
}

fn build(config: ProcessingConfig, unit: Box<dyn ProcessingUnit>, files: Vec<Rc<RawFile>>) -> u32 {
    let outcome = RoundDriver::new(config, vec![unit], InputSet::new().with_files(files))
        .run()
        .unwrap();
    assert!(outcome.is_ok());
    outcome.rounds
}

#[test]
fn test_first_build_processes_everything() {
    let dir = TempDir::new().unwrap();
    let seen = events();

    build(config(&dir), checker(&seen), sources());

    assert_eq!(recorded(&seen), vec!["src/A.kt,src/B.kt,src/C.kt"]);
    assert!(dir.path().join("caches/caches.uptodate").exists());
    assert!(dir.path().join("caches/symbols.json").exists());
}

#[test]
fn test_unchanged_build_processes_nothing() {
    let dir = TempDir::new().unwrap();
    build(config(&dir), checker(&events()), sources());

    let seen = events();
    let rounds = build(config(&dir), checker(&seen), sources());

    assert_eq!(rounds, 1);
    assert_eq!(recorded(&seen), vec![""]);
}

#[test]
fn test_modified_file_reprocesses_its_users() {
    let dir = TempDir::new().unwrap();
    build(config(&dir), checker(&events()), sources());

    let seen = events();
    build(
        config(&dir).with_modified_sources(["src/A.kt"]),
        checker(&seen),
        sources(),
    );

    assert_eq!(recorded(&seen), vec!["src/A.kt,src/B.kt"]);
}

#[test]
fn test_modified_leaf_is_reprocessed_alone() {
    let dir = TempDir::new().unwrap();
    build(config(&dir), checker(&events()), sources());

    let seen = events();
    build(
        config(&dir).with_modified_sources(["src/C.kt"]),
        checker(&seen),
        sources(),
    );

    assert_eq!(recorded(&seen), vec!["src/C.kt"]);
}

#[test]
fn test_aggregating_output_reprocesses_all_its_sources() {
    let dir = TempDir::new().unwrap();
    let first = events();
    let rounds = build(config(&dir), indexer(&first), sources());
    assert_eq!(rounds, 2);
    assert_eq!(recorded(&first), vec!["src/A.kt,src/B.kt,src/C.kt", "gen/Index.kt"]);

    let seen = events();
    build(
        config(&dir).with_modified_sources(["src/C.kt"]),
        indexer(&seen),
        sources(),
    );

    assert_eq!(recorded(&seen), vec!["src/A.kt,src/B.kt,src/C.kt", "gen/Index.kt"]);
}

#[test]
fn test_unreported_new_file_is_processed() {
    let dir = TempDir::new().unwrap();
    build(config(&dir), checker(&events()), sources());

    let seen = events();
    let mut files = sources();
    files.push(class_file("D", &[]));
    build(config(&dir), checker(&seen), files);

    assert_eq!(recorded(&seen), vec!["src/D.kt"]);
}

#[test]
fn test_removed_file_drops_its_lookups() {
    let dir = TempDir::new().unwrap();
    build(config(&dir), checker(&events()), sources());
    {
        let lookups = LookupStorage::open(dir.path().join("caches/symbolLookups")).unwrap();
        assert!(lookups.get("A", "p").contains("src/B.kt"));
    }

    let seen = events();
    build(
        config(&dir).with_removed_sources(["src/B.kt"]),
        checker(&seen),
        vec![class_file("A", &[]), class_file("C", &[])],
    );

    assert_eq!(recorded(&seen), vec![""]);
    let lookups = LookupStorage::open(dir.path().join("caches/symbolLookups")).unwrap();
    assert!(!lookups.get("A", "p").contains("src/B.kt"));
}

#[test]
fn test_non_incremental_build_leaves_no_caches() {
    let dir = TempDir::new().unwrap();
    let seen = events();

    build(config(&dir).with_incremental(false), checker(&seen), sources());

    assert_eq!(recorded(&seen), vec!["src/A.kt,src/B.kt,src/C.kt"]);
    assert!(!dir.path().join("caches").exists());
}

#[test]
fn test_absolute_inputs_are_keyed_relative_to_base_dir() {
    let dir = TempDir::new().unwrap();
    let config = |dir: &TempDir| config(dir).with_project_base_dir(BASE_DIR);
    build(config(&dir), checker(&events()), absolute_sources());
    {
        let lookups = LookupStorage::open(dir.path().join("caches/symbolLookups")).unwrap();
        let users: Vec<String> = lookups.get("A", "p").into_iter().collect();
        assert_eq!(users, vec!["src/B.kt"]);
    }

    let seen = events();
    build(
        config(&dir).with_modified_sources(["/work/app/src/A.kt"]),
        checker(&seen),
        absolute_sources(),
    );
    assert_eq!(recorded(&seen), vec!["/work/app/src/A.kt,/work/app/src/B.kt"]);

    let seen = events();
    build(
        config(&dir).with_modified_sources(["src/C.kt"]),
        checker(&seen),
        absolute_sources(),
    );
    assert_eq!(recorded(&seen), vec!["/work/app/src/C.kt"]);
}

#[test]
fn test_removed_absolute_input_is_dropped() {
    let dir = TempDir::new().unwrap();
    let config = |dir: &TempDir| config(dir).with_project_base_dir(BASE_DIR);
    build(config(&dir), checker(&events()), absolute_sources());

    let seen = events();
    build(
        config(&dir).with_removed_sources(["src/B.kt"]),
        checker(&seen),
        absolute_sources(),
    );

    assert_eq!(recorded(&seen), vec![""]);
    let lookups = LookupStorage::open(dir.path().join("caches/symbolLookups")).unwrap();
    assert!(lookups.get("A", "p").is_empty());
}
