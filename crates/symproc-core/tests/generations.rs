//! Behavior of a session across cache generations.
//!
//! A class whose supertype is missing is invalid in the first generation.
//! Once a file defining the supertype joins the inputs, the next generation
//! re-materializes the class from the same raw fact and it validates.

use std::rc::Rc;

use symproc_core::index::SymbolIndex;
use symproc_core::lookup::SharedTracker;
use symproc_core::raw::{RawDecl, RawFile, RawTypeRef};
use symproc_core::visitor::validate;
use symproc_core::{NodeKind, Session};

fn foo_file() -> Rc<RawFile> {
    RawFile::new("src/Foo.kt", "p")
        .with_declaration(
            RawDecl::class("Foo")
                .with_super_type(RawTypeRef::named("Bar"))
                .with_member(RawDecl::property("count", RawTypeRef::named("Foo"))),
        )
        .build()
}

fn bar_file() -> Rc<RawFile> {
    RawFile::new("src/Bar.kt", "p")
        .with_declaration(RawDecl::class("Bar"))
        .build()
}

#[test]
fn missing_supertype_resolves_in_next_generation() {
    let foo_raw = foo_file();
    let session = Session::new(SymbolIndex::build([Rc::clone(&foo_raw)], Vec::new()));

    let foo = session.class_by_name("p.Foo").unwrap();
    let supers = session.super_types(foo);
    assert_eq!(supers.len(), 1);
    assert!(session.resolve(supers[0]).is_error());
    assert!(!validate(&session, foo));

    session.begin_generation(SymbolIndex::build([Rc::clone(&foo_raw), bar_file()], Vec::new()));

    let foo_again = session.class_by_name("p.Foo").unwrap();
    assert_ne!(foo, foo_again);
    assert!(session.try_node(foo).is_none());

    let resolved = session.resolve(session.super_types(foo_again)[0]);
    let ty = session.type_info(resolved).unwrap();
    assert_eq!(session.qualified_name(ty.declaration).as_deref(), Some("p.Bar"));
    assert!(validate(&session, foo_again));
}

#[test]
fn identity_holds_within_a_generation_only() {
    let foo_raw = foo_file();
    let session = Session::new(SymbolIndex::build([Rc::clone(&foo_raw)], Vec::new()));

    let first = session.materialize(Rc::clone(&foo_raw));
    let second = session.materialize(Rc::clone(&foo_raw));
    assert_eq!(first, second);
    assert_eq!(session.kind(first), NodeKind::File);

    session.clear();
    let third = session.materialize(Rc::clone(&foo_raw));
    assert_ne!(first, third);
    assert_eq!(session.materialize(foo_raw), third);
}

#[test]
fn unresolved_lookup_is_tracked_against_the_file() {
    let session = Session::new(SymbolIndex::build([foo_file()], Vec::new()));
    let tracker = SharedTracker::new();
    session.set_tracker(Box::new(tracker.clone()));

    let foo = session.class_by_name("p.Foo").unwrap();
    session.resolve(session.super_types(foo)[0]);

    let files = tracker.buffer().files_for("Bar", "p").cloned().unwrap();
    assert!(files.contains("src/Foo.kt"));
}
