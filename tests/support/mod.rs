//! Shared fixtures for driver integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use symproc::raw::{RawDecl, RawFile, RawTypeRef};
use symproc::{NodeId, NodeKind, ProcessingUnit, RoundEnv};

/// Ordered record of unit callbacks, shared between a test and its units.
pub type Events = Rc<RefCell<Vec<String>>>;

pub fn events() -> Events {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn recorded(events: &Events) -> Vec<String> {
    events.borrow().clone()
}

/// A unit whose `process` is a closure. Callbacks are logged as
/// `"<name>: process <round>"`, `"<name>: finish"` and `"<name>: on_error"`.
pub struct ScriptedUnit<F> {
    name: String,
    events: Events,
    step: F,
}

impl<F> ProcessingUnit for ScriptedUnit<F>
where
    F: FnMut(&RoundEnv<'_>, &[NodeId], &[NodeId]) -> Vec<NodeId>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(
        &mut self,
        env: &RoundEnv<'_>,
        new_files: &[NodeId],
        deferred: &[NodeId],
    ) -> Vec<NodeId> {
        self.events
            .borrow_mut()
            .push(format!("{}: process {}", self.name, env.round()));
        (self.step)(env, new_files, deferred)
    }

    fn on_error(&mut self, _env: &RoundEnv<'_>) {
        self.events.borrow_mut().push(format!("{}: on_error", self.name));
    }

    fn finish(&mut self, _env: &RoundEnv<'_>) {
        self.events.borrow_mut().push(format!("{}: finish", self.name));
    }
}

pub fn unit<F>(name: &str, events: &Events, step: F) -> Box<dyn ProcessingUnit>
where
    F: FnMut(&RoundEnv<'_>, &[NodeId], &[NodeId]) -> Vec<NodeId> + 'static,
{
    Box::new(ScriptedUnit {
        name: name.to_string(),
        events: Rc::clone(events),
        step,
    })
}

/// Top-level classes declared in `files`.
pub fn classes_in(env: &RoundEnv<'_>, files: &[NodeId]) -> Vec<NodeId> {
    let s = env.session();
    files
        .iter()
        .flat_map(|&file| s.declarations(file))
        .filter(|&decl| s.kind(decl) == NodeKind::Class)
        .collect()
}

/// Paths of file nodes.
pub fn paths(env: &RoundEnv<'_>, files: &[NodeId]) -> Vec<String> {
    files
        .iter()
        .filter_map(|&file| env.session().file_path(file))
        .collect()
}

/// `src/<name>.kt` in package `p` declaring class `name` with one property
/// per entry of `uses`, typed by that name.
pub fn class_file(name: &str, uses: &[&str]) -> Rc<RawFile> {
    class_file_in("src", name, uses)
}

/// Like [`class_file`], placed in `dir`.
pub fn class_file_in(dir: &str, name: &str, uses: &[&str]) -> Rc<RawFile> {
    let mut class = RawDecl::class(name);
    for (i, used) in uses.iter().enumerate() {
        class = class.with_member(RawDecl::property(format!("f{i}"), RawTypeRef::named(*used)));
    }
    RawFile::new(format!("{dir}/{name}.kt"), "p")
        .with_declaration(class)
        .build()
}

/// Generated file declaring class `name` in package `p`.
pub fn generated_class(name: &str) -> Rc<RawFile> {
    RawFile::new(format!("gen/{name}.kt"), "p")
        .with_declaration(RawDecl::class(name))
        .build()
}
