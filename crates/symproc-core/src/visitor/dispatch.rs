//! Central dispatch and the default traversal of every node kind.
//!
//! [`accept`] is the only place that maps a node kind to a `visit_*` method.
//! Each `walk_*` function is the default body of the matching method; an
//! override calls it to keep the policy's behavior ("super").

use crate::node::{NodeId, NodeKind};
use crate::session::Session;

use super::traits::{VisitPolicy, Visitor};

/// Dispatch `node` to the visitor method for its kind.
pub fn accept<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    match s.kind(node) {
        NodeKind::File => v.visit_file(s, node, data),
        NodeKind::Class => v.visit_class(s, node, data),
        NodeKind::Function => v.visit_function(s, node, data),
        NodeKind::Property => v.visit_property(s, node, data),
        NodeKind::TypeAlias => v.visit_type_alias(s, node, data),
        NodeKind::TypeParameter => v.visit_type_parameter(s, node, data),
        NodeKind::TypeReference => v.visit_type_reference(s, node, data),
        NodeKind::ClassifierReference => v.visit_classifier_reference(s, node, data),
        NodeKind::CallableReference => v.visit_callable_reference(s, node, data),
        NodeKind::DynamicReference => v.visit_dynamic_reference(s, node, data),
        NodeKind::ParenthesizedReference => v.visit_parenthesized_reference(s, node, data),
        NodeKind::Annotation => v.visit_annotation(s, node, data),
        NodeKind::ValueArgument => v.visit_value_argument(s, node, data),
        NodeKind::ValueParameter => v.visit_value_parameter(s, node, data),
        NodeKind::TypeArgument => v.visit_type_argument(s, node, data),
    }
}

fn accept_all<V, D, R>(v: &mut V, s: &Session, nodes: impl IntoIterator<Item = NodeId>, data: &D)
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    for node in nodes {
        accept::<V, D, R>(v, s, node, data);
    }
}

fn top_down<V: Visitor<D, R> + ?Sized, D: ?Sized, R>() -> bool {
    V::POLICY == VisitPolicy::TopDown
}

// ============================================================================
// Capabilities
// ============================================================================

pub fn walk_node<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    v.default_handler(s, node, data)
}

pub fn walk_annotated<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    if top_down::<V, D, R>() {
        accept_all::<V, D, R>(v, s, s.annotations(node), data);
    }
    v.visit_node(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_modifier_list_owner<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    v.visit_node(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_declaration<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    if top_down::<V, D, R>() {
        accept_all::<V, D, R>(v, s, s.type_parameters(node), data);
    }
    v.visit_annotated(s, node, data);
    v.visit_modifier_list_owner(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_declaration_container<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    if top_down::<V, D, R>() {
        accept_all::<V, D, R>(v, s, s.declarations(node), data);
    }
    v.visit_node(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_reference_element<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    if top_down::<V, D, R>() {
        accept_all::<V, D, R>(v, s, s.type_arguments(node), data);
    }
    v.visit_node(s, node, data);
    v.default_handler(s, node, data)
}

// ============================================================================
// Variants
// ============================================================================

pub fn walk_file<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    v.visit_annotated(s, node, data);
    v.visit_declaration_container(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_class<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    if top_down::<V, D, R>() {
        accept_all::<V, D, R>(v, s, s.super_types(node), data);
    }
    v.visit_declaration(s, node, data);
    v.visit_declaration_container(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_function<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    if top_down::<V, D, R>() {
        accept_all::<V, D, R>(v, s, s.extension_receiver(node), data);
        accept_all::<V, D, R>(v, s, s.parameters(node), data);
        accept_all::<V, D, R>(v, s, s.return_type(node), data);
    }
    v.visit_declaration(s, node, data);
    v.visit_declaration_container(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_property<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    if top_down::<V, D, R>() {
        accept_all::<V, D, R>(v, s, s.property_type(node), data);
        accept_all::<V, D, R>(v, s, s.extension_receiver(node), data);
    }
    v.visit_declaration(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_type_alias<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    if top_down::<V, D, R>() {
        accept_all::<V, D, R>(v, s, s.alias_target(node), data);
    }
    v.visit_declaration(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_type_parameter<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    if top_down::<V, D, R>() {
        accept_all::<V, D, R>(v, s, s.bounds(node), data);
    }
    v.visit_declaration(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_type_reference<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    if top_down::<V, D, R>() {
        accept_all::<V, D, R>(v, s, s.element(node), data);
    }
    v.visit_annotated(s, node, data);
    v.visit_modifier_list_owner(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_classifier_reference<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    if top_down::<V, D, R>() {
        accept_all::<V, D, R>(v, s, s.qualifier(node), data);
    }
    v.visit_reference_element(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_callable_reference<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    if top_down::<V, D, R>() {
        accept_all::<V, D, R>(v, s, s.parameters(node), data);
        accept_all::<V, D, R>(v, s, s.extension_receiver(node), data);
        accept_all::<V, D, R>(v, s, s.return_type(node), data);
    }
    v.visit_reference_element(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_dynamic_reference<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    v.visit_reference_element(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_parenthesized_reference<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    if top_down::<V, D, R>() {
        accept_all::<V, D, R>(v, s, s.inner_type(node), data);
    }
    v.visit_reference_element(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_annotation<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    if top_down::<V, D, R>() {
        accept_all::<V, D, R>(v, s, s.annotation_type(node), data);
        accept_all::<V, D, R>(v, s, s.arguments(node), data);
    }
    v.visit_node(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_value_argument<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    v.visit_annotated(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_value_parameter<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    if top_down::<V, D, R>() {
        accept_all::<V, D, R>(v, s, s.parameter_type(node), data);
    }
    v.visit_annotated(s, node, data);
    v.default_handler(s, node, data)
}

pub fn walk_type_argument<V, D, R>(v: &mut V, s: &Session, node: NodeId, data: &D) -> R
where
    V: Visitor<D, R> + ?Sized,
    D: ?Sized,
{
    if V::POLICY == VisitPolicy::Empty {
        return v.default_handler(s, node, data);
    }
    if top_down::<V, D, R>() {
        accept_all::<V, D, R>(v, s, s.type_argument_reference(node), data);
    }
    v.visit_annotated(s, node, data);
    v.default_handler(s, node, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SymbolIndex;
    use crate::raw::{RawAnnotation, RawDecl, RawFile, RawParam, RawTypeParam, RawTypeRef};
    use std::collections::HashMap;

    fn sample_session() -> Session {
        let file = RawFile::new("src/p/Foo.kt", "p")
            .with_declaration(
                RawDecl::class("Foo")
                    .with_annotation(RawAnnotation::new("Marker"))
                    .with_type_parameter(
                        RawTypeParam::new("T").with_bound(RawTypeRef::named("Base")),
                    )
                    .with_super_type(RawTypeRef::named("Base"))
                    .with_member(RawDecl::property("p", RawTypeRef::named("T")))
                    .with_member(
                        RawDecl::function("f")
                            .with_parameter(RawParam::new("x", RawTypeRef::named("Foo")))
                            .with_return_type(RawTypeRef::named("Base")),
                    ),
            )
            .with_declaration(RawDecl::class("Base"))
            .with_declaration(RawDecl::class("Marker"))
            .build();
        Session::new(SymbolIndex::build([file], Vec::new()))
    }

    /// Counts default-handler calls per kind.
    struct Counter<const P: u8> {
        seen: HashMap<NodeKind, usize>,
    }

    impl<const P: u8> Visitor<(), ()> for Counter<P> {
        const POLICY: VisitPolicy = match P {
            0 => VisitPolicy::Empty,
            1 => VisitPolicy::Default,
            _ => VisitPolicy::TopDown,
        };

        fn default_handler(&mut self, s: &Session, node: NodeId, _: &()) {
            *self.seen.entry(s.kind(node)).or_default() += 1;
        }
    }

    /// Records the kind of every node entered through `accept`.
    struct Entered {
        kinds: Vec<NodeKind>,
    }

    impl Visitor<(), ()> for Entered {
        const POLICY: VisitPolicy = VisitPolicy::TopDown;

        fn default_handler(&mut self, _: &Session, _: NodeId, _: &()) {}

        fn visit_class(&mut self, s: &Session, node: NodeId, data: &()) {
            self.kinds.push(NodeKind::Class);
            walk_class(self, s, node, data)
        }

        fn visit_annotation(&mut self, s: &Session, node: NodeId, data: &()) {
            self.kinds.push(NodeKind::Annotation);
            walk_annotation(self, s, node, data)
        }

        fn visit_type_parameter(&mut self, s: &Session, node: NodeId, data: &()) {
            self.kinds.push(NodeKind::TypeParameter);
            walk_type_parameter(self, s, node, data)
        }

        fn visit_property(&mut self, s: &Session, node: NodeId, data: &()) {
            self.kinds.push(NodeKind::Property);
            walk_property(self, s, node, data)
        }

        fn visit_function(&mut self, s: &Session, node: NodeId, data: &()) {
            self.kinds.push(NodeKind::Function);
            walk_function(self, s, node, data)
        }

        fn visit_type_reference(&mut self, s: &Session, node: NodeId, data: &()) {
            self.kinds.push(NodeKind::TypeReference);
            walk_type_reference(self, s, node, data)
        }
    }

    mod policy_tests {
        use super::*;

        #[test]
        fn empty_policy_calls_handler_once() {
            let s = sample_session();
            let foo = s.class_by_name("p.Foo").unwrap();
            let mut v = Counter::<0> { seen: HashMap::new() };
            accept(&mut v, &s, foo, &());
            assert_eq!(v.seen.get(&NodeKind::Class), Some(&1));
            assert_eq!(v.seen.len(), 1);
        }

        #[test]
        fn default_policy_visits_capabilities_without_recursing() {
            let s = sample_session();
            let foo = s.class_by_name("p.Foo").unwrap();
            let mut v = Counter::<1> { seen: HashMap::new() };
            accept(&mut v, &s, foo, &());
            // annotated, modifier owner and container each add their own call
            // plus one through visit_node; declaration and the class body one
            // each
            assert_eq!(v.seen.get(&NodeKind::Class), Some(&8));
            assert_eq!(v.seen.len(), 1);
        }

        #[test]
        fn top_down_policy_reaches_children() {
            let s = sample_session();
            let foo = s.class_by_name("p.Foo").unwrap();
            let mut v = Counter::<2> { seen: HashMap::new() };
            accept(&mut v, &s, foo, &());
            assert!(v.seen.contains_key(&NodeKind::Annotation));
            assert!(v.seen.contains_key(&NodeKind::ValueParameter));
            assert!(v.seen.contains_key(&NodeKind::ClassifierReference));
        }
    }

    mod top_down_tests {
        use super::*;

        #[test]
        fn structural_children_visited_once() {
            let s = sample_session();
            let foo = s.class_by_name("p.Foo").unwrap();
            let mut v = Entered { kinds: Vec::new() };
            accept(&mut v, &s, foo, &());

            let count = |kind: NodeKind| v.kinds.iter().filter(|&&k| k == kind).count();
            assert_eq!(count(NodeKind::Class), 1);
            assert_eq!(count(NodeKind::Annotation), 1);
            assert_eq!(count(NodeKind::TypeParameter), 1);
            assert_eq!(count(NodeKind::Property), 1);
            assert_eq!(count(NodeKind::Function), 1);
            // super type, bound, annotation type, property type, parameter
            // type, return type
            assert_eq!(count(NodeKind::TypeReference), 6);
        }
    }
}
