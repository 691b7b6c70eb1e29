//! Checking that the types reachable from a node are resolved.
//!
//! A type is valid when it is not the error type and the reference of every
//! type argument is itself valid. Validation short-circuits on the first
//! invalid type. A predicate `(parent, child)` decides which children are
//! checked at all; a skipped child never makes its parent invalid.

use crate::node::NodeId;
use crate::session::Session;
use crate::types::TypeId;

use super::dispatch::accept;
use super::traits::{VisitPolicy, Visitor};

/// Decides whether `child` of `parent` takes part in validation.
pub type ValidatePredicate<'p> = dyn Fn(&Session, NodeId, NodeId) -> bool + 'p;

/// Visitor answering "are all types in this subtree resolved?".
pub struct ValidateVisitor<'p> {
    predicate: Box<ValidatePredicate<'p>>,
}

impl<'p> ValidateVisitor<'p> {
    /// Validate every child.
    pub fn new() -> Self {
        Self::with_predicate(|_, _, _| true)
    }

    /// Validate only the children `predicate` accepts.
    pub fn with_predicate(predicate: impl Fn(&Session, NodeId, NodeId) -> bool + 'p) -> Self {
        ValidateVisitor {
            predicate: Box::new(predicate),
        }
    }

    fn wanted(&self, s: &Session, parent: NodeId, child: NodeId) -> bool {
        (self.predicate)(s, parent, child)
    }

    /// True if every accepted child of `parent` is valid.
    fn children_valid(&mut self, s: &Session, parent: NodeId, children: Vec<NodeId>) -> bool {
        children
            .into_iter()
            .all(|child| !self.wanted(s, parent, child) || accept(self, s, child, &()))
    }

    /// Validity of a resolved type.
    pub fn type_is_valid(&mut self, s: &Session, ty: TypeId) -> bool {
        let Some(info) = s.type_info(ty) else {
            return false;
        };
        info.arguments.into_iter().all(|arg| match s.type_argument_reference(arg) {
            Some(reference) => accept(self, s, reference, &()),
            None => true,
        })
    }
}

impl Default for ValidateVisitor<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Visitor<(), bool> for ValidateVisitor<'_> {
    const POLICY: VisitPolicy = VisitPolicy::Empty;

    fn default_handler(&mut self, _: &Session, _: NodeId, _: &()) -> bool {
        true
    }

    fn visit_type_reference(&mut self, s: &Session, node: NodeId, _: &()) -> bool {
        let ty = s.resolve(node);
        self.type_is_valid(s, ty)
    }

    fn visit_file(&mut self, s: &Session, node: NodeId, _: &()) -> bool {
        self.children_valid(s, node, s.declarations(node))
    }

    fn visit_class(&mut self, s: &Session, node: NodeId, _: &()) -> bool {
        self.children_valid(s, node, s.type_parameters(node))
            && self.children_valid(s, node, s.super_types(node))
            && self.children_valid(s, node, s.declarations(node))
    }

    fn visit_function(&mut self, s: &Session, node: NodeId, _: &()) -> bool {
        self.children_valid(s, node, s.return_type(node).into_iter().collect())
            && self.children_valid(s, node, s.parameters(node))
            && self.children_valid(s, node, s.type_parameters(node))
            && self.children_valid(s, node, s.declarations(node))
    }

    fn visit_property(&mut self, s: &Session, node: NodeId, _: &()) -> bool {
        self.children_valid(s, node, s.property_type(node).into_iter().collect())
            && self.children_valid(s, node, s.type_parameters(node))
    }

    fn visit_type_parameter(&mut self, s: &Session, node: NodeId, _: &()) -> bool {
        self.children_valid(s, node, s.bounds(node))
    }

    fn visit_value_parameter(&mut self, s: &Session, node: NodeId, _: &()) -> bool {
        match s.parameter_type(node) {
            Some(ty) => accept(self, s, ty, &()),
            None => true,
        }
    }
}

/// True if every type reachable from `node` is resolved.
pub fn validate(s: &Session, node: NodeId) -> bool {
    accept(&mut ValidateVisitor::new(), s, node, &())
}

/// Like [`validate`], restricted to the children `predicate` accepts.
pub fn validate_with(
    s: &Session,
    node: NodeId,
    predicate: impl Fn(&Session, NodeId, NodeId) -> bool,
) -> bool {
    accept(&mut ValidateVisitor::with_predicate(predicate), s, node, &())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SymbolIndex;
    use crate::node::NodeKind;
    use crate::raw::{RawDecl, RawFile, RawTypeArg, RawTypeParam, RawTypeRef};
    use std::rc::Rc;

    fn session(file: Rc<RawFile>) -> Session {
        Session::new(SymbolIndex::build([file], Vec::new()))
    }

    fn skip_functions(s: &Session, _: NodeId, child: NodeId) -> bool {
        s.kind(child) != NodeKind::Function
    }

    #[test]
    fn invalid_function_skipped_by_predicate() {
        let file = RawFile::new("src/Foo.kt", "p")
            .with_declaration(
                RawDecl::class("Foo")
                    .with_member(RawDecl::property("ok", RawTypeRef::named("Foo")))
                    .with_member(
                        RawDecl::function("bar").with_return_type(RawTypeRef::named("Nope")),
                    ),
            )
            .build();
        let s = session(file);
        let foo = s.class_by_name("p.Foo").unwrap();
        assert!(validate_with(&s, foo, skip_functions));
        assert!(!validate(&s, foo));
    }

    #[test]
    fn nested_error_in_type_arguments() {
        let inner = RawTypeRef::named("Box").with_type_argument(RawTypeRef::named("Nope"));
        let deep = RawTypeRef::named("Box").with_type_argument(inner);
        let file = RawFile::new("src/Box.kt", "p")
            .with_declaration(
                RawDecl::class("Box")
                    .with_type_parameter(RawTypeParam::new("T"))
                    .with_member(RawDecl::property("inner", deep)),
            )
            .build();
        let s = session(file);
        let boxed = s.class_by_name("p.Box").unwrap();
        let prop = s.declarations(boxed)[0];
        let ty = s.resolve(s.property_type(prop).unwrap());
        assert!(!ty.is_error());
        assert!(!ValidateVisitor::new().type_is_valid(&s, ty));
        assert!(!validate(&s, boxed));
    }

    #[test]
    fn bounds_and_star_projections() {
        let file = RawFile::new("src/G.kt", "p")
            .with_declaration(
                RawDecl::class("G")
                    .with_type_parameter(
                        RawTypeParam::new("T")
                            .with_bound(RawTypeRef::named("G").with_argument(RawTypeArg::star())),
                    ),
            )
            .with_declaration(
                RawDecl::function("h")
                    .with_type_parameter(
                        RawTypeParam::new("U").with_bound(RawTypeRef::named("Missing")),
                    ),
            )
            .build();
        let s = session(file);
        let g = s.class_by_name("p.G").unwrap();
        assert!(validate(&s, g));
        let file_node = s.files()[0];
        assert!(!validate(&s, file_node));
        assert!(validate_with(&s, file_node, skip_functions));
    }

    #[test]
    fn skipped_super_type_keeps_class_valid() {
        let file = RawFile::new("src/S.kt", "p")
            .with_declaration(RawDecl::class("S").with_super_type(RawTypeRef::named("Gone")))
            .build();
        let s = session(file);
        let class = s.class_by_name("p.S").unwrap();
        assert!(!validate(&s, class));
        assert!(validate_with(&s, class, |s, _, child| s.kind(child) != NodeKind::TypeReference));
    }
}
