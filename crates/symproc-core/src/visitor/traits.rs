//! The [`Visitor`] trait and its traversal policies.

use crate::node::NodeId;
use crate::session::Session;

use super::dispatch::*;

/// How the default `visit_*` bodies behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VisitPolicy {
    /// Every method forwards straight to [`Visitor::default_handler`].
    Empty,
    /// Each variant first visits the capabilities it has (a class is visited
    /// as a declaration and as a declaration container, a declaration as
    /// annotated and as a modifier-list owner), then the default handler.
    #[default]
    Default,
    /// Like `Default`, but first recurses into every structural child.
    TopDown,
}

/// Visitor over symbol nodes.
///
/// `D` is the per-call data threaded through the traversal, `R` the result.
/// Implementors pick a [`VisitPolicy`] and override the methods they care
/// about. An override that wants to keep the policy's behavior calls the
/// matching `walk_*` function, which is what the default body does.
///
/// ```
/// use symproc_core::visitor::{accept, walk_class, VisitPolicy, Visitor};
/// use symproc_core::{NodeId, Session};
///
/// struct ClassNames(Vec<String>);
///
/// impl Visitor<(), ()> for ClassNames {
///     const POLICY: VisitPolicy = VisitPolicy::TopDown;
///
///     fn default_handler(&mut self, _: &Session, _: NodeId, _: &()) {}
///
///     fn visit_class(&mut self, s: &Session, node: NodeId, data: &()) {
///         self.0.extend(s.simple_name(node));
///         walk_class(self, s, node, data)
///     }
/// }
/// ```
pub trait Visitor<D: ?Sized, R> {
    const POLICY: VisitPolicy = VisitPolicy::Default;

    /// Result for nodes no override handles.
    fn default_handler(&mut self, s: &Session, node: NodeId, data: &D) -> R;

    // ------------------------------------------------------------------------
    // Capabilities
    // ------------------------------------------------------------------------

    fn visit_node(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_node(self, s, node, data)
    }

    fn visit_annotated(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_annotated(self, s, node, data)
    }

    fn visit_modifier_list_owner(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_modifier_list_owner(self, s, node, data)
    }

    fn visit_declaration(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_declaration(self, s, node, data)
    }

    fn visit_declaration_container(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_declaration_container(self, s, node, data)
    }

    fn visit_reference_element(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_reference_element(self, s, node, data)
    }

    // ------------------------------------------------------------------------
    // Variants
    // ------------------------------------------------------------------------

    fn visit_file(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_file(self, s, node, data)
    }

    fn visit_class(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_class(self, s, node, data)
    }

    fn visit_function(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_function(self, s, node, data)
    }

    fn visit_property(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_property(self, s, node, data)
    }

    fn visit_type_alias(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_type_alias(self, s, node, data)
    }

    fn visit_type_parameter(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_type_parameter(self, s, node, data)
    }

    fn visit_type_reference(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_type_reference(self, s, node, data)
    }

    fn visit_classifier_reference(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_classifier_reference(self, s, node, data)
    }

    fn visit_callable_reference(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_callable_reference(self, s, node, data)
    }

    fn visit_dynamic_reference(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_dynamic_reference(self, s, node, data)
    }

    fn visit_parenthesized_reference(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_parenthesized_reference(self, s, node, data)
    }

    fn visit_annotation(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_annotation(self, s, node, data)
    }

    fn visit_value_argument(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_value_argument(self, s, node, data)
    }

    fn visit_value_parameter(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_value_parameter(self, s, node, data)
    }

    fn visit_type_argument(&mut self, s: &Session, node: NodeId, data: &D) -> R {
        walk_type_argument(self, s, node, data)
    }
}
