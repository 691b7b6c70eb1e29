//! The symbol session: node arena, materialization and type resolution.
//!
//! A [`Session`] owns every node and type of one cache generation. Nodes are
//! created on first access and memoized:
//!
//! - raw files and declarations are cached by identity ([`IdKey`]), so the
//!   same fact reached from its container or materialized directly yields
//!   the same [`NodeId`]
//! - everything else (type references, parameters, annotations, ...) is
//!   cached by identity within its parent ([`ContextKey`])
//! - derived child lists and resolved types live in write-once cells on the
//!   node
//!
//! [`Session::clear`] ends the generation: every cache and both arenas are
//! emptied and ids handed out before become stale.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::cache::{CacheRegistry, ObjectCache};
use crate::error::LookupError;
use crate::identity::{ContextKey, IdKey};
use crate::index::{Owner, ResolutionSite, SymbolIndex, TypeResolver};
use crate::lookup::{record_fqn_lookup, LookupTracker, NoopTracker, ScopeKind};
use crate::node::{
    AnnotationNode, CallableNode, ClassifierNode, DeclNode, DynamicNode, FileNode, Node, NodeData,
    NodeId, NodeKind, ParenthesizedNode, TypeArgumentNode, TypeParameterNode, TypeReferenceNode,
    ValueArgumentNode, ValueParameterNode,
};
use crate::raw::{
    ConstValue, Location, Modifier, Origin, RawAnnotation, RawDecl, RawDeclKind, RawElement,
    RawFact, RawFile, RawParam, RawTypeArg, RawTypeParam, RawTypeRef, RawValueArg, Span, Variance,
};
use crate::sequence::MemoizedSequence;
use crate::types::{Nullability, Type, TypeId};

// ============================================================================
// Caches
// ============================================================================

type ChildCache<T> = ObjectCache<ContextKey<NodeId, T>, NodeId>;

/// One cache per materialization factory.
struct Caches {
    files: ObjectCache<IdKey<RawFile>, NodeId>,
    declarations: ObjectCache<IdKey<RawDecl>, NodeId>,
    type_references: ChildCache<RawTypeRef>,
    type_parameters: ChildCache<RawTypeParam>,
    value_parameters: ChildCache<RawParam>,
    annotations: ChildCache<RawAnnotation>,
    value_arguments: ChildCache<RawValueArg>,
    type_arguments: ChildCache<RawTypeArg>,
    synthetic_classes: ObjectCache<String, NodeId>,
}

impl Caches {
    fn register(registry: &CacheRegistry) -> Self {
        Caches {
            files: registry.register("files"),
            declarations: registry.register("declarations"),
            type_references: registry.register("type_references"),
            type_parameters: registry.register("type_parameters"),
            value_parameters: registry.register("value_parameters"),
            annotations: registry.register("annotations"),
            value_arguments: registry.register("value_arguments"),
            type_arguments: registry.register("type_arguments"),
            synthetic_classes: registry.register("synthetic_classes"),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Arena and caches for one module build.
///
/// A session is single-threaded: it is neither `Send` nor `Sync`, and all
/// laziness is plain deferred computation within one call.
pub struct Session {
    registry: CacheRegistry,
    caches: Caches,
    nodes: RefCell<Vec<Rc<Node>>>,
    types: RefCell<Vec<Type>>,
    index: RefCell<Rc<SymbolIndex>>,
    resolver: Option<Rc<dyn TypeResolver>>,
    tracker: RefCell<Box<dyn LookupTracker>>,
    tracking_error: RefCell<Option<LookupError>>,
}

impl Session {
    /// Create a session over `index`, with lookups discarded.
    pub fn new(index: SymbolIndex) -> Self {
        let registry = CacheRegistry::new();
        let caches = Caches::register(&registry);
        Session {
            registry,
            caches,
            nodes: RefCell::new(Vec::new()),
            types: RefCell::new(Vec::new()),
            index: RefCell::new(Rc::new(index)),
            resolver: None,
            tracker: RefCell::new(Box::new(NoopTracker)),
            tracking_error: RefCell::new(None),
        }
    }

    /// Resolve classifier names with `resolver` instead of the index.
    pub fn with_resolver(mut self, resolver: Rc<dyn TypeResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Current cache generation.
    pub fn generation(&self) -> u32 {
        self.registry.generation()
    }

    /// The cache registry.
    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    /// Index of the current generation.
    pub fn index(&self) -> Rc<SymbolIndex> {
        Rc::clone(&self.index.borrow())
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// End the generation: empty every cache and both arenas.
    pub fn clear(&self) {
        let nodes = self.nodes.borrow().len();
        self.registry.clear();
        self.nodes.borrow_mut().clear();
        self.types.borrow_mut().clear();
        debug!(generation = self.generation(), nodes, "session cleared");
    }

    /// Clear and continue with a new index.
    pub fn begin_generation(&self, index: SymbolIndex) {
        self.clear();
        *self.index.borrow_mut() = Rc::new(index);
    }

    /// Install a lookup tracker, returning the previous one.
    pub fn set_tracker(&self, tracker: Box<dyn LookupTracker>) -> Box<dyn LookupTracker> {
        self.tracker.replace(tracker)
    }

    /// First tracker failure since the last call.
    ///
    /// Resolution never fails, so a tracker that rejects a record is parked
    /// here for the driver to pick up.
    pub fn take_tracking_error(&self) -> Option<LookupError> {
        self.tracking_error.borrow_mut().take()
    }

    /// Run `f` against the installed tracker.
    pub fn with_tracker<R>(&self, f: impl FnOnce(&mut dyn LookupTracker) -> R) -> R {
        let mut tracker = self.tracker.borrow_mut();
        f(&mut **tracker)
    }

    /// Record a lookup of `fqn` made on behalf of `file`.
    ///
    /// A tracker failure is parked like one raised during resolution.
    pub fn record_lookup(&self, file: &str, fqn: &str, kind: ScopeKind) {
        let result = self.with_tracker(|tracker| record_fqn_lookup(tracker, file, fqn, kind));
        if let Err(error) = result {
            self.stash_tracking_error(error);
        }
    }

    fn stash_tracking_error(&self, error: LookupError) {
        warn!(error = %error, "lookup tracking failed");
        let mut slot = self.tracking_error.borrow_mut();
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    // ========================================================================
    // Arena
    // ========================================================================

    /// The node behind `id`.
    ///
    /// `id` must belong to the current generation.
    pub fn node(&self, id: NodeId) -> Rc<Node> {
        debug_assert_eq!(
            id.generation(),
            self.generation(),
            "stale node {id} used after cache clear"
        );
        Rc::clone(&self.nodes.borrow()[id.index() as usize])
    }

    /// The node behind `id`, or `None` if `id` is stale.
    pub fn try_node(&self, id: NodeId) -> Option<Rc<Node>> {
        if id.generation() != self.generation() {
            return None;
        }
        self.nodes.borrow().get(id.index() as usize).cloned()
    }

    fn alloc(&self, origin: Origin, parent: Option<NodeId>, data: NodeData) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId::new(nodes.len() as u32, self.generation());
        nodes.push(Rc::new(Node::new(origin, parent, data)));
        id
    }

    fn alloc_type(&self, ty: Type) -> TypeId {
        let mut types = self.types.borrow_mut();
        let id = TypeId::new(types.len() as u32, self.generation());
        types.push(ty);
        id
    }

    // ========================================================================
    // Materialization
    // ========================================================================

    /// Node for a raw file or declaration.
    ///
    /// Within one generation the same fact always yields the same id.
    pub fn materialize(&self, fact: impl Into<RawFact>) -> NodeId {
        match fact.into() {
            RawFact::File(file) => self.file_node(&file),
            RawFact::Declaration(decl) => self.declaration_node(&decl),
        }
    }

    fn file_node(&self, raw: &Rc<RawFile>) -> NodeId {
        self.caches.files.get_or_insert_with(IdKey::new(raw), || {
            self.alloc(raw.origin, None, NodeData::File(FileNode::new(Rc::clone(raw))))
        })
    }

    /// Declaration reached without its container. The parent comes from the
    /// index; declarations the index does not know have no parent.
    fn declaration_node(&self, raw: &Rc<RawDecl>) -> NodeId {
        let key = IdKey::new(raw);
        if let Some(id) = self.caches.declarations.get(&key) {
            return id;
        }
        let owner = self.index.borrow().owner_of(raw).cloned();
        let parent = match owner {
            Some(Owner::File(file)) => Some(self.file_node(&file)),
            Some(Owner::Declaration(decl)) => Some(self.declaration_node(&decl)),
            Some(Owner::Package(_)) | None => None,
        };
        self.declaration_in(parent, raw)
    }

    fn declaration_in(&self, parent: Option<NodeId>, raw: &Rc<RawDecl>) -> NodeId {
        self.caches.declarations.get_or_insert_with(IdKey::new(raw), || {
            let decl = DeclNode::new(Rc::clone(raw));
            let data = match raw.kind {
                RawDeclKind::Class { .. } => NodeData::Class(decl),
                RawDeclKind::Function { .. } => NodeData::Function(decl),
                RawDeclKind::Property { .. } => NodeData::Property(decl),
                RawDeclKind::TypeAlias { .. } => NodeData::TypeAlias(decl),
            };
            self.alloc(raw.origin, parent, data)
        })
    }

    /// Child node cached by identity within `parent`. Children inherit the
    /// parent's origin.
    fn child<T: ?Sized + 'static>(
        &self,
        cache: &ObjectCache<ContextKey<NodeId, T>, NodeId>,
        parent: NodeId,
        raw: &Rc<T>,
        make: impl FnOnce(Rc<T>) -> NodeData,
    ) -> NodeId {
        cache.get_or_insert_with(ContextKey::new(parent, raw), || {
            let origin = self.node(parent).origin;
            self.alloc(origin, Some(parent), make(Rc::clone(raw)))
        })
    }

    fn type_reference_node(&self, parent: NodeId, raw: &Rc<RawTypeRef>) -> NodeId {
        self.child(&self.caches.type_references, parent, raw, |raw| {
            NodeData::TypeReference(TypeReferenceNode::new(raw))
        })
    }

    fn type_parameter_node(&self, parent: NodeId, raw: &Rc<RawTypeParam>) -> NodeId {
        self.child(&self.caches.type_parameters, parent, raw, |raw| {
            NodeData::TypeParameter(TypeParameterNode::new(raw))
        })
    }

    fn value_parameter_node(&self, parent: NodeId, raw: &Rc<RawParam>) -> NodeId {
        self.child(&self.caches.value_parameters, parent, raw, |raw| {
            NodeData::ValueParameter(ValueParameterNode::new(raw))
        })
    }

    fn annotation_node(&self, parent: NodeId, raw: &Rc<RawAnnotation>) -> NodeId {
        self.child(&self.caches.annotations, parent, raw, |raw| {
            NodeData::Annotation(AnnotationNode::new(raw))
        })
    }

    fn value_argument_node(&self, parent: NodeId, raw: &Rc<RawValueArg>) -> NodeId {
        self.child(&self.caches.value_arguments, parent, raw, |raw| {
            NodeData::ValueArgument(ValueArgumentNode::new(raw))
        })
    }

    fn type_argument_node(&self, parent: NodeId, raw: &Rc<RawTypeArg>) -> NodeId {
        self.child(&self.caches.type_arguments, parent, raw, |raw| {
            NodeData::TypeArgument(TypeArgumentNode::written(raw))
        })
    }

    /// Classifier created by the core (`FunctionN`, `dynamic`).
    fn synthetic_class(&self, name: &str) -> NodeId {
        self.caches
            .synthetic_classes
            .get_or_insert_with(name.to_string(), || {
                let raw = RawDecl::class(name).with_origin_deep(Origin::Synthetic);
                let data = NodeData::Class(DeclNode::new(Rc::new(raw)));
                self.alloc(Origin::Synthetic, None, data)
            })
    }

    fn element_node(&self, type_ref: NodeId, raw: &Rc<RawTypeRef>) -> NodeId {
        let origin = self.node(type_ref).origin;
        let shared = Rc::clone(raw);
        let data = match &raw.element {
            RawElement::Classifier { .. } => {
                NodeData::ClassifierReference(ClassifierNode::new(shared))
            }
            RawElement::Callable { .. } => NodeData::CallableReference(CallableNode::new(shared)),
            RawElement::Dynamic => NodeData::DynamicReference(DynamicNode { raw: shared }),
            RawElement::Parenthesized(_) => {
                NodeData::ParenthesizedReference(ParenthesizedNode::new(shared))
            }
        };
        self.alloc(origin, Some(type_ref), data)
    }

    // ========================================================================
    // Common properties
    // ========================================================================

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind()
    }

    pub fn origin(&self, id: NodeId) -> Origin {
        self.node(id).origin
    }

    /// Navigational parent; `None` for files and for declarations whose
    /// owner is unknown or a package.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Raw fact a file or declaration node was materialized from.
    pub fn raw_fact(&self, id: NodeId) -> Option<RawFact> {
        let node = self.node(id);
        match &node.data {
            NodeData::File(file) => Some(RawFact::File(Rc::clone(&file.raw))),
            data => data.as_decl().map(|d| RawFact::Declaration(Rc::clone(&d.raw))),
        }
    }

    /// Source path of a file node.
    pub fn file_path(&self, id: NodeId) -> Option<String> {
        match &self.node(id).data {
            NodeData::File(file) => Some(file.raw.path.clone()),
            _ => None,
        }
    }

    /// Nearest enclosing file, not counting `id` itself.
    pub fn containing_file(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.parent(id);
        while let Some(node) = current {
            if self.kind(node) == NodeKind::File {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    fn enclosing_raw_file(&self, id: NodeId) -> Option<Rc<RawFile>> {
        let file = if self.kind(id) == NodeKind::File {
            id
        } else {
            self.containing_file(id)?
        };
        match &self.node(file).data {
            NodeData::File(file) => Some(Rc::clone(&file.raw)),
            _ => None,
        }
    }

    /// Source location. Compiled and synthesized nodes have none.
    pub fn location(&self, id: NodeId) -> Location {
        let node = self.node(id);
        node.location
            .get_or_init(|| {
                if !node.origin.is_source() {
                    return Location::NonExistent;
                }
                match self.enclosing_raw_file(id) {
                    Some(file) => {
                        Location::file(file.path.clone(), span_of(&node.data).unwrap_or_default())
                    }
                    None => Location::NonExistent,
                }
            })
            .clone()
    }

    // ========================================================================
    // Names
    // ========================================================================

    /// Simple name of a named node.
    pub fn simple_name(&self, id: NodeId) -> Option<String> {
        let node = self.node(id);
        match &node.data {
            NodeData::File(file) => Some(last_segment(&file.raw.path, '/').to_string()),
            NodeData::TypeParameter(tp) => Some(tp.raw.name.clone()),
            NodeData::ValueParameter(p) => p.raw.name.clone(),
            NodeData::ValueArgument(arg) => arg.raw.name.clone(),
            NodeData::ClassifierReference(c) => match &c.raw.element {
                RawElement::Classifier { name, .. } => Some(last_segment(name, '.').to_string()),
                _ => None,
            },
            NodeData::Annotation(a) => Some(last_segment(a.raw.written_name(), '.').to_string()),
            data => data.as_decl().map(|d| d.raw.name.clone()),
        }
    }

    /// Qualified name of a declaration. Local declarations and type
    /// parameters have none.
    pub fn qualified_name(&self, id: NodeId) -> Option<String> {
        let node = self.node(id);
        let decl = node.data.as_decl()?;
        decl.qualified_name
            .get_or_init(|| {
                if node.origin == Origin::Synthetic {
                    return Some(decl.raw.name.clone());
                }
                self.index
                    .borrow()
                    .qualified_name_of(&decl.raw)
                    .map(str::to_string)
            })
            .clone()
    }

    /// Package of the node's file or declaration; empty for the root
    /// package and for synthesized nodes.
    pub fn package_name(&self, id: NodeId) -> String {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id);
            match &node.data {
                NodeData::File(file) => return file.raw.package.clone(),
                data => {
                    if let Some(decl) = data.as_decl() {
                        if let Some(package) = self.index.borrow().package_of(&decl.raw) {
                            return package.to_string();
                        }
                    }
                }
            }
            current = node.parent;
        }
        String::new()
    }

    // ========================================================================
    // Capabilities
    // ========================================================================

    pub fn modifiers(&self, id: NodeId) -> BTreeSet<Modifier> {
        self.node(id)
            .data
            .as_modifier_list_owner()
            .map(|owner| owner.modifiers())
            .unwrap_or_default()
    }

    /// Annotation usages, in declaration order.
    pub fn annotations(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.node(id);
        let Some(annotated) = node.data.as_annotated() else {
            return Vec::new();
        };
        annotated
            .annotation_cell()
            .get_or_init(|| {
                annotated
                    .raw_annotations()
                    .iter()
                    .map(|raw| self.annotation_node(id, raw))
                    .collect()
            })
            .clone()
    }

    /// Nested declarations of a file, class or function.
    pub fn declarations(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.node(id);
        let Some(container) = node.data.as_declaration_container() else {
            return Vec::new();
        };
        container
            .declaration_cell()
            .get_or_init(|| {
                container
                    .raw_declarations()
                    .iter()
                    .map(|raw| self.declaration_in(Some(id), raw))
                    .collect()
            })
            .clone()
    }

    /// Lazy depth-first walk over everything declared in `container`.
    pub fn declaration_sequence(&self, container: NodeId) -> MemoizedSequence<DeclarationWalk<'_>> {
        MemoizedSequence::new(DeclarationWalk::new(self, container))
    }

    // ========================================================================
    // Declarations
    // ========================================================================

    pub fn super_types(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.node(id);
        let NodeData::Class(decl) = &node.data else {
            return Vec::new();
        };
        decl.super_types
            .get_or_init(|| match &decl.raw.kind {
                RawDeclKind::Class { super_types, .. } => super_types
                    .iter()
                    .map(|raw| self.type_reference_node(id, raw))
                    .collect(),
                _ => Vec::new(),
            })
            .clone()
    }

    pub fn type_parameters(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.node(id);
        let Some(decl) = node.data.as_decl() else {
            return Vec::new();
        };
        decl.type_parameters
            .get_or_init(|| {
                decl.raw
                    .type_parameters
                    .iter()
                    .map(|raw| self.type_parameter_node(id, raw))
                    .collect()
            })
            .clone()
    }

    /// Value parameters of a function, or parameter types of a function
    /// type reference element.
    pub fn parameters(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.node(id);
        match &node.data {
            NodeData::Function(decl) => decl
                .parameters
                .get_or_init(|| match &decl.raw.kind {
                    RawDeclKind::Function { parameters, .. } => parameters
                        .iter()
                        .map(|raw| self.value_parameter_node(id, raw))
                        .collect(),
                    _ => Vec::new(),
                })
                .clone(),
            NodeData::CallableReference(callable) => callable
                .parameters
                .get_or_init(|| match &callable.raw.element {
                    RawElement::Callable { parameters, .. } => parameters
                        .iter()
                        .map(|raw| self.type_reference_node(id, raw))
                        .collect(),
                    _ => Vec::new(),
                })
                .clone(),
            _ => Vec::new(),
        }
    }

    pub fn return_type(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        match &node.data {
            NodeData::Function(decl) => *decl.ty.get_or_init(|| match &decl.raw.kind {
                RawDeclKind::Function { return_type, .. } => {
                    return_type.as_ref().map(|raw| self.type_reference_node(id, raw))
                }
                _ => None,
            }),
            NodeData::CallableReference(callable) => match &callable.raw.element {
                RawElement::Callable { return_type, .. } => Some(
                    *callable
                        .return_type
                        .get_or_init(|| self.type_reference_node(id, return_type)),
                ),
                _ => None,
            },
            _ => None,
        }
    }

    /// Extension receiver of a function, property or function type.
    pub fn extension_receiver(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        match &node.data {
            NodeData::Function(decl) | NodeData::Property(decl) => {
                *decl.receiver.get_or_init(|| match &decl.raw.kind {
                    RawDeclKind::Function { receiver, .. }
                    | RawDeclKind::Property { receiver, .. } => {
                        receiver.as_ref().map(|raw| self.type_reference_node(id, raw))
                    }
                    _ => None,
                })
            }
            NodeData::CallableReference(callable) => {
                *callable.receiver.get_or_init(|| match &callable.raw.element {
                    RawElement::Callable { receiver, .. } => {
                        receiver.as_ref().map(|raw| self.type_reference_node(id, raw))
                    }
                    _ => None,
                })
            }
            _ => None,
        }
    }

    pub fn property_type(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        let NodeData::Property(decl) = &node.data else {
            return None;
        };
        *decl.ty.get_or_init(|| match &decl.raw.kind {
            RawDeclKind::Property { ty, .. } => {
                ty.as_ref().map(|raw| self.type_reference_node(id, raw))
            }
            _ => None,
        })
    }

    pub fn alias_target(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        let NodeData::TypeAlias(decl) = &node.data else {
            return None;
        };
        *decl.ty.get_or_init(|| match &decl.raw.kind {
            RawDeclKind::TypeAlias { target } => Some(self.type_reference_node(id, target)),
            _ => None,
        })
    }

    /// Upper bounds of a type parameter.
    pub fn bounds(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.node(id);
        let NodeData::TypeParameter(tp) = &node.data else {
            return Vec::new();
        };
        tp.bounds
            .get_or_init(|| {
                tp.raw
                    .bounds
                    .iter()
                    .map(|raw| self.type_reference_node(id, raw))
                    .collect()
            })
            .clone()
    }

    /// Declared variance of a type parameter or use-site variance of a type
    /// argument.
    pub fn variance(&self, id: NodeId) -> Option<Variance> {
        match &self.node(id).data {
            NodeData::TypeParameter(tp) => Some(tp.raw.variance),
            NodeData::TypeArgument(arg) => Some(arg.variance),
            _ => None,
        }
    }

    // ========================================================================
    // References
    // ========================================================================

    /// Element of a type reference.
    pub fn element(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        let NodeData::TypeReference(type_ref) = &node.data else {
            return None;
        };
        Some(*type_ref.element.get_or_init(|| self.element_node(id, &type_ref.raw)))
    }

    /// Qualifier of a dotted classifier reference (`a.B` for `a.B.C`).
    pub fn qualifier(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        let NodeData::ClassifierReference(classifier) = &node.data else {
            return None;
        };
        *classifier.qualifier.get_or_init(|| {
            let RawElement::Classifier { name, .. } = &classifier.raw.element else {
                return None;
            };
            let (prefix, _) = name.rsplit_once('.')?;
            let raw = Rc::new(RawTypeRef::named(prefix));
            Some(self.alloc(
                node.origin,
                Some(id),
                NodeData::ClassifierReference(ClassifierNode::new(raw)),
            ))
        })
    }

    /// Type arguments as written at a classifier reference.
    pub fn type_arguments(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.node(id);
        let NodeData::ClassifierReference(classifier) = &node.data else {
            return Vec::new();
        };
        classifier
            .type_arguments
            .get_or_init(|| match &classifier.raw.element {
                RawElement::Classifier { arguments, .. } => arguments
                    .iter()
                    .map(|raw| self.type_argument_node(id, raw))
                    .collect(),
                _ => Vec::new(),
            })
            .clone()
    }

    /// Type of a type argument; `None` for star projections.
    pub fn type_argument_reference(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        let NodeData::TypeArgument(arg) = &node.data else {
            return None;
        };
        *arg.reference.get_or_init(|| {
            arg.raw
                .as_ref()
                .and_then(|raw| raw.ty.as_ref())
                .map(|ty| self.type_reference_node(id, ty))
        })
    }

    fn parenthesized_inner(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        let NodeData::ParenthesizedReference(paren) = &node.data else {
            return None;
        };
        let RawElement::Parenthesized(inner) = &paren.raw.element else {
            return None;
        };
        Some(*paren.inner.get_or_init(|| self.type_reference_node(id, inner)))
    }

    /// Inner type reference of a parenthesized element.
    pub fn inner_type(&self, id: NodeId) -> Option<NodeId> {
        self.parenthesized_inner(id)
    }

    /// Positional type arguments of a function type: receiver and
    /// parameters (contravariant), then the return type (covariant).
    fn callable_type_arguments(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.node(id);
        let NodeData::CallableReference(callable) = &node.data else {
            return Vec::new();
        };
        callable
            .type_arguments
            .get_or_init(|| {
                let mut positions: Vec<(Variance, NodeId)> = Vec::new();
                if let Some(receiver) = self.extension_receiver(id) {
                    positions.push((Variance::Contravariant, receiver));
                }
                for param in self.parameters(id) {
                    positions.push((Variance::Contravariant, param));
                }
                if let Some(ret) = self.return_type(id) {
                    positions.push((Variance::Covariant, ret));
                }
                positions
                    .into_iter()
                    .map(|(variance, reference)| {
                        self.alloc(
                            node.origin,
                            Some(id),
                            NodeData::TypeArgument(TypeArgumentNode::synthetic(
                                variance, reference,
                            )),
                        )
                    })
                    .collect()
            })
            .clone()
    }

    // ========================================================================
    // Annotations
    // ========================================================================

    /// Type reference naming the annotation class.
    pub fn annotation_type(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        let NodeData::Annotation(annotation) = &node.data else {
            return None;
        };
        Some(
            *annotation
                .annotation_type
                .get_or_init(|| self.type_reference_node(id, &annotation.raw.ty)),
        )
    }

    /// Annotation name as written, without qualifier.
    pub fn short_name(&self, id: NodeId) -> Option<String> {
        match &self.node(id).data {
            NodeData::Annotation(annotation) => {
                Some(last_segment(annotation.raw.written_name(), '.').to_string())
            }
            _ => None,
        }
    }

    /// Value arguments of an annotation.
    pub fn arguments(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.node(id);
        let NodeData::Annotation(annotation) = &node.data else {
            return Vec::new();
        };
        annotation
            .arguments
            .get_or_init(|| {
                annotation
                    .raw
                    .arguments
                    .iter()
                    .map(|raw| self.value_argument_node(id, raw))
                    .collect()
            })
            .clone()
    }

    pub fn argument_value(&self, id: NodeId) -> Option<ConstValue> {
        match &self.node(id).data {
            NodeData::ValueArgument(arg) => Some(arg.raw.value.clone()),
            _ => None,
        }
    }

    /// The parameter's declared type.
    pub fn parameter_type(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        let NodeData::ValueParameter(param) = &node.data else {
            return None;
        };
        *param
            .ty
            .get_or_init(|| param.raw.ty.as_ref().map(|raw| self.type_reference_node(id, raw)))
    }

    // ========================================================================
    // Types
    // ========================================================================

    /// Resolve a type reference. Unresolvable references, and nodes that are
    /// not type references, yield [`TypeId::ERROR`].
    pub fn resolve(&self, type_ref: NodeId) -> TypeId {
        let node = self.node(type_ref);
        let NodeData::TypeReference(reference) = &node.data else {
            return TypeId::ERROR;
        };
        *reference
            .resolved
            .get_or_init(|| self.compute_type(type_ref, node.origin, &reference.raw))
    }

    fn compute_type(&self, type_ref: NodeId, origin: Origin, raw: &Rc<RawTypeRef>) -> TypeId {
        let nullability = match raw.nullable {
            Some(true) => Nullability::Nullable,
            Some(false) => Nullability::NotNull,
            None if origin == Origin::ForeignSource => Nullability::PlatformFlexible,
            None => Nullability::NotNull,
        };
        let Some(element) = self.element(type_ref) else {
            return TypeId::ERROR;
        };
        match &raw.element {
            RawElement::Classifier { name, .. } => match self.resolve_classifier(type_ref, name) {
                Some(declaration) => self.alloc_type(Type {
                    declaration,
                    nullability,
                    arguments: self.type_arguments(element),
                }),
                None => TypeId::ERROR,
            },
            RawElement::Callable {
                receiver,
                parameters,
                ..
            } => {
                let arity = parameters.len() + usize::from(receiver.is_some());
                let declaration = self.synthetic_class(&format!("Function{arity}"));
                self.alloc_type(Type {
                    declaration,
                    nullability,
                    arguments: self.callable_type_arguments(element),
                })
            }
            RawElement::Dynamic => self.alloc_type(Type {
                declaration: self.synthetic_class("dynamic"),
                nullability: Nullability::PlatformFlexible,
                arguments: Vec::new(),
            }),
            RawElement::Parenthesized(_) => {
                let Some(inner) = self.parenthesized_inner(element) else {
                    return TypeId::ERROR;
                };
                let inner_type = self.resolve(inner);
                match (raw.nullable, self.type_info(inner_type)) {
                    (_, None) => TypeId::ERROR,
                    (None, Some(_)) => inner_type,
                    (Some(_), Some(ty)) => self.alloc_type(ty.with_nullability(nullability)),
                }
            }
        }
    }

    /// Bind a classifier name seen at `type_ref`: type parameters in scope
    /// first, then the resolver.
    fn resolve_classifier(&self, type_ref: NodeId, name: &str) -> Option<NodeId> {
        if !name.contains('.') {
            if let Some(param) = self.type_parameter_in_scope(type_ref, name) {
                return Some(param);
            }
        }

        let file = self
            .enclosing_raw_file(type_ref)
            .filter(|file| file.origin.is_source());
        let package = self.package_name(type_ref);
        let enclosing = self.enclosing_classifiers(type_ref);
        let site = ResolutionSite {
            file: file.as_deref(),
            package: &package,
            enclosing: &enclosing,
        };
        let resolver: Rc<dyn TypeResolver> = match &self.resolver {
            Some(resolver) => Rc::clone(resolver),
            None => self.index(),
        };

        let result = {
            let mut tracker = self.tracker.borrow_mut();
            resolver.resolve_classifier(name, &site, &mut **tracker)
        };
        let found = match result {
            Ok(found) => found,
            Err(error) => {
                self.stash_tracking_error(error);
                resolver
                    .resolve_classifier(name, &site, &mut NoopTracker)
                    .ok()
                    .flatten()
            }
        };
        found.map(|decl| self.declaration_node(&decl))
    }

    fn type_parameter_in_scope(&self, from: NodeId, name: &str) -> Option<NodeId> {
        let mut current = self.parent(from);
        while let Some(node) = current {
            if self.node(node).data.as_decl().is_some() {
                let found = self
                    .type_parameters(node)
                    .into_iter()
                    .find(|&tp| self.simple_name(tp).as_deref() == Some(name));
                if found.is_some() {
                    return found;
                }
            }
            current = self.parent(node);
        }
        None
    }

    /// Qualified names of the classes around `id`, innermost first.
    fn enclosing_classifiers(&self, id: NodeId) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = self.parent(id);
        while let Some(node) = current {
            if self.kind(node) == NodeKind::Class {
                if let Some(name) = self.qualified_name(node) {
                    names.push(name);
                }
            }
            current = self.parent(node);
        }
        names
    }

    /// The resolved type behind `id`; `None` for the error type.
    pub fn type_info(&self, id: TypeId) -> Option<Type> {
        if id.is_error() {
            return None;
        }
        debug_assert_eq!(
            id.generation(),
            self.generation(),
            "stale type {id} used after cache clear"
        );
        self.types.borrow().get(id.index() as usize).cloned()
    }

    pub fn is_error(&self, id: TypeId) -> bool {
        id.is_error()
    }

    // ========================================================================
    // Index queries
    // ========================================================================

    /// Top-level declarations of a package, sources and classpath alike.
    pub fn declarations_in(&self, package: &str) -> Vec<NodeId> {
        let decls: Vec<Rc<RawDecl>> = self.index.borrow().declarations_in_package(package).to_vec();
        decls.iter().map(|decl| self.declaration_node(decl)).collect()
    }

    /// Classifier by qualified name. Records no lookup.
    pub fn class_by_name(&self, fqn: &str) -> Option<NodeId> {
        let decl = self.index.borrow().classifier(fqn).cloned()?;
        Some(self.declaration_node(&decl))
    }

    /// File nodes of every indexed source file, in input order.
    pub fn files(&self) -> Vec<NodeId> {
        let files: Vec<Rc<RawFile>> = self.index.borrow().files().to_vec();
        files.iter().map(|file| self.file_node(file)).collect()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("generation", &self.generation())
            .field("nodes", &self.nodes.borrow().len())
            .field("types", &self.types.borrow().len())
            .finish_non_exhaustive()
    }
}

fn last_segment(name: &str, separator: char) -> &str {
    name.rsplit(separator).next().unwrap_or(name)
}

fn span_of(data: &NodeData) -> Option<Span> {
    match data {
        NodeData::File(_) => None,
        NodeData::TypeParameter(tp) => tp.raw.span,
        NodeData::TypeReference(r) => r.raw.span,
        NodeData::ClassifierReference(c) => c.raw.span,
        NodeData::CallableReference(c) => c.raw.span,
        NodeData::DynamicReference(d) => d.raw.span,
        NodeData::ParenthesizedReference(p) => p.raw.span,
        NodeData::Annotation(a) => a.raw.span,
        NodeData::ValueArgument(v) => v.raw.span,
        NodeData::ValueParameter(p) => p.raw.span,
        NodeData::TypeArgument(_) => None,
        data => data.as_decl().and_then(|d| d.raw.span),
    }
}

// ============================================================================
// DeclarationWalk
// ============================================================================

/// Depth-first, pre-order walk over nested declarations.
pub struct DeclarationWalk<'a> {
    session: &'a Session,
    stack: Vec<NodeId>,
}

impl<'a> DeclarationWalk<'a> {
    fn new(session: &'a Session, container: NodeId) -> Self {
        let mut stack = session.declarations(container);
        stack.reverse();
        DeclarationWalk { session, stack }
    }
}

impl Iterator for DeclarationWalk<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let next = self.stack.pop()?;
        let mut nested = self.session.declarations(next);
        nested.reverse();
        self.stack.extend(nested);
        Some(next)
    }
}

impl fmt::Debug for DeclarationWalk<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclarationWalk")
            .field("pending", &self.stack.len())
            .finish()
    }
}
