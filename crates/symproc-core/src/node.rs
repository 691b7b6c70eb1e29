//! Symbol nodes.
//!
//! Nodes live in the session arena and refer to each other by [`NodeId`].
//! The node kinds form a closed set ([`NodeKind`]); what a kind can do is
//! expressed through small capability traits ([`Annotated`],
//! [`ModifierListOwner`], [`DeclarationContainer`]) implemented by the
//! variant payloads.
//!
//! Derived properties (child lists, resolved types, locations) are stored in
//! write-once cells and computed by the [`Session`](crate::session::Session)
//! on first access.

use std::cell::OnceCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::raw::{
    Location, Modifier, Origin, RawAnnotation, RawDecl, RawFile, RawParam, RawTypeArg, RawTypeParam,
    RawTypeRef, RawValueArg, Variance,
};
use crate::types::TypeId;

// ============================================================================
// NodeId
// ============================================================================

/// Arena index of a node, stamped with the cache generation it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        NodeId { index, generation }
    }

    /// Position in the arena.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation the node was created in.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}@{}", self.index, self.generation)
    }
}

// ============================================================================
// NodeKind
// ============================================================================

/// The closed set of node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Class,
    Function,
    Property,
    TypeAlias,
    TypeParameter,
    TypeReference,
    ClassifierReference,
    CallableReference,
    DynamicReference,
    ParenthesizedReference,
    Annotation,
    ValueArgument,
    ValueParameter,
    TypeArgument,
}

impl NodeKind {
    /// Declarations: classes, functions, properties, aliases, type parameters.
    pub fn is_declaration(self) -> bool {
        matches!(
            self,
            NodeKind::Class
                | NodeKind::Function
                | NodeKind::Property
                | NodeKind::TypeAlias
                | NodeKind::TypeParameter
        )
    }

    /// Kinds that carry annotations.
    pub fn is_annotated(self) -> bool {
        self.is_declaration()
            || matches!(
                self,
                NodeKind::File
                    | NodeKind::TypeReference
                    | NodeKind::ValueParameter
                    | NodeKind::ValueArgument
                    | NodeKind::TypeArgument
            )
    }

    /// Kinds that carry modifiers.
    pub fn is_modifier_list_owner(self) -> bool {
        self.is_declaration() || self == NodeKind::TypeReference
    }

    /// Kinds that contain nested declarations.
    pub fn is_declaration_container(self) -> bool {
        matches!(self, NodeKind::File | NodeKind::Class | NodeKind::Function)
    }

    /// The referenced element of a type reference.
    pub fn is_reference_element(self) -> bool {
        matches!(
            self,
            NodeKind::ClassifierReference
                | NodeKind::CallableReference
                | NodeKind::DynamicReference
                | NodeKind::ParenthesizedReference
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Capabilities
// ============================================================================

/// Payloads that carry annotations.
pub trait Annotated {
    fn raw_annotations(&self) -> &[Rc<RawAnnotation>];
    fn annotation_cell(&self) -> &OnceCell<Vec<NodeId>>;
}

/// Payloads that carry modifiers.
pub trait ModifierListOwner {
    fn modifiers(&self) -> BTreeSet<Modifier>;
}

/// Payloads that contain nested declarations.
pub trait DeclarationContainer {
    fn raw_declarations(&self) -> &[Rc<RawDecl>];
    fn declaration_cell(&self) -> &OnceCell<Vec<NodeId>>;
}

// ============================================================================
// Node
// ============================================================================

/// A materialized node.
#[derive(Debug)]
pub struct Node {
    pub(crate) origin: Origin,
    pub(crate) parent: Option<NodeId>,
    pub(crate) location: OnceCell<Location>,
    pub(crate) data: NodeData,
}

impl Node {
    pub(crate) fn new(origin: Origin, parent: Option<NodeId>, data: NodeData) -> Self {
        Node {
            origin,
            parent,
            location: OnceCell::new(),
            data,
        }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }
}

/// Variant payloads.
#[derive(Debug)]
pub enum NodeData {
    File(FileNode),
    Class(DeclNode),
    Function(DeclNode),
    Property(DeclNode),
    TypeAlias(DeclNode),
    TypeParameter(TypeParameterNode),
    TypeReference(TypeReferenceNode),
    ClassifierReference(ClassifierNode),
    CallableReference(CallableNode),
    DynamicReference(DynamicNode),
    ParenthesizedReference(ParenthesizedNode),
    Annotation(AnnotationNode),
    ValueArgument(ValueArgumentNode),
    ValueParameter(ValueParameterNode),
    TypeArgument(TypeArgumentNode),
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::File(_) => NodeKind::File,
            NodeData::Class(_) => NodeKind::Class,
            NodeData::Function(_) => NodeKind::Function,
            NodeData::Property(_) => NodeKind::Property,
            NodeData::TypeAlias(_) => NodeKind::TypeAlias,
            NodeData::TypeParameter(_) => NodeKind::TypeParameter,
            NodeData::TypeReference(_) => NodeKind::TypeReference,
            NodeData::ClassifierReference(_) => NodeKind::ClassifierReference,
            NodeData::CallableReference(_) => NodeKind::CallableReference,
            NodeData::DynamicReference(_) => NodeKind::DynamicReference,
            NodeData::ParenthesizedReference(_) => NodeKind::ParenthesizedReference,
            NodeData::Annotation(_) => NodeKind::Annotation,
            NodeData::ValueArgument(_) => NodeKind::ValueArgument,
            NodeData::ValueParameter(_) => NodeKind::ValueParameter,
            NodeData::TypeArgument(_) => NodeKind::TypeArgument,
        }
    }

    /// Declaration payload for classes, functions, properties and aliases.
    pub fn as_decl(&self) -> Option<&DeclNode> {
        match self {
            NodeData::Class(d)
            | NodeData::Function(d)
            | NodeData::Property(d)
            | NodeData::TypeAlias(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_annotated(&self) -> Option<&dyn Annotated> {
        match self {
            NodeData::File(n) => Some(n),
            NodeData::Class(n)
            | NodeData::Function(n)
            | NodeData::Property(n)
            | NodeData::TypeAlias(n) => Some(n),
            NodeData::TypeParameter(n) => Some(n),
            NodeData::TypeReference(n) => Some(n),
            NodeData::ValueParameter(n) => Some(n),
            NodeData::ValueArgument(n) => Some(n),
            NodeData::TypeArgument(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_modifier_list_owner(&self) -> Option<&dyn ModifierListOwner> {
        match self {
            NodeData::Class(n)
            | NodeData::Function(n)
            | NodeData::Property(n)
            | NodeData::TypeAlias(n) => Some(n),
            NodeData::TypeParameter(n) => Some(n),
            NodeData::TypeReference(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_declaration_container(&self) -> Option<&dyn DeclarationContainer> {
        match self {
            NodeData::File(n) => Some(n),
            NodeData::Class(n) | NodeData::Function(n) => Some(n),
            _ => None,
        }
    }
}

// ============================================================================
// Variant payloads
// ============================================================================

#[derive(Debug)]
pub struct FileNode {
    pub(crate) raw: Rc<RawFile>,
    pub(crate) annotations: OnceCell<Vec<NodeId>>,
    pub(crate) declarations: OnceCell<Vec<NodeId>>,
}

impl FileNode {
    pub(crate) fn new(raw: Rc<RawFile>) -> Self {
        FileNode {
            raw,
            annotations: OnceCell::new(),
            declarations: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &Rc<RawFile> {
        &self.raw
    }
}

impl Annotated for FileNode {
    fn raw_annotations(&self) -> &[Rc<RawAnnotation>] {
        &self.raw.annotations
    }

    fn annotation_cell(&self) -> &OnceCell<Vec<NodeId>> {
        &self.annotations
    }
}

impl DeclarationContainer for FileNode {
    fn raw_declarations(&self) -> &[Rc<RawDecl>] {
        &self.raw.declarations
    }

    fn declaration_cell(&self) -> &OnceCell<Vec<NodeId>> {
        &self.declarations
    }
}

/// Payload shared by classes, functions, properties and type aliases.
#[derive(Debug)]
pub struct DeclNode {
    pub(crate) raw: Rc<RawDecl>,
    pub(crate) qualified_name: OnceCell<Option<String>>,
    pub(crate) annotations: OnceCell<Vec<NodeId>>,
    pub(crate) type_parameters: OnceCell<Vec<NodeId>>,
    pub(crate) declarations: OnceCell<Vec<NodeId>>,
    pub(crate) super_types: OnceCell<Vec<NodeId>>,
    pub(crate) parameters: OnceCell<Vec<NodeId>>,
    /// Function return type, property type or alias target.
    pub(crate) ty: OnceCell<Option<NodeId>>,
    pub(crate) receiver: OnceCell<Option<NodeId>>,
}

impl DeclNode {
    pub(crate) fn new(raw: Rc<RawDecl>) -> Self {
        DeclNode {
            raw,
            qualified_name: OnceCell::new(),
            annotations: OnceCell::new(),
            type_parameters: OnceCell::new(),
            declarations: OnceCell::new(),
            super_types: OnceCell::new(),
            parameters: OnceCell::new(),
            ty: OnceCell::new(),
            receiver: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &Rc<RawDecl> {
        &self.raw
    }
}

impl Annotated for DeclNode {
    fn raw_annotations(&self) -> &[Rc<RawAnnotation>] {
        &self.raw.annotations
    }

    fn annotation_cell(&self) -> &OnceCell<Vec<NodeId>> {
        &self.annotations
    }
}

impl ModifierListOwner for DeclNode {
    fn modifiers(&self) -> BTreeSet<Modifier> {
        self.raw.modifiers.clone()
    }
}

impl DeclarationContainer for DeclNode {
    fn raw_declarations(&self) -> &[Rc<RawDecl>] {
        self.raw.nested()
    }

    fn declaration_cell(&self) -> &OnceCell<Vec<NodeId>> {
        &self.declarations
    }
}

#[derive(Debug)]
pub struct TypeParameterNode {
    pub(crate) raw: Rc<RawTypeParam>,
    pub(crate) bounds: OnceCell<Vec<NodeId>>,
    /// Type parameters are never annotated in the raw model.
    pub(crate) annotations: OnceCell<Vec<NodeId>>,
}

impl TypeParameterNode {
    pub(crate) fn new(raw: Rc<RawTypeParam>) -> Self {
        TypeParameterNode {
            raw,
            bounds: OnceCell::new(),
            annotations: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &Rc<RawTypeParam> {
        &self.raw
    }
}

impl Annotated for TypeParameterNode {
    fn raw_annotations(&self) -> &[Rc<RawAnnotation>] {
        &[]
    }

    fn annotation_cell(&self) -> &OnceCell<Vec<NodeId>> {
        &self.annotations
    }
}

impl ModifierListOwner for TypeParameterNode {
    fn modifiers(&self) -> BTreeSet<Modifier> {
        let mut modifiers = BTreeSet::new();
        if self.raw.reified {
            modifiers.insert(Modifier::Reified);
        }
        modifiers
    }
}

#[derive(Debug)]
pub struct TypeReferenceNode {
    pub(crate) raw: Rc<RawTypeRef>,
    pub(crate) annotations: OnceCell<Vec<NodeId>>,
    pub(crate) element: OnceCell<NodeId>,
    pub(crate) resolved: OnceCell<TypeId>,
}

impl TypeReferenceNode {
    pub(crate) fn new(raw: Rc<RawTypeRef>) -> Self {
        TypeReferenceNode {
            raw,
            annotations: OnceCell::new(),
            element: OnceCell::new(),
            resolved: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &Rc<RawTypeRef> {
        &self.raw
    }
}

impl Annotated for TypeReferenceNode {
    fn raw_annotations(&self) -> &[Rc<RawAnnotation>] {
        &self.raw.annotations
    }

    fn annotation_cell(&self) -> &OnceCell<Vec<NodeId>> {
        &self.annotations
    }
}

impl ModifierListOwner for TypeReferenceNode {
    fn modifiers(&self) -> BTreeSet<Modifier> {
        self.raw.modifiers.clone()
    }
}

/// Named classifier element. `raw` is the type reference (or synthetic
/// qualifier reference) whose element this is.
#[derive(Debug)]
pub struct ClassifierNode {
    pub(crate) raw: Rc<RawTypeRef>,
    pub(crate) type_arguments: OnceCell<Vec<NodeId>>,
    pub(crate) qualifier: OnceCell<Option<NodeId>>,
}

impl ClassifierNode {
    pub(crate) fn new(raw: Rc<RawTypeRef>) -> Self {
        ClassifierNode {
            raw,
            type_arguments: OnceCell::new(),
            qualifier: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &Rc<RawTypeRef> {
        &self.raw
    }
}

/// Function-type element.
#[derive(Debug)]
pub struct CallableNode {
    pub(crate) raw: Rc<RawTypeRef>,
    pub(crate) receiver: OnceCell<Option<NodeId>>,
    pub(crate) parameters: OnceCell<Vec<NodeId>>,
    pub(crate) return_type: OnceCell<NodeId>,
    /// Positional arguments of the function type: receiver, parameters,
    /// return type.
    pub(crate) type_arguments: OnceCell<Vec<NodeId>>,
}

impl CallableNode {
    pub(crate) fn new(raw: Rc<RawTypeRef>) -> Self {
        CallableNode {
            raw,
            receiver: OnceCell::new(),
            parameters: OnceCell::new(),
            return_type: OnceCell::new(),
            type_arguments: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &Rc<RawTypeRef> {
        &self.raw
    }
}

#[derive(Debug)]
pub struct DynamicNode {
    pub(crate) raw: Rc<RawTypeRef>,
}

impl DynamicNode {
    pub fn raw(&self) -> &Rc<RawTypeRef> {
        &self.raw
    }
}

#[derive(Debug)]
pub struct ParenthesizedNode {
    pub(crate) raw: Rc<RawTypeRef>,
    pub(crate) inner: OnceCell<NodeId>,
}

impl ParenthesizedNode {
    pub(crate) fn new(raw: Rc<RawTypeRef>) -> Self {
        ParenthesizedNode {
            raw,
            inner: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &Rc<RawTypeRef> {
        &self.raw
    }
}

#[derive(Debug)]
pub struct AnnotationNode {
    pub(crate) raw: Rc<RawAnnotation>,
    pub(crate) annotation_type: OnceCell<NodeId>,
    pub(crate) arguments: OnceCell<Vec<NodeId>>,
}

impl AnnotationNode {
    pub(crate) fn new(raw: Rc<RawAnnotation>) -> Self {
        AnnotationNode {
            raw,
            annotation_type: OnceCell::new(),
            arguments: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &Rc<RawAnnotation> {
        &self.raw
    }
}

#[derive(Debug)]
pub struct ValueArgumentNode {
    pub(crate) raw: Rc<RawValueArg>,
    pub(crate) annotations: OnceCell<Vec<NodeId>>,
}

impl ValueArgumentNode {
    pub(crate) fn new(raw: Rc<RawValueArg>) -> Self {
        ValueArgumentNode {
            raw,
            annotations: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &Rc<RawValueArg> {
        &self.raw
    }
}

impl Annotated for ValueArgumentNode {
    fn raw_annotations(&self) -> &[Rc<RawAnnotation>] {
        &[]
    }

    fn annotation_cell(&self) -> &OnceCell<Vec<NodeId>> {
        &self.annotations
    }
}

#[derive(Debug)]
pub struct ValueParameterNode {
    pub(crate) raw: Rc<RawParam>,
    pub(crate) annotations: OnceCell<Vec<NodeId>>,
    pub(crate) ty: OnceCell<Option<NodeId>>,
}

impl ValueParameterNode {
    pub(crate) fn new(raw: Rc<RawParam>) -> Self {
        ValueParameterNode {
            raw,
            annotations: OnceCell::new(),
            ty: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &Rc<RawParam> {
        &self.raw
    }
}

impl Annotated for ValueParameterNode {
    fn raw_annotations(&self) -> &[Rc<RawAnnotation>] {
        &self.raw.annotations
    }

    fn annotation_cell(&self) -> &OnceCell<Vec<NodeId>> {
        &self.annotations
    }
}

/// Type argument: written at a use site, or synthesized for a function type
/// (then `raw` is `None` and the reference is known up front).
#[derive(Debug)]
pub struct TypeArgumentNode {
    pub(crate) raw: Option<Rc<RawTypeArg>>,
    pub(crate) variance: Variance,
    pub(crate) reference: OnceCell<Option<NodeId>>,
    pub(crate) annotations: OnceCell<Vec<NodeId>>,
}

impl TypeArgumentNode {
    pub(crate) fn written(raw: Rc<RawTypeArg>) -> Self {
        TypeArgumentNode {
            variance: raw.variance,
            raw: Some(raw),
            reference: OnceCell::new(),
            annotations: OnceCell::new(),
        }
    }

    pub(crate) fn synthetic(variance: Variance, reference: NodeId) -> Self {
        TypeArgumentNode {
            raw: None,
            variance,
            reference: OnceCell::from(Some(reference)),
            annotations: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> Option<&Rc<RawTypeArg>> {
        self.raw.as_ref()
    }

    pub fn variance(&self) -> Variance {
        self.variance
    }
}

impl Annotated for TypeArgumentNode {
    fn raw_annotations(&self) -> &[Rc<RawAnnotation>] {
        &[]
    }

    fn annotation_cell(&self) -> &OnceCell<Vec<NodeId>> {
        &self.annotations
    }
}
