//! Raw facts: the backend boundary.
//!
//! Backends (source parsers for the primary and foreign languages, readers
//! of compiled metadata) describe a program as immutable, shared raw facts.
//! The session materializes nodes from them on demand. Identity matters:
//! each `Rc` is one fact, so backends must hand out the same `Rc` for the
//! same fact within a build.
//!
//! Facts are built with the `with_*` builder methods:
//!
//! ```
//! use symproc_core::raw::{RawDecl, RawFile, RawTypeRef};
//!
//! let file = RawFile::new("src/Foo.kt", "pkg")
//!     .with_declaration(RawDecl::class("Foo").with_super_type(RawTypeRef::named("Bar")));
//! assert_eq!(file.declarations.len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

// ============================================================================
// Origin and Location
// ============================================================================

/// Which backend a fact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Source in the primary language.
    PrimarySource,
    /// Source in the foreign (interop) language.
    ForeignSource,
    /// Precompiled metadata, no source available.
    CompiledMetadata,
    /// Created by the core itself.
    Synthetic,
}

impl Origin {
    /// True for origins backed by a source file.
    pub fn is_source(self) -> bool {
        matches!(self, Origin::PrimarySource | Origin::ForeignSource)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Origin::PrimarySource => "primary_source",
            Origin::ForeignSource => "foreign_source",
            Origin::CompiledMetadata => "compiled_metadata",
            Origin::Synthetic => "synthetic",
        };
        f.write_str(s)
    }
}

/// Byte span within a file (half-open).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Span { start, end }
    }
}

/// Where a node lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    /// A span in a source file.
    File { path: String, span: Span },
    /// No source location (compiled or synthesized nodes).
    NonExistent,
}

impl Location {
    pub fn file(path: impl Into<String>, span: Span) -> Self {
        Location::File {
            path: path.into(),
            span,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            Location::File { path, .. } => Some(path),
            Location::NonExistent => None,
        }
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Declaration modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    Public,
    Private,
    Internal,
    Protected,
    Abstract,
    Final,
    Open,
    Override,
    Data,
    Sealed,
    Inline,
    Suspend,
    Const,
    Lateinit,
    Static,
    Vararg,
    Reified,
}

/// Kind of a class-like declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassKind {
    Class,
    Interface,
    Object,
    EnumClass,
    EnumEntry,
    AnnotationClass,
}

/// Use-site or declaration-site variance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variance {
    #[default]
    Invariant,
    Covariant,
    Contravariant,
    /// `*` projection; the argument has no type.
    Star,
}

/// Constant value of an annotation argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    String(String),
    /// Reference to an enum entry, by qualified class name and entry name.
    EnumEntry { class: String, entry: String },
    /// Class literal by qualified name.
    ClassLiteral(String),
    Array(Vec<ConstValue>),
}

// ============================================================================
// Files
// ============================================================================

/// A source file.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub path: String,
    pub package: String,
    pub origin: Origin,
    /// Explicit imports, qualified; `pkg.*` for star imports.
    pub imports: Vec<String>,
    pub annotations: Vec<Rc<RawAnnotation>>,
    pub declarations: Vec<Rc<RawDecl>>,
}

impl RawFile {
    /// A primary-source file.
    pub fn new(path: impl Into<String>, package: impl Into<String>) -> Self {
        RawFile {
            path: path.into(),
            package: package.into(),
            origin: Origin::PrimarySource,
            imports: Vec::new(),
            annotations: Vec::new(),
            declarations: Vec::new(),
        }
    }

    /// A foreign-source file.
    pub fn foreign(path: impl Into<String>, package: impl Into<String>) -> Self {
        RawFile {
            origin: Origin::ForeignSource,
            ..RawFile::new(path, package)
        }
    }

    pub fn with_import(mut self, import: impl Into<String>) -> Self {
        self.imports.push(import.into());
        self
    }

    pub fn with_annotation(mut self, annotation: RawAnnotation) -> Self {
        self.annotations.push(Rc::new(annotation));
        self
    }

    /// Add a top-level declaration. Its origin is set to the file's.
    pub fn with_declaration(mut self, decl: RawDecl) -> Self {
        let decl = decl.with_origin_deep(self.origin);
        self.declarations.push(Rc::new(decl));
        self
    }

    /// Finish building.
    pub fn build(self) -> Rc<RawFile> {
        Rc::new(self)
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// A declaration of any kind.
#[derive(Debug, Clone)]
pub struct RawDecl {
    pub name: String,
    pub origin: Origin,
    pub span: Option<Span>,
    pub modifiers: BTreeSet<Modifier>,
    pub annotations: Vec<Rc<RawAnnotation>>,
    pub type_parameters: Vec<Rc<RawTypeParam>>,
    pub kind: RawDeclKind,
}

/// Variant-specific part of a declaration.
#[derive(Debug, Clone)]
pub enum RawDeclKind {
    Class {
        class_kind: ClassKind,
        super_types: Vec<Rc<RawTypeRef>>,
        members: Vec<Rc<RawDecl>>,
    },
    Function {
        receiver: Option<Rc<RawTypeRef>>,
        parameters: Vec<Rc<RawParam>>,
        return_type: Option<Rc<RawTypeRef>>,
        /// Declarations local to the body.
        locals: Vec<Rc<RawDecl>>,
    },
    Property {
        ty: Option<Rc<RawTypeRef>>,
        receiver: Option<Rc<RawTypeRef>>,
        mutable: bool,
    },
    TypeAlias {
        target: Rc<RawTypeRef>,
    },
}

impl RawDecl {
    fn with_kind(name: impl Into<String>, kind: RawDeclKind) -> Self {
        RawDecl {
            name: name.into(),
            origin: Origin::PrimarySource,
            span: None,
            modifiers: BTreeSet::new(),
            annotations: Vec::new(),
            type_parameters: Vec::new(),
            kind,
        }
    }

    pub fn class(name: impl Into<String>) -> Self {
        Self::class_of(name, ClassKind::Class)
    }

    pub fn class_of(name: impl Into<String>, class_kind: ClassKind) -> Self {
        Self::with_kind(
            name,
            RawDeclKind::Class {
                class_kind,
                super_types: Vec::new(),
                members: Vec::new(),
            },
        )
    }

    pub fn function(name: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            RawDeclKind::Function {
                receiver: None,
                parameters: Vec::new(),
                return_type: None,
                locals: Vec::new(),
            },
        )
    }

    pub fn property(name: impl Into<String>, ty: RawTypeRef) -> Self {
        Self::with_kind(
            name,
            RawDeclKind::Property {
                ty: Some(Rc::new(ty)),
                receiver: None,
                mutable: false,
            },
        )
    }

    pub fn type_alias(name: impl Into<String>, target: RawTypeRef) -> Self {
        Self::with_kind(
            name,
            RawDeclKind::TypeAlias {
                target: Rc::new(target),
            },
        )
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifiers.insert(modifier);
        self
    }

    pub fn with_annotation(mut self, annotation: RawAnnotation) -> Self {
        self.annotations.push(Rc::new(annotation));
        self
    }

    pub fn with_type_parameter(mut self, param: RawTypeParam) -> Self {
        self.type_parameters.push(Rc::new(param));
        self
    }

    /// Add a super type. No effect on non-classes.
    pub fn with_super_type(mut self, ty: RawTypeRef) -> Self {
        if let RawDeclKind::Class { super_types, .. } = &mut self.kind {
            super_types.push(Rc::new(ty));
        }
        self
    }

    /// Add a nested declaration: a member for classes, a local for functions.
    pub fn with_member(mut self, member: RawDecl) -> Self {
        let member = Rc::new(member.with_origin_deep(self.origin));
        match &mut self.kind {
            RawDeclKind::Class { members, .. } => members.push(member),
            RawDeclKind::Function { locals, .. } => locals.push(member),
            RawDeclKind::Property { .. } | RawDeclKind::TypeAlias { .. } => {}
        }
        self
    }

    pub fn with_parameter(mut self, param: RawParam) -> Self {
        if let RawDeclKind::Function { parameters, .. } = &mut self.kind {
            parameters.push(Rc::new(param));
        }
        self
    }

    pub fn with_return_type(mut self, ty: RawTypeRef) -> Self {
        if let RawDeclKind::Function { return_type, .. } = &mut self.kind {
            *return_type = Some(Rc::new(ty));
        }
        self
    }

    /// Set the extension receiver of a function or property.
    pub fn with_receiver(mut self, ty: RawTypeRef) -> Self {
        match &mut self.kind {
            RawDeclKind::Function { receiver, .. } | RawDeclKind::Property { receiver, .. } => {
                *receiver = Some(Rc::new(ty));
            }
            RawDeclKind::Class { .. } | RawDeclKind::TypeAlias { .. } => {}
        }
        self
    }

    pub fn mutable(mut self) -> Self {
        if let RawDeclKind::Property { mutable, .. } = &mut self.kind {
            *mutable = true;
        }
        self
    }

    /// Set the origin of this declaration and everything nested in it.
    ///
    /// Nested facts that are already shared elsewhere are copied.
    pub fn with_origin_deep(mut self, origin: Origin) -> Self {
        if self.origin == origin {
            return self;
        }
        self.origin = origin;
        let retag = |members: &mut [Rc<RawDecl>]| {
            for member in members.iter_mut() {
                let inner = (**member).clone().with_origin_deep(origin);
                *member = Rc::new(inner);
            }
        };
        match &mut self.kind {
            RawDeclKind::Class { members, .. } => retag(members),
            RawDeclKind::Function { locals, .. } => retag(locals),
            RawDeclKind::Property { .. } | RawDeclKind::TypeAlias { .. } => {}
        }
        self
    }

    /// True if the declaration is a class-like declaration.
    pub fn is_class(&self) -> bool {
        matches!(self.kind, RawDeclKind::Class { .. })
    }

    /// True if the declaration can be named as a type.
    pub fn is_classifier(&self) -> bool {
        matches!(
            self.kind,
            RawDeclKind::Class { .. } | RawDeclKind::TypeAlias { .. }
        )
    }

    /// Nested declarations: class members or function locals.
    pub fn nested(&self) -> &[Rc<RawDecl>] {
        match &self.kind {
            RawDeclKind::Class { members, .. } => members,
            RawDeclKind::Function { locals, .. } => locals,
            RawDeclKind::Property { .. } | RawDeclKind::TypeAlias { .. } => &[],
        }
    }

    pub fn build(self) -> Rc<RawDecl> {
        Rc::new(self)
    }
}

/// A compiled top-level declaration and the package it lives in.
#[derive(Debug, Clone)]
pub struct ClasspathEntry {
    pub package: String,
    pub declaration: Rc<RawDecl>,
}

impl ClasspathEntry {
    /// Wrap a declaration read from compiled metadata.
    pub fn new(package: impl Into<String>, declaration: RawDecl) -> Self {
        ClasspathEntry {
            package: package.into(),
            declaration: Rc::new(declaration.with_origin_deep(Origin::CompiledMetadata)),
        }
    }
}

// ============================================================================
// Type parameters and value parameters
// ============================================================================

#[derive(Debug, Clone)]
pub struct RawTypeParam {
    pub name: String,
    pub variance: Variance,
    pub reified: bool,
    pub bounds: Vec<Rc<RawTypeRef>>,
    pub span: Option<Span>,
}

impl RawTypeParam {
    pub fn new(name: impl Into<String>) -> Self {
        RawTypeParam {
            name: name.into(),
            variance: Variance::Invariant,
            reified: false,
            bounds: Vec::new(),
            span: None,
        }
    }

    pub fn with_bound(mut self, bound: RawTypeRef) -> Self {
        self.bounds.push(Rc::new(bound));
        self
    }

    pub fn with_variance(mut self, variance: Variance) -> Self {
        self.variance = variance;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RawParam {
    pub name: Option<String>,
    pub ty: Option<Rc<RawTypeRef>>,
    pub vararg: bool,
    pub has_default: bool,
    pub annotations: Vec<Rc<RawAnnotation>>,
    pub span: Option<Span>,
}

impl RawParam {
    pub fn new(name: impl Into<String>, ty: RawTypeRef) -> Self {
        RawParam {
            name: Some(name.into()),
            ty: Some(Rc::new(ty)),
            vararg: false,
            has_default: false,
            annotations: Vec::new(),
            span: None,
        }
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn with_annotation(mut self, annotation: RawAnnotation) -> Self {
        self.annotations.push(Rc::new(annotation));
        self
    }
}

// ============================================================================
// Type references
// ============================================================================

/// A type as written at a use site.
#[derive(Debug, Clone)]
pub struct RawTypeRef {
    pub element: RawElement,
    /// `Some(true)` for an explicit nullable marker, `Some(false)` for an
    /// explicit non-null marker, `None` when unmarked.
    pub nullable: Option<bool>,
    pub annotations: Vec<Rc<RawAnnotation>>,
    pub modifiers: BTreeSet<Modifier>,
    pub span: Option<Span>,
}

/// The referenced element of a type reference.
#[derive(Debug, Clone)]
pub enum RawElement {
    /// A named classifier, possibly qualified (`a.b.C`).
    Classifier {
        name: String,
        arguments: Vec<Rc<RawTypeArg>>,
    },
    /// A function type.
    Callable {
        receiver: Option<Rc<RawTypeRef>>,
        parameters: Vec<Rc<RawTypeRef>>,
        return_type: Rc<RawTypeRef>,
    },
    Dynamic,
    Parenthesized(Rc<RawTypeRef>),
}

impl RawTypeRef {
    fn of(element: RawElement) -> Self {
        RawTypeRef {
            element,
            nullable: None,
            annotations: Vec::new(),
            modifiers: BTreeSet::new(),
            span: None,
        }
    }

    /// Reference to a classifier by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::of(RawElement::Classifier {
            name: name.into(),
            arguments: Vec::new(),
        })
    }

    /// Function type `(params) -> ret`.
    pub fn callable(parameters: Vec<RawTypeRef>, return_type: RawTypeRef) -> Self {
        Self::of(RawElement::Callable {
            receiver: None,
            parameters: parameters.into_iter().map(Rc::new).collect(),
            return_type: Rc::new(return_type),
        })
    }

    pub fn dynamic() -> Self {
        Self::of(RawElement::Dynamic)
    }

    pub fn parenthesized(inner: RawTypeRef) -> Self {
        Self::of(RawElement::Parenthesized(Rc::new(inner)))
    }

    /// Add a type argument. No effect on non-classifier references.
    pub fn with_argument(mut self, argument: RawTypeArg) -> Self {
        if let RawElement::Classifier { arguments, .. } = &mut self.element {
            arguments.push(Rc::new(argument));
        }
        self
    }

    /// Add an invariant type argument.
    pub fn with_type_argument(self, ty: RawTypeRef) -> Self {
        self.with_argument(RawTypeArg::invariant(ty))
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = Some(true);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = Some(false);
        self
    }

    pub fn with_annotation(mut self, annotation: RawAnnotation) -> Self {
        self.annotations.push(Rc::new(annotation));
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

/// A type argument at a use site.
#[derive(Debug, Clone)]
pub struct RawTypeArg {
    pub variance: Variance,
    /// `None` for star projections.
    pub ty: Option<Rc<RawTypeRef>>,
}

impl RawTypeArg {
    pub fn invariant(ty: RawTypeRef) -> Self {
        RawTypeArg {
            variance: Variance::Invariant,
            ty: Some(Rc::new(ty)),
        }
    }

    pub fn with_variance(variance: Variance, ty: RawTypeRef) -> Self {
        RawTypeArg {
            variance,
            ty: Some(Rc::new(ty)),
        }
    }

    pub fn star() -> Self {
        RawTypeArg {
            variance: Variance::Star,
            ty: None,
        }
    }
}

// ============================================================================
// Annotations
// ============================================================================

#[derive(Debug, Clone)]
pub struct RawAnnotation {
    pub ty: Rc<RawTypeRef>,
    pub arguments: Vec<Rc<RawValueArg>>,
    pub span: Option<Span>,
}

impl RawAnnotation {
    /// Annotation usage of the named annotation class.
    pub fn new(name: impl Into<String>) -> Self {
        RawAnnotation {
            ty: Rc::new(RawTypeRef::named(name)),
            arguments: Vec::new(),
            span: None,
        }
    }

    pub fn with_argument(mut self, name: Option<&str>, value: ConstValue) -> Self {
        self.arguments.push(Rc::new(RawValueArg {
            name: name.map(str::to_string),
            value,
            span: None,
        }));
        self
    }

    /// The annotation name as written.
    pub fn written_name(&self) -> &str {
        match &self.ty.element {
            RawElement::Classifier { name, .. } => name,
            _ => "",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawValueArg {
    pub name: Option<String>,
    pub value: ConstValue,
    pub span: Option<Span>,
}

// ============================================================================
// RawFact
// ============================================================================

/// Entry point for materialization.
#[derive(Debug, Clone)]
pub enum RawFact {
    File(Rc<RawFile>),
    Declaration(Rc<RawDecl>),
}

impl From<Rc<RawFile>> for RawFact {
    fn from(file: Rc<RawFile>) -> Self {
        RawFact::File(file)
    }
}

impl From<Rc<RawDecl>> for RawFact {
    fn from(decl: Rc<RawDecl>) -> Self {
        RawFact::Declaration(decl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_builder_tags_declaration_origin() {
        let file = RawFile::foreign("src/Foo.java", "pkg")
            .with_declaration(RawDecl::class("Foo").with_member(RawDecl::function("bar")));
        let foo = &file.declarations[0];
        assert_eq!(foo.origin, Origin::ForeignSource);
        assert_eq!(foo.nested()[0].origin, Origin::ForeignSource);
    }

    #[test]
    fn classpath_entries_are_compiled() {
        let entry = ClasspathEntry::new("lib", RawDecl::class("Base"));
        assert_eq!(entry.declaration.origin, Origin::CompiledMetadata);
        assert!(!entry.declaration.origin.is_source());
    }

    #[test]
    fn builders_ignore_inapplicable_parts() {
        let prop = RawDecl::property("p", RawTypeRef::named("Int"))
            .with_super_type(RawTypeRef::named("Any"))
            .with_member(RawDecl::class("Nested"));
        assert!(prop.nested().is_empty());
        assert!(!prop.is_classifier());
    }

    #[test]
    fn annotation_written_name() {
        let annotation = RawAnnotation::new("com.example.Marker");
        assert_eq!(annotation.written_name(), "com.example.Marker");
    }

    #[test]
    fn location_path() {
        assert_eq!(Location::file("a.kt", Span::new(0, 1)).path(), Some("a.kt"));
        assert_eq!(Location::NonExistent.path(), None);
    }
}
