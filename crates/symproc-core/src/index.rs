//! Symbol index and classifier name resolution.
//!
//! A [`SymbolIndex`] is built from the current input files and the compiled
//! classpath. It answers structural questions the session cannot answer from
//! a raw declaration alone (who owns it, what its qualified name is) and
//! implements [`TypeResolver`], the name-resolution service used when a type
//! reference is resolved.
//!
//! The index is immutable. A new one is built for every cache generation.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::error::LookupResult;
use crate::identity::IdKey;
use crate::lookup::{LookupTracker, ScopeKind};
use crate::raw::{ClasspathEntry, RawDecl, RawDeclKind, RawFile};

// ============================================================================
// Resolution interface
// ============================================================================

/// Where a classifier name is being resolved.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionSite<'a> {
    /// Source file containing the reference; `None` for compiled code.
    pub file: Option<&'a RawFile>,
    /// Package of the reference.
    pub package: &'a str,
    /// Qualified names of enclosing classifiers, innermost first.
    pub enclosing: &'a [String],
}

/// Binds classifier names to declarations.
///
/// Implementations record every scope they search on `tracker` when the site
/// has a source file, so that a later change in any of those scopes
/// invalidates the file.
pub trait TypeResolver {
    fn resolve_classifier(
        &self,
        name: &str,
        site: &ResolutionSite<'_>,
        tracker: &mut dyn LookupTracker,
    ) -> LookupResult<Option<Rc<RawDecl>>>;
}

// ============================================================================
// SymbolIndex
// ============================================================================

/// Owner of a declaration.
#[derive(Debug, Clone)]
pub enum Owner {
    File(Rc<RawFile>),
    Declaration(Rc<RawDecl>),
    /// Top-level compiled declaration.
    Package(String),
}

/// Index over all known declarations.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    files: Vec<Rc<RawFile>>,
    by_path: HashMap<String, Rc<RawFile>>,
    classpath: Vec<ClasspathEntry>,
    /// Named declarations by qualified name, in insertion order.
    by_name: HashMap<String, Vec<Rc<RawDecl>>>,
    owners: HashMap<IdKey<RawDecl>, Owner>,
    qualified: HashMap<IdKey<RawDecl>, String>,
    package_of: HashMap<IdKey<RawDecl>, String>,
    /// Top-level declarations by package, sorted by package name.
    packages: BTreeMap<String, Vec<Rc<RawDecl>>>,
    default_imports: Vec<String>,
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}

impl SymbolIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the given files and compiled declarations.
    pub fn build(
        files: impl IntoIterator<Item = Rc<RawFile>>,
        classpath: Vec<ClasspathEntry>,
    ) -> Self {
        let mut index = SymbolIndex::new();
        for entry in &classpath {
            let decl = &entry.declaration;
            index.add_top_level(decl, Owner::Package(entry.package.clone()), &entry.package);
        }
        index.classpath = classpath;
        for file in files {
            index.add_file(file);
        }
        index
    }

    /// Star-imported packages applied to every file (e.g. a language prelude).
    pub fn with_default_imports(
        mut self,
        packages: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.default_imports = packages.into_iter().map(Into::into).collect();
        self
    }

    fn add_file(&mut self, file: Rc<RawFile>) {
        for decl in &file.declarations {
            self.add_top_level(decl, Owner::File(Rc::clone(&file)), &file.package);
        }
        self.by_path.insert(file.path.clone(), Rc::clone(&file));
        self.files.push(file);
    }

    fn add_top_level(&mut self, decl: &Rc<RawDecl>, owner: Owner, package: &str) {
        self.packages
            .entry(package.to_string())
            .or_default()
            .push(Rc::clone(decl));
        self.add_declaration(decl, owner, package, Some(qualify(package, &decl.name)));
    }

    fn add_declaration(
        &mut self,
        decl: &Rc<RawDecl>,
        owner: Owner,
        package: &str,
        qualified: Option<String>,
    ) {
        let key = IdKey::new(decl);
        self.owners.insert(key.clone(), owner);
        self.package_of.insert(key.clone(), package.to_string());
        if let Some(name) = &qualified {
            self.by_name
                .entry(name.clone())
                .or_default()
                .push(Rc::clone(decl));
            self.qualified.insert(key, name.clone());
        }

        // Class members are named through the class; function locals have no
        // qualified name.
        let member_scope = match &decl.kind {
            RawDeclKind::Class { .. } => qualified,
            _ => None,
        };
        for nested in decl.nested() {
            let nested_name = member_scope.as_deref().map(|scope| qualify(scope, &nested.name));
            self.add_declaration(nested, Owner::Declaration(Rc::clone(decl)), package, nested_name);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Indexed source files, in input order.
    pub fn files(&self) -> &[Rc<RawFile>] {
        &self.files
    }

    /// Source file by path.
    pub fn file(&self, path: &str) -> Option<&Rc<RawFile>> {
        self.by_path.get(path)
    }

    /// Compiled classpath entries.
    pub fn classpath(&self) -> &[ClasspathEntry] {
        &self.classpath
    }

    /// Classifier (class or type alias) by qualified name.
    pub fn classifier(&self, fqn: &str) -> Option<&Rc<RawDecl>> {
        self.by_name
            .get(fqn)
            .and_then(|decls| decls.iter().find(|d| d.is_classifier()))
    }

    /// Every declaration with the given qualified name.
    pub fn declarations_named(&self, fqn: &str) -> &[Rc<RawDecl>] {
        self.by_name.get(fqn).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Owner of an indexed declaration.
    pub fn owner_of(&self, decl: &Rc<RawDecl>) -> Option<&Owner> {
        self.owners.get(&IdKey::new(decl))
    }

    /// Qualified name of an indexed declaration (none for locals).
    pub fn qualified_name_of(&self, decl: &Rc<RawDecl>) -> Option<&str> {
        self.qualified.get(&IdKey::new(decl)).map(String::as_str)
    }

    /// Package of an indexed declaration.
    pub fn package_of(&self, decl: &Rc<RawDecl>) -> Option<&str> {
        self.package_of.get(&IdKey::new(decl)).map(String::as_str)
    }

    /// True if `decl` is part of this index.
    pub fn contains(&self, decl: &Rc<RawDecl>) -> bool {
        self.owners.contains_key(&IdKey::new(decl))
    }

    /// Top-level declarations of a package, sources and classpath alike.
    pub fn declarations_in_package(&self, package: &str) -> &[Rc<RawDecl>] {
        self.packages.get(package).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Known package names, sorted.
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    fn scope_kind(&self, scope: &str) -> ScopeKind {
        if self.classifier(scope).is_some() {
            ScopeKind::Classifier
        } else {
            ScopeKind::Package
        }
    }
}

impl TypeResolver for SymbolIndex {
    /// Search order for a simple name: enclosing classifiers, explicit
    /// imports, the site's package, star imports, default imports. A dotted
    /// name is tried as written, then relative to the site's package, then
    /// relative to an explicit import of its first segment.
    fn resolve_classifier(
        &self,
        name: &str,
        site: &ResolutionSite<'_>,
        tracker: &mut dyn LookupTracker,
    ) -> LookupResult<Option<Rc<RawDecl>>> {
        let mut candidates: Vec<String> = Vec::new();
        let imports: &[String] = site.file.map(|f| f.imports.as_slice()).unwrap_or(&[]);

        if let Some((first, rest)) = name.split_once('.') {
            candidates.push(name.to_string());
            if !site.package.is_empty() {
                candidates.push(qualify(site.package, name));
            }
            for import in imports {
                if import.rsplit_once('.').map(|(_, last)| last) == Some(first) {
                    candidates.push(qualify(import, rest));
                }
            }
        } else {
            for scope in site.enclosing {
                candidates.push(qualify(scope, name));
            }
            for import in imports {
                if !import.ends_with(".*")
                    && import.rsplit_once('.').map(|(_, last)| last) == Some(name)
                {
                    candidates.push(import.clone());
                }
            }
            candidates.push(qualify(site.package, name));
            for import in imports {
                if let Some(package) = import.strip_suffix(".*") {
                    candidates.push(qualify(package, name));
                }
            }
            for package in &self.default_imports {
                candidates.push(qualify(package, name));
            }
        }

        for candidate in &candidates {
            if let Some(file) = site.file {
                let (scope, simple) =
                    candidate.rsplit_once('.').unwrap_or(("", candidate.as_str()));
                tracker.record(&file.path, scope, self.scope_kind(scope), simple)?;
            }
            if let Some(decl) = self.classifier(candidate) {
                return Ok(Some(Rc::clone(decl)));
            }
        }
        Ok(None)
    }
}
