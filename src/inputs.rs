//! The inputs of one module build.
//!
//! Source files arrive from the backends as raw facts; generated files are
//! added between rounds. A fresh [`SymbolIndex`] is built from the current
//! set at the start of every cache generation.

use std::collections::BTreeSet;
use std::rc::Rc;

use symproc_core::index::SymbolIndex;
use symproc_core::raw::{ClasspathEntry, RawFile};

/// Source files, compiled classpath and default imports.
#[derive(Debug, Clone, Default)]
pub struct InputSet {
    files: Vec<Rc<RawFile>>,
    classpath: Vec<ClasspathEntry>,
    default_imports: Vec<String>,
}

impl InputSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, file: Rc<RawFile>) -> Self {
        self.add_file(file);
        self
    }

    pub fn with_files(mut self, files: impl IntoIterator<Item = Rc<RawFile>>) -> Self {
        for file in files {
            self.add_file(file);
        }
        self
    }

    pub fn with_classpath(mut self, entry: ClasspathEntry) -> Self {
        self.classpath.push(entry);
        self
    }

    /// Packages star-imported into every file.
    pub fn with_default_imports(
        mut self,
        packages: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.default_imports = packages.into_iter().map(Into::into).collect();
        self
    }

    /// Add a file, replacing any file with the same path. Returns `true`
    /// if the path was new.
    pub fn add_file(&mut self, file: Rc<RawFile>) -> bool {
        match self.files.iter_mut().find(|f| f.path == file.path) {
            Some(existing) => {
                *existing = file;
                false
            }
            None => {
                self.files.push(file);
                true
            }
        }
    }

    /// Drop the file at `path`.
    pub fn remove_file(&mut self, path: &str) -> Option<Rc<RawFile>> {
        let position = self.files.iter().position(|f| f.path == path)?;
        Some(self.files.remove(position))
    }

    pub fn files(&self) -> &[Rc<RawFile>] {
        &self.files
    }

    pub fn file(&self, path: &str) -> Option<&Rc<RawFile>> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.file(path).is_some()
    }

    pub fn paths(&self) -> BTreeSet<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    pub fn classpath(&self) -> &[ClasspathEntry] {
        &self.classpath
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Index over the current inputs.
    pub fn index(&self) -> SymbolIndex {
        SymbolIndex::build(self.files.iter().cloned(), self.classpath.clone())
            .with_default_imports(self.default_imports.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symproc_core::raw::RawDecl;

    #[test]
    fn add_replaces_same_path() {
        let mut inputs = InputSet::new().with_file(RawFile::new("a.kt", "p").build());
        let replacement = RawFile::new("a.kt", "p")
            .with_declaration(RawDecl::class("A"))
            .build();
        assert!(!inputs.add_file(Rc::clone(&replacement)));
        assert_eq!(inputs.len(), 1);
        assert!(Rc::ptr_eq(inputs.file("a.kt").unwrap(), &replacement));
        assert!(inputs.add_file(RawFile::new("b.kt", "p").build()));
        assert_eq!(inputs.paths().into_iter().collect::<Vec<_>>(), vec!["a.kt", "b.kt"]);
    }

    #[test]
    fn index_sees_files_and_classpath() {
        let inputs = InputSet::new()
            .with_file(
                RawFile::new("a.kt", "p")
                    .with_declaration(RawDecl::class("A"))
                    .build(),
            )
            .with_classpath(ClasspathEntry::new("lib", RawDecl::class("Base")));
        let index = inputs.index();
        assert!(index.classifier("p.A").is_some());
        assert!(index.classifier("lib.Base").is_some());
    }

    #[test]
    fn remove_file() {
        let mut inputs = InputSet::new().with_file(RawFile::new("a.kt", "p").build());
        assert!(inputs.remove_file("a.kt").is_some());
        assert!(inputs.remove_file("a.kt").is_none());
        assert!(inputs.is_empty());
    }
}
