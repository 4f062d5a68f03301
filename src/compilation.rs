// Compilation: one root Tree plus a back-reference to the Environment that
// owns it. Environment: the per-run map of Document -> Compilation, plus
// the shared Diagnostic sink. Iteration over compilations is stable
// (insertion order), matching the parent-chained `Env` lookup structure
// the rest of this crate borrows its shape from.

use std::collections::HashMap;

use crate::diagnostic::Diagnostics;
use crate::reference::DocumentHandle;
use crate::tree::Tree;

pub struct Compilation {
    document: DocumentHandle,
    tree: Tree,
}

impl Compilation {
    pub fn new(document: DocumentHandle) -> Compilation {
        let tree = Tree::new(document.clone());
        Compilation { document, tree }
    }

    pub fn document(&self) -> &DocumentHandle {
        &self.document
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }
}

/// The process-wide handle: one per Unit, created at the start of a run
/// and dropped at the end. Holds every Compilation plus the diagnostic
/// sink they all report into.
pub struct Environment {
    order: Vec<DocumentHandle>,
    compilations: HashMap<DocumentHandle, Compilation>,
    diagnostics: Diagnostics,
}

impl Environment {
    pub fn new() -> Environment {
        Environment { order: Vec::new(), compilations: HashMap::new(), diagnostics: Diagnostics::new() }
    }

    /// Register a document, creating its Compilation if this is the first
    /// time it's seen. Returns the (possibly newly created) compilation.
    pub fn open(&mut self, document: DocumentHandle) -> &mut Compilation {
        if !self.compilations.contains_key(&document) {
            self.order.push(document.clone());
            self.compilations.insert(document.clone(), Compilation::new(document.clone()));
        }
        self.compilations.get_mut(&document).expect("just inserted")
    }

    pub fn get(&self, document: &DocumentHandle) -> Option<&Compilation> {
        self.compilations.get(document)
    }

    pub fn get_mut(&mut self, document: &DocumentHandle) -> Option<&mut Compilation> {
        self.compilations.get_mut(document)
    }

    /// All compilations, in the stable order they were first opened in.
    pub fn compilations(&self) -> impl Iterator<Item = &Compilation> {
        self.order.iter().filter_map(move |d| self.compilations.get(d))
    }

    pub fn documents(&self) -> &[DocumentHandle] {
        &self.order
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }
}

impl Default for Environment {
    fn default() -> Environment {
        Environment::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::PseudoDocument;

    #[test]
    fn open_is_idempotent_and_stable_ordered() {
        let mut env = Environment::new();
        let a = DocumentHandle::new(PseudoDocument::new("a", "x"));
        let b = DocumentHandle::new(PseudoDocument::new("b", "y"));
        env.open(a.clone());
        env.open(b.clone());
        env.open(a.clone());

        let names: Vec<_> = env.compilations().map(|c| c.document().name().to_string()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
