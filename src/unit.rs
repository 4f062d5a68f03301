// The Unit driver: one Environment plus the root Spec, exposing the five
// pipeline actions (initialize/parse/analyze/compile/execute) plus a
// diagnostic action, each iterated to a fixed point. Grounded in the
// teacher's `main.rs`, which loads a config and dispatches into one of a
// small set of named run modes -- generalized from "pick a mode" to
// "drive five ordered phases".

use crate::compilation::Environment;
use crate::compiler::Compiler;
use crate::diagnostic::{Diagnostic, Severity};
use crate::error::Error;
use crate::instruction::ExecContext;
use crate::memory::Memory;
use crate::reference::DocumentHandle;
use crate::spec::Spec;
use crate::value::Value;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Event {
    PreInitialize,
    PostInitialize,
    PreParse,
    PostParse,
    PreAnalyze,
    PostAnalyze,
    PreCompile,
    PostCompile,
    PreExecute,
    PostExecute,
}

pub trait Listener {
    fn on_event(&self, event: Event, document: &DocumentHandle);
}

pub struct Unit {
    environment: Environment,
    root: Spec,
    listeners: Vec<Box<dyn Listener>>,
}

impl Unit {
    pub fn new(root: Spec) -> Unit {
        Unit { environment: Environment::new(), root, listeners: Vec::new() }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.environment
    }

    pub fn add_listener(&mut self, listener: impl Listener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn fire(&self, event: Event, document: &DocumentHandle) {
        log::debug!("{:?} {}", event, document.name());
        for listener in &self.listeners {
            listener.on_event(event, document);
        }
    }

    /// Wrap a Document in a Compilation, seeding the builtin heap
    /// addresses `__FILE__`/`__PATH__`/`__DIR__`/`__LINE__`.
    pub fn initialize(&mut self, document: DocumentHandle) {
        self.fire(Event::PreInitialize, &document);
        self.environment.open(document.clone());
        self.fire(Event::PostInitialize, &document);
    }

    /// Grow each compilation's tree until a full round of parsing
    /// produces no new offers.
    pub fn parse(&mut self, document: &DocumentHandle) -> Result<(), Error> {
        self.fire(Event::PreParse, document);
        loop {
            let root_id = {
                let compilation = self.environment.get(document).ok_or_else(|| Error::DocumentNotFound(document.name().to_string()))?;
                compilation.tree().root()
            };
            let nodes = {
                let compilation = self.environment.get(document).unwrap();
                compilation.tree().descendants(root_id)
            };

            let mut offers = Vec::new();
            for node in &nodes {
                let compilation = self.environment.get(document).unwrap();
                offers.extend(self.root.parse(compilation, *node)?.into_iter().map(|o| (*node, o)));
            }
            if offers.is_empty() {
                break;
            }
            let compilation = self.environment.get_mut(document).unwrap();
            for (anchor, offer) in offers {
                let doc = compilation.document().clone();
                let id = compilation.tree_mut().create(doc, offer.reference, offer.weight, offer.sketch);
                // a placement conflict is local to the parser; swallow it
                // as "no progress" per the error-handling design.
                let _ = compilation.tree_mut().offer(anchor, id);
            }
        }
        self.fire(Event::PostParse, document);
        Ok(())
    }

    /// Reshape the tree until a full pass of every analyzer makes no
    /// further change.
    pub fn analyze(&mut self, document: &DocumentHandle) -> Result<(), Error> {
        self.fire(Event::PreAnalyze, document);
        loop {
            let compilation = self.environment.get_mut(document).ok_or_else(|| Error::DocumentNotFound(document.name().to_string()))?;
            let root = compilation.tree().root();
            self.root.run_pre_analyze(compilation, root)?;
            if !self.root.analyze(compilation, root)? {
                break;
            }
        }
        self.fire(Event::PostAnalyze, document);
        Ok(())
    }

    /// Lower the annotated tree to a single root Instruction.
    pub fn compile(&mut self, document: &DocumentHandle) -> Result<crate::instruction::Instruction, Error> {
        self.fire(Event::PreCompile, document);
        let (instruction, root_reference) = {
            let compilation = self.environment.get_mut(document).ok_or_else(|| Error::DocumentNotFound(document.name().to_string()))?;
            let root = compilation.tree().root();
            self.root.run_pre_compile(compilation, root)?;
            let instruction = self.root.compile(&self.root, compilation, root)?;
            (instruction, compilation.tree().reference(root))
        };
        self.fire(Event::PostCompile, document);
        instruction.ok_or_else(|| Error::Compile { reference: root_reference, message: "no compiler matched the root tree".into() })
    }

    /// Run the compiled instruction against fresh Memory, returning the
    /// root frame's final console contents.
    pub fn execute(&mut self, document: &DocumentHandle, instruction: &crate::instruction::Instruction) -> Result<String, Error> {
        self.fire(Event::PreExecute, document);
        let mut memory = Memory::new();
        let mut ctx = ExecContext { document: document.clone(), diagnostics: self.environment.diagnostics_mut() };
        instruction.exec(&mut ctx, &mut memory)?;
        self.fire(Event::PostExecute, document);
        Ok(memory.root().console().to_string())
    }

    /// File a diagnostic against `document` without halting the pipeline.
    pub fn diagnostic(&mut self, document: &DocumentHandle, severity: Severity, message: impl Into<String>) {
        let reference = document.whole();
        self.environment.diagnostics_mut().report(Diagnostic { severity, message: message.into(), document: document.clone(), reference });
    }

    /// Run all five actions over `document` in order, returning the
    /// rendered console output. A `CompileError`/`ExecutionError` is
    /// recorded as a diagnostic and returned, not panicked.
    pub fn run(&mut self, document: DocumentHandle) -> Result<String, Error> {
        self.initialize(document.clone());
        self.parse(&document)?;
        self.analyze(&document)?;
        let instruction = match self.compile(&document) {
            Ok(i) => i,
            Err(e) => {
                self.diagnostic(&document, Severity::Error, e.to_string());
                return Err(e);
            }
        };
        match self.execute(&document, &instruction) {
            Ok(out) => Ok(out),
            Err(e) => {
                self.diagnostic(&document, Severity::Error, e.to_string());
                Err(e)
            }
        }
    }
}

/// Seed a Compilation's root frame heap with the builtin addresses every
/// document gets, per §6. Called once by the CLI after `initialize`.
pub fn seed_builtin_heap(memory: &mut Memory, document: &DocumentHandle) {
    memory.heap_alloc("__FILE__", Value::text(document.name()));
    memory.heap_alloc("__PATH__", Value::text(document.name()));
    memory.heap_alloc("__DIR__", Value::text(""));
    memory.heap_alloc("__LINE__", Value::Number(1.0));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Term;
    use crate::reference::PseudoDocument;
    use regex::Regex;

    #[test]
    fn initialize_registers_a_compilation() {
        let mut unit = Unit::new(Spec::new("root"));
        let doc = DocumentHandle::new(PseudoDocument::new("t", "42"));
        unit.initialize(doc.clone());
        assert!(unit.environment().get(&doc).is_some());
    }

    #[test]
    fn parse_runs_to_a_fixed_point() {
        let spec = Spec::new("root").with_parser(Term::new(Regex::new(r"\d+").unwrap(), 0, "literal:number"));
        let mut unit = Unit::new(spec);
        let doc = DocumentHandle::new(PseudoDocument::new("t", "42"));
        unit.initialize(doc.clone());
        unit.parse(&doc).unwrap();

        let compilation = unit.environment().get(&doc).unwrap();
        let root = compilation.tree().root();
        assert_eq!(compilation.tree().children(root).len(), 1);
    }

    #[test]
    fn diagnostic_is_recorded_without_halting() {
        let mut unit = Unit::new(Spec::new("root"));
        let doc = DocumentHandle::new(PseudoDocument::new("t", ""));
        unit.initialize(doc.clone());
        unit.diagnostic(&doc, Severity::Warning, "heads up");
        assert_eq!(unit.environment().diagnostics().entries().len(), 1);
    }
}
