// Spec composition: a Spec optionally contributes a Parser/Analyzer/
// Compiler for its pipeline phase, plus an ordered list of sub-specs. A
// parent Spec's effective Parser (etc.) is the ordered-fallback
// composition of its own with each sub-spec's -- the same
// fold-with-children shape `typechecker.rs::check_program` uses to
// combine per-statement results, generalized from folding `TypeTag`s to
// folding pipeline contributions.

use crate::analyzer::Analyzer;
use crate::compilation::Compilation;
use crate::compiler::Compiler;
use crate::error::Error;
use crate::parser::{Offer, Parser};
use crate::tree::NodeId;

/// Runs before/after a pipeline action fires, per §4.7's `PRE_*`/`POST_*`
/// event contract.
pub trait Processor {
    fn process(&self, compilation: &mut Compilation, tree: NodeId) -> Result<bool, Error>;
}

#[derive(Default)]
pub struct Spec {
    name: String,
    parsers: Vec<Box<dyn Parser>>,
    analyzers: Vec<Box<dyn Analyzer>>,
    pre_analyze: Vec<Box<dyn Processor>>,
    pre_compile: Vec<Box<dyn Processor>>,
    sub_specs: Vec<Spec>,
    compiler: Option<Box<dyn Compiler>>,
}

impl Spec {
    pub fn new(name: impl Into<String>) -> Spec {
        Spec { name: name.into(), ..Spec::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_parser(mut self, parser: impl Parser + 'static) -> Spec {
        self.parsers.push(Box::new(parser));
        self
    }

    /// A leaf Spec's own compiler contribution, tried before its
    /// sub-specs. Without this, a Spec with no children could never
    /// compile anything -- `impl Compiler for Spec` would have nowhere to
    /// look.
    pub fn with_compiler(mut self, compiler: impl Compiler + 'static) -> Spec {
        self.compiler = Some(Box::new(compiler));
        self
    }

    pub fn with_analyzer(mut self, analyzer: impl Analyzer + 'static) -> Spec {
        self.analyzers.push(Box::new(analyzer));
        self
    }

    pub fn with_pre_analyze(mut self, processor: impl Processor + 'static) -> Spec {
        self.pre_analyze.push(Box::new(processor));
        self
    }

    pub fn with_pre_compile(mut self, processor: impl Processor + 'static) -> Spec {
        self.pre_compile.push(Box::new(processor));
        self
    }

    pub fn with_sub_spec(mut self, spec: Spec) -> Spec {
        self.sub_specs.push(spec);
        self
    }

    /// Ordered-fallback parse: each of this Spec's own parsers runs, then
    /// each sub-spec's effective parser, in declared order; everything
    /// that fires in one round is collected (the driver re-runs the whole
    /// tree until a round produces nothing).
    pub fn parse(&self, compilation: &Compilation, tree: NodeId) -> Result<Vec<Offer>, Error> {
        let mut offers = Vec::new();
        for parser in &self.parsers {
            offers.extend(parser.parse(compilation, tree)?);
        }
        for sub in &self.sub_specs {
            offers.extend(sub.parse(compilation, tree)?);
        }
        Ok(offers)
    }

    pub fn analyze(&self, compilation: &mut Compilation, tree: NodeId) -> Result<bool, Error> {
        let mut changed = false;
        for analyzer in &self.analyzers {
            changed |= analyzer.analyze(compilation, tree)?;
        }
        for sub in &self.sub_specs {
            changed |= sub.analyze(compilation, tree)?;
        }
        Ok(changed)
    }

    pub fn run_pre_analyze(&self, compilation: &mut Compilation, tree: NodeId) -> Result<bool, Error> {
        let mut changed = false;
        for p in &self.pre_analyze {
            changed |= p.process(compilation, tree)?;
        }
        for sub in &self.sub_specs {
            changed |= sub.run_pre_analyze(compilation, tree)?;
        }
        Ok(changed)
    }

    pub fn run_pre_compile(&self, compilation: &mut Compilation, tree: NodeId) -> Result<bool, Error> {
        let mut changed = false;
        for p in &self.pre_compile {
            changed |= p.process(compilation, tree)?;
        }
        for sub in &self.sub_specs {
            changed |= sub.run_pre_compile(compilation, tree)?;
        }
        Ok(changed)
    }
}

impl Compiler for Spec {
    /// Try this Spec's own compiler first, then each sub-spec in order; a
    /// bare Spec with neither just walks into its sub-specs and finds
    /// nothing.
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<crate::instruction::Instruction>, Error> {
        if let Some(c) = &self.compiler {
            if let Some(i) = c.compile(root, compilation, tree)? {
                return Ok(Some(i));
            }
        }
        for sub in &self.sub_specs {
            if let Some(i) = sub.compile(root, compilation, tree)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Term;
    use crate::reference::{DocumentHandle, PseudoDocument};
    use regex::Regex;

    #[test]
    fn sub_spec_parsers_are_visited() {
        let spec = Spec::new("root").with_sub_spec(Spec::new("numbers").with_parser(Term::new(Regex::new(r"\d+").unwrap(), 0, "literal:number")));
        let c = Compilation::new(DocumentHandle::new(PseudoDocument::new("t", "42")));
        let offers = spec.parse(&c, c.tree().root()).unwrap();
        assert_eq!(offers.len(), 1);
    }
}
