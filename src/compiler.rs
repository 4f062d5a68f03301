// The Compiler framework: Tree -> Instruction lowering combinators.
// Grounded in the teacher's `typechecker.rs::check_program`, which reduces
// a `Program`'s statements with a fallback default -- generalized from
// "reduce to a type" to "reduce to an optional Instruction".

use crate::analyzer::Query;
use crate::compilation::Compilation;
use crate::error::Error;
use crate::instruction::Instruction;
use crate::tree::NodeId;

pub trait Compiler {
    /// `root` is the top-level dispatcher a nested combinator (`Flatten`,
    /// `Fallback`) re-enters to compile sub-trees with the full Spec
    /// catalog rather than just its own narrow rule.
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error>;
}

/// Only invokes `inner` when `tree` matches `query`.
pub struct Filter<C, Q> {
    pub inner: C,
    pub query: Q,
}

impl<C: Compiler, Q: Query> Compiler for Filter<C, Q> {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        if self.query.matches(compilation, tree) {
            self.inner.compile(root, compilation, tree)
        } else {
            Ok(None)
        }
    }
}

/// Returns the first non-null result, in order -- the composition every
/// Spec's individual compilers are folded through by the Unit driver.
pub struct First(pub Vec<Box<dyn Compiler>>);

impl Compiler for First {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        for c in &self.0 {
            if let Some(i) = c.compile(root, compilation, tree)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }
}

/// Emits a `Block` of every non-null result.
pub struct Combine(pub Vec<Box<dyn Compiler>>);

impl Compiler for Combine {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let mut children = Vec::new();
        for c in &self.0 {
            if let Some(i) = c.compile(root, compilation, tree)? {
                children.push(i);
            }
        }
        if children.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Instruction::new(crate::instruction::Op::Block(children))))
        }
    }
}

/// Applies `inner` to each direct child of `tree` (not `tree` itself) and
/// returns their `Block` -- "compile the body with the outer dispatcher".
pub struct Flatten<C>(pub C);

impl<C: Compiler> Compiler for Flatten<C> {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let mut children = Vec::new();
        for child in compilation.tree().children(tree) {
            if let Some(i) = self.0.compile(root, compilation, child)? {
                children.push(i);
            }
        }
        Ok(Some(Instruction::new(crate::instruction::Op::Block(children))))
    }
}

/// Delegates to the root compiler -- re-enters the top-level dispatcher
/// from inside a nested `Flatten`/`First` chain.
pub struct Fallback;

impl Compiler for Fallback {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        root.compile(root, compilation, tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Is;
    use crate::instruction::Op;
    use crate::reference::{DocumentHandle, PseudoDocument, Reference};
    use crate::sketch::Sketch;
    use crate::value::Value;

    struct Number;
    impl Compiler for Number {
        fn compile(&self, _root: &dyn Compiler, _compilation: &Compilation, _tree: NodeId) -> Result<Option<Instruction>, Error> {
            Ok(Some(Instruction::new(Op::PushConst(Value::Number(1.0)))))
        }
    }

    fn compilation() -> Compilation {
        Compilation::new(DocumentHandle::new(PseudoDocument::new("t", "1")))
    }

    #[test]
    fn first_returns_first_non_null() {
        let c = compilation();
        let root = c.tree().root();
        let compiler = First(vec![Box::new(Filter { inner: Number, query: Is("nope") }), Box::new(Number)]);
        let result = compiler.compile(&compiler, &c, root).unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn combine_blocks_every_match() {
        let c = compilation();
        let root = c.tree().root();
        let compiler = Combine(vec![Box::new(Number), Box::new(Number)]);
        let result = compiler.compile(&compiler, &c, root).unwrap().unwrap();
        assert!(matches!(result.op, Op::Block(children) if children.len() == 2));
    }

    #[test]
    fn flatten_compiles_children_not_self() {
        let mut c = compilation();
        let root = c.tree().root();
        let document = c.document().clone();
        let child = c.tree_mut().create(document, Reference::new(0, 1), 0, Sketch::new("literal:number"));
        c.tree_mut().offer(root, child).unwrap();

        let compiler = Flatten(Number);
        let result = compiler.compile(&compiler, &c, root).unwrap().unwrap();
        assert!(matches!(result.op, Op::Block(children) if children.len() == 1));
    }
}
