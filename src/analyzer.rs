// The Analyzer framework: tree-shape transformers that mutate an existing
// Tree in place and report whether they changed anything. The driver
// (unit.rs) loops every Analyzer to a fixed point. Grounded in the
// teacher's `typechecker.rs`, whose `eval_expr` dispatches one method per
// `Expr` variant and folds a `Program`'s statements into a single pass --
// generalized here from type inference to tree reshaping.

use crate::compilation::Compilation;
use crate::error::Error;
use crate::reference::Reference;
use crate::sketch::{Sketch, SketchRef};
use crate::tree::NodeId;

pub trait Analyzer {
    /// Mutate `tree` (and/or offer new trees into `compilation`), return
    /// whether anything changed.
    fn analyze(&self, compilation: &mut Compilation, tree: NodeId) -> Result<bool, Error>;
}

/// A predicate over a tree node's sketch, composable with `and`/`or`/`not`.
pub trait Query {
    fn matches(&self, compilation: &Compilation, tree: NodeId) -> bool;
}

pub struct Is(pub &'static str);

impl Query for Is {
    fn matches(&self, compilation: &Compilation, tree: NodeId) -> bool {
        compilation.tree().sketch(tree).borrow().kind() == self.0
    }
}

pub struct ParentIs<Q>(pub Q);

impl<Q: Query> Query for ParentIs<Q> {
    fn matches(&self, compilation: &Compilation, tree: NodeId) -> bool {
        match compilation.tree().parent(tree) {
            Some(p) => self.0.matches(compilation, p),
            None => false,
        }
    }
}

pub struct And<A, B>(pub A, pub B);

impl<A: Query, B: Query> Query for And<A, B> {
    fn matches(&self, compilation: &Compilation, tree: NodeId) -> bool {
        self.0.matches(compilation, tree) && self.1.matches(compilation, tree)
    }
}

pub struct Or<A, B>(pub A, pub B);

impl<A: Query, B: Query> Query for Or<A, B> {
    fn matches(&self, compilation: &Compilation, tree: NodeId) -> bool {
        self.0.matches(compilation, tree) || self.1.matches(compilation, tree)
    }
}

pub struct Not<A>(pub A);

impl<A: Query> Query for Not<A> {
    fn matches(&self, compilation: &Compilation, tree: NodeId) -> bool {
        !self.0.matches(compilation, tree)
    }
}

/// Applies `inner` to `tree` and every descendant, depth-first.
pub struct Hierarchy<A>(pub A);

impl<A: Analyzer> Analyzer for Hierarchy<A> {
    fn analyze(&self, compilation: &mut Compilation, tree: NodeId) -> Result<bool, Error> {
        let mut changed = false;
        for node in compilation.tree().descendants(tree) {
            changed |= self.0.analyze(compilation, node)?;
        }
        Ok(changed)
    }
}

/// Applies `inner` to direct children of `tree` only.
pub struct Children<A>(pub A);

impl<A: Analyzer> Analyzer for Children<A> {
    fn analyze(&self, compilation: &mut Compilation, tree: NodeId) -> Result<bool, Error> {
        let mut changed = false;
        for child in compilation.tree().children(tree) {
            changed |= self.0.analyze(compilation, child)?;
        }
        Ok(changed)
    }
}

/// Gates invocation of `inner` with `query`.
pub struct Filter<A, Q> {
    pub inner: A,
    pub query: Q,
}

impl<A: Analyzer, Q: Query> Analyzer for Filter<A, Q> {
    fn analyze(&self, compilation: &mut Compilation, tree: NodeId) -> Result<bool, Error> {
        if self.query.matches(compilation, tree) {
            self.inner.analyze(compilation, tree)
        } else {
            Ok(false)
        }
    }
}

/// Given a symbol tree with both `previous` and `next` siblings, wrap a
/// new tree spanning from the head of `previous` to the tail of `next`,
/// offer it, and annotate `operator`/`left`/`right` sub-sketches.
/// Left-associativity falls out of running this to a fixed point: each
/// pass wraps the leftmost eligible symbol first, since the driver visits
/// siblings left-to-right and a wrapped operator stops being "a symbol
/// with two plain siblings" for the next pass.
pub struct BinaryOperator {
    pub kind: String,
}

impl Analyzer for BinaryOperator {
    fn analyze(&self, compilation: &mut Compilation, tree: NodeId) -> Result<bool, Error> {
        let t = compilation.tree();
        let (Some(prev), Some(next)) = (t.previous(tree), t.next(tree)) else {
            return Ok(false);
        };
        let document = t.document(tree).clone();
        let span = Reference::new(t.reference(prev).position(), t.reference(next).end() - t.reference(prev).position());

        let sketch = Sketch::new(self.kind.clone());
        let op_sketch = Sketch::new("operator");
        Sketch::put_child(&sketch, "operator", op_sketch);
        let left_sketch = Sketch::new("left");
        Sketch::put_child(&sketch, "left", left_sketch);
        let right_sketch = Sketch::new("right");
        Sketch::put_child(&sketch, "right", right_sketch);

        let weight = t.weight(tree);
        let wrapper = compilation.tree_mut().create(document, span, weight, sketch);
        compilation.tree_mut().offer(tree, wrapper)?;
        Ok(true)
    }
}

/// Given a tree of kind `start_kind`, scan forward across its siblings for
/// the nearest balanced `end_kind` -- tracking nested `start_kind`/
/// `end_kind` pairs by depth, exactly like `DoublePattern`'s well-nested
/// open/close matching, so a `#for ... #for ... #endfor ... #endfor` pair
/// resolves from the inside out. Wraps the whole span (start through end)
/// with `start`/`end`/`body` sub-sketches; the body's actual content --
/// whatever already-parsed siblings sat between start and end, including
/// any header-parameter tokens right after start -- becomes the wrapper's
/// children automatically, via the tree's own CONTAIN takeover.
pub struct BinaryFlow {
    pub start_kind: &'static str,
    pub end_kind: &'static str,
    pub wrapper_kind: String,
}

impl Analyzer for BinaryFlow {
    fn analyze(&self, compilation: &mut Compilation, tree: NodeId) -> Result<bool, Error> {
        let t = compilation.tree();
        if t.sketch(tree).borrow().kind() != self.start_kind {
            return Ok(false);
        }
        let mut depth = 0u32;
        let mut cursor = tree;
        let end = loop {
            let Some(next) = t.next(cursor) else { return Ok(false) };
            let kind = t.sketch(next).borrow().kind().to_string();
            if kind == self.end_kind {
                if depth == 0 {
                    break next;
                }
                depth -= 1;
            } else if kind == self.start_kind {
                depth += 1;
            }
            cursor = next;
        };

        let document = t.document(tree).clone();
        let start_ref = t.reference(tree);
        let end_ref = t.reference(end);
        let span = Reference::new(start_ref.position(), end_ref.end() - start_ref.position());

        let sketch = Sketch::new(self.wrapper_kind.clone());
        Sketch::put_child(&sketch, "start", Sketch::new("start"));
        Sketch::put_child(&sketch, "end", Sketch::new("end"));
        Sketch::put_child(&sketch, "body", Sketch::new("body"));

        let weight = t.weight(tree);
        let wrapper = compilation.tree_mut().create(document, span, weight, sketch);
        compilation.tree_mut().offer(tree, wrapper)?;
        Ok(true)
    }
}

/// Given a prefix symbol with a `next` sibling, wrap a new tree spanning
/// the symbol and its operand, annotated with `operator`/`operand`
/// sub-sketches. Skips when `next` is itself an unreduced occurrence of
/// the same symbol kind, so a chain (`!!!false`) folds innermost-first
/// across repeated fixed-point passes instead of grabbing a sibling `!`
/// as if it were the operand.
pub struct UnaryOperator {
    pub kind: String,
}

impl Analyzer for UnaryOperator {
    fn analyze(&self, compilation: &mut Compilation, tree: NodeId) -> Result<bool, Error> {
        let t = compilation.tree();
        let Some(next) = t.next(tree) else { return Ok(false) };
        let own_kind = t.sketch(tree).borrow().kind().to_string();
        if t.sketch(next).borrow().kind() == own_kind {
            return Ok(false);
        }
        let document = t.document(tree).clone();
        let start = t.reference(tree).position();
        let span = Reference::new(start, t.reference(next).end() - start);

        let sketch = Sketch::new(self.kind.clone());
        Sketch::put_child(&sketch, "operator", Sketch::new("operator"));
        Sketch::put_child(&sketch, "operand", Sketch::new("operand"));

        let weight = t.weight(tree);
        let wrapper = compilation.tree_mut().create(document, span, weight, sketch);
        compilation.tree_mut().offer(tree, wrapper)?;
        Ok(true)
    }
}

/// Wraps `tree` together with its next `count - 1` siblings, no symbol or
/// same-kind guard involved -- for a directive's keyword-plus-fields run,
/// which a single parser match always places as one contiguous group of
/// offers in the same round.
pub struct AdjacentRun {
    pub count: usize,
    pub kind: String,
}

impl Analyzer for AdjacentRun {
    fn analyze(&self, compilation: &mut Compilation, tree: NodeId) -> Result<bool, Error> {
        let t = compilation.tree();
        let mut last = tree;
        for _ in 1..self.count {
            match t.next(last) {
                Some(n) => last = n,
                None => return Ok(false),
            }
        }
        let document = t.document(tree).clone();
        let start = t.reference(tree).position();
        let span = Reference::new(start, t.reference(last).end() - start);

        let sketch = Sketch::new(self.kind.clone());
        let weight = t.weight(tree);
        let wrapper = compilation.tree_mut().create(document, span, weight, sketch);
        compilation.tree_mut().offer(tree, wrapper)?;
        Ok(true)
    }
}

/// Splits the region between separator-matching children into `SLOT`
/// sub-trees -- used for comma-separated argument lists and similar.
pub struct Separators<P> {
    pub is_separator: P,
    pub slot_kind: String,
}

impl<P: Fn(&Compilation, NodeId) -> bool> Analyzer for Separators<P> {
    fn analyze(&self, compilation: &mut Compilation, tree: NodeId) -> Result<bool, Error> {
        let t = compilation.tree();
        let document = t.document(tree).clone();
        let children = t.children(tree);
        let mut changed = false;
        let mut slot_start = t.reference(tree).position();
        let mut made_any_slot = false;

        for child in &children {
            if (self.is_separator)(compilation, *child) {
                let end = compilation.tree().reference(*child).position();
                if end > slot_start {
                    let span = Reference::new(slot_start, end - slot_start);
                    // weight strictly below a leaf token's (0): a slot that
                    // happens to span exactly one bare item (a single-
                    // element list) must end up the EXACT-tie *outer* node,
                    // not lose a Takeover to the item it should wrap.
                    let slot = compilation.tree_mut().create(document.clone(), span, -1, Sketch::new(self.slot_kind.clone()));
                    compilation.tree_mut().offer(tree, slot)?;
                    changed = true;
                    made_any_slot = true;
                }
                slot_start = compilation.tree().reference(*child).end();
            }
        }
        let tail_end = compilation.tree().reference(tree).end();
        if made_any_slot && tail_end > slot_start {
            let span = Reference::new(slot_start, tail_end - slot_start);
            let slot = compilation.tree_mut().create(document, span, -1, Sketch::new(self.slot_kind.clone()));
            compilation.tree_mut().offer(tree, slot)?;
            changed = true;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{DocumentHandle, PseudoDocument};

    fn compilation(content: &str) -> Compilation {
        Compilation::new(DocumentHandle::new(PseudoDocument::new("t", content)))
    }

    #[test]
    fn binary_operator_wraps_both_siblings() {
        let mut c = compilation("1+2");
        let root = c.tree().root();
        let document = c.document().clone();
        let one = c.tree_mut().create(document.clone(), Reference::new(0, 1), 0, Sketch::new("literal:number"));
        let plus = c.tree_mut().create(document.clone(), Reference::new(1, 1), 0, Sketch::new("operator:add"));
        let two = c.tree_mut().create(document, Reference::new(2, 1), 0, Sketch::new("literal:number"));
        c.tree_mut().offer(root, one).unwrap();
        c.tree_mut().offer(root, plus).unwrap();
        c.tree_mut().offer(root, two).unwrap();

        let changed = Filter { inner: BinaryOperator { kind: "operator:add".into() }, query: Is("operator:add") }.analyze(&mut c, plus).unwrap();
        assert!(changed);
        let wrapper = c.tree().parent(plus).unwrap();
        assert_eq!(c.tree().reference(wrapper), Reference::new(0, 3));
    }

    #[test]
    fn unary_operator_folds_innermost_first() {
        let mut c = compilation("!!false");
        let root = c.tree().root();
        let document = c.document().clone();
        let bang1 = c.tree_mut().create(document.clone(), Reference::new(0, 1), 0, Sketch::new("operator:not"));
        let bang2 = c.tree_mut().create(document.clone(), Reference::new(1, 1), 0, Sketch::new("operator:not"));
        let value = c.tree_mut().create(document, Reference::new(2, 5), 0, Sketch::new("literal:boolean"));
        c.tree_mut().offer(root, bang1).unwrap();
        c.tree_mut().offer(root, bang2).unwrap();
        c.tree_mut().offer(root, value).unwrap();

        let analyzer = Filter { inner: UnaryOperator { kind: "unary:not".into() }, query: Is("operator:not") };
        // bang1's next is bang2, still unreduced -- no change yet.
        assert!(!analyzer.analyze(&mut c, bang1).unwrap());
        // bang2's next is the value -- wraps into unary:not(false).
        assert!(analyzer.analyze(&mut c, bang2).unwrap());
        let inner = c.tree().parent(bang2).unwrap();
        assert_eq!(c.tree().reference(inner), Reference::new(1, 6));
        // a second pass now sees bang1's next as the reduced wrapper.
        assert!(analyzer.analyze(&mut c, bang1).unwrap());
        let outer = c.tree().parent(bang1).unwrap();
        assert_eq!(c.tree().reference(outer), Reference::new(0, 7));
    }

    #[test]
    fn binary_flow_skips_a_nested_pair_of_the_same_kind_by_depth() {
        // "#for" A "#for" B "#endfor" C "#endfor" -- six two-char spans
        // standing in for keyword/body tokens, still flat (unwrapped): the
        // outer start must match the OUTER end, not the nearer inner one.
        let mut c = compilation("AABBCCDDEEFF");
        let root = c.tree().root();
        let document = c.document().clone();
        let mut at = |pos: u32, kind: &str| c.tree_mut().create(document.clone(), Reference::new(pos, 2), 0, Sketch::new(kind));
        let outer_start = at(0, "keyword:for");
        let a = at(2, "text");
        let inner_start = at(4, "keyword:for");
        let b = at(6, "text");
        let inner_end = at(8, "keyword:endfor");
        let outer_end = at(10, "keyword:endfor");
        for n in [outer_start, a, inner_start, b, inner_end, outer_end] {
            c.tree_mut().offer(root, n).unwrap();
        }

        let flow = BinaryFlow { start_kind: "keyword:for", end_kind: "keyword:endfor", wrapper_kind: "flow:for".into() };
        assert!(flow.analyze(&mut c, outer_start).unwrap());
        let outer_wrapper = c.tree().parent(outer_start).unwrap();
        assert_eq!(c.tree().reference(outer_wrapper), Reference::new(0, 12));
        // the inner pair, now nested inside, still resolves on its own.
        assert!(flow.analyze(&mut c, inner_start).unwrap());
        let inner_wrapper = c.tree().parent(inner_start).unwrap();
        assert_eq!(c.tree().reference(inner_wrapper), Reference::new(4, 6));
    }

    #[test]
    fn adjacent_run_wraps_a_fixed_count_of_siblings() {
        let mut c = compilation("ABCD");
        let root = c.tree().root();
        let document = c.document().clone();
        let kw = c.tree_mut().create(document.clone(), Reference::new(0, 1), 0, Sketch::new("keyword:declare"));
        let name = c.tree_mut().create(document.clone(), Reference::new(1, 1), 0, Sketch::new("identifier:declare-name"));
        let value = c.tree_mut().create(document, Reference::new(2, 2), 0, Sketch::new("expr:declare-value"));
        for n in [kw, name, value] {
            c.tree_mut().offer(root, n).unwrap();
        }
        let run = AdjacentRun { count: 3, kind: "command:declare".into() };
        assert!(run.analyze(&mut c, kw).unwrap());
        let wrapper = c.tree().parent(kw).unwrap();
        assert_eq!(c.tree().reference(wrapper), Reference::new(0, 4));
        assert_eq!(c.tree().children(wrapper), vec![kw, name, value]);
    }

    #[test]
    fn hierarchy_visits_every_descendant() {
        let mut c = compilation("ab");
        let root = c.tree().root();
        let document = c.document().clone();
        let leaf = c.tree_mut().create(document, Reference::new(0, 2), 0, Sketch::new("literal:text"));
        c.tree_mut().offer(root, leaf).unwrap();

        struct Mark;
        impl Analyzer for Mark {
            fn analyze(&self, compilation: &mut Compilation, tree: NodeId) -> Result<bool, Error> {
                compilation.tree().sketch(tree).borrow_mut().set_name("visited");
                Ok(false)
            }
        }
        Hierarchy(Mark).analyze(&mut c, root).unwrap();
        assert_eq!(c.tree().sketch(leaf).borrow().name(), "visited");
        assert_eq!(c.tree().sketch(root).borrow().name(), "visited");
    }
}
