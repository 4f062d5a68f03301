// The Parser framework: pattern-based tree growers. Regex-first lexical
// recognition is lifted straight from the teacher's `vm::decode_word`
// (`Regex` + `lazy_static`), generalized from "decode one opcode word"
// to "find the next occurrence of a pattern inside an uncovered range".

use regex::Regex;

use crate::compilation::Compilation;
use crate::error::Error;
use crate::reference::Reference;
use crate::sketch::{Sketch, SketchRef};
use crate::tree::NodeId;

/// What a Parser produced: a new range to place plus the sketch that
/// should be attached to it once the driver offers it into the
/// Compilation.
pub struct Offer {
    pub reference: Reference,
    pub weight: i32,
    pub sketch: SketchRef,
}

pub trait Parser {
    /// Inspect `tree` (already part of `compilation`) and return any new
    /// Offers to place into it. The driver does the actual `offer` call
    /// and runs every Parser to a fixed point.
    fn parse(&self, compilation: &Compilation, tree: NodeId) -> Result<Vec<Offer>, Error>;
}

/// Ranges of `tree` not already covered by a child -- a Term/Pattern/Group
/// match must avoid these so re-running the parser doesn't refind what a
/// previous pass already placed.
pub(crate) fn uncovered_windows(compilation: &Compilation, tree: NodeId) -> Vec<Reference> {
    let t = compilation.tree();
    let whole = t.reference(tree);
    let mut windows = Vec::new();
    let mut cursor = whole.position();
    for child in t.children(tree) {
        let c = t.reference(child);
        if c.position() > cursor {
            windows.push(Reference::new(cursor, c.position() - cursor));
        }
        cursor = c.end().max(cursor);
    }
    if cursor < whole.end() {
        windows.push(Reference::new(cursor, whole.end() - cursor));
    }
    windows
}

/// Returns empty. The identity element of Parser composition.
pub struct Idle;

impl Parser for Idle {
    fn parse(&self, _compilation: &Compilation, _tree: NodeId) -> Result<Vec<Offer>, Error> {
        Ok(Vec::new())
    }
}

/// Find the first match of `regex` inside `tree`'s uncovered range, emit a
/// single tree at `weight` with a sketch of `kind`.
pub struct Term {
    regex: Regex,
    weight: i32,
    kind: String,
}

impl Term {
    pub fn new(regex: Regex, weight: i32, kind: impl Into<String>) -> Term {
        Term { regex, weight, kind: kind.into() }
    }
}

impl Parser for Term {
    fn parse(&self, compilation: &Compilation, tree: NodeId) -> Result<Vec<Offer>, Error> {
        let document = compilation.tree().document(tree).clone();
        for window in uncovered_windows(compilation, tree) {
            let slice = document.read(window)?;
            if let Some(m) = self.regex.find(slice) {
                let reference = Reference::new(window.position() + m.start() as u32, (m.end() - m.start()) as u32);
                return Ok(vec![Offer { reference, weight: self.weight, sketch: Sketch::new(self.kind.clone()) }]);
            }
        }
        Ok(Vec::new())
    }
}

/// A single named capture group to bind as a child sketch.
pub struct GroupBinding {
    pub capture_name: &'static str,
    pub sketch_key: &'static str,
    pub kind: String,
}

/// Captures named groups: the outer match becomes the wrapper tree, each
/// bound group becomes a named child sketch (a later parser pass, or the
/// driver itself, offers the matching sub-range as that sketch's Tree).
pub struct Pattern {
    regex: Regex,
    weight: i32,
    kind: String,
    groups: Vec<GroupBinding>,
}

impl Pattern {
    pub fn new(regex: Regex, weight: i32, kind: impl Into<String>, groups: Vec<GroupBinding>) -> Pattern {
        Pattern { regex, weight, kind: kind.into(), groups }
    }
}

impl Parser for Pattern {
    fn parse(&self, compilation: &Compilation, tree: NodeId) -> Result<Vec<Offer>, Error> {
        let document = compilation.tree().document(tree).clone();
        for window in uncovered_windows(compilation, tree) {
            let slice = document.read(window)?;
            if let Some(caps) = self.regex.captures(slice) {
                let whole = caps.get(0).expect("capture 0 always present");
                let reference = Reference::new(window.position() + whole.start() as u32, (whole.end() - whole.start()) as u32);
                let sketch = Sketch::new(self.kind.clone());
                for binding in &self.groups {
                    if let Some(g) = caps.name(binding.capture_name) {
                        let child = Sketch::new(binding.kind.clone());
                        child.borrow_mut().set_name(slice[g.start()..g.end()].to_string());
                        Sketch::put_child(&sketch, binding.sketch_key, child);
                    }
                }
                return Ok(vec![Offer { reference, weight: self.weight, sketch }]);
            }
        }
        Ok(Vec::new())
    }
}

/// Like Pattern, but intended for anchored directives where every bound
/// group is itself a distinct structural sub-range (e.g. `#declare NAME
/// VALUE`). The binding mechanism is identical; only the calling
/// convention differs, so this crate shares the implementation.
pub type Group = Pattern;

/// Scans for a balanced open/close pair: the nearest close that keeps the
/// enclosed substring free of other opens (a greedy well-nested match,
/// per the "first match only" contract). Emits a wrapper plus `open`,
/// `close`, and an implicit `body` sketch.
pub struct DoublePattern {
    open: Regex,
    close: Regex,
    weight: i32,
    kind: String,
}

impl DoublePattern {
    pub fn new(open: Regex, close: Regex, weight: i32, kind: impl Into<String>) -> DoublePattern {
        DoublePattern { open, close, weight, kind: kind.into() }
    }
}

impl Parser for DoublePattern {
    fn parse(&self, compilation: &Compilation, tree: NodeId) -> Result<Vec<Offer>, Error> {
        let document = compilation.tree().document(tree).clone();
        for window in uncovered_windows(compilation, tree) {
            let slice = document.read(window)?;
            let Some(open_match) = self.open.find(slice) else { continue };
            let after_open = open_match.end();
            let mut search_from = after_open;
            loop {
                let Some(close_match) = self.close.find(&slice[search_from..]) else { break };
                let close_start = search_from + close_match.start();
                let close_end = search_from + close_match.end();
                let body = &slice[after_open..close_start];
                if self.open.find(body).is_some() {
                    // another open appears before this close: not the
                    // nearest well-nested match, keep scanning forward.
                    search_from = close_end;
                    continue;
                }

                let base = window.position();
                let wrapper = Reference::new(base + open_match.start() as u32, (close_end - open_match.start()) as u32);
                let sketch = Sketch::new(self.kind.clone());
                Sketch::put_child(&sketch, "open", Sketch::new("open"));
                Sketch::put_child(&sketch, "close", Sketch::new("close"));
                Sketch::put_child(&sketch, "body", Sketch::new("body"));

                return Ok(vec![Offer { reference: wrapper, weight: self.weight, sketch }]);
            }
        }
        Ok(Vec::new())
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
    fn term_finds_first_match_in_uncovered_range() {
        let c = compilation("  42  ");
        let term = Term::new(Regex::new(r"\d+").unwrap(), 0, "literal:number");
        let offers = term.parse(&c, c.tree().root()).unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].reference, Reference::new(2, 2));
    }

    #[test]
    fn term_skips_already_covered_ranges() {
        let mut c = compilation("11 22");
        let document = c.document().clone();
        let first = c.tree_mut().create(document, Reference::new(0, 2), 0, Sketch::new("literal:number"));
        let root = c.tree().root();
        c.tree_mut().offer(root, first).unwrap();

        let term = Term::new(Regex::new(r"\d+").unwrap(), 0, "literal:number");
        let offers = term.parse(&c, root).unwrap();
        assert_eq!(offers[0].reference, Reference::new(3, 2));
    }

    #[test]
    fn double_pattern_finds_nearest_well_nested_close() {
        let c = compilation("#{ a }# rest #{ b }#");
        let dp = DoublePattern::new(Regex::new(r"#\{").unwrap(), Regex::new(r"\}#").unwrap(), 0, "injection");
        let offers = dp.parse(&c, c.tree().root()).unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].reference, Reference::new(0, 7));
    }
}
