// The built-in document Spec: freeform template text, `#{ }#` value
// injection, and the two sub-specs (`lexical`, `commands`) that supply
// everything inside an injection or a directive's fields. Grounded in
// `spec.rs`'s self-then-sub_specs fallback, which is what lets this
// top-level Spec stay tiny while delegating almost everything downward.

pub mod commands;
pub mod lexical;

use regex::Regex;

use crate::analyzer::Is;
use crate::compilation::Compilation;
use crate::compiler::{Compiler, Fallback, Filter, First, Flatten};
use crate::error::Error;
use crate::instruction::{Instruction, Op};
use crate::parser::{uncovered_windows, DoublePattern, Offer, Parser};
use crate::sketch::Sketch;
use crate::spec::Spec;
use crate::tree::NodeId;
use crate::value::Value;

/// Only these node kinds hold freeform template text as direct children.
/// Everything else (an injection body, a bracket literal, a directive's
/// rest-of-line field) is pure expression syntax and must never have a
/// stray `text` run spliced into it.
const TEMPLATE_KINDS: &[&str] = &["root"];

/// Finds the first occurrence of a structural marker (`#`, a comment
/// opener, a quote, a bracket) inside an uncovered window and emits
/// everything before it as one `text` run. A window that starts at a
/// marker yields nothing -- the marker's own parser claims it instead.
struct PlainText;

impl Parser for PlainText {
    fn parse(&self, compilation: &Compilation, tree: NodeId) -> Result<Vec<Offer>, Error> {
        let kind = compilation.tree().sketch(tree).borrow().kind().to_string();
        if !TEMPLATE_KINDS.contains(&kind.as_str()) {
            return Ok(Vec::new());
        }
        lazy_static::lazy_static! {
            static ref MARKER: Regex = Regex::new(r#"#|//|/\*|'|"|\{|\[|\("#).unwrap();
        }
        let document = compilation.tree().document(tree).clone();
        for window in uncovered_windows(compilation, tree) {
            let slice = document.read(window)?;
            let end = MARKER.find(slice).map(|m| m.start()).unwrap_or(slice.len());
            if end == 0 {
                continue;
            }
            let reference = crate::reference::Reference::new(window.position(), end as u32);
            return Ok(vec![Offer { reference, weight: 0, sketch: Sketch::new("text") }]);
        }
        Ok(Vec::new())
    }
}

fn injection() -> DoublePattern {
    DoublePattern::new(Regex::new(r"#\{").unwrap(), Regex::new(r"\}#").unwrap(), 0, "injection")
}

struct TextCompiler;
impl Compiler for TextCompiler {
    fn compile(&self, _root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let raw = compilation.tree().document(tree).read(compilation.tree().reference(tree))?.to_string();
        Ok(Some(Instruction::new(Op::Block(vec![Instruction::new(Op::PushConst(Value::text(raw))), Instruction::new(Op::Print)]))))
    }
}

/// `#{ expr }#`: compile the single enclosed expression and print its
/// evaluated text into the surrounding document's console.
struct InjectionCompiler;
impl Compiler for InjectionCompiler {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let reference = compilation.tree().reference(tree);
        let child = compilation
            .tree()
            .children(tree)
            .into_iter()
            .next()
            .ok_or_else(|| Error::Compile { reference, message: "empty injection".into() })?;
        let inner = root.compile(root, compilation, child)?.ok_or_else(|| Error::Compile { reference, message: "no compiler matched injection body".into() })?;
        Ok(Some(Instruction::new(Op::Block(vec![inner, Instruction::new(Op::Print)]))))
    }
}

pub fn root_spec() -> Spec {
    Spec::new("root")
        .with_parser(PlainText)
        .with_parser(injection())
        .with_compiler(First(vec![
            Box::new(Filter { inner: Flatten(Fallback), query: Is("root") }),
            Box::new(Filter { inner: TextCompiler, query: Is("text") }),
            Box::new(Filter { inner: InjectionCompiler, query: Is("injection") }),
        ]))
        .with_sub_spec(lexical::spec())
        .with_sub_spec(commands::spec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{DocumentHandle, PseudoDocument};
    use crate::unit::Unit;

    fn render(name: &str, source: &str) -> String {
        let document = DocumentHandle::new(PseudoDocument::new(name, source));
        let mut unit = Unit::new(root_spec());
        unit.run(document).unwrap()
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(render("arith", "#{1 + 2 * (3 + 5)}#"), "17");
    }

    #[test]
    fn unary_not_folds_innermost_first_then_loose_sum_falls_back_to_text() {
        assert_eq!(render("not", "#{!!!false + !!!true}#"), "truefalse");
    }

    #[test]
    fn comparisons() {
        assert_eq!(render("cmp1", "#{5>3}#"), "true");
        assert_eq!(render("cmp2", "#{3>5}#"), "false");
        assert_eq!(render("cmp3", "#{3>3}#"), "false");
    }

    #[test]
    fn for_loop_iterates_an_array_literal() {
        let source = "#for X [1,2,3]\nx=#{X}#\n#endfor";
        assert_eq!(render("for", source), "x=1\nx=2\nx=3\n");
    }

    #[test]
    fn declare_and_member_access_on_an_object_literal() {
        let source = "#declare A {k:'v'}\n#{A.k}#";
        assert_eq!(render("declare", source), "v");
    }

    #[test]
    fn capture_prints_nothing_until_its_value_is_injected() {
        let source = "#capture X\nhello\n#endcapture\n#{X}#";
        assert_eq!(render("capture", source), "hello\n");
    }
}
