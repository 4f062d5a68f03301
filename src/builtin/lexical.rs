// Lexical tokens and the expression grammar: comments, strings, numbers,
// booleans, identifiers, brackets, operators (registered by precedence
// tier), member access, and the array/object literal structure built on
// top of them. Grounded in `parser.rs`'s own Term/Pattern/DoublePattern
// tests and `analyzer.rs`'s BinaryOperator/UnaryOperator/Separators
// combinators -- this module only supplies the concrete token set and
// wires it together into one Spec.

use regex::Regex;

use crate::analyzer::Filter as AFilter;
use crate::analyzer::{Analyzer, BinaryOperator, Hierarchy, Is, Separators, UnaryOperator};
use crate::compilation::Compilation;
use crate::compiler::{Compiler, Filter, First};
use crate::error::Error;
use crate::instruction::{Instruction, Op};
use crate::parser::{GroupBinding, Pattern, Term};
use crate::reference::Reference;
use crate::sketch::Sketch;
use crate::spec::Spec;
use crate::tree::NodeId;
use crate::value::Value;

/// Renames a bare identifier right of a `.` from `identifier` to
/// `identifier:member-key` (so it never separately dispatches through the
/// heap-access compiler registered for plain `identifier`) and wraps the
/// whole `left.key` run -- the same CONTAIN-takeover shape `BinaryOperator`
/// uses, but the right sibling's kind has to change, so it can't reuse that
/// combinator directly.
struct MemberAccess;

impl Analyzer for MemberAccess {
    fn analyze(&self, compilation: &mut Compilation, tree: NodeId) -> Result<bool, Error> {
        let (prev, next) = {
            let t = compilation.tree();
            (t.previous(tree), t.next(tree))
        };
        let (Some(prev), Some(next)) = (prev, next) else { return Ok(false) };
        if compilation.tree().sketch(next).borrow().kind() != "identifier" {
            return Ok(false);
        }

        let document = compilation.tree().document(tree).clone();
        let start = compilation.tree().reference(prev).position();
        let end = compilation.tree().reference(next).end();
        let span = Reference::new(start, end - start);
        let weight = compilation.tree().weight(tree);

        compilation.tree().sketch(next).borrow_mut().set_kind("identifier:member-key");

        let wrapper = compilation.tree_mut().create(document, span, weight, Sketch::new("access:member"));
        compilation.tree_mut().offer(tree, wrapper)?;
        Ok(true)
    }
}

fn is_comma(compilation: &Compilation, node: NodeId) -> bool {
    compilation.tree().sketch(node).borrow().kind() == "operator:comma"
}

/// Unwraps one `Separators` slot (or accepts a bare item when no separator
/// ever fired) and skips the separator tokens themselves, yielding the
/// actual expression nodes a bracket literal should compile.
fn collect_slot_items(compilation: &Compilation, tree: NodeId, slot_kind: &str) -> Vec<NodeId> {
    let mut out = Vec::new();
    for child in compilation.tree().children(tree) {
        let kind = compilation.tree().sketch(child).borrow().kind().to_string();
        if kind == "operator:comma" {
            continue;
        }
        if kind == slot_kind {
            if let Some(inner) = compilation.tree().children(child).first() {
                out.push(*inner);
            }
        } else {
            out.push(child);
        }
    }
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

struct CommentCompiler;
impl Compiler for CommentCompiler {
    fn compile(&self, _root: &dyn Compiler, _compilation: &Compilation, _tree: NodeId) -> Result<Option<Instruction>, Error> {
        Ok(Some(Instruction::new(Op::Idle)))
    }
}

struct StringLiteral;
impl Compiler for StringLiteral {
    fn compile(&self, _root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let raw = compilation.tree().document(tree).read(compilation.tree().reference(tree))?;
        let inner = &raw[1..raw.len() - 1];
        Ok(Some(Instruction::new(Op::PushConst(Value::text(unescape(inner))))))
    }
}

struct NumberLiteral;
impl Compiler for NumberLiteral {
    fn compile(&self, _root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let reference = compilation.tree().reference(tree);
        let sketch = compilation.tree().sketch(tree);
        let value_sketch = sketch
            .borrow()
            .child("value")
            .ok_or_else(|| Error::Compile { reference, message: "number literal missing captured value".into() })?;
        let text = value_sketch.borrow().name().to_string();
        let n: f64 = text.parse().map_err(|_| Error::Compile { reference, message: format!("invalid number literal {:?}", text) })?;
        Ok(Some(Instruction::new(Op::PushConst(Value::Number(n)))))
    }
}

struct BooleanLiteral;
impl Compiler for BooleanLiteral {
    fn compile(&self, _root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let raw = compilation.tree().document(tree).read(compilation.tree().reference(tree))?;
        Ok(Some(Instruction::new(Op::PushConst(Value::Boolean(raw == "true")))))
    }
}

struct IdentifierAccess;
impl Compiler for IdentifierAccess {
    fn compile(&self, _root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let raw = compilation.tree().document(tree).read(compilation.tree().reference(tree))?.to_string();
        Ok(Some(Instruction::new(Op::Block(vec![Instruction::new(Op::PushConst(Value::text(raw))), Instruction::new(Op::Access)]))))
    }
}

struct GroupCompiler;
impl Compiler for GroupCompiler {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        match compilation.tree().children(tree).first() {
            Some(inner) => root.compile(root, compilation, *inner),
            None => Ok(None),
        }
    }
}

struct ArrayLiteral;
impl Compiler for ArrayLiteral {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let mut items = Vec::new();
        for node in collect_slot_items(compilation, tree, "slot:array-item") {
            if let Some(i) = root.compile(root, compilation, node)? {
                items.push(i);
            }
        }
        let mut seq = vec![Instruction::new(Op::PushFrame)];
        seq.extend(items);
        seq.push(Instruction::new(Op::GlueFrame));
        seq.push(Instruction::new(Op::CastArray));
        Ok(Some(Instruction::new(Op::Block(seq))))
    }
}

struct ObjectLiteral;
impl Compiler for ObjectLiteral {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let mut entries = Vec::new();
        for node in collect_slot_items(compilation, tree, "slot:object-item") {
            if let Some(i) = root.compile(root, compilation, node)? {
                entries.push(i);
            }
        }
        let mut seq = vec![Instruction::new(Op::PushFrame)];
        seq.extend(entries);
        seq.push(Instruction::new(Op::GlueFrame));
        seq.push(Instruction::new(Op::CastObject));
        Ok(Some(Instruction::new(Op::Block(seq))))
    }
}

/// A `key:value` pair inside an object literal. A bareword key (plain
/// `identifier`) is taken as its own literal text rather than a heap
/// lookup; a quoted-string key compiles normally.
struct ObjectEntry;
impl Compiler for ObjectEntry {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let kids = compilation.tree().children(tree);
        let key_node = kids[0];
        let value_node = kids[2];
        let key_kind = compilation.tree().sketch(key_node).borrow().kind().to_string();
        let key_instr = if key_kind == "identifier" {
            let text = compilation.tree().document(key_node).read(compilation.tree().reference(key_node))?.to_string();
            Instruction::new(Op::PushConst(Value::text(text)))
        } else {
            root.compile(root, compilation, key_node)?
                .ok_or_else(|| Error::Compile { reference: compilation.tree().reference(key_node), message: "missing object key".into() })?
        };
        let value_instr = root
            .compile(root, compilation, value_node)?
            .ok_or_else(|| Error::Compile { reference: compilation.tree().reference(value_node), message: "missing object value".into() })?;
        Ok(Some(Instruction::new(Op::Block(vec![key_instr, value_instr, Instruction::new(Op::MakePair)]))))
    }
}

struct MemberGet;
impl Compiler for MemberGet {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let kids = compilation.tree().children(tree);
        let left = root
            .compile(root, compilation, kids[0])?
            .ok_or_else(|| Error::Compile { reference: compilation.tree().reference(kids[0]), message: "missing member-access target".into() })?;
        let key_text = compilation.tree().document(kids[2]).read(compilation.tree().reference(kids[2]))?.to_string();
        Ok(Some(Instruction::new(Op::Block(vec![left, Instruction::new(Op::PushConst(Value::text(key_text))), Instruction::new(Op::Get)]))))
    }
}

struct BinaryOpCompiler(Op);
impl Compiler for BinaryOpCompiler {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let kids = compilation.tree().children(tree);
        let left = root
            .compile(root, compilation, kids[0])?
            .ok_or_else(|| Error::Compile { reference: compilation.tree().reference(kids[0]), message: "missing left operand".into() })?;
        let right = root
            .compile(root, compilation, kids[2])?
            .ok_or_else(|| Error::Compile { reference: compilation.tree().reference(kids[2]), message: "missing right operand".into() })?;
        Ok(Some(Instruction::new(Op::Block(vec![left, right, Instruction::new(self.0.clone())]))))
    }
}

struct UnaryOpCompiler(Op);
impl Compiler for UnaryOpCompiler {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let kids = compilation.tree().children(tree);
        let operand = root
            .compile(root, compilation, kids[1])?
            .ok_or_else(|| Error::Compile { reference: compilation.tree().reference(kids[1]), message: "missing operand".into() })?;
        Ok(Some(Instruction::new(Op::Block(vec![operand, Instruction::new(self.0.clone())]))))
    }
}

pub fn spec() -> Spec {
    Spec::new("lexical")
        .with_parser(Term::new(Regex::new(r"(?s)/\*.*?\*/").unwrap(), 0, "comment:block"))
        .with_parser(Term::new(Regex::new(r"//[^\n]*").unwrap(), 0, "comment:line"))
        .with_parser(Term::new(Regex::new(r"'(?:[^'\\]|\\.)*'").unwrap(), 0, "literal:string"))
        .with_parser(Term::new(Regex::new(r#""(?:[^"\\]|\\.)*""#).unwrap(), 0, "literal:string"))
        .with_parser(crate::parser::DoublePattern::new(Regex::new(r"\(").unwrap(), Regex::new(r"\)").unwrap(), 0, "bracket:group"))
        .with_parser(crate::parser::DoublePattern::new(Regex::new(r"\[").unwrap(), Regex::new(r"\]").unwrap(), 0, "bracket:array"))
        .with_parser(crate::parser::DoublePattern::new(Regex::new(r"\{").unwrap(), Regex::new(r"\}").unwrap(), 0, "bracket:object"))
        .with_parser(Pattern::new(
            Regex::new(r"(?P<value>\d+(?:\.\d+)?)[DdLlFf]?").unwrap(),
            0,
            "literal:number",
            vec![GroupBinding { capture_name: "value", sketch_key: "value", kind: "value".into() }],
        ))
        .with_parser(Term::new(Regex::new(r"true|false").unwrap(), 0, "literal:boolean"))
        .with_parser(Term::new(Regex::new(r"==").unwrap(), 0, "operator:eq"))
        .with_parser(Term::new(Regex::new(r"!=").unwrap(), 0, "operator:ne"))
        .with_parser(Term::new(Regex::new(r"<=").unwrap(), 0, "operator:le"))
        .with_parser(Term::new(Regex::new(r">=").unwrap(), 0, "operator:ge"))
        .with_parser(Term::new(Regex::new(r"&&").unwrap(), 0, "operator:and"))
        .with_parser(Term::new(Regex::new(r"\|\|").unwrap(), 0, "operator:or"))
        .with_parser(Term::new(Regex::new(r"<").unwrap(), 0, "operator:lt"))
        .with_parser(Term::new(Regex::new(r">").unwrap(), 0, "operator:gt"))
        .with_parser(Term::new(Regex::new(r"!").unwrap(), 0, "operator:not"))
        .with_parser(Term::new(Regex::new(r"\+").unwrap(), 0, "operator:add"))
        .with_parser(Term::new(Regex::new(r"-").unwrap(), 0, "operator:sub"))
        .with_parser(Term::new(Regex::new(r"\*").unwrap(), 0, "operator:mul"))
        .with_parser(Term::new(Regex::new(r"/").unwrap(), 0, "operator:div"))
        .with_parser(Term::new(Regex::new(r"%").unwrap(), 0, "operator:mod"))
        .with_parser(Term::new(Regex::new(r":").unwrap(), 0, "operator:colon"))
        .with_parser(Term::new(Regex::new(r",").unwrap(), 0, "operator:comma"))
        .with_parser(Term::new(Regex::new(r"\.").unwrap(), 0, "operator:dot"))
        .with_parser(Term::new(Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap(), 0, "identifier"))
        .with_analyzer(Hierarchy(AFilter { inner: MemberAccess, query: Is("operator:dot") }))
        .with_analyzer(Hierarchy(AFilter { inner: UnaryOperator { kind: "unary:not".into() }, query: Is("operator:not") }))
        .with_analyzer(Hierarchy(AFilter { inner: BinaryOperator { kind: "operator:mul".into() }, query: Is("operator:mul") }))
        .with_analyzer(Hierarchy(AFilter { inner: BinaryOperator { kind: "operator:div".into() }, query: Is("operator:div") }))
        .with_analyzer(Hierarchy(AFilter { inner: BinaryOperator { kind: "operator:mod".into() }, query: Is("operator:mod") }))
        .with_analyzer(Hierarchy(AFilter { inner: BinaryOperator { kind: "operator:add".into() }, query: Is("operator:add") }))
        .with_analyzer(Hierarchy(AFilter { inner: BinaryOperator { kind: "operator:sub".into() }, query: Is("operator:sub") }))
        .with_analyzer(Hierarchy(AFilter { inner: BinaryOperator { kind: "operator:lt".into() }, query: Is("operator:lt") }))
        .with_analyzer(Hierarchy(AFilter { inner: BinaryOperator { kind: "operator:le".into() }, query: Is("operator:le") }))
        .with_analyzer(Hierarchy(AFilter { inner: BinaryOperator { kind: "operator:gt".into() }, query: Is("operator:gt") }))
        .with_analyzer(Hierarchy(AFilter { inner: BinaryOperator { kind: "operator:ge".into() }, query: Is("operator:ge") }))
        .with_analyzer(Hierarchy(AFilter { inner: BinaryOperator { kind: "operator:eq".into() }, query: Is("operator:eq") }))
        .with_analyzer(Hierarchy(AFilter { inner: BinaryOperator { kind: "operator:ne".into() }, query: Is("operator:ne") }))
        .with_analyzer(Hierarchy(AFilter { inner: BinaryOperator { kind: "operator:and".into() }, query: Is("operator:and") }))
        .with_analyzer(Hierarchy(AFilter { inner: BinaryOperator { kind: "operator:or".into() }, query: Is("operator:or") }))
        .with_analyzer(Hierarchy(AFilter { inner: Separators { is_separator: is_comma, slot_kind: "slot:array-item".into() }, query: Is("bracket:array") }))
        .with_analyzer(Hierarchy(AFilter { inner: Separators { is_separator: is_comma, slot_kind: "slot:object-item".into() }, query: Is("bracket:object") }))
        .with_analyzer(Hierarchy(AFilter { inner: BinaryOperator { kind: "pair:object-entry".into() }, query: Is("operator:colon") }))
        .with_compiler(First(vec![
            Box::new(Filter { inner: CommentCompiler, query: Is("comment:line") }),
            Box::new(Filter { inner: CommentCompiler, query: Is("comment:block") }),
            Box::new(Filter { inner: StringLiteral, query: Is("literal:string") }),
            Box::new(Filter { inner: NumberLiteral, query: Is("literal:number") }),
            Box::new(Filter { inner: BooleanLiteral, query: Is("literal:boolean") }),
            Box::new(Filter { inner: IdentifierAccess, query: Is("identifier") }),
            Box::new(Filter { inner: GroupCompiler, query: Is("bracket:group") }),
            Box::new(Filter { inner: ArrayLiteral, query: Is("bracket:array") }),
            Box::new(Filter { inner: ObjectLiteral, query: Is("bracket:object") }),
            Box::new(Filter { inner: ObjectEntry, query: Is("pair:object-entry") }),
            Box::new(Filter { inner: MemberGet, query: Is("access:member") }),
            Box::new(Filter { inner: BinaryOpCompiler(Op::Multiply), query: Is("operator:mul") }),
            Box::new(Filter { inner: BinaryOpCompiler(Op::Quotient), query: Is("operator:div") }),
            Box::new(Filter { inner: BinaryOpCompiler(Op::Modulo), query: Is("operator:mod") }),
            Box::new(Filter { inner: BinaryOpCompiler(Op::Sum), query: Is("operator:add") }),
            Box::new(Filter { inner: BinaryOpCompiler(Op::Difference), query: Is("operator:sub") }),
            Box::new(Filter { inner: BinaryOpCompiler(Op::Less), query: Is("operator:lt") }),
            Box::new(Filter { inner: BinaryOpCompiler(Op::LessEqual), query: Is("operator:le") }),
            Box::new(Filter { inner: BinaryOpCompiler(Op::Greater), query: Is("operator:gt") }),
            Box::new(Filter { inner: BinaryOpCompiler(Op::GreaterEqual), query: Is("operator:ge") }),
            Box::new(Filter { inner: BinaryOpCompiler(Op::Equal), query: Is("operator:eq") }),
            Box::new(Filter { inner: BinaryOpCompiler(Op::NotEqual), query: Is("operator:ne") }),
            Box::new(Filter { inner: BinaryOpCompiler(Op::And), query: Is("operator:and") }),
            Box::new(Filter { inner: BinaryOpCompiler(Op::Or), query: Is("operator:or") }),
            Box::new(Filter { inner: UnaryOpCompiler(Op::Negate), query: Is("unary:not") }),
        ]))
}
