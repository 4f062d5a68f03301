// Directive commands: `#for`/`#while`/`#if`/`#capture` flow blocks and the
// one-shot `#declare`/`#define`/`#error`/`#message`/`#console` statements.
// Grounded in `analyzer.rs`'s AdjacentRun (keyword-plus-fields runs) and
// BinaryFlow (header/end pairing) combinators; this module only supplies
// the directive keyword table, field layout, and the compilers that lower
// a resolved flow tree into loop/branch/capture Instructions.

use lazy_static::lazy_static;
use regex::Regex;

use crate::analyzer::{AdjacentRun, BinaryFlow, Filter as AFilter, Hierarchy, Is};
use crate::compilation::Compilation;
use crate::compiler::{Compiler, Filter, First};
use crate::error::Error;
use crate::instruction::{Instruction, Op};
use crate::parser::{uncovered_windows, Offer, Parser};
use crate::reference::{DocumentHandle, Reference};
use crate::sketch::Sketch;
use crate::spec::Spec;
use crate::tree::NodeId;
use crate::value::Value;

lazy_static! {
    static ref IDENTIFIER_FIELD: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*").unwrap();
}

enum Field {
    Identifier,
    RestOfLine,
}

/// Matches a `#keyword` followed by a fixed, ordered sequence of fields
/// scanned directly against raw document text -- a directive's header
/// line is never itself composed of already-tokenized lexical pieces, so
/// this reads bytes instead of delegating to the lexical Spec.
struct Directive {
    keyword: Regex,
    keyword_kind: String,
    fields: Vec<(Field, String)>,
    weight: i32,
}

impl Directive {
    fn try_window(&self, document: &DocumentHandle, window: Reference) -> Option<Vec<Offer>> {
        let slice = document.read(window).ok()?;
        let m = self.keyword.find(slice)?;
        let mut offers = Vec::new();
        offers.push(Offer {
            reference: Reference::new(window.position() + m.start() as u32, (m.end() - m.start()) as u32),
            weight: self.weight,
            sketch: Sketch::new(self.keyword_kind.clone()),
        });

        let mut cursor = window.position() + m.end() as u32;
        for (field, kind) in &self.fields {
            let remaining = document.read(Reference::new(cursor, window.end() - cursor)).ok()?;
            let skipped = remaining.len() - remaining.trim_start_matches([' ', '\t']).len();
            cursor += skipped as u32;

            match field {
                Field::Identifier => {
                    let remaining = document.read(Reference::new(cursor, window.end() - cursor)).ok()?;
                    let found = IDENTIFIER_FIELD.find(remaining)?;
                    let len = (found.end() - found.start()) as u32;
                    offers.push(Offer { reference: Reference::new(cursor, len), weight: self.weight, sketch: Sketch::new(kind.clone()) });
                    cursor += len;
                }
                Field::RestOfLine => {
                    let remaining = document.read(Reference::new(cursor, window.end() - cursor)).ok()?;
                    let line_end = remaining.find('\n').unwrap_or(remaining.len());
                    let trimmed = remaining[..line_end].trim_end_matches([' ', '\t', '\r']);
                    if trimmed.is_empty() {
                        return None;
                    }
                    let len = trimmed.len() as u32;
                    offers.push(Offer { reference: Reference::new(cursor, len), weight: self.weight, sketch: Sketch::new(kind.clone()) });
                    cursor += len;
                }
            }
        }

        // A directive tag owns the line it sits on: fold a single trailing
        // newline into the last field's (or the bare keyword's) span so it
        // never surfaces as a stray `text` run ahead of the directive's body.
        if let Ok(rest) = document.read(Reference::new(cursor, window.end() - cursor)) {
            let eaten: crate::reference::Pos = if rest.starts_with("\r\n") { 2 } else if rest.starts_with('\n') { 1 } else { 0 };
            if eaten > 0 {
                let last = offers.last_mut().expect("keyword offer always pushed first");
                last.reference = Reference::new(last.reference.position(), last.reference.length() + eaten);
            }
        }
        Some(offers)
    }
}

impl Parser for Directive {
    fn parse(&self, compilation: &Compilation, tree: NodeId) -> Result<Vec<Offer>, Error> {
        let document = compilation.tree().document(tree).clone();
        for window in uncovered_windows(compilation, tree) {
            if let Some(offers) = self.try_window(&document, window) {
                return Ok(offers);
            }
        }
        Ok(Vec::new())
    }
}

fn directive(keyword: &str, keyword_kind: &str, fields: Vec<(Field, &str)>) -> Directive {
    Directive {
        keyword: Regex::new(keyword).unwrap(),
        keyword_kind: keyword_kind.into(),
        fields: fields.into_iter().map(|(f, k)| (f, k.to_string())).collect(),
        weight: 0,
    }
}

fn bare_keyword(word: &str, kind: &str) -> crate::parser::Term {
    crate::parser::Term::new(Regex::new(&format!("{}\\r?\\n?", word)).unwrap(), 0, kind)
}

fn access(key: &str) -> Instruction {
    Instruction::new(Op::Block(vec![Instruction::new(Op::PushConst(Value::text(key))), Instruction::new(Op::Access)]))
}

fn for_condition(arr_key: &str, idx_key: &str) -> Instruction {
    Instruction::new(Op::Block(vec![access(arr_key), access(idx_key), Instruction::new(Op::Get), Instruction::new(Op::Defined)]))
}

/// A field node (e.g. `expr:for-value`) carries the raw span; the actual
/// parsed expression is its single tree child once lexical analysis has
/// folded the span down to one node.
fn compile_field(root: &dyn Compiler, compilation: &Compilation, field_node: NodeId) -> Result<Instruction, Error> {
    let reference = compilation.tree().reference(field_node);
    let child = compilation
        .tree()
        .children(field_node)
        .into_iter()
        .next()
        .ok_or_else(|| Error::Compile { reference, message: "directive field has no expression".into() })?;
    root.compile(root, compilation, child)?.ok_or_else(|| Error::Compile { reference, message: "no compiler matched directive field".into() })
}

fn compile_body(root: &dyn Compiler, compilation: &Compilation, nodes: &[NodeId]) -> Result<Vec<Instruction>, Error> {
    let mut out = Vec::new();
    for node in nodes {
        if let Some(i) = root.compile(root, compilation, *node)? {
            out.push(i);
        }
    }
    Ok(out)
}

fn identifier_text(compilation: &Compilation, node: NodeId) -> Result<String, Error> {
    // The field's span may carry the directive line's trailing newline
    // (folded in so it doesn't surface as a stray `text` run); trim it off.
    Ok(compilation.tree().document(node).read(compilation.tree().reference(node))?.trim().to_string())
}

struct ForLoop;
impl Compiler for ForLoop {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let kids = compilation.tree().children(tree);
        let header = kids[0];
        let body = &kids[1..kids.len() - 1];
        let header_kids = compilation.tree().children(header);
        let name = identifier_text(compilation, header_kids[1])?;
        let value_instr = compile_field(root, compilation, header_kids[2])?;
        let body_instrs = compile_body(root, compilation, body)?;

        let arr_key = format!("__for_arr_{}", tree.0);
        let idx_key = format!("__for_idx_{}", tree.0);

        let mut loop_body = vec![Instruction::new(Op::Block(vec![
            Instruction::new(Op::PushConst(Value::text(name.clone()))),
            access(&arr_key),
            access(&idx_key),
            Instruction::new(Op::Get),
            Instruction::new(Op::Alloc),
        ]))];
        loop_body.extend(body_instrs);
        loop_body.push(Instruction::new(Op::Block(vec![
            Instruction::new(Op::PushConst(Value::text(idx_key.clone()))),
            access(&idx_key),
            Instruction::new(Op::PushConst(Value::Number(1.0))),
            Instruction::new(Op::Sum),
            Instruction::new(Op::Alloc),
        ])));
        loop_body.push(for_condition(&arr_key, &idx_key));

        Ok(Some(Instruction::new(Op::Block(vec![
            Instruction::new(Op::Block(vec![Instruction::new(Op::PushConst(Value::text(arr_key.clone()))), value_instr, Instruction::new(Op::Alloc)])),
            Instruction::new(Op::Block(vec![
                Instruction::new(Op::PushConst(Value::text(idx_key.clone()))),
                Instruction::new(Op::PushConst(Value::Number(0.0))),
                Instruction::new(Op::Alloc),
            ])),
            for_condition(&arr_key, &idx_key),
            Instruction::new(Op::Repeat(Box::new(Instruction::new(Op::Block(loop_body))))),
        ]))))
    }
}

struct WhileLoop;
impl Compiler for WhileLoop {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let kids = compilation.tree().children(tree);
        let header = kids[0];
        let body = &kids[1..kids.len() - 1];
        let header_kids = compilation.tree().children(header);
        let cond_instr = compile_field(root, compilation, header_kids[1])?;
        let body_instrs = compile_body(root, compilation, body)?;

        let check = |c: &Instruction| Instruction::new(Op::Block(vec![c.clone(), Instruction::new(Op::CastBoolean)]));
        let mut loop_body = body_instrs;
        loop_body.push(check(&cond_instr));

        Ok(Some(Instruction::new(Op::Block(vec![check(&cond_instr), Instruction::new(Op::Repeat(Box::new(Instruction::new(Op::Block(loop_body)))))]))))
    }
}

struct CaptureBlock;
impl Compiler for CaptureBlock {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let kids = compilation.tree().children(tree);
        let header = kids[0];
        let body = &kids[1..kids.len() - 1];
        let header_kids = compilation.tree().children(header);
        let name = identifier_text(compilation, header_kids[1])?;
        let body_instrs = compile_body(root, compilation, body)?;

        Ok(Some(Instruction::new(Op::Block(vec![
            Instruction::new(Op::PushConst(Value::text(name))),
            Instruction::new(Op::Capture(Box::new(Instruction::new(Op::Block(body_instrs))))),
            Instruction::new(Op::Alloc),
        ]))))
    }
}

struct IfElse;
impl Compiler for IfElse {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let kids = compilation.tree().children(tree);
        let header = kids[0];
        let body = &kids[1..kids.len() - 1];
        let header_kids = compilation.tree().children(header);
        let cond_instr = compile_field(root, compilation, header_kids[1])?;

        let else_index = body.iter().position(|n| compilation.tree().sketch(*n).borrow().kind() == "keyword:else");
        let (then_nodes, else_nodes): (&[NodeId], &[NodeId]) = match else_index {
            Some(i) => (&body[..i], &body[i + 1..]),
            None => (body, &[]),
        };
        let then_instrs = compile_body(root, compilation, then_nodes)?;
        let else_instrs = compile_body(root, compilation, else_nodes)?;

        Ok(Some(Instruction::new(Op::Block(vec![
            cond_instr,
            Instruction::new(Op::CastBoolean),
            Instruction::new(Op::Branch(Box::new(Instruction::new(Op::Block(then_instrs))), Box::new(Instruction::new(Op::Block(else_instrs))))),
        ]))))
    }
}

/// `#declare`/`#define`: bind a heap name to a value. `quote` distinguishes
/// `#define` (stores the value unevaluated, for later `Eval`) from
/// `#declare` (stores it as-is).
struct Declare {
    quote: bool,
}
impl Compiler for Declare {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let kids = compilation.tree().children(tree);
        let name = identifier_text(compilation, kids[1])?;
        let value_instr = compile_field(root, compilation, kids[2])?;
        let mut seq = vec![Instruction::new(Op::PushConst(Value::text(name))), value_instr];
        if self.quote {
            seq.push(Instruction::new(Op::CastQuote));
        }
        seq.push(Instruction::new(Op::Alloc));
        Ok(Some(Instruction::new(Op::Block(seq))))
    }
}

/// `#error`/`#message` (both file an error diagnostic) and `#console`
/// (prints straight to the document's console), sharing one shape: a
/// single rest-of-line expression fed into one terminal Op.
struct RestOfLineAction {
    op: Op,
}
impl Compiler for RestOfLineAction {
    fn compile(&self, root: &dyn Compiler, compilation: &Compilation, tree: NodeId) -> Result<Option<Instruction>, Error> {
        let kids = compilation.tree().children(tree);
        let value_instr = compile_field(root, compilation, kids[1])?;
        Ok(Some(Instruction::new(Op::Block(vec![value_instr, Instruction::new(self.op.clone())]))))
    }
}

pub fn spec() -> Spec {
    Spec::new("commands")
        .with_parser(directive(r"#for\b", "keyword:for", vec![(Field::Identifier, "identifier:for-name"), (Field::RestOfLine, "expr:for-value")]))
        .with_parser(directive(r"#while\b", "keyword:while", vec![(Field::RestOfLine, "expr:while-value")]))
        .with_parser(directive(r"#if\b", "keyword:if", vec![(Field::RestOfLine, "expr:if-value")]))
        .with_parser(directive(r"#capture\b", "keyword:capture", vec![(Field::Identifier, "identifier:capture-name")]))
        .with_parser(directive(r"#declare\b", "keyword:declare", vec![(Field::Identifier, "identifier:declare-name"), (Field::RestOfLine, "expr:declare-value")]))
        .with_parser(directive(r"#define\b", "keyword:define", vec![(Field::Identifier, "identifier:define-name"), (Field::RestOfLine, "expr:define-value")]))
        .with_parser(directive(r"#error\b", "keyword:error", vec![(Field::RestOfLine, "expr:error-value")]))
        .with_parser(directive(r"#message\b", "keyword:message", vec![(Field::RestOfLine, "expr:message-value")]))
        .with_parser(directive(r"#console\b", "keyword:console", vec![(Field::RestOfLine, "expr:console-value")]))
        .with_parser(bare_keyword(r"#endfor\b", "keyword:endfor"))
        .with_parser(bare_keyword(r"#endwhile\b", "keyword:endwhile"))
        .with_parser(bare_keyword(r"#endif\b", "keyword:endif"))
        .with_parser(bare_keyword(r"#else\b", "keyword:else"))
        .with_parser(bare_keyword(r"#endcapture\b", "keyword:endcapture"))
        .with_analyzer(Hierarchy(AFilter { inner: AdjacentRun { count: 3, kind: "header:for".into() }, query: Is("keyword:for") }))
        .with_analyzer(Hierarchy(AFilter { inner: AdjacentRun { count: 2, kind: "header:while".into() }, query: Is("keyword:while") }))
        .with_analyzer(Hierarchy(AFilter { inner: AdjacentRun { count: 2, kind: "header:if".into() }, query: Is("keyword:if") }))
        .with_analyzer(Hierarchy(AFilter { inner: AdjacentRun { count: 2, kind: "header:capture".into() }, query: Is("keyword:capture") }))
        .with_analyzer(Hierarchy(AFilter { inner: AdjacentRun { count: 3, kind: "command:declare".into() }, query: Is("keyword:declare") }))
        .with_analyzer(Hierarchy(AFilter { inner: AdjacentRun { count: 3, kind: "command:define".into() }, query: Is("keyword:define") }))
        .with_analyzer(Hierarchy(AFilter { inner: AdjacentRun { count: 2, kind: "command:error".into() }, query: Is("keyword:error") }))
        .with_analyzer(Hierarchy(AFilter { inner: AdjacentRun { count: 2, kind: "command:message".into() }, query: Is("keyword:message") }))
        .with_analyzer(Hierarchy(AFilter { inner: AdjacentRun { count: 2, kind: "command:console".into() }, query: Is("keyword:console") }))
        .with_analyzer(Hierarchy(AFilter {
            inner: BinaryFlow { start_kind: "header:for", end_kind: "keyword:endfor", wrapper_kind: "flow:for".into() },
            query: Is("header:for"),
        }))
        .with_analyzer(Hierarchy(AFilter {
            inner: BinaryFlow { start_kind: "header:while", end_kind: "keyword:endwhile", wrapper_kind: "flow:while".into() },
            query: Is("header:while"),
        }))
        .with_analyzer(Hierarchy(AFilter {
            inner: BinaryFlow { start_kind: "header:if", end_kind: "keyword:endif", wrapper_kind: "flow:if".into() },
            query: Is("header:if"),
        }))
        .with_analyzer(Hierarchy(AFilter {
            inner: BinaryFlow { start_kind: "header:capture", end_kind: "keyword:endcapture", wrapper_kind: "flow:capture".into() },
            query: Is("header:capture"),
        }))
        .with_compiler(First(vec![
            Box::new(Filter { inner: ForLoop, query: Is("flow:for") }),
            Box::new(Filter { inner: WhileLoop, query: Is("flow:while") }),
            Box::new(Filter { inner: IfElse, query: Is("flow:if") }),
            Box::new(Filter { inner: CaptureBlock, query: Is("flow:capture") }),
            Box::new(Filter { inner: Declare { quote: false }, query: Is("command:declare") }),
            Box::new(Filter { inner: Declare { quote: true }, query: Is("command:define") }),
            Box::new(Filter { inner: RestOfLineAction { op: Op::Serr }, query: Is("command:error") }),
            Box::new(Filter { inner: RestOfLineAction { op: Op::Serr }, query: Is("command:message") }),
            Box::new(Filter { inner: RestOfLineAction { op: Op::Print }, query: Is("command:console") }),
        ]))
}
