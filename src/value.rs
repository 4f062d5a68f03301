// The polymorphic Value sum type and its `eval` pipe protocol. Values are
// immutable and reference-counted the way the teacher's own `Value` enum
// shares its `Str`/`List`/`Map` payloads via `Rc` (`vm.rs`); this crate's
// variants are the richer Text/Number/Boolean/Array/Object/Pair/Quote/Glue
// set the pipeline actually needs, but the "small tagged sum, no
// inheritance, type-checked operator methods" shape is carried over
// directly.

use std::rc::Rc;

use crate::error::Error;
use crate::memory::Memory;

/// Every pipe recurses at most this many Values deep before giving up --
/// the depth limit the design notes call for in place of a visited-set,
/// since `Value` itself has no way to reference its own ancestors (no
/// variant holds a back-pointer into the structure being evaluated).
pub const MAX_PIPE_DEPTH: usize = 256;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Text(Rc<String>),
    Number(f64),
    Boolean(bool),
    Array(Rc<Vec<Value>>),
    Object(Rc<Vec<(Value, Value)>>),
    Pair(Rc<(Value, Value)>),
    /// Stringification barrier: `eval` renders a Quote's contents without
    /// unwrapping them further, so glue/cast of an already-quoted value is
    /// idempotent.
    Quote(Rc<Value>),
    /// The fused contents of a frame's operand stack, produced by
    /// `GlueFrame`.
    Glue(Rc<Vec<Value>>),
}

macro_rules! operator {
    (bin $name:ident { $( $p:pat => $e:expr ),+ $(,)? } ) => {
        pub fn $name(&self, other: &Value) -> Result<Value, Error> {
            use Value::*;
            #[allow(unreachable_patterns)]
            match (self, other) {
                $($p => Ok($e)),+,
                (a, b) => Err(Error::Execution(format!("type mismatch: {} vs {}", a.type_name(), b.type_name()))),
            }
        }
    };
}

impl Value {
    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(Rc::new(s.into()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Pair(_) => "pair",
            Value::Quote(_) => "quote",
            Value::Glue(_) => "glue",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The lazy pipe: render `self` to text with respect to `memory`.
    /// Guarded by a recursion budget rather than the unspecified behavior
    /// the design this implements leaves to implementors.
    pub fn eval(&self, memory: &Memory) -> Result<String, Error> {
        self.eval_depth(memory, MAX_PIPE_DEPTH)
    }

    fn eval_depth(&self, memory: &Memory, budget: usize) -> Result<String, Error> {
        if budget == 0 {
            return Err(Error::Execution("pipe recursion limit exceeded".into()));
        }
        Ok(match self {
            Value::Null => String::new(),
            Value::Text(s) => s.as_str().to_string(),
            Value::Number(n) => format_number(*n),
            Value::Boolean(b) => b.to_string(),
            Value::Array(items) => {
                let mut out = String::new();
                for item in items.iter() {
                    out.push_str(&item.eval_depth(memory, budget - 1)?);
                }
                out
            }
            Value::Object(pairs) => {
                let mut out = String::new();
                for (k, v) in pairs.iter() {
                    out.push_str(&k.eval_depth(memory, budget - 1)?);
                    out.push_str(&v.eval_depth(memory, budget - 1)?);
                }
                out
            }
            Value::Pair(kv) => {
                let mut out = kv.0.eval_depth(memory, budget - 1)?;
                out.push_str(&kv.1.eval_depth(memory, budget - 1)?);
                out
            }
            Value::Quote(inner) => inner.eval_depth(memory, budget - 1)?,
            Value::Glue(items) => {
                let mut out = String::new();
                for item in items.iter() {
                    out.push_str(&item.eval_depth(memory, budget - 1)?);
                }
                out
            }
        })
    }

    /// Apply `transform` to `self`, yielding another lazy Value (composable
    /// pipes, per the data model's `apply(transform)` contract).
    pub fn apply(&self, transform: impl FnOnce(&Value) -> Value) -> Value {
        transform(self)
    }

    pub fn cast_text(&self) -> Result<Value, Error> {
        Ok(Value::text(self.eval(&Memory::scratch())?))
    }

    pub fn cast_boolean(&self) -> Result<Value, Error> {
        Ok(Value::Boolean(match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            Value::Pair(_) => true,
            Value::Quote(inner) => inner.cast_boolean()?.as_bool(),
            Value::Glue(items) => !items.is_empty(),
        }))
    }

    pub fn cast_number(&self) -> Result<Value, Error> {
        let n = match self {
            Value::Number(n) => *n,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Text(s) => s.trim().parse::<f64>().map_err(|_| Error::Execution(format!("cannot cast {:?} to number", s)))?,
            Value::Quote(inner) => return inner.cast_number(),
            other => return Err(Error::Execution(format!("cannot cast {} to number", other.type_name()))),
        };
        Ok(Value::Number(n))
    }

    pub fn cast_array(&self) -> Result<Value, Error> {
        match self {
            Value::Array(_) => Ok(self.clone()),
            Value::Glue(items) => Ok(Value::Array(items.clone())),
            Value::Null => Ok(Value::Array(Rc::new(Vec::new()))),
            other => Ok(Value::Array(Rc::new(vec![other.clone()]))),
        }
    }

    pub fn cast_object(&self) -> Result<Value, Error> {
        match self {
            Value::Object(_) => Ok(self.clone()),
            // a Glue of Pairs is exactly what a compiled object literal
            // produces (PushFrame, one MakePair per entry, GlueFrame).
            Value::Glue(items) => Value::build_object(items.as_ref().clone()),
            Value::Null => Ok(Value::Object(Rc::new(Vec::new()))),
            other => Err(Error::Execution(format!("cannot cast {} to object", other.type_name()))),
        }
    }

    pub fn cast_pair(&self) -> Result<Value, Error> {
        match self {
            Value::Pair(_) => Ok(self.clone()),
            other => Err(Error::Execution(format!("cannot cast {} to pair", other.type_name()))),
        }
    }

    pub fn cast_quote(&self) -> Value {
        match self {
            Value::Quote(_) => self.clone(),
            other => Value::Quote(Rc::new(other.clone())),
        }
    }

    pub fn cast_glue(&self) -> Value {
        match self {
            Value::Glue(_) => self.clone(),
            Value::Array(items) => Value::Glue(items.clone()),
            other => Value::Glue(Rc::new(vec![other.clone()])),
        }
    }

    /// Fold a stack of Pairs (as produced by `Split`-the-reverse) into an
    /// Object, the compile-time companion to `Split`.
    pub fn build_object(pairs: Vec<Value>) -> Result<Value, Error> {
        let mut out = Vec::with_capacity(pairs.len());
        for value in pairs {
            match value {
                Value::Pair(kv) => out.push((kv.0.clone(), kv.1.clone())),
                other => return Err(Error::Execution(format!("BuildObject expects pairs, got {}", other.type_name()))),
            }
        }
        Ok(Value::Object(Rc::new(out)))
    }

    /// Spread an Array (or the Pairs of an Object) onto a flat Vec, the
    /// inverse of `build_object`/array construction.
    pub fn split(&self) -> Result<Vec<Value>, Error> {
        match self {
            Value::Array(items) => Ok(items.as_ref().clone()),
            Value::Object(pairs) => Ok(pairs.iter().map(|(k, v)| Value::Pair(Rc::new((k.clone(), v.clone())))).collect()),
            Value::Glue(items) => Ok(items.as_ref().clone()),
            other => Err(Error::Execution(format!("cannot split {}", other.type_name()))),
        }
    }

    fn as_bool(&self) -> bool {
        matches!(self, Value::Boolean(true))
    }

    operator!(bin sum {
        (Number(a), Number(b)) => Number(a + b),
        (Text(a), Text(b)) => Text(Rc::new(format!("{}{}", a, b))),
    });

    operator!(bin difference {
        (Number(a), Number(b)) => Number(a - b),
    });

    operator!(bin multiply {
        (Number(a), Number(b)) => Number(a * b),
    });

    operator!(bin quotient {
        (Number(a), Number(b)) => Number(a / b),
    });

    operator!(bin modulo {
        (Number(a), Number(b)) => Number(a % b),
    });

    operator!(bin and {
        (Boolean(a), Boolean(b)) => Boolean(*a && *b),
    });

    operator!(bin or {
        (Boolean(a), Boolean(b)) => Boolean(*a || *b),
    });

    pub fn negate(&self) -> Result<Value, Error> {
        match self {
            Value::Boolean(b) => Ok(Value::Boolean(!b)),
            other => Err(Error::Execution(format!("cannot negate {}", other.type_name()))),
        }
    }

    /// -1/0/+1, per the instruction set's `Compare` contract; the `Less`/
    /// `LessEqual`/`Greater`/`GreaterEqual` instructions all sign-test the
    /// result of this rather than duplicating the ordering rules.
    pub fn compare(&self, other: &Value) -> Result<Value, Error> {
        let ord = match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => return Err(Error::Execution(format!("cannot compare {} to {}", self.type_name(), other.type_name()))),
        };
        let n = match ord {
            Some(std::cmp::Ordering::Less) => -1.0,
            Some(std::cmp::Ordering::Equal) => 0.0,
            Some(std::cmp::Ordering::Greater) => 1.0,
            None => return Err(Error::Execution("unordered comparison".into())),
        };
        Ok(Value::Number(n))
    }
}

/// A double whose fractional part is zero prints as a signed integer
/// literal; otherwise the platform's shortest round-trip decimal.
pub fn format_number(x: f64) -> String {
    if x.is_finite() && x % 1.0 == 0.0 && x.abs() < i64::MAX as f64 {
        format!("{}", x as i64)
    } else {
        format!("{}", x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_valued_number_prints_without_decimal() {
        assert_eq!(format_number(17.0), "17");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(1.5), "1.5");
    }

    #[test]
    fn text_eval_is_identity() {
        let memory = Memory::scratch();
        assert_eq!(Value::text("hi").eval(&memory).unwrap(), "hi");
    }

    #[test]
    fn array_eval_concatenates() {
        let memory = Memory::scratch();
        let v = Value::Array(Rc::new(vec![Value::text("a"), Value::Number(1.0)]));
        assert_eq!(v.eval(&memory).unwrap(), "a1");
    }

    #[test]
    fn quote_is_a_stringification_barrier_but_still_evals() {
        let memory = Memory::scratch();
        let inner = Value::text("raw");
        let quoted = inner.cast_quote();
        assert_eq!(quoted.eval(&memory).unwrap(), "raw");
    }

    #[test]
    fn cast_text_round_trips() {
        let v = Value::Number(42.0);
        let once = v.cast_text().unwrap();
        let twice = once.cast_text().unwrap();
        let memory = Memory::scratch();
        assert_eq!(once.eval(&memory).unwrap(), twice.eval(&memory).unwrap());
    }

    #[test]
    fn cast_number_of_cast_text_round_trips() {
        let n = Value::Number(3.5);
        let text = n.cast_text().unwrap();
        let back = text.cast_number().unwrap();
        assert_eq!(back, Value::Number(3.5));
    }

    #[test]
    fn build_object_of_split_preserves_pairs() {
        let object = Value::Object(Rc::new(vec![(Value::text("k"), Value::text("v"))]));
        let split = object.split().unwrap();
        let rebuilt = Value::build_object(split).unwrap();
        assert_eq!(rebuilt, object);
    }

    #[test]
    fn sum_rejects_mismatched_types() {
        let err = Value::Number(1.0).sum(&Value::Boolean(true)).unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }

    #[test]
    fn compare_produces_signed_number() {
        assert_eq!(Value::Number(3.0).compare(&Value::Number(5.0)).unwrap(), Value::Number(-1.0));
        assert_eq!(Value::Number(5.0).compare(&Value::Number(3.0)).unwrap(), Value::Number(1.0));
        assert_eq!(Value::Number(3.0).compare(&Value::Number(3.0)).unwrap(), Value::Number(0.0));
    }
}
