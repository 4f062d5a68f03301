// Memory: a stack of Frames. Each Frame owns an operand stack of Values, a
// console buffer, the instruction that pushed it, and a local heap.
// Generalizes the teacher's `VM` struct (`stack`, `call_stack`,
// `cur_frame` with `return_address`/`frame_pointer`/`arity` in `vm.rs`) to
// this crate's richer per-frame state.

use std::collections::HashMap;

use crate::error::Error;
use crate::value::Value;

#[derive(Default)]
pub struct Frame {
    operands: Vec<Value>,
    console: String,
    heap: HashMap<String, Value>,
}

impl Frame {
    pub fn new() -> Frame {
        Frame::default()
    }

    pub fn push(&mut self, value: Value) {
        self.operands.push(value);
    }

    pub fn pop(&mut self) -> Result<Value, Error> {
        self.operands.pop().ok_or_else(|| Error::Execution("operand stack underflow".into()))
    }

    pub fn peek(&self) -> Result<&Value, Error> {
        self.operands.last().ok_or_else(|| Error::Execution("operand stack underflow".into()))
    }

    pub fn operands(&self) -> &[Value] {
        &self.operands
    }

    pub fn console(&self) -> &str {
        &self.console
    }

    pub fn print(&mut self, text: &str) {
        self.console.push_str(text);
    }

    pub fn heap_get(&self, name: &str) -> Option<&Value> {
        self.heap.get(name)
    }

    pub fn heap_set(&mut self, name: impl Into<String>, value: Value) {
        self.heap.insert(name.into(), value);
    }
}

pub struct Memory {
    frames: Vec<Frame>,
}

impl Memory {
    pub fn new() -> Memory {
        Memory { frames: vec![Frame::new()] }
    }

    /// A throwaway single-frame Memory, for casts/tests that need
    /// something to `eval` against but touch no heap or console state.
    pub fn scratch() -> Memory {
        Memory::new()
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Frame::new());
    }

    /// Pop the innermost frame, discarding its console and operand stack.
    pub fn pop_frame(&mut self) -> Result<Frame, Error> {
        if self.frames.len() <= 1 {
            return Err(Error::Execution("cannot pop the root frame".into()));
        }
        self.frames.pop().ok_or_else(|| Error::Execution("frame stack underflow".into()))
    }

    /// Pop the innermost frame, merging its console into the frame below.
    pub fn dump_frame(&mut self) -> Result<(), Error> {
        let popped = self.pop_frame()?;
        self.top_mut()?.console.push_str(&popped.console);
        Ok(())
    }

    pub fn top(&self) -> Result<&Frame, Error> {
        self.frames.last().ok_or_else(|| Error::Execution("no frames".into()))
    }

    pub fn top_mut(&mut self) -> Result<&mut Frame, Error> {
        self.frames.last_mut().ok_or_else(|| Error::Execution("no frames".into()))
    }

    pub fn root(&self) -> &Frame {
        &self.frames[0]
    }

    pub fn root_mut(&mut self) -> &mut Frame {
        &mut self.frames[0]
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Walk innermost-to-outermost so that an inner frame's binding shadows
    /// an outer one of the same name.
    pub fn heap_access(&self, name: &str) -> Value {
        for frame in self.frames.iter().rev() {
            if let Some(v) = frame.heap_get(name) {
                return v.clone();
            }
        }
        Value::Null
    }

    /// `Alloc`: always writes to the root frame.
    pub fn heap_alloc(&mut self, name: impl Into<String>, value: Value) {
        self.root_mut().heap_set(name, value);
    }

    /// `Set`: writes to the innermost (top) frame only.
    pub fn heap_set_local(&mut self, name: impl Into<String>, value: Value) -> Result<(), Error> {
        self.top_mut()?.heap_set(name, value);
        Ok(())
    }
}

impl Default for Memory {
    fn default() -> Memory {
        Memory::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_frame_shadows_outer() {
        let mut memory = Memory::new();
        memory.heap_alloc("x", Value::text("outer"));
        memory.push_frame();
        memory.heap_set_local("x", Value::text("inner")).unwrap();
        assert_eq!(memory.heap_access("x"), Value::text("inner"));
        memory.pop_frame().unwrap();
        assert_eq!(memory.heap_access("x"), Value::text("outer"));
    }

    #[test]
    fn dump_frame_merges_console() {
        let mut memory = Memory::new();
        memory.root_mut().print("a");
        memory.push_frame();
        memory.top_mut().unwrap().print("b");
        memory.dump_frame().unwrap();
        assert_eq!(memory.root().console(), "ab");
    }

    #[test]
    fn cannot_pop_root_frame() {
        let mut memory = Memory::new();
        assert!(memory.pop_frame().is_err());
    }

    #[test]
    fn alloc_always_targets_root() {
        let mut memory = Memory::new();
        memory.push_frame();
        memory.heap_alloc("g", Value::Number(1.0));
        memory.pop_frame().unwrap();
        assert_eq!(memory.heap_access("g"), Value::Number(1.0));
    }
}
