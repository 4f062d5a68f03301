// A Sketch is the mutable metadata record a parser publishes alongside the
// Tree node it's attached to: a dotted `kind`, a `name`, and a map from
// component keys ("open", "close", "left", "right", "body", ...) to child
// sketches. Analyzers and compilers read these keys back out instead of
// re-scanning the tree.
//
// Parent links are non-owning (`Weak`) so a sketch graph never holds a
// cycle; the forward binding to a real Tree node is an index into the
// Tree arena, set once a parser actually offers the node.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::tree::NodeId;

pub type SketchRef = Rc<RefCell<Sketch>>;

#[derive(Debug)]
pub struct Sketch {
    kind: String,
    name: String,
    children: HashMap<String, SketchRef>,
    parent: Option<Weak<RefCell<Sketch>>>,
    tree: Option<NodeId>,
}

impl Sketch {
    pub fn new(kind: impl Into<String>) -> SketchRef {
        Rc::new(RefCell::new(Sketch {
            kind: kind.into(),
            name: String::new(),
            children: HashMap::new(),
            parent: None,
            tree: None,
        }))
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn set_kind(&mut self, kind: impl Into<String>) {
        self.kind = kind.into();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn tree(&self) -> Option<NodeId> {
        self.tree
    }

    /// Bind this sketch to the Tree node that a parser has just offered.
    pub fn set_tree(&mut self, id: NodeId) {
        self.tree = Some(id);
    }

    pub fn child(&self, key: &str) -> Option<SketchRef> {
        self.children.get(key).cloned()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.children.keys()
    }

    /// Attach `child` under `key`, pointing its parent back at `self`.
    /// `self_rc` must be the `Rc` this `Sketch` is stored behind.
    pub fn put_child(self_rc: &SketchRef, key: impl Into<String>, child: SketchRef) {
        child.borrow_mut().parent = Some(Rc::downgrade(self_rc));
        self_rc.borrow_mut().children.insert(key.into(), child);
    }

    pub fn parent(&self) -> Option<SketchRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_roundtrip() {
        let root = Sketch::new("operator:adder");
        let left = Sketch::new("literal:number");
        Sketch::put_child(&root, "left", left.clone());

        assert_eq!(root.borrow().child("left").unwrap().borrow().kind(), "literal:number");
        assert!(left.borrow().parent().is_some());
    }

    #[test]
    fn tree_binding_starts_unset() {
        let s = Sketch::new("kind");
        assert!(s.borrow().tree().is_none());
        s.borrow_mut().set_tree(NodeId(3));
        assert_eq!(s.borrow().tree(), Some(NodeId(3)));
    }
}
