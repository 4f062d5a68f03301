// The Ordered Interval Tree: every syntactic or semantic fragment recognized
// over a Document lives here as a node. Nodes are stored in a flat arena
// (`Vec<Node>`); parent/previous/next/child links are indices, never owning
// pointers, so the structure can't form an ownership cycle -- only `offer`,
// `pop`, and `remove` ever rewrite those indices, and each rewrite happens
// under the borrow of a single `&mut Tree` call.

use crate::error::{Error, IllegalTree};
use crate::reference::{dominance, Dominance, DocumentHandle, Reference};
use crate::sketch::{Sketch, SketchRef};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

struct Node {
    document: DocumentHandle,
    reference: Reference,
    weight: i32,
    sketch: SketchRef,
    parent: Option<NodeId>,
    previous: Option<NodeId>,
    next: Option<NodeId>,
    child: Option<NodeId>,
}

pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    /// A fresh tree whose root spans the whole document.
    pub fn new(document: DocumentHandle) -> Tree {
        let reference = document.whole();
        let root = Node {
            document: document.clone(),
            reference,
            weight: 0,
            sketch: Sketch::new("root"),
            parent: None,
            previous: None,
            next: None,
            child: None,
        };
        Tree { nodes: vec![root], root: NodeId(0) }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Allocate a free-standing node, not yet part of the structure. The
    /// caller must `offer` it before relying on parent/sibling links.
    pub fn create(&mut self, document: DocumentHandle, reference: Reference, weight: i32, sketch: SketchRef) -> NodeId {
        self.nodes.push(Node { document, reference, weight, sketch, parent: None, previous: None, next: None, child: None });
        NodeId(self.nodes.len() - 1)
    }

    pub fn document(&self, id: NodeId) -> &DocumentHandle {
        &self.nodes[id.0].document
    }

    pub fn reference(&self, id: NodeId) -> Reference {
        self.nodes[id.0].reference
    }

    pub fn weight(&self, id: NodeId) -> i32 {
        self.nodes[id.0].weight
    }

    pub fn sketch(&self, id: NodeId) -> SketchRef {
        self.nodes[id.0].sketch.clone()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn previous(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].previous
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].next
    }

    pub fn child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].child
    }

    /// Children of `id`, left to right.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.nodes[id.0].child;
        while let Some(c) = cur {
            out.push(c);
            cur = self.nodes[c.0].next;
        }
        out
    }

    /// `id` and every descendant, depth-first, pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![id];
        for child in self.children(id) {
            out.extend(self.descendants(child));
        }
        out
    }

    /// Walk backward through `previous` links to find the owning parent,
    /// since only the head of a sibling chain carries a direct `parent`
    /// pointer (the tree's "exactly one of parent/previous" invariant).
    fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = id;
        loop {
            let n = &self.nodes[cur.0];
            if let Some(p) = n.parent {
                return Some(p);
            }
            match n.previous {
                Some(p) => cur = p,
                None => return None,
            }
        }
    }

    fn is_attached(&self, id: NodeId) -> bool {
        id == self.root || self.nodes[id.0].parent.is_some() || self.nodes[id.0].previous.is_some()
    }

    fn dominance_of(&self, a: NodeId, b: NodeId) -> Result<Dominance, Error> {
        let ra = self.nodes[a.0].reference;
        let rb = self.nodes[b.0].reference;
        dominance(ra.position(), ra.end(), rb.position(), rb.end())
    }

    /// The sole mutation operation. Detaches `incoming` from wherever it
    /// currently sits (a no-op if it's already free-standing), then places
    /// it relative to `anchor` per the dominance dispatch in the tree's
    /// placement contract. Every fatal failure (`Takeover`/`Clash`/
    /// `OutOfBounds`) leaves the tree unchanged.
    pub fn offer(&mut self, anchor: NodeId, incoming: NodeId) -> Result<(), Error> {
        self.pop(incoming);
        self.offer_against(anchor, incoming)
    }

    fn offer_against(&mut self, target: NodeId, incoming: NodeId) -> Result<(), Error> {
        match self.dominance_of(target, incoming)? {
            Dominance::None => self.offer_irrelative(target, incoming),
            Dominance::Contain => self.offer_parent(target, incoming),
            Dominance::Exact => self.offer_same(target, incoming),
            Dominance::Part => self.offer_child(target, incoming),
            Dominance::Share => Err(Error::IllegalTree(IllegalTree::Clash)),
        }
    }

    /// NONE at `start`: walk up ancestors until one PART-dominates
    /// `incoming` (i.e. encloses it), then delegate to sibling placement
    /// under that ancestor.
    fn offer_irrelative(&mut self, start: NodeId, incoming: NodeId) -> Result<(), Error> {
        let mut cur = start;
        loop {
            match self.dominance_of(cur, incoming)? {
                Dominance::Part => return self.offer_sibling(cur, incoming),
                Dominance::Contain | Dominance::Exact => return self.offer_against(cur, incoming),
                Dominance::Share => return Err(Error::IllegalTree(IllegalTree::Clash)),
                Dominance::None => match self.parent_of(cur) {
                    Some(p) => cur = p,
                    None => return Err(Error::IllegalTree(IllegalTree::OutOfBounds)),
                },
            }
        }
    }

    /// `parent` PART-dominates `incoming`: find `incoming`'s place among
    /// `parent`'s children by position, descending into an overlapping
    /// child instead of splicing beside it when one exists.
    fn offer_sibling(&mut self, parent: NodeId, incoming: NodeId) -> Result<(), Error> {
        let incoming_pos = self.nodes[incoming.0].reference.position();
        let mut prev: Option<NodeId> = None;
        let mut cur = self.nodes[parent.0].child;
        while let Some(c) = cur {
            match self.dominance_of(c, incoming)? {
                Dominance::Part | Dominance::Contain | Dominance::Exact => {
                    return self.offer_against(c, incoming);
                }
                Dominance::Share => return Err(Error::IllegalTree(IllegalTree::Clash)),
                Dominance::None => {
                    if self.nodes[c.0].reference.position() > incoming_pos {
                        break;
                    }
                    prev = Some(c);
                    cur = self.nodes[c.0].next;
                }
            }
        }
        self.splice(Some(parent), prev, cur, incoming);
        Ok(())
    }

    /// `target` is CONTAINed by `incoming` (the resolved asymmetry: here
    /// CONTAIN means "incoming encloses target"). Collect the contiguous
    /// run of siblings around `target` that `incoming` also encloses, then
    /// make that run `incoming`'s child chain and splice `incoming` into
    /// the gap the run used to occupy.
    fn offer_parent(&mut self, target: NodeId, incoming: NodeId) -> Result<(), Error> {
        let mut left = target;
        while let Some(p) = self.nodes[left.0].previous {
            match self.dominance_of(p, incoming)? {
                Dominance::Contain => left = p,
                Dominance::Share => return Err(Error::IllegalTree(IllegalTree::Clash)),
                _ => break,
            }
        }
        let mut right = target;
        while let Some(n) = self.nodes[right.0].next {
            match self.dominance_of(n, incoming)? {
                Dominance::Contain => right = n,
                Dominance::Share => return Err(Error::IllegalTree(IllegalTree::Clash)),
                _ => break,
            }
        }

        let grandparent = self.parent_of(left);
        let before = self.nodes[left.0].previous;
        let after = self.nodes[right.0].next;

        self.nodes[left.0].parent = Some(incoming);
        self.nodes[left.0].previous = None;
        self.nodes[right.0].next = None;
        self.nodes[incoming.0].child = Some(left);

        self.splice(grandparent, before, after, incoming);
        Ok(())
    }

    /// EXACT: equal weight is fatal (`Takeover`); otherwise the
    /// lower-weight node ends up outer.
    fn offer_same(&mut self, target: NodeId, incoming: NodeId) -> Result<(), Error> {
        let target_weight = self.nodes[target.0].weight;
        let incoming_weight = self.nodes[incoming.0].weight;
        if target_weight == incoming_weight {
            return Err(Error::IllegalTree(IllegalTree::Takeover));
        }
        if target_weight < incoming_weight {
            self.offer_child(target, incoming)
        } else {
            self.offer_parent(target, incoming)
        }
    }

    /// `target` PART-dominates `incoming` (`target` encloses it): attach
    /// directly if childless, otherwise dispatch against the existing
    /// children.
    fn offer_child(&mut self, target: NodeId, incoming: NodeId) -> Result<(), Error> {
        if self.nodes[target.0].child.is_none() {
            self.nodes[incoming.0].parent = Some(target);
            self.nodes[target.0].child = Some(incoming);
            Ok(())
        } else {
            self.offer_sibling(target, incoming)
        }
    }

    /// Link `node` into the gap between `prev` and `next` under `parent`
    /// (exactly one of `parent`/`previous` ends up set, per the tree's
    /// invariant).
    fn splice(&mut self, parent: Option<NodeId>, prev: Option<NodeId>, next: Option<NodeId>, node: NodeId) {
        self.nodes[node.0].previous = prev;
        self.nodes[node.0].next = next;
        self.nodes[node.0].parent = if prev.is_none() { parent } else { None };
        match prev {
            Some(p) => self.nodes[p.0].next = Some(node),
            None => {
                if let Some(par) = parent {
                    self.nodes[par.0].child = Some(node);
                }
            }
        }
        if let Some(n) = next {
            self.nodes[n.0].previous = Some(node);
            if prev.is_none() {
                self.nodes[n.0].parent = None;
            }
        }
    }

    /// Detach `id`, re-linking its children into the gap it occupied. A
    /// no-op if `id` is already free-standing. The root may not be popped.
    pub fn pop(&mut self, id: NodeId) {
        if id == self.root || !self.is_attached(id) {
            return;
        }
        let parent = self.nodes[id.0].parent;
        let previous = self.nodes[id.0].previous;
        let next = self.nodes[id.0].next;
        let child = self.nodes[id.0].child;

        let last_child = child.map(|fc| {
            let mut last = fc;
            while let Some(n) = self.nodes[last.0].next {
                last = n;
            }
            last
        });

        match (child, last_child) {
            (Some(first), Some(last)) => {
                self.splice(parent, previous, next, first);
                self.nodes[last.0].next = next;
                if let Some(n) = next {
                    self.nodes[n.0].previous = Some(last);
                }
            }
            _ => {
                match previous {
                    Some(p) => self.nodes[p.0].next = next,
                    None => {
                        if let Some(par) = parent {
                            self.nodes[par.0].child = next;
                        }
                    }
                }
                if let Some(n) = next {
                    self.nodes[n.0].previous = previous;
                    self.nodes[n.0].parent = if previous.is_none() { parent } else { None };
                }
            }
        }

        self.nodes[id.0].parent = None;
        self.nodes[id.0].previous = None;
        self.nodes[id.0].next = None;
        self.nodes[id.0].child = None;
    }

    /// Detach `id` without re-parenting its children: the subtree rooted
    /// at `id` is dropped from the structure but stays intact and
    /// reachable through `id` itself.
    pub fn remove(&mut self, id: NodeId) {
        if id == self.root {
            return;
        }
        let parent = self.nodes[id.0].parent;
        let previous = self.nodes[id.0].previous;
        let next = self.nodes[id.0].next;

        match previous {
            Some(p) => self.nodes[p.0].next = next,
            None => {
                if let Some(par) = parent {
                    self.nodes[par.0].child = next;
                }
            }
        }
        if let Some(n) = next {
            self.nodes[n.0].previous = previous;
            self.nodes[n.0].parent = if previous.is_none() { parent } else { None };
        }

        self.nodes[id.0].parent = None;
        self.nodes[id.0].previous = None;
        self.nodes[id.0].next = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::PseudoDocument;

    fn doc(content: &str) -> DocumentHandle {
        DocumentHandle::new(PseudoDocument::new("t", content))
    }

    fn leaf(tree: &mut Tree, document: &DocumentHandle, position: u32, length: u32) -> NodeId {
        tree.create(document.clone(), Reference::new(position, length), 0, Sketch::new("leaf"))
    }

    #[test]
    fn two_disjoint_children_order_by_position() {
        let d = doc("0123456789");
        let mut tree = Tree::new(d.clone());
        let root = tree.root();
        let a = leaf(&mut tree, &d, 0, 3);
        let b = leaf(&mut tree, &d, 3, 3);
        tree.offer(root, b).unwrap();
        tree.offer(root, a).unwrap();

        let kids = tree.children(root);
        assert_eq!(kids, vec![a, b]);
        assert_eq!(tree.previous(b), Some(a));
        assert_eq!(tree.parent(a), Some(root));
        assert_eq!(tree.parent(b), None);
    }

    #[test]
    fn part_nests_inside_sibling() {
        let d = doc("0123456789");
        let mut tree = Tree::new(d.clone());
        let root = tree.root();
        let outer = leaf(&mut tree, &d, 0, 6);
        tree.offer(root, outer).unwrap();
        let inner = leaf(&mut tree, &d, 1, 2);
        tree.offer(root, inner).unwrap();

        assert_eq!(tree.parent(inner), Some(outer));
        assert_eq!(tree.children(outer), vec![inner]);
    }

    #[test]
    fn contain_wraps_existing_siblings() {
        let d = doc("0123456789");
        let mut tree = Tree::new(d.clone());
        let root = tree.root();
        let a = leaf(&mut tree, &d, 1, 2);
        let b = leaf(&mut tree, &d, 3, 2);
        tree.offer(root, a).unwrap();
        tree.offer(root, b).unwrap();

        let wrapper = leaf(&mut tree, &d, 0, 6);
        tree.offer(a, wrapper).unwrap();

        assert_eq!(tree.parent(wrapper), Some(root));
        assert_eq!(tree.children(wrapper), vec![a, b]);
    }

    #[test]
    fn exact_equal_weight_is_takeover() {
        let d = doc("0123456789");
        let mut tree = Tree::new(d.clone());
        let root = tree.root();
        let a = leaf(&mut tree, &d, 0, 4);
        tree.offer(root, a).unwrap();
        let b = leaf(&mut tree, &d, 0, 4);
        let err = tree.offer(a, b).unwrap_err();
        assert!(matches!(err, Error::IllegalTree(IllegalTree::Takeover)));
    }

    #[test]
    fn exact_lower_weight_nests_higher_weight_inside() {
        let d = doc("0123456789");
        let mut tree = Tree::new(d.clone());
        let root = tree.root();
        let outer = tree.create(d.clone(), Reference::new(0, 4), 0, Sketch::new("leaf"));
        tree.offer(root, outer).unwrap();
        let inner = tree.create(d.clone(), Reference::new(0, 4), 5, Sketch::new("leaf"));
        tree.offer(outer, inner).unwrap();

        assert_eq!(tree.parent(inner), Some(outer));
    }

    #[test]
    fn share_is_clash() {
        let d = doc("0123456789");
        let mut tree = Tree::new(d.clone());
        let root = tree.root();
        let a = leaf(&mut tree, &d, 0, 4);
        tree.offer(root, a).unwrap();
        let b = leaf(&mut tree, &d, 2, 4);
        let err = tree.offer(a, b).unwrap_err();
        assert!(matches!(err, Error::IllegalTree(IllegalTree::Clash)));
    }

    #[test]
    fn pop_promotes_children_into_the_gap() {
        let d = doc("0123456789");
        let mut tree = Tree::new(d.clone());
        let root = tree.root();
        let outer = leaf(&mut tree, &d, 0, 6);
        tree.offer(root, outer).unwrap();
        let inner = leaf(&mut tree, &d, 1, 2);
        tree.offer(root, inner).unwrap();

        tree.pop(outer);
        assert_eq!(tree.children(root), vec![inner]);
        assert_eq!(tree.parent(inner), Some(root));
        assert_eq!(tree.parent(outer), None);
    }

    #[test]
    fn remove_drops_subtree_but_keeps_it_intact() {
        let d = doc("0123456789");
        let mut tree = Tree::new(d.clone());
        let root = tree.root();
        let outer = leaf(&mut tree, &d, 0, 6);
        tree.offer(root, outer).unwrap();
        let inner = leaf(&mut tree, &d, 1, 2);
        tree.offer(outer, inner).unwrap();

        tree.remove(outer);
        assert!(tree.children(root).is_empty());
        assert_eq!(tree.children(outer), vec![inner]);
    }

    #[test]
    fn offer_detaches_from_prior_position_first() {
        let d = doc("0123456789");
        let mut tree = Tree::new(d.clone());
        let root = tree.root();
        let a = leaf(&mut tree, &d, 0, 3);
        let b = leaf(&mut tree, &d, 3, 3);
        tree.offer(root, a).unwrap();
        tree.offer(root, b).unwrap();

        // re-offer `a` against its own sibling: `offer` pops it first, so
        // this must not duplicate it in the sibling chain -- it lands back
        // in the same slot via the walk-up-to-root fallback.
        tree.offer(b, a).unwrap();
        assert_eq!(tree.children(root), vec![a, b]);
    }
}
