//! Derivation trees over a reference grammar.
//!
//! All nodes of a tree live in one arena and reference each other by index,
//! so subtrees are plain [`NodeId`] handles into the owning tree and paths
//! are cheap vectors of child indices. Trees are immutable once built.

use std::fmt::Display;
use std::ops::Range;

use smallvec::SmallVec;

use crate::grammar::Symbol;

/// A path from the root: the sequence of child indices to follow. Paths
/// compare lexicographically, which coincides with left-to-right pre-order.
pub type Path = SmallVec<[usize; 4]>;

/// Returns true iff `a` is a (possibly equal) prefix of `b`.
pub fn path_is_prefix(a: &[usize], b: &[usize]) -> bool {
    a.len() <= b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

/// Index of a node within its [`DerivationTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    symbol: Symbol,
    parent: Option<NodeId>,
    index_in_parent: usize,
    /// `None` for an open nonterminal; `Some` (possibly empty) once expanded.
    children: Option<Vec<NodeId>>,
}

/// A rooted, ordered, labelled tree. A node is *open* if it is a nonterminal
/// without children, *terminal* if its label is a literal, *inner* otherwise.
#[derive(Debug, Clone)]
pub struct DerivationTree {
    nodes: Vec<NodeData>,
}

impl DerivationTree {
    pub fn new(root: Symbol) -> Self {
        DerivationTree {
            nodes: vec![NodeData {
                symbol: root,
                parent: None,
                index_in_parent: 0,
                children: None,
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// The number of nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Appends a child under `parent` and returns its id. Terminal nodes
    /// cannot take children.
    pub fn add_child(&mut self, parent: NodeId, symbol: Symbol) -> NodeId {
        assert!(
            !self.nodes[parent.0].symbol.is_terminal(),
            "terminal node {} cannot have children",
            parent
        );
        let id = NodeId(self.nodes.len());
        let index_in_parent = {
            let slot = self.nodes[parent.0].children.get_or_insert_with(Vec::new);
            slot.push(id);
            slot.len() - 1
        };
        self.nodes.push(NodeData {
            symbol,
            parent: Some(parent),
            index_in_parent,
            children: None,
        });
        id
    }

    /// Marks an open nonterminal as expanded to the empty sequence.
    pub fn mark_expanded(&mut self, node: NodeId) {
        self.nodes[node.0].children.get_or_insert_with(Vec::new);
    }

    pub fn symbol(&self, node: NodeId) -> &Symbol {
        &self.nodes[node.0].symbol
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> Option<&[NodeId]> {
        self.nodes[node.0].children.as_deref()
    }

    pub fn is_open(&self, node: NodeId) -> bool {
        !self.nodes[node.0].symbol.is_terminal() && self.nodes[node.0].children.is_none()
    }

    /// The nonterminal type of the node, if it is labelled with one.
    pub fn nonterminal(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].symbol {
            Symbol::Nonterminal(name) => Some(name),
            Symbol::Terminal(_) => None,
        }
    }

    /// The path of `node`, built by walking to the root.
    pub fn path(&self, node: NodeId) -> Path {
        let mut rev: Path = SmallVec::new();
        let mut cur = node;
        while let Some(parent) = self.nodes[cur.0].parent {
            rev.push(self.nodes[cur.0].index_in_parent);
            cur = parent;
        }
        rev.reverse();
        rev
    }

    /// Resolves a path against the root.
    pub fn at(&self, path: &[usize]) -> Option<NodeId> {
        let mut cur = self.root();
        for &index in path {
            cur = *self.children(cur)?.get(index)?;
        }
        Some(cur)
    }

    /// Lazy pre-order traversal of `(path, node)` pairs, starting at the root.
    pub fn paths(&self) -> Paths<'_> {
        Paths {
            tree: self,
            stack: vec![(SmallVec::new(), self.root())],
        }
    }

    /// All nodes in the subtree rooted at `from` (itself included) whose
    /// label is the nonterminal `typ`, in pre-order.
    pub fn nodes_of_type(&self, from: NodeId, typ: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if self.nonterminal(node) == Some(typ) {
                out.push(node);
            }
            if let Some(children) = self.children(node) {
                stack.extend(children.iter().rev().copied());
            }
        }
        // The stack yields pre-order already; nothing to sort.
        out
    }

    /// True iff every leaf under `from` is a terminal.
    pub fn is_closed_at(&self, from: NodeId) -> bool {
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if self.is_open(node) {
                return false;
            }
            if let Some(children) = self.children(node) {
                stack.extend(children.iter().copied());
            }
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed_at(self.root())
    }

    /// The yield of the subtree at `from`: its terminal labels concatenated
    /// in left-to-right order. Open nodes contribute nothing.
    pub fn yield_of(&self, from: NodeId) -> String {
        let mut out = String::new();
        self.walk_yield(from, &mut out);
        out
    }

    fn walk_yield(&self, node: NodeId, out: &mut String) {
        match &self.nodes[node.0].symbol {
            Symbol::Terminal(text) => out.push_str(text),
            Symbol::Nonterminal(_) => {
                if let Some(children) = self.children(node) {
                    for &child in children {
                        self.walk_yield(child, out);
                    }
                }
            }
        }
    }

    /// Every node of the subtree at `from` paired with the half-open range
    /// its yield occupies within `from`'s yield, in pre-order.
    pub fn yield_spans(&self, from: NodeId) -> Vec<(NodeId, Range<usize>)> {
        let mut out = Vec::new();
        let mut pos = 0usize;
        self.walk_spans(from, &mut pos, &mut out);
        out
    }

    fn walk_spans(&self, node: NodeId, pos: &mut usize, out: &mut Vec<(NodeId, Range<usize>)>) {
        let slot = out.len();
        out.push((node, *pos..*pos));
        match &self.nodes[node.0].symbol {
            Symbol::Terminal(text) => *pos += text.len(),
            Symbol::Nonterminal(_) => {
                if let Some(children) = self.children(node) {
                    for &child in children {
                        self.walk_spans(child, pos, out);
                    }
                }
            }
        }
        out[slot].1.end = *pos;
    }

    fn structurally_equal(&self, a: NodeId, other: &DerivationTree, b: NodeId) -> bool {
        if self.symbol(a) != other.symbol(b) {
            return false;
        }
        match (self.children(a), other.children(b)) {
            (None, None) => true,
            (Some(ca), Some(cb)) => {
                ca.len() == cb.len()
                    && ca
                        .iter()
                        .zip(cb.iter())
                        .all(|(&x, &y)| self.structurally_equal(x, other, y))
            }
            _ => false,
        }
    }
}

/// Equality is structural over labels and children, independent of arena
/// layout.
impl PartialEq for DerivationTree {
    fn eq(&self, other: &Self) -> bool {
        self.structurally_equal(self.root(), other, other.root())
    }
}

impl Eq for DerivationTree {}

impl Display for DerivationTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.yield_of(self.root()))
    }
}

pub struct Paths<'a> {
    tree: &'a DerivationTree,
    stack: Vec<(Path, NodeId)>,
}

impl Iterator for Paths<'_> {
    type Item = (Path, NodeId);

    fn next(&mut self) -> Option<Self::Item> {
        let (path, node) = self.stack.pop()?;
        if let Some(children) = self.tree.children(node) {
            for (index, &child) in children.iter().enumerate().rev() {
                let mut child_path = path.clone();
                child_path.push(index);
                self.stack.push((child_path, child));
            }
        }
        Some((path, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    /// Builds the derivation tree of `"a := 1 ; b := a"` over the
    /// assignment grammar.
    fn sample_tree() -> DerivationTree {
        let mut t = DerivationTree::new(Symbol::nonterminal("start"));
        let stmt = t.add_child(t.root(), Symbol::nonterminal("stmt"));
        let a1 = t.add_child(stmt, Symbol::nonterminal("assgn"));
        t.add_child(stmt, Symbol::terminal(" ; "));
        let rest = t.add_child(stmt, Symbol::nonterminal("stmt"));
        let a2 = t.add_child(rest, Symbol::nonterminal("assgn"));

        let v1 = t.add_child(a1, Symbol::nonterminal("var"));
        t.add_child(v1, Symbol::terminal("a"));
        t.add_child(a1, Symbol::terminal(" := "));
        let r1 = t.add_child(a1, Symbol::nonterminal("rhs"));
        let d1 = t.add_child(r1, Symbol::nonterminal("digit"));
        t.add_child(d1, Symbol::terminal("1"));

        let v2 = t.add_child(a2, Symbol::nonterminal("var"));
        t.add_child(v2, Symbol::terminal("b"));
        t.add_child(a2, Symbol::terminal(" := "));
        let r2 = t.add_child(a2, Symbol::nonterminal("rhs"));
        let v3 = t.add_child(r2, Symbol::nonterminal("var"));
        t.add_child(v3, Symbol::terminal("a"));
        t
    }

    #[test]
    fn yields_concatenate_terminals() {
        let t = sample_tree();
        assert_eq!(t.to_string(), "a := 1 ; b := a");
    }

    #[test]
    fn paths_are_preorder_and_sorted() {
        let t = sample_tree();
        let paths: Vec<Path> = t.paths().map(|(p, _)| p).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
        assert_eq!(paths[0], Path::new());
    }

    #[test]
    fn at_resolves_paths() {
        let t = sample_tree();
        for (path, node) in t.paths() {
            assert_eq!(t.at(&path), Some(node));
            assert_eq!(t.path(node), path);
        }
        assert_eq!(t.at(&[9]), None);
    }

    #[test]
    fn nodes_of_type_in_preorder() {
        let t = sample_tree();
        let assgns = t.nodes_of_type(t.root(), "assgn");
        assert_eq!(assgns.len(), 2);
        assert_eq!(t.yield_of(assgns[0]), "a := 1");
        assert_eq!(t.yield_of(assgns[1]), "b := a");
        let vars = t.nodes_of_type(t.root(), "var");
        assert_eq!(vars.len(), 3);
    }

    #[test]
    fn closedness() {
        let mut t = DerivationTree::new(Symbol::nonterminal("start"));
        assert!(!t.is_closed());
        let child = t.add_child(t.root(), Symbol::nonterminal("stmt"));
        assert!(!t.is_closed());
        t.add_child(child, Symbol::terminal("x"));
        assert!(t.is_closed());
    }

    #[test]
    fn empty_expansion_is_closed() {
        let mut t = DerivationTree::new(Symbol::nonterminal("start"));
        t.mark_expanded(t.root());
        assert!(t.is_closed());
        assert_eq!(t.to_string(), "");
    }

    #[test]
    fn yield_spans_cover_the_yield() {
        let t = sample_tree();
        let spans = t.yield_spans(t.root());
        let full = t.to_string();
        let (root, root_span) = &spans[0];
        assert_eq!(*root, t.root());
        assert_eq!(root_span.clone(), 0..full.len());
        for (node, span) in &spans {
            assert_eq!(t.yield_of(*node), &full[span.clone()]);
        }
    }

    #[test]
    fn structural_equality_ignores_arena_order() {
        let t1 = sample_tree();
        // Build the same tree but depth-first instead of breadth-first.
        let mut t2 = DerivationTree::new(Symbol::nonterminal("start"));
        let stmt = t2.add_child(t2.root(), Symbol::nonterminal("stmt"));
        let a1 = t2.add_child(stmt, Symbol::nonterminal("assgn"));
        let v1 = t2.add_child(a1, Symbol::nonterminal("var"));
        t2.add_child(v1, Symbol::terminal("a"));
        t2.add_child(a1, Symbol::terminal(" := "));
        let r1 = t2.add_child(a1, Symbol::nonterminal("rhs"));
        let d1 = t2.add_child(r1, Symbol::nonterminal("digit"));
        t2.add_child(d1, Symbol::terminal("1"));
        t2.add_child(stmt, Symbol::terminal(" ; "));
        let rest = t2.add_child(stmt, Symbol::nonterminal("stmt"));
        let a2 = t2.add_child(rest, Symbol::nonterminal("assgn"));
        let v2 = t2.add_child(a2, Symbol::nonterminal("var"));
        t2.add_child(v2, Symbol::terminal("b"));
        t2.add_child(a2, Symbol::terminal(" := "));
        let r2 = t2.add_child(a2, Symbol::nonterminal("rhs"));
        let v3 = t2.add_child(r2, Symbol::nonterminal("var"));
        t2.add_child(v3, Symbol::terminal("a"));

        assert_eq!(t1, t2);
    }

    #[test]
    fn path_prefix_relation() {
        assert!(path_is_prefix(&[], &[1, 0]));
        assert!(path_is_prefix(&[1], &[1, 0]));
        assert!(!path_is_prefix(&[1, 0], &[1]));
        assert!(!path_is_prefix(&[0], &[1, 0]));
        let a: Path = smallvec![1];
        let b: Path = smallvec![1, 0];
        assert!(a < b);
    }
}
