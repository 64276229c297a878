//! The fixed library of structural predicates.
//!
//! Everything here is defined in terms of the lexicographic path order:
//! a node is before another iff their paths differ at some index and the
//! first path is smaller there, so a prefix of a path is never before it.
//! `after` is not the mirror image: a node is after everything it is not
//! before except its own ancestors, which makes a descendant come after
//! its ancestor.

use crate::smt::Verdict;
use crate::tree::{path_is_prefix, DerivationTree, NodeId, Path};

use super::{ResolvedArg, StructuralPredicate};

pub const STRUCTURAL_PREDICATES: &[StructuralPredicate] = &[
    StructuralPredicate { name: "before", arity: 2, eval: before },
    StructuralPredicate { name: "after", arity: 2, eval: after },
    StructuralPredicate { name: "same_position", arity: 2, eval: same_position },
    StructuralPredicate { name: "different_position", arity: 2, eval: different_position },
    StructuralPredicate { name: "direct_child", arity: 2, eval: direct_child },
    StructuralPredicate { name: "inside", arity: 2, eval: inside },
    StructuralPredicate { name: "nth", arity: 3, eval: nth },
    StructuralPredicate { name: "level", arity: 4, eval: level },
];

pub fn lookup_structural(name: &str) -> Option<&'static StructuralPredicate> {
    STRUCTURAL_PREDICATES.iter().find(|p| p.name == name)
}

fn two_paths(tree: &DerivationTree, args: &[ResolvedArg]) -> Option<(Path, Path)> {
    let a = args.first()?.node()?;
    let b = args.get(1)?.node()?;
    Some((tree.path(a), tree.path(b)))
}

/// True iff the paths differ at their first divergence and `a` is smaller
/// there. A prefix of a path is neither before nor after it.
fn path_before(a: &[usize], b: &[usize]) -> bool {
    for (x, y) in a.iter().zip(b.iter()) {
        if x < y {
            return true;
        }
        if x > y {
            return false;
        }
    }
    false
}

fn before(tree: &DerivationTree, args: &[ResolvedArg]) -> Verdict {
    match two_paths(tree, args) {
        Some((a, b)) => Verdict::from_bool(path_before(&a, &b)),
        None => Verdict::Undef,
    }
}

/// `after(a, b)`: `a` is not before `b` and not an ancestor of `b`. In
/// particular a proper descendant is after its ancestor.
fn after(tree: &DerivationTree, args: &[ResolvedArg]) -> Verdict {
    match two_paths(tree, args) {
        Some((a, b)) => {
            Verdict::from_bool(!path_before(&a, &b) && !path_is_prefix(&a, &b))
        }
        None => Verdict::Undef,
    }
}

fn same_position(tree: &DerivationTree, args: &[ResolvedArg]) -> Verdict {
    match two_paths(tree, args) {
        Some((a, b)) => Verdict::from_bool(a == b),
        None => Verdict::Undef,
    }
}

fn different_position(tree: &DerivationTree, args: &[ResolvedArg]) -> Verdict {
    match two_paths(tree, args) {
        Some((a, b)) => Verdict::from_bool(a != b),
        None => Verdict::Undef,
    }
}

/// `direct_child(a, b)`: `a` is an immediate child of `b`.
fn direct_child(tree: &DerivationTree, args: &[ResolvedArg]) -> Verdict {
    match two_paths(tree, args) {
        Some((a, b)) => Verdict::from_bool(a.len() == b.len() + 1 && path_is_prefix(&b, &a)),
        None => Verdict::Undef,
    }
}

/// `inside(a, b)`: `a` is a proper descendant of `b`.
fn inside(tree: &DerivationTree, args: &[ResolvedArg]) -> Verdict {
    match two_paths(tree, args) {
        Some((a, b)) => Verdict::from_bool(a != b && path_is_prefix(&b, &a)),
        None => Verdict::Undef,
    }
}

/// `nth(k, a, b)`: `a` is the k-th node of its own type (1-based,
/// pre-order) within the subtree `b`.
fn nth(tree: &DerivationTree, args: &[ResolvedArg]) -> Verdict {
    let (k, a, b) = match (
        args.first().and_then(ResolvedArg::int),
        args.get(1).and_then(ResolvedArg::node),
        args.get(2).and_then(ResolvedArg::node),
    ) {
        (Some(k), Some(a), Some(b)) => (k, a, b),
        _ => return Verdict::Undef,
    };
    let typ = match tree.nonterminal(a) {
        Some(typ) => typ.to_owned(),
        None => return Verdict::Undef,
    };
    let position = tree
        .nodes_of_type(b, &typ)
        .iter()
        .position(|&node| node == a);
    match position {
        Some(index) => Verdict::from_bool(index as i64 + 1 == k),
        None => Verdict::Unsat, // a is not inside b at all
    }
}

/// `level(rel, t, a, b)`: compares how deeply `a` and `b` are nested in
/// `t`-typed contexts: the number of `t`-labelled proper ancestors of `a`
/// stands in relation `rel` to that of `b`.
fn level(tree: &DerivationTree, args: &[ResolvedArg]) -> Verdict {
    let (rel, typ, a, b) = match (
        args.first().and_then(ResolvedArg::str),
        args.get(1).and_then(ResolvedArg::type_name),
        args.get(2).and_then(ResolvedArg::node),
        args.get(3).and_then(ResolvedArg::node),
    ) {
        (Some(rel), Some(typ), Some(a), Some(b)) => (rel, typ, a, b),
        _ => return Verdict::Undef,
    };
    let depth_a = typed_depth(tree, a, typ);
    let depth_b = typed_depth(tree, b, typ);
    match rel {
        "EQ" => Verdict::from_bool(depth_a == depth_b),
        "LE" => Verdict::from_bool(depth_a <= depth_b),
        "GE" => Verdict::from_bool(depth_a >= depth_b),
        "LT" => Verdict::from_bool(depth_a < depth_b),
        "GT" => Verdict::from_bool(depth_a > depth_b),
        _ => Verdict::Undef,
    }
}

fn typed_depth(tree: &DerivationTree, node: NodeId, typ: &str) -> usize {
    let mut depth = 0;
    let mut cur = node;
    while let Some(parent) = tree.parent(cur) {
        if tree.nonterminal(parent) == Some(typ) {
            depth += 1;
        }
        cur = parent;
    }
    depth
}

#[cfg(test)]
mod tests {
    use crate::grammar::Symbol;

    use super::*;

    /// `<s>[<a>[<b>["x"]], <a>["y"]]`
    fn nested() -> (DerivationTree, NodeId, NodeId, NodeId) {
        let mut t = DerivationTree::new(Symbol::nonterminal("s"));
        let a1 = t.add_child(t.root(), Symbol::nonterminal("a"));
        let b = t.add_child(a1, Symbol::nonterminal("b"));
        t.add_child(b, Symbol::terminal("x"));
        let a2 = t.add_child(t.root(), Symbol::nonterminal("a"));
        t.add_child(a2, Symbol::terminal("y"));
        (t, a1, b, a2)
    }

    fn nodes(ids: &[NodeId]) -> Vec<ResolvedArg> {
        ids.iter().map(|&id| ResolvedArg::Node(id)).collect()
    }

    #[test]
    fn before_orders_siblings_not_ancestors() {
        let (t, a1, b, a2) = nested();
        assert_eq!(before(&t, &nodes(&[a1, a2])), Verdict::Sat);
        assert_eq!(before(&t, &nodes(&[a2, a1])), Verdict::Unsat);
        assert_eq!(after(&t, &nodes(&[a2, a1])), Verdict::Sat);
        assert_eq!(after(&t, &nodes(&[a1, a2])), Verdict::Unsat);
        // b sits below a1: a prefix of a path is never before it.
        assert_eq!(before(&t, &nodes(&[a1, b])), Verdict::Unsat);
        assert_eq!(before(&t, &nodes(&[b, a1])), Verdict::Unsat);
        // ... but b is before the second a.
        assert_eq!(before(&t, &nodes(&[b, a2])), Verdict::Sat);
    }

    #[test]
    fn after_includes_descendants_of_the_reference() {
        let (t, a1, b, a2) = nested();
        // The descendant is after its ancestor, never the other way round.
        assert_eq!(after(&t, &nodes(&[b, a1])), Verdict::Sat);
        assert_eq!(after(&t, &nodes(&[a1, b])), Verdict::Unsat);
        assert_eq!(after(&t, &nodes(&[b, t.root()])), Verdict::Sat);
        // Equal nodes are not after one another.
        assert_eq!(after(&t, &nodes(&[a1, a1])), Verdict::Unsat);
        // Later subtrees stay after earlier ones.
        assert_eq!(after(&t, &nodes(&[a2, b])), Verdict::Sat);
        assert_eq!(after(&t, &nodes(&[b, a2])), Verdict::Unsat);
    }

    #[test]
    fn positions() {
        let (t, a1, _, a2) = nested();
        assert_eq!(same_position(&t, &nodes(&[a1, a1])), Verdict::Sat);
        assert_eq!(same_position(&t, &nodes(&[a1, a2])), Verdict::Unsat);
        assert_eq!(different_position(&t, &nodes(&[a1, a2])), Verdict::Sat);
    }

    #[test]
    fn containment() {
        let (t, a1, b, a2) = nested();
        assert_eq!(direct_child(&t, &nodes(&[b, a1])), Verdict::Sat);
        assert_eq!(direct_child(&t, &nodes(&[a1, b])), Verdict::Unsat);
        assert_eq!(inside(&t, &nodes(&[b, a1])), Verdict::Sat);
        assert_eq!(inside(&t, &nodes(&[b, t.root()])), Verdict::Sat);
        assert_eq!(inside(&t, &nodes(&[a1, a1])), Verdict::Unsat);
        assert_eq!(inside(&t, &nodes(&[b, a2])), Verdict::Unsat);
    }

    #[test]
    fn nth_counts_in_preorder() {
        let (t, a1, _, a2) = nested();
        let args = |k: i64, node| {
            vec![
                ResolvedArg::Int(k),
                ResolvedArg::Node(node),
                ResolvedArg::Node(t.root()),
            ]
        };
        assert_eq!(nth(&t, &args(1, a1)), Verdict::Sat);
        assert_eq!(nth(&t, &args(2, a2)), Verdict::Sat);
        assert_eq!(nth(&t, &args(2, a1)), Verdict::Unsat);
        // Numeric string in place of the integer.
        let args = vec![
            ResolvedArg::Str("2".into()),
            ResolvedArg::Node(a2),
            ResolvedArg::Node(t.root()),
        ];
        assert_eq!(nth(&t, &args), Verdict::Sat);
    }

    #[test]
    fn level_compares_typed_depths() {
        let (t, a1, b, a2) = nested();
        let args = |rel: &str, x, y| {
            vec![
                ResolvedArg::Str(rel.into()),
                ResolvedArg::Str("<a>".into()),
                ResolvedArg::Node(x),
                ResolvedArg::Node(y),
            ]
        };
        // b has one <a> ancestor, the two <a> nodes have none.
        assert_eq!(level(&t, &args("EQ", a1, a2)), Verdict::Sat);
        assert_eq!(level(&t, &args("GT", b, a1)), Verdict::Sat);
        assert_eq!(level(&t, &args("GE", b, a2)), Verdict::Sat);
        assert_eq!(level(&t, &args("EQ", b, a1)), Verdict::Unsat);
        assert_eq!(level(&t, &args("??", b, a1)), Verdict::Undef);
    }

    #[test]
    fn non_node_arguments_are_undef() {
        let (t, a1, _, _) = nested();
        let args = vec![ResolvedArg::Int(1), ResolvedArg::Node(a1)];
        assert_eq!(before(&t, &args), Verdict::Undef);
    }
}
