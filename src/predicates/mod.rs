//! Structural and semantic predicates over derivation trees.

pub mod structural;

pub use structural::{lookup_structural, STRUCTURAL_PREDICATES};

use std::rc::Rc;

use indexmap::IndexMap;

use crate::smt::Verdict;
use crate::tree::{DerivationTree, NodeId};

/// A predicate argument after resolution against an assignment: tree nodes
/// for variables and XPaths, plus the literal argument kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedArg {
    Node(NodeId),
    Int(i64),
    Str(String),
    Type(String),
}

impl ResolvedArg {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            ResolvedArg::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn int(&self) -> Option<i64> {
        match self {
            ResolvedArg::Int(n) => Some(*n),
            // Numeric string literals are accepted where numbers are
            // expected, as in the original predicate calls.
            ResolvedArg::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn str(&self) -> Option<&str> {
        match self {
            ResolvedArg::Str(s) => Some(s),
            _ => None,
        }
    }

    /// A nonterminal type name, accepting both `<name>` literals and
    /// string arguments with or without the angle brackets.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            ResolvedArg::Type(t) => Some(t),
            ResolvedArg::Str(s) => Some(
                s.strip_prefix('<')
                    .and_then(|s| s.strip_suffix('>'))
                    .unwrap_or(s),
            ),
            _ => None,
        }
    }
}

/// A member of the fixed structural predicate library: a pure function of
/// node paths within the top-level tree.
pub struct StructuralPredicate {
    pub name: &'static str,
    pub arity: usize,
    pub eval: fn(&DerivationTree, &[ResolvedArg]) -> Verdict,
}

impl PartialEq for StructuralPredicate {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for StructuralPredicate {}

impl std::fmt::Debug for StructuralPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuralPredicate")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// A host-provided predicate evaluated outside the logic. Implementations
/// must be side-effect-free for the duration of a call and may return
/// [`Verdict::Undef`] when they cannot decide.
pub trait SemanticPredicate {
    fn name(&self) -> &str;
    fn arity(&self) -> usize;
    fn eval(&self, tree: &DerivationTree, args: &[ResolvedArg]) -> Verdict;
}

/// The semantic predicates known to the parser. Populated once before
/// parsing; read-only afterwards.
#[derive(Default, Clone)]
pub struct SemanticRegistry {
    preds: IndexMap<String, Rc<dyn SemanticPredicate>>,
}

impl SemanticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a predicate. Panics on a duplicate name; registries are
    /// assembled once at startup.
    pub fn register(&mut self, pred: Rc<dyn SemanticPredicate>) {
        let name = pred.name().to_owned();
        assert!(
            !self.preds.contains_key(&name),
            "semantic predicate {} registered twice",
            name
        );
        self.preds.insert(name, pred);
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn SemanticPredicate>> {
        self.preds.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.preds.contains_key(name)
    }
}

impl std::fmt::Debug for SemanticRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.preds.keys()).finish()
    }
}
