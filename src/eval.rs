//! The satisfaction relation: `β ⊨ φ` by structural recursion over the
//! formula, with three-valued Kleene aggregation.
//!
//! Oracle timeouts and undecided semantic predicates surface as
//! [`Verdict::Undef`]; a missing binding is a programming error and raises
//! [`EvalError`].

use indexmap::IndexMap;
use thiserror::Error;

use crate::formula::{Constraint, Formula, MatchElement, MatchExpr, PredArg, Quantifier, SmtAtom, XPathBase, XPathExpr};
use crate::predicates::ResolvedArg;
use crate::smt::{OracleEnv, SExpr, SmtOracle, Verdict};
use crate::tree::{DerivationTree, NodeId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("no binding for free variable '{0}'")]
    MissingBinding(String),
    #[error("variable '{0}' is bound to a value of the wrong sort")]
    BadBinding(String),
    #[error("the tree under evaluation is not closed")]
    OpenTree,
    #[error("the tree has root type <{found}>, but constant '{constant}' has type <{expected}>")]
    ConstantMismatch {
        constant: String,
        expected: String,
        found: String,
    },
}

/// A bound value: a node of the tree under evaluation, or an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Node(NodeId),
    Int(i64),
}

/// A partial mapping from variable names to values, extended functionally
/// at each quantifier instantiation.
pub type Assignment = IndexMap<String, Value>;

/// Decides whether the closed tree satisfies the constraint, delegating
/// ground SMT atoms to `oracle`.
pub fn check(
    tree: &DerivationTree,
    constraint: &Constraint,
    oracle: &mut dyn SmtOracle,
) -> Result<Verdict, EvalError> {
    if !tree.is_closed() {
        return Err(EvalError::OpenTree);
    }
    let expected = constraint
        .constant
        .tree_type()
        .ok_or_else(|| EvalError::BadBinding(constraint.constant.name.clone()))?;
    let found = tree
        .nonterminal(tree.root())
        .unwrap_or("")
        .to_owned();
    if found != expected {
        return Err(EvalError::ConstantMismatch {
            constant: constraint.constant.name.clone(),
            expected: expected.to_owned(),
            found,
        });
    }
    for name in constraint.formula.free_variables() {
        if name != constraint.constant.name {
            return Err(EvalError::MissingBinding(name));
        }
    }
    let mut beta = Assignment::new();
    beta.insert(
        constraint.constant.name.clone(),
        Value::Node(tree.root()),
    );
    Evaluator { tree, oracle }.eval(&constraint.formula, &beta)
}

struct Evaluator<'a, 'o> {
    tree: &'a DerivationTree,
    oracle: &'o mut dyn SmtOracle,
}

impl Evaluator<'_, '_> {
    fn eval(&mut self, formula: &Formula, beta: &Assignment) -> Result<Verdict, EvalError> {
        match formula {
            Formula::Smt(atom) => self.smt_atom(atom, beta),
            Formula::StructPred { pred, args } => match self.resolve_args(args, beta)? {
                Some(args) => Ok((pred.eval)(self.tree, &args)),
                None => Ok(Verdict::Undef),
            },
            Formula::SemPred { pred, args } => match self.resolve_args(args, beta)? {
                Some(args) => Ok(pred.0.eval(self.tree, &args)),
                None => Ok(Verdict::Undef),
            },
            Formula::Not(inner) => Ok(self.eval(inner, beta)?.negate()),
            Formula::And(l, r) => {
                let l = self.eval(l, beta)?;
                if l.is_unsat() {
                    return Ok(Verdict::Unsat);
                }
                Ok(l.and(self.eval(r, beta)?))
            }
            Formula::Or(l, r) => {
                let l = self.eval(l, beta)?;
                if l.is_sat() {
                    return Ok(Verdict::Sat);
                }
                Ok(l.or(self.eval(r, beta)?))
            }
            Formula::Xor(l, r) => Ok(self.eval(l, beta)?.xor(self.eval(r, beta)?)),
            Formula::Implies(l, r) => {
                let l = self.eval(l, beta)?;
                if l.is_unsat() {
                    return Ok(Verdict::Sat);
                }
                Ok(l.implies(self.eval(r, beta)?))
            }
            Formula::Iff(l, r) => Ok(self.eval(l, beta)?.iff(self.eval(r, beta)?)),
            Formula::Forall(q) => self.quantify(q, beta, true),
            Formula::Exists(q) => self.quantify(q, beta, false),
            Formula::ForallInt { var, body } => self.int_quantify(var, body, beta, true),
            Formula::ExistsInt { var, body } => self.int_quantify(var, body, beta, false),
        }
    }

    /// An SMT atom holds iff its negated instantiation is unsatisfiable.
    fn smt_atom(&mut self, atom: &SmtAtom, beta: &Assignment) -> Result<Verdict, EvalError> {
        match self.instantiate(&atom.expr, beta, None)? {
            None => Ok(Verdict::Undef),
            Some(inst) => {
                let negated = SExpr::app("not", vec![inst]);
                log::trace!("oracle query: {}", negated);
                Ok(self.oracle.check(&negated, &OracleEnv::new()).negate())
            }
        }
    }

    /// Substitutes bound variables by ground values: trees by their yields,
    /// integers by literals. `keep` names a variable left symbolic.
    /// `Ok(None)` means the atom cannot be grounded (an XPath selected no
    /// node or several).
    fn instantiate(
        &self,
        expr: &SExpr,
        beta: &Assignment,
        keep: Option<&str>,
    ) -> Result<Option<SExpr>, EvalError> {
        match expr {
            SExpr::Bool(_) | SExpr::Int(_) | SExpr::Str(_) => Ok(Some(expr.clone())),
            SExpr::Symbol(name) => {
                if keep == Some(name.as_str()) {
                    return Ok(Some(expr.clone()));
                }
                match beta.get(name) {
                    Some(Value::Node(id)) => Ok(Some(SExpr::Str(self.tree.yield_of(*id)))),
                    Some(Value::Int(n)) => Ok(Some(SExpr::Int(*n))),
                    None if crate::smt::is_operator(name) => Ok(Some(expr.clone())),
                    None => Err(EvalError::MissingBinding(name.clone())),
                }
            }
            SExpr::XPath(xpath) => {
                let nodes = self.resolve_xpath(xpath, beta)?;
                match nodes.as_slice() {
                    [node] => Ok(Some(SExpr::Str(self.tree.yield_of(*node)))),
                    _ => Ok(None),
                }
            }
            SExpr::App(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match self.instantiate(item, beta, keep)? {
                        Some(e) => out.push(e),
                        None => return Ok(None),
                    }
                }
                Ok(Some(SExpr::App(out)))
            }
        }
    }

    /// The nodes an XPath selects under the given assignment.
    fn resolve_xpath(
        &self,
        xpath: &XPathExpr,
        beta: &Assignment,
    ) -> Result<Vec<NodeId>, EvalError> {
        let base = match &xpath.base {
            XPathBase::Var(name) => match beta.get(name) {
                Some(Value::Node(id)) => *id,
                Some(Value::Int(_)) => return Err(EvalError::BadBinding(name.clone())),
                None => return Err(EvalError::MissingBinding(name.clone())),
            },
            XPathBase::Type(typ) => {
                return Err(EvalError::MissingBinding(format!("<{}>", typ)))
            }
        };
        let mut set = vec![base];
        for seg in &xpath.segments {
            let mut next = Vec::new();
            for &node in &set {
                let mut found = Vec::new();
                if seg.descend {
                    for d in self.tree.nodes_of_type(node, &seg.typ) {
                        if d != node {
                            found.push(d);
                        }
                    }
                } else if let Some(children) = self.tree.children(node) {
                    for &child in children {
                        if self.tree.nonterminal(child) == Some(seg.typ.as_str()) {
                            found.push(child);
                        }
                    }
                }
                match seg.index {
                    Some(k) => {
                        if let Some(&picked) = k.checked_sub(1).and_then(|i| found.get(i)) {
                            next.push(picked);
                        }
                    }
                    None => next.extend(found),
                }
            }
            set = next;
        }
        Ok(set)
    }

    /// Resolves predicate arguments; `Ok(None)` when an XPath selects
    /// anything but exactly one node.
    fn resolve_args(
        &self,
        args: &[PredArg],
        beta: &Assignment,
    ) -> Result<Option<Vec<ResolvedArg>>, EvalError> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            let resolved = match arg {
                PredArg::Var(name) => match beta.get(name) {
                    Some(Value::Node(id)) => ResolvedArg::Node(*id),
                    Some(Value::Int(n)) => ResolvedArg::Int(*n),
                    None => return Err(EvalError::MissingBinding(name.clone())),
                },
                PredArg::Type(typ) => ResolvedArg::Type(typ.clone()),
                PredArg::Int(n) => ResolvedArg::Int(*n),
                PredArg::Str(s) => ResolvedArg::Str(s.clone()),
                PredArg::XPath(xpath) => {
                    let nodes = self.resolve_xpath(xpath, beta)?;
                    match nodes.as_slice() {
                        [node] => ResolvedArg::Node(*node),
                        _ => return Ok(None),
                    }
                }
            };
            out.push(resolved);
        }
        Ok(Some(out))
    }

    /// Enumerates the candidates of a tree quantifier and aggregates the
    /// body verdicts: `pending → probing → {keep, witness, refute} → done`,
    /// short-circuiting on the first refutation (forall) or witness
    /// (exists).
    fn quantify(
        &mut self,
        q: &Quantifier,
        beta: &Assignment,
        universal: bool,
    ) -> Result<Verdict, EvalError> {
        let range = match &q.in_var {
            Some(name) => match beta.get(name) {
                Some(Value::Node(id)) => *id,
                Some(Value::Int(_)) => return Err(EvalError::BadBinding(name.clone())),
                None => return Err(EvalError::MissingBinding(name.clone())),
            },
            None => self.tree.root(),
        };
        let mut undef = false;
        for cand in self.tree.nodes_of_type(range, q.typ()) {
            let local = match self.candidate_binding(q, beta, cand)? {
                Some(local) => local,
                None => continue,
            };
            let verdict = self.eval(&q.body, &local)?;
            log::trace!(
                "{} {} = {:?}: {}",
                if universal { "forall" } else { "exists" },
                q.var.name,
                self.tree.yield_of(cand),
                verdict
            );
            match verdict {
                Verdict::Unsat if universal => return Ok(Verdict::Unsat),
                Verdict::Sat if !universal => return Ok(Verdict::Sat),
                Verdict::Undef => undef = true,
                _ => {}
            }
        }
        Ok(if undef {
            Verdict::Undef
        } else {
            Verdict::from_bool(universal)
        })
    }

    /// Binds the candidate (and its match-expression variables) or rules it
    /// out of the quantifier's range: a failed match, or an XPath rooted at
    /// the binder that selects nothing, skips the candidate.
    fn candidate_binding(
        &self,
        q: &Quantifier,
        beta: &Assignment,
        cand: NodeId,
    ) -> Result<Option<Assignment>, EvalError> {
        let mut local = beta.clone();
        local.insert(q.var.name.clone(), Value::Node(cand));
        if let Some(mexpr) = &q.match_expr {
            match match_subtree(self.tree, cand, mexpr) {
                Some(binds) => {
                    for (name, node) in binds {
                        local.insert(name, Value::Node(node));
                    }
                }
                None => return Ok(None),
            }
        }
        let mut xpaths = Vec::new();
        q.body.xpaths_based_at(&q.var.name, &mut xpaths);
        for xpath in xpaths {
            if self.resolve_xpath(xpath, &local)?.is_empty() {
                return Ok(None);
            }
        }
        Ok(Some(local))
    }

    /// Integer quantifiers range over all non-negative integers. When the
    /// bound integer occurs only inside SMT atoms (after finite expansion
    /// of inner tree quantifiers and evaluation of integer-free
    /// subformulas), the whole body is delegated to the oracle as one
    /// quantified query; otherwise the verdict is `Undef`.
    fn int_quantify(
        &mut self,
        var: &str,
        body: &Formula,
        beta: &Assignment,
        universal: bool,
    ) -> Result<Verdict, EvalError> {
        let lifted = match self.lift(body, beta, var)? {
            Some(expr) => expr,
            None => return Ok(Verdict::Undef),
        };
        let guard = SExpr::app(">=", vec![SExpr::symbol(var), SExpr::Int(0)]);
        let matrix = if universal {
            SExpr::app("and", vec![guard, SExpr::app("not", vec![lifted])])
        } else {
            SExpr::app("and", vec![guard, lifted])
        };
        let binder = SExpr::App(vec![SExpr::App(vec![
            SExpr::symbol(var),
            SExpr::symbol("Int"),
        ])]);
        let query = SExpr::App(vec![SExpr::symbol("exists"), binder, matrix]);
        log::trace!("oracle query: {}", query);
        let verdict = self.oracle.check(&query, &OracleEnv::new());
        Ok(if universal { verdict.negate() } else { verdict })
    }

    /// Turns a formula into a single SMT expression with `var` symbolic.
    /// `Ok(None)` when the formula is not liftable (the integer reaches a
    /// predicate, a nested integer quantifier, or an undecidable part).
    fn lift(
        &mut self,
        formula: &Formula,
        beta: &Assignment,
        var: &str,
    ) -> Result<Option<SExpr>, EvalError> {
        // Subformulas that do not mention the integer have a definite
        // verdict already.
        if !formula.free_variables().contains(var) {
            return Ok(match self.eval(formula, beta)? {
                Verdict::Sat => Some(SExpr::Bool(true)),
                Verdict::Unsat => Some(SExpr::Bool(false)),
                Verdict::Undef => None,
            });
        }
        match formula {
            Formula::Smt(atom) => self.instantiate(&atom.expr, beta, Some(var)),
            Formula::Not(inner) => Ok(self
                .lift(inner, beta, var)?
                .map(|e| SExpr::app("not", vec![e]))),
            Formula::And(l, r) => self.lift_binary("and", l, r, beta, var),
            Formula::Or(l, r) => self.lift_binary("or", l, r, beta, var),
            Formula::Xor(l, r) => self.lift_binary("xor", l, r, beta, var),
            Formula::Implies(l, r) => self.lift_binary("=>", l, r, beta, var),
            Formula::Iff(l, r) => self.lift_binary("=", l, r, beta, var),
            Formula::Forall(q) | Formula::Exists(q) => {
                let universal = matches!(formula, Formula::Forall(_));
                let range = match &q.in_var {
                    Some(name) => match beta.get(name) {
                        Some(Value::Node(id)) => *id,
                        Some(Value::Int(_)) => return Err(EvalError::BadBinding(name.clone())),
                        None => return Err(EvalError::MissingBinding(name.clone())),
                    },
                    None => self.tree.root(),
                };
                let mut parts = Vec::new();
                for cand in self.tree.nodes_of_type(range, q.typ()) {
                    let local = match self.candidate_binding(q, beta, cand)? {
                        Some(local) => local,
                        None => continue,
                    };
                    match self.lift(&q.body, &local, var)? {
                        Some(part) => parts.push(part),
                        None => return Ok(None),
                    }
                }
                Ok(Some(match parts.len() {
                    0 => SExpr::Bool(universal),
                    1 => parts.pop().expect("one part"),
                    _ => SExpr::app(if universal { "and" } else { "or" }, parts),
                }))
            }
            // The integer reaches a predicate or another integer
            // quantifier: not liftable.
            Formula::StructPred { .. }
            | Formula::SemPred { .. }
            | Formula::ForallInt { .. }
            | Formula::ExistsInt { .. } => Ok(None),
        }
    }

    fn lift_binary(
        &mut self,
        op: &str,
        l: &Formula,
        r: &Formula,
        beta: &Assignment,
        var: &str,
    ) -> Result<Option<SExpr>, EvalError> {
        let l = match self.lift(l, beta, var)? {
            Some(e) => e,
            None => return Ok(None),
        };
        let r = match self.lift(r, beta, var)? {
            Some(e) => e,
            None => return Ok(None),
        };
        Ok(Some(SExpr::app(op, vec![l, r])))
    }
}

/// Rewrites `forall int i: exists <T> e in c: not φ(e, i)` into
/// `exists int i: (exists <T> e in c: φ(e, i)) and (exists <T> e in c: not φ(e, i))`.
///
/// The rewrite is equivalence-preserving only when φ is functional in `i`
/// (it holds for exactly one `i` given the other parameters fixed). That
/// hypothesis cannot be checked here; callers must assert it before
/// applying the rewrite. Returns `None` when the formula does not have the
/// required shape.
pub fn rewrite_universal_int(formula: &Formula) -> Option<Formula> {
    let Formula::ForallInt { var, body } = formula else {
        return None;
    };
    let Formula::Exists(q) = body.as_ref() else {
        return None;
    };
    let Formula::Not(inner) = &q.body else {
        return None;
    };
    let phi = (**inner).clone();
    let positive = Formula::Exists(Box::new(Quantifier {
        body: phi.clone(),
        ..(**q).clone()
    }));
    let negative = Formula::Exists(Box::new(Quantifier {
        body: Formula::not(phi),
        ..(**q).clone()
    }));
    Some(Formula::ExistsInt {
        var: var.clone(),
        body: Box::new(Formula::And(Box::new(positive), Box::new(negative))),
    })
}

/// Matches a match expression against the subtree at `root`: the elements
/// must tile the subtree's yield in order, each hole landing exactly on a
/// node of its declared type. Returns the bindings of the `{<T> v}` holes,
/// or `None` if the subtree is not an instance of the pattern.
pub fn match_subtree(
    tree: &DerivationTree,
    root: NodeId,
    mexpr: &MatchExpr,
) -> Option<IndexMap<String, NodeId>> {
    let spans = tree.yield_spans(root);
    let text = tree.yield_of(root);
    let items: Vec<&MatchElement> = mexpr.elements.iter().collect();
    let mut binds = IndexMap::new();
    if match_items(tree, &spans, &text, &items, 0, &mut binds) {
        Some(binds)
    } else {
        None
    }
}

fn match_items(
    tree: &DerivationTree,
    spans: &[(NodeId, std::ops::Range<usize>)],
    text: &str,
    items: &[&MatchElement],
    pos: usize,
    binds: &mut IndexMap<String, NodeId>,
) -> bool {
    let Some((first, rest)) = items.split_first() else {
        return pos == text.len();
    };
    match first {
        MatchElement::Text(t) => {
            text[pos..].starts_with(t.as_str())
                && match_items(tree, spans, text, rest, pos + t.len(), binds)
        }
        MatchElement::Bind { typ, name } => {
            for (node, span) in spans {
                if span.start != pos || tree.nonterminal(*node) != Some(typ.as_str()) {
                    continue;
                }
                binds.insert(name.clone(), *node);
                if match_items(tree, spans, text, rest, span.end, binds) {
                    return true;
                }
                binds.shift_remove(name);
            }
            false
        }
        MatchElement::Hole { typ } => {
            for (node, span) in spans {
                if span.start != pos || tree.nonterminal(*node) != Some(typ.as_str()) {
                    continue;
                }
                if match_items(tree, spans, text, rest, span.end, binds) {
                    return true;
                }
            }
            false
        }
        MatchElement::Optional(body) => {
            let mut with: Vec<&MatchElement> = body.iter().collect();
            with.extend_from_slice(rest);
            match_items(tree, spans, text, &with, pos, binds)
                || match_items(tree, spans, text, rest, pos, binds)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::grammar::Symbol;
    use crate::parse::{parse_match_expr, parse_unchecked, Pos};
    use crate::predicates::SemanticRegistry;

    use super::*;

    enum Rhs<'a> {
        Var(&'a str),
        Digit(&'a str),
    }

    /// Builds an `<assgn>` subtree: `<var> " := " <rhs>`, the rhs holding
    /// either a `<var>` or a `<digit>`.
    fn assgn(tree: &mut DerivationTree, parent: NodeId, lhs: &str, rhs: Rhs) -> NodeId {
        let a = tree.add_child(parent, Symbol::nonterminal("assgn"));
        let v = tree.add_child(a, Symbol::nonterminal("var"));
        tree.add_child(v, Symbol::terminal(lhs));
        tree.add_child(a, Symbol::terminal(" := "));
        let r = tree.add_child(a, Symbol::nonterminal("rhs"));
        match rhs {
            Rhs::Var(var) => {
                let v = tree.add_child(r, Symbol::nonterminal("var"));
                tree.add_child(v, Symbol::terminal(var));
            }
            Rhs::Digit(digit) => {
                let d = tree.add_child(r, Symbol::nonterminal("digit"));
                tree.add_child(d, Symbol::terminal(digit));
            }
        }
        a
    }

    fn mexpr(text: &str) -> MatchExpr {
        parse_match_expr(text, Pos { line: 1, col: 1 }).unwrap()
    }

    #[test]
    fn match_binds_lhs_and_rhs_var() {
        let mut tree = DerivationTree::new(Symbol::nonterminal("start"));
        let root = tree.root();
        let a = assgn(&mut tree, root, "a", Rhs::Var("b"));
        let m = mexpr("{<var> lhs} := {<var> rhs}");
        let binds = match_subtree(&tree, a, &m).unwrap();
        assert_eq!(tree.yield_of(binds["lhs"]), "a");
        assert_eq!(tree.yield_of(binds["rhs"]), "b");
    }

    #[test]
    fn match_fails_on_digit_rhs() {
        let mut tree = DerivationTree::new(Symbol::nonterminal("start"));
        let root = tree.root();
        let a = assgn(&mut tree, root, "a", Rhs::Digit("1"));
        let m = mexpr("{<var> lhs} := {<var> rhs}");
        assert!(match_subtree(&tree, a, &m).is_none());
    }

    #[test]
    fn match_with_typed_hole() {
        let mut tree = DerivationTree::new(Symbol::nonterminal("start"));
        let root = tree.root();
        let a = assgn(&mut tree, root, "a", Rhs::Digit("1"));
        let m = mexpr("{<var> lhs} := <rhs>");
        let binds = match_subtree(&tree, a, &m).unwrap();
        assert_eq!(tree.yield_of(binds["lhs"]), "a");
        assert_eq!(binds.len(), 1);
    }

    #[test]
    fn optional_part_matches_iff_present() {
        // <decl> ::= "int " <var> [" = " <digit>] ";"
        let mut tree = DerivationTree::new(Symbol::nonterminal("decl"));
        let root = tree.root();
        tree.add_child(root, Symbol::terminal("int "));
        let v = tree.add_child(root, Symbol::nonterminal("var"));
        tree.add_child(v, Symbol::terminal("x"));
        tree.add_child(root, Symbol::terminal(";"));
        let m = mexpr("int {<var> d}[ = <digit>];");
        let binds = match_subtree(&tree, root, &m).unwrap();
        assert_eq!(tree.yield_of(binds["d"]), "x");

        let mut tree = DerivationTree::new(Symbol::nonterminal("decl"));
        let root = tree.root();
        tree.add_child(root, Symbol::terminal("int "));
        let v = tree.add_child(root, Symbol::nonterminal("var"));
        tree.add_child(v, Symbol::terminal("x"));
        tree.add_child(root, Symbol::terminal(" = "));
        let d = tree.add_child(root, Symbol::nonterminal("digit"));
        tree.add_child(d, Symbol::terminal("3"));
        tree.add_child(root, Symbol::terminal(";"));
        assert!(match_subtree(&tree, root, &m).is_some());
    }

    #[test]
    fn rewrite_universal_int_shape() {
        let registry = SemanticRegistry::new();
        let parsed = parse_unchecked(
            "forall int i: exists <digit> d in start: not (= (str.to.int d) i)",
            &registry,
        )
        .unwrap();
        let rewritten = rewrite_universal_int(&parsed.formula).unwrap();
        match rewritten {
            Formula::ExistsInt { var, body } => {
                assert_eq!(var, "i");
                assert!(matches!(*body, Formula::And(_, _)));
            }
            other => panic!("expected exists int, got {:?}", other),
        }
        let not_matching = Formula::Smt(SmtAtom::new(SExpr::Bool(true)));
        assert!(rewrite_universal_int(&not_matching).is_none());
    }
}
