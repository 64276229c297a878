//! The well-formedness pass: one traversal after parsing that resolves
//! identifiers against their binders, rejects duplicate and shadowing
//! binders, checks quantified types against the reference grammar, walks
//! XPath chains through the grammar's child/descendant relation, and
//! sort-checks every SMT atom.

use thiserror::Error;

use crate::grammar::Grammar;
use crate::smt::{infer_sort, SExpr, SmtSort, SortError};

use super::{Constraint, Formula, PredArg, Quantifier, Sort, SmtAtom, Variable, XPathBase, XPathExpr};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WellFormedError {
    #[error("unresolved variable '{0}'")]
    UnresolvedVariable(String),
    #[error("duplicate binder '{0}'")]
    DuplicateBinder(String),
    #[error("sort mismatch: {0}")]
    SortMismatch(String),
    #[error("unreachable XPath '{0}'")]
    UnreachableXPath(String),
    #[error("undefined nonterminal <{0}>")]
    UndefinedNonterminal(String),
}

pub fn check(constraint: &Constraint, grammar: &Grammar) -> Result<(), WellFormedError> {
    let typ = constraint.constant.tree_type().ok_or_else(|| {
        WellFormedError::SortMismatch("the top-level constant must be tree-sorted".to_owned())
    })?;
    if !grammar.is_defined(typ) {
        return Err(WellFormedError::UndefinedNonterminal(typ.to_owned()));
    }
    let mut scope = vec![constraint.constant.clone()];
    walk(&constraint.formula, &mut scope, grammar)
}

fn lookup<'a>(scope: &'a [Variable], name: &str) -> Option<&'a Variable> {
    scope.iter().rev().find(|v| v.name == name)
}

fn walk(
    formula: &Formula,
    scope: &mut Vec<Variable>,
    grammar: &Grammar,
) -> Result<(), WellFormedError> {
    match formula {
        Formula::Smt(atom) => check_atom(atom, scope, grammar),
        Formula::StructPred { args, .. } | Formula::SemPred { args, .. } => {
            for arg in args {
                match arg {
                    PredArg::Var(name) => {
                        if lookup(scope, name).is_none() {
                            return Err(WellFormedError::UnresolvedVariable(name.clone()));
                        }
                    }
                    PredArg::XPath(xpath) => check_xpath(xpath, scope, grammar)?,
                    PredArg::Type(typ) => {
                        if !grammar.is_defined(typ) {
                            return Err(WellFormedError::UndefinedNonterminal(typ.clone()));
                        }
                    }
                    PredArg::Int(_) | PredArg::Str(_) => {}
                }
            }
            Ok(())
        }
        Formula::Not(inner) => walk(inner, scope, grammar),
        Formula::And(l, r)
        | Formula::Or(l, r)
        | Formula::Xor(l, r)
        | Formula::Implies(l, r)
        | Formula::Iff(l, r) => {
            walk(l, scope, grammar)?;
            walk(r, scope, grammar)
        }
        Formula::Forall(q) | Formula::Exists(q) => quantifier(q, scope, grammar),
        Formula::ForallInt { var, body } | Formula::ExistsInt { var, body } => {
            if lookup(scope, var).is_some() {
                return Err(WellFormedError::DuplicateBinder(var.clone()));
            }
            scope.push(Variable::int(var.clone()));
            let result = walk(body, scope, grammar);
            scope.pop();
            result
        }
    }
}

fn quantifier(
    q: &Quantifier,
    scope: &mut Vec<Variable>,
    grammar: &Grammar,
) -> Result<(), WellFormedError> {
    let typ = q.typ();
    if !grammar.is_defined(typ) {
        return Err(WellFormedError::UndefinedNonterminal(typ.to_owned()));
    }
    if let Some(in_var) = &q.in_var {
        match lookup(scope, in_var) {
            Some(v) if v.sort == Sort::Int => {
                return Err(WellFormedError::SortMismatch(format!(
                    "quantifier ranges in integer variable '{}'",
                    in_var
                )))
            }
            Some(_) => {}
            None => return Err(WellFormedError::UnresolvedVariable(in_var.clone())),
        }
    }
    if lookup(scope, &q.var.name).is_some() {
        return Err(WellFormedError::DuplicateBinder(q.var.name.clone()));
    }
    scope.push(q.var.clone());
    let mut pushed = 1;
    let mut result = Ok(());
    if let Some(mexpr) = &q.match_expr {
        for typ in mexpr.mentioned_types() {
            if !grammar.is_defined(typ) {
                result = Err(WellFormedError::UndefinedNonterminal(typ.to_owned()));
            }
        }
        if result.is_ok() {
            for (btyp, bname) in mexpr.bindings() {
                if lookup(scope, bname).is_some() {
                    result = Err(WellFormedError::DuplicateBinder(bname.to_owned()));
                    break;
                }
                scope.push(Variable::tree(bname, btyp));
                pushed += 1;
            }
        }
    }
    let result = result.and_then(|()| walk(&q.body, scope, grammar));
    scope.truncate(scope.len() - pushed);
    result
}

fn check_atom(
    atom: &SmtAtom,
    scope: &[Variable],
    grammar: &Grammar,
) -> Result<(), WellFormedError> {
    for name in atom.variables() {
        if lookup(scope, &name).is_none() {
            return Err(WellFormedError::UnresolvedVariable(name));
        }
    }
    let mut xpath_error = Ok(());
    atom.expr.walk(&mut |e| {
        if let SExpr::XPath(xpath) = e {
            if xpath_error.is_ok() {
                xpath_error = check_xpath(xpath, scope, grammar);
            }
        }
    });
    xpath_error?;

    // Tree variables enter atoms as strings; integers as integers. The
    // result of the whole atom must be boolean.
    let var_sort = |name: &str| {
        lookup(scope, name).map(|v| match v.sort {
            Sort::Tree(_) => SmtSort::Str,
            Sort::Int => SmtSort::Int,
        })
    };
    match infer_sort(&atom.expr, &var_sort) {
        Ok(SmtSort::Bool) => Ok(()),
        Ok(other) => Err(WellFormedError::SortMismatch(format!(
            "atom '{}' has sort {}, expected Bool",
            atom.expr, other
        ))),
        Err(SortError::UnknownSymbol(name)) => Err(WellFormedError::UnresolvedVariable(name)),
        Err(e) => Err(WellFormedError::SortMismatch(e.to_string())),
    }
}

fn check_xpath(
    xpath: &XPathExpr,
    scope: &[Variable],
    grammar: &Grammar,
) -> Result<(), WellFormedError> {
    let base_type = match &xpath.base {
        XPathBase::Var(name) => match lookup(scope, name) {
            Some(v) => match v.tree_type() {
                Some(typ) => typ.to_owned(),
                None => {
                    return Err(WellFormedError::SortMismatch(format!(
                        "integer variable '{}' used as XPath base",
                        name
                    )))
                }
            },
            None => return Err(WellFormedError::UnresolvedVariable(name.clone())),
        },
        XPathBase::Type(typ) => typ.clone(),
    };
    if !grammar.is_defined(&base_type) {
        return Err(WellFormedError::UndefinedNonterminal(base_type));
    }
    let mut prev = base_type;
    for seg in &xpath.segments {
        if !grammar.is_defined(&seg.typ) {
            return Err(WellFormedError::UndefinedNonterminal(seg.typ.clone()));
        }
        let possible = if seg.descend {
            grammar.can_reach(&prev, &seg.typ)
        } else {
            grammar.can_be_child(&prev, &seg.typ)
        };
        if !possible || seg.index == Some(0) {
            return Err(WellFormedError::UnreachableXPath(xpath.to_string()));
        }
        prev = seg.typ.clone();
    }
    // The chain is possible; the base must still resolve to a binder for
    // the expression to ever denote nodes.
    if let XPathBase::Type(typ) = &xpath.base {
        return Err(WellFormedError::UnresolvedVariable(format!("<{}>", typ)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::grammar::parse_grammar;
    use crate::parse::{parse_formula, parse_unchecked, ParseError};
    use crate::predicates::SemanticRegistry;

    use super::*;

    fn grammar() -> Grammar {
        parse_grammar(
            r#"
            <start> ::= <stmt> ;
            <stmt> ::= <assgn> " ; " <stmt> | <assgn> ;
            <assgn> ::= <var> " := " <rhs> ;
            <rhs> ::= <var> | <digit> ;
            <var> ::= "a" | "b" | "c" ;
            <digit> ::= "0" | "1" | "2" ;
            "#,
        )
        .unwrap()
    }

    fn wf(text: &str) -> Result<(), WellFormedError> {
        let registry = SemanticRegistry::new();
        match parse_formula(text, &grammar(), &registry) {
            Ok(_) => Ok(()),
            Err(ParseError::WellFormed(e)) => Err(e),
            Err(other) => panic!("unexpected parse error: {}", other),
        }
    }

    #[test]
    fn resolved_formula_passes() {
        assert_eq!(
            wf("forall <assgn> a1: exists <assgn> a2: \
                (before(a2, a1) and a1.<rhs>.<var> = a2.<var>)"),
            Ok(())
        );
    }

    #[test]
    fn unresolved_variable() {
        assert_eq!(
            wf("forall <assgn> a: a = b"),
            Err(WellFormedError::UnresolvedVariable("b".to_owned()))
        );
    }

    #[test]
    fn shadowing_binder_rejected() {
        assert_eq!(
            wf("forall <assgn> a: forall <assgn> a: a = a"),
            Err(WellFormedError::DuplicateBinder("a".to_owned()))
        );
        assert_eq!(
            wf("forall <assgn> a = \"{<var> a} := {<rhs> r}\": true"),
            Err(WellFormedError::DuplicateBinder("a".to_owned()))
        );
        assert_eq!(
            wf("forall int start: true"),
            Err(WellFormedError::DuplicateBinder("start".to_owned()))
        );
    }

    #[test]
    fn sort_mismatch_without_coercion() {
        // An integer variable cannot meet a string without str.from_int.
        assert_eq!(
            wf("forall int i: forall <digit> d: d = i"),
            Err(WellFormedError::SortMismatch(
                "the operands of = have different sorts (String vs Int)".to_owned()
            ))
        );
        // With the explicit conversion it is fine.
        assert_eq!(wf("forall int i: forall <digit> d: (= (str.to.int d) i)"), Ok(()));
        // A non-boolean atom is not a formula.
        assert!(matches!(
            wf("forall <digit> d: (str.len d)"),
            Err(WellFormedError::SortMismatch(_))
        ));
    }

    #[test]
    fn undefined_quantified_type() {
        assert_eq!(
            wf("forall <widget> w: true"),
            Err(WellFormedError::UndefinedNonterminal("widget".to_owned()))
        );
    }

    #[test]
    fn xpath_chains_follow_the_grammar() {
        assert_eq!(wf("forall <assgn> a: a.<rhs>.<var> = \"a\""), Ok(()));
        assert_eq!(wf("forall <stmt> s: s..<digit> = \"1\""), Ok(()));
        // <digit> is not a direct child of <assgn>.
        assert_eq!(
            wf("forall <assgn> a: a.<digit> = \"1\""),
            Err(WellFormedError::UnreachableXPath("a.<digit>".to_owned()))
        );
        // <assgn> is not a descendant of <digit>.
        assert_eq!(
            wf("forall <digit> d: d..<assgn> = \"x\""),
            Err(WellFormedError::UnreachableXPath("d..<assgn>".to_owned()))
        );
    }

    #[test]
    fn xpath_type_base_reachability_precedes_resolution() {
        // <var> is not a descendant type of <digit>: the chain itself is
        // impossible, whether or not a binder exists.
        assert_eq!(
            wf("<digit>..<var>[1] = \"a\""),
            Err(WellFormedError::UnreachableXPath("<digit>..<var>[1]".to_owned()))
        );
    }

    #[test]
    fn in_range_must_be_a_tree() {
        assert_eq!(
            wf("forall int i: forall <assgn> a in i: true"),
            Err(WellFormedError::SortMismatch(
                "quantifier ranges in integer variable 'i'".to_owned()
            ))
        );
    }

    #[test]
    fn scope_is_popped_between_siblings() {
        // The same binder name in sibling quantifiers is legitimate.
        assert_eq!(
            wf("(exists <assgn> a: true) and (exists <assgn> a: true)"),
            Ok(())
        );
    }

    #[test]
    fn parse_unchecked_skips_this_pass() {
        let registry = SemanticRegistry::new();
        assert!(parse_unchecked("forall <widget> w: w = v", &registry).is_ok());
    }
}
