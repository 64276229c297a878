//! The formula AST: sorts, variables, match expressions, XPath expressions,
//! atoms, combinators and quantifiers, plus free-variable computation and
//! concrete-syntax printing.

pub mod wellformed;

use std::fmt::Display;
use std::rc::Rc;

use indexmap::IndexSet;
use itertools::Itertools;

use crate::predicates::{SemanticPredicate, StructuralPredicate};
use crate::smt::{escape_string, is_operator, SExpr};

/// The sort of a variable. There are exactly two: subtrees of a given
/// nonterminal type, and non-negative integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sort {
    Tree(String),
    Int,
}

impl Display for Sort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sort::Tree(typ) => write!(f, "<{}>", typ),
            Sort::Int => write!(f, "int"),
        }
    }
}

/// A named variable introduced by a quantifier binder or the top-level
/// `const` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    pub name: String,
    pub sort: Sort,
}

impl Variable {
    pub fn tree(name: impl Into<String>, typ: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            sort: Sort::Tree(typ.into()),
        }
    }

    pub fn int(name: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            sort: Sort::Int,
        }
    }

    /// The nonterminal type, for tree-sorted variables.
    pub fn tree_type(&self) -> Option<&str> {
        match &self.sort {
            Sort::Tree(typ) => Some(typ),
            Sort::Int => None,
        }
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The base of an XPath expression: a variable reference, or a nonterminal
/// type that did not resolve to any binder in scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum XPathBase {
    Var(String),
    Type(String),
}

/// One step of an XPath: `.<T>`, `.<T>[k]` (1-based selection among the
/// `<T>` children) or `..<T>` (transitive descendants of type `<T>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XPathSegment {
    pub typ: String,
    pub index: Option<usize>,
    pub descend: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XPathExpr {
    pub base: XPathBase,
    pub segments: Vec<XPathSegment>,
}

impl XPathExpr {
    /// The variable the path starts from, if it resolved to one.
    pub fn base_var(&self) -> Option<&str> {
        match &self.base {
            XPathBase::Var(name) => Some(name),
            XPathBase::Type(_) => None,
        }
    }
}

impl Display for XPathExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.base {
            XPathBase::Var(name) => write!(f, "{}", name)?,
            XPathBase::Type(typ) => write!(f, "<{}>", typ)?,
        }
        for seg in &self.segments {
            write!(f, "{}<{}>", if seg.descend { ".." } else { "." }, seg.typ)?;
            if let Some(k) = seg.index {
                write!(f, "[{}]", k)?;
            }
        }
        Ok(())
    }
}

/// One element of a match expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchElement {
    /// Constant terminal material.
    Text(String),
    /// `{<U> u}`: a hole of type `<U>` binding the matched subtree to `u`.
    Bind { typ: String, name: String },
    /// A bare `<U>`: a hole that matches without binding.
    Hole { typ: String },
    /// `[...]`: a sub-pattern matched iff present.
    Optional(Vec<MatchElement>),
}

/// A match expression constraining the shape of a quantified subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchExpr {
    pub elements: Vec<MatchElement>,
}

impl MatchExpr {
    /// The `(type, name)` pairs bound by this expression, in order.
    pub fn bindings(&self) -> Vec<(&str, &str)> {
        fn walk<'a>(elements: &'a [MatchElement], out: &mut Vec<(&'a str, &'a str)>) {
            for element in elements {
                match element {
                    MatchElement::Bind { typ, name } => out.push((typ, name)),
                    MatchElement::Optional(body) => walk(body, out),
                    MatchElement::Text(_) | MatchElement::Hole { .. } => {}
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.elements, &mut out);
        out
    }

    /// The nonterminal types mentioned anywhere in the expression.
    pub fn mentioned_types(&self) -> Vec<&str> {
        fn walk<'a>(elements: &'a [MatchElement], out: &mut Vec<&'a str>) {
            for element in elements {
                match element {
                    MatchElement::Bind { typ, .. } | MatchElement::Hole { typ } => out.push(typ),
                    MatchElement::Optional(body) => walk(body, out),
                    MatchElement::Text(_) => {}
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.elements, &mut out);
        out
    }
}

impl Display for MatchExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn write_elements(
            f: &mut std::fmt::Formatter<'_>,
            elements: &[MatchElement],
        ) -> std::fmt::Result {
            for element in elements {
                match element {
                    MatchElement::Text(text) => write!(f, "{}", text)?,
                    MatchElement::Bind { typ, name } => write!(f, "{{<{}> {}}}", typ, name)?,
                    MatchElement::Hole { typ } => write!(f, "<{}>", typ)?,
                    MatchElement::Optional(body) => {
                        write!(f, "[")?;
                        write_elements(f, body)?;
                        write!(f, "]")?;
                    }
                }
            }
            Ok(())
        }
        write_elements(f, &self.elements)
    }
}

/// An SMT-LIB boolean expression over in-scope variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtAtom {
    pub expr: SExpr,
}

impl SmtAtom {
    pub fn new(expr: SExpr) -> Self {
        SmtAtom { expr }
    }

    /// The free variable references of the atom, in occurrence order:
    /// every identifier that is not an operator, and every XPath base.
    pub fn variables(&self) -> IndexSet<String> {
        let mut vars = IndexSet::new();
        self.expr.walk(&mut |e| match e {
            SExpr::Symbol(name) => {
                if !is_operator(name) {
                    vars.insert(name.clone());
                }
            }
            SExpr::XPath(xpath) => {
                if let Some(base) = xpath.base_var() {
                    vars.insert(base.to_owned());
                }
            }
            _ => {}
        });
        // Application heads are operators, not references.
        let mut heads = IndexSet::new();
        self.expr.walk(&mut |e| {
            if let SExpr::App(items) = e {
                if let Some(SExpr::Symbol(name)) = items.first() {
                    if !is_operator(name) {
                        heads.insert(name.clone());
                    }
                }
            }
        });
        vars.retain(|name| !heads.contains(name));
        vars
    }
}

/// An argument of a structural or semantic predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredArg {
    /// A variable reference.
    Var(String),
    /// A nonterminal type used literally (no binder of that type in scope).
    Type(String),
    XPath(XPathExpr),
    Int(i64),
    Str(String),
}

impl Display for PredArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredArg::Var(name) => write!(f, "{}", name),
            PredArg::Type(typ) => write!(f, "<{}>", typ),
            PredArg::XPath(xpath) => write!(f, "{}", xpath),
            PredArg::Int(n) => write!(f, "{}", n),
            PredArg::Str(s) => write!(f, "\"{}\"", escape_string(s)),
        }
    }
}

/// A resolved semantic predicate handle. Equality is by name: the registry
/// guarantees one evaluator per name.
#[derive(Clone)]
pub struct SemPredRef(pub Rc<dyn SemanticPredicate>);

impl PartialEq for SemPredRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.name() == other.0.name()
    }
}

impl Eq for SemPredRef {}

impl std::fmt::Debug for SemPredRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SemPredRef({})", self.0.name())
    }
}

/// A tree quantifier: `forall/exists <T> v [= "..."] [in c] : body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantifier {
    /// The bound variable; its sort is always `Tree(_)`.
    pub var: Variable,
    /// True if the binder was written without an identifier; the variable
    /// is then named after its type and referenced as `<T>`.
    pub anonymous: bool,
    pub match_expr: Option<MatchExpr>,
    /// The variable the quantifier ranges in; `None` means the top-level
    /// constant.
    pub in_var: Option<String>,
    pub body: Formula,
}

impl Quantifier {
    pub fn typ(&self) -> &str {
        self.var.tree_type().expect("tree quantifier binds a tree variable")
    }
}

/// A well-formed ISLa formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    Smt(SmtAtom),
    StructPred {
        pred: &'static StructuralPredicate,
        args: Vec<PredArg>,
    },
    SemPred {
        pred: SemPredRef,
        args: Vec<PredArg>,
    },
    Not(Box<Formula>),
    And(Box<Formula>, Box<Formula>),
    Or(Box<Formula>, Box<Formula>),
    Xor(Box<Formula>, Box<Formula>),
    Implies(Box<Formula>, Box<Formula>),
    Iff(Box<Formula>, Box<Formula>),
    Forall(Box<Quantifier>),
    Exists(Box<Quantifier>),
    ForallInt {
        var: String,
        body: Box<Formula>,
    },
    ExistsInt {
        var: String,
        body: Box<Formula>,
    },
}

impl Formula {
    pub fn not(f: Formula) -> Formula {
        Formula::Not(Box::new(f))
    }

    /// The free variables: references of atoms minus everything bound by
    /// enclosing binders, computed structurally bottom-up.
    pub fn free_variables(&self) -> IndexSet<String> {
        match self {
            Formula::Smt(atom) => atom.variables(),
            Formula::StructPred { args, .. } | Formula::SemPred { args, .. } => {
                let mut vars = IndexSet::new();
                for arg in args {
                    match arg {
                        PredArg::Var(name) => {
                            vars.insert(name.clone());
                        }
                        PredArg::XPath(xpath) => {
                            if let Some(base) = xpath.base_var() {
                                vars.insert(base.to_owned());
                            }
                        }
                        PredArg::Type(_) | PredArg::Int(_) | PredArg::Str(_) => {}
                    }
                }
                vars
            }
            Formula::Not(f) => f.free_variables(),
            Formula::And(l, r)
            | Formula::Or(l, r)
            | Formula::Xor(l, r)
            | Formula::Implies(l, r)
            | Formula::Iff(l, r) => {
                let mut vars = l.free_variables();
                vars.extend(r.free_variables());
                vars
            }
            Formula::Forall(q) | Formula::Exists(q) => {
                let mut vars = q.body.free_variables();
                vars.shift_remove(&q.var.name);
                if let Some(mexpr) = &q.match_expr {
                    for (_, name) in mexpr.bindings() {
                        vars.shift_remove(name);
                    }
                }
                if let Some(in_var) = &q.in_var {
                    vars.insert(in_var.clone());
                }
                vars
            }
            Formula::ForallInt { var, body } | Formula::ExistsInt { var, body } => {
                let mut vars = body.free_variables();
                vars.shift_remove(var);
                vars
            }
        }
    }

    /// All XPath expressions anywhere in the formula whose base is the
    /// given variable. Shadowing cannot occur (duplicate binders are
    /// rejected), so the whole subformula is scanned.
    pub fn xpaths_based_at<'a>(&'a self, var: &str, out: &mut Vec<&'a XPathExpr>) {
        match self {
            Formula::Smt(atom) => {
                atom.expr.walk(&mut |e| {
                    if let SExpr::XPath(xpath) = e {
                        if xpath.base_var() == Some(var) {
                            out.push(xpath);
                        }
                    }
                });
            }
            Formula::StructPred { args, .. } | Formula::SemPred { args, .. } => {
                for arg in args {
                    if let PredArg::XPath(xpath) = arg {
                        if xpath.base_var() == Some(var) {
                            out.push(xpath);
                        }
                    }
                }
            }
            Formula::Not(f) => f.xpaths_based_at(var, out),
            Formula::And(l, r)
            | Formula::Or(l, r)
            | Formula::Xor(l, r)
            | Formula::Implies(l, r)
            | Formula::Iff(l, r) => {
                l.xpaths_based_at(var, out);
                r.xpaths_based_at(var, out);
            }
            Formula::Forall(q) | Formula::Exists(q) => q.body.xpaths_based_at(var, out),
            Formula::ForallInt { body, .. } | Formula::ExistsInt { body, .. } => {
                body.xpaths_based_at(var, out)
            }
        }
    }
}

/// A parsed specification: the top-level constant and the formula over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub constant: Variable,
    pub formula: Formula,
}

impl Constraint {
    /// The implicit constant used when no `const` declaration is present.
    pub fn default_constant() -> Variable {
        Variable::tree("start", "start")
    }
}

impl Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.constant != Self::default_constant() {
            writeln!(
                f,
                "const {}: {};",
                self.constant.name, self.constant.sort
            )?;
        }
        write!(f, "{}", self.formula)
    }
}

// Binding strengths for printing, mirroring the parser: iff is loosest,
// quantifier prefixes and `not` bind tightest among the combinators.
const PREC_IFF: u8 = 1;
const PREC_IMPLIES: u8 = 2;
const PREC_XOR: u8 = 3;
const PREC_OR: u8 = 4;
const PREC_AND: u8 = 5;
const PREC_UNARY: u8 = 6;

impl Formula {
    fn prec(&self) -> u8 {
        match self {
            Formula::Iff(_, _) => PREC_IFF,
            Formula::Implies(_, _) => PREC_IMPLIES,
            Formula::Xor(_, _) => PREC_XOR,
            Formula::Or(_, _) => PREC_OR,
            Formula::And(_, _) => PREC_AND,
            Formula::Not(_)
            | Formula::Forall(_)
            | Formula::Exists(_)
            | Formula::ForallInt { .. }
            | Formula::ExistsInt { .. } => PREC_UNARY,
            _ => u8::MAX,
        }
    }

    fn fmt_prec(&self, f: &mut std::fmt::Formatter<'_>, min: u8) -> std::fmt::Result {
        let prec = self.prec();
        if prec < min {
            write!(f, "(")?;
            self.fmt_prec(f, 0)?;
            return write!(f, ")");
        }
        match self {
            Formula::Smt(atom) => write!(f, "{}", atom.expr),
            Formula::StructPred { pred, args } => {
                write!(f, "{}({})", pred.name, args.iter().format(", "))
            }
            Formula::SemPred { pred, args } => {
                write!(f, "{}({})", pred.0.name(), args.iter().format(", "))
            }
            Formula::Not(inner) => {
                write!(f, "not ")?;
                inner.fmt_prec(f, PREC_UNARY)
            }
            Formula::And(l, r) => {
                l.fmt_prec(f, PREC_AND)?;
                write!(f, " and ")?;
                r.fmt_prec(f, PREC_AND + 1)
            }
            Formula::Or(l, r) => {
                l.fmt_prec(f, PREC_OR)?;
                write!(f, " or ")?;
                r.fmt_prec(f, PREC_OR + 1)
            }
            Formula::Xor(l, r) => {
                l.fmt_prec(f, PREC_XOR)?;
                write!(f, " xor ")?;
                r.fmt_prec(f, PREC_XOR + 1)
            }
            Formula::Implies(l, r) => {
                l.fmt_prec(f, PREC_IMPLIES)?;
                write!(f, " implies ")?;
                r.fmt_prec(f, PREC_IMPLIES + 1)
            }
            Formula::Iff(l, r) => {
                l.fmt_prec(f, PREC_IFF)?;
                write!(f, " iff ")?;
                r.fmt_prec(f, PREC_IFF + 1)
            }
            Formula::Forall(q) => fmt_quantifier(f, "forall", q),
            Formula::Exists(q) => fmt_quantifier(f, "exists", q),
            Formula::ForallInt { var, body } => {
                write!(f, "forall int {}: ", var)?;
                body.fmt_prec(f, PREC_UNARY)
            }
            Formula::ExistsInt { var, body } => {
                write!(f, "exists int {}: ", var)?;
                body.fmt_prec(f, PREC_UNARY)
            }
        }
    }
}

fn fmt_quantifier(
    f: &mut std::fmt::Formatter<'_>,
    word: &str,
    q: &Quantifier,
) -> std::fmt::Result {
    write!(f, "{} <{}>", word, q.typ())?;
    if !q.anonymous {
        write!(f, " {}", q.var.name)?;
    }
    if let Some(mexpr) = &q.match_expr {
        write!(f, " = \"{}\"", escape_string(&mexpr.to_string()))?;
    }
    if let Some(in_var) = &q.in_var {
        write!(f, " in {}", in_var)?;
    }
    write!(f, ": ")?;
    q.body.fmt_prec(f, PREC_UNARY)
}

impl Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.fmt_prec(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(expr: SExpr) -> Formula {
        Formula::Smt(SmtAtom::new(expr))
    }

    #[test]
    fn atom_variables_skip_operators() {
        let a = SmtAtom::new(SExpr::app(
            ">=",
            vec![
                SExpr::app("str.to.int", vec![SExpr::symbol("d")]),
                SExpr::symbol("n"),
            ],
        ));
        let vars_set = a.variables();
        let vars: Vec<&String> = vars_set.iter().collect();
        assert_eq!(vars, ["d", "n"]);
    }

    #[test]
    fn quantifier_subtracts_binders() {
        let body = atom(SExpr::app(
            "=",
            vec![SExpr::symbol("lhs"), SExpr::symbol("rhs")],
        ));
        let q = Formula::Forall(Box::new(Quantifier {
            var: Variable::tree("a", "assgn"),
            anonymous: false,
            match_expr: Some(MatchExpr {
                elements: vec![
                    MatchElement::Bind {
                        typ: "var".into(),
                        name: "lhs".into(),
                    },
                    MatchElement::Text(" := ".into()),
                    MatchElement::Bind {
                        typ: "var".into(),
                        name: "rhs".into(),
                    },
                ],
            }),
            in_var: Some("start".into()),
            body,
        }));
        let fv_set = q.free_variables();
        let fv: Vec<&String> = fv_set.iter().collect();
        assert_eq!(fv, ["start"]);
    }

    #[test]
    fn printing_respects_precedence() {
        let a = || atom(SExpr::Bool(true));
        let f = Formula::Or(
            Box::new(Formula::And(Box::new(a()), Box::new(a()))),
            Box::new(a()),
        );
        assert_eq!(f.to_string(), "true and true or true");
        let f = Formula::And(
            Box::new(Formula::Or(Box::new(a()), Box::new(a()))),
            Box::new(a()),
        );
        assert_eq!(f.to_string(), "(true or true) and true");
        let f = Formula::not(Formula::And(Box::new(a()), Box::new(a())));
        assert_eq!(f.to_string(), "not (true and true)");
    }

    #[test]
    fn quantifier_printing() {
        let q = Formula::Forall(Box::new(Quantifier {
            var: Variable::tree("a", "assgn"),
            anonymous: false,
            match_expr: Some(MatchExpr {
                elements: vec![
                    MatchElement::Bind {
                        typ: "var".into(),
                        name: "lhs".into(),
                    },
                    MatchElement::Text(" := ".into()),
                    MatchElement::Hole { typ: "rhs".into() },
                ],
            }),
            in_var: None,
            body: atom(SExpr::app(
                "=",
                vec![SExpr::symbol("lhs"), SExpr::Str("x".into())],
            )),
        }));
        assert_eq!(
            q.to_string(),
            "forall <assgn> a = \"{<var> lhs} := <rhs>\": (= lhs \"x\")"
        );
    }

    #[test]
    fn xpath_printing() {
        let xpath = XPathExpr {
            base: XPathBase::Var("a1".into()),
            segments: vec![
                XPathSegment {
                    typ: "rhs".into(),
                    index: None,
                    descend: false,
                },
                XPathSegment {
                    typ: "var".into(),
                    index: Some(1),
                    descend: false,
                },
            ],
        };
        assert_eq!(xpath.to_string(), "a1.<rhs>.<var>[1]");
        let xpath = XPathExpr {
            base: XPathBase::Type("a".into()),
            segments: vec![XPathSegment {
                typ: "b".into(),
                index: None,
                descend: true,
            }],
        };
        assert_eq!(xpath.to_string(), "<a>..<b>");
    }
}
