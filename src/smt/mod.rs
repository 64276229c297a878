//! The embedded SMT-LIB fragment: S-expressions, the operator table, and
//! sort inference for atoms.

mod ground;
mod oracle;

pub use ground::GroundOracle;
pub use oracle::{EnvValue, OracleEnv, SmtOracle, Verdict};

use std::fmt::Display;

use itertools::Itertools;

use crate::formula::XPathExpr;

/// An SMT-LIB expression, parsed from either S-expression or infix notation
/// and preserved structurally for the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SExpr {
    Bool(bool),
    Int(i64),
    Str(String),
    /// An operator name or a free identifier (a variable reference).
    Symbol(String),
    /// An XPath selecting a node whose yield stands in for the term.
    XPath(XPathExpr),
    /// A parenthesised application; the head is normally a `Symbol`.
    App(Vec<SExpr>),
}

impl SExpr {
    pub fn symbol(name: impl Into<String>) -> Self {
        SExpr::Symbol(name.into())
    }

    pub fn app(head: impl Into<String>, args: impl IntoIterator<Item = SExpr>) -> Self {
        let mut items = vec![SExpr::Symbol(head.into())];
        items.extend(args);
        SExpr::App(items)
    }

    /// The operator name, if this is an application headed by a symbol.
    pub fn head(&self) -> Option<&str> {
        match self {
            SExpr::App(items) => match items.first() {
                Some(SExpr::Symbol(name)) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn args(&self) -> &[SExpr] {
        match self {
            SExpr::App(items) if !items.is_empty() => &items[1..],
            _ => &[],
        }
    }

    /// Walks the expression, calling `visit` on every node.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a SExpr)) {
        visit(self);
        if let SExpr::App(items) = self {
            for item in items {
                item.walk(visit);
            }
        }
    }
}

impl Display for SExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SExpr::Bool(b) => write!(f, "{}", b),
            SExpr::Int(n) => write!(f, "{}", n),
            SExpr::Str(s) => write!(f, "\"{}\"", escape_string(s)),
            SExpr::Symbol(name) => write!(f, "{}", name),
            SExpr::XPath(xpath) => write!(f, "{}", xpath),
            SExpr::App(items) => write!(f, "({})", items.iter().format(" ")),
        }
    }
}

/// Escapes a string for ISLa source: a literal quote is `\"`, not the
/// doubled-quote form of standard SMT-LIB.
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\u{8}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out
}

/// The sort of an SMT term. Derivation-tree variables enter atoms at sort
/// [`SmtSort::Str`]; there is no implicit coercion between `Str` and `Int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmtSort {
    Bool,
    Int,
    Str,
    Re,
}

impl Display for SmtSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmtSort::Bool => write!(f, "Bool"),
            SmtSort::Int => write!(f, "Int"),
            SmtSort::Str => write!(f, "String"),
            SmtSort::Re => write!(f, "RegLan"),
        }
    }
}

/// Argument discipline of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    /// Fixed argument sorts.
    Fixed(&'static [SmtSort], SmtSort),
    /// Two or more arguments of one sort (`+`, `and`, `str.++`, ...).
    Variadic(SmtSort, SmtSort),
    /// `=`: two arguments of any one common sort, Bool result.
    Equal,
}

/// Infix binding strength, loosest to tightest. Operators without a level
/// are prefix-only in ISLa's surface syntax.
pub const LEVEL_CMP: u8 = 1;
pub const LEVEL_ADD: u8 = 2;
pub const LEVEL_MUL: u8 = 3;
pub const LEVEL_CONCAT: u8 = 4;

#[derive(Debug, Clone, Copy)]
pub struct SmtOp {
    pub name: &'static str,
    pub sig: Signature,
    pub infix_level: Option<u8>,
}

use Signature::{Equal, Fixed, Variadic};
use SmtSort::{Bool, Int, Re, Str};

/// The operator table of the language. `str.to.int` (dotted) is deliberate;
/// the standard `str.to_int` spelling is not part of the language.
#[rustfmt::skip]
pub const OPERATORS: &[SmtOp] = &[
    SmtOp { name: "=", sig: Equal, infix_level: Some(LEVEL_CMP) },
    SmtOp { name: ">=", sig: Fixed(&[Int, Int], Bool), infix_level: Some(LEVEL_CMP) },
    SmtOp { name: "<=", sig: Fixed(&[Int, Int], Bool), infix_level: Some(LEVEL_CMP) },
    SmtOp { name: ">", sig: Fixed(&[Int, Int], Bool), infix_level: Some(LEVEL_CMP) },
    SmtOp { name: "<", sig: Fixed(&[Int, Int], Bool), infix_level: Some(LEVEL_CMP) },
    SmtOp { name: "str.<=", sig: Fixed(&[Str, Str], Bool), infix_level: Some(LEVEL_CMP) },
    SmtOp { name: "+", sig: Variadic(Int, Int), infix_level: Some(LEVEL_ADD) },
    SmtOp { name: "-", sig: Variadic(Int, Int), infix_level: Some(LEVEL_ADD) },
    SmtOp { name: "*", sig: Variadic(Int, Int), infix_level: Some(LEVEL_MUL) },
    SmtOp { name: "div", sig: Fixed(&[Int, Int], Int), infix_level: Some(LEVEL_MUL) },
    SmtOp { name: "mod", sig: Fixed(&[Int, Int], Int), infix_level: Some(LEVEL_MUL) },
    SmtOp { name: "str.++", sig: Variadic(Str, Str), infix_level: Some(LEVEL_CONCAT) },
    SmtOp { name: "re.++", sig: Variadic(Re, Re), infix_level: Some(LEVEL_CONCAT) },
    // Boolean connectives are formula combinators in the surface syntax but
    // remain valid S-expression heads.
    SmtOp { name: "and", sig: Variadic(Bool, Bool), infix_level: None },
    SmtOp { name: "or", sig: Variadic(Bool, Bool), infix_level: None },
    SmtOp { name: "xor", sig: Fixed(&[Bool, Bool], Bool), infix_level: None },
    SmtOp { name: "=>", sig: Variadic(Bool, Bool), infix_level: None },
    SmtOp { name: "not", sig: Fixed(&[Bool], Bool), infix_level: None },
    SmtOp { name: "abs", sig: Fixed(&[Int], Int), infix_level: None },
    SmtOp { name: "re.+", sig: Fixed(&[Re], Re), infix_level: None },
    SmtOp { name: "re.*", sig: Fixed(&[Re], Re), infix_level: None },
    SmtOp { name: "re.opt", sig: Fixed(&[Re], Re), infix_level: None },
    SmtOp { name: "re.comp", sig: Fixed(&[Re], Re), infix_level: None },
    SmtOp { name: "re.diff", sig: Fixed(&[Re, Re], Re), infix_level: None },
    SmtOp { name: "re.range", sig: Fixed(&[Str, Str], Re), infix_level: None },
    SmtOp { name: "re.loop", sig: Fixed(&[Int, Int, Re], Re), infix_level: None },
    SmtOp { name: "re.none", sig: Fixed(&[], Re), infix_level: None },
    SmtOp { name: "re.all", sig: Fixed(&[], Re), infix_level: None },
    SmtOp { name: "re.allchar", sig: Fixed(&[], Re), infix_level: None },
    SmtOp { name: "str.len", sig: Fixed(&[Str], Int), infix_level: None },
    SmtOp { name: "str.in_re", sig: Fixed(&[Str, Re], Bool), infix_level: None },
    SmtOp { name: "str.to_re", sig: Fixed(&[Str], Re), infix_level: None },
    SmtOp { name: "str.at", sig: Fixed(&[Str, Int], Str), infix_level: None },
    SmtOp { name: "str.substr", sig: Fixed(&[Str, Int, Int], Str), infix_level: None },
    SmtOp { name: "str.prefixof", sig: Fixed(&[Str, Str], Bool), infix_level: None },
    SmtOp { name: "str.suffixof", sig: Fixed(&[Str, Str], Bool), infix_level: None },
    SmtOp { name: "str.contains", sig: Fixed(&[Str, Str], Bool), infix_level: None },
    SmtOp { name: "str.indexof", sig: Fixed(&[Str, Str, Int], Int), infix_level: None },
    SmtOp { name: "str.replace", sig: Fixed(&[Str, Str, Str], Str), infix_level: None },
    SmtOp { name: "str.replace_all", sig: Fixed(&[Str, Str, Str], Str), infix_level: None },
    SmtOp { name: "str.replace_re", sig: Fixed(&[Str, Re, Str], Str), infix_level: None },
    SmtOp { name: "str.replace_re_all", sig: Fixed(&[Str, Re, Str], Str), infix_level: None },
    SmtOp { name: "str.is_digit", sig: Fixed(&[Str], Bool), infix_level: None },
    SmtOp { name: "str.to_code", sig: Fixed(&[Str], Int), infix_level: None },
    SmtOp { name: "str.from_code", sig: Fixed(&[Int], Str), infix_level: None },
    SmtOp { name: "str.to.int", sig: Fixed(&[Str], Int), infix_level: None },
    SmtOp { name: "str.from_int", sig: Fixed(&[Int], Str), infix_level: None },
];

pub fn lookup_op(name: &str) -> Option<&'static SmtOp> {
    OPERATORS.iter().find(|op| op.name == name)
}

pub fn is_operator(name: &str) -> bool {
    lookup_op(name).is_some()
}

/// Checks an application's argument count against the table. `-` also
/// accepts a single argument (unary negation).
pub fn arity_ok(op: &SmtOp, argc: usize) -> bool {
    match op.sig {
        Fixed(args, _) => argc == args.len(),
        Variadic(_, _) => argc >= 2 || (op.name == "-" && argc == 1),
        Equal => argc == 2,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SortError {
    #[error("operator {op} expects {expected} argument(s), found {found}")]
    Arity {
        op: String,
        expected: usize,
        found: usize,
    },
    #[error("argument {index} of {op} has sort {found}, expected {expected}")]
    Mismatch {
        op: String,
        index: usize,
        expected: SmtSort,
        found: SmtSort,
    },
    #[error("the operands of = have different sorts ({0} vs {1})")]
    UnequalOperands(SmtSort, SmtSort),
    #[error("unknown operator {0}")]
    UnknownOp(String),
    #[error("unknown identifier {0}")]
    UnknownSymbol(String),
    #[error("application head is not an operator")]
    BadHead,
}

/// Infers the sort of an expression. `var_sort` supplies the sorts of free
/// identifiers (variable references); everything else comes from the table.
pub fn infer_sort(
    expr: &SExpr,
    var_sort: &dyn Fn(&str) -> Option<SmtSort>,
) -> Result<SmtSort, SortError> {
    match expr {
        SExpr::Bool(_) => Ok(SmtSort::Bool),
        SExpr::Int(_) => Ok(SmtSort::Int),
        SExpr::Str(_) => Ok(SmtSort::Str),
        SExpr::XPath(_) => Ok(SmtSort::Str),
        SExpr::Symbol(name) => {
            if let Some(op) = lookup_op(name) {
                // Nullary operators (`re.none`, ...) may appear bare.
                if let Fixed(&[], ret) = op.sig {
                    return Ok(ret);
                }
            }
            var_sort(name).ok_or_else(|| SortError::UnknownSymbol(name.clone()))
        }
        SExpr::App(_) => {
            let name = expr.head().ok_or(SortError::BadHead)?;
            let op = lookup_op(name).ok_or_else(|| SortError::UnknownOp(name.to_owned()))?;
            let args = expr.args();
            if !arity_ok(op, args.len()) {
                let expected = match op.sig {
                    Fixed(sorts, _) => sorts.len(),
                    _ => 2,
                };
                return Err(SortError::Arity {
                    op: name.to_owned(),
                    expected,
                    found: args.len(),
                });
            }
            match op.sig {
                Fixed(sorts, ret) => {
                    for (index, (arg, &expected)) in args.iter().zip(sorts.iter()).enumerate() {
                        let found = infer_sort(arg, var_sort)?;
                        if found != expected {
                            return Err(SortError::Mismatch {
                                op: name.to_owned(),
                                index,
                                expected,
                                found,
                            });
                        }
                    }
                    Ok(ret)
                }
                Variadic(each, ret) => {
                    for (index, arg) in args.iter().enumerate() {
                        let found = infer_sort(arg, var_sort)?;
                        if found != each {
                            return Err(SortError::Mismatch {
                                op: name.to_owned(),
                                index,
                                expected: each,
                                found,
                            });
                        }
                    }
                    Ok(ret)
                }
                Equal => {
                    let left = infer_sort(&args[0], var_sort)?;
                    let right = infer_sort(&args[1], var_sort)?;
                    if left != right {
                        return Err(SortError::UnequalOperands(left, right));
                    }
                    Ok(SmtSort::Bool)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_vars(_: &str) -> Option<SmtSort> {
        None
    }

    #[test]
    fn table_contains_dotted_to_int() {
        assert!(is_operator("str.to.int"));
        assert!(!is_operator("str.to_int"));
    }

    #[test]
    fn printing_is_smt_shaped() {
        let e = SExpr::app(
            ">=",
            vec![
                SExpr::app("str.to.int", vec![SExpr::symbol("d")]),
                SExpr::Int(0),
            ],
        );
        assert_eq!(e.to_string(), "(>= (str.to.int d) 0)");
    }

    #[test]
    fn string_escapes_use_single_backslash_quote() {
        assert_eq!(SExpr::Str("a\"b".into()).to_string(), "\"a\\\"b\"");
        assert_eq!(SExpr::Str("a\\n".into()).to_string(), "\"a\\\\n\"");
    }

    #[test]
    fn infer_ground_comparison() {
        let e = SExpr::app(
            ">=",
            vec![
                SExpr::app("str.to.int", vec![SExpr::Str("12".into())]),
                SExpr::Int(0),
            ],
        );
        assert_eq!(infer_sort(&e, &no_vars), Ok(SmtSort::Bool));
    }

    #[test]
    fn infer_rejects_sort_confusion() {
        // (str.len 5): Int where Str is expected.
        let e = SExpr::app("str.len", vec![SExpr::Int(5)]);
        assert!(matches!(
            infer_sort(&e, &no_vars),
            Err(SortError::Mismatch { .. })
        ));
        // (= "a" 1): operands disagree.
        let e = SExpr::app("=", vec![SExpr::Str("a".into()), SExpr::Int(1)]);
        assert!(matches!(
            infer_sort(&e, &no_vars),
            Err(SortError::UnequalOperands(SmtSort::Str, SmtSort::Int))
        ));
    }

    #[test]
    fn variables_take_their_declared_sort() {
        let sorts = |name: &str| match name {
            "t" => Some(SmtSort::Str),
            "i" => Some(SmtSort::Int),
            _ => None,
        };
        let e = SExpr::app(
            "=",
            vec![
                SExpr::symbol("i"),
                SExpr::app("str.len", vec![SExpr::symbol("t")]),
            ],
        );
        assert_eq!(infer_sort(&e, &sorts), Ok(SmtSort::Bool));
        let e = SExpr::app("str.len", vec![SExpr::symbol("i")]);
        assert!(infer_sort(&e, &sorts).is_err());
    }

    #[test]
    fn nullary_ops_are_bare_symbols() {
        assert_eq!(
            infer_sort(&SExpr::symbol("re.none"), &no_vars),
            Ok(SmtSort::Re)
        );
    }

    #[test]
    fn unary_minus_is_allowed() {
        let op = lookup_op("-").unwrap();
        assert!(arity_ok(op, 1));
        assert!(arity_ok(op, 2));
        let plus = lookup_op("+").unwrap();
        assert!(!arity_ok(plus, 1));
    }
}
