//! Shared fixtures: the assignment-language grammar, tree construction
//! for its sentences, and scripted oracles.

use isla::grammar::{parse_grammar, Grammar, Symbol};
use isla::smt::{OracleEnv, SExpr, SmtOracle, Verdict};
use isla::tree::{DerivationTree, NodeId};

pub const ASSGN_BNF: &str = r#"
    <start> ::= <stmt> ;
    <stmt> ::= <assgn> " ; " <stmt> | <assgn> ;
    <assgn> ::= <var> " := " <rhs> ;
    <rhs> ::= <var> | <digit> ;
    <var> ::= "a" | "b" | "c" ;
    <digit> ::= "0" | "1" | "2" ;
"#;

pub fn assgn_grammar() -> Grammar {
    parse_grammar(ASSGN_BNF).unwrap()
}

/// The right-hand side of one assignment.
#[derive(Debug, Clone, Copy)]
pub enum Rhs<'a> {
    Var(&'a str),
    Digit(&'a str),
}

/// Builds the derivation tree of `lhs₀ := rhs₀ ; lhs₁ := rhs₁ ; …` over
/// the assignment grammar.
pub fn assignments(pairs: &[(&str, Rhs)]) -> DerivationTree {
    assert!(!pairs.is_empty());
    let mut tree = DerivationTree::new(Symbol::nonterminal("start"));
    let mut stmt = tree.add_child(tree.root(), Symbol::nonterminal("stmt"));
    for (i, (lhs, rhs)) in pairs.iter().enumerate() {
        let assgn = tree.add_child(stmt, Symbol::nonterminal("assgn"));
        let var = tree.add_child(assgn, Symbol::nonterminal("var"));
        tree.add_child(var, Symbol::terminal(*lhs));
        tree.add_child(assgn, Symbol::terminal(" := "));
        let rhs_node = tree.add_child(assgn, Symbol::nonterminal("rhs"));
        match rhs {
            Rhs::Var(name) => {
                let v = tree.add_child(rhs_node, Symbol::nonterminal("var"));
                tree.add_child(v, Symbol::terminal(*name));
            }
            Rhs::Digit(digit) => {
                let d = tree.add_child(rhs_node, Symbol::nonterminal("digit"));
                tree.add_child(d, Symbol::terminal(*digit));
            }
        }
        if i + 1 < pairs.len() {
            tree.add_child(stmt, Symbol::terminal(" ; "));
            stmt = tree.add_child(stmt, Symbol::nonterminal("stmt"));
        }
    }
    tree
}

#[allow(dead_code)]
pub fn node_of_yield(tree: &DerivationTree, typ: &str, wanted: &str) -> NodeId {
    tree.nodes_of_type(tree.root(), typ)
        .into_iter()
        .find(|&n| tree.yield_of(n) == wanted)
        .unwrap()
}

/// An oracle that answers every query with one fixed verdict and records
/// what it was asked.
#[allow(dead_code)]
pub struct ScriptedOracle {
    pub reply: Verdict,
    pub queries: Vec<String>,
}

#[allow(dead_code)]
impl ScriptedOracle {
    pub fn new(reply: Verdict) -> Self {
        ScriptedOracle {
            reply,
            queries: Vec::new(),
        }
    }
}

impl SmtOracle for ScriptedOracle {
    fn check(&mut self, formula: &SExpr, _env: &OracleEnv) -> Verdict {
        self.queries.push(formula.to_string());
        self.reply
    }
}
