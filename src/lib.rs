//! The ISLa language core: reference grammars, derivation trees, the
//! formula language with its embedded SMT-LIB fragment, and the
//! three-valued satisfaction relation `tree ⊨ formula`.
//!
//! Solving (producing satisfying trees) and concrete SMT backends are out
//! of scope; the oracle is an injected [`smt::SmtOracle`].

pub mod error;
pub mod eval;
pub mod formula;
pub mod grammar;
pub mod parse;
pub mod predicates;
pub mod smt;
pub mod tree;

pub use error::IslaError;
pub use eval::{check, rewrite_universal_int, Assignment, EvalError, Value};
pub use formula::{wellformed::WellFormedError, Constraint, Formula};
pub use grammar::{parse_grammar, Grammar, GrammarError};
pub use parse::{parse_formula, ParseError};
pub use predicates::{SemanticPredicate, SemanticRegistry};
pub use smt::{GroundOracle, OracleEnv, SmtOracle, Verdict};
pub use tree::{DerivationTree, NodeId, Path};
