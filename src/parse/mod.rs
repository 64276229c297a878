//! Parsing ISLa source into well-formed formulas.

mod formula;
mod lexer;
mod matchexpr;

pub use lexer::{tokenize, Pos, Token, TokenKind};

use thiserror::Error;

use crate::formula::wellformed::{self, WellFormedError};
use crate::formula::Constraint;
use crate::grammar::Grammar;
use crate::predicates::SemanticRegistry;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected character '{ch}' at {pos}")]
    Lex { pos: Pos, ch: char },
    #[error("unterminated string literal starting at {pos}")]
    UnterminatedString { pos: Pos },
    #[error("{pos}: expected {expected}, found {found}")]
    Unexpected {
        pos: Pos,
        expected: String,
        found: String,
    },
    #[error("{pos}: {name} expects {expected} argument(s), found {found}")]
    ArityMismatch {
        pos: Pos,
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("{pos}: unknown predicate {name}")]
    UnknownPredicate { pos: Pos, name: String },
    #[error(transparent)]
    WellFormed(#[from] WellFormedError),
}

/// Parses an ISLa specification (an optional `const` declaration followed
/// by one formula) and checks it well-formed against the reference
/// grammar. Semantic predicate names are resolved against `registry`.
pub fn parse_formula(
    text: &str,
    grammar: &Grammar,
    registry: &SemanticRegistry,
) -> Result<Constraint, ParseError> {
    let constraint = parse_unchecked(text, registry)?;
    wellformed::check(&constraint, grammar)?;
    Ok(constraint)
}

/// Parses without the well-formedness pass. Internal: transformation
/// helpers and tests that construct formulas over no particular grammar.
pub(crate) fn parse_unchecked(
    text: &str,
    registry: &SemanticRegistry,
) -> Result<Constraint, ParseError> {
    let tokens = tokenize(text)?;
    formula::Parser::new(&tokens, registry).parse()
}

pub(crate) use matchexpr::parse_match_expr;
