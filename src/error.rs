use thiserror::Error;

use crate::eval::EvalError;
use crate::formula::wellformed::WellFormedError;
use crate::grammar::GrammarError;
use crate::parse::ParseError;

#[derive(Error, Debug)]
#[error(transparent)]
pub struct IslaError(#[from] pub ErrorRepr);

#[derive(Debug, Error)]
pub enum ErrorRepr {
    /// An error in the reference grammar.
    #[error(transparent)]
    Grammar(GrammarError),

    /// A lexical or syntactic error in the ISLa source.
    #[error(transparent)]
    Parse(ParseError),

    /// A runtime error during evaluation.
    #[error(transparent)]
    Eval(EvalError),
}

// Resolve transitive conversions

impl From<GrammarError> for IslaError {
    fn from(err: GrammarError) -> Self {
        IslaError(ErrorRepr::Grammar(err))
    }
}

impl From<ParseError> for IslaError {
    fn from(err: ParseError) -> Self {
        IslaError(ErrorRepr::Parse(err))
    }
}

impl From<WellFormedError> for IslaError {
    fn from(err: WellFormedError) -> Self {
        IslaError(ErrorRepr::Parse(ParseError::WellFormed(err)))
    }
}

impl From<EvalError> for IslaError {
    fn from(err: EvalError) -> Self {
        IslaError(ErrorRepr::Eval(err))
    }
}
