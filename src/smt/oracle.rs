//! The oracle seam: three-valued verdicts and the decision-procedure trait.

use std::fmt::Display;

use indexmap::IndexMap;

use super::SExpr;

/// The result of checking a formula against a tree, and of every oracle
/// call: Kleene three-valued logic with `Sat` as true, `Unsat` as false and
/// `Undef` as unknown. `Undef` is never collapsed to either pole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Sat,
    Unsat,
    Undef,
}

impl Verdict {
    pub fn from_bool(b: bool) -> Self {
        if b {
            Verdict::Sat
        } else {
            Verdict::Unsat
        }
    }

    pub fn is_sat(self) -> bool {
        self == Verdict::Sat
    }

    pub fn is_unsat(self) -> bool {
        self == Verdict::Unsat
    }

    pub fn is_undef(self) -> bool {
        self == Verdict::Undef
    }

    /// Kleene conjunction: `Unsat` dominates, `Sat` is neutral.
    pub fn and(self, other: Verdict) -> Verdict {
        match (self, other) {
            (Verdict::Unsat, _) | (_, Verdict::Unsat) => Verdict::Unsat,
            (Verdict::Sat, Verdict::Sat) => Verdict::Sat,
            _ => Verdict::Undef,
        }
    }

    /// Kleene disjunction: `Sat` dominates, `Unsat` is neutral.
    pub fn or(self, other: Verdict) -> Verdict {
        match (self, other) {
            (Verdict::Sat, _) | (_, Verdict::Sat) => Verdict::Sat,
            (Verdict::Unsat, Verdict::Unsat) => Verdict::Unsat,
            _ => Verdict::Undef,
        }
    }

    pub fn negate(self) -> Verdict {
        match self {
            Verdict::Sat => Verdict::Unsat,
            Verdict::Unsat => Verdict::Sat,
            Verdict::Undef => Verdict::Undef,
        }
    }

    pub fn implies(self, other: Verdict) -> Verdict {
        self.negate().or(other)
    }

    /// Exclusive or; `Undef` on either side stays `Undef`.
    pub fn xor(self, other: Verdict) -> Verdict {
        match (self, other) {
            (Verdict::Undef, _) | (_, Verdict::Undef) => Verdict::Undef,
            (a, b) => Verdict::from_bool(a != b),
        }
    }

    /// Equivalence: definite equality of definite values, else `Undef`.
    pub fn iff(self, other: Verdict) -> Verdict {
        match (self, other) {
            (Verdict::Undef, _) | (_, Verdict::Undef) => Verdict::Undef,
            (a, b) => Verdict::from_bool(a == b),
        }
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Sat => write!(f, "sat"),
            Verdict::Unsat => write!(f, "unsat"),
            Verdict::Undef => write!(f, "undef"),
        }
    }
}

/// A ground binding handed to the oracle alongside a formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    Str(String),
    Int(i64),
}

/// Bindings for the free identifiers of an oracle query.
pub type OracleEnv = IndexMap<String, EnvValue>;

/// External decision procedure for SMT-LIB formulas over strings and
/// integers.
///
/// `check` asks whether `formula` is satisfiable under `env`; `Undef` is a
/// legitimate answer (timeout, theory limitation) and is aggregated
/// Kleene-fashion by the evaluator, never treated as an error. A derivation
/// tree argument always arrives as its yield, i.e. a plain string.
///
/// Implementations need not be thread-safe; concurrent evaluation requires
/// one oracle instance per thread.
pub trait SmtOracle {
    fn check(&mut self, formula: &SExpr, env: &OracleEnv) -> Verdict;
}

#[cfg(test)]
mod tests {
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    use super::*;

    impl Arbitrary for Verdict {
        fn arbitrary(g: &mut Gen) -> Self {
            *g.choose(&[Verdict::Sat, Verdict::Unsat, Verdict::Undef])
                .unwrap()
        }
    }

    #[quickcheck]
    fn and_is_commutative_and_associative(a: Verdict, b: Verdict, c: Verdict) -> bool {
        a.and(b) == b.and(a) && a.and(b).and(c) == a.and(b.and(c))
    }

    #[quickcheck]
    fn or_is_commutative_and_associative(a: Verdict, b: Verdict, c: Verdict) -> bool {
        a.or(b) == b.or(a) && a.or(b).or(c) == a.or(b.or(c))
    }

    #[quickcheck]
    fn de_morgan(a: Verdict, b: Verdict) -> bool {
        a.and(b).negate() == a.negate().or(b.negate())
    }

    #[quickcheck]
    fn negation_is_involutive(a: Verdict) -> bool {
        a.negate().negate() == a
    }

    #[quickcheck]
    fn implies_is_or_of_negation(a: Verdict, b: Verdict) -> bool {
        a.implies(b) == a.negate().or(b)
    }

    #[test]
    fn undef_is_not_collapsed() {
        assert_eq!(Verdict::Undef.and(Verdict::Sat), Verdict::Undef);
        assert_eq!(Verdict::Undef.or(Verdict::Unsat), Verdict::Undef);
        // But dominant values still decide.
        assert_eq!(Verdict::Undef.and(Verdict::Unsat), Verdict::Unsat);
        assert_eq!(Verdict::Undef.or(Verdict::Sat), Verdict::Sat);
        assert_eq!(Verdict::Undef.iff(Verdict::Undef), Verdict::Undef);
    }
}
