//! A reference oracle that decides ground formulas by direct evaluation.

use super::{EnvValue, OracleEnv, SExpr, SmtOracle, Verdict};

/// Decides formulas with no free symbols (beyond those bound in the
/// environment) by interpreting the string/integer core of SMT-LIB.
///
/// This is deliberately not a solver: quantified formulas, regular
/// expressions and anything symbolic come back as [`Verdict::Undef`].
/// Partial operations follow SMT-LIB: Euclidean `div`/`mod` (undefined for
/// divisor 0), `str.to.int` is -1 on non-numerals, `str.substr`/`str.at`
/// clamp to the empty string, `str.indexof` misses with -1.
#[derive(Debug, Default, Clone, Copy)]
pub struct GroundOracle;

impl GroundOracle {
    pub fn new() -> Self {
        GroundOracle
    }
}

impl SmtOracle for GroundOracle {
    fn check(&mut self, formula: &SExpr, env: &OracleEnv) -> Verdict {
        match eval(formula, env) {
            Some(Value::B(true)) => Verdict::Sat,
            Some(Value::B(false)) => Verdict::Unsat,
            _ => Verdict::Undef,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    B(bool),
    I(i64),
    S(String),
}

fn eval(expr: &SExpr, env: &OracleEnv) -> Option<Value> {
    match expr {
        SExpr::Bool(b) => Some(Value::B(*b)),
        SExpr::Int(n) => Some(Value::I(*n)),
        SExpr::Str(s) => Some(Value::S(s.clone())),
        SExpr::Symbol(name) => match env.get(name) {
            Some(EnvValue::Str(s)) => Some(Value::S(s.clone())),
            Some(EnvValue::Int(n)) => Some(Value::I(*n)),
            None => None,
        },
        // An unresolved node reference cannot be ground.
        SExpr::XPath(_) => None,
        SExpr::App(_) => apply(expr.head()?, expr.args(), env),
    }
}

fn apply(op: &str, args: &[SExpr], env: &OracleEnv) -> Option<Value> {
    // Unknown heads (quantifiers, annotations) and wrong arities are not
    // ground-evaluable.
    let entry = super::lookup_op(op)?;
    if !super::arity_ok(entry, args.len()) {
        return None;
    }
    // Evaluate eagerly; a single non-ground argument makes the whole
    // application non-ground.
    let vals: Vec<Value> = args
        .iter()
        .map(|a| eval(a, env))
        .collect::<Option<Vec<_>>>()?;

    let b = |v: &Value| match v {
        Value::B(b) => Some(*b),
        _ => None,
    };
    let i = |v: &Value| match v {
        Value::I(n) => Some(*n),
        _ => None,
    };
    let s = |v: &Value| match v {
        Value::S(s) => Some(s.clone()),
        _ => None,
    };

    match op {
        "not" => Some(Value::B(!b(vals.first()?)?)),
        "and" => {
            let mut acc = true;
            for v in &vals {
                acc &= b(v)?;
            }
            Some(Value::B(acc))
        }
        "or" => {
            let mut acc = false;
            for v in &vals {
                acc |= b(v)?;
            }
            Some(Value::B(acc))
        }
        "xor" => Some(Value::B(b(&vals[0])? ^ b(&vals[1])?)),
        "=>" => {
            // Right-associative chain: a => b => c is a => (b => c).
            let mut acc = b(vals.last()?)?;
            for v in vals.iter().rev().skip(1) {
                acc = !b(v)? || acc;
            }
            Some(Value::B(acc))
        }
        "=" => Some(Value::B(vals.first()? == vals.get(1)?)),
        ">=" => Some(Value::B(i(&vals[0])? >= i(&vals[1])?)),
        "<=" => Some(Value::B(i(&vals[0])? <= i(&vals[1])?)),
        ">" => Some(Value::B(i(&vals[0])? > i(&vals[1])?)),
        "<" => Some(Value::B(i(&vals[0])? < i(&vals[1])?)),
        "str.<=" => Some(Value::B(s(&vals[0])? <= s(&vals[1])?)),
        "+" => {
            let mut acc = 0i64;
            for v in &vals {
                acc = acc.checked_add(i(v)?)?;
            }
            Some(Value::I(acc))
        }
        "-" => {
            if vals.len() == 1 {
                return Some(Value::I(i(&vals[0])?.checked_neg()?));
            }
            let mut acc = i(&vals[0])?;
            for v in &vals[1..] {
                acc = acc.checked_sub(i(v)?)?;
            }
            Some(Value::I(acc))
        }
        "*" => {
            let mut acc = 1i64;
            for v in &vals {
                acc = acc.checked_mul(i(v)?)?;
            }
            Some(Value::I(acc))
        }
        "div" => {
            let (a, m) = (i(&vals[0])?, i(&vals[1])?);
            if m == 0 {
                return None;
            }
            Some(Value::I(a.div_euclid(m)))
        }
        "mod" => {
            let (a, m) = (i(&vals[0])?, i(&vals[1])?);
            if m == 0 {
                return None;
            }
            Some(Value::I(a.rem_euclid(m)))
        }
        "abs" => Some(Value::I(i(&vals[0])?.checked_abs()?)),
        "str.++" => {
            let mut acc = String::new();
            for v in &vals {
                acc.push_str(&s(v)?);
            }
            Some(Value::S(acc))
        }
        "str.len" => Some(Value::I(s(&vals[0])?.chars().count() as i64)),
        "str.at" => {
            let (t, n) = (s(&vals[0])?, i(&vals[1])?);
            let c = usize::try_from(n)
                .ok()
                .and_then(|n| t.chars().nth(n))
                .map(String::from)
                .unwrap_or_default();
            Some(Value::S(c))
        }
        "str.substr" => {
            let (t, from, len) = (s(&vals[0])?, i(&vals[1])?, i(&vals[2])?);
            let chars: Vec<char> = t.chars().collect();
            let out = match (usize::try_from(from), usize::try_from(len)) {
                (Ok(from), Ok(len)) if from < chars.len() => chars
                    [from..chars.len().min(from.saturating_add(len))]
                    .iter()
                    .collect(),
                _ => String::new(),
            };
            Some(Value::S(out))
        }
        "str.prefixof" => Some(Value::B(s(&vals[1])?.starts_with(&s(&vals[0])?))),
        "str.suffixof" => Some(Value::B(s(&vals[1])?.ends_with(&s(&vals[0])?))),
        "str.contains" => Some(Value::B(s(&vals[0])?.contains(&s(&vals[1])?))),
        "str.indexof" => {
            let (t, needle, from) = (s(&vals[0])?, s(&vals[1])?, i(&vals[2])?);
            Some(Value::I(str_indexof(&t, &needle, from)))
        }
        "str.replace" => {
            let (t, from, to) = (s(&vals[0])?, s(&vals[1])?, s(&vals[2])?);
            let out = if from.is_empty() {
                format!("{}{}", to, t)
            } else {
                t.replacen(&from, &to, 1)
            };
            Some(Value::S(out))
        }
        "str.replace_all" => {
            let (t, from, to) = (s(&vals[0])?, s(&vals[1])?, s(&vals[2])?);
            let out = if from.is_empty() { t } else { t.replace(&from, &to) };
            Some(Value::S(out))
        }
        "str.is_digit" => {
            let t = s(&vals[0])?;
            let mut chars = t.chars();
            let is_digit = matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_digit());
            Some(Value::B(is_digit))
        }
        "str.to_code" => {
            let t = s(&vals[0])?;
            let mut chars = t.chars();
            let code = match (chars.next(), chars.next()) {
                (Some(c), None) => c as i64,
                _ => -1,
            };
            Some(Value::I(code))
        }
        "str.from_code" => {
            let n = i(&vals[0])?;
            let out = u32::try_from(n)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_default();
            Some(Value::S(out))
        }
        "str.to.int" => {
            let t = s(&vals[0])?;
            let n = if !t.is_empty() && t.chars().all(|c| c.is_ascii_digit()) {
                t.parse::<i64>().unwrap_or(-1)
            } else {
                -1
            };
            Some(Value::I(n))
        }
        "str.from_int" => {
            let n = i(&vals[0])?;
            let out = if n >= 0 { n.to_string() } else { String::new() };
            Some(Value::S(out))
        }
        // The regex fragment and quantifiers are beyond ground evaluation.
        _ => None,
    }
}

fn str_indexof(haystack: &str, needle: &str, from: i64) -> i64 {
    let chars: Vec<char> = haystack.chars().collect();
    let from = match usize::try_from(from) {
        Ok(from) if from <= chars.len() => from,
        _ => return -1,
    };
    if needle.is_empty() {
        return from as i64;
    }
    let needle_chars: Vec<char> = needle.chars().collect();
    for start in from..=chars.len().saturating_sub(needle_chars.len()) {
        if chars[start..start + needle_chars.len()] == needle_chars[..] {
            return start as i64;
        }
    }
    -1
}
