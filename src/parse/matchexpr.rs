//! The match-expression sub-language.
//!
//! A match expression arrives as the decoded contents of a string literal
//! after a quantifier binder, e.g. `{<var> lhs} := {<rhs> rhs}` or
//! `int {<id> def}[ = <expr>];`. The sub-lexer runs in three modes:
//! *default* emits raw text up to `{`, `[` or a nonterminal; *var-decl* is
//! active between `{` and `}` and recognises a type and a name, ignoring
//! whitespace; *optional* is active between `[` and `]` and admits text and
//! bare nonterminal holes. Newlines in default mode are stripped.

use indexmap::IndexSet;

use crate::formula::wellformed::WellFormedError;
use crate::formula::{MatchElement, MatchExpr};

use super::{ParseError, Pos};

pub fn parse_match_expr(text: &str, pos: Pos) -> Result<MatchExpr, ParseError> {
    let chars: Vec<char> = text.chars().collect();
    let mut idx = 0;
    let elements = elements(&chars, &mut idx, pos, false)?;
    let mexpr = MatchExpr { elements };
    let mut seen = IndexSet::new();
    for (_, name) in mexpr.bindings() {
        if !seen.insert(name.to_owned()) {
            return Err(WellFormedError::DuplicateBinder(name.to_owned()).into());
        }
    }
    Ok(mexpr)
}

fn unexpected(pos: Pos, expected: &str, found: impl Into<String>) -> ParseError {
    ParseError::Unexpected {
        pos,
        expected: expected.to_owned(),
        found: found.into(),
    }
}

fn elements(
    chars: &[char],
    idx: &mut usize,
    pos: Pos,
    in_optional: bool,
) -> Result<Vec<MatchElement>, ParseError> {
    let mut out = Vec::new();
    let mut text = String::new();
    macro_rules! flush {
        () => {
            if !text.is_empty() {
                out.push(MatchElement::Text(std::mem::take(&mut text)));
            }
        };
    }
    while let Some(&c) = chars.get(*idx) {
        match c {
            '{' => {
                if in_optional {
                    return Err(unexpected(pos, "text or a nonterminal inside '[...]'", "'{'"));
                }
                flush!();
                *idx += 1;
                out.push(var_decl(chars, idx, pos)?);
            }
            '[' => {
                if in_optional {
                    return Err(unexpected(pos, "']'", "'['"));
                }
                flush!();
                *idx += 1;
                let body = elements(chars, idx, pos, true)?;
                match chars.get(*idx) {
                    Some(']') => *idx += 1,
                    _ => return Err(unexpected(pos, "']'", "end of match expression")),
                }
                out.push(MatchElement::Optional(body));
            }
            ']' if in_optional => break,
            '<' => {
                if let Some((typ, len)) = nonterminal(chars, *idx) {
                    flush!();
                    *idx += len;
                    out.push(MatchElement::Hole { typ });
                } else {
                    text.push('<');
                    *idx += 1;
                }
            }
            '\n' if !in_optional => {
                // Newlines in default mode are presentation only.
                *idx += 1;
            }
            c => {
                text.push(c);
                *idx += 1;
            }
        }
    }
    flush!();
    Ok(out)
}

/// Parses `<T> name}` with the opening brace already consumed.
fn var_decl(chars: &[char], idx: &mut usize, pos: Pos) -> Result<MatchElement, ParseError> {
    skip_ws(chars, idx);
    let (typ, len) = nonterminal(chars, *idx)
        .ok_or_else(|| unexpected(pos, "a nonterminal type after '{'", current(chars, *idx)))?;
    *idx += len;
    skip_ws(chars, idx);
    let mut name = String::new();
    while let Some(&c) = chars.get(*idx) {
        if c.is_ascii_alphanumeric() || c == '_' {
            name.push(c);
            *idx += 1;
        } else {
            break;
        }
    }
    if name.is_empty() {
        return Err(unexpected(pos, "a variable name", current(chars, *idx)));
    }
    skip_ws(chars, idx);
    match chars.get(*idx) {
        Some('}') => *idx += 1,
        _ => return Err(unexpected(pos, "'}'", current(chars, *idx))),
    }
    Ok(MatchElement::Bind { typ, name })
}

fn skip_ws(chars: &[char], idx: &mut usize) {
    while chars.get(*idx).is_some_and(|c| c.is_whitespace()) {
        *idx += 1;
    }
}

fn current(chars: &[char], idx: usize) -> String {
    chars
        .get(idx)
        .map(|c| format!("'{}'", c))
        .unwrap_or_else(|| "end of match expression".to_owned())
}

fn nonterminal(chars: &[char], idx: usize) -> Option<(String, usize)> {
    if *chars.get(idx)? != '<' {
        return None;
    }
    let first = *chars.get(idx + 1)?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    let mut name = String::new();
    name.push(first);
    let mut end = idx + 2;
    loop {
        match *chars.get(end)? {
            '>' => return Some((name, end + 1 - idx)),
            c if c.is_ascii_alphanumeric() || c == '_' || c == '-' => {
                name.push(c);
                end += 1;
            }
            _ => return None,
        }
    }
}
