//! Reference grammars in BNF and the queries the rest of the crate asks of them.

use std::fmt::Display;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::tree::DerivationTree;

/// A grammar symbol: either a reference to a nonterminal (written `<name>`)
/// or a literal terminal string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    Nonterminal(String),
    Terminal(String),
}

impl Symbol {
    pub fn nonterminal(name: impl Into<String>) -> Self {
        Symbol::Nonterminal(name.into())
    }

    pub fn terminal(text: impl Into<String>) -> Self {
        Symbol::Terminal(text.into())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Symbol::Terminal(_))
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Symbol::Nonterminal(name) => write!(f, "<{}>", name),
            Symbol::Terminal(text) => write!(f, "\"{}\"", escape(text)),
        }
    }
}

/// One expansion alternative: a non-empty sequence of symbols.
pub type Alternative = Vec<Symbol>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GrammarError {
    #[error("grammar has no rules")]
    Empty,
    #[error("undefined nonterminal <{0}>")]
    UndefinedNonterminal(String),
    #[error("duplicate definition of <{0}>")]
    DuplicateDefinition(String),
    #[error("empty alternative in rule for <{0}>")]
    EmptyAlternative(String),
    #[error("syntax error at {line}:{col}: {message}")]
    Syntax {
        line: usize,
        col: usize,
        message: String,
    },
}

/// A context-free reference grammar: an ordered map from nonterminal names
/// (without the angle brackets) to their expansion alternatives, plus a
/// designated start symbol.
///
/// Grammars are immutable once constructed and validated: every referenced
/// nonterminal is defined, the start symbol is defined, and no alternative
/// is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    rules: IndexMap<String, Vec<Alternative>>,
    start: String,
}

impl Grammar {
    /// Builds a grammar from explicit rules. A duplicate rule head is a
    /// [`GrammarError::DuplicateDefinition`]; use [`parse_grammar`] for the
    /// appending behaviour of the textual format.
    pub fn from_rules(
        rules: impl IntoIterator<Item = (String, Vec<Alternative>)>,
        start: impl Into<String>,
    ) -> Result<Self, GrammarError> {
        let mut map: IndexMap<String, Vec<Alternative>> = IndexMap::new();
        for (head, alts) in rules {
            if map.contains_key(&head) {
                return Err(GrammarError::DuplicateDefinition(head));
            }
            map.insert(head, alts);
        }
        let grammar = Grammar {
            rules: map,
            start: start.into(),
        };
        grammar.validate()?;
        Ok(grammar)
    }

    fn validate(&self) -> Result<(), GrammarError> {
        if self.rules.is_empty() {
            return Err(GrammarError::Empty);
        }
        if !self.rules.contains_key(&self.start) {
            return Err(GrammarError::UndefinedNonterminal(self.start.clone()));
        }
        for (head, alts) in &self.rules {
            for alt in alts {
                if alt.is_empty() {
                    return Err(GrammarError::EmptyAlternative(head.clone()));
                }
                for sym in alt {
                    if let Symbol::Nonterminal(name) = sym {
                        if !self.rules.contains_key(name) {
                            return Err(GrammarError::UndefinedNonterminal(name.clone()));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    /// The defined nonterminals, in definition order.
    pub fn nonterminals(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// The alternatives of the given nonterminal.
    pub fn rules(&self, name: &str) -> Result<&[Alternative], GrammarError> {
        self.rules
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| GrammarError::UndefinedNonterminal(name.to_owned()))
    }

    /// The nonterminal types that can occur as a direct child of `name`.
    pub fn child_types(&self, name: &str) -> IndexSet<&str> {
        let mut types = IndexSet::new();
        if let Some(alts) = self.rules.get(name) {
            for alt in alts {
                for sym in alt {
                    if let Symbol::Nonterminal(child) = sym {
                        types.insert(child.as_str());
                    }
                }
            }
        }
        types
    }

    /// All nonterminals reachable from `name` by one or more expansion
    /// steps. `name` itself is included only if it is reachable from itself.
    pub fn reachable(&self, name: &str) -> IndexSet<String> {
        let mut seen: IndexSet<String> = IndexSet::new();
        let mut queue: Vec<&str> = self.child_types(name).into_iter().collect();
        while let Some(next) = queue.pop() {
            if seen.insert(next.to_owned()) {
                queue.extend(self.child_types(next));
            }
        }
        seen
    }

    pub fn can_be_child(&self, parent: &str, child: &str) -> bool {
        self.child_types(parent).contains(child)
    }

    pub fn can_reach(&self, from: &str, to: &str) -> bool {
        self.reachable(from).contains(to)
    }

    /// Checks that every expanded node of the tree matches one of the
    /// alternatives of its nonterminal. Open nodes are permitted.
    pub fn validate_tree(&self, tree: &DerivationTree) -> Result<(), GrammarError> {
        for (_, node) in tree.paths() {
            let name = match tree.symbol(node) {
                Symbol::Nonterminal(name) => name.clone(),
                Symbol::Terminal(_) => continue,
            };
            let children = match tree.children(node) {
                Some(children) => children,
                None => continue, // open node
            };
            let alts = self.rules(&name)?;
            let matches_alt = alts.iter().any(|alt| {
                alt.len() == children.len()
                    && alt
                        .iter()
                        .zip(children.iter())
                        .all(|(sym, &child)| tree.symbol(child) == sym)
            });
            if !matches_alt {
                return Err(GrammarError::Syntax {
                    line: 0,
                    col: 0,
                    message: format!(
                        "tree node <{}> expanded to [{}], which matches no alternative",
                        name,
                        children
                            .iter()
                            .map(|&c| tree.symbol(c).to_string())
                            .collect::<Vec<_>>()
                            .join(" ")
                    ),
                });
            }
        }
        Ok(())
    }
}

impl Display for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (head, alts) in &self.rules {
            write!(f, "<{}> ::= ", head)?;
            for (i, alt) in alts.iter().enumerate() {
                if i > 0 {
                    write!(f, " | ")?;
                }
                for (j, sym) in alt.iter().enumerate() {
                    if j > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", sym)?;
                }
            }
            writeln!(f, " ;")?;
        }
        Ok(())
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

/// Parses the textual BNF format:
///
/// ```text
/// <stmt> ::= <assgn> " ; " <stmt> | <assgn> ;
/// ```
///
/// `#` starts a comment running to the end of the line. A repeated rule head
/// appends its alternatives to the earlier definition, preserving order.
/// The start symbol is `<start>` if defined, otherwise the first rule head.
pub fn parse_grammar(text: &str) -> Result<Grammar, GrammarError> {
    let mut scanner = Scanner::new(text);
    let mut rules: IndexMap<String, Vec<Alternative>> = IndexMap::new();

    scanner.skip_trivia();
    while !scanner.at_end() {
        let head = scanner.nonterminal()?;
        scanner.expect_str("::=")?;
        let mut alts = Vec::new();
        loop {
            let mut alt: Alternative = Vec::new();
            loop {
                scanner.skip_trivia();
                match scanner.peek() {
                    Some('<') => alt.push(Symbol::Nonterminal(scanner.nonterminal()?)),
                    Some('"') => alt.push(Symbol::Terminal(scanner.string()?)),
                    _ => break,
                }
            }
            if alt.is_empty() {
                return Err(GrammarError::EmptyAlternative(head.clone()));
            }
            alts.push(alt);
            scanner.skip_trivia();
            match scanner.peek() {
                Some('|') => {
                    scanner.bump();
                }
                Some(';') => {
                    scanner.bump();
                    break;
                }
                other => {
                    return Err(scanner.syntax(format!(
                        "expected '|' or ';', found {}",
                        other.map(|c| format!("'{}'", c)).unwrap_or_else(|| "end of input".into())
                    )))
                }
            }
        }
        rules.entry(head).or_default().extend(alts);
        scanner.skip_trivia();
    }

    if rules.is_empty() {
        return Err(GrammarError::Empty);
    }
    let start = if rules.contains_key("start") {
        "start".to_owned()
    } else {
        rules.keys().next().expect("rules are non-empty").clone()
    };
    let grammar = Grammar { rules, start };
    grammar.validate()?;
    Ok(grammar)
}

struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    col: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Scanner {
            chars: text.chars().peekable(),
            line: 1,
            col: 1,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        match c {
            Some('\n') => {
                self.line += 1;
                self.col = 1;
            }
            Some(_) => self.col += 1,
            None => {}
        }
        c
    }

    fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }

    fn syntax(&self, message: String) -> GrammarError {
        GrammarError::Syntax {
            line: self.line,
            col: self.col,
            message,
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn expect_str(&mut self, expected: &str) -> Result<(), GrammarError> {
        self.skip_trivia();
        for want in expected.chars() {
            match self.bump() {
                Some(c) if c == want => {}
                _ => return Err(self.syntax(format!("expected '{}'", expected))),
            }
        }
        Ok(())
    }

    fn nonterminal(&mut self) -> Result<String, GrammarError> {
        self.skip_trivia();
        match self.bump() {
            Some('<') => {}
            _ => return Err(self.syntax("expected '<'".into())),
        }
        let mut name = String::new();
        loop {
            match self.bump() {
                Some('>') => break,
                Some('<') | None => {
                    return Err(self.syntax("unterminated nonterminal".into()))
                }
                Some(c) => name.push(c),
            }
        }
        if name.is_empty() {
            return Err(self.syntax("empty nonterminal name".into()));
        }
        Ok(name)
    }

    fn string(&mut self) -> Result<String, GrammarError> {
        match self.bump() {
            Some('"') => {}
            _ => return Err(self.syntax("expected '\"'".into())),
        }
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(self.syntax("unterminated string".into())),
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('b') => text.push('\u{8}'),
                    Some('t') => text.push('\t'),
                    Some('n') => text.push('\n'),
                    Some('r') => text.push('\r'),
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    other => {
                        return Err(self.syntax(format!(
                            "invalid escape '\\{}'",
                            other.map(String::from).unwrap_or_default()
                        )))
                    }
                },
                Some(c) => text.push(c),
            }
        }
        Ok(text)
    }
}
