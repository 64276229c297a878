//! The ISLa lexer.
//!
//! Whitespace and `#`-to-end-of-line comments are elided. Nonterminal types
//! (`<assgn>`) and XPath expressions (`a.<rhs>.<var>`, `<a>..<b>`) are
//! emitted as single tokens, as are dotted SMT operator names such as
//! `str.to.int`, `str.++` and `str.<=`. String literals use `"` with the
//! escapes `\b \t \n \r \" \\`; a literal quote is `\"`, never the
//! doubled-quote form of SMT-LIB.

use std::fmt::Display;

use crate::formula::{XPathBase, XPathExpr, XPathSegment};

use super::ParseError;

/// A source position, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub line: usize,
    pub col: usize,
}

impl Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// An identifier, possibly a dotted SMT operator name.
    Ident(String),
    Int(i64),
    Str(String),
    Nonterminal(String),
    XPath(XPathExpr),
    // Reserved words.
    Const,
    Forall,
    Exists,
    In,
    IntKw,
    Not,
    And,
    Or,
    Xor,
    Implies,
    Iff,
    True,
    False,
    // Punctuation and operator characters.
    LParen,
    RParen,
    Colon,
    Semi,
    Comma,
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    Star,
    /// `=>`
    Arrow,
}

impl TokenKind {
    /// The SMT operator this token denotes, if any.
    pub fn op_name(&self) -> Option<&str> {
        match self {
            TokenKind::Eq => Some("="),
            TokenKind::Lt => Some("<"),
            TokenKind::Gt => Some(">"),
            TokenKind::Le => Some("<="),
            TokenKind::Ge => Some(">="),
            TokenKind::Plus => Some("+"),
            TokenKind::Minus => Some("-"),
            TokenKind::Star => Some("*"),
            TokenKind::Arrow => Some("=>"),
            TokenKind::And => Some("and"),
            TokenKind::Or => Some("or"),
            TokenKind::Xor => Some("xor"),
            TokenKind::Not => Some("not"),
            TokenKind::Ident(name) if crate::smt::is_operator(name) => Some(name),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::Int(n) => format!("integer {}", n),
            TokenKind::Str(_) => "string literal".to_owned(),
            TokenKind::Nonterminal(name) => format!("<{}>", name),
            TokenKind::XPath(xpath) => format!("XPath '{}'", xpath),
            TokenKind::Const => "'const'".to_owned(),
            TokenKind::Forall => "'forall'".to_owned(),
            TokenKind::Exists => "'exists'".to_owned(),
            TokenKind::In => "'in'".to_owned(),
            TokenKind::IntKw => "'int'".to_owned(),
            TokenKind::Not => "'not'".to_owned(),
            TokenKind::And => "'and'".to_owned(),
            TokenKind::Or => "'or'".to_owned(),
            TokenKind::Xor => "'xor'".to_owned(),
            TokenKind::Implies => "'implies'".to_owned(),
            TokenKind::Iff => "'iff'".to_owned(),
            TokenKind::True => "'true'".to_owned(),
            TokenKind::False => "'false'".to_owned(),
            TokenKind::LParen => "'('".to_owned(),
            TokenKind::RParen => "')'".to_owned(),
            TokenKind::Colon => "':'".to_owned(),
            TokenKind::Semi => "';'".to_owned(),
            TokenKind::Comma => "','".to_owned(),
            TokenKind::Eq => "'='".to_owned(),
            TokenKind::Lt => "'<'".to_owned(),
            TokenKind::Gt => "'>'".to_owned(),
            TokenKind::Le => "'<='".to_owned(),
            TokenKind::Ge => "'>='".to_owned(),
            TokenKind::Plus => "'+'".to_owned(),
            TokenKind::Minus => "'-'".to_owned(),
            TokenKind::Star => "'*'".to_owned(),
            TokenKind::Arrow => "'=>'".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

pub fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(text).run()
}

struct Lexer {
    chars: Vec<char>,
    idx: usize,
    line: usize,
    col: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Characters allowed after a dot in an operator name (`to`, `int`, `++`,
/// `+`, `*`).
fn is_op_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '+' || c == '*'
}

impl Lexer {
    fn new(text: &str) -> Self {
        Lexer {
            chars: text.chars().collect(),
            idx: 0,
            line: 1,
            col: 1,
        }
    }

    fn pos(&self) -> Pos {
        Pos {
            line: self.line,
            col: self.col,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.idx + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.idx).copied();
        if let Some(c) = c {
            self.idx += 1;
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        c
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

    /// If a nonterminal token `<name>` starts at `offset`, returns the name
    /// and the number of characters it occupies.
    fn nonterminal_at(&self, offset: usize) -> Option<(String, usize)> {
        if self.peek_at(offset) != Some('<') {
            return None;
        }
        let first = self.peek_at(offset + 1)?;
        if !is_ident_start(first) {
            return None;
        }
        let mut name = String::new();
        name.push(first);
        let mut end = offset + 2;
        loop {
            match self.peek_at(end)? {
                '>' => return Some((name, end + 1 - offset)),
                c if is_ident_continue(c) || c == '-' => {
                    name.push(c);
                    end += 1;
                }
                _ => return None,
            }
        }
    }

    fn consume(&mut self, count: usize) {
        for _ in 0..count {
            self.bump();
        }
    }

    fn run(&mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let pos = self.pos();
            let c = match self.peek() {
                Some(c) => c,
                None => return Ok(tokens),
            };
            let kind = match c {
                '"' => self.string(pos)?,
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                ':' => self.single(TokenKind::Colon),
                ';' => self.single(TokenKind::Semi),
                ',' => self.single(TokenKind::Comma),
                '+' => self.single(TokenKind::Plus),
                '-' => self.single(TokenKind::Minus),
                '*' => self.single(TokenKind::Star),
                '=' => {
                    self.bump();
                    if self.peek() == Some('>') {
                        self.bump();
                        TokenKind::Arrow
                    } else {
                        TokenKind::Eq
                    }
                }
                '>' => {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }
                '<' => {
                    if let Some((name, len)) = self.nonterminal_at(0) {
                        self.consume(len);
                        if self.xpath_follows() {
                            self.xpath(XPathBase::Type(name), pos)?
                        } else {
                            TokenKind::Nonterminal(name)
                        }
                    } else {
                        self.bump();
                        if self.peek() == Some('=') {
                            self.bump();
                            TokenKind::Le
                        } else {
                            TokenKind::Lt
                        }
                    }
                }
                c if c.is_ascii_digit() => self.integer(pos)?,
                c if is_ident_start(c) => self.ident_or_xpath(pos)?,
                c => return Err(ParseError::Lex { pos, ch: c }),
            };
            tokens.push(Token { kind, pos });
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn integer(&mut self, pos: Pos) -> Result<TokenKind, ParseError> {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.bump();
            } else {
                break;
            }
        }
        digits
            .parse::<i64>()
            .map(TokenKind::Int)
            .map_err(|_| ParseError::Unexpected {
                pos,
                expected: "an integer literal within i64".to_owned(),
                found: digits,
            })
    }

    fn string(&mut self, start: Pos) -> Result<TokenKind, ParseError> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            let pos = self.pos();
            match self.bump() {
                None => return Err(ParseError::UnterminatedString { pos: start }),
                Some('"') => return Ok(TokenKind::Str(text)),
                Some('\\') => match self.bump() {
                    Some('b') => text.push('\u{8}'),
                    Some('t') => text.push('\t'),
                    Some('n') => text.push('\n'),
                    Some('r') => text.push('\r'),
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    Some(c) => return Err(ParseError::Lex { pos, ch: c }),
                    None => return Err(ParseError::UnterminatedString { pos: start }),
                },
                Some(c) => text.push(c),
            }
        }
    }

    /// True if the upcoming characters continue into an XPath segment.
    fn xpath_follows(&self) -> bool {
        (self.peek() == Some('.') && self.nonterminal_at(1).is_some())
            || (self.peek() == Some('.')
                && self.peek_at(1) == Some('.')
                && self.nonterminal_at(2).is_some())
    }

    fn ident_or_xpath(&mut self, pos: Pos) -> Result<TokenKind, ParseError> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        // A dot may extend the identifier into an operator name
        // (`str.len`, `str.++`, `str.to.int`, `str.<=`) or start an XPath.
        loop {
            if self.peek() != Some('.') {
                break;
            }
            if self.xpath_follows() {
                return self.xpath(XPathBase::Var(name), pos);
            }
            match self.peek_at(1) {
                Some('<') if self.peek_at(2) == Some('=') => {
                    self.consume(3);
                    name.push_str(".<=");
                }
                Some(c) if is_op_continue(c) => {
                    self.bump(); // the dot
                    name.push('.');
                    while let Some(c) = self.peek() {
                        if is_op_continue(c) {
                            name.push(c);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(keyword(&name).unwrap_or(TokenKind::Ident(name)))
    }

    fn xpath(&mut self, base: XPathBase, pos: Pos) -> Result<TokenKind, ParseError> {
        let mut segments = Vec::new();
        loop {
            let (descend, skip) = if self.peek() == Some('.') && self.peek_at(1) == Some('.') {
                (true, 2)
            } else if self.peek() == Some('.') {
                (false, 1)
            } else {
                break;
            };
            let (typ, len) = match self.nonterminal_at(skip) {
                Some(found) => found,
                None => break,
            };
            self.consume(skip + len);
            let index = if self.peek() == Some('[') {
                self.bump();
                let ipos = self.pos();
                let k = match self.integer(ipos)? {
                    TokenKind::Int(k) => k,
                    _ => unreachable!(),
                };
                if self.peek() != Some(']') {
                    return Err(ParseError::Unexpected {
                        pos: self.pos(),
                        expected: "']'".to_owned(),
                        found: self
                            .peek()
                            .map(|c| format!("'{}'", c))
                            .unwrap_or_else(|| "end of input".to_owned()),
                    });
                }
                self.bump();
                Some(usize::try_from(k).map_err(|_| ParseError::Unexpected {
                    pos: ipos,
                    expected: "a child index".to_owned(),
                    found: k.to_string(),
                })?)
            } else {
                None
            };
            segments.push(XPathSegment {
                typ,
                index,
                descend,
            });
        }
        if segments.is_empty() {
            return Err(ParseError::Lex { pos, ch: '.' });
        }
        Ok(TokenKind::XPath(XPathExpr { base, segments }))
    }
}

fn keyword(name: &str) -> Option<TokenKind> {
    match name {
        "const" => Some(TokenKind::Const),
        "forall" => Some(TokenKind::Forall),
        "exists" => Some(TokenKind::Exists),
        "in" => Some(TokenKind::In),
        "int" => Some(TokenKind::IntKw),
        "not" => Some(TokenKind::Not),
        "and" => Some(TokenKind::And),
        "or" => Some(TokenKind::Or),
        "xor" => Some(TokenKind::Xor),
        "implies" => Some(TokenKind::Implies),
        "iff" => Some(TokenKind::Iff),
        "true" => Some(TokenKind::True),
        "false" => Some(TokenKind::False),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_and_idents() {
        assert_eq!(
            kinds("forall <assgn> a1 in start:"),
            vec![
                TokenKind::Forall,
                TokenKind::Nonterminal("assgn".into()),
                TokenKind::Ident("a1".into()),
                TokenKind::In,
                TokenKind::Ident("start".into()),
                TokenKind::Colon,
            ]
        );
    }

    #[test]
    fn comments_and_whitespace_elided() {
        assert_eq!(
            kinds("a # the rest is noise\n b"),
            vec![TokenKind::Ident("a".into()), TokenKind::Ident("b".into())]
        );
    }

    #[test]
    fn dotted_operator_names() {
        assert_eq!(
            kinds("str.to.int str.++ re.* str.len str.<="),
            vec![
                TokenKind::Ident("str.to.int".into()),
                TokenKind::Ident("str.++".into()),
                TokenKind::Ident("re.*".into()),
                TokenKind::Ident("str.len".into()),
                TokenKind::Ident("str.<=".into()),
            ]
        );
    }

    #[test]
    fn comparison_operators() {
        assert_eq!(
            kinds("< <= > >= = =>"),
            vec![
                TokenKind::Lt,
                TokenKind::Le,
                TokenKind::Gt,
                TokenKind::Ge,
                TokenKind::Eq,
                TokenKind::Arrow,
            ]
        );
    }

    #[test]
    fn nonterminal_versus_less_than() {
        assert_eq!(
            kinds("x < 1 and <var>"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Lt,
                TokenKind::Int(1),
                TokenKind::And,
                TokenKind::Nonterminal("var".into()),
            ]
        );
    }

    #[test]
    fn xpath_with_variable_base() {
        let tokens = kinds("a1.<rhs>.<var> = a2.<var>");
        match &tokens[0] {
            TokenKind::XPath(xpath) => {
                assert_eq!(xpath.base, XPathBase::Var("a1".into()));
                assert_eq!(xpath.segments.len(), 2);
                assert_eq!(xpath.segments[0].typ, "rhs");
                assert!(!xpath.segments[0].descend);
            }
            other => panic!("expected XPath, got {:?}", other),
        }
        assert_eq!(tokens[1], TokenKind::Eq);
    }

    #[test]
    fn xpath_with_type_base_descendant_and_index() {
        let tokens = kinds("<a>..<b>[1]");
        match &tokens[0] {
            TokenKind::XPath(xpath) => {
                assert_eq!(xpath.base, XPathBase::Type("a".into()));
                assert!(xpath.segments[0].descend);
                assert_eq!(xpath.segments[0].index, Some(1));
            }
            other => panic!("expected XPath, got {:?}", other),
        }
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            kinds(r#""a\"b\\c\n""#),
            vec![TokenKind::Str("a\"b\\c\n".into())]
        );
    }

    #[test]
    fn invalid_escape_is_an_error() {
        assert!(matches!(
            tokenize(r#""\q""#),
            Err(ParseError::Lex { ch: 'q', .. })
        ));
    }

    #[test]
    fn unterminated_string() {
        assert!(matches!(
            tokenize("\"abc"),
            Err(ParseError::UnterminatedString { .. })
        ));
    }

    #[test]
    fn stray_character_is_reported_with_position() {
        match tokenize("a ?") {
            Err(ParseError::Lex { pos, ch }) => {
                assert_eq!(ch, '?');
                assert_eq!((pos.line, pos.col), (1, 3));
            }
            other => panic!("expected lex error, got {:?}", other),
        }
    }
}
