//! Recursive-descent parser for ISLa formulas.
//!
//! Precedence, loosest to tightest: `iff`, `implies`, `xor`, `or`, `and`,
//! then `not` and quantifier prefixes (right-associative into their
//! bodies), then atoms. Embedded SMT expressions are accepted in both
//! S-expression and prefix/infix notation and normalised to one internal
//! S-expression form.

use crate::formula::{
    Constraint, Formula, PredArg, Quantifier, SemPredRef, SmtAtom, Variable, XPathBase, XPathExpr,
};
use crate::predicates::{lookup_structural, SemanticRegistry};
use crate::smt::{arity_ok, is_operator, lookup_op, SExpr, Signature};

use super::lexer::{Pos, Token, TokenKind};
use super::{matchexpr, ParseError};

pub(super) struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
    registry: &'a SemanticRegistry,
    /// Tree binders in scope, innermost last: `(name, nonterminal type)`.
    scope: Vec<(String, String)>,
}

impl<'a> Parser<'a> {
    pub(super) fn new(tokens: &'a [Token], registry: &'a SemanticRegistry) -> Self {
        Parser {
            tokens,
            idx: 0,
            registry,
            scope: Vec::new(),
        }
    }

    pub(super) fn parse(mut self) -> Result<Constraint, ParseError> {
        let constant = if self.peek() == Some(&TokenKind::Const) {
            self.bump();
            let name = self.expect_ident("a constant name")?;
            self.expect(&TokenKind::Colon)?;
            let typ = self.expect_nonterminal("the constant's nonterminal type")?;
            self.expect(&TokenKind::Semi)?;
            Variable::tree(name, typ)
        } else {
            Constraint::default_constant()
        };
        let typ = constant
            .tree_type()
            .expect("constants are tree-sorted")
            .to_owned();
        self.scope.push((constant.name.clone(), typ));
        let formula = self.formula()?;
        if self.idx != self.tokens.len() {
            return Err(self.unexpected("end of input"));
        }
        Ok(Constraint { constant, formula })
    }

    // Token plumbing. Lookahead borrows the token slice, not the parser,
    // so peeked tokens stay usable across `bump`.

    fn peek(&self) -> Option<&'a TokenKind> {
        self.tokens.get(self.idx).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&'a TokenKind> {
        self.tokens.get(self.idx + offset).map(|t| &t.kind)
    }

    fn pos(&self) -> Pos {
        self.tokens
            .get(self.idx)
            .or_else(|| self.tokens.last())
            .map(|t| t.pos)
            .unwrap_or(Pos { line: 1, col: 1 })
    }

    fn bump(&mut self) -> Option<&'a TokenKind> {
        let token = self.tokens.get(self.idx);
        if token.is_some() {
            self.idx += 1;
        }
        token.map(|t| &t.kind)
    }

    fn found(&self) -> String {
        self.peek()
            .map(TokenKind::describe)
            .unwrap_or_else(|| "end of input".to_owned())
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError::Unexpected {
            pos: self.pos(),
            expected: expected.to_owned(),
            found: self.found(),
        }
    }

    fn expect(&mut self, want: &TokenKind) -> Result<(), ParseError> {
        if self.peek() == Some(want) {
            self.bump();
            Ok(())
        } else {
            Err(self.unexpected(&want.describe()))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.bump();
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn expect_nonterminal(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(TokenKind::Nonterminal(name)) => {
                let name = name.clone();
                self.bump();
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    // Scope

    /// The innermost binder of the given nonterminal type, if any.
    fn binder_of_type(&self, typ: &str) -> Option<String> {
        self.scope
            .iter()
            .rev()
            .find(|(_, t)| t == typ)
            .map(|(name, _)| name.clone())
    }

    /// A bare nonterminal in term or argument position refers to the
    /// innermost binder of that type; unresolved references keep their
    /// angled spelling and fail later resolution.
    fn resolve_type_ref(&self, typ: &str) -> String {
        self.binder_of_type(typ)
            .unwrap_or_else(|| format!("<{}>", typ))
    }

    fn resolve_xpath_base(&self, xpath: XPathExpr) -> XPathExpr {
        match &xpath.base {
            XPathBase::Type(typ) => match self.binder_of_type(typ) {
                Some(name) => XPathExpr {
                    base: XPathBase::Var(name),
                    segments: xpath.segments,
                },
                None => xpath,
            },
            XPathBase::Var(_) => xpath,
        }
    }

    // Formula grammar

    fn formula(&mut self) -> Result<Formula, ParseError> {
        let mut lhs = self.implication()?;
        while self.peek() == Some(&TokenKind::Iff) {
            self.bump();
            let rhs = self.implication()?;
            lhs = Formula::Iff(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn implication(&mut self) -> Result<Formula, ParseError> {
        let mut lhs = self.exclusive_or()?;
        while self.peek() == Some(&TokenKind::Implies) {
            self.bump();
            let rhs = self.exclusive_or()?;
            lhs = Formula::Implies(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn exclusive_or(&mut self) -> Result<Formula, ParseError> {
        let mut lhs = self.disjunction()?;
        while self.peek() == Some(&TokenKind::Xor) {
            self.bump();
            let rhs = self.disjunction()?;
            lhs = Formula::Xor(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn disjunction(&mut self) -> Result<Formula, ParseError> {
        let mut lhs = self.conjunction()?;
        while self.peek() == Some(&TokenKind::Or) {
            self.bump();
            let rhs = self.conjunction()?;
            lhs = Formula::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn conjunction(&mut self) -> Result<Formula, ParseError> {
        let mut lhs = self.unary()?;
        while self.peek() == Some(&TokenKind::And) {
            self.bump();
            let rhs = self.unary()?;
            lhs = Formula::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Formula, ParseError> {
        match self.peek() {
            Some(TokenKind::Not) => {
                self.bump();
                Ok(Formula::not(self.unary()?))
            }
            Some(TokenKind::Forall) => {
                self.bump();
                self.quantifier(true)
            }
            Some(TokenKind::Exists) => {
                self.bump();
                self.quantifier(false)
            }
            _ => self.atom(),
        }
    }

    fn quantifier(&mut self, universal: bool) -> Result<Formula, ParseError> {
        if self.peek() == Some(&TokenKind::IntKw) {
            self.bump();
            let var = self.expect_ident("an integer variable name")?;
            self.expect(&TokenKind::Colon)?;
            let body = Box::new(self.unary()?);
            return Ok(if universal {
                Formula::ForallInt { var, body }
            } else {
                Formula::ExistsInt { var, body }
            });
        }

        let typ = self.expect_nonterminal("a nonterminal type or 'int'")?;
        let (name, anonymous) = match self.peek() {
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.bump();
                (name, false)
            }
            _ => (format!("<{}>", typ), true),
        };
        let match_expr = if self.peek() == Some(&TokenKind::Eq) {
            self.bump();
            let pos = self.pos();
            match self.peek() {
                Some(TokenKind::Str(text)) => {
                    let text = text.clone();
                    self.bump();
                    Some(matchexpr::parse_match_expr(&text, pos)?)
                }
                _ => return Err(self.unexpected("a match expression string")),
            }
        } else {
            None
        };
        // The `in` target refers to the enclosing scope, not the binder.
        let in_var = if self.peek() == Some(&TokenKind::In) {
            self.bump();
            match self.peek() {
                Some(TokenKind::Ident(name)) => {
                    let name = name.clone();
                    self.bump();
                    Some(name)
                }
                Some(TokenKind::Nonterminal(t)) => {
                    let t = t.clone();
                    self.bump();
                    Some(self.resolve_type_ref(&t))
                }
                _ => return Err(self.unexpected("a variable or nonterminal after 'in'")),
            }
        } else {
            None
        };
        self.expect(&TokenKind::Colon)?;

        self.scope.push((name.clone(), typ.clone()));
        let mut pushed = 1;
        if let Some(mexpr) = &match_expr {
            for (btyp, bname) in mexpr.bindings() {
                self.scope.push((bname.to_owned(), btyp.to_owned()));
                pushed += 1;
            }
        }
        let body = self.unary();
        self.scope.truncate(self.scope.len() - pushed);
        let body = body?;

        let quantifier = Box::new(Quantifier {
            var: Variable::tree(name, typ),
            anonymous,
            match_expr,
            in_var,
            body,
        });
        Ok(if universal {
            Formula::Forall(quantifier)
        } else {
            Formula::Exists(quantifier)
        })
    }

    fn atom(&mut self) -> Result<Formula, ParseError> {
        match self.peek() {
            Some(TokenKind::True) => {
                self.bump();
                Ok(Formula::Smt(SmtAtom::new(SExpr::Bool(true))))
            }
            Some(TokenKind::False) => {
                self.bump();
                Ok(Formula::Smt(SmtAtom::new(SExpr::Bool(false))))
            }
            Some(TokenKind::LParen) => self.paren_atom(),
            Some(TokenKind::Ident(name)) if self.peek_at(1) == Some(&TokenKind::LParen) => {
                let name = name.clone();
                self.call_atom(name)
            }
            Some(
                TokenKind::Ident(_)
                | TokenKind::XPath(_)
                | TokenKind::Nonterminal(_)
                | TokenKind::Int(_)
                | TokenKind::Str(_)
                | TokenKind::Minus,
            ) => self.smt_atom(),
            _ => Err(self.unexpected("a formula")),
        }
    }

    /// `(` opens either an SMT expression or a parenthesised formula; try
    /// the expression reading first and fall back on failure.
    fn paren_atom(&mut self) -> Result<Formula, ParseError> {
        let save = self.idx;
        match self.smt_atom() {
            Ok(atom) => Ok(atom),
            Err(_) => {
                self.idx = save;
                self.expect(&TokenKind::LParen)?;
                let inner = self.formula()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
        }
    }

    /// `name(...)`: a structural predicate, a semantic predicate, or a
    /// prefix operator call, in that resolution order.
    fn call_atom(&mut self, name: String) -> Result<Formula, ParseError> {
        let pos = self.pos();
        if let Some(pred) = lookup_structural(&name) {
            self.bump();
            let args = self.predicate_args()?;
            if args.len() != pred.arity {
                return Err(ParseError::ArityMismatch {
                    pos,
                    name,
                    expected: pred.arity,
                    found: args.len(),
                });
            }
            return Ok(Formula::StructPred { pred, args });
        }
        if let Some(pred) = self.registry.get(&name) {
            self.bump();
            let args = self.predicate_args()?;
            if args.len() != pred.arity() {
                return Err(ParseError::ArityMismatch {
                    pos,
                    name,
                    expected: pred.arity(),
                    found: args.len(),
                });
            }
            return Ok(Formula::SemPred {
                pred: SemPredRef(pred),
                args,
            });
        }
        if is_operator(&name) {
            return self.smt_atom();
        }
        Err(ParseError::UnknownPredicate { pos, name })
    }

    fn predicate_args(&mut self) -> Result<Vec<PredArg>, ParseError> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if self.peek() == Some(&TokenKind::RParen) {
            self.bump();
            return Ok(args);
        }
        loop {
            args.push(self.predicate_arg()?);
            match self.peek() {
                Some(TokenKind::Comma) => {
                    self.bump();
                }
                Some(TokenKind::RParen) => {
                    self.bump();
                    return Ok(args);
                }
                _ => return Err(self.unexpected("',' or ')'")),
            }
        }
    }

    fn predicate_arg(&mut self) -> Result<PredArg, ParseError> {
        match self.peek() {
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.bump();
                Ok(PredArg::Var(name))
            }
            Some(TokenKind::Nonterminal(typ)) => {
                let typ = typ.clone();
                self.bump();
                // A binder of that type takes precedence over the literal.
                Ok(match self.binder_of_type(&typ) {
                    Some(name) => PredArg::Var(name),
                    None => PredArg::Type(typ),
                })
            }
            Some(TokenKind::XPath(xpath)) => {
                let xpath = xpath.clone();
                self.bump();
                Ok(PredArg::XPath(self.resolve_xpath_base(xpath)))
            }
            Some(TokenKind::Int(n)) => {
                let n = *n;
                self.bump();
                Ok(PredArg::Int(n))
            }
            Some(TokenKind::Minus) => {
                self.bump();
                match self.peek() {
                    Some(TokenKind::Int(n)) => {
                        let n = *n;
                        self.bump();
                        Ok(PredArg::Int(-n))
                    }
                    _ => Err(self.unexpected("an integer")),
                }
            }
            Some(TokenKind::Str(s)) => {
                let s = s.clone();
                self.bump();
                Ok(PredArg::Str(s))
            }
            _ => Err(self.unexpected("a predicate argument")),
        }
    }

    // Embedded SMT expressions

    fn smt_atom(&mut self) -> Result<Formula, ParseError> {
        let expr = self.smt_infix(1)?;
        Ok(Formula::Smt(SmtAtom::new(expr)))
    }

    fn infix_op(&self) -> Option<(String, u8)> {
        let name = self.peek()?.op_name()?;
        let level = lookup_op(name)?.infix_level?;
        Some((name.to_owned(), level))
    }

    fn smt_infix(&mut self, min_level: u8) -> Result<SExpr, ParseError> {
        let mut lhs = self.smt_primary()?;
        while let Some((op, level)) = self.infix_op() {
            if level < min_level {
                break;
            }
            self.bump();
            let rhs = self.smt_infix(level + 1)?;
            lhs = SExpr::App(vec![SExpr::Symbol(op), lhs, rhs]);
        }
        Ok(lhs)
    }

    fn smt_primary(&mut self) -> Result<SExpr, ParseError> {
        match self.peek() {
            Some(TokenKind::Int(n)) => {
                let n = *n;
                self.bump();
                Ok(SExpr::Int(n))
            }
            Some(TokenKind::Str(s)) => {
                let s = s.clone();
                self.bump();
                Ok(SExpr::Str(s))
            }
            Some(TokenKind::True) => {
                self.bump();
                Ok(SExpr::Bool(true))
            }
            Some(TokenKind::False) => {
                self.bump();
                Ok(SExpr::Bool(false))
            }
            Some(TokenKind::Minus) => {
                self.bump();
                match self.smt_primary()? {
                    SExpr::Int(n) => Ok(SExpr::Int(-n)),
                    e => Ok(SExpr::app("-", vec![e])),
                }
            }
            Some(TokenKind::Nonterminal(typ)) => {
                let typ = typ.clone();
                self.bump();
                Ok(SExpr::Symbol(self.resolve_type_ref(&typ)))
            }
            Some(TokenKind::XPath(xpath)) => {
                let xpath = xpath.clone();
                self.bump();
                Ok(SExpr::XPath(self.resolve_xpath_base(xpath)))
            }
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                if is_operator(&name) {
                    let op = lookup_op(&name).expect("operator looked up above");
                    if self.peek_at(1) == Some(&TokenKind::LParen) {
                        return self.prefix_call(name);
                    }
                    if matches!(op.sig, Signature::Fixed(&[], _)) {
                        self.bump();
                        return Ok(SExpr::Symbol(name));
                    }
                    return Err(self.unexpected("arguments for the operator"));
                }
                self.bump();
                Ok(SExpr::Symbol(name))
            }
            Some(TokenKind::LParen) => {
                if self
                    .peek_at(1)
                    .and_then(TokenKind::op_name)
                    .is_some()
                {
                    self.sexpr_list()
                } else {
                    self.bump();
                    let inner = self.smt_infix(1)?;
                    self.expect(&TokenKind::RParen)?;
                    Ok(inner)
                }
            }
            _ => Err(self.unexpected("an SMT term")),
        }
    }

    /// `op(arg, ...)` with comma-separated infix arguments.
    fn prefix_call(&mut self, name: String) -> Result<SExpr, ParseError> {
        let pos = self.pos();
        self.bump(); // operator name
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        if self.peek() == Some(&TokenKind::RParen) {
            self.bump();
        } else {
            loop {
                args.push(self.smt_infix(1)?);
                match self.peek() {
                    Some(TokenKind::Comma) => {
                        self.bump();
                    }
                    Some(TokenKind::RParen) => {
                        self.bump();
                        break;
                    }
                    _ => return Err(self.unexpected("',' or ')'")),
                }
            }
        }
        let op = lookup_op(&name).expect("caller checked the operator");
        if !arity_ok(op, args.len()) {
            return Err(self.arity_error(pos, &name, args.len()));
        }
        let mut items = vec![SExpr::Symbol(name)];
        items.extend(args);
        Ok(SExpr::App(items))
    }

    /// `( op term* )` with whitespace-separated S-expression terms.
    fn sexpr_list(&mut self) -> Result<SExpr, ParseError> {
        self.expect(&TokenKind::LParen)?;
        let pos = self.pos();
        let op_name = match self.peek().and_then(TokenKind::op_name) {
            Some(name) => name.to_owned(),
            None => return Err(self.unexpected("an SMT operator")),
        };
        self.bump();
        let mut items = vec![SExpr::Symbol(op_name.clone())];
        while self.peek() != Some(&TokenKind::RParen) {
            if self.peek().is_none() {
                return Err(self.unexpected("')'"));
            }
            items.push(self.sexpr_term()?);
        }
        self.bump(); // ')'
        let op = lookup_op(&op_name).expect("heads are operators");
        if !arity_ok(op, items.len() - 1) {
            return Err(self.arity_error(pos, &op_name, items.len() - 1));
        }
        Ok(SExpr::App(items))
    }

    fn sexpr_term(&mut self) -> Result<SExpr, ParseError> {
        match self.peek() {
            Some(TokenKind::LParen) => self.sexpr_list(),
            Some(TokenKind::Int(n)) => {
                let n = *n;
                self.bump();
                Ok(SExpr::Int(n))
            }
            Some(TokenKind::Str(s)) => {
                let s = s.clone();
                self.bump();
                Ok(SExpr::Str(s))
            }
            Some(TokenKind::True) => {
                self.bump();
                Ok(SExpr::Bool(true))
            }
            Some(TokenKind::False) => {
                self.bump();
                Ok(SExpr::Bool(false))
            }
            Some(TokenKind::Minus) => {
                self.bump();
                match self.peek() {
                    Some(TokenKind::Int(n)) => {
                        let n = *n;
                        self.bump();
                        Ok(SExpr::Int(-n))
                    }
                    _ => Err(self.unexpected("an integer")),
                }
            }
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.bump();
                Ok(SExpr::Symbol(name))
            }
            Some(TokenKind::Nonterminal(typ)) => {
                let typ = typ.clone();
                self.bump();
                Ok(SExpr::Symbol(self.resolve_type_ref(&typ)))
            }
            Some(TokenKind::XPath(xpath)) => {
                let xpath = xpath.clone();
                self.bump();
                Ok(SExpr::XPath(self.resolve_xpath_base(xpath)))
            }
            _ => Err(self.unexpected("an S-expression term")),
        }
    }

    fn arity_error(&self, pos: Pos, name: &str, found: usize) -> ParseError {
        let expected = match lookup_op(name).map(|op| op.sig) {
            Some(Signature::Fixed(sorts, _)) => sorts.len(),
            _ => 2,
        };
        ParseError::ArityMismatch {
            pos,
            name: name.to_owned(),
            expected,
            found,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::formula::MatchElement;
    use crate::parse::tokenize;

    use super::*;

    fn parse(text: &str) -> Result<Constraint, ParseError> {
        let tokens = tokenize(text).unwrap();
        let registry = SemanticRegistry::new();
        Parser::new(&tokens, &registry).parse()
    }

    fn parse_ok(text: &str) -> Formula {
        parse(text).unwrap().formula
    }

    #[test]
    fn implicit_constant_is_start() {
        let c = parse("true").unwrap();
        assert_eq!(c.constant, Constraint::default_constant());
    }

    #[test]
    fn const_declaration() {
        let c = parse("const root: <stmt>; true").unwrap();
        assert_eq!(c.constant, Variable::tree("root", "stmt"));
    }

    #[test]
    fn precedence_chain() {
        // and binds tighter than or, or tighter than xor, etc.
        let f = parse_ok("true and false or true");
        assert!(matches!(f, Formula::Or(_, _)));
        let f = parse_ok("true or true implies false");
        assert!(matches!(f, Formula::Implies(_, _)));
        let f = parse_ok("true implies false iff true");
        assert!(matches!(f, Formula::Iff(_, _)));
        let f = parse_ok("(true or true) and false");
        assert!(matches!(f, Formula::And(_, _)));
    }

    #[test]
    fn quantifier_body_is_unary() {
        // Without parentheses the conjunction ends the quantifier body.
        let f = parse_ok("forall <assgn> a: true and false");
        assert!(matches!(f, Formula::And(_, _)));
        let f = parse_ok("forall <assgn> a: (true and false)");
        match f {
            Formula::Forall(q) => assert!(matches!(q.body, Formula::And(_, _))),
            other => panic!("expected forall, got {:?}", other),
        }
    }

    #[test]
    fn chained_quantifiers() {
        let f = parse_ok("forall <assgn> a1: exists <assgn> a2: before(a2, a1)");
        match f {
            Formula::Forall(q) => assert!(matches!(q.body, Formula::Exists(_))),
            other => panic!("expected forall, got {:?}", other),
        }
    }

    #[test]
    fn quantifier_with_match_expression_and_range() {
        let f = parse_ok("forall <assgn> a = \"{<var> lhs} := {<var> rhs}\" in start: lhs = rhs");
        match f {
            Formula::Forall(q) => {
                assert_eq!(q.var, Variable::tree("a", "assgn"));
                assert_eq!(q.in_var.as_deref(), Some("start"));
                let mexpr = q.match_expr.as_ref().unwrap();
                assert_eq!(mexpr.bindings(), vec![("var", "lhs"), ("var", "rhs")]);
                assert_eq!(mexpr.elements[1], MatchElement::Text(" := ".into()));
            }
            other => panic!("expected forall, got {:?}", other),
        }
    }

    #[test]
    fn anonymous_binder_takes_type_name() {
        let f = parse_ok("forall <digit> in start: (>= (str.to.int <digit>) 0)");
        match f {
            Formula::Forall(q) => {
                assert!(q.anonymous);
                assert_eq!(q.var.name, "<digit>");
                // The bare <digit> reference resolved to the binder.
                match &q.body {
                    Formula::Smt(atom) => {
                        assert!(atom.variables().contains("<digit>"));
                    }
                    other => panic!("expected atom, got {:?}", other),
                }
            }
            other => panic!("expected forall, got {:?}", other),
        }
    }

    #[test]
    fn integer_quantifiers() {
        let f = parse_ok("exists int n: forall <digit> d: (= (str.to.int d) n)");
        match f {
            Formula::ExistsInt { var, body } => {
                assert_eq!(var, "n");
                assert!(matches!(*body, Formula::Forall(_)));
            }
            other => panic!("expected exists int, got {:?}", other),
        }
    }

    #[test]
    fn sexpr_and_infix_normalise_identically() {
        let a = parse_ok("forall <digit> d: (>= (str.to.int d) 0)");
        let b = parse_ok("forall <digit> d: str.to.int(d) >= 0");
        assert_eq!(a, b);
    }

    #[test]
    fn infix_precedence_in_atoms() {
        let f = parse_ok("forall <digit> d: str.to.int(d) + 2 * 3 = 7");
        match f {
            Formula::Forall(q) => match &q.body {
                Formula::Smt(atom) => {
                    assert_eq!(
                        atom.expr.to_string(),
                        "(= (+ (str.to.int d) (* 2 3)) 7)"
                    );
                }
                other => panic!("expected atom, got {:?}", other),
            },
            other => panic!("expected forall, got {:?}", other),
        }
    }

    #[test]
    fn parenthesised_formula_versus_sexpr() {
        // A parenthesised predicate conjunction is a formula.
        let f = parse_ok("forall <assgn> a: (before(a, a) and inside(a, a))");
        match f {
            Formula::Forall(q) => assert!(matches!(q.body, Formula::And(_, _))),
            other => panic!("expected forall, got {:?}", other),
        }
        // A parenthesised operator application is an SMT atom.
        let f = parse_ok("forall <assgn> a: (not (= a \"x\"))");
        match f {
            Formula::Forall(q) => assert!(matches!(q.body, Formula::Smt(_))),
            other => panic!("expected forall, got {:?}", other),
        }
        // `not` over a predicate stays a formula combinator.
        let f = parse_ok("forall <assgn> a: (not before(a, a))");
        match f {
            Formula::Forall(q) => assert!(matches!(q.body, Formula::Not(_))),
            other => panic!("expected forall, got {:?}", other),
        }
    }

    #[test]
    fn xpath_atoms() {
        let f = parse_ok("forall <assgn> a1: a1.<rhs>.<var> = \"x\"");
        match f {
            Formula::Forall(q) => match &q.body {
                Formula::Smt(atom) => {
                    assert_eq!(atom.expr.to_string(), "(= a1.<rhs>.<var> \"x\")");
                }
                other => panic!("expected atom, got {:?}", other),
            },
            other => panic!("expected forall, got {:?}", other),
        }
    }

    #[test]
    fn unknown_predicate_rejected() {
        assert!(matches!(
            parse("forall <assgn> a: frobnicate(a, a)"),
            Err(ParseError::UnknownPredicate { name, .. }) if name == "frobnicate"
        ));
    }

    #[test]
    fn predicate_arity_checked() {
        assert!(matches!(
            parse("forall <assgn> a: before(a)"),
            Err(ParseError::ArityMismatch { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn operator_arity_checked() {
        assert!(matches!(
            parse("forall <digit> d: (str.len d d)"),
            Err(ParseError::ArityMismatch { name, .. }) if name == "str.len"
        ));
        assert!(matches!(
            parse("forall <digit> d: str.substr(d, 1)"),
            Err(ParseError::ArityMismatch { expected: 3, found: 2, .. })
        ));
    }

    #[test]
    fn trailing_tokens_rejected() {
        assert!(parse("true true").is_err());
    }
}
