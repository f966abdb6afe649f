//! C5: recursive-descent statement parser plus a precedence-climbing
//! expression parser (§4.5).
//!
//! The spec describes expression parsing as a shunting-yard algorithm with
//! an explicit value stack and operator stack, carrying a sentinel `null`
//! and a `FUNC` marker to delimit call arguments, and a "had comma" flag on
//! grouping markers to decide tuple-vs-group at the matching close. This
//! parser produces the identical AST by recursive descent instead: each
//! precedence tier is its own function (the standard Rust rendering of
//! shunting-yard's precedence table), and the marker/sentinel bookkeeping is
//! replaced by parsing call arguments, subscript keys, and group contents at
//! their own call sites — which is where the original algorithm's FUNC
//! marker and comma flag would have lived. The semantics are preserved
//! exactly (§9 "Parser shunting-yard correctness"): a trailing comma inside
//! `(...)` makes a tuple, `(,)` is the empty tuple, and call arguments never
//! become a tuple themselves.

use crate::ast::{BinOp, Const, Expr, Func, Stmt, UnOp};
use crate::diagnostic::{Diagnostic, Span};
use crate::error::{Error, Result, Signal};
use crate::token::{Keyword, Token, TokenKind};

pub struct Parser<'a> {
    toks: Vec<Token>,
    pos: usize,
    src: &'a str,
    source_name: String,
}

impl<'a> Parser<'a> {
    pub fn new(toks: Vec<Token>, src: &'a str, source_name: impl Into<String>) -> Self {
        Self {
            toks,
            pos: 0,
            src,
            source_name: source_name.into(),
        }
    }

    fn cur(&self) -> &Token {
        &self.toks[self.pos]
    }

    fn kind(&self) -> &TokenKind {
        &self.toks[self.pos].kind
    }

    fn span(&self) -> Span {
        self.toks[self.pos].span
    }

    fn bump(&mut self) -> Token {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn skip_trivia(&mut self) {
        while matches!(self.kind(), TokenKind::Newline | TokenKind::Comment) {
            self.bump();
        }
    }

    fn skip_stmt_seps(&mut self) {
        loop {
            match self.kind() {
                TokenKind::Newline | TokenKind::Comment => {
                    self.bump();
                }
                TokenKind::Punct(';') => {
                    self.bump();
                }
                _ => break,
            }
        }
    }

    fn at_punct(&self, c: char) -> bool {
        matches!(self.kind(), TokenKind::Punct(p) if *p == c)
    }

    fn at_op(&self, s: &str) -> bool {
        matches!(self.kind(), TokenKind::Op(o) if o == s)
    }

    fn at_kw(&self, kw: Keyword) -> bool {
        matches!(self.kind(), TokenKind::Keyword(k) if *k == kw)
    }

    fn at_eof(&self) -> bool {
        matches!(self.kind(), TokenKind::Eof)
    }

    fn error(&self, span: Span, msg: impl Into<String>) -> Signal {
        let msg = msg.into();
        let diag = Diagnostic::new(&msg)
            .with_source(self.src.to_string())
            .with_label(span, "here");
        Error::Syntax(diag.to_string()).into()
    }

    fn expect_punct(&mut self, c: char) -> Result<Span> {
        self.skip_trivia();
        if self.at_punct(c) {
            Ok(self.bump().span)
        } else {
            Err(self.error(self.span(), format!("expected '{c}'")))
        }
    }

    fn expect_kw(&mut self, kw: Keyword, name: &str) -> Result<Span> {
        self.skip_trivia();
        if self.at_kw(kw) {
            Ok(self.bump().span)
        } else {
            Err(self.error(self.span(), format!("expected '{name}'")))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span)> {
        self.skip_trivia();
        match self.kind().clone() {
            TokenKind::Ident(name) => {
                let span = self.bump().span;
                Ok((name, span))
            }
            _ => Err(self.error(self.span(), "expected an identifier")),
        }
    }

    // -- program / blocks ---------------------------------------------------

    pub fn parse_program(&mut self) -> Result<Vec<Stmt>> {
        let mut out = Vec::new();
        self.skip_stmt_seps();
        while !self.at_eof() {
            out.push(self.parse_stmt()?);
            self.skip_stmt_seps();
        }
        Ok(out)
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect_punct('{')?;
        self.skip_stmt_seps();
        let mut out = Vec::new();
        while !self.at_punct('}') {
            out.push(self.parse_stmt()?);
            self.skip_stmt_seps();
        }
        self.expect_punct('}')?;
        Ok(out)
    }

    // -- statements ----------------------------------------------------------

    fn parse_stmt(&mut self) -> Result<Stmt> {
        self.skip_trivia();
        if self.at_kw(Keyword::If) {
            return self.parse_if();
        }
        if self.at_kw(Keyword::While) {
            return self.parse_while();
        }
        if self.at_kw(Keyword::For) {
            return self.parse_for();
        }
        if self.at_kw(Keyword::Try) {
            return self.parse_try();
        }
        if self.at_kw(Keyword::Throw) {
            let span = self.bump().span;
            let e = self.parse_expr()?;
            return Ok(Stmt::Throw(e, span));
        }
        if self.at_kw(Keyword::Assert) {
            let span = self.bump().span;
            let e = self.parse_expr()?;
            return Ok(Stmt::Assert(e, span));
        }
        if self.at_kw(Keyword::Ret) {
            let span = self.bump().span;
            if self.at_stmt_end() {
                return Ok(Stmt::Ret(None, span));
            }
            let e = self.parse_expr()?;
            return Ok(Stmt::Ret(Some(e), span));
        }
        if self.at_kw(Keyword::Func) {
            return self.parse_funcdef();
        }
        if self.at_kw(Keyword::Import) {
            let span = self.bump().span;
            let (name, _) = self.expect_ident()?;
            return Ok(Stmt::Import(name, span));
        }
        let e = self.parse_expr()?;
        Ok(Stmt::Expr(e))
    }

    fn at_stmt_end(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Newline | TokenKind::Eof | TokenKind::Punct(';') | TokenKind::Punct('}')
        )
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        self.bump();
        let cond = self.parse_expr()?;
        let then = self.parse_block()?;
        let mut elifs = Vec::new();
        loop {
            self.skip_trivia();
            if self.at_kw(Keyword::Elif) {
                self.bump();
                let c = self.parse_expr()?;
                let b = self.parse_block()?;
                elifs.push((c, b));
            } else {
                break;
            }
        }
        self.skip_trivia();
        let else_ = if self.at_kw(Keyword::Else) {
            self.bump();
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Stmt::If { cond, then, elifs, else_ })
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        self.bump();
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        self.skip_trivia();
        let else_ = if self.at_kw(Keyword::Else) {
            self.bump();
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Stmt::While { cond, body, else_ })
    }

    fn parse_for(&mut self) -> Result<Stmt> {
        self.bump();
        let (name, _) = self.expect_ident()?;
        self.expect_kw(Keyword::In, "in")?;
        let iter = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Stmt::For { name, iter, body })
    }

    fn parse_try(&mut self) -> Result<Stmt> {
        self.bump();
        let body = self.parse_block()?;
        self.skip_trivia();
        self.expect_kw(Keyword::Catch, "catch")?;
        self.skip_trivia();
        let bind = if let TokenKind::Ident(name) = self.kind().clone() {
            self.bump();
            Some(name)
        } else {
            None
        };
        let handler = self.parse_block()?;
        Ok(Stmt::TryCatch { body, bind, handler })
    }

    fn parse_funcdef(&mut self) -> Result<Stmt> {
        let span = self.bump().span;
        let (name, _) = self.expect_ident()?;
        self.expect_punct('(')?;
        let (params, defaults) = self.parse_params()?;
        self.expect_punct(')')?;
        let body = self.parse_block()?;
        Ok(Stmt::FuncDef(Func { name, params, defaults, body }, span))
    }

    fn parse_params(&mut self) -> Result<(Vec<String>, Vec<Expr>)> {
        let mut params = Vec::new();
        let mut defaults = Vec::new();
        self.skip_trivia();
        while !self.at_punct(')') {
            let (name, _) = self.expect_ident()?;
            params.push(name);
            self.skip_trivia();
            if self.at_op("=") {
                self.bump();
                defaults.push(self.parse_or()?);
            } else if !defaults.is_empty() {
                return Err(self.error(self.span(), "parameter without default follows one with a default"));
            }
            self.skip_trivia();
            if self.at_punct(',') {
                self.bump();
                self.skip_trivia();
            } else {
                break;
            }
        }
        Ok((params, defaults))
    }

    // -- expressions -----------------------------------------------------------

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Result<Expr> {
        let lhs = self.parse_or()?;
        self.skip_trivia();
        if self.at_op("=") {
            let span = self.bump().span;
            let rhs = self.parse_assign()?;
            return Ok(Expr::Assign(Box::new(lhs), Box::new(rhs), span));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        loop {
            self.skip_trivia();
            if self.at_op("||") {
                let span = self.bump().span;
                let rhs = self.parse_and()?;
                lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs), span);
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_bitor()?;
        loop {
            self.skip_trivia();
            if self.at_op("&&") {
                let span = self.bump().span;
                let rhs = self.parse_bitor()?;
                lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs), span);
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_bitor(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_bitand()?;
        loop {
            self.skip_trivia();
            if self.at_op("|") {
                let span = self.bump().span;
                let rhs = self.parse_bitand()?;
                lhs = Expr::Binary(BinOp::BinOr, Box::new(lhs), Box::new(rhs), span);
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_cmp()?;
        loop {
            self.skip_trivia();
            if self.at_op("&") {
                let span = self.bump().span;
                let rhs = self.parse_cmp()?;
                lhs = Expr::Binary(BinOp::BinAnd, Box::new(lhs), Box::new(rhs), span);
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_add()?;
        loop {
            self.skip_trivia();
            let op = match self.kind() {
                TokenKind::Op(o) if o == "<=>" => BinOp::Cmp,
                TokenKind::Op(o) if o == "==" => BinOp::Eq,
                TokenKind::Op(o) if o == "!=" => BinOp::Ne,
                TokenKind::Op(o) if o == "<=" => BinOp::Le,
                TokenKind::Op(o) if o == ">=" => BinOp::Ge,
                TokenKind::Op(o) if o == "<" => BinOp::Lt,
                TokenKind::Op(o) if o == ">" => BinOp::Gt,
                _ => break,
            };
            let span = self.bump().span;
            let rhs = self.parse_add()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), span);
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_mul()?;
        loop {
            self.skip_trivia();
            let op = match self.kind() {
                TokenKind::Op(o) if o == "+" => BinOp::Add,
                TokenKind::Op(o) if o == "-" => BinOp::Sub,
                _ => break,
            };
            let span = self.bump().span;
            let rhs = self.parse_mul()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), span);
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_pow()?;
        loop {
            self.skip_trivia();
            let op = match self.kind() {
                TokenKind::Op(o) if o == "*" => BinOp::Mul,
                TokenKind::Op(o) if o == "/" => BinOp::Div,
                TokenKind::Op(o) if o == "%" => BinOp::Mod,
                _ => break,
            };
            let span = self.bump().span;
            let rhs = self.parse_pow()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs), span);
        }
        Ok(lhs)
    }

    fn parse_pow(&mut self) -> Result<Expr> {
        let lhs = self.parse_unary()?;
        self.skip_trivia();
        if self.at_op("**") {
            let span = self.bump().span;
            let rhs = self.parse_pow()?; // right-assoc
            return Ok(Expr::Binary(BinOp::Pow, Box::new(lhs), Box::new(rhs), span));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        self.skip_trivia();
        let op = match self.kind() {
            TokenKind::Op(o) if o == "-" => Some(UnOp::Neg),
            TokenKind::Op(o) if o == "~" => Some(UnOp::Sqig),
            TokenKind::Op(o) if o == "!" => Some(UnOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let span = self.bump().span;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(op, Box::new(operand), span));
        }
        let primary = self.parse_primary()?;
        self.parse_postfix(primary)
    }

    fn parse_postfix(&mut self, mut e: Expr) -> Result<Expr> {
        loop {
            if self.at_punct('.') {
                self.bump();
                let (name, span) = self.expect_ident()?;
                e = Expr::Attr(Box::new(e), name, span);
            } else if self.at_punct('(') {
                let (args, span) = self.parse_call_args()?;
                e = Expr::Call(Box::new(e), args, span);
            } else if self.at_punct('[') {
                let (keys, span) = self.parse_subscript_keys()?;
                e = Expr::Subscript(Box::new(e), keys, span);
            } else {
                break;
            }
        }
        Ok(e)
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Span)> {
        let start = self.expect_punct('(')?;
        let mut args = Vec::new();
        self.skip_trivia();
        if !self.at_punct(')') {
            loop {
                args.push(self.parse_expr()?);
                self.skip_trivia();
                if self.at_punct(',') {
                    self.bump();
                    self.skip_trivia();
                    if self.at_punct(')') {
                        break;
                    }
                } else {
                    break;
                }
            }
        }
        let end = self.expect_punct(')')?;
        Ok((args, Span::new(start.start, end.end)))
    }

    fn parse_subscript_keys(&mut self) -> Result<(Vec<Expr>, Span)> {
        let start = self.expect_punct('[')?;
        let mut keys = vec![self.parse_expr()?];
        self.skip_trivia();
        while self.at_punct(',') {
            self.bump();
            keys.push(self.parse_expr()?);
            self.skip_trivia();
        }
        let end = self.expect_punct(']')?;
        Ok((keys, Span::new(start.start, end.end)))
    }

    /// `(` in value position: a group, or — if a comma is seen before the
    /// matching `)` — a tuple. `(,)` is the empty tuple (§4.5).
    fn parse_group_or_tuple(&mut self) -> Result<Expr> {
        let start = self.expect_punct('(')?;
        self.skip_trivia();
        if self.at_punct(',') {
            self.bump();
            self.skip_trivia();
            let end = self.expect_punct(')')?;
            return Ok(Expr::Tuple(vec![], Span::new(start.start, end.end)));
        }
        let first = self.parse_expr()?;
        self.skip_trivia();
        if self.at_punct(',') {
            let mut items = vec![first];
            while self.at_punct(',') {
                self.bump();
                self.skip_trivia();
                if self.at_punct(')') {
                    break;
                }
                items.push(self.parse_expr()?);
                self.skip_trivia();
            }
            let end = self.expect_punct(')')?;
            Ok(Expr::Tuple(items, Span::new(start.start, end.end)))
        } else {
            self.expect_punct(')')?;
            Ok(first)
        }
    }

    fn parse_list_literal(&mut self) -> Result<Expr> {
        let start = self.expect_punct('[')?;
        let mut items = Vec::new();
        self.skip_trivia();
        if !self.at_punct(']') {
            loop {
                items.push(self.parse_expr()?);
                self.skip_trivia();
                if self.at_punct(',') {
                    self.bump();
                    self.skip_trivia();
                    if self.at_punct(']') {
                        break;
                    }
                } else {
                    break;
                }
            }
        }
        let end = self.expect_punct(']')?;
        Ok(Expr::List(items, Span::new(start.start, end.end)))
    }

    /// `{k: v, ...}` — dict literal (§8 scenario 2). Empty `{}` is the empty
    /// dict, never mistaken for a block since blocks only occur after `if`/
    /// `while`/`for`/`try`/`func`, never in expression position.
    fn parse_dict_literal(&mut self) -> Result<Expr> {
        let start = self.expect_punct('{')?;
        let mut pairs = Vec::new();
        self.skip_trivia();
        if !self.at_punct('}') {
            loop {
                let key = self.parse_expr()?;
                self.skip_trivia();
                self.expect_punct(':')?;
                let val = self.parse_expr()?;
                pairs.push((key, val));
                self.skip_trivia();
                if self.at_punct(',') {
                    self.bump();
                    self.skip_trivia();
                    if self.at_punct('}') {
                        break;
                    }
                } else {
                    break;
                }
            }
        }
        let end = self.expect_punct('}')?;
        Ok(Expr::DictLit(pairs, Span::new(start.start, end.end)))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        self.skip_trivia();
        let span = self.span();
        match self.kind().clone() {
            TokenKind::Keyword(Keyword::True) => {
                self.bump();
                Ok(Expr::Const(Const::True, span))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.bump();
                Ok(Expr::Const(Const::False, span))
            }
            TokenKind::Keyword(Keyword::None_) => {
                self.bump();
                Ok(Expr::Const(Const::None, span))
            }
            TokenKind::Int(s) => {
                self.bump();
                Ok(Expr::Const(Const::Int(s), span))
            }
            TokenKind::Float(s) => {
                self.bump();
                if let Some(stripped) = s.strip_suffix('i') {
                    let v: f64 = stripped
                        .parse()
                        .map_err(|_| self.error(span, "invalid imaginary literal"))?;
                    Ok(Expr::Const(Const::Complex(v), span))
                } else {
                    let v: f64 = s.parse().map_err(|_| self.error(span, "invalid float literal"))?;
                    Ok(Expr::Const(Const::Float(v), span))
                }
            }
            TokenKind::Str(s) => {
                self.bump();
                Ok(Expr::Const(Const::Str(s), span))
            }
            TokenKind::Ident(name) => {
                self.bump();
                Ok(Expr::Name(name, span))
            }
            TokenKind::Punct('(') => self.parse_group_or_tuple(),
            TokenKind::Punct('[') => self.parse_list_literal(),
            TokenKind::Punct('{') => self.parse_dict_literal(),
            _ => Err(self.error(span, "unexpected token in expression")),
        }
    }
}

pub fn parse(toks: Vec<Token>, src: &str, source_name: &str) -> Result<Vec<Stmt>> {
    Parser::new(toks, src, source_name.to_string()).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_src(src: &str) -> Vec<Stmt> {
        let toks = tokenize(src, "<test>").unwrap();
        parse(toks, src, "<test>").unwrap()
    }

    #[test]
    fn precedence_of_add_and_mul() {
        let stmts = parse_src("1 + 2 * 3");
        match &stmts[0] {
            Stmt::Expr(Expr::Binary(BinOp::Add, lhs, rhs, _)) => {
                assert!(matches!(**lhs, Expr::Const(Const::Int(_), _)));
                assert!(matches!(**rhs, Expr::Binary(BinOp::Mul, ..)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn trailing_comma_makes_tuple() {
        let stmts = parse_src("(1, 2,)");
        assert!(matches!(stmts[0], Stmt::Expr(Expr::Tuple(ref v, _)) if v.len() == 2));
    }

    #[test]
    fn empty_tuple_literal() {
        let stmts = parse_src("(,)");
        assert!(matches!(stmts[0], Stmt::Expr(Expr::Tuple(ref v, _)) if v.is_empty()));
    }

    #[test]
    fn plain_parens_is_not_a_tuple() {
        let stmts = parse_src("(1 + 2)");
        assert!(matches!(stmts[0], Stmt::Expr(Expr::Binary(BinOp::Add, ..))));
    }

    #[test]
    fn call_args_are_not_a_tuple() {
        let stmts = parse_src("f(1, 2)");
        match &stmts[0] {
            Stmt::Expr(Expr::Call(_, args, _)) => assert_eq!(args.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn dict_literal_parses_key_value_pairs() {
        let stmts = parse_src("{'a': 1, 'b': 2}");
        match &stmts[0] {
            Stmt::Expr(Expr::DictLit(pairs, _)) => assert_eq!(pairs.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn try_catch_with_binding() {
        let stmts = parse_src("try { throw 1 } catch e { ret e }");
        assert!(matches!(stmts[0], Stmt::TryCatch { bind: Some(ref n), .. } if n == "e"));
    }
}
