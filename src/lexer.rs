//! C4: turns source text into a flat token vector (§4.4).
//!
//! Grounded in `kscript`'s `library/types/parser.c` tokenizer section
//! (`examples/original_source`): character-class dispatch on the next byte,
//! greedy multi-character operator matching (`<=>` before `<=` before `<`),
//! and `L`/`i` numeric literal suffixes. Diagnostics reuse
//! `crate::diagnostic::Diagnostic` exactly as the teacher's lexer would.

use crate::diagnostic::{Diagnostic, Span};
use crate::error::{Error, Result, Signal};
use crate::token::{Keyword, Token, TokenKind};

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
    source_name: String,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, source_name: impl Into<String>) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
            source_name: source_name.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<u8> {
        self.bytes.get(self.pos + off).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else if b != b'\r' {
            self.col += 1;
        }
        Some(b)
    }

    fn error(&self, span: Span, msg: impl Into<String>) -> Signal {
        let msg = msg.into();
        let diag = Diagnostic::new(&msg)
            .with_source(self.src.to_string())
            .with_label(span, "here");
        tracing::warn!(source = %self.source_name, "lexer error: {}", msg);
        Error::Syntax(diag.to_string()).into()
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = matches!(tok.kind, TokenKind::Eof);
            out.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(out)
    }

    fn next_token(&mut self) -> Result<Token> {
        loop {
            match self.peek() {
                None => {
                    return Ok(Token {
                        kind: TokenKind::Eof,
                        span: Span::new(self.pos, self.pos),
                        line: self.line,
                        column: self.col,
                    })
                }
                Some(b'\r') => {
                    self.advance();
                }
                Some(b' ') | Some(b'\t') => {
                    self.advance();
                }
                Some(b'#') => {
                    let start = self.pos;
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                    return Ok(Token {
                        kind: TokenKind::Comment,
                        span: Span::new(start, self.pos),
                        line: self.line,
                        column: self.col,
                    });
                }
                Some(b'\n') => {
                    let start = self.pos;
                    let line = self.line;
                    let col = self.col;
                    self.advance();
                    return Ok(Token {
                        kind: TokenKind::Newline,
                        span: Span::new(start, self.pos),
                        line,
                        column: col,
                    });
                }
                _ => break,
            }
        }
        let start = self.pos;
        let line = self.line;
        let col = self.col;
        let b = self.peek().unwrap();

        if b.is_ascii_digit() || (b == b'.' && self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false)) {
            return self.lex_number(start, line, col);
        }
        if b == b'"' || b == b'\'' {
            return self.lex_string(start, line, col);
        }
        if b.is_ascii_alphabetic() || b == b'_' {
            return self.lex_ident(start, line, col);
        }
        if b".,:;()[]{}".contains(b as char) {
            self.advance();
            return Ok(Token {
                kind: TokenKind::Punct(b as char),
                span: Span::new(start, self.pos),
                line,
                column: col,
            });
        }
        self.lex_operator(start, line, col)
    }

    fn lex_number(&mut self, start: usize, line: usize, col: usize) -> Result<Token> {
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.advance();
            self.advance();
            let hex_start = self.pos;
            while self.peek().map(|c| c.is_ascii_hexdigit()).unwrap_or(false) {
                self.advance();
            }
            let hex = &self.src[hex_start..self.pos];
            let value = i64::from_str_radix(hex, 16)
                .map_err(|e| self.error(Span::new(start, self.pos), format!("invalid hex literal: {e}")))?;
            return Ok(Token {
                kind: TokenKind::Int(value.to_string()),
                span: Span::new(start, self.pos),
                line,
                column: col,
            });
        }

        let mut is_float = false;
        while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.advance();
        }
        if self.peek() == Some(b'.') && self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(true) {
            is_float = true;
            self.advance();
            while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            is_float = true;
            self.advance();
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.advance();
            }
            while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.advance();
            }
        }
        let mut text = self.src[start..self.pos].to_string();

        // `i` marks an imaginary component; `L` forces big-int. Neither can
        // combine with the other, and `L` only applies to non-float text.
        if self.peek() == Some(b'i') {
            self.advance();
            text.push('i');
            return Ok(Token {
                kind: TokenKind::Float(text),
                span: Span::new(start, self.pos),
                line,
                column: col,
            });
        }
        if self.peek() == Some(b'L') && !is_float {
            self.advance();
            text.push('L');
            return Ok(Token {
                kind: TokenKind::Int(text),
                span: Span::new(start, self.pos),
                line,
                column: col,
            });
        }
        let kind = if is_float { TokenKind::Float(text) } else { TokenKind::Int(text) };
        Ok(Token {
            kind,
            span: Span::new(start, self.pos),
            line,
            column: col,
        })
    }

    fn lex_string(&mut self, start: usize, line: usize, col: usize) -> Result<Token> {
        let quote = self.advance().unwrap();
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error(Span::new(start, self.pos), "unterminated string literal")),
                Some(b'\r') => {
                    self.advance();
                }
                Some(c) if c == quote => {
                    if triple {
                        if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                            self.advance();
                            self.advance();
                            self.advance();
                            break;
                        } else {
                            out.push(self.advance().unwrap() as char);
                        }
                    } else {
                        self.advance();
                        break;
                    }
                }
                Some(b'\n') if !triple => {
                    return Err(self.error(Span::new(start, self.pos), "newline in single-line string literal"))
                }
                Some(b'\\') => {
                    self.advance();
                    match self.advance() {
                        Some(b'n') => out.push('\n'),
                        Some(b't') => out.push('\t'),
                        Some(b'r') => out.push('\r'),
                        Some(b'\\') => out.push('\\'),
                        Some(b'"') => out.push('"'),
                        Some(b'\'') => out.push('\''),
                        Some(b'0') => out.push('\0'),
                        Some(b'x') => {
                            let h1 = self.advance().ok_or_else(|| self.error(Span::new(start, self.pos), "truncated \\x escape"))?;
                            let h2 = self.advance().ok_or_else(|| self.error(Span::new(start, self.pos), "truncated \\x escape"))?;
                            let hex = format!("{}{}", h1 as char, h2 as char);
                            let code = u8::from_str_radix(&hex, 16)
                                .map_err(|_| self.error(Span::new(start, self.pos), "invalid \\x escape"))?;
                            out.push(code as char);
                        }
                        Some(other) => out.push(other as char),
                        None => return Err(self.error(Span::new(start, self.pos), "unterminated escape")),
                    }
                }
                Some(_) => {
                    let ch_start = self.pos;
                    self.advance();
                    while !self.src.is_char_boundary(self.pos) {
                        self.pos += 1;
                    }
                    out.push_str(&self.src[ch_start..self.pos]);
                }
            }
        }
        Ok(Token {
            kind: TokenKind::Str(out),
            span: Span::new(start, self.pos),
            line,
            column: col,
        })
    }

    fn lex_ident(&mut self, start: usize, line: usize, col: usize) -> Result<Token> {
        while self.peek().map(|c| c.is_ascii_alphanumeric() || c == b'_').unwrap_or(false) {
            self.advance();
        }
        let text = &self.src[start..self.pos];
        let kind = match Keyword::from_ident(text) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Ident(text.to_string()),
        };
        Ok(Token {
            kind,
            span: Span::new(start, self.pos),
            line,
            column: col,
        })
    }

    fn lex_operator(&mut self, start: usize, line: usize, col: usize) -> Result<Token> {
        const THREE: &[&str] = &["<=>", "**="];
        const TWO: &[&str] = &["**", "&&", "||", "==", "!=", "<=", ">="];
        let rest = &self.src[self.pos..];
        for op in THREE {
            if rest.starts_with(op) {
                for _ in 0..3 {
                    self.advance();
                }
                return Ok(Token {
                    kind: TokenKind::Op(op.to_string()),
                    span: Span::new(start, self.pos),
                    line,
                    column: col,
                });
            }
        }
        for op in TWO {
            if rest.starts_with(op) {
                for _ in 0..2 {
                    self.advance();
                }
                return Ok(Token {
                    kind: TokenKind::Op(op.to_string()),
                    span: Span::new(start, self.pos),
                    line,
                    column: col,
                });
            }
        }
        let single = "+-*/%<>&|~!=";
        if single.contains(self.peek().unwrap() as char) {
            let c = self.advance().unwrap() as char;
            return Ok(Token {
                kind: TokenKind::Op(c.to_string()),
                span: Span::new(start, self.pos),
                line,
                column: col,
            });
        }
        let bad = self.advance().unwrap();
        Err(self.error(
            Span::new(start, self.pos),
            format!("unexpected character '{}'", bad as char),
        ))
    }
}

pub fn tokenize(src: &str, source_name: impl Into<String>) -> Result<Vec<Token>> {
    Lexer::new(src, source_name).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src, "<test>").unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_arithmetic_expression() {
        let ks = kinds("1 + 2 * 3");
        assert!(matches!(ks[0], TokenKind::Int(_)));
        assert!(matches!(ks[1], TokenKind::Op(ref s) if s == "+"));
    }

    #[test]
    fn lexes_big_int_suffix() {
        let ks = kinds("123L");
        assert_eq!(ks[0], TokenKind::Int("123L".to_string()));
    }

    #[test]
    fn lexes_triple_quoted_multiline_string() {
        let ks = kinds("\"\"\"a\nb\"\"\"");
        assert_eq!(ks[0], TokenKind::Str("a\nb".to_string()));
    }

    #[test]
    fn lexes_spaceship_operator_greedily() {
        let ks = kinds("a <=> b");
        assert!(matches!(ks[1], TokenKind::Op(ref s) if s == "<=>"));
    }

    #[test]
    fn keywords_are_recognized() {
        let ks = kinds("if else func ret");
        assert_eq!(
            ks,
            vec![
                TokenKind::Keyword(Keyword::If),
                TokenKind::Keyword(Keyword::Else),
                TokenKind::Keyword(Keyword::Func),
                TokenKind::Keyword(Keyword::Ret),
            ]
        );
    }
}
