// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::str::CharIndices;

use lazy_static::lazy_static;
use unicode_xid::UnicodeXID;

use self::Token::*;
use crate::common::ErrorCode::*;
use crate::common::{EquationError, ErrorCode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token<'input> {
    Not,
    And,
    Or,
    True,
    False,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Exp,
    LParen,
    RParen,
    Comma,
    Ident(&'input str),
    Num(&'input str),
}

fn error<T>(code: ErrorCode, start: usize, end: usize) -> Result<T, EquationError> {
    Err(EquationError {
        start: start as u32,
        end: end as u32,
        code,
    })
}

pub type Spanned<T> = (usize, T, usize);

pub struct Lexer<'input> {
    text: &'input str,
    chars: CharIndices<'input>,
    lookahead: Option<(usize, char)>,
}

const KEYWORDS: &[(&str, Token<'static>)] = &[
    ("not", Not),
    ("and", And),
    ("or", Or),
    ("true", True),
    ("false", False),
];

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        let mut t = Lexer {
            text: input,
            chars: input.char_indices(),
            lookahead: None,
        };
        t.bump();
        t
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        self.bump_n(1)
    }

    fn bump_n(&mut self, n: usize) -> Option<(usize, char)> {
        assert!(n > 0);
        self.lookahead = self.chars.nth(n - 1);
        self.lookahead
    }

    fn word(&mut self, idx0: usize) -> Spanned<&'input str> {
        match self.take_while(is_identifier_continue) {
            Some(end) => (idx0, &self.text[idx0..end], end),
            None => (idx0, &self.text[idx0..], self.text.len()),
        }
    }

    fn take_while<F>(&mut self, mut keep_going: F) -> Option<usize>
    where
        F: FnMut(char) -> bool,
    {
        self.take_until(|c| !keep_going(c))
    }

    fn take_until<F>(&mut self, mut terminate: F) -> Option<usize>
    where
        F: FnMut(char) -> bool,
    {
        loop {
            match self.lookahead {
                None => {
                    return None;
                }
                Some((idx1, c)) => {
                    if terminate(c) {
                        return Some(idx1);
                    } else {
                        self.bump();
                    }
                }
            }
        }
    }

    fn identifierish(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        let (start, word, end) = self.word(idx0);
        let lower_word = word.to_lowercase();

        let tok = KEYWORDS
            .iter()
            .filter(|&&(w, _)| w == lower_word)
            .map(|(_, t)| *t)
            .next()
            .unwrap_or(Ident(word));

        (start, tok, end)
    }

    fn number(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        use regex::{Match, Regex};

        lazy_static! {
            static ref NUMBER_RE: Regex =
                Regex::new(r"^\d*(\.\d*)?([eE][-+]?\d+)?").unwrap();
        }

        let m: Match = NUMBER_RE.find(&self.text[idx0..]).unwrap();

        self.bump_n(m.end());

        let end = idx0 + m.end();
        (idx0, Num(&self.text[idx0..end]), end)
    }

    fn quoted_identifier(&mut self, idx0: usize) -> Result<Spanned<Token<'input>>, EquationError> {
        // eat the opening '"'
        self.bump();

        match self.take_until(|c| c == '"') {
            Some(idx1) => {
                // eat the trailing '"'
                self.bump();
                Ok((idx0, Ident(&self.text[idx0 + 1..idx1]), idx1 + 1))
            }
            None => error(UnclosedQuotedIdent, idx0, self.text.len()),
        }
    }

    fn comment_end(&mut self) -> Result<(), EquationError> {
        let idx0 = self.peek_pos();
        match self.take_until(|c| c == '}') {
            Some(_) => {
                self.bump(); // consume
                Ok(())
            }
            None => error(UnclosedComment, idx0, self.text.len()),
        }
    }

    fn peek_pos(&self) -> usize {
        match self.lookahead {
            Some((pos, _)) => pos,
            None => self.text.len(),
        }
    }

    #[allow(clippy::unnecessary_wraps)]
    fn consume(
        &mut self,
        i: usize,
        tok: Token<'input>,
        len: usize,
    ) -> Option<Result<Spanned<Token<'input>>, EquationError>> {
        self.bump();
        Some(Ok((i, tok, i + len)))
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Result<Spanned<Token<'input>>, EquationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            return match self.lookahead {
                Some((i, '+')) => self.consume(i, Plus, 1),
                Some((i, '-')) => self.consume(i, Minus, 1),
                Some((i, '*')) => self.consume(i, Mul, 1),
                Some((i, '/')) => self.consume(i, Div, 1),
                Some((i, '%')) => self.consume(i, Mod, 1),
                Some((i, '^')) => self.consume(i, Exp, 1),
                Some((i, '(')) => self.consume(i, LParen, 1),
                Some((i, ')')) => self.consume(i, RParen, 1),
                Some((i, ',')) => self.consume(i, Comma, 1),
                Some((i, '=')) => {
                    match self.bump() {
                        Some((_, '=')) => self.consume(i, Eq, 2),
                        // a bare '=' is not part of the operator set
                        _ => Some(error(UnrecognizedToken, i, i + 1)),
                    }
                }
                Some((i, '!')) => {
                    match self.bump() {
                        Some((_, '=')) => self.consume(i, Neq, 2),
                        _ => Some(error(UnrecognizedToken, i, i + 1)),
                    }
                }
                Some((i, '<')) => {
                    match self.bump() {
                        Some((_, '=')) => self.consume(i, Lte, 2),
                        // we've already bumped, don't consume
                        _ => Some(Ok((i, Lt, i + 1))),
                    }
                }
                Some((i, '>')) => {
                    match self.bump() {
                        Some((_, '=')) => self.consume(i, Gte, 2),
                        // we've already bumped, don't consume
                        _ => Some(Ok((i, Gt, i + 1))),
                    }
                }
                Some((i, '{')) => match self.comment_end() {
                    Ok(()) => continue,
                    Err(_) => Some(error(UnclosedComment, i, self.text.len())),
                },
                Some((i, '"')) => Some(self.quoted_identifier(i)),
                Some((i, c)) if is_identifier_start(c) => Some(Ok(self.identifierish(i))),
                Some((i, c)) if is_number_start(c) => Some(Ok(self.number(i))),
                Some((_, c)) if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                Some((i, _)) => {
                    self.bump(); // eat whatever is killing us
                    let end = self.peek_pos();
                    Some(error(UnrecognizedToken, i, end))
                }
                None => None,
            };
        }
    }
}

fn is_number_start(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

fn is_identifier_start(c: char) -> bool {
    UnicodeXID::is_xid_start(c) || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    UnicodeXID::is_xid_continue(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token> {
        Lexer::new(input).map(|t| t.unwrap().1).collect()
    }

    #[test]
    fn operators() {
        assert_eq!(
            vec![Ident("a"), Plus, Ident("b"), Mul, Num("2.5"), Exp, Num("3")],
            lex("a + b*2.5^3")
        );
        assert_eq!(vec![Ident("a"), Eq, Ident("b")], lex("a == b"));
        assert_eq!(vec![Ident("a"), Neq, Ident("b")], lex("a != b"));
        assert_eq!(vec![Ident("a"), Lte, Ident("b")], lex("a <= b"));
        assert_eq!(vec![Ident("a"), Mod, Num("2")], lex("a % 2"));
    }

    #[test]
    fn keywords_case_insensitive() {
        assert_eq!(vec![Not, Ident("a"), And, True, Or, False], lex("NOT a and TRUE or false"));
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(vec![Ident("a"), Plus, Ident("b")], lex("a {drip rate} + b"));
    }

    #[test]
    fn quoted_identifiers() {
        assert_eq!(vec![Ident("hot water")], lex("\"hot water\""));
    }

    #[test]
    fn numbers() {
        assert_eq!(vec![Num("1e4"), Num(".5"), Num("2.")], lex("1e4 .5 2."));
    }

    #[test]
    fn bare_equals_is_an_error() {
        let tokens: Vec<_> = Lexer::new("a = b").collect();
        assert!(tokens[1].is_err());
        assert_eq!(ErrorCode::UnrecognizedToken, tokens[1].unwrap_err().code);
    }

    #[test]
    fn spans() {
        let spanned: Vec<_> = Lexer::new("ab + c").map(|t| t.unwrap()).collect();
        assert_eq!((0, Ident("ab"), 2), spanned[0]);
        assert_eq!((3, Plus, 4), spanned[1]);
        assert_eq!((5, Ident("c"), 6), spanned[2]);
    }
}
