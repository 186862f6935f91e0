use std::ops::Range;

use text_size::{TextRange, TextSize};

use crate::error::SyntaxError;
use crate::lexer::Lexer;
use crate::token_kind::TokenKind;

/// Token cursor over the lexer. Parsing stops at the first error, so the
/// grammar functions only ever see a clean prefix of the token stream.
#[derive(Debug)]
pub(crate) struct Parser<'a> {
    lexer: Lexer<'a>,
    current: TokenKind,
    current_range: Range<usize>,
    errors: Vec<SyntaxError>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        let mut parser = Self {
            lexer: Lexer::new(text),
            current: TokenKind::Eof,
            current_range: 0..0,
            errors: Vec::new(),
        };
        parser.advance();
        parser
    }

    pub(crate) fn finish(self) -> Vec<SyntaxError> {
        self.errors
    }

    #[inline]
    pub(crate) fn peek(&self) -> TokenKind {
        self.current
    }

    #[inline]
    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.current == kind
    }

    #[inline]
    pub(crate) fn at_set(&self, set: &[TokenKind]) -> bool {
        set.contains(&self.current)
    }

    #[inline]
    pub(crate) fn eof(&self) -> bool {
        self.at(TokenKind::Eof)
    }

    #[inline]
    pub(crate) fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub(crate) fn current_text(&self) -> &'a str {
        self.lexer.text(self.current_range.clone())
    }

    pub(crate) fn current_range(&self) -> TextRange {
        text_range(self.current_range.clone())
    }

    /// Consumes the current token and returns its range.
    pub(crate) fn bump(&mut self) -> TextRange {
        let range = self.current_range();
        self.advance();
        range
    }

    pub(crate) fn eat_if(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, message: &str) -> Option<TextRange> {
        if self.at(kind) {
            Some(self.bump())
        } else {
            self.error_here(message);
            None
        }
    }

    pub(crate) fn error_here(&mut self, message: impl Into<ecow::EcoString>) {
        // Lexer errors were already reported when the token was consumed.
        if !self.at(TokenKind::Error) {
            let range = self.current_range();
            self.error_at(range, message);
        }
    }

    pub(crate) fn error_at(&mut self, range: TextRange, message: impl Into<ecow::EcoString>) {
        self.errors.push(SyntaxError::new(range, message));
    }

    fn advance(&mut self) {
        loop {
            let start = self.lexer.cursor();
            let kind = self.lexer.eat();
            let end = self.lexer.cursor();
            if kind.is_trivia() {
                continue;
            }

            self.current = kind;
            self.current_range = start..end;
            if kind == TokenKind::Error {
                let message = self
                    .lexer
                    .take_error()
                    .unwrap_or_else(|| "Invalid token".into());
                let range = self.current_range();
                self.error_at(range, message);
            }
            break;
        }
    }
}

pub(crate) fn text_range(range: Range<usize>) -> TextRange {
    let start = TextSize::new(range.start as u32);
    let end = TextSize::new(range.end as u32);
    TextRange::new(start, end)
}
