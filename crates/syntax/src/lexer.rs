use ecow::EcoString;
use unscanny::Scanner;

use crate::T;
use crate::token_kind::TokenKind;

#[derive(Debug)]
pub struct Lexer<'a> {
    s: Scanner<'a>,
    error: Option<EcoString>,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            s: Scanner::new(text),
            error: None,
        }
    }

    pub fn eat(&mut self) -> TokenKind {
        self.next_token()
    }

    pub fn cursor(&self) -> usize {
        self.s.cursor()
    }

    pub fn text(&self, range: std::ops::Range<usize>) -> &'a str {
        self.s.get(range)
    }

    pub fn take_error(&mut self) -> Option<EcoString> {
        self.error.take()
    }

    fn error(&mut self, msg: impl Into<EcoString>) -> TokenKind {
        self.error = Some(msg.into());
        TokenKind::Error
    }

    fn next_token(&mut self) -> TokenKind {
        let start = self.s.cursor();
        match self.s.eat() {
            Some(c) if c.is_whitespace() => self.whitespace(),
            Some('/') if self.s.eat_if('/') => self.line_comment(),
            Some(';') => self.line_comment(),

            Some(c) if c.is_ascii_digit() => self.number(),
            Some(c) if is_identifier_start(c) => self.identifier(start),
            Some(q @ ('\'' | '"')) => self.string(q),
            Some('#') => self.directive(),

            Some('.') => T![.],
            Some('^') => T![^],
            Some('+') => T![+],
            Some('-') => T![-],
            Some('{') => T!['{'],
            Some('}') => T!['}'],
            Some('[') => T!['['],
            Some(']') => T![']'],
            Some('(') => T!['('],
            Some(')') => T![')'],
            Some(',') => T![,],
            Some('=') => {
                if self.s.eat_if('=') {
                    T![==]
                } else {
                    T![=]
                }
            }
            Some('!') => {
                if self.s.eat_if('=') {
                    T![!=]
                } else {
                    T![!]
                }
            }
            Some('<') => {
                if self.s.eat_if('=') {
                    T![<=]
                } else {
                    T![<]
                }
            }
            Some('>') => {
                if self.s.eat_if('=') {
                    T![>=]
                } else {
                    T![>]
                }
            }
            Some('&') => {
                if self.s.eat_if('&') {
                    T![&&]
                } else {
                    self.error("Expected '&&'")
                }
            }
            Some('|') => {
                if self.s.eat_if('|') {
                    T![||]
                } else {
                    self.error("Expected '||'")
                }
            }
            None => TokenKind::Eof,
            _ => self.error("Unexpected character"),
        }
    }

    fn whitespace(&mut self) -> TokenKind {
        self.s.eat_while(char::is_ascii_whitespace);
        TokenKind::Whitespace
    }

    fn line_comment(&mut self) -> TokenKind {
        self.s.eat_until(is_newline);
        TokenKind::LineComment
    }

    fn number(&mut self) -> TokenKind {
        self.s.eat_while(char::is_ascii_digit);
        TokenKind::IntVal
    }

    fn identifier(&mut self, start: usize) -> TokenKind {
        self.s.eat_while(is_identifier_continue);
        let ident = self.s.from(start);

        match ident {
            "function" => T![function],
            "in" => T![in],
            "not" => T![not],
            "true" => T![true],
            "false" => T![false],
            _ => TokenKind::Id,
        }
    }

    fn string(&mut self, quote: char) -> TokenKind {
        loop {
            match self.s.eat() {
                Some('^') => {
                    // Escape character; the next character is taken literally.
                    if self.s.eat().is_none() {
                        return self.error("End of file in string literal");
                    }
                }
                Some(c) if c == quote => break,
                Some('\r') | Some('\n') => return self.error("End of line in string literal"),
                None => return self.error("End of file in string literal"),
                _ => {}
            }
        }

        TokenKind::StrVal
    }

    fn directive(&mut self) -> TokenKind {
        let ident_start = self.s.cursor();
        self.s.eat_while(char::is_alphabetic);
        let ident = self.s.from(ident_start);

        match ident {
            "include" => T![#include],
            "once" => T![#once],
            "define" => T![#define],
            "undef" => T![#undef],
            "if" => T![#if],
            "else" => T![#else],
            "endif" => T![#endif],
            "import" => T![#import],
            _ => self.error("Unknown preprocessor directive"),
        }
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_newline(c: char) -> bool {
    matches!(c, '\r' | '\n')
}

#[cfg(test)]
mod tests {
    use crate::token_kind::TokenKind;

    use super::Lexer;

    fn tokenize(text: &str) -> Vec<TokenKind> {
        let mut l = Lexer::new(text);

        let mut tokens = Vec::new();
        while tokens.last() != Some(&TokenKind::Eof) {
            tokens.push(l.eat());
        }
        tokens
    }

    fn tokenize_no_trivia(text: &str) -> Vec<TokenKind> {
        tokenize(text)
            .into_iter()
            .filter(|t| !t.is_trivia())
            .collect()
    }

    #[test]
    fn symbols() {
        use TokenKind::*;
        assert_eq!(
            tokenize(".^+-={}[](),"),
            vec![
                Dot, Caret, Plus, Minus, Equal, LBrace, RBrace, LSquare, RSquare, LParen, RParen,
                Comma, Eof
            ]
        );
        assert_eq!(
            tokenize_no_trivia("== != < <= > >= ! && ||"),
            vec![
                EqEq, NotEq, Less, LessEq, Greater, GreaterEq, Bang, AmpAmp, PipePipe, Eof
            ]
        );
    }

    #[test]
    fn keywords() {
        use TokenKind::*;
        assert_eq!(
            tokenize_no_trivia("function in not true false ForEach"),
            vec![Function, In, Not, TrueVal, FalseVal, Id, Eof]
        );
    }

    #[test]
    fn comments() {
        use TokenKind::*;
        assert_eq!(
            tokenize("; note\n// note\n42"),
            vec![
                LineComment,
                Whitespace,
                LineComment,
                Whitespace,
                IntVal,
                Eof
            ]
        );
    }

    #[test]
    fn strings() {
        use TokenKind::*;
        assert_eq!(tokenize(r#"'a' "b""#), vec![StrVal, Whitespace, StrVal, Eof]);
        // The closing quote is escaped, so the literal runs to end of file.
        let mut l = Lexer::new(r"'a^'");
        assert_eq!(l.eat(), Error);
        assert_eq!(l.take_error(), Some("End of file in string literal".into()));
    }

    #[test]
    fn directives() {
        use TokenKind::*;
        assert_eq!(
            tokenize_no_trivia("#include #once #define #undef #if #else #endif #import"),
            vec![
                HashInclude, HashOnce, HashDefine, HashUndef, HashIf, HashElse, HashEndif,
                HashImport, Eof
            ]
        );

        let mut l = Lexer::new("#pragma");
        assert_eq!(l.eat(), Error);
        assert_eq!(
            l.take_error(),
            Some("Unknown preprocessor directive".into())
        );
    }
}
