#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TokenKind {
    // Markers
    Eof,
    Whitespace,
    LineComment,
    Error,

    // Symbols
    Dot,
    Caret,
    Plus,
    Minus,
    Equal,
    LBrace,
    RBrace,
    LSquare,
    RSquare,
    LParen,
    RParen,
    Comma,
    EqEq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Bang,
    AmpAmp,
    PipePipe,

    // Keywords
    Function,
    In,
    Not,
    TrueVal,
    FalseVal,

    // Literals
    IntVal,
    StrVal,
    Id,

    // Directives
    HashInclude,
    HashOnce,
    HashDefine,
    HashUndef,
    HashIf,
    HashElse,
    HashEndif,
    HashImport,
}

impl TokenKind {
    pub fn is_trivia(&self) -> bool {
        matches!(self, Self::Whitespace | Self::LineComment)
    }

    pub fn is_comparison_operator(&self) -> bool {
        matches!(
            self,
            Self::EqEq | Self::NotEq | Self::Less | Self::LessEq | Self::Greater | Self::GreaterEq
        )
    }
}

#[macro_export]
#[allow(non_snake_case)]
macro_rules! T {
    [.] => {$crate::token_kind::TokenKind::Dot};
    [^] => {$crate::token_kind::TokenKind::Caret};
    [+] => {$crate::token_kind::TokenKind::Plus};
    [-] => {$crate::token_kind::TokenKind::Minus};
    [=] => {$crate::token_kind::TokenKind::Equal};
    ['{'] => {$crate::token_kind::TokenKind::LBrace};
    ['}'] => {$crate::token_kind::TokenKind::RBrace};
    ['['] => {$crate::token_kind::TokenKind::LSquare};
    [']'] => {$crate::token_kind::TokenKind::RSquare};
    ['('] => {$crate::token_kind::TokenKind::LParen};
    [')'] => {$crate::token_kind::TokenKind::RParen};
    [,] => {$crate::token_kind::TokenKind::Comma};
    [==] => {$crate::token_kind::TokenKind::EqEq};
    [!=] => {$crate::token_kind::TokenKind::NotEq};
    [<] => {$crate::token_kind::TokenKind::Less};
    [<=] => {$crate::token_kind::TokenKind::LessEq};
    [>] => {$crate::token_kind::TokenKind::Greater};
    [>=] => {$crate::token_kind::TokenKind::GreaterEq};
    [!] => {$crate::token_kind::TokenKind::Bang};
    [&&] => {$crate::token_kind::TokenKind::AmpAmp};
    [||] => {$crate::token_kind::TokenKind::PipePipe};

    [function] => {$crate::token_kind::TokenKind::Function};
    [in] => {$crate::token_kind::TokenKind::In};
    [not] => {$crate::token_kind::TokenKind::Not};
    [true] => {$crate::token_kind::TokenKind::TrueVal};
    [false] => {$crate::token_kind::TokenKind::FalseVal};

    [#include] => {$crate::token_kind::TokenKind::HashInclude};
    [#once] => {$crate::token_kind::TokenKind::HashOnce};
    [#define] => {$crate::token_kind::TokenKind::HashDefine};
    [#undef] => {$crate::token_kind::TokenKind::HashUndef};
    [#if] => {$crate::token_kind::TokenKind::HashIf};
    [#else] => {$crate::token_kind::TokenKind::HashElse};
    [#endif] => {$crate::token_kind::TokenKind::HashEndif};
    [#import] => {$crate::token_kind::TokenKind::HashImport};
}
