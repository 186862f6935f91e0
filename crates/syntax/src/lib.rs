use std::sync::Arc;

use crate::error::SyntaxError;
use crate::parser::Parser;

pub mod ast;
pub mod error;
mod grammar;
pub mod lexer;
mod parser;
pub mod token_kind;

pub use text_size::{TextRange, TextSize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parse {
    statements: Arc<[ast::Statement]>,
    errors: Arc<[SyntaxError]>,
}

impl Parse {
    pub fn statements(&self) -> &[ast::Statement] {
        &self.statements
    }

    pub fn errors(&self) -> &[SyntaxError] {
        &self.errors
    }
}

pub fn parse(text: &str) -> Parse {
    let mut parser = Parser::new(text);
    let statements = grammar::source_file(&mut parser);
    let errors = parser.finish();
    Parse {
        statements: statements.into(),
        errors: errors.into(),
    }
}
