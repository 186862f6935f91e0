use std::collections::HashSet;

use ecow::EcoString;

use syntax::ast;

use crate::environment::Platform;
use crate::eval::context::EvalCtx;

/// Symbols visible to `#if`, seeded with the host platform's built-in.
#[derive(Debug)]
pub struct DefineTable {
    symbols: HashSet<EcoString>,
}

impl DefineTable {
    pub fn new(platform: Platform) -> Self {
        let mut symbols = HashSet::new();
        symbols.insert(platform.symbol().into());
        Self { symbols }
    }

    /// Returns false if the symbol was already defined.
    pub fn define(&mut self, name: EcoString) -> bool {
        self.symbols.insert(name)
    }

    /// Returns false if the symbol was not defined.
    pub fn undefine(&mut self, name: &str) -> bool {
        self.symbols.remove(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.symbols.contains(name)
    }
}

/// Evaluates an `#if` condition. Infallible: unknown symbols are simply
/// undefined, and `file_exists` probes were resolved when the source unit
/// was collected.
pub(crate) fn eval_condition(ctx: &EvalCtx<'_>, condition: &ast::PpCondition) -> bool {
    match condition {
        ast::PpCondition::Symbol(symbol) => ctx.defines.is_defined(&symbol.name),
        ast::PpCondition::EnvExists(env) => ctx.db.environment().contains(&env.name),
        ast::PpCondition::FileExists(probe) => ctx
            .source_unit
            .file_exists(&ctx.current_file_id(), &probe.path),
        ast::PpCondition::Not(inner) => !eval_condition(ctx, inner),
        ast::PpCondition::And(lhs, rhs) => eval_condition(ctx, lhs) && eval_condition(ctx, rhs),
        ast::PpCondition::Or(lhs, rhs) => eval_condition(ctx, lhs) || eval_condition(ctx, rhs),
    }
}
