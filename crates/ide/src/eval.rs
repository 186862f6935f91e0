//! Statement-tree evaluation.
//!
//! Walks the parsed statements of the source unit, maintaining the scope
//! stack and building the [`EvaluatedData`] side channel as it goes. The
//! first error aborts evaluation; everything recorded up to that point is
//! kept so editor queries keep working on partially broken builds.

use std::sync::Arc;

use ecow::{EcoString, eco_format};

use syntax::{Parse, ast};

use crate::db::SourceDatabase;
use crate::evaluated_data::{EvaluatedData, Value};
use crate::file_system::{FileId, FileRange, IncludeId};

pub mod context;
pub mod preprocessor;
pub mod scope;
pub mod value_ops;

use context::{EvalCtx, UserFunction};
use scope::{ParentLookupError, ScopeKind};

/// User-function calls nested deeper than this abort evaluation.
pub const MAX_FUNCTION_CALL_DEPTH: usize = 128;

#[salsa::query_group(EvalDatabaseStorage)]
pub trait EvalDatabase: SourceDatabase {
    /// Evaluates the whole source unit from its root file.
    fn eval(&self) -> Arc<Evaluation>;
}

fn eval(db: &dyn EvalDatabase) -> Arc<Evaluation> {
    let mut ctx = EvalCtx::new(db);
    let result = eval_root(&mut ctx);
    Arc::new(ctx.finish(result.err()))
}

fn eval_root(ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
    let root = ctx.source_unit.root();
    let parse = ctx.db.parse(root);
    check_parse_errors(root, &parse)?;
    eval_statements(parse.statements(), ctx)
}

#[derive(Debug, PartialEq, Eq)]
pub struct Evaluation {
    data: EvaluatedData,
    error: Option<EvalError>,
}

impl Evaluation {
    pub(crate) fn new(data: EvaluatedData, error: Option<EvalError>) -> Self {
        Self { data, error }
    }

    pub fn data(&self) -> &EvaluatedData {
        &self.data
    }

    pub fn error(&self) -> Option<&EvalError> {
        self.error.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub location: FileRange,
    pub message: EcoString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    /// A file failed to parse; evaluation never started on it.
    Parse,
    Evaluation,
}

type EvalResult<T> = Result<T, EvalError>;

fn check_parse_errors(file_id: FileId, parse: &Parse) -> EvalResult<()> {
    match parse.errors().first() {
        Some(error) => Err(EvalError {
            kind: EvalErrorKind::Parse,
            location: FileRange::new(file_id, error.range),
            message: error.message.clone(),
        }),
        None => Ok(()),
    }
}

fn eval_statements(statements: &[ast::Statement], ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
    for statement in statements {
        statement.eval(ctx)?;
    }
    Ok(())
}

trait Eval {
    type Output;
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<Self::Output>;
}

impl Eval for ast::Statement {
    type Output = ();
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
        match self {
            ast::Statement::VariableDefinition(it) => it.eval(ctx),
            ast::Statement::VariableModification(it) => it.eval(ctx),
            ast::Statement::Scope(it) => it.eval(ctx),
            ast::Statement::Using(it) => it.eval(ctx),
            ast::Statement::ForEach(it) => it.eval(ctx),
            ast::Statement::If(it) => it.eval(ctx),
            ast::Statement::UserFunctionDeclaration(it) => it.eval(ctx),
            ast::Statement::UserFunctionCall(it) => it.eval(ctx),
            ast::Statement::GenericFunction(it) => it.eval(ctx),
            ast::Statement::Include(it) => it.eval(ctx),
            ast::Statement::Once(it) => it.eval(ctx),
            ast::Statement::Define(it) => it.eval(ctx),
            ast::Statement::Undefine(it) => it.eval(ctx),
            ast::Statement::Import(it) => it.eval(ctx),
            ast::Statement::PreprocessorIf(it) => it.eval(ctx),
        }
    }
}

impl Eval for ast::VariableDefinition {
    type Output = ();
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
        let name = common::variable_name(&self.lhs, ctx)?;
        let value = self.rhs.eval(ctx)?;
        common::assign(name, &self.lhs, value, ctx)
    }
}

impl Eval for ast::VariableModification {
    type Output = ();
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
        let (name, lhs_range, prefix) = match &self.lhs {
            Some(lhs) => (
                common::variable_name(lhs, ctx)?,
                lhs.range,
                lhs.prefix,
            ),
            None => {
                let Some(name) = ctx.scopes.current().last_assignment().cloned() else {
                    return Err(ctx.error(
                        self.range,
                        "Unnamed modification must follow a variable assignment in the same scope.",
                    ));
                };
                (name, self.range, ast::ScopePrefix::Current)
            }
        };

        let index = common::find_binding(&name, prefix, lhs_range, ctx)?;
        let mut value = ctx.scopes.get(index, &name).value.clone();

        value = {
            let term = self.rhs.first.eval(ctx)?;
            value_ops::apply_binary_op(self.op, value, term)
                .map_err(|e| ctx.error(self.rhs.first.range(), e.to_string()))?
        };
        for term in &self.rhs.terms {
            let term_value = term.expr.eval(ctx)?;
            value = value_ops::apply_binary_op(term.op, value, term_value)
                .map_err(|e| ctx.error(term.expr.range(), e.to_string()))?;
        }

        let variable = ctx.scopes.get_mut(index, &name);
        variable.value = value.clone();
        let definitions = variable.definitions.clone();
        let location = ctx.file_range(lhs_range);
        ctx.data.add_variable_reference(definitions, location);
        ctx.data.add_evaluated_variable(value, location);
        Ok(())
    }
}

impl Eval for ast::Rvalue {
    type Output = Value;
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<Value> {
        let mut value = self.first.eval(ctx)?;
        for term in &self.terms {
            let term_value = term.expr.eval(ctx)?;
            value = value_ops::apply_binary_op(term.op, value, term_value)
                .map_err(|e| ctx.error(term.expr.range(), e.to_string()))?;
        }
        Ok(value)
    }
}

impl Eval for ast::Expr {
    type Output = Value;
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<Value> {
        match self {
            ast::Expr::Boolean(it) => Ok(Value::Boolean(it.value)),
            ast::Expr::Integer(it) => Ok(Value::Integer(it.value)),
            ast::Expr::String(it) => Ok(Value::String(common::string_template(
                &it.template,
                ctx,
            )?)),
            ast::Expr::Array(it) => it.eval(ctx),
            ast::Expr::Struct(it) => it.eval(ctx),
            ast::Expr::Variable(it) => {
                let name = common::variable_name(&it.name, ctx)?;
                common::read_variable(&name, it.name.prefix, it.name.range, ctx)
            }
        }
    }
}

impl Eval for ast::ArrayLiteral {
    type Output = Value;
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<Value> {
        let mut strings = Vec::new();
        let mut structs = Vec::new();
        let mut saw_string = false;
        let mut saw_struct = false;

        for item in &self.items {
            // Structs reach arrays only through variables.
            if matches!(item, ast::Expr::Struct(_)) {
                return Err(ctx.error(
                    item.range(),
                    "Cannot use a Struct literal inside an Array. Assign it to a variable first.",
                ));
            }
            let value = item.eval(ctx)?;
            match value {
                Value::String(s) => {
                    saw_string = true;
                    strings.push(s);
                }
                // Splicing an empty array does not pin the element type.
                Value::ArrayOfStrings(items) => {
                    if !items.is_empty() {
                        saw_string = true;
                        strings.extend(items);
                    }
                }
                Value::Struct(s) => {
                    saw_struct = true;
                    structs.push(s);
                }
                Value::ArrayOfStructs(items) => {
                    saw_struct = true;
                    structs.extend(items);
                }
                other => {
                    return Err(ctx.error(
                        item.range(),
                        format!(
                            "Cannot have an Array of {}s. Arrays can only contain Strings or Structs.",
                            other.type_name()
                        ),
                    ));
                }
            }
        }

        if saw_string && saw_struct {
            return Err(ctx.error(self.range, "Cannot mix Strings and Structs in an Array."));
        }
        if saw_struct {
            Ok(Value::ArrayOfStructs(structs))
        } else {
            Ok(Value::ArrayOfStrings(strings))
        }
    }
}

impl Eval for ast::StructLiteral {
    type Output = Value;
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<Value> {
        ctx.scopes.push(ScopeKind::StructLiteral);
        let result = eval_statements(&self.statements, ctx);
        let scope = ctx.scopes.pop();
        result?;
        Ok(Value::Struct(scope.into_struct()))
    }
}

impl Eval for ast::ScopeBlock {
    type Output = ();
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
        ctx.scopes.push(ScopeKind::Block);
        let result = eval_statements(&self.statements, ctx);
        ctx.scopes.pop();
        result
    }
}

impl Eval for ast::UsingStatement {
    type Output = ();
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
        let value = self.value.eval(ctx)?;
        let Value::Struct(source) = value else {
            return Err(ctx.error(
                self.value.range(),
                format!(
                    "Using parameter must be a Struct, but it is a {}.",
                    value.type_name()
                ),
            ));
        };

        let location = ctx.file_range(self.range);
        for (member_name, member) in source.iter() {
            // The member lands on the binding it would shadow, if any.
            let mut definitions = match ctx.scopes.find(member_name) {
                Some(index) => ctx.scopes.get(index, member_name).definitions.clone(),
                None => vec![
                    ctx.data
                        .add_variable_definition(member_name.clone(), location),
                ],
            };
            ctx.data
                .add_variable_reference(definitions.clone(), location);
            if !member.definitions.is_empty() {
                ctx.data
                    .add_variable_reference(member.definitions.clone(), location);
            }
            for id in &member.definitions {
                if !definitions.contains(id) {
                    definitions.push(*id);
                }
            }
            ctx.scopes
                .set_current(member_name.clone(), member.value.clone(), definitions);
        }
        Ok(())
    }
}

impl Eval for ast::ForEachStatement {
    type Output = ();
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
        struct ResolvedIterator {
            name: EcoString,
            definition: crate::evaluated_data::VariableDefinitionId,
            location: FileRange,
            elements: Vec<Value>,
        }

        let mut iterators = Vec::new();
        for iterator in &self.iterators {
            let name = common::variable_name(&iterator.variable, ctx)?;
            let value = iterator.array.eval(ctx)?;
            let elements = match value {
                Value::ArrayOfStrings(items) => {
                    items.into_iter().map(Value::String).collect::<Vec<_>>()
                }
                Value::ArrayOfStructs(items) => {
                    items.into_iter().map(Value::Struct).collect()
                }
                other => {
                    return Err(ctx.error(
                        iterator.array.range(),
                        format!(
                            "ForEach can only iterate over an ArrayOfStrings or an ArrayOfStructs, but the value is a {}.",
                            other.type_name()
                        ),
                    ));
                }
            };

            let location = ctx.file_range(iterator.variable.range);
            let definition = ctx.data.add_variable_definition(name.clone(), location);
            ctx.data.add_variable_reference(vec![definition], location);
            iterators.push(ResolvedIterator {
                name,
                definition,
                location,
                elements,
            });
        }

        if let Some(first) = iterators.first() {
            for other in &iterators[1..] {
                if other.elements.len() != first.elements.len() {
                    return Err(ctx.error(
                        self.range,
                        format!(
                            "ForEach arrays must have the same size: \"{}\" has {} elements but \"{}\" has {} elements.",
                            first.name,
                            first.elements.len(),
                            other.name,
                            other.elements.len()
                        ),
                    ));
                }
            }
        }

        let count = iterators.first().map_or(0, |it| it.elements.len());
        for index in 0..count {
            ctx.scopes.push(ScopeKind::ForEachIteration);
            for iterator in &iterators {
                let element = iterator.elements[index].clone();
                ctx.scopes.set_current(
                    iterator.name.clone(),
                    element.clone(),
                    vec![iterator.definition],
                );
                ctx.data.add_evaluated_variable(element, iterator.location);
            }
            let result = eval_statements(&self.statements, ctx);
            ctx.scopes.pop();
            result?;
        }
        Ok(())
    }
}

impl Eval for ast::IfStatement {
    type Output = ();
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
        if self.condition.eval(ctx)? {
            ctx.scopes.push(ScopeKind::Block);
            let result = eval_statements(&self.statements, ctx);
            ctx.scopes.pop();
            result?;
        }
        Ok(())
    }
}

impl Eval for ast::Condition {
    type Output = bool;
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<bool> {
        match self {
            ast::Condition::Boolean(it) => {
                let value = it.expr.eval(ctx)?;
                match value {
                    Value::Boolean(b) => Ok(b),
                    other => Err(ctx.error(
                        it.expr.range(),
                        format!(
                            "Condition must evaluate to a Boolean, but it is a {}.",
                            other.type_name()
                        ),
                    )),
                }
            }
            ast::Condition::Comparison(it) => {
                let lhs = it.lhs.eval(ctx)?;
                let rhs = it.rhs.eval(ctx)?;
                value_ops::compare(it.op, &lhs, &rhs)
                    .map_err(|e| ctx.error(it.range, e.to_string()))
            }
            ast::Condition::In(it) => {
                let lhs = it.lhs.eval(ctx)?;
                let name = common::variable_name(&it.rhs.name, ctx)?;
                let rhs =
                    common::read_variable(&name, it.rhs.name.prefix, it.rhs.name.range, ctx)?;
                let found = value_ops::membership(&lhs, &rhs)
                    .map_err(|e| ctx.error(it.range, e.to_string()))?;
                Ok(found != it.negated)
            }
            ast::Condition::Not(inner) => Ok(!inner.eval(ctx)?),
            // Both operands are always evaluated so every variable occurrence
            // is recorded, even in branches the condition value makes moot.
            ast::Condition::And(lhs, rhs) => {
                let lhs = lhs.eval(ctx)?;
                let rhs = rhs.eval(ctx)?;
                Ok(lhs && rhs)
            }
            ast::Condition::Or(lhs, rhs) => {
                let lhs = lhs.eval(ctx)?;
                let rhs = rhs.eval(ctx)?;
                Ok(lhs || rhs)
            }
        }
    }
}

impl Eval for ast::UserFunctionDeclaration {
    type Output = ();
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
        if ast::is_reserved_function_name(&self.name) {
            return Err(ctx.error(
                self.name_range,
                format!("Cannot use \"{}\" as a function name; it is a reserved name.", self.name),
            ));
        }
        if ctx.functions.contains_key(&self.name) {
            return Err(ctx.error(
                self.name_range,
                format!("Function \"{}\" is already defined.", self.name),
            ));
        }

        let mut params: Vec<(EcoString, _)> = Vec::new();
        for param in &self.params {
            if params.iter().any(|(name, _)| name == &param.name) {
                return Err(ctx.error(
                    param.range,
                    format!(
                        "Function \"{}\" has a duplicate parameter \".{}\".",
                        self.name, param.name
                    ),
                ));
            }
            let definition = ctx
                .data
                .add_variable_definition(param.name.clone(), ctx.file_range(param.range));
            params.push((param.name.clone(), definition));
        }

        ctx.functions.insert(
            self.name.clone(),
            UserFunction {
                params,
                body: self.statements.clone().into(),
            },
        );
        Ok(())
    }
}

impl Eval for ast::UserFunctionCall {
    type Output = ();
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
        let Some(function) = ctx.functions.get(&self.name).cloned() else {
            return Err(ctx.error(
                self.name_range,
                format!("No function exists with the name \"{}\".", self.name),
            ));
        };
        if self.args.len() != function.params.len() {
            return Err(ctx.error(
                self.range,
                format!(
                    "Function \"{}\" takes {} argument(s) but was given {}.",
                    self.name,
                    function.params.len(),
                    self.args.len()
                ),
            ));
        }
        if ctx.call_depth >= MAX_FUNCTION_CALL_DEPTH {
            return Err(ctx.error(
                self.range,
                "Excessive scope depth. Possible infinite recursion from user function calls.",
            ));
        }

        // Arguments are evaluated in the caller's scope, before the barrier.
        let mut bound = Vec::new();
        for (arg, (param_name, definition)) in self.args.iter().zip(&function.params) {
            let value = arg.eval(ctx)?;
            let location = ctx.file_range(arg.range());
            ctx.data.add_variable_reference(vec![*definition], location);
            // A variable argument already recorded its value when it was
            // read; recording again would duplicate the occurrence.
            if !matches!(arg, ast::Expr::Variable(_)) {
                ctx.data.add_evaluated_variable(value.clone(), location);
            }
            bound.push((param_name.clone(), *definition, value));
        }

        ctx.scopes.push(ScopeKind::FunctionBody);
        for (name, definition, value) in bound {
            ctx.scopes.set_current(name, value, vec![definition]);
        }
        ctx.call_depth += 1;
        let result = eval_statements(&function.body, ctx);
        ctx.call_depth -= 1;
        ctx.scopes.pop();
        result
    }
}

/// Struct members read back out of a build function's body scope to find
/// the target names it depends on.
const DEPENDENCY_PROPERTIES: &[&str] = &["Targets", "PreBuildDependencies", "Libraries"];

impl Eval for ast::GenericFunction {
    type Output = ();
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
        let Some(builtin) = ast::builtin_function(&self.name) else {
            tracing::warn!("unknown builtin function: {}", self.name);
            return Ok(());
        };

        let mut target_loc = None;
        let mut args = self.args.iter();
        if builtin.defines_target {
            let Some(arg) = args.next() else {
                return Err(ctx.error(
                    self.name_range,
                    format!("{} requires a target name argument.", self.name),
                ));
            };
            let value = arg.eval(ctx)?;
            let Value::String(target_name) = value else {
                return Err(ctx.error(
                    arg.range(),
                    format!(
                        "Target name must evaluate to a String, but it is a {}.",
                        value.type_name()
                    ),
                ));
            };
            let location = ctx.file_range(arg.range());
            ctx.data.add_target_definition(target_name, location);
            target_loc = Some(location);
        }
        for arg in args {
            arg.eval(ctx)?;
        }

        if let Some(body) = &self.body {
            ctx.scopes.push(ScopeKind::Block);
            let result = eval_statements(body, ctx);
            let mut referenced = Vec::new();
            if result.is_ok() {
                for property in DEPENDENCY_PROPERTIES {
                    let Some(variable) = ctx.scopes.current().get(property) else {
                        continue;
                    };
                    match &variable.value {
                        Value::String(name) => referenced.push(name.clone()),
                        Value::ArrayOfStrings(names) => referenced.extend(names.iter().cloned()),
                        _ => {}
                    }
                }
            }
            ctx.scopes.pop();
            result?;

            let location = target_loc.unwrap_or_else(|| ctx.file_range(self.name_range));
            for name in referenced {
                ctx.data.add_target_reference(name, location);
            }
        }
        Ok(())
    }
}

impl Eval for ast::IncludeDirective {
    type Output = ();
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
        let file_id = ctx.current_file_id();
        let target = ctx
            .source_unit
            .include_map(&file_id)
            .and_then(|map| map.get(&IncludeId(self.range)))
            .copied();
        let Some(target) = target else {
            return Err(ctx.error(
                self.path_range,
                format!("Unable to open include: {}", self.path),
            ));
        };

        if ctx.once_files.contains(&target) {
            return Ok(());
        }
        if ctx.file_trace.contains(&target) {
            return Err(ctx.error(
                self.path_range,
                format!("Circular include: {}", self.path),
            ));
        }

        let parse = ctx.db.parse(target);
        check_parse_errors(target, &parse)?;
        ctx.push_file(target);
        let result = eval_statements(parse.statements(), ctx);
        ctx.pop_file();
        result
    }
}

impl Eval for ast::OnceDirective {
    type Output = ();
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
        let file_id = ctx.current_file_id();
        ctx.once_files.insert(file_id);
        Ok(())
    }
}

impl Eval for ast::DefineDirective {
    type Output = ();
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
        if !ctx.defines.define(self.symbol.clone()) {
            return Err(ctx.error(
                self.symbol_range,
                format!("Cannot #define already defined symbol \"{}\".", self.symbol),
            ));
        }
        Ok(())
    }
}

impl Eval for ast::UndefineDirective {
    type Output = ();
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
        if crate::environment::Platform::is_builtin_symbol(&self.symbol) {
            return Err(ctx.error(
                self.symbol_range,
                format!("Cannot #undef built-in symbol \"{}\".", self.symbol),
            ));
        }
        if !ctx.defines.undefine(&self.symbol) {
            return Err(ctx.error(
                self.symbol_range,
                format!("Cannot #undef undefined symbol \"{}\".", self.symbol),
            ));
        }
        Ok(())
    }
}

impl Eval for ast::ImportDirective {
    type Output = ();
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
        if !ctx.db.environment().contains(&self.name) {
            return Err(ctx.error(
                self.name_range,
                format!("Environment variable \"{}\" does not exist.", self.name),
            ));
        }

        // The actual value is irrelevant for analysis; a stable placeholder
        // keeps evaluation deterministic across machines.
        let value = Value::String(eco_format!("${}$-placeholder", self.name));
        let location = ctx.file_range(self.name_range);
        let definitions = match ctx.scopes.current().get(&self.name) {
            Some(existing) => existing.definitions.clone(),
            None => vec![ctx.data.add_variable_definition(self.name.clone(), location)],
        };
        ctx.scopes
            .set_current(self.name.clone(), value.clone(), definitions.clone());
        ctx.data.add_variable_reference(definitions, location);
        ctx.data.add_evaluated_variable(value, location);
        ctx.scopes.set_last_assignment(self.name.clone());
        Ok(())
    }
}

impl Eval for ast::PreprocessorIf {
    type Output = ();
    fn eval(&self, ctx: &mut EvalCtx<'_>) -> EvalResult<()> {
        // Preprocessor branches do not open a scope.
        let branch = if preprocessor::eval_condition(ctx, &self.condition) {
            &self.then_statements
        } else {
            &self.else_statements
        };
        eval_statements(branch, ctx)
    }
}

mod common {
    use ecow::EcoString;

    use syntax::{TextRange, ast};

    use super::{EvalCtx, EvalResult, ParentLookupError, Value};

    /// Resolves a variable name to text, evaluating `$Sub$` parts of dynamic
    /// names.
    pub(super) fn variable_name(
        name: &ast::VariableName,
        ctx: &mut EvalCtx<'_>,
    ) -> EvalResult<EcoString> {
        match &name.source {
            ast::NameSource::Literal(text) => Ok(text.clone()),
            ast::NameSource::Dynamic(template) => string_template(template, ctx),
        }
    }

    pub(super) fn string_template(
        template: &ast::StringTemplate,
        ctx: &mut EvalCtx<'_>,
    ) -> EvalResult<EcoString> {
        let mut out = EcoString::new();
        for part in &template.parts {
            match part {
                ast::TemplatePart::Literal(text) => out.push_str(text),
                ast::TemplatePart::Substitution(sub) => {
                    let value =
                        read_variable(&sub.name, ast::ScopePrefix::Current, sub.range, ctx)?;
                    match value {
                        Value::String(text) => out.push_str(&text),
                        Value::Integer(number) => out.push_str(&number.to_string()),
                        other => {
                            return Err(ctx.error(
                                sub.range,
                                format!(
                                    "Cannot substitute a {} into a String. Only Strings and Integers can be substituted.",
                                    other.type_name()
                                ),
                            ));
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn builtin_variable(name: &str, ctx: &EvalCtx<'_>) -> Option<Value> {
        match name {
            "_CURRENT_BFF_DIR_" => Some(Value::String(ctx.current_bff_dir())),
            "_WORKING_DIR_" => Some(Value::String(ctx.working_dir())),
            _ => None,
        }
    }

    /// Locates the scope holding `name`, honoring the `^` parent prefix.
    pub(super) fn find_binding(
        name: &str,
        prefix: ast::ScopePrefix,
        range: TextRange,
        ctx: &EvalCtx<'_>,
    ) -> EvalResult<usize> {
        match prefix {
            ast::ScopePrefix::Current => ctx.scopes.find(name).ok_or_else(|| {
                ctx.error(
                    range,
                    format!(
                        "Referencing variable \"{name}\" that is not defined in the current scope or any of the parent scopes."
                    ),
                )
            }),
            ast::ScopePrefix::Parent => match ctx.scopes.find_from_parent(name) {
                Ok(index) => Ok(index),
                Err(ParentLookupError::NoParent) => Err(ctx.error(
                    range,
                    "Cannot access parent scope because there is no parent scope.",
                )),
                Err(ParentLookupError::NotFound) => Err(ctx.error(
                    range,
                    format!(
                        "Referencing variable \"{name}\" in a parent scope that is not defined in any parent scope."
                    ),
                )),
            },
        }
    }

    /// Reads a variable, recording the reference and the observed value.
    pub(super) fn read_variable(
        name: &str,
        prefix: ast::ScopePrefix,
        range: TextRange,
        ctx: &mut EvalCtx<'_>,
    ) -> EvalResult<Value> {
        if prefix == ast::ScopePrefix::Current {
            if let Some(value) = builtin_variable(name, ctx) {
                ctx.data
                    .add_evaluated_variable(value.clone(), ctx.file_range(range));
                return Ok(value);
            }
        }

        let index = find_binding(name, prefix, range, ctx)?;
        let variable = ctx.scopes.get(index, name);
        let value = variable.value.clone();
        let definitions = variable.definitions.clone();
        let location = ctx.file_range(range);
        ctx.data.add_variable_reference(definitions, location);
        ctx.data.add_evaluated_variable(value.clone(), location);
        Ok(value)
    }

    /// Stores `value` under `name`, creating or rebinding per the prefix.
    pub(super) fn assign(
        name: EcoString,
        lhs: &ast::VariableName,
        value: Value,
        ctx: &mut EvalCtx<'_>,
    ) -> EvalResult<()> {
        let location = ctx.file_range(lhs.range);
        match lhs.prefix {
            ast::ScopePrefix::Current => {
                // Rebinding in the same scope keeps the original definition.
                let definitions = match ctx.scopes.current().get(&name) {
                    Some(existing) => existing.definitions.clone(),
                    None => vec![ctx.data.add_variable_definition(name.clone(), location)],
                };
                ctx.scopes
                    .set_current(name.clone(), value.clone(), definitions.clone());
                ctx.data.add_variable_reference(definitions, location);
                ctx.data.add_evaluated_variable(value, location);
                ctx.scopes.set_last_assignment(name);
            }
            ast::ScopePrefix::Parent => {
                let index = find_binding(&name, ast::ScopePrefix::Parent, lhs.range, ctx)?;
                let variable = ctx.scopes.get_mut(index, &name);
                variable.value = value.clone();
                let definitions = variable.definitions.clone();
                ctx.data.add_variable_reference(definitions, location);
                ctx.data.add_evaluated_variable(value, location);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::db::SourceDatabase;
    use crate::environment::Environment;
    use crate::eval::{EvalDatabase, EvalErrorKind, Evaluation};
    use crate::evaluated_data::{Struct, StructMember, Value};
    use crate::file_system::FilePosition;
    use crate::tests;

    fn evaluate(fixture: &str) -> (Arc<Evaluation>, tests::Fixture) {
        let (db, f) = tests::single_file(fixture);
        (db.eval(), f)
    }

    fn evaluate_files(fixture: &str) -> (Arc<Evaluation>, tests::Fixture) {
        let (db, f) = tests::multiple_files(fixture);
        (db.eval(), f)
    }

    fn value_at(evaluation: &Evaluation, pos: FilePosition) -> Value {
        evaluation
            .data()
            .evaluated_value_at(pos)
            .expect("no evaluated value at marker")
            .value
            .clone()
    }

    fn error_of(fixture: &str) -> String {
        let (db, _) = tests::single_file(fixture);
        let evaluation = db.eval();
        evaluation
            .error()
            .expect("expected an evaluation error")
            .message
            .to_string()
    }

    fn strings(items: &[&str]) -> Value {
        Value::ArrayOfStrings(items.iter().map(|s| (*s).into()).collect())
    }

    #[test]
    fn reads_fall_back_to_parent_scopes() {
        let (evaluation, f) = evaluate(
            "\
.X = 1
{
    .Y = .@X
}",
        );
        assert_eq!(evaluation.error(), None);
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::Integer(1));
    }

    #[test]
    fn shadowing_ends_with_the_scope() {
        let (evaluation, f) = evaluate(
            "\
.X = 1
{
    .X = 2
}
.Y = .@X",
        );
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::Integer(1));
    }

    #[test]
    fn parent_assignment_rebinds_the_outer_variable() {
        let (evaluation, f) = evaluate(
            "\
.X = 1
{
    ^X = 2
}
.Y = .@X",
        );
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::Integer(2));
    }

    #[test]
    fn parent_prefix_at_root_is_an_error() {
        assert_eq!(
            error_of("^X = 1"),
            "Cannot access parent scope because there is no parent scope."
        );
    }

    #[test]
    fn parent_prefix_without_binding_is_an_error() {
        assert_eq!(
            error_of("{\n^X = 1\n}"),
            "Referencing variable \"X\" in a parent scope that is not defined in any parent scope."
        );
    }

    #[test]
    fn undefined_read_is_an_error() {
        assert_eq!(
            error_of(".Y = .X"),
            "Referencing variable \"X\" that is not defined in the current scope or any of the parent scopes."
        );
    }

    #[test]
    fn sums_fold_left_to_right() {
        let (evaluation, f) = evaluate(".X = 1 + 2 - 4\n.Y = .@X");
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::Integer(-1));

        let (evaluation, f) = evaluate(".S = 'a' + 'b' - 'ab' + 'c'\n.Y = .@S");
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::String("c".into()));
    }

    #[test]
    fn assignments_record_the_value_at_the_lhs() {
        let (evaluation, f) = evaluate(
            "\
.@S = {}
.@S + 'x'
.@S + 'y'",
        );
        assert_eq!(evaluation.error(), None);
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::empty_array());
        assert_eq!(value_at(&evaluation, f.marker(1)), strings(&["x"]));
        assert_eq!(value_at(&evaluation, f.marker(2)), strings(&["x", "y"]));
    }

    #[test]
    fn unnamed_modification_follows_the_last_assignment() {
        let (evaluation, f) = evaluate(
            "\
.X = 1
#if __LINUX__
+ 2
#endif
.Y = .@X",
        );
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::Integer(3));
    }

    #[test]
    fn unnamed_modification_without_assignment_is_an_error() {
        assert_eq!(
            error_of("+ 2"),
            "Unnamed modification must follow a variable assignment in the same scope."
        );
    }

    #[test]
    fn empty_array_promotes_on_struct_append() {
        let (evaluation, f) = evaluate(
            "\
.S = {}
.A = [ .V = 1 ]
.S + .A
.X = .@S",
        );
        let Value::ArrayOfStructs(items) = value_at(&evaluation, f.marker(0)) else {
            panic!("expected an ArrayOfStructs");
        };
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].get("V").unwrap().value, Value::Integer(1));
    }

    #[test]
    fn mixing_element_types_is_an_error() {
        assert_eq!(
            error_of(".S = { 'x' }\n.S + 1"),
            "Cannot add a Integer to a ArrayOfStrings."
        );
    }

    #[test]
    fn struct_literals_cannot_appear_in_array_literals() {
        assert_eq!(
            error_of(".A = { [ .X = 1 ] }"),
            "Cannot use a Struct literal inside an Array. Assign it to a variable first."
        );
    }

    #[test]
    fn arrays_collect_structs_through_variables() {
        let (evaluation, f) = evaluate(
            "\
.S1 = [ .V = 1 ]
.S2 = [ .V = 2 ]
.A = { .S1, .S2 }
.X = .@A",
        );
        assert_eq!(evaluation.error(), None);
        let Value::ArrayOfStructs(items) = value_at(&evaluation, f.marker(0)) else {
            panic!("expected an ArrayOfStructs");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].get("V").unwrap().value, Value::Integer(2));
    }

    #[test]
    fn subtracting_an_array_from_an_array_is_an_error() {
        assert_eq!(
            error_of(".A = { 'a', 'b' }\n.A - { 'a' }"),
            "Cannot subtract a ArrayOfStrings from a ArrayOfStrings."
        );
    }

    #[test]
    fn using_imports_struct_members() {
        let (evaluation, f) = evaluate(
            "\
.S = [ .A = 1 .B = 'b' ]
Using( .S )
.X = .@A",
        );
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::Integer(1));
    }

    #[test]
    fn using_requires_a_struct() {
        assert_eq!(
            error_of(".S = 'x'\nUsing( .S )"),
            "Using parameter must be a Struct, but it is a String."
        );
    }

    #[test]
    fn using_inside_a_struct_literal_merges_into_it() {
        let (evaluation, f) = evaluate(
            "\
.T = [ @.A@ = 1 ]
.S = [ Using( .T ) .B = 2 ]
.X = .@S",
        );
        assert_eq!(evaluation.error(), None);
        let Value::Struct(s) = value_at(&evaluation, f.marker(2)) else {
            panic!("expected a Struct");
        };
        assert_eq!(s.get("A").unwrap().value, Value::Integer(1));
        assert_eq!(s.get("B").unwrap().value, Value::Integer(2));

        // The Using site references the member's original definition.
        let (id, _) = evaluation
            .data()
            .iter_variable_definitions()
            .find(|(_, def)| def.name == "A")
            .expect("definition of A missing");
        let references = evaluation.data().references_to(id);
        assert_eq!(references.len(), 2);
        assert_eq!(references[0], f.marker_range(0));
    }

    #[test]
    fn struct_concatenation_merges_members() {
        let (evaluation, f) = evaluate(
            "\
.A = [ .X = 1 .Y = 2 ]
.B = [ .Y = 20 .Z = 3 ]
.C = .A + .B
.D = .@C",
        );
        let mut expected = Struct::new();
        expected.insert("X".into(), StructMember::new(Value::Integer(1), Vec::new()));
        expected.insert("Y".into(), StructMember::new(Value::Integer(20), Vec::new()));
        expected.insert("Z".into(), StructMember::new(Value::Integer(3), Vec::new()));
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::Struct(expected));
    }

    #[test]
    fn for_each_binds_each_element() {
        let (evaluation, f) = evaluate(
            "\
.Items = { 'a', 'b' }
.Out = ''
ForEach( .I in .Items )
{
    ^Out + .I
}
.X = .@Out",
        );
        assert_eq!(evaluation.error(), None);
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::String("ab".into()));
    }

    #[test]
    fn for_each_arrays_must_have_equal_lengths() {
        assert_eq!(
            error_of(
                "\
.A = { 'a' }
.B = { 'x', 'y' }
ForEach( .I in .A, .J in .B )
{
}"
            ),
            "ForEach arrays must have the same size: \"I\" has 1 elements but \"J\" has 2 elements."
        );
    }

    #[test]
    fn untaken_if_branch_is_not_evaluated() {
        let (evaluation, _) = evaluate(
            "\
.X = 1
If( .X == 2 )
{
    .Y = .Undefined
}",
        );
        assert_eq!(evaluation.error(), None);
        assert!(
            !evaluation
                .data()
                .iter_variable_definitions()
                .any(|(_, def)| def.name == "Y")
        );
    }

    #[test]
    fn boolean_operators() {
        let (evaluation, f) = evaluate(
            "\
.C = 0
.A = true
.B = false
If( .A && !.B )
{
    ^C = 1
}
.D = .@C",
        );
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::Integer(1));
    }

    #[test]
    fn membership_conditions() {
        let (evaluation, f) = evaluate(
            "\
.Items = { 'a', 'b' }
.R = ''
If( 'a' in .Items )
{
    ^R = 'yes'
}
If( 'c' not in .Items )
{
    ^R + '!'
}
.X = .@R",
        );
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::String("yes!".into()));
    }

    #[test]
    fn array_membership_is_a_subset_test() {
        let (evaluation, f) = evaluate(
            "\
.H = { 'a', 'b' }
.Overlap = { 'a', 'z' }
.Subset = { 'b', 'a' }
.R = ''
If( .Overlap in .H )
{
    ^R + 'overlap'
}
If( .Subset in .H )
{
    ^R + 'subset'
}
.X = .@R",
        );
        assert_eq!(evaluation.error(), None);
        // One shared element is not enough; every element must be present.
        assert_eq!(
            value_at(&evaluation, f.marker(0)),
            Value::String("subset".into())
        );
    }

    #[test]
    fn comparing_different_types_is_an_error() {
        assert_eq!(
            error_of(".A = 1\nIf( .A == 'a' )\n{\n}"),
            "Cannot compare a Integer to a String."
        );
    }

    #[test]
    fn condition_must_be_boolean() {
        assert_eq!(
            error_of(".A = 1\nIf( .A )\n{\n}"),
            "Condition must evaluate to a Boolean, but it is a Integer."
        );
    }

    #[test]
    fn user_function_arguments_bind_to_parameters() {
        let (evaluation, _) = evaluate(
            "\
function Twice( .Value )
{
    Print( .Value )
    Print( .Value )
}
Twice( 3 )",
        );
        assert_eq!(evaluation.error(), None);
        let evaluated = evaluation.data().evaluated_variables();
        assert_eq!(evaluated.len(), 3);
        assert!(evaluated.iter().all(|ev| ev.value == Value::Integer(3)));

        let (id, _) = evaluation
            .data()
            .iter_variable_definitions()
            .find(|(_, def)| def.name == "Value")
            .expect("parameter definition missing");
        assert_eq!(evaluation.data().references_to(id).len(), 3);
    }

    #[test]
    fn variable_arguments_record_a_single_occurrence() {
        let (evaluation, f) = evaluate(
            "\
.V = 5
function F( .P )
{
    Print( .P )
}
F( @.V@ )",
        );
        assert_eq!(evaluation.error(), None);
        let at_argument: Vec<_> = evaluation
            .data()
            .evaluated_variables()
            .iter()
            .filter(|ev| ev.location == f.marker_range(0))
            .collect();
        assert_eq!(at_argument.len(), 1);
        assert_eq!(at_argument[0].value, Value::Integer(5));
    }

    #[test]
    fn function_bodies_cannot_see_the_caller() {
        assert_eq!(
            error_of(
                "\
.X = 1
function F()
{
    .Y = .X
}
F()"
            ),
            "Referencing variable \"X\" that is not defined in the current scope or any of the parent scopes."
        );
    }

    #[test]
    fn runaway_recursion_is_cut_off() {
        assert_eq!(
            error_of(
                "\
function Loop()
{
    Loop()
}
Loop()"
            ),
            "Excessive scope depth. Possible infinite recursion from user function calls."
        );
    }

    #[test]
    fn dynamic_variable_names_are_evaluated() {
        let (evaluation, f) = evaluate(
            "\
.Suffix = 'Var'
.\"My$Suffix$\" = 7
.X = .@MyVar",
        );
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::Integer(7));
    }

    #[test]
    fn string_substitution() {
        let (evaluation, f) = evaluate(
            "\
.Name = 'World'
.N = 3
.Greeting = 'Hello $Name$ x$N$'
.X = .@Greeting",
        );
        assert_eq!(
            value_at(&evaluation, f.marker(0)),
            Value::String("Hello World x3".into())
        );
    }

    #[test]
    fn substituting_an_array_is_an_error() {
        assert_eq!(
            error_of(".A = { 'x' }\n.S = 'v$A$'"),
            "Cannot substitute a ArrayOfStrings into a String. Only Strings and Integers can be substituted."
        );
    }

    #[test]
    fn preprocessor_define_controls_branches() {
        let (evaluation, f) = evaluate(
            "\
#define DEBUG
#if DEBUG
.X = 1
#else
.X = 2
#endif
#undef DEBUG
#if DEBUG
.Y = 1
#else
.Y = 2
#endif
.A = .@X
.B = .@Y",
        );
        assert_eq!(evaluation.error(), None);
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::Integer(1));
        assert_eq!(value_at(&evaluation, f.marker(1)), Value::Integer(2));
    }

    #[test]
    fn platform_symbol_is_defined() {
        let (evaluation, f) = evaluate(
            "\
#if __LINUX__
.X = 1
#else
.X = 2
#endif
.A = .@X",
        );
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::Integer(1));
    }

    #[test]
    fn redefining_a_symbol_is_an_error() {
        assert_eq!(
            error_of("#define A\n#define A"),
            "Cannot #define already defined symbol \"A\"."
        );
    }

    #[test]
    fn undefining_a_builtin_symbol_is_an_error() {
        assert_eq!(
            error_of("#undef __LINUX__"),
            "Cannot #undef built-in symbol \"__LINUX__\"."
        );
    }

    #[test]
    fn exists_checks_the_environment() {
        let (evaluation, f) = evaluate(
            "\
#if exists(PATH)
.X = 1
#else
.X = 2
#endif
.A = .@X",
        );
        // Tests run with an empty environment.
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::Integer(2));
    }

    #[test]
    fn file_exists_probes_relative_to_the_file() {
        let (evaluation, f) = evaluate(
            "\
#if file_exists('main.bff') && !file_exists('missing.bff')
.X = 1
#else
.X = 2
#endif
.A = .@X",
        );
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::Integer(1));
    }

    #[test]
    fn import_requires_the_environment_variable() {
        assert_eq!(
            error_of("#import FOO"),
            "Environment variable \"FOO\" does not exist."
        );
    }

    #[test]
    fn import_binds_a_placeholder_value() {
        let (mut db, f) = tests::single_file("#import @PATH\n.X = .PATH");
        db.set_environment(Arc::new(Environment::from_iter([(
            "PATH".into(),
            "/usr/bin".into(),
        )])));
        let evaluation = db.eval();
        assert_eq!(evaluation.error(), None);
        assert_eq!(
            value_at(&evaluation, f.marker(0)),
            Value::String("$PATH$-placeholder".into())
        );
    }

    #[test]
    fn includes_share_the_root_scope() {
        let (evaluation, f) = evaluate_files(
            "\
; /main.bff
#include 'sub/lib.bff'
.X = .@LibVersion
; /sub/lib.bff
.LibVersion = '1.2'",
        );
        assert_eq!(evaluation.error(), None);
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::String("1.2".into()));
    }

    #[test]
    fn once_files_are_included_a_single_time() {
        let (evaluation, f) = evaluate_files(
            "\
; /main.bff
.Counter = ''
#include 'lib.bff'
#include 'lib.bff'
.X = .@Counter
; /lib.bff
#once
.Counter + 'x'",
        );
        assert_eq!(evaluation.error(), None);
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::String("x".into()));
    }

    #[test]
    fn current_bff_dir_is_relative_to_the_root() {
        let (evaluation, f) = evaluate_files(
            "\
; /main.bff
#include 'sub/lib.bff'
.X = .@Dir
; /sub/lib.bff
.Dir = '$_CURRENT_BFF_DIR_$'",
        );
        assert_eq!(value_at(&evaluation, f.marker(0)), Value::String("sub".into()));
    }

    #[test]
    fn circular_includes_are_an_error() {
        let (db, _) = tests::multiple_files(
            "\
; /a.bff
#include 'b.bff'
; /b.bff
#include 'a.bff'",
        );
        let evaluation = db.eval();
        let error = evaluation.error().expect("expected an error");
        assert_eq!(error.message, "Circular include: a.bff");
    }

    #[test]
    fn build_functions_define_and_reference_targets() {
        let (evaluation, f) = evaluate(
            "\
Library( 'lib' )
{
}
Alias( @'all'@ )
{
    .Targets = { 'lib', 'exe' }
}",
        );
        assert_eq!(evaluation.error(), None);
        let data = evaluation.data();

        let names: Vec<_> = data
            .iter_target_definitions()
            .map(|(_, def)| def.name.clone())
            .collect();
        assert_eq!(names, vec!["lib", "all"]);

        let references = data.target_references();
        assert_eq!(references.len(), 2);
        assert_eq!(references[0].name, "lib");
        assert_eq!(references[0].definition, data.target_definition_by_name("lib"));
        assert_eq!(references[1].name, "exe");
        assert_eq!(references[1].definition, None);
        // References are located at the target name argument.
        assert_eq!(references[0].location, f.marker_range(0));
    }

    #[test]
    fn target_names_must_be_strings() {
        assert_eq!(
            error_of("Alias( 123 )\n{\n}"),
            "Target name must evaluate to a String, but it is a Integer."
        );
    }

    #[test]
    fn settings_body_is_evaluated_in_its_own_scope() {
        let (evaluation, _) = evaluate(
            "\
Settings
{
    .CachePath = '/tmp/cache'
}",
        );
        assert_eq!(evaluation.error(), None);
    }

    #[test]
    fn print_arguments_are_evaluated() {
        assert_eq!(
            error_of("Print( .Missing )"),
            "Referencing variable \"Missing\" that is not defined in the current scope or any of the parent scopes."
        );
    }

    #[test]
    fn parse_failures_surface_as_parse_errors() {
        let (db, _) = tests::single_file(".X");
        let evaluation = db.eval();
        let error = evaluation.error().expect("expected an error");
        assert_eq!(error.kind, EvalErrorKind::Parse);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let source = "\
.X = 1
.S = [ .A = .X ]
Using( .S )
ForEach( .I in { 'a', 'b' } )
{
    Print( .I )
}";
        let (db1, _) = tests::single_file(source);
        let (db2, _) = tests::single_file(source);
        assert_eq!(db1.eval(), db2.eval());
    }
}
