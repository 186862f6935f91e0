//! Typed statement tree for BFF source files.
//!
//! Every node carries the `TextRange` it was parsed from so downstream
//! consumers can attach definitions, references and errors to exact source
//! locations.

use ecow::EcoString;
use text_size::TextRange;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    VariableDefinition(VariableDefinition),
    VariableModification(VariableModification),
    Scope(ScopeBlock),
    Using(UsingStatement),
    ForEach(ForEachStatement),
    If(IfStatement),
    UserFunctionDeclaration(UserFunctionDeclaration),
    UserFunctionCall(UserFunctionCall),
    GenericFunction(GenericFunction),
    Include(IncludeDirective),
    Once(OnceDirective),
    Define(DefineDirective),
    Undefine(UndefineDirective),
    Import(ImportDirective),
    PreprocessorIf(PreprocessorIf),
}

impl Statement {
    pub fn range(&self) -> TextRange {
        match self {
            Statement::VariableDefinition(it) => it.range,
            Statement::VariableModification(it) => it.range,
            Statement::Scope(it) => it.range,
            Statement::Using(it) => it.range,
            Statement::ForEach(it) => it.range,
            Statement::If(it) => it.range,
            Statement::UserFunctionDeclaration(it) => it.range,
            Statement::UserFunctionCall(it) => it.range,
            Statement::GenericFunction(it) => it.range,
            Statement::Include(it) => it.range,
            Statement::Once(it) => it.range,
            Statement::Define(it) => it.range,
            Statement::Undefine(it) => it.range,
            Statement::Import(it) => it.range,
            Statement::PreprocessorIf(it) => it.range,
        }
    }
}

/// `.Name`, `^Name`, `."Dyn$Sub$"` or `^"Dyn$Sub$"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableName {
    pub prefix: ScopePrefix,
    pub source: NameSource,
    pub range: TextRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopePrefix {
    /// `.` — resolve in the current scope, falling back to parents on read.
    Current,
    /// `^` — resolve starting at the parent scope.
    Parent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameSource {
    Literal(EcoString),
    Dynamic(StringTemplate),
}

/// The decomposed body of a string literal: literal runs interleaved with
/// `$Var$` substitutions. Escapes are already resolved in the literal parts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringTemplate {
    pub parts: Vec<TemplatePart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(EcoString),
    Substitution(Substitution),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub name: EcoString,
    /// Covers the whole `$Name$` region inside the literal.
    pub range: TextRange,
}

impl StringTemplate {
    /// The literal text if the template contains no substitutions.
    pub fn as_literal(&self) -> Option<EcoString> {
        match self.parts.as_slice() {
            [] => Some(EcoString::new()),
            [TemplatePart::Literal(text)] => Some(text.clone()),
            _ => None,
        }
    }

    pub fn has_substitutions(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, TemplatePart::Substitution(_)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDefinition {
    pub lhs: VariableName,
    pub rhs: Rvalue,
    pub range: TextRange,
}

/// `.Name + value`, `.Name - value`, or the unnamed forms `+ value` /
/// `- value` which target the most recent assignment in the current scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableModification {
    pub lhs: Option<VariableName>,
    pub op: BinaryOp,
    pub rhs: Rvalue,
    pub range: TextRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
}

/// A sum of operand terms: `expr (+ expr | - expr)*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rvalue {
    pub first: Expr,
    pub terms: Vec<SumTerm>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumTerm {
    pub op: BinaryOp,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Boolean(BooleanLiteral),
    Integer(IntegerLiteral),
    String(StringLiteral),
    Array(ArrayLiteral),
    Struct(StructLiteral),
    Variable(VariableRef),
}

impl Expr {
    pub fn range(&self) -> TextRange {
        match self {
            Expr::Boolean(it) => it.range,
            Expr::Integer(it) => it.range,
            Expr::String(it) => it.range,
            Expr::Array(it) => it.range,
            Expr::Struct(it) => it.range,
            Expr::Variable(it) => it.name.range,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BooleanLiteral {
    pub value: bool,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegerLiteral {
    pub value: i64,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringLiteral {
    pub template: StringTemplate,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayLiteral {
    pub items: Vec<Expr>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLiteral {
    pub statements: Vec<Statement>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRef {
    pub name: VariableName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeBlock {
    pub statements: Vec<Statement>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsingStatement {
    pub value: Expr,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForEachStatement {
    pub iterators: Vec<ForEachIterator>,
    pub statements: Vec<Statement>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForEachIterator {
    pub variable: VariableName,
    pub array: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfStatement {
    pub condition: Condition,
    pub statements: Vec<Statement>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// A bare operand that must evaluate to a Boolean.
    Boolean(BooleanCondition),
    Comparison(Comparison),
    In(InExpr),
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BooleanCondition {
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    pub op: CompareOp,
    pub lhs: Expr,
    pub rhs: Expr,
    pub range: TextRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Less => "<",
            CompareOp::LessEq => "<=",
            CompareOp::Greater => ">",
            CompareOp::GreaterEq => ">=",
        }
    }
}

/// `lhs in rhs` / `lhs not in rhs`. The right-hand side is always an
/// evaluated variable, never a literal array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InExpr {
    pub lhs: Expr,
    pub rhs: VariableRef,
    pub negated: bool,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFunctionDeclaration {
    pub name: EcoString,
    pub name_range: TextRange,
    pub params: Vec<FunctionParameter>,
    pub statements: Vec<Statement>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionParameter {
    pub name: EcoString,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFunctionCall {
    pub name: EcoString,
    pub name_range: TextRange,
    pub args: Vec<Expr>,
    pub range: TextRange,
}

/// A call to one of the built-in build/utility functions (`Alias`,
/// `Library`, `Print`, `Settings`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericFunction {
    pub name: EcoString,
    pub name_range: TextRange,
    pub args: Vec<Expr>,
    pub body: Option<Vec<Statement>>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDirective {
    pub path: EcoString,
    pub path_range: TextRange,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnceDirective {
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefineDirective {
    pub symbol: EcoString,
    pub symbol_range: TextRange,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndefineDirective {
    pub symbol: EcoString,
    pub symbol_range: TextRange,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDirective {
    pub name: EcoString,
    pub name_range: TextRange,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessorIf {
    pub condition: PpCondition,
    pub then_statements: Vec<Statement>,
    pub else_statements: Vec<Statement>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PpCondition {
    Symbol(PpSymbol),
    EnvExists(PpEnvExists),
    FileExists(PpFileExists),
    Not(Box<PpCondition>),
    And(Box<PpCondition>, Box<PpCondition>),
    Or(Box<PpCondition>, Box<PpCondition>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpSymbol {
    pub name: EcoString,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpEnvExists {
    pub name: EcoString,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PpFileExists {
    pub path: EcoString,
    pub path_range: TextRange,
    pub range: TextRange,
}

/// Grammar-level description of a built-in function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinFunction {
    pub name: &'static str,
    /// The first argument names a target and registers its definition.
    pub defines_target: bool,
    /// The call may carry a `{ ... }` body.
    pub has_body: bool,
}

const BUILTIN_FUNCTIONS: &[BuiltinFunction] = &[
    BuiltinFunction { name: "Alias", defines_target: true, has_body: true },
    BuiltinFunction { name: "Compiler", defines_target: true, has_body: true },
    BuiltinFunction { name: "Copy", defines_target: true, has_body: true },
    BuiltinFunction { name: "CopyDir", defines_target: true, has_body: true },
    BuiltinFunction { name: "CSAssembly", defines_target: true, has_body: true },
    BuiltinFunction { name: "DLL", defines_target: true, has_body: true },
    BuiltinFunction { name: "Error", defines_target: false, has_body: false },
    BuiltinFunction { name: "Exec", defines_target: true, has_body: true },
    BuiltinFunction { name: "Executable", defines_target: true, has_body: true },
    BuiltinFunction { name: "Library", defines_target: true, has_body: true },
    BuiltinFunction { name: "ListDependencies", defines_target: true, has_body: true },
    BuiltinFunction { name: "ObjectList", defines_target: true, has_body: true },
    BuiltinFunction { name: "Print", defines_target: false, has_body: false },
    BuiltinFunction { name: "RemoveDir", defines_target: true, has_body: true },
    BuiltinFunction { name: "Settings", defines_target: false, has_body: true },
    BuiltinFunction { name: "Test", defines_target: true, has_body: true },
    BuiltinFunction { name: "TextFile", defines_target: true, has_body: true },
    BuiltinFunction { name: "Unity", defines_target: true, has_body: true },
    BuiltinFunction { name: "VCXProject", defines_target: true, has_body: true },
    BuiltinFunction { name: "VSProjectExternal", defines_target: true, has_body: true },
    BuiltinFunction { name: "VSSolution", defines_target: true, has_body: true },
    BuiltinFunction { name: "XCodeProject", defines_target: true, has_body: true },
];

pub fn builtin_function(name: &str) -> Option<&'static BuiltinFunction> {
    BUILTIN_FUNCTIONS.iter().find(|f| f.name == name)
}

/// Names that cannot be re-used for user functions.
pub fn is_reserved_function_name(name: &str) -> bool {
    matches!(name, "Using" | "ForEach" | "If") || builtin_function(name).is_some()
}

/// Calls `f` for every statement in `statements`, recursing into nested
/// bodies, branches and struct literals.
pub fn for_each_statement<'a>(statements: &'a [Statement], f: &mut impl FnMut(&'a Statement)) {
    for statement in statements {
        f(statement);
        match statement {
            Statement::VariableDefinition(it) => for_each_rvalue_statement(&it.rhs, f),
            Statement::VariableModification(it) => for_each_rvalue_statement(&it.rhs, f),
            Statement::Scope(it) => for_each_statement(&it.statements, f),
            Statement::Using(it) => for_each_expr_statement(&it.value, f),
            Statement::ForEach(it) => {
                for iterator in &it.iterators {
                    for_each_expr_statement(&iterator.array, f);
                }
                for_each_statement(&it.statements, f);
            }
            Statement::If(it) => for_each_statement(&it.statements, f),
            Statement::UserFunctionDeclaration(it) => for_each_statement(&it.statements, f),
            Statement::UserFunctionCall(it) => {
                for arg in &it.args {
                    for_each_expr_statement(arg, f);
                }
            }
            Statement::GenericFunction(it) => {
                for arg in &it.args {
                    for_each_expr_statement(arg, f);
                }
                if let Some(body) = &it.body {
                    for_each_statement(body, f);
                }
            }
            Statement::PreprocessorIf(it) => {
                for_each_statement(&it.then_statements, f);
                for_each_statement(&it.else_statements, f);
            }
            Statement::Include(_)
            | Statement::Once(_)
            | Statement::Define(_)
            | Statement::Undefine(_)
            | Statement::Import(_) => {}
        }
    }
}

fn for_each_rvalue_statement<'a>(rvalue: &'a Rvalue, f: &mut impl FnMut(&'a Statement)) {
    for_each_expr_statement(&rvalue.first, f);
    for term in &rvalue.terms {
        for_each_expr_statement(&term.expr, f);
    }
}

fn for_each_expr_statement<'a>(expr: &'a Expr, f: &mut impl FnMut(&'a Statement)) {
    match expr {
        Expr::Array(it) => {
            for item in &it.items {
                for_each_expr_statement(item, f);
            }
        }
        Expr::Struct(it) => for_each_statement(&it.statements, f),
        Expr::Boolean(_) | Expr::Integer(_) | Expr::String(_) | Expr::Variable(_) => {}
    }
}

/// Collects every `PpFileExists` probe reachable from `statements`,
/// including probes nested in branches that evaluation may never take.
pub fn collect_file_exists_probes(statements: &[Statement]) -> Vec<&PpFileExists> {
    let mut probes = Vec::new();
    for_each_statement(statements, &mut |statement| {
        if let Statement::PreprocessorIf(pp_if) = statement {
            collect_condition_probes(&pp_if.condition, &mut probes);
        }
    });
    probes
}

fn collect_condition_probes<'a>(condition: &'a PpCondition, probes: &mut Vec<&'a PpFileExists>) {
    match condition {
        PpCondition::FileExists(probe) => probes.push(probe),
        PpCondition::Not(inner) => collect_condition_probes(inner, probes),
        PpCondition::And(lhs, rhs) | PpCondition::Or(lhs, rhs) => {
            collect_condition_probes(lhs, probes);
            collect_condition_probes(rhs, probes);
        }
        PpCondition::Symbol(_) | PpCondition::EnvExists(_) => {}
    }
}

/// Collects every `#include` directive reachable from `statements`.
pub fn collect_includes(statements: &[Statement]) -> Vec<&IncludeDirective> {
    let mut includes = Vec::new();
    for_each_statement(statements, &mut |statement| {
        if let Statement::Include(include) = statement {
            includes.push(include);
        }
    });
    includes
}
