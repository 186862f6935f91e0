//! Recursive-descent grammar for BFF source files.

use ecow::EcoString;
use text_size::{TextRange, TextSize};

use crate::T;
use crate::ast::{
    self, ArrayLiteral, BinaryOp, BooleanCondition, BooleanLiteral, Comparison, CompareOp,
    Condition, DefineDirective, Expr, ForEachIterator, ForEachStatement, FunctionParameter,
    GenericFunction, IfStatement, ImportDirective, InExpr, IncludeDirective, IntegerLiteral,
    NameSource, OnceDirective, PpCondition, PpEnvExists, PpFileExists, PpSymbol, PreprocessorIf,
    Rvalue, ScopeBlock, ScopePrefix, Statement, StringLiteral, StringTemplate, StructLiteral,
    Substitution, SumTerm, TemplatePart, UndefineDirective, UserFunctionCall,
    UserFunctionDeclaration, UsingStatement, VariableDefinition, VariableModification,
    VariableName, VariableRef,
};
use crate::parser::Parser;
use crate::token_kind::TokenKind;

pub(crate) fn source_file(p: &mut Parser) -> Vec<Statement> {
    statements_until(p, &[])
}

fn statements_until(p: &mut Parser, terminators: &[TokenKind]) -> Vec<Statement> {
    let mut statements = Vec::new();
    while !p.eof() && !p.has_errors() && !p.at_set(terminators) {
        match statement(p) {
            Some(statement) => statements.push(statement),
            None => break,
        }
    }
    statements
}

fn statement(p: &mut Parser) -> Option<Statement> {
    match p.peek() {
        T![.] | T![^] => variable_statement(p),
        T![+] | T![-] => unnamed_modification(p),
        T!['{'] => scope_block(p),
        T![function] => user_function_declaration(p),
        TokenKind::Id => function_statement(p),
        T![#include] => include_directive(p),
        T![#once] => {
            let range = p.bump();
            Some(Statement::Once(OnceDirective { range }))
        }
        T![#define] => {
            let (symbol, symbol_range, range) = symbol_directive(p)?;
            Some(Statement::Define(DefineDirective {
                symbol,
                symbol_range,
                range,
            }))
        }
        T![#undef] => {
            let (symbol, symbol_range, range) = symbol_directive(p)?;
            Some(Statement::Undefine(UndefineDirective {
                symbol,
                symbol_range,
                range,
            }))
        }
        T![#import] => {
            let (name, name_range, range) = symbol_directive(p)?;
            Some(Statement::Import(ImportDirective {
                name,
                name_range,
                range,
            }))
        }
        T![#if] => preprocessor_if(p),
        TokenKind::Error => None,
        _ => {
            p.error_here("Expected a statement");
            None
        }
    }
}

fn variable_statement(p: &mut Parser) -> Option<Statement> {
    let lhs = variable_name(p)?;
    match p.peek() {
        T![=] => {
            p.bump();
            let rhs = rvalue(p)?;
            let range = lhs.range.cover(rhs.range);
            Some(Statement::VariableDefinition(VariableDefinition {
                lhs,
                rhs,
                range,
            }))
        }
        T![+] | T![-] => {
            let op = binary_op(p);
            p.bump();
            let rhs = rvalue(p)?;
            let range = lhs.range.cover(rhs.range);
            Some(Statement::VariableModification(VariableModification {
                lhs: Some(lhs),
                op,
                rhs,
                range,
            }))
        }
        _ => {
            p.error_here("Expected '=', '+' or '-' after a variable name");
            None
        }
    }
}

fn unnamed_modification(p: &mut Parser) -> Option<Statement> {
    let op = binary_op(p);
    let op_range = p.bump();
    let rhs = rvalue(p)?;
    let range = op_range.cover(rhs.range);
    Some(Statement::VariableModification(VariableModification {
        lhs: None,
        op,
        rhs,
        range,
    }))
}

fn binary_op(p: &Parser) -> BinaryOp {
    if p.at(T![+]) {
        BinaryOp::Add
    } else {
        BinaryOp::Subtract
    }
}

fn variable_name(p: &mut Parser) -> Option<VariableName> {
    let prefix = match p.peek() {
        T![.] => ScopePrefix::Current,
        T![^] => ScopePrefix::Parent,
        _ => {
            p.error_here("Expected '.' or '^'");
            return None;
        }
    };
    let prefix_range = p.bump();

    match p.peek() {
        TokenKind::Id => {
            let name: EcoString = p.current_text().into();
            let name_range = p.bump();
            Some(VariableName {
                prefix,
                source: NameSource::Literal(name),
                range: prefix_range.cover(name_range),
            })
        }
        TokenKind::StrVal => {
            let (template, name_range) = string_template(p)?;
            let source = match template.as_literal() {
                Some(name) => NameSource::Literal(name),
                None => NameSource::Dynamic(template),
            };
            Some(VariableName {
                prefix,
                source,
                range: prefix_range.cover(name_range),
            })
        }
        _ => {
            p.error_here("Expected a variable name");
            None
        }
    }
}

/// Decomposes the current string token into literal runs and `$Var$`
/// substitutions, resolving `^` escapes. Consumes the token.
fn string_template(p: &mut Parser) -> Option<(StringTemplate, TextRange)> {
    let raw = p.current_text();
    let token_range = p.current_range();
    // Both quote characters are one byte.
    let inner = &raw[1..raw.len() - 1];
    let base = u32::from(token_range.start()) + 1;

    let chars: Vec<(usize, char)> = inner.char_indices().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;
    while i < chars.len() {
        let (offset, c) = chars[i];
        match c {
            '^' => {
                // The lexer guarantees an escape is never the last character.
                literal.push(chars[i + 1].1);
                i += 2;
            }
            '$' => {
                let close = chars[i + 1..].iter().position(|&(_, c)| c == '$');
                let Some(close) = close else {
                    let range = TextRange::new(
                        TextSize::new(base + offset as u32),
                        token_range.end(),
                    );
                    p.error_at(range, "Unterminated variable substitution in string");
                    p.bump();
                    return None;
                };
                let close = i + 1 + close;
                let name = &inner[offset + c.len_utf8()..chars[close].0];
                let range = TextRange::new(
                    TextSize::new(base + offset as u32),
                    TextSize::new(base + chars[close].0 as u32 + 1),
                );
                if name.is_empty() {
                    p.error_at(range, "Empty variable substitution in string");
                    p.bump();
                    return None;
                }
                if !literal.is_empty() {
                    parts.push(TemplatePart::Literal(std::mem::take(&mut literal).into()));
                }
                parts.push(TemplatePart::Substitution(Substitution {
                    name: name.into(),
                    range,
                }));
                i = close + 1;
            }
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }
    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(literal.into()));
    }

    p.bump();
    Some((StringTemplate { parts }, token_range))
}

fn rvalue(p: &mut Parser) -> Option<Rvalue> {
    let first = expr(p)?;
    let mut range = first.range();
    let mut terms = Vec::new();
    while matches!(p.peek(), T![+] | T![-]) {
        let op = binary_op(p);
        p.bump();
        let term = expr(p)?;
        range = range.cover(term.range());
        terms.push(SumTerm { op, expr: term });
    }
    Some(Rvalue {
        first,
        terms,
        range,
    })
}

fn expr(p: &mut Parser) -> Option<Expr> {
    match p.peek() {
        T![true] | T![false] => {
            let value = p.at(T![true]);
            let range = p.bump();
            Some(Expr::Boolean(BooleanLiteral { value, range }))
        }
        TokenKind::IntVal => {
            let value = integer_value(p)?;
            let range = p.bump();
            Some(Expr::Integer(IntegerLiteral { value, range }))
        }
        T![-] => {
            let minus_range = p.bump();
            if !p.at(TokenKind::IntVal) {
                p.error_here("Expected an integer");
                return None;
            }
            let value = integer_value(p)?;
            let range = minus_range.cover(p.bump());
            Some(Expr::Integer(IntegerLiteral {
                value: -value,
                range,
            }))
        }
        TokenKind::StrVal => {
            let (template, range) = string_template(p)?;
            Some(Expr::String(StringLiteral { template, range }))
        }
        T!['{'] => array_literal(p),
        T!['['] => struct_literal(p),
        T![.] | T![^] => {
            let name = variable_name(p)?;
            Some(Expr::Variable(VariableRef { name }))
        }
        _ => {
            p.error_here("Expected a value");
            None
        }
    }
}

fn integer_value(p: &mut Parser) -> Option<i64> {
    match p.current_text().parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) => {
            p.error_here("Integer literal is too large");
            None
        }
    }
}

fn array_literal(p: &mut Parser) -> Option<Expr> {
    let start = p.bump();
    let mut items = Vec::new();
    while !p.eof() && !p.has_errors() && !p.at(T!['}']) {
        items.push(expr(p)?);
        p.eat_if(T![,]);
    }
    let end = p.expect(T!['}'], "Expected '}' to close an array")?;
    Some(Expr::Array(ArrayLiteral {
        items,
        range: start.cover(end),
    }))
}

fn struct_literal(p: &mut Parser) -> Option<Expr> {
    let start = p.bump();
    let statements = statements_until(p, &[T![']']]);
    let end = p.expect(T![']'], "Expected ']' to close a struct")?;
    Some(Expr::Struct(StructLiteral {
        statements,
        range: start.cover(end),
    }))
}

fn scope_block(p: &mut Parser) -> Option<Statement> {
    let start = p.bump();
    let statements = statements_until(p, &[T!['}']]);
    let end = p.expect(T!['}'], "Expected '}' to close a scope")?;
    Some(Statement::Scope(ScopeBlock {
        statements,
        range: start.cover(end),
    }))
}

fn function_statement(p: &mut Parser) -> Option<Statement> {
    match p.current_text() {
        "Using" => using_statement(p),
        "ForEach" => for_each_statement(p),
        "If" => if_statement(p),
        name => match ast::builtin_function(name) {
            Some(builtin) => generic_function(p, builtin.has_body),
            None => user_function_call(p),
        },
    }
}

fn using_statement(p: &mut Parser) -> Option<Statement> {
    let start = p.bump();
    p.expect(T!['('], "Expected '(' after Using")?;
    let value = expr(p)?;
    let end = p.expect(T![')'], "Expected ')'")?;
    Some(Statement::Using(UsingStatement {
        value,
        range: start.cover(end),
    }))
}

fn for_each_statement(p: &mut Parser) -> Option<Statement> {
    let start = p.bump();
    p.expect(T!['('], "Expected '(' after ForEach")?;
    let mut iterators = Vec::new();
    loop {
        let variable = variable_name(p)?;
        p.expect(T![in], "Expected 'in'")?;
        let array = expr(p)?;
        iterators.push(ForEachIterator { variable, array });
        if !p.eat_if(T![,]) {
            break;
        }
    }
    p.expect(T![')'], "Expected ')'")?;
    p.expect(T!['{'], "Expected '{' to open the ForEach body")?;
    let statements = statements_until(p, &[T!['}']]);
    let end = p.expect(T!['}'], "Expected '}' to close the ForEach body")?;
    Some(Statement::ForEach(ForEachStatement {
        iterators,
        statements,
        range: start.cover(end),
    }))
}

fn if_statement(p: &mut Parser) -> Option<Statement> {
    let start = p.bump();
    p.expect(T!['('], "Expected '(' after If")?;
    let condition = condition(p)?;
    p.expect(T![')'], "Expected ')'")?;
    p.expect(T!['{'], "Expected '{' to open the If body")?;
    let statements = statements_until(p, &[T!['}']]);
    let end = p.expect(T!['}'], "Expected '}' to close the If body")?;
    Some(Statement::If(IfStatement {
        condition,
        statements,
        range: start.cover(end),
    }))
}

fn condition(p: &mut Parser) -> Option<Condition> {
    or_condition(p)
}

fn or_condition(p: &mut Parser) -> Option<Condition> {
    let mut lhs = and_condition(p)?;
    while p.eat_if(T![||]) {
        let rhs = and_condition(p)?;
        lhs = Condition::Or(Box::new(lhs), Box::new(rhs));
    }
    Some(lhs)
}

fn and_condition(p: &mut Parser) -> Option<Condition> {
    let mut lhs = unary_condition(p)?;
    while p.eat_if(T![&&]) {
        let rhs = unary_condition(p)?;
        lhs = Condition::And(Box::new(lhs), Box::new(rhs));
    }
    Some(lhs)
}

fn unary_condition(p: &mut Parser) -> Option<Condition> {
    match p.peek() {
        T![!] => {
            p.bump();
            let inner = unary_condition(p)?;
            Some(Condition::Not(Box::new(inner)))
        }
        T!['('] => {
            p.bump();
            let inner = or_condition(p)?;
            p.expect(T![')'], "Expected ')'")?;
            Some(inner)
        }
        _ => comparison_or_operand(p),
    }
}

fn comparison_or_operand(p: &mut Parser) -> Option<Condition> {
    let lhs = expr(p)?;

    if p.peek().is_comparison_operator() {
        let op = match p.peek() {
            T![==] => CompareOp::Eq,
            T![!=] => CompareOp::NotEq,
            T![<] => CompareOp::Less,
            T![<=] => CompareOp::LessEq,
            T![>] => CompareOp::Greater,
            _ => CompareOp::GreaterEq,
        };
        p.bump();
        let rhs = expr(p)?;
        let range = lhs.range().cover(rhs.range());
        return Some(Condition::Comparison(Comparison {
            op,
            lhs,
            rhs,
            range,
        }));
    }

    if matches!(p.peek(), T![in] | T![not]) {
        let negated = p.eat_if(T![not]);
        if negated && !p.at(T![in]) {
            p.error_here("Expected 'in' after 'not'");
            return None;
        }
        p.bump();
        if matches!(lhs, Expr::Array(_)) {
            p.error_at(
                lhs.range(),
                "Left-hand side of 'in' must be a String or an Array of Strings variable",
            );
            return None;
        }
        if !matches!(p.peek(), T![.] | T![^]) {
            p.error_here("Expected an evaluated variable after 'in'");
            return None;
        }
        let name = variable_name(p)?;
        let range = lhs.range().cover(name.range);
        return Some(Condition::In(InExpr {
            lhs,
            rhs: VariableRef { name },
            negated,
            range,
        }));
    }

    Some(Condition::Boolean(BooleanCondition { expr: lhs }))
}

fn user_function_declaration(p: &mut Parser) -> Option<Statement> {
    let start = p.bump();
    if !p.at(TokenKind::Id) {
        p.error_here("Expected a function name");
        return None;
    }
    let name: EcoString = p.current_text().into();
    let name_range = p.bump();

    p.expect(T!['('], "Expected '(' after the function name")?;
    let mut params = Vec::new();
    while p.at(T![.]) {
        let dot_range = p.bump();
        if !p.at(TokenKind::Id) {
            p.error_here("Expected a parameter name");
            return None;
        }
        let param_name: EcoString = p.current_text().into();
        let param_range = dot_range.cover(p.bump());
        params.push(FunctionParameter {
            name: param_name,
            range: param_range,
        });
        p.eat_if(T![,]);
    }
    p.expect(T![')'], "Expected ')'")?;

    p.expect(T!['{'], "Expected '{' to open the function body")?;
    let statements = statements_until(p, &[T!['}']]);
    let end = p.expect(T!['}'], "Expected '}' to close the function body")?;
    Some(Statement::UserFunctionDeclaration(UserFunctionDeclaration {
        name,
        name_range,
        params,
        statements,
        range: start.cover(end),
    }))
}

fn user_function_call(p: &mut Parser) -> Option<Statement> {
    let name: EcoString = p.current_text().into();
    let name_range = p.bump();

    p.expect(T!['('], "Expected '(' after the function name")?;
    let mut args = Vec::new();
    while !p.eof() && !p.has_errors() && !p.at(T![')']) {
        args.push(expr(p)?);
        p.eat_if(T![,]);
    }
    let end = p.expect(T![')'], "Expected ')'")?;
    Some(Statement::UserFunctionCall(UserFunctionCall {
        name,
        name_range,
        args,
        range: name_range.cover(end),
    }))
}

fn generic_function(p: &mut Parser, has_body: bool) -> Option<Statement> {
    let name: EcoString = p.current_text().into();
    let name_range = p.bump();
    let mut end = name_range;

    let mut args = Vec::new();
    if p.eat_if(T!['(']) {
        while !p.eof() && !p.has_errors() && !p.at(T![')']) {
            args.push(expr(p)?);
            p.eat_if(T![,]);
        }
        end = p.expect(T![')'], "Expected ')'")?;
    }

    let body = if has_body && p.at(T!['{']) {
        p.bump();
        let statements = statements_until(p, &[T!['}']]);
        end = p.expect(T!['}'], "Expected '}' to close the function body")?;
        Some(statements)
    } else {
        None
    };

    Some(Statement::GenericFunction(GenericFunction {
        name,
        name_range,
        args,
        body,
        range: name_range.cover(end),
    }))
}

fn include_directive(p: &mut Parser) -> Option<Statement> {
    let start = p.bump();
    if !p.at(TokenKind::StrVal) {
        p.error_here("Expected a file path string after #include");
        return None;
    }
    let (template, path_range) = string_template(p)?;
    let Some(path) = template.as_literal() else {
        p.error_at(path_range, "Include path cannot contain variable substitutions");
        return None;
    };
    Some(Statement::Include(IncludeDirective {
        path,
        path_range,
        range: start.cover(path_range),
    }))
}

fn symbol_directive(p: &mut Parser) -> Option<(EcoString, TextRange, TextRange)> {
    let start = p.bump();
    if !p.at(TokenKind::Id) {
        p.error_here("Expected a symbol name");
        return None;
    }
    let symbol: EcoString = p.current_text().into();
    let symbol_range = p.bump();
    Some((symbol, symbol_range, start.cover(symbol_range)))
}

fn preprocessor_if(p: &mut Parser) -> Option<Statement> {
    let start = p.bump();
    let condition = pp_condition(p)?;
    let then_statements = statements_until(p, &[T![#else], T![#endif]]);
    let else_statements = if p.eat_if(T![#else]) {
        statements_until(p, &[T![#endif]])
    } else {
        Vec::new()
    };
    let end = p.expect(T![#endif], "Expected #endif")?;
    Some(Statement::PreprocessorIf(PreprocessorIf {
        condition,
        then_statements,
        else_statements,
        range: start.cover(end),
    }))
}

fn pp_condition(p: &mut Parser) -> Option<PpCondition> {
    pp_or_condition(p)
}

fn pp_or_condition(p: &mut Parser) -> Option<PpCondition> {
    let mut lhs = pp_and_condition(p)?;
    while p.eat_if(T![||]) {
        let rhs = pp_and_condition(p)?;
        lhs = PpCondition::Or(Box::new(lhs), Box::new(rhs));
    }
    Some(lhs)
}

fn pp_and_condition(p: &mut Parser) -> Option<PpCondition> {
    let mut lhs = pp_unary_condition(p)?;
    while p.eat_if(T![&&]) {
        let rhs = pp_unary_condition(p)?;
        lhs = PpCondition::And(Box::new(lhs), Box::new(rhs));
    }
    Some(lhs)
}

fn pp_unary_condition(p: &mut Parser) -> Option<PpCondition> {
    match p.peek() {
        T![!] => {
            p.bump();
            let inner = pp_unary_condition(p)?;
            Some(PpCondition::Not(Box::new(inner)))
        }
        T!['('] => {
            p.bump();
            let inner = pp_or_condition(p)?;
            p.expect(T![')'], "Expected ')'")?;
            Some(inner)
        }
        TokenKind::Id => match p.current_text() {
            "exists" => {
                let start = p.bump();
                p.expect(T!['('], "Expected '(' after exists")?;
                if !p.at(TokenKind::Id) {
                    p.error_here("Expected an environment variable name");
                    return None;
                }
                let name: EcoString = p.current_text().into();
                p.bump();
                let end = p.expect(T![')'], "Expected ')'")?;
                Some(PpCondition::EnvExists(PpEnvExists {
                    name,
                    range: start.cover(end),
                }))
            }
            "file_exists" => {
                let start = p.bump();
                p.expect(T!['('], "Expected '(' after file_exists")?;
                if !p.at(TokenKind::StrVal) {
                    p.error_here("Expected a file path string");
                    return None;
                }
                let (template, path_range) = string_template(p)?;
                let Some(path) = template.as_literal() else {
                    p.error_at(path_range, "File path cannot contain variable substitutions");
                    return None;
                };
                let end = p.expect(T![')'], "Expected ')'")?;
                Some(PpCondition::FileExists(PpFileExists {
                    path,
                    path_range,
                    range: start.cover(end),
                }))
            }
            _ => {
                let name: EcoString = p.current_text().into();
                let range = p.bump();
                Some(PpCondition::Symbol(PpSymbol { name, range }))
            }
        },
        _ => {
            p.error_here("Expected a preprocessor expression");
            None
        }
    }
}
