//! Token script: the pipe-and-bracket instruction format the robot firmware reads.
//!
//! ```text
//! |I|<flags>|S|<setup>|L|<loop>|
//! ```
//!
//! Serialization is one-way. [`validate::validate_script`] checks structure
//! (section order, balance, arity) without rebuilding an AST.

pub mod lexer;
pub mod validate;

use crate::error::CompileError;
use crate::ir::ast::{
    self, Condition, InitFlags, Program, Statement, SwitchCase, Value, VarType, format_number,
};

pub use validate::validate_script;

/// Emitted whenever a candidate script cannot be trusted.
pub const FALLBACK_SCRIPT: &str = "|I||S||L||";

/// Serializes a program into the token script format.
pub fn serialize(program: &Program) -> Result<String, CompileError> {
    let init = init_tokens(&program.init_flags);
    let setup = serialize_statements(&program.setup)?;
    let loop_body = serialize_statements(&program.loop_body)?;
    Ok(build_script(&init, &setup, &loop_body))
}

pub fn init_tokens(flags: &InitFlags) -> Vec<String> {
    flags.ordered().into_iter().map(|flag| flag.code()).collect()
}

pub fn build_script(init: &[String], setup: &[String], loop_body: &[String]) -> String {
    format!(
        "|I|{}|S|{}|L|{}|",
        init.join("|"),
        setup.join("|"),
        loop_body.join("|")
    )
}

/// Multi-line rendering for display: one token per line under each section marker.
pub fn build_pretty(init: &[String], setup: &[String], loop_body: &[String]) -> String {
    let mut lines = Vec::with_capacity(init.len() + setup.len() + loop_body.len() + 3);
    for (marker, tokens) in [("|I|", init), ("|S|", setup), ("|L|", loop_body)] {
        lines.push(marker.to_string());
        lines.extend(tokens.iter().map(|t| format!("  {}", t)));
    }
    lines.join("\n")
}

/// Wraps a body for `{...}`: `|a|b|`, or nothing for an empty list.
pub fn wrap_body(tokens: &[String]) -> String {
    if tokens.is_empty() {
        String::new()
    } else {
        format!("|{}|", tokens.join("|"))
    }
}

pub fn serialize_statements(statements: &[Statement]) -> Result<Vec<String>, CompileError> {
    statements.iter().map(serialize_statement).collect()
}

fn serialize_body(statements: &[Statement]) -> Result<String, CompileError> {
    Ok(wrap_body(&serialize_statements(statements)?))
}

pub fn serialize_statement(statement: &Statement) -> Result<String, CompileError> {
    let token = match statement {
        Statement::Command { cmd } => cmd.token(),
        Statement::Delay { ms } => format!("D{}", ms),
        Statement::SetVar { var_type, index, op, value } => format!(
            "G({},{},{},{})",
            var_type.letter(),
            index,
            op.symbol(),
            serialize_value(value, Some(*var_type))?
        ),
        Statement::If { condition, then_branch, else_branch } => format!(
            "C({}){{{}}}{{{}}}",
            serialize_condition(condition)?,
            serialize_body(then_branch)?,
            serialize_body(else_branch)?
        ),
        Statement::While { condition, body } => format!(
            "W({}){{{}}}",
            serialize_condition(condition)?,
            serialize_body(body)?
        ),
        Statement::For { start, end, step, body } => {
            format!("F({}-{},{}){{{}}}", start, end, step, serialize_body(body)?)
        }
        Statement::Switch { value, cases, default } => serialize_switch(value, cases, default)?,
        Statement::Break => "X".to_string(),
    };
    Ok(token)
}

fn serialize_switch(
    value: &Value,
    cases: &[SwitchCase],
    default: &[Statement],
) -> Result<String, CompileError> {
    let mut parts = Vec::with_capacity(cases.len() + 1);
    for case in cases {
        parts.push(format!(
            "({}){{{}}}",
            serialize_value(&case.matches, None)?,
            serialize_body(&case.body)?
        ));
    }
    parts.push(format!("(D){{{}}}", serialize_body(default)?));
    Ok(format!("K({}, {})", serialize_value(value, None)?, parts.join(" ")))
}

/// `O<op>,<left>,<right>`; literals take the type inferred across both operands.
pub fn serialize_condition(condition: &Condition) -> Result<String, CompileError> {
    let expected = comparison_type(
        literal_type(&condition.left),
        literal_type(&condition.right),
    );
    Ok(format!(
        "O{},{},{}",
        condition.op.script_symbol(),
        serialize_value(&condition.left, expected)?,
        serialize_value(&condition.right, expected)?
    ))
}

pub fn serialize_value(value: &Value, expected: Option<VarType>) -> Result<String, CompileError> {
    let token = match value {
        Value::Number(n) if n.is_finite() => format_number(*n),
        Value::Number(n) => {
            return Err(CompileError::InvalidScript {
                reason: format!("cannot serialize non-finite number {}", n),
            });
        }
        Value::Boolean(b) => (if *b { "1" } else { "0" }).to_string(),
        Value::Variable(var) => var.to_string(),
        Value::Sensor(sensor) => sensor.token().to_string(),
        Value::Text(text) => format_text_literal(text, expected),
        Value::Binary { op, left, right } => format!(
            "O{},{},{}",
            op.symbol(),
            serialize_value(left, None)?,
            serialize_value(right, None)?
        ),
    };
    Ok(token)
}

/// Character literal (`'E'`) when a single character is expected, string literal otherwise.
pub fn format_text_literal(text: &str, expected: Option<VarType>) -> String {
    let escaped = text.replace('\\', "\\\\");
    if expected == Some(VarType::Char) && escaped.chars().count() == 1 {
        return format!("'{}'", escaped.replace('\'', "\\'"));
    }
    format!("\"{}\"", escaped.replace('"', "\\\""))
}

/// Type a literal or variable would force onto a typed comparison.
pub fn literal_type(value: &Value) -> Option<VarType> {
    match value {
        Value::Number(n) => Some(number_literal_type(&format_number(*n))),
        Value::Text(text) => Some(text_literal_type(text)),
        Value::Variable(var) => Some(var.var_type),
        _ => None,
    }
}

pub fn number_literal_type(literal: &str) -> VarType {
    if literal.contains('.') { VarType::Float } else { VarType::Int }
}

pub fn text_literal_type(text: &str) -> VarType {
    if text.chars().count() == 1 { VarType::Char } else { VarType::Str }
}

/// Character beats string beats float beats untyped integer.
pub fn comparison_type(left: Option<VarType>, right: Option<VarType>) -> Option<VarType> {
    [VarType::Char, VarType::Str, VarType::Float]
        .into_iter()
        .find(|t| left == Some(*t) || right == Some(*t))
}

/// `D200`, or `D I1` when the delay is read from a variable slot.
pub fn delay_token(value: &str) -> String {
    if ast::VarRef::parse(value).is_some() {
        format!("D {}", value)
    } else {
        format!("D{}", value)
    }
}
