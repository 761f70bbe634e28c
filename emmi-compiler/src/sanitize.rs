//! Sanitizer for program documents coming from the generator.
//!
//! Input is untrusted JSON. Nothing here fails: every malformed fragment is
//! replaced by a safe default and reported as a warning prefixed with its path
//! (`setup[2].then[0].expr.left`). Init flags are re-derived from the
//! statements that survive; claimed flags only contribute wireless links.

use serde::Serialize;
use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::ir::ast::{
    ArithOp, AssignOp, Comparator, Condition, InitFlag, InitFlags, MAX_SLOTS, Program, Statement,
    SwitchCase, Value, VarType,
};
use crate::ir::command::Command;

pub const MAX_DEPTH: usize = 6;
pub const MAX_SIBLINGS: usize = 200;
pub const MAX_TEXT_LEN: usize = 120;
pub const MAX_CASES: usize = 12;
pub const MAX_EXPLANATION_LEN: usize = 500;

/// Characters that would break the `R"<name>"` init token.
const WIRELESS_RESERVED: [char; 9] = ['|', '(', ')', '{', '}', ',', '"', '\'', '\\'];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sanitized {
    pub program: Program,
    pub warnings: Vec<String>,
}

/// A full generator reply: `{program, explanation, warnings}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SanitizedDocument {
    pub program: Program,
    pub explanation: Option<String>,
    pub warnings: Vec<String>,
}

pub fn sanitize_program(raw: &Json) -> Sanitized {
    let mut sanitizer = Sanitizer::default();
    let program = sanitizer.program(raw);
    debug!(warnings = sanitizer.warnings.len(), "sanitized program");
    Sanitized { program, warnings: sanitizer.warnings }
}

/// Accepts either the `{program, explanation, warnings}` envelope or a bare
/// program object. Claimed warnings are appended after the sanitizer's own.
pub fn sanitize_document(raw: &Json) -> SanitizedDocument {
    let (program_raw, envelope) = match raw.get("program") {
        Some(program) if program.is_object() => (program, true),
        _ => (raw, false),
    };
    let Sanitized { program, mut warnings } = sanitize_program(program_raw);

    let mut explanation = None;
    if envelope {
        if let Some(text) = raw.get("explanation").and_then(Json::as_str) {
            let (text, truncated) = truncate_chars(text.trim(), MAX_EXPLANATION_LEN);
            if truncated {
                warnings.push(format!("explanation: truncated to {} chars.", MAX_EXPLANATION_LEN));
            }
            explanation = Some(text);
        }
        if let Some(claimed) = raw.get("warnings").and_then(Json::as_array) {
            warnings.extend(claimed.iter().map(|warning| match warning {
                Json::String(text) => text.clone(),
                other => other.to_string(),
            }));
        }
    }

    SanitizedDocument { program, explanation, warnings }
}

/// Flags implied by the commands and sensor reads of both sections.
pub fn infer_init_flags(setup: &[Statement], loop_body: &[Statement]) -> InitFlags {
    let mut flags = InitFlags::new();
    for statement in setup.iter().chain(loop_body) {
        scan_statement(statement, &mut flags);
    }
    flags
}

fn scan_statement(statement: &Statement, flags: &mut InitFlags) {
    match statement {
        Statement::Command { cmd } => {
            flags.insert(cmd.init_flag());
        }
        Statement::SetVar { value, .. } => scan_value(value, flags),
        Statement::If { condition, then_branch, else_branch } => {
            scan_condition(condition, flags);
            for inner in then_branch.iter().chain(else_branch) {
                scan_statement(inner, flags);
            }
        }
        Statement::While { condition, body } => {
            scan_condition(condition, flags);
            for inner in body {
                scan_statement(inner, flags);
            }
        }
        Statement::For { body, .. } => {
            for inner in body {
                scan_statement(inner, flags);
            }
        }
        Statement::Switch { value, cases, default } => {
            scan_value(value, flags);
            for case in cases {
                scan_value(&case.matches, flags);
                for inner in &case.body {
                    scan_statement(inner, flags);
                }
            }
            for inner in default {
                scan_statement(inner, flags);
            }
        }
        Statement::Delay { .. } | Statement::Break => {}
    }
}

fn scan_condition(condition: &Condition, flags: &mut InitFlags) {
    scan_value(&condition.left, flags);
    scan_value(&condition.right, flags);
}

fn scan_value(value: &Value, flags: &mut InitFlags) {
    match value {
        Value::Sensor(sensor) => {
            flags.insert(sensor.init_flag());
        }
        Value::Binary { left, right, .. } => {
            scan_value(left, flags);
            scan_value(right, flags);
        }
        _ => {}
    }
}

#[derive(Default)]
struct Sanitizer {
    warnings: Vec<String>,
}

impl Sanitizer {
    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }

    fn program(&mut self, raw: &Json) -> Program {
        if !raw.is_object() {
            self.warn("program: expected an object, using an empty program.".to_string());
        }
        let wireless = self.claimed_flags(raw.get("initFlags"));
        let setup = self.statements(raw.get("setup"), 0, "setup");
        let loop_body = self.statements(raw.get("loop"), 0, "loop");

        let mut init_flags = infer_init_flags(&setup, &loop_body);
        for flag in wireless {
            init_flags.insert(flag);
        }
        Program { init_flags, setup, loop_body }
    }

    /// Keeps wireless links only; hardware flags get re-derived.
    fn claimed_flags(&mut self, raw: Option<&Json>) -> Vec<InitFlag> {
        let Some(list) = raw.and_then(Json::as_array) else {
            return Vec::new();
        };
        let mut wireless = Vec::new();
        for entry in list {
            let Some(code) = entry.as_str().map(str::trim) else {
                self.warn(format!("Dropped unsupported init flag: {}", entry));
                continue;
            };
            if code.is_empty() {
                continue;
            }
            match InitFlag::parse(code) {
                Some(InitFlag::Wireless(name)) => {
                    if let Some(name) = self.wireless_name(&name) {
                        wireless.push(InitFlag::Wireless(name));
                    }
                }
                Some(_) => {}
                None => self.warn(format!("Dropped unsupported init flag: {}", code)),
            }
        }
        wireless
    }

    fn wireless_name(&mut self, name: &str) -> Option<String> {
        let cleaned: String = name
            .chars()
            .filter(|c| !c.is_control() && !WIRELESS_RESERVED.contains(c))
            .collect();
        if cleaned != name {
            self.warn(format!("initFlags: reserved characters removed from wireless name \"{}\".", cleaned));
        }
        let (cleaned, truncated) = truncate_chars(cleaned.trim(), MAX_TEXT_LEN);
        if truncated {
            self.warn(format!("initFlags: wireless name truncated to {} chars.", MAX_TEXT_LEN));
        }
        if cleaned.is_empty() {
            self.warn("initFlags: dropped wireless flag with an empty name.".to_string());
            return None;
        }
        Some(cleaned)
    }

    fn statements(&mut self, raw: Option<&Json>, depth: usize, path: &str) -> Vec<Statement> {
        let source: &[Json] = match raw {
            Some(Json::Array(items)) => items.as_slice(),
            None | Some(Json::Null) => &[],
            Some(_) => {
                self.warn(format!("{}: expected a list, ignored.", path));
                &[]
            }
        };
        if depth > MAX_DEPTH {
            if !source.is_empty() {
                self.warn(format!("{}: maximum nesting depth exceeded.", path));
            }
            return Vec::new();
        }

        let mut output = Vec::new();
        // the cap counts kept statements, not raw entries
        for (i, item) in source.iter().enumerate() {
            if output.len() >= MAX_SIBLINGS {
                break;
            }
            let item_path = format!("{}[{}]", path, i);
            if let Some(statement) = self.statement(item, depth, &item_path) {
                output.push(statement);
            }
        }
        if source.len() > MAX_SIBLINGS {
            self.warn(format!("{}: node list trimmed to {} entries.", path, MAX_SIBLINGS));
        }
        output
    }

    fn statement(&mut self, item: &Json, depth: usize, path: &str) -> Option<Statement> {
        if !item.is_object() {
            self.warn(format!("{}: skipped invalid node.", path));
            return None;
        }
        let kind = item.get("type").and_then(Json::as_str).map(str::trim).unwrap_or("");

        match kind {
            "cmd" => self.command(item, path),
            "delay" => Some(Statement::Delay { ms: self.delay_ms(item.get("ms"), path) }),
            "set_var" => Some(self.set_var(item, path)),
            "if" => Some(Statement::If {
                condition: self.condition(item.get("expr"), &format!("{}.expr", path)),
                then_branch: self.statements(item.get("then"), depth + 1, &format!("{}.then", path)),
                else_branch: self.statements(item.get("else"), depth + 1, &format!("{}.else", path)),
            }),
            "while" => Some(Statement::While {
                condition: self.condition(item.get("expr"), &format!("{}.expr", path)),
                body: self.statements(item.get("body"), depth + 1, &format!("{}.body", path)),
            }),
            "for" => Some(self.for_loop(item, depth, path)),
            "switch" => Some(self.switch(item, depth, path)),
            "break" => Some(Statement::Break),
            other => {
                self.warn(format!("{}: unsupported node type \"{}\" skipped.", path, other));
                None
            }
        }
    }

    fn command(&mut self, item: &Json, path: &str) -> Option<Statement> {
        let token = item.get("cmd").and_then(Json::as_str).map(str::trim).unwrap_or("");
        if token.is_empty() {
            self.warn(format!("{}: cmd missing token.", path));
            return None;
        }
        match Command::parse(token).or_else(|| Command::parse(&token.to_uppercase())) {
            Some(cmd) => Some(Statement::Command { cmd }),
            None => {
                self.warn(format!("{}: unknown command \"{}\" skipped.", path, token));
                None
            }
        }
    }

    fn delay_ms(&mut self, raw: Option<&Json>, path: &str) -> u64 {
        let Some(ms) = number_of(raw) else {
            self.warn(format!("{}.ms: invalid delay, replaced with 0.", path));
            return 0;
        };
        if ms < 0.0 {
            self.warn(format!("{}.ms: negative delay clamped to 0.", path));
            return 0;
        }
        ms.round() as u64
    }

    fn set_var(&mut self, item: &Json, path: &str) -> Statement {
        let var_type = match item.get("varType") {
            None | Some(Json::Null) => VarType::Int,
            Some(raw) => match raw.as_str().and_then(parse_var_type) {
                Some(var_type) => var_type,
                None => {
                    self.warn(format!("{}.varType: unsupported type {}, replaced with I.", path, raw));
                    VarType::Int
                }
            },
        };

        let index = match number_of(item.get("index")) {
            Some(raw) => {
                let rounded = raw.round();
                let clamped = rounded.clamp(1.0, f64::from(MAX_SLOTS));
                if clamped != rounded {
                    self.warn(format!("{}.index: {} clamped to {}.", path, raw, clamped));
                }
                clamped as u8
            }
            None => {
                if item.get("index").is_some_and(|v| !v.is_null()) {
                    self.warn(format!("{}.index: invalid index, replaced with 1.", path));
                }
                1
            }
        };

        let op = match item.get("op").and_then(Json::as_str).map(str::trim) {
            Some("+") => AssignOp::Increment,
            Some("=") | None => AssignOp::Set,
            Some(other) => {
                self.warn(format!("{}.op: unsupported op \"{}\", replaced with =.", path, other));
                AssignOp::Set
            }
        };

        let value = self.scalar(item.get("value"), &format!("{}.value", path), 0);
        Statement::SetVar { var_type, index, op, value }
    }

    fn for_loop(&mut self, item: &Json, depth: usize, path: &str) -> Statement {
        let start = self.integer(item.get("start"), 0, &format!("{}.start", path));
        let end = self.integer(item.get("end"), 0, &format!("{}.end", path));
        let mut step = self.integer(item.get("step"), 1, &format!("{}.step", path));
        if step == 0 {
            self.warn(format!("{}.step: step 0 replaced with 1.", path));
            step = 1;
        }
        let body = self.statements(item.get("body"), depth + 1, &format!("{}.body", path));
        Statement::For { start, end, step, body }
    }

    fn switch(&mut self, item: &Json, depth: usize, path: &str) -> Statement {
        let value = self.scalar(item.get("value"), &format!("{}.value", path), 0);

        let raw_cases: &[Json] = match item.get("cases") {
            Some(Json::Array(cases)) => cases.as_slice(),
            _ => &[],
        };
        if raw_cases.len() > MAX_CASES {
            self.warn(format!("{}.cases: case list trimmed to {} entries.", path, MAX_CASES));
        }
        let mut cases = Vec::with_capacity(raw_cases.len().min(MAX_CASES));
        for (idx, entry) in raw_cases.iter().take(MAX_CASES).enumerate() {
            let case_path = format!("{}.cases[{}]", path, idx);
            let matches = self.scalar(entry.get("match"), &format!("{}.match", case_path), 0);
            let body = self.statements(entry.get("body"), depth + 1, &format!("{}.body", case_path));
            cases.push(SwitchCase { matches, body });
        }

        let default = self.statements(item.get("default"), depth + 1, &format!("{}.default", path));
        Statement::Switch { value, cases, default }
    }

    fn condition(&mut self, raw: Option<&Json>, path: &str) -> Condition {
        let Some(expr) = raw.filter(|e| e.is_object()) else {
            self.warn(format!("{}: invalid expression, replaced with 1==0.", path));
            return Condition::new(Comparator::Equal, Value::number(1), Value::number(0));
        };

        let symbol = expr.get("op").and_then(Json::as_str).map(str::trim).unwrap_or("");
        let op = match Comparator::parse(symbol) {
            Some(op) => op,
            None => {
                self.warn(format!("{}: unsupported op \"{}\", replaced with ==.", path, symbol));
                Comparator::Equal
            }
        };
        let left = self.scalar(expr.get("left"), &format!("{}.left", path), 0);
        let right = self.scalar(expr.get("right"), &format!("{}.right", path), 0);
        Condition::new(op, left, right)
    }

    fn scalar(&mut self, raw: Option<&Json>, path: &str, depth: usize) -> Value {
        match raw {
            Some(Json::Number(n)) => match n.as_f64() {
                Some(f) if f.is_finite() => Value::Number(f),
                _ => self.unsupported_value(path),
            },
            Some(Json::Bool(b)) => Value::Boolean(*b),
            Some(Json::String(s)) => {
                let (text, truncated) = truncate_chars(s.trim(), MAX_TEXT_LEN);
                if truncated {
                    self.warn(format!("{}: string truncated to {} chars.", path, MAX_TEXT_LEN));
                }
                Value::from_token(&text)
            }
            Some(Json::Object(map)) => self.binary(map, path, depth),
            _ => self.unsupported_value(path),
        }
    }

    /// `{op: + - * /, left, right}`
    fn binary(&mut self, map: &Map<String, Json>, path: &str, depth: usize) -> Value {
        if depth >= MAX_DEPTH {
            self.warn(format!("{}: expression nesting too deep, replaced with 0.", path));
            return Value::number(0);
        }
        let symbol = map.get("op").and_then(Json::as_str).map(str::trim).unwrap_or("");
        let Some(op) = ArithOp::parse(symbol) else {
            self.warn(format!("{}: unsupported arithmetic op \"{}\", replaced with 0.", path, symbol));
            return Value::number(0);
        };
        let left = self.scalar(map.get("left"), &format!("{}.left", path), depth + 1);
        let right = self.scalar(map.get("right"), &format!("{}.right", path), depth + 1);
        Value::Binary { op, left: Box::new(left), right: Box::new(right) }
    }

    fn unsupported_value(&mut self, path: &str) -> Value {
        self.warn(format!("{}: unsupported value type, replaced with 0.", path));
        Value::number(0)
    }

    fn integer(&mut self, raw: Option<&Json>, default: i64, path: &str) -> i64 {
        match raw {
            None | Some(Json::Null) => default,
            Some(value) => match number_of(Some(value)) {
                Some(n) => n.round() as i64,
                None => {
                    self.warn(format!("{}: invalid number, replaced with {}.", path, default));
                    default
                }
            },
        }
    }
}

/// Numbers and numeric strings.
fn number_of(raw: Option<&Json>) -> Option<f64> {
    match raw? {
        Json::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Json::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn parse_var_type(raw: &str) -> Option<VarType> {
    let upper = raw.trim().to_uppercase();
    let mut chars = upper.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) => VarType::from_letter(letter),
        _ => None,
    }
}

fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((cut, _)) => (text[..cut].to_string(), true),
        None => (text.to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ast::{Sensor, VarRef};
    use serde_json::json;

    fn codes(flags: &InitFlags) -> Vec<String> {
        flags.ordered().iter().map(|f| f.code()).collect()
    }

    #[test]
    fn zero_step_becomes_one() {
        let raw = json!({"loop": [{"type": "for", "start": 0, "end": 5, "step": 0, "body": []}]});
        let result = sanitize_program(&raw);
        assert_eq!(
            result.program.loop_body,
            vec![Statement::For { start: 0, end: 5, step: 1, body: vec![] }]
        );
        assert_eq!(result.warnings, vec!["loop[0].step: step 0 replaced with 1.".to_string()]);
    }

    #[test]
    fn deep_nesting_is_truncated() {
        fn nested(levels: usize) -> Json {
            if levels == 0 {
                return json!({"type": "cmd", "cmd": "ERN"});
            }
            json!({
                "type": "if",
                "expr": {"op": "==", "left": 1, "right": 1},
                "then": [nested(levels - 1)],
                "else": []
            })
        }

        fn if_depth(statements: &[Statement]) -> usize {
            match statements.first() {
                Some(Statement::If { then_branch, .. }) => 1 + if_depth(then_branch),
                _ => 0,
            }
        }

        let result = sanitize_program(&json!({"loop": [nested(9)]}));
        assert_eq!(if_depth(&result.program.loop_body), 7);
        assert!(result.program.init_flags.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].ends_with(".then: maximum nesting depth exceeded."));
    }

    #[test]
    fn long_sibling_lists_are_trimmed() {
        let nodes: Vec<Json> = (0..250).map(|_| json!({"type": "delay", "ms": 1})).collect();
        let result = sanitize_program(&json!({"setup": nodes}));
        assert_eq!(result.program.setup.len(), MAX_SIBLINGS);
        assert_eq!(result.warnings, vec!["setup: node list trimmed to 200 entries.".to_string()]);
    }

    #[test]
    fn dropped_nodes_do_not_count_against_the_cap() {
        let mut nodes: Vec<Json> = (0..10).map(|_| json!({"type": "teleport"})).collect();
        nodes.extend((0..MAX_SIBLINGS).map(|_| json!({"type": "cmd", "cmd": "MS"})));
        let result = sanitize_program(&json!({"loop": nodes}));
        assert_eq!(result.program.loop_body.len(), MAX_SIBLINGS);
        assert!(result.warnings.contains(&"loop: node list trimmed to 200 entries.".to_string()));
        assert_eq!(result.warnings.len(), 11);
    }

    #[test]
    fn unknown_nodes_are_dropped_but_siblings_survive() {
        let raw = json!({"loop": [
            {"type": "teleport"},
            42,
            {"type": "cmd", "cmd": "ZAP"},
            {"type": "cmd", "cmd": " egn "},
            {"type": "break"}
        ]});
        let result = sanitize_program(&raw);
        assert_eq!(
            result.program.loop_body,
            vec![Statement::Command { cmd: Command::EyeGreenOn }, Statement::Break]
        );
        assert_eq!(
            result.warnings,
            vec![
                "loop[0]: unsupported node type \"teleport\" skipped.".to_string(),
                "loop[1]: skipped invalid node.".to_string(),
                "loop[2]: unknown command \"ZAP\" skipped.".to_string(),
            ]
        );
    }

    #[test]
    fn expressions_and_scalars_are_coerced() {
        let raw = json!({"loop": [{
            "type": "while",
            "expr": {"op": "=~", "left": "TR", "right": [1]},
            "body": []
        }]});
        let result = sanitize_program(&raw);
        assert_eq!(
            result.program.loop_body,
            vec![Statement::While {
                condition: Condition::new(Comparator::Equal, Value::Sensor(Sensor::Touch), Value::number(0)),
                body: vec![],
            }]
        );
        assert_eq!(
            result.warnings,
            vec![
                "loop[0].expr: unsupported op \"=~\", replaced with ==.".to_string(),
                "loop[0].expr.right: unsupported value type, replaced with 0.".to_string(),
            ]
        );

        let result = sanitize_program(&json!({"loop": [{"type": "if", "then": []}]}));
        assert!(matches!(
            &result.program.loop_body[0],
            Statement::If { condition, .. } if *condition == Condition::new(Comparator::Equal, Value::number(1), Value::number(0))
        ));
    }

    #[test]
    fn set_var_fields_are_clamped() {
        let raw = json!({"setup": [
            {"type": "set_var", "varType": "q", "index": 9, "op": "+", "value": "F2"},
            {"type": "set_var", "varType": "c", "index": 0.4, "value": "'E'"}
        ]});
        let result = sanitize_program(&raw);
        assert_eq!(
            result.program.setup,
            vec![
                Statement::SetVar {
                    var_type: VarType::Int,
                    index: 5,
                    op: AssignOp::Increment,
                    value: Value::Variable(VarRef { var_type: VarType::Float, slot: 2 }),
                },
                Statement::SetVar {
                    var_type: VarType::Char,
                    index: 1,
                    op: AssignOp::Set,
                    value: Value::Text("E".into()),
                },
            ]
        );
        assert_eq!(result.warnings.len(), 3);
    }

    #[test]
    fn strings_are_truncated() {
        let long = "x".repeat(130);
        let raw = json!({"setup": [{"type": "set_var", "varType": "S", "index": 1, "value": long}]});
        let result = sanitize_program(&raw);
        match &result.program.setup[0] {
            Statement::SetVar { value: Value::Text(text), .. } => assert_eq!(text.len(), MAX_TEXT_LEN),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(result.warnings, vec!["setup[0].value: string truncated to 120 chars.".to_string()]);
    }

    #[test]
    fn binary_values_are_accepted() {
        let raw = json!({"setup": [{
            "type": "set_var", "varType": "I", "index": 1,
            "value": {"op": "+", "left": "I1", "right": {"op": "*", "left": "AR", "right": 2}}
        }]});
        let result = sanitize_program(&raw);
        assert!(result.warnings.is_empty());
        assert_eq!(codes(&result.program.init_flags), vec!["A"]);
    }

    #[test]
    fn flags_are_derived_not_trusted() {
        let raw = json!({
            "initFlags": ["M", "B", "X", "R\"EMMI\"", 7],
            "setup": [],
            "loop": [
                {"type": "if", "expr": {"op": ">", "left": "VR", "right": 100},
                 "then": [{"type": "cmd", "cmd": "ERN"}], "else": []},
                {"type": "switch", "value": "TR", "cases": [{"match": 1, "body": [{"type": "cmd", "cmd": "BS"}]}]}
            ]
        });
        let result = sanitize_program(&raw);
        assert_eq!(codes(&result.program.init_flags), vec!["E", "B", "T", "V", "R\"EMMI\""]);
        assert_eq!(
            result.warnings,
            vec![
                "Dropped unsupported init flag: X".to_string(),
                "Dropped unsupported init flag: 7".to_string(),
            ]
        );
    }

    #[test]
    fn wireless_names_lose_reserved_characters() {
        let raw = json!({"initFlags": ["R\"bot|1\""]});
        let result = sanitize_program(&raw);
        assert_eq!(codes(&result.program.init_flags), vec!["R\"bot1\""]);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn flag_inference_is_idempotent() {
        let raw = json!({
            "initFlags": ["E", "R\"EMMI\""],
            "setup": [{"type": "set_var", "varType": "I", "index": 1, "value": "AR"}],
            "loop": [{"type": "cmd", "cmd": "MF"}, {"type": "delay", "ms": 250.6}]
        });
        let first = sanitize_program(&raw);
        let reparsed = serde_json::to_value(&first.program).unwrap();
        let second = sanitize_program(&reparsed);
        assert_eq!(second.program.init_flags, first.program.init_flags);
        assert_eq!(second.program, first.program);
        assert!(second.warnings.is_empty());
    }

    #[test]
    fn switch_cases_are_capped() {
        let cases: Vec<Json> = (0..13).map(|i| json!({"match": i, "body": []})).collect();
        let raw = json!({"loop": [{"type": "switch", "value": "I1", "cases": cases, "default": []}]});
        let result = sanitize_program(&raw);
        match &result.program.loop_body[0] {
            Statement::Switch { cases, .. } => assert_eq!(cases.len(), MAX_CASES),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(result.warnings, vec!["loop[0].cases: case list trimmed to 12 entries.".to_string()]);
    }

    #[test]
    fn documents_carry_explanation_and_claimed_warnings() {
        let raw = json!({
            "program": {"initFlags": [], "setup": [], "loop": [{"type": "delay", "ms": -5}]},
            "explanation": "  waits  ",
            "warnings": ["model note"]
        });
        let document = sanitize_document(&raw);
        assert_eq!(document.explanation.as_deref(), Some("waits"));
        assert_eq!(document.program.loop_body, vec![Statement::Delay { ms: 0 }]);
        assert_eq!(
            document.warnings,
            vec!["loop[0].ms: negative delay clamped to 0.".to_string(), "model note".to_string()]
        );

        let bare = sanitize_document(&json!({"loop": [{"type": "break"}]}));
        assert_eq!(bare.explanation, None);
        assert_eq!(bare.program.loop_body, vec![Statement::Break]);
    }
}
