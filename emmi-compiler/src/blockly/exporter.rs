//! Visual tree to token script.
//!
//! Walks the `SETUP` and `LOOP` chains of the `base_setup_loop` root, turning
//! each statement block into zero or more script tokens. Blocks register the
//! init flags they need as they are visited; variables get slots through a
//! [`SlotTable`] that lives for one export.

use serde::Serialize;
use tracing::{debug, info};

use super::VisualNode;
use super::slots::SlotTable;
use crate::error::CompileError;
use crate::ir::ast::{Comparator, InitFlag, InitFlags, VarRef, VarType, format_number, is_numeric_token};
use crate::script::{
    self, comparison_type, delay_token, format_text_literal, number_literal_type, text_literal_type,
    wrap_body,
};

pub const BASE_BLOCK: &str = "base_setup_loop";

const DEFAULT_GUARD: &str = "O=,1,0";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedScript {
    pub script: String,
    pub pretty: String,
    pub init_tokens: Vec<String>,
    pub setup_tokens: Vec<String>,
    pub loop_tokens: Vec<String>,
}

/// Compiles the tree rooted at the first `base_setup_loop` among `top_blocks`.
pub fn export<N: VisualNode>(top_blocks: impl IntoIterator<Item = N>) -> Result<ExportedScript, CompileError> {
    ScriptExporter::new().export(top_blocks)
}

/// Per-export state: accumulated init flags and the variable slot table.
#[derive(Debug, Default)]
pub struct ScriptExporter {
    init: InitFlags,
    slots: SlotTable,
}

impl ScriptExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn export<N: VisualNode>(
        &mut self,
        top_blocks: impl IntoIterator<Item = N>,
    ) -> Result<ExportedScript, CompileError> {
        self.init = InitFlags::new();
        self.slots = SlotTable::new();

        let base = top_blocks
            .into_iter()
            .find(|block| block.block_type() == BASE_BLOCK)
            .ok_or(CompileError::MissingRoot)?;
        self.reserve_slot_names(base);

        let setup_tokens = self.serialize_chain(base.input_target("SETUP"))?;
        let loop_tokens = self.serialize_chain(base.input_target("LOOP"))?;
        let init_tokens = script::init_tokens(&self.init);

        let script = script::build_script(&init_tokens, &setup_tokens, &loop_tokens);
        let pretty = script::build_pretty(&init_tokens, &setup_tokens, &loop_tokens);
        script::validate_script(&script)?;

        info!(
            setup = setup_tokens.len(),
            loop_tokens = loop_tokens.len(),
            variables = self.slots.len(),
            "exported workspace"
        );

        Ok(ExportedScript { script, pretty, init_tokens, setup_tokens, loop_tokens })
    }

    /// Variables named after a slot (`F2`) keep it; see [`SlotTable::reserve`].
    fn reserve_slot_names<N: VisualNode>(&mut self, root: N) {
        let mut pending = vec![root];
        while let Some(block) = pending.pop() {
            if let Some(name) = block.field_text("VAR") {
                if self.slots.reserve(&name).is_some() {
                    debug!(variable = %name, "slot reserved by name");
                }
            }
            pending.extend(block.children());
            pending.extend(block.next());
        }
    }

    fn serialize_chain<N: VisualNode>(&mut self, start: Option<N>) -> Result<Vec<String>, CompileError> {
        let mut tokens = Vec::new();
        let mut current = start;
        while let Some(block) = current {
            tokens.extend(self.statement_tokens(block)?);
            current = block.next();
        }
        Ok(tokens)
    }

    fn body<N: VisualNode>(&mut self, block: N, input: &str) -> Result<String, CompileError> {
        Ok(wrap_body(&self.serialize_chain(block.input_target(input))?))
    }

    fn statement_tokens<N: VisualNode>(&mut self, block: N) -> Result<Vec<String>, CompileError> {
        debug!(block = block.block_type(), "statement");
        let tokens = match block.block_type() {
            "emmi_eyes_digital" => {
                self.init.insert(InitFlag::Eyes);
                vec![eye_token(block)]
            }
            "esp32_digital_write" => self.digital_write(block),
            "emmi_wheels_init" => {
                self.init.insert(InitFlag::Motors);
                vec![]
            }
            "emmi_wheels_simple" => {
                self.init.insert(InitFlag::Motors);
                vec![motor_token(block)]
            }
            "emmi_buzzer_note" | "emmi_buzzer_play_tempo" => {
                self.init.insert(InitFlag::Buzzer);
                let freq = non_empty(block.field("NOTE")).unwrap_or_else(|| "440".to_string());
                let duration = non_empty(block.field("TEMPO")).unwrap_or_else(|| "500".to_string());
                vec![format!("BF{}", freq), delay_token(&duration), "BS".to_string()]
            }
            "emmi_buzzer_music" => {
                self.init.insert(InitFlag::Buzzer);
                let melody = non_empty(block.field("MELODY")).unwrap_or_else(|| "StarWars".to_string());
                vec![format!("BP{}", melody)]
            }
            "emmi_buzzer_music_custom" => {
                self.init.insert(InitFlag::Buzzer);
                let melody = self.value_input(block, "MELODY", None)?.unwrap_or_default();
                vec![format!("BP{}", strip_quotes(&melody))]
            }
            "emmi_buzzer_frequency" => {
                self.init.insert(InitFlag::Buzzer);
                let freq = self
                    .value_input(block, "FREQUENCY", Some(VarType::Float))?
                    .unwrap_or_else(|| "440".to_string());
                let mut out = vec![format!("BF{}", freq)];
                if let Some(duration) = self.value_input(block, "DURATION", Some(VarType::Int))? {
                    out.push(delay_token(&duration));
                }
                out.push("BS".to_string());
                out
            }
            "emmi_buzzer_stop" => {
                self.init.insert(InitFlag::Buzzer);
                vec!["BS".to_string()]
            }
            "custom_wait" => {
                let mut value = self
                    .value_input(block, "DELAY", Some(VarType::Int))?
                    .unwrap_or_else(|| "0".to_string());
                if block.field("UNIT").as_deref() == Some("SECONDS") && is_numeric_token(&value) {
                    if let Ok(seconds) = value.parse::<f64>() {
                        value = format_number(seconds * 1000.0);
                    }
                }
                vec![delay_token(&value)]
            }
            "custom_variable_declare" => vec![self.assignment(block, true)?],
            "custom_variable_set" => vec![self.assignment(block, false)?],
            "custom_variable_change" => {
                let var = self.var_ref(block, VarType::Int)?;
                let rhs = self
                    .value_input(block, "VALUE", Some(var.var_type))?
                    .unwrap_or_else(|| "1".to_string());
                vec![format!("G({},{},+,{})", var.var_type, var.slot, rhs)]
            }
            "usb_serial_print_same_line" | "usb_serial_print_new_line" | "usb_serial_print_format"
            | "usb_serial_write" => {
                let value = self.value_input(block, "VALUE", None)?.unwrap_or_else(|| "\"\"".to_string());
                vec![format!("P{}", value)]
            }
            "bluetooth_serial_init" => {
                let name = non_empty(block.field("NAME")).unwrap_or_else(|| "EMMI".to_string());
                self.init.insert(InitFlag::Wireless(name));
                vec![]
            }
            "bluetooth_serial_print_same_line" => vec![self.wireless_call(block, "P", "\"\"")?],
            "bluetooth_serial_print_new_line" => vec![self.wireless_call(block, "PE", "\"\"")?],
            "bluetooth_serial_print_format" => vec![self.wireless_call(block, "P", "0")?],
            "bluetooth_serial_write" => vec![self.wireless_call(block, "W", "\"\"")?],
            "custom_controls_if" => {
                let guard = self.guard(block, "IF0")?;
                let then = self.body(block, "DO0")?;
                vec![format!("C({}){{{}}}{{}}", guard, then)]
            }
            "custom_controls_ifelse" => {
                let guard = self.guard(block, "IF0")?;
                let then = self.body(block, "DO0")?;
                let otherwise = self.body(block, "ELSE")?;
                vec![format!("C({}){{{}}}{{{}}}", guard, then, otherwise)]
            }
            "custom_controls_if_ifnot" => {
                let first_guard = self.guard(block, "IF0")?;
                let first = self.body(block, "DO0")?;
                let second_guard = self.guard(block, "IF1")?;
                let second = self.body(block, "DO1")?;
                // the else-if rides in the else slot as a one-statement body
                let nested = format!("C({}){{{}}}{{}}", second_guard, second);
                vec![format!("C({}){{{}}}{{|{}|}}", first_guard, first, nested)]
            }
            "custom_controls_whileUntil" => {
                let mut guard = self.guard(block, "BOOL")?;
                if block.field("MODE").as_deref() == Some("UNTIL") {
                    guard = format!("O=,{},0", guard);
                }
                let body = self.body(block, "DO")?;
                vec![format!("W({}){{{}}}", guard, body)]
            }
            "custom_controls_for" => {
                let from = self.value_input(block, "FROM", Some(VarType::Int))?.unwrap_or_else(|| "1".to_string());
                let to = self.value_input(block, "TO", Some(VarType::Int))?.unwrap_or_else(|| "1".to_string());
                let step = self.value_input(block, "BY", Some(VarType::Int))?.unwrap_or_else(|| "1".to_string());
                let body = self.body(block, "DO")?;
                vec![format!("F({}-{},{}){{{}}}", from, to, step, body)]
            }
            "custom_controls_switch" => {
                let value = self.value_input(block, "SWITCH_VALUE", None)?.unwrap_or_else(|| "0".to_string());
                let case = self.value_input(block, "CASE_VALUE", None)?.unwrap_or_else(|| "0".to_string());
                let body = self.body(block, "DO")?;
                vec![format!("K({}, ({}){{{}}} (D){{}})", value, case, body)]
            }
            "custom_flow_statements" => match block.field("FLOW").as_deref() {
                Some("BREAK") => vec!["X".to_string()],
                _ => return Err(CompileError::ContinueUnsupported),
            },
            other => {
                return Err(CompileError::UnsupportedBlock { block_type: other.to_string() });
            }
        };
        Ok(tokens)
    }

    fn digital_write<N: VisualNode>(&mut self, block: N) -> Vec<String> {
        let pin = block.field("PIN").unwrap_or_default();
        let high = block.field("STATE").as_deref() == Some("HIGH");
        match pin.as_str() {
            "PIN_BUZZER" => {
                self.init.insert(InitFlag::Buzzer);
                if high {
                    vec!["BF440".to_string(), "D500".to_string(), "BS".to_string()]
                } else {
                    vec!["BS".to_string()]
                }
            }
            "PIN_EYE_RED" | "PIN_EYE_GREEN" | "PIN_EYE_BLUE" | "RED" | "GREEN" | "BLUE" => {
                self.init.insert(InitFlag::Eyes);
                vec![eye_token(block)]
            }
            p if p.starts_with("MOTOR") => {
                self.init.insert(InitFlag::Motors);
                vec!["MS".to_string()]
            }
            _ => vec![],
        }
    }

    /// `G(<type>,<slot>,=,<value>)`. Declarations carry their type; plain sets
    /// infer it from the assigned value.
    fn assignment<N: VisualNode>(&mut self, block: N, declare: bool) -> Result<String, CompileError> {
        let requested = if declare {
            VarType::from_type_name(&block.field("TYPE").unwrap_or_default())
        } else {
            self.infer_value_type(block.input_target("VALUE")).unwrap_or(VarType::Int)
        };
        let var = self.var_ref(block, requested)?;
        let value = self
            .value_input(block, "VALUE", Some(var.var_type))?
            .unwrap_or_else(|| default_value(var.var_type).to_string());
        Ok(format!("G({},{},=,{})", var.var_type, var.slot, value))
    }

    fn wireless_call<N: VisualNode>(&mut self, block: N, op: &str, default: &str) -> Result<String, CompileError> {
        let value = self.value_input(block, "VALUE", None)?.unwrap_or_else(|| default.to_string());
        Ok(format!("R({},{})", op, value))
    }

    fn var_ref<N: VisualNode>(&mut self, block: N, requested: VarType) -> Result<VarRef, CompileError> {
        let name = block.field_text("VAR").unwrap_or_else(|| "var".to_string());
        self.slots.resolve(&name, requested)
    }

    /// Condition slot. Bare values become `O=,<value>,1`.
    fn guard<N: VisualNode>(&mut self, block: N, input: &str) -> Result<String, CompileError> {
        let expr = self.value_input(block, input, None)?.unwrap_or_else(|| DEFAULT_GUARD.to_string());
        if expr.starts_with('O') {
            Ok(expr)
        } else {
            Ok(format!("O=,{},1", expr))
        }
    }

    fn value_input<N: VisualNode>(
        &mut self,
        block: N,
        input: &str,
        expected: Option<VarType>,
    ) -> Result<Option<String>, CompileError> {
        match block.input_target(input) {
            Some(target) => self.value_block(target, expected).map(Some),
            None => Ok(None),
        }
    }

    fn value_block<N: VisualNode>(&mut self, block: N, expected: Option<VarType>) -> Result<String, CompileError> {
        let token = match block.block_type() {
            "math_number" => non_empty(block.field("NUM")).unwrap_or_else(|| "0".to_string()),
            "text" | "custom_text_value" => {
                format_text_literal(&block.field("TEXT").unwrap_or_default(), expected)
            }
            "custom_variable_get" => self.var_ref(block, expected.unwrap_or(VarType::Int))?.to_string(),
            "emmi_touch_read" => self.sensor(InitFlag::Touch, "TR"),
            "emmi_light_read" => self.sensor(InitFlag::Light, "VR"),
            "emmi_mic_read" => self.sensor(InitFlag::Mic, "AR"),
            "esp32_digital_state" => match block.field("PIN").as_deref() {
                Some("PIN_TOUCH" | "TOUCH") => self.sensor(InitFlag::Touch, "TR"),
                Some("PIN_MIC" | "MIC") => self.sensor(InitFlag::Mic, "AR"),
                Some("PIN_LIGHT" | "LIGHT") => self.sensor(InitFlag::Light, "VR"),
                _ => "0".to_string(),
            },
            "bluetooth_serial_available" => "R(A)".to_string(),
            "bluetooth_serial_read_byte" => "R(R)".to_string(),
            "bluetooth_serial_read_string_until" => {
                if block.field("UNTIL_NEWLINE").as_deref() == Some("TRUE") {
                    "R(TE)".to_string()
                } else {
                    "R(T)".to_string()
                }
            }
            "bluetooth_serial_read_number_until" => "R(F)".to_string(),
            "logic_compare" => self.compare(block)?,
            "math_arithmetic" => self.arithmetic(block)?,
            "custom_logic_not" => {
                let inner = self.value_input(block, "BOOL", None)?.unwrap_or_else(|| "0".to_string());
                format!("O=,{},0", inner)
            }
            "custom_logic_and" => {
                let a = self.value_input(block, "A", None)?.unwrap_or_else(|| "0".to_string());
                let b = self.value_input(block, "B", None)?.unwrap_or_else(|| "0".to_string());
                let op = if block.field("OP").as_deref() == Some("OR") { "+" } else { "*" };
                format!("O{},{},{}", op, a, b)
            }
            "logic_boolean" => {
                let truthy = block.field("BOOL").as_deref() == Some("TRUE");
                (if truthy { "1" } else { "0" }).to_string()
            }
            other => return Err(CompileError::UnsupportedBlock { block_type: other.to_string() }),
        };
        Ok(token)
    }

    fn sensor(&mut self, flag: InitFlag, token: &str) -> String {
        self.init.insert(flag);
        token.to_string()
    }

    fn compare<N: VisualNode>(&mut self, block: N) -> Result<String, CompileError> {
        let op = match block.field("OP") {
            None => Comparator::Equal,
            Some(field) => comparator_from_field(&field).ok_or_else(|| CompileError::UnsupportedOperator {
                block_type: block.block_type().to_string(),
                op: field.clone(),
            })?,
        };
        let left_block = block.input_target("A");
        let right_block = block.input_target("B");
        let expected = comparison_type(self.infer_value_type(left_block), self.infer_value_type(right_block));

        let left = match left_block {
            Some(b) => self.value_block(b, expected)?,
            None => "0".to_string(),
        };
        let right = match right_block {
            Some(b) => self.value_block(b, expected)?,
            None => "0".to_string(),
        };
        Ok(format!("O{},{},{}", op.script_symbol(), left, right))
    }

    fn arithmetic<N: VisualNode>(&mut self, block: N) -> Result<String, CompileError> {
        let field = block.field("OP").unwrap_or_default();
        let op = match field.as_str() {
            "ADD" => "+",
            "MINUS" => "-",
            "MULTIPLY" => "*",
            "DIVIDE" => "/",
            _ => {
                return Err(CompileError::UnsupportedOperator {
                    block_type: block.block_type().to_string(),
                    op: field,
                });
            }
        };
        let left = self.value_input(block, "A", None)?.unwrap_or_else(|| "0".to_string());
        let right = self.value_input(block, "B", None)?.unwrap_or_else(|| "0".to_string());
        Ok(format!("O{},{},{}", op, left, right))
    }

    /// Type a value block would force onto a comparison, if any.
    fn infer_value_type<N: VisualNode>(&self, block: Option<N>) -> Option<VarType> {
        let block = block?;
        match block.block_type() {
            "math_number" => Some(number_literal_type(&block.field("NUM").unwrap_or_default())),
            "text" | "custom_text_value" => Some(text_literal_type(&block.field("TEXT").unwrap_or_default())),
            "custom_variable_get" => {
                let name = block.field_text("VAR").unwrap_or_else(|| "var".to_string());
                self.slots.get(&name).map(|var| var.var_type)
            }
            "bluetooth_serial_read_string_until" => Some(VarType::Str),
            "bluetooth_serial_read_number_until" => Some(VarType::Float),
            _ => None,
        }
    }
}

fn comparator_from_field(field: &str) -> Option<Comparator> {
    match field {
        "EQ" => Some(Comparator::Equal),
        "NEQ" => Some(Comparator::NotEqual),
        "GT" => Some(Comparator::Greater),
        "GTE" => Some(Comparator::GreaterEqual),
        "LT" => Some(Comparator::Less),
        "LTE" => Some(Comparator::LessEqual),
        _ => None,
    }
}

fn eye_token<N: VisualNode>(block: N) -> String {
    let color = match block.field("PIN").as_deref() {
        Some("PIN_EYE_RED" | "RED") => "ER",
        Some("PIN_EYE_GREEN" | "GREEN") => "EG",
        Some("PIN_EYE_BLUE" | "BLUE") => "EB",
        _ => "EA",
    };
    let state = if block.field("STATE").as_deref() == Some("HIGH") { 'N' } else { 'F' };
    format!("{}{}", color, state)
}

fn motor_token<N: VisualNode>(block: N) -> String {
    let token = match block.field("DIRECTION").as_deref() {
        Some("FORWARD") => "MF",
        Some("BACKWARD") => "MB",
        Some("LEFT") => "ML",
        Some("RIGHT") => "MR",
        _ => "MS",
    };
    token.to_string()
}

fn default_value(var_type: VarType) -> &'static str {
    match var_type {
        VarType::Char => "'\\0'",
        VarType::Str => "\"\"",
        _ => "0",
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn strip_quotes(text: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = text.strip_prefix(quote).and_then(|t| t.strip_suffix(quote)) {
            return inner;
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockly::{BlockDescriptor, DescriptorRef};

    fn block(block_type: &str) -> BlockDescriptor {
        BlockDescriptor::new(block_type)
    }

    fn number(n: &str) -> BlockDescriptor {
        block("math_number").with_field("NUM", n)
    }

    fn base(setup: Vec<BlockDescriptor>, loop_body: Vec<BlockDescriptor>) -> BlockDescriptor {
        block(BASE_BLOCK).with_statements("SETUP", setup).with_statements("LOOP", loop_body)
    }

    fn run(root: &BlockDescriptor) -> Result<ExportedScript, CompileError> {
        export([DescriptorRef::new(root)])
    }

    #[test]
    fn missing_root_is_an_error() {
        let stray = block("emmi_buzzer_stop");
        assert!(matches!(run(&stray), Err(CompileError::MissingRoot)));
    }

    #[test]
    fn unknown_blocks_fail() {
        let root = base(vec![], vec![block("teleport")]);
        let err = run(&root).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported block for EMMI export: teleport");
    }

    #[test]
    fn continue_fails() {
        let root = base(vec![], vec![block("custom_flow_statements").with_field("FLOW", "CONTINUE")]);
        assert!(matches!(run(&root), Err(CompileError::ContinueUnsupported)));
    }

    #[test]
    fn seconds_scale_to_milliseconds() {
        let wait = block("custom_wait").with_field("UNIT", "SECONDS").with_input("DELAY", number("1.5"));
        let out = run(&base(vec![], vec![wait])).unwrap();
        assert_eq!(out.loop_tokens, vec!["D1500"]);
    }

    #[test]
    fn variable_delay_uses_spaced_form() {
        let declare = block("custom_variable_declare")
            .with_field("TYPE", "int")
            .with_field("VAR", "pause")
            .with_input("VALUE", number("250"));
        let wait = block("custom_wait")
            .with_field("UNIT", "MILLISECONDS")
            .with_input("DELAY", block("custom_variable_get").with_field("VAR", "pause"));
        let out = run(&base(vec![declare], vec![wait])).unwrap();
        assert_eq!(out.script, "|I||S|G(I,1,=,250)|L|D I1|");
    }

    #[test]
    fn else_if_nests_inside_else_slot() {
        let branchy = block("custom_controls_if_ifnot")
            .with_input(
                "IF0",
                block("logic_compare")
                    .with_field("OP", "EQ")
                    .with_input("A", block("emmi_touch_read"))
                    .with_input("B", number("1")),
            )
            .with_statements("DO0", vec![block("emmi_buzzer_stop")])
            .with_input("IF1", block("logic_boolean").with_field("BOOL", "TRUE"))
            .with_statements("DO1", vec![block("emmi_wheels_simple").with_field("DIRECTION", "LEFT")]);
        let out = run(&base(vec![], vec![branchy])).unwrap();
        assert_eq!(out.script, "|I|B|M|T|S||L|C(O=,TR,1){|BS|}{|C(O=,1,1){|ML|}{}|}|");
    }

    #[test]
    fn logic_blocks_use_prefix_operators() {
        let and = block("custom_logic_and")
            .with_field("OP", "AND")
            .with_input("A", block("logic_compare").with_field("OP", "GT").with_input("A", block("emmi_light_read")).with_input("B", number("10")))
            .with_input("B", block("custom_logic_not").with_input("BOOL", block("emmi_mic_read")));
        let until = block("custom_controls_whileUntil").with_field("MODE", "UNTIL").with_input("BOOL", and);
        let out = run(&base(vec![], vec![until])).unwrap();
        assert_eq!(out.loop_tokens, vec!["W(O=,O*,O>,VR,10,O=,AR,0,0){}"]);
        assert_eq!(out.init_tokens, vec!["A", "V"]);
    }

    #[test]
    fn buzzer_blocks() {
        let note = block("emmi_buzzer_note").with_field("NOTE", "262").with_field("TEMPO", "250");
        let melody = block("emmi_buzzer_music").with_field("MELODY", "Mario");
        let out = run(&base(vec![note, melody], vec![])).unwrap();
        assert_eq!(out.setup_tokens, vec!["BF262", "D250", "BS", "BPMario"]);
        assert_eq!(out.init_tokens, vec!["B"]);
    }

    #[test]
    fn unknown_compare_op_fails() {
        let cond = block("logic_compare").with_field("OP", "LIKE");
        let root = base(vec![], vec![block("custom_controls_if").with_input("IF0", cond)]);
        assert!(matches!(run(&root), Err(CompileError::UnsupportedOperator { .. })));
    }

    #[test]
    fn pretty_output_lists_tokens() {
        let on = block("emmi_eyes_digital").with_field("PIN", "PIN_EYE_RED").with_field("STATE", "HIGH");
        let out = run(&base(vec![], vec![on])).unwrap();
        assert_eq!(out.pretty, "|I|\n  E\n|S|\n|L|\n  ERN");
    }
}
