//! Program AST back to editor blocks.
//!
//! Two passes: [`program_to_blockly_json`] decides what to build as plain
//! descriptors, [`load_program_into_workspace`] builds it in a [`Workspace`].
//! The simple `if` block has no else slot, so an else branch becomes a second
//! `if` guarded by the inverted comparison.
//!
//! Variables are named after their slot (`F2`). The exporter pins such names
//! to that slot, which keeps slot numbers and types across the trip back.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use super::block_map::BlockTypeMap;
use super::workspace::{BlockId, FieldKind, FieldValue, InputKind, Workspace};
use super::BlockDescriptor;
use crate::ir::ast::{
    format_number, ArithOp, AssignOp, Comparator, Condition, InitFlag, Program, Sensor, Statement,
    SwitchCase, Value, VarRef,
};
use crate::ir::command::Command;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlocklyProgram {
    #[serde(rename = "type")]
    pub kind: String,
    pub init_flags: Vec<String>,
    pub setup: Vec<BlockDescriptor>,
    #[serde(rename = "loop")]
    pub loop_body: Vec<BlockDescriptor>,
    pub warnings: Vec<String>,
}

impl BlocklyProgram {
    /// Wraps both chains into the base block, ready for the exporter.
    pub fn root_descriptor(&self, map: &BlockTypeMap) -> BlockDescriptor {
        BlockDescriptor::new(map.base.block_type.clone())
            .with_statements(map.base.setup_input.clone(), self.setup.clone())
            .with_statements(map.base.loop_input.clone(), self.loop_body.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResult {
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blockly_json: Option<BlocklyProgram>,
}

pub fn program_to_blockly_json(program: &Program, map: &BlockTypeMap) -> BlocklyProgram {
    let mut mapper = DescriptorMapper { map, declared: HashSet::new(), warnings: Vec::new() };

    let mut setup: Vec<BlockDescriptor> = program
        .init_flags
        .ordered()
        .into_iter()
        .filter_map(|flag| match flag {
            InitFlag::Wireless(name) => Some(
                BlockDescriptor::new(map.blocks.wireless_init.clone()).with_field("NAME", name.clone()),
            ),
            _ => None,
        })
        .collect();
    setup.extend(mapper.statements(&program.setup));
    let loop_body = mapper.statements(&program.loop_body);

    BlocklyProgram {
        kind: "emmi-blockly-program".to_string(),
        init_flags: program.init_flags.ordered().iter().map(|flag| flag.code()).collect(),
        setup,
        loop_body,
        warnings: mapper.warnings,
    }
}

struct DescriptorMapper<'a> {
    map: &'a BlockTypeMap,
    /// Slots that already got their typed declaration block.
    declared: HashSet<VarRef>,
    warnings: Vec<String>,
}

impl DescriptorMapper<'_> {
    fn statements(&mut self, nodes: &[Statement]) -> Vec<BlockDescriptor> {
        nodes.iter().flat_map(|node| self.statement(node)).collect()
    }

    fn statement(&mut self, node: &Statement) -> Vec<BlockDescriptor> {
        let map = self.map;
        let blocks = &map.blocks;
        match node {
            Statement::Command { cmd } => self.command(cmd),
            Statement::Delay { ms } => vec![
                BlockDescriptor::new(blocks.delay.clone())
                    .with_field("UNIT", "MILLISECONDS")
                    .with_input("DELAY", self.number(*ms as f64)),
            ],
            Statement::SetVar { var_type, index, op, value } => {
                let Some(var) = VarRef::new(*var_type, *index) else {
                    self.warnings.push(format!("Invalid variable slot {}{}.", var_type, index));
                    return vec![];
                };
                let value = self.value(value);
                let descriptor = match op {
                    AssignOp::Set if self.declared.insert(var) => {
                        BlockDescriptor::new(blocks.declare_var.clone())
                            .with_field("TYPE", var.var_type.type_name())
                    }
                    AssignOp::Set => BlockDescriptor::new(blocks.set_var.clone()),
                    AssignOp::Increment => BlockDescriptor::new(blocks.change_var.clone()),
                };
                vec![descriptor.with_field("VAR", var.to_string()).with_input("VALUE", value)]
            }
            Statement::If { condition, then_branch, else_branch } => {
                let mut out = vec![self.guarded(condition, then_branch)];
                if !else_branch.is_empty() {
                    out.push(self.guarded(&condition.inverted(), else_branch));
                }
                out
            }
            Statement::While { condition, body } => vec![
                BlockDescriptor::new(blocks.while_block.clone())
                    .with_field("MODE", "WHILE")
                    .with_input("BOOL", self.compare(condition))
                    .with_statements("DO", self.statements(body)),
            ],
            Statement::For { start, end, step, body } => {
                let step = if *step == 0 { 1 } else { *step };
                vec![
                    BlockDescriptor::new(blocks.for_block.clone())
                        .with_field("VAR", blocks.for_var_name.clone())
                        .with_input("FROM", self.number(*start as f64))
                        .with_input("TO", self.number(*end as f64))
                        .with_input("BY", self.number(step as f64))
                        .with_statements("DO", self.statements(body)),
                ]
            }
            Statement::Switch { value, cases, default } => self.switch(value, cases, default),
            Statement::Break => {
                vec![BlockDescriptor::new(blocks.break_block.clone()).with_field("FLOW", "BREAK")]
            }
        }
    }

    fn command(&mut self, cmd: &Command) -> Vec<BlockDescriptor> {
        let token = cmd.token();
        if let Some(mapped) = self.map.command_map.get(&token) {
            return mapped.descriptors();
        }
        if let Command::Melody(name) = cmd {
            if !self.map.blocks.melody.is_empty() {
                return vec![BlockDescriptor::new(self.map.blocks.melody.clone()).with_field("MELODY", name.clone())];
            }
        }
        self.warnings.push(format!("Command \"{}\" is not mapped to a Blockly block.", token));
        vec![]
    }

    fn guarded(&mut self, condition: &Condition, body: &[Statement]) -> BlockDescriptor {
        BlockDescriptor::new(self.map.blocks.if_block.clone())
            .with_input("IF0", self.compare(condition))
            .with_statements("DO0", self.statements(body))
    }

    /// One equality-guarded `if` per case, then an `if` whose guard is the AND
    /// of all inequalities for the default. Without cases the default runs
    /// unconditionally.
    fn switch(&mut self, value: &Value, cases: &[SwitchCase], default: &[Statement]) -> Vec<BlockDescriptor> {
        if cases.is_empty() {
            return self.statements(default);
        }
        let mut out = Vec::with_capacity(cases.len() + 1);
        for case in cases {
            let guard = Condition::new(Comparator::Equal, value.clone(), case.matches.clone());
            out.push(self.guarded(&guard, &case.body));
        }

        let mut none_matched: Option<BlockDescriptor> = None;
        for case in cases {
            let differs = self.compare(&Condition::new(Comparator::NotEqual, value.clone(), case.matches.clone()));
            none_matched = Some(match none_matched {
                None => differs,
                Some(previous) => BlockDescriptor::new(self.map.blocks.logic_and.clone())
                    .with_field("OP", "AND")
                    .with_input("A", previous)
                    .with_input("B", differs),
            });
        }
        if let Some(guard) = none_matched {
            out.push(
                BlockDescriptor::new(self.map.blocks.if_block.clone())
                    .with_input("IF0", guard)
                    .with_statements("DO0", self.statements(default)),
            );
        }
        out
    }

    fn compare(&mut self, condition: &Condition) -> BlockDescriptor {
        let op = match condition.op {
            Comparator::Equal => "EQ",
            Comparator::NotEqual => "NEQ",
            Comparator::Greater => "GT",
            Comparator::GreaterEqual => "GTE",
            Comparator::Less => "LT",
            Comparator::LessEqual => "LTE",
        };
        BlockDescriptor::new(self.map.blocks.logic_compare.clone())
            .with_field("OP", op)
            .with_input("A", self.value(&condition.left))
            .with_input("B", self.value(&condition.right))
    }

    fn value(&mut self, value: &Value) -> BlockDescriptor {
        let map = self.map;
        let values = &map.value;
        match value {
            Value::Number(n) => self.number(*n),
            Value::Boolean(b) => self.number(if *b { 1.0 } else { 0.0 }),
            Value::Variable(var) => BlockDescriptor::new(values.variable.clone()).with_field("VAR", var.to_string()),
            Value::Sensor(Sensor::Touch) => BlockDescriptor::new(values.touch.clone())
                .with_field("PIN", "PIN_TOUCH")
                .with_field("MODE", "INPUT_PULLUP"),
            Value::Sensor(Sensor::Mic) => BlockDescriptor::new(values.mic.clone())
                .with_field("PIN", "PIN_MIC")
                .with_field("MODE", "INPUT_PULLUP"),
            Value::Sensor(Sensor::Light) => {
                BlockDescriptor::new(values.light.clone()).with_field("PIN", "PIN_LIGHT")
            }
            Value::Text(text) => BlockDescriptor::new(values.text.clone()).with_field("TEXT", text.clone()),
            Value::Binary { op, left, right } => {
                let op = match op {
                    ArithOp::Add => "ADD",
                    ArithOp::Subtract => "MINUS",
                    ArithOp::Multiply => "MULTIPLY",
                    ArithOp::Divide => "DIVIDE",
                };
                BlockDescriptor::new(self.map.blocks.math_arithmetic.clone())
                    .with_field("OP", op)
                    .with_input("A", self.value(left))
                    .with_input("B", self.value(right))
            }
        }
    }

    fn number(&self, n: f64) -> BlockDescriptor {
        BlockDescriptor::new(self.map.value.number.clone()).with_field("NUM", format_number(n))
    }
}

/// Replaces the workspace content with `program`.
///
/// Nothing here fails hard: unknown block types, missing inputs and rejected
/// connections become warnings and the offending block is dropped.
pub fn load_program_into_workspace(workspace: &mut Workspace, program: &Program, map: &BlockTypeMap) -> LoadResult {
    let payload = program_to_blockly_json(program, map);
    let mut warnings = payload.warnings.clone();

    if map.base.block_type.is_empty() {
        warnings.push("Missing base block mapping.".to_string());
        return LoadResult { warnings, blockly_json: None };
    }
    if !workspace.catalog().contains(&map.base.block_type) {
        warnings.push(format!("Base block type not found: {}", map.base.block_type));
        return LoadResult { warnings, blockly_json: None };
    }

    workspace.clear();
    let base = match workspace.new_block(&map.base.block_type) {
        Ok(id) => id,
        Err(err) => {
            warnings.push(err.to_string());
            return LoadResult { warnings, blockly_json: None };
        }
    };

    let mut builder = Instantiator { workspace: &mut *workspace, warnings };
    let stacks = [
        (map.base.setup_input.as_str(), payload.setup.as_slice()),
        (map.base.loop_input.as_str(), payload.loop_body.as_slice()),
    ];
    for (input, nodes) in stacks {
        if builder.workspace.input_kind(base, input) != Some(InputKind::Statement) {
            builder.warnings.push(format!("Base block input missing: {}", input));
            continue;
        }
        builder.attach_chain(base, input, nodes);
    }

    let warnings = builder.warnings;
    debug!(blocks = workspace.len(), warnings = warnings.len(), "program loaded into workspace");
    LoadResult { warnings, blockly_json: Some(payload) }
}

struct Instantiator<'w> {
    workspace: &'w mut Workspace,
    warnings: Vec<String>,
}

impl Instantiator<'_> {
    fn block(&mut self, descriptor: &BlockDescriptor) -> Option<BlockId> {
        let id = match self.workspace.new_block(&descriptor.block_type) {
            Ok(id) => id,
            Err(err) => {
                self.warnings.push(err.to_string());
                return None;
            }
        };

        for (name, value) in &descriptor.fields {
            self.set_field(id, name, value);
        }

        for (name, child_descriptor) in &descriptor.inputs {
            let Some(child) = self.block(child_descriptor) else {
                continue;
            };
            if let Err(err) = self.workspace.connect_input(id, name, child) {
                self.warnings.push(err.to_string());
                self.workspace.dispose(child);
            }
        }

        for (name, body) in &descriptor.statements {
            self.attach_chain(id, name, body);
        }
        Some(id)
    }

    /// Variable fields bind a workspace variable, everything else takes the
    /// text. Fields the block does not have are ignored.
    fn set_field(&mut self, id: BlockId, name: &str, value: &str) {
        let field = match self.workspace.field_kind(id, name) {
            Some(FieldKind::Variable) => FieldValue::Variable(self.workspace.ensure_variable(value)),
            Some(FieldKind::Text) => FieldValue::Text(value.to_string()),
            None => return,
        };
        if let Err(err) = self.workspace.set_field(id, name, field) {
            self.warnings.push(err.to_string());
        }
    }

    fn attach_chain(&mut self, parent: BlockId, input: &str, nodes: &[BlockDescriptor]) {
        let mut first = None;
        let mut previous: Option<BlockId> = None;
        for descriptor in nodes {
            let Some(block) = self.block(descriptor) else {
                continue;
            };
            if let Some(prev) = previous {
                if let Err(err) = self.workspace.connect_next(prev, block) {
                    self.warnings.push(err.to_string());
                    self.workspace.dispose(block);
                    continue;
                }
            }
            first.get_or_insert(block);
            previous = Some(block);
        }

        if let Some(first) = first {
            if let Err(err) = self.workspace.connect_input(parent, input, first) {
                self.warnings.push(err.to_string());
                self.workspace.dispose(first);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ast::{InitFlags, VarType};

    fn program(setup: Vec<Statement>, loop_body: Vec<Statement>) -> Program {
        Program { init_flags: InitFlags::new(), setup, loop_body }
    }

    fn var(var_type: VarType, slot: u8) -> Value {
        Value::Variable(VarRef { var_type, slot })
    }

    #[test]
    fn else_branch_becomes_inverted_if() {
        let node = Statement::If {
            condition: Condition::new(Comparator::Greater, Value::Sensor(Sensor::Light), Value::number(10)),
            then_branch: vec![Statement::Command { cmd: Command::EyeRedOn }],
            else_branch: vec![Statement::Command { cmd: Command::EyeRedOff }],
        };
        let json = program_to_blockly_json(&program(vec![], vec![node]), &BlockTypeMap::default());
        assert_eq!(json.loop_body.len(), 2);
        assert_eq!(json.loop_body[0].inputs["IF0"].fields["OP"], "GT");
        assert_eq!(json.loop_body[1].inputs["IF0"].fields["OP"], "LTE");
        assert_eq!(json.loop_body[1].statements["DO0"][0].fields["STATE"], "LOW");
        assert!(json.warnings.is_empty());
    }

    #[test]
    fn first_assignment_declares_the_slot() {
        let set = |n: i32| Statement::SetVar {
            var_type: VarType::Float,
            index: 2,
            op: AssignOp::Set,
            value: Value::number(n),
        };
        let bump = Statement::SetVar {
            var_type: VarType::Float,
            index: 2,
            op: AssignOp::Increment,
            value: Value::number(1),
        };
        let json = program_to_blockly_json(&program(vec![set(0)], vec![set(5), bump]), &BlockTypeMap::default());
        assert_eq!(json.setup[0].block_type, "custom_variable_declare");
        assert_eq!(json.setup[0].fields["TYPE"], "float");
        assert_eq!(json.setup[0].fields["VAR"], "F2");
        assert_eq!(json.loop_body[0].block_type, "custom_variable_set");
        assert_eq!(json.loop_body[1].block_type, "custom_variable_change");
    }

    #[test]
    fn unmapped_commands_warn() {
        let json = program_to_blockly_json(
            &program(vec![], vec![Statement::Command { cmd: Command::Tone(440) }]),
            &BlockTypeMap::default(),
        );
        assert!(json.loop_body.is_empty());
        assert_eq!(json.warnings, vec!["Command \"BF440\" is not mapped to a Blockly block."]);
    }

    #[test]
    fn switch_without_cases_inlines_default() {
        let node = Statement::Switch {
            value: var(VarType::Int, 1),
            cases: vec![],
            default: vec![Statement::Break],
        };
        let json = program_to_blockly_json(&program(vec![], vec![node]), &BlockTypeMap::default());
        assert_eq!(json.loop_body.len(), 1);
        assert_eq!(json.loop_body[0].block_type, "custom_flow_statements");
    }

    #[test]
    fn wireless_flag_becomes_init_block() {
        let mut flags = InitFlags::new();
        flags.insert(InitFlag::Wireless("EMMI".into()));
        let prog = Program { init_flags: flags, setup: vec![Statement::Delay { ms: 10 }], loop_body: vec![] };
        let json = program_to_blockly_json(&prog, &BlockTypeMap::default());
        assert_eq!(json.setup[0].block_type, "bluetooth_serial_init");
        assert_eq!(json.setup[0].fields["NAME"], "EMMI");
        assert_eq!(json.init_flags, vec!["R\"EMMI\""]);
    }

    #[test]
    fn unknown_block_types_are_warnings() {
        let mut map = BlockTypeMap::default();
        map.blocks.delay = "fancy_wait".to_string();
        let prog = program(vec![], vec![Statement::Delay { ms: 5 }, Statement::Break]);
        let mut workspace = Workspace::default();
        let result = load_program_into_workspace(&mut workspace, &prog, &map);
        assert_eq!(result.warnings, vec!["Missing block type: fancy_wait"]);
        // base + break
        assert_eq!(workspace.len(), 2);
    }

    #[test]
    fn missing_base_type_leaves_workspace_alone() {
        let mut map = BlockTypeMap::default();
        map.base.block_type = "nope".to_string();
        let mut workspace = Workspace::default();
        workspace.new_block("math_number").unwrap();
        let result = load_program_into_workspace(&mut workspace, &Program::empty(), &map);
        assert_eq!(result.warnings, vec!["Base block type not found: nope"]);
        assert!(result.blockly_json.is_none());
        assert_eq!(workspace.len(), 1);
    }

    #[test]
    fn variables_are_created_through_variable_fields() {
        let prog = program(
            vec![Statement::SetVar {
                var_type: VarType::Int,
                index: 1,
                op: AssignOp::Set,
                value: Value::number(0),
            }],
            vec![Statement::For { start: 0, end: 3, step: 0, body: vec![] }],
        );
        let mut workspace = Workspace::default();
        let result = load_program_into_workspace(&mut workspace, &prog, &BlockTypeMap::default());
        assert!(result.warnings.is_empty());
        assert_eq!(workspace.variables().names(), vec!["I1", "i"]);
        let for_block = &result.blockly_json.unwrap().loop_body[0];
        assert_eq!(for_block.inputs["BY"].fields["NUM"], "1");
    }
}
