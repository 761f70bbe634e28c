//! Program -> blocks -> script agrees with program -> script.

use serde_json::{Value as Json, json};

use emmi_compiler::Program;
use emmi_compiler::blockly::DescriptorRef;
use emmi_compiler::blockly::block_map::BlockTypeMap;
use emmi_compiler::blockly::exporter::export;
use emmi_compiler::blockly::mapper::{load_program_into_workspace, program_to_blockly_json};
use emmi_compiler::blockly::workspace::Workspace;
use emmi_compiler::sanitize::sanitize_program;
use emmi_compiler::script;

fn program(raw: Json) -> Program {
    let sanitized = sanitize_program(&raw);
    assert!(sanitized.warnings.is_empty(), "{:?}", sanitized.warnings);
    sanitized.program
}

fn via_descriptors(program: &Program) -> String {
    let map = BlockTypeMap::default();
    let json = program_to_blockly_json(program, &map);
    assert!(json.warnings.is_empty(), "{:?}", json.warnings);
    let root = json.root_descriptor(&map);
    export([DescriptorRef::new(&root)]).unwrap().script
}

fn via_workspace(program: &Program) -> String {
    let mut workspace = Workspace::default();
    let result = load_program_into_workspace(&mut workspace, program, &BlockTypeMap::default());
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    export(workspace.top_blocks()).unwrap().script
}

fn assert_round_trip(raw: Json) -> String {
    let program = program(raw);
    let direct = script::serialize(&program).unwrap();
    assert_eq!(via_descriptors(&program), direct);
    assert_eq!(via_workspace(&program), direct);
    direct
}

#[test]
fn sensors_loops_and_motors() {
    let script = assert_round_trip(json!({
        "initFlags": ["R\"EMMI\""],
        "setup": [
            {"type": "set_var", "varType": "I", "index": 1, "op": "=", "value": 0}
        ],
        "loop": [
            {
                "type": "if",
                "expr": {"op": "==", "left": "TR", "right": 1},
                "then": [
                    {"type": "set_var", "varType": "I", "index": 1, "op": "+", "value": 1},
                    {"type": "delay", "ms": 300}
                ],
                "else": []
            },
            {
                "type": "while",
                "expr": {"op": ">", "left": "VR", "right": 100},
                "body": [{"type": "cmd", "cmd": "MF"}, {"type": "delay", "ms": 50}]
            },
            {"type": "cmd", "cmd": "MS"},
            {
                "type": "for", "start": 0, "end": 3, "step": 1,
                "body": [
                    {"type": "cmd", "cmd": "EGN"},
                    {"type": "delay", "ms": 100},
                    {"type": "cmd", "cmd": "EGF"}
                ]
            },
            {"type": "cmd", "cmd": "BPMario"},
            {"type": "cmd", "cmd": "BS"}
        ]
    }));
    assert_eq!(
        script,
        "|I|E|B|M|T|V|R\"EMMI\"|S|G(I,1,=,0)|L|C(O=,TR,1){|G(I,1,+,1)|D300|}{}|\
         W(O>,VR,100){|MF|D50|}|MS|F(0-3,1){|EGN|D100|EGF|}|BPMario|BS|"
    );
}

#[test]
fn typed_variables_and_arithmetic() {
    let script = assert_round_trip(json!({
        "setup": [
            {"type": "set_var", "varType": "C", "index": 1, "op": "=", "value": "'E'"},
            {"type": "set_var", "varType": "F", "index": 1, "op": "=", "value": 1.5},
            {"type": "set_var", "varType": "I", "index": 1, "op": "=", "value": 2}
        ],
        "loop": [
            {
                "type": "if",
                "expr": {"op": "==", "left": "C1", "right": "E"},
                "then": [{"type": "cmd", "cmd": "ERN"}],
                "else": []
            },
            {
                "type": "set_var", "varType": "I", "index": 1, "op": "=",
                "value": {"op": "*", "left": "I1", "right": 2}
            },
            {
                "type": "if",
                "expr": {"op": "<=", "left": "F1", "right": "AR"},
                "then": [{"type": "break"}],
                "else": []
            }
        ]
    }));
    assert!(script.contains("G(C,1,=,'E')"));
    assert!(script.contains("C(O=,C1,'E'){|ERN|}{}"));
    assert!(script.contains("G(I,1,=,O*,I1,2)"));
}

#[test]
fn all_simple_commands() {
    let loop_body: Vec<Json> = emmi_compiler::ir::command::SIMPLE_COMMANDS
        .iter()
        .map(|command| json!({"type": "cmd", "cmd": command.token()}))
        .collect();
    let script = assert_round_trip(json!({"setup": [], "loop": loop_body}));
    assert!(script.starts_with("|I|E|B|M|S||L|ERN|ERF|EGN|"));
}

#[test]
fn else_guard_is_the_negated_then_guard() {
    let program = program(json!({
        "loop": [{
            "type": "if",
            "expr": {"op": ">", "left": "VR", "right": 10},
            "then": [{"type": "cmd", "cmd": "ERN"}],
            "else": [{"type": "cmd", "cmd": "ERF"}]
        }]
    }));
    assert_eq!(script::serialize(&program).unwrap(), "|I|E|V|S||L|C(O>,VR,10){|ERN|}{|ERF|}|");
    assert_eq!(via_workspace(&program), "|I|E|V|S||L|C(O>,VR,10){|ERN|}{}|C(O<=,VR,10){|ERF|}{}|");
}

#[test]
fn switch_lowers_to_guarded_ifs() {
    let program = program(json!({
        "loop": [{
            "type": "switch",
            "value": "I1",
            "cases": [
                {"match": 0, "body": [{"type": "cmd", "cmd": "EGN"}]},
                {"match": 1, "body": [{"type": "cmd", "cmd": "ERN"}]}
            ],
            "default": []
        }]
    }));

    let map = BlockTypeMap::default();
    let json = program_to_blockly_json(&program, &map);
    assert_eq!(json.loop_body.len(), 3);
    assert!(json.loop_body.iter().all(|block| block.block_type == "custom_controls_if"));
    assert_eq!(json.loop_body[0].inputs["IF0"].fields["OP"], "EQ");
    assert_eq!(json.loop_body[1].inputs["IF0"].fields["OP"], "EQ");
    let none_matched = &json.loop_body[2].inputs["IF0"];
    assert_eq!(none_matched.block_type, "custom_logic_and");
    assert_eq!(none_matched.inputs["A"].fields["OP"], "NEQ");
    assert_eq!(none_matched.inputs["B"].fields["OP"], "NEQ");

    assert_eq!(
        via_workspace(&program),
        "|I|E|S||L|C(O=,I1,0){|EGN|}{}|C(O=,I1,1){|ERN|}{}|C(O*,O!=,I1,0,O!=,I1,1){}{}|"
    );
}

#[test]
fn three_case_default_chains_and_blocks() {
    let program = program(json!({
        "loop": [{
            "type": "switch",
            "value": "I2",
            "cases": [
                {"match": 0, "body": []},
                {"match": 1, "body": []},
                {"match": 2, "body": []}
            ],
            "default": [{"type": "cmd", "cmd": "EAF"}]
        }]
    }));
    let script = via_descriptors(&program);
    assert!(script.ends_with("C(O*,O*,O!=,I2,0,O!=,I2,1,O!=,I2,2){|EAF|}{}|"), "{}", script);
}

#[test]
fn sparse_slots_keep_their_numbers() {
    let script = assert_round_trip(json!({
        "setup": [{"type": "set_var", "varType": "I", "index": 3, "op": "=", "value": 5}],
        "loop": [{"type": "set_var", "varType": "I", "index": 1, "op": "+", "value": "I3"}]
    }));
    assert_eq!(script, "|I||S|G(I,3,=,5)|L|G(I,1,+,I3)|");
}

#[test]
fn variables_read_before_written_keep_their_type() {
    let script = assert_round_trip(json!({
        "setup": [{"type": "set_var", "varType": "I", "index": 1, "op": "=", "value": 4}],
        "loop": [
            {
                "type": "if",
                "expr": {"op": ">", "left": "F1", "right": 2},
                "then": [{"type": "cmd", "cmd": "ERN"}],
                "else": []
            },
            {"type": "if", "expr": {"op": "==", "left": "C2", "right": "'x'"}, "then": [], "else": []},
            {"type": "if", "expr": {"op": "!=", "left": "S1", "right": "\"hi\""}, "then": [], "else": []},
            {"type": "set_var", "varType": "F", "index": 1, "op": "=", "value": "I1"}
        ]
    }));
    assert!(script.contains("G(I,1,=,4)"));
    assert!(script.contains("C(O>,F1,2){|ERN|}{}"));
    assert!(script.contains("C(O=,C2,'x'){}{}"));
    assert!(script.contains("C(O!=,S1,\"hi\"){}{}"));
    assert!(script.ends_with("G(F,1,=,I1)|"));
}
