//! In-memory editor workspace.
//!
//! Blocks live in an arena and are wired through named inputs and `next`
//! links, the way the editor connects them. Every block type must be declared
//! in the [`BlockCatalog`] first; the catalog decides which fields bind
//! variables and which connections a block offers.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use super::VisualNode;

pub type BlockId = usize;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkspaceError {
    #[error("Missing block type: {0}")]
    UnknownBlockType(String),

    #[error("Block {block_type} has no input {input}")]
    MissingInput { block_type: String, input: String },

    #[error("Block {block_type} has no field {field}")]
    MissingField { block_type: String, field: String },

    #[error("Cannot connect {child} to {parent}.{input}")]
    IncompatibleConnection { parent: String, input: String, child: String },

    #[error("Cannot chain {next} after {previous}")]
    IncompatibleChain { previous: String, next: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Bound to a workspace variable; the stored value is the variable id.
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Value,
    Statement,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockDefinition {
    pub fields: BTreeMap<String, FieldKind>,
    pub inputs: BTreeMap<String, InputKind>,
    pub has_output: bool,
    pub has_previous: bool,
    pub has_next: bool,
}

impl BlockDefinition {
    /// Chains with other statements.
    pub fn statement() -> Self {
        Self { has_previous: true, has_next: true, ..Self::default() }
    }

    /// Plugs into value inputs.
    pub fn value() -> Self {
        Self { has_output: true, ..Self::default() }
    }

    /// Top-level container with no connections of its own.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str) -> Self {
        self.fields.insert(name.to_string(), FieldKind::Text);
        self
    }

    pub fn variable(mut self, name: &str) -> Self {
        self.fields.insert(name.to_string(), FieldKind::Variable);
        self
    }

    pub fn input(mut self, name: &str) -> Self {
        self.inputs.insert(name.to_string(), InputKind::Value);
        self
    }

    pub fn body(mut self, name: &str) -> Self {
        self.inputs.insert(name.to_string(), InputKind::Statement);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlockCatalog {
    definitions: HashMap<String, BlockDefinition>,
}

impl BlockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, block_type: &str, definition: BlockDefinition) {
        self.definitions.insert(block_type.to_string(), definition);
    }

    pub fn get(&self, block_type: &str) -> Option<&BlockDefinition> {
        self.definitions.get(block_type)
    }

    pub fn contains(&self, block_type: &str) -> bool {
        self.definitions.contains_key(block_type)
    }

    /// Blocks of the EMMI toolbox.
    pub fn emmi() -> Self {
        let mut catalog = Self::new();
        let mut add = |block_type: &str, definition: BlockDefinition| catalog.register(block_type, definition);

        add("base_setup_loop", BlockDefinition::root().body("SETUP").body("LOOP"));

        // statements
        add("emmi_eyes_digital", BlockDefinition::statement().text("PIN").text("STATE"));
        add("esp32_digital_write", BlockDefinition::statement().text("PIN").text("STATE"));
        add("emmi_wheels_init", BlockDefinition::statement());
        add(
            "emmi_wheels_simple",
            BlockDefinition::statement().text("DIRECTION").text("SPEED").text("STEP"),
        );
        add("emmi_buzzer_note", BlockDefinition::statement().text("NOTE").text("TEMPO"));
        add("emmi_buzzer_play_tempo", BlockDefinition::statement().text("NOTE").text("TEMPO"));
        add("emmi_buzzer_music", BlockDefinition::statement().text("MELODY"));
        add("emmi_buzzer_music_custom", BlockDefinition::statement().input("MELODY"));
        add(
            "emmi_buzzer_frequency",
            BlockDefinition::statement().input("FREQUENCY").input("DURATION"),
        );
        add("emmi_buzzer_stop", BlockDefinition::statement().text("PIN"));
        add("custom_wait", BlockDefinition::statement().text("UNIT").input("DELAY"));
        add(
            "custom_variable_declare",
            BlockDefinition::statement().text("TYPE").variable("VAR").input("VALUE"),
        );
        add("custom_variable_set", BlockDefinition::statement().variable("VAR").input("VALUE"));
        add("custom_variable_change", BlockDefinition::statement().variable("VAR").input("VALUE"));
        for printer in [
            "usb_serial_print_same_line",
            "usb_serial_print_new_line",
            "usb_serial_print_format",
            "usb_serial_write",
            "bluetooth_serial_print_same_line",
            "bluetooth_serial_print_new_line",
            "bluetooth_serial_print_format",
            "bluetooth_serial_write",
        ] {
            add(printer, BlockDefinition::statement().input("VALUE"));
        }
        add("bluetooth_serial_init", BlockDefinition::statement().text("NAME"));
        add("custom_controls_if", BlockDefinition::statement().input("IF0").body("DO0"));
        add(
            "custom_controls_ifelse",
            BlockDefinition::statement().input("IF0").body("DO0").body("ELSE"),
        );
        add(
            "custom_controls_if_ifnot",
            BlockDefinition::statement().input("IF0").body("DO0").input("IF1").body("DO1"),
        );
        add(
            "custom_controls_whileUntil",
            BlockDefinition::statement().text("MODE").input("BOOL").body("DO"),
        );
        add(
            "custom_controls_for",
            BlockDefinition::statement()
                .variable("VAR")
                .input("FROM")
                .input("TO")
                .input("BY")
                .body("DO"),
        );
        add(
            "custom_controls_switch",
            BlockDefinition::statement().input("SWITCH_VALUE").input("CASE_VALUE").body("DO"),
        );
        add("custom_flow_statements", BlockDefinition::statement().text("FLOW"));

        // values
        add("math_number", BlockDefinition::value().text("NUM"));
        add("text", BlockDefinition::value().text("TEXT"));
        add("custom_text_value", BlockDefinition::value().text("TEXT"));
        add("custom_variable_get", BlockDefinition::value().variable("VAR"));
        add("emmi_touch_read", BlockDefinition::value().text("PIN").text("MODE"));
        add("emmi_mic_read", BlockDefinition::value().text("PIN").text("MODE"));
        add("emmi_light_read", BlockDefinition::value().text("PIN"));
        add("esp32_digital_state", BlockDefinition::value().text("PIN"));
        add("bluetooth_serial_available", BlockDefinition::value());
        add("bluetooth_serial_read_byte", BlockDefinition::value());
        add("bluetooth_serial_read_string_until", BlockDefinition::value().text("UNTIL_NEWLINE"));
        add("bluetooth_serial_read_number_until", BlockDefinition::value());
        add("logic_compare", BlockDefinition::value().text("OP").input("A").input("B"));
        add("math_arithmetic", BlockDefinition::value().text("OP").input("A").input("B"));
        add("custom_logic_not", BlockDefinition::value().input("BOOL"));
        add("custom_logic_and", BlockDefinition::value().text("OP").input("A").input("B"));
        add("logic_boolean", BlockDefinition::value().text("BOOL"));

        catalog
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    /// Variable id.
    Variable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct VariableMap {
    variables: Vec<Variable>,
}

impl VariableMap {
    pub fn get_variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn get_variable_by_id(&self, id: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.id == id)
    }

    pub fn create_variable(&mut self, name: &str) -> &Variable {
        let id = format!("var-{}", self.variables.len() + 1);
        self.variables.push(Variable { id, name: name.to_string() });
        &self.variables[self.variables.len() - 1]
    }

    pub fn names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Block {
    block_type: String,
    fields: BTreeMap<String, FieldValue>,
    inputs: BTreeMap<String, BlockId>,
    next: Option<BlockId>,
    disposed: bool,
}

#[derive(Debug, Clone)]
pub struct Workspace {
    catalog: BlockCatalog,
    blocks: Vec<Block>,
    top: Vec<BlockId>,
    variables: VariableMap,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(BlockCatalog::emmi())
    }
}

impl Workspace {
    pub fn new(catalog: BlockCatalog) -> Self {
        Self { catalog, blocks: Vec::new(), top: Vec::new(), variables: VariableMap::default() }
    }

    pub fn catalog(&self) -> &BlockCatalog {
        &self.catalog
    }

    pub fn variables(&self) -> &VariableMap {
        &self.variables
    }

    /// Removes all blocks and variables.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.top.clear();
        self.variables = VariableMap::default();
    }

    /// Creates an unattached block; it stays a top block until connected.
    pub fn new_block(&mut self, block_type: &str) -> Result<BlockId, WorkspaceError> {
        if !self.catalog.contains(block_type) {
            return Err(WorkspaceError::UnknownBlockType(block_type.to_string()));
        }
        let id = self.blocks.len();
        self.blocks.push(Block {
            block_type: block_type.to_string(),
            fields: BTreeMap::new(),
            inputs: BTreeMap::new(),
            next: None,
            disposed: false,
        });
        self.top.push(id);
        Ok(id)
    }

    fn definition(&self, id: BlockId) -> Option<&BlockDefinition> {
        self.catalog.get(&self.blocks[id].block_type)
    }

    pub fn field_kind(&self, id: BlockId, name: &str) -> Option<FieldKind> {
        self.definition(id)?.fields.get(name).copied()
    }

    pub fn input_kind(&self, id: BlockId, name: &str) -> Option<InputKind> {
        self.definition(id)?.inputs.get(name).copied()
    }

    pub fn set_field(&mut self, id: BlockId, name: &str, value: FieldValue) -> Result<(), WorkspaceError> {
        if self.field_kind(id, name).is_none() {
            return Err(WorkspaceError::MissingField {
                block_type: self.blocks[id].block_type.clone(),
                field: name.to_string(),
            });
        }
        self.blocks[id].fields.insert(name.to_string(), value);
        Ok(())
    }

    /// Variable id for `name`, creating the variable on first use.
    pub fn ensure_variable(&mut self, name: &str) -> String {
        if let Some(existing) = self.variables.get_variable(name) {
            return existing.id.clone();
        }
        self.variables.create_variable(name).id.clone()
    }

    /// Plugs `child` into a value input (needs an output connection) or a
    /// statement input (needs a previous connection).
    pub fn connect_input(&mut self, parent: BlockId, input: &str, child: BlockId) -> Result<(), WorkspaceError> {
        let Some(kind) = self.input_kind(parent, input) else {
            return Err(WorkspaceError::MissingInput {
                block_type: self.blocks[parent].block_type.clone(),
                input: input.to_string(),
            });
        };
        let compatible = self.definition(child).is_some_and(|child_def| match kind {
            InputKind::Value => child_def.has_output,
            InputKind::Statement => child_def.has_previous,
        });
        if !compatible {
            return Err(WorkspaceError::IncompatibleConnection {
                parent: self.blocks[parent].block_type.clone(),
                input: input.to_string(),
                child: self.blocks[child].block_type.clone(),
            });
        }
        self.blocks[parent].inputs.insert(input.to_string(), child);
        self.top.retain(|&top| top != child);
        Ok(())
    }

    pub fn connect_next(&mut self, previous: BlockId, next: BlockId) -> Result<(), WorkspaceError> {
        let previous_ok = self.definition(previous).is_some_and(|d| d.has_next);
        let next_ok = self.definition(next).is_some_and(|d| d.has_previous);
        if !previous_ok || !next_ok {
            return Err(WorkspaceError::IncompatibleChain {
                previous: self.blocks[previous].block_type.clone(),
                next: self.blocks[next].block_type.clone(),
            });
        }
        self.blocks[previous].next = Some(next);
        self.top.retain(|&top| top != next);
        Ok(())
    }

    /// Deletes a block together with everything plugged into it.
    pub fn dispose(&mut self, id: BlockId) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let block = &mut self.blocks[current];
            if block.disposed {
                continue;
            }
            block.disposed = true;
            pending.extend(block.inputs.values().copied());
            pending.extend(block.next);
            self.top.retain(|&top| top != current);
        }
    }

    pub fn block(&self, id: BlockId) -> BlockRef<'_> {
        BlockRef { workspace: self, id }
    }

    pub fn top_blocks(&self) -> Vec<BlockRef<'_>> {
        self.top.iter().map(|&id| self.block(id)).collect()
    }

    /// Live (not disposed) blocks.
    pub fn len(&self) -> usize {
        self.blocks.iter().filter(|b| !b.disposed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BlockRef<'a> {
    workspace: &'a Workspace,
    id: BlockId,
}

impl<'a> BlockRef<'a> {
    pub fn id(&self) -> BlockId {
        self.id
    }

    fn data(&self) -> &'a Block {
        &self.workspace.blocks[self.id]
    }
}

impl VisualNode for BlockRef<'_> {
    fn block_type(&self) -> &str {
        &self.data().block_type
    }

    fn field(&self, name: &str) -> Option<String> {
        match self.data().fields.get(name)? {
            FieldValue::Text(text) => Some(text.clone()),
            FieldValue::Variable(id) => Some(id.clone()),
        }
    }

    fn field_text(&self, name: &str) -> Option<String> {
        match self.data().fields.get(name)? {
            FieldValue::Text(text) => Some(text.clone()),
            FieldValue::Variable(id) => {
                self.workspace.variables.get_variable_by_id(id).map(|v| v.name.clone())
            }
        }
    }

    fn input_target(&self, name: &str) -> Option<Self> {
        let child = *self.data().inputs.get(name)?;
        Some(self.workspace.block(child))
    }

    fn next(&self) -> Option<Self> {
        self.data().next.map(|id| self.workspace.block(id))
    }

    fn children(&self) -> Vec<Self> {
        self.data().inputs.values().map(|&id| self.workspace.block(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_block_types_are_rejected() {
        let mut workspace = Workspace::default();
        assert_eq!(
            workspace.new_block("teleport"),
            Err(WorkspaceError::UnknownBlockType("teleport".into()))
        );
    }

    #[test]
    fn connections_respect_block_shapes() {
        let mut workspace = Workspace::default();
        let wait = workspace.new_block("custom_wait").unwrap();
        let number = workspace.new_block("math_number").unwrap();
        let stop = workspace.new_block("emmi_buzzer_stop").unwrap();

        assert!(workspace.connect_input(wait, "DELAY", stop).is_err());
        workspace.connect_input(wait, "DELAY", number).unwrap();
        assert!(workspace.connect_input(wait, "NOPE", number).is_err());
        assert!(workspace.connect_next(number, stop).is_err());
        workspace.connect_next(wait, stop).unwrap();

        let tops = workspace.top_blocks();
        assert_eq!(tops.len(), 1);
        assert_eq!(tops[0].block_type(), "custom_wait");
        assert_eq!(tops[0].input_target("DELAY").unwrap().block_type(), "math_number");
        assert_eq!(tops[0].next().unwrap().block_type(), "emmi_buzzer_stop");
    }

    #[test]
    fn variable_fields_store_ids_and_show_names() {
        let mut workspace = Workspace::default();
        let get = workspace.new_block("custom_variable_get").unwrap();
        let id = workspace.ensure_variable("I1");
        assert_eq!(workspace.ensure_variable("I1"), id);
        workspace.set_field(get, "VAR", FieldValue::Variable(id.clone())).unwrap();

        let block = workspace.block(get);
        assert_eq!(block.field("VAR"), Some(id));
        assert_eq!(block.field_text("VAR"), Some("I1".to_string()));
        assert_eq!(workspace.variables().len(), 1);
    }

    #[test]
    fn dispose_removes_subtree() {
        let mut workspace = Workspace::default();
        let wait = workspace.new_block("custom_wait").unwrap();
        let number = workspace.new_block("math_number").unwrap();
        workspace.connect_input(wait, "DELAY", number).unwrap();
        workspace.dispose(wait);
        assert!(workspace.is_empty());
        assert!(workspace.top_blocks().is_empty());
    }
}
