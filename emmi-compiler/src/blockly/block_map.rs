//! Which editor block types the mapper emits.
//!
//! Defaults match the EMMI toolbox. A JSON override only needs the keys it
//! changes; everything missing keeps its default.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::BlockDescriptor;
use crate::error::CompileError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BlockTypeMap {
    pub base: BaseMapping,
    pub blocks: StatementBlocks,
    pub value: ValueBlocks,
    /// Command token to the block(s) that reproduce it.
    pub command_map: BTreeMap<String, CommandBlocks>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BaseMapping {
    #[serde(rename = "type")]
    pub block_type: String,
    pub setup_input: String,
    pub loop_input: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatementBlocks {
    pub delay: String,
    pub set_var: String,
    pub change_var: String,
    pub declare_var: String,
    #[serde(rename = "if")]
    pub if_block: String,
    #[serde(rename = "while")]
    pub while_block: String,
    #[serde(rename = "for")]
    pub for_block: String,
    #[serde(rename = "break")]
    pub break_block: String,
    pub logic_compare: String,
    pub logic_and: String,
    pub math_arithmetic: String,
    pub for_var_name: String,
    pub wireless_init: String,
    pub melody: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueBlocks {
    pub number: String,
    pub text: String,
    pub variable: String,
    pub touch: String,
    pub mic: String,
    pub light: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandBlocks {
    One(BlockDescriptor),
    Many(Vec<BlockDescriptor>),
}

impl CommandBlocks {
    pub fn descriptors(&self) -> Vec<BlockDescriptor> {
        match self {
            Self::One(descriptor) => vec![descriptor.clone()],
            Self::Many(list) => list.clone(),
        }
    }
}

impl BlockTypeMap {
    pub fn from_json(text: &str) -> Result<Self, CompileError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl Default for BlockTypeMap {
    fn default() -> Self {
        let mut command_map = BTreeMap::new();

        let eyes = [
            ("ER", "PIN_EYE_RED"),
            ("EG", "PIN_EYE_GREEN"),
            ("EB", "PIN_EYE_BLUE"),
            ("EA", "PIN_EYE_ALL"),
        ];
        for (prefix, pin) in eyes {
            for (suffix, state) in [("N", "HIGH"), ("F", "LOW")] {
                let descriptor = BlockDescriptor::new("emmi_eyes_digital")
                    .with_field("PIN", pin)
                    .with_field("STATE", state);
                command_map.insert(format!("{}{}", prefix, suffix), CommandBlocks::One(descriptor));
            }
        }

        let wheels = [
            ("MF", "FORWARD"),
            ("MB", "BACKWARD"),
            ("ML", "LEFT"),
            ("MR", "RIGHT"),
            ("MS", "STOP"),
        ];
        for (token, direction) in wheels {
            let descriptor = BlockDescriptor::new("emmi_wheels_simple")
                .with_field("DIRECTION", direction)
                .with_field("SPEED", "180")
                .with_field("STEP", "1");
            command_map.insert(token.to_string(), CommandBlocks::One(descriptor));
        }

        command_map.insert(
            "BS".to_string(),
            CommandBlocks::One(BlockDescriptor::new("emmi_buzzer_stop").with_field("PIN", "PIN_BUZZER")),
        );
        command_map.insert(
            "X".to_string(),
            CommandBlocks::One(BlockDescriptor::new("custom_flow_statements").with_field("FLOW", "BREAK")),
        );

        Self {
            base: BaseMapping::default(),
            blocks: StatementBlocks::default(),
            value: ValueBlocks::default(),
            command_map,
        }
    }
}

impl Default for BaseMapping {
    fn default() -> Self {
        Self {
            block_type: "base_setup_loop".to_string(),
            setup_input: "SETUP".to_string(),
            loop_input: "LOOP".to_string(),
        }
    }
}

impl Default for StatementBlocks {
    fn default() -> Self {
        Self {
            delay: "custom_wait".to_string(),
            set_var: "custom_variable_set".to_string(),
            change_var: "custom_variable_change".to_string(),
            declare_var: "custom_variable_declare".to_string(),
            if_block: "custom_controls_if".to_string(),
            while_block: "custom_controls_whileUntil".to_string(),
            for_block: "custom_controls_for".to_string(),
            break_block: "custom_flow_statements".to_string(),
            logic_compare: "logic_compare".to_string(),
            logic_and: "custom_logic_and".to_string(),
            math_arithmetic: "math_arithmetic".to_string(),
            for_var_name: "i".to_string(),
            wireless_init: "bluetooth_serial_init".to_string(),
            melody: "emmi_buzzer_music".to_string(),
        }
    }
}

impl Default for ValueBlocks {
    fn default() -> Self {
        Self {
            number: "math_number".to_string(),
            text: "custom_text_value".to_string(),
            variable: "custom_variable_get".to_string(),
            touch: "emmi_touch_read".to_string(),
            mic: "emmi_mic_read".to_string(),
            light: "emmi_light_read".to_string(),
        }
    }
}
