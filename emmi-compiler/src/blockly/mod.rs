//! Visual block trees.
//!
//! The exporter never depends on a concrete block representation: anything
//! that can answer [`VisualNode`] queries can be compiled. Two implementations
//! live here, [`DescriptorRef`] over plain JSON descriptors and
//! [`workspace::BlockRef`] over an instantiated [`workspace::Workspace`].

pub mod block_map;
pub mod exporter;
pub mod mapper;
pub mod slots;
pub mod workspace;

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as Json;

/// Read-only view of one block in a visual tree.
pub trait VisualNode: Copy {
    fn block_type(&self) -> &str;

    /// Raw field value.
    fn field(&self, name: &str) -> Option<String>;

    /// Display text of a field. Differs from [`VisualNode::field`] for
    /// variable fields, whose value is an id.
    fn field_text(&self, name: &str) -> Option<String> {
        self.field(name)
    }

    /// Block plugged into a named value or statement input.
    fn input_target(&self, name: &str) -> Option<Self>;

    /// Next block in the statement chain.
    fn next(&self) -> Option<Self>;

    /// First block of every connected input, value and statement alike.
    fn children(&self) -> Vec<Self>;
}

/// `{type, fields, inputs, statements}`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockDescriptor {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default, deserialize_with = "field_strings", skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, BlockDescriptor>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub statements: BTreeMap<String, Vec<BlockDescriptor>>,
}

impl BlockDescriptor {
    pub fn new(block_type: impl Into<String>) -> Self {
        Self { block_type: block_type.into(), ..Self::default() }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, child: BlockDescriptor) -> Self {
        self.inputs.insert(name.into(), child);
        self
    }

    pub fn with_statements(mut self, name: impl Into<String>, body: Vec<BlockDescriptor>) -> Self {
        self.statements.insert(name.into(), body);
        self
    }
}

/// Editors store some field values as numbers or booleans.
fn field_strings<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Json>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, value)| {
            let text = match value {
                Json::String(s) => s,
                Json::Bool(b) => (if b { "TRUE" } else { "FALSE" }).to_string(),
                Json::Null => String::new(),
                other => other.to_string(),
            };
            (name, text)
        })
        .collect())
}

/// A descriptor positioned inside its statement list, so that
/// [`VisualNode::next`] can walk the siblings.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorRef<'a> {
    node: &'a BlockDescriptor,
    rest: &'a [BlockDescriptor],
}

impl<'a> DescriptorRef<'a> {
    pub fn new(node: &'a BlockDescriptor) -> Self {
        Self { node, rest: &[] }
    }

    pub fn chain(list: &'a [BlockDescriptor]) -> Option<Self> {
        let (node, rest) = list.split_first()?;
        Some(Self { node, rest })
    }

    pub fn descriptor(&self) -> &'a BlockDescriptor {
        self.node
    }
}

impl VisualNode for DescriptorRef<'_> {
    fn block_type(&self) -> &str {
        &self.node.block_type
    }

    fn field(&self, name: &str) -> Option<String> {
        self.node.fields.get(name).cloned()
    }

    fn input_target(&self, name: &str) -> Option<Self> {
        if let Some(child) = self.node.inputs.get(name) {
            return Some(Self::new(child));
        }
        self.node.statements.get(name).and_then(|body| Self::chain(body))
    }

    fn next(&self) -> Option<Self> {
        Self::chain(self.rest)
    }

    fn children(&self) -> Vec<Self> {
        let values = self.node.inputs.values().map(Self::new);
        let bodies = self.node.statements.values().filter_map(|body| Self::chain(body));
        values.chain(bodies).collect()
    }
}
