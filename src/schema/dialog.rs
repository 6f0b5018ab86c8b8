/// Raw dialog records as delivered by the persistence layer.
///
/// The record is flat: five disjoint node lists plus a link list. Graph
/// structure is only built by `core::graph`.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use super::object::ObjectKind;
use crate::core::config::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Player,
    Npc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextLineNode {
    pub id: String,
    pub speaker: Speaker,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceOption {
    pub id: i32,
    #[serde(default)]
    pub text: String,
    /// Condition list (JSON array or JSON text) gating the option.
    #[serde(default)]
    pub condition_elements: Option<Value>,
    #[serde(default)]
    pub is_repeatable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceNode {
    pub id: String,
    #[serde(default)]
    pub choices: Vec<ChoiceOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionBranch {
    pub id: i32,
    #[serde(default)]
    pub condition_elements: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionNode {
    pub id: String,
    #[serde(default)]
    pub conditions: Vec<ConditionBranch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionNode {
    pub id: String,
    pub action_type: i64,
    #[serde(default)]
    pub action_data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub object_type: ObjectKind,
    pub object_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceNode {
    pub id: String,
    #[serde(default)]
    pub reference_text: String,
    #[serde(default)]
    pub referenced_object: Option<ObjectReference>,
}

/// A directed link between two nodes. The optional port names the branch of
/// the source node (`choice3`, `condition1`, `else`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeLink {
    pub source_node_id: String,
    #[serde(default)]
    pub source_node_port: Option<String>,
    pub target_node_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogRecord {
    pub id: String,
    #[serde(default)]
    pub text_lines: Vec<TextLineNode>,
    #[serde(default)]
    pub choices: Vec<ChoiceNode>,
    #[serde(default)]
    pub actions: Vec<ActionNode>,
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
    #[serde(default)]
    pub references: Vec<ReferenceNode>,
    #[serde(default)]
    pub links: Vec<NodeLink>,
}

impl DialogRecord {
    pub fn from_json(input: &str) -> Result<DialogRecord, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn load_from_json(path: &Path) -> Result<DialogRecord, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn node_count(&self) -> usize {
        self.text_lines.len()
            + self.choices.len()
            + self.actions.len()
            + self.conditions.len()
            + self.references.len()
    }
}
