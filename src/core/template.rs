/// Export templates: the template type catalogue and RON-backed template sets.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::core::config::ConfigError;

/// Every template the exporter asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TemplateType {
    /// Frame around a whole exported dialog.
    TaleDialog,
    TaleFunction,
    TaleFunctionCall,
    TalePlayerTextLine,
    TaleNpcTextLine,
    TaleChoice,
    TaleCondition,
    TaleAction,
    TaleReference,

    GeneralLogicAnd,
    GeneralLogicOr,
    GeneralCompareOperatorEqual,
    GeneralCompareOperatorNotEqual,
    GeneralCompareOperatorLess,
    GeneralCompareOperatorLessOrEqual,
    GeneralCompareOperatorBigger,
    GeneralCompareOperatorBiggerOrEqual,
    GeneralCompareOperatorContains,

    TaleConditionGroup,
    TaleConditionCheckPlayerValue,
    TaleConditionCheckNpcValue,
    TaleConditionCheckPlayerInventory,
    TaleConditionCheckNpcInventory,
    TaleConditionCheckQuestValue,
    TaleConditionCheckQuestState,
    TaleConditionCheckNpcAlive,
    TaleConditionCheckGameTime,
    TaleConditionCheckRandomValue,

    TaleActionChangePlayerValue,
    TaleActionChangeNpcValue,
    TaleActionSpawnItemInPlayerInventory,
    TaleActionRemoveItemFromPlayerInventory,
    TaleActionSetQuestState,
    TaleActionAddQuestText,
    TaleActionWait,
    TaleActionShowFloatingTextAboveNpc,
    TaleActionPlayNpcAnimation,
    TaleActionSetGameTime,
}

impl TemplateType {
    /// Every template type, in catalogue order.
    pub const ALL: [TemplateType; 38] = [
        Self::TaleDialog,
        Self::TaleFunction,
        Self::TaleFunctionCall,
        Self::TalePlayerTextLine,
        Self::TaleNpcTextLine,
        Self::TaleChoice,
        Self::TaleCondition,
        Self::TaleAction,
        Self::TaleReference,
        Self::GeneralLogicAnd,
        Self::GeneralLogicOr,
        Self::GeneralCompareOperatorEqual,
        Self::GeneralCompareOperatorNotEqual,
        Self::GeneralCompareOperatorLess,
        Self::GeneralCompareOperatorLessOrEqual,
        Self::GeneralCompareOperatorBigger,
        Self::GeneralCompareOperatorBiggerOrEqual,
        Self::GeneralCompareOperatorContains,
        Self::TaleConditionGroup,
        Self::TaleConditionCheckPlayerValue,
        Self::TaleConditionCheckNpcValue,
        Self::TaleConditionCheckPlayerInventory,
        Self::TaleConditionCheckNpcInventory,
        Self::TaleConditionCheckQuestValue,
        Self::TaleConditionCheckQuestState,
        Self::TaleConditionCheckNpcAlive,
        Self::TaleConditionCheckGameTime,
        Self::TaleConditionCheckRandomValue,
        Self::TaleActionChangePlayerValue,
        Self::TaleActionChangeNpcValue,
        Self::TaleActionSpawnItemInPlayerInventory,
        Self::TaleActionRemoveItemFromPlayerInventory,
        Self::TaleActionSetQuestState,
        Self::TaleActionAddQuestText,
        Self::TaleActionWait,
        Self::TaleActionShowFloatingTextAboveNpc,
        Self::TaleActionPlayNpcAnimation,
        Self::TaleActionSetGameTime,
    ];
}

/// Documentation of one placeholder a template type understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatePlaceholder {
    pub name: String,
    pub description: String,
}

impl TemplatePlaceholder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Supplies template text per project. Implemented by the template store.
pub trait TemplateSource {
    fn template(&self, project_id: &str, template_type: TemplateType) -> Option<String>;
}

/// A set of templates keyed by type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateSet {
    pub templates: HashMap<TemplateType, String>,
}

impl TemplateSet {
    /// Load a template set from a RON file holding a `{ Type: "text" }` map.
    pub fn load_from_ron(path: &Path) -> Result<TemplateSet, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<TemplateSet, ConfigError> {
        let templates: HashMap<TemplateType, String> = ron::from_str(input)?;
        Ok(TemplateSet { templates })
    }

    /// Load and merge every `.ron` file of a directory, in file name order.
    pub fn load_from_dir(dir: &Path) -> Result<TemplateSet, ConfigError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("ron") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut set = TemplateSet::default();
        for path in paths {
            set.merge(Self::load_from_ron(&path)?);
        }
        Ok(set)
    }

    /// Merge another set into this one. Templates from `other` override
    /// templates of the same type in `self`.
    pub fn merge(&mut self, other: TemplateSet) {
        for (template_type, text) in other.templates {
            self.templates.insert(template_type, text);
        }
    }

    pub fn insert(&mut self, template_type: TemplateType, text: impl Into<String>) {
        self.templates.insert(template_type, text.into());
    }

    pub fn with(mut self, template_type: TemplateType, text: impl Into<String>) -> Self {
        self.insert(template_type, text);
        self
    }

    pub fn get(&self, template_type: TemplateType) -> Option<&str> {
        self.templates.get(&template_type).map(String::as_str)
    }
}

impl TemplateSource for TemplateSet {
    fn template(&self, _project_id: &str, template_type: TemplateType) -> Option<String> {
        self.get(template_type).map(str::to_string)
    }
}
