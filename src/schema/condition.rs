use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::payload::{normalize_keys, shape_name, unwrap_embedded, PayloadError};

/// The condition kinds a dialog author can attach to a choice or a
/// condition branch. The discriminant is the wire `type` id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Group = 1,
    CheckPlayerValue = 2,
    CheckNpcValue = 3,
    CheckPlayerInventory = 4,
    CheckNpcInventory = 5,
    CheckQuestValue = 6,
    CheckQuestState = 7,
    CheckNpcAlive = 8,
    CheckGameTime = 9,
    CheckRandomValue = 10,
}

impl ConditionType {
    pub const ALL: [ConditionType; 10] = [
        Self::Group,
        Self::CheckPlayerValue,
        Self::CheckNpcValue,
        Self::CheckPlayerInventory,
        Self::CheckNpcInventory,
        Self::CheckQuestValue,
        Self::CheckQuestState,
        Self::CheckNpcAlive,
        Self::CheckGameTime,
        Self::CheckRandomValue,
    ];

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.id() == id)
    }

    pub fn id(self) -> i64 {
        self as i64
    }
}

/// One element of a condition list: a type id plus its opaque payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConditionElement {
    #[serde(rename = "type")]
    pub type_id: i64,
    #[serde(default)]
    pub data: Value,
}

/// A decoded list entry. Entries that do not decode keep their error so the
/// rest of the list still renders.
pub type ParsedElement = Result<ConditionElement, PayloadError>;

impl ConditionElement {
    /// Decode a condition list. Accepts a JSON array or JSON text holding
    /// one; an empty payload is an empty list. Elements decode one by one.
    pub fn parse_list(raw: &Value) -> Result<Vec<ParsedElement>, PayloadError> {
        let value = normalize_keys(unwrap_embedded(raw)?);
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => Ok(items.into_iter().map(Self::from_value).collect()),
            other => Err(PayloadError::UnexpectedShape {
                expected: "an array of condition elements",
                found: shape_name(&other),
            }),
        }
    }

    /// Decode one element whose keys are already normalized.
    pub fn from_value(value: Value) -> ParsedElement {
        Ok(serde_json::from_value(value)?)
    }

    pub fn condition_type(&self) -> Option<ConditionType> {
        ConditionType::from_id(self.type_id)
    }
}
