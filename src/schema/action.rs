use serde::{Deserialize, Serialize};

/// The action kinds an action node can execute. The discriminant is the
/// wire `actionType` id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    ChangePlayerValue = 1,
    ChangeNpcValue = 2,
    SpawnItemInPlayerInventory = 3,
    RemoveItemFromPlayerInventory = 4,
    SetQuestState = 5,
    AddQuestText = 6,
    Wait = 7,
    ShowFloatingTextAboveNpc = 8,
    PlayNpcAnimation = 9,
    SetGameTime = 10,
}

impl ActionType {
    pub const ALL: [ActionType; 10] = [
        Self::ChangePlayerValue,
        Self::ChangeNpcValue,
        Self::SpawnItemInPlayerInventory,
        Self::RemoveItemFromPlayerInventory,
        Self::SetQuestState,
        Self::AddQuestText,
        Self::Wait,
        Self::ShowFloatingTextAboveNpc,
        Self::PlayNpcAnimation,
        Self::SetGameTime,
    ];

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.id() == id)
    }

    pub fn id(self) -> i64 {
        self as i64
    }
}
