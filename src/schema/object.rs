use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::core::config::ConfigError;

/// The kinds of game objects a dialog can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Npc,
    Item,
    Quest,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Npc => "npc",
            Self::Item => "item",
            Self::Quest => "quest",
        })
    }
}

/// A typed value stored in a flex field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlexFieldValue {
    Text(String),
    Number(f64),
    /// One entry out of an option list, stored as its display text.
    Option(String),
}

impl FlexFieldValue {
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }
}

/// A dynamically named attribute on an export object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlexField {
    pub name: String,
    pub value: FlexFieldValue,
}

/// A game object (npc, item, quest, the player) as seen by the exporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportObject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FlexField>,
}

impl ExportObject {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FlexFieldValue) -> Self {
        self.fields.push(FlexField {
            name: name.into(),
            value,
        });
        self
    }

    /// Looks up a field by name, ignoring case.
    pub fn field(&self, name: &str) -> Option<&FlexField> {
        self.fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
    }
}

/// Lookup of the objects referenced by conditions, actions and reference
/// nodes. Supplied by the persistence layer.
pub trait ExportObjectResolver {
    fn player(&self) -> Option<&ExportObject>;
    fn resolve(&self, kind: ObjectKind, id: &str) -> Option<&ExportObject>;
}

/// In-memory resolver, loadable from RON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectCatalog {
    #[serde(default)]
    pub player: Option<ExportObject>,
    #[serde(default)]
    pub npcs: HashMap<String, ExportObject>,
    #[serde(default)]
    pub items: HashMap<String, ExportObject>,
    #[serde(default)]
    pub quests: HashMap<String, ExportObject>,
}

impl ObjectCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_player(mut self, player: ExportObject) -> Self {
        self.player = Some(player);
        self
    }

    pub fn insert(&mut self, kind: ObjectKind, object: ExportObject) {
        let table = match kind {
            ObjectKind::Npc => &mut self.npcs,
            ObjectKind::Item => &mut self.items,
            ObjectKind::Quest => &mut self.quests,
        };
        table.insert(object.id.clone(), object);
    }

    pub fn load_from_ron(path: &Path) -> Result<ObjectCatalog, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<ObjectCatalog, ConfigError> {
        Ok(ron::from_str(input)?)
    }
}

impl ExportObjectResolver for ObjectCatalog {
    fn player(&self) -> Option<&ExportObject> {
        self.player.as_ref()
    }

    fn resolve(&self, kind: ObjectKind, id: &str) -> Option<&ExportObject> {
        match kind {
            ObjectKind::Npc => self.npcs.get(id),
            ObjectKind::Item => self.items.get(id),
            ObjectKind::Quest => self.quests.get(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_lookup_ignores_case() {
        let npc = ExportObject::new("n1", "Gerda")
            .with_field("Health", FlexFieldValue::Number(20.0));
        assert!(npc.field("health").is_some());
        assert!(npc.field("HEALTH").is_some());
        assert!(npc.field("Mana").is_none());
    }

    #[test]
    fn catalog_from_ron() {
        let catalog = ObjectCatalog::parse_ron(
            r#"(
                player: Some((id: "player", name: "Hero", fields: [
                    (name: "Gold", value: Number(12.0)),
                ])),
                items: {
                    "i1": (id: "i1", name: "Rusty Key"),
                },
            )"#,
        )
        .unwrap();
        assert_eq!(catalog.player().unwrap().name, "Hero");
        assert_eq!(
            catalog.resolve(ObjectKind::Item, "i1").unwrap().name,
            "Rusty Key"
        );
        assert!(catalog.resolve(ObjectKind::Npc, "i1").is_none());
    }

    #[test]
    fn insert_routes_by_kind() {
        let mut catalog = ObjectCatalog::new();
        catalog.insert(ObjectKind::Quest, ExportObject::new("q1", "The Lost Ring"));
        assert!(catalog.resolve(ObjectKind::Quest, "q1").is_some());
        assert!(catalog.resolve(ObjectKind::Item, "q1").is_none());
    }
}
