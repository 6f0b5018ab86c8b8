/// Shared state and helpers for rendering conditions, actions and steps.
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::actions::ActionRegistry;
use crate::core::conditions::ConditionRegistry;
use crate::core::config::ExportSettings;
use crate::core::diagnostics::{ErrorCollection, ExportErrorKind};
use crate::core::flex_field::{format_number, FlexFieldResolver};
use crate::core::language_key::{self, LanguageKeyGenerator, LanguageKeyRequest};
use crate::core::placeholder;
use crate::core::template::{TemplateSource, TemplateType};
use crate::schema::object::{ExportObject, ExportObjectResolver, ObjectKind};
use crate::schema::payload::{self, PayloadError};

/// Written in place of a condition or action that failed to render.
pub const RENDER_ERROR_SENTINEL: &str = "<<RENDER ERROR>>";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] PayloadError),
    #[error("{kind} '{id}' does not exist")]
    MissingObject { kind: ObjectKind, id: String },
    #[error("no player object is available")]
    MissingPlayer,
    #[error("'{object}' has no field '{field}'")]
    MissingField { object: String, field: String },
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),
    #[error("invalid {field} '{value}'")]
    InvalidValue { field: &'static str, value: String },
}

impl RenderError {
    /// The diagnostic kind for this error, `fallback` for payload problems.
    pub fn diagnostic_kind(&self, fallback: ExportErrorKind) -> ExportErrorKind {
        match self {
            Self::MissingObject { .. } | Self::MissingPlayer => {
                ExportErrorKind::MissingReferencedObject
            }
            Self::MissingField { .. } => ExportErrorKind::MissingFlexField,
            Self::InvalidPayload(_) | Self::UnknownOperator(_) | Self::InvalidValue { .. } => {
                fallback
            }
        }
    }
}

/// A value that is either text or a number on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Number(f64),
    Text(String),
}

impl Default for ScalarValue {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl ScalarValue {
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    pub fn render(&self, settings: &ExportSettings) -> String {
        match self {
            Self::Number(number) => format_number(*number),
            Self::Text(text) => settings.escape(text),
        }
    }
}

/// Everything a renderer can reach during one export pass.
pub struct RenderContext<'a> {
    pub project_id: &'a str,
    /// The object that owns the dialog being exported.
    pub owner: &'a ExportObject,
    pub settings: &'a ExportSettings,
    pub objects: &'a dyn ExportObjectResolver,
    pub conditions: &'a ConditionRegistry,
    pub actions: &'a ActionRegistry,
    pub language_keys: &'a mut dyn LanguageKeyGenerator,
    pub errors: &'a mut ErrorCollection,
    templates: &'a dyn TemplateSource,
    template_cache: FxHashMap<TemplateType, Option<String>>,
}

impl<'a> RenderContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_id: &'a str,
        owner: &'a ExportObject,
        settings: &'a ExportSettings,
        objects: &'a dyn ExportObjectResolver,
        templates: &'a dyn TemplateSource,
        conditions: &'a ConditionRegistry,
        actions: &'a ActionRegistry,
        language_keys: &'a mut dyn LanguageKeyGenerator,
        errors: &'a mut ErrorCollection,
    ) -> Self {
        Self {
            project_id,
            owner,
            settings,
            objects,
            conditions,
            actions,
            language_keys,
            errors,
            templates,
            template_cache: FxHashMap::default(),
        }
    }

    /// The template text for a type. A missing template is reported once
    /// per pass.
    pub fn template(&mut self, template_type: TemplateType) -> Option<String> {
        if let Some(cached) = self.template_cache.get(&template_type) {
            return cached.clone();
        }
        let text = self.templates.template(self.project_id, template_type);
        if text.is_none() {
            self.errors.add(
                ExportErrorKind::MissingTemplate,
                format!("no template for {:?}", template_type),
            );
        }
        self.template_cache.insert(template_type, text.clone());
        text
    }

    pub fn escape(&self, text: &str) -> String {
        self.settings.escape(text)
    }

    pub fn preview(&self, text: &str) -> String {
        self.settings.preview(text)
    }

    /// Run `f` with an extra error context frame.
    pub fn with_error_context<R>(
        &mut self,
        context: impl Into<String>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let depth = self.errors.enter_context(context);
        let result = f(self);
        self.errors.restore_context(depth);
        result
    }

    pub fn resolve_object(&self, kind: ObjectKind, id: &str) -> Result<&'a ExportObject, RenderError> {
        let objects = self.objects;
        objects
            .resolve(kind, id)
            .ok_or_else(|| RenderError::MissingObject {
                kind,
                id: id.to_string(),
            })
    }

    /// Resolve an npc, falling back to the dialog owner for an empty id.
    pub fn resolve_npc(&self, id: Option<&str>) -> Result<&'a ExportObject, RenderError> {
        match id.map(str::trim) {
            None | Some("") => Ok(self.owner),
            Some(id) if id == self.owner.id => Ok(self.owner),
            Some(id) => self.resolve_object(ObjectKind::Npc, id),
        }
    }

    pub fn player(&self) -> Result<&'a ExportObject, RenderError> {
        let objects = self.objects;
        objects.player().ok_or(RenderError::MissingPlayer)
    }

    /// Target spelling of a compare operator.
    pub fn compare_operator(&mut self, operator: &str) -> Result<String, RenderError> {
        let template_type = match operator.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => TemplateType::GeneralCompareOperatorEqual,
            "!=" | "<>" => TemplateType::GeneralCompareOperatorNotEqual,
            "<" => TemplateType::GeneralCompareOperatorLess,
            "<=" => TemplateType::GeneralCompareOperatorLessOrEqual,
            ">" => TemplateType::GeneralCompareOperatorBigger,
            ">=" => TemplateType::GeneralCompareOperatorBiggerOrEqual,
            "contains" => TemplateType::GeneralCompareOperatorContains,
            _ => return Err(RenderError::UnknownOperator(operator.to_string())),
        };
        Ok(self.template(template_type).unwrap_or_default())
    }

    /// Target spelling of the logical and / or joiner.
    pub fn logic_operator(&mut self, or: bool) -> String {
        let template_type = if or {
            TemplateType::GeneralLogicOr
        } else {
            TemplateType::GeneralLogicAnd
        };
        self.template(template_type).unwrap_or_default()
    }

    pub fn fill_flex_fields(&mut self, code: &str, prefix: &str, object: &ExportObject) -> String {
        FlexFieldResolver::new(prefix).fill(code, object, self.settings, &mut *self.errors)
    }

    /// Values of the `Text`, `Text_Preview` and `Text_LangKey` style
    /// placeholders of one free text. The language key is only generated
    /// when its placeholder occurs in `code`.
    pub fn text_values(
        &mut self,
        code: &str,
        name: &str,
        field_key: &str,
        text: &str,
    ) -> Vec<(String, String)> {
        let mut values = vec![
            (name.to_string(), self.settings.escape(text)),
            (format!("{}_Preview", name), self.settings.preview(text)),
        ];
        // Keys are grouped under the dialog owner
        values.extend(language_key::generate_keys(
            code,
            &self.owner.id,
            vec![LanguageKeyRequest::new(format!("{}_LangKey", name), field_key, text)],
            &mut *self.language_keys,
        ));
        values
    }

    /// Fills the placeholders of one free text in a single pass, so the
    /// text itself is never read as template code.
    pub fn fill_text(&mut self, code: &str, name: &str, field_key: &str, text: &str) -> String {
        let values = self.text_values(code, name, field_key, text);
        placeholder::replace_indented_all(code, &values)
    }
}

/// Decode a condition or action payload. A missing payload decodes like an
/// empty object.
pub(crate) fn decode_payload<T: serde::de::DeserializeOwned>(
    data: &Value,
) -> Result<T, RenderError> {
    Ok(payload::decode(data)?)
}

#[cfg(test)]
pub(crate) mod fixture {
    //! Owned collaborators for building a `RenderContext` in tests.
    use super::*;
    use crate::core::language_key::InMemoryLanguageKeys;
    use crate::core::template::TemplateSet;
    use crate::schema::object::{FlexFieldValue, ObjectCatalog};

    pub struct RenderFixture {
        pub owner: ExportObject,
        pub settings: ExportSettings,
        pub objects: ObjectCatalog,
        pub templates: TemplateSet,
        pub conditions: ConditionRegistry,
        pub actions: ActionRegistry,
        pub language_keys: InMemoryLanguageKeys,
        pub errors: ErrorCollection,
    }

    impl RenderFixture {
        pub fn new() -> Self {
            let owner = ExportObject::new("npc-1", "Innkeeper")
                .with_field("Gold", FlexFieldValue::Number(50.0));
            let mut objects = ObjectCatalog::new().with_player(
                ExportObject::new("player", "Hero")
                    .with_field("Health", FlexFieldValue::Number(100.0))
                    .with_field("Title", FlexFieldValue::Text("Sir".to_string())),
            );
            objects.insert(ObjectKind::Npc, owner.clone());
            objects.insert(
                ObjectKind::Npc,
                ExportObject::new("npc-2", "Guard")
                    .with_field("Mood", FlexFieldValue::Option("Angry".to_string())),
            );
            objects.insert(ObjectKind::Item, ExportObject::new("item-1", "Sword"));
            objects.insert(ObjectKind::Quest, ExportObject::new("quest-1", "Rats"));

            let templates = TemplateSet::default()
                .with(TemplateType::GeneralLogicAnd, " and ")
                .with(TemplateType::GeneralLogicOr, " or ")
                .with(TemplateType::GeneralCompareOperatorEqual, "==")
                .with(TemplateType::GeneralCompareOperatorNotEqual, "~=")
                .with(TemplateType::GeneralCompareOperatorLess, "<")
                .with(TemplateType::GeneralCompareOperatorLessOrEqual, "<=")
                .with(TemplateType::GeneralCompareOperatorBigger, ">")
                .with(TemplateType::GeneralCompareOperatorBiggerOrEqual, ">=")
                .with(TemplateType::GeneralCompareOperatorContains, "contains");

            Self {
                owner,
                settings: ExportSettings::default(),
                objects,
                templates,
                conditions: ConditionRegistry::with_defaults(),
                actions: ActionRegistry::with_defaults(),
                language_keys: InMemoryLanguageKeys::new(),
                errors: ErrorCollection::new(),
            }
        }

        pub fn template(mut self, template_type: TemplateType, text: &str) -> Self {
            self.templates.insert(template_type, text);
            self
        }

        pub fn ctx(&mut self) -> RenderContext<'_> {
            RenderContext::new(
                "project",
                &self.owner,
                &self.settings,
                &self.objects,
                &self.templates,
                &self.conditions,
                &self.actions,
                &mut self.language_keys,
                &mut self.errors,
            )
        }
    }
}
