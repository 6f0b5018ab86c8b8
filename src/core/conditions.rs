/// Condition rendering: one strategy per condition type, dispatched through
/// a registry keyed by the closed `ConditionType` enum.
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;

use crate::core::diagnostics::ExportErrorKind;
use crate::core::flex_field::{format_number, FlexFieldResolver};
use crate::core::placeholder;
use crate::core::render::{
    decode_payload, RenderContext, RenderError, ScalarValue, RENDER_ERROR_SENTINEL,
};
use crate::core::template::{TemplatePlaceholder, TemplateType};
use crate::schema::condition::{ConditionElement, ConditionType, ParsedElement};
use crate::schema::object::{ExportObject, ObjectKind};

pub trait ConditionRenderer {
    /// Human readable name, used as error context.
    fn friendly_name(&self) -> &'static str;
    fn template_type(&self) -> TemplateType;
    fn render(&self, data: &Value, ctx: &mut RenderContext<'_>) -> Result<String, RenderError>;
    fn template_placeholders(&self) -> Vec<TemplatePlaceholder>;
}

pub struct ConditionRegistry {
    renderers: FxHashMap<ConditionType, Box<dyn ConditionRenderer>>,
}

impl Default for ConditionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ConditionRegistry {
    /// An empty registry. Every condition renders as unknown.
    pub fn new() -> Self {
        Self {
            renderers: FxHashMap::default(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ConditionType::Group, Box::new(GroupCondition));
        registry.register(
            ConditionType::CheckPlayerValue,
            Box::new(ValueCondition::new(ValueSubject::Player)),
        );
        registry.register(
            ConditionType::CheckNpcValue,
            Box::new(ValueCondition::new(ValueSubject::Npc)),
        );
        registry.register(
            ConditionType::CheckQuestValue,
            Box::new(ValueCondition::new(ValueSubject::Quest)),
        );
        registry.register(
            ConditionType::CheckPlayerInventory,
            Box::new(InventoryCondition { npc: false }),
        );
        registry.register(
            ConditionType::CheckNpcInventory,
            Box::new(InventoryCondition { npc: true }),
        );
        registry.register(ConditionType::CheckQuestState, Box::new(QuestStateCondition));
        registry.register(ConditionType::CheckNpcAlive, Box::new(NpcAliveCondition));
        registry.register(ConditionType::CheckGameTime, Box::new(GameTimeCondition));
        registry.register(ConditionType::CheckRandomValue, Box::new(RandomValueCondition));
        registry
    }

    pub fn register(&mut self, condition_type: ConditionType, renderer: Box<dyn ConditionRenderer>) {
        self.renderers.insert(condition_type, renderer);
    }

    pub fn get(&self, condition_type: ConditionType) -> Option<&dyn ConditionRenderer> {
        self.renderers.get(&condition_type).map(|r| r.as_ref())
    }

    /// Render one element. Unknown types render as empty text; failing
    /// strategies render as the error sentinel.
    pub fn render_element(&self, element: &ConditionElement, ctx: &mut RenderContext<'_>) -> String {
        let Some(renderer) = element.condition_type().and_then(|ty| self.get(ty)) else {
            ctx.errors.add(
                ExportErrorKind::UnknownConditionType,
                format!("unknown condition type {}", element.type_id),
            );
            return String::new();
        };

        ctx.with_error_context(renderer.friendly_name(), |ctx| {
            match renderer.render(&element.data, ctx) {
                Ok(code) => code,
                Err(err) => {
                    ctx.errors
                        .add(err.diagnostic_kind(ExportErrorKind::ConditionRenderFailed), err.to_string());
                    RENDER_ERROR_SENTINEL.to_string()
                }
            }
        })
    }

    /// Render a list of elements joined by the and / or operator template.
    /// Elements that render empty are left out of the join, as are elements
    /// that failed to decode (reported as unknown).
    pub fn render_elements(
        &self,
        elements: &[ParsedElement],
        or: bool,
        ctx: &mut RenderContext<'_>,
    ) -> String {
        let parts: Vec<String> = elements
            .iter()
            .map(|element| match element {
                Ok(element) => self.render_element(element, ctx),
                Err(err) => {
                    ctx.errors.add(
                        ExportErrorKind::UnknownConditionType,
                        format!("invalid condition element: {}", err),
                    );
                    String::new()
                }
            })
            .filter(|code| !code.is_empty())
            .collect();
        if parts.len() < 2 {
            return parts.concat();
        }
        let joiner = ctx.logic_operator(or);
        parts.join(&joiner)
    }

    /// Render a raw condition list (JSON array or JSON text), joining the
    /// top-level elements with the and operator.
    pub fn render_condition_list(&self, raw: &Value, ctx: &mut RenderContext<'_>) -> String {
        match ConditionElement::parse_list(raw) {
            Ok(elements) => self.render_elements(&elements, false, ctx),
            Err(err) => {
                ctx.errors.add(
                    ExportErrorKind::ConditionRenderFailed,
                    format!("invalid condition list: {}", err),
                );
                RENDER_ERROR_SENTINEL.to_string()
            }
        }
    }

    /// Placeholders understood by a condition template type.
    pub fn placeholders_for(&self, template_type: TemplateType) -> Vec<TemplatePlaceholder> {
        let mut renderers: Vec<(&ConditionType, &Box<dyn ConditionRenderer>)> =
            self.renderers.iter().collect();
        renderers.sort_by_key(|(ty, _)| ty.id());
        renderers
            .into_iter()
            .find(|(_, r)| r.template_type() == template_type)
            .map(|(_, r)| r.template_placeholders())
            .unwrap_or_default()
    }
}

fn operator_placeholder() -> TemplatePlaceholder {
    TemplatePlaceholder::new("Tale_Condition_Operator", "Compare operator of the condition")
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GroupData {
    operator: String,
    #[serde(rename = "conditionelements")]
    elements: Vec<Value>,
}

/// A nested list of conditions joined with and / or.
struct GroupCondition;

impl ConditionRenderer for GroupCondition {
    fn friendly_name(&self) -> &'static str {
        "Group"
    }

    fn template_type(&self) -> TemplateType {
        TemplateType::TaleConditionGroup
    }

    fn render(&self, data: &Value, ctx: &mut RenderContext<'_>) -> Result<String, RenderError> {
        let group: GroupData = decode_payload(data)?;
        let or = match group.operator.trim().to_ascii_lowercase().as_str() {
            "" | "and" | "&&" => false,
            "or" | "||" => true,
            other => return Err(RenderError::UnknownOperator(other.to_string())),
        };
        let Some(template) = ctx.template(self.template_type()) else {
            return Ok(String::new());
        };

        let elements: Vec<ParsedElement> = group
            .elements
            .into_iter()
            .map(ConditionElement::from_value)
            .collect();
        let registry = ctx.conditions;
        let content = registry.render_elements(&elements, or, ctx);
        Ok(placeholder::replace(&template, "Tale_Condition_Group_Content", &content))
    }

    fn template_placeholders(&self) -> Vec<TemplatePlaceholder> {
        vec![TemplatePlaceholder::new(
            "Tale_Condition_Group_Content",
            "The conditions of the group, joined by the logic operator",
        )]
    }
}

#[derive(Debug, Clone, Copy)]
enum ValueSubject {
    Player,
    Npc,
    Quest,
}

impl ValueSubject {
    fn prefix(self) -> &'static str {
        match self {
            Self::Player => "Tale_Condition_Player",
            Self::Npc => "Tale_Condition_Npc",
            Self::Quest => "Tale_Condition_Quest",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ValueCheckData {
    #[serde(rename = "npcid")]
    npc_id: Option<String>,
    #[serde(rename = "questid")]
    quest_id: String,
    #[serde(rename = "fieldname")]
    field_name: String,
    operator: String,
    #[serde(rename = "comparevalue")]
    compare_value: ScalarValue,
}

/// Compares a flex field of the player, an npc or a quest.
struct ValueCondition {
    subject: ValueSubject,
}

impl ValueCondition {
    fn new(subject: ValueSubject) -> Self {
        Self { subject }
    }

    fn subject<'a>(
        &self,
        data: &ValueCheckData,
        ctx: &RenderContext<'a>,
    ) -> Result<&'a ExportObject, RenderError> {
        match self.subject {
            ValueSubject::Player => ctx.player(),
            ValueSubject::Npc => ctx.resolve_npc(data.npc_id.as_deref()),
            ValueSubject::Quest => ctx.resolve_object(ObjectKind::Quest, &data.quest_id),
        }
    }
}

impl ConditionRenderer for ValueCondition {
    fn friendly_name(&self) -> &'static str {
        match self.subject {
            ValueSubject::Player => "Check Player Value",
            ValueSubject::Npc => "Check Npc Value",
            ValueSubject::Quest => "Check Quest Value",
        }
    }

    fn template_type(&self) -> TemplateType {
        match self.subject {
            ValueSubject::Player => TemplateType::TaleConditionCheckPlayerValue,
            ValueSubject::Npc => TemplateType::TaleConditionCheckNpcValue,
            ValueSubject::Quest => TemplateType::TaleConditionCheckQuestValue,
        }
    }

    fn render(&self, data: &Value, ctx: &mut RenderContext<'_>) -> Result<String, RenderError> {
        let data: ValueCheckData = decode_payload(data)?;
        let object = self.subject(&data, ctx)?;
        let field = object
            .field(&data.field_name)
            .ok_or_else(|| RenderError::MissingField {
                object: object.name.clone(),
                field: data.field_name.clone(),
            })?;
        let operator = ctx.compare_operator(&data.operator)?;
        let Some(template) = ctx.template(self.template_type()) else {
            return Ok(String::new());
        };

        let is_number = field.value.is_number();
        let compare_value = match (&data.compare_value, is_number) {
            (ScalarValue::Text(text), true) => match text.trim().parse::<f64>() {
                Ok(number) => format_number(number),
                Err(_) => ctx.escape(text),
            },
            (value, _) => value.render(ctx.settings),
        };

        let code = placeholder::render_if(
            &template,
            "Tale_Condition_IsString_Start",
            "Tale_Condition_IsString_End",
            !is_number,
        );
        let code = placeholder::render_if(
            &code,
            "Tale_Condition_IsNumber_Start",
            "Tale_Condition_IsNumber_End",
            is_number,
        );
        let code = ctx.fill_flex_fields(&code, self.subject.prefix(), object);
        Ok(placeholder::replace_indented_all(
            &code,
            &[
                ("Tale_Condition_Field_Name", field.name.as_str()),
                ("Tale_Condition_Operator", operator.as_str()),
                ("Tale_Condition_CompareValue", compare_value.as_str()),
            ],
        ))
    }

    fn template_placeholders(&self) -> Vec<TemplatePlaceholder> {
        let mut placeholders = vec![
            TemplatePlaceholder::new("Tale_Condition_Field_Name", "Name of the compared field"),
            operator_placeholder(),
            TemplatePlaceholder::new("Tale_Condition_CompareValue", "Value to compare against"),
            TemplatePlaceholder::new(
                "Tale_Condition_IsString_Start",
                "Start of content rendered only for text fields",
            ),
            TemplatePlaceholder::new("Tale_Condition_IsString_End", "End of text-only content"),
            TemplatePlaceholder::new(
                "Tale_Condition_IsNumber_Start",
                "Start of content rendered only for number fields",
            ),
            TemplatePlaceholder::new("Tale_Condition_IsNumber_End", "End of number-only content"),
        ];
        placeholders.extend(FlexFieldResolver::new(self.subject.prefix()).placeholders());
        placeholders
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InventoryData {
    #[serde(rename = "npcid")]
    npc_id: Option<String>,
    #[serde(rename = "itemid")]
    item_id: String,
    operator: String,
    quantity: f64,
}

/// Checks the item count in the player's or an npc's inventory.
struct InventoryCondition {
    npc: bool,
}

impl ConditionRenderer for InventoryCondition {
    fn friendly_name(&self) -> &'static str {
        if self.npc {
            "Check Npc Inventory"
        } else {
            "Check Player Inventory"
        }
    }

    fn template_type(&self) -> TemplateType {
        if self.npc {
            TemplateType::TaleConditionCheckNpcInventory
        } else {
            TemplateType::TaleConditionCheckPlayerInventory
        }
    }

    fn render(&self, data: &Value, ctx: &mut RenderContext<'_>) -> Result<String, RenderError> {
        let data: InventoryData = decode_payload(data)?;
        let item = ctx.resolve_object(ObjectKind::Item, &data.item_id)?;
        let npc = if self.npc {
            Some(ctx.resolve_npc(data.npc_id.as_deref())?)
        } else {
            None
        };
        let operator = ctx.compare_operator(&data.operator)?;
        let Some(template) = ctx.template(self.template_type()) else {
            return Ok(String::new());
        };

        let code = placeholder::replace(&template, "Tale_Condition_Operator", &operator);
        let code = placeholder::replace(&code, "Tale_Condition_Quantity", &format_number(data.quantity));
        let mut code = ctx.fill_flex_fields(&code, "Tale_Condition_Item", item);
        if let Some(npc) = npc {
            code = ctx.fill_flex_fields(&code, "Tale_Condition_Npc", npc);
        }
        Ok(code)
    }

    fn template_placeholders(&self) -> Vec<TemplatePlaceholder> {
        let mut placeholders = vec![
            operator_placeholder(),
            TemplatePlaceholder::new("Tale_Condition_Quantity", "Item count to compare against"),
        ];
        placeholders.extend(FlexFieldResolver::new("Tale_Condition_Item").placeholders());
        if self.npc {
            placeholders.extend(FlexFieldResolver::new("Tale_Condition_Npc").placeholders());
        }
        placeholders
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuestStateData {
    #[serde(rename = "questid")]
    quest_id: String,
    state: String,
}

struct QuestStateCondition;

impl ConditionRenderer for QuestStateCondition {
    fn friendly_name(&self) -> &'static str {
        "Check Quest State"
    }

    fn template_type(&self) -> TemplateType {
        TemplateType::TaleConditionCheckQuestState
    }

    fn render(&self, data: &Value, ctx: &mut RenderContext<'_>) -> Result<String, RenderError> {
        let data: QuestStateData = decode_payload(data)?;
        let quest = ctx.resolve_object(ObjectKind::Quest, &data.quest_id)?;
        let Some(template) = ctx.template(self.template_type()) else {
            return Ok(String::new());
        };
        let code = placeholder::replace(&template, "Tale_Condition_QuestState", &ctx.escape(&data.state));
        Ok(ctx.fill_flex_fields(&code, "Tale_Condition_Quest", quest))
    }

    fn template_placeholders(&self) -> Vec<TemplatePlaceholder> {
        let mut placeholders = vec![TemplatePlaceholder::new(
            "Tale_Condition_QuestState",
            "The quest state to check for",
        )];
        placeholders.extend(FlexFieldResolver::new("Tale_Condition_Quest").placeholders());
        placeholders
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct NpcAliveData {
    #[serde(rename = "npcid")]
    npc_id: Option<String>,
    #[serde(rename = "isalive")]
    is_alive: bool,
}

impl Default for NpcAliveData {
    fn default() -> Self {
        Self {
            npc_id: None,
            is_alive: true,
        }
    }
}

struct NpcAliveCondition;

impl ConditionRenderer for NpcAliveCondition {
    fn friendly_name(&self) -> &'static str {
        "Check Npc Alive"
    }

    fn template_type(&self) -> TemplateType {
        TemplateType::TaleConditionCheckNpcAlive
    }

    fn render(&self, data: &Value, ctx: &mut RenderContext<'_>) -> Result<String, RenderError> {
        let data: NpcAliveData = decode_payload(data)?;
        let npc = ctx.resolve_npc(data.npc_id.as_deref())?;
        let Some(template) = ctx.template(self.template_type()) else {
            return Ok(String::new());
        };
        let code = placeholder::render_if(
            &template,
            "Tale_Condition_IsAlive_Start",
            "Tale_Condition_IsAlive_End",
            data.is_alive,
        );
        let code = placeholder::render_if(
            &code,
            "Tale_Condition_IsDead_Start",
            "Tale_Condition_IsDead_End",
            !data.is_alive,
        );
        Ok(ctx.fill_flex_fields(&code, "Tale_Condition_Npc", npc))
    }

    fn template_placeholders(&self) -> Vec<TemplatePlaceholder> {
        let mut placeholders = vec![
            TemplatePlaceholder::new(
                "Tale_Condition_IsAlive_Start",
                "Start of content rendered if the npc must be alive",
            ),
            TemplatePlaceholder::new("Tale_Condition_IsAlive_End", "End of alive content"),
            TemplatePlaceholder::new(
                "Tale_Condition_IsDead_Start",
                "Start of content rendered if the npc must be dead",
            ),
            TemplatePlaceholder::new("Tale_Condition_IsDead_End", "End of dead content"),
        ];
        placeholders.extend(FlexFieldResolver::new("Tale_Condition_Npc").placeholders());
        placeholders
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GameTimeData {
    operator: String,
    hour: i64,
    minutes: i64,
}

struct GameTimeCondition;

impl ConditionRenderer for GameTimeCondition {
    fn friendly_name(&self) -> &'static str {
        "Check Game Time"
    }

    fn template_type(&self) -> TemplateType {
        TemplateType::TaleConditionCheckGameTime
    }

    fn render(&self, data: &Value, ctx: &mut RenderContext<'_>) -> Result<String, RenderError> {
        let data: GameTimeData = decode_payload(data)?;
        if !(0..24).contains(&data.hour) || !(0..60).contains(&data.minutes) {
            return Err(RenderError::InvalidValue {
                field: "game time",
                value: format!("{}:{:02}", data.hour, data.minutes),
            });
        }
        let operator = ctx.compare_operator(&data.operator)?;
        let Some(template) = ctx.template(self.template_type()) else {
            return Ok(String::new());
        };
        let code = placeholder::replace(&template, "Tale_Condition_Operator", &operator);
        let code = placeholder::replace(&code, "Tale_Condition_Hour", &data.hour.to_string());
        let code = placeholder::replace(&code, "Tale_Condition_Minutes", &data.minutes.to_string());
        Ok(placeholder::replace(
            &code,
            "Tale_Condition_TotalMinutes",
            &(data.hour * 60 + data.minutes).to_string(),
        ))
    }

    fn template_placeholders(&self) -> Vec<TemplatePlaceholder> {
        vec![
            operator_placeholder(),
            TemplatePlaceholder::new("Tale_Condition_Hour", "Hour of the compared time"),
            TemplatePlaceholder::new("Tale_Condition_Minutes", "Minutes of the compared time"),
            TemplatePlaceholder::new(
                "Tale_Condition_TotalMinutes",
                "Compared time as minutes since midnight",
            ),
        ]
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RandomValueData {
    operator: String,
    #[serde(rename = "minvalue")]
    min_value: f64,
    #[serde(rename = "maxvalue")]
    max_value: f64,
    #[serde(rename = "comparevalue")]
    compare_value: f64,
}

struct RandomValueCondition;

impl ConditionRenderer for RandomValueCondition {
    fn friendly_name(&self) -> &'static str {
        "Check Random Value"
    }

    fn template_type(&self) -> TemplateType {
        TemplateType::TaleConditionCheckRandomValue
    }

    fn render(&self, data: &Value, ctx: &mut RenderContext<'_>) -> Result<String, RenderError> {
        let data: RandomValueData = decode_payload(data)?;
        let operator = ctx.compare_operator(&data.operator)?;
        let Some(template) = ctx.template(self.template_type()) else {
            return Ok(String::new());
        };
        let code = placeholder::replace(&template, "Tale_Condition_Operator", &operator);
        let code = placeholder::replace(&code, "Tale_Condition_MinValue", &format_number(data.min_value));
        let code = placeholder::replace(&code, "Tale_Condition_MaxValue", &format_number(data.max_value));
        Ok(placeholder::replace(
            &code,
            "Tale_Condition_CompareValue",
            &format_number(data.compare_value),
        ))
    }

    fn template_placeholders(&self) -> Vec<TemplatePlaceholder> {
        vec![
            operator_placeholder(),
            TemplatePlaceholder::new("Tale_Condition_MinValue", "Lower bound of the random value"),
            TemplatePlaceholder::new("Tale_Condition_MaxValue", "Upper bound of the random value"),
            TemplatePlaceholder::new("Tale_Condition_CompareValue", "Value to compare against"),
        ]
    }
}
