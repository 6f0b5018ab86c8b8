/// Dialog step rendering.
///
/// Each node kind has a `StepRenderer`. Rendering a step also renders what
/// follows it: children that start their own function become function
/// calls, all other children are rendered inline.
use serde_json::Value;

use crate::core::actions::NEXT_STEP_PLACEHOLDER;
use crate::core::diagnostics::ExportErrorKind;
use crate::core::extraction::DialogFunction;
use crate::core::graph::{DialogGraph, NodeIdx, NodeKind, PortId};
use crate::core::placeholder;
use crate::core::render::RenderContext;
use crate::core::template::{TemplatePlaceholder, TemplateType};
use crate::schema::dialog::{ChoiceOption, Speaker};

pub trait StepRenderer {
    /// Render the step at `idx`, or `None` if this renderer does not
    /// handle the node's kind.
    fn render_step(&self, idx: NodeIdx, cx: &mut StepContext<'_>) -> Option<String>;

    /// Describe `parent` as seen from its child `child`, or `None` if this
    /// renderer does not handle the parent's kind.
    fn parent_preview(&self, parent: NodeIdx, child: NodeIdx, cx: &mut StepContext<'_>)
        -> Option<String>;

    fn template_placeholders(&self, _template_type: TemplateType) -> Vec<TemplatePlaceholder> {
        Vec::new()
    }
}

/// The default renderers, one per node kind.
pub fn default_step_renderers() -> Vec<Box<dyn StepRenderer>> {
    vec![
        Box::new(TextLineStep),
        Box::new(ChoiceStep),
        Box::new(ConditionStep),
        Box::new(ActionStep),
        Box::new(ReferenceStep),
    ]
}

/// State of rendering the functions of one dialog.
pub struct StepContext<'a> {
    pub graph: &'a DialogGraph,
    pub render: RenderContext<'a>,
    renderers: &'a [Box<dyn StepRenderer>],
    inline_stack: Vec<NodeIdx>,
    /// Set by `fill_next_step`: the node continuing the step just rendered.
    deferred_next: Option<Option<NodeIdx>>,
}

impl<'a> StepContext<'a> {
    pub fn new(
        graph: &'a DialogGraph,
        renderers: &'a [Box<dyn StepRenderer>],
        render: RenderContext<'a>,
    ) -> Self {
        Self {
            graph,
            render,
            renderers,
            inline_stack: Vec::new(),
            deferred_next: None,
        }
    }

    /// Render a node and everything inlined after it.
    ///
    /// A linear run of steps is walked in a loop and folded back from its
    /// end, so its length is not bounded by the call stack. Only branches
    /// recurse.
    pub fn render_node(&mut self, idx: NodeIdx) -> String {
        let graph = self.graph;
        let depth = self.inline_stack.len();
        let mut run = Vec::new();
        let mut tail = String::new();
        let mut current = Some(idx);

        while let Some(idx) = current.take() {
            let node = graph.node(idx);
            if self.inline_stack.contains(&idx) {
                self.render.errors.add(
                    ExportErrorKind::UnsplitCycle,
                    format!("node '{}' is reached again without a function boundary", node.id),
                );
                break;
            }
            self.inline_stack.push(idx);

            let code = self.render_step(idx);
            match self.deferred_next.take() {
                Some(next) => {
                    run.push(code);
                    match next.map(|next| (next, graph.node(next).function_name.as_deref())) {
                        Some((_, Some(name))) => tail = self.function_call(name),
                        Some((next, None)) => current = Some(next),
                        None => {}
                    }
                }
                None => tail = code,
            }
        }
        self.inline_stack.truncate(depth);

        run.into_iter().rev().fold(tail, |continuation, code| {
            placeholder::replace_indented(&code, NEXT_STEP_PLACEHOLDER, &continuation)
        })
    }

    fn render_step(&mut self, idx: NodeIdx) -> String {
        self.deferred_next = None;
        let renderers = self.renderers;
        if let Some(code) = renderers
            .iter()
            .find_map(|renderer| renderer.render_step(idx, self))
        {
            return code;
        }

        let node = self.graph.node(idx);
        self.render.errors.add(
            ExportErrorKind::UnknownNodeType,
            format!("no renderer for node '{}' ({})", node.id, node.kind.step_kind().name()),
        );
        String::new()
    }

    /// The code that continues the dialog at `child`.
    pub fn render_continuation(&mut self, child: Option<NodeIdx>) -> String {
        let Some(child) = child else {
            return String::new();
        };
        let graph = self.graph;
        match &graph.node(child).function_name {
            Some(name) => self.function_call(name),
            None => self.render_node(child),
        }
    }

    pub fn function_call(&mut self, name: &str) -> String {
        match self.render.template(TemplateType::TaleFunctionCall) {
            Some(template) => placeholder::replace(&template, "Tale_Function_Name", name),
            None => String::new(),
        }
    }

    /// Mark `{{Tale_Next_Step}}` of a linear node for its continuation.
    /// The placeholder stays in the returned code; `render_node` fills it
    /// once the rest of the run is rendered. Call it last in `render_step`.
    pub fn fill_next_step(&mut self, code: &str, idx: NodeIdx) -> String {
        if placeholder::is_present(code, NEXT_STEP_PLACEHOLDER) {
            self.deferred_next = Some(self.graph.node(idx).next());
        }
        code.to_string()
    }

    pub fn parent_preview(&mut self, parent: NodeIdx, child: NodeIdx) -> String {
        let renderers = self.renderers;
        renderers
            .iter()
            .find_map(|renderer| renderer.parent_preview(parent, child, self))
            .unwrap_or_default()
    }

    /// Previews of every parent of a function root, joined with `; `.
    pub fn function_parent_preview(&mut self, function: &DialogFunction) -> String {
        let graph = self.graph;
        graph
            .node(function.root)
            .parents
            .iter()
            .map(|parent| self.parent_preview(*parent, function.root))
            .filter(|preview| !preview.is_empty())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

fn next_step_placeholder() -> TemplatePlaceholder {
    TemplatePlaceholder::new(NEXT_STEP_PLACEHOLDER, "The step that follows this one")
}

fn text_placeholders(name: &str, what: &str) -> Vec<TemplatePlaceholder> {
    vec![
        TemplatePlaceholder::new(name, format!("{}, escaped", what)),
        TemplatePlaceholder::new(format!("{}_Preview", name), format!("Short preview of the {}", what)),
        TemplatePlaceholder::new(format!("{}_LangKey", name), format!("Language key of the {}", what)),
    ]
}

struct TextLineStep;

impl StepRenderer for TextLineStep {
    fn render_step(&self, idx: NodeIdx, cx: &mut StepContext<'_>) -> Option<String> {
        let graph = cx.graph;
        let NodeKind::TextLine(line) = &graph.node(idx).kind else {
            return None;
        };
        let template_type = match line.speaker {
            Speaker::Player => TemplateType::TalePlayerTextLine,
            Speaker::Npc => TemplateType::TaleNpcTextLine,
        };
        let Some(template) = cx.render.template(template_type) else {
            return Some(String::new());
        };

        let owner = cx.render.owner;
        let code = cx.render.fill_flex_fields(&template, "Tale_Npc", owner);
        let code = cx.render.fill_text(
            &code,
            "Tale_TextLine",
            &format!("TextLine_{}", line.id),
            &line.text,
        );
        Some(cx.fill_next_step(&code, idx))
    }

    fn parent_preview(
        &self,
        parent: NodeIdx,
        _child: NodeIdx,
        cx: &mut StepContext<'_>,
    ) -> Option<String> {
        let NodeKind::TextLine(line) = &cx.graph.node(parent).kind else {
            return None;
        };
        let speaker = match line.speaker {
            Speaker::Player => "Player",
            Speaker::Npc => "Npc",
        };
        Some(format!("{}: '{}'", speaker, cx.render.preview(&line.text)))
    }

    fn template_placeholders(&self, template_type: TemplateType) -> Vec<TemplatePlaceholder> {
        match template_type {
            TemplateType::TalePlayerTextLine | TemplateType::TaleNpcTextLine => {
                let mut placeholders = text_placeholders("Tale_TextLine", "text line");
                placeholders.push(next_step_placeholder());
                placeholders
            }
            _ => Vec::new(),
        }
    }
}

/// Whether a condition payload holds anything to render.
fn has_conditions(raw: Option<&Value>) -> bool {
    match raw {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => {
            let text = text.trim();
            !text.is_empty() && text != "[]"
        }
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

struct ChoiceStep;

impl ChoiceStep {
    fn render_option(
        &self,
        inner: &str,
        node_idx: NodeIdx,
        position: usize,
        option: &ChoiceOption,
        cx: &mut StepContext<'_>,
    ) -> String {
        let graph = cx.graph;
        let node = graph.node(node_idx);
        let child = node.child_for_port(PortId::Index(option.id));

        let condition = if has_conditions(option.condition_elements.as_ref()) {
            let conditions = cx.render.conditions;
            let raw = option.condition_elements.as_ref().unwrap_or(&Value::Null);
            conditions.render_condition_list(raw, &mut cx.render)
        } else {
            String::new()
        };

        let code = placeholder::render_if(
            inner,
            "Tale_Choice_HasCondition_Start",
            "Tale_Choice_HasCondition_End",
            !condition.is_empty(),
        );
        let code = placeholder::render_if(
            &code,
            "Tale_Choice_IsRepeatable_Start",
            "Tale_Choice_IsRepeatable_End",
            option.is_repeatable,
        );
        let code = placeholder::render_if(
            &code,
            "Tale_Choice_IsNotRepeatable_Start",
            "Tale_Choice_IsNotRepeatable_End",
            !option.is_repeatable,
        );
        let code = placeholder::render_if(
            &code,
            "Tale_Choice_HasChild_Start",
            "Tale_Choice_HasChild_End",
            child.is_some(),
        );

        // Author text and nested code go in last, in one pass
        let mut values = cx.render.text_values(
            &code,
            "Tale_Choice_Text",
            &format!("Choice_{}_{}", node.id, option.id),
            &option.text,
        );
        values.push(("Tale_Choice_Id".to_string(), option.id.to_string()));
        values.push(("Tale_Choice_Index".to_string(), position.to_string()));
        values.push(("Tale_Choice_Condition".to_string(), condition));
        if placeholder::is_present(&code, "Tale_Choice_Child") {
            values.push(("Tale_Choice_Child".to_string(), cx.render_continuation(child)));
        }
        placeholder::replace_indented_all(&code, &values)
    }
}

impl StepRenderer for ChoiceStep {
    fn render_step(&self, idx: NodeIdx, cx: &mut StepContext<'_>) -> Option<String> {
        let graph = cx.graph;
        let NodeKind::Choice(choice) = &graph.node(idx).kind else {
            return None;
        };
        let Some(template) = cx.render.template(TemplateType::TaleChoice) else {
            return Some(String::new());
        };
        let owner = cx.render.owner;
        let template = cx.render.fill_flex_fields(&template, "Tale_Npc", owner);

        Some(placeholder::render_list(&template, "Tale_Choices_Start", "Tale_Choices_End", |inner| {
            choice
                .choices
                .iter()
                .enumerate()
                .map(|(i, option)| self.render_option(inner, idx, i + 1, option, cx))
                .collect::<Vec<_>>()
                .join("\n")
        }))
    }

    fn parent_preview(
        &self,
        parent: NodeIdx,
        child: NodeIdx,
        cx: &mut StepContext<'_>,
    ) -> Option<String> {
        let node = cx.graph.node(parent);
        let NodeKind::Choice(choice) = &node.kind else {
            return None;
        };
        let texts: Vec<String> = choice
            .choices
            .iter()
            .filter(|option| node.child_for_port(PortId::Index(option.id)) == Some(child))
            .map(|option| format!("'{}'", cx.render.preview(&option.text)))
            .collect();
        if texts.is_empty() {
            Some("Choice".to_string())
        } else {
            Some(format!("Choice: {}", texts.join(", ")))
        }
    }

    fn template_placeholders(&self, template_type: TemplateType) -> Vec<TemplatePlaceholder> {
        if template_type != TemplateType::TaleChoice {
            return Vec::new();
        }
        let mut placeholders = vec![
            TemplatePlaceholder::new("Tale_Choices_Start", "Start of the block repeated per choice"),
            TemplatePlaceholder::new("Tale_Choices_End", "End of the block repeated per choice"),
            TemplatePlaceholder::new("Tale_Choice_Id", "Id of the choice"),
            TemplatePlaceholder::new("Tale_Choice_Index", "Position of the choice, starting at 1"),
        ];
        placeholders.extend(text_placeholders("Tale_Choice_Text", "choice text"));
        placeholders.extend([
            TemplatePlaceholder::new("Tale_Choice_Condition", "Condition gating the choice"),
            TemplatePlaceholder::new(
                "Tale_Choice_HasCondition_Start",
                "Start of content rendered only if the choice has a condition",
            ),
            TemplatePlaceholder::new("Tale_Choice_HasCondition_End", "End of condition content"),
            TemplatePlaceholder::new(
                "Tale_Choice_IsRepeatable_Start",
                "Start of content rendered only for repeatable choices",
            ),
            TemplatePlaceholder::new("Tale_Choice_IsRepeatable_End", "End of repeatable content"),
            TemplatePlaceholder::new(
                "Tale_Choice_IsNotRepeatable_Start",
                "Start of content rendered only for choices that can be picked once",
            ),
            TemplatePlaceholder::new(
                "Tale_Choice_IsNotRepeatable_End",
                "End of non-repeatable content",
            ),
            TemplatePlaceholder::new(
                "Tale_Choice_HasChild_Start",
                "Start of content rendered only if the choice leads somewhere",
            ),
            TemplatePlaceholder::new("Tale_Choice_HasChild_End", "End of child content"),
            TemplatePlaceholder::new("Tale_Choice_Child", "The steps following the choice"),
        ]);
        placeholders
    }
}

struct ConditionStep;

impl StepRenderer for ConditionStep {
    fn render_step(&self, idx: NodeIdx, cx: &mut StepContext<'_>) -> Option<String> {
        let graph = cx.graph;
        let node = graph.node(idx);
        let NodeKind::Condition(condition) = &node.kind else {
            return None;
        };
        let Some(template) = cx.render.template(TemplateType::TaleCondition) else {
            return Some(String::new());
        };
        let owner = cx.render.owner;
        let template = cx.render.fill_flex_fields(&template, "Tale_Npc", owner);
        let else_child = node.child_for_port(PortId::Else);
        let template =
            placeholder::render_if(&template, "Tale_Else_Start", "Tale_Else_End", else_child.is_some());

        let code = placeholder::render_list(
            &template,
            "Tale_Conditions_Start",
            "Tale_Conditions_End",
            |inner| {
                let mut branches = Vec::with_capacity(condition.conditions.len());
                for (i, branch) in condition.conditions.iter().enumerate() {
                    let conditions = cx.render.conditions;
                    let rendered =
                        conditions.render_condition_list(&branch.condition_elements, &mut cx.render);
                    let code = placeholder::render_if(
                        inner,
                        "Tale_Condition_IsFirst_Start",
                        "Tale_Condition_IsFirst_End",
                        i == 0,
                    );
                    let code = placeholder::render_if(
                        &code,
                        "Tale_Condition_IsNotFirst_Start",
                        "Tale_Condition_IsNotFirst_End",
                        i != 0,
                    );
                    let child = node.child_for_port(PortId::Index(branch.id));
                    let continuation = cx.render_continuation(child);
                    branches.push(placeholder::replace_indented_all(
                        &code,
                        &[
                            ("Tale_Condition_Index", (i + 1).to_string()),
                            ("Tale_Condition_Id", branch.id.to_string()),
                            ("Tale_Condition", rendered),
                            ("Tale_Condition_Child", continuation),
                        ],
                    ));
                }
                branches.join("\n")
            },
        );

        if !placeholder::is_present(&code, "Tale_Else_Child") {
            return Some(code);
        }
        let continuation = cx.render_continuation(else_child);
        Some(placeholder::replace_indented(&code, "Tale_Else_Child", &continuation))
    }

    fn parent_preview(
        &self,
        parent: NodeIdx,
        child: NodeIdx,
        cx: &mut StepContext<'_>,
    ) -> Option<String> {
        let node = cx.graph.node(parent);
        let NodeKind::Condition(condition) = &node.kind else {
            return None;
        };
        let branches: Vec<String> = node
            .children
            .iter()
            .filter(|edge| edge.target == child)
            .map(|edge| match edge.port {
                PortId::Else => "else".to_string(),
                PortId::Index(id) => condition
                    .conditions
                    .iter()
                    .position(|branch| branch.id == id)
                    .map(|position| (position + 1).to_string())
                    .unwrap_or_else(|| id.to_string()),
            })
            .collect();
        if branches.is_empty() {
            Some("Condition".to_string())
        } else {
            Some(format!("Condition: {}", branches.join(", ")))
        }
    }

    fn template_placeholders(&self, template_type: TemplateType) -> Vec<TemplatePlaceholder> {
        if template_type != TemplateType::TaleCondition {
            return Vec::new();
        }
        vec![
            TemplatePlaceholder::new(
                "Tale_Conditions_Start",
                "Start of the block repeated per condition branch",
            ),
            TemplatePlaceholder::new("Tale_Conditions_End", "End of the block repeated per branch"),
            TemplatePlaceholder::new("Tale_Condition", "The rendered condition of the branch"),
            TemplatePlaceholder::new("Tale_Condition_Index", "Position of the branch, starting at 1"),
            TemplatePlaceholder::new("Tale_Condition_Id", "Id of the branch"),
            TemplatePlaceholder::new(
                "Tale_Condition_IsFirst_Start",
                "Start of content rendered only for the first branch",
            ),
            TemplatePlaceholder::new("Tale_Condition_IsFirst_End", "End of first-branch content"),
            TemplatePlaceholder::new(
                "Tale_Condition_IsNotFirst_Start",
                "Start of content rendered for every branch but the first",
            ),
            TemplatePlaceholder::new(
                "Tale_Condition_IsNotFirst_End",
                "End of later-branch content",
            ),
            TemplatePlaceholder::new("Tale_Condition_Child", "The steps following the branch"),
            TemplatePlaceholder::new(
                "Tale_Else_Start",
                "Start of content rendered only if the else branch is connected",
            ),
            TemplatePlaceholder::new("Tale_Else_End", "End of else content"),
            TemplatePlaceholder::new("Tale_Else_Child", "The steps following the else branch"),
        ]
    }
}

struct ActionStep;

impl StepRenderer for ActionStep {
    fn render_step(&self, idx: NodeIdx, cx: &mut StepContext<'_>) -> Option<String> {
        let graph = cx.graph;
        let NodeKind::Action(action) = &graph.node(idx).kind else {
            return None;
        };
        let Some(template) = cx.render.template(TemplateType::TaleAction) else {
            return Some(String::new());
        };

        let actions = cx.render.actions;
        let action_code = actions.render(&action.id, action.action_type, &action.action_data, &mut cx.render);
        // An action that places the next step itself replaces the step's own slot.
        let code = if placeholder::is_present(&action_code, NEXT_STEP_PLACEHOLDER) {
            placeholder::replace_indented(&template, NEXT_STEP_PLACEHOLDER, "")
        } else {
            template
        };
        let code = placeholder::replace_indented(&code, "Tale_Action", &action_code);
        Some(cx.fill_next_step(&code, idx))
    }

    fn parent_preview(
        &self,
        parent: NodeIdx,
        _child: NodeIdx,
        cx: &mut StepContext<'_>,
    ) -> Option<String> {
        let NodeKind::Action(action) = &cx.graph.node(parent).kind else {
            return None;
        };
        let name = cx
            .render
            .actions
            .friendly_name(action.action_type)
            .unwrap_or("Unknown");
        Some(format!("Action: {}", name))
    }

    fn template_placeholders(&self, template_type: TemplateType) -> Vec<TemplatePlaceholder> {
        if template_type != TemplateType::TaleAction {
            return Vec::new();
        }
        vec![
            TemplatePlaceholder::new("Tale_Action", "The rendered action"),
            next_step_placeholder(),
        ]
    }
}

struct ReferenceStep;

impl StepRenderer for ReferenceStep {
    fn render_step(&self, idx: NodeIdx, cx: &mut StepContext<'_>) -> Option<String> {
        let graph = cx.graph;
        let NodeKind::Reference(reference) = &graph.node(idx).kind else {
            return None;
        };
        let Some(template) = cx.render.template(TemplateType::TaleReference) else {
            return Some(String::new());
        };

        let object = reference.referenced_object.as_ref().and_then(|target| {
            match cx.render.resolve_object(target.object_type, &target.object_id) {
                Ok(object) => Some((target.object_type, object)),
                Err(err) => {
                    cx.render
                        .errors
                        .add(ExportErrorKind::MissingReferencedObject, err.to_string());
                    None
                }
            }
        });

        let code = placeholder::render_if(
            &template,
            "Tale_Reference_HasObject_Start",
            "Tale_Reference_HasObject_End",
            object.is_some(),
        );
        let code = match object {
            Some((kind, object)) => {
                let code = placeholder::replace(&code, "Tale_Reference_ObjectType", &kind.to_string());
                cx.render.fill_flex_fields(&code, "Tale_Reference_Object", object)
            }
            None => code,
        };
        let code = cx.render.fill_text(
            &code,
            "Tale_Reference_Text",
            &format!("Reference_{}", reference.id),
            &reference.reference_text,
        );
        Some(cx.fill_next_step(&code, idx))
    }

    fn parent_preview(
        &self,
        parent: NodeIdx,
        _child: NodeIdx,
        cx: &mut StepContext<'_>,
    ) -> Option<String> {
        let NodeKind::Reference(reference) = &cx.graph.node(parent).kind else {
            return None;
        };
        Some(format!(
            "Reference: '{}'",
            cx.render.preview(&reference.reference_text)
        ))
    }

    fn template_placeholders(&self, template_type: TemplateType) -> Vec<TemplatePlaceholder> {
        if template_type != TemplateType::TaleReference {
            return Vec::new();
        }
        let mut placeholders = text_placeholders("Tale_Reference_Text", "reference text");
        placeholders.extend([
            TemplatePlaceholder::new(
                "Tale_Reference_HasObject_Start",
                "Start of content rendered only if the referenced object exists",
            ),
            TemplatePlaceholder::new("Tale_Reference_HasObject_End", "End of object content"),
            TemplatePlaceholder::new(
                "Tale_Reference_ObjectType",
                "Kind of the referenced object: npc, item or quest",
            ),
        ]);
        placeholders.extend(
            crate::core::flex_field::FlexFieldResolver::new("Tale_Reference_Object").placeholders(),
        );
        placeholders.push(next_step_placeholder());
        placeholders
    }
}
