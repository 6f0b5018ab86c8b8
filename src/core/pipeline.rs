/// The export pipeline: dialog record → generated code.
///
/// Wires together graph parsing, loop checking, function extraction and
/// step rendering. Built via `DialogExporter::builder()`.
use std::path::Path;
use thiserror::Error;

use crate::core::actions::ActionRegistry;
use crate::core::conditions::ConditionRegistry;
use crate::core::config::{ConfigError, ExportConfig};
use crate::core::diagnostics::{ErrorCollection, ExportDiagnostic, ExportErrorKind};
use crate::core::extraction::{
    assign_function_names, collect_functions, FunctionIdAllocator, InMemoryFunctionIdAllocator,
};
use crate::core::flex_field::FlexFieldResolver;
use crate::core::graph::DialogGraph;
use crate::core::language_key::{InMemoryLanguageKeys, LanguageKeyGenerator};
use crate::core::loop_check::check_for_infinite_loops;
use crate::core::placeholder;
use crate::core::render::RenderContext;
use crate::core::steps::{default_step_renderers, StepContext, StepRenderer};
use crate::core::template::{TemplatePlaceholder, TemplateSet, TemplateSource, TemplateType};
use crate::schema::dialog::DialogRecord;
use crate::schema::object::{ExportObject, ExportObjectResolver, ObjectCatalog};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame used when a project has no dialog template.
const FALLBACK_DIALOG_TEMPLATE: &str = "{{Dialog_Start}}\n{{Dialog_Additional_Functions}}";

/// The generated code of one dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogCode {
    /// Code of the start function body.
    pub start_step: String,
    /// Every extracted function, wrapped in the function template.
    pub additional_functions: String,
    pub function_names: Vec<String>,
}

impl DialogCode {
    /// Put the generated code into a dialog frame template.
    pub fn fill_dialog_template(&self, template: &str) -> String {
        placeholder::replace_indented_all(
            template,
            &[
                ("Dialog_Start", self.start_step.as_str()),
                ("Dialog_Additional_Functions", self.additional_functions.as_str()),
            ],
        )
    }
}

/// Result of exporting one dialog. `code` is `None` only after a fatal
/// error.
#[derive(Debug, Clone)]
pub struct DialogExport {
    pub code: Option<DialogCode>,
    pub diagnostics: Vec<ExportDiagnostic>,
}

impl DialogExport {
    pub fn has(&self, kind: ExportErrorKind) -> bool {
        self.diagnostics.iter().any(|d| d.kind == kind)
    }
}

/// A dialog rendered into its complete file frame.
#[derive(Debug, Clone)]
pub struct RenderedDialog {
    pub text: Option<String>,
    pub diagnostics: Vec<ExportDiagnostic>,
}

/// The top-level exporter. One instance serves one caller at a time; every
/// export is an independent pass with its own diagnostics.
pub struct DialogExporter {
    config: ExportConfig,
    templates: Box<dyn TemplateSource>,
    objects: Box<dyn ExportObjectResolver>,
    function_ids: Box<dyn FunctionIdAllocator>,
    language_keys: Box<dyn LanguageKeyGenerator>,
    conditions: ConditionRegistry,
    actions: ActionRegistry,
    step_renderers: Vec<Box<dyn StepRenderer>>,
}

/// Builder for constructing a `DialogExporter`.
#[derive(Default)]
pub struct DialogExporterBuilder {
    config_path: Option<String>,
    templates_dir: Option<String>,
    config: Option<ExportConfig>,
    /// Base templates; files from `templates_dir` override them.
    templates: Option<TemplateSet>,
    template_source: Option<Box<dyn TemplateSource>>,
    objects: Option<Box<dyn ExportObjectResolver>>,
    function_ids: Option<Box<dyn FunctionIdAllocator>>,
    language_keys: Option<Box<dyn LanguageKeyGenerator>>,
    conditions: Option<ConditionRegistry>,
    actions: Option<ActionRegistry>,
    step_renderers: Option<Vec<Box<dyn StepRenderer>>>,
}

impl DialogExporter {
    pub fn builder() -> DialogExporterBuilder {
        DialogExporterBuilder::default()
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Export one dialog owned by `owner`.
    pub fn export_dialog(&mut self, record: &DialogRecord, owner: &ExportObject) -> DialogExport {
        let mut errors = ErrorCollection::new();
        let code = {
            let mut scope = errors.push_context(format!("Dialog {}", record.id));
            self.export_into(record, owner, &mut scope)
        };
        DialogExport {
            code,
            diagnostics: errors.into_diagnostics(),
        }
    }

    pub fn export_dialog_json(
        &mut self,
        json: &str,
        owner: &ExportObject,
    ) -> Result<DialogExport, ExportError> {
        let record = DialogRecord::from_json(json)?;
        Ok(self.export_dialog(&record, owner))
    }

    /// Export a dialog and place it into the project's dialog template.
    pub fn render_dialog_file(&mut self, record: &DialogRecord, owner: &ExportObject) -> RenderedDialog {
        let mut errors = ErrorCollection::new();
        let text = {
            let mut scope = errors.push_context(format!("Dialog {}", record.id));
            match self.export_into(record, owner, &mut scope) {
                Some(code) => Some(self.fill_dialog_file(&code, owner, &mut scope)),
                None => None,
            }
        };
        RenderedDialog {
            text,
            diagnostics: errors.into_diagnostics(),
        }
    }

    fn fill_dialog_file(
        &self,
        code: &DialogCode,
        owner: &ExportObject,
        errors: &mut ErrorCollection,
    ) -> String {
        let template = self
            .templates
            .template(&self.config.project_id, TemplateType::TaleDialog)
            .unwrap_or_else(|| {
                errors.add(
                    ExportErrorKind::MissingTemplate,
                    format!("no template for {:?}", TemplateType::TaleDialog),
                );
                FALLBACK_DIALOG_TEMPLATE.to_string()
            });
        let template = FlexFieldResolver::new("Tale_Npc").fill(&template, owner, &self.config.settings, errors);
        code.fill_dialog_template(&template)
    }

    fn export_into(
        &mut self,
        record: &DialogRecord,
        owner: &ExportObject,
        errors: &mut ErrorCollection,
    ) -> Option<DialogCode> {
        let mut graph = match DialogGraph::parse(record) {
            Ok(graph) => graph,
            Err(err) => {
                errors.add(ExportErrorKind::RootNodeCountNotOne, err.to_string());
                return None;
            }
        };

        check_for_infinite_loops(&mut graph, errors);
        assign_function_names(
            &mut graph,
            &self.config.function_generation,
            self.function_ids.as_mut(),
            &self.config.project_id,
            &owner.id,
        );
        let functions = collect_functions(&graph);

        let render = RenderContext::new(
            &self.config.project_id,
            owner,
            &self.config.settings,
            self.objects.as_ref(),
            self.templates.as_ref(),
            &self.conditions,
            &self.actions,
            self.language_keys.as_mut(),
            errors,
        );
        let mut cx = StepContext::new(&graph, &self.step_renderers, render);

        let start_step = cx.render_node(graph.root());
        let mut blobs = Vec::new();
        let mut function_names = Vec::new();
        for function in functions.iter().skip(1) {
            let Some(name) = function.name.as_deref() else {
                continue;
            };
            let content = cx.render_node(function.root);
            let parent_preview = cx.function_parent_preview(function);
            function_names.push(name.to_string());

            let Some(template) = cx.render.template(TemplateType::TaleFunction) else {
                continue;
            };
            blobs.push(placeholder::replace_indented_all(
                &template,
                &[
                    ("Tale_Function_Name", name),
                    ("Tale_Function_ParentPreview", parent_preview.as_str()),
                    ("Tale_Function_Content", content.as_str()),
                ],
            ));
        }

        tracing::info!(
            dialog = %record.id,
            nodes = graph.len(),
            functions = function_names.len(),
            "exported dialog"
        );
        Some(DialogCode {
            start_step,
            additional_functions: blobs.join("\n"),
            function_names,
        })
    }

    /// Placeholders understood by a template type, for documentation.
    pub fn placeholders_for(&self, template_type: TemplateType) -> Vec<TemplatePlaceholder> {
        let mut placeholders = match template_type {
            TemplateType::TaleDialog => vec![
                TemplatePlaceholder::new("Dialog_Start", "Code of the dialog's start step"),
                TemplatePlaceholder::new(
                    "Dialog_Additional_Functions",
                    "All functions extracted from the dialog",
                ),
            ],
            TemplateType::TaleFunction => vec![
                TemplatePlaceholder::new("Tale_Function_Name", "Name of the function"),
                TemplatePlaceholder::new(
                    "Tale_Function_ParentPreview",
                    "Short description of the steps leading to the function",
                ),
                TemplatePlaceholder::new("Tale_Function_Content", "Body of the function"),
            ],
            TemplateType::TaleFunctionCall => vec![TemplatePlaceholder::new(
                "Tale_Function_Name",
                "Name of the called function",
            )],
            other => {
                let mut placeholders: Vec<TemplatePlaceholder> = self
                    .step_renderers
                    .iter()
                    .flat_map(|renderer| renderer.template_placeholders(other))
                    .collect();
                placeholders.extend(self.conditions.placeholders_for(other));
                placeholders.extend(self.actions.placeholders_for(other));
                placeholders
            }
        };
        if matches!(
            template_type,
            TemplateType::TaleDialog
                | TemplateType::TalePlayerTextLine
                | TemplateType::TaleNpcTextLine
                | TemplateType::TaleChoice
                | TemplateType::TaleCondition
        ) {
            placeholders.extend(FlexFieldResolver::new("Tale_Npc").placeholders());
        }
        placeholders
    }
}

impl DialogExporterBuilder {
    pub fn config_path(mut self, path: &str) -> Self {
        self.config_path = Some(path.to_string());
        self
    }

    pub fn templates_dir(mut self, path: &str) -> Self {
        self.templates_dir = Some(path.to_string());
        self
    }

    /// Provide the config directly (for testing without files).
    pub fn with_config(mut self, config: ExportConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Provide templates directly (for testing without files).
    pub fn with_templates(mut self, templates: TemplateSet) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Use an external template store instead of template sets.
    pub fn with_template_source(mut self, source: impl TemplateSource + 'static) -> Self {
        self.template_source = Some(Box::new(source));
        self
    }

    pub fn with_objects(mut self, objects: impl ExportObjectResolver + 'static) -> Self {
        self.objects = Some(Box::new(objects));
        self
    }

    pub fn with_function_ids(mut self, allocator: impl FunctionIdAllocator + 'static) -> Self {
        self.function_ids = Some(Box::new(allocator));
        self
    }

    pub fn with_language_keys(mut self, generator: impl LanguageKeyGenerator + 'static) -> Self {
        self.language_keys = Some(Box::new(generator));
        self
    }

    pub fn with_conditions(mut self, conditions: ConditionRegistry) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = Some(actions);
        self
    }

    pub fn with_step_renderers(mut self, renderers: Vec<Box<dyn StepRenderer>>) -> Self {
        self.step_renderers = Some(renderers);
        self
    }

    pub fn build(self) -> Result<DialogExporter, ExportError> {
        let config = match self.config_path {
            Some(ref path) => ExportConfig::load_from_ron(Path::new(path))?,
            None => self.config.unwrap_or_default(),
        };

        let templates: Box<dyn TemplateSource> = match self.template_source {
            Some(source) => source,
            None => {
                let mut templates = self.templates.unwrap_or_default();
                // Project templates override the base set
                if let Some(ref dir) = self.templates_dir {
                    templates.merge(TemplateSet::load_from_dir(Path::new(dir))?);
                }
                Box::new(templates)
            }
        };

        Ok(DialogExporter {
            config,
            templates,
            objects: self
                .objects
                .unwrap_or_else(|| Box::new(ObjectCatalog::new())),
            function_ids: self
                .function_ids
                .unwrap_or_else(|| Box::new(InMemoryFunctionIdAllocator::new())),
            language_keys: self
                .language_keys
                .unwrap_or_else(|| Box::new(InMemoryLanguageKeys::new())),
            conditions: self.conditions.unwrap_or_default(),
            actions: self.actions.unwrap_or_default(),
            step_renderers: self.step_renderers.unwrap_or_else(default_step_renderers),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn templates() -> TemplateSet {
        TemplateSet::default()
            .with(TemplateType::TaleFunction, "function {{Tale_Function_Name}}()\n    -- {{Tale_Function_ParentPreview}}\n    {{Tale_Function_Content}}\nend")
            .with(TemplateType::TaleFunctionCall, "{{Tale_Function_Name}}()")
            .with(TemplateType::TaleNpcTextLine, "npc_say(\"{{Tale_TextLine}}\")\n{{Tale_Next_Step}}")
            .with(TemplateType::TalePlayerTextLine, "player_say(\"{{Tale_TextLine}}\")\n{{Tale_Next_Step}}")
    }

    fn exporter() -> DialogExporter {
        DialogExporter::builder()
            .with_templates(templates())
            .build()
            .unwrap()
    }

    #[test]
    fn linear_dialog_stays_in_start_function() {
        let record = DialogRecord::from_json(
            r#"{
                "id": "d",
                "textLines": [
                    { "id": "a", "speaker": "npc", "text": "Hello" },
                    { "id": "b", "speaker": "player", "text": "Hi" }
                ],
                "links": [{ "sourceNodeId": "a", "targetNodeId": "b" }]
            }"#,
        )
        .unwrap();
        let export = exporter().export_dialog(&record, &ExportObject::new("npc", "Npc"));
        let code = export.code.unwrap();
        assert_eq!(code.start_step, "npc_say(\"Hello\")\nplayer_say(\"Hi\")");
        assert!(code.additional_functions.is_empty());
        assert!(export.diagnostics.is_empty());
    }

    #[test]
    fn condition_branches_render_inline() {
        let record = DialogRecord::from_json(
            r#"{
                "id": "d",
                "textLines": [
                    { "id": "a", "speaker": "npc", "text": "Pick" },
                    { "id": "end", "speaker": "npc", "text": "Done" }
                ],
                "conditions": [{ "id": "k", "conditions": [{ "id": 1, "conditionElements": [] }] }],
                "links": [
                    { "sourceNodeId": "a", "targetNodeId": "k" },
                    { "sourceNodeId": "k", "sourceNodePort": "condition1", "targetNodeId": "end" },
                    { "sourceNodeId": "k", "sourceNodePort": "else", "targetNodeId": "end" }
                ]
            }"#,
        )
        .unwrap();
        let mut exporter = DialogExporter::builder()
            .with_templates(templates().with(
                TemplateType::TaleCondition,
                "{{Tale_Conditions_Start}}\nif cond then\n    {{Tale_Condition_Child}}\n{{Tale_Conditions_End}}\n{{Tale_Else_Start}}\nelse\n    {{Tale_Else_Child}}\n{{Tale_Else_End}}\nend",
            ))
            .build()
            .unwrap();
        let export = exporter.export_dialog(&record, &ExportObject::new("npc", "Npc"));
        let code = export.code.unwrap();
        // Both ports lead to "end" but it still has a single parent node
        assert_eq!(code.function_names, Vec::<String>::new());
        assert!(code.start_step.contains("if cond then\n    npc_say(\"Done\")"));
        assert!(code.start_step.contains("else\n    npc_say(\"Done\")"));
    }

    #[test]
    fn fatal_root_error_yields_no_code() {
        let record = DialogRecord::from_json(r#"{ "id": "d" }"#).unwrap();
        let export = exporter().export_dialog(&record, &ExportObject::new("npc", "Npc"));
        assert!(export.code.is_none());
        assert!(export.has(ExportErrorKind::RootNodeCountNotOne));
        assert_eq!(
            export.diagnostics[0].message,
            "Dialog d: dialog must have exactly one root node, found 0"
        );
    }

    #[test]
    fn dialog_template_frames_the_code() {
        let code = DialogCode {
            start_step: "a()\nb()".to_string(),
            additional_functions: "function f()\nend".to_string(),
            function_names: vec!["f".to_string()],
        };
        assert_eq!(
            code.fill_dialog_template("function start()\n    {{Dialog_Start}}\nend\n\n{{Dialog_Additional_Functions}}"),
            "function start()\n    a()\n    b()\nend\n\nfunction f()\nend"
        );
    }

    #[test]
    fn placeholder_documentation() {
        let exporter = exporter();
        let names = |ty| -> Vec<String> {
            exporter
                .placeholders_for(ty)
                .into_iter()
                .map(|p| p.name)
                .collect()
        };
        assert!(names(TemplateType::TaleFunction).contains(&"Tale_Function_Content".to_string()));
        assert!(names(TemplateType::TaleChoice).contains(&"Tale_Choice_Text_LangKey".to_string()));
        assert!(names(TemplateType::TaleChoice).contains(&"Tale_Npc_Name".to_string()));
        assert!(names(TemplateType::TaleActionWait).contains(&"Tale_Next_Step".to_string()));
        assert!(names(TemplateType::TaleConditionCheckQuestState).contains(&"Tale_Condition_QuestState".to_string()));
    }
}
