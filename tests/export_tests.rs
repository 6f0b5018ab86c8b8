/// Export integration tests: fixture dialogs rendered end to end through
/// `DialogExporter`.
use dialog_export::core::diagnostics::ExportErrorKind;
use dialog_export::core::language_key::InMemoryLanguageKeys;
use dialog_export::core::pipeline::DialogExporter;
use dialog_export::core::template::{TemplateSet, TemplateType};
use dialog_export::schema::dialog::DialogRecord;
use dialog_export::schema::object::{ExportObject, ExportObjectResolver, ObjectCatalog, ObjectKind};
use pretty_assertions::assert_eq;
use std::path::Path;

const DIALOGS: &str = "tests/fixtures/dialogs";

fn load(name: &str) -> DialogRecord {
    let path = Path::new(DIALOGS).join(format!("{}.json", name));
    DialogRecord::load_from_json(&path).unwrap()
}

fn catalog() -> ObjectCatalog {
    ObjectCatalog::load_from_ron(Path::new("tests/fixtures/objects.ron")).unwrap()
}

fn innkeeper() -> ExportObject {
    catalog()
        .resolve(ObjectKind::Npc, "innkeeper")
        .cloned()
        .unwrap()
}

fn exporter() -> DialogExporter {
    DialogExporter::builder()
        .config_path("tests/fixtures/config.ron")
        .templates_dir("tests/fixtures/templates")
        .with_objects(catalog())
        .build()
        .unwrap()
}

#[test]
fn project_templates_override_base_templates() {
    let set = TemplateSet::load_from_dir(Path::new("tests/fixtures/templates")).unwrap();
    assert_eq!(set.get(TemplateType::GeneralCompareOperatorNotEqual), Some("~="));
    assert_eq!(set.get(TemplateType::GeneralCompareOperatorEqual), Some("=="));
}

#[test]
fn choice_with_unlinked_option() {
    let export = exporter().export_dialog(&load("hello_bye"), &innkeeper());
    let code = export.code.as_ref().unwrap();

    assert_eq!(
        code.start_step,
        "choice(1, \"Hello\")\n    NpcText_1()\nchoice(2, \"Bye\")"
    );
    assert_eq!(code.function_names, vec!["NpcText_1".to_string()]);
    assert_eq!(
        code.additional_functions,
        "function NpcText_1() -- Choice: 'Hello'\n    npc(\"Nice to meet you\")\nend"
    );
    assert!(!export.has(ExportErrorKind::InfinityLoop));
    assert!(export.diagnostics.is_empty());
}

#[test]
fn diamond_renders_into_dialog_file() {
    let rendered = exporter().render_dialog_file(&load("diamond"), &innkeeper());
    assert!(rendered.diagnostics.is_empty(), "{:?}", rendered.diagnostics);
    assert_eq!(
        rendered.text.unwrap(),
        r#"-- Greta
function start()
    npc("Pick a side")
    choice(1, "Left")
        PlayerText_1()
    choice(2, "Right")
        PlayerText_2()
end

function PlayerText_1() -- Choice: 'Left'
    player("Left")
    NpcText_3()
end
function PlayerText_2() -- Choice: 'Right'
    player("Right")
    NpcText_3()
end
function NpcText_3() -- Player: 'Left'; Player: 'Right'
    npc("Meet")
end"#
    );
}

#[test]
fn wait_action_wraps_the_next_step() {
    let export = exporter().export_dialog(&load("wait"), &innkeeper());
    let code = export.code.unwrap();
    assert_eq!(
        code.start_step,
        "npc(\"One moment\")\nwait(2, function()\n    NpcText_1()\nend)"
    );
    assert_eq!(
        code.additional_functions,
        "function NpcText_1() -- Action: Wait\n    npc(\"Done waiting\")\nend"
    );
    assert!(export.diagnostics.is_empty());
}

#[test]
fn unknown_action_type_keeps_siblings() {
    let export = exporter().export_dialog(&load("unknown_action"), &innkeeper());
    let code = export.code.unwrap();
    assert_eq!(code.start_step, "npc(\"Before\")\nnpc(\"After\")");
    assert_eq!(export.diagnostics.len(), 1);
    assert_eq!(export.diagnostics[0].kind, ExportErrorKind::UnknownActionType);
    assert_eq!(
        export.diagnostics[0].message,
        "Dialog unknown_action: unknown action type 99 on node 'x'"
    );
}

#[test]
fn condition_branches_with_player_value() {
    let export = exporter().export_dialog(&load("gold_check"), &innkeeper());
    let code = export.code.unwrap();
    assert_eq!(
        code.start_step,
        r#"npc("A room costs 10 gold")
if player.Gold >= 10 then
    npc("Here is your key")
else
    npc("Come back with \"real\" money")
end"#
    );
    assert!(code.function_names.is_empty());
    assert!(export.diagnostics.is_empty());
}

#[test]
fn closed_loop_is_split_at_its_merge_point() {
    let export = exporter().export_dialog(&load("closed_loop"), &innkeeper());
    assert_eq!(
        export
            .diagnostics
            .iter()
            .filter(|d| d.kind == ExportErrorKind::InfinityLoop)
            .count(),
        1
    );
    assert!(!export.has(ExportErrorKind::UnsplitCycle));

    let code = export.code.unwrap();
    assert_eq!(code.start_step, "npc(\"Again?\")\nPlayerText_1()");
    assert_eq!(
        code.additional_functions,
        "function PlayerText_1() -- Npc: 'Again?'; Npc: 'Once more'\n    player(\"Yes\")\n    npc(\"Once more\")\n    PlayerText_1()\nend"
    );
}

#[test]
fn long_linear_dialog_renders_without_deep_recursion() {
    const LINES: usize = 5000;
    let text_lines: Vec<String> = (0..LINES)
        .map(|i| format!(r#"{{ "id": "l{i}", "speaker": "npc", "text": "Line {i}" }}"#))
        .collect();
    let links: Vec<String> = (1..LINES)
        .map(|i| format!(r#"{{ "sourceNodeId": "l{}", "targetNodeId": "l{}" }}"#, i - 1, i))
        .collect();
    let json = format!(
        r#"{{ "id": "long", "textLines": [{}], "links": [{}] }}"#,
        text_lines.join(","),
        links.join(",")
    );
    let record = DialogRecord::from_json(&json).unwrap();

    let export = exporter().export_dialog(&record, &innkeeper());
    assert!(export.diagnostics.is_empty(), "{:?}", export.diagnostics);
    let code = export.code.unwrap();
    assert!(code.function_names.is_empty());

    let lines: Vec<&str> = code.start_step.lines().collect();
    assert_eq!(lines.len(), LINES);
    assert_eq!(lines[0], "npc(\"Line 0\")");
    assert_eq!(lines[LINES - 1], format!("npc(\"Line {}\")", LINES - 1));
}

#[test]
fn author_text_is_never_expanded_as_template() {
    let record = DialogRecord::from_json(
        r#"{
            "id": "literal_tokens",
            "choices": [
                { "id": "ask", "choices": [ { "id": 1, "text": "Pay {{Tale_Npc_Id}}" } ] }
            ],
            "textLines": [
                { "id": "line", "speaker": "npc", "text": "Hi {{Tale_Npc_Value_Gold}}" }
            ],
            "links": [
                { "sourceNodeId": "ask", "sourceNodePort": "choice1", "targetNodeId": "line" }
            ]
        }"#,
    )
    .unwrap();

    let rendered = exporter().render_dialog_file(&record, &innkeeper());
    assert!(rendered.diagnostics.is_empty(), "{:?}", rendered.diagnostics);
    assert_eq!(
        rendered.text.unwrap(),
        r#"-- Greta
function start()
    choice(1, "Pay {{Tale_Npc_Id}}")
        NpcText_1()
end

function NpcText_1() -- Choice: 'Pay {{Tale_Npc_Id}}'
    npc("Hi {{Tale_Npc_Value_Gold}}")
end"#
    );
}

#[test]
fn two_roots_abort_the_export() {
    let rendered = exporter().render_dialog_file(&load("two_roots"), &innkeeper());
    assert!(rendered.text.is_none());
    assert_eq!(rendered.diagnostics.len(), 1);
    assert_eq!(
        rendered.diagnostics[0].kind,
        ExportErrorKind::RootNodeCountNotOne
    );
}

#[test]
fn missing_template_is_reported_once() {
    let mut exporter = DialogExporter::builder()
        .with_templates(
            TemplateSet::default()
                .with(TemplateType::TaleNpcTextLine, "npc(\"{{Tale_TextLine}}\")\n{{Tale_Next_Step}}"),
        )
        .build()
        .unwrap();
    let export = exporter.export_dialog(&load("diamond"), &innkeeper());
    let missing: Vec<&str> = export
        .diagnostics
        .iter()
        .filter(|d| d.kind == ExportErrorKind::MissingTemplate)
        .map(|d| d.message.as_str())
        .collect();
    assert_eq!(
        missing,
        vec![
            "Dialog diamond: no template for TaleChoice",
            "Dialog diamond: no template for TalePlayerTextLine",
            "Dialog diamond: no template for TaleFunction",
        ]
    );
    assert!(export.diagnostics.iter().all(|d| d.count == 1));
    assert_eq!(export.code.unwrap().start_step, "npc(\"Pick a side\")");
}

#[test]
fn default_templates_cover_every_type() {
    let set = TemplateSet::load_from_dir(Path::new("template_data/default/templates")).unwrap();
    for template_type in TemplateType::ALL {
        assert!(set.get(template_type).is_some(), "{:?}", template_type);
    }
}

#[test]
fn default_templates_export_with_language_keys() {
    let mut exporter = DialogExporter::builder()
        .config_path("template_data/default/config.ron")
        .templates_dir("template_data/default/templates")
        .with_objects(catalog())
        .with_language_keys(InMemoryLanguageKeys::new())
        .build()
        .unwrap();
    let rendered = exporter.render_dialog_file(&load("gold_check"), &innkeeper());
    assert!(rendered.diagnostics.is_empty(), "{:?}", rendered.diagnostics);

    let text = rendered.text.unwrap();
    assert!(text.starts_with("-- Dialog of Greta\nfunction OnTalk(this)\n"));
    assert!(text.contains(
        "    Dialog.NpcSay(this, \"innkeeper\", \"innkeeper_1\") -- A room costs 10 gold\n"
    ));
    assert!(text.contains("    if Player.GetValue(\"Gold\") >= 10 then\n"));
    assert!(text.contains("\"innkeeper_3\") -- Come back with \"real\" money"));
    assert!(!text.contains("{{"));
}
