/// Dialog Linter: checks dialog records for structural problems before export.
///
/// Usage: dialog_linter <dialog.json|dir> [--templates <dir>] [--verbose]

use dialog_export::core::diagnostics::ErrorCollection;
use dialog_export::core::graph::{DialogGraph, PortId};
use dialog_export::core::loop_check::check_for_infinite_loops;
use dialog_export::core::template::{TemplateSet, TemplateType};
use dialog_export::schema::dialog::DialogRecord;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: dialog_linter <dialog.json|dir> [--templates <dir>] [--verbose]");
        process::exit(0);
    }

    let dialog_path = &args[1];
    let mut templates_dir = None;
    let mut verbose = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--templates" if i + 1 < args.len() => {
                i += 1;
                templates_dir = Some(args[i].clone());
            }
            "--verbose" | "-v" => verbose = true,
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    if verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt().init();
    }

    let path = Path::new(dialog_path);
    let mut files = Vec::new();
    if path.is_file() {
        files.push(path.to_path_buf());
    } else if path.is_dir() {
        collect_dialogs(path, &mut files);
        files.sort();
    } else {
        eprintln!("ERROR: Path '{}' does not exist", dialog_path);
        process::exit(1);
    }

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if let Some(ref dir) = templates_dir {
        match TemplateSet::load_from_dir(Path::new(dir)) {
            Ok(set) => warnings.extend(lint_templates(&set)),
            Err(e) => errors.push(format!("Failed to load templates from {}: {}", dir, e)),
        }
    }

    for file in &files {
        match DialogRecord::load_from_json(file) {
            Ok(record) => {
                println!("  Loaded: {} ({} nodes)", file.display(), record.node_count());
                let (e, w) = lint_dialog(&record);
                errors.extend(e);
                warnings.extend(w);
            }
            Err(e) => errors.push(format!("Failed to load {}: {}", file.display(), e)),
        }
    }

    println!("\n=== Dialog Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} dialogs, {} errors, {} warnings",
        files.len(),
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn collect_dialogs(dir: &Path, files: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_dialogs(&path, files);
            } else if path.extension().and_then(|s| s.to_str()) == Some("json") {
                files.push(path);
            }
        }
    }
}

fn lint_templates(set: &TemplateSet) -> Vec<String> {
    TemplateType::ALL
        .into_iter()
        .filter(|ty| set.get(*ty).is_none())
        .map(|ty| format!("No template for {:?}", ty))
        .collect()
}

fn lint_dialog(record: &DialogRecord) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let dialog = &record.id;

    // Ports each branching node declares
    let mut declared: HashMap<&str, Vec<PortId>> = HashMap::new();
    for choice in &record.choices {
        declared.insert(
            &choice.id,
            choice.choices.iter().map(|o| PortId::Index(o.id)).collect(),
        );
    }
    for condition in &record.conditions {
        let mut ports: Vec<PortId> = condition
            .conditions
            .iter()
            .map(|b| PortId::Index(b.id))
            .collect();
        ports.push(PortId::Else);
        declared.insert(&condition.id, ports);
    }

    let mut ids = HashSet::new();
    for id in record
        .text_lines
        .iter()
        .map(|n| n.id.as_str())
        .chain(record.choices.iter().map(|n| n.id.as_str()))
        .chain(record.actions.iter().map(|n| n.id.as_str()))
        .chain(record.conditions.iter().map(|n| n.id.as_str()))
        .chain(record.references.iter().map(|n| n.id.as_str()))
    {
        if !ids.insert(id) {
            errors.push(format!("Dialog '{}': duplicate node id '{}'", dialog, id));
        }
    }

    for link in &record.links {
        if !ids.contains(link.target_node_id.as_str()) {
            warnings.push(format!(
                "Dialog '{}': link from '{}' targets unknown node '{}'",
                dialog, link.source_node_id, link.target_node_id
            ));
        }
        if let Some(ports) = declared.get(link.source_node_id.as_str()) {
            let port = PortId::parse(link.source_node_port.as_deref());
            if !ports.contains(&port) {
                warnings.push(format!(
                    "Dialog '{}': port {:?} of '{}' matches no branch (read as {:?})",
                    dialog,
                    link.source_node_port.as_deref().unwrap_or(""),
                    link.source_node_id,
                    port
                ));
            }
        }
    }

    let mut graph = match DialogGraph::parse(record) {
        Ok(graph) => graph,
        Err(e) => {
            errors.push(format!("Dialog '{}': {}", dialog, e));
            return (errors, warnings);
        }
    };

    let unreachable = record.node_count().saturating_sub(graph.len());
    if unreachable > 0 {
        warnings.push(format!(
            "Dialog '{}': {} nodes are not reachable from the start",
            dialog, unreachable
        ));
    }

    let mut diagnostics = ErrorCollection::new();
    if !check_for_infinite_loops(&mut graph, &mut diagnostics) {
        for diagnostic in diagnostics.diagnostics() {
            errors.push(format!("Dialog '{}': {}", dialog, diagnostic.message));
        }
    }

    (errors, warnings)
}
