/// Export Preview: renders one dialog with a template set and prints the
/// generated code.
///
/// Usage: export_preview --dialog <json> --templates <ron|dir> [--config <ron>]
///                       [--objects <ron>] [--owner <npc id>] [--verbose]

use dialog_export::core::pipeline::DialogExporter;
use dialog_export::core::template::TemplateSet;
use dialog_export::schema::dialog::DialogRecord;
use dialog_export::schema::object::{ExportObject, ExportObjectResolver, ObjectCatalog, ObjectKind};
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut dialog_path = None;
    let mut templates_path = None;
    let mut config_path = None;
    let mut objects_path = None;
    let mut owner_id = None;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--dialog" if i + 1 < args.len() => {
                i += 1;
                dialog_path = Some(args[i].clone());
            }
            "--templates" if i + 1 < args.len() => {
                i += 1;
                templates_path = Some(args[i].clone());
            }
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--objects" if i + 1 < args.len() => {
                i += 1;
                objects_path = Some(args[i].clone());
            }
            "--owner" if i + 1 < args.len() => {
                i += 1;
                owner_id = Some(args[i].clone());
            }
            "--verbose" | "-v" => verbose = true,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
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

    let (Some(dialog_path), Some(templates_path)) = (dialog_path, templates_path) else {
        eprintln!("ERROR: --dialog and --templates are required");
        print_usage();
        process::exit(1);
    };

    let record = match DialogRecord::load_from_json(Path::new(&dialog_path)) {
        Ok(record) => record,
        Err(e) => {
            eprintln!("ERROR: Failed to load dialog: {}", e);
            process::exit(1);
        }
    };

    let catalog = match objects_path {
        Some(ref path) => match ObjectCatalog::load_from_ron(Path::new(path)) {
            Ok(catalog) => catalog,
            Err(e) => {
                eprintln!("ERROR: Failed to load objects: {}", e);
                process::exit(1);
            }
        },
        None => ObjectCatalog::new(),
    };

    let owner_id = owner_id.unwrap_or_else(|| "owner".to_string());
    let owner = catalog
        .resolve(ObjectKind::Npc, &owner_id)
        .cloned()
        .unwrap_or_else(|| ExportObject::new(owner_id.clone(), owner_id.clone()));

    let mut builder = DialogExporter::builder().with_objects(catalog);
    if let Some(ref path) = config_path {
        builder = builder.config_path(path);
    }
    let templates = Path::new(&templates_path);
    if templates.is_dir() {
        builder = builder.templates_dir(&templates_path);
    } else {
        match TemplateSet::load_from_ron(templates) {
            Ok(set) => builder = builder.with_templates(set),
            Err(e) => {
                eprintln!("ERROR: Failed to load templates: {}", e);
                process::exit(1);
            }
        }
    }

    let mut exporter = match builder.build() {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    let rendered = exporter.render_dialog_file(&record, &owner);
    if let Some(ref text) = rendered.text {
        println!("{}", text);
    }

    if !rendered.diagnostics.is_empty() {
        eprintln!("\n=== Diagnostics ===\n");
        for diagnostic in &rendered.diagnostics {
            if diagnostic.count > 1 {
                eprintln!("{:?}: {} (x{})", diagnostic.kind, diagnostic.message, diagnostic.count);
            } else {
                eprintln!("{:?}: {}", diagnostic.kind, diagnostic.message);
            }
        }
    }

    if rendered.text.is_none() {
        process::exit(1);
    }
}

fn print_usage() {
    println!("Usage: export_preview --dialog <json> --templates <ron|dir> [--config <ron>]");
    println!("                      [--objects <ron>] [--owner <npc id>] [--verbose]");
    println!();
    println!("Renders the dialog into the dialog template and prints it. Diagnostics");
    println!("go to stderr; the exit code is 1 when the dialog could not be exported.");
}
