//! Command-line interface for sdmops
//! This binary runs the table-reconstruction pipeline over a positioned-token
//! dump of the SDM instruction-set reference and writes the two artifacts.
//!
//! Usage:
//!   sdmops `<path>`                          - Full parse; writes ops.json and failed.json
//!   sdmops `<path>` --ops MOV,ADD            - Restrict to the listed mnemonics (coverage-checked)
//!   sdmops `<path>` --list-index             - Print the mnemonic index without parsing bodies
//!   sdmops `<path>` --stats                  - Print index statistics
//!   sdmops `<path>` --config `<file>`        - Layer a configuration file over the defaults

use std::fs;
use std::process;

use clap::{Arg, ArgAction, Command};

use sdmops_config::SdmopsConfig;
use sdmops_parser::sdm::indexing::{build_index, index_stats};
use sdmops_parser::sdm::pipeline::{parse_document, ParseOptions};
use sdmops_parser::sdm::record::ResultArtifact;
use sdmops_parser::sdm::token::SdmDocument;

fn main() {
    let matches = Command::new("sdmops")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Reconstructs an instruction-encoding catalog from a positioned-token reference dump")
        .arg_required_else_help(true)
        .arg(
            Arg::new("path")
                .help("Path to the positioned-token document (JSON)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("ops")
                .long("ops")
                .help("Comma-separated mnemonic allow-list; every listed mnemonic must parse"),
        )
        .arg(
            Arg::new("list-index")
                .long("list-index")
                .help("Print the mnemonic index (group -> start page) and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .help("Print index statistics and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Configuration file layered over the built-in defaults"),
        )
        .get_matches();

    let path = matches.get_one::<String>("path").expect("path is required");
    let doc = load_document(path);

    if matches.get_flag("list-index") {
        handle_list_index_command(&doc);
        return;
    }
    if matches.get_flag("stats") {
        handle_stats_command(&doc);
        return;
    }

    let config = load_config(matches.get_one::<String>("config"));
    let options = ParseOptions {
        allow_list: matches.get_one::<String>("ops").map(|list| {
            list.split(',')
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect()
        }),
    };
    handle_parse_command(&doc, &options, &config);
}

fn load_document(path: &str) -> SdmDocument {
    let data = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Cannot read '{}': {}", path, e);
        process::exit(1);
    });
    SdmDocument::from_json_str(&data).unwrap_or_else(|e| {
        eprintln!("Cannot parse '{}' as a token document: {}", path, e);
        process::exit(1);
    })
}

fn load_config(path: Option<&String>) -> SdmopsConfig {
    let loader = match path {
        Some(path) => sdmops_config::Loader::new().with_file(path),
        None => sdmops_config::Loader::new().with_optional_file("sdmops.toml"),
    };
    loader.build().unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        process::exit(1);
    })
}

/// Handle the full parse command.
fn handle_parse_command(doc: &SdmDocument, options: &ParseOptions, config: &SdmopsConfig) {
    let outcome = parse_document(doc, options).unwrap_or_else(|e| {
        eprintln!("Fatal: {}", e);
        process::exit(1);
    });

    let artifact = ResultArtifact::new(doc.attributes(), outcome.records);
    write_json(&config.output.ops_path, &artifact, config.output.pretty);
    write_json(
        &config.output.failures_path,
        &outcome.failures,
        config.output.pretty,
    );

    println!(
        "{} ops from {} groups, {} failed ({:.1}% ok)",
        artifact.ops.len(),
        outcome.report.parsed_groups,
        outcome.report.failed_groups,
        outcome.report.percent_parsed()
    );
    if config.report.show_failures {
        for (group, reason) in &outcome.failures {
            eprintln!("  {}: {}", group, reason);
        }
    }
}

/// Handle the list-index command.
fn handle_list_index_command(doc: &SdmDocument) {
    let index = build_index(doc);
    if index.is_empty() {
        eprintln!("No mnemonic index entries found");
        process::exit(1);
    }
    for entry in &index {
        println!("{}\t{}", entry.start_page, entry.group_key());
    }
}

/// Handle the stats command.
fn handle_stats_command(doc: &SdmDocument) {
    let index = build_index(doc);
    if index.is_empty() {
        eprintln!("No mnemonic index entries found");
        process::exit(1);
    }
    let stats = index_stats(&index);
    println!("groups: {}", stats.groups);
    println!("mnemonics: {}", stats.mnemonics);
    println!("longest mnemonic: {}", stats.longest_mnemonic);
    println!("by first letter:");
    for (letter, count) in &stats.by_first_letter {
        println!("  {}: {}", letter, count);
    }
}

fn write_json<T: serde::Serialize>(path: &str, value: &T, pretty: bool) {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    let rendered = rendered.unwrap_or_else(|e| {
        eprintln!("Cannot serialize '{}': {}", path, e);
        process::exit(1);
    });
    fs::write(path, rendered).unwrap_or_else(|e| {
        eprintln!("Cannot write '{}': {}", path, e);
        process::exit(1);
    });
}
