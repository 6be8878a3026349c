//! Weave Model Linter CLI
//!
//! Assembles JSON model documents, runs the validation pipeline, and
//! answers selector queries.

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use weave_model::assembler::ModelAssembler;
use weave_model::config::ValidationConfig;
use weave_model::loader;
use weave_model::neighbor::NeighborIndex;
use weave_model::selector::Selector;
use weave_model::validation::{run_validators, Severity};
use weave_model::Model;

#[derive(Parser)]
#[command(name = "weave-lint")]
#[command(about = "Assemble, validate, and query Weave models")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble models and run the validation pipeline
    Validate {
        /// Model files or directories to scan for *.json documents
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Validation configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Treat applications of unknown traits as errors
        #[arg(long)]
        deny_unknown_traits: bool,

        /// Print suppressed events as well
        #[arg(long)]
        show_suppressed: bool,
    },

    /// Assemble models and print shapes matching a selector
    Query {
        /// Selector expression, e.g. "structure [trait|error]"
        selector: String,

        /// Model files or directories to scan for *.json documents
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Validate {
            paths,
            config,
            deny_unknown_traits,
            show_suppressed,
        } => validate(&paths, config.as_deref(), deny_unknown_traits, show_suppressed),
        Commands::Query { selector, paths } => query(&selector, &paths),
    }
}

fn validate(
    paths: &[PathBuf],
    config: Option<&Path>,
    deny_unknown_traits: bool,
    show_suppressed: bool,
) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => ValidationConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ValidationConfig::default(),
    };

    let (model, assembly_events) = assemble(paths, deny_unknown_traits)?;
    for event in &assembly_events {
        println!("{}", event);
    }
    let model = model.ok_or_else(|| anyhow!("model assembly failed"))?;

    let neighbors = NeighborIndex::new(&model);
    let validators = config.build_validators()?;
    let result = run_validators(
        &model,
        &neighbors,
        &validators,
        &config.suppressions,
        &config.severity_overrides,
    );

    let mut shown = 0;
    for event in &result.events {
        if event.severity == Severity::Suppressed && !show_suppressed {
            continue;
        }
        println!("{}", event);
        shown += 1;
    }
    println!();
    println!(
        "📊 {} shapes, {} events ({} shown)",
        model.shape_count(),
        result.events.len(),
        shown
    );

    let fatal_assembly = assembly_events
        .iter()
        .filter(|e| e.severity == Severity::Error)
        .count();
    let errors = result.errors().count() + fatal_assembly;
    if errors > 0 {
        bail!("validation failed with {} error(s)", errors);
    }
    println!("✅ model is valid");
    Ok(())
}

fn query(selector: &str, paths: &[PathBuf]) -> anyhow::Result<()> {
    let selector = Selector::parse(selector)?;
    let (model, events) = assemble(paths, false)?;
    let model = model.ok_or_else(|| {
        for event in &events {
            eprintln!("{}", event);
        }
        anyhow!("model assembly failed")
    })?;

    for id in selector.select(&model) {
        println!("{}", id);
    }
    Ok(())
}

fn assemble(
    paths: &[PathBuf],
    deny_unknown_traits: bool,
) -> anyhow::Result<(Option<Model>, Vec<weave_model::validation::ValidationEvent>)> {
    let files = collect_model_files(paths)?;
    if files.is_empty() {
        bail!("no model files found under the given paths");
    }

    let mut assembler = ModelAssembler::new().deny_unknown_traits(deny_unknown_traits);
    for file in &files {
        let document = loader::load_file(file)
            .with_context(|| format!("failed to load {}", file.display()))?;
        assembler.add_document(document);
    }
    Ok(assembler.assemble().into_parts())
}

/// Expand directories into their contained `*.json` files, sorted for
/// deterministic assembly diagnostics
fn collect_model_files(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path) {
                let entry = entry?;
                if entry.file_type().is_file()
                    && entry.path().extension().is_some_and(|ext| ext == "json")
                {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}
