//! PinGuard CLI
//!
//! CLI tool for inspecting the built-in policies and managing compiled rule lists.

mod input;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pg_blocker::{BlockerConfig, ContentBlocker, ContentController, RenderingContext};
use pg_rules::{RuleCatalog, RuleSet};

#[derive(Parser)]
#[command(name = "pg-cli")]
#[command(about = "PinGuard content blocking rule tools")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Compiled rule list directory (overrides the config file)
    #[arg(short, long, global = true)]
    store: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in policies
    Catalog,

    /// Print a built-in policy in the exchange format
    Show {
        /// Policy identifier or short name
        #[arg(short, long)]
        policy: String,
    },

    /// Compile policies into the store
    Compile {
        /// Built-in policies to compile
        #[arg(short, long)]
        policy: Vec<String>,

        /// Rule document file to compile
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Identifier for --input (defaults to the file stem)
        #[arg(long, requires = "input")]
        id: Option<String>,
    },

    /// Apply policies to a headless rendering context and report the outcome
    Apply {
        /// Policies to apply
        #[arg(short, long)]
        policy: Vec<String>,

        /// Apply the default blocking policies
        #[arg(long, conflicts_with = "privacy")]
        default: bool,

        /// Apply the privacy mode policies
        #[arg(long)]
        privacy: bool,
    },

    /// List compiled rule lists in the store
    List,

    /// Delete a compiled rule list from the store
    Delete {
        /// Rule list identifier
        #[arg(short, long)]
        id: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = load_config(&cli).and_then(|config| run(cli.command, &config));

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<BlockerConfig, String> {
    let mut config = match &cli.config {
        Some(path) => BlockerConfig::load(path).map_err(|e| e.to_string())?,
        None => BlockerConfig::default(),
    };
    if let Some(store) = &cli.store {
        config.store_dir = store.clone();
    }
    Ok(config)
}

fn run(command: Commands, config: &BlockerConfig) -> Result<(), String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    let blocker = ContentBlocker::from_config(config);
    runtime.block_on(run_async(command, &blocker))
}

async fn run_async(command: Commands, blocker: &ContentBlocker) -> Result<(), String> {
    match command {
        Commands::Catalog => cmd_catalog(),
        Commands::Show { policy } => cmd_show(&policy),
        Commands::Compile { policy, input, id } => cmd_compile(blocker, &policy, input, id).await,
        Commands::Apply { policy, default, privacy } => cmd_apply(blocker, policy, default, privacy).await,
        Commands::List => cmd_list(blocker).await,
        Commands::Delete { id } => cmd_delete(blocker, &id).await,
    }
}

fn cmd_catalog() -> Result<(), String> {
    let catalog = RuleCatalog::new();

    println!("Built-in policies:");
    for set in RuleSet::ALL {
        let rules = catalog.document(set.identifier()).map_or(0, |doc| doc.len());
        println!(
            "  {:<10} {:<26} {:<28} {} rules",
            set.short_name(),
            set.identifier(),
            set.display_name(),
            rules
        );
    }

    Ok(())
}

fn cmd_show(policy: &str) -> Result<(), String> {
    let catalog = RuleCatalog::new();
    let document = catalog
        .document(policy)
        .ok_or_else(|| format!("Unknown policy '{}'", policy))?;
    let json = document
        .to_json()
        .map_err(|e| format!("Failed to encode '{}': {}", policy, e))?;
    println!("{}", json);
    Ok(())
}

async fn cmd_compile(
    blocker: &ContentBlocker,
    policies: &[String],
    input: Option<PathBuf>,
    id: Option<String>,
) -> Result<(), String> {
    if policies.is_empty() && input.is_none() {
        return Err("Nothing to compile: pass --policy or --input".to_string());
    }

    let start = Instant::now();
    let mut jobs = Vec::new();
    for policy in policies {
        let set = RuleSet::from_identifier(policy)
            .ok_or_else(|| format!("Unknown policy '{}'", policy))?;
        jobs.push((set.identifier().to_string(), set.document()));
    }
    if let Some(path) = input {
        jobs.push(input::read_document(&path, id)?);
    }

    for (identifier, document) in &jobs {
        let list = blocker
            .cache()
            .compile(identifier, document)
            .await
            .map_err(|e| format!("Failed to compile '{}': {}", identifier, e))?;
        println!("  {} - {} rules", list.identifier(), list.rule_count());
    }

    println!(
        "Compiled {} rule lists in {:.1}ms",
        jobs.len(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}

async fn cmd_apply(
    blocker: &ContentBlocker,
    policies: Vec<String>,
    default: bool,
    privacy: bool,
) -> Result<(), String> {
    let mut requested: Vec<String> = policies;
    if default {
        requested.extend(RuleSet::DEFAULT_BLOCKING.iter().map(|set| set.short_name().to_string()));
    }
    if privacy {
        requested.extend(RuleSet::PRIVACY.iter().map(|set| set.short_name().to_string()));
    }
    if requested.is_empty() {
        return Err("Nothing to apply: pass --policy, --default or --privacy".to_string());
    }

    let controller = Arc::new(ContentController::new());
    let context: Arc<dyn RenderingContext> = controller.clone();

    let start = Instant::now();
    let report = blocker.apply_many(requested, context).await;
    let elapsed = start.elapsed();

    println!("Apply results:");
    for (identifier, applied) in &report {
        let status = if *applied { "ok" } else { "FAILED" };
        println!("  {:<26} {:<28} {}", identifier, blocker.catalog().display_name(identifier), status);
    }
    println!("Active rule lists: {}", controller.active_identifiers().join(", "));
    println!("  Time:     {:.1}ms", elapsed.as_secs_f64() * 1000.0);

    if report.values().all(|applied| *applied) {
        Ok(())
    } else {
        Err("One or more policies failed to apply".to_string())
    }
}

async fn cmd_list(blocker: &ContentBlocker) -> Result<(), String> {
    let identifiers = blocker.list_available().await;
    if identifiers.is_empty() {
        println!("No compiled rule lists");
        return Ok(());
    }
    println!("Compiled rule lists:");
    for identifier in identifiers {
        println!("  {}", identifier);
    }
    Ok(())
}

async fn cmd_delete(blocker: &ContentBlocker, identifier: &str) -> Result<(), String> {
    blocker
        .delete(identifier)
        .await
        .map_err(|e| format!("Failed to delete '{}': {}", identifier, e))?;
    println!("Deleted '{}'", identifier);
    Ok(())
}
