//! Inspect, edit, and optimize composed prompts from the command line.
//!
//! Overrides persist to a JSON file (`.cinch/prompt-overrides.json` by
//! default). The `optimize` command reads the API key from the
//! `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Print the composed prompt for a context
//! cinch-compose build questions --mode bulk --domain legal
//!
//! # Show each section with its index and whether it contributes
//! cinch-compose sections contract_analysis
//!
//! # Empty a block for one context only
//! cinch-compose set-block tone --variant chat=
//!
//! # Ask the model for reductions, skip the second one, and write the rest
//! cinch-compose optimize questions --skip 1 --apply
//! ```

use cinch_compose::config::{API_KEY_ENV, EngineConfig, OptimizerConfig};
use cinch_compose::engine::PromptEngine;
use cinch_compose::optimize::{OpenRouterCompletion, OptimizationSession};
use cinch_compose::overrides::{BlockPatch, JsonFileStore, ModifierPatch};
use cinch_compose::resolve::Selectors;
use cinch_compose::{DEFAULT_MODEL, OpenRouterClient};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, debug};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Inspect, edit, and optimize composed prompts.
#[derive(Parser)]
#[command(name = "cinch-compose")]
struct Cli {
    /// Path to the JSON override store
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Model used by `optimize`
    #[arg(long, global = true, default_value = DEFAULT_MODEL)]
    model: String,

    /// Timeout for the optimization call, in seconds
    #[arg(long, global = true, default_value_t = 60)]
    timeout_secs: u64,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct SelectorArgs {
    /// Mode modifier selector (e.g. bulk)
    #[arg(long)]
    mode: Option<String>,

    /// Domain modifier selector; repeat for several
    #[arg(long = "domain")]
    domains: Vec<String>,
}

impl SelectorArgs {
    fn selectors(&self) -> Selectors {
        Selectors {
            mode: self.mode.clone(),
            domains: self.domains.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the composed prompt for a context
    Build {
        context: String,
        #[command(flatten)]
        selectors: SelectorArgs,
        /// Text printed when nothing resolves
        #[arg(long, default_value = "You are a helpful assistant.")]
        fallback: String,
    },

    /// List the resolved sections for a context
    Sections {
        context: String,
        #[command(flatten)]
        selectors: SelectorArgs,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List blocks and modifiers with their tier and override status
    Catalog {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Patch a block's name, description, or context variants
    SetBlock {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Variant text as CONTEXT=TEXT; an empty TEXT removes the block from
        /// that context
        #[arg(long = "variant", value_parser = parse_variant)]
        variants: Vec<(String, String)>,
    },

    /// Patch a modifier's name, description, or content
    SetModifier {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },

    /// Overwrite a block's override with the built-in defaults
    ResetBlock { id: String },

    /// Overwrite a modifier's override with the built-in defaults
    ResetModifier { id: String },

    /// Ask the model for reduction suggestions
    Optimize {
        context: String,
        #[command(flatten)]
        selectors: SelectorArgs,
        /// Deselect a suggestion by position; repeat for several
        #[arg(long = "skip")]
        skip: Vec<usize>,
        /// Write the selected suggestions back as overrides
        #[arg(long)]
        apply: bool,
    },
}

fn parse_variant(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((ctx, text)) if !ctx.is_empty() => Ok((ctx.to_string(), text.to_string())),
        _ => Err(format!("expected CONTEXT=TEXT, got '{s}'")),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(LevelFilter::from_level(level));
    tracing_subscriber::registry().with(layer).init();
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("failed to serialize output: {e}"))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let mut config = EngineConfig::default().with_optimizer(
        OptimizerConfig::default()
            .with_model(cli.model.as_str())
            .with_timeout(Duration::from_secs(cli.timeout_secs)),
    );
    if let Some(path) = cli.store {
        config = config.with_store_path(path);
    }
    debug!("Using override store at {}", config.store_path.display());

    let store = Arc::new(JsonFileStore::new(&config.store_path));
    let engine = PromptEngine::builtin(store, &config);

    match cli.command {
        Command::Build {
            context,
            selectors,
            fallback,
        } => {
            let prompt = engine.build(&context, &selectors.selectors(), &fallback).await;
            println!("{prompt}");
        }

        Command::Sections {
            context,
            selectors,
            json,
        } => {
            let sections = engine
                .list_sections_with(&context, &selectors.selectors())
                .await;
            if json {
                println!("{}", to_json(&sections)?);
            } else if sections.is_empty() {
                println!("(no sections for '{context}')");
            } else {
                for s in &sections {
                    let marker = if s.enabled { ' ' } else { '-' };
                    println!("{marker}[{}] {} ({}) {}", s.index, s.id, s.kind, s.title);
                    if s.enabled {
                        for line in s.text.lines() {
                            println!("      {line}");
                        }
                    }
                }
            }
        }

        Command::Catalog { json } => {
            let catalog = engine.catalog().await;
            if json {
                println!("{}", to_json(&catalog)?);
            } else {
                println!("Blocks:");
                for b in &catalog.blocks {
                    let flag = if b.overridden { " *" } else { "" };
                    println!("  {:<18} {:<16} tier {}{flag}", b.id, b.name, b.tier);
                }
                println!("Modifiers:");
                for m in &catalog.modifiers {
                    let flag = if m.overridden { " *" } else { "" };
                    println!(
                        "  {:<18} {:<16} {:<7} tier {}{flag}",
                        m.id,
                        m.name,
                        m.kind.as_str(),
                        m.tier
                    );
                }
            }
        }

        Command::SetBlock {
            id,
            name,
            description,
            variants,
        } => {
            let mut patch = BlockPatch {
                name,
                description,
                variants: None,
            };
            for (ctx, text) in variants {
                patch = patch.with_variant(ctx, text);
            }
            if patch.is_empty() {
                return Err("nothing to change; pass --name, --description, or --variant".into());
            }
            let block = engine
                .apply_block_override(&id, patch)
                .await
                .map_err(|e| e.to_string())?;
            println!("{}", to_json(&block)?);
        }

        Command::SetModifier {
            id,
            name,
            description,
            content,
        } => {
            let patch = ModifierPatch {
                name,
                description,
                content,
            };
            if patch.is_empty() {
                return Err("nothing to change; pass --name, --description, or --content".into());
            }
            let modifier = engine
                .apply_modifier_override(&id, patch)
                .await
                .map_err(|e| e.to_string())?;
            println!("{}", to_json(&modifier)?);
        }

        Command::ResetBlock { id } => {
            let block = engine.reset_block(&id).await.map_err(|e| e.to_string())?;
            println!("{}", to_json(&block)?);
        }

        Command::ResetModifier { id } => {
            let modifier = engine.reset_modifier(&id).await.map_err(|e| e.to_string())?;
            println!("{}", to_json(&modifier)?);
        }

        Command::Optimize {
            context,
            selectors,
            skip,
            apply,
        } => {
            let api_key = std::env::var(API_KEY_ENV)
                .map_err(|_| format!("{API_KEY_ENV} environment variable is not set"))?;
            let client = OpenRouterClient::with_headers(
                api_key,
                "https://crates.io/crates/cinch-compose",
                "cinch-compose",
            )
            .map_err(|e| format!("failed to create API client: {e}"))?;
            let completion = OpenRouterCompletion::new(client, config.optimizer.model.as_str());

            let mut session = OptimizationSession::new(config.optimizer.clone());
            session
                .analyze(&engine, &completion, &context, &selectors.selectors())
                .await
                .map_err(|e| e.to_string())?;
            for i in skip {
                session.toggle(i).map_err(|e| e.to_string())?;
            }

            println!("{}", to_json(&session.result().map_err(|e| e.to_string())?)?);

            let diff = session.preview().map_err(|e| e.to_string())?;
            eprintln!(
                "\n--- before ({} tokens)\n{}\n\n+++ after ({} tokens, {}% saved)\n{}",
                diff.current_tokens,
                diff.before,
                diff.potential_tokens,
                diff.savings_percent,
                diff.after
            );

            if apply {
                let report = session.apply(&engine).await.map_err(|e| e.to_string())?;
                eprintln!(
                    "\nApplied {} suggestion(s) to '{}' ({} skipped)",
                    report.patched.len(),
                    report.context,
                    report.skipped
                );
            }
        }
    }

    Ok(())
}
