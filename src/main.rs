//! # Context Sync CLI (`ctxsync`)
//!
//! Converges the configured targets toward the configured sources.
//!
//! ## Usage
//!
//! ```bash
//! ctxsync --config ./config/ctxsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ctxsync sources` | List configured sources and targets |
//! | `ctxsync plan` | Show each target's plan without applying it |
//! | `ctxsync sync` | Apply the plans (`--dry-run` to only log them) |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use context_sync::config::{self, Config};
use context_sync::engine::{Engine, TargetPlan};
use context_sync::logging::{self, TracingLogger};
use context_sync::traits::ConnectorRegistry;

/// Context Sync CLI: converge knowledge stores toward their document sources.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "ctxsync",
    about = "Context Sync: converge knowledge stores toward their document sources",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ctxsync.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// List configured sources and targets.
    Sources,

    /// Show the plan for every target without changing anything.
    Plan {
        /// Print plans as JSON on stdout.
        #[arg(long)]
        json: bool,
    },

    /// Synchronize every target.
    ///
    /// Fetches source metadata once, then plans and applies changes per
    /// target. Exits non-zero if any operation failed.
    Sync {
        /// Log intended effects without calling any connector mutation.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Sources => list_sources(&cfg),
        Commands::Plan { json } => {
            let plans = build_engine(&cfg, false)?.plan().await?;
            print_plans(&plans, json)
        }
        Commands::Sync { dry_run } => {
            let report = build_engine(&cfg, dry_run)?.run().await?;
            for target in &report.targets {
                if target.dry_run {
                    println!("sync {} (dry-run)", target.target);
                } else {
                    println!("sync {}", target.target);
                }
                println!("  operations: {}", target.total);
                println!("  succeeded: {}", target.succeeded);
                println!("  skipped: {}", target.skipped);
            }
            println!("ok");
            Ok(())
        }
    }
}

fn build_engine(cfg: &Config, dry_run: bool) -> Result<Engine> {
    let registry = ConnectorRegistry::with_builtins();
    let sources = registry.build_sources(cfg)?;
    let targets = registry.build_targets(cfg)?;

    let mut options = cfg.sync.reconcile_options();
    options.dry_run |= dry_run;

    Ok(Engine::new(sources, targets)
        .with_options(options)
        .with_logger(Arc::new(TracingLogger)))
}

fn print_plans(plans: &[TargetPlan], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(plans)?);
        return Ok(());
    }
    for target in plans {
        println!("plan {}", target.target);
        for op in target.plan.operations() {
            println!("  {:<7} {}  ({})", op.kind.as_str(), op.document_id(), op.reason);
        }
        println!("  {}", target.plan.summary());
    }
    Ok(())
}

fn list_sources(cfg: &Config) -> Result<()> {
    let registry = ConnectorRegistry::with_builtins();

    println!("{:<8} {:<32} KIND", "ROLE", "ID");
    for source in registry.build_sources(cfg)? {
        println!("{:<8} {:<32} {}", "source", source.provider_id(), source.kind());
    }
    for target in registry.build_targets(cfg)? {
        println!("{:<8} {:<32} {}", "target", target.name(), target.kind());
    }
    Ok(())
}
